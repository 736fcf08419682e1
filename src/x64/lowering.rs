// This module turns allocated IR into NASM text. Every opcode maps to a fixed template chosen
// by its operand kinds and byte width; the only state carried between instructions is the
// number of stack arguments pushed since the last CALL, which the CALL pops again. Register
// names come from RegisterConfig at the width of the instruction, memory operands always carry
// an explicit size keyword, and 64-bit registers are used for addresses and stack traffic.
// Division is the one multi-instruction template: idiv works on the accumulator, so a dividend
// outside RAX is moved there for the duration of the instruction with RAX and the divisor
// parked on the stack.

//! IR-to-NASM lowering.

use crate::core::{CompileResult, InternalError};
use crate::ir::{IrOpcode, IrValue, Operand, TempReg};
use crate::symbols::REGISTER_PARAMS;

use super::registers::{size_keyword, RegisterConfig, RAX};

/// Lowers a stream of allocated instructions for one function.
pub struct Lowering<'c> {
    regs: &'c mut RegisterConfig,
    stack_args: usize,
}

impl<'c> Lowering<'c> {
    pub fn new(regs: &'c mut RegisterConfig) -> Self {
        Self {
            regs,
            stack_args: 0,
        }
    }

    /// Lower one instruction, appending indented lines to `out`.
    pub fn lower(&mut self, ir: &IrValue, out: &mut Vec<String>) -> CompileResult<()> {
        let width = ir.width();
        let mut asm = |text: String| out.push(format!("    {}", text));

        match ir.opcode {
            IrOpcode::Copy => {
                let src = operand(&ir.arg1, ir)?;
                let dst = temp(&ir.arg0, ir)?;
                if let Operand::FramePointer = src {
                    asm(format!("mov {}, rbp", self.reg(dst, 8)?));
                } else {
                    asm(format!("mov {}, {}", self.reg(dst, width)?, self.value(src, width)?));
                }
            }
            IrOpcode::CopyFromRef => {
                let dst = self.reg(temp(&ir.arg0, ir)?, 8)?;
                asm(format!("lea {}, {}", dst, self.address(operand(&ir.arg1, ir)?)?));
            }
            IrOpcode::CopyFromDeref => {
                let dst = self.reg(temp(&ir.arg0, ir)?, width)?;
                let pointer = self.reg(temp(&ir.arg1, ir)?, 8)?;
                asm(format!("mov {}, {} [{}]", dst, size_keyword(width)?, pointer));
            }
            IrOpcode::CopyToDeref => {
                let pointer = self.reg(temp(&ir.arg0, ir)?, 8)?;
                let value = self.reg(temp(&ir.arg1, ir)?, width)?;
                asm(format!("mov {} [{}], {}", size_keyword(width)?, pointer, value));
            }
            IrOpcode::CopyFromRegOffset | IrOpcode::CopyFromFpOffset => {
                let dst = self.reg(temp(&ir.arg0, ir)?, width)?;
                let address = self.address(operand(&ir.arg1, ir)?)?;
                asm(format!("mov {}, {} {}", dst, size_keyword(width)?, address));
            }
            IrOpcode::CopyToFpOffset => {
                let address = self.address(operand(&ir.arg0, ir)?)?;
                let value = self.reg(temp(&ir.arg1, ir)?, width)?;
                asm(format!("mov {} {}, {}", size_keyword(width)?, address, value));
            }
            IrOpcode::Plus | IrOpcode::Minus | IrOpcode::Cmp => {
                let mnemonic = match ir.opcode {
                    IrOpcode::Plus => "add",
                    IrOpcode::Minus => "sub",
                    _ => "cmp",
                };
                let left = self.reg(temp(&ir.arg0, ir)?, width)?;
                let right = self.value(operand(&ir.arg1, ir)?, width)?;
                asm(format!("{} {}, {}", mnemonic, left, right));
            }
            IrOpcode::Mul => {
                // No two-operand imul on bytes; the low byte of the 32-bit product is the same.
                let width = if width == 1 { 4 } else { width };
                let left = self.reg(temp(&ir.arg0, ir)?, width)?;
                match operand(&ir.arg1, ir)? {
                    Operand::Literal(value) => asm(format!("imul {}, {}, {}", left, left, value)),
                    right => asm(format!("imul {}, {}", left, self.value(right, width)?)),
                }
            }
            IrOpcode::Div => {
                for line in self.divide(ir, width)? {
                    asm(line);
                }
            }
            IrOpcode::Inc | IrOpcode::Dec | IrOpcode::Negate => {
                let mnemonic = match ir.opcode {
                    IrOpcode::Inc => "inc",
                    IrOpcode::Dec => "dec",
                    _ => "neg",
                };
                asm(format!("{} {}", mnemonic, self.reg(temp(&ir.arg0, ir)?, width)?));
            }
            IrOpcode::Sal => {
                let shift = literal(&ir.arg1, ir)?;
                asm(format!("sal {}, {}", self.reg(temp(&ir.arg0, ir)?, width)?, shift));
            }
            IrOpcode::ExtendTo64Bits => {
                let value = temp(&ir.arg0, ir)?;
                match width {
                    1 | 2 => asm(format!("movsx {}, {}", self.reg(value, 8)?, self.reg(value, width)?)),
                    4 => asm(format!("movsxd {}, {}", self.reg(value, 8)?, self.reg(value, 4)?)),
                    _ => {}
                }
            }
            IrOpcode::PushArg => {
                let value = self.reg(temp(&ir.arg0, ir)?, 8)?;
                let position = literal(&ir.arg1, ir)? as usize;
                if position < REGISTER_PARAMS {
                    asm(format!("mov {}, {}", self.regs.argument_name(position, 8)?, value));
                } else {
                    self.stack_args += 1;
                    asm(format!("push {}", value));
                }
            }
            IrOpcode::Call => {
                let Some(Operand::Label(callee)) = &ir.arg0 else {
                    return Err(malformed(ir));
                };
                asm(format!("call {}", callee));
                if self.stack_args > 0 {
                    asm(format!("add rsp, {}", 8 * self.stack_args));
                    self.stack_args = 0;
                }
                if let Some(result) = ir.call_result() {
                    if result.slot()? != 0 {
                        let rax = self.regs.name(RAX.at_width(width)?);
                        asm(format!("mov {}, {}", self.reg(result, width)?, rax));
                    }
                }
            }
            IrOpcode::PopArg => {
                let position = literal(&ir.arg1, ir)? as usize;
                if position < REGISTER_PARAMS {
                    let address = self.address(operand(&ir.arg0, ir)?)?;
                    let register = self.regs.argument_name(position, width)?;
                    asm(format!("mov {} {}, {}", size_keyword(width)?, address, register));
                }
            }
            IrOpcode::PushReg => asm(format!("push {}", self.reg(temp(&ir.arg0, ir)?, 8)?)),
            IrOpcode::PopReg => asm(format!("pop {}", self.reg(temp(&ir.arg0, ir)?, 8)?)),
            IrOpcode::CopyStringRef => {
                let dst = self.reg(temp(&ir.arg0, ir)?, 8)?;
                let Some(Operand::Label(label)) = &ir.arg1 else {
                    return Err(malformed(ir));
                };
                asm(format!("mov {}, {}", dst, label));
            }
        }
        Ok(())
    }

    fn reg(&mut self, reg: TempReg, width: u8) -> CompileResult<String> {
        self.regs.temp_name(reg.slot()?, width)
    }

    fn value(&mut self, operand: &Operand, width: u8) -> CompileResult<String> {
        match operand {
            Operand::Temp(reg) => self.reg(*reg, width),
            Operand::Literal(value) => Ok(value.to_string()),
            other => Err(InternalError::MalformedIr {
                reason: format!("`{}` is not a register or literal", other),
            }
            .into()),
        }
    }

    /// `[rbp - 8]`, `[rbp + 16]`, `[rbp - 24 + r10*4]`, `[rbx - 4]`.
    fn address(&mut self, operand: &Operand) -> CompileResult<String> {
        match operand {
            Operand::FramePointerOffset { offset, index } => {
                let mut text = format!("[rbp {}", displacement(*offset));
                if let Some((reg, scale)) = index {
                    text.push_str(&format!(" + {}*{}", self.reg(*reg, 8)?, scale));
                }
                text.push(']');
                Ok(text)
            }
            Operand::RegOffset { base, offset } => {
                Ok(format!("[{} {}]", self.reg(*base, 8)?, displacement(*offset)))
            }
            other => Err(InternalError::MalformedIr {
                reason: format!("`{}` is not an address", other),
            }
            .into()),
        }
    }

    fn divide(&mut self, ir: &IrValue, width: u8) -> CompileResult<Vec<String>> {
        let dividend = temp(&ir.arg0, ir)?;
        let divisor = match operand(&ir.arg1, ir)? {
            Operand::Temp(reg) => *reg,
            _ => return Err(malformed(ir)),
        };
        let extend = match width {
            1 => "cbw",
            2 => "cwd",
            4 => "cdq",
            _ => "cqo",
        };

        if dividend.slot()? == 0 {
            return Ok(vec![
                extend.to_string(),
                format!("idiv {}", self.reg(divisor, width)?),
            ]);
        }

        let rax = self.regs.name(RAX.at_width(width)?);
        let left = self.reg(dividend, width)?;
        Ok(vec![
            "push rax".to_string(),
            format!("push {}", self.reg(divisor, 8)?),
            format!("mov {}, {}", rax, left),
            extend.to_string(),
            format!("idiv {} [rsp]", size_keyword(width)?),
            "add rsp, 8".to_string(),
            format!("mov {}, {}", left, rax),
            "pop rax".to_string(),
        ])
    }
}

/// `- k` for slots below the base, `+ k` above it.
fn displacement(offset: i64) -> String {
    if offset >= 0 {
        format!("- {}", offset)
    } else {
        format!("+ {}", -offset)
    }
}

fn malformed(ir: &IrValue) -> crate::core::CompileError {
    InternalError::MalformedIr {
        reason: format!("cannot lower `{}`", ir),
    }
    .into()
}

fn operand<'i>(arg: &'i Option<Operand>, ir: &IrValue) -> CompileResult<&'i Operand> {
    arg.as_ref().ok_or_else(|| malformed(ir))
}

fn temp(arg: &Option<Operand>, ir: &IrValue) -> CompileResult<TempReg> {
    arg.as_ref()
        .and_then(Operand::as_temp)
        .ok_or_else(|| malformed(ir))
}

fn literal(arg: &Option<Operand>, ir: &IrValue) -> CompileResult<i64> {
    arg.as_ref()
        .and_then(Operand::as_literal)
        .ok_or_else(|| malformed(ir))
}
