// This module defines the intermediate representation handed from instruction selection to
// register allocation and lowering. An IrValue is one instruction: an opcode, up to two
// operands and the type whose width the instruction works on. Operands name temporaries
// (TempReg), the frame pointer, frame-pointer-relative slots (optionally with a scaled index
// temporary), register-relative slots, labels and literals. Temporaries are numbered per
// function by the selector; the allocator later records the physical slot of each occurrence
// in `allocated`, so the lowering stage never has to look anything up. Operand roles depend on
// the opcode and are listed on IrOpcode; `IrValue::validate` checks them so a malformed
// instruction is reported as an internal error instead of reaching the assembler.

//! Symbolic-register IR.

use std::fmt;

use crate::ast::Type;
use crate::core::{CompileResult, InternalError};

/// IR opcodes.
///
/// Operand roles (`arg0`, `arg1`):
/// - `Copy`: dst temp, source temp / literal / frame pointer
/// - `CopyFromRef`: dst temp, frame slot whose address is taken
/// - `CopyFromDeref`: dst temp, pointer temp
/// - `CopyToDeref`: pointer temp, value temp
/// - `CopyFromRegOffset`: dst temp, register-relative slot
/// - arithmetic, `Cmp`, `Sal`: left temp (also the result), right temp / literal
/// - `PushArg`: value temp, argument position literal
/// - `Call`: function label, optional result temp
/// - `PopArg`: frame slot, argument position literal
/// - `CopyToFpOffset`: frame slot, value temp
/// - `CopyFromFpOffset`: dst temp, frame slot
/// - `ExtendTo64Bits`: temp; the instruction type is the source width
/// - `CopyStringRef`: dst temp, data label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrOpcode {
    Copy,
    CopyFromRef,
    CopyFromDeref,
    CopyToDeref,
    CopyFromRegOffset,
    Plus,
    Minus,
    Mul,
    Div,
    PushArg,
    Call,
    Inc,
    Dec,
    PopArg,
    Negate,
    PushReg,
    PopReg,
    Cmp,
    Sal,
    CopyToFpOffset,
    CopyFromFpOffset,
    ExtendTo64Bits,
    CopyStringRef,
}

impl IrOpcode {
    pub fn name(self) -> &'static str {
        match self {
            IrOpcode::Copy => "COPY",
            IrOpcode::CopyFromRef => "COPY_FROM_REF",
            IrOpcode::CopyFromDeref => "COPY_FROM_DEREF",
            IrOpcode::CopyToDeref => "COPY_TO_DEREF",
            IrOpcode::CopyFromRegOffset => "COPY_FROM_REG_OFFSET",
            IrOpcode::Plus => "PLUS_OP",
            IrOpcode::Minus => "MINUS_OP",
            IrOpcode::Mul => "MUL_OP",
            IrOpcode::Div => "DIV_OP",
            IrOpcode::PushArg => "PUSH_ARG",
            IrOpcode::Call => "CALL",
            IrOpcode::Inc => "INC",
            IrOpcode::Dec => "DEC",
            IrOpcode::PopArg => "POP_ARG",
            IrOpcode::Negate => "NEG_UNARY",
            IrOpcode::PushReg => "PUSH_REG",
            IrOpcode::PopReg => "POP_REG",
            IrOpcode::Cmp => "CMP",
            IrOpcode::Sal => "SAL",
            IrOpcode::CopyToFpOffset => "COPY_TO_FP_OFFSET",
            IrOpcode::CopyFromFpOffset => "COPY_FROM_FP_OFFSET",
            IrOpcode::ExtendTo64Bits => "EXTEND_TO_64BITS",
            IrOpcode::CopyStringRef => "COPY_STRING_REF",
        }
    }
}

impl fmt::Display for IrOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A temporary register, with its physical slot once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempReg {
    pub index: u32,
    pub allocated: Option<u8>,
}

impl TempReg {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            allocated: None,
        }
    }

    /// Physical slot, or an internal error if allocation has not run.
    pub fn slot(&self) -> CompileResult<u8> {
        self.allocated.ok_or_else(|| {
            InternalError::MalformedIr {
                reason: format!("t{} was never allocated", self.index),
            }
            .into()
        })
    }
}

impl fmt::Display for TempReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.allocated {
            Some(slot) => write!(f, "t{}@p{}", self.index, slot),
            None => write!(f, "t{}", self.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Temp(TempReg),
    FramePointer,
    /// `[fp - offset]`, plus `index * scale` when present.
    FramePointerOffset {
        offset: i64,
        index: Option<(TempReg, u8)>,
    },
    /// `[base - offset]`.
    RegOffset { base: TempReg, offset: i64 },
    Label(String),
    Literal(i64),
}

impl Operand {
    pub fn temp(index: u32) -> Self {
        Operand::Temp(TempReg::new(index))
    }

    pub fn frame_slot(offset: i64) -> Self {
        Operand::FramePointerOffset {
            offset,
            index: None,
        }
    }

    pub fn as_temp(&self) -> Option<TempReg> {
        match self {
            Operand::Temp(reg) => Some(*reg),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<i64> {
        match self {
            Operand::Literal(value) => Some(*value),
            _ => None,
        }
    }

    /// Every temporary this operand mentions, nested ones included.
    pub fn temps(&self) -> Vec<TempReg> {
        match self {
            Operand::Temp(reg) => vec![*reg],
            Operand::FramePointerOffset {
                index: Some((reg, _)),
                ..
            } => vec![*reg],
            Operand::RegOffset { base, .. } => vec![*base],
            _ => Vec::new(),
        }
    }

    pub fn temps_mut(&mut self) -> Vec<&mut TempReg> {
        match self {
            Operand::Temp(reg) => vec![reg],
            Operand::FramePointerOffset {
                index: Some((reg, _)),
                ..
            } => vec![reg],
            Operand::RegOffset { base, .. } => vec![base],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(reg) => write!(f, "{}", reg),
            Operand::FramePointer => write!(f, "fp"),
            Operand::FramePointerOffset { offset, index } => {
                write!(f, "[fp - {}", offset)?;
                if let Some((reg, scale)) = index {
                    write!(f, " + {}*{}", reg, scale)?;
                }
                write!(f, "]")
            }
            Operand::RegOffset { base, offset } => write!(f, "[{} - {}]", base, offset),
            Operand::Label(name) => f.write_str(name),
            Operand::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrValue {
    pub opcode: IrOpcode,
    pub arg0: Option<Operand>,
    pub arg1: Option<Operand>,
    pub ty: Type,
}

impl IrValue {
    pub fn new(opcode: IrOpcode, ty: Type) -> Self {
        Self {
            opcode,
            arg0: None,
            arg1: None,
            ty,
        }
    }

    pub fn unary(opcode: IrOpcode, arg0: Operand, ty: Type) -> Self {
        Self {
            opcode,
            arg0: Some(arg0),
            arg1: None,
            ty,
        }
    }

    pub fn binary(opcode: IrOpcode, arg0: Operand, arg1: Operand, ty: Type) -> Self {
        Self {
            opcode,
            arg0: Some(arg0),
            arg1: Some(arg1),
            ty,
        }
    }

    /// Byte width the instruction operates on. Non-scalar types count as 8.
    pub fn width(&self) -> u8 {
        self.ty.scalar_width().unwrap_or(8)
    }

    pub fn temps(&self) -> Vec<TempReg> {
        let mut temps = Vec::new();
        for arg in [&self.arg0, &self.arg1].into_iter().flatten() {
            temps.extend(arg.temps());
        }
        temps
    }

    pub fn temps_mut(&mut self) -> Vec<&mut TempReg> {
        let mut temps = Vec::new();
        for arg in [&mut self.arg0, &mut self.arg1].into_iter().flatten() {
            temps.extend(arg.temps_mut());
        }
        temps
    }

    /// Result temporary of a CALL, if it has one.
    pub fn call_result(&self) -> Option<TempReg> {
        match (self.opcode, &self.arg1) {
            (IrOpcode::Call, Some(Operand::Temp(reg))) => Some(*reg),
            _ => None,
        }
    }

    /// Check the operand roles documented on [`IrOpcode`].
    pub fn validate(&self) -> CompileResult<()> {
        use IrOpcode::*;

        let is_temp = |arg: &Option<Operand>| matches!(arg, Some(Operand::Temp(_)));
        let is_slot = |arg: &Option<Operand>| matches!(arg, Some(Operand::FramePointerOffset { .. }));
        let is_literal = |arg: &Option<Operand>| matches!(arg, Some(Operand::Literal(_)));
        let is_label = |arg: &Option<Operand>| matches!(arg, Some(Operand::Label(_)));
        let temp_or_literal = |arg: &Option<Operand>| is_temp(arg) || is_literal(arg);

        let ok = match self.opcode {
            Copy => {
                is_temp(&self.arg0)
                    && (temp_or_literal(&self.arg1)
                        || matches!(self.arg1, Some(Operand::FramePointer)))
            }
            CopyFromRef | CopyFromFpOffset => is_temp(&self.arg0) && is_slot(&self.arg1),
            CopyFromDeref | CopyToDeref => is_temp(&self.arg0) && is_temp(&self.arg1),
            CopyFromRegOffset => {
                is_temp(&self.arg0) && matches!(self.arg1, Some(Operand::RegOffset { .. }))
            }
            Plus | Minus | Mul | Div | Cmp => is_temp(&self.arg0) && temp_or_literal(&self.arg1),
            Sal => is_temp(&self.arg0) && is_literal(&self.arg1),
            PushArg => is_temp(&self.arg0) && is_literal(&self.arg1),
            Call => is_label(&self.arg0) && (self.arg1.is_none() || is_temp(&self.arg1)),
            PopArg => is_slot(&self.arg0) && is_literal(&self.arg1),
            CopyToFpOffset => is_slot(&self.arg0) && is_temp(&self.arg1),
            Inc | Dec | Negate | PushReg | PopReg | ExtendTo64Bits => {
                is_temp(&self.arg0) && self.arg1.is_none()
            }
            CopyStringRef => is_temp(&self.arg0) && is_label(&self.arg1),
        };

        if ok {
            Ok(())
        } else {
            Err(InternalError::MalformedIr {
                reason: format!("bad operands for `{}`", self),
            }
            .into())
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(arg0) = &self.arg0 {
            write!(f, " {}", arg0)?;
        }
        if let Some(arg1) = &self.arg1 {
            write!(f, ", {}", arg1)?;
        }
        write!(f, " : {}", self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let copy = IrValue::binary(
            IrOpcode::CopyFromFpOffset,
            Operand::temp(3),
            Operand::FramePointerOffset {
                offset: 24,
                index: Some((TempReg::new(2), 4)),
            },
            Type::I32,
        );
        assert_eq!(copy.to_string(), "COPY_FROM_FP_OFFSET t3, [fp - 24 + t2*4] : i32");

        let mut reg = TempReg::new(1);
        reg.allocated = Some(0);
        assert_eq!(reg.to_string(), "t1@p0");
    }

    #[test]
    fn test_nested_temps_are_visible() {
        let mut load = IrValue::binary(
            IrOpcode::CopyFromRegOffset,
            Operand::temp(4),
            Operand::RegOffset {
                base: TempReg::new(1),
                offset: 8,
            },
            Type::I64,
        );
        let indices: Vec<u32> = load.temps().iter().map(|reg| reg.index).collect();
        assert_eq!(indices, vec![4, 1]);

        for reg in load.temps_mut() {
            reg.allocated = Some(reg.index as u8);
        }
        assert_eq!(
            load.arg1,
            Some(Operand::RegOffset {
                base: TempReg {
                    index: 1,
                    allocated: Some(1)
                },
                offset: 8
            })
        );
    }

    #[test]
    fn test_validate_rejects_wrong_roles() {
        let good = IrValue::binary(
            IrOpcode::PushArg,
            Operand::temp(0),
            Operand::Literal(0),
            Type::I32,
        );
        assert!(good.validate().is_ok());

        let bad = IrValue::binary(
            IrOpcode::CopyToFpOffset,
            Operand::temp(0),
            Operand::temp(1),
            Type::I32,
        );
        let err = bad.validate().unwrap_err();
        assert!(err.is_internal());

        let call = IrValue::unary(IrOpcode::Call, Operand::Label("f".into()), Type::None);
        assert!(call.validate().is_ok());
        assert_eq!(call.call_result(), None);
    }

    #[test]
    fn test_unallocated_slot_is_internal_error() {
        assert!(TempReg::new(7).slot().is_err());
        let reg = TempReg {
            index: 7,
            allocated: Some(2),
        };
        assert_eq!(reg.slot().unwrap(), 2);
    }
}
