//! x86-64 register model.
//!
//! [`RegisterConfig`] maps allocator slots and argument positions to iced-x86
//! registers of every width and caches their NASM spellings.

use iced_x86::{Formatter, NasmFormatter, Register};

use crate::core::{CompileResult, InternalError};

/// One general-purpose register at 8, 16, 32 and 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpRegister {
    widths: [Register; 4],
}

impl GpRegister {
    pub const fn new(b: Register, w: Register, d: Register, q: Register) -> Self {
        Self {
            widths: [b, w, d, q],
        }
    }

    /// The sub-register for a width of 1, 2, 4 or 8 bytes.
    pub fn at_width(&self, width: u8) -> CompileResult<Register> {
        let index = match width {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            _ => {
                return Err(InternalError::MalformedIr {
                    reason: format!("no register width of {} bytes", width),
                }
                .into())
            }
        };
        Ok(self.widths[index])
    }

    pub fn full(&self) -> Register {
        self.widths[3]
    }
}

pub const RAX: GpRegister = GpRegister::new(Register::AL, Register::AX, Register::EAX, Register::RAX);
pub const RBX: GpRegister = GpRegister::new(Register::BL, Register::BX, Register::EBX, Register::RBX);
pub const RCX: GpRegister = GpRegister::new(Register::CL, Register::CX, Register::ECX, Register::RCX);
pub const RDX: GpRegister = GpRegister::new(Register::DL, Register::DX, Register::EDX, Register::RDX);
pub const RSI: GpRegister = GpRegister::new(Register::SIL, Register::SI, Register::ESI, Register::RSI);
pub const RDI: GpRegister = GpRegister::new(Register::DIL, Register::DI, Register::EDI, Register::RDI);
pub const R8: GpRegister = GpRegister::new(Register::R8L, Register::R8W, Register::R8D, Register::R8);
pub const R9: GpRegister = GpRegister::new(Register::R9L, Register::R9W, Register::R9D, Register::R9);
pub const R10: GpRegister = GpRegister::new(Register::R10L, Register::R10W, Register::R10D, Register::R10);
pub const R11: GpRegister = GpRegister::new(Register::R11L, Register::R11W, Register::R11D, Register::R11);
pub const R12: GpRegister = GpRegister::new(Register::R12L, Register::R12W, Register::R12D, Register::R12);
pub const R13: GpRegister = GpRegister::new(Register::R13L, Register::R13W, Register::R13D, Register::R13);

/// Temporaries live here; slot 0 is RAX so call results and return values need no move.
pub const TEMP_POOL: [GpRegister; 6] = [RAX, RBX, R10, R11, R12, R13];

/// System V integer argument registers.
pub const ARGUMENT_REGISTERS: [GpRegister; 6] = [RDI, RSI, RDX, RCX, R8, R9];

/// Pool members the System V ABI makes callee-saved; pushed in every prologue.
pub const CALLEE_SAVED: [GpRegister; 3] = [RBX, R12, R13];

/// Register tables plus their NASM names.
pub struct RegisterConfig {
    temps: Vec<GpRegister>,
    arguments: Vec<GpRegister>,
    formatter: NasmFormatter,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterConfig {
    pub fn new() -> Self {
        Self::with_pool(&TEMP_POOL)
    }

    /// Restrict temporaries to `pool`, mainly to provoke spills in tests.
    pub fn with_pool(pool: &[GpRegister]) -> Self {
        Self {
            temps: pool.to_vec(),
            arguments: ARGUMENT_REGISTERS.to_vec(),
            formatter: NasmFormatter::new(),
        }
    }

    /// Number of allocator slots.
    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    pub fn temp(&self, slot: u8) -> CompileResult<GpRegister> {
        self.temps.get(slot as usize).copied().ok_or_else(|| {
            InternalError::MalformedIr {
                reason: format!("slot p{} is outside the register pool", slot),
            }
            .into()
        })
    }

    pub fn argument(&self, position: usize) -> Option<GpRegister> {
        self.arguments.get(position).copied()
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// NASM spelling of a register, e.g. `r10d`.
    pub fn name(&mut self, register: Register) -> String {
        self.formatter.format_register(register).to_string()
    }

    /// Name of slot `slot` at `width` bytes.
    pub fn temp_name(&mut self, slot: u8, width: u8) -> CompileResult<String> {
        let register = self.temp(slot)?.at_width(width)?;
        Ok(self.name(register))
    }

    pub fn argument_name(&mut self, position: usize, width: u8) -> CompileResult<String> {
        let register = self
            .argument(position)
            .ok_or_else(|| InternalError::MalformedIr {
                reason: format!("argument {} is not passed in a register", position),
            })?
            .at_width(width)?;
        Ok(self.name(register))
    }
}

/// NASM size keyword for a memory operand.
pub fn size_keyword(width: u8) -> CompileResult<&'static str> {
    match width {
        1 => Ok("BYTE"),
        2 => Ok("WORD"),
        4 => Ok("DWORD"),
        8 => Ok("QWORD"),
        _ => Err(InternalError::MalformedIr {
            reason: format!("no memory operand of {} bytes", width),
        }
        .into()),
    }
}
