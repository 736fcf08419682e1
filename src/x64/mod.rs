//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Register model and NASM register names using iced-x86
//! - IR-to-text lowering
//! - Function frames (prologue/epilogue)

pub mod frame;
pub mod lowering;
pub mod registers;

pub use frame::{frame_size, FunctionFrame, EPILOGUE_LABEL};
pub use lowering::Lowering;
pub use registers::{
    size_keyword, GpRegister, RegisterConfig, ARGUMENT_REGISTERS, CALLEE_SAVED, TEMP_POOL,
};
