//! Function frames.
//!
//! Every function gets the same frame shape:
//!
//! ```text
//! name:
//!     push rbp
//!     mov rbp, rsp
//!     sub rsp, N        ; locals, N = 8 + 16k
//!     push rbx          ; callee-saved pool registers
//!     push r12
//!     push r13
//!     ...
//! .l1:
//!     pop r13
//!     pop r12
//!     pop rbx
//!     leave
//!     ret
//! ```
//!
//! Locals sit at `[rbp - offset]` for offsets up to the scope total, so they
//! always fit below `rbp` and above the saved registers. With the return
//! address, saved `rbp` and three pushes, `N = 8 + 16k` keeps `rsp` 16-byte
//! aligned at every statement boundary.

use super::registers::{RegisterConfig, CALLEE_SAVED};

/// Label every `return` jumps to.
pub const EPILOGUE_LABEL: &str = ".l1";

/// Stack reserved for locals whose offsets add up to `total`.
pub fn frame_size(total: u32) -> u32 {
    let mut size = 8;
    while size <= total {
        size += 16;
    }
    size
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFrame {
    name: String,
    size: u32,
}

impl FunctionFrame {
    pub fn new(name: &str, locals_total: u32) -> Self {
        Self {
            name: name.to_string(),
            size: frame_size(locals_total),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn prologue(&self, regs: &mut RegisterConfig) -> Vec<String> {
        let mut lines = vec![
            format!("{}:", self.name),
            "    push rbp".to_string(),
            "    mov rbp, rsp".to_string(),
            format!("    sub rsp, {}", self.size),
        ];
        for reg in CALLEE_SAVED {
            lines.push(format!("    push {}", regs.name(reg.full())));
        }
        lines
    }

    pub fn epilogue(&self, regs: &mut RegisterConfig) -> Vec<String> {
        let mut lines = vec![format!("{}:", EPILOGUE_LABEL)];
        for reg in CALLEE_SAVED.iter().rev() {
            lines.push(format!("    pop {}", regs.name(reg.full())));
        }
        lines.push("    leave".to_string());
        lines.push("    ret".to_string());
        lines
    }
}
