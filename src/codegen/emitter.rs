//! Output side of code generation.
//!
//! An [`Emitter`] receives two kinds of output: finished assembly lines and IR
//! instructions that still need register allocation. The statement compiler
//! drains the buffered IR at statement boundaries, allocates and lowers it, and
//! appends the result as text, so the text always stays in program order.

use bumpalo::collections::String as BumpString;
use bumpalo::Bump;
use hashbrown::HashMap;

use crate::core::CompilationSession;
use crate::ir::IrValue;

/// Sink for generated code.
pub trait Emitter {
    /// Append a raw assembly or directive line.
    fn emit_text(&mut self, line: &str);

    /// Buffer an instruction for allocation and lowering.
    fn emit_ir(&mut self, ir: IrValue);
}

/// Collects the text of one unit.
#[derive(Debug, Default)]
pub struct AsmEmitter {
    lines: Vec<String>,
    pending: Vec<IrValue>,
}

impl AsmEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the buffered IR, leaving the buffer empty.
    pub fn take_ir(&mut self) -> Vec<IrValue> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending_ir(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_text(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

impl Emitter for AsmEmitter {
    fn emit_text(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn emit_ir(&mut self, ir: IrValue) {
        self.pending.push(ir);
    }
}

/// String literals of one unit, interned in the session arena.
pub struct StringLiterals<'arena> {
    arena: &'arena Bump,
    prefix: String,
    literals: Vec<&'arena str>,
    labels: HashMap<&'arena str, usize>,
}

impl<'arena> StringLiterals<'arena> {
    pub fn new(session: &CompilationSession<'arena>, unit: &str) -> Self {
        let sanitized: String = unit
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self {
            arena: session.arena(),
            prefix: format!("__str_{}_", sanitized),
            literals: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Label of `text`, registering it on first use.
    pub fn label(&mut self, text: &str) -> String {
        let index = match self.labels.get(text) {
            Some(&index) => index,
            None => {
                let interned: &'arena str = self.arena.alloc_str(text);
                let index = self.literals.len();
                self.literals.push(interned);
                self.labels.insert(interned, index);
                index
            }
        };
        format!("{}{}", self.prefix, index)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Emit the `.data` section holding every literal.
    pub fn emit_data(&self, emitter: &mut dyn Emitter) {
        if self.literals.is_empty() {
            return;
        }
        emitter.emit_text("section .data");
        for (index, text) in self.literals.iter().enumerate() {
            let line = format!("{}{}: db {}", self.prefix, index, self.data_bytes(text));
            emitter.emit_text(&line);
        }
    }

    /// `"hi",10,0`: printable runs quoted, other bytes numeric, NUL-terminated.
    fn data_bytes(&self, text: &str) -> String {
        let mut out = BumpString::new_in(self.arena);
        let mut quoted = false;
        for byte in text.bytes() {
            let printable = (0x20..0x7f).contains(&byte) && byte != b'"';
            if printable {
                if !quoted {
                    if !out.is_empty() {
                        out.push(',');
                    }
                    out.push('"');
                    quoted = true;
                }
                out.push(byte as char);
            } else {
                if quoted {
                    out.push('"');
                    quoted = false;
                }
                if !out.is_empty() {
                    out.push(',');
                }
                out.push_str(&byte.to_string());
            }
        }
        if quoted {
            out.push('"');
        }
        if !out.is_empty() {
            out.push(',');
        }
        out.push('0');
        out.to_string()
    }
}
