// This module compiles the statements of one rewritten unit into NASM text. Expressions are
// handed to the instruction selector, which buffers IR in the AsmEmitter; at every statement
// boundary (and before any jump or label that depends on the statement) the buffered IR is
// flushed: allocated by the linear-scan allocator, lowered to text and appended after the text
// emitted so far, so the output stays in program order. Control flow is emitted directly as
// text: conditions become compare-and-jump sequences in which `&&` and `||` short-circuit by
// chaining jumps, and every function owns a label counter starting after its epilogue label.
// Scopes are tracked with a ScopeCursor that opens at functions, blocks and for-loops, exactly
// like the layout pass and the rewriter.

//! Statement compiler.

use crate::ast::{
    CompareOp, ExprArena, ExprId, ExprKind, FunctionDef, ImportTarget, LogicalOp, Stmt, Unit,
};
use crate::core::{CompilationSession, CompileResult, InternalError};
use crate::driver::CompilerConfig;
use crate::ir::{IrOpcode, IrValue, Operand};
use crate::regalloc::{Allocation, LinearScan};
use crate::select::{RegRef, SelectionOutput, Selector, TempCounter};
use crate::symbols::{Declarations, ScopeCursor, SymbolTable};
use crate::x64::registers::RAX;
use crate::x64::{FunctionFrame, Lowering, RegisterConfig, EPILOGUE_LABEL, TEMP_POOL};

use super::emitter::{AsmEmitter, Emitter, StringLiterals};

/// Compiles one unit's statements to assembly text.
pub struct StatementCompiler<'u, 'arena> {
    arena: &'u ExprArena,
    symbols: &'u SymbolTable,
    decls: &'u Declarations,
    session: &'u CompilationSession<'arena>,
    config: &'u CompilerConfig,
    selector: &'u Selector,
    regs: RegisterConfig,
    allocator: LinearScan,
    emitter: AsmEmitter,
    strings: StringLiterals<'arena>,
    temps: TempCounter,
    cursor: ScopeCursor,
    next_label: u32,
}

impl<'u, 'arena> StatementCompiler<'u, 'arena> {
    pub fn new(
        unit: &'u Unit,
        symbols: &'u SymbolTable,
        decls: &'u Declarations,
        session: &'u CompilationSession<'arena>,
        config: &'u CompilerConfig,
        selector: &'u Selector,
    ) -> Self {
        let pool = config.register_count.clamp(1, TEMP_POOL.len());
        Self {
            arena: &unit.arena,
            symbols,
            decls,
            session,
            config,
            selector,
            regs: RegisterConfig::with_pool(&TEMP_POOL[..pool]),
            allocator: LinearScan::new(pool),
            emitter: AsmEmitter::new(),
            strings: StringLiterals::new(session, &unit.name),
            temps: TempCounter::new(),
            cursor: ScopeCursor::new(),
            next_label: 2,
        }
    }

    /// Compile every top-level statement and return the unit's text.
    pub fn compile_unit(mut self, unit: &Unit) -> CompileResult<String> {
        self.emitter.emit_text("section .text");
        if unit.defines_main() {
            self.emitter.emit_text("global main");
        }

        for stmt in &unit.statements {
            match stmt {
                Stmt::Function(def) => self.function(def)?,
                Stmt::Import { target, .. } => self.import(target),
                Stmt::ExternFunction { name, .. } => {
                    self.emitter.emit_text(&format!("extern {}", name));
                }
                Stmt::Struct(_) | Stmt::Empty => {}
                other => {
                    return Err(InternalError::Unreachable {
                        reason: format!("top-level statement reached code generation: {:?}", other),
                    }
                    .into())
                }
            }
        }

        self.strings.emit_data(&mut self.emitter);
        self.session
            .record_unit_compiled(&unit.name, self.emitter.lines().len());
        log::debug!(
            "Compiled {}: {} lines, {} string literal(s)",
            unit.name,
            self.emitter.lines().len(),
            self.strings.len()
        );
        Ok(self.emitter.into_text())
    }

    fn import(&mut self, target: &ImportTarget) {
        let line = match target {
            ImportTarget::Library(name) => format!(
                "%include \"{}/{}.asm\"",
                self.config.stdlib_path.display(),
                name
            ),
            ImportTarget::File(path) => format!("%include \"{}.asm\"", path),
        };
        self.emitter.emit_text(&line);
    }

    fn function(&mut self, def: &FunctionDef) -> CompileResult<()> {
        self.cursor.enter();
        self.temps.reset();
        self.next_label = 2;

        let path = self.cursor.path().to_vec();
        let total = self.symbols.offset_total_for_scope(&path).max(0) as u32;
        let frame = FunctionFrame::new(&def.name, total);
        log::debug!("Compiling {}: {} bytes of locals, frame {}", def.name, total, frame.size());
        for line in frame.prologue(&mut self.regs) {
            self.emitter.emit_text(&line);
        }

        for (position, param) in def.params.iter().enumerate() {
            if let Some(var) = self.symbols.lookup(&path, &param.name) {
                self.emitter.emit_ir(IrValue::binary(
                    IrOpcode::PopArg,
                    Operand::frame_slot(var.offset),
                    Operand::Literal(position as i64),
                    var.ty.clone(),
                ));
            }
        }
        self.flush()?;

        for stmt in &def.body {
            self.statement(stmt)?;
        }
        self.flush()?;

        for line in frame.epilogue(&mut self.regs) {
            self.emitter.emit_text(&line);
        }
        self.cursor.exit();

        let statements: usize = def.body.iter().map(Stmt::count).sum();
        self.session.record_function_compiled(&def.name, statements);
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expression(value) => {
                self.select(*value)?;
                self.flush()?;
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    let reg = self.select(*value)?;
                    let allocation = self.flush()?;
                    self.move_to_return_register(&reg, &allocation)?;
                }
                self.text(&format!("jmp {}", EPILOGUE_LABEL));
            }
            Stmt::If { cond, then, else_ } => {
                let otherwise = self.new_label();
                self.jump_if_false(*cond, &otherwise)?;
                self.statement(then)?;
                match else_ {
                    Some(else_) => {
                        let end = self.new_label();
                        self.text(&format!("jmp {}", end));
                        self.label(&otherwise);
                        self.statement(else_)?;
                        self.label(&end);
                    }
                    None => self.label(&otherwise),
                }
            }
            Stmt::While { cond, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.label(&start);
                self.jump_if_false(*cond, &end)?;
                self.statement(body)?;
                self.text(&format!("jmp {}", start));
                self.label(&end);
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.cursor.enter();
                self.statement(init)?;
                let start = self.new_label();
                let end = self.new_label();
                self.label(&start);
                self.jump_if_false(*cond, &end)?;
                self.statement(body)?;
                self.statement(step)?;
                self.text(&format!("jmp {}", start));
                self.label(&end);
                self.cursor.exit();
            }
            Stmt::Block(stmts) => {
                self.cursor.enter();
                for stmt in stmts {
                    self.statement(stmt)?;
                }
                self.cursor.exit();
            }
            Stmt::Empty | Stmt::Struct(_) | Stmt::Import { .. } | Stmt::ExternFunction { .. } => {}
            Stmt::VarInit { name, .. } => {
                return Err(InternalError::RewriteInvariant {
                    reason: format!("declaration of `{}` survived the rewriter", name),
                }
                .into())
            }
            Stmt::Function(def) => {
                return Err(InternalError::Unreachable {
                    reason: format!("nested function `{}`", def.name),
                }
                .into())
            }
        }
        Ok(())
    }

    fn move_to_return_register(&mut self, reg: &RegRef, allocation: &Allocation) -> CompileResult<()> {
        let Some(slot) = allocation.slot_of(reg.index) else {
            // Procedures return nothing.
            return Ok(());
        };
        if slot == 0 {
            return Ok(());
        }
        let width = reg.ty.scalar_width().unwrap_or(8);
        let source = self.regs.temp_name(slot, width)?;
        let rax = self.regs.name(RAX.at_width(width)?);
        self.text(&format!("mov {}, {}", rax, source));
        Ok(())
    }

    /// Jump to `target` when `cond` is false; fall through otherwise.
    fn jump_if_false(&mut self, cond: ExprId, target: &str) -> CompileResult<()> {
        let arena = self.arena;
        match arena.kind(cond) {
            ExprKind::Logical {
                left,
                op: LogicalOp::And,
                right,
            } => {
                self.jump_if_false(*left, target)?;
                self.jump_if_false(*right, target)
            }
            ExprKind::Logical {
                left,
                op: LogicalOp::Or,
                right,
            } => {
                let taken = self.new_label();
                self.jump_if_true(*left, &taken)?;
                self.jump_if_false(*right, target)?;
                self.label(&taken);
                Ok(())
            }
            ExprKind::Grouping(inner) => self.jump_if_false(*inner, target),
            _ => self.compare_and_jump(cond, target, false),
        }
    }

    /// Jump to `target` when `cond` is true; fall through otherwise.
    fn jump_if_true(&mut self, cond: ExprId, target: &str) -> CompileResult<()> {
        let arena = self.arena;
        match arena.kind(cond) {
            ExprKind::Logical {
                left,
                op: LogicalOp::And,
                right,
            } => {
                let skip = self.new_label();
                self.jump_if_false(*left, &skip)?;
                self.jump_if_true(*right, target)?;
                self.label(&skip);
                Ok(())
            }
            ExprKind::Logical {
                left,
                op: LogicalOp::Or,
                right,
            } => {
                self.jump_if_true(*left, target)?;
                self.jump_if_true(*right, target)
            }
            ExprKind::Grouping(inner) => self.jump_if_true(*inner, target),
            _ => self.compare_and_jump(cond, target, true),
        }
    }

    fn compare_and_jump(&mut self, cond: ExprId, target: &str, when: bool) -> CompileResult<()> {
        let arena = self.arena;
        let op = match arena.kind(cond) {
            ExprKind::Comparison { op, .. } => {
                self.select(cond)?;
                *op
            }
            _ => {
                // A plain value is true when non-zero.
                let reg = self.select(cond)?;
                self.emitter.emit_ir(IrValue::binary(
                    IrOpcode::Cmp,
                    reg.operand(),
                    Operand::Literal(0),
                    reg.ty.clone(),
                ));
                CompareOp::Ne
            }
        };
        self.flush()?;
        let op = if when { op } else { op.inverse() };
        self.text(&format!("{} {}", jump_mnemonic(op), target));
        Ok(())
    }

    fn select(&mut self, value: ExprId) -> CompileResult<RegRef> {
        let mut out = SelectionOutput {
            emitter: &mut self.emitter,
            strings: &mut self.strings,
            temps: &mut self.temps,
        };
        let reg = self.selector.select(self.arena, self.decls, value, &mut out)?;
        self.session.record_statement_selected();
        Ok(reg)
    }

    /// Allocate, lower and emit the buffered IR.
    fn flush(&mut self) -> CompileResult<Allocation> {
        let code = self.emitter.take_ir();
        for ir in &code {
            self.session.record_ir_emitted(ir.opcode.name());
            if let (IrOpcode::Call, Some(Operand::Label(callee))) = (ir.opcode, &ir.arg0) {
                self.session.record_call_site(callee);
            }
        }

        let allocation = self.allocator.allocate(code)?;
        self.session
            .record_registers_allocated(allocation.temp_count());
        self.session.record_spills(allocation.spills);
        self.session.record_caller_saves(allocation.saves);
        if !allocation.code.is_empty() {
            log::debug!(
                "Flushed {} instruction(s): {} temporaries, {} spill(s), {} save(s)",
                allocation.code.len(),
                allocation.temp_count(),
                allocation.spills,
                allocation.saves
            );
        }

        let mut lowering = Lowering::new(&mut self.regs);
        let mut lines = Vec::new();
        for ir in &allocation.code {
            if self.config.annotate_ir {
                lines.push(format!("    ; {}", ir));
            }
            lowering.lower(ir, &mut lines)?;
        }
        for line in &lines {
            self.emitter.emit_text(line);
        }
        Ok(allocation)
    }

    fn new_label(&mut self) -> String {
        let label = format!(".l{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn label(&mut self, label: &str) {
        self.emitter.emit_text(&format!("{}:", label));
    }

    fn text(&mut self, instruction: &str) {
        self.emitter.emit_text(&format!("    {}", instruction));
    }
}

fn jump_mnemonic(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "je",
        CompareOp::Ne => "jne",
        CompareOp::Lt => "jl",
        CompareOp::Le => "jle",
        CompareOp::Gt => "jg",
        CompareOp::Ge => "jge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Type};
    use crate::core::DiagnosticSink;
    use crate::rewrite::rewrite_unit;
    use crate::symbols::layout_unit;
    use bumpalo::Bump;

    fn compile(mut unit: Unit, config: &CompilerConfig) -> String {
        let bump = Bump::new();
        let session = CompilationSession::new(&bump);
        let mut sink = DiagnosticSink::new(&unit.name);
        let mut decls = Declarations::new();
        decls.collect_unit(&unit, &mut sink);
        let symbols = layout_unit(&unit, &decls, &mut sink).unwrap();
        rewrite_unit(&mut unit, &symbols, &decls, &mut sink);
        assert!(!sink.has_errors(), "{:?}", sink.diagnostics());

        let selector = Selector::new();
        StatementCompiler::new(&unit, &symbols, &decls, &session, config, &selector)
            .compile_unit(&unit)
            .unwrap()
    }

    fn function(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
        Stmt::Function(FunctionDef {
            name: name.to_string(),
            params,
            return_type: Some(Type::I32),
            body,
            pos: None,
        })
    }

    #[test]
    fn test_identity_function() {
        let mut unit = Unit::new("id");
        let x = unit.arena.var("x", Type::I32);
        unit.statements
            .push(function("id", vec![Param::new("x", Type::I32)], vec![Stmt::Return(Some(x))]));

        let text = compile(unit, &CompilerConfig::default());
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            vec![
                "section .text",
                "id:",
                "push rbp",
                "mov rbp, rsp",
                "sub rsp, 8",
                "push rbx",
                "push r12",
                "push r13",
                "mov DWORD [rbp - 4], edi",
                "mov eax, DWORD [rbp - 4]",
                "jmp .l1",
                ".l1:",
                "pop r13",
                "pop r12",
                "pop rbx",
                "leave",
                "ret",
            ]
        );
    }

    #[test]
    fn test_short_circuit_and_jumps_to_else() {
        let mut unit = Unit::new("cond");
        let a = unit.arena.var("a", Type::I32);
        let zero = unit.arena.int(0);
        let positive = unit.arena.compare(a, CompareOp::Gt, zero);
        let a2 = unit.arena.var("a", Type::I32);
        let ten = unit.arena.int(10);
        let small = unit.arena.compare(a2, CompareOp::Lt, ten);
        let both = unit.arena.logical(positive, LogicalOp::And, small);
        let one = unit.arena.int(1);
        let two = unit.arena.int(2);
        unit.statements.push(function(
            "check",
            vec![Param::new("a", Type::I32)],
            vec![Stmt::If {
                cond: both,
                then: Box::new(Stmt::Return(Some(one))),
                else_: Some(Box::new(Stmt::Return(Some(two)))),
            }],
        ));

        let text = compile(unit, &CompilerConfig::default());
        let jumps: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('j') || line.starts_with(".l"))
            .collect();
        assert_eq!(
            jumps,
            vec!["jle .l2", "jge .l2", "jmp .l1", "jmp .l3", ".l2:", "jmp .l1", ".l3:", ".l1:"]
        );
    }

    #[test]
    fn test_annotated_ir_and_data_section() {
        let mut unit = Unit::new("hello");
        unit.statements.push(Stmt::ExternFunction {
            name: "puts".into(),
            params: vec![Param::new("s", Type::pointer_to(Type::Char))],
            return_type: Some(Type::I32),
        });
        let text_arg = unit.arena.string("hi");
        let call = unit.arena.call("puts", vec![text_arg], Type::I32);
        let left = unit.arena.int(0);
        unit.statements.push(function(
            "main",
            Vec::new(),
            vec![Stmt::Expression(call), Stmt::Return(Some(left))],
        ));

        let config = CompilerConfig {
            annotate_ir: true,
            ..CompilerConfig::default()
        };
        let text = compile(unit, &config);
        assert!(text.starts_with("section .text\nglobal main\nextern puts\n"));
        assert!(text.contains("    ; COPY_STRING_REF"));
        assert!(text.contains("    mov rax, __str_hello_0"));
        assert!(text.contains("    call puts"));
        assert!(text.ends_with("section .data\n__str_hello_0: db \"hi\",0\n"));
    }
}
