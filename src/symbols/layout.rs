//! Frame layout pass.
//!
//! Builds a unit's [`SymbolTable`]: every function opens a scope holding its
//! parameters and top-level variables, and every block and for-loop opens a
//! nested one. Offsets grow by each variable's length in declaration order and
//! restart at zero for every function. Parameters past the sixth are passed on
//! the stack and live above the return address. Source problems go to the
//! sink; a scope path the table cannot resolve is an internal error.

use crate::ast::{ExprArena, ExprId, ExprKind, FunctionDef, SourcePos, Stmt, Type, Unit};
use crate::core::{CompileResult, DiagnosticKind, DiagnosticSink, InternalError};

use super::{Declarations, ScopeCursor, SymbolTable, VarSymbol};

/// Number of parameters passed in registers.
pub const REGISTER_PARAMS: usize = 6;

/// Lay out every function of `unit`, reporting problems to `sink`.
pub fn layout_unit(
    unit: &Unit,
    decls: &Declarations,
    sink: &mut DiagnosticSink,
) -> CompileResult<SymbolTable> {
    let mut layout = FrameLayout {
        arena: &unit.arena,
        decls,
        sink,
        table: SymbolTable::new(),
        cursor: ScopeCursor::new(),
        running: 0,
    };

    for stmt in &unit.statements {
        match stmt {
            Stmt::Function(def) => layout.function(def)?,
            Stmt::Struct(_) | Stmt::Import { .. } | Stmt::ExternFunction { .. } | Stmt::Empty => {}
            Stmt::VarInit { pos, .. } => layout.sink.error(*pos, DiagnosticKind::TopLevelStatement),
            _ => layout.sink.error(None, DiagnosticKind::TopLevelStatement),
        }
    }

    Ok(layout.table)
}

struct FrameLayout<'a> {
    arena: &'a ExprArena,
    decls: &'a Declarations,
    sink: &'a mut DiagnosticSink,
    table: SymbolTable,
    cursor: ScopeCursor,
    running: i64,
}

impl<'a> FrameLayout<'a> {
    /// Open a child scope in the table and enter it; both must number it alike.
    fn open_scope(&mut self) -> CompileResult<()> {
        let added = self.table.add_scope_at(self.cursor.path());
        self.cursor.enter();
        if added.is_none() || added != self.cursor.path().last().copied() {
            return Err(InternalError::RewriteInvariant {
                reason: format!(
                    "scope {:?} is not child {:?} of the symbol table",
                    self.cursor.path(),
                    added
                ),
            }
            .into());
        }
        Ok(())
    }

    fn function(&mut self, def: &FunctionDef) -> CompileResult<()> {
        self.open_scope()?;
        self.running = 0;

        for (index, param) in def.params.iter().enumerate() {
            if param.ty.is_struct() {
                self.sink.error(
                    def.pos,
                    DiagnosticKind::StructParameter {
                        name: param.name.clone(),
                    },
                );
                continue;
            }
            let size = self.decls.size_of(&param.ty);
            self.running += size as i64;
            let offset = if index < REGISTER_PARAMS {
                self.running
            } else {
                -16 - 8 * (index - REGISTER_PARAMS) as i64
            };
            self.define(&param.name, &param.ty, offset, size)?;
        }

        for stmt in &def.body {
            self.stmt(stmt)?;
        }
        log::trace!(
            "Laid out {}: {} bytes of locals",
            def.name,
            self.table.offset_total_for_scope(self.cursor.path())
        );
        self.cursor.exit();
        Ok(())
    }

    fn define(&mut self, name: &str, ty: &Type, offset: i64, size: u32) -> CompileResult<()> {
        let path = self.cursor.path().to_vec();
        let defined = self.table.define_variable(
            &path,
            VarSymbol {
                name: name.to_string(),
                ty: ty.clone(),
                offset,
                size,
            },
        );
        if !defined {
            return Err(InternalError::RewriteInvariant {
                reason: format!("no scope {:?} for `{}`", path, name),
            }
            .into());
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::VarInit {
                name,
                ty,
                value,
                pos,
            } => {
                if let Some(value) = value {
                    self.expr(*value);
                }
                self.check_type(ty, *pos);
                let size = self.decls.size_of(ty);
                self.running += size as i64;
                let offset = self.running;
                self.define(name, ty, offset, size)?;
            }
            Stmt::Block(stmts) => {
                self.open_scope()?;
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
                self.cursor.exit();
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.open_scope()?;
                self.stmt(init)?;
                self.expr(*cond);
                self.stmt(step)?;
                self.stmt(body)?;
                self.cursor.exit();
            }
            Stmt::If { cond, then, else_ } => {
                self.expr(*cond);
                self.stmt(then)?;
                if let Some(else_) = else_ {
                    self.stmt(else_)?;
                }
            }
            Stmt::While { cond, body } => {
                self.expr(*cond);
                self.stmt(body)?;
            }
            Stmt::Return(Some(value)) | Stmt::Expression(value) => self.expr(*value),
            Stmt::Return(None)
            | Stmt::Function(_)
            | Stmt::Struct(_)
            | Stmt::Import { .. }
            | Stmt::ExternFunction { .. }
            | Stmt::Empty => {}
        }
        Ok(())
    }

    fn check_type(&mut self, ty: &Type, pos: Option<SourcePos>) {
        match ty {
            Type::Struct(name) if self.decls.struct_fields(name).is_none() => {
                self.sink
                    .error(pos, DiagnosticKind::UnknownStruct { name: name.clone() });
            }
            Type::Array(inner, _) | Type::Pointer(inner) => self.check_type(inner, pos),
            _ => {}
        }
    }

    /// Check every call in an expression against the declared signatures.
    fn expr(&mut self, id: ExprId) {
        let arena = self.arena;
        if let ExprKind::Call { callee, args } = arena.kind(id) {
            match self.decls.function(callee) {
                None => self.sink.error(
                    arena.pos(id),
                    DiagnosticKind::UnknownFunction {
                        name: callee.clone(),
                    },
                ),
                Some(sig) if sig.params.len() != args.len() => self.sink.error(
                    arena.pos(id),
                    DiagnosticKind::ArgumentCount {
                        name: callee.clone(),
                        expected: sig.params.len(),
                        found: args.len(),
                    },
                ),
                Some(_) => {}
            }
            for arg in args {
                self.expr(*arg);
            }
            return;
        }
        for child in arena.operands(id) {
            self.expr(child);
        }
    }
}
