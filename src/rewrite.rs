// This module lowers the high-level addressing forms of the typed tree to frame-pointer
// arithmetic. Every named variable becomes a dereference of (frame pointer - offset); struct
// field access folds the field offset into that literal when the base is such a frame slot, or
// adds it to the base address otherwise; chains of array indexing are flattened into one offset
// computation (a single constant when every index is a literal, otherwise an index sum that is
// sign-extended to 64 bits and added to the base address). Arrays used as values decay to the
// address of their first element. The rewriter walks statements with a ScopeCursor that opens
// scopes at the same statements as the layout pass, so variable lookups see exactly the scopes
// the offsets were assigned in. New nodes are appended to the unit's arena; a node whose
// children did not change is returned as-is, which makes the pass idempotent on lowered trees.
// Source errors are recorded in the DiagnosticSink and the offending node is left untouched.

//! Tree rewriter: named access to canonical frame addressing.

use crate::ast::{BinaryOp, ExprArena, ExprId, ExprKind, SourcePos, Stmt, Type, Unit};
use crate::core::{DiagnosticKind, DiagnosticSink};
use crate::symbols::{Declarations, ScopeCursor, SymbolTable};

/// Rewrite every statement of `unit` in place.
pub fn rewrite_unit(
    unit: &mut Unit,
    symbols: &SymbolTable,
    decls: &Declarations,
    sink: &mut DiagnosticSink,
) {
    let statements = std::mem::take(&mut unit.statements);
    let mut rewriter = Rewriter::new(&mut unit.arena, symbols, decls, sink);
    unit.statements = rewriter.rewrite_statements(statements);
    log::debug!(
        "Rewrote {}: arena grew to {} nodes",
        unit.name,
        unit.arena.len()
    );
}

/// Offset `k` if `id` is the canonical frame slot `*(fp - k)`.
pub fn frame_slot_offset(arena: &ExprArena, id: ExprId) -> Option<i64> {
    let ExprKind::ValueFromPointer(addr) = arena.kind(id) else {
        return None;
    };
    frame_address_offset(arena, *addr)
}

/// Offset `k` if `id` is the frame address `fp - k`.
pub fn frame_address_offset(arena: &ExprArena, id: ExprId) -> Option<i64> {
    match arena.kind(id) {
        ExprKind::Operation {
            left,
            op: BinaryOp::Sub,
            right,
        } => match (arena.kind(*left), arena.kind(*right)) {
            (ExprKind::FramePointer, ExprKind::Literal(k)) => Some(*k),
            _ => None,
        },
        _ => None,
    }
}

pub struct Rewriter<'a> {
    arena: &'a mut ExprArena,
    symbols: &'a SymbolTable,
    decls: &'a Declarations,
    sink: &'a mut DiagnosticSink,
    cursor: ScopeCursor,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        arena: &'a mut ExprArena,
        symbols: &'a SymbolTable,
        decls: &'a Declarations,
        sink: &'a mut DiagnosticSink,
    ) -> Self {
        Self {
            arena,
            symbols,
            decls,
            sink,
            cursor: ScopeCursor::new(),
        }
    }

    /// Open the next child scope, as entering a function or block would.
    pub fn enter_scope(&mut self) {
        self.cursor.enter();
    }

    pub fn exit_scope(&mut self) {
        self.cursor.exit();
    }

    pub fn rewrite_statements(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        stmts.into_iter().map(|stmt| self.rewrite_stmt(stmt)).collect()
    }

    pub fn rewrite_stmt(&mut self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::Function(mut def) => {
                self.cursor.enter();
                def.body = self.rewrite_statements(std::mem::take(&mut def.body));
                self.cursor.exit();
                Stmt::Function(def)
            }
            Stmt::VarInit {
                name,
                ty,
                value: Some(value),
                pos,
            } => {
                let target = self.arena.push_at(ExprKind::VarCall(name), ty.clone(), pos);
                let target = self.expr(target, true);
                let value = self.expr(value, false);
                Stmt::Expression(
                    self.arena
                        .push_at(ExprKind::Assignment { target, value }, ty, pos),
                )
            }
            Stmt::VarInit { value: None, .. } => Stmt::Empty,
            Stmt::If { cond, then, else_ } => Stmt::If {
                cond: self.rewrite_expr(cond),
                then: Box::new(self.rewrite_stmt(*then)),
                else_: else_.map(|stmt| Box::new(self.rewrite_stmt(*stmt))),
            },
            Stmt::While { cond, body } => Stmt::While {
                cond: self.rewrite_expr(cond),
                body: Box::new(self.rewrite_stmt(*body)),
            },
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.cursor.enter();
                let init = Box::new(self.rewrite_stmt(*init));
                let cond = self.rewrite_expr(cond);
                let step = Box::new(self.rewrite_stmt(*step));
                let body = Box::new(self.rewrite_stmt(*body));
                self.cursor.exit();
                Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                }
            }
            Stmt::Block(stmts) => {
                self.cursor.enter();
                let stmts = self.rewrite_statements(stmts);
                self.cursor.exit();
                Stmt::Block(stmts)
            }
            Stmt::Return(value) => Stmt::Return(value.map(|value| self.rewrite_expr(value))),
            Stmt::Expression(value) => Stmt::Expression(self.rewrite_expr(value)),
            other @ (Stmt::Struct(_)
            | Stmt::Import { .. }
            | Stmt::ExternFunction { .. }
            | Stmt::Empty) => other,
        }
    }

    /// Rewrite an expression evaluated for its value.
    pub fn rewrite_expr(&mut self, id: ExprId) -> ExprId {
        self.expr(id, false)
    }

    fn push(&mut self, kind: ExprKind, ty: Type, pos: Option<SourcePos>) -> ExprId {
        self.arena.push_at(kind, ty, pos)
    }

    fn literal(&mut self, value: i64, ty: Type) -> ExprId {
        self.arena.literal(value, ty)
    }

    /// `*(fp - offset)` typed `ty`.
    fn frame_slot(&mut self, offset: i64, ty: Type, pos: Option<SourcePos>) -> ExprId {
        let fp = self.arena.frame_pointer();
        let k = self.literal(offset, Type::I64);
        let addr = self.push(
            ExprKind::Operation {
                left: fp,
                op: BinaryOp::Sub,
                right: k,
            },
            Type::I64,
            pos,
        );
        self.push(ExprKind::ValueFromPointer(addr), ty, pos)
    }

    /// `*(base - delta)` typed `ty`.
    fn offset_from(&mut self, base: ExprId, delta: i64, ty: Type, pos: Option<SourcePos>) -> ExprId {
        let k = self.literal(delta, Type::I64);
        let addr = self.push(
            ExprKind::Operation {
                left: base,
                op: BinaryOp::Sub,
                right: k,
            },
            Type::I64,
            pos,
        );
        self.push(ExprKind::ValueFromPointer(addr), ty, pos)
    }

    /// Address of a lowered place.
    ///
    /// Frame slots keep the `&*(fp - k)` shape; any other `*addr` collapses
    /// to `addr` itself.
    fn address_of(&mut self, place: ExprId, pos: Option<SourcePos>) -> ExprId {
        let pointer = Type::pointer_to(self.arena.ty(place).clone());
        match self.arena.kind(place).clone() {
            ExprKind::ValueFromPointer(addr) if frame_address_offset(self.arena, addr).is_none() => {
                if self.arena.ty(addr) == &pointer {
                    return addr;
                }
                let kind = self.arena.kind(addr).clone();
                self.push(kind, pointer, pos)
            }
            _ => self.push(ExprKind::PointerGet(place), pointer, pos),
        }
    }

    /// Decay an array-typed place used as a value to a pointer to its first element.
    fn decay(&mut self, place: ExprId, pos: Option<SourcePos>) -> ExprId {
        let Type::Array(element, _) = self.arena.ty(place).clone() else {
            return place;
        };
        let element_place = match self.arena.kind(place).clone() {
            ExprKind::ValueFromPointer(addr) => {
                self.push(ExprKind::ValueFromPointer(addr), *element, pos)
            }
            _ => return place,
        };
        self.address_of(element_place, pos)
    }

    fn expr(&mut self, id: ExprId, place: bool) -> ExprId {
        let node = self.arena.get(id).clone();
        let pos = node.pos;

        match node.kind {
            ExprKind::Literal(_) | ExprKind::FramePointer | ExprKind::StringLiteral(_) => id,
            ExprKind::VarCall(name) => {
                let Some(var) = self.symbols.lookup(self.cursor.path(), &name) else {
                    self.sink
                        .error(pos, DiagnosticKind::UndeclaredVariable { name });
                    return id;
                };
                let (offset, ty) = (var.offset, var.ty.clone());
                let slot = self.frame_slot(offset, ty, pos);
                if place {
                    slot
                } else {
                    self.decay(slot, pos)
                }
            }
            ExprKind::Grouping(inner) => self.expr(inner, place),
            ExprKind::Operation { left, op, right } => {
                let (l, r) = (self.expr(left, false), self.expr(right, false));
                if (l, r) == (left, right) {
                    return id;
                }
                self.push(ExprKind::Operation { left: l, op, right: r }, node.ty, pos)
            }
            ExprKind::Comparison { left, op, right } => {
                let (l, r) = (self.expr(left, false), self.expr(right, false));
                if (l, r) == (left, right) {
                    return id;
                }
                self.push(ExprKind::Comparison { left: l, op, right: r }, node.ty, pos)
            }
            ExprKind::Logical { left, op, right } => {
                let (l, r) = (self.expr(left, false), self.expr(right, false));
                if (l, r) == (left, right) {
                    return id;
                }
                self.push(ExprKind::Logical { left: l, op, right: r }, node.ty, pos)
            }
            ExprKind::Assignment { target, value } => {
                let (t, v) = (self.expr(target, true), self.expr(value, false));
                if (t, v) == (target, value) {
                    return id;
                }
                self.push(ExprKind::Assignment { target: t, value: v }, node.ty, pos)
            }
            ExprKind::Unary { op, operand } => {
                let inner = self.expr(operand, false);
                if inner == operand {
                    return id;
                }
                self.push(ExprKind::Unary { op, operand: inner }, node.ty, pos)
            }
            ExprKind::ExtendTo64Bit(inner) => {
                let lowered = self.expr(inner, false);
                if lowered == inner {
                    return id;
                }
                self.push(ExprKind::ExtendTo64Bit(lowered), node.ty, pos)
            }
            ExprKind::ValueFromPointer(inner) => {
                let lowered = self.expr(inner, false);
                if lowered == inner {
                    return id;
                }
                self.push(ExprKind::ValueFromPointer(lowered), node.ty, pos)
            }
            ExprKind::PointerGet(inner) => {
                let lowered = self.expr(inner, true);
                if lowered == inner {
                    return id;
                }
                self.address_of(lowered, pos)
            }
            ExprKind::Call { callee, args } => {
                let lowered: Vec<ExprId> = args.iter().map(|arg| self.expr(*arg, false)).collect();
                if lowered == args {
                    return id;
                }
                self.push(
                    ExprKind::Call {
                        callee,
                        args: lowered,
                    },
                    node.ty,
                    pos,
                )
            }
            ExprKind::InstanceGet { base, field } => {
                let lowered = self.instance_get(id, base, &field, node.ty, pos);
                if place {
                    lowered
                } else {
                    self.decay(lowered, pos)
                }
            }
            ExprKind::ArrayGet { .. } => {
                let lowered = self.array_get(id);
                if place {
                    lowered
                } else {
                    self.decay(lowered, pos)
                }
            }
        }
    }

    fn instance_get(
        &mut self,
        id: ExprId,
        base: ExprId,
        field: &str,
        ty: Type,
        pos: Option<SourcePos>,
    ) -> ExprId {
        let base_ty = self.arena.ty(base).clone();
        let (struct_name, through_pointer) = match &base_ty {
            Type::Struct(name) => (name.clone(), false),
            Type::Pointer(inner) => match inner.as_ref() {
                Type::Struct(name) => (name.clone(), true),
                other => {
                    self.sink.error(
                        pos,
                        DiagnosticKind::NotAStruct {
                            ty: other.to_string(),
                        },
                    );
                    return id;
                }
            },
            other => {
                self.sink.error(
                    pos,
                    DiagnosticKind::NotAStruct {
                        ty: other.to_string(),
                    },
                );
                return id;
            }
        };

        let Some(layout) = self.decls.field(&struct_name, field) else {
            self.sink.error(
                pos,
                DiagnosticKind::UnknownField {
                    struct_name,
                    field: field.to_string(),
                },
            );
            return id;
        };
        let offset = layout.offset as i64;

        if through_pointer {
            let pointer = self.expr(base, false);
            return self.offset_from(pointer, -offset, ty, pos);
        }

        let lowered = self.expr(base, true);
        if let Some(k) = frame_slot_offset(self.arena, lowered) {
            return self.frame_slot(k - offset, ty, pos);
        }
        match self.arena.kind(lowered).clone() {
            ExprKind::ValueFromPointer(addr) => self.offset_from(addr, -offset, ty, pos),
            _ => {
                self.sink.error(
                    pos,
                    DiagnosticKind::UnsupportedAddressing {
                        reason: format!("field `{}` of a value that is not stored in memory", field),
                    },
                );
                id
            }
        }
    }

    fn array_get(&mut self, id: ExprId) -> ExprId {
        let pos = self.arena.pos(id);
        let result_ty = self.arena.ty(id).clone();

        // Collect the chain outermost first, stopping at the first base that
        // is not itself an array.
        let mut gets = Vec::new();
        let mut through_pointer = false;
        let mut cur = id;
        while let ExprKind::ArrayGet { base, index } = self.arena.kind(cur).clone() {
            let len = self.decls.size_of(self.arena.ty(cur)) as i64;
            gets.push((index, len));
            cur = base;
            match self.arena.ty(base) {
                Type::Array(..) => {}
                Type::Pointer(_) => {
                    through_pointer = true;
                    break;
                }
                other => {
                    let ty = other.to_string();
                    self.sink.error(
                        pos,
                        DiagnosticKind::UnsupportedAddressing {
                            reason: format!("indexing a value of type `{}`", ty),
                        },
                    );
                    return id;
                }
            }
        }
        gets.reverse();

        if through_pointer {
            if gets.len() > 1 {
                self.sink.error(
                    pos,
                    DiagnosticKind::UnsupportedAddressing {
                        reason: "nested array access through a pointer".to_string(),
                    },
                );
                return id;
            }
            let (index, len) = gets[0];
            let pointer = self.expr(cur, false);
            let index = self.expr(index, false);
            if let ExprKind::Literal(value) = *self.arena.kind(index) {
                let Some(delta) = value.checked_mul(len).and_then(i64::checked_neg) else {
                    return self.offset_overflow(id, pos);
                };
                return self.offset_from(pointer, delta, result_ty, pos);
            }
            let Some(scaled) = self.scaled_index(&[(index, len)]) else {
                return self.offset_overflow(id, pos);
            };
            let addr = self.push(
                ExprKind::Operation {
                    left: pointer,
                    op: BinaryOp::Add,
                    right: scaled,
                },
                Type::I64,
                pos,
            );
            return self.push(ExprKind::ValueFromPointer(addr), result_ty, pos);
        }

        let base = self.expr(cur, true);
        let ExprKind::ValueFromPointer(base_addr) = self.arena.kind(base).clone() else {
            self.sink.error(
                pos,
                DiagnosticKind::UnsupportedAddressing {
                    reason: "indexing an array that is not stored in memory".to_string(),
                },
            );
            return id;
        };

        let indices: Vec<(ExprId, i64)> = gets
            .iter()
            .map(|&(index, len)| (self.expr(index, false), len))
            .collect();

        // Outer None: some index is not a literal. Inner None: the sum overflows.
        let literal_sum = indices.iter().try_fold(Some(0i64), |sum, &(index, len)| {
            match *self.arena.kind(index) {
                ExprKind::Literal(value) => {
                    Some(sum.and_then(|sum| value.checked_mul(len)?.checked_add(sum)))
                }
                _ => None,
            }
        });

        if let Some(sum) = literal_sum {
            let Some(sum) = sum else {
                return self.offset_overflow(id, pos);
            };
            if let Some(k) = frame_address_offset(self.arena, base_addr) {
                let Some(offset) = k.checked_sub(sum) else {
                    return self.offset_overflow(id, pos);
                };
                return self.frame_slot(offset, result_ty, pos);
            }
            let Some(delta) = sum.checked_neg() else {
                return self.offset_overflow(id, pos);
            };
            return self.offset_from(base_addr, delta, result_ty, pos);
        }

        let Some(scaled) = self.scaled_index(&indices) else {
            return self.offset_overflow(id, pos);
        };
        let addr = self.push(
            ExprKind::Operation {
                left: base_addr,
                op: BinaryOp::Add,
                right: scaled,
            },
            Type::I64,
            pos,
        );
        self.push(ExprKind::ValueFromPointer(addr), result_ty, pos)
    }

    fn offset_overflow(&mut self, id: ExprId, pos: Option<SourcePos>) -> ExprId {
        self.sink.error(
            pos,
            DiagnosticKind::UnsupportedAddressing {
                reason: "constant index overflows the address offset".to_string(),
            },
        );
        id
    }

    /// `e(Σ index_i * len_i)`, summed right to left, or None when a literal
    /// term overflows.
    ///
    /// Terms of differing index widths are extended one by one before the
    /// sum so that every addition works on equally wide operands.
    fn scaled_index(&mut self, indices: &[(ExprId, i64)]) -> Option<ExprId> {
        let first_ty = indices
            .first()
            .map(|&(index, _)| self.arena.ty(index).clone())
            .unwrap_or(Type::I64);
        let uniform = indices
            .iter()
            .all(|&(index, _)| self.arena.ty(index) == &first_ty);

        let mut terms = Vec::with_capacity(indices.len());
        for &(index, len) in indices {
            let ty = self.arena.ty(index).clone();
            let term = match *self.arena.kind(index) {
                ExprKind::Literal(value) => self.literal(value.checked_mul(len)?, ty.clone()),
                _ => {
                    let len = self.literal(len, ty.clone());
                    self.arena.binary(index, BinaryOp::Mul, len)
                }
            };
            terms.push(if uniform { term } else { self.arena.extend(term) });
        }

        let sum_ty = if uniform { first_ty } else { Type::I64 };
        let mut sum = match terms.pop() {
            Some(last) => last,
            None => return Some(self.literal(0, Type::I64)),
        };
        while let Some(term) = terms.pop() {
            sum = self.push(
                ExprKind::Operation {
                    left: term,
                    op: BinaryOp::Add,
                    right: sum,
                },
                sum_ty.clone(),
                None,
            );
        }

        if uniform {
            Some(self.arena.extend(sum))
        } else {
            Some(sum)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FunctionDef, Param, StructDef};
    use crate::symbols::layout_unit;

    fn compile_body(unit: &mut Unit, decls: &Declarations, body: Vec<Stmt>) -> DiagnosticSink {
        unit.statements.push(Stmt::Function(FunctionDef {
            name: "main".into(),
            params: vec![],
            return_type: None,
            body,
            pos: None,
        }));
        let mut sink = DiagnosticSink::new("test");
        let table = layout_unit(unit, decls, &mut sink).unwrap();
        rewrite_unit(unit, &table, decls, &mut sink);
        sink
    }

    fn body(unit: &Unit) -> &[Stmt] {
        match &unit.statements[0] {
            Stmt::Function(def) => &def.body,
            _ => panic!("expected function"),
        }
    }

    fn declare(name: &str, ty: Type) -> Stmt {
        Stmt::VarInit {
            name: name.into(),
            ty,
            value: None,
            pos: None,
        }
    }

    #[test]
    fn test_variable_read_becomes_frame_slot() {
        let mut unit = Unit::new("t");
        let x = unit.arena.var("x", Type::I32);
        let decls = Declarations::new();
        let sink = compile_body(
            &mut unit,
            &decls,
            vec![
                declare("y", Type::I64),
                declare("x", Type::I32),
                Stmt::Expression(x),
            ],
        );
        assert!(!sink.has_errors());

        let Stmt::Expression(lowered) = body(&unit)[2] else {
            panic!("expected expression");
        };
        assert_eq!(frame_slot_offset(&unit.arena, lowered), Some(12));
        assert_eq!(unit.arena.ty(lowered), &Type::I32);
        assert_eq!(body(&unit)[0], Stmt::Empty);
    }

    #[test]
    fn test_initializer_becomes_assignment() {
        let mut unit = Unit::new("t");
        let five = unit.arena.int(5);
        let decls = Declarations::new();
        let sink = compile_body(
            &mut unit,
            &decls,
            vec![Stmt::VarInit {
                name: "x".into(),
                ty: Type::I32,
                value: Some(five),
                pos: None,
            }],
        );
        assert!(!sink.has_errors());

        let Stmt::Expression(assign) = body(&unit)[0] else {
            panic!("expected expression");
        };
        let ExprKind::Assignment { target, value } = unit.arena.kind(assign).clone() else {
            panic!("expected assignment");
        };
        assert_eq!(frame_slot_offset(&unit.arena, target), Some(4));
        assert_eq!(value, five);
    }

    #[test]
    fn test_struct_field_folds_into_offset() {
        let mut unit = Unit::new("t");
        let mut decls = Declarations::new();
        let mut sink = DiagnosticSink::new("t");
        decls.define_struct(
            &StructDef {
                name: "Point".into(),
                fields: vec![Param::new("x", Type::I32), Param::new("y", Type::I32)],
                pos: None,
            },
            &mut sink,
        );

        let p = unit.arena.var("p", Type::Struct("Point".into()));
        let y = unit.arena.field(p, "y", Type::I32);
        let sink = compile_body(
            &mut unit,
            &decls,
            vec![declare("p", Type::Struct("Point".into())), Stmt::Expression(y)],
        );
        assert!(!sink.has_errors());

        let Stmt::Expression(lowered) = body(&unit)[1] else {
            panic!("expected expression");
        };
        // p occupies [rbp - 8, rbp); y sits 4 bytes in.
        assert_eq!(frame_slot_offset(&unit.arena, lowered), Some(4));
    }

    #[test]
    fn test_literal_indices_collapse() {
        let mut unit = Unit::new("t");
        let grid = Type::array_of(Type::array_of(Type::I32, 3), 2);
        let a = unit.arena.var("a", grid.clone());
        let one = unit.arena.int(1);
        let two = unit.arena.int(2);
        let row = unit.arena.index(a, one);
        let cell = unit.arena.index(row, two);
        let decls = Declarations::new();
        let sink = compile_body(
            &mut unit,
            &decls,
            vec![declare("a", grid), Stmt::Expression(cell)],
        );
        assert!(!sink.has_errors());

        let Stmt::Expression(lowered) = body(&unit)[1] else {
            panic!("expected expression");
        };
        // 24 - (1 * 12 + 2 * 4)
        assert_eq!(frame_slot_offset(&unit.arena, lowered), Some(4));
    }

    #[test]
    fn test_undeclared_variable() {
        let mut unit = Unit::new("t");
        let ghost = unit.arena.var("ghost", Type::I32);
        unit.arena.at(ghost, 2, 7);
        let decls = Declarations::new();
        let sink = compile_body(&mut unit, &decls, vec![Stmt::Expression(ghost)]);
        assert_eq!(
            sink.diagnostics()[0].to_string(),
            "Error [2:7]: undeclared variable `ghost`"
        );
    }
}
