// This module declares the instruction-selection rule table. A Rule pairs a tree pattern with
// the non-terminal it reduces to, a base cost, an optional guard that can reject a node the
// pattern matches structurally (scalar-only moves, scaled-index addressing limited to scales
// 1, 2, 4 and 8) and an emission function. Emission functions receive the pattern's leaves
// already bound in pre-order: register leaves as the RegRef their subtree was reduced to,
// literal leaves as their value, call and string leaves as the node itself. They emit IR
// through a RuleContext and return the register that holds the rule's result. Arithmetic is
// two-address: the left register is modified and returned. Declaration order matters twice:
// rule indices key the automaton's accepting table, and among equally cheap covers the rule
// declared first wins.

//! Instruction-selection rules.

use std::fmt;

use crate::ast::{BinaryOp, ExprArena, ExprId, ExprKind, Type};
use crate::core::{CompileResult, InternalError};
use crate::ir::{IrOpcode, IrValue, Operand, TempReg};
use crate::symbols::layout::REGISTER_PARAMS;
use crate::symbols::Declarations;

use super::pattern::{Pattern, REG};

/// A temporary holding a selected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegRef {
    pub index: u32,
    pub ty: Type,
}

impl RegRef {
    pub fn operand(&self) -> Operand {
        Operand::Temp(self.temp())
    }

    pub fn temp(&self) -> TempReg {
        TempReg::new(self.index)
    }

    fn retyped(&self, ty: Type) -> Self {
        Self {
            index: self.index,
            ty,
        }
    }
}

impl fmt::Display for RegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}:{}", self.index, self.ty)
    }
}

/// A pattern leaf bound during emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Reg(RegRef),
    Lit(i64),
    Node(ExprId),
}

/// What an emission function may do.
pub trait RuleContext {
    fn arena(&self) -> &ExprArena;

    fn decls(&self) -> &Declarations;

    /// Reduce `id` to a register using its cheapest cover.
    fn reduce(&mut self, id: ExprId) -> CompileResult<RegRef>;

    fn fresh(&mut self, ty: Type) -> RegRef;

    fn emit(&mut self, ir: IrValue);

    /// Data label of a string literal of the current unit.
    fn string_label(&mut self, text: &str) -> String;
}

pub type Guard = fn(&ExprArena, ExprId) -> bool;

pub type EmitFn = fn(&mut dyn RuleContext, ExprId, &[Bound]) -> CompileResult<RegRef>;

pub struct Rule {
    pub name: &'static str,
    pub pattern: Pattern,
    pub result: char,
    pub cost: u32,
    pub guard: Option<Guard>,
    pub emit: EmitFn,
}

impl Rule {
    fn new(name: &'static str, pattern: Pattern, cost: u32, emit: EmitFn) -> Self {
        Self {
            name,
            pattern,
            result: REG,
            cost,
            guard: None,
            emit,
        }
    }

    fn guarded(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {}, {})", self.name, self.pattern, self.result, self.cost)
    }
}

/// The rule table in declaration order.
pub fn standard_rules() -> Vec<Rule> {
    use BinaryOp::*;
    use Pattern as P;

    vec![
        Rule::new("PlusRegReg", P::binary(Add, P::Reg, P::Reg), 2, emit_plus_reg_reg),
        Rule::new("PlusRegLit", P::binary(Add, P::Reg, P::Literal), 2, emit_plus_reg_lit),
        Rule::new("PlusLitReg", P::binary(Add, P::Literal, P::Reg), 2, emit_plus_lit_reg),
        Rule::new("MulLitReg", P::binary(Mul, P::Literal, P::Reg), 3, emit_mul_lit_reg),
        Rule::new("MulRegLit", P::binary(Mul, P::Reg, P::Literal), 2, emit_mul_reg_lit),
        Rule::new("MulRegReg", P::binary(Mul, P::Reg, P::Reg), 2, emit_mul_reg_reg),
        Rule::new("SubRegLit", P::binary(Sub, P::Reg, P::Literal), 2, emit_sub_reg_lit),
        Rule::new("SubRegReg", P::binary(Sub, P::Reg, P::Reg), 2, emit_sub_reg_reg),
        Rule::new("DivRegReg", P::binary(Div, P::Reg, P::Reg), 3, emit_div_reg_reg),
        Rule::new(
            "MovOffsetToOffset",
            P::assign(P::frame_slot(), P::frame_slot()),
            2,
            emit_mov_offset_to_offset,
        )
        .guarded(scalar_or_struct),
        Rule::new("ValueFromPointer", P::deref(P::Reg), 2, emit_value_from_pointer)
            .guarded(scalar),
        Rule::new("MovRegToReg", P::assign(P::Reg, P::Reg), 1, emit_mov_reg_to_reg)
            .guarded(register_target),
        Rule::new(
            "MovPointerRegToReg",
            P::assign(P::deref(P::Reg), P::Reg),
            2,
            emit_mov_pointer_reg_to_reg,
        )
        .guarded(scalar),
        Rule::new("ExtendTo64Bits", P::extend(P::Reg), 1, emit_extend),
        Rule::new("FramePointer", P::FramePointer, 1, emit_frame_pointer),
        Rule::new(
            "MovOffsetToReg",
            P::assign(P::frame_slot(), P::Reg),
            2,
            emit_mov_offset_to_reg,
        )
        .guarded(scalar),
        Rule::new("MovFromFpOffset", P::frame_slot(), 2, emit_mov_from_fp_offset)
            .guarded(scalar),
        Rule::new("ComparisonRegReg", P::compare(P::Reg, P::Reg), 1, emit_compare),
        Rule::new(
            "MovFromRegOffset",
            P::deref(P::binary(Sub, P::Reg, P::Literal)),
            2,
            emit_mov_from_reg_offset,
        )
        .guarded(scalar),
        Rule::new(
            "MovFromRegOffsetWithAdder",
            P::deref(P::binary(
                Add,
                P::binary(Sub, P::FramePointer, P::Literal),
                P::extend(P::binary(Mul, P::Reg, P::Literal)),
            )),
            3,
            emit_mov_from_scaled_index,
        )
        .guarded(scaled_index),
        Rule::new("Negate", P::negate(P::Reg), 1, emit_negate),
        Rule::new(
            "MovOffsetToValueFromPointerOffset",
            P::assign(P::frame_slot(), P::deref(P::frame_slot())),
            2,
            emit_mov_offset_to_pointee,
        )
        .guarded(scalar_or_struct),
        Rule::new("PointerGet", P::address_of(P::frame_slot()), 2, emit_pointer_get),
        Rule::new("Call", P::Call, 1, emit_call),
        Rule::new("LiteralToReg", P::Literal, 1, emit_literal),
        Rule::new("StringLiteralToReg", P::StringLiteral, 1, emit_string_literal),
    ]
}

// Guards.

fn scalar(arena: &ExprArena, id: ExprId) -> bool {
    arena.ty(id).is_scalar()
}

/// A register move must not stand in for a store: a memory target reduces to
/// a register only through a load.
fn register_target(arena: &ExprArena, id: ExprId) -> bool {
    if !scalar(arena, id) {
        return false;
    }
    match arena.kind(id) {
        ExprKind::Assignment { target, .. } => {
            !matches!(arena.kind(*target), ExprKind::ValueFromPointer(_))
        }
        _ => false,
    }
}

fn scalar_or_struct(arena: &ExprArena, id: ExprId) -> bool {
    let ty = arena.ty(id);
    ty.is_scalar() || ty.is_struct()
}

/// The scale literal of `L + (- f l) (e (* r l))` must be 1, 2, 4 or 8.
fn scaled_index(arena: &ExprArena, id: ExprId) -> bool {
    if !scalar(arena, id) {
        return false;
    }
    let mut node = id;
    for index in [0, 1, 0, 1] {
        match arena.operands(node).get(index) {
            Some(&child) => node = child,
            None => return false,
        }
    }
    matches!(arena.kind(node), ExprKind::Literal(1 | 2 | 4 | 8))
}

// Binding accessors.

fn reg(bound: &[Bound], at: usize) -> CompileResult<RegRef> {
    match bound.get(at) {
        Some(Bound::Reg(reg)) => Ok(reg.clone()),
        other => Err(binding_error("register", at, other)),
    }
}

fn lit(bound: &[Bound], at: usize) -> CompileResult<i64> {
    match bound.get(at) {
        Some(Bound::Lit(value)) => Ok(*value),
        other => Err(binding_error("literal", at, other)),
    }
}

fn node(bound: &[Bound], at: usize) -> CompileResult<ExprId> {
    match bound.get(at) {
        Some(Bound::Node(id)) => Ok(*id),
        other => Err(binding_error("node", at, other)),
    }
}

fn binding_error(expected: &str, at: usize, found: Option<&Bound>) -> crate::core::CompileError {
    InternalError::Unreachable {
        reason: format!("expected {} binding at {}, found {:?}", expected, at, found),
    }
    .into()
}

/// Scalar type a node's value is handled at.
fn value_type(ctx: &dyn RuleContext, id: ExprId) -> Type {
    let ty = ctx.arena().ty(id);
    if ty.is_scalar() {
        ty.clone()
    } else {
        Type::I64
    }
}

fn binary_op(
    ctx: &mut dyn RuleContext,
    id: ExprId,
    opcode: IrOpcode,
    left: RegRef,
    right: Operand,
) -> RegRef {
    let ty = value_type(ctx, id);
    ctx.emit(IrValue::binary(opcode, left.operand(), right, ty.clone()));
    left.retyped(ty)
}

fn unary_op(ctx: &mut dyn RuleContext, id: ExprId, opcode: IrOpcode, reg: RegRef) -> RegRef {
    let ty = value_type(ctx, id);
    ctx.emit(IrValue::unary(opcode, reg.operand(), ty.clone()));
    reg.retyped(ty)
}

// Arithmetic.

fn emit_plus_reg_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let right = reg(bound, 1)?.operand();
    Ok(binary_op(ctx, id, IrOpcode::Plus, reg(bound, 0)?, right))
}

fn emit_plus_reg_lit(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let left = reg(bound, 0)?;
    match lit(bound, 1)? {
        1 => Ok(unary_op(ctx, id, IrOpcode::Inc, left)),
        value => Ok(binary_op(ctx, id, IrOpcode::Plus, left, Operand::Literal(value))),
    }
}

fn emit_plus_lit_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let right = reg(bound, 1)?;
    match lit(bound, 0)? {
        1 => Ok(unary_op(ctx, id, IrOpcode::Inc, right)),
        value => Ok(binary_op(ctx, id, IrOpcode::Plus, right, Operand::Literal(value))),
    }
}

fn emit_mul_lit_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let value = lit(bound, 0)?;
    Ok(binary_op(ctx, id, IrOpcode::Mul, reg(bound, 1)?, Operand::Literal(value)))
}

fn emit_mul_reg_lit(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let left = reg(bound, 0)?;
    let result = match lit(bound, 1)? {
        1 => left.retyped(value_type(ctx, id)),
        2 => {
            let same = left.operand();
            binary_op(ctx, id, IrOpcode::Plus, left, same)
        }
        4 => binary_op(ctx, id, IrOpcode::Sal, left, Operand::Literal(2)),
        8 => binary_op(ctx, id, IrOpcode::Sal, left, Operand::Literal(3)),
        value => binary_op(ctx, id, IrOpcode::Mul, left, Operand::Literal(value)),
    };
    Ok(result)
}

fn emit_mul_reg_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let right = reg(bound, 1)?.operand();
    Ok(binary_op(ctx, id, IrOpcode::Mul, reg(bound, 0)?, right))
}

fn emit_sub_reg_lit(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let left = reg(bound, 0)?;
    match lit(bound, 1)? {
        1 => Ok(unary_op(ctx, id, IrOpcode::Dec, left)),
        value => Ok(binary_op(ctx, id, IrOpcode::Minus, left, Operand::Literal(value))),
    }
}

fn emit_sub_reg_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let right = reg(bound, 1)?.operand();
    Ok(binary_op(ctx, id, IrOpcode::Minus, reg(bound, 0)?, right))
}

fn emit_div_reg_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let right = reg(bound, 1)?.operand();
    Ok(binary_op(ctx, id, IrOpcode::Div, reg(bound, 0)?, right))
}

fn emit_negate(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    Ok(unary_op(ctx, id, IrOpcode::Negate, reg(bound, 0)?))
}

fn emit_compare(ctx: &mut dyn RuleContext, _id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let left = reg(bound, 0)?;
    let right = reg(bound, 1)?;
    ctx.emit(IrValue::binary(
        IrOpcode::Cmp,
        left.operand(),
        right.operand(),
        left.ty.clone(),
    ));
    Ok(left)
}

fn emit_extend(ctx: &mut dyn RuleContext, _id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let value = reg(bound, 0)?;
    if value.ty.scalar_width().unwrap_or(8) < 8 {
        ctx.emit(IrValue::unary(
            IrOpcode::ExtendTo64Bits,
            value.operand(),
            value.ty.clone(),
        ));
    }
    Ok(value.retyped(Type::I64))
}

// Values.

fn emit_frame_pointer(ctx: &mut dyn RuleContext, _id: ExprId, _bound: &[Bound]) -> CompileResult<RegRef> {
    let dst = ctx.fresh(Type::I64);
    ctx.emit(IrValue::binary(
        IrOpcode::Copy,
        dst.operand(),
        Operand::FramePointer,
        Type::I64,
    ));
    Ok(dst)
}

fn emit_literal(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let value = lit(bound, 0)?;
    let ty = value_type(ctx, id);
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::Copy,
        dst.operand(),
        Operand::Literal(value),
        dst.ty.clone(),
    ));
    Ok(dst)
}

fn emit_string_literal(ctx: &mut dyn RuleContext, _id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let literal = node(bound, 0)?;
    let ExprKind::StringLiteral(text) = ctx.arena().kind(literal).clone() else {
        return Err(InternalError::Unreachable {
            reason: format!("string rule bound to {}", ctx.arena().render(literal)),
        }
        .into());
    };
    let label = ctx.string_label(&text);
    let dst = ctx.fresh(Type::pointer_to(Type::Char));
    ctx.emit(IrValue::binary(
        IrOpcode::CopyStringRef,
        dst.operand(),
        Operand::Label(label),
        dst.ty.clone(),
    ));
    Ok(dst)
}

fn emit_pointer_get(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let offset = lit(bound, 0)?;
    let ty = ctx.arena().ty(id).clone();
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromRef,
        dst.operand(),
        Operand::frame_slot(offset),
        Type::I64,
    ));
    Ok(dst)
}

// Loads.

fn emit_value_from_pointer(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let pointer = reg(bound, 0)?;
    let ty = value_type(ctx, id);
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromDeref,
        dst.operand(),
        pointer.operand(),
        dst.ty.clone(),
    ));
    Ok(dst)
}

fn emit_mov_from_fp_offset(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let offset = lit(bound, 0)?;
    let ty = value_type(ctx, id);
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromFpOffset,
        dst.operand(),
        Operand::frame_slot(offset),
        dst.ty.clone(),
    ));
    Ok(dst)
}

fn emit_mov_from_reg_offset(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let base = reg(bound, 0)?;
    let offset = lit(bound, 1)?;
    let ty = value_type(ctx, id);
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromRegOffset,
        dst.operand(),
        Operand::RegOffset {
            base: base.temp(),
            offset,
        },
        dst.ty.clone(),
    ));
    Ok(dst)
}

fn emit_mov_from_scaled_index(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let offset = lit(bound, 0)?;
    let index = reg(bound, 1)?;
    let scale = lit(bound, 2)?;
    if index.ty.scalar_width().unwrap_or(8) < 8 {
        ctx.emit(IrValue::unary(
            IrOpcode::ExtendTo64Bits,
            index.operand(),
            index.ty.clone(),
        ));
    }
    let ty = value_type(ctx, id);
    let dst = ctx.fresh(ty);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromFpOffset,
        dst.operand(),
        Operand::FramePointerOffset {
            offset,
            index: Some((index.temp(), scale as u8)),
        },
        dst.ty.clone(),
    ));
    Ok(dst)
}

// Stores.

fn emit_mov_reg_to_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let target = reg(bound, 0)?;
    let value = reg(bound, 1)?;
    let ty = value_type(ctx, id);
    ctx.emit(IrValue::binary(
        IrOpcode::Copy,
        target.operand(),
        value.operand(),
        ty.clone(),
    ));
    Ok(target.retyped(ty))
}

fn emit_mov_pointer_reg_to_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let pointer = reg(bound, 0)?;
    let value = reg(bound, 1)?;
    ctx.emit(IrValue::binary(
        IrOpcode::CopyToDeref,
        pointer.operand(),
        value.operand(),
        value_type(ctx, id),
    ));
    Ok(value)
}

fn emit_mov_offset_to_reg(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let offset = lit(bound, 0)?;
    let value = reg(bound, 1)?;
    ctx.emit(IrValue::binary(
        IrOpcode::CopyToFpOffset,
        Operand::frame_slot(offset),
        value.operand(),
        value_type(ctx, id),
    ));
    Ok(value)
}

/// Split `size` bytes into 8, 4, 2 and 1 byte pieces: `(position, width)`.
pub fn split_chunks(size: u32) -> Vec<(u32, u32)> {
    let mut chunks = Vec::new();
    let mut position = 0;
    for width in [8, 4, 2, 1] {
        while size - position >= width {
            chunks.push((position, width));
            position += width;
        }
    }
    chunks
}

fn assigned_size(ctx: &dyn RuleContext, id: ExprId) -> CompileResult<u32> {
    let size = ctx.decls().size_of(ctx.arena().ty(id));
    if size == 0 {
        return Err(InternalError::Unreachable {
            reason: format!("assignment of zero-sized `{}`", ctx.arena().render(id)),
        }
        .into());
    }
    Ok(size)
}

fn chunk_type(width: u32) -> CompileResult<Type> {
    Type::int_of_width(width).ok_or_else(|| {
        InternalError::Unreachable {
            reason: format!("no integer type of width {}", width),
        }
        .into()
    })
}

fn emit_mov_offset_to_offset(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let target = lit(bound, 0)?;
    let source = lit(bound, 1)?;
    let size = assigned_size(ctx, id)?;

    let mut last = None;
    for (position, width) in split_chunks(size) {
        let ty = chunk_type(width)?;
        let chunk = ctx.fresh(ty.clone());
        ctx.emit(IrValue::binary(
            IrOpcode::CopyFromFpOffset,
            chunk.operand(),
            Operand::frame_slot(source - position as i64),
            ty.clone(),
        ));
        ctx.emit(IrValue::binary(
            IrOpcode::CopyToFpOffset,
            Operand::frame_slot(target - position as i64),
            chunk.operand(),
            ty,
        ));
        last = Some(chunk);
    }
    last.ok_or_else(|| {
        InternalError::Unreachable {
            reason: "struct copy produced no chunks".to_string(),
        }
        .into()
    })
}

fn emit_mov_offset_to_pointee(ctx: &mut dyn RuleContext, id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let target = lit(bound, 0)?;
    let pointer_slot = lit(bound, 1)?;
    let size = assigned_size(ctx, id)?;

    let pointer = ctx.fresh(Type::I64);
    ctx.emit(IrValue::binary(
        IrOpcode::CopyFromFpOffset,
        pointer.operand(),
        Operand::frame_slot(pointer_slot),
        Type::I64,
    ));

    let mut last = None;
    for (position, width) in split_chunks(size) {
        let ty = chunk_type(width)?;
        let chunk = ctx.fresh(ty.clone());
        ctx.emit(IrValue::binary(
            IrOpcode::CopyFromRegOffset,
            chunk.operand(),
            Operand::RegOffset {
                base: pointer.temp(),
                offset: -(position as i64),
            },
            ty.clone(),
        ));
        ctx.emit(IrValue::binary(
            IrOpcode::CopyToFpOffset,
            Operand::frame_slot(target - position as i64),
            chunk.operand(),
            ty,
        ));
        last = Some(chunk);
    }
    last.ok_or_else(|| {
        InternalError::Unreachable {
            reason: "struct copy produced no chunks".to_string(),
        }
        .into()
    })
}

// Calls.

fn emit_call(ctx: &mut dyn RuleContext, _id: ExprId, bound: &[Bound]) -> CompileResult<RegRef> {
    let call = node(bound, 0)?;
    let (callee, args) = match ctx.arena().kind(call) {
        ExprKind::Call { callee, args } => (callee.clone(), args.clone()),
        _ => {
            return Err(InternalError::Unreachable {
                reason: format!("call rule bound to {}", ctx.arena().render(call)),
            }
            .into())
        }
    };
    let return_type = ctx.arena().ty(call).clone();

    let stack_count = args.len().saturating_sub(REGISTER_PARAMS);
    let mut values: Vec<Option<RegRef>> = vec![None; args.len()];

    // Arguments containing calls are evaluated first, so no call runs between a stack
    // argument being pushed and the call it belongs to.
    if stack_count > 0 {
        for (position, &arg) in args.iter().enumerate() {
            if contains_call(ctx.arena(), arg) {
                values[position] = Some(ctx.reduce(arg)?);
            }
        }
    }

    // Stack arguments go onto the machine stack as soon as they are evaluated, last first.
    for position in (REGISTER_PARAMS..args.len()).rev() {
        let value = match values[position].take() {
            Some(value) => value,
            None => ctx.reduce(args[position])?,
        };
        push_arg(ctx, &value, position);
    }

    // Every register argument is evaluated before the first one is placed, so a
    // nested call cannot clobber argument registers already filled.
    let mut registers = Vec::with_capacity(args.len() - stack_count);
    for position in 0..args.len() - stack_count {
        let value = match values[position].take() {
            Some(value) => value,
            None => ctx.reduce(args[position])?,
        };
        registers.push(value);
    }
    for (position, value) in registers.iter().enumerate() {
        push_arg(ctx, value, position);
    }

    if return_type.is_scalar() {
        let dst = ctx.fresh(return_type.clone());
        ctx.emit(IrValue::binary(
            IrOpcode::Call,
            Operand::Label(callee),
            dst.operand(),
            return_type,
        ));
        Ok(dst)
    } else {
        // Procedures yield a temporary that no instruction mentions.
        ctx.emit(IrValue::unary(IrOpcode::Call, Operand::Label(callee), Type::None));
        Ok(ctx.fresh(Type::None))
    }
}

fn push_arg(ctx: &mut dyn RuleContext, value: &RegRef, position: usize) {
    ctx.emit(IrValue::binary(
        IrOpcode::PushArg,
        value.operand(),
        Operand::Literal(position as i64),
        value.ty.clone(),
    ));
}

fn contains_call(arena: &ExprArena, id: ExprId) -> bool {
    matches!(arena.kind(id), ExprKind::Call { .. })
        || arena
            .operands(id)
            .into_iter()
            .any(|operand| contains_call(arena, operand))
}
