//! Register allocation invariants on selected code.

use bumpalo::Bump;
use cubec::ast::{BinaryOp, ExprArena, ExprId, ExprKind, Type};
use cubec::codegen::{AsmEmitter, StringLiterals};
use cubec::core::CompilationSession;
use cubec::ir::{IrOpcode, IrValue, Operand};
use cubec::regalloc::{Allocation, LinearScan};
use cubec::select::{RegRef, SelectionOutput, Selector, TempCounter};
use cubec::symbols::Declarations;
use hashbrown::HashMap;

fn select(arena: &ExprArena, root: ExprId) -> (RegRef, Vec<IrValue>) {
    let bump = Bump::new();
    let session = CompilationSession::new(&bump);
    let mut strings = StringLiterals::new(&session, "regalloc");
    let mut emitter = AsmEmitter::new();
    let mut temps = TempCounter::new();
    let mut out = SelectionOutput {
        emitter: &mut emitter,
        strings: &mut strings,
        temps: &mut temps,
    };
    let reg = Selector::new()
        .select(arena, &Declarations::new(), root, &mut out)
        .unwrap();
    (reg, emitter.take_ir())
}

fn frame_slot(arena: &mut ExprArena, offset: i64) -> ExprId {
    let fp = arena.frame_pointer();
    let k = arena.literal(offset, Type::I64);
    let addr = arena.binary(fp, BinaryOp::Sub, k);
    arena.push(ExprKind::ValueFromPointer(addr), Type::I32)
}

/// `v1 + (v2 + (... + vn))` over locals at offsets 4, 8, ...
fn right_nested_sum(arena: &mut ExprArena, terms: i64) -> ExprId {
    let mut sum = frame_slot(arena, 4 * terms);
    for index in (1..terms).rev() {
        let left = frame_slot(arena, 4 * index);
        sum = arena.binary(left, BinaryOp::Add, sum);
    }
    sum
}

fn assert_no_overlap(allocation: &Allocation) {
    for (i, a) in allocation.segments.iter().enumerate() {
        for b in &allocation.segments[i + 1..] {
            if a.temp != b.temp && a.slot == b.slot {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }
}

/// Run allocated code over physical slots; locals at offset `4k` hold `k`.
fn evaluate(code: &[IrValue], registers: usize) -> Vec<i64> {
    let mut slots = vec![0i64; registers];
    let mut stack = Vec::new();
    let slot_of = |operand: &Option<Operand>| -> usize {
        let reg = operand.as_ref().and_then(Operand::as_temp).unwrap();
        reg.slot().unwrap() as usize
    };

    for ir in code {
        match ir.opcode {
            IrOpcode::CopyFromFpOffset => {
                let Some(Operand::FramePointerOffset { offset, index: None }) = &ir.arg1 else {
                    panic!("unexpected load {}", ir);
                };
                slots[slot_of(&ir.arg0)] = offset / 4;
            }
            IrOpcode::Plus => {
                let right = match &ir.arg1 {
                    Some(Operand::Literal(value)) => *value,
                    other => slots[slot_of(other)],
                };
                slots[slot_of(&ir.arg0)] += right;
            }
            IrOpcode::PushReg => stack.push((slot_of(&ir.arg0), slots[slot_of(&ir.arg0)])),
            IrOpcode::PopReg => {
                let (slot, value) = stack.pop().expect("pop without push");
                assert_eq!(slot, slot_of(&ir.arg0), "pops must mirror pushes");
                slots[slot] = value;
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(stack.is_empty(), "unbalanced pushes");
    slots
}

#[test]
fn test_pressure_keeps_segments_apart() {
    let mut arena = ExprArena::new();
    let sum = right_nested_sum(&mut arena, 8);
    let (root, code) = select(&arena, sum);

    for registers in 2..=6 {
        let allocation = LinearScan::new(registers).allocate(code.clone()).unwrap();
        assert!(allocation.spills > 0, "{} registers should spill", registers);
        assert_no_overlap(&allocation);
        assert!(allocation
            .code
            .iter()
            .all(|ir| ir.temps().iter().all(|reg| reg.allocated.is_some())));

        let slots = evaluate(&allocation.code, registers);
        let result = allocation.slot_of(root.index).unwrap() as usize;
        assert_eq!(slots[result], 36, "wrong sum with {} registers", registers);
    }
}

#[test]
fn test_enough_registers_means_no_spills() {
    let mut arena = ExprArena::new();
    let sum = right_nested_sum(&mut arena, 6);
    let (root, code) = select(&arena, sum);

    let allocation = LinearScan::new(6).allocate(code).unwrap();
    assert_eq!(allocation.spills, 0);
    assert_no_overlap(&allocation);
    let slots = evaluate(&allocation.code, 6);
    assert_eq!(slots[allocation.slot_of(root.index).unwrap() as usize], 21);
}

#[test]
fn test_every_temp_gets_one_slot() {
    let mut arena = ExprArena::new();
    let sum = right_nested_sum(&mut arena, 7);
    let (_, code) = select(&arena, sum);

    let allocation = LinearScan::new(3).allocate(code).unwrap();
    let mut seen: HashMap<u32, u8> = HashMap::new();
    for ir in &allocation.code {
        for reg in ir.temps() {
            let slot = reg.allocated.unwrap();
            let first = *seen.entry(reg.index).or_insert(slot);
            assert_eq!(first, slot, "t{} moved between slots", reg.index);
            assert!((slot as usize) < 3);
        }
    }
}
