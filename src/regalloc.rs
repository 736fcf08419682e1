// This module implements the linear-scan register allocator. The input is the IR selected for
// one statement, with temporaries numbered freely; the output is the same code with every
// temporary occurrence carrying its physical slot, plus PUSH_REG/POP_REG instructions for
// spills and for registers that must survive a call.
//
// Live intervals span the first to the last instruction mentioning a temporary, including
// mentions nested in address operands. Intervals are visited by start position; an interval
// whose end lies before the current start releases its slot. Each slot keeps a stack of
// owners: when no slot is free, a victim that is not referenced anywhere in the new interval
// is pushed to the machine stack, the new interval takes its slot, and the victim is popped
// back right before its next reference. While a victim waits for that pop its slot is idle,
// so a later interval that ends before the pop may borrow it without any spill. Because the
// spill storage is the machine stack, push/pop windows must nest; victims are chosen so they
// do, and the final code is checked for it.
//
// Calls need more care. The argument region of a call runs from its first PUSH_ARG to the
// CALL: stack arguments are pushed as soon as they are evaluated, the remaining arguments are
// evaluated after them and the argument registers are loaded right before the CALL. A stack
// argument stays on the machine stack until the call returns, so every window must nest with
// it. A spill that starts inside a region and ends after its call starts at the region start
// instead; a restore falling inside a region whose spill started before it moves to the
// region start. After allocation, every resident segment that spans a CALL (other than the
// call's own result) is saved: pushed at the region start and popped after the call.

//! Linear-scan register allocation with push/pop spilling.

use hashbrown::HashMap;

use crate::ast::Type;
use crate::core::{CompileResult, InternalError, PhysReg, RegisterFile};
use crate::ir::{IrOpcode, IrValue, Operand, TempReg};
use crate::symbols::REGISTER_PARAMS;

/// A span of positions during which a temporary lives in its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub temp: u32,
    pub slot: u8,
    pub from: usize,
    pub to: usize,
}

impl Segment {
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

/// Result of allocating one instruction sequence.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub code: Vec<IrValue>,
    /// Resident segments, in positions of the input sequence.
    pub segments: Vec<Segment>,
    pub slots: HashMap<u32, u8>,
    pub spills: usize,
    pub saves: usize,
}

impl Allocation {
    pub fn slot_of(&self, temp: u32) -> Option<u8> {
        self.slots.get(&temp).copied()
    }

    /// Number of distinct temporaries allocated.
    pub fn temp_count(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug)]
struct Interval {
    temp: u32,
    start: usize,
    end: usize,
    uses: Vec<usize>,
}

impl Interval {
    fn used_within(&self, from: usize, to: usize) -> bool {
        self.uses.iter().any(|&pos| from <= pos && pos <= to)
    }

    fn next_use_after(&self, pos: usize) -> Option<usize> {
        self.uses.iter().copied().find(|&use_pos| use_pos > pos)
    }
}

/// Push before `push`, pop before `pop`.
#[derive(Debug, Clone, Copy)]
struct Window {
    slot: u8,
    temp: u32,
    push: usize,
    pop: usize,
}

impl Window {
    /// Whether the two windows interleave instead of nesting.
    fn crosses(&self, other: &Window) -> bool {
        let strictly = |a: &Window, b: &Window| a.push < b.push && b.push < a.pop && a.pop < b.pop;
        strictly(self, other) || strictly(other, self)
    }
}

pub struct LinearScan {
    register_count: usize,
}

impl LinearScan {
    pub fn new(register_count: usize) -> Self {
        Self { register_count }
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }

    pub fn allocate(&self, code: Vec<IrValue>) -> CompileResult<Allocation> {
        for ir in &code {
            ir.validate()?;
        }

        let intervals = build_intervals(&code);
        let regions = call_regions(&code);
        let mut state = ScanState::new(self.register_count, intervals.len(), &regions);

        for index in 0..intervals.len() {
            state.expire(&intervals, intervals[index].start);
            state.place(&intervals, index)?;
        }

        let mut segments = Vec::new();
        let mut slots = HashMap::new();
        for (index, interval) in intervals.iter().enumerate() {
            let slot = state.slot_of[index].ok_or_else(|| InternalError::RegisterAllocation {
                reason: format!("t{} was never placed", interval.temp),
            })?;
            slots.insert(interval.temp, slot);
            segments.extend(resident_segments(interval, slot, &state.windows));
            log::trace!(
                "t{} -> p{} [{}, {}]",
                interval.temp,
                slot,
                interval.start,
                interval.end
            );
        }

        let spills = state.windows.len();
        let mut windows = state.windows;
        let saves = caller_saves(&code, &regions, &segments, &mut windows);

        let code = rewrite(code, &slots, &windows)?;
        Ok(Allocation {
            code,
            segments,
            slots,
            spills,
            saves,
        })
    }
}

fn build_intervals(code: &[IrValue]) -> Vec<Interval> {
    let mut by_temp: HashMap<u32, Interval> = HashMap::new();
    for (pos, ir) in code.iter().enumerate() {
        for reg in ir.temps() {
            let interval = by_temp.entry(reg.index).or_insert_with(|| Interval {
                temp: reg.index,
                start: pos,
                end: pos,
                uses: Vec::new(),
            });
            interval.end = pos;
            if interval.uses.last() != Some(&pos) {
                interval.uses.push(pos);
            }
        }
    }
    let mut intervals: Vec<Interval> = by_temp.into_values().collect();
    intervals.sort_by_key(|interval| (interval.start, interval.temp));
    intervals
}

/// The instructions passing arguments to one call.
#[derive(Debug, Clone)]
struct CallRegion {
    /// First PUSH_ARG of the call, or the CALL itself when it takes no arguments.
    start: usize,
    call: usize,
    /// PUSH_ARGs that put an argument on the machine stack.
    stack_args: Vec<usize>,
}

impl CallRegion {
    fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.call
    }

    /// Whether `window` nests with every stack argument, each of which is on the machine
    /// stack from its PUSH_ARG until the call returns.
    fn nests(&self, window: &Window) -> bool {
        self.stack_args.iter().all(|&arg| {
            (window.push <= arg && window.pop > self.call)
                || (window.push > arg && window.pop <= self.call)
                || window.pop <= arg
                || window.push > self.call
        })
    }
}

fn is_stack_argument(ir: &IrValue) -> bool {
    ir.opcode == IrOpcode::PushArg
        && matches!(ir.arg1, Some(Operand::Literal(position)) if position >= REGISTER_PARAMS as i64)
}

/// Argument regions of every CALL in `code`. A nested call completes before the first
/// PUSH_ARG of the call it is an argument of, so regions never overlap.
fn call_regions(code: &[IrValue]) -> Vec<CallRegion> {
    let mut regions = Vec::new();
    let mut after_previous = 0;
    for (pos, ir) in code.iter().enumerate() {
        if ir.opcode != IrOpcode::Call {
            continue;
        }
        let mut start = pos;
        while start > after_previous && code[start - 1].opcode == IrOpcode::PushArg {
            start -= 1;
        }
        let stack_args: Vec<usize> = (after_previous..pos)
            .filter(|&at| is_stack_argument(&code[at]))
            .collect();
        if let Some(&first) = stack_args.first() {
            start = start.min(first);
        }
        regions.push(CallRegion {
            start,
            call: pos,
            stack_args,
        });
        after_previous = pos + 1;
    }
    regions
}

struct ScanState<'a> {
    file: RegisterFile,
    regions: &'a [CallRegion],
    /// Per slot, the owning intervals; only the last one may be resident.
    owners: Vec<Vec<usize>>,
    slot_of: Vec<Option<u8>>,
    windows: Vec<Window>,
}

impl<'a> ScanState<'a> {
    fn new(register_count: usize, interval_count: usize, regions: &'a [CallRegion]) -> Self {
        let file = RegisterFile::new(register_count);
        Self {
            owners: vec![Vec::new(); file.len()],
            file,
            regions,
            slot_of: vec![None; interval_count],
            windows: Vec::new(),
        }
    }

    fn expire(&mut self, intervals: &[Interval], start: usize) {
        for slot in 0..self.owners.len() {
            while let Some(&top) = self.owners[slot].last() {
                if intervals[top].end >= start {
                    break;
                }
                self.owners[slot].pop();
                if self.owners[slot].is_empty() {
                    // The slot was handed out by the file, so releasing cannot fail.
                    let _ = self.file.release(PhysReg(slot as u8));
                }
            }
        }
    }

    /// Pop position of the open window of `temp` covering `pos`, if any.
    fn suspended_until(&self, temp: u32, pos: usize) -> Option<usize> {
        self.windows
            .iter()
            .filter(|window| window.temp == temp && window.push <= pos && pos < window.pop)
            .map(|window| window.pop)
            .max()
    }

    fn place(&mut self, intervals: &[Interval], index: usize) -> CompileResult<()> {
        let interval = &intervals[index];

        if let Ok(reg) = self.file.allocate() {
            self.take(index, reg.0);
            return Ok(());
        }

        // A slot whose owner sits on the stack until after this interval.
        for slot in 0..self.owners.len() {
            let Some(&owner) = self.owners[slot].last() else {
                continue;
            };
            if let Some(pop) = self.suspended_until(intervals[owner].temp, interval.start) {
                if pop > interval.end {
                    self.take(index, slot as u8);
                    return Ok(());
                }
            }
        }

        let mut best: Option<Window> = None;
        for slot in 0..self.owners.len() {
            let Some(&owner) = self.owners[slot].last() else {
                continue;
            };
            let victim = &intervals[owner];
            let Some(next_use) = victim.next_use_after(interval.end) else {
                continue;
            };
            let mut window = Window {
                slot: slot as u8,
                temp: victim.temp,
                push: interval.start,
                pop: next_use,
            };
            if let Some(region) = self.region_at(window.push) {
                if window.pop > region.call {
                    window.push = region.start;
                }
            }
            if let Some(region) = self.region_at(window.pop) {
                if window.push < region.start {
                    window.pop = region.start;
                }
            }

            let resident = self
                .windows
                .iter()
                .all(|other| other.temp != victim.temp || other.pop <= window.push);
            if !resident
                || victim.start >= window.push
                || victim.used_within(window.push, interval.end)
                || window.pop <= interval.end
            {
                continue;
            }
            if self.windows.iter().any(|other| other.crosses(&window))
                || !self.regions.iter().all(|region| region.nests(&window))
            {
                continue;
            }
            if best.map_or(true, |current| window.pop > current.pop) {
                best = Some(window);
            }
        }

        let Some(window) = best else {
            return Err(InternalError::RegisterAllocation {
                reason: format!(
                    "no register can be spilled for t{} at {}",
                    interval.temp, interval.start
                ),
            }
            .into());
        };
        log::warn!(
            "Spilling t{} from p{} over [{}, {}) for t{}",
            window.temp,
            window.slot,
            window.push,
            window.pop,
            interval.temp
        );
        self.windows.push(window);
        self.take(index, window.slot);
        Ok(())
    }

    fn region_at(&self, pos: usize) -> Option<&'a CallRegion> {
        self.regions.iter().find(|region| region.contains(pos))
    }

    fn take(&mut self, index: usize, slot: u8) {
        self.owners[slot as usize].push(index);
        self.slot_of[index] = Some(slot);
    }
}

fn resident_segments(interval: &Interval, slot: u8, windows: &[Window]) -> Vec<Segment> {
    let mut own: Vec<&Window> = windows
        .iter()
        .filter(|window| window.temp == interval.temp)
        .collect();
    own.sort_by_key(|window| window.push);

    let mut segments = Vec::new();
    let mut from = interval.start;
    for window in own {
        segments.push(Segment {
            temp: interval.temp,
            slot,
            from,
            to: window.push - 1,
        });
        from = window.pop;
    }
    segments.push(Segment {
        temp: interval.temp,
        slot,
        from,
        to: interval.end,
    });
    segments
}

/// Add a save window for every segment live across a call. Returns the count.
fn caller_saves(
    code: &[IrValue],
    regions: &[CallRegion],
    segments: &[Segment],
    windows: &mut Vec<Window>,
) -> usize {
    let mut saves = 0;
    for region in regions {
        let pos = region.call;
        let result = code[pos].call_result().map(|reg| reg.index);
        for segment in segments {
            if segment.from < pos && segment.to > pos && Some(segment.temp) != result {
                log::trace!("Saving p{} (t{}) around call at {}", segment.slot, segment.temp, pos);
                windows.push(Window {
                    slot: segment.slot,
                    temp: segment.temp,
                    push: region.start,
                    pop: pos + 1,
                });
                saves += 1;
            }
        }
    }
    saves
}

fn stack_op(opcode: IrOpcode, window: &Window) -> IrValue {
    IrValue::unary(
        opcode,
        Operand::Temp(TempReg {
            index: window.temp,
            allocated: Some(window.slot),
        }),
        Type::I64,
    )
}

/// Assign slots to every occurrence and interleave the push/pop windows.
fn rewrite(
    code: Vec<IrValue>,
    slots: &HashMap<u32, u8>,
    windows: &[Window],
) -> CompileResult<Vec<IrValue>> {
    let len = code.len();
    let mut pops: Vec<Vec<usize>> = vec![Vec::new(); len + 1];
    let mut pushes: Vec<Vec<usize>> = vec![Vec::new(); len + 1];
    for (id, window) in windows.iter().enumerate() {
        pushes[window.push].push(id);
        pops[window.pop].push(id);
    }

    let mut out = Vec::with_capacity(len + 2 * windows.len());
    let mut stack: Vec<usize> = Vec::new();
    let mut code = code.into_iter();
    for pos in 0..=len {
        let mut popping = std::mem::take(&mut pops[pos]);
        popping.sort_by(|&a, &b| windows[b].push.cmp(&windows[a].push).then(b.cmp(&a)));
        for id in popping {
            if stack.pop() != Some(id) {
                return Err(InternalError::RegisterAllocation {
                    reason: format!("push/pop windows interleave at {}", pos),
                }
                .into());
            }
            out.push(stack_op(IrOpcode::PopReg, &windows[id]));
        }

        let mut pushing = std::mem::take(&mut pushes[pos]);
        pushing.sort_by(|&a, &b| windows[b].pop.cmp(&windows[a].pop).then(a.cmp(&b)));
        for id in pushing {
            stack.push(id);
            out.push(stack_op(IrOpcode::PushReg, &windows[id]));
        }

        if let Some(mut ir) = code.next() {
            for reg in ir.temps_mut() {
                reg.allocated = slots.get(&reg.index).copied();
            }
            out.push(ir);
        }
    }

    if !stack.is_empty() {
        return Err(InternalError::RegisterAllocation {
            reason: format!("{} pushed register(s) never restored", stack.len()),
        }
        .into());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(dst: u32, offset: i64) -> IrValue {
        IrValue::binary(
            IrOpcode::CopyFromFpOffset,
            Operand::temp(dst),
            Operand::frame_slot(offset),
            Type::I32,
        )
    }

    fn plus(left: u32, right: u32) -> IrValue {
        IrValue::binary(IrOpcode::Plus, Operand::temp(left), Operand::temp(right), Type::I32)
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

    #[test]
    fn test_slots_are_reused_after_expiry() {
        let code = vec![load(0, 4), load(1, 8), plus(0, 1), load(2, 12), plus(0, 2)];
        let allocation = LinearScan::new(6).allocate(code).unwrap();
        assert_eq!(allocation.slot_of(0), Some(0));
        assert_eq!(allocation.slot_of(1), Some(1));
        // t1 ended at 2, so t2 starting at 3 reuses its slot.
        assert_eq!(allocation.slot_of(2), Some(1));
        assert_eq!(allocation.spills, 0);
        assert!(allocation.code.iter().all(|ir| ir.temps().iter().all(|reg| reg.allocated.is_some())));
    }

    #[test]
    fn test_pressure_spills_furthest_use() {
        // t0 + (t1 + t2) with two slots.
        let code = vec![load(0, 4), load(1, 8), load(2, 12), plus(1, 2), plus(0, 1)];
        let allocation = LinearScan::new(2).allocate(code).unwrap();
        assert_eq!(allocation.spills, 1);
        assert_no_overlap(&allocation);

        let opcodes: Vec<_> = allocation.code.iter().map(|ir| ir.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                IrOpcode::CopyFromFpOffset,
                IrOpcode::CopyFromFpOffset,
                IrOpcode::PushReg,
                IrOpcode::CopyFromFpOffset,
                IrOpcode::Plus,
                IrOpcode::PopReg,
                IrOpcode::Plus,
            ]
        );
        assert_eq!(allocation.slot_of(2), allocation.slot_of(0));
    }

    #[test]
    fn test_value_live_across_call_is_saved() {
        let code = vec![
            load(0, 4),
            load(1, 8),
            IrValue::binary(IrOpcode::PushArg, Operand::temp(1), Operand::Literal(0), Type::I32),
            IrValue::binary(
                IrOpcode::Call,
                Operand::Label("f".into()),
                Operand::temp(2),
                Type::I32,
            ),
            plus(0, 2),
        ];
        let allocation = LinearScan::new(6).allocate(code).unwrap();
        assert_eq!(allocation.saves, 1);

        let opcodes: Vec<_> = allocation.code.iter().map(|ir| ir.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                IrOpcode::CopyFromFpOffset,
                IrOpcode::CopyFromFpOffset,
                IrOpcode::PushReg,
                IrOpcode::PushArg,
                IrOpcode::Call,
                IrOpcode::PopReg,
                IrOpcode::Plus,
            ]
        );
        assert_eq!(allocation.code[2].arg0.as_ref().and_then(Operand::as_temp).map(|r| r.index), Some(0));
    }

    /// `f(1, .., n)` the way calls are selected: stack arguments pushed as they are
    /// evaluated, then the register arguments.
    fn call_with_literals(first_temp: u32, args: u32) -> Vec<IrValue> {
        let literal = |temp: u32, value: u32| {
            IrValue::binary(
                IrOpcode::Copy,
                Operand::temp(temp),
                Operand::Literal(value as i64),
                Type::I32,
            )
        };
        let push_arg = |temp: u32, position: u32| {
            IrValue::binary(
                IrOpcode::PushArg,
                Operand::temp(temp),
                Operand::Literal(position as i64),
                Type::I32,
            )
        };
        let mut code = Vec::new();
        let mut temp = first_temp;
        for position in (REGISTER_PARAMS as u32..args).rev() {
            code.push(literal(temp, position + 1));
            code.push(push_arg(temp, position));
            temp += 1;
        }
        let registers = args.min(REGISTER_PARAMS as u32);
        for position in 0..registers {
            code.push(literal(temp + position, position + 1));
        }
        for position in 0..registers {
            code.push(push_arg(temp + position, position));
        }
        code.push(IrValue::binary(
            IrOpcode::Call,
            Operand::Label("f".into()),
            Operand::temp(temp + registers),
            Type::I32,
        ));
        code
    }

    #[test]
    fn test_stack_arguments_need_no_extra_register() {
        let allocation = LinearScan::new(6).allocate(call_with_literals(0, 8)).unwrap();
        assert_eq!(allocation.spills, 0);
        assert_eq!(allocation.saves, 0);
        assert_no_overlap(&allocation);
    }

    #[test]
    fn test_value_live_across_stack_argument_call_is_pushed_first() {
        // x + f(1, .., 7) with six slots: x is pushed before the first stack argument.
        let mut code = vec![load(0, 4)];
        code.extend(call_with_literals(1, 7));
        code.push(plus(0, 8));
        let allocation = LinearScan::new(6).allocate(code).unwrap();
        assert_eq!(allocation.spills, 1);
        assert_no_overlap(&allocation);

        let opcodes: Vec<_> = allocation.code.iter().map(|ir| ir.opcode).collect();
        assert_eq!(
            &opcodes[..4],
            &[
                IrOpcode::CopyFromFpOffset,
                IrOpcode::Copy,
                IrOpcode::PushReg,
                IrOpcode::PushArg,
            ]
        );
        assert_eq!(
            &opcodes[opcodes.len() - 3..],
            &[IrOpcode::Call, IrOpcode::PopReg, IrOpcode::Plus]
        );
        assert_eq!(allocation.code[2].arg0.as_ref().and_then(Operand::as_temp).map(|r| r.index), Some(0));
    }

    #[test]
    fn test_window_must_nest_with_stack_argument() {
        let region = CallRegion {
            start: 2,
            call: 10,
            stack_args: vec![3],
        };
        let window = |push: usize, pop: usize| Window {
            slot: 0,
            temp: 0,
            push,
            pop,
        };
        assert!(region.nests(&window(2, 11)));
        assert!(region.nests(&window(4, 9)));
        assert!(region.nests(&window(0, 3)));
        assert!(!region.nests(&window(3, 9)));
        assert!(!region.nests(&window(5, 11)));
        assert!(!region.nests(&window(0, 4)));
    }

    #[test]
    fn test_malformed_ir_is_rejected() {
        let code = vec![IrValue::binary(
            IrOpcode::CopyToFpOffset,
            Operand::temp(0),
            Operand::temp(1),
            Type::I32,
        )];
        assert!(LinearScan::new(6).allocate(code).unwrap_err().is_internal());
    }

    #[test]
    fn test_crossing_windows_detected() {
        let a = Window {
            slot: 0,
            temp: 0,
            push: 1,
            pop: 5,
        };
        let b = Window {
            slot: 1,
            temp: 1,
            push: 3,
            pop: 7,
        };
        let inner = Window {
            slot: 1,
            temp: 1,
            push: 2,
            pop: 5,
        };
        assert!(a.crosses(&b));
        assert!(!a.crosses(&inner));
    }
}
