// This module provides arena-based session management for cubec using the bumpalo crate.
// CompilationSession is shared by every unit of one compiler invocation: it owns a
// reference to the arena (string-literal text of every unit lives there for the whole
// session) and accumulates statistics. Statistics are kept in a
// RefCell so passes holding a shared reference can record what they did: units and
// functions compiled, statements selected, IR instructions per opcode, temporaries
// allocated, spills, caller saves and call sites. SessionStats implements Display for
// the driver's --stats output.

//! Arena-based compilation session management.
//!
//! Arena data is tied to the session lifetime, so units can hand out
//! `&'arena str` without further bookkeeping.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for session-lifetime data.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Record that a unit finished code generation.
    pub fn record_unit_compiled(&self, name: &str, lines: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.units_compiled += 1;
        stats.lines_emitted += lines;
        log::debug!("Unit {} compiled ({} lines)", name, lines);
    }

    /// Record that a function body was compiled.
    pub fn record_function_compiled(&self, name: &str, statements: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;

        if stats.largest_function_statements < statements {
            stats.largest_function_statements = statements;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record one instruction-selection run.
    pub fn record_statement_selected(&self) {
        self.stats.borrow_mut().statements_selected += 1;
    }

    /// Record an emitted IR instruction.
    pub fn record_ir_emitted(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.ir_instructions += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record temporaries mapped onto physical registers.
    pub fn record_registers_allocated(&self, count: usize) {
        self.stats.borrow_mut().registers_allocated += count;
    }

    /// Record spill generation.
    pub fn record_spills(&self, count: usize) {
        self.stats.borrow_mut().spills_generated += count;
    }

    /// Record registers saved around calls.
    pub fn record_caller_saves(&self, count: usize) {
        self.stats.borrow_mut().caller_saves += count;
    }

    /// Record a call site.
    pub fn record_call_site(&self, function_name: &str) {
        self.stats.borrow_mut().total_calls += 1;
        log::trace!("Call site recorded: {}", function_name);
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of units compiled.
    pub units_compiled: usize,

    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Assembly lines emitted.
    pub lines_emitted: usize,

    /// Number of instruction-selection runs.
    pub statements_selected: usize,

    /// Number of IR instructions emitted.
    pub ir_instructions: usize,

    /// Count of each IR opcode.
    pub instruction_counts: HashMap<String, usize>,

    /// Function with the most statements.
    pub largest_function_statements: usize,

    /// Name of that function.
    pub largest_function_name: String,

    /// Temporaries allocated.
    pub registers_allocated: usize,

    /// Spills generated.
    pub spills_generated: usize,

    /// Registers saved around calls.
    pub caller_saves: usize,

    /// Total function calls compiled.
    pub total_calls: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Units compiled: {}", self.units_compiled)?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Statements selected: {}", self.statements_selected)?;
        writeln!(f, "  IR instructions: {}", self.ir_instructions)?;
        writeln!(f, "  Lines emitted: {}", self.lines_emitted)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Spills generated: {}", self.spills_generated)?;
        writeln!(f, "  Caller saves: {}", self.caller_saves)?;
        writeln!(f, "  Function calls compiled: {}", self.total_calls)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} statements)",
                self.largest_function_name, self.largest_function_statements
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  IR breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}
