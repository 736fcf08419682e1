// This module drives instruction selection for one expression tree. `Selector::select` labels
// the tree bottom-up with a fresh Matcher (whose side table lives in a Bump owned by the call)
// and then reduces the root to a register top-down: the winning rule of a node binds the
// leaves of its pattern in pre-order, reducing every register leaf recursively before the
// rule's own emission runs, so operands are always computed left to right and a rule's IR
// follows the IR of everything it consumes. Emission goes through the RuleContext trait,
// which the private Reducer implements on top of the match table and the caller's
// SelectionOutput (the emitter, the unit's string literals and the function's temporary
// counter).

//! Cost-based instruction selector.

use bumpalo::Bump;

use crate::ast::{ExprArena, ExprId, ExprKind, Type};
use crate::codegen::emitter::{Emitter, StringLiterals};
use crate::core::{CompileResult, InternalError};
use crate::ir::IrValue;
use crate::symbols::Declarations;

use super::matcher::{MatchTable, Matcher};
use super::pattern::{Pattern, REG};
use super::rules::{standard_rules, Bound, RegRef, Rule, RuleContext};
use super::trie::MatchingTrie;

/// Numbers temporaries; restarted for every function.
#[derive(Debug, Default)]
pub struct TempCounter {
    next: u32,
}

impl TempCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }

    /// Temporaries handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Where selected code goes.
pub struct SelectionOutput<'o, 'arena> {
    pub emitter: &'o mut dyn Emitter,
    pub strings: &'o mut StringLiterals<'arena>,
    pub temps: &'o mut TempCounter,
}

/// Rule table plus the automaton built from it.
pub struct Selector {
    rules: Vec<Rule>,
    trie: MatchingTrie,
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector {
    pub fn new() -> Self {
        Self::with_rules(standard_rules())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        let trie = MatchingTrie::build(rules.iter().map(|rule| &rule.pattern));
        Self { rules, trie }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn trie(&self) -> &MatchingTrie {
        &self.trie
    }

    /// Select instructions for the tree rooted at `root`.
    ///
    /// Returns the register holding the root's value. Fails with an internal
    /// error if the tree still contains unlowered forms or no rule covers a
    /// node.
    pub fn select(
        &self,
        arena: &ExprArena,
        decls: &Declarations,
        root: ExprId,
        out: &mut SelectionOutput<'_, '_>,
    ) -> CompileResult<RegRef> {
        let bump = Bump::new();
        let mut matcher = Matcher::new(&bump, arena, &self.trie, &self.rules);
        matcher.label_tree(root)?;
        let table = matcher.finish();

        let mut reducer = Reducer {
            arena,
            decls,
            rules: &self.rules,
            table: &table,
            out,
        };
        reducer.reduce_to(root, REG)
    }
}

struct Reducer<'r, 'b, 'o, 'arena> {
    arena: &'r ExprArena,
    decls: &'r Declarations,
    rules: &'r [Rule],
    table: &'r MatchTable<'b>,
    out: &'r mut SelectionOutput<'o, 'arena>,
}

impl Reducer<'_, '_, '_, '_> {
    fn reduce_to(&mut self, id: ExprId, symbol: char) -> CompileResult<RegRef> {
        let arena = self.arena;
        let rules = self.rules;

        let choice = self.table.choice(id, symbol).ok_or_else(|| {
            InternalError::NoCoveringRule {
                node: format!("{} `{}`", arena.kind(id).name(), arena.render(id)),
                symbol,
                pos: arena.pos(id),
            }
        })?;
        let rule = &rules[choice.rule];
        log::trace!(
            "Reducing {} `{}` with {} (cost {})",
            id,
            arena.render(id),
            rule.name,
            choice.cost
        );

        let mut bound = Vec::new();
        self.bind(&rule.pattern, id, &mut bound)?;
        (rule.emit)(self, id, &bound)
    }

    /// Bind the leaves of `pattern` matched at `id`, in pre-order.
    fn bind(&mut self, pattern: &Pattern, id: ExprId, bound: &mut Vec<Bound>) -> CompileResult<()> {
        let arena = self.arena;
        match pattern {
            Pattern::Reg => bound.push(Bound::Reg(self.reduce_to(id, REG)?)),
            Pattern::Literal => match arena.kind(id) {
                ExprKind::Literal(value) => bound.push(Bound::Lit(*value)),
                _ => {
                    return Err(InternalError::Unreachable {
                        reason: format!("literal leaf matched {}", arena.render(id)),
                    }
                    .into())
                }
            },
            Pattern::FramePointer => {}
            Pattern::Call | Pattern::StringLiteral => bound.push(Bound::Node(id)),
            _ => {
                for (child_pattern, child) in pattern.children().into_iter().zip(arena.operands(id)) {
                    self.bind(child_pattern, child, bound)?;
                }
            }
        }
        Ok(())
    }
}

impl RuleContext for Reducer<'_, '_, '_, '_> {
    fn arena(&self) -> &ExprArena {
        self.arena
    }

    fn decls(&self) -> &Declarations {
        self.decls
    }

    fn reduce(&mut self, id: ExprId) -> CompileResult<RegRef> {
        self.reduce_to(id, REG)
    }

    fn fresh(&mut self, ty: Type) -> RegRef {
        RegRef {
            index: self.out.temps.fresh(),
            ty,
        }
    }

    fn emit(&mut self, ir: IrValue) {
        log::trace!("  {}", ir);
        self.out.emitter.emit_ir(ir);
    }

    fn string_label(&mut self, text: &str) -> String {
        self.out.strings.label(text)
    }
}
