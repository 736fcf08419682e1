// This module runs the bottom-up labelling pass of the instruction selector. It walks an
// expression tree once, feeding the path from the tree root through the matching automaton,
// and keeps the per-node results in a side table indexed by ExprId instead of on the nodes:
// the automaton state reached, the partial-match bit strings per rule and the cheapest
// (rule, cost) per non-terminal. The table lives in a bumpalo arena owned by one selection
// run, so nothing survives into the next run and the tree itself stays immutable.
//
// Partial matches follow Hoffmann and O'Donnell: bit k of `partial[rule]` at a node says "a
// path of this rule ends here and the rule's root is k levels up". A node's bits are the
// accepting bits of its own automaton state, plus the AND over its children of their bits
// shifted down by one level. Bit 0 means the whole pattern matches at this node; each such
// rule is costed, and when the node reduces to a non-terminal the automaton is re-entered
// with that non-terminal's symbol so the parent sees the reduction as a leaf.

//! Bottom-up labelling with a per-run match table.

use bumpalo::{collections::Vec as BumpVec, Bump};

use crate::ast::{ExprArena, ExprId, ExprKind};
use crate::core::{CompileResult, InternalError};

use super::pattern::{shape_symbol, PathSymbol, Pattern, REG};
use super::rules::Rule;
use super::trie::MatchingTrie;

/// A rule chosen for a node, with the total cost of the cover below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub rule: usize,
    pub cost: u32,
}

/// Labelling result for one node.
pub struct NodeMatch<'b> {
    pub state: usize,
    partial: BumpVec<'b, u64>,
    best: BumpVec<'b, (char, Choice)>,
}

impl<'b> NodeMatch<'b> {
    fn new(bump: &'b Bump, state: usize, rule_count: usize) -> Self {
        let mut partial = BumpVec::with_capacity_in(rule_count, bump);
        partial.extend(std::iter::repeat(0u64).take(rule_count));
        Self {
            state,
            partial,
            best: BumpVec::new_in(bump),
        }
    }

    fn add_accepting(&mut self, trie: &MatchingTrie, state: usize) {
        for (rule, mask) in trie.entry(state).accepting.iter().enumerate() {
            self.partial[rule] |= mask;
        }
    }

    pub fn partial(&self, rule: usize) -> u64 {
        self.partial.get(rule).copied().unwrap_or(0)
    }

    pub fn best(&self, symbol: char) -> Option<Choice> {
        self.best
            .iter()
            .find(|(candidate, _)| *candidate == symbol)
            .map(|(_, choice)| *choice)
    }

    fn offer(&mut self, symbol: char, choice: Choice) -> bool {
        match self.best.iter_mut().find(|(candidate, _)| *candidate == symbol) {
            Some((_, current)) if choice.cost < current.cost => {
                *current = choice;
                true
            }
            Some(_) => false,
            None => {
                self.best.push((symbol, choice));
                true
            }
        }
    }
}

/// Side table of one selection run, indexed by [`ExprId`].
pub struct MatchTable<'b> {
    nodes: BumpVec<'b, Option<NodeMatch<'b>>>,
}

impl<'b> MatchTable<'b> {
    fn new(bump: &'b Bump, len: usize) -> Self {
        let mut nodes = BumpVec::with_capacity_in(len, bump);
        for _ in 0..len {
            nodes.push(None);
        }
        Self { nodes }
    }

    pub fn get(&self, id: ExprId) -> Option<&NodeMatch<'b>> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn choice(&self, id: ExprId, symbol: char) -> Option<Choice> {
        self.get(id).and_then(|node| node.best(symbol))
    }

    /// Number of nodes labelled in this run.
    pub fn labelled(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }
}

pub struct Matcher<'b, 'a> {
    bump: &'b Bump,
    arena: &'a ExprArena,
    trie: &'a MatchingTrie,
    rules: &'a [Rule],
    table: MatchTable<'b>,
}

impl<'b, 'a> Matcher<'b, 'a> {
    pub fn new(
        bump: &'b Bump,
        arena: &'a ExprArena,
        trie: &'a MatchingTrie,
        rules: &'a [Rule],
    ) -> Self {
        Self {
            bump,
            arena,
            trie,
            rules,
            table: MatchTable::new(bump, arena.len()),
        }
    }

    /// Label the tree rooted at `root`.
    pub fn label_tree(&mut self, root: ExprId) -> CompileResult<()> {
        self.label(root, None)
    }

    pub fn finish(self) -> MatchTable<'b> {
        self.table
    }

    fn label(&mut self, id: ExprId, parent: Option<(usize, u8)>) -> CompileResult<()> {
        let arena = self.arena;
        let trie = self.trie;

        let symbol = shape_symbol(arena, id).ok_or_else(|| InternalError::RewriteInvariant {
            reason: format!(
                "{} node `{}` reached instruction selection",
                arena.kind(id).name(),
                arena.render(id)
            ),
        })?;

        let entry = match parent {
            None => MatchingTrie::ROOT,
            Some((state, index)) => trie.step(state, PathSymbol::Child(index)),
        };
        let state = trie.step(entry, PathSymbol::Node(symbol));
        let mut node = NodeMatch::new(self.bump, state, self.rules.len());
        node.add_accepting(trie, state);

        let operands = arena.operands(id);
        for (index, &child) in operands.iter().enumerate() {
            self.label(child, Some((state, index as u8)))?;
        }
        if let ExprKind::Call { args, .. } = arena.kind(id) {
            for &arg in args {
                self.label(arg, None)?;
            }
        }

        if !operands.is_empty() {
            for rule in 0..self.rules.len() {
                let mut meet = u64::MAX;
                for &child in &operands {
                    let bits = self.table.get(child).map_or(0, |m| m.partial(rule));
                    meet &= bits >> 1;
                }
                node.partial[rule] |= meet;
            }
        }

        let mut reduced = false;
        for (index, rule) in self.rules.iter().enumerate() {
            if node.partial(index) & 1 == 0 {
                continue;
            }
            if let Some(guard) = rule.guard {
                if !guard(arena, id) {
                    continue;
                }
            }
            let Some(below) = self.pattern_cost(&rule.pattern, id) else {
                continue;
            };
            let cost = rule.cost + below;
            if node.offer(rule.result, Choice { rule: index, cost }) {
                log::trace!("{} {} matches {} at cost {}", id, symbol, rule.name, cost);
            }
            reduced |= rule.result == REG;
        }

        if reduced {
            let reduced_state = trie.step(entry, PathSymbol::Node(REG));
            node.add_accepting(trie, reduced_state);
        }

        self.table.nodes[id.index()] = Some(node);
        Ok(())
    }

    /// Summed cost of the non-terminal leaves `pattern` consumes below `id`.
    fn pattern_cost(&self, pattern: &Pattern, id: ExprId) -> Option<u32> {
        match pattern {
            Pattern::Reg => self.table.choice(id, REG).map(|choice| choice.cost),
            Pattern::Literal | Pattern::FramePointer | Pattern::Call | Pattern::StringLiteral => {
                Some(0)
            }
            _ => {
                let operands = self.arena.operands(id);
                let children = pattern.children();
                if operands.len() != children.len() {
                    return None;
                }
                let mut total = 0;
                for (child_pattern, child) in children.into_iter().zip(operands) {
                    total += self.pattern_cost(child_pattern, child)?;
                }
                Some(total)
            }
        }
    }
}
