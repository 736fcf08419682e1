// This module builds the pattern-matching automaton of the instruction selector. Every rule
// pattern is split into its root-to-leaf paths (node symbols alternating with child indices)
// and each path is inserted into a trie, sharing common prefixes; entry ids are handed out in
// insertion order so the same rule list always yields the same automaton. Failure links are
// then computed breadth-first as in Aho-Corasick string matching. The accepting table of an
// entry records, per rule, a bit mask of root distances: bit k means "a path of this rule ends
// here and the rule's root lies k tree levels above". A path of n pattern nodes has 2n - 1
// symbols, so an entry at trie depth d accepts with root distance (d - 1) / 2. Each entry also
// inherits the accepting bits of its failure target, since the failure target's path is a
// suffix of its own.

//! Aho-Corasick automaton over pattern paths.

use std::collections::VecDeque;
use std::fmt;

use super::pattern::{Pattern, PathSymbol};

/// One automaton state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieEntry {
    pub symbol: PathSymbol,
    pub depth: usize,
    pub next: Vec<usize>,
    pub failure: usize,
    /// Per rule, bit mask of root distances accepted here.
    pub accepting: Vec<u64>,
}

impl TrieEntry {
    fn new(symbol: PathSymbol, depth: usize, rule_count: usize) -> Self {
        Self {
            symbol,
            depth,
            next: Vec::new(),
            failure: MatchingTrie::ROOT,
            accepting: vec![0; rule_count],
        }
    }

    /// Path lengths on which `rule` accepts here, shortest first.
    pub fn accepting_depths(&self, rule: usize) -> Vec<usize> {
        let mask = self.accepting.get(rule).copied().unwrap_or(0);
        (0..64)
            .filter(|bit| mask & (1u64 << bit) != 0)
            .map(|bit| 2 * bit + 1)
            .collect()
    }
}

/// Matching automaton built from an ordered rule list.
#[derive(Debug, Clone)]
pub struct MatchingTrie {
    entries: Vec<TrieEntry>,
    rule_count: usize,
}

impl MatchingTrie {
    pub const ROOT: usize = 0;

    /// Build the automaton for `patterns`, indexed by rule number.
    pub fn build<'p>(patterns: impl IntoIterator<Item = &'p Pattern>) -> Self {
        let patterns: Vec<&Pattern> = patterns.into_iter().collect();
        let rule_count = patterns.len();
        let mut trie = Self {
            entries: vec![TrieEntry::new(PathSymbol::Root, 0, rule_count)],
            rule_count,
        };

        for (rule, pattern) in patterns.iter().enumerate() {
            for path in pattern.paths() {
                trie.insert(rule, &path);
            }
        }
        trie.compute_failure_links();

        log::debug!(
            "Built matching automaton: {} rules, {} entries",
            rule_count,
            trie.entries.len()
        );
        trie
    }

    fn insert(&mut self, rule: usize, path: &[PathSymbol]) {
        let mut current = Self::ROOT;
        for &symbol in path {
            current = match self.child(current, symbol) {
                Some(next) => next,
                None => {
                    let id = self.entries.len();
                    let depth = self.entries[current].depth + 1;
                    self.entries
                        .push(TrieEntry::new(symbol, depth, self.rule_count));
                    self.entries[current].next.push(id);
                    id
                }
            };
        }
        let depth = self.entries[current].depth;
        self.entries[current].accepting[rule] |= 1u64 << ((depth - 1) / 2);
    }

    fn compute_failure_links(&mut self) {
        let mut queue: VecDeque<usize> = VecDeque::new();
        for &child in &self.entries[Self::ROOT].next {
            queue.push_back(child);
        }

        while let Some(parent) = queue.pop_front() {
            let children = self.entries[parent].next.clone();
            for child in children {
                let symbol = self.entries[child].symbol;
                let mut fallback = self.entries[parent].failure;
                let failure = loop {
                    if let Some(target) = self.child(fallback, symbol) {
                        break target;
                    }
                    if fallback == Self::ROOT {
                        break Self::ROOT;
                    }
                    fallback = self.entries[fallback].failure;
                };

                self.entries[child].failure = failure;
                for rule in 0..self.rule_count {
                    let inherited = self.entries[failure].accepting[rule];
                    self.entries[child].accepting[rule] |= inherited;
                }
                queue.push_back(child);
            }
        }
    }

    pub fn entries(&self) -> &[TrieEntry] {
        &self.entries
    }

    pub fn entry(&self, state: usize) -> &TrieEntry {
        &self.entries[state]
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Direct successor of `state` on `symbol`.
    pub fn child(&self, state: usize, symbol: PathSymbol) -> Option<usize> {
        self.entries[state]
            .next
            .iter()
            .copied()
            .find(|&next| self.entries[next].symbol == symbol)
    }

    /// Goto transition, falling back through failure links.
    pub fn step(&self, state: usize, symbol: PathSymbol) -> usize {
        let mut current = state;
        loop {
            if let Some(next) = self.child(current, symbol) {
                return next;
            }
            if current == Self::ROOT {
                return Self::ROOT;
            }
            current = self.entries[current].failure;
        }
    }
}

impl fmt::Display for MatchingTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, entry) in self.entries.iter().enumerate() {
            write!(
                f,
                "{:>4} {:>2} d{} fail={} next={:?}",
                id, entry.symbol, entry.depth, entry.failure, entry.next
            )?;
            for (rule, mask) in entry.accepting.iter().enumerate() {
                if *mask != 0 {
                    write!(f, " accept[{}]={:b}", rule, mask)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    #[test]
    fn test_shared_prefixes() {
        let patterns = [
            Pattern::binary(BinaryOp::Add, Pattern::Reg, Pattern::Reg),
            Pattern::binary(BinaryOp::Add, Pattern::Reg, Pattern::Literal),
        ];
        let trie = MatchingTrie::build(&patterns);

        // root, +, 0, r, 1, r, l
        assert_eq!(trie.entries().len(), 7);
        let plus = trie.child(MatchingTrie::ROOT, PathSymbol::Node('+')).unwrap();
        assert_eq!(trie.entry(plus).next.len(), 2);

        let right = trie.child(plus, PathSymbol::Child(1)).unwrap();
        let lit = trie.child(right, PathSymbol::Node('l')).unwrap();
        assert_eq!(trie.entry(lit).accepting_depths(1), vec![3]);
        assert!(trie.entry(lit).accepting_depths(0).is_empty());
    }

    #[test]
    fn test_step_falls_back_to_root() {
        let patterns = [Pattern::Literal];
        let trie = MatchingTrie::build(&patterns);
        let lit = trie.step(MatchingTrie::ROOT, PathSymbol::Node('l'));
        assert_eq!(lit, 1);
        assert_eq!(trie.step(lit, PathSymbol::Child(0)), MatchingTrie::ROOT);
        assert_eq!(trie.step(MatchingTrie::ROOT, PathSymbol::Node('+')), MatchingTrie::ROOT);
    }

    #[test]
    fn test_suffix_paths_of_one_rule_accumulate() {
        // `+ r (+ r l)`: the path `+ 1 + 0 r` has `+ 0 r` as a suffix.
        let pattern = Pattern::binary(
            BinaryOp::Add,
            Pattern::Reg,
            Pattern::binary(BinaryOp::Add, Pattern::Reg, Pattern::Literal),
        );
        let trie = MatchingTrie::build([&pattern]);

        let mut state = MatchingTrie::ROOT;
        for symbol in [
            PathSymbol::Node('+'),
            PathSymbol::Child(1),
            PathSymbol::Node('+'),
            PathSymbol::Child(0),
            PathSymbol::Node('r'),
        ] {
            state = trie.step(state, symbol);
        }
        assert_eq!(trie.entry(state).accepting_depths(0), vec![3, 5]);
    }
}
