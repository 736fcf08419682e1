//! Instruction selection.
//!
//! - [`pattern`] - tree patterns and the symbols the automaton runs on
//! - [`rules`] - the rule table with costs, guards and emission functions
//! - [`trie`] - Aho-Corasick automaton over pattern paths
//! - [`matcher`] - bottom-up labelling into a per-run side table
//! - [`selector`] - top-down reduction that emits IR

pub mod matcher;
pub mod pattern;
pub mod rules;
pub mod selector;
pub mod trie;

pub use matcher::{Choice, MatchTable, Matcher};
pub use pattern::{shape_symbol, PathSymbol, Pattern, REG};
pub use rules::{standard_rules, split_chunks, Bound, RegRef, Rule, RuleContext};
pub use selector::{SelectionOutput, Selector, TempCounter};
pub use trie::{MatchingTrie, TrieEntry};
