//! Rule patterns and the symbols the matching automaton runs on.

use std::fmt;

use crate::ast::{BinaryOp, ExprArena, ExprId, ExprKind, UnaryOp};

/// The register non-terminal.
pub const REG: char = 'r';

/// A tree pattern. Leaves are non-terminals or terminal markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Any subtree reducible to a register.
    Reg,
    Literal,
    FramePointer,
    Call,
    StringLiteral,
    Binary(BinaryOp, Box<Pattern>, Box<Pattern>),
    Compare(Box<Pattern>, Box<Pattern>),
    Deref(Box<Pattern>),
    AddressOf(Box<Pattern>),
    Assign(Box<Pattern>, Box<Pattern>),
    Negate(Box<Pattern>),
    Extend(Box<Pattern>),
}

impl Pattern {
    pub fn binary(op: BinaryOp, left: Pattern, right: Pattern) -> Self {
        Pattern::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn deref(inner: Pattern) -> Self {
        Pattern::Deref(Box::new(inner))
    }

    pub fn address_of(inner: Pattern) -> Self {
        Pattern::AddressOf(Box::new(inner))
    }

    pub fn assign(target: Pattern, value: Pattern) -> Self {
        Pattern::Assign(Box::new(target), Box::new(value))
    }

    pub fn compare(left: Pattern, right: Pattern) -> Self {
        Pattern::Compare(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: Pattern) -> Self {
        Pattern::Negate(Box::new(inner))
    }

    pub fn extend(inner: Pattern) -> Self {
        Pattern::Extend(Box::new(inner))
    }

    /// `*(fp - l)`, a frame slot.
    pub fn frame_slot() -> Self {
        Pattern::deref(Pattern::binary(
            BinaryOp::Sub,
            Pattern::FramePointer,
            Pattern::Literal,
        ))
    }

    pub fn symbol(&self) -> char {
        match self {
            Pattern::Reg => REG,
            Pattern::Literal => 'l',
            Pattern::FramePointer => 'f',
            Pattern::Call => 'c',
            Pattern::StringLiteral => 's',
            Pattern::Binary(op, ..) => op.symbol(),
            Pattern::Compare(..) => 'x',
            Pattern::Deref(_) => 'L',
            Pattern::AddressOf(_) => 'P',
            Pattern::Assign(..) => '=',
            Pattern::Negate(_) => 'u',
            Pattern::Extend(_) => 'e',
        }
    }

    pub fn children(&self) -> Vec<&Pattern> {
        match self {
            Pattern::Binary(_, left, right)
            | Pattern::Compare(left, right)
            | Pattern::Assign(left, right) => vec![left.as_ref(), right.as_ref()],
            Pattern::Deref(inner)
            | Pattern::AddressOf(inner)
            | Pattern::Negate(inner)
            | Pattern::Extend(inner) => vec![inner.as_ref()],
            Pattern::Reg
            | Pattern::Literal
            | Pattern::FramePointer
            | Pattern::Call
            | Pattern::StringLiteral => Vec::new(),
        }
    }

    /// Every root-to-leaf path, left to right.
    ///
    /// A path alternates node symbols and child indices, e.g. `+ r l`
    /// yields `[+, 0, r]` and `[+, 1, l]`.
    pub fn paths(&self) -> Vec<Vec<PathSymbol>> {
        let mut paths = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(&mut prefix, &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &mut Vec<PathSymbol>, out: &mut Vec<Vec<PathSymbol>>) {
        prefix.push(PathSymbol::Node(self.symbol()));
        let children = self.children();
        if children.is_empty() {
            out.push(prefix.clone());
        }
        for (index, child) in children.into_iter().enumerate() {
            prefix.push(PathSymbol::Child(index as u8));
            child.collect_paths(prefix, out);
            prefix.pop();
        }
        prefix.pop();
    }

    /// Prefix notation, e.g. `L - f l`.
    pub fn prefix(&self) -> String {
        let mut out = String::new();
        self.write_prefix(&mut out);
        out
    }

    fn write_prefix(&self, out: &mut String) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(self.symbol());
        for child in self.children() {
            child.write_prefix(out);
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// Alphabet of the matching automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathSymbol {
    Root,
    Node(char),
    Child(u8),
}

impl fmt::Display for PathSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSymbol::Root => write!(f, "^"),
            PathSymbol::Node(symbol) => write!(f, "{}", symbol),
            PathSymbol::Child(index) => write!(f, "{}", index),
        }
    }
}

/// Shape symbol of a lowered expression node.
///
/// Returns `None` for forms the rewriter should have removed.
pub fn shape_symbol(arena: &ExprArena, id: ExprId) -> Option<char> {
    let symbol = match arena.kind(id) {
        ExprKind::Operation { op, .. } => op.symbol(),
        ExprKind::Call { .. } => 'c',
        ExprKind::Literal(_) => 'l',
        ExprKind::Comparison { .. } => 'x',
        ExprKind::Unary {
            op: UnaryOp::Negate,
            ..
        } => 'u',
        ExprKind::PointerGet(_) => 'P',
        ExprKind::ValueFromPointer(_) => 'L',
        ExprKind::Assignment { .. } => '=',
        ExprKind::FramePointer => 'f',
        ExprKind::ExtendTo64Bit(_) => 'e',
        ExprKind::StringLiteral(_) => 's',
        ExprKind::VarCall(_)
        | ExprKind::InstanceGet { .. }
        | ExprKind::ArrayGet { .. }
        | ExprKind::Grouping(_)
        | ExprKind::Logical { .. } => return None,
    };
    Some(symbol)
}
