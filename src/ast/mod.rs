// This module defines the typed syntax tree that cubec consumes from the front end. Expressions
// live in an ExprArena and are addressed by ExprId, a stable u32 index: every later pass
// (rewriter, matcher side-table, selector) refers to nodes by id instead of by pointer, so the
// same tree can be matched any number of times without carrying scratch state. Rewriting
// appends new nodes to the arena and never mutates existing ones. Statements own their child
// statements directly and refer to expressions by id. The arena builder helpers derive the
// resolved type of new nodes the way the type checker would (binary operations take the type
// of their left operand, comparisons and logical operations are i8, address-of wraps the
// operand type in a pointer), so tests and the bundled samples can build typed trees tersely.

//! Typed AST of a Cube compilation unit.

pub mod types;

use std::fmt;

pub use types::Type;

/// Line/column position of a node in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Stable identifier of an expression node inside its [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The comparison that holds exactly when `self` does not.
    pub fn inverse(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Operation {
        left: ExprId,
        op: BinaryOp,
        right: ExprId,
    },
    Call {
        callee: String,
        args: Vec<ExprId>,
    },
    Literal(i64),
    VarCall(String),
    InstanceGet {
        base: ExprId,
        field: String,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Grouping(ExprId),
    ArrayGet {
        base: ExprId,
        index: ExprId,
    },
    /// Address of a place (`&x`).
    PointerGet(ExprId),
    /// Load through an address (`*p`).
    ValueFromPointer(ExprId),
    Comparison {
        left: ExprId,
        op: CompareOp,
        right: ExprId,
    },
    Assignment {
        target: ExprId,
        value: ExprId,
    },
    Logical {
        left: ExprId,
        op: LogicalOp,
        right: ExprId,
    },
    /// The frame base of the current function.
    FramePointer,
    ExtendTo64Bit(ExprId),
    StringLiteral(String),
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Operation { .. } => "Operation",
            ExprKind::Call { .. } => "Call",
            ExprKind::Literal(_) => "Literal",
            ExprKind::VarCall(_) => "VarCall",
            ExprKind::InstanceGet { .. } => "InstanceGet",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Grouping(_) => "Grouping",
            ExprKind::ArrayGet { .. } => "ArrayGet",
            ExprKind::PointerGet(_) => "PointerGet",
            ExprKind::ValueFromPointer(_) => "ValueFromPointer",
            ExprKind::Comparison { .. } => "Comparison",
            ExprKind::Assignment { .. } => "Assignment",
            ExprKind::Logical { .. } => "Logical",
            ExprKind::FramePointer => "FramePointer",
            ExprKind::ExtendTo64Bit(_) => "ExtendTo64Bit",
            ExprKind::StringLiteral(_) => "StringLiteral",
        }
    }
}

/// An expression node with its resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub pos: Option<SourcePos>,
}

/// Owner of every expression node of a unit.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        self.push_at(kind, ty, None)
    }

    pub fn push_at(&mut self, kind: ExprKind, ty: Type, pos: Option<SourcePos>) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(Expr { kind, ty, pos });
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()].kind
    }

    pub fn ty(&self, id: ExprId) -> &Type {
        &self.nodes[id.index()].ty
    }

    pub fn pos(&self, id: ExprId) -> Option<SourcePos> {
        self.nodes[id.index()].pos
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach a source position to a node.
    pub fn at(&mut self, id: ExprId, line: u32, column: u32) -> ExprId {
        self.nodes[id.index()].pos = Some(SourcePos::new(line, column));
        id
    }

    /// Children that take part in tree-pattern matching.
    ///
    /// Calls and string literals are leaves here; call arguments are
    /// selected separately by the call rule.
    pub fn operands(&self, id: ExprId) -> Vec<ExprId> {
        match self.kind(id) {
            ExprKind::Operation { left, right, .. }
            | ExprKind::Comparison { left, right, .. }
            | ExprKind::Logical { left, right, .. } => vec![*left, *right],
            ExprKind::Assignment { target, value } => vec![*target, *value],
            ExprKind::ArrayGet { base, index } => vec![*base, *index],
            ExprKind::InstanceGet { base, .. } => vec![*base],
            ExprKind::Unary { operand, .. } => vec![*operand],
            ExprKind::Grouping(inner)
            | ExprKind::PointerGet(inner)
            | ExprKind::ValueFromPointer(inner)
            | ExprKind::ExtendTo64Bit(inner) => vec![*inner],
            ExprKind::Call { .. }
            | ExprKind::Literal(_)
            | ExprKind::VarCall(_)
            | ExprKind::FramePointer
            | ExprKind::StringLiteral(_) => Vec::new(),
        }
    }

    /// Prefix rendering of a subtree, used in logs and error messages.
    pub fn render(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: ExprId, out: &mut String) {
        use std::fmt::Write;

        match self.kind(id) {
            ExprKind::Operation { left, op, right } => {
                let _ = write!(out, "({} ", op.symbol());
                self.render_into(*left, out);
                out.push(' ');
                self.render_into(*right, out);
                out.push(')');
            }
            ExprKind::Call { callee, args } => {
                let _ = write!(out, "{}(", callee);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_into(*arg, out);
                }
                out.push(')');
            }
            ExprKind::Literal(value) => {
                let _ = write!(out, "{}", value);
            }
            ExprKind::VarCall(name) => out.push_str(name),
            ExprKind::StringLiteral(text) => {
                let _ = write!(out, "{:?}", text);
            }
            ExprKind::FramePointer => out.push_str("fp"),
            ExprKind::InstanceGet { base, field } => {
                self.render_into(*base, out);
                let _ = write!(out, ".{}", field);
            }
            ExprKind::ArrayGet { base, index } => {
                self.render_into(*base, out);
                out.push('[');
                self.render_into(*index, out);
                out.push(']');
            }
            other => {
                let _ = write!(out, "({}", other.name());
                for child in self.operands(id) {
                    out.push(' ');
                    self.render_into(child, out);
                }
                out.push(')');
            }
        }
    }

    // Builders. Result types follow the type checker's rules.

    pub fn literal(&mut self, value: i64, ty: Type) -> ExprId {
        self.push(ExprKind::Literal(value), ty)
    }

    /// An `i32` literal.
    pub fn int(&mut self, value: i64) -> ExprId {
        self.literal(value, Type::I32)
    }

    pub fn char_literal(&mut self, value: u8) -> ExprId {
        self.literal(value as i64, Type::Char)
    }

    pub fn string(&mut self, text: &str) -> ExprId {
        self.push(
            ExprKind::StringLiteral(text.to_string()),
            Type::pointer_to(Type::Char),
        )
    }

    pub fn var(&mut self, name: &str, ty: Type) -> ExprId {
        self.push(ExprKind::VarCall(name.to_string()), ty)
    }

    pub fn binary(&mut self, left: ExprId, op: BinaryOp, right: ExprId) -> ExprId {
        let ty = self.ty(left).clone();
        self.push(ExprKind::Operation { left, op, right }, ty)
    }

    pub fn compare(&mut self, left: ExprId, op: CompareOp, right: ExprId) -> ExprId {
        self.push(ExprKind::Comparison { left, op, right }, Type::I8)
    }

    pub fn logical(&mut self, left: ExprId, op: LogicalOp, right: ExprId) -> ExprId {
        self.push(ExprKind::Logical { left, op, right }, Type::I8)
    }

    pub fn call(&mut self, callee: &str, args: Vec<ExprId>, return_type: Type) -> ExprId {
        self.push(
            ExprKind::Call {
                callee: callee.to_string(),
                args,
            },
            return_type,
        )
    }

    pub fn field(&mut self, base: ExprId, field: &str, ty: Type) -> ExprId {
        self.push(
            ExprKind::InstanceGet {
                base,
                field: field.to_string(),
            },
            ty,
        )
    }

    pub fn index(&mut self, base: ExprId, index: ExprId) -> ExprId {
        let ty = self.ty(base).element().cloned().unwrap_or(Type::None);
        self.push(ExprKind::ArrayGet { base, index }, ty)
    }

    pub fn address_of(&mut self, inner: ExprId) -> ExprId {
        let ty = Type::pointer_to(self.ty(inner).clone());
        self.push(ExprKind::PointerGet(inner), ty)
    }

    pub fn deref(&mut self, inner: ExprId) -> ExprId {
        let ty = self.ty(inner).pointee().cloned().unwrap_or(Type::None);
        self.push(ExprKind::ValueFromPointer(inner), ty)
    }

    pub fn negate(&mut self, operand: ExprId) -> ExprId {
        let ty = self.ty(operand).clone();
        self.push(
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            },
            ty,
        )
    }

    pub fn grouping(&mut self, inner: ExprId) -> ExprId {
        let ty = self.ty(inner).clone();
        self.push(ExprKind::Grouping(inner), ty)
    }

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        let ty = self.ty(target).clone();
        self.push(ExprKind::Assignment { target, value }, ty)
    }

    pub fn frame_pointer(&mut self) -> ExprId {
        self.push(ExprKind::FramePointer, Type::I64)
    }

    pub fn extend(&mut self, inner: ExprId) -> ExprId {
        self.push(ExprKind::ExtendTo64Bit(inner), Type::I64)
    }
}

/// A named, typed parameter or struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Vec<Stmt>,
    pub pos: Option<SourcePos>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Param>,
    pub pos: Option<SourcePos>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A standard library module such as `io`.
    Library(String),
    /// Another unit compiled alongside this one.
    File(String),
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarInit {
        name: String,
        ty: Type,
        value: Option<ExprId>,
        pos: Option<SourcePos>,
    },
    Function(FunctionDef),
    If {
        cond: ExprId,
        then: Box<Stmt>,
        else_: Option<Box<Stmt>>,
    },
    Return(Option<ExprId>),
    While {
        cond: ExprId,
        body: Box<Stmt>,
    },
    For {
        init: Box<Stmt>,
        cond: ExprId,
        step: Box<Stmt>,
        body: Box<Stmt>,
    },
    Struct(StructDef),
    Block(Vec<Stmt>),
    Import {
        target: ImportTarget,
        pos: Option<SourcePos>,
    },
    ExternFunction {
        name: String,
        params: Vec<Param>,
        return_type: Option<Type>,
    },
    Expression(ExprId),
    Empty,
}

impl Stmt {
    /// Number of statements in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + match self {
            Stmt::Function(def) => def.body.iter().map(Stmt::count).sum(),
            Stmt::If { then, else_, .. } => {
                then.count() + else_.as_ref().map_or(0, |stmt| stmt.count())
            }
            Stmt::While { body, .. } => body.count(),
            Stmt::For {
                init, step, body, ..
            } => init.count() + step.count() + body.count(),
            Stmt::Block(stmts) => stmts.iter().map(Stmt::count).sum(),
            _ => 0,
        }
    }
}

/// One compilation unit: a source file's typed tree.
#[derive(Debug, Clone)]
pub struct Unit {
    pub name: String,
    pub arena: ExprArena,
    pub statements: Vec<Stmt>,
}

impl Unit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arena: ExprArena::new(),
            statements: Vec::new(),
        }
    }

    /// Whether the unit defines a `main` function.
    pub fn defines_main(&self) -> bool {
        self.statements
            .iter()
            .any(|stmt| matches!(stmt, Stmt::Function(def) if def.name == "main"))
    }
}
