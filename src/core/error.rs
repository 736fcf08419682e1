// This module defines the error types of the cubec backend using the thiserror crate.
// Errors come in two disjoint classes. Source errors (DiagnosticKind) describe defects in
// the program being compiled: undeclared variables, unknown struct fields, addressing
// forms the backend cannot express. They are collected in a DiagnosticSink so one unit
// can report several problems at once, and the unit is abandoned before code generation
// if any were recorded. Internal errors (InternalError) describe defects in the compiler
// itself, such as a construct no instruction pattern covers; they are always fatal and
// print with an "internal compiler error" prefix. CompileError wraps both plus I/O
// failures of the driver and maps each class onto a process exit code.

//! Error types for the cubec backend.
//!
//! Using thiserror for the enums and a collecting sink for source diagnostics.

use std::fmt;
use thiserror::Error;

use crate::ast::SourcePos;

/// A defect in the program being compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    #[error("undeclared variable `{name}`")]
    UndeclaredVariable { name: String },

    #[error("unknown struct `{name}`")]
    UnknownStruct { name: String },

    #[error("struct `{struct_name}` has no field `{field}`")]
    UnknownField { struct_name: String, field: String },

    #[error("value of type `{ty}` is not a struct")]
    NotAStruct { ty: String },

    #[error("unsupported addressing: {reason}")]
    UnsupportedAddressing { reason: String },

    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("function `{name}` expects {expected} argument(s), found {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("a function named `{name}` has already been defined")]
    DuplicateFunction { name: String },

    #[error("a struct named `{name}` has already been defined")]
    DuplicateStruct { name: String },

    #[error("unknown library `{name}`")]
    UnknownLibrary { name: String },

    #[error("struct parameter `{name}` must be passed by pointer")]
    StructParameter { name: String },

    #[error("this statement is not allowed outside of a function")]
    TopLevelStatement,
}

/// A source diagnostic with its position, when the node carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub pos: Option<SourcePos>,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "Error [{}:{}]: {}", pos.line, pos.column, self.kind),
            None => write!(f, "Error: {}", self.kind),
        }
    }
}

/// Collects source diagnostics for one compilation unit.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    unit: String,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            diagnostics: Vec::new(),
        }
    }

    /// Record a diagnostic and keep going.
    pub fn error(&mut self, pos: Option<SourcePos>, kind: DiagnosticKind) {
        log::debug!("{}: {}", self.unit, kind);
        self.diagnostics.push(Diagnostic { pos, kind });
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Fail with every recorded diagnostic, or succeed if there are none.
    pub fn into_result(&mut self) -> CompileResult<()> {
        if self.diagnostics.is_empty() {
            return Ok(());
        }
        Err(CompileError::Source {
            unit: self.unit.clone(),
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }
}

fn at(pos: &Option<SourcePos>) -> String {
    match pos {
        Some(pos) => format!(" at {}:{}", pos.line, pos.column),
        None => String::new(),
    }
}

/// A defect in the compiler itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("no instruction pattern covers {node} for non-terminal '{symbol}'{}", at(.pos))]
    NoCoveringRule {
        node: String,
        symbol: char,
        pos: Option<SourcePos>,
    },

    #[error("rewrite invariant violated: {reason}")]
    RewriteInvariant { reason: String },

    #[error("malformed IR: {reason}")]
    MalformedIr { reason: String },

    #[error("register allocation failed: {reason}")]
    RegisterAllocation { reason: String },

    #[error("unreachable: {reason}")]
    Unreachable { reason: String },
}

/// Main error type of the backend.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{unit}: compilation aborted after {} error(s)", .diagnostics.len())]
    Source {
        unit: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Exit status used by the command-line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Source { .. } => 65,
            CompileError::Internal(_) => 70,
            CompileError::Io(_) => 74,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
