// This module is the shared infrastructure of cubec, used by every pipeline stage and
// independent of the Cube language itself. It exports three subsystems: session management
// (arena-based string interning and compilation statistics), error handling (source
// diagnostics collected per unit, internal compiler errors, exit codes) and the physical
// register file (a bit set of free slots handed out lowest-first to the linear-scan
// allocator).

//! Core cubec infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based string interning using `bumpalo`
//! - Compilation statistics
//!
//! ## Errors (`error`)
//! - Source diagnostics collected through a [`DiagnosticSink`]
//! - Internal compiler errors that always abort
//!
//! ## Register File (`register_file`)
//! - Bit-set tracking of free physical slots

pub mod error;
pub mod register_file;
pub mod session;

// Re-export core components
pub use session::{CompilationSession, SessionStats};

pub use register_file::{PhysReg, RegAllocError, RegBitSet, RegisterFile};

pub use error::{
    CompileError, CompileResult, Diagnostic, DiagnosticKind, DiagnosticSink, InternalError,
};
