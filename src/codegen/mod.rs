//! Code generation.
//!
//! - [`emitter`] - the [`Emitter`] sink, the unit text buffer and string literal data
//! - [`statements`] - functions, control flow and the per-statement IR flush

pub mod emitter;
pub mod statements;

pub use emitter::{AsmEmitter, Emitter, StringLiterals};
pub use statements::StatementCompiler;
