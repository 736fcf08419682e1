//! cubec - x86-64 backend of the Cube language compiler.
//!
//! cubec takes a type-annotated syntax tree, lowers every named access to
//! frame-pointer arithmetic, selects instructions with a cost-based tree
//! pattern matcher, allocates registers with linear scan and prints NASM
//! assembly text.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use cubec::{CompilationSession, Compiler, CompilerConfig};
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut compiler = Compiler::new(&session, CompilerConfig::default());
//! for unit in compiler.compile(units)? {
//!     println!("{}", unit.assembly);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - typed expression arena, statements and types
//! - [`symbols`] - scope tree, declarations and frame layout
//! - [`rewrite`] - canonical frame addressing
//! - [`select`] - matching automaton and instruction selection
//! - [`ir`] - three-address IR over virtual registers
//! - [`regalloc`] - linear-scan register allocation
//! - [`x64`] - register model, lowering to text and frames
//! - [`codegen`] - emitter and statement compiler
//! - [`driver`] - configuration and multi-unit compilation
//! - [`core`] - shared infrastructure (session, errors, register file)
//! - [`samples`] - bundled sample programs

pub mod ast;
pub mod codegen;
pub mod core;
pub mod driver;
pub mod ir;
pub mod regalloc;
pub mod rewrite;
pub mod samples;
pub mod select;
pub mod symbols;
pub mod x64;

pub use crate::core::{
    CompilationSession, CompileError, CompileResult, Diagnostic, DiagnosticKind, DiagnosticSink,
    InternalError, SessionStats,
};
pub use ast::{ExprArena, ExprId, ExprKind, Stmt, Type, Unit};
pub use driver::{CompilationContext, CompiledUnit, Compiler, CompilerConfig};
pub use ir::{IrOpcode, IrValue, Operand, TempReg};
pub use regalloc::{Allocation, LinearScan};
pub use select::{MatchingTrie, Selector};
