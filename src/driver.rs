// This module ties the pipeline together. A Compiler is created per invocation with a
// CompilerConfig and a shared CompilationSession; `compile` first collects the declarations of
// every unit (so units can call each other and use imported libraries), then compiles each unit
// in turn inside its own CompilationContext: frame layout builds the unit's symbol table, the
// rewriter lowers named access to frame addressing and the statement compiler produces text.
// Source diagnostics are collected per unit and abort that unit before code generation;
// internal errors abort immediately.

//! Compilation driver.

use std::path::PathBuf;

use crate::ast::Unit;
use crate::codegen::StatementCompiler;
use crate::core::{CompilationSession, CompileResult, DiagnosticSink};
use crate::rewrite::rewrite_unit;
use crate::select::Selector;
use crate::symbols::{layout_unit, Declarations, SymbolTable};
use crate::x64::TEMP_POOL;

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Directory holding the standard library `.asm` files.
    pub stdlib_path: PathBuf,
    /// Prefix every lowered instruction group with its IR as a comment.
    pub annotate_ir: bool,
    /// Number of temporary registers handed to the allocator (at most 6).
    pub register_count: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            stdlib_path: PathBuf::from("lib"),
            annotate_ir: false,
            register_count: TEMP_POOL.len(),
        }
    }
}

/// State of the unit being compiled.
#[derive(Debug)]
pub struct CompilationContext {
    pub unit: Unit,
    pub symbols: SymbolTable,
    pub sink: DiagnosticSink,
}

impl CompilationContext {
    pub fn new(unit: Unit) -> Self {
        let sink = DiagnosticSink::new(&unit.name);
        Self {
            unit,
            symbols: SymbolTable::new(),
            sink,
        }
    }
}

/// Assembly produced for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub name: String,
    pub assembly: String,
}

pub struct Compiler<'s, 'arena> {
    config: CompilerConfig,
    session: &'s CompilationSession<'arena>,
    selector: Selector,
    decls: Declarations,
}

impl<'s, 'arena> Compiler<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, config: CompilerConfig) -> Self {
        Self {
            config,
            session,
            selector: Selector::new(),
            decls: Declarations::new(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn declarations(&self) -> &Declarations {
        &self.decls
    }

    /// Compile `units` together, in order.
    pub fn compile(&mut self, units: Vec<Unit>) -> CompileResult<Vec<CompiledUnit>> {
        for unit in &units {
            let mut sink = DiagnosticSink::new(&unit.name);
            self.decls.collect_unit(unit, &mut sink);
            sink.into_result()?;
        }

        units
            .into_iter()
            .map(|unit| self.compile_unit(unit))
            .collect()
    }

    /// Compile one unit whose declarations have already been collected.
    pub fn compile_unit(&self, unit: Unit) -> CompileResult<CompiledUnit> {
        log::debug!("Compiling unit {}", unit.name);
        let mut context = CompilationContext::new(unit);

        context.symbols = layout_unit(&context.unit, &self.decls, &mut context.sink)?;
        context.sink.into_result()?;

        rewrite_unit(
            &mut context.unit,
            &context.symbols,
            &self.decls,
            &mut context.sink,
        );
        context.sink.into_result()?;

        let assembly = StatementCompiler::new(
            &context.unit,
            &context.symbols,
            &self.decls,
            self.session,
            &self.config,
            &self.selector,
        )
        .compile_unit(&context.unit)?;

        Ok(CompiledUnit {
            name: context.unit.name,
            assembly,
        })
    }
}
