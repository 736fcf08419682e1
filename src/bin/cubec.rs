//! Command-line driver.
//!
//! Compiles the bundled sample programs to NASM assembly:
//!
//! ```text
//! cubec --list
//! cubec fibonacci euclidean --output out.asm --stats
//! cubec --annotate-ir --registers 2 register-pressure
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use bumpalo::Bump;
use clap::Parser;
use cubec::samples::{self, Sample};
use cubec::{CompilationSession, CompileError, CompileResult, Compiler, CompilerConfig};

#[derive(Parser, Debug)]
#[command(name = "cubec", version, about = "Compile Cube sample programs to x86-64 NASM assembly")]
struct Args {
    /// Samples to compile (all of them when none is given)
    samples: Vec<String>,

    /// List the bundled samples and exit
    #[arg(long)]
    list: bool,

    /// Write the assembly to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory holding the standard library `.asm` files
    #[arg(long, default_value = "lib")]
    stdlib: PathBuf,

    /// Prefix each lowered instruction group with its IR
    #[arg(long)]
    annotate_ir: bool,

    /// Number of temporary registers (1 to 6)
    #[arg(long, default_value_t = 6)]
    registers: usize,

    /// Print compilation statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if args.list {
        for sample in samples::all() {
            println!("{:<20} {}", sample.name, sample.description);
        }
        return;
    }

    if let Err(err) = run(&args) {
        eprintln!("{}", err);
        if let CompileError::Source { diagnostics, .. } = &err {
            for diagnostic in diagnostics {
                eprintln!("  {}", diagnostic);
            }
        }
        process::exit(err.exit_code());
    }
}

fn selected(args: &Args) -> Result<Vec<&'static Sample>, String> {
    if args.samples.is_empty() {
        return Ok(samples::all().iter().collect());
    }
    args.samples
        .iter()
        .map(|name| {
            samples::find(name).ok_or_else(|| format!("unknown sample `{}` (see --list)", name))
        })
        .collect()
}

fn run(args: &Args) -> CompileResult<()> {
    let chosen = match selected(args) {
        Ok(chosen) => chosen,
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(2);
        }
    };

    let config = CompilerConfig {
        stdlib_path: args.stdlib.clone(),
        annotate_ir: args.annotate_ir,
        register_count: args.registers,
    };

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut text = String::new();

    for sample in chosen {
        log::info!("Compiling sample {}", sample.name);
        let mut compiler = Compiler::new(&session, config.clone());
        for unit in compiler.compile(sample.units())? {
            text.push_str(&format!("; {}/{}.asm\n", sample.name, unit.name));
            text.push_str(&unit.assembly);
            text.push('\n');
        }
    }

    match &args.output {
        Some(path) => fs::write(path, &text)?,
        None => io::stdout().write_all(text.as_bytes())?,
    }

    if args.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}
