//! soawrap driver binary.
//!
//! Loads a function compiled under the internal convention from textual
//! LLVM IR and prints the assembly (or linked IR) of its SoA entry point.
//!
//! ```text
//! soawrap demos/addsub.ll --name addsub --signature 'UniTuple(int32 x 2)(int32, int32)'
//! ```

use clap::{Parser, ValueEnum};
use inkwell::context::Context;
use inkwell::OptimizationLevel;
use soawrap::compiler::{compile_asm_soa, compile_llvm_soa, load_function_ir, Output};
use soawrap::core::{CompilerLock, Signature};
use soawrap::llvm::{BuildOptions, Codegen, TargetSpec};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

/// Wrap internal-convention functions in structure-of-arrays entry points
#[derive(Parser)]
#[command(name = "soawrap")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Textual LLVM IR defining the function
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Source-level function name, also the name of the SoA entry point
    #[arg(long)]
    name: String,

    /// Function signature, e.g. 'UniTuple(int32 x 2)(int32, int32)'
    #[arg(long)]
    signature: String,

    /// Symbol of the internal definition (defaults to the mangled name)
    #[arg(long)]
    symbol: Option<String>,

    /// Target triple (defaults to the host)
    #[arg(long)]
    triple: Option<String>,

    /// Target CPU
    #[arg(long)]
    cpu: Option<String>,

    /// Target features
    #[arg(long)]
    features: Option<String>,

    /// Optimization level
    #[arg(short = 'O', default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,

    /// Relax IEEE floating point semantics
    #[arg(long)]
    fastmath: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Emit the internal-convention function without a wrapper
    #[arg(long)]
    internal: bool,

    /// Print session statistics to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Emit {
    Asm,
    Llvm,
}

impl Cli {
    fn build_options(&self) -> BuildOptions {
        let opt_level = match self.opt_level {
            0 => OptimizationLevel::None,
            1 => OptimizationLevel::Less,
            2 => OptimizationLevel::Default,
            _ => OptimizationLevel::Aggressive,
        };

        let mut target = match &self.triple {
            Some(triple) => TargetSpec::from_triple(triple.as_str()),
            None => TargetSpec::native(),
        };
        if let Some(cpu) = &self.cpu {
            target = target.with_cpu(cpu.as_str());
        }
        if let Some(features) = &self.features {
            target = target.with_features(features.as_str());
        }

        BuildOptions::native(opt_level)
            .with_fastmath(self.fastmath)
            .with_target(target)
    }

    fn output(&self) -> Output {
        if self.internal {
            Output::Internal
        } else {
            Output::Soa
        }
    }
}

fn run(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let ir = fs::read_to_string(&cli.input)?;
    let signature: Signature = cli.signature.parse()?;

    let session = CompilerLock::global().acquire();
    let context = Context::create();
    let codegen = Codegen::new(&context, cli.build_options())?;
    let compiled = load_function_ir(
        &session,
        &codegen,
        &cli.name,
        signature,
        &ir,
        cli.symbol.as_deref(),
    )?;

    let text = match cli.emit {
        Emit::Asm => compile_asm_soa(&session, &compiled, cli.output())?.asm,
        Emit::Llvm => compile_llvm_soa(&session, &compiled, cli.output())?,
    };
    if cli.verbose {
        eprint!("{}", session.stats());
    }
    Ok(text)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
