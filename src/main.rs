use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use riscii::c::{compile, Options};
use simplelog::LevelFilter;

/// Compiles a C-subset source file for the RISCII processor.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The `.c` file to compile.
    source: PathBuf,

    /// Fold constant branches and propagate single-assignment constants.
    #[arg(short = 'O', long)]
    optimize: bool,

    /// Also write the assembly listing.
    #[arg(short = 's', long)]
    asm: bool,

    /// Show informational diagnostics.
    #[arg(short, long)]
    verbose: bool,

    /// Treat warnings as errors.
    #[arg(short = 'W', long)]
    werror: bool,

    /// Output file stem. Defaults to the source path without its extension.
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    let src = fs::read_to_string(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let opts = Options {
        optimize: args.optimize,
        werror: args.werror,
    };
    let output = compile(&src, opts)?;

    let stem = args
        .out
        .clone()
        .unwrap_or_else(|| args.source.with_extension(""));
    let hex_path = stem.with_extension("hex");
    fs::write(&hex_path, &output.hex)
        .with_context(|| format!("writing {}", hex_path.display()))?;
    if args.asm {
        let asm_path = stem.with_extension("asm");
        fs::write(&asm_path, &output.asm)
            .with_context(|| format!("writing {}", asm_path.display()))?;
    }
    log::info!(
        "{} words written to {}",
        output.words.len(),
        hex_path.display()
    );
    Ok(())
}

/// Anything below warnings is shown only with `--verbose`. Debug builds then trace everything.
fn log_level(verbose: bool, tracing: bool) -> LevelFilter {
    match (verbose, tracing) {
        (false, _) => LevelFilter::Warn,
        (true, true) => LevelFilter::Trace,
        (true, false) => LevelFilter::Info,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = simplelog::TermLogger::init(
        log_level(args.verbose, cfg!(debug_assertions)),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("could not start logging: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
