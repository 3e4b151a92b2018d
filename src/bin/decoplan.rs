use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use decoplan::{script, DecoError, ScriptError};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "decoplan")]
#[command(about = "Run a dive script and print a JSON snapshot at every report", long_about = None)]
struct Cli {
    /// Dive script to run (reads stdin when omitted)
    script: Option<PathBuf>,

    /// Pretty-print the snapshots
    #[arg(long)]
    pretty: bool,

    /// Log segments and plans to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Encoding(#[from] DecoError),

    #[error("cannot write output: {0}")]
    Write(#[source] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        decoplan::logging::init_with_level("debug");
    } else {
        decoplan::logging::init();
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("decoplan: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let source = match &cli.script {
        Some(path) => std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.display().to_string(),
            source,
        })?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|source| CliError::Read {
                    path: "stdin".to_string(),
                    source,
                })?;
            buffer
        }
    };

    let reports = script::run_script(&source)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        let json = report.to_json(cli.pretty)?;
        writeln!(out, "{json}").map_err(CliError::Write)?;
    }
    Ok(())
}
