//! duosh CLI entry point.
//!
//! Usage:
//!   duosh <chunk.json>         # Run a chunk file
//!   duosh -c <json>            # Run a chunk given inline

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(duosh_cli::EXIT_FAILURE)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None | Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("duosh {} ({})", env!("CARGO_PKG_VERSION"), env!("DUOSH_GIT_HASH"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let json = args.get(2).context("-c requires a chunk argument")?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let kernel = duosh_cli::make_kernel()?;
                duosh_cli::run_json(&kernel, json, "[-c]").await
            })?
            .emit()
        }

        Some(path) if !path.starts_with('-') => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let kernel = duosh_cli::make_kernel()?;
                duosh_cli::run_file(&kernel, Path::new(path)).await
            })?
            .emit()
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'duosh --help' for usage.");
            Ok(ExitCode::from(duosh_cli::EXIT_COMPILE))
        }
    }
}

fn print_help() {
    println!(
        r#"duosh v{}

Usage:
  duosh <chunk.json>           Run a parsed chunk from a file
  duosh -c <json>              Run a parsed chunk given inline

Options:
  -c <json>                    Run the chunk and exit
  -h, --help                   Show this help
  -V, --version                Show version

Value output is printed one per line after byte output, prefixed with ▶.
Exit status is 0 on success, 1 when an exception escapes, 2 when the
chunk does not compile.

Environment:
  RUST_LOG                     Tracing filter (e.g. duosh_kernel=debug)
  DUOSH_MODULE_ROOT            Directory `use` resolves modules against
"#,
        env!("CARGO_PKG_VERSION")
    );
}
