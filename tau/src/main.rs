mod cli;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

#[derive(Parser, Debug)]
#[command(about = "Source-level debugger for the Tau machine")]
struct Args {
    /// Program listing to debug (assembly plus optional debug info).
    program: Option<PathBuf>,

    /// Configuration file (defaults to ./tau.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let config = match config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let code = Cli::new(args.program, config).run();
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
