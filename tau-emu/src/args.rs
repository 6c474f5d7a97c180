use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "The Tau virtual machine")]
pub struct Args {
    /// Program listing to execute.
    pub program: PathBuf,

    /// Number of general-purpose registers.
    #[arg(long, default_value_t = 8)]
    pub registers: usize,

    /// Number of float registers.
    #[arg(long, default_value_t = 4)]
    pub float_registers: usize,

    /// RAM size in cells.
    #[arg(long, default_value_t = 1024)]
    pub ram: usize,

    /// Listen for a debugger on this port before running.
    #[arg(long)]
    pub port: Option<u16>,
}
