use std::fs;
use std::net::TcpListener;

use clap::Parser;
use log::info;

use tau_core::messenger::TcpMessenger;
use tau_core::parse::{parse_listing, section};
use tau_emu::args::Args;
use tau_emu::cpu::Cpu;
use tau_emu::os::Os;

fn main() -> Result<(), String> {
    env_logger::init();
    let args = Args::parse();

    let content = fs::read_to_string(&args.program)
        .map_err(|e| format!("cannot read '{}': {}", args.program.display(), e))?;
    let text = section(&content, ".text")
        .ok_or_else(|| format!("'{}' has no .text section", args.program.display()))?;
    let program = parse_listing(text).map_err(|e| format!("parse error: {}", e))?;

    let cpu = Cpu::new(program, args.registers, args.float_registers, args.ram);
    let mut os = Os::new(cpu);

    if let Some(port) = args.port {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| format!("cannot listen on port {}: {}", port, e))?;
        info!("waiting for a debugger on port {}", port);
        let messenger = TcpMessenger::accept(&listener)
            .map_err(|e| format!("failed to accept a debugger: {}", e))?;
        os.attach_stub(Box::new(messenger));
    }

    os.run();
    Ok(())
}
