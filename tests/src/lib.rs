//! Shared harness for the end-to-end tests: runs a real VM on a second
//! thread, connected to the debugger through an in-process channel pair.

use std::thread::JoinHandle;

use tau_core::parse::{parse_listing, section};
use tau_dbg::arch::Arch;
use tau_dbg::native::Native;
use tau_dbg::proxy::TauProcess;
use tau_dbg::source::parser::parse_debug_info;
use tau_dbg::source::Source;
use tau_emu::os::spawn;

pub const DATA_SIZE: usize = 1024;

/// Boots `program` on its own thread and returns a connected controller.
pub fn start_vm(program: &str, gp_count: usize, float_count: usize) -> (Native, JoinHandle<()>) {
    let text = section(program, ".text").expect("the program should have a .text section");
    let listing = parse_listing(text).expect("the program should parse");
    let (handle, messenger) = spawn(listing, gp_count, float_count, DATA_SIZE);
    let proxy = TauProcess::new(Box::new(messenger), gp_count, float_count, DATA_SIZE);
    (Native::new(Box::new(proxy), Arch::tau()), handle)
}

/// Same as [`start_vm`], also parsing the program's debug-info sections.
pub fn start_vm_with_source(
    program: &str,
    gp_count: usize,
) -> (Native, Source, JoinHandle<()>) {
    let (native, handle) = start_vm(program, gp_count, 0);
    let parsed = parse_debug_info(program).expect("the debug info should parse");
    (native, Source::from_parsed(parsed), handle)
}

/// Ends the session and reaps the VM thread.
pub fn shutdown(mut native: Native, handle: JoinHandle<()>) {
    native.terminate().expect("terminate should succeed");
    handle.join().expect("the VM thread should exit cleanly");
}
