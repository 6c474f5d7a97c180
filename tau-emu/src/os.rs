//! The run loop that owns the CPU and hands stops to the debug stub.

use std::thread::{self, JoinHandle};

use log::{info, warn};

use tau_core::insn::Instruction;
use tau_core::messenger::{ChannelMessenger, Messenger};

use crate::cpu::{BreakReason, Cpu};
use crate::stub::DebugStub;

pub struct Os {
    cpu: Cpu,
    stub: Option<DebugStub>,
}

impl Os {
    pub fn new(cpu: Cpu) -> Os {
        Os { cpu, stub: None }
    }

    /// Attaches a debugger channel; the stub will then be entered on every
    /// stop, beginning with the pre-execution stop.
    pub fn attach_stub(&mut self, messenger: Box<dyn Messenger>) {
        self.stub = Some(DebugStub::new(messenger));
    }

    /// Runs the program to completion (or until the debugger terminates it).
    pub fn run(mut self) {
        if let Some(stub) = &mut self.stub {
            if !stub.work(&mut self.cpu, BreakReason::Begin) {
                return;
            }
        }
        loop {
            self.cpu.step();
            if let Some(reason) = self.cpu.take_break() {
                match &mut self.stub {
                    Some(stub) => {
                        if !stub.work(&mut self.cpu, reason) {
                            return;
                        }
                    }
                    None => match reason {
                        BreakReason::Halt => return,
                        BreakReason::CpuError => {
                            warn!("CPU error, aborting execution");
                            return;
                        }
                        // Without a debugger a BKPT is inert.
                        _ => {}
                    },
                }
            }
            if self.cpu.halted() || self.cpu.errored() {
                info!("program finished");
                return;
            }
        }
    }
}

/// Starts a VM on its own thread, already wired to a debugger channel, and
/// returns the driver-side messenger. This is the embedding used both by the
/// driver's `run` command and by the end-to-end tests.
pub fn spawn(
    program: Vec<Instruction>,
    gp_count: usize,
    float_count: usize,
    ram_size: usize,
) -> (JoinHandle<()>, ChannelMessenger) {
    let (driver_end, vm_end) = ChannelMessenger::pair();
    let handle = thread::spawn(move || {
        let cpu = Cpu::new(program, gp_count, float_count, ram_size);
        let mut os = Os::new(cpu);
        os.attach_stub(Box::new(vm_end));
        os.run();
    });
    (handle, driver_end)
}
