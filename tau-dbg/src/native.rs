//! The native controller: turns the raw VM primitives of [`VmProcess`] into
//! a coherent debugging abstraction. Owns the breakpoint and watchpoint
//! tables and is the single choke point for text reads and writes, so
//! callers never observe the breakpoint patches.

use std::collections::BTreeMap;

use log::{debug, info};

use tau_core::messenger::TcpMessenger;
use tau_core::parse::parse_instruction;

use crate::arch::Arch;
use crate::error::{DebuggerError, Result};
use crate::event::{BreakpointKind, DebugEvent, StopReason, WatchpointKind};
use crate::process::VmProcess;
use crate::proxy::TauProcess;

/// A software breakpoint: the instruction text the opcode replaced, and
/// whether the patch is currently in the VM.
///
/// While enabled the VM's text at the address is the breakpoint opcode;
/// while disabled it is `saved`. Every text access through this controller
/// maintains that invariant transparently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareBreakpoint {
    pub saved: String,
    pub enabled: bool,
}

/// A watchpoint bound to one hardware debug-register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchpoint {
    pub kind: WatchpointKind,
    pub hw_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Alive,
    Ended,
    Errored,
}

pub struct Native {
    process: Box<dyn VmProcess>,
    arch: Arch,
    breakpoints: BTreeMap<u64, SoftwareBreakpoint>,
    watchpoints: BTreeMap<u64, Watchpoint>,
    cached_event: Option<DebugEvent>,
    state: SessionState,
}

impl Native {
    pub fn new(process: Box<dyn VmProcess>, arch: Arch) -> Native {
        Native {
            process,
            arch,
            breakpoints: BTreeMap::new(),
            watchpoints: BTreeMap::new(),
            cached_event: None,
            state: SessionState::Alive,
        }
    }

    /// Connects to a VM listening on `port` and wraps it.
    pub fn connect(
        port: u16,
        arch: Arch,
        gp_count: usize,
        float_count: usize,
        data_size: usize,
    ) -> Result<Native> {
        let messenger = TcpMessenger::connect(port).map_err(|e| {
            DebuggerError::Protocol(format!("cannot connect to port {}: {}", port, e))
        })?;
        let process = TauProcess::new(Box::new(messenger), gp_count, float_count, data_size);
        Ok(Native::new(Box::new(process), arch))
    }

    // ----- software breakpoints -----

    /// Creates a breakpoint at `address` and enables it. Fails on a
    /// double-set.
    pub fn set_breakpoint(&mut self, address: u64) -> Result<()> {
        if self.breakpoints.contains_key(&address) {
            return Err(DebuggerError::StateConflict(format!(
                "breakpoint at {} is already set",
                address
            )));
        }
        let saved = self.process.read_text(address, 1)?.remove(0);
        self.install_opcode(address)?;
        debug!("breakpoint installed at {}, saved '{}'", address, saved);
        self.breakpoints
            .insert(address, SoftwareBreakpoint { saved, enabled: true });
        Ok(())
    }

    /// Disables and removes the breakpoint at `address`.
    pub fn unset_breakpoint(&mut self, address: u64) -> Result<()> {
        self.disable_breakpoint(address)?;
        self.breakpoints.remove(&address);
        Ok(())
    }

    /// Re-enables a disabled breakpoint. No-op when already enabled, error
    /// when no breakpoint exists at `address`.
    pub fn enable_breakpoint(&mut self, address: u64) -> Result<()> {
        match self.breakpoints.get(&address) {
            None => {
                return Err(DebuggerError::StateConflict(format!(
                    "no breakpoint at address {}",
                    address
                )))
            }
            Some(bp) if bp.enabled => return Ok(()),
            Some(_) => {}
        }
        self.install_opcode(address)?;
        if let Some(bp) = self.breakpoints.get_mut(&address) {
            bp.enabled = true;
        }
        Ok(())
    }

    /// Restores the saved instruction but keeps the record. No-op when
    /// already disabled, error when no breakpoint exists at `address`.
    pub fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
        let Some(bp) = self.breakpoints.get(&address) else {
            return Err(DebuggerError::StateConflict(format!(
                "no breakpoint at address {}",
                address
            )));
        };
        if !bp.enabled {
            return Ok(());
        }
        let saved = bp.saved.clone();
        self.process.write_text(address, &[saved])?;
        if let Some(bp) = self.breakpoints.get_mut(&address) {
            bp.enabled = false;
        }
        Ok(())
    }

    /// Writes the breakpoint opcode at `address` and read-back-verifies it.
    fn install_opcode(&mut self, address: u64) -> Result<()> {
        let opcode = self.arch.breakpoint_opcode();
        self.process.write_text(address, &[opcode.to_string()])?;
        let readback = self.process.read_text(address, 1)?.remove(0);
        if readback != opcode {
            return Err(DebuggerError::Protocol(format!(
                "failed to set breakpoint, expected opcode '{}', got '{}'",
                opcode, readback
            )));
        }
        Ok(())
    }

    // ----- text access, patches hidden -----

    /// Reads instructions; addresses covered by an enabled breakpoint come
    /// back as the saved instruction, never as the breakpoint opcode.
    pub fn read_text(&mut self, address: u64, amount: usize) -> Result<Vec<String>> {
        self.check_text_range(address, amount, "reading")?;
        let mut text = self.process.read_text(address, amount)?;
        for (i, item) in text.iter_mut().enumerate() {
            if let Some(bp) = self.breakpoints.get(&(address + i as u64)) {
                if bp.enabled {
                    item.clone_from(&bp.saved);
                }
            }
        }
        Ok(text)
    }

    /// Writes instructions. Where an enabled breakpoint covers an address
    /// the new instruction goes into its saved slot and the opcode stays in
    /// the VM, so the patch survives the write.
    pub fn write_text(&mut self, address: u64, text: &[String]) -> Result<()> {
        self.check_text_range(address, text.len(), "writing")?;
        let mut outgoing = text.to_vec();
        for (i, item) in outgoing.iter_mut().enumerate() {
            let current = address + i as u64;
            if let Some(bp) = self.breakpoints.get_mut(&current) {
                if bp.enabled {
                    parse_instruction(item).map_err(|e| {
                        DebuggerError::InvalidOperand(format!(
                            "error in parsing instruction: {}",
                            e
                        ))
                    })?;
                    bp.saved.clone_from(item);
                    *item = self.arch.breakpoint_opcode().to_string();
                }
            }
        }
        self.process.write_text(address, &outgoing)
    }

    fn check_text_range(&mut self, address: u64, amount: usize, action: &str) -> Result<()> {
        let text_size = self.process.text_size()?;
        let end = usize::try_from(address)
            .ok()
            .and_then(|a| a.checked_add(amount));
        match end {
            Some(end) if end <= text_size => Ok(()),
            _ => Err(DebuggerError::InvalidOperand(format!(
                "{} text at range {}-{}, but text size is {}",
                action,
                address,
                address.saturating_add(amount as u64),
                text_size
            ))),
        }
    }

    // ----- stepping -----

    /// Executes one instruction, stepping over a breakpoint at the current
    /// IP if there is one.
    pub fn single_step(&mut self) -> Result<DebugEvent> {
        self.check_continuable()?;
        if !self.arch.supports_hw_single_step() {
            return Err(DebuggerError::StateConflict(
                "single-stepping is not supported on this machine".to_string(),
            ));
        }
        let ip = self.get_ip()?;
        if self.breakpoints.get(&ip).is_some_and(|bp| bp.enabled) {
            self.step_over_breakpoint(ip)
        } else {
            self.raw_step()
        }
    }

    /// One hardware step with no breakpoint awareness.
    pub fn raw_step(&mut self) -> Result<DebugEvent> {
        self.process.singlestep()?;
        self.wait_for_event()
    }

    /// Disables the breakpoint under `ip`, steps, re-enables it, and hands
    /// back whatever event the step produced.
    fn step_over_breakpoint(&mut self, ip: u64) -> Result<DebugEvent> {
        self.disable_breakpoint(ip)?;
        let event = self.raw_step()?;
        self.enable_breakpoint(ip)?;
        Ok(event)
    }

    /// Steps one instruction, treating a call as a single unit: on a call
    /// instruction runs until control returns to the following address.
    /// With `skip_breakpoints` unset the current instruction is stepped
    /// raw, so a breakpoint on it would re-trigger.
    ///
    /// Returns `Singlestep` when the step completed normally; any other
    /// event (say a breakpoint inside the callee) is returned as-is.
    pub fn step_over(&mut self, skip_breakpoints: bool) -> Result<DebugEvent> {
        self.check_continuable()?;
        let ip = self.get_ip()?;
        let current = self.read_text(ip, 1)?.remove(0);
        let is_call = self
            .arch
            .call_mnemonics()
            .iter()
            .any(|m| current.starts_with(m));
        if !is_call {
            return if skip_breakpoints {
                self.single_step()
            } else {
                self.raw_step()
            };
        }

        let return_to = ip + 1;
        let temporary = !self.breakpoints.contains_key(&return_to);
        if temporary {
            self.set_breakpoint(return_to)?;
        }
        // Step off the call site first, so a breakpoint on it is honored
        // before the target runs.
        if skip_breakpoints {
            let event = self.single_step()?;
            if event != DebugEvent::Singlestep {
                if temporary {
                    self.unset_breakpoint(return_to)?;
                }
                return Ok(event);
            }
        }
        self.continue_execution()?;
        let event = self.wait_for_event()?;
        if temporary {
            self.unset_breakpoint(return_to)?;
        }
        if self.get_ip()? == return_to {
            Ok(DebugEvent::Singlestep)
        } else {
            Ok(event)
        }
    }

    /// Runs until the current function returns: steps over everything until
    /// a return instruction is reached, then steps it. Any event other than
    /// a plain step cuts the walk short and is returned immediately.
    pub fn step_out(&mut self) -> Result<DebugEvent> {
        self.check_continuable()?;
        loop {
            let ip = self.get_ip()?;
            let current = self.read_text(ip, 1)?.remove(0);
            let is_return = self
                .arch
                .return_mnemonics()
                .iter()
                .any(|m| current.starts_with(m));
            if is_return {
                return self.single_step();
            }
            let event = self.step_over(true)?;
            if event != DebugEvent::Singlestep {
                return Ok(event);
            }
        }
    }

    // ----- events -----

    /// Returns the next debug event, draining a cached one first. Fresh
    /// software-breakpoint stops reposition the IP onto the breakpoint
    /// instruction; replayed cached events were adjusted when they were
    /// produced.
    pub fn wait_for_event(&mut self) -> Result<DebugEvent> {
        if let Some(event) = self.cached_event.take() {
            debug!("draining cached event {:?}", event);
            return Ok(event);
        }
        self.process.wait()?;
        let reason = self.process.stop_reason()?;
        self.map_stop_reason(reason)
    }

    fn map_stop_reason(&mut self, reason: StopReason) -> Result<DebugEvent> {
        let event = match reason {
            StopReason::ExecutionBegin => DebugEvent::ExecutionBegin,
            StopReason::Singlestep => DebugEvent::Singlestep,
            StopReason::ExecutionEnd => {
                self.state = SessionState::Ended;
                DebugEvent::ExecutionEnd
            }
            StopReason::CpuError => {
                self.state = SessionState::Errored;
                // The VM's reported IP is known-imprecise here; pass it on
                // untouched.
                DebugEvent::CpuError {
                    address: self.get_ip()?,
                }
            }
            StopReason::SoftwareBreakpointHit => {
                let address = self.get_ip()?.wrapping_sub(1);
                self.set_ip(address)?;
                DebugEvent::BreakpointHit {
                    kind: BreakpointKind::Software,
                    address,
                }
            }
            StopReason::HardwareBreak => {
                // Read the bank eagerly so later driver actions cannot
                // clobber the responsible-slot bits.
                let dregs = self.process.fetch_debug_registers()?;
                let idx = self.arch.responsible_register(&dregs)?;
                let address = self
                    .watchpoints
                    .iter()
                    .find(|(_, w)| w.hw_index == idx)
                    .map(|(a, _)| *a)
                    .ok_or_else(|| {
                        DebuggerError::Protocol(format!(
                            "no watchpoint occupies debug register {}",
                            idx
                        ))
                    })?;
                DebugEvent::WatchpointTrigger {
                    kind: WatchpointKind::Write,
                    address,
                }
            }
        };
        info!("stop mapped to {:?}", event);
        Ok(event)
    }

    /// Resumes the debuggee. A breakpoint under the IP is stepped over
    /// first; if that step surfaces a real event it is cached for the next
    /// `wait_for_event` and the VM is left stopped.
    pub fn continue_execution(&mut self) -> Result<()> {
        self.check_continuable()?;
        let ip = self.get_ip()?;
        if self.breakpoints.get(&ip).is_some_and(|bp| bp.enabled) {
            let event = self.step_over_breakpoint(ip)?;
            if event != DebugEvent::Singlestep {
                self.cached_event = Some(event);
                return Ok(());
            }
        }
        self.process.resume()
    }

    fn check_continuable(&self) -> Result<()> {
        match self.state {
            SessionState::Alive => Ok(()),
            SessionState::Ended => Err(DebuggerError::StateConflict(
                "the process has finished execution".to_string(),
            )),
            SessionState::Errored => Err(DebuggerError::StateConflict(
                "the CPU is in an error state, execution cannot continue".to_string(),
            )),
        }
    }

    // ----- watchpoints -----

    /// Installs a write watchpoint on a data address, taking the lowest
    /// free debug-register slot.
    pub fn set_watchpoint_write(&mut self, address: u64) -> Result<()> {
        if !self.arch.supports_hw_watchpoints() {
            return Err(DebuggerError::StateConflict(
                "this machine does not support watchpoints".to_string(),
            ));
        }
        if self.watchpoints.contains_key(&address) {
            return Err(DebuggerError::StateConflict(format!(
                "a watchpoint is already set on address {}",
                address
            )));
        }
        let Some(idx) = self.free_debug_register() else {
            return Err(DebuggerError::ResourceExhausted(
                "all hardware watchpoints are in use".to_string(),
            ));
        };
        let mut dregs = self.process.fetch_debug_registers()?;
        self.arch.set_debug_register(idx, address, &mut dregs)?;
        self.arch.activate_debug_register(idx, &mut dregs)?;
        self.process.set_debug_registers(&dregs)?;
        debug!("watchpoint on {} occupies debug register {}", address, idx);
        self.watchpoints.insert(
            address,
            Watchpoint {
                kind: WatchpointKind::Write,
                hw_index: idx,
            },
        );
        Ok(())
    }

    /// Removes the watchpoint on `address` and frees its slot.
    pub fn remove_watchpoint(&mut self, address: u64) -> Result<()> {
        let Some(wp) = self.watchpoints.get(&address) else {
            return Err(DebuggerError::StateConflict(format!(
                "no watchpoint on address {}",
                address
            )));
        };
        let idx = wp.hw_index;
        let mut dregs = self.process.fetch_debug_registers()?;
        self.arch.deactivate_debug_register(idx, &mut dregs)?;
        self.process.set_debug_registers(&dregs)?;
        self.watchpoints.remove(&address);
        Ok(())
    }

    fn free_debug_register(&self) -> Option<usize> {
        (0..self.arch.debug_register_count())
            .find(|idx| !self.watchpoints.values().any(|w| w.hw_index == *idx))
    }

    // ----- session reinstallation -----

    /// Drops all current breakpoints and installs the given set instead.
    /// Used when a fresh VM session should inherit the previous session's
    /// breakpoints.
    pub fn set_all_breakpoints(
        &mut self,
        breakpoints: BTreeMap<u64, SoftwareBreakpoint>,
    ) -> Result<()> {
        let existing: Vec<u64> = self.breakpoints.keys().copied().collect();
        for address in existing {
            self.disable_breakpoint(address)?;
        }
        self.breakpoints.clear();
        for (address, bp) in breakpoints {
            if bp.enabled {
                self.set_breakpoint(address)?;
            } else {
                let saved = self.process.read_text(address, 1)?.remove(0);
                self.breakpoints
                    .insert(address, SoftwareBreakpoint { saved, enabled: false });
            }
        }
        Ok(())
    }

    /// Same as `set_all_breakpoints`, for watchpoints.
    pub fn set_all_watchpoints(&mut self, watchpoints: BTreeMap<u64, Watchpoint>) -> Result<()> {
        let existing: Vec<u64> = self.watchpoints.keys().copied().collect();
        for address in existing {
            self.remove_watchpoint(address)?;
        }
        for address in watchpoints.keys() {
            self.set_watchpoint_write(*address)?;
        }
        Ok(())
    }

    pub fn breakpoints(&self) -> &BTreeMap<u64, SoftwareBreakpoint> {
        &self.breakpoints
    }

    pub fn watchpoints(&self) -> &BTreeMap<u64, Watchpoint> {
        &self.watchpoints
    }

    // ----- registers and memory -----

    pub fn get_registers(&mut self) -> Result<BTreeMap<String, i64>> {
        self.process.fetch_registers()
    }

    pub fn set_registers(&mut self, regs: &BTreeMap<String, i64>) -> Result<()> {
        self.process.set_registers(regs)
    }

    pub fn get_register(&mut self, name: &str) -> Result<i64> {
        self.process.fetch_registers()?.get(name).copied().ok_or_else(|| {
            DebuggerError::InvalidOperand(format!("no register '{}' in target", name))
        })
    }

    pub fn set_register(&mut self, name: &str, value: i64) -> Result<()> {
        let regs = BTreeMap::from([(name.to_string(), value)]);
        self.process.set_registers(&regs)
    }

    pub fn get_float_registers(&mut self) -> Result<BTreeMap<String, f64>> {
        self.process.fetch_float_registers()
    }

    pub fn set_float_registers(&mut self, regs: &BTreeMap<String, f64>) -> Result<()> {
        self.process.set_float_registers(regs)
    }

    pub fn get_float_register(&mut self, name: &str) -> Result<f64> {
        self.process
            .fetch_float_registers()?
            .get(name)
            .copied()
            .ok_or_else(|| {
                DebuggerError::InvalidOperand(format!("'{}' is not a float register", name))
            })
    }

    pub fn set_float_register(&mut self, name: &str, value: f64) -> Result<()> {
        let regs = BTreeMap::from([(name.to_string(), value)]);
        self.process.set_float_registers(&regs)
    }

    pub fn get_ip(&mut self) -> Result<u64> {
        Ok(self.get_register(self.arch.program_counter())? as u64)
    }

    fn set_ip(&mut self, address: u64) -> Result<()> {
        let name = self.arch.program_counter();
        self.set_register(name, address as i64)
    }

    pub fn read_memory(&mut self, address: u64, amount: usize) -> Result<Vec<i64>> {
        self.process.read_data(address, amount)
    }

    pub fn write_memory(&mut self, address: u64, values: &[i64]) -> Result<()> {
        self.process.write_data(address, values)
    }

    pub fn text_size(&mut self) -> Result<usize> {
        self.process.text_size()
    }

    /// Ends the debuggee; the controller must not be used afterwards.
    pub fn terminate(&mut self) -> Result<()> {
        self.process.terminate()
    }
}
