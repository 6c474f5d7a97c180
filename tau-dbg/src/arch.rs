use std::collections::BTreeMap;

use crate::error::{DebuggerError, Result};

/// Machine capabilities the native controller needs. One value is threaded
/// into the controller at construction, so a second target only has to add a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arch {
    machine: Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Machine {
    Tau,
}

const ACTIVE_MASK: u64 = 0xF;
const RESPONSIBLE_SHIFT: u64 = 8;

impl Arch {
    pub fn tau() -> Arch {
        Arch {
            machine: Machine::Tau,
        }
    }

    pub fn supports_hw_single_step(&self) -> bool {
        match self.machine {
            Machine::Tau => true,
        }
    }

    pub fn supports_hw_watchpoints(&self) -> bool {
        match self.machine {
            Machine::Tau => true,
        }
    }

    /// The instruction the VM recognizes as a stop request.
    pub fn breakpoint_opcode(&self) -> &'static str {
        match self.machine {
            Machine::Tau => "BKPT",
        }
    }

    /// Number of watch-address slots (the control slot is separate).
    pub fn debug_register_count(&self) -> usize {
        match self.machine {
            Machine::Tau => 4,
        }
    }

    pub fn call_mnemonics(&self) -> &'static [&'static str] {
        match self.machine {
            Machine::Tau => &["CALL"],
        }
    }

    pub fn return_mnemonics(&self) -> &'static [&'static str] {
        match self.machine {
            Machine::Tau => &["RET"],
        }
    }

    pub fn program_counter(&self) -> &'static str {
        match self.machine {
            Machine::Tau => "IP",
        }
    }

    fn control_register(&self) -> &'static str {
        match self.machine {
            Machine::Tau => "D4",
        }
    }

    /// Points debug-register slot `idx` at `address`.
    pub fn set_debug_register(
        &self,
        idx: usize,
        address: u64,
        regs: &mut BTreeMap<String, u64>,
    ) -> Result<()> {
        if idx >= self.debug_register_count() {
            return Err(DebuggerError::InvalidOperand(format!(
                "debug register index {} out of bounds",
                idx
            )));
        }
        *self.slot(regs, &format!("D{}", idx))? = address;
        Ok(())
    }

    /// Sets the active bit for slot `idx` in the control register.
    pub fn activate_debug_register(
        &self,
        idx: usize,
        regs: &mut BTreeMap<String, u64>,
    ) -> Result<()> {
        *self.slot(regs, self.control_register())? |= 1 << idx;
        Ok(())
    }

    /// Clears the active bit for slot `idx` in the control register.
    pub fn deactivate_debug_register(
        &self,
        idx: usize,
        regs: &mut BTreeMap<String, u64>,
    ) -> Result<()> {
        *self.slot(regs, self.control_register())? &= !(1 << idx);
        Ok(())
    }

    /// Extracts the slot that caused the last hardware break from the
    /// control register.
    pub fn responsible_register(&self, regs: &BTreeMap<String, u64>) -> Result<usize> {
        let control = regs.get(self.control_register()).ok_or_else(|| {
            DebuggerError::Protocol(format!(
                "debug register bank is missing {}",
                self.control_register()
            ))
        })?;
        let masked = (control >> RESPONSIBLE_SHIFT) & ACTIVE_MASK;
        if masked == 0 {
            return Err(DebuggerError::Protocol(
                "control register does not name a responsible slot".to_string(),
            ));
        }
        Ok(masked.trailing_zeros() as usize)
    }

    fn slot<'a>(&self, regs: &'a mut BTreeMap<String, u64>, name: &str) -> Result<&'a mut u64> {
        regs.get_mut(name).ok_or_else(|| {
            DebuggerError::Protocol(format!("debug register bank is missing {}", name))
        })
    }
}
