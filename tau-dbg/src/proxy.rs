//! The wire-protocol client: a typed view of a VM reachable through a
//! [`Messenger`]. Each operation is one request/response exchange (reads of
//! whole register banks come back as one multi-line response); anything that
//! does not match the expected response shape is a fatal protocol error.

use std::collections::BTreeMap;
use std::str::FromStr;

use log::debug;

use tau_core::messenger::Messenger;
use tau_core::parse::parse_instruction;
use tau_core::protocol::{self, StopReason};
use tau_core::regs::{debug_reg_index, float_reg_index, RegName};

use crate::error::{DebuggerError, Result};
use crate::process::VmProcess;

/// Number of named debug registers, address slots plus the control slot.
const DEBUG_REGISTER_NAMES: usize = 5;

pub struct TauProcess {
    channel: Box<dyn Messenger>,
    gp_count: usize,
    float_count: usize,
    data_size: usize,
    text_size: Option<usize>,
}

impl TauProcess {
    pub fn new(
        channel: Box<dyn Messenger>,
        gp_count: usize,
        float_count: usize,
        data_size: usize,
    ) -> TauProcess {
        TauProcess {
            channel,
            gp_count,
            float_count,
            data_size,
            text_size: None,
        }
    }

    fn request(&mut self, message: &str) -> Result<String> {
        debug!("sending `{}`", message);
        self.channel.send(message);
        let response = self
            .channel
            .receive()
            .ok_or_else(|| DebuggerError::Protocol(format!("no response to '{}'", message)))?;
        debug!("received `{}`", response.trim_end());
        Ok(response)
    }

    fn check_ok(&mut self, message: &str) -> Result<()> {
        let response = self.request(message)?;
        if response == protocol::OK {
            Ok(())
        } else {
            Err(DebuggerError::Protocol(format!(
                "expected '{}' to '{}', got '{}'",
                protocol::OK,
                message,
                response
            )))
        }
    }

    fn fetch_bank<T: FromStr>(&mut self, command: &str) -> Result<BTreeMap<String, T>> {
        let response = self.request(command)?;
        let mut bank = BTreeMap::new();
        for line in response.lines().filter(|l| !l.is_empty()) {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                DebuggerError::Protocol(format!("malformed register line '{}'", line))
            })?;
            let value = value.trim().parse::<T>().map_err(|_| {
                DebuggerError::Protocol(format!("malformed register value in '{}'", line))
            })?;
            bank.insert(name.to_string(), value);
        }
        Ok(bank)
    }

    fn is_gp_register(&self, name: &str) -> bool {
        RegName::from_str(name).is_ok_and(|r| r.is_valid(self.gp_count))
    }

    fn is_float_register(&self, name: &str) -> bool {
        float_reg_index(name).is_some_and(|k| k < self.float_count)
    }

    fn is_debug_register(&self, name: &str) -> bool {
        debug_reg_index(name).is_some_and(|k| k < DEBUG_REGISTER_NAMES)
    }

    fn sized_response(&mut self, command: &str, expected: usize) -> Result<Vec<String>> {
        let response = self.request(command)?;
        let lines: Vec<String> = response.lines().map(str::to_owned).collect();
        if lines.len() != expected {
            return Err(DebuggerError::Protocol(format!(
                "expected {} lines to '{}', got {}",
                expected,
                command,
                lines.len()
            )));
        }
        Ok(lines)
    }

    fn tagged_number(&mut self, command: &str, tag: &str) -> Result<usize> {
        let response = self.request(command)?;
        response
            .strip_prefix(tag)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                DebuggerError::Protocol(format!("malformed response to '{}': '{}'", command, response))
            })
    }

    /// Number of general-purpose registers the VM actually has.
    pub fn reg_count(&mut self) -> Result<usize> {
        self.tagged_number("REGCOUNT", "REGCOUNT:")
    }

    /// RAM size as reported by the VM.
    pub fn data_size(&mut self) -> Result<usize> {
        self.tagged_number("DATASIZE", "DATASIZE:")
    }
}

/// Fails with `InvalidOperand` unless `[address, address + amount)` fits in
/// `[0, size)`.
fn check_range(address: u64, amount: usize, size: usize, what: &str) -> Result<()> {
    let end = usize::try_from(address)
        .ok()
        .and_then(|a| a.checked_add(amount));
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(DebuggerError::InvalidOperand(format!(
            "{} at range {}-{}, but size is {}",
            what,
            address,
            address.saturating_add(amount as u64),
            size
        ))),
    }
}

impl VmProcess for TauProcess {
    fn read_text(&mut self, address: u64, amount: usize) -> Result<Vec<String>> {
        let text_size = self.text_size()?;
        check_range(address, amount, text_size, "reading text")?;
        self.sized_response(&format!("PEEKTEXT {} {}", address, amount), amount)
    }

    fn write_text(&mut self, address: u64, text: &[String]) -> Result<()> {
        let text_size = self.text_size()?;
        check_range(address, text.len(), text_size, "writing text")?;
        for (i, ins) in text.iter().enumerate() {
            parse_instruction(ins).map_err(|e| {
                DebuggerError::InvalidOperand(format!("error in parsing instruction: {}", e))
            })?;
            self.check_ok(&format!("POKETEXT {} {}", address + i as u64, ins))?;
        }
        Ok(())
    }

    fn read_data(&mut self, address: u64, amount: usize) -> Result<Vec<i64>> {
        check_range(address, amount, self.data_size, "reading memory")?;
        let lines = self.sized_response(&format!("PEEKDATA {} {}", address, amount), amount)?;
        lines
            .iter()
            .map(|l| {
                l.trim().parse().map_err(|_| {
                    DebuggerError::Protocol(format!("malformed memory value '{}'", l))
                })
            })
            .collect()
    }

    fn write_data(&mut self, address: u64, data: &[i64]) -> Result<()> {
        check_range(address, data.len(), self.data_size, "writing memory")?;
        for (i, value) in data.iter().enumerate() {
            self.check_ok(&format!("POKEDATA {} {}", address + i as u64, value))?;
        }
        Ok(())
    }

    fn stop_reason(&mut self) -> Result<StopReason> {
        let response = self.request("REASON")?;
        StopReason::from_str(response.trim())
            .map_err(|_| DebuggerError::Protocol(format!("unknown stop reason '{}'", response)))
    }

    fn singlestep(&mut self) -> Result<()> {
        self.check_ok("SINGLESTEP")
    }

    fn fetch_registers(&mut self) -> Result<BTreeMap<String, i64>> {
        self.fetch_bank("PEEKREGS")
    }

    fn set_registers(&mut self, regs: &BTreeMap<String, i64>) -> Result<()> {
        for name in regs.keys() {
            if !self.is_gp_register(name) {
                return Err(DebuggerError::InvalidOperand(format!(
                    "register name '{}' is not valid",
                    name
                )));
            }
        }
        for (name, value) in regs {
            self.check_ok(&format!("POKEREGS {} {}", name, value))?;
        }
        Ok(())
    }

    fn fetch_float_registers(&mut self) -> Result<BTreeMap<String, f64>> {
        self.fetch_bank("PEEKFLOATREGS")
    }

    fn set_float_registers(&mut self, regs: &BTreeMap<String, f64>) -> Result<()> {
        for name in regs.keys() {
            if !self.is_float_register(name) {
                return Err(DebuggerError::InvalidOperand(format!(
                    "register name '{}' is not valid",
                    name
                )));
            }
        }
        for (name, value) in regs {
            self.check_ok(&format!("POKEFLOATREGS {} {}", name, value))?;
        }
        Ok(())
    }

    fn fetch_debug_registers(&mut self) -> Result<BTreeMap<String, u64>> {
        self.fetch_bank("PEEKDEBUGREGS")
    }

    fn set_debug_registers(&mut self, regs: &BTreeMap<String, u64>) -> Result<()> {
        for name in regs.keys() {
            if !self.is_debug_register(name) {
                return Err(DebuggerError::InvalidOperand(format!(
                    "register name '{}' is not valid",
                    name
                )));
            }
        }
        for (name, value) in regs {
            self.check_ok(&format!("POKEDEBUGREGS {} {}", name, value))?;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.check_ok("CONTINUE")
    }

    fn wait(&mut self) -> Result<()> {
        let message = self
            .channel
            .receive()
            .ok_or_else(|| DebuggerError::Protocol("the VM went away while waiting".to_string()))?;
        if message == protocol::STOPPED {
            Ok(())
        } else {
            Err(DebuggerError::Protocol(format!(
                "expected '{}' while waiting, got '{}'",
                protocol::STOPPED,
                message
            )))
        }
    }

    fn text_size(&mut self) -> Result<usize> {
        if let Some(size) = self.text_size {
            return Ok(size);
        }
        let size = self.tagged_number("TEXTSIZE", "TEXTSIZE:")?;
        self.text_size = Some(size);
        Ok(size)
    }

    fn terminate(&mut self) -> Result<()> {
        self.check_ok("TERMINATE")
    }
}
