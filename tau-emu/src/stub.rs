//! The in-VM debug stub. Entered on every CPU stop, it announces the stop to
//! the debugger and then serves wire-protocol commands against live CPU
//! state until the debugger releases the CPU again.

use std::str::FromStr;

use log::{debug, info};

use tau_core::insn::Instruction;
use tau_core::messenger::Messenger;
use tau_core::parse::parse_instruction;
use tau_core::protocol::{self, StopReason};
use tau_core::regs::{debug_reg_index, float_reg_index, RegName};

use crate::cpu::{BreakReason, Cpu, DEBUG_REGISTER_COUNT};

pub struct DebugStub {
    messenger: Box<dyn Messenger>,
}

/// What the stub decided after serving a stop.
enum Action {
    Reply(String),
    Resume,
    Step,
    Exit,
}

impl DebugStub {
    pub fn new(messenger: Box<dyn Messenger>) -> DebugStub {
        DebugStub { messenger }
    }

    /// Serves one stop. Returns `false` when the VM should exit (the
    /// debugger asked to terminate, or the channel closed).
    pub fn work(&mut self, cpu: &mut Cpu, reason: BreakReason) -> bool {
        // One stop per SINGLESTEP request, whatever the stop turned out to
        // be; a watchpoint firing mid-step must not leave a stale trap.
        cpu.clear_trap_flag();
        info!("stopped ({:?}), notifying the debugger", reason);
        self.messenger.send(protocol::STOPPED);

        loop {
            let Some(message) = self.messenger.receive() else {
                info!("debugger channel closed, exiting");
                return false;
            };
            debug!("serving '{}'", message);
            let tokens: Vec<&str> = message.split_whitespace().collect();
            if tokens.is_empty() {
                self.messenger.send(protocol::UNKNOWN_COMMAND);
                continue;
            }
            match self.handle(cpu, reason, &tokens) {
                Ok(Action::Reply(response)) => self.messenger.send(&response),
                Ok(Action::Resume) => {
                    self.messenger.send(protocol::OK);
                    return true;
                }
                Ok(Action::Step) => {
                    cpu.set_trap_flag();
                    self.messenger.send(protocol::OK);
                    return true;
                }
                Ok(Action::Exit) => {
                    self.messenger.send(protocol::OK);
                    return false;
                }
                Err(e) => self.messenger.send(&format!("ERR {}", e)),
            }
        }
    }

    fn handle(
        &mut self,
        cpu: &mut Cpu,
        reason: BreakReason,
        tokens: &[&str],
    ) -> Result<Action, String> {
        let reply = |s: String| Ok(Action::Reply(s));
        match tokens[0] {
            "REASON" => reply(wire_reason(reason).to_string()),
            "CONTINUE" => Ok(Action::Resume),
            "SINGLESTEP" => Ok(Action::Step),
            "TERMINATE" => Ok(Action::Exit),
            "PEEKTEXT" => {
                let addr = index_arg(tokens, 1)?;
                let count = index_arg(tokens, 2)?;
                let end = range_end(addr, count)?;
                let mut result = String::new();
                for i in addr..end {
                    let ins = cpu
                        .instruction(i)
                        .ok_or_else(|| format!("no instruction at {}", i))?;
                    result.push_str(&ins.to_string());
                    result.push('\n');
                }
                reply(result)
            }
            "POKETEXT" => {
                let addr = index_arg(tokens, 1)?;
                if tokens.len() < 3 {
                    return Err("expected an instruction".to_string());
                }
                let text = tokens[2..].join(" ");
                let ins: Instruction =
                    parse_instruction(&text).map_err(|e| format!("bad instruction: {}", e))?;
                debug!("rewriting address {} with '{}'", addr, ins);
                if !cpu.set_instruction(addr, ins) {
                    return Err(format!("no instruction at {}", addr));
                }
                reply(protocol::OK.to_string())
            }
            "PEEKDATA" => {
                let addr = index_arg(tokens, 1)?;
                let count = index_arg(tokens, 2)?;
                let end = range_end(addr, count)?;
                let mut result = String::new();
                for i in addr..end {
                    let v = cpu.read_ram(i).ok_or_else(|| format!("no memory at {}", i))?;
                    result.push_str(&format!("{}\n", v));
                }
                reply(result)
            }
            "POKEDATA" => {
                let addr = index_arg(tokens, 1)?;
                let value = int_arg(tokens, 2)?;
                if !cpu.write_ram(addr, value) {
                    return Err(format!("no memory at {}", addr));
                }
                reply(protocol::OK.to_string())
            }
            "PEEKREGS" => {
                let mut result = String::new();
                for name in [RegName::Ip, RegName::Bp, RegName::Sp, RegName::Flags] {
                    result.push_str(&format!("{}:{}\n", name, cpu.register(name).unwrap_or(0)));
                }
                for k in 0..cpu.gp_count() {
                    let v = cpu.register(RegName::Gp(k)).unwrap_or(0);
                    result.push_str(&format!("R{}:{}\n", k, v));
                }
                reply(result)
            }
            "POKEREGS" => {
                let name = str_arg(tokens, 1)?;
                let value = int_arg(tokens, 2)?;
                let reg = RegName::from_str(name).map_err(|e| e.to_string())?;
                if !reg.is_valid(cpu.gp_count()) || !cpu.set_register(reg, value) {
                    return Err(format!("no register {}", name));
                }
                reply(protocol::OK.to_string())
            }
            "PEEKFLOATREGS" => {
                let mut result = String::new();
                for k in 0..cpu.float_count() {
                    result.push_str(&format!("F{}:{}\n", k, cpu.float_register(k).unwrap_or(0.0)));
                }
                reply(result)
            }
            "POKEFLOATREGS" => {
                let name = str_arg(tokens, 1)?;
                let value: f64 = str_arg(tokens, 2)?
                    .parse()
                    .map_err(|_| format!("expected a float, got '{}'", tokens[2]))?;
                let k = float_reg_index(name).ok_or_else(|| format!("no register {}", name))?;
                if !cpu.set_float_register(k, value) {
                    return Err(format!("no register {}", name));
                }
                reply(protocol::OK.to_string())
            }
            "PEEKDEBUGREGS" => {
                let mut result = String::new();
                for k in 0..DEBUG_REGISTER_COUNT {
                    result.push_str(&format!("D{}:{}\n", k, cpu.debug_register(k).unwrap_or(0)));
                }
                reply(result)
            }
            "POKEDEBUGREGS" => {
                let name = str_arg(tokens, 1)?;
                let value: u64 = str_arg(tokens, 2)?
                    .parse()
                    .map_err(|_| format!("expected a number, got '{}'", tokens[2]))?;
                let k = debug_reg_index(name).ok_or_else(|| format!("no register {}", name))?;
                if !cpu.set_debug_register(k, value) {
                    return Err(format!("no register {}", name));
                }
                reply(protocol::OK.to_string())
            }
            "REGCOUNT" => reply(format!("REGCOUNT:{}", cpu.gp_count())),
            "TEXTSIZE" => reply(format!("TEXTSIZE:{}", cpu.text_size())),
            "DATASIZE" => reply(format!("DATASIZE:{}", cpu.ram_size())),
            _ => reply(protocol::UNKNOWN_COMMAND.to_string()),
        }
    }
}

fn wire_reason(reason: BreakReason) -> StopReason {
    match reason {
        BreakReason::Begin => StopReason::ExecutionBegin,
        BreakReason::SoftwareBreakpoint => StopReason::SoftwareBreakpointHit,
        BreakReason::HardwareBreakpoint => StopReason::HardwareBreak,
        BreakReason::SingleStep => StopReason::Singlestep,
        BreakReason::Halt => StopReason::ExecutionEnd,
        BreakReason::CpuError => StopReason::CpuError,
    }
}

fn range_end(addr: usize, count: usize) -> Result<usize, String> {
    addr.checked_add(count)
        .ok_or_else(|| format!("bad range {}+{}", addr, count))
}

fn str_arg<'a>(tokens: &[&'a str], idx: usize) -> Result<&'a str, String> {
    tokens
        .get(idx)
        .copied()
        .ok_or_else(|| format!("missing argument {}", idx))
}

fn index_arg(tokens: &[&str], idx: usize) -> Result<usize, String> {
    let s = str_arg(tokens, idx)?;
    s.parse()
        .map_err(|_| format!("expected an index, got '{}'", s))
}

fn int_arg(tokens: &[&str], idx: usize) -> Result<i64, String> {
    let s = str_arg(tokens, idx)?;
    s.parse()
        .map_err(|_| format!("expected a number, got '{}'", s))
}
