use std::io::{self, Write};

use tau_core::insn::{Instruction, MemRef, Opcode, Operand};
use tau_core::regs::RegName;

/// Debug register bank size: four watch-address slots plus the control slot.
pub const DEBUG_REGISTER_COUNT: usize = 5;
/// Index of the control register inside the bank.
pub const DEBUG_CONTROL_REGISTER: usize = 4;

const ACTIVE_MASK: u64 = 0xF;
const RESPONSIBLE_SHIFT: u64 = 8;

const FLAG_ZERO: i64 = 1;
const FLAG_LESS: i64 = 1 << 1;

/// Why the CPU handed control to the debug stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    Begin,
    SoftwareBreakpoint,
    HardwareBreakpoint,
    SingleStep,
    Halt,
    CpuError,
}

/// The Tau processor together with its RAM and loaded program text.
///
/// The CPU never panics on bad programs; out-of-bounds accesses and division
/// by zero put it into an error state that is reported as a stop. Once
/// errored or halted it refuses to execute further.
pub struct Cpu {
    gp: Vec<i64>,
    ip: i64,
    bp: i64,
    sp: i64,
    flags: i64,
    fregs: Vec<f64>,
    dregs: [u64; DEBUG_REGISTER_COUNT],
    text: Vec<Instruction>,
    ram: Vec<i64>,
    trap_flag: bool,
    halted: bool,
    errored: bool,
    pending: Option<BreakReason>,
    out: Box<dyn Write + Send>,
}

impl Cpu {
    pub fn new(text: Vec<Instruction>, gp_count: usize, float_count: usize, ram_size: usize) -> Cpu {
        Cpu {
            gp: vec![0; gp_count],
            ip: 0,
            bp: ram_size as i64,
            sp: ram_size as i64,
            flags: 0,
            fregs: vec![0.0; float_count],
            dregs: [0; DEBUG_REGISTER_COUNT],
            text,
            ram: vec![0; ram_size],
            trap_flag: false,
            halted: false,
            errored: false,
            pending: None,
            out: Box::new(io::stdout()),
        }
    }

    /// Executes one instruction. Any resulting stop is left in the pending
    /// slot for the OS loop to collect with [`take_break`].
    ///
    /// [`take_break`]: Cpu::take_break
    pub fn step(&mut self) {
        if self.halted || self.errored {
            return;
        }
        let Some(ins) = usize::try_from(self.ip)
            .ok()
            .and_then(|addr| self.text.get(addr))
        else {
            self.fault();
            return;
        };
        let ins = ins.clone();
        self.ip += 1;
        self.exec(&ins);
        if self.pending.is_none() && self.trap_flag {
            self.pending = Some(BreakReason::SingleStep);
        }
    }

    fn exec(&mut self, ins: &Instruction) {
        // Helpers record faults; a `None` just unwinds the instruction.
        let _ = self.exec_inner(ins);
    }

    fn exec_inner(&mut self, ins: &Instruction) -> Option<()> {
        use Opcode::*;
        let ops = ins.operands.as_slice();
        match ins.opcode {
            Mov => match ops {
                [Operand::Reg(dst), src] => {
                    let v = self.value_of(src)?;
                    self.write_reg(*dst, v)?;
                }
                [Operand::Mem(dst), src] => {
                    let v = self.value_of(src)?;
                    let addr = self.effective_address(*dst)?;
                    self.store(addr, v)?;
                }
                [Operand::FloatReg(dst), src] => {
                    let v = self.float_value_of(src)?;
                    self.write_freg(*dst, v)?;
                }
                _ => self.fault_none()?,
            },
            Lea => match ops {
                [Operand::Reg(dst), Operand::Mem(m)] => {
                    let base = match m.base {
                        Some(reg) => self.read_reg(reg)?,
                        None => 0,
                    };
                    self.write_reg(*dst, base.wrapping_add(m.offset))?;
                }
                _ => self.fault_none()?,
            },
            Add | Sub | Mul | Div | And | Or | Xor => {
                let [Operand::Reg(dst), src] = ops else {
                    return self.fault_none();
                };
                let a = self.read_reg(*dst)?;
                let b = self.value_of(src)?;
                let res = match ins.opcode {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    Div => {
                        if b == 0 {
                            return self.fault_none();
                        }
                        a.wrapping_div(b)
                    }
                    And => a & b,
                    Or => a | b,
                    _ => a ^ b,
                };
                self.set_flags(res == 0, res < 0);
                self.write_reg(*dst, res)?;
            }
            Cmp => {
                let [Operand::Reg(lhs), src] = ops else {
                    return self.fault_none();
                };
                let a = self.read_reg(*lhs)?;
                let b = self.value_of(src)?;
                self.set_flags(a == b, a < b);
            }
            Fadd | Fsub | Fmul | Fdiv => {
                let [Operand::FloatReg(dst), src] = ops else {
                    return self.fault_none();
                };
                let a = self.read_freg(*dst)?;
                let b = self.float_value_of(src)?;
                let res = match ins.opcode {
                    Fadd => a + b,
                    Fsub => a - b,
                    Fmul => a * b,
                    _ => a / b,
                };
                self.write_freg(*dst, res)?;
            }
            Nrw => {
                let [Operand::Reg(dst), Operand::FloatReg(src)] = ops else {
                    return self.fault_none();
                };
                let v = self.read_freg(*src)?;
                self.write_reg(*dst, v as i64)?;
            }
            Ext => {
                let [Operand::FloatReg(dst), Operand::Reg(src)] = ops else {
                    return self.fault_none();
                };
                let v = self.read_reg(*src)?;
                self.write_freg(*dst, v as f64)?;
            }
            Jmp => self.ip = self.jump_target(ops)?,
            Je => self.branch_if(ops, self.flags & FLAG_ZERO != 0)?,
            Jne => self.branch_if(ops, self.flags & FLAG_ZERO == 0)?,
            Jg => self.branch_if(ops, self.flags & (FLAG_ZERO | FLAG_LESS) == 0)?,
            Jge => self.branch_if(ops, self.flags & FLAG_LESS == 0)?,
            Jl => self.branch_if(ops, self.flags & FLAG_LESS != 0)?,
            Jle => self.branch_if(ops, self.flags & (FLAG_ZERO | FLAG_LESS) != 0)?,
            Call => {
                let target = self.jump_target(ops)?;
                self.push(self.ip)?;
                self.ip = target;
            }
            Ret => self.ip = self.pop()?,
            Push => {
                let [src] = ops else {
                    return self.fault_none();
                };
                let v = self.value_of(src)?;
                self.push(v)?;
            }
            Pop => {
                let [Operand::Reg(dst)] = ops else {
                    return self.fault_none();
                };
                let v = self.pop()?;
                self.write_reg(*dst, v)?;
            }
            Putnum => {
                let [Operand::Reg(src)] = ops else {
                    return self.fault_none();
                };
                let v = self.read_reg(*src)?;
                let _ = writeln!(self.out, "{}", v);
            }
            Nop => {}
            Halt => {
                self.halted = true;
                self.pending = Some(BreakReason::Halt);
            }
            Bkpt => self.pending = Some(BreakReason::SoftwareBreakpoint),
        }
        Some(())
    }

    fn set_flags(&mut self, zero: bool, less: bool) {
        self.flags = 0;
        if zero {
            self.flags |= FLAG_ZERO;
        }
        if less {
            self.flags |= FLAG_LESS;
        }
    }

    fn branch_if(&mut self, ops: &[Operand], taken: bool) -> Option<()> {
        let target = self.jump_target(ops)?;
        if taken {
            self.ip = target;
        }
        Some(())
    }

    fn jump_target(&mut self, ops: &[Operand]) -> Option<i64> {
        match ops {
            [Operand::Imm(v)] => Some(*v),
            _ => self.fault_none(),
        }
    }

    fn value_of(&mut self, op: &Operand) -> Option<i64> {
        match op {
            Operand::Reg(r) => self.read_reg(*r),
            Operand::Imm(v) => Some(*v),
            Operand::Mem(m) => {
                let addr = self.effective_address(*m)?;
                self.load(addr)
            }
            _ => self.fault_none(),
        }
    }

    fn float_value_of(&mut self, op: &Operand) -> Option<f64> {
        match op {
            Operand::FloatReg(k) => self.read_freg(*k),
            Operand::Float(v) => Some(*v),
            Operand::Imm(v) => Some(*v as f64),
            _ => self.fault_none(),
        }
    }

    fn effective_address(&mut self, m: MemRef) -> Option<i64> {
        let base = match m.base {
            Some(reg) => self.read_reg(reg)?,
            None => 0,
        };
        Some(base.wrapping_add(m.offset))
    }

    fn read_reg(&mut self, reg: RegName) -> Option<i64> {
        let v = match reg {
            RegName::Ip => self.ip,
            RegName::Bp => self.bp,
            RegName::Sp => self.sp,
            RegName::Flags => self.flags,
            RegName::Gp(k) => match self.gp.get(k) {
                Some(v) => *v,
                None => return self.fault_none(),
            },
        };
        Some(v)
    }

    fn write_reg(&mut self, reg: RegName, v: i64) -> Option<()> {
        match reg {
            RegName::Ip => self.ip = v,
            RegName::Bp => self.bp = v,
            RegName::Sp => self.sp = v,
            RegName::Flags => self.flags = v,
            RegName::Gp(k) => match self.gp.get_mut(k) {
                Some(slot) => *slot = v,
                None => return self.fault_none(),
            },
        }
        Some(())
    }

    fn read_freg(&mut self, k: usize) -> Option<f64> {
        match self.fregs.get(k) {
            Some(v) => Some(*v),
            None => self.fault_none(),
        }
    }

    fn write_freg(&mut self, k: usize, v: f64) -> Option<()> {
        match self.fregs.get_mut(k) {
            Some(slot) => *slot = v,
            None => return self.fault_none(),
        }
        Some(())
    }

    fn push(&mut self, v: i64) -> Option<()> {
        self.sp -= 1;
        let sp = self.sp;
        self.store(sp, v)
    }

    fn pop(&mut self) -> Option<i64> {
        let v = self.load(self.sp)?;
        self.sp += 1;
        Some(v)
    }

    fn load(&mut self, addr: i64) -> Option<i64> {
        match usize::try_from(addr).ok().and_then(|a| self.ram.get(a)) {
            Some(v) => Some(*v),
            None => self.fault_none(),
        }
    }

    /// A CPU-initiated memory write; checks the active watchpoints.
    fn store(&mut self, addr: i64, v: i64) -> Option<()> {
        let Some(slot) = usize::try_from(addr).ok().and_then(|a| self.ram.get_mut(a)) else {
            return self.fault_none();
        };
        *slot = v;
        let control = self.dregs[DEBUG_CONTROL_REGISTER];
        for i in 0..DEBUG_CONTROL_REGISTER {
            if control & (1 << i) != 0 && self.dregs[i] == addr as u64 {
                let mut control = control & !(ACTIVE_MASK << RESPONSIBLE_SHIFT);
                control |= 1 << (RESPONSIBLE_SHIFT + i as u64);
                self.dregs[DEBUG_CONTROL_REGISTER] = control;
                self.pending = Some(BreakReason::HardwareBreakpoint);
                break;
            }
        }
        Some(())
    }

    fn fault(&mut self) {
        self.errored = true;
        self.pending = Some(BreakReason::CpuError);
    }

    fn fault_none<T>(&mut self) -> Option<T> {
        self.fault();
        None
    }

    /// Takes the stop produced by the last `step`, if any.
    pub fn take_break(&mut self) -> Option<BreakReason> {
        self.pending.take()
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn errored(&self) -> bool {
        self.errored
    }

    pub fn set_trap_flag(&mut self) {
        self.trap_flag = true;
    }

    pub fn clear_trap_flag(&mut self) {
        self.trap_flag = false;
    }

    pub fn gp_count(&self) -> usize {
        self.gp.len()
    }

    pub fn float_count(&self) -> usize {
        self.fregs.len()
    }

    pub fn text_size(&self) -> usize {
        self.text.len()
    }

    pub fn ram_size(&self) -> usize {
        self.ram.len()
    }

    pub fn instruction(&self, addr: usize) -> Option<&Instruction> {
        self.text.get(addr)
    }

    pub fn set_instruction(&mut self, addr: usize, ins: Instruction) -> bool {
        match self.text.get_mut(addr) {
            Some(slot) => {
                *slot = ins;
                true
            }
            None => false,
        }
    }

    pub fn read_ram(&self, addr: usize) -> Option<i64> {
        self.ram.get(addr).copied()
    }

    /// A debugger-initiated write; does not trip watchpoints.
    pub fn write_ram(&mut self, addr: usize, v: i64) -> bool {
        match self.ram.get_mut(addr) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }

    /// Register access by name, used by the debug stub. `None` means the
    /// name does not exist on this machine.
    pub fn register(&self, reg: RegName) -> Option<i64> {
        match reg {
            RegName::Ip => Some(self.ip),
            RegName::Bp => Some(self.bp),
            RegName::Sp => Some(self.sp),
            RegName::Flags => Some(self.flags),
            RegName::Gp(k) => self.gp.get(k).copied(),
        }
    }

    pub fn set_register(&mut self, reg: RegName, v: i64) -> bool {
        match reg {
            RegName::Ip => self.ip = v,
            RegName::Bp => self.bp = v,
            RegName::Sp => self.sp = v,
            RegName::Flags => self.flags = v,
            RegName::Gp(k) => match self.gp.get_mut(k) {
                Some(slot) => *slot = v,
                None => return false,
            },
        }
        true
    }

    pub fn float_register(&self, k: usize) -> Option<f64> {
        self.fregs.get(k).copied()
    }

    pub fn set_float_register(&mut self, k: usize, v: f64) -> bool {
        match self.fregs.get_mut(k) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }

    pub fn debug_register(&self, k: usize) -> Option<u64> {
        self.dregs.get(k).copied()
    }

    pub fn set_debug_register(&mut self, k: usize, v: u64) -> bool {
        match self.dregs.get_mut(k) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }
}
