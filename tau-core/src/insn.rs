use std::fmt;

use strum_macros::{Display, EnumString};

use crate::regs::RegName;

/// Instruction mnemonics understood by the Tau machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Opcode {
    Mov,
    Lea,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Cmp,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Nrw,
    Ext,
    Jmp,
    Je,
    Jne,
    Jg,
    Jge,
    Jl,
    Jle,
    Call,
    Ret,
    Push,
    Pop,
    Putnum,
    Nop,
    Halt,
    Bkpt,
}

/// A memory operand, `[base + offset]`. Both parts are optional on input but
/// at least one is present; `[5]` is an absolute cell, `[BP - 2]` is
/// frame-relative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemRef {
    pub base: Option<RegName>,
    pub offset: i64,
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            None => write!(f, "[{}]", self.offset),
            Some(base) if self.offset == 0 => write!(f, "[{}]", base),
            Some(base) if self.offset < 0 => write!(f, "[{} - {}]", base, -self.offset),
            Some(base) => write!(f, "[{} + {}]", base, self.offset),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Reg(RegName),
    FloatReg(usize),
    Imm(i64),
    Float(f64),
    Mem(MemRef),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::FloatReg(k) => write!(f, "F{}", k),
            Operand::Imm(v) => write!(f, "{}", v),
            Operand::Float(v) => write!(f, "{}", v),
            Operand::Mem(m) => write!(f, "{}", m),
        }
    }
}

/// One parsed instruction. Operand shapes are checked by [`validate`], which
/// the parser invokes before handing an instruction out.
///
/// [`validate`]: Instruction::validate
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", op)?;
            } else {
                write!(f, ", {}", op)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInstruction(pub String);

impl fmt::Display for InvalidInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operands for '{}'", self.0)
    }
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Instruction { opcode, operands }
    }

    /// Checks the operand shape against the mnemonic. Integer immediates are
    /// accepted wherever a float immediate is (the CPU widens them), so
    /// `MOV F0, 5` is legal.
    pub fn validate(&self) -> Result<(), InvalidInstruction> {
        use Opcode::*;
        use Operand::*;
        let ops = self.operands.as_slice();
        let ok = match self.opcode {
            Mov => matches!(
                ops,
                [Reg(_), Reg(_) | Imm(_) | Mem(_)]
                    | [Mem(_), Reg(_) | Imm(_)]
                    | [FloatReg(_), FloatReg(_) | Float(_) | Imm(_)]
            ),
            Lea => matches!(ops, [Reg(_), Mem(_)]),
            Add | Sub | Mul | Div | And | Or | Xor | Cmp => {
                matches!(ops, [Reg(_), Reg(_) | Imm(_) | Mem(_)])
            }
            Fadd | Fsub | Fmul | Fdiv => {
                matches!(ops, [FloatReg(_), FloatReg(_) | Float(_) | Imm(_)])
            }
            Nrw => matches!(ops, [Reg(_), FloatReg(_)]),
            Ext => matches!(ops, [FloatReg(_), Reg(_)]),
            Jmp | Je | Jne | Jg | Jge | Jl | Jle | Call => matches!(ops, [Imm(_)]),
            Ret | Nop | Halt | Bkpt => ops.is_empty(),
            Push => matches!(ops, [Reg(_) | Imm(_)]),
            Pop | Putnum => matches!(ops, [Reg(_)]),
        };
        if ok {
            Ok(())
        } else {
            Err(InvalidInstruction(self.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::RegName;

    fn ins(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction::new(opcode, operands)
    }

    #[test]
    fn display_is_canonical() {
        let i = ins(
            Opcode::Mov,
            vec![
                Operand::Mem(MemRef {
                    base: Some(RegName::Bp),
                    offset: -4,
                }),
                Operand::Imm(5),
            ],
        );
        assert_eq!(i.to_string(), "MOV [BP - 4], 5");

        let i = ins(
            Opcode::Lea,
            vec![
                Operand::Reg(RegName::Gp(1)),
                Operand::Mem(MemRef {
                    base: Some(RegName::Sp),
                    offset: 2,
                }),
            ],
        );
        assert_eq!(i.to_string(), "LEA R1, [SP + 2]");

        assert_eq!(ins(Opcode::Ret, vec![]).to_string(), "RET");
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        assert!(ins(Opcode::Mov, vec![Operand::Imm(1), Operand::Imm(2)])
            .validate()
            .is_err());
        assert!(ins(Opcode::Halt, vec![Operand::Imm(1)]).validate().is_err());
        assert!(ins(Opcode::Pop, vec![Operand::Imm(1)]).validate().is_err());
        assert!(ins(
            Opcode::Mov,
            vec![Operand::FloatReg(0), Operand::Float(3.14)]
        )
        .validate()
        .is_ok());
    }
}
