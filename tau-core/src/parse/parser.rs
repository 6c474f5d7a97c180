use std::{fmt, iter::Peekable, str::FromStr, vec::IntoIter};

use crate::insn::{Instruction, MemRef, Opcode, Operand};
use crate::parse::lexer::{lex, Token};
use crate::regs::{float_reg_index, RegName};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedChar(usize),
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownMnemonic(String),
    NotARegister(String),
    BadOperands(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedChar(at) => write!(f, "unexpected character at offset {}", at),
            ParseError::UnexpectedEnd => write!(f, "unexpected end of input"),
            ParseError::UnexpectedToken(t) => write!(f, "unexpected token {}", t),
            ParseError::UnknownMnemonic(m) => write!(f, "'{}' is not an instruction", m),
            ParseError::NotARegister(s) => write!(f, "'{}' is not a register", s),
            ParseError::BadOperands(i) => write!(f, "invalid operands in '{}'", i),
        }
    }
}

/// Section headers recognized in a program listing. Anything between two
/// headers belongs to the first; `section` content never swallows a
/// following header line.
pub const SECTION_NAMES: [&str; 4] = [".text", ".debug_line", ".debug_info", ".debug_source"];

/// Returns the body of section `name` in `src`, without the header line.
/// The body runs to the next known section header or the end of input.
pub fn section<'a>(src: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;
    let mut body_start = None;
    for line in src.split_inclusive('\n') {
        let trimmed = line.trim();
        match body_start {
            Some(start) if SECTION_NAMES.contains(&trimmed) => {
                return Some(&src[start..offset]);
            }
            None if trimmed == name => body_start = Some(offset + line.len()),
            _ => {}
        }
        offset += line.len();
    }
    body_start.map(|b| &src[b..])
}

/// Parses a single instruction, rejecting trailing input. This is what the
/// debugger runs over every instruction it is asked to write into the VM.
pub fn parse_instruction(src: &str) -> Result<Instruction, ParseError> {
    let toks = lex(src).map_err(ParseError::UnexpectedChar)?;
    let mut toks = toks.into_iter().peekable();
    let ins = instruction(&mut toks)?;
    skip_newlines(&mut toks);
    match toks.next() {
        None => Ok(ins),
        Some(t) => Err(ParseError::UnexpectedToken(format!("{:?}", t))),
    }
}

/// Parses the body of a `.text` section: one instruction per line, each
/// optionally prefixed with its decimal address (which is ignored).
pub fn parse_listing(src: &str) -> Result<Vec<Instruction>, ParseError> {
    let toks = lex(src).map_err(ParseError::UnexpectedChar)?;
    let mut toks = toks.into_iter().peekable();
    let mut out = Vec::new();
    loop {
        skip_newlines(&mut toks);
        if toks.peek().is_none() {
            return Ok(out);
        }
        // Optional leading address index.
        if let Some(Token::Int(_)) = toks.peek() {
            toks.next();
        }
        out.push(instruction(&mut toks)?);
        match toks.next() {
            None => return Ok(out),
            Some(Token::Newline) => {}
            Some(t) => return Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        }
    }
}

type Tokens = Peekable<IntoIter<Token>>;

fn skip_newlines(toks: &mut Tokens) {
    while matches!(toks.peek(), Some(Token::Newline)) {
        toks.next();
    }
}

fn instruction(toks: &mut Tokens) -> Result<Instruction, ParseError> {
    skip_newlines(toks);
    let mnemonic = match toks.next() {
        Some(Token::Ident(name)) => name,
        Some(t) => return Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        None => return Err(ParseError::UnexpectedEnd),
    };
    let opcode =
        Opcode::from_str(&mnemonic).map_err(|_| ParseError::UnknownMnemonic(mnemonic.clone()))?;

    let mut operands = Vec::new();
    if !matches!(toks.peek(), None | Some(Token::Newline)) {
        operands.push(operand(toks)?);
        while matches!(toks.peek(), Some(Token::Comma)) {
            toks.next();
            operands.push(operand(toks)?);
        }
    }

    let ins = Instruction::new(opcode, operands);
    ins.validate()
        .map_err(|e| ParseError::BadOperands(e.0))?;
    Ok(ins)
}

fn operand(toks: &mut Tokens) -> Result<Operand, ParseError> {
    match toks.next() {
        Some(Token::Int(v)) => Ok(Operand::Imm(v)),
        Some(Token::Float(v)) => Ok(Operand::Float(v)),
        Some(Token::Ident(name)) => register_operand(&name),
        Some(Token::LBracket) => mem_operand(toks),
        Some(t) => Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        None => Err(ParseError::UnexpectedEnd),
    }
}

fn register_operand(name: &str) -> Result<Operand, ParseError> {
    if let Ok(reg) = RegName::from_str(name) {
        return Ok(Operand::Reg(reg));
    }
    if let Some(idx) = float_reg_index(name) {
        return Ok(Operand::FloatReg(idx));
    }
    Err(ParseError::NotARegister(name.to_string()))
}

fn mem_operand(toks: &mut Tokens) -> Result<Operand, ParseError> {
    let mem = match toks.next() {
        Some(Token::Int(v)) => MemRef {
            base: None,
            offset: v,
        },
        Some(Token::Ident(name)) => {
            let base = RegName::from_str(&name)
                .map_err(|_| ParseError::NotARegister(name.to_string()))?;
            let offset = match toks.peek() {
                Some(Token::Plus) => {
                    toks.next();
                    signed_int(toks)?
                }
                Some(Token::Minus) => {
                    toks.next();
                    -signed_int(toks)?
                }
                _ => 0,
            };
            MemRef {
                base: Some(base),
                offset,
            }
        }
        Some(t) => return Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        None => return Err(ParseError::UnexpectedEnd),
    };
    match toks.next() {
        Some(Token::RBracket) => Ok(Operand::Mem(mem)),
        Some(t) => Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        None => Err(ParseError::UnexpectedEnd),
    }
}

fn signed_int(toks: &mut Tokens) -> Result<i64, ParseError> {
    match toks.next() {
        Some(Token::Int(v)) => Ok(v),
        Some(t) => Err(ParseError::UnexpectedToken(format!("{:?}", t))),
        None => Err(ParseError::UnexpectedEnd),
    }
}
