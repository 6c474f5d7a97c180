//! Variable location programs and their interpreter.
//!
//! A location program is a small stack machine; running it against the live
//! registers of the debuggee yields the variable's current location, either
//! a register or a memory offset.

use std::fmt;

use crate::error::{DebuggerError, Result};
use crate::native::Native;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Register(String),
    Offset(i64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(name) => write!(f, "{}", name),
            Location::Offset(value) => write!(f, "[{}]", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocOp {
    Push(Location),
    /// Pops two locations, resolves registers to their live values, and
    /// pushes the summed offset.
    Add,
    /// Pushes `Offset(frame base register + k)`.
    FrameBaseRegisterOffset(i64),
    /// Pops a location, reads the data word it addresses, and pushes that
    /// word as an offset. Memory is word-addressed, so there is no size to
    /// pick.
    Dereference,
}

/// Runs a location program. A well-formed program leaves exactly one value
/// on the stack; anything else is malformed and rejected.
pub fn interpret(program: &[LocOp], native: &mut Native, frame_base: &str) -> Result<Location> {
    let mut stack: Vec<Location> = Vec::new();
    for op in program {
        match op {
            LocOp::Push(loc) => stack.push(loc.clone()),
            LocOp::Add => {
                let rhs = pop(&mut stack)?;
                let lhs = pop(&mut stack)?;
                let sum = resolve(&lhs, native)?.wrapping_add(resolve(&rhs, native)?);
                stack.push(Location::Offset(sum));
            }
            LocOp::FrameBaseRegisterOffset(k) => {
                let base = native.get_register(frame_base)?;
                stack.push(Location::Offset(base.wrapping_add(*k)));
            }
            LocOp::Dereference => {
                let loc = pop(&mut stack)?;
                let address = resolve(&loc, native)?;
                let address = u64::try_from(address).map_err(|_| {
                    DebuggerError::InvalidOperand(format!(
                        "location program dereferences negative address {}",
                        address
                    ))
                })?;
                let value = native.read_memory(address, 1)?[0];
                stack.push(Location::Offset(value));
            }
        }
    }
    if stack.len() != 1 {
        return Err(DebuggerError::InvalidOperand(format!(
            "malformed location program: {} values left on the stack",
            stack.len()
        )));
    }
    Ok(stack.pop().unwrap_or(Location::Offset(0)))
}

fn pop(stack: &mut Vec<Location>) -> Result<Location> {
    stack.pop().ok_or_else(|| {
        DebuggerError::InvalidOperand("malformed location program: stack underflow".to_string())
    })
}

fn resolve(loc: &Location, native: &mut Native) -> Result<i64> {
    match loc {
        Location::Offset(v) => Ok(*v),
        Location::Register(name) => native.get_register(name),
    }
}
