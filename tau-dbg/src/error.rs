use std::{error, fmt};

/// The single error kind surfaced to the user. Every variant carries a
/// descriptive message; the variant itself is the failure category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerError {
    /// Malformed or missing wire response, unknown stop reason.
    Protocol(String),
    /// Bad register name, out-of-range address, invalid literal or
    /// instruction.
    InvalidOperand(String),
    /// No free debug register.
    ResourceExhausted(String),
    /// The operation does not fit the current debugger state.
    StateConflict(String),
    /// A variable/type/function/line lookup came up empty.
    DebugInfoMissing(String),
}

impl fmt::Display for DebuggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebuggerError::Protocol(m) => write!(f, "protocol error: {}", m),
            DebuggerError::InvalidOperand(m) => write!(f, "{}", m),
            DebuggerError::ResourceExhausted(m) => write!(f, "{}", m),
            DebuggerError::StateConflict(m) => write!(f, "{}", m),
            DebuggerError::DebugInfoMissing(m) => write!(f, "{}", m),
        }
    }
}

impl error::Error for DebuggerError {}

pub type Result<T> = std::result::Result<T, DebuggerError>;
