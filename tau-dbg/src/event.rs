use std::fmt;

pub use tau_core::protocol::StopReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchpointKind {
    Write,
}

/// What the debuggee did, as reported by every stepping and waiting call on
/// the native controller. Stops are data, not errors; only programmer
/// mistakes (bad names, bad addresses) surface as [`DebuggerError`].
///
/// [`DebuggerError`]: crate::error::DebuggerError
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    BreakpointHit { kind: BreakpointKind, address: u64 },
    WatchpointTrigger { kind: WatchpointKind, address: u64 },
    Singlestep,
    ExecutionBegin,
    ExecutionEnd,
    CpuError { address: u64 },
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugEvent::BreakpointHit { kind, address } => {
                let kind = match kind {
                    BreakpointKind::Software => "Software",
                    BreakpointKind::Hardware => "Hardware",
                };
                write!(f, "{} breakpoint hit at address {}", kind, address)
            }
            DebugEvent::WatchpointTrigger { address, .. } => {
                write!(f, "Watchpoint triggered at memory address {}", address)
            }
            DebugEvent::Singlestep => write!(f, "Singlestep done"),
            DebugEvent::ExecutionBegin => write!(f, "Execution started"),
            DebugEvent::ExecutionEnd => write!(f, "The program finished execution"),
            DebugEvent::CpuError { address } => {
                write!(f, "Inner CPU error occurred near address {}", address)
            }
        }
    }
}
