//! Wire-protocol vocabulary shared by the VM-side stub and the debugger-side
//! client. The protocol itself is line-oriented text; this module only pins
//! down the tokens both ends must agree on.

use strum_macros::{Display, EnumString};

/// Why the VM stopped, as reported in response to `REASON`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum StopReason {
    #[strum(serialize = "START")]
    ExecutionBegin,
    #[strum(serialize = "SW_BKPT")]
    SoftwareBreakpointHit,
    #[strum(serialize = "HW_BKPT")]
    HardwareBreak,
    #[strum(serialize = "SINGLESTEP")]
    Singlestep,
    #[strum(serialize = "HALT")]
    ExecutionEnd,
    #[strum(serialize = "CPU_ERROR")]
    CpuError,
}

/// Positive acknowledgement of a command.
pub const OK: &str = "OK";

/// Sent by the VM exactly once per stop, before it starts serving commands.
pub const STOPPED: &str = "STOPPED";

/// Response to a command the stub does not recognize.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN COMMAND";
