use std::collections::BTreeMap;

use crate::error::Result;
use crate::event::StopReason;

/// A debuggee VM. Handles the communication and the raw debug API; no
/// debugger logic lives here, that is the native controller's job.
pub trait VmProcess {
    /// Returns `amount` instructions starting at `address`.
    fn read_text(&mut self, address: u64, amount: usize) -> Result<Vec<String>>;

    /// Overwrites instructions starting at `address`. Every item is parsed
    /// locally first; an invalid first item means nothing was sent, an
    /// invalid later item aborts mid-batch, leaving the earlier writes in
    /// place.
    fn write_text(&mut self, address: u64, text: &[String]) -> Result<()>;

    /// Reads `amount` cells of RAM starting at `address`.
    fn read_data(&mut self, address: u64, amount: usize) -> Result<Vec<i64>>;

    /// Writes RAM cells starting at `address`. Out-of-range writes fail
    /// before anything is sent.
    fn write_data(&mut self, address: u64, data: &[i64]) -> Result<()>;

    /// Why the VM is currently stopped.
    fn stop_reason(&mut self) -> Result<StopReason>;

    /// Requests a one-instruction step. The stop arrives later; see `wait`.
    fn singlestep(&mut self) -> Result<()>;

    fn fetch_registers(&mut self) -> Result<BTreeMap<String, i64>>;

    /// Sets exactly the registers present in `regs`. All names are
    /// validated before the first write goes out.
    fn set_registers(&mut self, regs: &BTreeMap<String, i64>) -> Result<()>;

    fn fetch_float_registers(&mut self) -> Result<BTreeMap<String, f64>>;

    fn set_float_registers(&mut self, regs: &BTreeMap<String, f64>) -> Result<()>;

    fn fetch_debug_registers(&mut self) -> Result<BTreeMap<String, u64>>;

    fn set_debug_registers(&mut self, regs: &BTreeMap<String, u64>) -> Result<()>;

    /// Releases the CPU until the next stop. Only `wait` may be called
    /// while the VM runs.
    fn resume(&mut self) -> Result<()>;

    /// Blocks until the VM announces a stop.
    fn wait(&mut self) -> Result<()>;

    fn text_size(&mut self) -> Result<usize>;

    /// Ends the debuggee. The process must not be used afterwards.
    fn terminate(&mut self) -> Result<()>;
}
