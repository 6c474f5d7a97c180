//! Tests for the VM-side debug stub: scripted command transcripts against a
//! real CPU, asserting on the exact wire responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use tau_core::messenger::Messenger;
use tau_core::parse::parse_listing;
use tau_emu::cpu::Cpu;
use tau_emu::os::Os;

struct Comms {
    commands: VecDeque<String>,
    out: Arc<Mutex<Vec<String>>>,
}

impl Messenger for Comms {
    fn send(&mut self, message: &str) {
        self.out.lock().unwrap().push(message.to_string());
    }

    fn receive(&mut self) -> Option<String> {
        self.commands.pop_front()
    }
}

/// Runs `program` under the stub, feeding it `commands`; returns everything
/// the stub sent. When the command script runs out, the channel reads as
/// closed and the VM exits.
fn run_scripted(program: &str, gp: usize, ram: usize, commands: &[&str]) -> Vec<String> {
    let text = parse_listing(program).expect("the program should parse");
    let out = Arc::new(Mutex::new(Vec::new()));
    let comms = Comms {
        commands: commands.iter().map(|c| (*c).to_string()).collect(),
        out: Arc::clone(&out),
    };
    let cpu = Cpu::new(text, gp, 2, ram);
    let mut os = Os::new(cpu);
    os.attach_stub(Box::new(comms));
    os.run();
    let out = out.lock().unwrap().clone();
    out
}

const PROGRAM: &str = "MOV R0, 1\nMOV R1, 2\nADD R0, R1\nHALT\n";

#[test]
fn reports_begin_and_halt() {
    let out = run_scripted(
        PROGRAM,
        2,
        1024,
        &["REASON", "PEEKREGS", "CONTINUE", "REASON", "PEEKREGS", "CONTINUE"],
    );
    assert_eq!(
        out,
        [
            "STOPPED",
            "START",
            "IP:0\nBP:1024\nSP:1024\nFLAGS:0\nR0:0\nR1:0\n",
            "OK",
            "STOPPED",
            "HALT",
            "IP:4\nBP:1024\nSP:1024\nFLAGS:0\nR0:3\nR1:2\n",
            "OK",
        ]
    );
}

#[test]
fn single_steps_clear_the_trap_flag() {
    let out = run_scripted(
        PROGRAM,
        2,
        1024,
        &[
            "REASON",
            "SINGLESTEP",
            "REASON",
            "PEEKREGS",
            "SINGLESTEP",
            "PEEKREGS",
            "CONTINUE",
            "REASON",
        ],
    );
    assert_eq!(
        out,
        [
            "STOPPED",
            "START",
            "OK",
            "STOPPED",
            "SINGLESTEP",
            "IP:1\nBP:1024\nSP:1024\nFLAGS:0\nR0:1\nR1:0\n",
            "OK",
            "STOPPED",
            "IP:2\nBP:1024\nSP:1024\nFLAGS:0\nR0:1\nR1:2\n",
            "OK",
            "STOPPED",
            "HALT",
        ]
    );
}

#[test]
fn serves_text_and_data() {
    let out = run_scripted(
        PROGRAM,
        2,
        16,
        &[
            "PEEKTEXT 0 2",
            "POKETEXT 1 MOV R1, 7",
            "PEEKTEXT 1 1",
            "POKEDATA 3 -9",
            "PEEKDATA 3 2",
            "TERMINATE",
        ],
    );
    assert_eq!(
        out,
        [
            "STOPPED",
            "MOV R0, 1\nMOV R1, 2\n",
            "OK",
            "MOV R1, 7\n",
            "OK",
            "-9\n0\n",
            "OK",
        ]
    );
}

#[test]
fn serves_float_and_size_queries() {
    let out = run_scripted(
        PROGRAM,
        2,
        16,
        &[
            "POKEFLOATREGS F1 2.5",
            "PEEKFLOATREGS",
            "REGCOUNT",
            "TEXTSIZE",
            "DATASIZE",
            "TERMINATE",
        ],
    );
    assert_eq!(
        out,
        [
            "STOPPED",
            "OK",
            "F0:0\nF1:2.5\n",
            "REGCOUNT:2",
            "TEXTSIZE:4",
            "DATASIZE:16",
            "OK",
        ]
    );
}

#[test]
fn reports_watchpoint_hits_with_the_responsible_slot() {
    let program = "MOV R0, 1\nMOV [R0], 2\nHALT\n";
    let out = run_scripted(
        program,
        1,
        16,
        &[
            "POKEDEBUGREGS D1 1",
            "POKEDEBUGREGS D4 2",
            "CONTINUE",
            "REASON",
            "PEEKDEBUGREGS",
            "CONTINUE",
            "REASON",
        ],
    );
    // Slot 1 is responsible: bit 9 joins the active bit 1.
    let control = 2 | (1 << 9);
    let bank = format!("D0:0\nD1:1\nD2:0\nD3:0\nD4:{}\n", control);
    assert_eq!(
        out,
        [
            "STOPPED",
            "OK",
            "OK",
            "OK",
            "STOPPED",
            "HW_BKPT",
            bank.as_str(),
            "OK",
            "STOPPED",
            "HALT",
        ]
    );
}

#[test]
fn rejects_unknown_commands_and_bad_operands() {
    let out = run_scripted(
        PROGRAM,
        2,
        16,
        &[
            "FROBNICATE",
            "POKEREGS R9 5",
            "POKEDATA 99 1",
            "POKETEXT 0 NONSENSE R0",
            "TERMINATE",
        ],
    );
    assert_eq!(out[0], "STOPPED");
    assert_eq!(out[1], "UNKNOWN COMMAND");
    assert!(out[2].starts_with("ERR "));
    assert!(out[3].starts_with("ERR "));
    assert!(out[4].starts_with("ERR "));
    assert_eq!(out[5], "OK");
}

#[test]
fn closing_the_channel_terminates_the_vm() {
    // No TERMINATE at the end; the drained script reads as a closed
    // channel and run() returns instead of hanging.
    let out = run_scripted(PROGRAM, 2, 16, &["REASON"]);
    assert_eq!(out, ["STOPPED", "START"]);
}

#[test]
fn bkpt_reports_a_software_break() {
    let program = "MOV R0, 1\nBKPT\nMOV R1, 2\nHALT\n";
    let out = run_scripted(
        program,
        2,
        16,
        &["CONTINUE", "REASON", "PEEKREGS", "CONTINUE", "REASON"],
    );
    assert_eq!(
        out,
        [
            "STOPPED",
            "OK",
            "STOPPED",
            "SW_BKPT",
            // The IP is already past the BKPT; the debugger rewinds it.
            "IP:2\nBP:16\nSP:16\nFLAGS:0\nR0:1\nR1:0\n",
            "OK",
            "STOPPED",
            "HALT",
        ]
    );
}
