//! End-to-end tests for the native controller against a live VM.

use tau_dbg::error::DebuggerError;
use tau_dbg::event::{BreakpointKind, DebugEvent, WatchpointKind};
use tests::{shutdown, start_vm};

const STRAIGHT_LINE: &str = "
.text
0 MOV R0, 1
1 MOV R1, 2
2 ADD R0, R1
3 MOV R2, R0
4 HALT
";

const LOOP_PROGRAM: &str = "
.text
0 NOP
1 MOV BP, SP
2 SUB SP, 1
3 MOV [BP - 1], 0
4 JMP 14

# Accumulate odd iteration values into R1.
5 MOV R0, [BP - 1]
6 AND R0, 1
7 CMP R0, 1
8 JNE 11

9 MOV R0, [BP - 1]
10 ADD R1, R0

11 MOV R0, [BP - 1]
12 ADD R0, 1
13 MOV [BP - 1], R0

14 MOV R0, [BP - 1]
15 CMP R0, 9
16 JLE 5

17 HALT
";

const CALL_PROGRAM: &str = "
.text
0 NOP
1 CALL 4
2 MOV R1, 1
3 HALT
4 MOV R0, 5
5 MOV R2, 6
6 RET
";

fn bp_hit(address: u64) -> DebugEvent {
    DebugEvent::BreakpointHit {
        kind: BreakpointKind::Software,
        address,
    }
}

#[test]
fn run_to_completion() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionBegin);
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R0").unwrap(), 3);
    assert_eq!(native.get_register("R1").unwrap(), 2);
    assert_eq!(native.get_register("R2").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn reading_text_and_registers() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();

    let text = native.read_text(0, 5).unwrap();
    assert_eq!(
        text,
        ["MOV R0, 1", "MOV R1, 2", "ADD R0, R1", "MOV R2, R0", "HALT"]
    );
    assert!(native.read_text(0, 6).is_err());
    assert!(native.read_text(5, 1).is_err());
    assert!(native.read_text(4, 1).is_ok());

    assert_eq!(native.get_ip().unwrap(), 0);
    assert_eq!(native.get_register("R0").unwrap(), 0);
    assert_eq!(native.single_step().unwrap(), DebugEvent::Singlestep);
    assert_eq!(native.get_ip().unwrap(), 1);
    assert_eq!(native.get_register("R0").unwrap(), 1);
    assert!(matches!(
        native.get_register("R3"),
        Err(DebuggerError::InvalidOperand(_))
    ));

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn writing_text_and_registers() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();

    native
        .write_text(0, &["MOV R2, 1".to_string(), "MOV R1, 3".to_string()])
        .unwrap();
    let text = native.read_text(0, 2).unwrap();
    assert_eq!(text, ["MOV R2, 1", "MOV R1, 3"]);
    assert!(native
        .write_text(4, &["HALT".to_string(), "HALT".to_string()])
        .is_err());
    assert!(native.write_text(2, &["HALT 1".to_string()]).is_err());
    assert!(native.write_text(1, &["MOV 1, R0 +".to_string()]).is_err());

    native.set_register("R0", 1).unwrap();
    assert!(native.set_register("R3", 2).is_err());
    assert_eq!(native.get_register("R0").unwrap(), 1);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    // MOV R2, 1; MOV R1, 3; ADD R0, R1 leaves R0 = 1 + 3, then R2 = R0.
    assert_eq!(native.get_register("R0").unwrap(), 4);
    assert_eq!(native.get_register("R2").unwrap(), 4);
    shutdown(native, vm);
}

#[test]
fn simple_breakpoint() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(2).unwrap();
    native.continue_execution().unwrap();

    assert_eq!(native.wait_for_event().unwrap(), bp_hit(2));
    assert_eq!(native.get_ip().unwrap(), 2);
    assert_eq!(native.get_register("R0").unwrap(), 1);
    assert_eq!(native.get_register("R1").unwrap(), 2);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    // The patched ADD still executed.
    assert_eq!(native.get_register("R2").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn single_step_over_a_breakpoint() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(2).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(2));

    assert_eq!(native.single_step().unwrap(), DebugEvent::Singlestep);
    assert_eq!(native.get_register("R0").unwrap(), 3);
    assert_eq!(native.get_register("R2").unwrap(), 0);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R2").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn breakpoint_at_halt_then_single_step() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(4).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(4));
    // Stepping from the final instruction reports the end, never a step.
    assert_eq!(native.single_step().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn breakpoint_at_halt_then_continue() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(4).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(4));
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn breakpoint_hits_every_loop_iteration() {
    let (mut native, vm) = start_vm(LOOP_PROGRAM, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(10).unwrap();
    for expected in [1, 3, 5, 7, 9] {
        native.continue_execution().unwrap();
        assert_eq!(native.wait_for_event().unwrap(), bp_hit(10));
        assert_eq!(native.get_register("R0").unwrap(), expected);
    }
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R1").unwrap(), 25);
    shutdown(native, vm);
}

#[test]
fn enabling_and_disabling_breakpoints() {
    let (mut native, vm) = start_vm(LOOP_PROGRAM, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(10).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(10));
    assert_eq!(native.get_register("R0").unwrap(), 1);

    native.set_breakpoint(13).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(13));
    assert_eq!(native.get_ip().unwrap(), 13);

    native.disable_breakpoint(13).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(10));
    assert_eq!(native.get_register("R0").unwrap(), 3);

    native.disable_breakpoint(10).unwrap();
    native.enable_breakpoint(13).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(13));

    native.disable_breakpoint(13).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R1").unwrap(), 25);
    shutdown(native, vm);
}

#[test]
fn breakpoints_on_every_instruction() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    for addr in 1..=4 {
        native.set_breakpoint(addr).unwrap();
    }
    for addr in 1..=4 {
        native.continue_execution().unwrap();
        assert_eq!(native.wait_for_event().unwrap(), bp_hit(addr));
        assert_eq!(native.get_ip().unwrap(), addr);
    }
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_ip().unwrap(), 5);
    assert_eq!(native.get_register("R2").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn reads_never_show_the_patch() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(1).unwrap();
    let text = native.read_text(0, 3).unwrap();
    assert_eq!(text, ["MOV R0, 1", "MOV R1, 2", "ADD R0, R1"]);

    native.disable_breakpoint(1).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn writes_preserve_the_patch() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(1).unwrap();
    let round_trip: Vec<String> = native
        .read_text(0, 3)
        .unwrap();
    native.write_text(0, &round_trip).unwrap();
    assert_eq!(
        native.read_text(0, 3).unwrap(),
        ["MOV R0, 1", "MOV R1, 2", "ADD R0, R1"]
    );

    // The breakpoint is still armed.
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(1));
    assert_eq!(native.get_register("R0").unwrap(), 1);
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R1").unwrap(), 2);
    shutdown(native, vm);
}

#[test]
fn unset_restores_the_original_text() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    let before = native.read_text(0, 5).unwrap();
    native.set_breakpoint(2).unwrap();
    native.unset_breakpoint(2).unwrap();
    // With the table empty the read is raw VM text.
    assert_eq!(native.read_text(0, 5).unwrap(), before);
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn breakpoint_state_machine_rejects_misuse() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();

    assert!(matches!(
        native.enable_breakpoint(2),
        Err(DebuggerError::StateConflict(_))
    ));
    assert!(matches!(
        native.disable_breakpoint(2),
        Err(DebuggerError::StateConflict(_))
    ));
    assert!(matches!(
        native.unset_breakpoint(2),
        Err(DebuggerError::StateConflict(_))
    ));
    native.set_breakpoint(2).unwrap();
    assert!(matches!(
        native.set_breakpoint(2),
        Err(DebuggerError::StateConflict(_))
    ));
    // Double disable/enable are no-ops, not errors.
    native.disable_breakpoint(2).unwrap();
    native.disable_breakpoint(2).unwrap();
    native.enable_breakpoint(2).unwrap();
    native.enable_breakpoint(2).unwrap();
    native.unset_breakpoint(2).unwrap();
    assert!(native.unset_breakpoint(2).is_err());

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R0").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn register_round_trip_is_a_noop() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.single_step().unwrap();
    let regs = native.get_registers().unwrap();
    native.set_registers(&regs).unwrap();
    assert_eq!(native.get_registers().unwrap(), regs);
    shutdown(native, vm);
}

#[test]
fn float_registers() {
    let program = "
.text
0 MOV R0, 3
1 MOV F0, 3.25
2 MOV F1, 5.5
3 MOV F2, F0
4 FADD F2, F1
5 NRW R2, F2
6 HALT
";
    let (mut native, vm) = start_vm(program, 3, 3);
    native.wait_for_event().unwrap();
    let fregs = native.get_float_registers().unwrap();
    assert_eq!(fregs.len(), 3);
    assert_eq!(fregs["F0"], 0.0);

    native.set_float_register("F2", 1.25).unwrap();
    assert_eq!(native.get_float_register("F2").unwrap(), 1.25);
    assert!(matches!(
        native.get_float_register("R0"),
        Err(DebuggerError::InvalidOperand(_))
    ));
    assert!(native.get_float_register("F3").is_err());
    assert!(native.set_float_register("F3", 1.0).is_err());

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    let fregs = native.get_float_registers().unwrap();
    assert_eq!(fregs["F0"], 3.25);
    assert_eq!(fregs["F1"], 5.5);
    assert_eq!(fregs["F2"], 8.75);
    assert_eq!(native.get_register("R2").unwrap(), 8);
    shutdown(native, vm);
}

#[test]
fn step_over_a_call() {
    let (mut native, vm) = start_vm(CALL_PROGRAM, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(1).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(1));

    let event = native.step_over(true).unwrap();
    assert_eq!(event, DebugEvent::Singlestep);
    assert_eq!(native.get_ip().unwrap(), 2);
    assert_eq!(native.get_register("R0").unwrap(), 5);
    // The scratch breakpoint at the return address is gone again.
    assert!(!native.breakpoints().contains_key(&2));

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn step_over_stops_at_a_breakpoint_inside_the_callee() {
    let (mut native, vm) = start_vm(CALL_PROGRAM, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(1).unwrap();
    native.set_breakpoint(5).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(1));

    let event = native.step_over(true).unwrap();
    assert_eq!(event, bp_hit(5));
    assert_eq!(native.get_ip().unwrap(), 5);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    assert_eq!(native.get_register("R1").unwrap(), 1);
    shutdown(native, vm);
}

#[test]
fn step_out_of_a_function() {
    let (mut native, vm) = start_vm(CALL_PROGRAM, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(4).unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(4));

    let event = native.step_out().unwrap();
    assert_eq!(event, DebugEvent::Singlestep);
    assert_eq!(native.get_ip().unwrap(), 2);
    assert_eq!(native.get_register("R0").unwrap(), 5);
    assert_eq!(native.get_register("R2").unwrap(), 6);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn watchpoints_trigger_in_write_order() {
    let program = "
.text
0 MOV R0, 1
1 MOV [R0], 2
2 MOV [5], 3
3 HALT
";
    let (mut native, vm) = start_vm(program, 3, 0);
    native.wait_for_event().unwrap();
    native.set_watchpoint_write(1).unwrap();
    native.set_watchpoint_write(5).unwrap();

    native.continue_execution().unwrap();
    assert_eq!(
        native.wait_for_event().unwrap(),
        DebugEvent::WatchpointTrigger {
            kind: WatchpointKind::Write,
            address: 1
        }
    );
    native.continue_execution().unwrap();
    assert_eq!(
        native.wait_for_event().unwrap(),
        DebugEvent::WatchpointTrigger {
            kind: WatchpointKind::Write,
            address: 5
        }
    );
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn watchpoint_pool_is_bounded() {
    let program = "
.text
0 MOV [0], 0
1 MOV [1], 1
2 MOV [2], 2
3 MOV [3], 3
4 MOV [4], 4
5 HALT
";
    let (mut native, vm) = start_vm(program, 3, 0);
    native.wait_for_event().unwrap();

    native.set_watchpoint_write(0).unwrap();
    assert!(matches!(
        native.set_watchpoint_write(0),
        Err(DebuggerError::StateConflict(_))
    ));
    native.set_watchpoint_write(1).unwrap();
    native.set_watchpoint_write(2).unwrap();
    native.set_watchpoint_write(3).unwrap();
    assert!(matches!(
        native.set_watchpoint_write(4),
        Err(DebuggerError::ResourceExhausted(_))
    ));

    // Freeing one slot makes room again, and a removed address no longer
    // triggers.
    native.remove_watchpoint(0).unwrap();
    native.set_watchpoint_write(4).unwrap();
    assert!(native.remove_watchpoint(7).is_err());

    for expected in [1, 2, 3, 4] {
        native.continue_execution().unwrap();
        assert_eq!(
            native.wait_for_event().unwrap(),
            DebugEvent::WatchpointTrigger {
                kind: WatchpointKind::Write,
                address: expected
            }
        );
    }
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn reinstalling_state_for_a_new_session() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_breakpoint(2).unwrap();
    native.set_breakpoint(3).unwrap();
    native.disable_breakpoint(3).unwrap();
    native.set_watchpoint_write(9).unwrap();
    let breakpoints = native.breakpoints().clone();
    let watchpoints = native.watchpoints().clone();
    shutdown(native, vm);

    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.set_all_breakpoints(breakpoints).unwrap();
    native.set_all_watchpoints(watchpoints).unwrap();
    assert_eq!(native.breakpoints().len(), 2);
    assert!(native.breakpoints()[&2].enabled);
    assert!(!native.breakpoints()[&3].enabled);
    assert_eq!(native.watchpoints().len(), 1);

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), bp_hit(2));
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}

#[test]
fn no_execution_after_the_program_ends() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();
    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);

    assert!(matches!(
        native.continue_execution(),
        Err(DebuggerError::StateConflict(_))
    ));
    assert!(matches!(
        native.single_step(),
        Err(DebuggerError::StateConflict(_))
    ));
    // Inspection still works.
    assert_eq!(native.get_register("R2").unwrap(), 3);
    shutdown(native, vm);
}

#[test]
fn cpu_errors_stop_the_session_but_allow_inspection() {
    let program = "
.text
0 MOV R0, 6
1 MOV R1, 0
2 DIV R0, R1
3 HALT
";
    let (mut native, vm) = start_vm(program, 2, 0);
    native.wait_for_event().unwrap();
    native.continue_execution().unwrap();
    let event = native.wait_for_event().unwrap();
    assert!(matches!(event, DebugEvent::CpuError { .. }));

    assert!(matches!(
        native.continue_execution(),
        Err(DebuggerError::StateConflict(_))
    ));
    assert_eq!(native.get_register("R0").unwrap(), 6);
    shutdown(native, vm);
}

#[test]
fn data_access_is_bounds_checked() {
    let (mut native, vm) = start_vm(STRAIGHT_LINE, 3, 0);
    native.wait_for_event().unwrap();

    native.write_memory(10, &[4, 5, 6]).unwrap();
    assert_eq!(native.read_memory(10, 3).unwrap(), [4, 5, 6]);
    assert!(native.read_memory(1022, 4).is_err());
    assert!(native.write_memory(1024, &[1]).is_err());

    native.continue_execution().unwrap();
    assert_eq!(native.wait_for_event().unwrap(), DebugEvent::ExecutionEnd);
    shutdown(native, vm);
}
