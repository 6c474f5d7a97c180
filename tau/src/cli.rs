//! The interactive command loop. Commands are prefix-matched (`b` for
//! `breakpoint`, `c` for `continue`); errors print and the loop keeps
//! going. The core controllers stay oblivious to all of this.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

use log::info;

use tau_core::parse::{parse_listing, section};
use tau_dbg::arch::Arch;
use tau_dbg::error::{DebuggerError, Result};
use tau_dbg::event::DebugEvent;
use tau_dbg::native::Native;
use tau_dbg::proxy::TauProcess;
use tau_dbg::source::parser::parse_debug_info;
use tau_dbg::source::Source;
use tau_emu::os::spawn;

use crate::config::Config;

const USAGE: &str = "\
commands:
- help = Display this message.
- run [--reg-count=N] [--float-reg-count=N] [--data-size=N] = Run the program.
- attach <port> = Attach to an already running VM.
- continue = Continue execution.
- istep / inext = Execute one instruction (inext steps over calls).
- step / next = Execute one source line (next steps over calls).
- finish = Leave the current function.
- breakpoint set|unset|enable|disable <line> | iset|iunset|ienable|idisable <addr> | list
- watchpoint iset <addr> | irem <addr> | list
- register [get <reg> | set <reg> <val> | fget <freg> | fset <freg> <val>]
- memory get <addr> <n> | set <addr> <val> [<val>...]
- disassemble [<from> [<n>]] = Show the underlying instructions.
- assemble <addr> <instruction> = Rewrite one instruction.
- source [<from> [<n>]] = Show the debugged source code.
- frame [full] = Show the current function and its variables.
- print <var> = Show one variable's value.
- quit = Leave.
";

const CPU_ERROR_NOTE: &str = "\
The CPU is now in an undefined state. You can inspect registers and memory,
but the information may not be accurate, and execution cannot continue. The
reported address is approximate; the faulting instruction is usually the one
just below it.";

enum Flow {
    Continue,
    Quit,
}

pub struct Cli {
    fname: Option<PathBuf>,
    config: Config,
    native: Option<Native>,
    source: Source,
    vm_thread: Option<JoinHandle<()>>,
    is_running: bool,
}

impl Cli {
    pub fn new(fname: Option<PathBuf>, config: Config) -> Cli {
        Cli {
            fname,
            config,
            native: None,
            source: Source::default(),
            vm_thread: None,
            is_running: false,
        }
    }

    pub fn run(&mut self) -> i32 {
        println!("Welcome to the tau debugger.");
        println!("Type \"help\" for the list of commands.");
        // Scripted runs set NODBGPROMPT and diff the output.
        let prompt = if env::var_os("NODBGPROMPT").is_some() {
            ""
        } else {
            "(tau-dbg) "
        };
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("{}", prompt);
            let _ = io::stdout().flush();
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("stdin error: {}", e);
                    break;
                }
            }
            let command = squash_whitespace(&line);
            if command.is_empty() {
                continue;
            }
            match self.handle_command(&command) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => println!("Error: {}", e),
            }
        }
        self.exit_process();
        0
    }

    fn handle_command(&mut self, command: &str) -> Result<Flow> {
        let (main, rest) = match command.split_once(' ') {
            Some((m, r)) => (m, r),
            None => (command, ""),
        };
        // Checked in this order so that single-letter prefixes resolve the
        // same way every session: r=run, s=step, c=continue, f=finish.
        if is_prefix_of(main, "quit") || is_prefix_of(main, "exit") {
            return Ok(Flow::Quit);
        }
        if is_prefix_of(main, "help") {
            print!("{}", USAGE);
            return Ok(Flow::Continue);
        }
        if is_prefix_of(main, "run") {
            self.handle_run(rest)?;
            return Ok(Flow::Continue);
        }
        if is_prefix_of(main, "attach") {
            self.handle_attach(rest)?;
            return Ok(Flow::Continue);
        }
        if self.native.is_none() {
            println!("Use `run` or `attach` to get a process first.");
            return Ok(Flow::Continue);
        }
        if is_prefix_of(main, "breakpoint") {
            self.handle_breakpoint(rest)?;
        } else if is_prefix_of(main, "istep") {
            self.handle_native_step(false)?;
        } else if is_prefix_of(main, "inext") {
            self.handle_native_step(true)?;
        } else if is_prefix_of(main, "disassemble") {
            self.handle_disassemble(rest)?;
        } else if is_prefix_of(main, "assemble") {
            self.handle_assemble(rest)?;
        } else if is_prefix_of(main, "continue") {
            self.handle_continue()?;
        } else if is_prefix_of(main, "register") {
            self.handle_register(rest)?;
        } else if is_prefix_of(main, "memory") {
            self.handle_memory(rest)?;
        } else if is_prefix_of(main, "watchpoint") {
            self.handle_watchpoint(rest)?;
        } else if is_prefix_of(main, "next") {
            self.handle_source_step(true)?;
        } else if is_prefix_of(main, "step") {
            self.handle_source_step(false)?;
        } else if is_prefix_of(main, "finish") {
            self.handle_finish()?;
        } else if is_prefix_of(main, "frame") {
            self.handle_frame(rest)?;
        } else if is_prefix_of(main, "source") {
            self.handle_source_listing(rest)?;
        } else if is_prefix_of(main, "print") {
            self.handle_print(rest)?;
        } else {
            print!("{}", USAGE);
        }
        Ok(Flow::Continue)
    }

    // ----- session management -----

    fn handle_run(&mut self, args: &str) -> Result<()> {
        let Some(fname) = self.fname.clone() else {
            println!("No file name was provided; pass it as an argument at startup.");
            return Ok(());
        };
        let content = fs::read_to_string(&fname).map_err(|e| {
            DebuggerError::InvalidOperand(format!("cannot read '{}': {}", fname.display(), e))
        })?;
        let text = section(&content, ".text").ok_or_else(|| {
            DebuggerError::InvalidOperand(format!("'{}' has no .text section", fname.display()))
        })?;
        let program = parse_listing(text)
            .map_err(|e| DebuggerError::InvalidOperand(format!("parse error: {}", e)))?;
        let debug_info = parse_debug_info(&content)
            .map_err(|e| DebuggerError::InvalidOperand(e.to_string()))?;

        let args: Vec<&str> = args.split_whitespace().collect();
        let gp = flag_value(&args, "--reg-count=").unwrap_or(self.config.vm.registers);
        let float = flag_value(&args, "--float-reg-count=").unwrap_or(self.config.vm.float_registers);
        let ram = flag_value(&args, "--data-size=").unwrap_or(self.config.vm.ram);

        // Keep breakpoints and watchpoints across restarts.
        let (breakpoints, watchpoints) = match &self.native {
            Some(native) => (native.breakpoints().clone(), native.watchpoints().clone()),
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        self.exit_process();

        let (handle, messenger) = spawn(program, gp, float, ram);
        let proxy = TauProcess::new(Box::new(messenger), gp, float, ram);
        let mut native = Native::new(Box::new(proxy), Arch::tau());

        self.is_running = true;
        native.wait_for_event()?;
        native.set_all_breakpoints(breakpoints)?;
        native.set_all_watchpoints(watchpoints)?;

        self.native = Some(native);
        self.vm_thread = Some(handle);
        self.source = Source::from_parsed(debug_info);
        println!("Started process '{}'", fname.display());
        Ok(())
    }

    fn handle_attach(&mut self, args: &str) -> Result<()> {
        let Some(port) = args.split_whitespace().next() else {
            println!("A port is needed, use `attach <port>`.");
            return Ok(());
        };
        let port: u16 = port
            .parse()
            .map_err(|_| DebuggerError::InvalidOperand(format!("expected a port, got '{}'", port)))?;
        self.exit_process();
        let vm = &self.config.vm;
        let mut native = Native::connect(port, Arch::tau(), vm.registers, vm.float_registers, vm.ram)?;
        self.source = match &self.fname {
            Some(fname) => {
                let content = fs::read_to_string(fname).map_err(|e| {
                    DebuggerError::InvalidOperand(format!(
                        "cannot read '{}': {}",
                        fname.display(),
                        e
                    ))
                })?;
                let parsed = parse_debug_info(&content)
                    .map_err(|e| DebuggerError::InvalidOperand(e.to_string()))?;
                Source::from_parsed(parsed)
            }
            None => Source::default(),
        };
        self.is_running = true;
        native.wait_for_event()?;
        self.native = Some(native);
        println!("Attached to port {}", port);
        Ok(())
    }

    /// Cleanly terminates a VM we own.
    fn exit_process(&mut self) {
        if let Some(mut native) = self.native.take() {
            if let Err(e) = native.terminate() {
                info!("terminate failed, the VM is probably gone already: {}", e);
            }
        }
        if let Some(handle) = self.vm_thread.take() {
            let _ = handle.join();
        }
        self.is_running = false;
    }

    // ----- execution -----

    fn check_running(&self) -> Result<()> {
        if self.is_running {
            Ok(())
        } else {
            Err(DebuggerError::StateConflict(
                "the process finished executing, it is not possible to continue".to_string(),
            ))
        }
    }

    fn native_mut(&mut self) -> &mut Native {
        // Guarded by the dispatch: only reached when a process exists.
        self.native.as_mut().expect("checked in handle_command")
    }

    fn handle_continue(&mut self) -> Result<()> {
        self.check_running()?;
        let native = self.native_mut();
        native.continue_execution()?;
        let event = native.wait_for_event()?;
        self.report_event(&event);
        self.report_break(&event)?;
        Ok(())
    }

    fn handle_native_step(&mut self, step_over: bool) -> Result<()> {
        self.check_running()?;
        let native = self.native_mut();
        let event = if step_over {
            native.step_over(true)?
        } else {
            native.single_step()?
        };
        if event != DebugEvent::Singlestep {
            self.report_event(&event);
        }
        if self.is_running {
            // Instruction stepping always shows instructions, even when a
            // line mapping exists.
            let ip = self.native_mut().get_ip()?;
            self.print_text_around(ip)?;
        }
        Ok(())
    }

    fn handle_source_step(&mut self, step_over: bool) -> Result<()> {
        self.check_running()?;
        let Some(native) = self.native.as_mut() else {
            return Ok(());
        };
        let event = if step_over {
            self.source.step_over(native)?
        } else {
            self.source.step_in(native)?
        };
        if event != DebugEvent::Singlestep {
            self.report_event(&event);
        }
        if self.is_running {
            self.report_break(&event)?;
        }
        Ok(())
    }

    fn handle_finish(&mut self) -> Result<()> {
        self.check_running()?;
        let event = self.native_mut().step_out()?;
        if event != DebugEvent::Singlestep {
            self.report_event(&event);
        }
        if self.is_running {
            self.report_break(&event)?;
        }
        Ok(())
    }

    fn report_event(&mut self, event: &DebugEvent) {
        println!("Process stopped, reason: {}", event);
        match event {
            DebugEvent::ExecutionEnd => self.is_running = false,
            DebugEvent::CpuError { address } => {
                println!("{}", CPU_ERROR_NOTE);
                println!("The error was reported at address {}", address);
                self.is_running = false;
            }
            _ => {}
        }
    }

    /// Shows where the debuggee stands: the source line when mapped,
    /// otherwise the surrounding instructions.
    fn report_break(&mut self, event: &DebugEvent) -> Result<()> {
        if *event == DebugEvent::ExecutionEnd {
            return Ok(());
        }
        let ip = self.native_mut().get_ip()?;
        match self.source.addr_to_line(ip) {
            Some(line) => self.print_code_around(line),
            None => self.print_text_around(ip),
        }
    }

    fn print_code_around(&mut self, line: u64) -> Result<()> {
        self.print_function_info(false)?;
        let begin = line.saturating_sub(2);
        for i in begin..line + 3 {
            let Some(text) = self.source.line(i as usize) else {
                continue;
            };
            let text = text.to_string();
            let marker = self.line_breakpoint_marker(i);
            let arrow = if i == line { "->" } else { "  " };
            println!("{}{}{:>4}:{}", marker, arrow, i + 1, text);
        }
        Ok(())
    }

    /// `@` when the line's canonical address holds a breakpoint. A line
    /// whose address canonically belongs to another line shows nothing, so
    /// one instruction never flags several lines.
    fn line_breakpoint_marker(&mut self, line: u64) -> char {
        let Some(addr) = self.source.line_to_addr(line) else {
            return ' ';
        };
        if self.source.addr_to_line(addr) != Some(line) {
            return ' ';
        }
        if self.native_mut().breakpoints().contains_key(&addr) {
            '@'
        } else {
            ' '
        }
    }

    fn print_text_around(&mut self, address: u64) -> Result<()> {
        self.print_function_info(false)?;
        let native = self.native_mut();
        let text_size = native.text_size()? as u64;
        if address >= text_size {
            return Ok(());
        }
        let begin = address.saturating_sub(2);
        let end = (address + 3).min(text_size);
        let instructions = native.read_text(begin, (end - begin) as usize)?;
        let breakpoints = native.breakpoints().clone();
        for (i, ins) in instructions.iter().enumerate() {
            let current = begin + i as u64;
            let marker = if breakpoints.contains_key(&current) {
                '@'
            } else {
                ' '
            };
            let arrow = if current == address { "->" } else { "  " };
            println!("{}{}{:>4}:  {}", marker, arrow, current, ins);
        }
        Ok(())
    }

    fn print_function_info(&mut self, detailed: bool) -> Result<()> {
        let ip = self.native_mut().get_ip()?;
        let Some((name, begin, end)) = self.source.function_info(ip) else {
            return Ok(());
        };
        let name = name.to_string();
        let variables: Vec<String> = self
            .source
            .scoped_variables(ip)
            .iter()
            .map(|v| v.name.clone())
            .collect();
        if variables.is_empty() {
            println!("function {} at {}-{}", name, begin, end);
        } else {
            println!(
                "function {} at {}-{}; active variables: {}",
                name,
                begin,
                end,
                variables.join(", ")
            );
        }
        if detailed {
            for var in variables {
                // Missing debug info for one variable should not break the
                // whole frame listing.
                match self.render_variable(ip, &var) {
                    Ok(line) => println!("{}", line),
                    Err(e) => info!("frame: debug info missing for '{}': {}", var, e),
                }
            }
        }
        Ok(())
    }

    fn render_variable(&mut self, address: u64, name: &str) -> Result<String> {
        let Some(native) = self.native.as_mut() else {
            return Err(DebuggerError::StateConflict("no active process".to_string()));
        };
        let location = self.source.variable_location(native, address, name)?;
        let ty = self.source.variable_type(address, name)?;
        let value = self.source.typed_value_to_string(native, &location, ty)?;
        let ty = self.source.type_to_string(ty);
        Ok(format!("({}) {} = {}", ty, name, value))
    }

    fn handle_frame(&mut self, args: &str) -> Result<()> {
        let detailed = args.trim() == "full";
        let ip = self.native_mut().get_ip()?;
        if self.source.function_info(ip).is_none() {
            println!("No debug info for the current address.");
            return Ok(());
        }
        self.print_function_info(detailed)
    }

    fn handle_print(&mut self, args: &str) -> Result<()> {
        let Some(name) = args.split_whitespace().next() else {
            println!("A variable name is needed, use `print <var>`.");
            return Ok(());
        };
        let name = name.to_string();
        let ip = self.native_mut().get_ip()?;
        let line = self.render_variable(ip, &name)?;
        println!("{}", line);
        Ok(())
    }

    // ----- breakpoints and watchpoints -----

    fn handle_breakpoint(&mut self, args: &str) -> Result<()> {
        let sub: Vec<&str> = args.split_whitespace().collect();
        match sub.as_slice() {
            ["iset", addr] => {
                let addr = parse_address(addr)?;
                let shown = self.native_mut().read_text(addr, 1)?.remove(0);
                self.native_mut().set_breakpoint(addr)?;
                println!("Breakpoint set on address {}: '{}'", addr, shown);
            }
            ["iunset", addr] => self.native_mut().unset_breakpoint(parse_address(addr)?)?,
            ["ienable", addr] => self.native_mut().enable_breakpoint(parse_address(addr)?)?,
            ["idisable", addr] => self.native_mut().disable_breakpoint(parse_address(addr)?)?,
            ["set", line] => {
                let addr = self.line_address(line)?;
                self.native_mut().set_breakpoint(addr)?;
                println!("Breakpoint set on line {} (addr {})", line, addr);
            }
            ["unset", line] => {
                let addr = self.line_address(line)?;
                self.native_mut().unset_breakpoint(addr)?;
            }
            ["enable", line] => {
                let addr = self.line_address(line)?;
                self.native_mut().enable_breakpoint(addr)?;
            }
            ["disable", line] => {
                let addr = self.line_address(line)?;
                self.native_mut().disable_breakpoint(addr)?;
            }
            ["list"] => {
                let breakpoints = self.native_mut().breakpoints().clone();
                if breakpoints.is_empty() {
                    println!("No breakpoints.");
                }
                for (addr, bp) in breakpoints {
                    let state = if bp.enabled { "enabled" } else { "disabled" };
                    match self.source.addr_to_line(addr) {
                        Some(line) => println!(
                            " - address {} (line {}), {}: '{}'",
                            addr,
                            line + 1,
                            state,
                            bp.saved
                        ),
                        None => println!(" - address {}, {}: '{}'", addr, state, bp.saved),
                    }
                }
            }
            _ => println!(
                "breakpoint set|unset|enable|disable <line> | iset|iunset|ienable|idisable <addr> | list"
            ),
        }
        Ok(())
    }

    /// User-facing lines are 1-based; the line table is 0-based.
    fn line_address(&mut self, line: &str) -> Result<u64> {
        let display: u64 = line.parse().map_err(|_| {
            DebuggerError::InvalidOperand(format!("expected a line number, got '{}'", line))
        })?;
        let line = display.checked_sub(1).ok_or_else(|| {
            DebuggerError::InvalidOperand("line numbers start at 1".to_string())
        })?;
        self.source.line_to_addr(line).ok_or_else(|| {
            DebuggerError::DebugInfoMissing(format!("no address for line {}", display))
        })
    }

    fn handle_watchpoint(&mut self, args: &str) -> Result<()> {
        let sub: Vec<&str> = args.split_whitespace().collect();
        match sub.as_slice() {
            ["iset", addr] => {
                let addr = parse_address(addr)?;
                self.native_mut().set_watchpoint_write(addr)?;
                println!("Watchpoint set on memory address {}", addr);
            }
            ["irem", addr] => self.native_mut().remove_watchpoint(parse_address(addr)?)?,
            ["list"] => {
                let watchpoints = self.native_mut().watchpoints();
                if watchpoints.is_empty() {
                    println!("No active watchpoints.");
                }
                for address in watchpoints.keys() {
                    println!(" - address {}", address);
                }
            }
            _ => println!("watchpoint iset <addr> | irem <addr> | list"),
        }
        Ok(())
    }

    // ----- registers, memory, text -----

    fn handle_register(&mut self, args: &str) -> Result<()> {
        let sub: Vec<&str> = args.split_whitespace().collect();
        let native = self.native_mut();
        match sub.as_slice() {
            [] => {
                for (name, value) in native.get_registers()? {
                    println!("{}:{}", name, value);
                }
                for (name, value) in native.get_float_registers()? {
                    println!("{}:{}", name, value);
                }
            }
            ["get", name] => println!("{} = {}", name, native.get_register(name)?),
            ["set", name, value] => {
                let value: i64 = value.parse().map_err(|_| {
                    DebuggerError::InvalidOperand(format!("expected a number, got '{}'", value))
                })?;
                native.set_register(name, value)?;
            }
            ["fget", name] => println!("{} = {}", name, native.get_float_register(name)?),
            ["fset", name, value] => {
                let value: f64 = value.parse().map_err(|_| {
                    DebuggerError::InvalidOperand(format!("expected a float, got '{}'", value))
                })?;
                native.set_float_register(name, value)?;
            }
            _ => println!("register [get <reg> | set <reg> <val> | fget <freg> | fset <freg> <val>]"),
        }
        Ok(())
    }

    fn handle_memory(&mut self, args: &str) -> Result<()> {
        let sub: Vec<&str> = args.split_whitespace().collect();
        let native = self.native_mut();
        match sub.as_slice() {
            ["get", addr, amount] => {
                let addr = parse_address(addr)?;
                let amount: usize = amount.parse().map_err(|_| {
                    DebuggerError::InvalidOperand(format!("expected a count, got '{}'", amount))
                })?;
                let values = native.read_memory(addr, amount)?;
                let rendered: Vec<String> = values.iter().map(i64::to_string).collect();
                println!("{}", rendered.join(" "));
            }
            ["set", addr, values @ ..] if !values.is_empty() => {
                let addr = parse_address(addr)?;
                let values: Vec<i64> = values
                    .iter()
                    .map(|v| {
                        v.parse().map_err(|_| {
                            DebuggerError::InvalidOperand(format!("expected a number, got '{}'", v))
                        })
                    })
                    .collect::<Result<_>>()?;
                native.write_memory(addr, &values)?;
            }
            _ => println!("memory get <addr> <n> | set <addr> <val> [<val>...]"),
        }
        Ok(())
    }

    fn handle_disassemble(&mut self, args: &str) -> Result<()> {
        let sub: Vec<&str> = args.split_whitespace().collect();
        match sub.as_slice() {
            [] => {
                let ip = self.native_mut().get_ip()?;
                self.print_text_around(ip)?;
            }
            [from] => {
                let from = parse_address(from)?;
                let native = self.native_mut();
                let text_size = native.text_size()? as u64;
                let amount = text_size.saturating_sub(from) as usize;
                self.print_text_range(from, amount)?;
            }
            [from, amount] => {
                let from = parse_address(from)?;
                let amount: usize = amount.parse().map_err(|_| {
                    DebuggerError::InvalidOperand(format!("expected a count, got '{}'", amount))
                })?;
                self.print_text_range(from, amount)?;
            }
            _ => println!("disassemble [<from> [<n>]]"),
        }
        Ok(())
    }

    fn print_text_range(&mut self, from: u64, amount: usize) -> Result<()> {
        let native = self.native_mut();
        let instructions = native.read_text(from, amount)?;
        for (i, ins) in instructions.iter().enumerate() {
            println!("{:>4}:  {}", from + i as u64, ins);
        }
        Ok(())
    }

    fn handle_assemble(&mut self, args: &str) -> Result<()> {
        let Some((addr, instruction)) = args.trim().split_once(' ') else {
            println!("assemble <addr> <instruction>");
            return Ok(());
        };
        let addr = parse_address(addr)?;
        self.native_mut()
            .write_text(addr, &[instruction.to_string()])?;
        println!("Rewrote address {}", addr);
        Ok(())
    }

    fn handle_source_listing(&mut self, args: &str) -> Result<()> {
        if self.source.lines().is_empty() {
            println!("No source is available.");
            return Ok(());
        }
        let sub: Vec<&str> = args.split_whitespace().collect();
        match sub.as_slice() {
            [] => {
                let ip = self.native_mut().get_ip()?;
                match self.source.addr_to_line(ip) {
                    Some(line) => self.print_code_around(line)?,
                    None => println!("The current address has no line mapping."),
                }
            }
            [from, rest @ ..] => {
                let from: usize = from.parse().map_err(|_| {
                    DebuggerError::InvalidOperand(format!("expected a line number, got '{}'", from))
                })?;
                let from = from.saturating_sub(1);
                let amount = match rest {
                    [n] => n.parse().map_err(|_| {
                        DebuggerError::InvalidOperand(format!("expected a count, got '{}'", n))
                    })?,
                    _ => self.source.lines().len().saturating_sub(from),
                };
                let lines: Vec<String> = self
                    .source
                    .lines()
                    .iter()
                    .skip(from)
                    .take(amount)
                    .cloned()
                    .collect();
                for (i, text) in lines.iter().enumerate() {
                    println!("{:>4}:{}", from + i + 1, text);
                }
            }
        }
        Ok(())
    }
}

fn squash_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A user command may be any non-empty prefix of the full name.
fn is_prefix_of(prefix: &str, full: &str) -> bool {
    !prefix.is_empty() && full.starts_with(prefix)
}

fn parse_address(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| DebuggerError::InvalidOperand(format!("expected an address, got '{}'", s)))
}

/// Looks for `--name=value` among the arguments.
fn flag_value(args: &[&str], flag: &str) -> Option<usize> {
    args.iter()
        .find_map(|a| a.strip_prefix(flag))
        .and_then(|v| v.parse().ok())
}
