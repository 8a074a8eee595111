//! Debugger application state and logic.

use crate::cpu::decode::decode;
use crate::cpu::memory::RAM_SIZE;
use crate::cpu::Rom;
use crate::{Cpu, ProgramImage, StepOutcome};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// The loaded program image, kept for the disassembly view.
    pub image: ProgramImage,
    /// Breakpoints (by program address).
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// RAM view scroll offset.
    pub mem_scroll: usize,
    /// Port writes observed so far, newest last.
    pub output_log: Rc<RefCell<Vec<String>>>,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(image: ProgramImage) -> Self {
        let output_log = Rc::new(RefCell::new(Vec::new()));

        let mut cpu = Cpu::new();
        cpu.attach_rom(image.clone());
        let sink = Rc::clone(&output_log);
        cpu.attach_output(move |port: u8, value: u8| {
            sink.borrow_mut()
                .push(format!("port {} <- 0x{:02X}", port, value));
        });

        Self {
            cpu,
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            output_log,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if self.cpu.is_halted() {
            self.status = format!("CPU halted after {} cycles", self.cpu.cycles);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step() {
            Ok(StepOutcome::Executed(instr)) => {
                self.status = format!("PC={:04X}: {}", pc, instr);
            }
            Ok(StepOutcome::Skipped(instr)) => {
                self.status = format!("PC={:04X}: {} (skipped)", pc, instr);
            }
            Ok(StepOutcome::Halted) => {
                self.status = "CPU halted.".into();
                self.running = false;
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt or breakpoint.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if self.cpu.is_halted() {
            self.running = false;
            self.status = format!("Halted after {} cycles", self.cpu.cycles);
            return;
        }

        // Check for breakpoint
        let pc = self.cpu.regs.pc;
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:04X}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.contains(&pc) {
            self.breakpoints.remove(&pc);
            self.status = format!("Removed breakpoint at PC={:04X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:04X}", pc);
        }
    }

    /// Reset the CPU to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.output_log.borrow_mut().clear();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Get disassembly around the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.cpu.regs.pc;
        let start = pc.saturating_sub(lines as u16 / 2);

        (0..lines as u16)
            .filter_map(|i| {
                let addr = start.checked_add(i)?;
                let byte = self.image.read(addr);
                let text = format!("{:02X}  {}", byte, decode(byte));
                Some((addr, text, addr == pc))
            })
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(image: ProgramImage) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(image);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            if app.mem_scroll > 0 {
                                app.mem_scroll -= 1;
                            }
                        }
                        KeyCode::Down => {
                            if app.mem_scroll < RAM_SIZE - 16 {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
