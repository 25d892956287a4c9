/// # environment
///
/// Sets everything up and runs the main loop. The interpreter knows nothing
/// about screens, keyboards or speakers; this is where they meet:
///
///  loop
///   |-- input.poll_keys()       -- Esc / Ctrl-C ends the run
///   |-- interpreter.set_keys()
///   |-- interpreter.step_cycle() -- a fatal error ends the run
///   |-- sound.update(sound timer)
///   |-- display.draw()          -- only once per frame interval
///   `-- sleep(cycle delay)
use log::{error, info, warn};
use std::error::Error;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::display::Display;
use crate::input::Input;
use crate::interpreter::{Chip8Interpreter, TraceEvent, TraceHook, KEY_COUNT};
use crate::sound::Sound;

/// why the main loop stopped, when it wasn't an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Quit,
    CycleLimit,
}

pub struct Environment<'a> {
    interpreter: Chip8Interpreter,
    display: &'a mut dyn Display,
    input: &'a mut dyn Input,
    sound: &'a mut dyn Sound,
    cycle_delay: Duration,
    frame_interval: Duration,
    cycles: u64,
    sound_failed: bool,
}

impl<'a> Environment<'a> {
    pub fn new(
        interpreter: Chip8Interpreter,
        display: &'a mut dyn Display,
        input: &'a mut dyn Input,
        sound: &'a mut dyn Sound,
        config: &Config,
    ) -> Self {
        Environment {
            interpreter,
            display,
            input,
            sound,
            cycle_delay: config.cycle_delay(),
            frame_interval: config.frame_interval(),
            cycles: 0,
            sound_failed: false,
        }
    }

    pub fn interpreter(&self) -> &Chip8Interpreter {
        &self.interpreter
    }

    /// cycles executed so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// run until the user quits, `max_cycles` is reached or a cycle fails
    pub fn main_loop(&mut self, max_cycles: Option<u64>) -> Result<RunOutcome, Box<dyn Error>> {
        self.display.set_title(self.interpreter.rom_name());
        let mut keys = [false; KEY_COUNT];
        let mut last_frame: Option<Instant> = None;

        loop {
            if matches!(max_cycles, Some(max) if self.cycles >= max) {
                self.render()?;
                info!("stopping after {} cycles", self.cycles);
                return Ok(RunOutcome::CycleLimit);
            }

            if self.input.poll_keys(&mut keys)? {
                info!("quit requested after {} cycles", self.cycles);
                return Ok(RunOutcome::Quit);
            }
            self.interpreter.set_keys(keys);

            if let Err(e) = self.interpreter.step_cycle() {
                error!(
                    "cycle {} failed at {:#05x}: {}",
                    self.cycles,
                    self.interpreter.pc(),
                    e
                );
                return Err(e.into());
            }
            self.cycles += 1;

            // the first sound failure is logged and the rest of the run is silent
            if !self.sound_failed {
                if let Err(e) = self.sound.update(self.interpreter.sound_timer()) {
                    warn!("sound failed, running muted: {}", e);
                    self.sound_failed = true;
                }
            }

            let now = Instant::now();
            if last_frame.map_or(true, |t| now.duration_since(t) >= self.frame_interval) {
                self.render()?;
                last_frame = Some(now);
            }

            spin_sleep::sleep(self.cycle_delay);
        }
    }

    fn render(&mut self) -> Result<(), io::Error> {
        self.display
            .draw(self.interpreter.framebuffer(), self.interpreter.pitch())
    }
}

/// one line of trace output: pc, opcode, decoded form, I and V0-VF
pub fn trace_line(event: &TraceEvent) -> String {
    let mut line = format!(
        "{:04x} {:04x} {:<40} I={:04x} V=",
        event.pc,
        event.opcode,
        format!("{:?}", event.instruction),
        event.index
    );
    for (n, v) in event.registers.iter().enumerate() {
        if n > 0 {
            line.push(' ');
        }
        let _ = write!(line, "{:02x}", v);
    }
    line
}

/// trace hook writing `trace_line`s to `out`. the first write failure is
/// logged and tracing stops there
pub fn writer_trace_hook<W: Write + 'static>(mut out: W) -> TraceHook {
    let mut failed = false;
    Box::new(move |event: &TraceEvent| {
        if failed {
            return;
        }
        if let Err(e) = writeln!(out, "{}", trace_line(event)) {
            warn!("trace output failed, tracing stopped: {}", e);
            failed = true;
        }
    })
}
