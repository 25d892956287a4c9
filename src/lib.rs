//! # chip8-vm
//!
//! A CHIP-8 interpreter core plus a terminal host to run it in.
//!
//! ## Design
//!
//! * the interpreter owns all machine state and nothing else: 4K of RAM with
//!   the font at 0x050, V0-VF, I, PC, a 16 deep call stack, two timers, the
//!   keypad and a 64x32 framebuffer of u32 pixels
//! * decoding is a pure function to an `Instruction` enum; execution is a
//!   match over that
//! * one `step_cycle()` is fetch, decode, execute, then both timers tick.
//!   it either completes or fails with a `Chip8Error`, leaving state as it was
//! * unknown encodings are skipped unless strict mode is on
//! * display, input and audio sit behind traits so the interpreter doesn't
//!   need to know how the screen works; the terminal versions use TUI,
//!   crossterm and the PC speaker
//! * pacing belongs to the host: the environment sleeps between cycles and
//!   redraws at its own frame rate
//!
//! Model
//!
//! Environment
//!  |-- display, input, sound, config
//!  |-- interpreter(memory)
//!  |    `-- instruction set
//!  `-- main loop
//!       |-- input.poll_keys() -> interpreter.set_keys()
//!       |-- interpreter.step_cycle()
//!       |-- sound.update(sound timer)
//!       |-- display.draw(framebuffer, pitch) every frame interval
//!       `-- sleep(cycle delay)
pub mod config;
pub mod display;
pub mod environment;
pub mod error;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod sound;

pub use error::{Chip8Error, Chip8Result};
pub use instruction::{decode, Instruction};
pub use interpreter::Chip8Interpreter;
