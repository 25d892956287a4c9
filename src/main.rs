use clap::Parser;
use log::info;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;

use chip8_vm::config::Config;
use chip8_vm::display::MonoTermDisplay;
use chip8_vm::environment::{writer_trace_hook, Environment, RunOutcome};
use chip8_vm::input::TermInput;
use chip8_vm::interpreter::{Chip8Interpreter, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use chip8_vm::sound::{Mute, SimpleBeep, Sound};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = Config::parse();

    // load a program before touching the terminal, so errors stay readable
    let program = fs::read(&config.rom)?;
    let mut interpreter = Chip8Interpreter::new();
    interpreter.set_strict(config.strict);
    interpreter.load_program(&program, &config.rom_source())?;
    if let Some(path) = &config.trace {
        interpreter.set_trace_hook(writer_trace_hook(BufWriter::new(File::create(path)?)));
    }

    let mut display = MonoTermDisplay::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)?;
    let mut input = TermInput::new(config.key_hold())?;
    let mut sound: Box<dyn Sound> = if config.mute {
        Box::new(Mute::new())
    } else {
        Box::new(SimpleBeep::new())
    };

    let mut env = Environment::new(
        interpreter,
        &mut display,
        &mut input,
        sound.as_mut(),
        &config,
    );
    let outcome = env.main_loop(config.max_cycles);
    let cycles = env.cycles();
    drop(env);
    drop(input);
    drop(display);

    // shove some junk on stdout to stop the cli messing up the last frame
    for _ in 0..12 {
        println!();
    }
    match outcome? {
        RunOutcome::Quit => info!("quit after {} cycles", cycles),
        RunOutcome::CycleLimit => info!("cycle limit reached after {} cycles", cycles),
    }
    Ok(())
}
