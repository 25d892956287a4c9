use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Run a CHIP-8 program in the terminal.
///
/// Keys: 1234 / qwer / asdf / zxcv map onto the hex keypad, Esc quits.
#[derive(Debug, Clone, Parser)]
#[command(name = "chip8-vm", version)]
pub struct Config {
    /// program image to load at 0x200
    pub rom: PathBuf,

    /// pause between instruction cycles, in milliseconds
    #[arg(long, default_value_t = 3)]
    pub cycle_delay_ms: u64,

    /// how often the screen is redrawn
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// stop on unknown instructions instead of skipping them
    #[arg(long)]
    pub strict: bool,

    /// no audio
    #[arg(long)]
    pub mute: bool,

    /// how long a key press stays down, terminals never report releases
    #[arg(long, default_value_t = 150)]
    pub key_hold_ms: u64,

    /// stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// write one line per executed instruction to this file
    #[arg(long)]
    pub trace: Option<PathBuf>,
}

impl Config {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    pub fn key_hold(&self) -> Duration {
        Duration::from_millis(self.key_hold_ms)
    }

    /// the display name a rom gets from its path
    pub fn rom_source(&self) -> String {
        self.rom.to_string_lossy().into_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rom: PathBuf::new(),
            cycle_delay_ms: 3,
            fps: 60,
            strict: false,
            mute: false,
            key_hold_ms: 150,
            max_cycles: None,
            trace: None,
        }
    }
}
