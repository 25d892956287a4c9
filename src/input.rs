use crossterm::event::{poll, read, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use log::warn;
use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use crate::interpreter::KEY_COUNT;

/// left-hand side of a qwerty keyboard, laid out like the COSMAC hex keypad
///   1 2 3 4      1 2 3 C
///   q w e r  ->  4 5 6 D
///   a s d f      7 8 9 E
///   z x c v      A 0 B F
const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00),
    ('1', 0x01),
    ('2', 0x02),
    ('3', 0x03),
    ('q', 0x04),
    ('w', 0x05),
    ('e', 0x06),
    ('a', 0x07),
    ('s', 0x08),
    ('d', 0x09),
    ('z', 0x0a),
    ('c', 0x0b),
    ('4', 0x0c),
    ('r', 0x0d),
    ('f', 0x0e),
    ('v', 0x0f),
];

/// reads keypresses
pub trait Input {
    /// overwrite `keys` with which hex keys are down right now. returns true
    /// when the user has asked to quit
    fn poll_keys(&mut self, keys: &mut [bool; KEY_COUNT]) -> Result<bool, io::Error>;
}

/// terminals report presses (and auto-repeats) but never releases, so a
/// press counts as held for a fixed time after it was last seen
struct KeyLatch {
    pressed_at: [Option<Instant>; KEY_COUNT],
    hold: Duration,
}

impl KeyLatch {
    fn new(hold: Duration) -> Self {
        KeyLatch {
            pressed_at: [None; KEY_COUNT],
            hold,
        }
    }

    fn press(&mut self, key: u8, now: Instant) {
        if let Some(slot) = self.pressed_at.get_mut(key as usize) {
            *slot = Some(now);
        }
    }

    fn fill(&self, keys: &mut [bool; KEY_COUNT], now: Instant) {
        for (held, pressed_at) in keys.iter_mut().zip(self.pressed_at.iter()) {
            *held = matches!(pressed_at, Some(t) if now.duration_since(*t) < self.hold);
        }
    }
}

/// Input implementation reading the terminal through crossterm
pub struct TermInput {
    keymap: HashMap<char, u8>,
    latch: KeyLatch,
}

impl TermInput {
    pub fn new(hold: Duration) -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(TermInput {
            keymap: HashMap::from(CHIP8_CONVENTIONAL_KEYMAP),
            latch: KeyLatch::new(hold),
        })
    }

    /// drain pending terminal events; true if one of them was a quit
    fn read_events(&mut self) -> Result<bool, io::Error> {
        let mut quit = false;
        while poll(Duration::from_millis(0))? {
            if let Event::Key(evt) = read()? {
                match evt.code {
                    KeyCode::Char('c') if evt.modifiers.contains(KeyModifiers::CONTROL) => {
                        quit = true
                    }
                    KeyCode::Char(key) => match self.keymap.get(&key.to_ascii_lowercase()) {
                        Some(&mapped_key) => self.latch.press(mapped_key, Instant::now()),
                        None => warn!("can't map {:?} to a COSMAC key", key),
                    },
                    KeyCode::Esc => quit = true,
                    _ => {}
                }
            }
        }
        Ok(quit)
    }
}

impl Drop for TermInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Input for TermInput {
    fn poll_keys(&mut self, keys: &mut [bool; KEY_COUNT]) -> Result<bool, io::Error> {
        let quit = self.read_events()?;
        self.latch.fill(keys, Instant::now());
        Ok(quit)
    }
}

/// dummy Input implementation for testing: always reports the same keys,
/// and optionally asks to quit after a number of polls
pub struct DummyInput {
    keys: Vec<u8>,
    polls: usize,
    quit_after: Option<usize>,
}

impl DummyInput {
    pub fn new(keys: &[u8]) -> Self {
        DummyInput {
            keys: Vec::from(keys),
            polls: 0,
            quit_after: None,
        }
    }

    pub fn quit_after(mut self, polls: usize) -> Self {
        self.quit_after = Some(polls);
        self
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl Input for DummyInput {
    fn poll_keys(&mut self, keys: &mut [bool; KEY_COUNT]) -> Result<bool, io::Error> {
        self.polls += 1;
        *keys = [false; KEY_COUNT];
        for &k in &self.keys {
            if let Some(slot) = keys.get_mut(k as usize) {
                *slot = true;
            }
        }
        Ok(matches!(self.quit_after, Some(n) if self.polls > n))
    }
}
