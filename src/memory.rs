use crate::error::{Chip8Error, Chip8Result};

// NB. addresses are u16 as per the chip-8; lengths are usize to stop endless casting

/// Represents the flat memory space the interpreter reads and writes. Every
/// access is bounds checked; nothing is written unless the whole range fits.
pub trait MemoryMap {
    /// write a chunk of bytes into "RAM"
    fn write(&mut self, data: &[u8], addr: u16) -> Chip8Result {
        let bytes = self.get_rw_slice(addr, data.len())?;
        bytes.copy_from_slice(data);
        Ok(())
    }

    /// get a two-byte big-endian word (instructions)
    fn get_word(&self, addr: u16) -> Chip8Result<u16> {
        let word = self.get_ro_slice(addr, 2)?;
        Ok(((word[0] as u16) << 8) | (word[1] as u16))
    }

    fn get_byte(&self, addr: u16) -> Chip8Result<u8> {
        Ok(self.get_ro_slice(addr, 1)?[0])
    }

    /// get a r/w slice of the underlying memory
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> Chip8Result<&mut [u8]>;

    /// get a r/o slice of the underlying memory
    fn get_ro_slice(&self, addr: u16, len: usize) -> Chip8Result<&[u8]>;
}

/// how much RAM we have
pub const CHIP8_RAM_SIZE_BYTES: usize = 4096;

/// where the program is loaded
pub const CHIP8_PROGRAM_ADDR: u16 = 0x0200;

/// largest program image that fits between the load address and the top of RAM
pub const CHIP8_MAX_PROGRAM_BYTES: usize = CHIP8_RAM_SIZE_BYTES - CHIP8_PROGRAM_ADDR as usize;

/// where the built-in hex font lives, and how tall each glyph is
pub const CHIP8_FONT_ADDR: u16 = 0x050;
pub const CHIP8_FONT_GLYPH_BYTES: u16 = 5;

/// Defines the CHIP-8 memory map used here:
///   0x0000-0x004f  unused
///   0x0050-0x009f  font (16 glyphs x 5 bytes)
///   0x00a0-0x01ff  unused
///   0x0200-0x0fff  program and work RAM
///
/// stack, timers and display live outside RAM, in the interpreter
pub struct Chip8MemoryMap {
    bytes: Box<[u8]>,
    pub program_addr: u16,
    pub font_addr: u16,
}

impl MemoryMap for Chip8MemoryMap {
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> Chip8Result<&mut [u8]> {
        let range = Self::checked_range(addr, len)?;
        Ok(&mut self.bytes[range])
    }

    fn get_ro_slice(&self, addr: u16, len: usize) -> Chip8Result<&[u8]> {
        let range = Self::checked_range(addr, len)?;
        Ok(&self.bytes[range])
    }
}

impl Default for Chip8MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip8MemoryMap {
    /// zeroed RAM with the font baked in
    pub fn new() -> Self {
        let mut mm = Chip8MemoryMap {
            bytes: vec![0u8; CHIP8_RAM_SIZE_BYTES].into_boxed_slice(),
            program_addr: CHIP8_PROGRAM_ADDR,
            font_addr: CHIP8_FONT_ADDR,
        };
        mm.install_font();
        mm
    }

    /// zero everything, then put the font back
    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.install_font();
    }

    /// load a CHIP-8 program at 0x200. oversized images are rejected before
    /// anything is written
    pub fn load_program(&mut self, program: &[u8]) -> Chip8Result {
        if program.len() > CHIP8_MAX_PROGRAM_BYTES {
            return Err(Chip8Error::ProgramTooLarge {
                size: program.len(),
                max: CHIP8_MAX_PROGRAM_BYTES,
            });
        }
        self.write(program, self.program_addr)
    }

    /// address of the built-in glyph for `digit`. not masked, so anything
    /// above 0xf points past the end of the font
    pub fn glyph_addr(&self, digit: u8) -> u16 {
        self.font_addr + CHIP8_FONT_GLYPH_BYTES * digit as u16
    }

    fn install_font(&mut self) {
        let start = self.font_addr as usize;
        self.bytes[start..start + CHIP8_FONT.len()].copy_from_slice(&CHIP8_FONT);
    }

    fn checked_range(addr: u16, len: usize) -> Chip8Result<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start + len;
        if end > CHIP8_RAM_SIZE_BYTES {
            return Err(Chip8Error::OutOfBounds {
                address: start.max(CHIP8_RAM_SIZE_BYTES),
            });
        }
        Ok(start..end)
    }
}

pub const CHIP8_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];
