/// # interpreter
///
/// Machine state for the CHIP-8 as seen by a program:
///  V0-VF  16 8bit registers; VF doubles as carry/borrow/collision flag and
///         gets clobbered by arithmetic, shifts and draws
///  I      16bit index register, points at sprites/BCD/register blocks
///  PC     16bit program counter                -- 0x200 after reset
///  stack  16 return addresses + stack pointer  -- lives outside RAM here
///  delay and sound timers, 8bit, count down once per cycle
///  keypad 16 keys, written by the host before each cycle
///  display 64x32, one u32 per pixel (all bits set = on) so a host can hand
///         it straight to a streaming texture
///
/// `step_cycle` does fetch, decode, execute and the timer tick. A failed
/// cycle leaves the machine exactly as it was before the call.
use crate::error::{Chip8Error, Chip8Result};
use crate::instruction::{decode, Instruction};
use crate::memory::{Chip8MemoryMap, MemoryMap};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const PIXEL_ON: u32 = 0xffff_ffff;
pub const PIXEL_OFF: u32 = 0x0000_0000;

/// bytes per framebuffer row
pub const FRAMEBUFFER_PITCH: usize = DISPLAY_WIDTH * std::mem::size_of::<u32>();

pub const STACK_DEPTH: usize = 16;
pub const KEY_COUNT: usize = 16;

const FLAG: usize = 0xf;

/// What the trace hook sees: the machine just before an instruction runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub pc: u16,
    pub opcode: u16,
    pub instruction: Instruction,
    pub index: u16,
    pub registers: [u8; 16],
}

pub type TraceHook = Box<dyn FnMut(&TraceEvent)>;

pub struct Chip8Interpreter {
    memory: Chip8MemoryMap,
    registers: [u8; 16],
    index: u16,
    program_counter: u16,
    stack: [u16; STACK_DEPTH],
    stack_pointer: usize,
    delay_timer: u8,
    sound_timer: u8,
    opcode: u16,
    keymap: [bool; KEY_COUNT],
    framebuffer: Box<[u32]>,
    rom_name: String,
    strict: bool,
    rng: StdRng,
    trace_hook: Option<TraceHook>,
}

impl Default for Chip8Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip8Interpreter {
    /// fresh machine, random numbers seeded from the OS
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// fresh machine with a reproducible random sequence
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let memory = Chip8MemoryMap::new();
        let program_counter = memory.program_addr;
        Chip8Interpreter {
            memory,
            registers: [0; 16],
            index: 0,
            program_counter,
            stack: [0; STACK_DEPTH],
            stack_pointer: 0,
            delay_timer: 0,
            sound_timer: 0,
            opcode: 0,
            keymap: [false; KEY_COUNT],
            framebuffer: vec![PIXEL_OFF; DISPLAY_WIDTH * DISPLAY_HEIGHT].into_boxed_slice(),
            rom_name: String::new(),
            strict: false,
            rng,
            trace_hook: None,
        }
    }

    /// report unknown encodings as errors instead of skipping them
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_trace_hook(&mut self, hook: TraceHook) {
        self.trace_hook = Some(hook);
    }

    pub fn clear_trace_hook(&mut self) {
        self.trace_hook = None;
    }

    /// zero all machine state and put the font back. strict mode, the trace
    /// hook and the random generator belong to the host and survive this
    pub fn reset(&mut self) {
        self.memory.reset();
        self.registers = [0; 16];
        self.index = 0;
        self.program_counter = self.memory.program_addr;
        self.stack = [0; STACK_DEPTH];
        self.stack_pointer = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.opcode = 0;
        self.keymap = [false; KEY_COUNT];
        self.framebuffer.fill(PIXEL_OFF);
        self.rom_name.clear();
        debug!("machine reset");
    }

    /// load a chip8 program at 0x200. `source` is wherever it came from,
    /// usually a file path; its last component becomes the rom name
    pub fn load_program(&mut self, program: &[u8], source: &str) -> Chip8Result {
        self.memory.load_program(program)?;
        self.rom_name = rom_name_from(source);
        debug!("loaded {} ({} bytes)", self.rom_name, program.len());
        Ok(())
    }

    /// one full fetch/decode/execute/timer cycle
    pub fn step_cycle(&mut self) -> Chip8Result {
        let pc = self.program_counter;
        let opcode = self.memory.get_word(pc)?;
        let instruction = decode(opcode);
        trace!("{:#05x}: {:04x} {:?}", pc, opcode, instruction);

        if let Some(hook) = self.trace_hook.as_mut() {
            hook(&TraceEvent {
                pc,
                opcode,
                instruction,
                index: self.index,
                registers: self.registers,
            });
        }

        // fetch leaves PC on the next instruction; a failed execute must put
        // it back, nothing else has been touched at that point
        self.program_counter = pc + 2;
        if let Err(e) = self.execute(instruction) {
            self.program_counter = pc;
            return Err(e);
        }
        self.opcode = opcode;

        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
        Ok(())
    }

    fn execute(&mut self, instruction: Instruction) -> Chip8Result {
        use Instruction::*;

        match instruction {
            ClearScreen => self.framebuffer.fill(PIXEL_OFF),
            Return => {
                if self.stack_pointer == 0 {
                    return Err(Chip8Error::StackUnderflow);
                }
                self.stack_pointer -= 1;
                self.program_counter = self.stack[self.stack_pointer];
            }
            Jump { addr } => self.program_counter = addr,
            Call { addr } => {
                if self.stack_pointer == STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow);
                }
                self.stack[self.stack_pointer] = self.program_counter;
                self.stack_pointer += 1;
                self.program_counter = addr;
            }
            SkipIfEqualImm { x, value } => self.skip_if(self.v(x) == value),
            SkipIfNotEqualImm { x, value } => self.skip_if(self.v(x) != value),
            SkipIfEqualReg { x, y } => self.skip_if(self.v(x) == self.v(y)),
            LoadImm { x, value } => self.set_v(x, value),
            AddImm { x, value } => self.set_v(x, self.v(x).wrapping_add(value)),
            Move { x, y } => self.set_v(x, self.v(y)),
            Or { x, y } => self.set_v(x, self.v(x) | self.v(y)),
            And { x, y } => self.set_v(x, self.v(x) & self.v(y)),
            Xor { x, y } => self.set_v(x, self.v(x) ^ self.v(y)),
            AddReg { x, y } => {
                let (sum, carry) = self.v(x).overflowing_add(self.v(y));
                self.set_flag_then_v(carry, x, sum);
            }
            // VF is written before VX is computed, so a flag operand reads
            // the new flag
            SubReg { x, y } => {
                // strictly greater: equal operands give a flag of 0
                self.set_flag(self.v(x) > self.v(y));
                self.set_v(x, self.v(x).wrapping_sub(self.v(y)));
            }
            ShiftRight { x } => {
                self.set_flag(self.v(x) & 0x01 == 1);
                self.set_v(x, self.v(x) >> 1);
            }
            SubReverse { x, y } => {
                self.set_flag(self.v(x) < self.v(y));
                self.set_v(x, self.v(y).wrapping_sub(self.v(x)));
            }
            ShiftLeft { x } => {
                self.set_flag((self.v(x) & 0x80) >> 7 == 1);
                self.set_v(x, self.v(x) << 1);
            }
            SkipIfNotEqualReg { x, y } => self.skip_if(self.v(x) != self.v(y)),
            LoadIndex { addr } => self.index = addr,
            JumpOffset { addr } => self.program_counter = addr + self.registers[0] as u16,
            Random { x, mask } => {
                let byte: u8 = self.rng.gen();
                self.set_v(x, byte & mask);
            }
            Draw { x, y, rows } => self.draw(x, y, rows)?,
            SkipIfKeyDown { x } => {
                let pressed = self.key(self.v(x))?;
                self.skip_if(pressed);
            }
            SkipIfKeyUp { x } => {
                let pressed = self.key(self.v(x))?;
                self.skip_if(!pressed);
            }
            LoadDelay { x } => self.set_v(x, self.delay_timer),
            WaitKey { x } => match self.keymap.iter().position(|&pressed| pressed) {
                Some(key) => self.set_v(x, key as u8),
                // go round again; timers still tick
                None => self.program_counter -= 2,
            },
            SetDelay { x } => self.delay_timer = self.v(x),
            SetSound { x } => self.sound_timer = self.v(x),
            AddIndex { x } => self.index = self.index.wrapping_add(self.v(x) as u16),
            LoadGlyph { x } => self.index = self.memory.glyph_addr(self.v(x)),
            StoreBcd { x } => {
                let vx = self.v(x);
                let digits = [vx / 100, (vx / 10) % 10, (vx % 100) % 10];
                self.memory.write(&digits, self.index)?;
            }
            // I is left alone by both of these
            StoreRegisters { x } => {
                let count = x as usize + 1;
                self.memory.write(&self.registers[..count], self.index)?;
            }
            LoadRegisters { x } => {
                let count = x as usize + 1;
                let block = self.memory.get_ro_slice(self.index, count)?;
                self.registers[..count].copy_from_slice(block);
            }
            Unknown(opcode) => {
                if self.strict {
                    return Err(Chip8Error::UnknownEncoding { opcode });
                }
                debug!("ignoring unknown instruction {:04x}", opcode);
            }
        }
        Ok(())
    }

    /// XOR a sprite of `rows` bytes from I onto the display at (VX, VY).
    /// coordinates wrap per pixel; VF ends up 1 if any lit pixel was erased
    fn draw(&mut self, x: u8, y: u8, rows: u8) -> Chip8Result {
        let origin_x = self.v(x) as usize;
        let origin_y = self.v(y) as usize;
        let sprite = self.memory.get_ro_slice(self.index, rows as usize)?;

        let mut collision = false;
        for (row, byte) in sprite.iter().enumerate() {
            let py = (origin_y + row) % DISPLAY_HEIGHT;
            for col in 0..8 {
                if byte & (0x80 >> col) == 0 {
                    continue;
                }
                let px = (origin_x + col) % DISPLAY_WIDTH;
                let pixel = &mut self.framebuffer[py * DISPLAY_WIDTH + px];
                if *pixel == PIXEL_ON {
                    collision = true;
                }
                *pixel ^= PIXEL_ON;
            }
        }
        self.set_flag(collision);
        Ok(())
    }

    fn v(&self, x: u8) -> u8 {
        self.registers[x as usize]
    }

    fn set_v(&mut self, x: u8, value: u8) {
        self.registers[x as usize] = value;
    }

    fn set_flag(&mut self, flag: bool) {
        self.registers[FLAG] = flag as u8;
    }

    /// VF first, then VX; when X is F the result wins
    fn set_flag_then_v(&mut self, flag: bool, x: u8, value: u8) {
        self.set_flag(flag);
        self.set_v(x, value);
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.program_counter += 2;
        }
    }

    fn key(&self, key: u8) -> Chip8Result<bool> {
        self.keymap
            .get(key as usize)
            .copied()
            .ok_or(Chip8Error::InvalidKey { key })
    }

    /// overwrite the whole keypad
    pub fn set_keys(&mut self, keys: [bool; KEY_COUNT]) {
        self.keymap = keys;
    }

    pub fn set_key(&mut self, key: u8, pressed: bool) -> Chip8Result {
        let slot = self
            .keymap
            .get_mut(key as usize)
            .ok_or(Chip8Error::InvalidKey { key })?;
        *slot = pressed;
        Ok(())
    }

    pub fn keymap(&self) -> &[bool; KEY_COUNT] {
        &self.keymap
    }

    pub fn pc(&self) -> u16 {
        self.program_counter
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn register(&self, x: u8) -> u8 {
        self.v(x & 0x0f)
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.registers
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// last successfully executed instruction word
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    /// 64x32 pixels, row major, `PIXEL_ON` or `PIXEL_OFF`
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    pub fn pitch(&self) -> usize {
        FRAMEBUFFER_PITCH
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.framebuffer[(y % DISPLAY_HEIGHT) * DISPLAY_WIDTH + (x % DISPLAY_WIDTH)] == PIXEL_ON
    }

    pub fn rom_name(&self) -> &str {
        &self.rom_name
    }

    pub fn memory(&self) -> &Chip8MemoryMap {
        &self.memory
    }
}

/// last path component, accepting either separator
fn rom_name_from(source: &str) -> String {
    source
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(source)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine(program: &[u8]) -> Chip8Result<Chip8Interpreter> {
        let mut m = Chip8Interpreter::with_seed(0x5eed);
        m.load_program(program, "roms/test.ch8")?;
        Ok(m)
    }

    fn run(program: &[u8], cycles: usize) -> Chip8Result<Chip8Interpreter> {
        let mut m = machine(program)?;
        for _ in 0..cycles {
            m.step_cycle()?;
        }
        Ok(m)
    }

    /// run a single instruction at 0x200 on an existing machine
    fn exec(m: &mut Chip8Interpreter, opcode: u16) -> Chip8Result {
        m.memory.write(&opcode.to_be_bytes(), 0x200)?;
        m.program_counter = 0x200;
        m.step_cycle()
    }

    fn lit_pixels(m: &Chip8Interpreter) -> usize {
        m.framebuffer().iter().filter(|&&p| p == PIXEL_ON).count()
    }

    #[test]
    fn test_program_load_ok() -> Chip8Result {
        let m = machine(&[0x00, 0xe0])?; // clear screen
        assert_eq!(m.memory().get_ro_slice(0x200, 2)?, &[0x00, 0xe0]);
        assert_eq!(m.rom_name(), "test.ch8");
        assert_eq!(m.pc(), 0x200);
        Ok(())
    }

    #[test]
    fn test_rom_name_from_paths() {
        assert_eq!(rom_name_from("roms/pong.ch8"), "pong.ch8");
        assert_eq!(rom_name_from("C:\\roms\\tetris.ch8"), "tetris.ch8");
        assert_eq!(rom_name_from("maze"), "maze");
        assert_eq!(rom_name_from("roms/"), "roms/");
    }

    #[test]
    fn test_program_too_large_rejected() -> Chip8Result {
        let mut m = machine(&[0x12, 0x00])?;
        let res = m.load_program(&[0xff; 3585], "big.ch8");
        assert_eq!(
            res,
            Err(Chip8Error::ProgramTooLarge {
                size: 3585,
                max: 3584
            })
        );
        // nothing changed, not even the name
        assert_eq!(m.rom_name(), "test.ch8");
        assert_eq!(m.memory().get_ro_slice(0x200, 3)?, &[0x12, 0x00, 0x00]);

        m.reset();
        m.load_program(&[0xff; 3584], "fits.ch8")?;
        assert_eq!(m.memory().get_byte(0xfff)?, 0xff);
        Ok(())
    }

    #[test]
    fn test_reset_zeroes_state() -> Chip8Result {
        let mut m = run(&[0x60, 0x05, 0xa2, 0x34, 0xf0, 0x15, 0x22, 0x08], 4)?;
        m.set_key(3, true)?;
        m.framebuffer[10] = PIXEL_ON;
        m.set_strict(true);
        m.reset();

        assert_eq!(m.registers(), &[0; 16]);
        assert_eq!(m.index(), 0);
        assert_eq!(m.pc(), 0x200);
        assert_eq!(m.stack_pointer(), 0);
        assert_eq!(m.stack, [0; 16]);
        assert_eq!(m.delay_timer(), 0);
        assert_eq!(m.opcode(), 0);
        assert_eq!(m.keymap(), &[false; 16]);
        assert_eq!(lit_pixels(&m), 0);
        assert_eq!(m.rom_name(), "");
        assert_eq!(m.memory().get_word(0x200)?, 0);
        assert_eq!(m.memory().get_ro_slice(0x050, 80)?, &crate::memory::CHIP8_FONT[..]);
        assert!(m.is_strict());
        Ok(())
    }

    #[test]
    fn test_reset_keeps_trace_hook_and_random_sequence() -> Chip8Result {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut a = machine(&[])?;
        let mut b = machine(&[])?;
        a.set_trace_hook(Box::new(move |event: &TraceEvent| {
            sink.borrow_mut().push(event.opcode);
        }));

        exec(&mut a, 0xc3ff)?;
        exec(&mut b, 0xc3ff)?;
        a.reset();
        a.load_program(&[], "roms/test.ch8")?;

        // the hook is still installed and the generator carries on where it
        // was instead of starting over from the seed
        for _ in 0..8 {
            exec(&mut a, 0xc3ff)?;
            exec(&mut b, 0xc3ff)?;
            assert_eq!(a.register(3), b.register(3));
        }
        assert_eq!(seen.borrow().len(), 9);
        assert_eq!(seen.borrow()[1], 0xc3ff);

        // a reseeded generator would repeat the very first value
        let mut restarted = machine(&[])?;
        let mut continued = machine(&[])?;
        exec(&mut continued, 0xc3ff)?;
        continued.reset();
        let mut firsts = Vec::new();
        let mut seconds = Vec::new();
        for _ in 0..8 {
            exec(&mut restarted, 0xc3ff)?;
            exec(&mut continued, 0xc3ff)?;
            firsts.push(restarted.register(3));
            seconds.push(continued.register(3));
        }
        assert_ne!(firsts, seconds);
        Ok(())
    }

    #[test]
    fn test_load_then_add_scenario() -> Chip8Result {
        let m = run(&[0x60, 0x05, 0x70, 0x03], 2)?;
        assert_eq!(m.register(0), 8);
        assert_eq!(m.pc(), 0x204);
        assert_eq!(m.opcode(), 0x7003);
        Ok(())
    }

    #[test]
    fn test_add_imm_wraps_without_flag() -> Chip8Result {
        let m = run(&[0x6a, 0xfe, 0x7a, 0x05], 2)?;
        assert_eq!(m.register(0xa), 0x03);
        assert_eq!(m.register(0xf), 0);
        Ok(())
    }

    #[test]
    fn test_clear_screen() -> Chip8Result {
        let mut m = machine(&[0x00, 0xe0])?;
        m.framebuffer.fill(PIXEL_ON);
        m.step_cycle()?;
        assert!(m.framebuffer().iter().all(|&p| p == PIXEL_OFF));
        Ok(())
    }

    #[test]
    fn test_jump() -> Chip8Result {
        let m = run(&[0x1a, 0xbc], 1)?;
        assert_eq!(m.pc(), 0xabc);
        Ok(())
    }

    #[test]
    fn test_call_returns_to_caller() -> Chip8Result {
        // 0x200 call 0x206; 0x202 ld v1, 1; 0x204 jp 0x204; 0x206 ld v0, 9; 0x208 ret
        let mut m = machine(&[0x22, 0x06, 0x61, 0x01, 0x12, 0x04, 0x60, 0x09, 0x00, 0xee])?;
        m.step_cycle()?;
        assert_eq!(m.pc(), 0x206);
        assert_eq!(m.stack_pointer(), 1);
        m.step_cycle()?;
        m.step_cycle()?;
        assert_eq!(m.pc(), 0x202);
        assert_eq!(m.stack_pointer(), 0);
        m.step_cycle()?;
        assert_eq!(m.registers()[..2], [9, 1]);
        Ok(())
    }

    #[test]
    fn test_stack_overflow_is_fatal() -> Chip8Result {
        // call self forever
        let mut m = machine(&[0x22, 0x00])?;
        for _ in 0..16 {
            m.step_cycle()?;
        }
        assert_eq!(m.stack_pointer(), 16);
        assert_eq!(m.step_cycle(), Err(Chip8Error::StackOverflow));
        assert_eq!(m.stack_pointer(), 16);
        assert_eq!(m.pc(), 0x200);
        Ok(())
    }

    #[test]
    fn test_stack_underflow_is_fatal() -> Chip8Result {
        let mut m = machine(&[0xf0, 0x15, 0x00, 0xee])?;
        m.registers[0] = 5;
        m.step_cycle()?;
        assert_eq!(m.delay_timer(), 4);
        assert_eq!(m.step_cycle(), Err(Chip8Error::StackUnderflow));
        // failed cycle: PC back on the ret, timers not ticked
        assert_eq!(m.pc(), 0x202);
        assert_eq!(m.delay_timer(), 4);
        assert_eq!(m.opcode(), 0xf015);
        Ok(())
    }

    #[test]
    fn test_skip_immediate() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[3] = 0x42;
        exec(&mut m, 0x3342)?;
        assert_eq!(m.pc(), 0x204);
        exec(&mut m, 0x3343)?;
        assert_eq!(m.pc(), 0x202);
        exec(&mut m, 0x4342)?;
        assert_eq!(m.pc(), 0x202);
        exec(&mut m, 0x4343)?;
        assert_eq!(m.pc(), 0x204);
        Ok(())
    }

    #[test]
    fn test_skip_register() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 7;
        m.registers[2] = 7;
        m.registers[3] = 8;
        exec(&mut m, 0x5120)?;
        assert_eq!(m.pc(), 0x204);
        exec(&mut m, 0x5130)?;
        assert_eq!(m.pc(), 0x202);
        exec(&mut m, 0x9120)?;
        assert_eq!(m.pc(), 0x202);
        exec(&mut m, 0x9130)?;
        assert_eq!(m.pc(), 0x204);
        Ok(())
    }

    #[test]
    fn test_bitwise_and_move() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 0b1100;
        m.registers[2] = 0b1010;
        exec(&mut m, 0x8121)?;
        assert_eq!(m.register(1), 0b1110);
        m.registers[1] = 0b1100;
        exec(&mut m, 0x8122)?;
        assert_eq!(m.register(1), 0b1000);
        m.registers[1] = 0b1100;
        exec(&mut m, 0x8123)?;
        assert_eq!(m.register(1), 0b0110);
        exec(&mut m, 0x8120)?;
        assert_eq!(m.register(1), 0b1010);
        Ok(())
    }

    #[test]
    fn test_add_carry_for_every_pair() -> Chip8Result {
        let mut m = machine(&[])?;
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                m.registers[1] = a;
                m.registers[2] = b;
                exec(&mut m, 0x8124)?;
                let sum = a as u16 + b as u16;
                assert_eq!(m.register(1), (sum % 256) as u8);
                assert_eq!(m.register(0xf), (sum > 255) as u8, "{} + {}", a, b);
            }
        }
        Ok(())
    }

    #[test]
    fn test_sub_flag_is_zero_for_equal_operands() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 9;
        m.registers[2] = 9;
        exec(&mut m, 0x8125)?;
        assert_eq!((m.register(1), m.register(0xf)), (0, 0));

        m.registers[1] = 9;
        exec(&mut m, 0x8127)?;
        assert_eq!((m.register(1), m.register(0xf)), (0, 0));
        Ok(())
    }

    #[test]
    fn test_sub_and_reverse_sub() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 10;
        m.registers[2] = 3;
        exec(&mut m, 0x8125)?;
        assert_eq!((m.register(1), m.register(0xf)), (7, 1));

        m.registers[1] = 3;
        m.registers[2] = 10;
        exec(&mut m, 0x8125)?;
        assert_eq!((m.register(1), m.register(0xf)), (249, 0));

        m.registers[1] = 3;
        exec(&mut m, 0x8127)?;
        assert_eq!((m.register(1), m.register(0xf)), (7, 1));

        m.registers[1] = 10;
        m.registers[2] = 3;
        exec(&mut m, 0x8127)?;
        assert_eq!((m.register(1), m.register(0xf)), (249, 0));
        Ok(())
    }

    #[test]
    fn test_shifts_use_vx_not_vy() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 0b1000_0011;
        m.registers[2] = 0xff;
        exec(&mut m, 0x8126)?;
        assert_eq!((m.register(1), m.register(0xf)), (0b0100_0001, 1));
        exec(&mut m, 0x8126)?;
        assert_eq!((m.register(1), m.register(0xf)), (0b0010_0000, 1));
        exec(&mut m, 0x8126)?;
        assert_eq!((m.register(1), m.register(0xf)), (0b0001_0000, 0));

        m.registers[1] = 0b1000_0001;
        exec(&mut m, 0x812e)?;
        assert_eq!((m.register(1), m.register(0xf)), (0b0000_0010, 1));
        exec(&mut m, 0x812e)?;
        assert_eq!((m.register(1), m.register(0xf)), (0b0000_0100, 0));
        assert_eq!(m.register(2), 0xff);
        Ok(())
    }

    #[test]
    fn test_flag_register_as_destination_keeps_result() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[0xf] = 200;
        m.registers[1] = 100;
        exec(&mut m, 0x8f14)?;
        assert_eq!(m.register(0xf), 44);
        Ok(())
    }

    #[test]
    fn test_sub_and_shift_read_the_new_flag() -> Chip8Result {
        let mut m = machine(&[])?;
        // flag 1 goes in first, then v0 - vf = 5 - 1
        m.registers[0] = 5;
        m.registers[0xf] = 2;
        exec(&mut m, 0x80f5)?;
        assert_eq!((m.register(0), m.register(0xf)), (4, 1));

        // vf - v0 with the borrow flag already written: 1 - 3
        m.registers[0] = 3;
        m.registers[0xf] = 9;
        exec(&mut m, 0x80f7)?;
        assert_eq!((m.register(0), m.register(0xf)), (0xfe, 1));

        // shifting vf shifts the flag that was just stored
        m.registers[0xf] = 3;
        exec(&mut m, 0x8f06)?;
        assert_eq!(m.register(0xf), 0);
        m.registers[0xf] = 0x80;
        exec(&mut m, 0x8f0e)?;
        assert_eq!(m.register(0xf), 2);
        Ok(())
    }

    #[test]
    fn test_index_and_offset_jump() -> Chip8Result {
        let mut m = machine(&[])?;
        exec(&mut m, 0xa123)?;
        assert_eq!(m.index(), 0x123);
        m.registers[0] = 0x10;
        exec(&mut m, 0xb300)?;
        assert_eq!(m.pc(), 0x310);
        Ok(())
    }

    #[test]
    fn test_offset_jump_past_ram_fails_on_next_fetch() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[0] = 0xff;
        exec(&mut m, 0xbfff)?;
        assert_eq!(m.pc(), 0x10fe);
        assert_eq!(
            m.step_cycle(),
            Err(Chip8Error::OutOfBounds { address: 0x10fe })
        );
        Ok(())
    }

    #[test]
    fn test_fetch_at_last_byte_is_out_of_bounds() -> Chip8Result {
        let mut m = machine(&[])?;
        m.program_counter = 0xfff;
        assert_eq!(
            m.step_cycle(),
            Err(Chip8Error::OutOfBounds { address: 0x1000 })
        );
        assert_eq!(m.pc(), 0xfff);
        Ok(())
    }

    #[test]
    fn test_random_is_masked_and_seeded() -> Chip8Result {
        let mut a = machine(&[])?;
        let mut b = machine(&[])?;
        for _ in 0..32 {
            exec(&mut a, 0xc30f)?;
            exec(&mut b, 0xc30f)?;
            assert!(a.register(3) <= 0x0f);
            assert_eq!(a.register(3), b.register(3));
        }
        exec(&mut a, 0xc300)?;
        assert_eq!(a.register(3), 0);
        Ok(())
    }

    #[test]
    fn test_draw_font_glyph() -> Chip8Result {
        // ld v0, 0; ld F, v0; drw v0, v0, 5
        let m = run(&[0x60, 0x00, 0xf0, 0x29, 0xd0, 0x05], 3)?;
        assert_eq!(m.index(), 0x050);
        // "0" is F0 90 90 90 F0
        for x in 0..4 {
            assert!(m.pixel(x, 0));
            assert!(m.pixel(x, 4));
        }
        for y in 1..4 {
            assert!(m.pixel(0, y));
            assert!(!m.pixel(1, y));
            assert!(!m.pixel(2, y));
            assert!(m.pixel(3, y));
        }
        assert_eq!(lit_pixels(&m), 14);
        assert_eq!(m.register(0xf), 0);
        Ok(())
    }

    #[test]
    fn test_draw_twice_erases() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[1] = 10;
        m.registers[2] = 7;
        m.index = 0x050 + 5 * 8;
        m.framebuffer[7 * DISPLAY_WIDTH + 63] = PIXEL_ON;
        let before = m.framebuffer().to_vec();

        exec(&mut m, 0xd125)?;
        assert_eq!(m.register(0xf), 0);
        assert_ne!(m.framebuffer(), &before[..]);

        exec(&mut m, 0xd125)?;
        assert_eq!(m.register(0xf), 1);
        assert_eq!(m.framebuffer(), &before[..]);
        Ok(())
    }

    #[test]
    fn test_draw_wraps_both_axes() -> Chip8Result {
        let mut m = machine(&[])?;
        m.memory.write(&[0xff, 0xff], 0x300)?;
        m.index = 0x300;
        m.registers[1] = 60;
        m.registers[2] = 31;
        exec(&mut m, 0xd122)?;
        // row 31 and row 0, columns 60..63 and 0..3
        for x in [60, 61, 62, 63, 0, 1, 2, 3] {
            assert!(m.pixel(x, 31));
            assert!(m.pixel(x, 0));
        }
        assert_eq!(lit_pixels(&m), 16);
        // coordinates themselves wrap too
        m.framebuffer.fill(PIXEL_OFF);
        m.registers[1] = 64 + 2;
        m.registers[2] = 32 + 1;
        exec(&mut m, 0xd121)?;
        assert!(m.pixel(2, 1) && m.pixel(9, 1));
        assert_eq!(lit_pixels(&m), 8);
        Ok(())
    }

    #[test]
    fn test_draw_past_ram_changes_nothing() -> Chip8Result {
        let mut m = machine(&[])?;
        m.index = 0xffd;
        m.registers[0xf] = 0x55;
        let res = exec(&mut m, 0xd005);
        assert_eq!(res, Err(Chip8Error::OutOfBounds { address: 0x1000 }));
        assert_eq!(lit_pixels(&m), 0);
        assert_eq!(m.register(0xf), 0x55);
        assert_eq!(m.pc(), 0x200);
        Ok(())
    }

    #[test]
    fn test_key_skips() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[4] = 0xa;
        exec(&mut m, 0xe49e)?;
        assert_eq!(m.pc(), 0x202);
        exec(&mut m, 0xe4a1)?;
        assert_eq!(m.pc(), 0x204);

        m.set_key(0xa, true)?;
        exec(&mut m, 0xe49e)?;
        assert_eq!(m.pc(), 0x204);
        exec(&mut m, 0xe4a1)?;
        assert_eq!(m.pc(), 0x202);
        Ok(())
    }

    #[test]
    fn test_key_outside_keypad_is_fatal() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[4] = 0x10;
        assert_eq!(exec(&mut m, 0xe49e), Err(Chip8Error::InvalidKey { key: 0x10 }));
        assert_eq!(m.pc(), 0x200);
        assert_eq!(m.set_key(16, true), Err(Chip8Error::InvalidKey { key: 16 }));
        Ok(())
    }

    #[test]
    fn test_timers_load_and_store() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[5] = 30;
        exec(&mut m, 0xf515)?;
        assert_eq!(m.delay_timer(), 29);
        exec(&mut m, 0xf518)?;
        assert_eq!(m.sound_timer(), 29);
        assert_eq!(m.delay_timer(), 28);
        exec(&mut m, 0xf607)?;
        // read before this cycle's tick
        assert_eq!(m.register(6), 28);
        Ok(())
    }

    #[test]
    fn test_delay_timer_counts_down_to_zero() -> Chip8Result {
        // jp 0x200 forever
        let mut m = machine(&[0x12, 0x00])?;
        m.delay_timer = 2;
        m.sound_timer = 1;
        m.step_cycle()?;
        assert_eq!((m.delay_timer(), m.sound_timer()), (1, 0));
        m.step_cycle()?;
        assert_eq!((m.delay_timer(), m.sound_timer()), (0, 0));
        for _ in 0..5 {
            m.step_cycle()?;
            assert_eq!(m.delay_timer(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_wait_key_blocks_without_a_press() -> Chip8Result {
        let mut m = machine(&[0xf3, 0x0a])?;
        m.delay_timer = 3;
        m.step_cycle()?;
        assert_eq!(m.pc(), 0x200);
        m.step_cycle()?;
        assert_eq!(m.pc(), 0x200);
        // still waiting, but the timer kept going
        assert_eq!(m.delay_timer(), 1);

        let mut keys = [false; 16];
        keys[0xc] = true;
        keys[0x7] = true;
        m.set_keys(keys);
        m.step_cycle()?;
        assert_eq!(m.pc(), 0x202);
        assert_eq!(m.register(3), 0x7);
        Ok(())
    }

    #[test]
    fn test_add_index_is_unmasked() -> Chip8Result {
        let mut m = machine(&[])?;
        m.index = 0xfff;
        m.registers[2] = 0x10;
        exec(&mut m, 0xf21e)?;
        assert_eq!(m.index(), 0x100f);
        assert_eq!(m.register(0xf), 0);
        Ok(())
    }

    #[test]
    fn test_glyph_address() -> Chip8Result {
        let mut m = machine(&[])?;
        m.registers[2] = 0xf;
        exec(&mut m, 0xf229)?;
        assert_eq!(m.index(), 0x050 + 5 * 0xf);
        Ok(())
    }

    #[test]
    fn test_bcd() -> Chip8Result {
        let mut m = machine(&[])?;
        m.index = 0x300;
        for (value, digits) in [(254u8, [2, 5, 4]), (7, [0, 0, 7]), (100, [1, 0, 0])] {
            m.registers[9] = value;
            exec(&mut m, 0xf933)?;
            assert_eq!(m.memory().get_ro_slice(0x300, 3)?, &digits);
        }
        assert_eq!(m.index(), 0x300);

        m.index = 0xffe;
        assert_eq!(exec(&mut m, 0xf933), Err(Chip8Error::OutOfBounds { address: 0x1000 }));
        assert_eq!(m.memory().get_ro_slice(0xffe, 2)?, &[0, 0]);
        Ok(())
    }

    #[test]
    fn test_store_then_load_registers() -> Chip8Result {
        let mut m = machine(&[])?;
        m.index = 0x400;
        m.registers = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        exec(&mut m, 0xf455)?;
        // I is not advanced
        assert_eq!(m.index(), 0x400);
        assert_eq!(m.memory().get_ro_slice(0x400, 6)?, &[1, 2, 3, 4, 5, 0]);

        m.registers = [0xff; 16];
        exec(&mut m, 0xf465)?;
        assert_eq!(m.index(), 0x400);
        assert_eq!(m.registers()[..6], [1, 2, 3, 4, 5, 0xff]);
        Ok(())
    }

    #[test]
    fn test_register_block_past_ram_is_fatal() -> Chip8Result {
        let mut m = machine(&[])?;
        m.index = 0xffc;
        m.registers = [0xaa; 16];
        assert_eq!(exec(&mut m, 0xf555), Err(Chip8Error::OutOfBounds { address: 0x1000 }));
        assert_eq!(m.memory().get_ro_slice(0xffc, 4)?, &[0, 0, 0, 0]);
        assert_eq!(exec(&mut m, 0xf565), Err(Chip8Error::OutOfBounds { address: 0x1000 }));
        assert_eq!(m.registers(), &[0xaa; 16]);
        Ok(())
    }

    #[test]
    fn test_unknown_encoding_is_skipped_when_lenient() -> Chip8Result {
        // tolerated on purpose: unknown sub-opcodes behave as no-ops
        let m = run(&[0x81, 0x28, 0xe0, 0x00, 0xf0, 0xff], 3)?;
        assert_eq!(m.pc(), 0x206);
        assert_eq!(m.registers(), &[0; 16]);
        Ok(())
    }

    #[test]
    fn test_unknown_encoding_is_reported_when_strict() -> Chip8Result {
        let mut m = machine(&[0x60, 0x01, 0x81, 0x28])?;
        m.set_strict(true);
        m.step_cycle()?;
        assert_eq!(
            m.step_cycle(),
            Err(Chip8Error::UnknownEncoding { opcode: 0x8128 })
        );
        assert_eq!(m.pc(), 0x202);
        Ok(())
    }

    #[test]
    fn test_trace_hook_sees_each_cycle() -> Chip8Result {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut m = machine(&[0x60, 0x05, 0x70, 0x03, 0x12, 0x04])?;
        m.set_trace_hook(Box::new(move |event: &TraceEvent| {
            sink.borrow_mut().push(event.clone());
        }));
        m.step_cycle()?;
        m.step_cycle()?;
        m.clear_trace_hook();
        m.step_cycle()?;

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].pc, 0x200);
        assert_eq!(seen[0].instruction, Instruction::LoadImm { x: 0, value: 5 });
        assert_eq!(seen[1].opcode, 0x7003);
        // snapshot is taken before the instruction runs
        assert_eq!(seen[1].registers[0], 5);
        Ok(())
    }
}
