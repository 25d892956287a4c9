//! # instruction set
//!
//! Decoding is kept apart from execution: `decode` is a pure function from a
//! 16-bit word to an `Instruction`, and the interpreter dispatches on that.
//!
//! Operand naming follows the usual CHIP-8 docs:
//!  X   -- bits 8-11, a register index
//!  Y   -- bits 4-7, a register index
//!  N   -- bits 0-3
//!  NN  -- bits 0-7
//!  NNN -- bits 0-11, an address

/// A decoded CHIP-8 instruction. `x` and `y` are register indices (0x0-0xf).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    ClearScreen,
    /// 00EE
    Return,
    /// 1NNN
    Jump { addr: u16 },
    /// 2NNN
    Call { addr: u16 },
    /// 3XNN
    SkipIfEqualImm { x: u8, value: u8 },
    /// 4XNN
    SkipIfNotEqualImm { x: u8, value: u8 },
    /// 5XY0
    SkipIfEqualReg { x: u8, y: u8 },
    /// 6XNN
    LoadImm { x: u8, value: u8 },
    /// 7XNN
    AddImm { x: u8, value: u8 },
    /// 8XY0
    Move { x: u8, y: u8 },
    /// 8XY1
    Or { x: u8, y: u8 },
    /// 8XY2
    And { x: u8, y: u8 },
    /// 8XY3
    Xor { x: u8, y: u8 },
    /// 8XY4
    AddReg { x: u8, y: u8 },
    /// 8XY5
    SubReg { x: u8, y: u8 },
    /// 8XY6; shifts VX, Y is ignored
    ShiftRight { x: u8 },
    /// 8XY7
    SubReverse { x: u8, y: u8 },
    /// 8XYE; shifts VX, Y is ignored
    ShiftLeft { x: u8 },
    /// 9XY0
    SkipIfNotEqualReg { x: u8, y: u8 },
    /// ANNN
    LoadIndex { addr: u16 },
    /// BNNN
    JumpOffset { addr: u16 },
    /// CXNN
    Random { x: u8, mask: u8 },
    /// DXYN
    Draw { x: u8, y: u8, rows: u8 },
    /// EX9E
    SkipIfKeyDown { x: u8 },
    /// EXA1
    SkipIfKeyUp { x: u8 },
    /// FX07
    LoadDelay { x: u8 },
    /// FX0A
    WaitKey { x: u8 },
    /// FX15
    SetDelay { x: u8 },
    /// FX18
    SetSound { x: u8 },
    /// FX1E
    AddIndex { x: u8 },
    /// FX29
    LoadGlyph { x: u8 },
    /// FX33
    StoreBcd { x: u8 },
    /// FX55
    StoreRegisters { x: u8 },
    /// FX65
    LoadRegisters { x: u8 },
    /// anything else, kept so strict mode can report it
    Unknown(u16),
}

/// Decode a raw instruction word.
pub fn decode(opcode: u16) -> Instruction {
    use Instruction::*;

    let x = ((opcode & 0x0f00) >> 8) as u8;
    let y = ((opcode & 0x00f0) >> 4) as u8;
    let n = (opcode & 0x000f) as u8;
    let nn = (opcode & 0x00ff) as u8;
    let nnn = opcode & 0x0fff;

    match opcode >> 12 {
        0x0 => match opcode {
            0x00e0 => ClearScreen,
            0x00ee => Return,
            _ => Unknown(opcode),
        },
        0x1 => Jump { addr: nnn },
        0x2 => Call { addr: nnn },
        0x3 => SkipIfEqualImm { x, value: nn },
        0x4 => SkipIfNotEqualImm { x, value: nn },
        0x5 if n == 0 => SkipIfEqualReg { x, y },
        0x6 => LoadImm { x, value: nn },
        0x7 => AddImm { x, value: nn },
        0x8 => match n {
            0x0 => Move { x, y },
            0x1 => Or { x, y },
            0x2 => And { x, y },
            0x3 => Xor { x, y },
            0x4 => AddReg { x, y },
            0x5 => SubReg { x, y },
            0x6 => ShiftRight { x },
            0x7 => SubReverse { x, y },
            0xe => ShiftLeft { x },
            _ => Unknown(opcode),
        },
        0x9 if n == 0 => SkipIfNotEqualReg { x, y },
        0xa => LoadIndex { addr: nnn },
        0xb => JumpOffset { addr: nnn },
        0xc => Random { x, mask: nn },
        0xd => Draw { x, y, rows: n },
        0xe => match nn {
            0x9e => SkipIfKeyDown { x },
            0xa1 => SkipIfKeyUp { x },
            _ => Unknown(opcode),
        },
        0xf => match nn {
            0x07 => LoadDelay { x },
            0x0a => WaitKey { x },
            0x15 => SetDelay { x },
            0x18 => SetSound { x },
            0x1e => AddIndex { x },
            0x29 => LoadGlyph { x },
            0x33 => StoreBcd { x },
            0x55 => StoreRegisters { x },
            0x65 => LoadRegisters { x },
            _ => Unknown(opcode),
        },
        _ => Unknown(opcode),
    }
}
