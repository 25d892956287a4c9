use thiserror::Error;

/// Everything that can stop the interpreter. All of these are fatal to the
/// cycle that raised them; the host decides whether to reset or give up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Chip8Error {
    #[error("memory access out of bounds at address {address:#06X}")]
    OutOfBounds { address: usize },

    #[error("stack overflow: more than 16 nested subroutine calls")]
    StackOverflow,

    #[error("stack underflow: return with an empty call stack")]
    StackUnderflow,

    #[error("program is too large ({size} bytes), max size is {max} bytes")]
    ProgramTooLarge { size: usize, max: usize },

    #[error("unknown instruction encoding {opcode:#06X}")]
    UnknownEncoding { opcode: u16 },

    #[error("key {key:#04X} is outside the hex keypad")]
    InvalidKey { key: u8 },
}

pub type Chip8Result<T = ()> = Result<T, Chip8Error>;
