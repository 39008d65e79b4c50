//! Disassembler errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DisassemblerError {
    #[error("Unsupported instruction: word {0} exceeds the 63-bit encoding")]
    WordTooLarge(String),

    #[error("Unsupported instruction: flag combination {flags:#017b} in word {word:#x}")]
    UnsupportedFlagCombination { word: u64, flags: u64 },

    #[error("Instruction at word {index} expects an immediate operand but the stream ends")]
    MissingImmediate { index: usize },

    #[error("Data word {index} is a relocatable value, not an encoded instruction")]
    RelocatableInCode { index: usize },

    #[error("Instruction has no canonical source rendering")]
    NotRepresentable,
}

pub type Result<T> = std::result::Result<T, DisassemblerError>;
