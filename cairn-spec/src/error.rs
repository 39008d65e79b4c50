//! Error types shared by the core value model

use crate::field::Felt;
use crate::relocatable::Relocatable;
use thiserror::Error;

/// Arithmetic errors over relocatable and field values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    #[error("Cannot add two relocatable values: {0} + {1}")]
    RelocatableAdd(Relocatable, Relocatable),

    #[error("Cannot subtract {1} from {0}: different segments")]
    RelocatableSubDiffSegment(Relocatable, Relocatable),

    #[error("Cannot subtract {1} from {0}: offset underflow")]
    RelocatableSubUnderflow(Relocatable, Relocatable),

    #[error("Relocatable values cannot be multiplied")]
    RelocatableMul,

    #[error("Operation would push offset of {0} past the address space: {1}")]
    OffsetExceeded(Relocatable, Felt),

    #[error("Division by zero")]
    DividedByZero,

    #[error("Expected an integer value, got {0}")]
    ExpectedInteger(Relocatable),

    #[error("Expected a relocatable value, got {0}")]
    ExpectedRelocatable(Felt),
}

/// Program container validation errors
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Program prime mismatch: expected {expected}, found {found}")]
    PrimeMismatch { expected: String, found: String },

    #[error("Entry point '{0}' not found in identifier table")]
    MissingEntryPoint(String),

    #[error("Identifier '{0}' is not a label")]
    EntryPointNotLabel(String),

    #[error("Malformed program file: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
