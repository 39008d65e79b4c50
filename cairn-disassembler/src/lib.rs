//! # Cairn disassembler
//!
//! Decode Cairn bytecode back into structured instructions and canonical
//! source statements.
//!
//! ## Example
//!
//! ```rust
//! use cairn_spec::{Program, ScopedName};
//! use cairn_disassembler::disassemble;
//!
//! let program = Program::new(ScopedName::from_string("__main__").unwrap());
//! let listing = disassemble(&program).unwrap();
//! assert!(listing.is_empty());
//! ```

pub mod decoder;
pub mod error;
pub mod formatter;

pub use decoder::{decode, decode_stream};
pub use error::{DisassemblerError, Result};
pub use formatter::format;

use cairn_spec::{Felt, MaybeRelocatable, Program};

/// Disassemble a program's data words into one statement per line
pub fn disassemble(program: &Program) -> Result<String> {
    let words = code_words(program)?;
    let instructions = decode_stream(&words)?;
    let mut out = String::new();
    for instruction in &instructions {
        out.push_str(&format(instruction)?);
        out.push('\n');
    }
    Ok(out)
}

/// Extract the felt words of a program's data section
pub fn code_words(program: &Program) -> Result<Vec<Felt>> {
    program
        .data
        .iter()
        .enumerate()
        .map(|(index, word)| match word {
            MaybeRelocatable::Int(value) => Ok(value.clone()),
            MaybeRelocatable::RelocatableValue(_) => {
                Err(DisassemblerError::RelocatableInCode { index })
            }
        })
        .collect()
}
