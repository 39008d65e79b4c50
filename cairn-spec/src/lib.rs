//! # Cairn core specification
//!
//! Core value model shared by the compiler, disassembler, and runtime:
//!
//! - 252-bit field elements (p = 2^251 + 17 * 2^192 + 1)
//! - scoped dotted names
//! - relocatable (segment, offset) values and the memory value union
//! - the structured instruction representation and its 63-bit encoding layout
//! - the compiled program container and its JSON document form

pub mod encoding;
pub mod error;
pub mod field;
pub mod instruction;
pub mod program;
pub mod relocatable;
pub mod scope;

pub use error::{MathError, ProgramError};
pub use field::{Felt, PRIME, PRIME_HEX};
pub use instruction::{
    ApUpdate, FpUpdate, Instruction, Op1Addr, Opcode, PcUpdate, Register, Res,
};
pub use program::{
    ApTracking, BuiltinName, DebugInfo, FlowTrackingData, HintParams, HintReference,
    IdentifierDefinition, InstructionLocation, Location, MemberDefinition, Program, ReferenceData,
};
pub use relocatable::{MaybeRelocatable, Relocatable};
pub use scope::{ScopedName, SCOPE_SEPARATOR};
