//! Runtime error types
//!
//! Every fault raised during execution carries enough context to render a
//! single-line message; the VM wraps faults with the current pc in a
//! [`VmException`]. Execution never continues past a raised exception.

use cairn_disassembler::DisassemblerError;
use cairn_spec::{Felt, MathError, MaybeRelocatable, ProgramError, Relocatable};
use thiserror::Error;

/// Faults of the write-once memory and its validation rules
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(
        "Inconsistent write to {addr}: cell already holds {existing}, refusing to write {attempted}"
    )]
    InconsistentWrite {
        addr: Relocatable,
        existing: MaybeRelocatable,
        attempted: MaybeRelocatable,
    },

    #[error("Write to unallocated segment {0}")]
    UnallocatedSegment(usize),

    #[error("Unknown value at memory cell {0}")]
    UnknownMemoryCell(Relocatable),

    #[error("Range check at {addr}: value {value} is out of bounds [0, 2^{bound_bits})")]
    RangeCheckOutOfBounds {
        addr: Relocatable,
        value: Felt,
        bound_bits: u32,
    },

    #[error("Range check at {addr}: expected an integer, found a relocatable value")]
    RangeCheckNotInt { addr: Relocatable },

    #[error("Bitwise input at {addr} exceeds {bits} bits")]
    BitwiseInputTooLarge { addr: Relocatable, bits: u32 },

    #[error("Keccak input at {addr} exceeds 200 bits")]
    KeccakInputTooLarge { addr: Relocatable },

    #[error("Point ({x}, {y}) is not on the curve")]
    PointNotOnCurve { x: Felt, y: Felt },

    #[error("No signature registered for address {0}")]
    MissingSignature(Relocatable),

    #[error("Signature verification failed at {0}")]
    InvalidSignature(Relocatable),

    #[error("Effective segment sizes have not been computed")]
    EffectiveSizesNotComputed,

    #[error("Segment {0} has no used-size entry")]
    MissingSegmentUsedSize(usize),

    #[error("No relocation offset assigned for segment {0}")]
    NoRelocationFound(usize),

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Faults raised by hint execution, scoped to the owning pc
#[derive(Debug, Error)]
pub enum HintError {
    #[error("Unknown hint: '{0}'")]
    UnknownHint(String),

    #[error("Hint references unknown identifier 'ids.{0}'")]
    MissingIdsVariable(String),

    #[error("Hint identifier 'ids.{0}' is not addressable")]
    IdsNotAddressable(String),

    #[error("No dict tracker for segment {0}")]
    NoDictTracker(usize),

    #[error("Dict pointer mismatch: tracker is at {expected}, hint passed {found}")]
    DictPtrMismatch {
        expected: Relocatable,
        found: Relocatable,
    },

    #[error("Dict key {0} not found and the dict has no default value")]
    DictKeyNotFound(Felt),

    #[error("Dict update mismatch for key {key}: expected previous value {expected}, found {found}")]
    DictUpdateMismatch {
        key: Felt,
        expected: Felt,
        found: Felt,
    },

    #[error("Hints may not modify pc, ap, or fp")]
    RegistersModified,

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Faults of the fetch-decode-execute loop
#[derive(Debug, Error)]
pub enum VirtualMachineError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("{0}")]
    Decode(#[from] DisassemblerError),

    #[error("Assertion failed: {dst} != {res}")]
    DiffAssertValues {
        dst: MaybeRelocatable,
        res: MaybeRelocatable,
    },

    #[error("Call return-pc cell holds {existing}, expected {expected}")]
    CantWriteReturnPc {
        existing: MaybeRelocatable,
        expected: MaybeRelocatable,
    },

    #[error("An assertion needs a computable result operand")]
    UnconstrainedResAssert,

    #[error("Jump to a non-relocatable target {0}")]
    JumpToInt(Felt),

    #[error("Return pc is not a relocatable value")]
    RetPcNotRelocatable,

    #[error("Step limit exceeded: {0}")]
    StepLimitExceeded(u64),

    #[error(transparent)]
    Hint(#[from] HintError),
}

/// A VM fault annotated with the pc it was raised at
#[derive(Debug, Error)]
#[error("Error at pc={pc}: {inner}")]
pub struct VmException {
    pub pc: Relocatable,
    pub inner: VirtualMachineError,
}

/// Faults of run orchestration: initialization, end conditions, relocation
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Program has no main entry point")]
    MissingMain,

    #[error("Builtin '{0}' is declared by the program but not configured")]
    MissingBuiltin(String),

    #[error("The runner has not been initialized")]
    NotInitialized,

    #[error("Trace relocation requires a computed segment table")]
    TraceNotRelocatable,

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Vm(#[from] Box<VmException>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
