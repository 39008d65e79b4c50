//! Builtin co-processors
//!
//! Each builtin is a stateful co-processor with a reserved memory segment and
//! a fixed number of cells per invocation slot. Range-check and signature
//! builtins validate cells as they are written; the hash-style builtins
//! (pedersen, bitwise, ec-op, keccak, poseidon) lazily derive their output
//! cells when the output is first read with all inputs present.

pub mod bitwise;
pub mod ec_op;
pub mod keccak;
pub mod pedersen;
pub mod poseidon;
pub mod range_check;
pub mod signature;

use crate::crypto::HashCapabilities;
use crate::error::MemoryError;
use crate::memory::Memory;
use crate::segments::MemorySegmentManager;
use cairn_spec::{BuiltinName, Felt, MaybeRelocatable, Relocatable};

pub use bitwise::BitwiseBuiltinRunner;
pub use ec_op::EcOpBuiltinRunner;
pub use keccak::KeccakBuiltinRunner;
pub use pedersen::PedersenBuiltinRunner;
pub use poseidon::PoseidonBuiltinRunner;
pub use range_check::RangeCheckBuiltinRunner;
pub use signature::SignatureBuiltinRunner;

/// The output builtin: a plain public-output segment with one cell per
/// value and no validation or derivation rules.
#[derive(Debug, Default)]
pub struct OutputBuiltinRunner {
    pub base: Option<Relocatable>,
}

/// A configured builtin co-processor
#[derive(Debug)]
pub enum BuiltinRunner {
    Output(OutputBuiltinRunner),
    Pedersen(PedersenBuiltinRunner),
    RangeCheck(RangeCheckBuiltinRunner),
    Signature(SignatureBuiltinRunner),
    Bitwise(BitwiseBuiltinRunner),
    EcOp(EcOpBuiltinRunner),
    Keccak(KeccakBuiltinRunner),
    Poseidon(PoseidonBuiltinRunner),
}

impl BuiltinRunner {
    /// Instantiate the runner for a declared builtin, wiring in the injected
    /// crypto capabilities.
    pub fn for_name(name: BuiltinName, crypto: &HashCapabilities) -> Self {
        match name {
            BuiltinName::Output => BuiltinRunner::Output(OutputBuiltinRunner::default()),
            BuiltinName::Pedersen => {
                BuiltinRunner::Pedersen(PedersenBuiltinRunner::new(crypto.two_to_one))
            }
            BuiltinName::RangeCheck => {
                BuiltinRunner::RangeCheck(RangeCheckBuiltinRunner::new())
            }
            BuiltinName::Ecdsa => {
                BuiltinRunner::Signature(SignatureBuiltinRunner::new(crypto.verify_signature))
            }
            BuiltinName::Bitwise => BuiltinRunner::Bitwise(BitwiseBuiltinRunner::new()),
            BuiltinName::EcOp => BuiltinRunner::EcOp(EcOpBuiltinRunner::new()),
            BuiltinName::Keccak => BuiltinRunner::Keccak(KeccakBuiltinRunner::new()),
            BuiltinName::Poseidon => {
                BuiltinRunner::Poseidon(PoseidonBuiltinRunner::new(crypto.permutation))
            }
        }
    }

    pub fn name(&self) -> BuiltinName {
        match self {
            BuiltinRunner::Output(_) => BuiltinName::Output,
            BuiltinRunner::Pedersen(_) => BuiltinName::Pedersen,
            BuiltinRunner::RangeCheck(_) => BuiltinName::RangeCheck,
            BuiltinRunner::Signature(_) => BuiltinName::Ecdsa,
            BuiltinRunner::Bitwise(_) => BuiltinName::Bitwise,
            BuiltinRunner::EcOp(_) => BuiltinName::EcOp,
            BuiltinRunner::Keccak(_) => BuiltinName::Keccak,
            BuiltinRunner::Poseidon(_) => BuiltinName::Poseidon,
        }
    }

    /// Memory cells per invocation slot
    pub fn cells_per_instance(&self) -> usize {
        match self {
            BuiltinRunner::Output(_) => 1,
            BuiltinRunner::Pedersen(_) => pedersen::CELLS_PER_INSTANCE,
            BuiltinRunner::RangeCheck(_) => range_check::CELLS_PER_INSTANCE,
            BuiltinRunner::Signature(_) => signature::CELLS_PER_INSTANCE,
            BuiltinRunner::Bitwise(_) => bitwise::CELLS_PER_INSTANCE,
            BuiltinRunner::EcOp(_) => ec_op::CELLS_PER_INSTANCE,
            BuiltinRunner::Keccak(_) => keccak::CELLS_PER_INSTANCE,
            BuiltinRunner::Poseidon(_) => poseidon::CELLS_PER_INSTANCE,
        }
    }

    /// Input cells per slot; the rest are derived outputs
    fn input_cells_per_instance(&self) -> usize {
        match self {
            BuiltinRunner::Pedersen(_) => pedersen::INPUT_CELLS,
            BuiltinRunner::Bitwise(_) => bitwise::INPUT_CELLS,
            BuiltinRunner::EcOp(_) => ec_op::INPUT_CELLS,
            BuiltinRunner::Keccak(_) => keccak::INPUT_CELLS,
            BuiltinRunner::Poseidon(_) => poseidon::INPUT_CELLS,
            other => other.cells_per_instance(),
        }
    }

    pub fn base(&self) -> Option<Relocatable> {
        match self {
            BuiltinRunner::Output(r) => r.base,
            BuiltinRunner::Pedersen(r) => r.base,
            BuiltinRunner::RangeCheck(r) => r.base,
            BuiltinRunner::Signature(r) => r.base,
            BuiltinRunner::Bitwise(r) => r.base,
            BuiltinRunner::EcOp(r) => r.base,
            BuiltinRunner::Keccak(r) => r.base,
            BuiltinRunner::Poseidon(r) => r.base,
        }
    }

    /// Reserve this builtin's segment
    pub fn initialize_segments(&mut self, segments: &mut MemorySegmentManager) {
        let base = segments.add();
        match self {
            BuiltinRunner::Output(r) => r.base = Some(base),
            BuiltinRunner::Pedersen(r) => r.base = Some(base),
            BuiltinRunner::RangeCheck(r) => r.base = Some(base),
            BuiltinRunner::Signature(r) => r.base = Some(base),
            BuiltinRunner::Bitwise(r) => r.base = Some(base),
            BuiltinRunner::EcOp(r) => r.base = Some(base),
            BuiltinRunner::Keccak(r) => r.base = Some(base),
            BuiltinRunner::Poseidon(r) => r.base = Some(base),
        }
    }

    /// The pointer pushed onto the program's initial stack
    pub fn initial_stack(&self) -> Vec<MaybeRelocatable> {
        self.base()
            .map(MaybeRelocatable::from)
            .into_iter()
            .collect()
    }

    /// Install write-time validation rules (range-check, signature)
    pub fn add_validation_rules(&self, memory: &mut Memory) -> Result<(), MemoryError> {
        match self {
            BuiltinRunner::RangeCheck(r) => r.add_validation_rule(memory),
            BuiltinRunner::Signature(r) => r.add_validation_rule(memory),
            _ => Ok(()),
        }
    }

    /// Derive the value of an unset cell in this builtin's segment, if the
    /// slot's inputs are available.
    pub fn deduce_memory_cell(
        &self,
        addr: Relocatable,
        memory: &Memory,
    ) -> Result<Option<MaybeRelocatable>, MemoryError> {
        match self {
            BuiltinRunner::Pedersen(r) => r.deduce_memory_cell(addr, memory),
            BuiltinRunner::Bitwise(r) => r.deduce_memory_cell(addr, memory),
            BuiltinRunner::EcOp(r) => r.deduce_memory_cell(addr, memory),
            BuiltinRunner::Keccak(r) => r.deduce_memory_cell(addr, memory),
            BuiltinRunner::Poseidon(r) => r.deduce_memory_cell(addr, memory),
            _ => Ok(None),
        }
    }

    /// Number of cells written in this builtin's segment
    pub fn get_used_cells(&self, segments: &MemorySegmentManager) -> Result<usize, MemoryError> {
        let base = self
            .base()
            .ok_or(MemoryError::EffectiveSizesNotComputed)?;
        segments
            .get_segment_used_size(base.segment_index)
            .ok_or(MemoryError::MissingSegmentUsedSize(base.segment_index))
    }

    /// Number of complete or partial invocation slots used
    pub fn get_used_instances(
        &self,
        segments: &MemorySegmentManager,
    ) -> Result<usize, MemoryError> {
        let used = self.get_used_cells(segments)?;
        let cells = self.cells_per_instance();
        Ok(used.div_ceil(cells))
    }

    /// Compute the final segment size: round the used cells up to whole
    /// slots, backfill unset input cells with the canonical filler value,
    /// and derive any deferred output cells.
    pub fn finalize_segments(
        &self,
        segments: &mut MemorySegmentManager,
    ) -> Result<(), MemoryError> {
        let base = match self.base() {
            Some(base) => base,
            None => return Ok(()),
        };
        let used = segments
            .memory
            .segment_used_size(base.segment_index)
            .unwrap_or(0);
        if used == 0 {
            return Ok(());
        }
        let cells = self.cells_per_instance();
        let inputs = self.input_cells_per_instance();
        let instances = used.div_ceil(cells);
        for slot in 0..instances {
            let slot_base = base.add_usize(slot * cells)?;
            for cell in 0..inputs {
                let addr = slot_base.add_usize(cell)?;
                if segments.memory.get(&addr).is_none() {
                    segments
                        .memory
                        .insert(addr, MaybeRelocatable::Int(Felt::zero()))?;
                }
            }
            for cell in inputs..cells {
                let addr = slot_base.add_usize(cell)?;
                if segments.memory.get(&addr).is_none() {
                    if let Some(value) = self.deduce_memory_cell(addr, &segments.memory)? {
                        segments.memory.insert(addr, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}
