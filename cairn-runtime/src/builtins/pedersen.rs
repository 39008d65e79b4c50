//! Pedersen hash builtin
//!
//! Three cells per slot: two inputs and one output. The output cell is
//! derived lazily, once both inputs of the slot are present.

use crate::crypto::TwoToOneHash;
use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{MaybeRelocatable, Relocatable};

pub const CELLS_PER_INSTANCE: usize = 3;
pub const INPUT_CELLS: usize = 2;

pub struct PedersenBuiltinRunner {
    pub base: Option<Relocatable>,
    hash: TwoToOneHash,
}

impl std::fmt::Debug for PedersenBuiltinRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PedersenBuiltinRunner")
            .field("base", &self.base)
            .finish()
    }
}

impl PedersenBuiltinRunner {
    pub fn new(hash: TwoToOneHash) -> Self {
        PedersenBuiltinRunner { base: None, hash }
    }

    pub fn deduce_memory_cell(
        &self,
        addr: Relocatable,
        memory: &Memory,
    ) -> Result<Option<MaybeRelocatable>, MemoryError> {
        if addr.offset % CELLS_PER_INSTANCE != INPUT_CELLS {
            return Ok(None);
        }
        let x_addr = addr.sub_usize(2)?;
        let y_addr = addr.sub_usize(1)?;
        let (Some(x), Some(y)) = (memory.get(&x_addr), memory.get(&y_addr)) else {
            // Inputs not yet written; the output stays deferred
            return Ok(None);
        };
        let x = x.get_int()?;
        let y = y.get_int()?;
        Ok(Some(MaybeRelocatable::Int((self.hash)(x, y))))
    }
}
