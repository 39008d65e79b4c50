//! Poseidon builtin
//!
//! Six cells per slot: a three-felt input state and the derived permuted
//! state. The permutation itself is an injected capability.

use crate::crypto::PermutationFn;
use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{MaybeRelocatable, Relocatable};

pub const CELLS_PER_INSTANCE: usize = 6;
pub const INPUT_CELLS: usize = 3;

pub struct PoseidonBuiltinRunner {
    pub base: Option<Relocatable>,
    permutation: PermutationFn,
}

impl std::fmt::Debug for PoseidonBuiltinRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseidonBuiltinRunner")
            .field("base", &self.base)
            .finish()
    }
}

impl PoseidonBuiltinRunner {
    pub fn new(permutation: PermutationFn) -> Self {
        PoseidonBuiltinRunner {
            base: None,
            permutation,
        }
    }

    pub fn deduce_memory_cell(
        &self,
        addr: Relocatable,
        memory: &Memory,
    ) -> Result<Option<MaybeRelocatable>, MemoryError> {
        let index = addr.offset % CELLS_PER_INSTANCE;
        if index < INPUT_CELLS {
            return Ok(None);
        }
        let slot = addr.sub_usize(index)?;
        let mut state = [
            cairn_spec::Felt::zero(),
            cairn_spec::Felt::zero(),
            cairn_spec::Felt::zero(),
        ];
        for (i, cell) in state.iter_mut().enumerate() {
            match memory.get(&slot.add_usize(i)?) {
                Some(value) => *cell = value.get_int()?.clone(),
                None => return Ok(None),
            }
        }
        (self.permutation)(&mut state);
        Ok(Some(MaybeRelocatable::Int(
            state[index - INPUT_CELLS].clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::default_permutation;
    use crate::segments::MemorySegmentManager;
    use cairn_spec::Felt;

    #[test]
    fn test_outputs_are_permuted_inputs() {
        let mut segments = MemorySegmentManager::new();
        let mut runner = PoseidonBuiltinRunner::new(default_permutation);
        runner.base = Some(segments.add());
        let base = runner.base.unwrap();
        for i in 0..3usize {
            segments
                .memory
                .insert(
                    base.add_usize(i).unwrap(),
                    MaybeRelocatable::from(Felt::from((i + 1) as u64)),
                )
                .unwrap();
        }
        let mut expected = [Felt::from(1u64), Felt::from(2u64), Felt::from(3u64)];
        default_permutation(&mut expected);
        for i in 0..3usize {
            let value = runner
                .deduce_memory_cell(base.add_usize(3 + i).unwrap(), &segments.memory)
                .unwrap()
                .unwrap();
            assert_eq!(value, MaybeRelocatable::Int(expected[i].clone()));
        }
    }

    #[test]
    fn test_partial_inputs_defer() {
        let mut segments = MemorySegmentManager::new();
        let mut runner = PoseidonBuiltinRunner::new(default_permutation);
        runner.base = Some(segments.add());
        let base = runner.base.unwrap();
        segments
            .memory
            .insert(base, MaybeRelocatable::from(Felt::one()))
            .unwrap();
        assert!(runner
            .deduce_memory_cell(base.add_usize(3).unwrap(), &segments.memory)
            .unwrap()
            .is_none());
    }
}
