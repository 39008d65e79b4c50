//! Bitwise builtin
//!
//! Five cells per slot: inputs x and y, then the derived x&y, x|y, x^y.
//! Inputs must fit 251 bits. Outputs are computed lazily once both inputs of
//! the slot are present.

use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};
use num_bigint::BigUint;
use num_traits::One;

pub const CELLS_PER_INSTANCE: usize = 5;
pub const INPUT_CELLS: usize = 2;

/// Bit width bound on the inputs
pub const TOTAL_N_BITS: u32 = 251;

#[derive(Debug, Default)]
pub struct BitwiseBuiltinRunner {
    pub base: Option<Relocatable>,
}

impl BitwiseBuiltinRunner {
    pub fn new() -> Self {
        Self::default()
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
        let x_addr = slot;
        let y_addr = slot.add_usize(1)?;
        let (Some(x), Some(y)) = (memory.get(&x_addr), memory.get(&y_addr)) else {
            return Ok(None);
        };
        let bound = BigUint::one() << TOTAL_N_BITS;
        let x = x.get_int()?;
        let y = y.get_int()?;
        if x.to_biguint() >= &bound {
            return Err(MemoryError::BitwiseInputTooLarge {
                addr: x_addr,
                bits: TOTAL_N_BITS,
            });
        }
        if y.to_biguint() >= &bound {
            return Err(MemoryError::BitwiseInputTooLarge {
                addr: y_addr,
                bits: TOTAL_N_BITS,
            });
        }
        let result = match index {
            2 => x.to_biguint() & y.to_biguint(),
            3 => x.to_biguint() | y.to_biguint(),
            4 => x.to_biguint() ^ y.to_biguint(),
            _ => unreachable!("index is bounded by the cell count"),
        };
        Ok(Some(MaybeRelocatable::Int(Felt::new(result))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::MemorySegmentManager;

    fn setup(x: u64, y: u64) -> (BitwiseBuiltinRunner, MemorySegmentManager) {
        let mut segments = MemorySegmentManager::new();
        let mut runner = BitwiseBuiltinRunner::new();
        runner.base = Some(segments.add());
        let base = runner.base.unwrap();
        segments
            .memory
            .insert(base, MaybeRelocatable::from(Felt::from(x)))
            .unwrap();
        segments
            .memory
            .insert(
                base.add_usize(1).unwrap(),
                MaybeRelocatable::from(Felt::from(y)),
            )
            .unwrap();
        (runner, segments)
    }

    #[test]
    fn test_and_or_xor_outputs() {
        let (runner, segments) = setup(0b1100, 0b1010);
        let base = runner.base.unwrap();
        let expect = |offset: usize, value: u64| {
            let addr = base.add_usize(offset).unwrap();
            assert_eq!(
                runner.deduce_memory_cell(addr, &segments.memory).unwrap(),
                Some(MaybeRelocatable::from(Felt::from(value)))
            );
        };
        expect(2, 0b1000);
        expect(3, 0b1110);
        expect(4, 0b0110);
    }

    #[test]
    fn test_input_too_large() {
        let mut segments = MemorySegmentManager::new();
        let mut runner = BitwiseBuiltinRunner::new();
        runner.base = Some(segments.add());
        let base = runner.base.unwrap();
        let too_big = Felt::new(BigUint::one() << TOTAL_N_BITS);
        segments
            .memory
            .insert(base, MaybeRelocatable::from(too_big))
            .unwrap();
        segments
            .memory
            .insert(base.add_usize(1).unwrap(), MaybeRelocatable::from(Felt::one()))
            .unwrap();
        let err = runner
            .deduce_memory_cell(base.add_usize(2).unwrap(), &segments.memory)
            .unwrap_err();
        assert!(matches!(err, MemoryError::BitwiseInputTooLarge { .. }));
    }

    #[test]
    fn test_second_slot_uses_its_own_inputs() {
        let (runner, mut segments) = setup(1, 2);
        let base = runner.base.unwrap();
        segments
            .memory
            .insert(base.add_usize(5).unwrap(), MaybeRelocatable::from(Felt::from(7u64)))
            .unwrap();
        segments
            .memory
            .insert(base.add_usize(6).unwrap(), MaybeRelocatable::from(Felt::from(1u64)))
            .unwrap();
        let addr = base.add_usize(7).unwrap();
        assert_eq!(
            runner.deduce_memory_cell(addr, &segments.memory).unwrap(),
            Some(MaybeRelocatable::from(Felt::from(1u64)))
        );
    }
}
