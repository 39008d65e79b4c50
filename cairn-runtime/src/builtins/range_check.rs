//! Range-check builtin
//!
//! One cell per invocation slot. Every written cell must hold an integer in
//! `[0, 2^(16 * N_PARTS))`; the check runs at write time through a memory
//! validation rule.

use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{Felt, Relocatable};
use num_bigint::BigUint;
use num_traits::One;

pub const CELLS_PER_INSTANCE: usize = 1;

/// Number of 16-bit parts of the checked range
pub const N_PARTS: u32 = 8;

#[derive(Debug)]
pub struct RangeCheckBuiltinRunner {
    pub base: Option<Relocatable>,
    n_parts: u32,
}

impl RangeCheckBuiltinRunner {
    pub fn new() -> Self {
        Self::with_parts(N_PARTS)
    }

    pub fn with_parts(n_parts: u32) -> Self {
        RangeCheckBuiltinRunner {
            base: None,
            n_parts,
        }
    }

    pub fn bound_bits(&self) -> u32 {
        16 * self.n_parts
    }

    pub fn bound(&self) -> BigUint {
        BigUint::one() << self.bound_bits()
    }

    pub fn add_validation_rule(&self, memory: &mut Memory) -> Result<(), MemoryError> {
        let base = self.base.ok_or(MemoryError::EffectiveSizesNotComputed)?;
        let bound = self.bound();
        let bound_bits = self.bound_bits();
        memory.add_validation_rule(
            base.segment_index,
            Box::new(move |memory, addr| {
                let value = match memory.get(&addr) {
                    Some(cairn_spec::MaybeRelocatable::Int(v)) => v,
                    Some(_) => return Err(MemoryError::RangeCheckNotInt { addr }),
                    None => return Ok(()),
                };
                if value.to_biguint() >= &bound {
                    return Err(MemoryError::RangeCheckOutOfBounds {
                        addr,
                        value: value.clone(),
                        bound_bits,
                    });
                }
                Ok(())
            }),
        )
    }
}

impl Default for RangeCheckBuiltinRunner {
    fn default() -> Self {
        Self::new()
    }
}
