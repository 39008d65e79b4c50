//! Segment management and relocation
//!
//! Segments are allocated monotonically during a run and assigned flat base
//! offsets only after execution completes: segments are laid out
//! consecutively in allocation order, with flat address 0 reserved.

use crate::error::MemoryError;
use crate::memory::Memory;
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};
use std::collections::BTreeMap;

/// First flat address of the relocated address space
pub const RELOCATION_BASE: usize = 1;

#[derive(Debug, Default)]
pub struct MemorySegmentManager {
    pub memory: Memory,
    segment_used_sizes: Option<Vec<usize>>,
}

impl MemorySegmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh segment with an independent offset space
    pub fn add(&mut self) -> Relocatable {
        self.memory.add_segment()
    }

    pub fn num_segments(&self) -> usize {
        self.memory.num_segments()
    }

    /// Write a slice of values starting at `addr`, returning the address one
    /// past the written data.
    pub fn load_data(
        &mut self,
        addr: Relocatable,
        data: &[MaybeRelocatable],
    ) -> Result<Relocatable, MemoryError> {
        for (i, value) in data.iter().enumerate() {
            self.memory
                .insert(addr.add_usize(i)?, value.clone())?;
        }
        addr.add_usize(data.len()).map_err(MemoryError::from)
    }

    /// Record the final size of every segment
    pub fn compute_effective_sizes(&mut self) -> &Vec<usize> {
        let sizes = (0..self.memory.num_segments())
            .map(|i| self.memory.segment_used_size(i).unwrap_or(0))
            .collect();
        self.segment_used_sizes = Some(sizes);
        self.segment_used_sizes.as_ref().unwrap()
    }

    pub fn get_segment_used_size(&self, segment_index: usize) -> Option<usize> {
        self.segment_used_sizes
            .as_ref()?
            .get(segment_index)
            .copied()
    }

    /// Assign a flat base offset to every segment, consecutively in
    /// allocation order.
    pub fn relocate_segments(&self) -> Result<Vec<usize>, MemoryError> {
        let sizes = self
            .segment_used_sizes
            .as_ref()
            .ok_or(MemoryError::EffectiveSizesNotComputed)?;
        let mut table = Vec::with_capacity(sizes.len());
        let mut base = RELOCATION_BASE;
        for size in sizes {
            table.push(base);
            base += size;
        }
        Ok(table)
    }

    /// Produce the flat address -> value view of the whole memory
    pub fn relocate_memory(
        &self,
        table: &[usize],
    ) -> Result<BTreeMap<usize, Felt>, MemoryError> {
        let mut out = BTreeMap::new();
        for segment_index in 0..self.memory.num_segments() {
            for (offset, value) in self.memory.segment_cells(segment_index) {
                let addr = Relocatable::new(segment_index, offset);
                let flat = relocate_address(&addr, table)?;
                let value = match relocate_value(value, table, false)? {
                    MaybeRelocatable::Int(v) => v,
                    MaybeRelocatable::RelocatableValue(_) => unreachable!(
                        "strict relocation never returns a relocatable"
                    ),
                };
                out.insert(flat, value);
            }
        }
        Ok(out)
    }
}

/// Flat address of a relocatable address
pub fn relocate_address(addr: &Relocatable, table: &[usize]) -> Result<usize, MemoryError> {
    let base = table
        .get(addr.segment_index)
        .ok_or(MemoryError::NoRelocationFound(addr.segment_index))?;
    Ok(base + addr.offset)
}

/// Map a value to its flat form: plain integers pass through, relocatables
/// become `table[segment] + offset`. A missing segment is an error unless
/// `allow_missing` is set (the relaxed mode used for partial runs), in which
/// case the value is returned unrelocated.
pub fn relocate_value(
    value: &MaybeRelocatable,
    table: &[usize],
    allow_missing: bool,
) -> Result<MaybeRelocatable, MemoryError> {
    match value {
        MaybeRelocatable::Int(v) => Ok(MaybeRelocatable::Int(v.clone())),
        MaybeRelocatable::RelocatableValue(addr) => match table.get(addr.segment_index) {
            Some(base) => Ok(MaybeRelocatable::Int(Felt::from(base + addr.offset))),
            None if allow_missing => Ok(value.clone()),
            None => Err(MemoryError::NoRelocationFound(addr.segment_index)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: u64) -> MaybeRelocatable {
        MaybeRelocatable::from(Felt::from(v))
    }

    #[test]
    fn test_segments_allocated_monotonically() {
        let mut segments = MemorySegmentManager::new();
        let a = segments.add();
        let b = segments.add();
        assert_eq!(a, Relocatable::new(0, 0));
        assert_eq!(b, Relocatable::new(1, 0));
        assert_eq!(segments.num_segments(), 2);
    }

    #[test]
    fn test_load_data_returns_end() {
        let mut segments = MemorySegmentManager::new();
        let base = segments.add();
        let end = segments.load_data(base, &[int(1), int(2), int(3)]).unwrap();
        assert_eq!(end, Relocatable::new(0, 3));
        assert_eq!(segments.memory.get(&Relocatable::new(0, 1)), Some(&int(2)));
    }

    #[test]
    fn test_relocation_layout_is_consecutive() {
        let mut segments = MemorySegmentManager::new();
        let a = segments.add();
        let b = segments.add();
        segments.load_data(a, &[int(10), int(11)]).unwrap();
        segments.load_data(b, &[int(20)]).unwrap();
        segments.compute_effective_sizes();
        let table = segments.relocate_segments().unwrap();
        assert_eq!(table, vec![1, 3]);

        let memory = segments.relocate_memory(&table).unwrap();
        assert_eq!(memory.get(&1), Some(&Felt::from(10u64)));
        assert_eq!(memory.get(&2), Some(&Felt::from(11u64)));
        assert_eq!(memory.get(&3), Some(&Felt::from(20u64)));
    }

    #[test]
    fn test_relocate_value_modes() {
        let table = vec![1, 5];
        let addr = MaybeRelocatable::from(Relocatable::new(1, 2));
        assert_eq!(
            relocate_value(&addr, &table, false).unwrap(),
            MaybeRelocatable::Int(Felt::from(7u64))
        );
        let missing = MaybeRelocatable::from(Relocatable::new(9, 0));
        assert!(matches!(
            relocate_value(&missing, &table, false),
            Err(MemoryError::NoRelocationFound(9))
        ));
        // Relaxed mode tolerates the missing segment
        assert_eq!(relocate_value(&missing, &table, true).unwrap(), missing);
        // Integers pass through unchanged
        assert_eq!(relocate_value(&int(4), &table, false).unwrap(), int(4));
    }

    #[test]
    fn test_relocation_requires_effective_sizes() {
        let segments = MemorySegmentManager::new();
        assert!(matches!(
            segments.relocate_segments(),
            Err(MemoryError::EffectiveSizesNotComputed)
        ));
    }

    #[test]
    fn test_pointer_values_relocate_into_flat_space() {
        let mut segments = MemorySegmentManager::new();
        let a = segments.add();
        let b = segments.add();
        segments
            .load_data(a, &[MaybeRelocatable::from(b)])
            .unwrap();
        segments.load_data(b, &[int(42)]).unwrap();
        segments.compute_effective_sizes();
        let table = segments.relocate_segments().unwrap();
        let memory = segments.relocate_memory(&table).unwrap();
        // The pointer at flat 1 targets segment 1's base, flat 2
        assert_eq!(memory.get(&1), Some(&Felt::from(2u64)));
        assert_eq!(memory.get(&2), Some(&Felt::from(42u64)));
    }
}
