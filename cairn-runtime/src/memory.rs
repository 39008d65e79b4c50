//! Write-once segmented memory
//!
//! A mapping from (segment, offset) addresses to values. Writing a different
//! value to an already-set address is an error; rewriting the equal value is
//! a no-op success. Segments carry optional validation rules applied to
//! every cell write (builtin co-processors install these).

use crate::error::MemoryError;
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};
use std::collections::HashMap;
use std::fmt;

/// A per-segment check applied to each written cell
pub type ValidationRule = Box<dyn Fn(&Memory, Relocatable) -> Result<(), MemoryError>>;

#[derive(Default)]
pub struct Memory {
    data: Vec<Vec<Option<MaybeRelocatable>>>,
    validation_rules: HashMap<usize, ValidationRule>,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("segments", &self.data.len())
            .field("validated_segments", &self.validation_rules.len())
            .finish()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated segments
    pub fn num_segments(&self) -> usize {
        self.data.len()
    }

    /// Allocate a fresh segment; indices are never reused within one run
    pub(crate) fn add_segment(&mut self) -> Relocatable {
        self.data.push(Vec::new());
        Relocatable::new(self.data.len() - 1, 0)
    }

    pub fn get(&self, addr: &Relocatable) -> Option<&MaybeRelocatable> {
        self.data
            .get(addr.segment_index)?
            .get(addr.offset)?
            .as_ref()
    }

    /// Read an integer cell, with typed errors for unknown or relocatable
    pub fn get_int(&self, addr: &Relocatable) -> Result<&Felt, MemoryError> {
        let value = self
            .get(addr)
            .ok_or(MemoryError::UnknownMemoryCell(*addr))?;
        Ok(value.get_int()?)
    }

    /// Read a relocatable cell
    pub fn get_relocatable(&self, addr: &Relocatable) -> Result<Relocatable, MemoryError> {
        let value = self
            .get(addr)
            .ok_or(MemoryError::UnknownMemoryCell(*addr))?;
        Ok(value.get_relocatable()?)
    }

    /// Write-once insert: equal rewrites succeed silently, conflicting
    /// writes fail naming both values.
    pub fn insert(
        &mut self,
        addr: Relocatable,
        value: MaybeRelocatable,
    ) -> Result<(), MemoryError> {
        let segment = self
            .data
            .get_mut(addr.segment_index)
            .ok_or(MemoryError::UnallocatedSegment(addr.segment_index))?;
        if segment.len() <= addr.offset {
            segment.resize(addr.offset + 1, None);
        }
        match &segment[addr.offset] {
            Some(existing) => {
                if existing != &value {
                    return Err(MemoryError::InconsistentWrite {
                        addr,
                        existing: existing.clone(),
                        attempted: value,
                    });
                }
                Ok(())
            }
            None => {
                segment[addr.offset] = Some(value);
                self.validate_cell(addr)
            }
        }
    }

    fn validate_cell(&self, addr: Relocatable) -> Result<(), MemoryError> {
        if let Some(rule) = self.validation_rules.get(&addr.segment_index) {
            rule(self, addr)?;
        }
        Ok(())
    }

    /// Install a validation rule for a segment and apply it retroactively to
    /// already-written cells.
    pub fn add_validation_rule(
        &mut self,
        segment_index: usize,
        rule: ValidationRule,
    ) -> Result<(), MemoryError> {
        self.validation_rules.insert(segment_index, rule);
        if let Some(segment) = self.data.get(segment_index) {
            let written: Vec<usize> = segment
                .iter()
                .enumerate()
                .filter_map(|(offset, cell)| cell.as_ref().map(|_| offset))
                .collect();
            for offset in written {
                self.validate_cell(Relocatable::new(segment_index, offset))?;
            }
        }
        Ok(())
    }

    /// Highest written offset + 1, per segment
    pub fn segment_used_size(&self, segment_index: usize) -> Option<usize> {
        let segment = self.data.get(segment_index)?;
        Some(
            segment
                .iter()
                .rposition(|cell| cell.is_some())
                .map(|last| last + 1)
                .unwrap_or(0),
        )
    }

    /// Iterate all written cells of one segment in offset order
    pub fn segment_cells(
        &self,
        segment_index: usize,
    ) -> impl Iterator<Item = (usize, &MaybeRelocatable)> {
        self.data
            .get(segment_index)
            .into_iter()
            .flat_map(|segment| {
                segment
                    .iter()
                    .enumerate()
                    .filter_map(|(offset, cell)| cell.as_ref().map(|v| (offset, v)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: u64) -> MaybeRelocatable {
        MaybeRelocatable::from(Felt::from(v))
    }

    #[test]
    fn test_write_once_semantics() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base, int(5)).unwrap();
        // Equal rewrite is a silent success
        memory.insert(base, int(5)).unwrap();
        // Conflicting write names both values
        let err = memory.insert(base, int(6)).unwrap_err();
        match err {
            MemoryError::InconsistentWrite {
                existing, attempted, ..
            } => {
                assert_eq!(existing, int(5));
                assert_eq!(attempted, int(6));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(memory.get(&base), Some(&int(5)));
    }

    #[test]
    fn test_unallocated_segment_rejected() {
        let mut memory = Memory::new();
        let err = memory.insert(Relocatable::new(3, 0), int(1)).unwrap_err();
        assert!(matches!(err, MemoryError::UnallocatedSegment(3)));
    }

    #[test]
    fn test_sparse_writes_and_used_size() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base.add_usize(4).unwrap(), int(9)).unwrap();
        assert_eq!(memory.get(&base), None);
        assert_eq!(memory.segment_used_size(0), Some(5));
        assert_eq!(memory.segment_used_size(1), None);
    }

    #[test]
    fn test_validation_rule_runs_on_insert() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory
            .add_validation_rule(
                0,
                Box::new(|memory, addr| {
                    let value = memory.get_int(&addr)?;
                    if value > &Felt::from(100u64) {
                        return Err(MemoryError::RangeCheckOutOfBounds {
                            addr,
                            value: value.clone(),
                            bound_bits: 7,
                        });
                    }
                    Ok(())
                }),
            )
            .unwrap();
        memory.insert(base, int(50)).unwrap();
        let err = memory
            .insert(base.add_usize(1).unwrap(), int(101))
            .unwrap_err();
        assert!(matches!(err, MemoryError::RangeCheckOutOfBounds { .. }));
    }

    #[test]
    fn test_validation_rule_retroactive() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base, int(200)).unwrap();
        let err = memory
            .add_validation_rule(
                0,
                Box::new(|memory, addr| {
                    let value = memory.get_int(&addr)?;
                    if value > &Felt::from(100u64) {
                        return Err(MemoryError::RangeCheckOutOfBounds {
                            addr,
                            value: value.clone(),
                            bound_bits: 7,
                        });
                    }
                    Ok(())
                }),
            )
            .unwrap_err();
        assert!(matches!(err, MemoryError::RangeCheckOutOfBounds { .. }));
    }

    #[test]
    fn test_typed_reads() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        let other = memory.add_segment();
        memory.insert(base, MaybeRelocatable::from(other)).unwrap();
        assert!(memory.get_relocatable(&base).is_ok());
        assert!(matches!(
            memory.get_int(&base),
            Err(MemoryError::Math(_))
        ));
        assert!(matches!(
            memory.get_int(&base.add_usize(7).unwrap()),
            Err(MemoryError::UnknownMemoryCell(_))
        ));
    }
}
