//! Relocatable memory values
//!
//! A [`Relocatable`] is a (segment, offset) address pair. Segment indices are
//! allocated monotonically by the VM; offsets within a segment start at 0.
//! A [`MaybeRelocatable`] is the value union the memory holds: either a field
//! element or a relocatable address.
//!
//! Arithmetic rules:
//! - relocatable + integer shifts the offset
//! - relocatable - relocatable requires the same segment and yields an offset delta
//! - relocatable * anything is an error

use crate::error::MathError;
use crate::field::Felt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A segment-relative memory address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relocatable {
    pub segment_index: usize,
    pub offset: usize,
}

impl Relocatable {
    pub fn new(segment_index: usize, offset: usize) -> Self {
        Relocatable {
            segment_index,
            offset,
        }
    }

    /// Shift the offset forward
    pub fn add_usize(&self, rhs: usize) -> Result<Relocatable, MathError> {
        let offset = self
            .offset
            .checked_add(rhs)
            .ok_or_else(|| MathError::OffsetExceeded(*self, Felt::from(rhs)))?;
        Ok(Relocatable::new(self.segment_index, offset))
    }

    /// Shift the offset by a field element, which must fit the address space
    pub fn add_felt(&self, rhs: &Felt) -> Result<Relocatable, MathError> {
        let shift = rhs
            .to_usize()
            .ok_or_else(|| MathError::OffsetExceeded(*self, rhs.clone()))?;
        self.add_usize(shift)
    }

    /// Shift the offset backward
    pub fn sub_usize(&self, rhs: usize) -> Result<Relocatable, MathError> {
        let offset = self.offset.checked_sub(rhs).ok_or_else(|| {
            MathError::RelocatableSubUnderflow(*self, Relocatable::new(self.segment_index, rhs))
        })?;
        Ok(Relocatable::new(self.segment_index, offset))
    }

    /// Offset delta to another address in the same segment
    pub fn sub_rel(&self, rhs: &Relocatable) -> Result<usize, MathError> {
        if self.segment_index != rhs.segment_index {
            return Err(MathError::RelocatableSubDiffSegment(*self, *rhs));
        }
        self.offset
            .checked_sub(rhs.offset)
            .ok_or(MathError::RelocatableSubUnderflow(*self, *rhs))
    }

    /// Signed offset delta as a field element, same-segment only
    pub fn sub_rel_signed(&self, rhs: &Relocatable) -> Result<Felt, MathError> {
        if self.segment_index != rhs.segment_index {
            return Err(MathError::RelocatableSubDiffSegment(*self, *rhs));
        }
        Ok(Felt::from(self.offset) - Felt::from(rhs.offset))
    }
}

impl fmt::Display for Relocatable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_index, self.offset)
    }
}

/// The value union held by VM memory cells
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MaybeRelocatable {
    Int(Felt),
    RelocatableValue(Relocatable),
}

impl MaybeRelocatable {
    pub fn is_int(&self) -> bool {
        matches!(self, MaybeRelocatable::Int(_))
    }

    /// The integer value, or a typed error naming the relocatable found
    pub fn get_int(&self) -> Result<&Felt, MathError> {
        match self {
            MaybeRelocatable::Int(f) => Ok(f),
            MaybeRelocatable::RelocatableValue(r) => Err(MathError::ExpectedInteger(*r)),
        }
    }

    /// The relocatable value, or a typed error naming the integer found
    pub fn get_relocatable(&self) -> Result<Relocatable, MathError> {
        match self {
            MaybeRelocatable::RelocatableValue(r) => Ok(*r),
            MaybeRelocatable::Int(f) => Err(MathError::ExpectedRelocatable(f.clone())),
        }
    }

    /// Addition. Adding two relocatables is an error; an integer shifts a
    /// relocatable's offset.
    pub fn add(&self, rhs: &MaybeRelocatable) -> Result<MaybeRelocatable, MathError> {
        use MaybeRelocatable::*;
        match (self, rhs) {
            (Int(a), Int(b)) => Ok(Int(a + b)),
            (RelocatableValue(r), Int(f)) | (Int(f), RelocatableValue(r)) => {
                Ok(RelocatableValue(r.add_felt(f)?))
            }
            (RelocatableValue(a), RelocatableValue(b)) => Err(MathError::RelocatableAdd(*a, *b)),
        }
    }

    /// Subtraction. Same-segment relocatables yield an integer delta;
    /// cross-segment subtraction is an error.
    pub fn sub(&self, rhs: &MaybeRelocatable) -> Result<MaybeRelocatable, MathError> {
        use MaybeRelocatable::*;
        match (self, rhs) {
            (Int(a), Int(b)) => Ok(Int(a - b)),
            (RelocatableValue(r), Int(f)) => {
                let shift = f
                    .to_usize()
                    .ok_or_else(|| MathError::OffsetExceeded(*r, f.clone()))?;
                Ok(RelocatableValue(r.sub_usize(shift)?))
            }
            (RelocatableValue(a), RelocatableValue(b)) => Ok(Int(a.sub_rel_signed(b)?)),
            (Int(_), RelocatableValue(r)) => Err(MathError::ExpectedInteger(*r)),
        }
    }

    /// Multiplication is integer-only; pointers are not multiplicable.
    pub fn mul(&self, rhs: &MaybeRelocatable) -> Result<MaybeRelocatable, MathError> {
        use MaybeRelocatable::*;
        match (self, rhs) {
            (Int(a), Int(b)) => Ok(Int(a * b)),
            _ => Err(MathError::RelocatableMul),
        }
    }
}

impl From<Felt> for MaybeRelocatable {
    fn from(value: Felt) -> Self {
        MaybeRelocatable::Int(value)
    }
}

impl From<Relocatable> for MaybeRelocatable {
    fn from(value: Relocatable) -> Self {
        MaybeRelocatable::RelocatableValue(value)
    }
}

impl From<u64> for MaybeRelocatable {
    fn from(value: u64) -> Self {
        MaybeRelocatable::Int(Felt::from(value))
    }
}

impl fmt::Display for MaybeRelocatable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeRelocatable::Int(v) => write!(f, "{v}"),
            MaybeRelocatable::RelocatableValue(r) => write!(f, "{r}"),
        }
    }
}

// Memory dumps store integers as hex strings and pre-relocation addresses as
// (segment, offset) pair markers.

impl Serialize for MaybeRelocatable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaybeRelocatable::Int(v) => v.serialize(serializer),
            MaybeRelocatable::RelocatableValue(r) => (r.segment_index, r.offset).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeRelocatable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(Felt),
            Pair(usize, usize),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Hex(f) => MaybeRelocatable::Int(f),
            Repr::Pair(segment_index, offset) => {
                MaybeRelocatable::RelocatableValue(Relocatable::new(segment_index, offset))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(segment: usize, offset: usize) -> Relocatable {
        Relocatable::new(segment, offset)
    }

    #[test]
    fn test_add_offset() {
        let addr = rel(2, 5);
        assert_eq!(addr.add_usize(3).unwrap(), rel(2, 8));
        assert_eq!(addr.add_felt(&Felt::from(4u64)).unwrap(), rel(2, 9));
    }

    #[test]
    fn test_add_huge_felt_fails() {
        let addr = rel(0, 0);
        let too_big = Felt::from(-1i64);
        assert!(matches!(
            addr.add_felt(&too_big),
            Err(MathError::OffsetExceeded(..))
        ));
    }

    #[test]
    fn test_same_segment_sub() {
        assert_eq!(rel(1, 10).sub_rel(&rel(1, 4)).unwrap(), 6);
        assert_eq!(
            rel(1, 4).sub_rel_signed(&rel(1, 10)).unwrap(),
            Felt::from(-6i64)
        );
    }

    #[test]
    fn test_cross_segment_sub_fails() {
        assert!(matches!(
            rel(1, 10).sub_rel(&rel(2, 4)),
            Err(MathError::RelocatableSubDiffSegment(..))
        ));
    }

    #[test]
    fn test_maybe_add() {
        let a = MaybeRelocatable::from(Felt::from(3u64));
        let b = MaybeRelocatable::from(rel(0, 1));
        assert_eq!(a.add(&b).unwrap(), MaybeRelocatable::from(rel(0, 4)));
        assert!(matches!(
            b.add(&b),
            Err(MathError::RelocatableAdd(..))
        ));
    }

    #[test]
    fn test_maybe_sub() {
        let a = MaybeRelocatable::from(rel(3, 9));
        let b = MaybeRelocatable::from(rel(3, 2));
        assert_eq!(
            a.sub(&b).unwrap(),
            MaybeRelocatable::Int(Felt::from(7u64))
        );
    }

    #[test]
    fn test_mul_rejects_relocatables() {
        let a = MaybeRelocatable::from(rel(0, 1));
        let b = MaybeRelocatable::from(Felt::from(2u64));
        assert_eq!(a.mul(&b), Err(MathError::RelocatableMul));
        assert_eq!(
            b.mul(&b).unwrap(),
            MaybeRelocatable::Int(Felt::from(4u64))
        );
    }

    #[test]
    fn test_typed_access() {
        let i = MaybeRelocatable::from(Felt::from(1u64));
        let r = MaybeRelocatable::from(rel(0, 0));
        assert!(i.get_int().is_ok());
        assert!(matches!(i.get_relocatable(), Err(MathError::ExpectedRelocatable(_))));
        assert!(matches!(r.get_int(), Err(MathError::ExpectedInteger(_))));
    }
}
