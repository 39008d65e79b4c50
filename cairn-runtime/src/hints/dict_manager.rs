//! Dict trackers
//!
//! A dict tracker associates a VM memory segment with an ordinary key-value
//! mapping plus a current-pointer cursor, letting the hint layer model
//! high-level dictionary operations on top of flat memory. Each dict
//! operation appends a (key, previous value, new value) triple to the
//! tracked segment and advances the cursor.

use crate::crypto::TwoToOneHash;
use crate::error::HintError;
use crate::segments::MemorySegmentManager;
use cairn_spec::{Felt, MaybeRelocatable, Relocatable};
use std::collections::HashMap;

/// Cells appended to the dict segment per operation
pub const DICT_ACCESS_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct DictTracker {
    /// Next free address of the tracked segment
    pub current_ptr: Relocatable,
    pub data: HashMap<Felt, Felt>,
    /// Value returned for absent keys; reads of absent keys fail without one
    pub default_value: Option<Felt>,
}

impl DictTracker {
    pub fn new(base: Relocatable, default_value: Option<Felt>) -> Self {
        DictTracker {
            current_ptr: base,
            data: HashMap::new(),
            default_value,
        }
    }

    pub fn get_value(&self, key: &Felt) -> Result<Felt, HintError> {
        self.data
            .get(key)
            .or(self.default_value.as_ref())
            .cloned()
            .ok_or_else(|| HintError::DictKeyNotFound(key.clone()))
    }
}

/// All dict trackers of one VM run, keyed by segment index
#[derive(Debug, Default)]
pub struct DictManager {
    trackers: HashMap<usize, DictTracker>,
}

impl DictManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh dict-backed segment
    pub fn new_dict(
        &mut self,
        segments: &mut MemorySegmentManager,
        default_value: Option<Felt>,
    ) -> Relocatable {
        let base = segments.add();
        self.trackers
            .insert(base.segment_index, DictTracker::new(base, default_value));
        base
    }

    pub fn get_tracker(&self, dict_ptr: Relocatable) -> Result<&DictTracker, HintError> {
        let tracker = self
            .trackers
            .get(&dict_ptr.segment_index)
            .ok_or(HintError::NoDictTracker(dict_ptr.segment_index))?;
        if tracker.current_ptr != dict_ptr {
            return Err(HintError::DictPtrMismatch {
                expected: tracker.current_ptr,
                found: dict_ptr,
            });
        }
        Ok(tracker)
    }

    fn get_tracker_mut(
        &mut self,
        dict_ptr: Relocatable,
    ) -> Result<&mut DictTracker, HintError> {
        let tracker = self
            .trackers
            .get_mut(&dict_ptr.segment_index)
            .ok_or(HintError::NoDictTracker(dict_ptr.segment_index))?;
        if tracker.current_ptr != dict_ptr {
            return Err(HintError::DictPtrMismatch {
                expected: tracker.current_ptr,
                found: dict_ptr,
            });
        }
        Ok(tracker)
    }

    /// Tracker access without the cursor check, for post-run inspection
    pub fn tracker_for_segment(&self, segment_index: usize) -> Option<&DictTracker> {
        self.trackers.get(&segment_index)
    }

    fn append_access(
        tracker: &mut DictTracker,
        segments: &mut MemorySegmentManager,
        key: &Felt,
        prev: &Felt,
        new: &Felt,
    ) -> Result<(), HintError> {
        let ptr = tracker.current_ptr;
        segments
            .memory
            .insert(ptr, MaybeRelocatable::Int(key.clone()))?;
        segments
            .memory
            .insert(ptr.add_usize(1)?, MaybeRelocatable::Int(prev.clone()))?;
        segments
            .memory
            .insert(ptr.add_usize(2)?, MaybeRelocatable::Int(new.clone()))?;
        tracker.current_ptr = ptr.add_usize(DICT_ACCESS_SIZE)?;
        Ok(())
    }

    /// Read `key`, appending a (key, value, value) access to the segment
    pub fn read(
        &mut self,
        segments: &mut MemorySegmentManager,
        dict_ptr: Relocatable,
        key: &Felt,
    ) -> Result<Felt, HintError> {
        let tracker = self.get_tracker_mut(dict_ptr)?;
        let value = tracker.get_value(key)?;
        Self::append_access(tracker, segments, key, &value, &value)?;
        Ok(value)
    }

    /// Write `key -> new`, appending a (key, previous, new) access
    pub fn write(
        &mut self,
        segments: &mut MemorySegmentManager,
        dict_ptr: Relocatable,
        key: &Felt,
        new: &Felt,
    ) -> Result<(), HintError> {
        let tracker = self.get_tracker_mut(dict_ptr)?;
        let prev = tracker.get_value(key)?;
        tracker.data.insert(key.clone(), new.clone());
        Self::append_access(tracker, segments, key, &prev, new)
    }

    /// Write with a previous-value check
    pub fn update(
        &mut self,
        segments: &mut MemorySegmentManager,
        dict_ptr: Relocatable,
        key: &Felt,
        prev: &Felt,
        new: &Felt,
    ) -> Result<(), HintError> {
        let tracker = self.get_tracker_mut(dict_ptr)?;
        let actual = tracker.get_value(key)?;
        if &actual != prev {
            return Err(HintError::DictUpdateMismatch {
                key: key.clone(),
                expected: prev.clone(),
                found: actual,
            });
        }
        tracker.data.insert(key.clone(), new.clone());
        Self::append_access(tracker, segments, key, prev, new)
    }
}

/// Merkle root of a dict-backed leaf set: keys are leaf indices in
/// `[0, 2^height)`, absent leaves take the dict's default (or zero).
pub fn compute_merkle_root(
    tracker: &DictTracker,
    height: u32,
    hash: TwoToOneHash,
) -> Felt {
    let default = tracker.default_value.clone().unwrap_or_else(Felt::zero);
    let mut level: Vec<Felt> = (0..(1usize << height))
        .map(|i| {
            tracker
                .data
                .get(&Felt::from(i))
                .cloned()
                .unwrap_or_else(|| default.clone())
        })
        .collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash(&pair[0], &pair[1]))
            .collect();
    }
    level.pop().unwrap_or(default)
}
