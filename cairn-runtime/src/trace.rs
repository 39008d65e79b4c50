//! Execution trace
//!
//! One entry is recorded per executed instruction step, holding the register
//! values before the instruction ran. After execution the trace is relocated
//! from segment-relative to flat addresses for the final proof input.

use crate::error::MemoryError;
use crate::segments::relocate_address;
use cairn_spec::Relocatable;
use serde::{Deserialize, Serialize};

/// Registers at the start of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub pc: Relocatable,
    pub ap: Relocatable,
    pub fp: Relocatable,
}

/// A trace entry in flat address space. Field order matches the binary
/// trace-file record: three 64-bit little-endian words (ap, fp, pc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatedTraceEntry {
    pub ap: u64,
    pub fp: u64,
    pub pc: u64,
}

/// Relocate one entry through the segment base table
pub fn relocate_trace_entry(
    entry: &TraceEntry,
    table: &[usize],
) -> Result<RelocatedTraceEntry, MemoryError> {
    Ok(RelocatedTraceEntry {
        ap: relocate_address(&entry.ap, table)? as u64,
        fp: relocate_address(&entry.fp, table)? as u64,
        pc: relocate_address(&entry.pc, table)? as u64,
    })
}

/// Relocate a whole trace
pub fn relocate_trace(
    trace: &[TraceEntry],
    table: &[usize],
) -> Result<Vec<RelocatedTraceEntry>, MemoryError> {
    trace
        .iter()
        .map(|entry| relocate_trace_entry(entry, table))
        .collect()
}
