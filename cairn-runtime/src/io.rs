//! Artifact files
//!
//! The trace file is a flat binary stream of fixed-size records (three
//! 64-bit little-endian words per step: ap, fp, pc). The memory dump maps
//! flat addresses to field-element hex strings. The fact-topology file is a
//! JSON document listing output tree structure and page sizes per proof
//! page, consumed by external aggregation tooling.

use crate::error::Result;
use crate::trace::RelocatedTraceEntry;
use cairn_spec::Felt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Write the binary trace stream
pub fn write_trace<W: Write>(writer: &mut W, trace: &[RelocatedTraceEntry]) -> Result<()> {
    for entry in trace {
        bincode::serialize_into(&mut *writer, entry)?;
    }
    Ok(())
}

/// Render the relocated memory as a JSON document of hex felts keyed by
/// flat address.
pub fn memory_dump_json(memory: &BTreeMap<usize, Felt>) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (addr, value) in memory {
        out.insert(addr.to_string(), serde_json::Value::String(value.to_hex()));
    }
    serde_json::Value::Object(out)
}

/// Write the memory dump
pub fn write_memory_dump<W: Write>(
    writer: &mut W,
    memory: &BTreeMap<usize, Felt>,
) -> Result<()> {
    serde_json::to_writer_pretty(writer, &memory_dump_json(memory))?;
    Ok(())
}

/// The output structure of one logically distinct proof page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTopology {
    pub tree_structure: Vec<usize>,
    pub page_sizes: Vec<usize>,
}

impl FactTopology {
    /// A single-page topology over a trivial output tree
    pub fn single_page(output_size: usize) -> Self {
        FactTopology {
            tree_structure: vec![1, 0],
            page_sizes: vec![output_size],
        }
    }
}

/// The fact-topology document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTopologyFile {
    pub fact_topologies: Vec<FactTopology>,
}

pub fn write_fact_topology<W: Write>(
    writer: &mut W,
    topologies: &FactTopologyFile,
) -> Result<()> {
    serde_json::to_writer_pretty(writer, topologies)?;
    Ok(())
}

pub fn read_fact_topology(json: &str) -> Result<FactTopologyFile> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_file_is_flat_records() {
        let trace = vec![
            RelocatedTraceEntry { ap: 1, fp: 2, pc: 3 },
            RelocatedTraceEntry { ap: 4, fp: 5, pc: 6 },
        ];
        let mut bytes = Vec::new();
        write_trace(&mut bytes, &trace).unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[24], 4);
    }

    #[test]
    fn test_memory_dump_hex_values() {
        let mut memory = BTreeMap::new();
        memory.insert(1usize, Felt::from(255u64));
        memory.insert(2usize, Felt::from(16u64));
        let json = memory_dump_json(&memory);
        assert_eq!(json["1"], "0xff");
        assert_eq!(json["2"], "0x10");
    }

    #[test]
    fn test_fact_topology_round_trip() {
        let file = FactTopologyFile {
            fact_topologies: vec![FactTopology::single_page(3), FactTopology::single_page(7)],
        };
        let mut bytes = Vec::new();
        write_fact_topology(&mut bytes, &file).unwrap();
        let back = read_fact_topology(std::str::from_utf8(&bytes).unwrap()).unwrap();
        assert_eq!(back, file);
        assert_eq!(back.fact_topologies[0].tree_structure, vec![1, 0]);
        assert_eq!(back.fact_topologies[1].page_sizes, vec![7]);
    }
}
