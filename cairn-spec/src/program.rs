//! Compiled program container
//!
//! The output of the compiler and the input of the runner: a flat list of
//! data words, the declared builtins, the frozen identifier table, the hint
//! table keyed by pc offset, and optional per-instruction debug info.
//!
//! Programs serialize to a structured JSON document with felts as hex
//! strings. Round-trip law: `deserialize(serialize(p)) == p`.

use crate::error::ProgramError;
use crate::field::{Felt, PRIME_HEX};
use crate::instruction::Register;
use crate::relocatable::MaybeRelocatable;
use crate::scope::ScopedName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Program file format version
pub const PROGRAM_VERSION: &str = "0.1.0";

/// Builtin co-processor names, in canonical declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinName {
    Output,
    Pedersen,
    RangeCheck,
    Ecdsa,
    Bitwise,
    EcOp,
    Keccak,
    Poseidon,
}

impl BuiltinName {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinName::Output => "output",
            BuiltinName::Pedersen => "pedersen",
            BuiltinName::RangeCheck => "range_check",
            BuiltinName::Ecdsa => "ecdsa",
            BuiltinName::Bitwise => "bitwise",
            BuiltinName::EcOp => "ec_op",
            BuiltinName::Keccak => "keccak",
            BuiltinName::Poseidon => "poseidon",
        }
    }

    pub fn from_str_name(name: &str) -> Option<Self> {
        Some(match name {
            "output" => BuiltinName::Output,
            "pedersen" => BuiltinName::Pedersen,
            "range_check" => BuiltinName::RangeCheck,
            "ecdsa" => BuiltinName::Ecdsa,
            "bitwise" => BuiltinName::Bitwise,
            "ec_op" => BuiltinName::EcOp,
            "keccak" => BuiltinName::Keccak,
            "poseidon" => BuiltinName::Poseidon,
            _ => return None,
        })
    }
}

impl std::fmt::Display for BuiltinName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow-tracking state: how many ap adjustments have occurred since the
/// tracked point, within one control-flow lineage (`group`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApTracking {
    pub group: usize,
    pub offset: usize,
}

/// A struct member: byte-free cell offset plus the declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDefinition {
    pub offset: usize,
    pub ty: String,
}

/// A reference definition frozen at one program point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// pc at which the reference was bound
    pub pc: usize,
    /// Canonical source rendering of the bound expression
    pub value: String,
    pub ap_tracking: ApTracking,
}

/// One entry of the frozen identifier table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierDefinition {
    Const {
        value: Felt,
    },
    Label {
        pc: usize,
    },
    Reference {
        references: Vec<ReferenceData>,
    },
    Function {
        pc: usize,
    },
    Struct {
        members: BTreeMap<String, MemberDefinition>,
        size: usize,
    },
    Member {
        offset: usize,
        ty: String,
    },
    Namespace,
    Alias {
        destination: ScopedName,
    },
}

/// How a hint resolves one `ids.<name>` binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HintReference {
    /// A register-relative cell: address = register + offset (ap corrected
    /// by tracking data); `dereferenced` selects the cell value over the
    /// address itself.
    Cell {
        register: Register,
        offset: i32,
        ap_tracking: ApTracking,
        dereferenced: bool,
    },
    /// A compile-time constant
    Const { value: Felt },
}

/// Flow state and ids bindings captured with a hint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowTrackingData {
    pub ap_tracking: ApTracking,
    #[serde(default)]
    pub reference_ids: BTreeMap<String, HintReference>,
}

/// One hint attached to an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintParams {
    /// The hint source text between the hint delimiters
    pub code: String,
    /// Scopes visible to the hint, innermost last
    pub accessible_scopes: Vec<ScopedName>,
    pub flow_tracking_data: FlowTrackingData,
}

/// A resolved source span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_col)
    }
}

/// Debug record for one instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionLocation {
    pub location: Location,
    /// Formatted source of hints attached to this instruction
    #[serde(default)]
    pub hints: Vec<String>,
}

/// Per-instruction source mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub instruction_locations: BTreeMap<usize, InstructionLocation>,
}

/// A compiled program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Field prime as a hex string
    pub prime: String,
    /// Format version
    pub version: String,
    /// Flat data words; all integers after a successful compilation
    pub data: Vec<MaybeRelocatable>,
    /// Builtins declared by the `%builtins` directive, in order
    pub builtins: Vec<BuiltinName>,
    /// Scope the program was compiled under
    pub main_scope: ScopedName,
    /// Entry point pc offset, when a main function exists
    pub main: Option<usize>,
    /// Frozen identifier table
    pub identifiers: BTreeMap<ScopedName, IdentifierDefinition>,
    /// Hints keyed by the pc offset of the instruction they precede
    #[serde(default)]
    pub hints: BTreeMap<usize, Vec<HintParams>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl Program {
    pub fn new(main_scope: ScopedName) -> Self {
        Program {
            prime: PRIME_HEX.to_string(),
            version: PROGRAM_VERSION.to_string(),
            data: Vec::new(),
            builtins: Vec::new(),
            main_scope,
            main: None,
            identifiers: BTreeMap::new(),
            hints: BTreeMap::new(),
            debug_info: None,
        }
    }

    /// Data length in words; fixed once compilation succeeds
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Look up a label or function pc by name relative to the main scope
    pub fn get_label(&self, name: &str) -> Option<usize> {
        let scoped = self.main_scope.concat(&ScopedName::from_string(name)?);
        match self.identifiers.get(&scoped)? {
            IdentifierDefinition::Label { pc } | IdentifierDefinition::Function { pc } => Some(*pc),
            _ => None,
        }
    }

    /// Look up a constant by name relative to the main scope
    pub fn get_const(&self, name: &str) -> Option<&Felt> {
        let scoped = self.main_scope.concat(&ScopedName::from_string(name)?);
        match self.identifiers.get(&scoped)? {
            IdentifierDefinition::Const { value } => Some(value),
            _ => None,
        }
    }

    /// Serialize to the structured program document
    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize and validate a program document
    pub fn from_json(json: &str) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_str(json)?;
        program.validate()?;
        Ok(program)
    }

    /// Check the prime field matches the compiled-in field
    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.prime != PRIME_HEX {
            return Err(ProgramError::PrimeMismatch {
                expected: PRIME_HEX.to_string(),
                found: self.prime.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> Program {
        let mut program = Program::new(ScopedName::from_string("__main__").unwrap());
        program.data = vec![
            MaybeRelocatable::from(Felt::from(0x482680017fff8000u64)),
            MaybeRelocatable::from(Felt::from(5u64)),
        ];
        program.builtins = vec![BuiltinName::Output, BuiltinName::RangeCheck];
        program.main = Some(0);
        program.identifiers.insert(
            ScopedName::from_string("__main__.main").unwrap(),
            IdentifierDefinition::Function { pc: 0 },
        );
        program.identifiers.insert(
            ScopedName::from_string("__main__.N").unwrap(),
            IdentifierDefinition::Const {
                value: Felt::from(3u64),
            },
        );
        program.hints.insert(
            0,
            vec![HintParams {
                code: "memory[ap] = isqrt(ids.value)".to_string(),
                accessible_scopes: vec![ScopedName::from_string("__main__").unwrap()],
                flow_tracking_data: FlowTrackingData::default(),
            }],
        );
        program
    }

    #[test]
    fn test_json_round_trip() {
        let program = sample_program();
        let json = program.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn test_prime_validation() {
        let mut program = sample_program();
        program.prime = "0x11".to_string();
        let json = serde_json::to_string(&program).unwrap();
        assert!(matches!(
            Program::from_json(&json),
            Err(ProgramError::PrimeMismatch { .. })
        ));
    }

    #[test]
    fn test_label_lookup() {
        let program = sample_program();
        assert_eq!(program.get_label("main"), Some(0));
        assert_eq!(program.get_label("missing"), None);
        assert_eq!(program.get_const("N"), Some(&Felt::from(3u64)));
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(BuiltinName::RangeCheck.as_str(), "range_check");
        assert_eq!(
            BuiltinName::from_str_name("ec_op"),
            Some(BuiltinName::EcOp)
        );
        assert_eq!(BuiltinName::from_str_name("bogus"), None);
    }
}
