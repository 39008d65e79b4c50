//! Structured instruction representation
//!
//! One instruction packs three signed 16-bit offsets and a 15-bit flag field
//! selecting operand registers, result logic, pc/ap update behavior, and the
//! opcode. Instructions with an immediate operand occupy a second word.
//!
//! Legality invariants enforced by the encoder and checked by the decoder:
//! - `Res::Unconstrained` appears exactly when `pc_update` is `Jnz`
//! - `ApUpdate::Add2` appears exactly when `opcode` is `Call`

use crate::field::Felt;
use serde::{Deserialize, Serialize};

/// Operand base register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Register {
    AP,
    FP,
}

/// Source of the second operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op1Addr {
    /// The word following the instruction
    Imm,
    /// ap-relative
    AP,
    /// fp-relative
    FP,
    /// Relative to the value of op0 (double dereference)
    Op0,
}

/// Result computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Res {
    Op1,
    Add,
    Mul,
    /// No constrained result; only legal under `PcUpdate::Jnz`
    Unconstrained,
}

/// Program counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcUpdate {
    /// Advance by instruction size
    Regular,
    /// Absolute jump to res
    Jump,
    /// Relative jump by res
    JumpRel,
    /// Conditional relative jump on dst != 0
    Jnz,
}

/// Allocation pointer update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApUpdate {
    Regular,
    /// ap += res
    Add,
    /// ap += 1
    Add1,
    /// ap += 2; implied by `Opcode::Call`
    Add2,
}

/// Frame pointer update, derived from the opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpUpdate {
    Regular,
    /// fp = ap + 2 (call)
    ApPlus2,
    /// fp = dst (ret)
    Dst,
}

/// Instruction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    NOp,
    AssertEq,
    Call,
    Ret,
}

/// A decoded Cairn instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub off_dst: i16,
    pub off_op0: i16,
    pub off_op1: i16,
    pub imm: Option<Felt>,
    pub dst_register: Register,
    pub op0_register: Register,
    pub op1_addr: Op1Addr,
    pub res: Res,
    pub pc_update: PcUpdate,
    pub ap_update: ApUpdate,
    pub opcode: Opcode,
}

impl Instruction {
    /// Width in words: 2 when an immediate operand is present
    pub fn size(&self) -> usize {
        match self.op1_addr {
            Op1Addr::Imm => 2,
            _ => 1,
        }
    }

    /// Frame pointer behavior, implied by the opcode
    pub fn fp_update(&self) -> FpUpdate {
        match self.opcode {
            Opcode::Call => FpUpdate::ApPlus2,
            Opcode::Ret => FpUpdate::Dst,
            _ => FpUpdate::Regular,
        }
    }

    /// Check the structural invariants that make an instruction encodable
    pub fn is_legal(&self) -> bool {
        let jnz_ok = (self.res == Res::Unconstrained) == (self.pc_update == PcUpdate::Jnz);
        let call_ok = (self.ap_update == ApUpdate::Add2) == (self.opcode == Opcode::Call);
        let imm_ok = (self.op1_addr == Op1Addr::Imm) == self.imm.is_some();
        jnz_ok && call_ok && imm_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop_instruction() -> Instruction {
        Instruction {
            off_dst: -1,
            off_op0: 0,
            off_op1: 1,
            imm: None,
            dst_register: Register::FP,
            op0_register: Register::AP,
            op1_addr: Op1Addr::AP,
            res: Res::Op1,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Regular,
            opcode: Opcode::NOp,
        }
    }

    #[test]
    fn test_size() {
        let mut inst = nop_instruction();
        assert_eq!(inst.size(), 1);
        inst.op1_addr = Op1Addr::Imm;
        inst.imm = Some(Felt::from(7u64));
        assert_eq!(inst.size(), 2);
    }

    #[test]
    fn test_fp_update_follows_opcode() {
        let mut inst = nop_instruction();
        assert_eq!(inst.fp_update(), FpUpdate::Regular);
        inst.opcode = Opcode::Call;
        assert_eq!(inst.fp_update(), FpUpdate::ApPlus2);
        inst.opcode = Opcode::Ret;
        assert_eq!(inst.fp_update(), FpUpdate::Dst);
    }

    #[test]
    fn test_legality() {
        let mut inst = nop_instruction();
        assert!(inst.is_legal());

        // Unconstrained res without jnz is illegal
        inst.res = Res::Unconstrained;
        assert!(!inst.is_legal());
        inst.pc_update = PcUpdate::Jnz;
        assert!(inst.is_legal());

        // Immediate flag must match the immediate operand
        let mut inst = nop_instruction();
        inst.op1_addr = Op1Addr::Imm;
        assert!(!inst.is_legal());
        inst.imm = Some(Felt::from(1u64));
        assert!(inst.is_legal());
    }
}
