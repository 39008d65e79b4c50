//! Instruction decoding
//!
//! The inverse of the compiler's encoder. Any flag-bit pattern outside the
//! supported one-hot groups, or a missing immediate word, is rejected with a
//! typed error.

use crate::error::{DisassemblerError, Result};
use cairn_spec::encoding::{
    extract_flags, extract_off_dst, extract_off_op0, extract_off_op1, group_is_one_hot, AP_ADD,
    AP_ADD1, AP_GROUP, DST_REG_FP, MAX_WORD, OP0_REG_FP, OP1_AP, OP1_FP, OP1_IMM, OP1_SRC_GROUP,
    OPCODE_ASSERT_EQ, OPCODE_CALL, OPCODE_GROUP, OPCODE_RET, PC_GROUP, PC_JNZ, PC_JUMP_ABS,
    PC_JUMP_REL, RES_ADD, RES_GROUP, RES_MUL,
};
use cairn_spec::{
    ApUpdate, Felt, Instruction, Op1Addr, Opcode, PcUpdate, Register, Res,
};

/// Decode one instruction from its word, pulling the immediate operand from
/// `next` when the encoding requires one.
pub fn decode(word: &Felt, next: Option<&Felt>) -> Result<Instruction> {
    let raw = word
        .to_u64()
        .ok_or_else(|| DisassemblerError::WordTooLarge(word.to_hex()))?;
    if raw > MAX_WORD {
        return Err(DisassemblerError::WordTooLarge(word.to_hex()));
    }
    let flags = extract_flags(raw);

    for group in [OP1_SRC_GROUP, RES_GROUP, PC_GROUP, AP_GROUP, OPCODE_GROUP] {
        if !group_is_one_hot(flags, group) {
            return Err(DisassemblerError::UnsupportedFlagCombination { word: raw, flags });
        }
    }

    let dst_register = if flags & DST_REG_FP != 0 {
        Register::FP
    } else {
        Register::AP
    };
    let op0_register = if flags & OP0_REG_FP != 0 {
        Register::FP
    } else {
        Register::AP
    };
    let op1_addr = if flags & OP1_IMM != 0 {
        Op1Addr::Imm
    } else if flags & OP1_AP != 0 {
        Op1Addr::AP
    } else if flags & OP1_FP != 0 {
        Op1Addr::FP
    } else {
        Op1Addr::Op0
    };
    let pc_update = if flags & PC_JUMP_ABS != 0 {
        PcUpdate::Jump
    } else if flags & PC_JUMP_REL != 0 {
        PcUpdate::JumpRel
    } else if flags & PC_JNZ != 0 {
        PcUpdate::Jnz
    } else {
        PcUpdate::Regular
    };
    let res = if flags & RES_ADD != 0 {
        Res::Add
    } else if flags & RES_MUL != 0 {
        Res::Mul
    } else if pc_update == PcUpdate::Jnz {
        Res::Unconstrained
    } else {
        Res::Op1
    };
    // A conditional jump never constrains a result
    if pc_update == PcUpdate::Jnz && res != Res::Unconstrained {
        return Err(DisassemblerError::UnsupportedFlagCombination { word: raw, flags });
    }
    let opcode = if flags & OPCODE_CALL != 0 {
        Opcode::Call
    } else if flags & OPCODE_RET != 0 {
        Opcode::Ret
    } else if flags & OPCODE_ASSERT_EQ != 0 {
        Opcode::AssertEq
    } else {
        Opcode::NOp
    };
    let ap_update = if flags & AP_ADD != 0 {
        ApUpdate::Add
    } else if flags & AP_ADD1 != 0 {
        ApUpdate::Add1
    } else if opcode == Opcode::Call {
        ApUpdate::Add2
    } else {
        ApUpdate::Regular
    };
    // A call always advances ap by its frame size
    if opcode == Opcode::Call && ap_update != ApUpdate::Add2 {
        return Err(DisassemblerError::UnsupportedFlagCombination { word: raw, flags });
    }

    let imm = if op1_addr == Op1Addr::Imm {
        Some(
            next.ok_or(DisassemblerError::MissingImmediate { index: 0 })?
                .clone(),
        )
    } else {
        None
    };

    Ok(Instruction {
        off_dst: extract_off_dst(raw),
        off_op0: extract_off_op0(raw),
        off_op1: extract_off_op1(raw),
        imm,
        dst_register,
        op0_register,
        op1_addr,
        res,
        pc_update,
        ap_update,
        opcode,
    })
}

/// Decode a whole word stream into instructions
pub fn decode_stream(words: &[Felt]) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut index = 0;
    while index < words.len() {
        let instruction = decode(&words[index], words.get(index + 1))
            .map_err(|err| match err {
                DisassemblerError::MissingImmediate { .. } => {
                    DisassemblerError::MissingImmediate { index }
                }
                other => other,
            })?;
        index += instruction.size();
        out.push(instruction);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_spec::encoding::{pack, FLAGS_SHIFT};

    #[test]
    fn test_reject_multi_hot_op1_group() {
        let word = Felt::from(pack(0, 0, 0, OP1_AP | OP1_FP));
        let err = decode(&word, None).unwrap_err();
        assert!(matches!(
            err,
            DisassemblerError::UnsupportedFlagCombination { .. }
        ));
    }

    #[test]
    fn test_reject_jnz_with_res() {
        let word = Felt::from(pack(0, 0, 0, PC_JNZ | RES_ADD));
        let err = decode(&word, None).unwrap_err();
        assert!(matches!(
            err,
            DisassemblerError::UnsupportedFlagCombination { .. }
        ));
    }

    #[test]
    fn test_reject_call_with_ap_add1() {
        let word = Felt::from(pack(0, 1, 1, OPCODE_CALL | PC_JUMP_REL | OP1_IMM | AP_ADD1));
        let err = decode(&word, Some(&Felt::from(2u64))).unwrap_err();
        assert!(matches!(
            err,
            DisassemblerError::UnsupportedFlagCombination { .. }
        ));
    }

    #[test]
    fn test_missing_immediate() {
        let word = Felt::from(pack(0, -1, 1, OPCODE_ASSERT_EQ | OP1_IMM));
        let err = decode(&word, None).unwrap_err();
        assert!(matches!(err, DisassemblerError::MissingImmediate { .. }));
    }

    #[test]
    fn test_reject_high_bits() {
        let word = Felt::from(1u64 << 63);
        assert!(matches!(
            decode(&word, None),
            Err(DisassemblerError::WordTooLarge(_))
        ));
        let above = Felt::from(u64::MAX) * Felt::from(2u64);
        assert!(matches!(
            decode(&above, None),
            Err(DisassemblerError::WordTooLarge(_))
        ));
    }

    #[test]
    fn test_decode_regular_word() {
        // [fp - 2] = [ap + 3] with no updates
        let flags = OPCODE_ASSERT_EQ | OP1_AP | DST_REG_FP;
        let word = Felt::from(pack(-2, -1, 3, flags));
        let inst = decode(&word, None).unwrap();
        assert_eq!(inst.opcode, Opcode::AssertEq);
        assert_eq!(inst.dst_register, Register::FP);
        assert_eq!(inst.off_dst, -2);
        assert_eq!(inst.op1_addr, Op1Addr::AP);
        assert_eq!(inst.off_op1, 3);
        assert_eq!(inst.size(), 1);
        // flags round through the shift unchanged
        assert_eq!(extract_flags(pack(0, 0, 0, flags)), flags);
        assert_eq!(FLAGS_SHIFT, 48);
    }
}
