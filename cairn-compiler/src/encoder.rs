//! Instruction encoding
//!
//! Packs a structured instruction into its one- or two-word binary form.
//! The inverse lives in the disassembler crate; the shared bit layout in
//! `cairn_spec::encoding`.

use cairn_spec::encoding::{
    pack, AP_ADD, AP_ADD1, DST_REG_FP, OP0_REG_FP, OP1_AP, OP1_FP, OP1_IMM, OPCODE_ASSERT_EQ,
    OPCODE_CALL, OPCODE_RET, PC_JNZ, PC_JUMP_ABS, PC_JUMP_REL, RES_ADD, RES_MUL,
};
use cairn_spec::{ApUpdate, Felt, Instruction, Op1Addr, Opcode, PcUpdate, Register, Res};

/// Encode an instruction into one or two field-prime-bounded words.
///
/// The caller is responsible for only passing legally constructible
/// instructions (see [`Instruction::is_legal`]).
pub fn encode(instruction: &Instruction) -> Vec<Felt> {
    debug_assert!(instruction.is_legal());
    let mut flags = 0u64;
    if instruction.dst_register == Register::FP {
        flags |= DST_REG_FP;
    }
    if instruction.op0_register == Register::FP {
        flags |= OP0_REG_FP;
    }
    flags |= match instruction.op1_addr {
        Op1Addr::Imm => OP1_IMM,
        Op1Addr::AP => OP1_AP,
        Op1Addr::FP => OP1_FP,
        Op1Addr::Op0 => 0,
    };
    flags |= match instruction.res {
        Res::Add => RES_ADD,
        Res::Mul => RES_MUL,
        Res::Op1 | Res::Unconstrained => 0,
    };
    flags |= match instruction.pc_update {
        PcUpdate::Jump => PC_JUMP_ABS,
        PcUpdate::JumpRel => PC_JUMP_REL,
        PcUpdate::Jnz => PC_JNZ,
        PcUpdate::Regular => 0,
    };
    flags |= match instruction.ap_update {
        ApUpdate::Add => AP_ADD,
        ApUpdate::Add1 => AP_ADD1,
        ApUpdate::Regular | ApUpdate::Add2 => 0,
    };
    flags |= match instruction.opcode {
        Opcode::Call => OPCODE_CALL,
        Opcode::Ret => OPCODE_RET,
        Opcode::AssertEq => OPCODE_ASSERT_EQ,
        Opcode::NOp => 0,
    };

    let word = pack(
        instruction.off_dst,
        instruction.off_op0,
        instruction.off_op1,
        flags,
    );
    let mut words = vec![Felt::from(word)];
    if let Some(imm) = &instruction.imm {
        words.push(imm.clone());
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction_builder::build_ret;
    use crate::parser::parse_statement;
    use cairn_spec::encoding::{extract_flags, extract_off_dst, extract_off_op1, MAX_WORD};

    fn lower(source: &str) -> Instruction {
        let element = parse_statement("t", source).unwrap();
        crate::instruction_builder::element_to_instruction(&element).unwrap()
    }

    #[test]
    fn test_encode_ret_word() {
        let words = encode(&build_ret());
        assert_eq!(words.len(), 1);
        let word = words[0].to_u64().unwrap();
        assert!(word <= MAX_WORD);
        assert_eq!(extract_off_dst(word), -2);
        assert_eq!(extract_off_op1(word), -1);
        let flags = extract_flags(word);
        assert_ne!(flags & OPCODE_RET, 0);
        assert_ne!(flags & PC_JUMP_ABS, 0);
        assert_ne!(flags & OP1_FP, 0);
    }

    #[test]
    fn test_encode_immediate_takes_two_words() {
        let words = encode(&lower("[ap] = 25; ap++"));
        assert_eq!(words.len(), 2);
        assert_eq!(words[1], Felt::from(25u64));
        let flags = extract_flags(words[0].to_u64().unwrap());
        assert_ne!(flags & OP1_IMM, 0);
        assert_ne!(flags & AP_ADD1, 0);
        assert_ne!(flags & OPCODE_ASSERT_EQ, 0);
    }

    #[test]
    fn test_encode_add_flags() {
        let words = encode(&lower("[ap] = [fp - 3] + [fp - 4]"));
        assert_eq!(words.len(), 1);
        let flags = extract_flags(words[0].to_u64().unwrap());
        assert_ne!(flags & RES_ADD, 0);
        assert_eq!(flags & RES_MUL, 0);
    }
}
