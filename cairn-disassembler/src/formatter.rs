//! Instruction formatting to source statements
//!
//! Produces the canonical textual form the compiler can re-parse, closing the
//! disassembly round trip: decode -> format -> parse -> encode reproduces the
//! identical binary words.

use crate::error::{DisassemblerError, Result};
use cairn_spec::{ApUpdate, Felt, Instruction, Op1Addr, Opcode, PcUpdate, Register, Res};

fn register(reg: Register) -> &'static str {
    match reg {
        Register::AP => "ap",
        Register::FP => "fp",
    }
}

fn cell(reg: Register, offset: i16) -> String {
    match offset {
        0 => format!("[{}]", register(reg)),
        off if off > 0 => format!("[{} + {off}]", register(reg)),
        off => format!("[{} - {}]", register(reg), -(off as i32)),
    }
}

fn imm(value: &Felt) -> String {
    value.to_string()
}

/// The op1 operand as source text
fn op1(instruction: &Instruction) -> Result<String> {
    Ok(match instruction.op1_addr {
        Op1Addr::Imm => imm(
            instruction
                .imm
                .as_ref()
                .ok_or(DisassemblerError::NotRepresentable)?,
        ),
        Op1Addr::AP => cell(Register::AP, instruction.off_op1),
        Op1Addr::FP => cell(Register::FP, instruction.off_op1),
        Op1Addr::Op0 => {
            let inner = cell(instruction.op0_register, instruction.off_op0);
            match instruction.off_op1 {
                0 => format!("[{inner}]"),
                off if off > 0 => format!("[{inner} + {off}]"),
                off => format!("[{inner} - {}]", -(off as i32)),
            }
        }
    })
}

/// The computed result as source text
fn res(instruction: &Instruction) -> Result<String> {
    let op0 = cell(instruction.op0_register, instruction.off_op0);
    let op1 = op1(instruction)?;
    Ok(match instruction.res {
        Res::Op1 => op1,
        Res::Add => format!("{op0} + {op1}"),
        Res::Mul => format!("{op0} * {op1}"),
        Res::Unconstrained => return Err(DisassemblerError::NotRepresentable),
    })
}

/// Format one instruction as a source statement
pub fn format(instruction: &Instruction) -> Result<String> {
    let dst = cell(instruction.dst_register, instruction.off_dst);
    match instruction.opcode {
        Opcode::AssertEq => {
            let suffix = match instruction.ap_update {
                ApUpdate::Regular => "",
                ApUpdate::Add1 => "; ap++",
                _ => return Err(DisassemblerError::NotRepresentable),
            };
            if instruction.pc_update != PcUpdate::Regular {
                return Err(DisassemblerError::NotRepresentable);
            }
            Ok(format!("{dst} = {}{suffix}", res(instruction)?))
        }
        Opcode::Call => {
            if instruction.ap_update != ApUpdate::Add2 {
                return Err(DisassemblerError::NotRepresentable);
            }
            let mode = match instruction.pc_update {
                PcUpdate::Jump => "abs",
                PcUpdate::JumpRel => "rel",
                _ => return Err(DisassemblerError::NotRepresentable),
            };
            Ok(format!("call {mode} {}", res(instruction)?))
        }
        Opcode::Ret => Ok("ret".to_string()),
        Opcode::NOp => match (instruction.pc_update, instruction.ap_update) {
            (PcUpdate::Jump, ApUpdate::Regular) => {
                Ok(format!("jmp abs {}", res(instruction)?))
            }
            (PcUpdate::JumpRel, ApUpdate::Regular) => {
                Ok(format!("jmp rel {}", res(instruction)?))
            }
            (PcUpdate::Jnz, ApUpdate::Regular) => Ok(format!(
                "jmp rel {} if {dst} != 0",
                op1(instruction)?
            )),
            (PcUpdate::Regular, ApUpdate::Add) => {
                Ok(format!("ap += {}", res(instruction)?))
            }
            _ => Err(DisassemblerError::NotRepresentable),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Instruction {
        Instruction {
            off_dst: -1,
            off_op0: -1,
            off_op1: -1,
            imm: None,
            dst_register: Register::FP,
            op0_register: Register::FP,
            op1_addr: Op1Addr::FP,
            res: Res::Op1,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Regular,
            opcode: Opcode::NOp,
        }
    }

    #[test]
    fn test_format_assert_imm() {
        let mut inst = base();
        inst.opcode = Opcode::AssertEq;
        inst.dst_register = Register::AP;
        inst.off_dst = 0;
        inst.op1_addr = Op1Addr::Imm;
        inst.off_op1 = 1;
        inst.imm = Some(Felt::from(25u64));
        inst.ap_update = ApUpdate::Add1;
        assert_eq!(format(&inst).unwrap(), "[ap] = 25; ap++");
    }

    #[test]
    fn test_format_add() {
        let mut inst = base();
        inst.opcode = Opcode::AssertEq;
        inst.dst_register = Register::AP;
        inst.off_dst = 0;
        inst.res = Res::Add;
        inst.op0_register = Register::FP;
        inst.off_op0 = -3;
        inst.op1_addr = Op1Addr::FP;
        inst.off_op1 = -4;
        assert_eq!(format(&inst).unwrap(), "[ap] = [fp - 3] + [fp - 4]");
    }

    #[test]
    fn test_format_double_deref() {
        let mut inst = base();
        inst.opcode = Opcode::AssertEq;
        inst.dst_register = Register::AP;
        inst.off_dst = 0;
        inst.op0_register = Register::FP;
        inst.off_op0 = 2;
        inst.op1_addr = Op1Addr::Op0;
        inst.off_op1 = 1;
        assert_eq!(format(&inst).unwrap(), "[ap] = [[fp + 2] + 1]");
    }

    #[test]
    fn test_format_jnz() {
        let mut inst = base();
        inst.pc_update = PcUpdate::Jnz;
        inst.res = Res::Unconstrained;
        inst.dst_register = Register::AP;
        inst.off_dst = -1;
        inst.op1_addr = Op1Addr::Imm;
        inst.off_op1 = 1;
        inst.imm = Some(Felt::from(5u64));
        assert_eq!(format(&inst).unwrap(), "jmp rel 5 if [ap - 1] != 0");
    }

    #[test]
    fn test_format_ret() {
        let mut inst = base();
        inst.opcode = Opcode::Ret;
        inst.off_dst = -2;
        inst.pc_update = PcUpdate::Jump;
        assert_eq!(format(&inst).unwrap(), "ret");
    }

    #[test]
    fn test_unconstrained_res_not_representable_as_assert() {
        let mut inst = base();
        inst.opcode = Opcode::AssertEq;
        inst.res = Res::Unconstrained;
        assert!(format(&inst).is_err());
    }
}
