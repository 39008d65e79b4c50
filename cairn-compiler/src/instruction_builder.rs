//! Lowering of register-relative statements to instructions
//!
//! Works on fully resolved expressions: every identifier has already been
//! substituted, leaving registers, integers, dereferences, and arithmetic.
//! Only instruction-expressible shapes are accepted; the result destination
//! must be a register-relative dereference and the result one of: immediate,
//! dereference, double dereference, or a single add/mul between those.
//!
//! Subtraction and division normalize by moving the compound to the other
//! side (`[c] = [a] - [b]` lowers as `[a] = [c] + [b]`).

use crate::ast::{BinOp, CodeElement, CodeElementKind, Expr, ExprKind};
use crate::error::PreprocessorError;
use cairn_spec::{
    ApUpdate, Felt, Instruction, Location, Op1Addr, Opcode, PcUpdate, Register, Res,
};
use num_traits::ToPrimitive;

type Result<T> = std::result::Result<T, PreprocessorError>;

/// A register-relative cell `[reg + off]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub register: Register,
    pub offset: i16,
}

/// Classified result operand
#[derive(Debug, Clone, PartialEq)]
pub enum ResDesc {
    Imm(Felt),
    Cell(Cell),
    /// `[[reg + off0] + off1]`
    DoubleDeref(Cell, i16),
    Add(Cell, CellOrImm),
    Mul(Cell, CellOrImm),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellOrImm {
    Cell(Cell),
    Imm(Felt),
}

fn not_expressible(message: &str, loc: &Option<Location>) -> PreprocessorError {
    PreprocessorError::NotInstructionExpressible {
        message: message.to_string(),
        location: loc.clone(),
    }
}

fn strip_casts(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Cast { expr: inner, .. } => strip_casts(inner),
        _ => expr,
    }
}

/// Fold an expression to a constant field element, if it is one
pub fn as_int(expr: &Expr) -> Option<Felt> {
    match &strip_casts(expr).kind {
        ExprKind::Int(v) => Some(v.clone()),
        ExprKind::Neg(inner) => as_int(inner).map(|v| -v),
        ExprKind::BinOp { op, lhs, rhs } => {
            let a = as_int(lhs)?;
            let b = as_int(rhs)?;
            Some(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a.field_div(&b)?,
            })
        }
        _ => None,
    }
}

/// A constant that fits the signed offset arithmetic range
fn as_int_signed(expr: &Expr) -> Option<i64> {
    let value = as_int(expr)?;
    let (negative, magnitude) = value.to_signed_biguint();
    let magnitude = magnitude.to_i64()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Reduce an address expression to `register + offset`
pub fn to_reg_off(expr: &Expr) -> Option<(Register, i64)> {
    match &strip_casts(expr).kind {
        ExprKind::Reg(register) => Some((*register, 0)),
        ExprKind::BinOp { op, lhs, rhs } => match op {
            BinOp::Add => {
                if let Some((register, base)) = to_reg_off(lhs) {
                    Some((register, base.checked_add(as_int_signed(rhs)?)?))
                } else {
                    let (register, base) = to_reg_off(rhs)?;
                    Some((register, base.checked_add(as_int_signed(lhs)?)?))
                }
            }
            BinOp::Sub => {
                let (register, base) = to_reg_off(lhs)?;
                Some((register, base.checked_sub(as_int_signed(rhs)?)?))
            }
            _ => None,
        },
        _ => None,
    }
}

fn fit_offset(value: i64, loc: &Option<Location>) -> Result<i16> {
    i16::try_from(value).map_err(|_| PreprocessorError::OffsetOutOfRange {
        location: loc.clone(),
    })
}

/// Classify `[reg + off]`
pub fn as_cell(expr: &Expr) -> Option<(Register, i64)> {
    match &strip_casts(expr).kind {
        ExprKind::Deref(inner) => to_reg_off(inner),
        _ => None,
    }
}

fn cell(expr: &Expr, loc: &Option<Location>) -> Result<Option<Cell>> {
    match as_cell(expr) {
        Some((register, offset)) => Ok(Some(Cell {
            register,
            offset: fit_offset(offset, loc)?,
        })),
        None => Ok(None),
    }
}

/// Classify `[[reg + off0] + off1]`
fn double_deref(expr: &Expr, loc: &Option<Location>) -> Result<Option<(Cell, i16)>> {
    let ExprKind::Deref(addr) = &strip_casts(expr).kind else {
        return Ok(None);
    };
    let addr = strip_casts(addr);
    // [x] or [x + c] where x is itself a dereference
    let (base, shift) = match &addr.kind {
        ExprKind::BinOp {
            op: BinOp::Add,
            lhs,
            rhs,
        } => match as_int_signed(rhs) {
            Some(c) => (lhs.as_ref(), c),
            None => return Ok(None),
        },
        ExprKind::BinOp {
            op: BinOp::Sub,
            lhs,
            rhs,
        } => match as_int_signed(rhs) {
            Some(c) => (lhs.as_ref(), -c),
            None => return Ok(None),
        },
        _ => (addr, 0),
    };
    match cell(base, loc)? {
        Some(inner) => Ok(Some((inner, fit_offset(shift, loc)?))),
        None => Ok(None),
    }
}

fn cell_or_imm(expr: &Expr, loc: &Option<Location>) -> Result<Option<CellOrImm>> {
    if let Some(value) = as_int(expr) {
        return Ok(Some(CellOrImm::Imm(value)));
    }
    Ok(cell(expr, loc)?.map(CellOrImm::Cell))
}

/// Classify a resolved expression as a result operand
pub fn classify_res(expr: &Expr, loc: &Option<Location>) -> Result<Option<ResDesc>> {
    if let Some(value) = as_int(expr) {
        return Ok(Some(ResDesc::Imm(value)));
    }
    if let Some(c) = cell(expr, loc)? {
        return Ok(Some(ResDesc::Cell(c)));
    }
    if let Some((inner, shift)) = double_deref(expr, loc)? {
        return Ok(Some(ResDesc::DoubleDeref(inner, shift)));
    }
    let stripped = strip_casts(expr);
    if let ExprKind::Neg(inner) = &stripped.kind {
        // -x lowers as x * (-1)
        if let Some(c) = cell(inner, loc)? {
            return Ok(Some(ResDesc::Mul(c, CellOrImm::Imm(Felt::from(-1i64)))));
        }
        return Ok(None);
    }
    let ExprKind::BinOp { op, lhs, rhs } = &stripped.kind else {
        return Ok(None);
    };
    let commutative = matches!(op, BinOp::Add | BinOp::Mul);
    if !commutative {
        return Ok(None);
    }
    let (a, b) = match (cell(lhs, loc)?, cell_or_imm(rhs, loc)?) {
        (Some(a), Some(b)) => (a, b),
        _ => match (cell(rhs, loc)?, cell_or_imm(lhs, loc)?) {
            // Commute so the dereference lands in op0
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(None),
        },
    };
    Ok(Some(match op {
        BinOp::Add => ResDesc::Add(a, b),
        BinOp::Mul => ResDesc::Mul(a, b),
        _ => unreachable!(),
    }))
}

/// Placeholder operand for unused slots: `[fp - 1]`
const UNUSED: Cell = Cell {
    register: Register::FP,
    offset: -1,
};

fn apply_res(instruction: &mut Instruction, res: ResDesc) {
    match res {
        ResDesc::Imm(value) => {
            instruction.op1_addr = Op1Addr::Imm;
            instruction.off_op1 = 1;
            instruction.imm = Some(value);
            instruction.res = Res::Op1;
        }
        ResDesc::Cell(c) => {
            instruction.op1_addr = match c.register {
                Register::AP => Op1Addr::AP,
                Register::FP => Op1Addr::FP,
            };
            instruction.off_op1 = c.offset;
            instruction.res = Res::Op1;
        }
        ResDesc::DoubleDeref(base, shift) => {
            instruction.op0_register = base.register;
            instruction.off_op0 = base.offset;
            instruction.op1_addr = Op1Addr::Op0;
            instruction.off_op1 = shift;
            instruction.res = Res::Op1;
        }
        ResDesc::Add(a, b) | ResDesc::Mul(a, b) => {
            instruction.op0_register = a.register;
            instruction.off_op0 = a.offset;
            match b {
                CellOrImm::Cell(c) => {
                    instruction.op1_addr = match c.register {
                        Register::AP => Op1Addr::AP,
                        Register::FP => Op1Addr::FP,
                    };
                    instruction.off_op1 = c.offset;
                }
                CellOrImm::Imm(value) => {
                    instruction.op1_addr = Op1Addr::Imm;
                    instruction.off_op1 = 1;
                    instruction.imm = Some(value);
                }
            }
        }
    }
}

fn blank_instruction() -> Instruction {
    Instruction {
        off_dst: UNUSED.offset,
        off_op0: UNUSED.offset,
        off_op1: UNUSED.offset,
        imm: None,
        dst_register: UNUSED.register,
        op0_register: UNUSED.register,
        op1_addr: Op1Addr::FP,
        res: Res::Op1,
        pc_update: PcUpdate::Regular,
        ap_update: ApUpdate::Regular,
        opcode: Opcode::NOp,
    }
}

/// Build an assert-equal instruction from resolved left/right expressions
pub fn build_assert(
    lhs: &Expr,
    rhs: &Expr,
    ap_inc: bool,
    loc: &Option<Location>,
) -> Result<Instruction> {
    // Normalize subtraction and division by moving the compound across;
    // constant subexpressions fold instead
    for (compound, plain) in [(rhs, lhs), (lhs, rhs)] {
        if as_int(compound).is_some() {
            continue;
        }
        if let ExprKind::BinOp { op, lhs: a, rhs: b } = &strip_casts(compound).kind {
            match op {
                BinOp::Sub => {
                    let sum = Expr::bin(BinOp::Add, plain.clone(), (**b).clone());
                    return build_assert(a, &sum, ap_inc, loc);
                }
                BinOp::Div => {
                    let product = Expr::bin(BinOp::Mul, plain.clone(), (**b).clone());
                    return build_assert(a, &product, ap_inc, loc);
                }
                _ => {}
            }
        }
    }

    let (dst, res) = if let Some(dst) = cell(lhs, loc)? {
        match classify_res(rhs, loc)? {
            Some(res) => (dst, res),
            None => {
                return Err(not_expressible(
                    "right-hand side is not an instruction-expressible operand",
                    loc,
                ))
            }
        }
    } else if let Some(dst) = cell(rhs, loc)? {
        match classify_res(lhs, loc)? {
            Some(res) => (dst, res),
            None => {
                return Err(not_expressible(
                    "left-hand side is not an instruction-expressible operand",
                    loc,
                ))
            }
        }
    } else {
        return Err(not_expressible(
            "one side of an assertion must be a register-relative dereference",
            loc,
        ));
    };

    let mut instruction = blank_instruction();
    instruction.opcode = Opcode::AssertEq;
    instruction.dst_register = dst.register;
    instruction.off_dst = dst.offset;
    let is_mul = matches!(res, ResDesc::Mul(..));
    let is_add = matches!(res, ResDesc::Add(..));
    apply_res(&mut instruction, res);
    if is_add {
        instruction.res = Res::Add;
    } else if is_mul {
        instruction.res = Res::Mul;
    }
    if ap_inc {
        instruction.ap_update = ApUpdate::Add1;
    }
    Ok(instruction)
}

/// Build a jump (or conditional jnz) instruction
pub fn build_jump(
    target: &Expr,
    relative: bool,
    condition: Option<&Expr>,
    loc: &Option<Location>,
) -> Result<Instruction> {
    let mut instruction = blank_instruction();
    let res = classify_res(target, loc)?
        .ok_or_else(|| not_expressible("jump target is not instruction-expressible", loc))?;
    match &res {
        ResDesc::Imm(_) | ResDesc::Cell(_) | ResDesc::DoubleDeref(..) => {}
        _ => {
            return Err(not_expressible(
                "jump target must be an immediate or a dereference",
                loc,
            ))
        }
    }
    apply_res(&mut instruction, res);
    match condition {
        Some(cond) => {
            if !relative {
                return Err(not_expressible(
                    "conditional jumps are always relative",
                    loc,
                ));
            }
            let dst = cell(cond, loc)?.ok_or_else(|| {
                not_expressible("a jump condition must be a register-relative dereference", loc)
            })?;
            instruction.dst_register = dst.register;
            instruction.off_dst = dst.offset;
            instruction.pc_update = PcUpdate::Jnz;
            instruction.res = Res::Unconstrained;
        }
        None => {
            instruction.pc_update = if relative {
                PcUpdate::JumpRel
            } else {
                PcUpdate::Jump
            };
        }
    }
    Ok(instruction)
}

/// Build a call instruction; dst and op0 hold the saved fp and return pc
pub fn build_call(target: &Expr, relative: bool, loc: &Option<Location>) -> Result<Instruction> {
    let mut instruction = blank_instruction();
    let res = classify_res(target, loc)?
        .ok_or_else(|| not_expressible("call target is not instruction-expressible", loc))?;
    match &res {
        ResDesc::Imm(_) | ResDesc::Cell(_) => {}
        _ => {
            return Err(not_expressible(
                "call target must be an immediate or a dereference",
                loc,
            ))
        }
    }
    apply_res(&mut instruction, res);
    instruction.opcode = Opcode::Call;
    instruction.dst_register = Register::AP;
    instruction.off_dst = 0;
    instruction.op0_register = Register::AP;
    instruction.off_op0 = 1;
    instruction.pc_update = if relative {
        PcUpdate::JumpRel
    } else {
        PcUpdate::Jump
    };
    instruction.ap_update = ApUpdate::Add2;
    Ok(instruction)
}

/// Build the return instruction: pc = [fp - 1], fp = [fp - 2]
pub fn build_ret() -> Instruction {
    let mut instruction = blank_instruction();
    instruction.opcode = Opcode::Ret;
    instruction.dst_register = Register::FP;
    instruction.off_dst = -2;
    instruction.op1_addr = Op1Addr::FP;
    instruction.off_op1 = -1;
    instruction.pc_update = PcUpdate::Jump;
    instruction
}

/// Build an ap adjustment instruction
pub fn build_ap_add(amount: &Expr, loc: &Option<Location>) -> Result<Instruction> {
    let mut instruction = blank_instruction();
    let res = classify_res(amount, loc)?
        .ok_or_else(|| not_expressible("ap adjustment is not instruction-expressible", loc))?;
    match &res {
        ResDesc::Imm(_) | ResDesc::Cell(_) | ResDesc::Add(..) => {}
        _ => {
            return Err(not_expressible(
                "ap adjustment must be an immediate, dereference, or addition",
                loc,
            ))
        }
    }
    let is_add = matches!(res, ResDesc::Add(..));
    apply_res(&mut instruction, res);
    if is_add {
        instruction.res = Res::Add;
    }
    instruction.ap_update = ApUpdate::Add;
    Ok(instruction)
}

/// Lower a register-relative statement directly to an instruction.
///
/// This is the re-entry point of the disassembly round trip: formatted
/// instructions parse back to these statement shapes.
pub fn element_to_instruction(element: &CodeElement) -> Result<Instruction> {
    match &element.kind {
        CodeElementKind::AssertEq { lhs, rhs, ap_inc } => {
            build_assert(lhs, rhs, *ap_inc, &element.loc)
        }
        CodeElementKind::JumpToExpr {
            target,
            relative,
            condition,
        } => build_jump(target, *relative, condition.as_ref(), &element.loc),
        CodeElementKind::CallToExpr { target, relative } => {
            build_call(target, *relative, &element.loc)
        }
        CodeElementKind::Ret => Ok(build_ret()),
        CodeElementKind::ApAdd { value } => build_ap_add(value, &element.loc),
        _ => Err(not_expressible(
            "statement requires preprocessing before lowering",
            &element.loc,
        )),
    }
}
