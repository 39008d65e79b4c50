//! Virtual machine
//!
//! A fetch-decode-execute loop over encoded instructions. Registers pc, ap,
//! and fp are relocatable values; memory is the write-once segment map.
//! Hints attached to an instruction run to completion before the
//! instruction executes, and may write memory or allocate segments but
//! never move the registers. Every fault is wrapped with the current pc.

use crate::builtins::BuiltinRunner;
use crate::error::{HintError, MemoryError, VirtualMachineError, VmException};
use crate::hints::HintProcessor;
use crate::segments::MemorySegmentManager;
use crate::trace::TraceEntry;
use cairn_disassembler::decode;
use cairn_spec::{
    ApUpdate, Felt, FpUpdate, HintParams, Instruction, MathError, MaybeRelocatable, Op1Addr,
    Opcode, PcUpdate, Register, Relocatable, Res,
};
use std::collections::HashMap;

/// VM configuration
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Maximum number of steps before halting
    pub max_steps: u64,

    /// Record a trace entry per executed step
    pub enable_trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: 1_000_000,
            enable_trace: true,
        }
    }
}

/// The machine registers
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub pc: Relocatable,
    pub ap: Relocatable,
    pub fp: Relocatable,
}

impl RunContext {
    fn register(&self, register: Register) -> Relocatable {
        match register {
            Register::AP => self.ap,
            Register::FP => self.fp,
        }
    }
}

fn apply_offset(base: Relocatable, offset: i16) -> Result<Relocatable, MathError> {
    if offset >= 0 {
        base.add_usize(offset as usize)
    } else {
        base.sub_usize(-(offset as i32) as usize)
    }
}

/// Add a field element to an address, interpreting values above p/2 as
/// negative (relative jumps encode backward deltas that way).
fn add_signed_felt(base: Relocatable, value: &Felt) -> Result<Relocatable, MathError> {
    let (negative, magnitude) = value.to_signed_biguint();
    let magnitude = Felt::new(magnitude);
    let shift = magnitude
        .to_usize()
        .ok_or_else(|| MathError::OffsetExceeded(base, value.clone()))?;
    if negative {
        base.sub_usize(shift)
    } else {
        base.add_usize(shift)
    }
}

/// Operand values of one instruction
#[derive(Debug)]
struct Operands {
    dst: Option<MaybeRelocatable>,
    op0: Option<MaybeRelocatable>,
    op1: Option<MaybeRelocatable>,
    res: Option<MaybeRelocatable>,
    dst_addr: Relocatable,
    op1_addr: Relocatable,
}

#[derive(Debug)]
pub struct VirtualMachine {
    pub run_context: RunContext,
    pub segments: MemorySegmentManager,
    pub builtin_runners: Vec<BuiltinRunner>,
    config: VmConfig,
    trace: Vec<TraceEntry>,
    current_step: u64,
    instruction_cache: HashMap<Relocatable, Instruction>,
}

impl VirtualMachine {
    pub fn new(config: VmConfig) -> Self {
        let zero = Relocatable::new(0, 0);
        VirtualMachine {
            run_context: RunContext {
                pc: zero,
                ap: zero,
                fp: zero,
            },
            segments: MemorySegmentManager::new(),
            builtin_runners: Vec::new(),
            config,
            trace: Vec::new(),
            current_step: 0,
            instruction_cache: HashMap::new(),
        }
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn max_steps(&self) -> u64 {
        self.config.max_steps
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Execute one step: hints first, then fetch, decode, execute.
    pub fn step(
        &mut self,
        hint_processor: &mut dyn HintProcessor,
        hints: &[HintParams],
    ) -> Result<(), Box<VmException>> {
        let pc = self.run_context.pc;
        self.step_inner(hint_processor, hints)
            .map_err(|inner| Box::new(VmException { pc, inner }))
    }

    fn step_inner(
        &mut self,
        hint_processor: &mut dyn HintProcessor,
        hints: &[HintParams],
    ) -> Result<(), VirtualMachineError> {
        if self.current_step >= self.config.max_steps {
            return Err(VirtualMachineError::StepLimitExceeded(
                self.config.max_steps,
            ));
        }
        if !hints.is_empty() {
            let before = self.run_context;
            for hint in hints {
                hint_processor.execute_hint(self, hint)?;
            }
            let after = self.run_context;
            if before.pc != after.pc || before.ap != after.ap || before.fp != after.fp {
                return Err(HintError::RegistersModified.into());
            }
        }

        if self.config.enable_trace {
            self.trace.push(TraceEntry {
                pc: self.run_context.pc,
                ap: self.run_context.ap,
                fp: self.run_context.fp,
            });
        }

        let instruction = self.fetch()?;
        tracing::trace!(
            step = self.current_step,
            pc = %self.run_context.pc,
            opcode = ?instruction.opcode,
            "executing instruction"
        );
        self.run_instruction(&instruction)?;
        self.current_step += 1;
        Ok(())
    }

    fn fetch(&mut self) -> Result<Instruction, VirtualMachineError> {
        let pc = self.run_context.pc;
        if let Some(cached) = self.instruction_cache.get(&pc) {
            return Ok(cached.clone());
        }
        let word = self.segments.memory.get_int(&pc)?.clone();
        let next = pc
            .add_usize(1)
            .ok()
            .and_then(|addr| self.segments.memory.get(&addr))
            .and_then(|value| match value {
                MaybeRelocatable::Int(v) => Some(v.clone()),
                MaybeRelocatable::RelocatableValue(_) => None,
            });
        let instruction = decode(&word, next.as_ref())?;
        self.instruction_cache.insert(pc, instruction.clone());
        Ok(instruction)
    }

    /// Read a cell, deriving it through the owning builtin when unset
    fn get_or_deduce(
        &mut self,
        addr: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, MemoryError> {
        if let Some(value) = self.segments.memory.get(&addr) {
            return Ok(Some(value.clone()));
        }
        for runner in &self.builtin_runners {
            let Some(base) = runner.base() else { continue };
            if base.segment_index != addr.segment_index {
                continue;
            }
            if let Some(value) = runner.deduce_memory_cell(addr, &self.segments.memory)? {
                self.segments.memory.insert(addr, value.clone())?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn compute_operands(
        &mut self,
        instruction: &Instruction,
    ) -> Result<Operands, VirtualMachineError> {
        let ctx = self.run_context;
        let dst_addr = apply_offset(ctx.register(instruction.dst_register), instruction.off_dst)?;
        let op0_addr = apply_offset(ctx.register(instruction.op0_register), instruction.off_op0)?;

        let mut op0 = self.get_or_deduce(op0_addr)?;
        let op1_addr = match instruction.op1_addr {
            Op1Addr::Imm => ctx.pc.add_usize(1)?,
            Op1Addr::AP => apply_offset(ctx.ap, instruction.off_op1)?,
            Op1Addr::FP => apply_offset(ctx.fp, instruction.off_op1)?,
            Op1Addr::Op0 => {
                let op0_value = op0
                    .as_ref()
                    .ok_or(MemoryError::UnknownMemoryCell(op0_addr))?;
                apply_offset(op0_value.get_relocatable()?, instruction.off_op1)?
            }
        };
        let mut op1 = self.get_or_deduce(op1_addr)?;
        let dst = self.segments.memory.get(&dst_addr).cloned();

        // Deduce missing operands where the opcode constrains them
        if op0.is_none() {
            if let Some(value) = deduce_op0(instruction, &ctx, &dst, &op1) {
                self.segments.memory.insert(op0_addr, value.clone())?;
                op0 = Some(value);
            }
        }
        if op1.is_none() {
            if let Some(value) = deduce_op1(instruction, &dst, &op0) {
                self.segments.memory.insert(op1_addr, value.clone())?;
                op1 = Some(value);
            }
        }

        let res = compute_res(instruction, &op0, &op1)?;
        Ok(Operands {
            dst,
            op0,
            op1,
            res,
            dst_addr,
            op1_addr,
        })
    }

    fn run_instruction(
        &mut self,
        instruction: &Instruction,
    ) -> Result<(), VirtualMachineError> {
        let mut operands = self.compute_operands(instruction)?;
        let ctx = self.run_context;

        // Opcode assertions constrain memory through write-once inserts
        match instruction.opcode {
            Opcode::AssertEq => {
                let res = operands
                    .res
                    .clone()
                    .ok_or(VirtualMachineError::UnconstrainedResAssert)?;
                match &operands.dst {
                    Some(dst) => {
                        if dst != &res {
                            return Err(VirtualMachineError::DiffAssertValues {
                                dst: dst.clone(),
                                res,
                            });
                        }
                    }
                    None => {
                        self.segments.memory.insert(operands.dst_addr, res.clone())?;
                        operands.dst = Some(res);
                    }
                }
            }
            Opcode::Call => {
                let return_pc =
                    MaybeRelocatable::from(ctx.pc.add_usize(instruction.size())?);
                if let Some(op0) = &operands.op0 {
                    if op0 != &return_pc {
                        return Err(VirtualMachineError::CantWriteReturnPc {
                            existing: op0.clone(),
                            expected: return_pc,
                        });
                    }
                }
                let saved_fp = MaybeRelocatable::from(ctx.fp);
                match &operands.dst {
                    Some(dst) => {
                        if dst != &saved_fp {
                            return Err(VirtualMachineError::DiffAssertValues {
                                dst: dst.clone(),
                                res: saved_fp,
                            });
                        }
                    }
                    None => {
                        self.segments
                            .memory
                            .insert(operands.dst_addr, saved_fp.clone())?;
                        operands.dst = Some(saved_fp);
                    }
                }
            }
            Opcode::Ret | Opcode::NOp => {}
        }

        // Register updates, all computed from the pre-step context
        let new_fp = match instruction.fp_update() {
            FpUpdate::Regular => ctx.fp,
            FpUpdate::ApPlus2 => ctx.ap.add_usize(2)?,
            FpUpdate::Dst => {
                let dst = operands
                    .dst
                    .as_ref()
                    .ok_or(MemoryError::UnknownMemoryCell(operands.dst_addr))?;
                dst.get_relocatable()?
            }
        };

        let new_ap = match instruction.ap_update {
            ApUpdate::Regular => ctx.ap,
            ApUpdate::Add1 => ctx.ap.add_usize(1)?,
            ApUpdate::Add2 => ctx.ap.add_usize(2)?,
            ApUpdate::Add => {
                let res = operands
                    .res
                    .as_ref()
                    .ok_or(VirtualMachineError::UnconstrainedResAssert)?;
                ctx.ap.add_felt(res.get_int()?)?
            }
        };

        let new_pc = match instruction.pc_update {
            PcUpdate::Regular => ctx.pc.add_usize(instruction.size())?,
            PcUpdate::Jump => {
                let res = operands
                    .res
                    .as_ref()
                    .ok_or(VirtualMachineError::UnconstrainedResAssert)?;
                match res {
                    MaybeRelocatable::RelocatableValue(target) => *target,
                    MaybeRelocatable::Int(value) => {
                        if instruction.opcode == Opcode::Ret {
                            return Err(VirtualMachineError::RetPcNotRelocatable);
                        }
                        return Err(VirtualMachineError::JumpToInt(value.clone()));
                    }
                }
            }
            PcUpdate::JumpRel => {
                let res = operands
                    .res
                    .as_ref()
                    .ok_or(VirtualMachineError::UnconstrainedResAssert)?;
                add_signed_felt(ctx.pc, res.get_int()?)?
            }
            PcUpdate::Jnz => {
                let dst = operands
                    .dst
                    .as_ref()
                    .ok_or(MemoryError::UnknownMemoryCell(operands.dst_addr))?;
                let taken = match dst {
                    MaybeRelocatable::Int(value) => !value.is_zero(),
                    MaybeRelocatable::RelocatableValue(_) => true,
                };
                if taken {
                    let op1 = operands
                        .op1
                        .as_ref()
                        .ok_or(MemoryError::UnknownMemoryCell(operands.op1_addr))?;
                    add_signed_felt(ctx.pc, op1.get_int()?)?
                } else {
                    ctx.pc.add_usize(instruction.size())?
                }
            }
        };

        self.run_context = RunContext {
            pc: new_pc,
            ap: new_ap,
            fp: new_fp,
        };
        Ok(())
    }
}

fn deduce_op0(
    instruction: &Instruction,
    ctx: &RunContext,
    dst: &Option<MaybeRelocatable>,
    op1: &Option<MaybeRelocatable>,
) -> Option<MaybeRelocatable> {
    match instruction.opcode {
        Opcode::Call => Some(MaybeRelocatable::from(
            ctx.pc.add_usize(instruction.size()).ok()?,
        )),
        Opcode::AssertEq => {
            let (dst, op1) = (dst.as_ref()?, op1.as_ref()?);
            match instruction.res {
                Res::Add => dst.sub(op1).ok(),
                Res::Mul => {
                    let dst = dst.get_int().ok()?;
                    let op1 = op1.get_int().ok()?;
                    dst.field_div(op1).map(MaybeRelocatable::Int)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn deduce_op1(
    instruction: &Instruction,
    dst: &Option<MaybeRelocatable>,
    op0: &Option<MaybeRelocatable>,
) -> Option<MaybeRelocatable> {
    if instruction.opcode != Opcode::AssertEq {
        return None;
    }
    match instruction.res {
        Res::Op1 => dst.clone(),
        Res::Add => {
            let (dst, op0) = (dst.as_ref()?, op0.as_ref()?);
            dst.sub(op0).ok()
        }
        Res::Mul => {
            let dst = dst.as_ref()?.get_int().ok()?;
            let op0 = op0.as_ref()?.get_int().ok()?;
            dst.field_div(op0).map(MaybeRelocatable::Int)
        }
        Res::Unconstrained => None,
    }
}

fn compute_res(
    instruction: &Instruction,
    op0: &Option<MaybeRelocatable>,
    op1: &Option<MaybeRelocatable>,
) -> Result<Option<MaybeRelocatable>, VirtualMachineError> {
    Ok(match instruction.res {
        Res::Op1 => op1.clone(),
        Res::Add => match (op0, op1) {
            (Some(op0), Some(op1)) => Some(op0.add(op1)?),
            _ => None,
        },
        Res::Mul => match (op0, op1) {
            (Some(op0), Some(op1)) => Some(op0.mul(op1)?),
            _ => None,
        },
        Res::Unconstrained => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::BuiltinHintProcessor;

    fn assert_imm_instruction(imm: u64) -> Instruction {
        // [ap] = imm; ap++
        Instruction {
            off_dst: 0,
            off_op0: -1,
            off_op1: 1,
            imm: Some(Felt::from(imm)),
            dst_register: Register::AP,
            op0_register: Register::FP,
            op1_addr: Op1Addr::Imm,
            res: Res::Op1,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Add1,
            opcode: Opcode::AssertEq,
        }
    }

    fn vm_with_program(instructions: &[Instruction]) -> VirtualMachine {
        let mut vm = VirtualMachine::new(VmConfig::default());
        let program = vm.segments.add();
        let execution = vm.segments.add();
        let mut words = Vec::new();
        for instruction in instructions {
            for word in cairn_compiler::encode(instruction) {
                words.push(MaybeRelocatable::Int(word));
            }
        }
        vm.segments.load_data(program, &words).unwrap();
        vm.run_context = RunContext {
            pc: program,
            ap: execution,
            fp: execution,
        };
        vm
    }

    #[test]
    fn test_assert_imm_writes_and_advances() {
        let mut vm = vm_with_program(&[assert_imm_instruction(25)]);
        let mut hp = BuiltinHintProcessor::new();
        vm.step(&mut hp, &[]).unwrap();
        assert_eq!(vm.run_context.pc, Relocatable::new(0, 2));
        assert_eq!(vm.run_context.ap, Relocatable::new(1, 1));
        assert_eq!(
            vm.segments.memory.get_int(&Relocatable::new(1, 0)).unwrap(),
            &Felt::from(25u64)
        );
        assert_eq!(vm.current_step(), 1);
        assert_eq!(vm.trace().len(), 1);
    }

    #[test]
    fn test_conflicting_assert_fails_with_pc() {
        let mut vm = vm_with_program(&[assert_imm_instruction(25)]);
        vm.segments
            .memory
            .insert(
                Relocatable::new(1, 0),
                MaybeRelocatable::from(Felt::from(7u64)),
            )
            .unwrap();
        let mut hp = BuiltinHintProcessor::new();
        let err = vm.step(&mut hp, &[]).unwrap_err();
        assert_eq!(err.pc, Relocatable::new(0, 0));
        assert!(matches!(
            err.inner,
            VirtualMachineError::DiffAssertValues { .. }
        ));
    }

    #[test]
    fn test_step_limit() {
        let mut vm = vm_with_program(&[assert_imm_instruction(1)]);
        vm.config.max_steps = 0;
        let mut hp = BuiltinHintProcessor::new();
        let err = vm.step(&mut hp, &[]).unwrap_err();
        assert!(matches!(
            err.inner,
            VirtualMachineError::StepLimitExceeded(0)
        ));
    }

    #[test]
    fn test_signed_pc_shift() {
        let base = Relocatable::new(0, 10);
        assert_eq!(
            add_signed_felt(base, &Felt::from(3u64)).unwrap(),
            Relocatable::new(0, 13)
        );
        assert_eq!(
            add_signed_felt(base, &Felt::from(-4i64)).unwrap(),
            Relocatable::new(0, 6)
        );
        assert!(add_signed_felt(base, &Felt::from(-11i64)).is_err());
    }
}
