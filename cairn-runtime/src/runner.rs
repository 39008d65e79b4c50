//! Run orchestration
//!
//! The runner owns a program and a VM: it lays out the segments (program,
//! execution, one per declared builtin), builds the initial stack, runs to
//! the configured end address, finalizes builtin segments, and relocates
//! memory and trace into the flat address space.

use crate::builtins::BuiltinRunner;
use crate::crypto::HashCapabilities;
use crate::error::{Result, RunnerError};
use crate::hints::HintProcessor;
use crate::trace::{relocate_trace, RelocatedTraceEntry};
use crate::vm::{RunContext, VirtualMachine, VmConfig};
use cairn_spec::{Felt, MaybeRelocatable, Program, Relocatable};
use serde_json::json;
use std::collections::BTreeMap;

/// Step count and per-builtin usage of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResources {
    pub n_steps: u64,
    pub builtin_instance_counter: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct CairnRunner {
    pub program: Program,
    pub vm: VirtualMachine,
    program_base: Option<Relocatable>,
    execution_base: Option<Relocatable>,
    final_pc: Option<Relocatable>,
    relocation_table: Option<Vec<usize>>,
}

impl CairnRunner {
    pub fn new(
        program: Program,
        config: VmConfig,
        crypto: &HashCapabilities,
    ) -> Result<Self> {
        program.validate()?;
        let mut vm = VirtualMachine::new(config);
        for name in &program.builtins {
            vm.builtin_runners
                .push(BuiltinRunner::for_name(*name, crypto));
        }
        Ok(CairnRunner {
            program,
            vm,
            program_base: None,
            execution_base: None,
            final_pc: None,
            relocation_table: None,
        })
    }

    /// Lay out segments, load the program, build the initial stack, and set
    /// the registers. Returns the end address execution runs until.
    pub fn initialize(&mut self) -> Result<Relocatable> {
        let main = self.program.main.ok_or(RunnerError::MissingMain)?;

        let program_base = self.vm.segments.add();
        let execution_base = self.vm.segments.add();
        self.program_base = Some(program_base);
        self.execution_base = Some(execution_base);

        let mut builtin_runners = std::mem::take(&mut self.vm.builtin_runners);
        for runner in &mut builtin_runners {
            runner.initialize_segments(&mut self.vm.segments);
            runner.add_validation_rules(&mut self.vm.segments.memory)?;
        }
        self.vm.builtin_runners = builtin_runners;

        self.vm
            .segments
            .load_data(program_base, &self.program.data)?;

        // Initial stack: builtin base pointers, then the dummy return frame
        // and the end marker, each in its own fresh segment.
        let mut stack: Vec<MaybeRelocatable> = self
            .vm
            .builtin_runners
            .iter()
            .flat_map(|runner| runner.initial_stack())
            .collect();
        let return_fp = self.vm.segments.add();
        let end = self.vm.segments.add();
        stack.push(MaybeRelocatable::from(return_fp));
        stack.push(MaybeRelocatable::from(end));
        let stack_len = stack.len();
        self.vm.segments.load_data(execution_base, &stack)?;

        let initial_ap = execution_base.add_usize(stack_len)?;
        self.vm.run_context = RunContext {
            pc: program_base.add_usize(main)?,
            ap: initial_ap,
            fp: initial_ap,
        };
        self.final_pc = Some(end);
        tracing::debug!(
            main_pc = main,
            stack_len,
            builtins = self.vm.builtin_runners.len(),
            "runner initialized"
        );
        Ok(end)
    }

    /// Execute until pc reaches `end` (or the step budget is exhausted)
    pub fn run_until_pc(
        &mut self,
        end: Relocatable,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<()> {
        let program_segment = self
            .program_base
            .ok_or(RunnerError::NotInitialized)?
            .segment_index;
        while self.vm.run_context.pc != end {
            let pc = self.vm.run_context.pc;
            let hints = if pc.segment_index == program_segment {
                self.program
                    .hints
                    .get(&pc.offset)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
            } else {
                &[]
            };
            self.vm.step(hint_processor, hints)?;
        }
        Ok(())
    }

    /// Finalize builtin segments and record effective segment sizes
    pub fn end_run(&mut self) -> Result<()> {
        let mut builtin_runners = std::mem::take(&mut self.vm.builtin_runners);
        let result = builtin_runners
            .iter()
            .try_for_each(|runner| runner.finalize_segments(&mut self.vm.segments));
        self.vm.builtin_runners = builtin_runners;
        result?;
        self.vm.segments.compute_effective_sizes();
        Ok(())
    }

    /// Assign flat base offsets to every segment
    pub fn relocate(&mut self) -> Result<()> {
        let table = self.vm.segments.relocate_segments()?;
        self.relocation_table = Some(table);
        Ok(())
    }

    fn relocation_table(&self) -> Result<&Vec<usize>> {
        self.relocation_table
            .as_ref()
            .ok_or(RunnerError::TraceNotRelocatable)
    }

    /// The flat address -> value view of the final memory
    pub fn relocated_memory(&self) -> Result<BTreeMap<usize, Felt>> {
        let table = self.relocation_table()?;
        Ok(self.vm.segments.relocate_memory(table)?)
    }

    /// The trace in flat address space
    pub fn relocated_trace(&self) -> Result<Vec<RelocatedTraceEntry>> {
        let table = self.relocation_table()?;
        Ok(relocate_trace(self.vm.trace(), table)?)
    }

    /// Values written to the output builtin's segment, in order
    pub fn get_output(&self) -> Result<Vec<Felt>> {
        let Some(runner) = self
            .vm
            .builtin_runners
            .iter()
            .find(|runner| matches!(runner, BuiltinRunner::Output(_)))
        else {
            return Ok(Vec::new());
        };
        let base = runner
            .base()
            .ok_or(RunnerError::NotInitialized)?;
        let used = self
            .vm
            .segments
            .memory
            .segment_used_size(base.segment_index)
            .unwrap_or(0);
        let mut output = Vec::with_capacity(used);
        for offset in 0..used {
            let addr = base.add_usize(offset).map_err(crate::error::MemoryError::from)?;
            output.push(self.vm.segments.memory.get_int(&addr)?.clone());
        }
        Ok(output)
    }

    /// Step count plus per-builtin instance counts
    pub fn get_execution_resources(&self) -> Result<ExecutionResources> {
        let mut builtin_instance_counter = BTreeMap::new();
        for runner in &self.vm.builtin_runners {
            builtin_instance_counter.insert(
                runner.name().as_str().to_string(),
                runner.get_used_instances(&self.vm.segments)?,
            );
        }
        Ok(ExecutionResources {
            n_steps: self.vm.current_step(),
            builtin_instance_counter,
        })
    }

    /// Auxiliary per-sample data keyed by builtin name: every
    /// `sample_ratio`-th step's (step, pc, fp), for downstream air tooling.
    pub fn air_private_input(&self, sample_ratio: usize) -> serde_json::Value {
        let samples: Vec<serde_json::Value> = self
            .vm
            .trace()
            .iter()
            .enumerate()
            .filter(|(step, _)| sample_ratio > 0 && step % sample_ratio == 0)
            .map(|(step, entry)| {
                json!({
                    "step": step,
                    "pc": entry.pc.offset,
                    "fp": entry.fp.offset,
                })
            })
            .collect();
        let mut out = serde_json::Map::new();
        for runner in &self.vm.builtin_runners {
            out.insert(
                runner.name().as_str().to_string(),
                serde_json::Value::Array(samples.clone()),
            );
        }
        serde_json::Value::Object(out)
    }

    /// The end address configured by `initialize`
    pub fn final_pc(&self) -> Option<Relocatable> {
        self.final_pc
    }

    /// Read a cell relative to the final ap, for inspecting results
    pub fn read_ap_cell(&self, offset_back: usize) -> Result<MaybeRelocatable> {
        let addr = self
            .vm
            .run_context
            .ap
            .sub_usize(offset_back)
            .map_err(crate::error::MemoryError::from)?;
        self.vm
            .segments
            .memory
            .get(&addr)
            .cloned()
            .ok_or_else(|| crate::error::MemoryError::UnknownMemoryCell(addr).into())
    }
}
