//! # Cairn runtime
//!
//! Execute compiled Cairn programs: a register VM over write-once
//! relocatable memory, builtin co-processors, hint execution, and
//! trace/memory relocation for downstream proving.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cairn_runtime::{run, RunOutput};
//! use cairn_spec::Program;
//!
//! let json = std::fs::read_to_string("program.json").unwrap();
//! let program = Program::from_json(&json).unwrap();
//! let output = run(program).unwrap();
//! println!("steps: {}", output.runner.vm.current_step());
//! ```

pub mod builtins;
pub mod crypto;
pub mod error;
pub mod hints;
pub mod io;
pub mod memory;
pub mod runner;
pub mod segments;
pub mod trace;
pub mod vm;

pub use builtins::BuiltinRunner;
pub use crypto::{compute_hash_chain, HashCapabilities};
pub use error::{HintError, MemoryError, RunnerError, VirtualMachineError, VmException};
pub use hints::{BuiltinHintProcessor, HintProcessor};
pub use memory::Memory;
pub use runner::{CairnRunner, ExecutionResources};
pub use segments::{relocate_value, MemorySegmentManager};
pub use trace::{RelocatedTraceEntry, TraceEntry};
pub use vm::{RunContext, VirtualMachine, VmConfig};

/// A completed run: the runner (with final VM state) plus the hint
/// processor that executed alongside it.
#[derive(Debug)]
pub struct RunOutput {
    pub runner: CairnRunner,
    pub hint_processor: BuiltinHintProcessor,
}

/// Run a program end to end with the default configuration: initialize,
/// execute to the end marker, finalize builtins, and relocate.
pub fn run(program: cairn_spec::Program) -> error::Result<RunOutput> {
    let crypto = HashCapabilities::default();
    let mut runner = CairnRunner::new(program, VmConfig::default(), &crypto)?;
    let end = runner.initialize()?;
    let mut hint_processor = BuiltinHintProcessor::new();
    runner.run_until_pc(end, &mut hint_processor)?;
    runner.end_run()?;
    runner.relocate()?;
    Ok(RunOutput {
        runner,
        hint_processor,
    })
}
