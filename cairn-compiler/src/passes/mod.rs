//! Preprocessor pass pipeline
//!
//! A [`PassManager`] executes an ordered list of named stages over a shared
//! [`PassContext`]. Each stage consumes the current context, may add or
//! transform modules and identifiers, and must leave the context internally
//! consistent for the next stage.

pub mod bool_lowering;
pub mod codegen;
pub mod directives;
pub mod identifier_collector;
pub mod modules;
pub mod unique_labels;

use crate::ast::Module;
use crate::error::PreprocessorError;
use crate::identifiers::IdentifierManager;
use crate::unique_names::UniqueNameProvider;
use cairn_spec::program::{DebugInfo, HintParams};
use cairn_spec::{BuiltinName, Instruction, ScopedName};
use std::collections::BTreeMap;

/// Shared mutable state threaded through the stages
#[derive(Debug)]
pub struct PassContext {
    /// Scope the main module compiles under
    pub main_scope: ScopedName,
    /// Accumulated modules; module collection appends imported ones
    pub modules: Vec<Module>,
    pub identifiers: IdentifierManager,
    /// Builtins declared by the single allowed directive, in order
    pub builtins: Vec<BuiltinName>,
    pub builtins_declared: bool,
    /// Generated-name counter shared across label/function/variable kinds
    pub names: UniqueNameProvider,
    // Code generation output
    pub instructions: Vec<Instruction>,
    pub hints: BTreeMap<usize, Vec<HintParams>>,
    pub debug_info: DebugInfo,
}

impl PassContext {
    pub fn new(main_scope: ScopedName, main_module: Module) -> Self {
        PassContext {
            main_scope,
            modules: vec![main_module],
            identifiers: IdentifierManager::new(),
            builtins: Vec::new(),
            builtins_declared: false,
            names: UniqueNameProvider::new(),
            instructions: Vec::new(),
            hints: BTreeMap::new(),
            debug_info: DebugInfo::default(),
        }
    }
}

/// One named preprocessing stage
pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError>;
}

/// Runs stages in order, stopping at the first error
pub struct PassManager {
    stages: Vec<Box<dyn Stage>>,
}

impl PassManager {
    pub fn empty() -> Self {
        PassManager { stages: Vec::new() }
    }

    /// The canonical pipeline: module collection, directive collection,
    /// identifier collection, boolean lowering, unique-label assignment,
    /// code generation (which resolves types and flow as it lowers).
    pub fn standard(reader: Box<dyn modules::ModuleReader>) -> Self {
        let mut manager = PassManager::empty();
        manager.add_stage(Box::new(modules::ModuleCollector::new(reader)));
        manager.add_stage(Box::new(directives::DirectiveCollector));
        manager.add_stage(Box::new(identifier_collector::IdentifierCollector));
        manager.add_stage(Box::new(bool_lowering::BoolLowering));
        manager.add_stage(Box::new(unique_labels::UniqueLabelAssigner));
        manager.add_stage(Box::new(codegen::CodeGeneratorStage));
        manager
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        for stage in &mut self.stages {
            tracing::debug!(stage = stage.name(), "running preprocessor stage");
            stage.run(ctx)?;
        }
        Ok(())
    }
}
