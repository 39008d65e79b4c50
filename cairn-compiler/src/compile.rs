//! Top-level compilation entry points

use crate::ast::Module;
use crate::encoder::encode;
use crate::error::{CompileError, PreprocessorError};
use crate::identifiers::Definition;
use crate::parser::parse_file;
use crate::passes::modules::{MapModuleReader, ModuleReader};
use crate::passes::{PassContext, PassManager};
use cairn_spec::{MaybeRelocatable, Program, ScopedName};

/// The scope a program's main module compiles under
pub const MAIN_SCOPE: &str = "__main__";

/// Compile source text into a program, resolving imports via `reader`
pub fn compile_source(
    file_name: &str,
    source: &str,
    reader: Box<dyn ModuleReader>,
) -> Result<Program, CompileError> {
    let main_scope = ScopedName::from_string(MAIN_SCOPE).expect("main scope is a valid name");
    let elements = parse_file(file_name, source)?;
    let mut ctx = PassContext::new(
        main_scope.clone(),
        Module {
            scope: main_scope.clone(),
            elements,
        },
    );
    let mut manager = PassManager::standard(reader);
    manager.run(&mut ctx)?;

    let mut program = Program::new(main_scope.clone());
    for instruction in &ctx.instructions {
        for word in encode(instruction) {
            program.data.push(MaybeRelocatable::Int(word));
        }
    }
    program.builtins = ctx.builtins.clone();
    program.identifiers = ctx.identifiers.freeze();
    program.hints = ctx.hints.clone();
    program.debug_info = Some(ctx.debug_info.clone());
    program.main = match ctx
        .identifiers
        .get_exact(&main_scope.child("main").expect("valid name"))
    {
        Some(Definition::Function { pc }) => *pc,
        _ => None,
    };
    tracing::debug!(
        data_len = program.data.len(),
        builtins = program.builtins.len(),
        "compilation finished"
    );
    Ok(program)
}

/// Compile a standalone source string with no importable modules
pub fn compile_str(source: &str) -> Result<Program, CompileError> {
    compile_source("main.cairn", source, Box::new(MapModuleReader::new()))
}

/// Compile with a program-main requirement, as runners expect
pub fn compile_main(source: &str) -> Result<Program, CompileError> {
    let program = compile_str(source)?;
    if program.main.is_none() {
        let main_scope = ScopedName::from_string(MAIN_SCOPE).expect("valid name");
        return Err(CompileError::Preprocessor(PreprocessorError::MainNotFound(
            main_scope,
        )));
    }
    Ok(program)
}
