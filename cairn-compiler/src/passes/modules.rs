//! Module collection
//!
//! Resolves `from X import Y` directives by locating and parsing the
//! referenced modules through a [`ModuleReader`] capability, merging their
//! ASTs into the compilation unit. Duplicate loads are shared; cyclic loads
//! are a compile error.

use crate::ast::{CodeElementKind, Module};
use crate::error::PreprocessorError;
use crate::parser::parse_file;
use crate::passes::{PassContext, Stage};
use cairn_spec::ScopedName;
use std::collections::{HashMap, HashSet};

/// Maps a dotted module name to its source text
pub trait ModuleReader {
    fn read(&self, module: &ScopedName) -> Option<String>;
}

/// In-memory reader, used by tests and embedders
#[derive(Debug, Clone, Default)]
pub struct MapModuleReader {
    sources: HashMap<String, String>,
}

impl MapModuleReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: &str, source: &str) {
        self.sources.insert(module.to_string(), source.to_string());
    }
}

impl ModuleReader for MapModuleReader {
    fn read(&self, module: &ScopedName) -> Option<String> {
        self.sources.get(&module.to_string()).cloned()
    }
}

/// Reads modules from `.cairn` files under a root directory, mapping dots to
/// path separators.
#[derive(Debug, Clone)]
pub struct DirModuleReader {
    root: std::path::PathBuf,
}

impl DirModuleReader {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        DirModuleReader { root: root.into() }
    }
}

impl ModuleReader for DirModuleReader {
    fn read(&self, module: &ScopedName) -> Option<String> {
        let mut path = self.root.clone();
        for segment in module.segments() {
            path.push(segment);
        }
        path.set_extension("cairn");
        std::fs::read_to_string(path).ok()
    }
}

pub struct ModuleCollector {
    reader: Box<dyn ModuleReader>,
}

impl ModuleCollector {
    pub fn new(reader: Box<dyn ModuleReader>) -> Self {
        ModuleCollector { reader }
    }

    fn load(
        &self,
        module: &ScopedName,
        ctx: &mut PassContext,
        loaded: &mut HashSet<ScopedName>,
        in_progress: &mut Vec<ScopedName>,
    ) -> Result<(), PreprocessorError> {
        if loaded.contains(module) {
            return Ok(());
        }
        if in_progress.contains(module) {
            return Err(PreprocessorError::CyclicImport {
                module: module.clone(),
            });
        }
        let source = self
            .reader
            .read(module)
            .ok_or_else(|| PreprocessorError::ModuleNotFound {
                module: module.clone(),
            })?;
        let file_name = format!("{module}.cairn");
        let elements = parse_file(&file_name, &source).map_err(|err| {
            PreprocessorError::ModuleParse {
                module: module.clone(),
                message: err.to_string(),
            }
        })?;

        in_progress.push(module.clone());
        let imports = collect_imports(&elements);
        for import in &imports {
            self.load(import, ctx, loaded, in_progress)?;
        }
        in_progress.pop();

        loaded.insert(module.clone());
        ctx.modules.push(Module {
            scope: module.clone(),
            elements,
        });
        Ok(())
    }
}

fn collect_imports(elements: &[crate::ast::CodeElement]) -> Vec<ScopedName> {
    let mut imports = Vec::new();
    for element in elements {
        if let CodeElementKind::Import { module, .. } = &element.kind {
            imports.push(module.clone());
        }
    }
    imports
}

impl Stage for ModuleCollector {
    fn name(&self) -> &'static str {
        "module_collector"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        let mut loaded: HashSet<ScopedName> =
            ctx.modules.iter().map(|m| m.scope.clone()).collect();
        let mut in_progress = Vec::new();
        let roots: Vec<ScopedName> = ctx
            .modules
            .iter()
            .flat_map(|m| collect_imports(&m.elements))
            .collect();
        for module in roots {
            self.load(&module, ctx, &mut loaded, &mut in_progress)?;
        }
        Ok(())
    }
}
