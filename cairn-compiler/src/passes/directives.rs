//! Directive collection
//!
//! Gathers the single allowed `%builtins` directive across the compilation
//! unit. A second directive, a duplicate builtin name, or an unknown builtin
//! name is a compile error.

use crate::ast::CodeElementKind;
use crate::error::PreprocessorError;
use crate::passes::{PassContext, Stage};
use cairn_spec::BuiltinName;
use std::collections::HashSet;

pub struct DirectiveCollector;

impl Stage for DirectiveCollector {
    fn name(&self) -> &'static str {
        "directive_collector"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        for module in &ctx.modules {
            for element in &module.elements {
                let CodeElementKind::BuiltinsDirective { builtins } = &element.kind else {
                    continue;
                };
                if ctx.builtins_declared {
                    return Err(PreprocessorError::DuplicateBuiltinsDirective {
                        location: element.loc.clone(),
                    });
                }
                let mut seen = HashSet::new();
                let mut parsed = Vec::new();
                for name in builtins {
                    if !seen.insert(name.clone()) {
                        return Err(PreprocessorError::DuplicateBuiltin {
                            name: name.clone(),
                            location: element.loc.clone(),
                        });
                    }
                    let builtin = BuiltinName::from_str_name(name).ok_or_else(|| {
                        PreprocessorError::UnknownBuiltin {
                            name: name.clone(),
                            location: element.loc.clone(),
                        }
                    })?;
                    parsed.push(builtin);
                }
                ctx.builtins = parsed;
                ctx.builtins_declared = true;
            }
        }
        Ok(())
    }
}
