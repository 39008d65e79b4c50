//! Unique-label assignment
//!
//! Every `if` block needs two fresh control-flow labels: the not-equal branch
//! target and the end-of-block target. Labels are drawn from the single
//! global counter shared with all generated names and registered in the
//! enclosing scope, so jumps emitted during code generation resolve.

use crate::ast::{CodeElement, CodeElementKind};
use crate::error::PreprocessorError;
use crate::identifiers::{Definition, IdentifierManager};
use crate::passes::{PassContext, Stage};
use crate::unique_names::{NameKind, UniqueNameProvider};
use cairn_spec::ScopedName;

pub struct UniqueLabelAssigner;

fn assign(
    scope: &ScopedName,
    elements: &mut [CodeElement],
    names: &mut UniqueNameProvider,
    ids: &mut IdentifierManager,
) -> Result<(), PreprocessorError> {
    for element in elements {
        match &mut element.kind {
            CodeElementKind::If {
                body,
                else_body,
                label_neq,
                label_end,
                ..
            } => {
                let neq = names.next(NameKind::Label);
                let end = names.next(NameKind::Label);
                ids.add(
                    scope.child(&neq).expect("generated names are valid segments"),
                    Definition::Label(None),
                )?;
                ids.add(
                    scope.child(&end).expect("generated names are valid segments"),
                    Definition::Label(None),
                )?;
                *label_neq = Some(neq);
                *label_end = Some(end);
                assign(scope, body, names, ids)?;
                if let Some(else_body) = else_body {
                    assign(scope, else_body, names, ids)?;
                }
            }
            CodeElementKind::Func { name, body, .. } => {
                let inner = scope.child(name).expect("parser-validated name");
                assign(&inner, body, names, ids)?;
            }
            CodeElementKind::NamespaceDef { name, body } => {
                let inner = scope.child(name).expect("parser-validated name");
                assign(&inner, body, names, ids)?;
            }
            _ => {}
        }
    }
    Ok(())
}

impl Stage for UniqueLabelAssigner {
    fn name(&self) -> &'static str {
        "unique_label_assigner"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        let mut modules = std::mem::take(&mut ctx.modules);
        let mut result = Ok(());
        for module in &mut modules {
            result = assign(
                &module.scope,
                &mut module.elements,
                &mut ctx.names,
                &mut ctx.identifiers,
            );
            if result.is_err() {
                break;
            }
        }
        ctx.modules = modules;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Module;
    use crate::parser::parse_file;
    use crate::unique_names::UniqueNameProvider;

    #[test]
    fn test_if_gets_two_labels_from_shared_counter() {
        let scope = ScopedName::from_string("__main__").unwrap();
        let source = "func f():\n    if [ap] == 0:\n        ret\n    end\n    ret\nend\n";
        let elements = parse_file("main.cairn", source).unwrap();
        let mut ctx = PassContext::new(scope.clone(), Module { scope, elements });
        UniqueLabelAssigner.run(&mut ctx).unwrap();

        let CodeElementKind::Func { body, .. } = &ctx.modules[0].elements[0].kind else {
            panic!("expected func");
        };
        let CodeElementKind::If {
            label_neq,
            label_end,
            ..
        } = &body[0].kind
        else {
            panic!("expected if");
        };
        let neq = label_neq.as_ref().unwrap();
        let end = label_end.as_ref().unwrap();
        assert!(UniqueNameProvider::is_generated(neq));
        assert!(UniqueNameProvider::is_generated(end));
        assert_ne!(neq, end);

        // Registered in the function scope
        let full = ScopedName::from_string("__main__.f")
            .unwrap()
            .child(neq)
            .unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&full),
            Some(&Definition::Label(None))
        );
    }
}
