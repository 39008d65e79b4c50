//! Boolean-expression lowering
//!
//! Rewrites `and`-chained `if` conditions into nested single-condition `if`
//! blocks, one chain level per nesting. An `and` chain combined with an
//! `else` clause is explicitly unsupported.

use crate::ast::{BoolExpr, CodeElement, CodeElementKind};
use crate::error::PreprocessorError;
use crate::passes::{PassContext, Stage};

pub struct BoolLowering;

fn lower_elements(elements: Vec<CodeElement>) -> Result<Vec<CodeElement>, PreprocessorError> {
    elements.into_iter().map(lower_element).collect()
}

fn lower_element(element: CodeElement) -> Result<CodeElement, PreprocessorError> {
    let loc = element.loc.clone();
    let kind = match element.kind {
        CodeElementKind::If {
            condition,
            body,
            else_body,
            label_neq,
            label_end,
        } => {
            let body = lower_elements(body)?;
            let else_body = else_body.map(lower_elements).transpose()?;
            if condition.atoms.len() > 1 {
                if else_body.is_some() {
                    return Err(PreprocessorError::AndWithElse { location: loc });
                }
                let mut atoms = condition.atoms;
                // Innermost if carries the last atom and the original body
                let mut inner = CodeElement::new(
                    CodeElementKind::If {
                        condition: BoolExpr {
                            atoms: vec![atoms.pop().expect("chain has at least two atoms")],
                        },
                        body,
                        else_body: None,
                        label_neq: None,
                        label_end: None,
                    },
                    element.loc.clone(),
                );
                while let Some(atom) = atoms.pop() {
                    inner = CodeElement::new(
                        CodeElementKind::If {
                            condition: BoolExpr { atoms: vec![atom] },
                            body: vec![inner],
                            else_body: None,
                            label_neq: None,
                            label_end: None,
                        },
                        element.loc.clone(),
                    );
                }
                return Ok(inner);
            }
            CodeElementKind::If {
                condition,
                body,
                else_body,
                label_neq,
                label_end,
            }
        }
        CodeElementKind::Func {
            name,
            args,
            rets,
            body,
        } => CodeElementKind::Func {
            name,
            args,
            rets,
            body: lower_elements(body)?,
        },
        CodeElementKind::NamespaceDef { name, body } => CodeElementKind::NamespaceDef {
            name,
            body: lower_elements(body)?,
        },
        other => other,
    };
    Ok(CodeElement::new(kind, loc))
}

impl Stage for BoolLowering {
    fn name(&self) -> &'static str {
        "bool_lowering"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        let modules = std::mem::take(&mut ctx.modules);
        let mut lowered = Vec::with_capacity(modules.len());
        for mut module in modules {
            module.elements = lower_elements(module.elements)?;
            lowered.push(module);
        }
        ctx.modules = lowered;
        Ok(())
    }
}
