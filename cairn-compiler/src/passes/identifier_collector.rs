//! Identifier collection
//!
//! Walks declarations, registering each name into its lexical scope:
//! constants (evaluated eagerly, in declaration order), functions, structs
//! with member offsets, namespaces, labels, and import aliases. Redefining a
//! name in the same scope is a compile error.

use crate::ast::{CodeElement, CodeElementKind, Expr, ExprKind};
use crate::error::PreprocessorError;
use crate::identifiers::{Definition, IdentifierManager, ResolvedMember, StructMember};
use crate::passes::{PassContext, Stage};
use cairn_spec::{Felt, Location, ScopedName};

/// Re-attach a source location to a redefinition error raised by the table
fn locate(err: PreprocessorError, loc: &Option<Location>) -> PreprocessorError {
    match err {
        PreprocessorError::Redefinition {
            name,
            location: None,
        } => PreprocessorError::Redefinition {
            name,
            location: loc.clone(),
        },
        other => other,
    }
}

/// Evaluate a compile-time constant expression. Identifiers may refer to
/// other constants, struct member offsets, or the `SIZE` pseudo-member.
pub fn eval_const_expr(
    expr: &Expr,
    scope: &ScopedName,
    ids: &IdentifierManager,
) -> Result<Felt, PreprocessorError> {
    let fail = || PreprocessorError::ExpectedConstant {
        location: expr.loc.clone(),
    };
    match &expr.kind {
        ExprKind::Int(value) => Ok(value.clone()),
        ExprKind::Neg(inner) => Ok(-eval_const_expr(inner, scope, ids)?),
        ExprKind::BinOp { op, lhs, rhs } => {
            let a = eval_const_expr(lhs, scope, ids)?;
            let b = eval_const_expr(rhs, scope, ids)?;
            match op {
                crate::ast::BinOp::Add => Ok(a + b),
                crate::ast::BinOp::Sub => Ok(a - b),
                crate::ast::BinOp::Mul => Ok(a * b),
                crate::ast::BinOp::Div => a.field_div(&b).ok_or_else(fail),
            }
        }
        ExprKind::Ident(name) => {
            let result = ids.search(scope, name)?;
            match &result.definition {
                Definition::Const(value) if result.member_path.is_empty() => Ok(value.clone()),
                Definition::Struct { members, size } if !result.member_path.is_empty() => {
                    let resolved = ids.resolve_struct_member(
                        &result.canonical_name,
                        members,
                        *size,
                        &result.member_path,
                    )?;
                    match resolved {
                        ResolvedMember::Size(value) => Ok(value),
                        ResolvedMember::Member { offset, .. } => Ok(Felt::from(offset)),
                    }
                }
                _ => Err(fail()),
            }
        }
        _ => Err(fail()),
    }
}

pub struct IdentifierCollector;

impl IdentifierCollector {
    fn collect(
        &self,
        scope: &ScopedName,
        elements: &[CodeElement],
        ids: &mut IdentifierManager,
    ) -> Result<(), PreprocessorError> {
        for element in elements {
            let loc = &element.loc;
            match &element.kind {
                CodeElementKind::Const { name, value } => {
                    let value = eval_const_expr(value, scope, ids)?;
                    let full = scope.child(name).expect("parser-validated name");
                    ids.add(full, Definition::Const(value))
                        .map_err(|e| locate(e, loc))?;
                }
                CodeElementKind::Func { name, body, .. } => {
                    let full = scope.child(name).expect("parser-validated name");
                    ids.add(full.clone(), Definition::Function { pc: None })
                        .map_err(|e| locate(e, loc))?;
                    self.collect(&full, body, ids)?;
                }
                CodeElementKind::StructDef { name, members } => {
                    let full = scope.child(name).expect("parser-validated name");
                    let mut offset = 0;
                    let mut collected = Vec::new();
                    for member in members {
                        let ty = member.ty.clone().unwrap_or(crate::ast::TypeExpr::Felt);
                        let size = ids.type_size(scope, &ty)?;
                        collected.push(StructMember {
                            name: member.name.clone(),
                            ty,
                            offset,
                        });
                        offset += size;
                    }
                    ids.add(
                        full,
                        Definition::Struct {
                            members: collected,
                            size: offset,
                        },
                    )
                    .map_err(|e| locate(e, loc))?;
                }
                CodeElementKind::NamespaceDef { name, body } => {
                    let full = scope.child(name).expect("parser-validated name");
                    ids.add(full.clone(), Definition::Namespace)
                        .map_err(|e| locate(e, loc))?;
                    self.collect(&full, body, ids)?;
                }
                CodeElementKind::Label { name } => {
                    let full = scope.child(name).expect("parser-validated name");
                    ids.add(full, Definition::Label(None))
                        .map_err(|e| locate(e, loc))?;
                }
                CodeElementKind::Import { module, items } => {
                    for item in items {
                        let local = item.alias.as_ref().unwrap_or(&item.name);
                        let full = scope.child(local).expect("parser-validated name");
                        let destination =
                            module.child(&item.name).expect("parser-validated name");
                        ids.add(full, Definition::Alias(destination))
                            .map_err(|e| locate(e, loc))?;
                    }
                }
                CodeElementKind::If {
                    body, else_body, ..
                } => {
                    self.collect(scope, body, ids)?;
                    if let Some(else_body) = else_body {
                        self.collect(scope, else_body, ids)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Stage for IdentifierCollector {
    fn name(&self) -> &'static str {
        "identifier_collector"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<(), PreprocessorError> {
        let modules = std::mem::take(&mut ctx.modules);
        let mut result = Ok(());
        for module in &modules {
            result = self.collect(&module.scope, &module.elements, &mut ctx.identifiers);
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

    fn run_on(source: &str) -> Result<PassContext, PreprocessorError> {
        let scope = ScopedName::from_string("__main__").unwrap();
        let elements = parse_file("main.cairn", source).unwrap();
        let mut ctx = PassContext::new(scope.clone(), Module { scope, elements });
        IdentifierCollector.run(&mut ctx)?;
        Ok(ctx)
    }

    fn name(s: &str) -> ScopedName {
        ScopedName::from_string(s).unwrap()
    }

    #[test]
    fn test_const_chain_evaluated() {
        let ctx = run_on("const A = 3\nconst B = A * 2 + 1\n").unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.B")),
            Some(&Definition::Const(Felt::from(7u64)))
        );
    }

    #[test]
    fn test_redefinition_error_message() {
        let err = run_on("const A = 1\nconst A = 2\n").unwrap_err();
        assert!(err.to_string().contains("Redefinition of '__main__.A'"));
    }

    #[test]
    fn test_struct_offsets_and_size_const() {
        let source = "\
struct Point:
    member x : felt
    member y : felt
end
const S = Point.SIZE
const OFF = Point.y
";
        let ctx = run_on(source).unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.S")),
            Some(&Definition::Const(Felt::from(2u64)))
        );
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.OFF")),
            Some(&Definition::Const(Felt::from(1u64)))
        );
    }

    #[test]
    fn test_nested_struct_size() {
        let source = "\
struct Inner:
    member a : felt
    member b : felt
end
struct Outer:
    member first : Inner
    member second : felt
end
const S = Outer.SIZE
";
        let ctx = run_on(source).unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.S")),
            Some(&Definition::Const(Felt::from(3u64)))
        );
    }

    #[test]
    fn test_labels_collected_inside_functions() {
        let ctx = run_on("func f():\n    loop:\n    jmp loop\nend\n").unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.f.loop")),
            Some(&Definition::Label(None))
        );
    }

    #[test]
    fn test_import_aliases_registered() {
        let ctx = run_on("from lib.math import sqrt as isqrt\n").unwrap();
        assert_eq!(
            ctx.identifiers.get_exact(&name("__main__.isqrt")),
            Some(&Definition::Alias(name("lib.math.sqrt")))
        );
    }
}
