//! Canonical source formatter
//!
//! A pure function from AST nodes to canonical source text. Printing is
//! precedence-aware, so re-parsing formatted output reproduces the same tree;
//! formatting is therefore idempotent after one pass.

use crate::ast::{
    BinOp, BoolExpr, CodeElement, CodeElementKind, Expr, ExprKind, TypeExpr, TypedName,
};

const INDENT: &str = "    ";

/// Precedence levels: higher binds tighter
fn precedence(kind: &ExprKind) -> u8 {
    match kind {
        ExprKind::BinOp {
            op: BinOp::Add | BinOp::Sub,
            ..
        } => 1,
        ExprKind::BinOp {
            op: BinOp::Mul | BinOp::Div,
            ..
        } => 2,
        ExprKind::Neg(_) | ExprKind::AddrOf(_) => 3,
        _ => 4,
    }
}

/// Render an expression with minimal parentheses
pub fn format_expr(expr: &Expr) -> String {
    render(expr, 0)
}

fn render(expr: &Expr, min_prec: u8) -> String {
    let prec = precedence(&expr.kind);
    let text = match &expr.kind {
        ExprKind::Int(v) => v.to_string(),
        ExprKind::Ident(name) => name.to_string(),
        ExprKind::Reg(reg) => match reg {
            cairn_spec::Register::AP => "ap".to_string(),
            cairn_spec::Register::FP => "fp".to_string(),
        },
        ExprKind::BinOp { op, lhs, rhs } => {
            // Left-associative: the right child needs strictly higher binding
            format!(
                "{} {} {}",
                render(lhs, prec),
                op.symbol(),
                render(rhs, prec + 1)
            )
        }
        ExprKind::Neg(inner) => format!("-{}", render(inner, prec)),
        ExprKind::AddrOf(inner) => format!("&{}", render(inner, prec)),
        ExprKind::Deref(inner) => format!("[{}]", render(inner, 0)),
        ExprKind::Subscript { base, index } => {
            format!("{}[{}]", render(base, 4), render(index, 0))
        }
        ExprKind::Dot { base, member } => format!("{}.{}", render(base, 4), member),
        ExprKind::Cast { expr, ty } => {
            format!("cast({}, {})", render(expr, 0), format_type(ty))
        }
        ExprKind::FuncCall { func, args } => {
            let args: Vec<String> = args.iter().map(|a| render(a, 0)).collect();
            format!("{}({})", func, args.join(", "))
        }
        ExprKind::Tuple(items) => match items.len() {
            1 => format!("({},)", render(&items[0], 0)),
            _ => {
                let items: Vec<String> = items.iter().map(|e| render(e, 0)).collect();
                format!("({})", items.join(", "))
            }
        },
    };
    if prec < min_prec {
        format!("({text})")
    } else {
        text
    }
}

pub fn format_type(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Felt => "felt".to_string(),
        TypeExpr::Pointer(inner) => format!("{}*", format_type(inner)),
        TypeExpr::Tuple(items) => {
            let items: Vec<String> = items.iter().map(format_type).collect();
            format!("({})", items.join(", "))
        }
        TypeExpr::Named(name) => name.to_string(),
    }
}

fn format_bool_expr(cond: &BoolExpr) -> String {
    cond.atoms
        .iter()
        .map(|atom| {
            format!(
                "{} {} {}",
                format_expr(&atom.lhs),
                if atom.eq { "==" } else { "!=" },
                format_expr(&atom.rhs)
            )
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

fn format_typed_names(names: &[TypedName]) -> String {
    names
        .iter()
        .map(|tn| match &tn.ty {
            Some(ty) => format!("{} : {}", tn.name, format_type(ty)),
            None => tn.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render one code element at the given indentation depth
pub fn format_element(element: &CodeElement, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    match &element.kind {
        CodeElementKind::AssertEq { lhs, rhs, ap_inc } => {
            let suffix = if *ap_inc { "; ap++" } else { "" };
            format!("{pad}{} = {}{suffix}", format_expr(lhs), format_expr(rhs))
        }
        CodeElementKind::Const { name, value } => {
            format!("{pad}const {name} = {}", format_expr(value))
        }
        CodeElementKind::Let { name, ty, value } => match ty {
            Some(ty) => format!(
                "{pad}let {name} : {} = {}",
                format_type(ty),
                format_expr(value)
            ),
            None => format!("{pad}let {name} = {}", format_expr(value)),
        },
        CodeElementKind::TempVar { name, value } => {
            format!("{pad}tempvar {name} = {}", format_expr(value))
        }
        CodeElementKind::Local { name, ty, value } => {
            let ty_part = ty
                .as_ref()
                .map(|t| format!(" : {}", format_type(t)))
                .unwrap_or_default();
            match value {
                Some(v) => format!("{pad}local {name}{ty_part} = {}", format_expr(v)),
                None => format!("{pad}local {name}{ty_part}"),
            }
        }
        CodeElementKind::AllocLocals => format!("{pad}alloc_locals"),
        CodeElementKind::Label { name } => format!("{pad}{name}:"),
        CodeElementKind::Jump { target, condition } => match condition {
            Some(cond) => format!("{pad}jmp {target} if {} != 0", format_expr(cond)),
            None => format!("{pad}jmp {target}"),
        },
        CodeElementKind::JumpToExpr {
            target,
            relative,
            condition,
        } => {
            let mode = if *relative { "rel" } else { "abs" };
            match condition {
                Some(cond) => format!(
                    "{pad}jmp {mode} {} if {} != 0",
                    format_expr(target),
                    format_expr(cond)
                ),
                None => format!("{pad}jmp {mode} {}", format_expr(target)),
            }
        }
        CodeElementKind::Call { target } => format!("{pad}call {target}"),
        CodeElementKind::CallToExpr { target, relative } => {
            let mode = if *relative { "rel" } else { "abs" };
            format!("{pad}call {mode} {}", format_expr(target))
        }
        CodeElementKind::Ret => format!("{pad}ret"),
        CodeElementKind::Return { values } => {
            let values: Vec<String> = values.iter().map(format_expr).collect();
            format!("{pad}return ({})", values.join(", "))
        }
        CodeElementKind::ApAdd { value } => format!("{pad}ap += {}", format_expr(value)),
        CodeElementKind::Func {
            name,
            args,
            rets,
            body,
        } => {
            let rets_part = if rets.is_empty() {
                String::new()
            } else {
                format!(" -> ({})", format_typed_names(rets))
            };
            let mut out = format!("{pad}func {name}({}){rets_part}:", format_typed_names(args));
            for element in body {
                out.push('\n');
                out.push_str(&format_element(element, depth + 1));
            }
            out.push('\n');
            out.push_str(&format!("{pad}end"));
            out
        }
        CodeElementKind::StructDef { name, members } => {
            let mut out = format!("{pad}struct {name}:");
            for member in members {
                let ty = member
                    .ty
                    .as_ref()
                    .map(format_type)
                    .unwrap_or_else(|| "felt".to_string());
                out.push('\n');
                out.push_str(&format!("{pad}{INDENT}member {} : {}", member.name, ty));
            }
            out.push('\n');
            out.push_str(&format!("{pad}end"));
            out
        }
        CodeElementKind::NamespaceDef { name, body } => {
            let mut out = format!("{pad}namespace {name}:");
            for element in body {
                out.push('\n');
                out.push_str(&format_element(element, depth + 1));
            }
            out.push('\n');
            out.push_str(&format!("{pad}end"));
            out
        }
        CodeElementKind::If {
            condition,
            body,
            else_body,
            ..
        } => {
            let mut out = format!("{pad}if {}:", format_bool_expr(condition));
            for element in body {
                out.push('\n');
                out.push_str(&format_element(element, depth + 1));
            }
            if let Some(else_body) = else_body {
                out.push('\n');
                out.push_str(&format!("{pad}else:"));
                for element in else_body {
                    out.push('\n');
                    out.push_str(&format_element(element, depth + 1));
                }
            }
            out.push('\n');
            out.push_str(&format!("{pad}end"));
            out
        }
        CodeElementKind::BuiltinsDirective { builtins } => {
            format!("{pad}%builtins {}", builtins.join(" "))
        }
        CodeElementKind::Import { module, items } => {
            let items: Vec<String> = items
                .iter()
                .map(|item| match &item.alias {
                    Some(alias) => format!("{} as {}", item.name, alias),
                    None => item.name.clone(),
                })
                .collect();
            format!("{pad}from {module} import {}", items.join(", "))
        }
        CodeElementKind::Hint { code } => format!("{pad}%{{{code}%}}"),
    }
}

/// Render a whole file
pub fn format_elements(elements: &[CodeElement]) -> String {
    let mut out = String::new();
    for element in elements {
        out.push_str(&format_element(element, 0));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expr, parse_file};

    fn round(source: &str) -> String {
        format_elements(&parse_file("test.cairn", source).unwrap())
    }

    #[test]
    fn test_format_expr_minimal_parens() {
        let expr = parse_expr("t", "(1 + 2) * 3").unwrap();
        assert_eq!(format_expr(&expr), "(1 + 2) * 3");
        let expr = parse_expr("t", "1 + 2 * 3").unwrap();
        assert_eq!(format_expr(&expr), "1 + 2 * 3");
        let expr = parse_expr("t", "1 + (2 + 3)").unwrap();
        assert_eq!(format_expr(&expr), "1 + (2 + 3)");
    }

    #[test]
    fn test_format_deref() {
        let expr = parse_expr("t", "[fp + (-3)]").unwrap();
        assert_eq!(format_expr(&expr), "[fp + -3]");
    }

    #[test]
    fn test_formatter_idempotent() {
        let source = "\
func main():
    alloc_locals
    [ap] = 25; ap++
    tempvar v = [ap - 1] + 3
    if v == 10 and v == 12:
        jmp done
    end
    done:
    ret
end
";
        let once = round(source);
        let twice = round(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_struct() {
        let source = "struct Point:\n    member x : felt\n    member y : felt\nend\n";
        assert_eq!(round(source), source);
    }

    #[test]
    fn test_format_single_tuple_round_trips() {
        let expr = parse_expr("t", "(5,)").unwrap();
        assert_eq!(format_expr(&expr), "(5,)");
        let reparsed = parse_expr("t", &format_expr(&expr)).unwrap();
        assert_eq!(format_expr(&reparsed), "(5,)");
    }

    #[test]
    fn test_format_hint_verbatim() {
        let source = "%{ ids.x = 3 %}\n";
        assert_eq!(round(source), source);
    }
}
