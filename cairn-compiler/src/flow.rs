//! Flow tracking
//!
//! Tracks how many allocation-pointer adjustments have occurred along each
//! control-flow path. References bound under one tracking group can only be
//! evaluated at states of the same group; diverging paths (labels, calls,
//! non-constant ap adjustments) open a new group.

use crate::ast::{BinOp, Expr, ExprKind};
use crate::error::FlowTrackingError;
use cairn_spec::{ApTracking, Felt, Register, ScopedName};

/// The mutable tracking state threaded through code generation
#[derive(Debug, Clone)]
pub struct FlowTracking {
    state: ApTracking,
    next_group: usize,
}

impl Default for FlowTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTracking {
    pub fn new() -> Self {
        FlowTracking {
            state: ApTracking::default(),
            next_group: 1,
        }
    }

    pub fn get(&self) -> ApTracking {
        self.state
    }

    /// Record a known ap adjustment
    pub fn add_ap(&mut self, amount: usize) {
        self.state.offset += amount;
    }

    /// Enter a state where the ap delta is unknown (label, call target,
    /// non-constant ap += ...): a fresh group with offset 0.
    pub fn new_group(&mut self) {
        self.state = ApTracking {
            group: self.next_group,
            offset: 0,
        };
        self.next_group += 1;
    }
}

/// Does the expression mention the ap register?
pub fn expr_uses_ap(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Reg(Register::AP) => true,
        ExprKind::Reg(Register::FP) | ExprKind::Int(_) | ExprKind::Ident(_) => false,
        ExprKind::BinOp { lhs, rhs, .. } => expr_uses_ap(lhs) || expr_uses_ap(rhs),
        ExprKind::Neg(inner)
        | ExprKind::Deref(inner)
        | ExprKind::AddrOf(inner)
        | ExprKind::Cast { expr: inner, .. } => expr_uses_ap(inner),
        ExprKind::Subscript { base, index } => expr_uses_ap(base) || expr_uses_ap(index),
        ExprKind::Dot { base, .. } => expr_uses_ap(base),
        ExprKind::FuncCall { args, .. } => args.iter().any(expr_uses_ap),
        ExprKind::Tuple(items) => items.iter().any(expr_uses_ap),
    }
}

fn substitute_ap(expr: &Expr, delta: usize) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Reg(Register::AP) => {
            if delta == 0 {
                ExprKind::Reg(Register::AP)
            } else {
                ExprKind::BinOp {
                    op: BinOp::Sub,
                    lhs: Box::new(Expr::reg(Register::AP)),
                    rhs: Box::new(Expr::int(Felt::from(delta))),
                }
            }
        }
        ExprKind::BinOp { op, lhs, rhs } => ExprKind::BinOp {
            op: *op,
            lhs: Box::new(substitute_ap(lhs, delta)),
            rhs: Box::new(substitute_ap(rhs, delta)),
        },
        ExprKind::Neg(inner) => ExprKind::Neg(Box::new(substitute_ap(inner, delta))),
        ExprKind::Deref(inner) => ExprKind::Deref(Box::new(substitute_ap(inner, delta))),
        ExprKind::AddrOf(inner) => ExprKind::AddrOf(Box::new(substitute_ap(inner, delta))),
        ExprKind::Cast { expr: inner, ty } => ExprKind::Cast {
            expr: Box::new(substitute_ap(inner, delta)),
            ty: ty.clone(),
        },
        ExprKind::Subscript { base, index } => ExprKind::Subscript {
            base: Box::new(substitute_ap(base, delta)),
            index: Box::new(substitute_ap(index, delta)),
        },
        ExprKind::Dot { base, member } => ExprKind::Dot {
            base: Box::new(substitute_ap(base, delta)),
            member: member.clone(),
        },
        ExprKind::FuncCall { func, args } => ExprKind::FuncCall {
            func: func.clone(),
            args: args.iter().map(|a| substitute_ap(a, delta)).collect(),
        },
        ExprKind::Tuple(items) => {
            ExprKind::Tuple(items.iter().map(|e| substitute_ap(e, delta)).collect())
        }
        other => other.clone(),
    };
    Expr::new(kind, expr.loc.clone())
}

/// Evaluate a reference expression bound at `binding_tracking` at the current
/// tracking state: ap mentions are shifted back by the accumulated delta.
///
/// Crossing tracking groups is only legal for expressions that never mention
/// ap (fp-relative or constant references survive branches).
pub fn eval_reference(
    name: &ScopedName,
    value: &Expr,
    binding_tracking: ApTracking,
    current: ApTracking,
) -> Result<Expr, FlowTrackingError> {
    if !expr_uses_ap(value) {
        return Ok(value.clone());
    }
    if binding_tracking.group != current.group {
        return Err(FlowTrackingError {
            name: name.clone(),
            def_group: binding_tracking.group,
            use_group: current.group,
        });
    }
    let delta = current.offset - binding_tracking.offset;
    Ok(substitute_ap(value, delta))
}
