//! Code generation
//!
//! The final stage: resolves every expression's identifiers to concrete
//! definitions, tracks register flow across the element stream, checks
//! structural types, and lowers the fully resolved AST into a flat ordered
//! instruction list with assigned program counters. Forward label and call
//! targets are patched once every module has been lowered.

use crate::ast::{BinOp, CodeElement, CodeElementKind, Expr, ExprKind, TypeExpr};
use crate::error::{IdentifierError, PreprocessorError};
use crate::flow::{eval_reference, FlowTracking};
use crate::identifiers::{Definition, IdentifierManager, RefBinding, ResolvedMember};
use crate::instruction_builder::{
    as_cell, as_int, build_ap_add, build_assert, build_call, build_jump, build_ret, to_reg_off,
};
use crate::passes::{PassContext, Stage};
use crate::types::{cast_allowed, CastKind};
use cairn_spec::program::{FlowTrackingData, HintParams, HintReference, InstructionLocation};
use cairn_spec::{Felt, Instruction, Location, Register, ScopedName};
use std::collections::BTreeMap;

type Result<T> = std::result::Result<T, PreprocessorError>;

fn not_expressible(message: &str, loc: &Option<Location>) -> PreprocessorError {
    PreprocessorError::NotInstructionExpressible {
        message: message.to_string(),
        location: loc.clone(),
    }
}

/// Per-function locals bookkeeping
struct LocalsState {
    total: usize,
    next_offset: usize,
    allocated: bool,
}

/// A forward reference to a label or function pc
struct Patch {
    index: usize,
    instr_pc: usize,
    target: ScopedName,
    loc: Option<Location>,
}

struct CodeGenerator<'a> {
    ids: &'a mut IdentifierManager,
    instructions: Vec<Instruction>,
    pc: usize,
    flow: FlowTracking,
    scope_stack: Vec<ScopedName>,
    pending_hints: Vec<(String, Option<Location>)>,
    patches: Vec<Patch>,
    hints: BTreeMap<usize, Vec<HintParams>>,
    debug: BTreeMap<usize, InstructionLocation>,
    locals: Option<LocalsState>,
}

impl<'a> CodeGenerator<'a> {
    fn new(ids: &'a mut IdentifierManager) -> Self {
        CodeGenerator {
            ids,
            instructions: Vec::new(),
            pc: 0,
            flow: FlowTracking::new(),
            scope_stack: Vec::new(),
            pending_hints: Vec::new(),
            patches: Vec::new(),
            hints: BTreeMap::new(),
            debug: BTreeMap::new(),
            locals: None,
        }
    }

    fn scope(&self) -> &ScopedName {
        self.scope_stack.last().expect("scope stack is never empty")
    }

    // ---- emission ----

    fn emit(&mut self, instruction: Instruction, loc: &Option<Location>) {
        if !self.pending_hints.is_empty() {
            let pending = std::mem::take(&mut self.pending_hints);
            let params: Vec<HintParams> = pending
                .iter()
                .map(|(code, _)| HintParams {
                    code: code.clone(),
                    accessible_scopes: self.scope_stack.clone(),
                    flow_tracking_data: FlowTrackingData {
                        ap_tracking: self.flow.get(),
                        reference_ids: self.visible_references(),
                    },
                })
                .collect();
            if let Some(location) = loc {
                self.debug.insert(
                    self.pc,
                    InstructionLocation {
                        location: location.clone(),
                        hints: pending.iter().map(|(c, _)| format!("%{{{c}%}}")).collect(),
                    },
                );
            }
            self.hints.insert(self.pc, params);
        } else if let Some(location) = loc {
            self.debug.insert(
                self.pc,
                InstructionLocation {
                    location: location.clone(),
                    hints: Vec::new(),
                },
            );
        }
        self.pc += instruction.size();
        self.instructions.push(instruction);
    }

    /// Collect `ids.<name>` bindings visible to a hint at the current state
    fn visible_references(&self) -> BTreeMap<String, HintReference> {
        let mut out = BTreeMap::new();
        let tracking = self.flow.get();
        for scope in self.scope_stack.iter().rev() {
            for (name, definition) in self.ids.iter() {
                if name.len() != scope.len() + 1 || !name.startswith(scope) {
                    continue;
                }
                let Some(last) = name.last() else { continue };
                if out.contains_key(last) {
                    continue;
                }
                match definition {
                    Definition::Const(value) => {
                        out.insert(
                            last.to_string(),
                            HintReference::Const {
                                value: value.clone(),
                            },
                        );
                    }
                    Definition::Reference(bindings) => {
                        let Some(binding) = bindings.last() else { continue };
                        let Ok(value) =
                            eval_reference(name, &binding.value, binding.ap_tracking, tracking)
                        else {
                            continue;
                        };
                        let reference = if let Some((register, offset)) = as_cell(&value) {
                            match i32::try_from(offset) {
                                Ok(offset) => HintReference::Cell {
                                    register,
                                    offset,
                                    ap_tracking: tracking,
                                    dereferenced: true,
                                },
                                Err(_) => continue,
                            }
                        } else if let Some((register, offset)) = to_reg_off(&value) {
                            match i32::try_from(offset) {
                                Ok(offset) => HintReference::Cell {
                                    register,
                                    offset,
                                    ap_tracking: tracking,
                                    dereferenced: false,
                                },
                                Err(_) => continue,
                            }
                        } else if let Some(value) = as_int(&value) {
                            HintReference::Const { value }
                        } else {
                            continue;
                        };
                        out.insert(last.to_string(), reference);
                    }
                    _ => {}
                }
            }
        }
        out
    }

    // ---- type inference ----

    fn infer_type(&self, expr: &Expr) -> Option<TypeExpr> {
        match &expr.kind {
            ExprKind::Int(_) => Some(TypeExpr::Felt),
            ExprKind::Reg(_) => Some(TypeExpr::Pointer(Box::new(TypeExpr::Felt))),
            ExprKind::Cast { ty, .. } => Some(ty.clone()),
            ExprKind::Deref(inner) => match self.infer_type(inner)? {
                TypeExpr::Pointer(pointee) => Some(*pointee),
                _ => None,
            },
            ExprKind::AddrOf(inner) => match &inner.kind {
                ExprKind::Deref(addr) => self.infer_type(addr),
                _ => None,
            },
            ExprKind::Neg(inner) => match self.infer_type(inner)? {
                TypeExpr::Felt => Some(TypeExpr::Felt),
                _ => None,
            },
            ExprKind::BinOp { op, lhs, rhs } => {
                let lt = self.infer_type(lhs)?;
                let rt = self.infer_type(rhs)?;
                match op {
                    BinOp::Add | BinOp::Sub => match (&lt, &rt) {
                        (TypeExpr::Pointer(_), TypeExpr::Felt) => Some(lt),
                        (TypeExpr::Felt, TypeExpr::Pointer(_)) if *op == BinOp::Add => Some(rt),
                        (TypeExpr::Pointer(_), TypeExpr::Pointer(_)) if *op == BinOp::Sub => {
                            Some(TypeExpr::Felt)
                        }
                        (TypeExpr::Felt, TypeExpr::Felt) => Some(TypeExpr::Felt),
                        _ => None,
                    },
                    BinOp::Mul | BinOp::Div => match (&lt, &rt) {
                        (TypeExpr::Felt, TypeExpr::Felt) => Some(TypeExpr::Felt),
                        _ => None,
                    },
                }
            }
            _ => None,
        }
    }

    fn check_type_op(&self, expr: &Expr, loc: &Option<Location>) -> Result<()> {
        // Pointer arithmetic legality: multiplication and division never
        // accept pointers; subtraction of pointers requires both sides
        if let ExprKind::BinOp { op, lhs, rhs } = &expr.kind {
            let lt = self.infer_type(lhs);
            let rt = self.infer_type(rhs);
            if matches!(op, BinOp::Mul | BinOp::Div) {
                let pointer_side = [&lt, &rt]
                    .iter()
                    .any(|t| matches!(t, Some(TypeExpr::Pointer(_))));
                if pointer_side {
                    return Err(PreprocessorError::IllegalTypeOp {
                        lhs: lt.map(|t| crate::format::format_type(&t)).unwrap_or_default(),
                        rhs: rt.map(|t| crate::format::format_type(&t)).unwrap_or_default(),
                        location: loc.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    // ---- expression resolution ----

    fn resolve_expr(&self, expr: &Expr) -> Result<Expr> {
        let loc = expr.loc.clone();
        let kind = match &expr.kind {
            ExprKind::Int(_) | ExprKind::Reg(_) => expr.kind.clone(),
            ExprKind::Ident(name) => return self.resolve_ident(name, &loc),
            ExprKind::BinOp { op, lhs, rhs } => {
                let resolved = ExprKind::BinOp {
                    op: *op,
                    lhs: Box::new(self.resolve_expr(lhs)?),
                    rhs: Box::new(self.resolve_expr(rhs)?),
                };
                let out = Expr::new(resolved, loc);
                self.check_type_op(&out, &out.loc.clone())?;
                return Ok(out);
            }
            ExprKind::Neg(inner) => ExprKind::Neg(Box::new(self.resolve_expr(inner)?)),
            ExprKind::Deref(inner) => {
                let resolved = self.resolve_expr(inner)?;
                // Dereferencing through a cast is the unpacking position
                if let ExprKind::Cast { expr: cast_inner, ty } = &resolved.kind {
                    if let Some(src) = self.infer_type(cast_inner) {
                        if !cast_allowed(&src, ty, CastKind::Unpacking) {
                            return Err(PreprocessorError::IllegalCast {
                                src: crate::format::format_type(&src),
                                dest: crate::format::format_type(ty),
                                location: loc,
                            });
                        }
                    }
                }
                ExprKind::Deref(Box::new(resolved))
            }
            ExprKind::AddrOf(inner) => {
                let resolved = self.resolve_expr(inner)?;
                match resolved.kind {
                    ExprKind::Deref(addr) => return Ok(*addr),
                    _ => {
                        return Err(not_expressible(
                            "can only take the address of a dereference",
                            &loc,
                        ))
                    }
                }
            }
            ExprKind::Cast { expr: inner, ty } => {
                let resolved = self.resolve_expr(inner)?;
                if let Some(src) = self.infer_type(&resolved) {
                    if !cast_allowed(&src, ty, CastKind::Explicit) {
                        return Err(PreprocessorError::IllegalCast {
                            src: crate::format::format_type(&src),
                            dest: crate::format::format_type(ty),
                            location: loc,
                        });
                    }
                }
                ExprKind::Cast {
                    expr: Box::new(resolved),
                    ty: ty.clone(),
                }
            }
            ExprKind::Subscript { base, index } => {
                let base = self.resolve_expr(base)?;
                let index = self.resolve_expr(index)?;
                let scale = match self.infer_type(&base) {
                    Some(TypeExpr::Pointer(pointee)) => self
                        .ids
                        .type_size(self.scope(), &pointee)
                        .map_err(PreprocessorError::from)?,
                    _ => 1,
                };
                let scaled = if scale == 1 {
                    index
                } else {
                    Expr::bin(BinOp::Mul, index, Expr::int(Felt::from(scale)))
                };
                ExprKind::Deref(Box::new(Expr::bin(BinOp::Add, base, scaled)))
            }
            ExprKind::Dot { base, member } => {
                let base = self.resolve_expr(base)?;
                return self.resolve_member_over(&base, std::slice::from_ref(member), &loc);
            }
            ExprKind::FuncCall { .. } => {
                return Err(not_expressible(
                    "a function call is not a value expression",
                    &loc,
                ))
            }
            ExprKind::Tuple(items) => ExprKind::Tuple(
                items
                    .iter()
                    .map(|e| self.resolve_expr(e))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(Expr::new(kind, loc))
    }

    fn resolve_ident(&self, name: &ScopedName, loc: &Option<Location>) -> Result<Expr> {
        let result = self
            .ids
            .search(self.scope(), name)
            .map_err(PreprocessorError::from)?;
        match &result.definition {
            Definition::Const(value) => {
                if !result.member_path.is_empty() {
                    return Err(PreprocessorError::from(IdentifierError::NotAStruct {
                        name: result.canonical_name,
                        member: result.member_path[0].clone(),
                    }));
                }
                Ok(Expr::new(ExprKind::Int(value.clone()), loc.clone()))
            }
            Definition::Struct { members, size } => {
                if result.member_path.is_empty() {
                    return Err(PreprocessorError::from(IdentifierError::UnexpectedKind {
                        name: result.canonical_name,
                        expected: "a value",
                        found: "a struct",
                    }));
                }
                let resolved = self.ids.resolve_struct_member(
                    &result.canonical_name,
                    members,
                    *size,
                    &result.member_path,
                )?;
                let value = match resolved {
                    ResolvedMember::Size(value) => value,
                    ResolvedMember::Member { offset, .. } => Felt::from(offset),
                };
                Ok(Expr::new(ExprKind::Int(value), loc.clone()))
            }
            Definition::Reference(bindings) => {
                let binding = bindings.last().expect("references always have a binding");
                let value = eval_reference(
                    &result.canonical_name,
                    &binding.value,
                    binding.ap_tracking,
                    self.flow.get(),
                )
                .map_err(PreprocessorError::from)?;
                if result.member_path.is_empty() {
                    return Ok(value);
                }
                self.resolve_reference_member(&value, binding.ty.as_ref(), &result.member_path, loc)
            }
            Definition::Label(_) | Definition::Function { .. } => {
                Err(PreprocessorError::from(IdentifierError::UnexpectedKind {
                    name: result.canonical_name,
                    expected: "a value",
                    found: "a label",
                }))
            }
            Definition::Namespace => {
                Err(PreprocessorError::from(IdentifierError::UnexpectedKind {
                    name: result.canonical_name,
                    expected: "a value",
                    found: "a namespace",
                }))
            }
            Definition::Alias(_) => unreachable!("search follows aliases"),
        }
    }

    /// Member access against a typed reference: walk the member chain as a
    /// dot access over the dereferenced base.
    fn resolve_reference_member(
        &self,
        value: &Expr,
        ty: Option<&TypeExpr>,
        path: &[String],
        loc: &Option<Location>,
    ) -> Result<Expr> {
        let ty = ty
            .cloned()
            .or_else(|| self.infer_type(value))
            .ok_or_else(|| {
                not_expressible("member access requires a typed reference", loc)
            })?;
        let (base_addr, struct_name) = match &ty {
            TypeExpr::Pointer(pointee) => match &**pointee {
                TypeExpr::Named(struct_name) => (value.clone(), struct_name.clone()),
                _ => {
                    return Err(not_expressible(
                        "member access requires a struct-typed reference",
                        loc,
                    ))
                }
            },
            TypeExpr::Named(struct_name) => match &value.kind {
                ExprKind::Deref(addr) => ((**addr).clone(), struct_name.clone()),
                _ => {
                    return Err(not_expressible(
                        "member access requires an addressable struct value",
                        loc,
                    ))
                }
            },
            _ => {
                return Err(not_expressible(
                    "member access requires a struct-typed reference",
                    loc,
                ))
            }
        };
        let result = self
            .ids
            .search(self.scope(), &struct_name)
            .map_err(PreprocessorError::from)?;
        let Definition::Struct { members, size } = &result.definition else {
            return Err(PreprocessorError::from(IdentifierError::UnexpectedKind {
                name: result.canonical_name,
                expected: "a struct",
                found: "something else",
            }));
        };
        let resolved =
            self.ids
                .resolve_struct_member(&result.canonical_name, members, *size, path)?;
        match resolved {
            ResolvedMember::Size(value) => Ok(Expr::new(ExprKind::Int(value), loc.clone())),
            ResolvedMember::Member { offset, .. } => Ok(Expr::new(
                ExprKind::Deref(Box::new(Expr::bin(
                    BinOp::Add,
                    base_addr,
                    Expr::int(Felt::from(offset)),
                ))),
                loc.clone(),
            )),
        }
    }

    fn resolve_member_over(
        &self,
        base: &Expr,
        path: &[String],
        loc: &Option<Location>,
    ) -> Result<Expr> {
        let ty = self.infer_type(base);
        self.resolve_reference_member(base, ty.as_ref(), path, loc)
    }

    // ---- statements ----

    fn check_assign_cast(
        &self,
        value: &Expr,
        declared: &Option<TypeExpr>,
        loc: &Option<Location>,
    ) -> Result<()> {
        let (Some(declared), Some(inferred)) = (declared, self.infer_type(value)) else {
            return Ok(());
        };
        if !cast_allowed(&inferred, declared, CastKind::Assign) {
            return Err(PreprocessorError::IllegalCast {
                src: crate::format::format_type(&inferred),
                dest: crate::format::format_type(declared),
                location: loc.clone(),
            });
        }
        Ok(())
    }

    fn bind_reference(
        &mut self,
        name: &str,
        value: Expr,
        ty: Option<TypeExpr>,
        loc: &Option<Location>,
    ) -> Result<()> {
        let full = self.scope().child(name).expect("parser-validated name");
        let binding = RefBinding {
            pc: self.pc,
            value,
            ap_tracking: self.flow.get(),
            ty,
        };
        self.ids.add_reference_binding(full, binding).map_err(|e| {
            match e {
                PreprocessorError::Redefinition { name, .. } => PreprocessorError::Redefinition {
                    name,
                    location: loc.clone(),
                },
                other => other,
            }
        })
    }

    fn count_locals(&self, elements: &[CodeElement]) -> Result<usize> {
        let mut total = 0;
        for element in elements {
            match &element.kind {
                CodeElementKind::Local { ty, .. } => {
                    total += match ty {
                        Some(ty) => self
                            .ids
                            .type_size(self.scope(), ty)
                            .map_err(PreprocessorError::from)?,
                        None => 1,
                    };
                }
                CodeElementKind::If {
                    body, else_body, ..
                } => {
                    total += self.count_locals(body)?;
                    if let Some(else_body) = else_body {
                        total += self.count_locals(else_body)?;
                    }
                }
                _ => {}
            }
        }
        Ok(total)
    }

    fn process_elements(&mut self, elements: &[CodeElement]) -> Result<()> {
        for element in elements {
            self.process_element(element)?;
        }
        Ok(())
    }

    fn process_element(&mut self, element: &CodeElement) -> Result<()> {
        let loc = &element.loc;
        match &element.kind {
            CodeElementKind::BuiltinsDirective { .. }
            | CodeElementKind::Import { .. }
            | CodeElementKind::Const { .. }
            | CodeElementKind::StructDef { .. } => Ok(()),

            CodeElementKind::NamespaceDef { name, body } => {
                let inner = self.scope().child(name).expect("parser-validated name");
                self.scope_stack.push(inner);
                let result = self.process_elements(body);
                self.scope_stack.pop();
                result
            }

            CodeElementKind::Func {
                name,
                args,
                rets: _,
                body,
            } => self.process_func(name, args, body, loc),

            CodeElementKind::AllocLocals => {
                let Some(locals) = self.locals.as_mut() else {
                    return Err(not_expressible(
                        "alloc_locals is only allowed inside a function",
                        loc,
                    ));
                };
                locals.allocated = true;
                let total = locals.total;
                if total > 0 {
                    let instruction = build_ap_add(&Expr::int(Felt::from(total)), loc)?;
                    self.emit(instruction, loc);
                    self.flow.add_ap(total);
                }
                Ok(())
            }

            CodeElementKind::Local { name, ty, value } => {
                let Some(locals) = self.locals.as_ref() else {
                    return Err(not_expressible(
                        "locals are only allowed inside a function",
                        loc,
                    ));
                };
                if !locals.allocated {
                    return Err(not_expressible(
                        "alloc_locals must appear before the first local",
                        loc,
                    ));
                }
                let offset = self.locals.as_ref().unwrap().next_offset;
                let size = match ty {
                    Some(ty) => self
                        .ids
                        .type_size(self.scope(), ty)
                        .map_err(PreprocessorError::from)?,
                    None => 1,
                };
                self.locals.as_mut().unwrap().next_offset = offset + size;
                let slot = Expr::deref(Expr::bin(
                    BinOp::Add,
                    Expr::reg(Register::FP),
                    Expr::int(Felt::from(offset)),
                ));
                if let Some(value) = value {
                    let resolved = self.resolve_expr(value)?;
                    self.check_assign_cast(&resolved, ty, loc)?;
                    let instruction = build_assert(&slot, &resolved, false, loc)?;
                    self.emit(instruction, loc);
                }
                self.bind_reference(name, slot, ty.clone(), loc)
            }

            CodeElementKind::Let { name, ty, value } => {
                let resolved = self.resolve_expr(value)?;
                self.check_assign_cast(&resolved, ty, loc)?;
                let ty = ty.clone().or_else(|| self.infer_type(&resolved));
                self.bind_reference(name, resolved, ty, loc)
            }

            CodeElementKind::TempVar { name, value } => {
                let resolved = self.resolve_expr(value)?;
                let ty = self.infer_type(&resolved);
                let dst = Expr::deref(Expr::reg(Register::AP));
                let instruction = build_assert(&dst, &resolved, true, loc)?;
                self.emit(instruction, loc);
                self.flow.add_ap(1);
                let slot = Expr::deref(Expr::bin(
                    BinOp::Sub,
                    Expr::reg(Register::AP),
                    Expr::int(Felt::one()),
                ));
                self.bind_reference(name, slot, ty, loc)
            }

            CodeElementKind::AssertEq { lhs, rhs, ap_inc } => {
                let lhs = self.resolve_expr(lhs)?;
                let rhs = self.resolve_expr(rhs)?;
                let instruction = build_assert(&lhs, &rhs, *ap_inc, loc)?;
                self.emit(instruction, loc);
                if *ap_inc {
                    self.flow.add_ap(1);
                }
                Ok(())
            }

            CodeElementKind::ApAdd { value } => {
                let resolved = self.resolve_expr(value)?;
                let constant = as_int(&resolved).and_then(|v| v.to_usize());
                let instruction = build_ap_add(&resolved, loc)?;
                self.emit(instruction, loc);
                match constant {
                    Some(amount) => self.flow.add_ap(amount),
                    None => self.flow.new_group(),
                }
                Ok(())
            }

            CodeElementKind::Label { name } => {
                let full = self.scope().child(name).expect("parser-validated name");
                self.ids.set_pc(&full, self.pc);
                self.flow.new_group();
                Ok(())
            }

            CodeElementKind::Jump { target, condition } => {
                let condition = condition
                    .as_ref()
                    .map(|c| self.resolve_expr(c))
                    .transpose()?;
                self.emit_jump_to_label(target, condition.as_ref(), loc)
            }

            CodeElementKind::JumpToExpr {
                target,
                relative,
                condition,
            } => {
                let target = self.resolve_expr(target)?;
                let condition = condition
                    .as_ref()
                    .map(|c| self.resolve_expr(c))
                    .transpose()?;
                let instruction = build_jump(&target, *relative, condition.as_ref(), loc)?;
                self.emit(instruction, loc);
                if condition.is_none() {
                    self.flow.new_group();
                }
                Ok(())
            }

            CodeElementKind::Call { target } => {
                let canonical = self.canonical_code_target(target, loc)?;
                let delta = self.known_delta(&canonical);
                let instruction = build_call(
                    &Expr::int(delta.clone().unwrap_or_else(Felt::zero)),
                    true,
                    loc,
                )?;
                let index = self.instructions.len();
                let instr_pc = self.pc;
                self.emit(instruction, loc);
                if delta.is_none() {
                    self.patches.push(Patch {
                        index,
                        instr_pc,
                        target: canonical,
                        loc: loc.clone(),
                    });
                }
                self.flow.new_group();
                Ok(())
            }

            CodeElementKind::CallToExpr { target, relative } => {
                let target = self.resolve_expr(target)?;
                let instruction = build_call(&target, *relative, loc)?;
                self.emit(instruction, loc);
                self.flow.new_group();
                Ok(())
            }

            CodeElementKind::Ret => {
                self.emit(build_ret(), loc);
                self.flow.new_group();
                Ok(())
            }

            CodeElementKind::Return { values } => {
                for value in values {
                    let resolved = self.resolve_expr(value)?;
                    let dst = Expr::deref(Expr::reg(Register::AP));
                    let instruction = build_assert(&dst, &resolved, true, loc)?;
                    self.emit(instruction, loc);
                    self.flow.add_ap(1);
                }
                self.emit(build_ret(), loc);
                self.flow.new_group();
                Ok(())
            }

            CodeElementKind::If {
                condition,
                body,
                else_body,
                label_neq,
                label_end,
            } => self.process_if(condition, body, else_body.as_deref(), label_neq, label_end, loc),

            CodeElementKind::Hint { code } => {
                self.pending_hints.push((code.clone(), loc.clone()));
                Ok(())
            }
        }
    }

    fn process_func(
        &mut self,
        name: &str,
        args: &[crate::ast::TypedName],
        body: &[CodeElement],
        loc: &Option<Location>,
    ) -> Result<()> {
        if body
            .iter()
            .any(|e| matches!(e.kind, CodeElementKind::Func { .. }))
        {
            return Err(not_expressible("nested functions are not supported", loc));
        }
        let full = self.scope().child(name).expect("parser-validated name");
        self.ids.set_pc(&full, self.pc);
        self.scope_stack.push(full);
        self.flow.new_group();

        let saved_locals = self.locals.take();
        let total = self.count_locals(body)?;
        self.locals = Some(LocalsState {
            total,
            next_offset: 0,
            allocated: false,
        });

        // Arguments live below the return frame: the last argument at
        // [fp - 3], the first at [fp - (n + 2)].
        let n = args.len();
        for (i, arg) in args.iter().enumerate() {
            let offset = (n + 2 - i) as i64;
            let value = Expr::deref(Expr::bin(
                BinOp::Sub,
                Expr::reg(Register::FP),
                Expr::int(Felt::from(offset as u64)),
            ));
            self.bind_reference(&arg.name, value, arg.ty.clone(), loc)?;
        }

        let result = self.process_elements(body);
        self.locals = saved_locals;
        self.scope_stack.pop();
        self.flow.new_group();
        result
    }

    fn process_if(
        &mut self,
        condition: &crate::ast::BoolExpr,
        body: &[CodeElement],
        else_body: Option<&[CodeElement]>,
        label_neq: &Option<String>,
        label_end: &Option<String>,
        loc: &Option<Location>,
    ) -> Result<()> {
        let atom = &condition.atoms[0];
        let label_neq = label_neq
            .as_ref()
            .expect("unique-label pass ran before codegen");
        let label_end = label_end
            .as_ref()
            .expect("unique-label pass ran before codegen");

        // Normalize to the equality layout: the fallthrough path is the
        // `==` branch, the jump target the `!=` branch.
        let (eq_body, neq_body): (&[CodeElement], Option<&[CodeElement]>) = if atom.eq {
            (body, else_body)
        } else {
            (else_body.unwrap_or(&[]), Some(body))
        };

        let cond = Expr::bin(BinOp::Sub, atom.lhs.clone(), atom.rhs.clone());
        let cond = self.resolve_expr(&cond)?;
        let cond_cell = if as_cell(&cond).is_some() {
            cond
        } else {
            let dst = Expr::deref(Expr::reg(Register::AP));
            let instruction = build_assert(&dst, &cond, true, loc)?;
            self.emit(instruction, loc);
            self.flow.add_ap(1);
            Expr::deref(Expr::bin(
                BinOp::Sub,
                Expr::reg(Register::AP),
                Expr::int(Felt::one()),
            ))
        };

        let neq_name = ScopedName::from_segment(label_neq).expect("generated name is valid");
        self.emit_jump_to_label(&neq_name, Some(&cond_cell), loc)?;

        self.process_elements(eq_body)?;

        let neq_full = self.scope().child(label_neq).expect("generated name");
        let end_full = self.scope().child(label_end).expect("generated name");
        match neq_body {
            Some(neq_elements) => {
                let end_name =
                    ScopedName::from_segment(label_end).expect("generated name is valid");
                self.emit_jump_to_label(&end_name, None, loc)?;
                self.ids.set_pc(&neq_full, self.pc);
                self.flow.new_group();
                self.process_elements(neq_elements)?;
                self.ids.set_pc(&end_full, self.pc);
                self.flow.new_group();
            }
            None => {
                self.ids.set_pc(&neq_full, self.pc);
                self.ids.set_pc(&end_full, self.pc);
                self.flow.new_group();
            }
        }
        Ok(())
    }

    /// Canonical full name of a jump or call target
    fn canonical_code_target(
        &self,
        target: &ScopedName,
        loc: &Option<Location>,
    ) -> Result<ScopedName> {
        let result = self
            .ids
            .search(self.scope(), target)
            .map_err(PreprocessorError::from)?;
        if !result.member_path.is_empty() {
            return Err(PreprocessorError::UnknownLabel {
                name: target.clone(),
                location: loc.clone(),
            });
        }
        match result.definition {
            Definition::Label(_) | Definition::Function { .. } => Ok(result.canonical_name),
            _ => Err(PreprocessorError::UnknownLabel {
                name: target.clone(),
                location: loc.clone(),
            }),
        }
    }

    /// pc delta to a target if its pc is already assigned
    fn known_delta(&self, canonical: &ScopedName) -> Option<Felt> {
        match self.ids.get_exact(canonical) {
            Some(Definition::Label(Some(pc))) | Some(Definition::Function { pc: Some(pc) }) => {
                Some(Felt::from(*pc as u64) - Felt::from(self.pc as u64))
            }
            _ => None,
        }
    }

    fn emit_jump_to_label(
        &mut self,
        target: &ScopedName,
        condition: Option<&Expr>,
        loc: &Option<Location>,
    ) -> Result<()> {
        let canonical = self.canonical_code_target(target, loc)?;
        let delta = self.known_delta(&canonical);
        let instruction = build_jump(
            &Expr::int(delta.clone().unwrap_or_else(Felt::zero)),
            true,
            condition,
            loc,
        )?;
        let index = self.instructions.len();
        let instr_pc = self.pc;
        self.emit(instruction, loc);
        if delta.is_none() {
            self.patches.push(Patch {
                index,
                instr_pc,
                target: canonical,
                loc: loc.clone(),
            });
        }
        if condition.is_none() {
            self.flow.new_group();
        }
        Ok(())
    }

    fn apply_patches(&mut self) -> Result<()> {
        for patch in &self.patches {
            let pc = match self.ids.get_exact(&patch.target) {
                Some(Definition::Label(Some(pc)))
                | Some(Definition::Function { pc: Some(pc) }) => *pc,
                _ => {
                    return Err(PreprocessorError::UnknownLabel {
                        name: patch.target.clone(),
                        location: patch.loc.clone(),
                    })
                }
            };
            let delta = Felt::from(pc as u64) - Felt::from(patch.instr_pc as u64);
            self.instructions[patch.index].imm = Some(delta);
        }
        Ok(())
    }
}

pub struct CodeGeneratorStage;

impl Stage for CodeGeneratorStage {
    fn name(&self) -> &'static str {
        "code_generation"
    }

    fn run(&mut self, ctx: &mut PassContext) -> Result<()> {
        let modules = std::mem::take(&mut ctx.modules);
        let result = (|| {
            let mut generator = CodeGenerator::new(&mut ctx.identifiers);
            for module in &modules {
                generator.scope_stack = vec![module.scope.clone()];
                generator.process_elements(&module.elements)?;
                if !generator.pending_hints.is_empty() {
                    let (_, loc) = generator.pending_hints.last().unwrap();
                    return Err(not_expressible(
                        "a hint must precede an instruction",
                        loc,
                    ));
                }
            }
            generator.apply_patches()?;
            ctx.instructions = generator.instructions;
            ctx.hints = generator.hints;
            ctx.debug_info.instruction_locations = generator.debug;
            Ok(())
        })();
        ctx.modules = modules;
        result
    }
}
