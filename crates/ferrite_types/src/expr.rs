//! Expression inference.
//!
//! Every expression is visited once. Its type is built from the types of its
//! operands; an optional expected type flows down into contexts that
//! constrain without fixing the type (annotated `let`, arguments, return
//! position). Coercions are recorded as adjustments on the coerced
//! expression.

use ferrite_ast::{ArithOp, BinaryOp, CmpOp, ExprId, ExprKind, Label, Literal, Path, Stmt, UnaryOp};
use ferrite_hir::{DefKind, FloatTy, IntTy, ResolveValueResult, TypeNs, UintTy, ValueNs};
use ferrite_syntax::Cancelled;

use crate::infer::{Breakable, InferenceContext, RefineTarget, Refinement};
use crate::lower::{
    TyLowerer, adt_of, assoc_fn, ctor_sig, field_types, fn_sig, impl_self_ty, type_params, value_ty,
};
use crate::method::{PickSource, StepKind, trait_ref_for};
use crate::result::{Adjust, Adjustment, FieldRef, InferenceDiagnostic, MethodResolution, NodeId};
use crate::traits::Goal;
use crate::ty::{InferTy, ProjectionTy, Subst, Ty};

/// Lang item and method name of an overloadable binary operator
fn arith_lang_item(op: ArithOp) -> (&'static str, &'static str) {
    match op {
        ArithOp::Add => ("add", "add"),
        ArithOp::Sub => ("sub", "sub"),
        ArithOp::Mul => ("mul", "mul"),
        ArithOp::Div => ("div", "div"),
        ArithOp::Rem => ("rem", "rem"),
        ArithOp::BitAnd => ("bitand", "bitand"),
        ArithOp::BitOr => ("bitor", "bitor"),
        ArithOp::BitXor => ("bitxor", "bitxor"),
        ArithOp::Shl => ("shl", "shl"),
        ArithOp::Shr => ("shr", "shr"),
    }
}

fn is_scalar(ty: &Ty) -> bool {
    matches!(ty, Ty::Bool | Ty::Char) || ty.is_numeric()
}

fn is_bit_op(op: ArithOp) -> bool {
    matches!(op, ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor)
}

impl InferenceContext<'_> {
    pub(crate) fn infer_expr(&mut self, expr: ExprId, expected: Option<&Ty>) -> Result<Ty, Cancelled> {
        self.ctx.cancel.check()?;
        let saved = self.ctx.origin.replace(expr);
        let ty = self.infer_expr_inner(expr, expected)?;
        self.ctx.origin = saved;
        self.write_expr_ty(expr, ty.clone());
        Ok(ty)
    }

    /// Infer `expr` and coerce it to `target`; returns the type before the
    /// coercion
    pub(crate) fn infer_expr_coerce(&mut self, expr: ExprId, target: &Ty) -> Result<Ty, Cancelled> {
        let ty = self.infer_expr(expr, Some(target))?;
        if !self.coerce(expr, &ty, target) {
            let expected = self.ctx.resolve(target);
            let actual = self.ctx.resolve(&ty);
            self.push_diagnostic(InferenceDiagnostic::TypeMismatch {
                node: NodeId::Expr(expr),
                expected,
                actual,
            });
        }
        Ok(ty)
    }

    /// Make a value of type `from` usable as `to`. Tries never-to-any, plain
    /// unification, `&mut` to `&`, array unsizing and deref coercion.
    pub(crate) fn coerce(&mut self, expr: ExprId, from: &Ty, to: &Ty) -> bool {
        let from = self.ctx.shallow(from);
        let to = self.ctx.shallow(to);
        if from.is_never() {
            if !to.is_never() {
                self.push_adjustments(
                    expr,
                    vec![Adjustment {
                        kind: Adjust::NeverToAny,
                        target: to,
                    }],
                );
            }
            return true;
        }
        let (Ty::Ref { mutable: from_mut, inner: from_inner }, Ty::Ref { mutable: to_mut, inner: to_inner }) = (&from, &to)
        else {
            return self.ctx.unify(&from, &to);
        };
        if *to_mut && !*from_mut {
            return self.ctx.unify(&from, &to);
        }
        if self.ctx.unify(&from, &to) {
            return true;
        }
        let to_inner = self.ctx.shallow(to_inner);
        if let (Ty::Array { elem, .. }, Ty::Slice(target_elem)) = (self.ctx.shallow(from_inner), &to_inner) {
            if self.ctx.unify(&elem, target_elem) {
                self.push_adjustments(
                    expr,
                    vec![
                        Adjustment {
                            kind: Adjust::Deref { overloaded: false },
                            target: from_inner.as_ref().clone(),
                        },
                        Adjustment {
                            kind: Adjust::Borrow { mutable: *to_mut },
                            target: Ty::reference(from_inner.as_ref().clone(), *to_mut),
                        },
                        Adjustment {
                            kind: Adjust::Unsize,
                            target: to.clone(),
                        },
                    ],
                );
                return true;
            }
        }
        // deref coercion, `&mut T` to `&T` being the zero-step case
        let steps = self.ctx.autoderef(from_inner);
        for (index, step) in steps.iter().enumerate() {
            if step.kind == StepKind::Unsize {
                break;
            }
            if !self.ctx.table.can_unify(&step.ty, &to_inner) {
                continue;
            }
            self.ctx.unify(&step.ty, &to_inner);
            let mut adjustments = vec![Adjustment {
                kind: Adjust::Deref { overloaded: false },
                target: from_inner.as_ref().clone(),
            }];
            adjustments.extend(steps[1..=index].iter().map(|s| Adjustment {
                kind: Adjust::Deref {
                    overloaded: s.kind == StepKind::OverloadedDeref,
                },
                target: s.ty.clone(),
            }));
            adjustments.push(Adjustment {
                kind: Adjust::Borrow { mutable: *to_mut },
                target: to.clone(),
            });
            self.push_adjustments(expr, adjustments);
            return true;
        }
        false
    }

    fn infer_expr_inner(&mut self, expr: ExprId, expected: Option<&Ty>) -> Result<Ty, Cancelled> {
        let body = self.body;
        let ty = match &body.exprs[expr].kind {
            ExprKind::Missing => Ty::Unknown,
            ExprKind::Literal(lit) => self.literal_ty(lit),
            ExprKind::Path(path) => match self.infer_path(expr, path)? {
                Some(ty) => ty,
                None => {
                    self.push_diagnostic(InferenceDiagnostic::UnresolvedPath {
                        node: NodeId::Expr(expr),
                        path: path.to_string(),
                    });
                    Ty::Unknown
                }
            },
            ExprKind::Block { label, stmts, tail, .. } => match label {
                Some(label) => {
                    let target = expected.cloned().unwrap_or_else(|| self.ctx.table.new_var());
                    self.breakables.push(Breakable {
                        expr,
                        label: Some(label.name.clone()),
                        coerce: Some(target.clone()),
                        may_break: false,
                        is_block: true,
                    });
                    let ty = self.infer_block(stmts, *tail, Some(&target))?;
                    let breakable = self.breakables.pop();
                    if ty.is_never() && !breakable.is_some_and(|b| b.may_break) { ty } else { target }
                }
                None => self.infer_block(stmts, *tail, expected)?,
            },
            ExprKind::Call { callee, args } => self.infer_call(expr, *callee, args)?,
            ExprKind::MethodCall {
                receiver,
                method,
                generic_args,
                args,
            } => self.infer_method_call(expr, *receiver, &method.name, generic_args, args)?,
            ExprKind::Field { base, name } => self.infer_field(expr, *base, &name.name)?,
            ExprKind::Binary { lhs, op, rhs } => self.infer_binary(expr, *lhs, *op, *rhs)?,
            ExprKind::Unary { op, expr: inner } => self.infer_unary(expr, *op, *inner)?,
            ExprKind::Ref { mutable, expr: inner } => {
                let hint = expected.map(|e| self.ctx.shallow(e)).and_then(|e| match e {
                    Ty::Ref { inner, .. } => Some(*inner),
                    _ => None,
                });
                let inner_ty = self.infer_expr(*inner, hint.as_ref())?;
                Ty::reference(inner_ty, *mutable)
            }
            ExprKind::Assign { lhs, op, rhs } => {
                let lhs_ty = self.infer_expr(*lhs, None)?;
                match op {
                    None => {
                        self.infer_expr_coerce(*rhs, &lhs_ty)?;
                    }
                    Some(op) => {
                        let rhs_ty = self.infer_expr(*rhs, None)?;
                        if self.builtin_arith(*op, &lhs_ty, &rhs_ty).is_none() {
                            let (lang, _) = arith_lang_item(*op);
                            let lang = format!("{lang}_assign");
                            if let Some(trait_ref) = self.lang_trait_ref(&lang, lhs_ty, vec![rhs_ty]) {
                                self.ctx.register(Goal::Implemented(trait_ref));
                            }
                        }
                    }
                }
                Ty::unit()
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.infer_expr_coerce(*cond, &Ty::Bool)?;
                match else_branch {
                    Some(else_branch) => self.infer_branches(&[*then_branch, *else_branch], expected)?,
                    None => {
                        self.infer_expr_coerce(*then_branch, &Ty::unit())?;
                        Ty::unit()
                    }
                }
            }
            ExprKind::Let { pat, expr: scrutinee } => {
                let ty = self.infer_expr(*scrutinee, None)?;
                self.infer_pat(*pat, &ty)?;
                Ty::Bool
            }
            ExprKind::Match { scrutinee, arms } => {
                let scrutinee_ty = self.infer_expr(*scrutinee, None)?;
                for arm in arms {
                    self.infer_pat(arm.pat, &scrutinee_ty)?;
                    if let Some(guard) = arm.guard {
                        self.infer_expr_coerce(guard, &Ty::Bool)?;
                    }
                }
                let bodies: Vec<ExprId> = arms.iter().map(|arm| arm.body).collect();
                if bodies.is_empty() { Ty::Never } else { self.infer_branches(&bodies, expected)? }
            }
            ExprKind::Loop { label, body: loop_body } => {
                let target = expected.cloned().unwrap_or_else(|| self.ctx.table.new_var());
                let breakable = self.infer_loop_body(expr, label.as_ref(), Some(target.clone()), *loop_body)?;
                if breakable.is_some_and(|b| b.may_break) { target } else { Ty::Never }
            }
            ExprKind::While { label, cond, body: loop_body } => {
                self.breakables.push(Breakable {
                    expr,
                    label: label.as_ref().map(|l| l.name.clone()),
                    coerce: None,
                    may_break: false,
                    is_block: false,
                });
                self.infer_expr_coerce(*cond, &Ty::Bool)?;
                self.infer_expr_coerce(*loop_body, &Ty::unit())?;
                self.breakables.pop();
                Ty::unit()
            }
            ExprKind::For {
                label,
                pat,
                iterable,
                body: loop_body,
            } => {
                let iterable_ty = self.infer_expr(*iterable, None)?;
                let item = self.iterator_item(iterable_ty);
                self.infer_pat(*pat, &item)?;
                self.infer_loop_body(expr, label.as_ref(), None, *loop_body)?;
                Ty::unit()
            }
            ExprKind::Break { label, expr: value } => {
                self.infer_break(expr, label.as_ref(), *value)?;
                Ty::Never
            }
            ExprKind::Continue { label } => {
                if let Some(label) = label {
                    if self.scopes.resolve_label(expr, &label.name).is_none() {
                        self.push_diagnostic(InferenceDiagnostic::UnresolvedLabel {
                            expr,
                            label: label.name.clone(),
                        });
                    }
                } else if !self.breakables.iter().any(|b| !b.is_block) {
                    self.push_diagnostic(InferenceDiagnostic::BreakOutsideLoop { expr });
                }
                Ty::Never
            }
            ExprKind::Return(value) => {
                let return_ty = self.return_ty.clone();
                match value {
                    Some(value) => {
                        self.infer_expr_coerce(*value, &return_ty)?;
                    }
                    None => {
                        self.unify_or_report(NodeId::Expr(expr), &return_ty, &Ty::unit());
                    }
                }
                Ty::Never
            }
            ExprKind::Tuple(elems) => {
                let hints = match expected.map(|e| self.ctx.shallow(e)) {
                    Some(Ty::Tuple(hints)) if hints.len() == elems.len() => hints,
                    _ => Vec::new(),
                };
                let mut tys = Vec::with_capacity(elems.len());
                for (index, elem) in elems.iter().enumerate() {
                    tys.push(self.infer_expr(*elem, hints.get(index))?);
                }
                Ty::Tuple(tys)
            }
            ExprKind::Array(elems) => {
                let elem_ty = match expected.map(|e| self.ctx.shallow(e)) {
                    Some(Ty::Array { elem, .. } | Ty::Slice(elem)) => *elem,
                    _ => self.ctx.table.new_var(),
                };
                for elem in elems {
                    self.infer_expr_coerce(*elem, &elem_ty)?;
                }
                Ty::Array {
                    elem: Box::new(elem_ty),
                    len: Some(elems.len() as u64),
                }
            }
            ExprKind::ArrayRepeat { init, len } => {
                let hint = match expected.map(|e| self.ctx.shallow(e)) {
                    Some(Ty::Array { elem, .. }) => Some(*elem),
                    _ => None,
                };
                let elem = self.infer_expr(*init, hint.as_ref())?;
                Ty::Array {
                    elem: Box::new(elem),
                    len: *len,
                }
            }
            ExprKind::Index { base, index } => self.infer_index(*base, *index)?,
            ExprKind::Cast { expr: inner, ty } => {
                self.infer_expr(*inner, None)?;
                self.lower_ty_at(expr, ty)
            }
            ExprKind::StructLit { path, fields, spread } => self.infer_struct_lit(expr, path, fields, *spread)?,
            ExprKind::Closure { params, ret, body: closure_body } => {
                let hints = match expected.map(|e| self.ctx.shallow(e)) {
                    Some(Ty::Fn { params: hints, ret }) if hints.len() == params.len() => Some((hints, *ret)),
                    _ => None,
                };
                let mut param_tys = Vec::with_capacity(params.len());
                for (index, (pat, annotation)) in params.iter().enumerate() {
                    let ty = match annotation {
                        Some(annotation) => self.lower_ty_at(expr, annotation),
                        None => self.ctx.table.new_var(),
                    };
                    if let Some((hints, _)) = &hints {
                        self.ctx.unify(&ty, &hints[index]);
                    }
                    self.infer_pat(*pat, &ty)?;
                    param_tys.push(ty);
                }
                let ret_ty = match ret {
                    Some(ret) => self.lower_ty_at(expr, ret),
                    None => match &hints {
                        Some((_, ret)) => ret.clone(),
                        None => self.ctx.table.new_var(),
                    },
                };
                let outer_return = std::mem::replace(&mut self.return_ty, ret_ty.clone());
                let outer_breakables = std::mem::take(&mut self.breakables);
                let result = self.infer_expr_coerce(*closure_body, &ret_ty);
                self.return_ty = outer_return;
                self.breakables = outer_breakables;
                result?;
                Ty::func(param_tys, ret_ty)
            }
            ExprKind::MacroCall { call, expansion } => match expansion {
                Some(expansion) => self.infer_expr(*expansion, expected)?,
                None => {
                    self.push_diagnostic(InferenceDiagnostic::UnexpandedMacroCall {
                        expr,
                        path: call.path.to_string(),
                    });
                    Ty::Unknown
                }
            },
        };
        Ok(ty)
    }

    pub(crate) fn literal_ty(&mut self, lit: &Literal) -> Ty {
        match lit {
            Literal::Int { suffix, .. } => match suffix.as_deref() {
                Some(s) => IntTy::from_suffix(s)
                    .map(Ty::Int)
                    .or_else(|| UintTy::from_suffix(s).map(Ty::Uint))
                    .or_else(|| FloatTy::from_suffix(s).map(Ty::Float))
                    .unwrap_or(Ty::Unknown),
                None => self.ctx.table.new_int_var(),
            },
            Literal::Float { suffix, .. } => match suffix.as_deref().and_then(FloatTy::from_suffix) {
                Some(f) => Ty::Float(f),
                None => self.ctx.table.new_float_var(),
            },
            Literal::Bool(_) => Ty::Bool,
            Literal::Char(_) => Ty::Char,
            Literal::Byte(_) => Ty::Uint(UintTy::U8),
            Literal::Str(_) => Ty::reference(Ty::Str, false),
            Literal::ByteStr(bytes) => Ty::reference(
                Ty::Array {
                    elem: Box::new(Ty::Uint(UintTy::U8)),
                    len: Some(bytes.len() as u64),
                },
                false,
            ),
        }
    }

    fn infer_block(&mut self, stmts: &[Stmt], tail: Option<ExprId>, expected: Option<&Ty>) -> Result<Ty, Cancelled> {
        let mut diverges = false;
        for stmt in stmts {
            match stmt {
                Stmt::Let {
                    pat,
                    ty,
                    init,
                    else_branch,
                } => {
                    let declared = ty.as_ref().map(|ty| self.lower_ty_at(self.current_expr(), ty));
                    let init_ty = match (init, &declared) {
                        (Some(init), Some(declared)) => Some(self.infer_expr_coerce(*init, declared)?),
                        (Some(init), None) => Some(self.infer_expr(*init, None)?),
                        (None, _) => None,
                    };
                    if init_ty.as_ref().is_some_and(Ty::is_never) {
                        diverges = true;
                    }
                    let pat_ty = match (declared, init_ty) {
                        (Some(declared), _) => declared,
                        (None, Some(init_ty)) => init_ty,
                        (None, None) => self.ctx.table.new_var(),
                    };
                    self.infer_pat(*pat, &pat_ty)?;
                    if let Some(else_branch) = else_branch {
                        self.infer_expr_coerce(*else_branch, &Ty::Never)?;
                    }
                }
                Stmt::Expr { expr, has_semi } => {
                    let ty = if *has_semi {
                        self.infer_expr(*expr, None)?
                    } else {
                        self.infer_expr_coerce(*expr, &Ty::unit())?
                    };
                    if self.ctx.shallow(&ty).is_never() {
                        diverges = true;
                    }
                }
                Stmt::Item(_) => {}
            }
        }
        match tail {
            Some(tail) => match expected {
                Some(expected) => {
                    let ty = self.infer_expr_coerce(tail, expected)?;
                    Ok(if self.ctx.shallow(&ty).is_never() { Ty::Never } else { expected.clone() })
                }
                None => self.infer_expr(tail, None),
            },
            None if diverges => Ok(Ty::Never),
            None => Ok(Ty::unit()),
        }
    }

    /// Arms of an `if`/`match`: the common type every branch coerces to;
    /// never when every branch diverges
    fn infer_branches(&mut self, branches: &[ExprId], expected: Option<&Ty>) -> Result<Ty, Cancelled> {
        let target = expected.cloned().unwrap_or_else(|| self.ctx.table.new_var());
        let mut all_diverge = true;
        for &branch in branches {
            let ty = self.infer_expr_coerce(branch, &target)?;
            if !self.ctx.shallow(&ty).is_never() {
                all_diverge = false;
            }
        }
        Ok(if all_diverge { Ty::Never } else { target })
    }

    fn infer_loop_body(
        &mut self,
        expr: ExprId,
        label: Option<&Label>,
        coerce: Option<Ty>,
        body: ExprId,
    ) -> Result<Option<Breakable>, Cancelled> {
        self.breakables.push(Breakable {
            expr,
            label: label.map(|l| l.name.clone()),
            coerce,
            may_break: false,
            is_block: false,
        });
        let result = self.infer_expr_coerce(body, &Ty::unit());
        let breakable = self.breakables.pop();
        result?;
        Ok(breakable)
    }

    fn infer_break(&mut self, expr: ExprId, label: Option<&Label>, value: Option<ExprId>) -> Result<(), Cancelled> {
        let index = match label {
            Some(label) => {
                let target = self.scopes.resolve_label(expr, &label.name);
                let found = target.and_then(|target| self.breakables.iter().rposition(|b| b.expr == target));
                if found.is_none() {
                    self.push_diagnostic(InferenceDiagnostic::UnresolvedLabel {
                        expr,
                        label: label.name.clone(),
                    });
                }
                found
            }
            None => {
                let found = self.breakables.iter().rposition(|b| !b.is_block);
                if found.is_none() {
                    self.push_diagnostic(InferenceDiagnostic::BreakOutsideLoop { expr });
                }
                found
            }
        };
        let target = index.and_then(|i| self.breakables[i].coerce.clone());
        match (value, target) {
            (Some(value), Some(target)) => {
                self.infer_expr_coerce(value, &target)?;
            }
            (Some(value), None) => {
                self.infer_expr(value, None)?;
            }
            (None, Some(target)) => {
                self.unify_or_report(NodeId::Expr(expr), &target, &Ty::unit());
            }
            (None, None) => {}
        }
        if let Some(index) = index {
            self.breakables[index].may_break = true;
        }
        Ok(())
    }

    // === Paths ===

    /// Type of a path in value position; None when it does not resolve
    pub(crate) fn infer_path(&mut self, expr: ExprId, path: &Path) -> Result<Option<Ty>, Cancelled> {
        if let Some(qualifier) = &path.qualifier {
            return self.infer_qualified_path(expr, path, &qualifier.self_ty, qualifier.trait_ref.as_ref());
        }
        let resolver = self.resolver_at(expr);
        let Some(resolution) = resolver.resolve_path_in_value_ns(path)? else {
            return Ok(None);
        };
        let explicit = self.explicit_args(expr, path.segments.len().checked_sub(1), path);
        match resolution {
            ResolveValueResult::Value(value) => {
                self.write_path(expr, value);
                Ok(Some(self.value_ty(expr, value, &explicit)))
            }
            ResolveValueResult::Partial(ns, index) => {
                if index + 1 != path.segments.len() {
                    return Ok(None);
                }
                let lowerer = TyLowerer::new(self.ctx.hir(), resolver);
                let self_ty = lowerer.lower_type_ns(ns, index.checked_sub(1).map(|i| &path.segments[i]));
                let self_ty = self.ctx.normalize(self_ty);
                let self_ty = self.insert_vars(self_ty);
                let name = &path.segments[index].name;
                if let TypeNs::SelfType(_) | TypeNs::Def(_) = ns {
                    if let Some(ty) = self.variant_through_type(expr, &self_ty, name) {
                        return Ok(Some(ty));
                    }
                }
                Ok(self.assoc_item_ty(expr, &self_ty, name, &explicit))
            }
        }
    }

    /// `Self::Variant` or `Alias::Variant` naming an enum variant
    fn variant_through_type(&mut self, expr: ExprId, self_ty: &Ty, name: &str) -> Option<Ty> {
        let hir = self.ctx.hir();
        let Ty::Adt { def, args } = self.ctx.shallow(self_ty) else {
            return None;
        };
        if hir.def(def).kind() != DefKind::Enum {
            return None;
        }
        let variant = hir.child_by_name(def, name)?;
        self.write_path(expr, ValueNs::Def(variant));
        let adt = Ty::Adt { def, args: args.clone() };
        let subst = Subst::from_pairs(&type_params(hir, def), args);
        Some(match ctor_sig(hir, variant) {
            Some(sig) => {
                let params = sig.params.iter().map(|p| self.ctx.normalize(p.subst(&subst))).collect();
                Ty::func(params, adt)
            }
            None => adt,
        })
    }

    fn infer_qualified_path(
        &mut self,
        expr: ExprId,
        path: &Path,
        self_ty: &ferrite_ast::TypeRef,
        trait_path: Option<&Path>,
    ) -> Result<Option<Ty>, Cancelled> {
        let self_ty = self.lower_ty_at(expr, self_ty);
        let Some(name) = path.last_segment().map(|s| s.name.clone()) else {
            return Ok(None);
        };
        let explicit = self.explicit_args(expr, path.segments.len().checked_sub(1), path);
        let Some(trait_path) = trait_path else {
            return Ok(self.assoc_item_ty(expr, &self_ty, &name, &explicit));
        };
        let lowerer = TyLowerer::new(self.ctx.hir(), self.resolver_at(expr));
        let Some(trait_) = lowerer.resolve_trait(trait_path) else {
            return Ok(None);
        };
        let Some(item) = self.ctx.hir().child_by_name(trait_, &name) else {
            return Ok(None);
        };
        Ok(Some(self.instantiate_item(expr, item, PickSource::Trait(trait_), &self_ty, &explicit)))
    }

    /// Lowered generic arguments of path segment `index`
    fn explicit_args(&mut self, expr: ExprId, index: Option<usize>, path: &Path) -> Vec<Ty> {
        let Some(args) = index.and_then(|i| path.segments.get(i)).and_then(|s| s.args.as_ref()) else {
            return Vec::new();
        };
        let types: Vec<ferrite_ast::TypeRef> = args.types().cloned().collect();
        types.iter().map(|ty| self.lower_ty_at(expr, ty)).collect()
    }

    fn value_ty(&mut self, expr: ExprId, value: ValueNs, explicit: &[Ty]) -> Ty {
        let hir = self.ctx.hir();
        match value {
            ValueNs::Local(pat) => self.result.type_of_pat.get(pat).cloned().unwrap_or(Ty::Unknown),
            ValueNs::SelfCtor(imp) => {
                let self_ty = impl_self_ty(hir, imp);
                match &self_ty {
                    Ty::Adt { def, args } => match ctor_sig(hir, *def) {
                        Some(sig) => {
                            let subst = Subst::from_pairs(&type_params(hir, *def), args.iter().cloned());
                            Ty::func(sig.params.iter().map(|p| p.subst(&subst)).collect(), self_ty.clone())
                        }
                        None => self_ty.clone(),
                    },
                    _ => Ty::Unknown,
                }
            }
            ValueNs::Def(def) => match hir.def(def).kind() {
                DefKind::Function => {
                    let container = hir.container(def).filter(|c| hir.is_trait(*c));
                    let subst = self.ctx.instantiate(def, Subst::new(), explicit);
                    if let Some(trait_) = container {
                        self.refinements.push(Refinement {
                            target: RefineTarget::Path(expr),
                            item: def,
                            trait_ref: trait_ref_for(hir, trait_, &subst),
                        });
                    }
                    match fn_sig(hir, def) {
                        Some(sig) => {
                            let sig = sig.subst(&subst);
                            let ty = sig.to_fn_ty();
                            self.ctx.normalize(ty)
                        }
                        None => Ty::Unknown,
                    }
                }
                DefKind::Struct | DefKind::Variant => {
                    let adt = adt_of(hir, def);
                    let subst = self.ctx.instantiate(adt, Subst::new(), explicit);
                    let adt_ty = Ty::Adt {
                        def: adt,
                        args: type_params(hir, adt)
                            .into_iter()
                            .map(|p| subst.get(p).cloned().unwrap_or(Ty::Unknown))
                            .collect(),
                    };
                    match hir.def(def).struct_kind() {
                        Some(ferrite_ast::StructKind::Tuple(_)) => match ctor_sig(hir, def) {
                            Some(sig) => {
                                let params = sig.params.iter().map(|p| p.subst(&subst)).collect();
                                let ty = Ty::func(params, adt_ty);
                                self.ctx.normalize(ty)
                            }
                            None => Ty::Unknown,
                        },
                        Some(ferrite_ast::StructKind::Unit) => adt_ty,
                        _ => Ty::Unknown,
                    }
                }
                DefKind::Const | DefKind::Static => {
                    let ty = value_ty(hir, def);
                    self.ctx.normalize(ty)
                }
                _ => Ty::Unknown,
            },
        }
    }

    /// `Type::name` for an associated function or constant
    fn assoc_item_ty(&mut self, expr: ExprId, self_ty: &Ty, name: &str, explicit: &[Ty]) -> Option<Ty> {
        let traits = self.traits_in_scope.clone();
        let (item, source) = self.ctx.lookup_assoc_item(self_ty, name, &traits)?;
        Some(self.instantiate_item(expr, item, source, self_ty, explicit))
    }

    fn instantiate_item(&mut self, expr: ExprId, item: ferrite_hir::DefId, source: PickSource, self_ty: &Ty, explicit: &[Ty]) -> Ty {
        let hir = self.ctx.hir();
        self.write_path(expr, ValueNs::Def(item));
        let subst = self.ctx.instantiate_assoc(item, source, self_ty, explicit);
        if let PickSource::Trait(trait_) = source {
            self.refinements.push(Refinement {
                target: RefineTarget::Path(expr),
                item,
                trait_ref: trait_ref_for(hir, trait_, &subst),
            });
        }
        let ty = match hir.def(item).kind() {
            DefKind::Function => fn_sig(hir, item).map_or(Ty::Unknown, |sig| sig.subst(&subst).to_fn_ty()),
            _ => value_ty(hir, item).subst(&subst),
        };
        self.ctx.normalize(ty)
    }

    // === Calls ===

    fn infer_call(&mut self, expr: ExprId, callee: ExprId, args: &[ExprId]) -> Result<Ty, Cancelled> {
        let callee_ty = self.infer_expr(callee, None)?;
        let mut callee_ty = self.ctx.shallow(&callee_ty);
        while let Ty::Ref { inner, .. } = callee_ty {
            callee_ty = self.ctx.shallow(&inner);
        }
        let (params, ret) = match callee_ty {
            Ty::Fn { params, ret } => (params, *ret),
            Ty::Infer(InferTy::Var(_)) => {
                let params: Vec<Ty> = args.iter().map(|_| self.ctx.table.new_var()).collect();
                let ret = self.ctx.table.new_var();
                self.ctx.unify(&callee_ty, &Ty::func(params.clone(), ret.clone()));
                (params, ret)
            }
            Ty::Unknown => {
                for arg in args {
                    self.infer_expr(*arg, None)?;
                }
                return Ok(Ty::Unknown);
            }
            other => {
                self.push_diagnostic(InferenceDiagnostic::NotCallable { expr, ty: other });
                for arg in args {
                    self.infer_expr(*arg, None)?;
                }
                return Ok(Ty::Unknown);
            }
        };
        self.check_args(expr, &params, args)?;
        Ok(self.ctx.normalize(ret))
    }

    fn check_args(&mut self, expr: ExprId, params: &[Ty], args: &[ExprId]) -> Result<(), Cancelled> {
        if params.len() != args.len() {
            self.push_diagnostic(InferenceDiagnostic::ArgCountMismatch {
                expr,
                expected: params.len(),
                found: args.len(),
            });
        }
        for (index, arg) in args.iter().enumerate() {
            match params.get(index) {
                Some(param) => {
                    let param = self.ctx.normalize(param.clone());
                    self.infer_expr_coerce(*arg, &param)?;
                }
                None => {
                    self.infer_expr(*arg, None)?;
                }
            }
        }
        Ok(())
    }

    fn infer_method_call(
        &mut self,
        expr: ExprId,
        receiver: ExprId,
        name: &str,
        generic_args: &[ferrite_ast::TypeRef],
        args: &[ExprId],
    ) -> Result<Ty, Cancelled> {
        let receiver_ty = self.infer_expr(receiver, None)?;
        let receiver_ty = self.ctx.resolve(&receiver_ty);
        let traits = self.traits_in_scope.clone();
        let Some(pick) = self.ctx.lookup_method(&receiver_ty, name, &traits) else {
            if !matches!(self.ctx.shallow(&receiver_ty), Ty::Infer(InferTy::Var(_)) | Ty::Unknown) {
                self.push_diagnostic(InferenceDiagnostic::UnresolvedMethod {
                    expr,
                    receiver: receiver_ty,
                    name: name.to_string(),
                });
            }
            for arg in args {
                self.infer_expr(*arg, None)?;
            }
            return Ok(Ty::Unknown);
        };

        let mut adjustments: Vec<Adjustment> = pick.steps[1..]
            .iter()
            .filter(|s| s.kind != StepKind::Unsize)
            .map(|s| Adjustment {
                kind: Adjust::Deref {
                    overloaded: s.kind == StepKind::OverloadedDeref,
                },
                target: s.ty.clone(),
            })
            .collect();
        let self_ty = pick.self_ty();
        let adjusted = match pick.autoref {
            Some(mutable) => {
                let base = pick
                    .steps
                    .iter()
                    .rev()
                    .find(|s| s.kind != StepKind::Unsize)
                    .map_or_else(|| self_ty.clone(), |s| s.ty.clone());
                adjustments.push(Adjustment {
                    kind: Adjust::Borrow { mutable },
                    target: Ty::reference(base, mutable),
                });
                Ty::reference(self_ty.clone(), mutable)
            }
            None => self_ty.clone(),
        };
        if pick.steps.last().is_some_and(|s| s.kind == StepKind::Unsize) {
            adjustments.push(Adjustment {
                kind: Adjust::Unsize,
                target: adjusted.clone(),
            });
        }
        self.push_adjustments(receiver, adjustments);

        let explicit: Vec<Ty> = generic_args.iter().map(|ty| self.lower_ty_at(expr, ty)).collect();
        let subst = self.ctx.instantiate_assoc(pick.method, pick.source, &self_ty, &explicit);
        self.result.methods.insert(
            expr,
            MethodResolution {
                method: pick.method,
                self_ty: self_ty.clone(),
            },
        );
        if let PickSource::Trait(trait_) = pick.source {
            self.refinements.push(Refinement {
                target: RefineTarget::Method(expr),
                item: pick.method,
                trait_ref: trait_ref_for(self.ctx.hir(), trait_, &subst),
            });
        }
        let Some(sig) = fn_sig(self.ctx.hir(), pick.method) else {
            return Ok(Ty::Unknown);
        };
        let sig = sig.subst(&subst);
        if let Some(first) = sig.params.first() {
            let first = self.ctx.normalize(first.clone());
            self.unify_or_report(NodeId::Expr(receiver), &first, &adjusted);
        }
        self.check_args(expr, sig.params.get(1..).unwrap_or(&[]), args)?;
        Ok(self.ctx.normalize(sig.ret))
    }

    // === Fields and indexing ===

    fn infer_field(&mut self, expr: ExprId, base: ExprId, name: &str) -> Result<Ty, Cancelled> {
        let base_ty = self.infer_expr(base, None)?;
        let hir = self.ctx.hir();
        let steps = self.ctx.autoderef(&base_ty);
        for (index, step) in steps.iter().enumerate() {
            let found = match &step.ty {
                Ty::Tuple(elems) => name.parse::<usize>().ok().and_then(|i| {
                    elems.get(i).map(|ty| (ty.clone(), FieldRef { owner: None, index: i }))
                }),
                Ty::Adt { def, args } if hir.def(*def).kind() == DefKind::Struct => {
                    hir.field_index(*def, name).and_then(|i| {
                        let subst = Subst::from_pairs(&type_params(hir, *def), args.iter().cloned());
                        field_types(hir, *def).get(i).map(|(_, ty)| {
                            (
                                ty.subst(&subst),
                                FieldRef {
                                    owner: Some(*def),
                                    index: i,
                                },
                            )
                        })
                    })
                }
                _ => None,
            };
            let Some((ty, field)) = found else { continue };
            let adjustments = steps[1..=index]
                .iter()
                .map(|s| Adjustment {
                    kind: Adjust::Deref {
                        overloaded: s.kind == StepKind::OverloadedDeref,
                    },
                    target: s.ty.clone(),
                })
                .collect();
            self.push_adjustments(base, adjustments);
            self.result.fields.insert(expr, field);
            return Ok(self.ctx.normalize(ty));
        }
        let receiver = self.ctx.resolve(&base_ty);
        if !matches!(receiver, Ty::Infer(InferTy::Var(_)) | Ty::Unknown) {
            self.push_diagnostic(InferenceDiagnostic::UnresolvedField {
                expr,
                receiver,
                name: name.to_string(),
            });
        }
        Ok(Ty::Unknown)
    }

    fn infer_index(&mut self, base: ExprId, index: ExprId) -> Result<Ty, Cancelled> {
        let base_ty = self.infer_expr(base, None)?;
        let index_ty = self.infer_expr(index, None)?;
        let steps = self.ctx.autoderef(&base_ty);
        let index_shallow = self.ctx.shallow(&index_ty);
        for (step_index, step) in steps.iter().enumerate() {
            let builtin = match &step.ty {
                Ty::Array { elem, .. } | Ty::Slice(elem) if index_shallow.is_integral() => Some(elem.as_ref().clone()),
                _ => None,
            };
            let ty = match builtin {
                Some(elem) => {
                    self.ctx.unify(&index_ty, &Ty::Uint(UintTy::Usize));
                    elem
                }
                None => {
                    let Some(trait_ref) = self.lang_trait_ref("index", step.ty.clone(), vec![index_ty.clone()]) else {
                        break;
                    };
                    if step.ty.contains_infer() || !self.ctx.may_implement(&trait_ref) {
                        continue;
                    }
                    self.ctx.register(Goal::Implemented(trait_ref.clone()));
                    self.ctx.normalize(Ty::Projection(Box::new(ProjectionTy {
                        trait_ref,
                        name: "Output".into(),
                    })))
                }
            };
            let adjustments = steps[1..=step_index]
                .iter()
                .filter(|s| s.kind != StepKind::Unsize)
                .map(|s| Adjustment {
                    kind: Adjust::Deref {
                        overloaded: s.kind == StepKind::OverloadedDeref,
                    },
                    target: s.ty.clone(),
                })
                .collect();
            self.push_adjustments(base, adjustments);
            return Ok(ty);
        }
        Ok(Ty::Unknown)
    }

    fn infer_struct_lit(
        &mut self,
        expr: ExprId,
        path: &Path,
        fields: &[ferrite_ast::FieldInit],
        spread: Option<ExprId>,
    ) -> Result<Ty, Cancelled> {
        let Some((variant, adt_ty)) = self.resolve_struct_path(expr, path)? else {
            self.push_diagnostic(InferenceDiagnostic::UnresolvedPath {
                node: NodeId::Expr(expr),
                path: path.to_string(),
            });
            for field in fields {
                self.infer_expr(field.expr, None)?;
            }
            if let Some(spread) = spread {
                self.infer_expr(spread, None)?;
            }
            return Ok(Ty::Unknown);
        };
        let field_tys = self.variant_field_types(variant, &adt_ty);
        for (index, field) in fields.iter().enumerate() {
            match field_tys.iter().position(|(name, _)| *name == field.name.name) {
                Some(position) => {
                    self.result.record_fields.insert(
                        (NodeId::Expr(expr), index),
                        FieldRef {
                            owner: Some(variant),
                            index: position,
                        },
                    );
                    let ty = self.ctx.normalize(field_tys[position].1.clone());
                    self.infer_expr_coerce(field.expr, &ty)?;
                }
                None => {
                    self.push_diagnostic(InferenceDiagnostic::NoSuchField {
                        node: NodeId::Expr(field.expr),
                        owner: variant,
                        name: field.name.name.clone(),
                    });
                    self.infer_expr(field.expr, None)?;
                }
            }
        }
        if let Some(spread) = spread {
            self.infer_expr_coerce(spread, &adt_ty)?;
        }
        Ok(adt_ty)
    }

    /// Struct or variant a struct literal or record pattern names, with the
    /// instantiated type it builds
    pub(crate) fn resolve_struct_path(
        &mut self,
        expr: ExprId,
        path: &Path,
    ) -> Result<Option<(ferrite_hir::DefId, Ty)>, Cancelled> {
        let hir = self.ctx.hir();
        let resolved = self.resolver_at(expr).resolve_path_in_type_ns(path)?;
        Ok(match resolved {
            Some((TypeNs::Def(def), None)) if matches!(hir.def(def).kind(), DefKind::Struct | DefKind::Variant) => {
                let adt = adt_of(hir, def);
                let subst = self.ctx.instantiate(adt, Subst::new(), &[]);
                let args = type_params(hir, adt)
                    .into_iter()
                    .map(|p| subst.get(p).cloned().unwrap_or(Ty::Unknown))
                    .collect();
                Some((def, Ty::Adt { def: adt, args }))
            }
            Some((TypeNs::SelfType(imp), None)) if hir.def(imp).kind() == DefKind::Impl => {
                match impl_self_ty(hir, imp) {
                    ty @ Ty::Adt { def, .. } if hir.def(def).kind() == DefKind::Struct => Some((def, ty)),
                    _ => None,
                }
            }
            _ => None,
        })
    }

    /// Field names and types of a struct or variant inside `adt_ty`
    pub(crate) fn variant_field_types(&self, variant: ferrite_hir::DefId, adt_ty: &Ty) -> Vec<(String, Ty)> {
        let hir = self.ctx.hir();
        let Ty::Adt { def, args } = adt_ty else {
            return Vec::new();
        };
        let subst = Subst::from_pairs(&type_params(hir, *def), args.iter().cloned());
        field_types(hir, variant)
            .into_iter()
            .map(|(name, ty)| (name, ty.subst(&subst)))
            .collect()
    }

    // === Operators ===

    /// Result of a built-in arithmetic operator, None when the operands need
    /// an overloaded impl
    fn builtin_arith(&mut self, op: ArithOp, lhs: &Ty, rhs: &Ty) -> Option<Ty> {
        let l = self.ctx.shallow(lhs);
        let r = self.ctx.shallow(rhs);
        let is_var = |t: &Ty| matches!(t, Ty::Infer(InferTy::Var(_)));
        if matches!(op, ArithOp::Shl | ArithOp::Shr) {
            return (l.is_integral() && (r.is_integral() || is_var(&r))).then_some(l);
        }
        if is_bit_op(op) && l == Ty::Bool && (r == Ty::Bool || is_var(&r)) {
            self.ctx.unify(&l, &r);
            return Some(Ty::Bool);
        }
        let numeric = (l.is_numeric() && (r.is_numeric() || is_var(&r))) || (is_var(&l) && r.is_numeric());
        if numeric && self.ctx.unify(&l, &r) {
            return Some(self.ctx.shallow(&l));
        }
        None
    }

    fn infer_binary(&mut self, expr: ExprId, lhs: ExprId, op: BinaryOp, rhs: ExprId) -> Result<Ty, Cancelled> {
        match op {
            BinaryOp::Logic(_) => {
                self.infer_expr_coerce(lhs, &Ty::Bool)?;
                self.infer_expr_coerce(rhs, &Ty::Bool)?;
                Ok(Ty::Bool)
            }
            BinaryOp::Cmp(cmp) => {
                let lhs_ty = self.infer_expr(lhs, None)?;
                let shallow = self.ctx.shallow(&lhs_ty);
                if is_scalar(&shallow) || matches!(shallow, Ty::Infer(_) | Ty::Unknown) {
                    self.infer_expr_coerce(rhs, &lhs_ty)?;
                    return Ok(Ty::Bool);
                }
                let rhs_ty = self.infer_expr(rhs, None)?;
                let lang = match cmp {
                    CmpOp::Eq | CmpOp::Ne => "eq",
                    CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => "partial_ord",
                };
                match self.lang_trait_ref(lang, lhs_ty.clone(), vec![rhs_ty.clone()]) {
                    Some(trait_ref) => self.ctx.register(Goal::Implemented(trait_ref)),
                    None => {
                        self.unify_or_report(NodeId::Expr(rhs), &lhs_ty, &rhs_ty);
                    }
                }
                Ok(Ty::Bool)
            }
            BinaryOp::Arith(op) => {
                let lhs_ty = self.infer_expr(lhs, None)?;
                let rhs_ty = self.infer_expr(rhs, None)?;
                if let Some(ty) = self.builtin_arith(op, &lhs_ty, &rhs_ty) {
                    return Ok(ty);
                }
                let (lang, method) = arith_lang_item(op);
                Ok(self.overloaded_op(expr, lang, method, lhs_ty, vec![rhs_ty]))
            }
        }
    }

    /// `<lhs as Trait<args>>::Output` for an operator lang trait; the trait's
    /// method is recorded as the expression's method
    fn overloaded_op(&mut self, expr: ExprId, lang: &str, method: &str, lhs: Ty, args: Vec<Ty>) -> Ty {
        let Some(trait_ref) = self.lang_trait_ref(lang, lhs.clone(), args) else {
            return Ty::Unknown;
        };
        self.ctx.register(Goal::Implemented(trait_ref.clone()));
        if let Some(method) = assoc_fn(self.ctx.hir(), trait_ref.trait_, method) {
            self.result.methods.insert(
                expr,
                MethodResolution {
                    method,
                    self_ty: lhs,
                },
            );
            self.refinements.push(Refinement {
                target: RefineTarget::Method(expr),
                item: method,
                trait_ref: trait_ref.clone(),
            });
        }
        self.ctx.normalize(Ty::Projection(Box::new(ProjectionTy {
            trait_ref,
            name: "Output".into(),
        })))
    }

    fn infer_unary(&mut self, expr: ExprId, op: UnaryOp, inner: ExprId) -> Result<Ty, Cancelled> {
        let ty = self.infer_expr(inner, None)?;
        let shallow = self.ctx.shallow(&ty);
        Ok(match op {
            UnaryOp::Deref => match &shallow {
                Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => inner.as_ref().clone(),
                Ty::Infer(_) | Ty::Unknown => Ty::Unknown,
                _ => match self.ctx.overloaded_deref(&shallow) {
                    Some(target) => {
                        self.push_adjustments(
                            inner,
                            vec![Adjustment {
                                kind: Adjust::Deref { overloaded: true },
                                target: target.clone(),
                            }],
                        );
                        target
                    }
                    None => Ty::Unknown,
                },
            },
            UnaryOp::Neg => match &shallow {
                Ty::Int(_) | Ty::Float(_) | Ty::Infer(InferTy::Int(_) | InferTy::Float(_)) => shallow,
                Ty::Unknown | Ty::Infer(_) => Ty::Unknown,
                _ => self.overloaded_op(expr, "neg", "neg", shallow, Vec::new()),
            },
            UnaryOp::Not => match &shallow {
                Ty::Bool | Ty::Int(_) | Ty::Uint(_) | Ty::Infer(InferTy::Int(_)) => shallow,
                Ty::Unknown | Ty::Infer(_) => Ty::Unknown,
                _ => self.overloaded_op(expr, "not", "not", shallow, Vec::new()),
            },
        })
    }

    /// Element type produced by iterating over `ty` in a `for` loop
    fn iterator_item(&mut self, ty: Ty) -> Ty {
        if let Some(trait_ref) = self.lang_trait_ref("into_iterator", ty.clone(), Vec::new()) {
            self.ctx.register(Goal::Implemented(trait_ref.clone()));
            return self.ctx.normalize(Ty::Projection(Box::new(ProjectionTy {
                trait_ref,
                name: "Item".into(),
            })));
        }
        match self.ctx.shallow(&ty) {
            Ty::Array { elem, .. } | Ty::Slice(elem) => *elem,
            Ty::Ref { inner, mutable } => match self.ctx.shallow(&inner) {
                Ty::Array { elem, .. } | Ty::Slice(elem) => Ty::reference(*elem, mutable),
                _ => Ty::Unknown,
            },
            _ => Ty::Unknown,
        }
    }
}
