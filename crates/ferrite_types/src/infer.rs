//! Body inference driver.
//!
//! One [`InferenceContext`] walks one body. It owns the unification tables,
//! the pending obligations and the unresolved result maps; nothing of it is
//! visible outside until [`InferenceContext::finish`] resolves every type
//! and freezes the result.

use ferrite_ast::{Body, ExprId, PatId, TypeRef};
use ferrite_hir::{DefId, DefSource, ExprScopes, Resolver, ValueNs};
use ferrite_syntax::{Cancellation, Cancelled};
use tracing::{debug, trace};

use crate::cache::InferError;
use crate::db::TypeDb;
use crate::lower::{TyLowerer, fn_sig, type_params, value_ty};
use crate::result::{Adjustment, InferenceDiagnostic, InferenceResult, NodeId};
use crate::table::InferenceTable;
use crate::traits::{Goal, InferCtxt, ParamEnv};
use crate::ty::{TraitRef, Ty};

/// Infer the body of a function, const or static
pub(crate) fn infer_body(db: &TypeDb, def: DefId, cancel: &Cancellation) -> Result<InferenceResult, InferError> {
    let hir = db.hir();
    let body = match &hir.def(def).source {
        DefSource::Function(f) => f.body.as_ref(),
        DefSource::Const(c) => c.body.as_ref(),
        DefSource::Static(s) => s.body.as_ref(),
        _ => None,
    };
    let Some(body) = body else {
        return Err(InferError::NoBody(def));
    };
    debug!(?def, name = hir.def_name(def), "inferring body");
    let scopes = ExprScopes::new(body);
    let mut icx = InferenceContext::new(db, def, body, &scopes, cancel.clone());
    icx.infer_signature_and_body()?;
    Ok(icx.finish()?)
}

/// Loop or labelled block `break` may target
#[derive(Debug)]
pub(crate) struct Breakable {
    pub(crate) expr: ExprId,
    pub(crate) label: Option<String>,
    /// Type break values coerce to; None for `while` and `for`
    pub(crate) coerce: Option<Ty>,
    pub(crate) may_break: bool,
    /// Labelled blocks are only reachable by a labelled `break`
    pub(crate) is_block: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum RefineTarget {
    Method(ExprId),
    Path(ExprId),
}

/// Trait item use whose impl is looked up once types are final
#[derive(Debug)]
pub(crate) struct Refinement {
    pub(crate) target: RefineTarget,
    pub(crate) item: DefId,
    pub(crate) trait_ref: TraitRef,
}

pub(crate) struct InferenceContext<'a> {
    pub(crate) ctx: InferCtxt<'a>,
    pub(crate) owner: DefId,
    pub(crate) body: &'a Body,
    pub(crate) scopes: &'a ExprScopes,
    pub(crate) result: InferenceResult,
    pub(crate) return_ty: Ty,
    pub(crate) breakables: Vec<Breakable>,
    pub(crate) refinements: Vec<Refinement>,
    pub(crate) traits_in_scope: Vec<DefId>,
}

impl<'a> InferenceContext<'a> {
    pub(crate) fn new(
        db: &'a TypeDb,
        owner: DefId,
        body: &'a Body,
        scopes: &'a ExprScopes,
        cancel: Cancellation,
    ) -> Self {
        let hir = db.hir();
        let env = ParamEnv::for_def(hir, owner);
        let traits_in_scope = hir.traits_in_scope(hir.def_module(owner));
        Self {
            ctx: InferCtxt::new(db, env, cancel),
            owner,
            body,
            scopes,
            result: InferenceResult::default(),
            return_ty: Ty::Unknown,
            breakables: Vec::new(),
            refinements: Vec::new(),
            traits_in_scope,
        }
    }

    fn infer_signature_and_body(&mut self) -> Result<(), Cancelled> {
        let hir = self.ctx.hir();
        let declared = match &hir.def(self.owner).source {
            DefSource::Function(_) => {
                let sig = fn_sig(hir, self.owner);
                let params = sig.as_ref().map(|s| s.params.clone()).unwrap_or_default();
                for (index, &pat) in self.body.params.iter().enumerate() {
                    let ty = match params.get(index) {
                        Some(ty) => {
                            let ty = self.ctx.normalize(ty.clone());
                            self.insert_vars(ty)
                        }
                        None => self.ctx.table.new_var(),
                    };
                    self.infer_pat(pat, &ty)?;
                }
                sig.map_or_else(Ty::unit, |s| s.ret)
            }
            _ => value_ty(hir, self.owner),
        };
        let declared = self.ctx.normalize(declared);
        self.return_ty = self.insert_vars(declared);
        let return_ty = self.return_ty.clone();
        self.infer_expr_coerce(self.body.root, &return_ty)?;
        Ok(())
    }

    // === Helpers shared by expressions and patterns ===

    pub(crate) fn resolver_at(&self, expr: ExprId) -> Resolver<'a> {
        Resolver::for_expr(self.ctx.hir(), self.owner, self.body, self.scopes, expr)
            .with_cancellation(self.ctx.cancel.clone())
    }

    /// Expression the walker is inside of, for resolving paths in patterns
    pub(crate) fn current_expr(&self) -> ExprId {
        self.ctx.origin.unwrap_or(self.body.root)
    }

    /// Lower a written type at `expr`; holes become fresh variables
    pub(crate) fn lower_ty_at(&mut self, expr: ExprId, ty: &TypeRef) -> Ty {
        let lowered = TyLowerer::new(self.ctx.hir(), self.resolver_at(expr)).lower_ty(ty);
        let lowered = self.ctx.normalize(lowered);
        self.insert_vars(lowered)
    }

    /// Replace unknown parts of a type with fresh variables
    pub(crate) fn insert_vars(&mut self, ty: Ty) -> Ty {
        if !ty.contains_unknown() {
            return ty;
        }
        let table = &mut self.ctx.table;
        ty.fold(&mut |t| match t {
            Ty::Unknown => table.new_var(),
            other => other,
        })
    }

    pub(crate) fn write_expr_ty(&mut self, expr: ExprId, ty: Ty) {
        self.result.type_of_expr.insert(expr, ty);
    }

    pub(crate) fn write_pat_ty(&mut self, pat: PatId, ty: Ty) {
        self.result.type_of_pat.insert(pat, ty);
    }

    pub(crate) fn write_path(&mut self, expr: ExprId, value: ValueNs) {
        self.result.expr_paths.insert(expr, value);
    }

    pub(crate) fn push_adjustments(&mut self, expr: ExprId, adjustments: Vec<Adjustment>) {
        if !adjustments.is_empty() {
            self.result.expr_adjustments.entry(expr).or_default().extend(adjustments);
        }
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: InferenceDiagnostic) {
        trace!(?diagnostic, "inference diagnostic");
        self.result.diagnostics.push(diagnostic);
    }

    /// Unify `actual` into `expected`, reporting a mismatch at `node`
    pub(crate) fn unify_or_report(&mut self, node: NodeId, expected: &Ty, actual: &Ty) -> bool {
        if self.ctx.unify(expected, actual) {
            return true;
        }
        let expected = self.ctx.resolve(expected);
        let actual = self.ctx.resolve(actual);
        self.push_diagnostic(InferenceDiagnostic::TypeMismatch { node, expected, actual });
        false
    }

    /// Reference to the lang trait `name`; arguments beyond its arity are
    /// dropped and missing ones are fresh variables
    pub(crate) fn lang_trait_ref(&mut self, name: &str, self_ty: Ty, args: Vec<Ty>) -> Option<TraitRef> {
        let trait_ = self.ctx.db.lang_trait(name)?;
        let arity = type_params(self.ctx.hir(), trait_).len();
        let mut args = args;
        args.truncate(arity);
        while args.len() < arity {
            args.push(self.ctx.table.new_var());
        }
        Some(TraitRef { trait_, self_ty, args })
    }

    // === Finalization ===

    /// Fulfill, default numeric variables, fulfill again, report what is
    /// left, refine trait items and resolve every recorded type
    pub(crate) fn finish(mut self) -> Result<InferenceResult, Cancelled> {
        self.ctx.select_where_possible()?;
        let defaulted = self.ctx.table.fallback_numeric();
        self.ctx.select_where_possible()?;

        for obligation in std::mem::take(&mut self.ctx.failed) {
            let expr = obligation.origin;
            match obligation.goal {
                Goal::Implemented(trait_ref) => {
                    self.push_diagnostic(InferenceDiagnostic::UnsatisfiedBound { expr, trait_ref })
                }
                Goal::Projection { projection, .. } => {
                    if !self.ctx.projection_errors.iter().any(|(p, _)| *p == projection) {
                        self.push_diagnostic(InferenceDiagnostic::UnsatisfiedBound {
                            expr,
                            trait_ref: projection.trait_ref,
                        })
                    }
                }
            }
        }
        for (projection, expr) in std::mem::take(&mut self.ctx.projection_errors) {
            self.push_diagnostic(InferenceDiagnostic::ProjectionError {
                expr,
                trait_ref: projection.trait_ref,
                name: projection.name,
            });
        }

        for refinement in std::mem::take(&mut self.refinements) {
            let Some(item) = self.ctx.refine_trait_method(refinement.item, &refinement.trait_ref) else {
                continue;
            };
            trace!(from = ?refinement.item, to = ?item, "trait item refined to impl");
            match refinement.target {
                RefineTarget::Method(expr) => {
                    if let Some(method) = self.result.methods.get_mut(&expr) {
                        method.method = item;
                    }
                }
                RefineTarget::Path(expr) => {
                    self.result.expr_paths.insert(expr, ValueNs::Def(item));
                }
            }
        }

        let cyclic = std::mem::take(&mut self.ctx.cyclic_origins);
        self.result.has_cyclic_type = !cyclic.is_empty();
        for expr in cyclic {
            self.push_diagnostic(InferenceDiagnostic::CyclicType { expr });
        }

        let table = &mut self.ctx.table;
        let result = &mut self.result;
        for ty in result.type_of_expr.values_mut() {
            *ty = table.resolve_completely(ty);
        }
        for ty in result.type_of_pat.values_mut() {
            *ty = table.resolve_completely(ty);
        }
        for adjustment in result.expr_adjustments.values_mut().flatten() {
            adjustment.target = table.resolve_completely(&adjustment.target);
        }
        for ty in result.pat_adjustments.values_mut().flatten() {
            *ty = table.resolve_completely(ty);
        }
        for method in result.methods.values_mut() {
            method.self_ty = table.resolve_completely(&method.self_ty);
        }
        for diagnostic in &mut result.diagnostics {
            resolve_diagnostic(table, diagnostic);
        }
        result.return_ty = table.resolve_completely(&self.return_ty);

        debug!(
            owner = ?self.owner,
            exprs = result.type_of_expr.values().count(),
            defaulted,
            diagnostics = result.diagnostics.len(),
            pending = self.ctx.pending().len(),
            "inference finished"
        );
        Ok(self.result)
    }
}

fn resolve_trait_ref(table: &mut InferenceTable, trait_ref: &mut TraitRef) {
    *trait_ref = trait_ref.clone().fold(&mut |t| match t {
        Ty::Infer(_) => table.resolve_completely(&t),
        other => other,
    });
}

fn resolve_diagnostic(table: &mut InferenceTable, diagnostic: &mut InferenceDiagnostic) {
    match diagnostic {
        InferenceDiagnostic::TypeMismatch { expected, actual, .. } => {
            *expected = table.resolve_completely(expected);
            *actual = table.resolve_completely(actual);
        }
        InferenceDiagnostic::UnresolvedMethod { receiver, .. } | InferenceDiagnostic::UnresolvedField { receiver, .. } => {
            *receiver = table.resolve_completely(receiver);
        }
        InferenceDiagnostic::NotCallable { ty, .. } => *ty = table.resolve_completely(ty),
        InferenceDiagnostic::UnsatisfiedBound { trait_ref, .. } | InferenceDiagnostic::ProjectionError { trait_ref, .. } => {
            resolve_trait_ref(table, trait_ref)
        }
        InferenceDiagnostic::UnresolvedPath { .. }
        | InferenceDiagnostic::NoSuchField { .. }
        | InferenceDiagnostic::CyclicType { .. }
        | InferenceDiagnostic::ArgCountMismatch { .. }
        | InferenceDiagnostic::BreakOutsideLoop { .. }
        | InferenceDiagnostic::UnresolvedLabel { .. }
        | InferenceDiagnostic::UnexpandedMacroCall { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferrite_ast::{
        ArithOp, AssocItem, Attrs, BinaryOp, Body, BodyBuilder, ExprKind, FieldInit, Ident, Item, Label, Literal,
        MatchArm, PatKind, SelfParam, Stmt, StructKind, TraitDef, TypeRef, make,
    };
    use ferrite_hir::{DefKind, FloatTy, IntTy, UintTy};
    use ferrite_syntax::Cancellation;

    use super::*;
    use crate::result::Adjust;
    use crate::test_db::{TestDb, def_named, fn_body};

    fn infer(db: &TypeDb, name: &str) -> Arc<InferenceResult> {
        db.infer(def_named(db.hir(), name), &Cancellation::new()).unwrap()
    }

    /// Type of the last binding called `name`
    fn binding_ty(db: &TypeDb, result: &InferenceResult, func: &str, name: &str) -> Ty {
        let (_, body) = fn_body(db.hir(), func);
        let pat = body
            .pats
            .iter()
            .filter(|(_, p)| matches!(&p.kind, PatKind::Bind { name: n, .. } if n.name == name))
            .map(|(id, _)| id)
            .last()
            .expect("no such binding");
        result[pat].clone()
    }

    fn func(name: &str, params: Vec<TypeRef>, ret: Option<TypeRef>, body: Body) -> Item {
        make::func(name, params, ret, Some(body)).into()
    }

    fn lang_trait(name: &str, lang: &str, generics: &[(&str, &[&str])], items: Vec<AssocItem>) -> Item {
        TraitDef {
            attrs: Attrs::new().with_value("lang", lang),
            generics: make::generics(generics),
            ..make::trait_(name, items)
        }
        .into()
    }

    /// `receiver.method()`; returns the call and the receiver
    fn method_call(b: &mut BodyBuilder, receiver: &str, method: &str) -> (ExprId, ExprId) {
        let receiver = b.path(receiver);
        let call = b.expr(ExprKind::MethodCall {
            receiver,
            method: Ident::synthetic(method),
            generic_args: Vec::new(),
            args: Vec::new(),
        });
        (call, receiver)
    }

    fn param(b: &mut BodyBuilder, name: &str) {
        let pat = b.bind(name);
        b.param(pat);
    }

    fn has_diagnostic(result: &InferenceResult, f: impl Fn(&InferenceDiagnostic) -> bool) -> bool {
        result.diagnostics().iter().any(f)
    }

    #[test]
    fn test_literal_takes_annotated_type() {
        let mut b = BodyBuilder::new();
        let five = b.int(5);
        let let_x = b.let_stmt("x", None, Some(five));
        let x = b.path("x");
        let let_y = b.let_stmt("y", Some(TypeRef::path("u8")), Some(x));
        let root = b.block(vec![let_x, let_y], None);
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "x"), Ty::Uint(UintTy::U8));
        assert_eq!(result[five], Ty::Uint(UintTy::U8));
        assert!(result.diagnostics().is_empty(), "{:?}", result.diagnostics());
    }

    #[test]
    fn test_numeric_fallback() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_i = b.let_stmt("i", None, Some(one));
        let half = b.expr(ExprKind::Literal(Literal::Float {
            text: "0.5".into(),
            suffix: None,
        }));
        let let_f = b.let_stmt("f", None, Some(half));
        let root = b.block(vec![let_i, let_f], None);
        let db = TestDb::new().krate("app", vec![func("g", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "g");
        assert_eq!(binding_ty(&db, &result, "g", "i"), Ty::Int(IntTy::I32));
        assert_eq!(binding_ty(&db, &result, "g", "f"), Ty::Float(FloatTy::F64));
    }

    #[test]
    fn test_shadowed_binding_is_used() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let first = b.let_stmt("x", None, Some(one));
        let yes = b.expr(ExprKind::Literal(Literal::Bool(true)));
        let second = b.let_stmt("x", None, Some(yes));
        let x = b.path("x");
        let let_y = b.let_stmt("y", None, Some(x));
        let root = b.block(vec![first, second, let_y], None);
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "y"), Ty::Bool);
    }

    #[test]
    fn test_mismatch_is_reported_with_resolved_types() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_y = b.let_stmt("y", Some(TypeRef::path("bool")), Some(one));
        let root = b.block(vec![let_y], None);
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert!(has_diagnostic(&result, |d| matches!(
            d,
            InferenceDiagnostic::TypeMismatch { expected: Ty::Bool, actual: Ty::Int(IntTy::I32), .. }
        )));
        assert_eq!(
            result.diagnostics()[0].message(db.hir()),
            "mismatched types: expected `bool`, found `i32`"
        );
    }

    #[test]
    fn test_tail_expression_checked_against_return_type() {
        let mut b = BodyBuilder::new();
        let seven = b.int(7);
        let root = b.block(Vec::new(), Some(seven));
        let db = TestDb::new()
            .krate("app", vec![func("f", Vec::new(), Some(TypeRef::path("u64")), b.finish(root))])
            .build();

        let result = infer(&db, "f");
        assert_eq!(result[seven], Ty::Uint(UintTy::U64));
        assert_eq!(result.return_ty(), &Ty::Uint(UintTy::U64));
    }

    #[test]
    fn test_inherent_method_wins_over_trait_method() {
        let getter = |ret: &str| make::method("get", SelfParam::Ref { mutable: false }, Some(TypeRef::path(ret)), None);
        let impl_getter = |ret: &str| {
            make::method(
                "get",
                SelfParam::Ref { mutable: false },
                Some(TypeRef::path(ret)),
                Some(make::self_body()),
            )
        };
        let mut b = BodyBuilder::new();
        param(&mut b, "s");
        let (call, _) = method_call(&mut b, "s", "get");
        let let_v = b.let_stmt("v", None, Some(call));
        let root = b.block(vec![let_v], None);
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("S", StructKind::Unit).into(),
                    make::trait_("Get", vec![getter("bool").into()]).into(),
                    make::impl_(None, TypeRef::path("S"), vec![impl_getter("u8").into()]).into(),
                    make::impl_(Some("Get"), TypeRef::path("S"), vec![impl_getter("bool").into()]).into(),
                    func("f", vec![TypeRef::reference(TypeRef::path("S"), false)], None, b.finish(root)),
                ],
            )
            .build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "v"), Ty::Uint(UintTy::U8));
        let picked = result.method_resolution(call).unwrap();
        let container = db.hir().container(picked.method).unwrap();
        assert_eq!(db.hir().def(container).kind(), DefKind::Impl);
    }

    #[test]
    fn test_trait_method_refined_to_impl() {
        let mut b = BodyBuilder::new();
        param(&mut b, "s");
        let (call, receiver) = method_call(&mut b, "s", "describe");
        let let_d = b.let_stmt("d", None, Some(call));
        let root = b.block(vec![let_d], None);
        let declared = make::method("describe", SelfParam::Ref { mutable: false }, Some(TypeRef::path("u32")), None);
        let provided = make::method(
            "describe",
            SelfParam::Ref { mutable: false },
            Some(TypeRef::path("u32")),
            Some(make::self_body()),
        );
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("S", StructKind::Unit).into(),
                    make::trait_("Describe", vec![declared.into()]).into(),
                    make::impl_(Some("Describe"), TypeRef::path("S"), vec![provided.into()]).into(),
                    func("f", vec![TypeRef::path("S")], None, b.finish(root)),
                ],
            )
            .build();

        let result = infer(&db, "f");
        let hir = db.hir();
        assert_eq!(binding_ty(&db, &result, "f", "d"), Ty::Uint(UintTy::U32));
        let method = result.method_resolution(call).unwrap().method;
        assert_ne!(hir.container(method), Some(def_named(hir, "Describe")));
        // by-value receiver auto-referenced
        assert!(matches!(
            result.expr_adjustments(receiver),
            [Adjustment { kind: Adjust::Borrow { mutable: false }, .. }]
        ));
    }

    #[test]
    fn test_method_found_through_overloaded_deref() {
        let deref = lang_trait(
            "Deref",
            "deref",
            &[],
            vec![AssocItem::TypeAlias(make::type_alias("Target", None))],
        );
        let deref_impl = make::impl_(
            Some("Deref"),
            TypeRef::path("Wrapper"),
            vec![AssocItem::TypeAlias(make::type_alias("Target", Some(TypeRef::path("Inner"))))],
        );
        let value = make::method(
            "value",
            SelfParam::Ref { mutable: false },
            Some(TypeRef::path("u64")),
            Some(make::self_body()),
        );
        let mut b = BodyBuilder::new();
        param(&mut b, "w");
        let (call, receiver) = method_call(&mut b, "w", "value");
        let let_v = b.let_stmt("v", None, Some(call));
        let root = b.block(vec![let_v], None);
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("Wrapper", StructKind::Unit).into(),
                    make::strukt("Inner", StructKind::Unit).into(),
                    deref,
                    deref_impl.into(),
                    make::impl_(None, TypeRef::path("Inner"), vec![value.into()]).into(),
                    func("f", vec![TypeRef::path("Wrapper")], None, b.finish(root)),
                ],
            )
            .build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "v"), Ty::Uint(UintTy::U64));
        let kinds: Vec<Adjust> = result.expr_adjustments(receiver).iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![Adjust::Deref { overloaded: true }, Adjust::Borrow { mutable: false }]);
    }

    #[test]
    fn test_operator_uses_lang_trait_output() {
        let add = lang_trait(
            "Add",
            "add",
            &[("Rhs", &[])],
            vec![
                AssocItem::TypeAlias(make::type_alias("Output", None)),
                make::func("add", vec![TypeRef::path("Rhs")], Some(TypeRef::path("Self::Output")), None).into(),
            ],
        );
        let add_impl = make::impl_(
            Some("Add<Meters>"),
            TypeRef::path("Meters"),
            vec![AssocItem::TypeAlias(make::type_alias("Output", Some(TypeRef::path("Meters"))))],
        );
        let mut b = BodyBuilder::new();
        param(&mut b, "a");
        param(&mut b, "c");
        let lhs = b.path("a");
        let rhs = b.path("c");
        let sum = b.expr(ExprKind::Binary {
            lhs,
            op: BinaryOp::Arith(ArithOp::Add),
            rhs,
        });
        let let_s = b.let_stmt("s", None, Some(sum));
        let one = b.int(1);
        let two = b.int(2);
        let plain = b.expr(ExprKind::Binary {
            lhs: one,
            op: BinaryOp::Arith(ArithOp::Add),
            rhs: two,
        });
        let let_n = b.let_stmt("n", None, Some(plain));
        let root = b.block(vec![let_s, let_n], None);
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("Meters", StructKind::Unit).into(),
                    add,
                    add_impl.into(),
                    func("f", vec![TypeRef::path("Meters"), TypeRef::path("Meters")], None, b.finish(root)),
                ],
            )
            .build();

        let result = infer(&db, "f");
        let meters = Ty::Adt {
            def: def_named(db.hir(), "Meters"),
            args: Vec::new(),
        };
        assert_eq!(binding_ty(&db, &result, "f", "s"), meters);
        assert_eq!(binding_ty(&db, &result, "f", "n"), Ty::Int(IntTy::I32));
        assert!(result.diagnostics().is_empty(), "{:?}", result.diagnostics());
    }

    #[test]
    fn test_match_ergonomics_bind_by_reference() {
        let mut b = BodyBuilder::new();
        param(&mut b, "p");
        let first = b.bind("a");
        let second = b.bind("c");
        let tuple = b.pat(PatKind::Tuple(vec![first, second]));
        let p = b.path("p");
        let root = b.block(
            vec![Stmt::Let {
                pat: tuple,
                ty: None,
                init: Some(p),
                else_branch: None,
            }],
            None,
        );
        let pair = TypeRef::reference(TypeRef::Tuple(vec![TypeRef::path("u8"), TypeRef::path("bool")]), false);
        let db = TestDb::new().krate("app", vec![func("f", vec![pair], None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert_eq!(result[first], Ty::reference(Ty::Uint(UintTy::U8), false));
        assert_eq!(result[second], Ty::reference(Ty::Bool, false));
        assert_eq!(result.pat_adjustments(tuple).len(), 1);
    }

    #[test]
    fn test_match_on_enum_variants() {
        let maybe = make::enum_(
            "Maybe",
            vec![
                make::variant("Nothing", StructKind::Unit),
                make::variant("Just", StructKind::Tuple(vec![make::field("0", TypeRef::path("u32"))])),
            ],
        );
        let mut b = BodyBuilder::new();
        param(&mut b, "m");
        let v = b.bind("v");
        let just = b.pat(PatKind::TupleStruct {
            path: ferrite_ast::Path::parse("Maybe::Just"),
            args: vec![v],
        });
        let nothing = b.pat(PatKind::Path(ferrite_ast::Path::parse("Maybe::Nothing")));
        let scrutinee = b.path("m");
        let v_use = b.path("v");
        let zero = b.int(0);
        let matched = b.expr(ExprKind::Match {
            scrutinee,
            arms: vec![
                MatchArm {
                    pat: just,
                    guard: None,
                    body: v_use,
                },
                MatchArm {
                    pat: nothing,
                    guard: None,
                    body: zero,
                },
            ],
        });
        let root = b.block(Vec::new(), Some(matched));
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    maybe.into(),
                    func("f", vec![TypeRef::path("Maybe")], Some(TypeRef::path("u32")), b.finish(root)),
                ],
            )
            .build();

        let result = infer(&db, "f");
        assert_eq!(result[v], Ty::Uint(UintTy::U32));
        assert_eq!(result[zero], Ty::Uint(UintTy::U32));
        assert_eq!(result.pat_resolution(nothing), Some(def_named(db.hir(), "Nothing")));
        assert!(result.diagnostics().is_empty(), "{:?}", result.diagnostics());
    }

    #[test]
    fn test_struct_literal_and_field_access() {
        let point = make::strukt(
            "Point",
            StructKind::Record(vec![
                make::field("x", TypeRef::path("u32")),
                make::field("y", TypeRef::path("bool")),
            ]),
        );
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let yes = b.expr(ExprKind::Literal(Literal::Bool(true)));
        let nine = b.int(9);
        let lit = b.expr(ExprKind::StructLit {
            path: ferrite_ast::Path::ident("Point"),
            fields: vec![
                FieldInit { name: Ident::synthetic("x"), expr: one },
                FieldInit { name: Ident::synthetic("y"), expr: yes },
                FieldInit { name: Ident::synthetic("w"), expr: nine },
            ],
            spread: None,
        });
        let let_p = b.let_stmt("p", None, Some(lit));
        let base = b.path("p");
        let field = b.expr(ExprKind::Field {
            base,
            name: Ident::synthetic("x"),
        });
        let let_z = b.let_stmt("z", None, Some(field));
        let root = b.block(vec![let_p, let_z], None);
        let db = TestDb::new()
            .krate("app", vec![point.into(), func("f", Vec::new(), None, b.finish(root))])
            .build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "z"), Ty::Uint(UintTy::U32));
        assert_eq!(result.field_resolution(field).map(|f| f.index), Some(0));
        assert_eq!(result.record_field(NodeId::Expr(lit), 1).map(|f| f.index), Some(1));
        assert!(has_diagnostic(&result, |d| matches!(d, InferenceDiagnostic::NoSuchField { name, .. } if name == "w")));
    }

    #[test]
    fn test_loop_break_value_and_stray_break() {
        let mut b = BodyBuilder::new();
        let five = b.expr(ExprKind::Literal(Literal::Int {
            value: 5,
            suffix: Some("u8".into()),
        }));
        let brk = b.expr(ExprKind::Break {
            label: None,
            expr: Some(five),
        });
        let loop_body = b.block(
            vec![Stmt::Expr {
                expr: brk,
                has_semi: true,
            }],
            None,
        );
        let looped = b.expr(ExprKind::Loop {
            label: Some(Label {
                name: "outer".into(),
                span: Default::default(),
            }),
            body: loop_body,
        });
        let let_v = b.let_stmt("v", None, Some(looped));
        let stray = b.expr(ExprKind::Break { label: None, expr: None });
        let root = b.block(
            vec![
                let_v,
                Stmt::Expr {
                    expr: stray,
                    has_semi: true,
                },
            ],
            None,
        );
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert_eq!(binding_ty(&db, &result, "f", "v"), Ty::Uint(UintTy::U8));
        assert!(has_diagnostic(&result, |d| matches!(d, InferenceDiagnostic::BreakOutsideLoop { expr } if *expr == stray)));
        assert_eq!(result[root], Ty::Never);
    }

    #[test]
    fn test_self_application_is_cyclic() {
        let mut b = BodyBuilder::new();
        let f_pat = b.bind("f");
        let callee = b.path("f");
        let arg = b.path("f");
        let call = b.expr(ExprKind::Call { callee, args: vec![arg] });
        let closure = b.expr(ExprKind::Closure {
            params: vec![(f_pat, None)],
            ret: None,
            body: call,
        });
        let let_g = b.let_stmt("g", None, Some(closure));
        let root = b.block(vec![let_g], None);
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert!(result.has_cyclic_type());
        assert!(has_diagnostic(&result, |d| matches!(d, InferenceDiagnostic::CyclicType { .. })));
        for (_, ty) in result.type_of_expr.iter() {
            assert!(!ty.contains_infer(), "{ty:?}");
        }
    }

    #[test]
    fn test_unknown_method_reported() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_x = b.let_stmt("x", None, Some(one));
        let (call, _) = method_call(&mut b, "x", "nope");
        let root = b.block(
            vec![
                let_x,
                Stmt::Expr {
                    expr: call,
                    has_semi: true,
                },
            ],
            None,
        );
        let db = TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build();

        let result = infer(&db, "f");
        assert!(has_diagnostic(&result, |d| matches!(
            d,
            InferenceDiagnostic::UnresolvedMethod { name, receiver: Ty::Int(IntTy::I32), .. } if name == "nope"
        )));
    }

    fn simple_db() -> TypeDb {
        let mut b = BodyBuilder::new();
        let five = b.int(5);
        let let_x = b.let_stmt("x", Some(TypeRef::path("u8")), Some(five));
        let root = b.block(vec![let_x], None);
        TestDb::new().krate("app", vec![func("f", Vec::new(), None, b.finish(root))]).build()
    }

    #[test]
    fn test_results_are_cached_per_epoch() {
        let db = simple_db();
        let def = def_named(db.hir(), "f");
        let first = db.infer(def, &Cancellation::new()).unwrap();
        let second = db.infer(def, &Cancellation::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.cache().len(), 1);
    }

    #[test]
    fn test_reentrant_inference_is_a_cycle() {
        let db = simple_db();
        let def = def_named(db.hir(), "f");
        let _guard = db.cache().begin(def, db.hir().epoch()).unwrap();
        assert!(matches!(db.infer(def, &Cancellation::new()), Err(InferError::Cycle(_))));
    }

    #[test]
    fn test_cancelled_inference_returns_error() {
        let db = simple_db();
        let cancel = Cancellation::new();
        cancel.cancel();
        let result = db.infer(def_named(db.hir(), "f"), &cancel);
        assert!(matches!(result, Err(InferError::Cancelled(_))));
        assert!(db.cache().is_empty());
    }

    #[test]
    fn test_parallel_inference_agrees() {
        let db = simple_db();
        let def = def_named(db.hir(), "f");
        let results: Vec<Arc<InferenceResult>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| db.infer(def, &Cancellation::new()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in &results {
            assert_eq!(binding_ty(&db, result, "f", "x"), Ty::Uint(UintTy::U8));
        }
    }

    #[test]
    fn test_resolving_twice_changes_nothing() {
        let db = simple_db();
        let result = infer(&db, "f");
        let mut table = InferenceTable::new();
        for (_, ty) in result.type_of_expr.iter() {
            assert_eq!(&table.resolve_completely(ty), ty);
        }
    }
}
