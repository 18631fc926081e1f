//! Trait obligations.
//!
//! Bounds collected during inference are kept as pending obligations and
//! retried until no more progress is made. Selection picks where-clauses of
//! the environment first, then `dyn` bounds, built-in impls and finally the
//! impl index. Projections are normalized through a cache stored in the
//! inference table, so probes roll it back together with the variables.

use ferrite_ast::ExprId;
use ferrite_hir::{DefId, HirDb};
use ferrite_syntax::{Cancellation, Cancelled};
use tracing::{debug, trace};

use crate::db::TypeDb;
use crate::lower::{
    all_type_params, assoc_type_alias, assoc_type_value, generic_predicates, supertraits, trait_subst, type_params,
};
use crate::table::{InferenceTable, ProjectionCacheEntry};
use crate::ty::{InferTy, ProjectionTy, Subst, TraitRef, Ty};

/// Something that must hold for the program to type check
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Goal {
    Implemented(TraitRef),
    /// `projection` normalizes to `ty`
    Projection { projection: ProjectionTy, ty: Ty },
}

impl Goal {
    pub fn subst(&self, subst: &Subst) -> Goal {
        match self {
            Goal::Implemented(trait_ref) => Goal::Implemented(trait_ref.subst(subst)),
            Goal::Projection { projection, ty } => Goal::Projection {
                projection: ProjectionTy {
                    trait_ref: projection.trait_ref.subst(subst),
                    name: projection.name.clone(),
                },
                ty: ty.subst(subst),
            },
        }
    }

    pub fn trait_ref(&self) -> &TraitRef {
        match self {
            Goal::Implemented(trait_ref) => trait_ref,
            Goal::Projection { projection, .. } => &projection.trait_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    pub goal: Goal,
    /// Number of impls traversed to reach this obligation
    pub depth: u32,
    /// Expression that introduced the obligation
    pub origin: Option<ExprId>,
}

/// Bounds assumed inside a declaration, elaborated with supertraits
#[derive(Debug, Clone, Default)]
pub struct ParamEnv {
    pub bounds: Vec<TraitRef>,
    pub projections: Vec<(ProjectionTy, Ty)>,
}

impl ParamEnv {
    pub fn for_def(db: &HirDb, def: DefId) -> Self {
        let mut env = ParamEnv::default();
        for goal in generic_predicates(db, def) {
            match goal {
                Goal::Implemented(trait_ref) => env.add_elaborated(db, trait_ref),
                Goal::Projection { projection, ty } => env.projections.push((projection, ty)),
            }
        }
        env
    }

    fn add_elaborated(&mut self, db: &HirDb, trait_ref: TraitRef) {
        let mut stack = vec![trait_ref];
        while let Some(trait_ref) = stack.pop() {
            if self.bounds.contains(&trait_ref) {
                continue;
            }
            let subst = trait_subst(db, &trait_ref);
            stack.extend(supertraits(db, trait_ref.trait_).iter().map(|sup| sup.subst(&subst)));
            self.bounds.push(trait_ref);
        }
    }

    /// Traits the environment mentions, for method lookup
    pub fn traits(&self) -> impl Iterator<Item = DefId> + '_ {
        self.bounds.iter().map(|b| b.trait_)
    }
}

/// Outcome of trying to prove one goal
#[derive(Debug)]
pub(crate) enum Selection {
    Holds(Vec<Obligation>),
    Ambiguous,
    NoSolution,
}

#[derive(Debug)]
pub(crate) enum Normalized {
    Ty(Ty, Vec<Obligation>),
    Ambiguous,
    Error,
}

/// Inference state shared by the body walker and the trait solver
pub(crate) struct InferCtxt<'db> {
    pub(crate) db: &'db TypeDb,
    pub(crate) table: InferenceTable,
    pub(crate) env: ParamEnv,
    pub(crate) cancel: Cancellation,
    pending: Vec<Obligation>,
    /// Obligations proven impossible
    pub(crate) failed: Vec<Obligation>,
    /// Projections that can never be normalized, each listed once
    pub(crate) projection_errors: Vec<(ProjectionTy, Option<ExprId>)>,
    /// Expression being inferred whenever the occurs check fired
    pub(crate) cyclic_origins: Vec<Option<ExprId>>,
    /// Expression new obligations are attributed to
    pub(crate) origin: Option<ExprId>,
}

impl<'db> InferCtxt<'db> {
    pub(crate) fn new(db: &'db TypeDb, env: ParamEnv, cancel: Cancellation) -> Self {
        Self {
            db,
            table: InferenceTable::new(),
            env,
            cancel,
            pending: Vec::new(),
            failed: Vec::new(),
            projection_errors: Vec::new(),
            cyclic_origins: Vec::new(),
            origin: None,
        }
    }

    pub(crate) fn hir(&self) -> &'db HirDb {
        self.db.hir()
    }

    pub(crate) fn unify(&mut self, a: &Ty, b: &Ty) -> bool {
        let cyclic_before = self.table.cyclic_vars().len();
        let ok = self.table.unify(a, b);
        let new_cycles = self.table.cyclic_vars().len() - cyclic_before;
        for _ in 0..new_cycles {
            self.cyclic_origins.push(self.origin);
        }
        ok
    }

    pub(crate) fn resolve(&mut self, ty: &Ty) -> Ty {
        self.table.resolve_vars(ty)
    }

    pub(crate) fn shallow(&mut self, ty: &Ty) -> Ty {
        self.table.shallow_resolve(ty)
    }

    fn resolve_trait_ref(&mut self, trait_ref: &TraitRef) -> TraitRef {
        trait_ref.clone().fold(&mut |ty| match ty {
            Ty::Infer(_) => self.table.resolve_vars(&ty),
            other => other,
        })
    }

    // === Obligations ===

    pub(crate) fn register(&mut self, goal: Goal) {
        trace!(?goal, "obligation registered");
        self.pending.push(Obligation {
            goal,
            depth: 0,
            origin: self.origin,
        });
    }

    /// Instantiate the type parameters of `def`: `preset` entries win,
    /// `explicit` fills the own parameters in order, the rest become fresh
    /// variables. The bounds of `def` are registered under the result.
    pub(crate) fn instantiate(&mut self, def: DefId, preset: Subst, explicit: &[Ty]) -> Subst {
        let hir = self.hir();
        let own = type_params(hir, def);
        let mut subst = preset;
        for param in all_type_params(hir, def) {
            if subst.get(param).is_some() {
                continue;
            }
            let ty = own
                .iter()
                .position(|p| *p == param)
                .and_then(|i| explicit.get(i).cloned())
                .unwrap_or_else(|| self.table.new_var());
            subst.insert(param, ty);
        }
        for goal in generic_predicates(hir, def) {
            self.register(goal.subst(&subst));
        }
        subst
    }

    pub(crate) fn pending(&self) -> &[Obligation] {
        &self.pending
    }

    /// Retry pending obligations until none of them makes progress
    pub(crate) fn select_where_possible(&mut self) -> Result<(), Cancelled> {
        for round in 0..self.db.config().fulfillment_rounds {
            self.cancel.check()?;
            let pending = std::mem::take(&mut self.pending);
            if pending.is_empty() {
                break;
            }
            let count = pending.len();
            let mut progress = false;
            for obligation in pending {
                let snapshot = self.table.snapshot();
                match self.process(&obligation) {
                    Selection::Holds(nested) => {
                        self.table.commit(snapshot);
                        self.pending.extend(nested);
                        progress = true;
                    }
                    Selection::Ambiguous => {
                        self.table.rollback_to(snapshot);
                        self.pending.push(obligation);
                    }
                    Selection::NoSolution => {
                        self.table.rollback_to(snapshot);
                        debug!(goal = ?obligation.goal, "obligation cannot hold");
                        self.failed.push(obligation);
                        progress = true;
                    }
                }
            }
            trace!(round, count, remaining = self.pending.len(), "fulfillment round");
            if !progress {
                break;
            }
        }
        Ok(())
    }

    fn process(&mut self, obligation: &Obligation) -> Selection {
        let saved = self.origin;
        if obligation.origin.is_some() {
            self.origin = obligation.origin;
        }
        let result = match &obligation.goal {
            Goal::Implemented(trait_ref) => self.select(trait_ref, obligation.depth),
            Goal::Projection { projection, ty } => match self.normalize_projection(projection, obligation.depth) {
                Normalized::Ty(normalized, nested) => {
                    if self.unify(&normalized, ty) {
                        Selection::Holds(nested)
                    } else {
                        Selection::NoSolution
                    }
                }
                Normalized::Ambiguous => Selection::Ambiguous,
                Normalized::Error => Selection::NoSolution,
            },
        };
        self.origin = saved;
        result
    }

    /// Whether `trait_ref` may hold; leaves no trace in the table
    pub(crate) fn may_implement(&mut self, trait_ref: &TraitRef) -> bool {
        let snapshot = self.table.snapshot();
        let result = self.select(trait_ref, 0);
        self.table.rollback_to(snapshot);
        !matches!(result, Selection::NoSolution)
    }

    // === Selection ===

    pub(crate) fn select(&mut self, trait_ref: &TraitRef, depth: u32) -> Selection {
        let db = self.db;
        let trait_ref = self.resolve_trait_ref(trait_ref);
        if depth > db.config().solver_depth {
            debug!(?trait_ref, depth, "trait solver depth exceeded");
            return Selection::Ambiguous;
        }
        let self_ty = self.table.shallow_resolve(&trait_ref.self_ty);
        if matches!(self_ty, Ty::Unknown | Ty::Never) || trait_ref.args.iter().any(Ty::is_unknown) {
            return Selection::Holds(Vec::new());
        }

        let env_bounds: Vec<TraitRef> = self
            .env
            .bounds
            .iter()
            .filter(|bound| bound.trait_ == trait_ref.trait_)
            .cloned()
            .collect();
        let env_matches: Vec<TraitRef> = env_bounds
            .into_iter()
            .filter(|bound| self.table.probe(|t| unify_trait_refs(t, bound, &trait_ref)))
            .collect();
        if let Some(first) = env_matches.first() {
            if env_matches.len() > 1 && env_matches.iter().any(|b| b != first) && trait_ref.self_ty.contains_infer() {
                return Selection::Ambiguous;
            }
            unify_trait_refs(&mut self.table, first, &trait_ref);
            return Selection::Holds(Vec::new());
        }

        if let Ty::Dyn(bounds) = &self_ty {
            for bound in bounds {
                let principal = TraitRef {
                    trait_: bound.trait_,
                    self_ty: self_ty.clone(),
                    args: bound.args.clone(),
                };
                for candidate in elaborate(db.hir(), principal) {
                    if candidate.trait_ == trait_ref.trait_ && unify_trait_refs(&mut self.table, &candidate, &trait_ref) {
                        return Selection::Holds(Vec::new());
                    }
                }
            }
        }

        if let Some(nested) = self.builtin_impl(&trait_ref, &self_ty) {
            return Selection::Holds(
                nested
                    .into_iter()
                    .map(|goal| Obligation {
                        goal,
                        depth: depth + 1,
                        origin: self.origin,
                    })
                    .collect(),
            );
        }

        if matches!(self_ty, Ty::Infer(InferTy::Var(_))) {
            return Selection::Ambiguous;
        }

        let candidates: Vec<DefId> = db
            .impls()
            .trait_impls(trait_ref.trait_, &self_ty)
            .into_iter()
            .filter(|imp| self.table.probe(|t| match_impl(db, t, *imp, &trait_ref).is_some()))
            .collect();
        match candidates.as_slice() {
            [] => Selection::NoSolution,
            [imp] => match match_impl(db, &mut self.table, *imp, &trait_ref) {
                Some(subst) => Selection::Holds(self.impl_obligations(*imp, &subst, depth)),
                None => Selection::NoSolution,
            },
            _ => {
                trace!(?trait_ref, candidates = candidates.len(), "ambiguous impl selection");
                Selection::Ambiguous
            }
        }
    }

    fn impl_obligations(&self, imp: DefId, subst: &Subst, depth: u32) -> Vec<Obligation> {
        generic_predicates(self.hir(), imp)
            .into_iter()
            .map(|goal| Obligation {
                goal: goal.subst(subst),
                depth: depth + 1,
                origin: self.origin,
            })
            .collect()
    }

    /// Impls the language provides without source: `Sized` for everything
    /// statically sized, `Copy` and `Clone` for primitives and aggregates of
    /// copyable types
    fn builtin_impl(&self, trait_ref: &TraitRef, self_ty: &Ty) -> Option<Vec<Goal>> {
        let hir = self.hir();
        let lang = |name: &str| hir.lang_item(name) == Some(trait_ref.trait_);
        if lang("sized") {
            return match self_ty {
                Ty::Str | Ty::Slice(_) | Ty::Dyn(_) => None,
                _ => Some(Vec::new()),
            };
        }
        if lang("copy") || lang("clone") {
            let nested = |elems: &[Ty]| {
                elems
                    .iter()
                    .map(|elem| {
                        Goal::Implemented(TraitRef {
                            trait_: trait_ref.trait_,
                            self_ty: elem.clone(),
                            args: Vec::new(),
                        })
                    })
                    .collect()
            };
            return match self_ty {
                Ty::Bool
                | Ty::Char
                | Ty::Int(_)
                | Ty::Uint(_)
                | Ty::Float(_)
                | Ty::Never
                | Ty::Ptr { .. }
                | Ty::Fn { .. }
                | Ty::Ref { mutable: false, .. } => Some(Vec::new()),
                Ty::Infer(InferTy::Int(_) | InferTy::Float(_)) => Some(Vec::new()),
                Ty::Tuple(elems) => Some(nested(elems)),
                Ty::Array { elem, .. } => Some(nested(std::slice::from_ref(elem.as_ref()))),
                _ => None,
            };
        }
        None
    }

    // === Projections ===

    /// Normalize `projection` once; results and failures are cached per
    /// resolved projection
    pub(crate) fn normalize_projection(&mut self, projection: &ProjectionTy, depth: u32) -> Normalized {
        let key = ProjectionTy {
            trait_ref: self.resolve_trait_ref(&projection.trait_ref),
            name: projection.name.clone(),
        };
        match self.table.projection_cache.get(&key) {
            Some(ProjectionCacheEntry::Resolved { ty, obligations }) => {
                return Normalized::Ty(ty.clone(), obligations.clone());
            }
            Some(ProjectionCacheEntry::Error) => return Normalized::Error,
            Some(ProjectionCacheEntry::InProgress) => {
                debug!(projection = ?key, "recursive projection");
                return Normalized::Ty(Ty::Unknown, Vec::new());
            }
            Some(ProjectionCacheEntry::Ambiguous) | None => {}
        }
        self.table
            .projection_cache
            .insert(key.clone(), ProjectionCacheEntry::InProgress);
        let result = self.compute_projection(&key, depth);
        let entry = match &result {
            Normalized::Ty(ty, obligations) => ProjectionCacheEntry::Resolved {
                ty: ty.clone(),
                obligations: obligations.clone(),
            },
            Normalized::Ambiguous => ProjectionCacheEntry::Ambiguous,
            Normalized::Error => {
                if !self.projection_errors.iter().any(|(p, _)| *p == key) {
                    self.projection_errors.push((key.clone(), self.origin));
                }
                ProjectionCacheEntry::Error
            }
        };
        self.table.projection_cache.insert(key, entry);
        result
    }

    fn compute_projection(&mut self, key: &ProjectionTy, depth: u32) -> Normalized {
        let db = self.db;
        let hir = db.hir();
        let trait_ref = &key.trait_ref;
        if depth > db.config().solver_depth {
            return Normalized::Ambiguous;
        }
        let self_ty = self.table.shallow_resolve(&trait_ref.self_ty);
        if self_ty.is_unknown() {
            return Normalized::Ty(Ty::Unknown, Vec::new());
        }

        let bindings: Vec<(ProjectionTy, Ty)> = self
            .env
            .projections
            .iter()
            .filter(|(p, _)| p.name == key.name && p.trait_ref.trait_ == trait_ref.trait_)
            .cloned()
            .collect();
        for (projection, ty) in bindings {
            if unify_trait_refs(&mut self.table, &projection.trait_ref, trait_ref) {
                return Normalized::Ty(ty, Vec::new());
            }
        }

        if db.lang_trait("deref") == Some(trait_ref.trait_) && key.name == "Target" {
            if let Some(inner) = self_ty.builtin_deref() {
                return Normalized::Ty(inner.clone(), Vec::new());
            }
        }

        let env_bounds = self.env.bounds.clone();
        let rigid = env_bounds
            .iter()
            .any(|bound| bound.trait_ == trait_ref.trait_ && self.table.probe(|t| unify_trait_refs(t, bound, trait_ref)));
        if rigid && matches!(self_ty, Ty::Param(_) | Ty::Projection(_)) {
            return Normalized::Ty(Ty::Projection(Box::new(key.clone())), Vec::new());
        }

        match self_ty {
            Ty::Infer(InferTy::Var(_)) => return Normalized::Ambiguous,
            Ty::Dyn(_) => return Normalized::Ty(Ty::Unknown, Vec::new()),
            Ty::Param(_) | Ty::Projection(_) => return Normalized::Error,
            _ => {}
        }

        let candidates: Vec<DefId> = db
            .impls()
            .trait_impls(trait_ref.trait_, &self_ty)
            .into_iter()
            .filter(|imp| self.table.probe(|t| match_impl(db, t, *imp, trait_ref).is_some()))
            .collect();
        let imp = match candidates.as_slice() {
            [imp] => *imp,
            [] if self_ty.contains_infer() => return Normalized::Ambiguous,
            [] => return Normalized::Error,
            _ => return Normalized::Ambiguous,
        };
        let Some(subst) = match_impl(db, &mut self.table, imp, trait_ref) else {
            return Normalized::Error;
        };
        let obligations = self.impl_obligations(imp, &subst, depth);
        let value = assoc_type_alias(hir, imp, &key.name)
            .and_then(|alias| assoc_type_value(hir, alias))
            .map(|ty| ty.subst(&subst))
            .or_else(|| {
                assoc_type_alias(hir, trait_ref.trait_, &key.name)
                    .and_then(|alias| assoc_type_value(hir, alias))
                    .map(|ty| ty.subst(&trait_subst(hir, trait_ref)))
            });
        match value {
            Some(ty) => Normalized::Ty(ty, obligations),
            None => Normalized::Error,
        }
    }

    /// Replace every projection in `ty` by what it normalizes to. Projections
    /// that cannot be decided yet become variables constrained by a pending
    /// obligation.
    pub(crate) fn normalize(&mut self, ty: Ty) -> Ty {
        self.normalize_at(ty, 0)
    }

    fn normalize_at(&mut self, ty: Ty, depth: u32) -> Ty {
        if !has_projection(&ty) {
            return ty;
        }
        let limit = self.db.config().solver_depth;
        ty.fold(&mut |t| match t {
            Ty::Projection(projection) => {
                match self.normalize_projection(&projection, depth) {
                    Normalized::Ty(normalized, nested) => {
                        self.pending.extend(nested);
                        if depth < limit {
                            self.normalize_at(normalized, depth + 1)
                        } else {
                            normalized
                        }
                    }
                    Normalized::Ambiguous => {
                        let var = self.table.new_var();
                        self.register(Goal::Projection {
                            projection: *projection,
                            ty: var.clone(),
                        });
                        var
                    }
                    Normalized::Error => Ty::Unknown,
                }
            }
            other => other,
        })
    }
}

fn has_projection(ty: &Ty) -> bool {
    let mut found = false;
    ty.walk(&mut |t| found |= matches!(t, Ty::Projection(_)));
    found
}

/// `trait_ref` with its supertraits, transitively
pub(crate) fn elaborate(db: &HirDb, trait_ref: TraitRef) -> Vec<TraitRef> {
    let mut out: Vec<TraitRef> = Vec::new();
    let mut stack = vec![trait_ref];
    while let Some(trait_ref) = stack.pop() {
        if out.contains(&trait_ref) {
            continue;
        }
        let subst = trait_subst(db, &trait_ref);
        stack.extend(supertraits(db, trait_ref.trait_).iter().map(|sup| sup.subst(&subst)));
        out.push(trait_ref);
    }
    out
}

/// Unify two trait references as a whole; the table is untouched on failure
pub(crate) fn unify_trait_refs(table: &mut InferenceTable, a: &TraitRef, b: &TraitRef) -> bool {
    if a.trait_ != b.trait_ || a.args.len() != b.args.len() {
        return false;
    }
    let lhs = Ty::Tuple(std::iter::once(a.self_ty.clone()).chain(a.args.iter().cloned()).collect());
    let rhs = Ty::Tuple(std::iter::once(b.self_ty.clone()).chain(b.args.iter().cloned()).collect());
    table.unify(&lhs, &rhs)
}

/// Instantiate `imp` with fresh variables and unify its trait reference with
/// `trait_ref`
fn match_impl(db: &TypeDb, table: &mut InferenceTable, imp: DefId, trait_ref: &TraitRef) -> Option<Subst> {
    let data = db.impls().impl_data(imp)?;
    let impl_trait = data.trait_ref.as_ref()?;
    let params = type_params(db.hir(), imp);
    let vars: Vec<Ty> = params.iter().map(|_| table.new_var()).collect();
    let subst = Subst::from_pairs(&params, vars);
    unify_trait_refs(table, &impl_trait.subst(&subst), trait_ref).then_some(subst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::{TestDb, def_named};
    use ferrite_ast::{AssocItem, StructKind, TypeRef, make};
    use ferrite_hir::IntTy;

    fn adt(hir: &HirDb, name: &str) -> Ty {
        Ty::Adt {
            def: def_named(hir, name),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_select_impl_and_projection() {
        let iter_trait = make::trait_("Iter", vec![AssocItem::TypeAlias(make::type_alias("Item", None))]);
        let imp = make::impl_(
            Some("Iter"),
            TypeRef::path("Counter"),
            vec![AssocItem::TypeAlias(make::type_alias("Item", Some(TypeRef::path("u32"))))],
        );
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("Counter", StructKind::Unit).into(),
                    make::strukt("Other", StructKind::Unit).into(),
                    iter_trait.into(),
                    imp.into(),
                ],
            )
            .build();
        let hir = db.hir();
        let iter = def_named(hir, "Iter");
        let mut ctx = InferCtxt::new(&db, ParamEnv::default(), Cancellation::new());

        let counter = TraitRef {
            trait_: iter,
            self_ty: adt(hir, "Counter"),
            args: Vec::new(),
        };
        assert!(matches!(ctx.select(&counter, 0), Selection::Holds(_)));
        let other = TraitRef {
            self_ty: adt(hir, "Other"),
            ..counter.clone()
        };
        assert!(matches!(ctx.select(&other, 0), Selection::NoSolution));

        let projection = Ty::Projection(Box::new(ProjectionTy {
            trait_ref: counter,
            name: "Item".into(),
        }));
        assert_eq!(ctx.normalize(projection), Ty::Uint(ferrite_hir::UintTy::U32));
    }

    #[test]
    fn test_pending_obligation_resolves_once_type_known() {
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("A", StructKind::Unit).into(),
                    make::trait_("Show", Vec::new()).into(),
                    make::impl_(Some("Show"), TypeRef::path("A"), Vec::new()).into(),
                ],
            )
            .build();
        let hir = db.hir();
        let mut ctx = InferCtxt::new(&db, ParamEnv::default(), Cancellation::new());
        let var = ctx.table.new_var();
        ctx.register(Goal::Implemented(TraitRef {
            trait_: def_named(hir, "Show"),
            self_ty: var.clone(),
            args: Vec::new(),
        }));
        ctx.select_where_possible().unwrap();
        assert_eq!(ctx.pending().len(), 1);

        assert!(ctx.unify(&var, &adt(hir, "A")));
        ctx.select_where_possible().unwrap();
        assert!(ctx.pending().is_empty());
        assert!(ctx.failed.is_empty());
    }

    #[test]
    fn test_blanket_impl_requires_nested_bound() {
        let mut blanket = make::impl_(Some("Show"), TypeRef::path("T"), Vec::new());
        blanket.generics = make::generics(&[("T", &["Base"])]);
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::strukt("A", StructKind::Unit).into(),
                    make::strukt("B", StructKind::Unit).into(),
                    make::trait_("Base", Vec::new()).into(),
                    make::trait_("Show", Vec::new()).into(),
                    make::impl_(Some("Base"), TypeRef::path("A"), Vec::new()).into(),
                    blanket.into(),
                ],
            )
            .build();
        let hir = db.hir();
        let show = def_named(hir, "Show");
        let mut ctx = InferCtxt::new(&db, ParamEnv::default(), Cancellation::new());
        for (name, holds) in [("A", true), ("B", false)] {
            ctx.register(Goal::Implemented(TraitRef {
                trait_: show,
                self_ty: adt(hir, name),
                args: Vec::new(),
            }));
            ctx.select_where_possible().unwrap();
            assert_eq!(ctx.failed.is_empty(), holds, "{name}");
        }
    }

    #[test]
    fn test_env_bound_elaborates_supertraits() {
        let mut sub = make::trait_("Sub", Vec::new());
        sub.supertraits = vec![ferrite_ast::TypeBound::Trait(ferrite_ast::Path::ident("Super"))];
        let mut f = make::func("f", vec![TypeRef::path("T")], None, None);
        f.generics = make::generics(&[("T", &["Sub"])]);
        let db = TestDb::new()
            .krate("app", vec![make::trait_("Super", Vec::new()).into(), sub.into(), f.into()])
            .build();
        let hir = db.hir();
        let env = ParamEnv::for_def(hir, def_named(hir, "f"));
        let supers: Vec<DefId> = env.traits().collect();
        assert!(supers.contains(&def_named(hir, "Super")));
        assert!(supers.contains(&def_named(hir, "Sub")));
    }

    #[test]
    fn test_builtin_copy_for_tuples() {
        let copy = make::trait_("Copy", Vec::new());
        let copy = ferrite_ast::TraitDef {
            attrs: ferrite_ast::Attrs::new().with_value("lang", "copy"),
            ..copy
        };
        let db = TestDb::new()
            .krate("app", vec![make::strukt("A", StructKind::Unit).into(), copy.into()])
            .build();
        let hir = db.hir();
        let copy = def_named(hir, "Copy");
        let mut ctx = InferCtxt::new(&db, ParamEnv::default(), Cancellation::new());
        let tuple = Ty::Tuple(vec![Ty::Int(IntTy::I32), Ty::Bool]);
        let with_adt = Ty::Tuple(vec![Ty::Int(IntTy::I32), adt(hir, "A")]);
        for (ty, holds) in [(tuple, true), (with_adt, false)] {
            ctx.failed.clear();
            ctx.register(Goal::Implemented(TraitRef {
                trait_: copy,
                self_ty: ty,
                args: Vec::new(),
            }));
            ctx.select_where_possible().unwrap();
            assert_eq!(ctx.failed.is_empty(), holds);
        }
    }

    #[test]
    fn test_cancellation_stops_fulfillment() {
        let db = TestDb::new().krate("app", vec![make::trait_("Show", Vec::new()).into()]).build();
        let cancel = Cancellation::new();
        let mut ctx = InferCtxt::new(&db, ParamEnv::default(), cancel.clone());
        let var = ctx.table.new_var();
        ctx.register(Goal::Implemented(TraitRef {
            trait_: def_named(db.hir(), "Show"),
            self_ty: var,
            args: Vec::new(),
        }));
        cancel.cancel();
        assert_eq!(ctx.select_where_possible(), Err(Cancelled));
    }
}
