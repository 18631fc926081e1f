//! Lowering of written types and item signatures to [`Ty`].
//!
//! Everything here works on the name-resolution database alone, so the impl
//! index can be built before any inference runs. Paths that do not resolve
//! lower to `Ty::Unknown`; callers inside bodies replace those with fresh
//! inference variables.

use std::cell::Cell;

use ferrite_ast::{GenericParam, Path, PathSegment, SelfParam, TypeBound, TypeRef};
use ferrite_hir::{DefId, DefKind, DefSource, GenericParamId, HirDb, Resolver, TypeNs, generics_of};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::traits::Goal;
use crate::ty::{DynBound, FnSig, ProjectionTy, Subst, TRAIT_SELF_INDEX, TraitRef, Ty};

const MAX_LOWERING_DEPTH: u32 = 16;

/// Converts `TypeRef`s to types with names looked up through a resolver
pub struct TyLowerer<'a> {
    db: &'a HirDb,
    resolver: Resolver<'a>,
    depth: Cell<u32>,
}

impl<'a> TyLowerer<'a> {
    pub fn new(db: &'a HirDb, resolver: Resolver<'a>) -> Self {
        Self {
            db,
            resolver,
            depth: Cell::new(0),
        }
    }

    /// Lowerer for the signature of `def`
    pub fn for_def(db: &'a HirDb, def: DefId) -> Self {
        Self::new(db, Resolver::for_def(db, def))
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    /// Lowerer for another item's signature, sharing the nesting budget.
    /// None once aliases or defaults nest too deep.
    fn nested(&self, def: DefId) -> Option<TyLowerer<'a>> {
        let depth = self.depth.get() + 1;
        if depth > MAX_LOWERING_DEPTH {
            trace!(?def, "type lowering nested too deep");
            return None;
        }
        let inner = Self::for_def(self.db, def);
        inner.depth.set(depth);
        Some(inner)
    }

    pub fn lower_ty(&self, ty: &TypeRef) -> Ty {
        match ty {
            TypeRef::Path(path) => self.lower_path(path),
            TypeRef::Ref { mutable, inner, .. } => Ty::Ref {
                mutable: *mutable,
                inner: Box::new(self.lower_ty(inner)),
            },
            TypeRef::Ptr { mutable, inner } => Ty::Ptr {
                mutable: *mutable,
                inner: Box::new(self.lower_ty(inner)),
            },
            TypeRef::Array { elem, len } => Ty::Array {
                elem: Box::new(self.lower_ty(elem)),
                len: *len,
            },
            TypeRef::Slice(elem) => Ty::Slice(Box::new(self.lower_ty(elem))),
            TypeRef::Tuple(elems) => Ty::Tuple(elems.iter().map(|t| self.lower_ty(t)).collect()),
            TypeRef::Fn { params, ret } => Ty::func(params.iter().map(|t| self.lower_ty(t)).collect(), self.lower_ty(ret)),
            TypeRef::Never => Ty::Never,
            TypeRef::Infer => Ty::Unknown,
            // `impl Trait` in argument or return position is treated as a trait object
            TypeRef::DynTrait(bounds) | TypeRef::ImplTrait(bounds) => {
                let bounds: Vec<DynBound> = bounds
                    .iter()
                    .filter_map(|b| match b {
                        TypeBound::Trait(path) => {
                            let trait_ = self.resolve_trait(path)?;
                            Some(DynBound {
                                trait_,
                                args: self.fill_args(trait_, self.segment_types(path.last_segment()), None),
                            })
                        }
                        TypeBound::Lifetime(_) => None,
                    })
                    .collect();
                if bounds.is_empty() { Ty::Unknown } else { Ty::Dyn(bounds) }
            }
        }
    }

    pub fn lower_path(&self, path: &Path) -> Ty {
        if let Some(qualifier) = &path.qualifier {
            let self_ty = self.lower_ty(&qualifier.self_ty);
            let [segment] = path.segments.as_slice() else {
                return Ty::Unknown;
            };
            return match &qualifier.trait_ref {
                Some(trait_path) => match self.lower_trait_ref(trait_path, self_ty) {
                    Some(trait_ref) => Ty::Projection(Box::new(ProjectionTy {
                        trait_ref,
                        name: segment.name.clone(),
                    })),
                    None => Ty::Unknown,
                },
                None => match self_ty {
                    Ty::Param(param) => self.projection_from_param_bounds(param, &segment.name),
                    _ => Ty::Unknown,
                },
            };
        }

        match self.resolver.resolve_path_in_type_ns(path).ok().flatten() {
            None => Ty::Unknown,
            Some((ns, None)) => self.lower_type_ns(ns, path.last_segment()),
            Some((ns, Some(index))) => {
                // only a single associated segment is understood (`T::Item`)
                if index == 0 || index + 1 != path.segments.len() {
                    return Ty::Unknown;
                }
                self.lower_assoc_shorthand(ns, &path.segments[index].name)
            }
        }
    }

    /// Type for a resolved type-namespace entity, generic args taken from
    /// `segment`
    pub fn lower_type_ns(&self, ns: TypeNs, segment: Option<&PathSegment>) -> Ty {
        match ns {
            TypeNs::BuiltinType(builtin) => Ty::builtin(builtin),
            TypeNs::GenericParam(param) => Ty::Param(param),
            TypeNs::SelfType(def) => self.self_ty_of(def),
            TypeNs::Def(def) => self.lower_def_ty(def, segment),
        }
    }

    fn self_ty_of(&self, def: DefId) -> Ty {
        match &self.db.def(def).source {
            DefSource::Impl(imp) => match self.nested(def) {
                Some(lowerer) => lowerer.lower_ty(&imp.self_ty),
                None => Ty::Unknown,
            },
            DefSource::Trait(_) => Ty::trait_self(def),
            _ => Ty::Unknown,
        }
    }

    fn lower_def_ty(&self, def: DefId, segment: Option<&PathSegment>) -> Ty {
        let provided = self.segment_types(segment);
        match &self.db.def(def).source {
            DefSource::Struct(_) | DefSource::Enum(_) => Ty::Adt {
                def,
                args: self.fill_args(def, provided, None),
            },
            DefSource::TypeAlias(alias) => {
                let (Some(target), Some(lowerer)) = (&alias.ty, self.nested(def)) else {
                    return Ty::Unknown;
                };
                let args = self.fill_args(def, provided, None);
                let subst = Subst::from_pairs(&type_params(self.db, def), args);
                lowerer.lower_ty(target).subst(&subst)
            }
            // bare trait used as a type
            DefSource::Trait(_) => Ty::Dyn(vec![DynBound {
                trait_: def,
                args: self.fill_args(def, provided, None),
            }]),
            _ => Ty::Unknown,
        }
    }

    fn lower_assoc_shorthand(&self, ns: TypeNs, name: &str) -> Ty {
        match ns {
            TypeNs::GenericParam(param) => self.projection_from_param_bounds(param, name),
            TypeNs::SelfType(def) => match self.db.def(def).kind() {
                DefKind::Trait => {
                    let trait_ref = TraitRef {
                        trait_: def,
                        self_ty: Ty::trait_self(def),
                        args: identity_args(self.db, def),
                    };
                    self.find_assoc_type(trait_ref, name, &mut FxHashSet::default())
                        .map_or(Ty::Unknown, |p| Ty::Projection(Box::new(p)))
                }
                DefKind::Impl => {
                    if let Some(alias) = self
                        .db
                        .child_by_name(def, name)
                        .filter(|c| self.db.def(*c).kind() == DefKind::TypeAlias)
                    {
                        return self.lower_def_ty(alias, None);
                    }
                    match impl_trait_ref(self.db, def) {
                        Some(trait_ref) => self
                            .find_assoc_type(trait_ref, name, &mut FxHashSet::default())
                            .map_or(Ty::Unknown, |p| Ty::Projection(Box::new(p))),
                        None => Ty::Unknown,
                    }
                }
                _ => Ty::Unknown,
            },
            // `Trait::Item` and `Struct::Item` need a qualified path
            _ => Ty::Unknown,
        }
    }

    /// `T::Name` through the trait bounds declared for `T`
    fn projection_from_param_bounds(&self, param: GenericParamId, name: &str) -> Ty {
        if param.index == TRAIT_SELF_INDEX {
            let trait_ref = TraitRef {
                trait_: param.owner,
                self_ty: Ty::Param(param),
                args: identity_args(self.db, param.owner),
            };
            return self
                .find_assoc_type(trait_ref, name, &mut FxHashSet::default())
                .map_or(Ty::Unknown, |p| Ty::Projection(Box::new(p)));
        }
        for path in param_bound_paths(self.db, param) {
            let Some(trait_ref) = self.lower_trait_ref(path, Ty::Param(param)) else {
                continue;
            };
            if let Some(projection) = self.find_assoc_type(trait_ref, name, &mut FxHashSet::default()) {
                return Ty::Projection(Box::new(projection));
            }
        }
        Ty::Unknown
    }

    fn find_assoc_type(&self, trait_ref: TraitRef, name: &str, visited: &mut FxHashSet<DefId>) -> Option<ProjectionTy> {
        if !visited.insert(trait_ref.trait_) {
            return None;
        }
        let declares = self
            .db
            .child_by_name(trait_ref.trait_, name)
            .is_some_and(|c| self.db.def(c).kind() == DefKind::TypeAlias);
        if declares {
            return Some(ProjectionTy {
                trait_ref,
                name: name.to_string(),
            });
        }
        let subst = trait_subst(self.db, &trait_ref);
        supertraits(self.db, trait_ref.trait_)
            .into_iter()
            .find_map(|sup| self.find_assoc_type(sup.subst(&subst), name, visited))
    }

    pub fn resolve_trait(&self, path: &Path) -> Option<DefId> {
        match self.resolver.resolve_path_in_type_ns(path).ok().flatten() {
            Some((TypeNs::Def(def), None)) if self.db.is_trait(def) => Some(def),
            _ => None,
        }
    }

    /// `Trait<args>` applied to `self_ty`
    pub fn lower_trait_ref(&self, path: &Path, self_ty: Ty) -> Option<TraitRef> {
        self.lower_bound(path, self_ty).map(|(trait_ref, _)| trait_ref)
    }

    /// Trait reference of a bound plus its associated type bindings
    /// (`Iterator<Item = u8>`)
    pub fn lower_bound(&self, path: &Path, self_ty: Ty) -> Option<(TraitRef, Vec<(String, Ty)>)> {
        let trait_ = self.resolve_trait(path)?;
        let segment = path.last_segment();
        let args = self.fill_args(trait_, self.segment_types(segment), Some(&self_ty));
        let bindings = segment
            .and_then(|s| s.args.as_ref())
            .map(|args| args.bindings.iter().map(|b| (b.name.clone(), self.lower_ty(&b.ty))).collect())
            .unwrap_or_default();
        Some((TraitRef { trait_, self_ty, args }, bindings))
    }

    fn segment_types(&self, segment: Option<&PathSegment>) -> Vec<Ty> {
        segment
            .and_then(|s| s.args.as_ref())
            .map(|args| args.types().map(|t| self.lower_ty(t)).collect())
            .unwrap_or_default()
    }

    /// One argument per type parameter of `def`: the provided ones, then
    /// declared defaults, then `Unknown`
    fn fill_args(&self, def: DefId, provided: Vec<Ty>, self_ty: Option<&Ty>) -> Vec<Ty> {
        let params = type_params(self.db, def);
        if provided.len() >= params.len() {
            return provided.into_iter().take(params.len()).collect();
        }
        let Some(generics) = generics_of(self.db, def) else {
            return Vec::new();
        };
        let mut subst = Subst::new();
        if let Some(self_ty) = self_ty {
            subst.insert(GenericParamId { owner: def, index: TRAIT_SELF_INDEX }, self_ty.clone());
        }
        let mut provided = provided.into_iter();
        let mut args = Vec::with_capacity(params.len());
        for param in params {
            let ty = match provided.next() {
                Some(ty) => ty,
                None => match &generics.params[param.index as usize] {
                    GenericParam::Type { default: Some(default), .. } => self
                        .nested(def)
                        .map_or(Ty::Unknown, |lowerer| lowerer.lower_ty(default).subst(&subst)),
                    _ => Ty::Unknown,
                },
            };
            subst.insert(param, ty.clone());
            args.push(ty);
        }
        args
    }
}

/// Bound paths written for a type parameter, inline and in where-clauses
fn param_bound_paths(db: &HirDb, param: GenericParamId) -> Vec<&Path> {
    let Some(generics) = generics_of(db, param.owner) else {
        return Vec::new();
    };
    let Some(GenericParam::Type { name, bounds, .. }) = generics.params.get(param.index as usize) else {
        return Vec::new();
    };
    let inline = bounds.iter();
    let from_where = generics
        .where_preds
        .iter()
        .filter(|pred| matches!(&pred.ty, TypeRef::Path(p) if p.as_ident() == Some(name.name.as_str())))
        .flat_map(|pred| pred.bounds.iter());
    inline
        .chain(from_where)
        .filter_map(|b| match b {
            TypeBound::Trait(path) => Some(path),
            TypeBound::Lifetime(_) => None,
        })
        .collect()
}

/// Type parameters declared directly on `def`; variants report their enum's
pub fn type_params(db: &HirDb, def: DefId) -> Vec<GenericParamId> {
    let owner = match db.def(def).kind() {
        DefKind::Variant => match db.container(def) {
            Some(enum_) => enum_,
            None => return Vec::new(),
        },
        _ => def,
    };
    let Some(generics) = generics_of(db, owner) else {
        return Vec::new();
    };
    generics
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| matches!(p, GenericParam::Type { .. }))
        .map(|(index, _)| GenericParamId {
            owner,
            index: index as u32,
        })
        .collect()
}

/// Every type parameter in scope for `def`: the trait's `Self`, then the
/// container's parameters, then its own
pub fn all_type_params(db: &HirDb, def: DefId) -> Vec<GenericParamId> {
    let kind = db.def(def).kind();
    let mut params = Vec::new();
    if kind == DefKind::Trait {
        params.push(GenericParamId { owner: def, index: TRAIT_SELF_INDEX });
    }
    if kind != DefKind::Variant {
        if let Some(container) = db.container(def) {
            match db.def(container).kind() {
                DefKind::Trait => {
                    params.push(GenericParamId { owner: container, index: TRAIT_SELF_INDEX });
                    params.extend(type_params(db, container));
                }
                DefKind::Impl => params.extend(type_params(db, container)),
                _ => {}
            }
        }
    }
    params.extend(type_params(db, def));
    params
}

/// Own type parameters as `Ty::Param`
pub fn identity_args(db: &HirDb, def: DefId) -> Vec<Ty> {
    type_params(db, def).into_iter().map(Ty::Param).collect()
}

/// Struct or enum a struct or variant constructs
pub fn adt_of(db: &HirDb, def: DefId) -> DefId {
    match db.def(def).kind() {
        DefKind::Variant => db.container(def).unwrap_or(def),
        _ => def,
    }
}

/// `Self` type of the impl or trait containing `def`, if any
pub fn container_self_ty(db: &HirDb, def: DefId) -> Option<Ty> {
    let container = db.container(def)?;
    match db.def(container).kind() {
        DefKind::Impl => Some(impl_self_ty(db, container)),
        DefKind::Trait => Some(Ty::trait_self(container)),
        _ => None,
    }
}

/// Signature of a function; the receiver comes first for methods
pub fn fn_sig(db: &HirDb, def: DefId) -> Option<FnSig> {
    let DefSource::Function(f) = &db.def(def).source else {
        return None;
    };
    let lowerer = TyLowerer::for_def(db, def);
    let mut params = Vec::with_capacity(f.params.len() + 1);
    if let Some(self_param) = &f.self_param {
        let self_ty = container_self_ty(db, def).unwrap_or(Ty::Unknown);
        params.push(match self_param {
            SelfParam::Value { .. } => self_ty,
            SelfParam::Ref { mutable } => Ty::reference(self_ty, *mutable),
            SelfParam::Typed(ty) => lowerer.lower_ty(ty),
        });
    }
    params.extend(f.params.iter().map(|t| lowerer.lower_ty(t)));
    let ret = f.ret.as_ref().map_or_else(Ty::unit, |t| lowerer.lower_ty(t));
    Some(FnSig {
        params,
        ret,
        has_self: f.self_param.is_some(),
    })
}

/// Constructor signature of a tuple struct or tuple variant
pub fn ctor_sig(db: &HirDb, def: DefId) -> Option<FnSig> {
    match db.def(def).struct_kind()? {
        ferrite_ast::StructKind::Tuple(_) => {}
        _ => return None,
    }
    let adt = adt_of(db, def);
    let params = field_types(db, def).into_iter().map(|(_, ty)| ty).collect();
    Some(FnSig {
        params,
        ret: Ty::Adt {
            def: adt,
            args: identity_args(db, adt),
        },
        has_self: false,
    })
}

/// Declared field names and types of a struct or variant
pub fn field_types(db: &HirDb, def: DefId) -> Vec<(String, Ty)> {
    let Some(kind) = db.def(def).struct_kind() else {
        return Vec::new();
    };
    let lowerer = TyLowerer::for_def(db, def);
    kind.fields()
        .iter()
        .map(|field| (field.name.name.clone(), lowerer.lower_ty(&field.ty)))
        .collect()
}

pub fn impl_self_ty(db: &HirDb, imp: DefId) -> Ty {
    match &db.def(imp).source {
        DefSource::Impl(data) => TyLowerer::for_def(db, imp).lower_ty(&data.self_ty),
        _ => Ty::Unknown,
    }
}

/// Implemented trait of a trait impl
pub fn impl_trait_ref(db: &HirDb, imp: DefId) -> Option<TraitRef> {
    let DefSource::Impl(data) = &db.def(imp).source else {
        return None;
    };
    let path = data.trait_ref.as_ref()?;
    let lowerer = TyLowerer::for_def(db, imp);
    let self_ty = lowerer.lower_ty(&data.self_ty);
    lowerer.lower_trait_ref(path, self_ty)
}

/// Declared type of a const or static
pub fn value_ty(db: &HirDb, def: DefId) -> Ty {
    let ty = match &db.def(def).source {
        DefSource::Const(c) => &c.ty,
        DefSource::Static(s) => &s.ty,
        _ => return Ty::Unknown,
    };
    TyLowerer::for_def(db, def).lower_ty(ty)
}

/// Direct supertraits of `trait_`, with `Self` as the trait's own `Self`
pub fn supertraits(db: &HirDb, trait_: DefId) -> Vec<TraitRef> {
    let DefSource::Trait(data) = &db.def(trait_).source else {
        return Vec::new();
    };
    let lowerer = TyLowerer::for_def(db, trait_);
    let self_ty = Ty::trait_self(trait_);
    let from_where = data
        .generics
        .where_preds
        .iter()
        .filter(|pred| matches!(&pred.ty, TypeRef::Path(p) if p.as_ident() == Some("Self")))
        .flat_map(|pred| pred.bounds.iter());
    data.supertraits
        .iter()
        .chain(from_where)
        .filter_map(|bound| match bound {
            TypeBound::Trait(path) => lowerer.lower_trait_ref(path, self_ty.clone()),
            TypeBound::Lifetime(_) => None,
        })
        .filter(|sup| sup.trait_ != trait_)
        .collect()
}

/// Substitution mapping a trait's `Self` and parameters to `trait_ref`'s
pub fn trait_subst(db: &HirDb, trait_ref: &TraitRef) -> Subst {
    let mut subst = Subst::from_pairs(&type_params(db, trait_ref.trait_), trait_ref.args.iter().cloned());
    subst.insert(
        GenericParamId {
            owner: trait_ref.trait_,
            index: TRAIT_SELF_INDEX,
        },
        trait_ref.self_ty.clone(),
    );
    subst
}

/// Associated type alias `name` declared in `container`
pub fn assoc_type_alias(db: &HirDb, container: DefId, name: &str) -> Option<DefId> {
    db.children(container)
        .find(|c| db.def_name(*c) == Some(name) && db.def(*c).kind() == DefKind::TypeAlias)
}

/// Type an associated type alias stands for; None for declarations without
/// a default
pub fn assoc_type_value(db: &HirDb, alias: DefId) -> Option<Ty> {
    match &db.def(alias).source {
        DefSource::TypeAlias(data) => data.ty.as_ref().map(|t| TyLowerer::for_def(db, alias).lower_ty(t)),
        _ => None,
    }
}

/// Bounds `def` may assume: those of its container, a trait's own
/// `Self: Trait`, and its own parameter bounds and where-clauses
pub fn generic_predicates(db: &HirDb, def: DefId) -> Vec<Goal> {
    let mut goals = Vec::new();
    let mut owners = Vec::new();
    if let Some(container) = db.container(def) {
        if matches!(db.def(container).kind(), DefKind::Impl | DefKind::Trait) {
            owners.push(container);
        }
    }
    if db.def(def).kind() != DefKind::Variant {
        owners.push(def);
    }

    for owner in owners {
        if db.is_trait(owner) {
            goals.push(Goal::Implemented(TraitRef {
                trait_: owner,
                self_ty: Ty::trait_self(owner),
                args: identity_args(db, owner),
            }));
        }
        let Some(generics) = generics_of(db, owner) else {
            continue;
        };
        let lowerer = TyLowerer::for_def(db, owner);
        let mut add_bounds = |self_ty: Ty, bounds: &[TypeBound]| {
            for bound in bounds {
                let TypeBound::Trait(path) = bound else { continue };
                let Some((trait_ref, bindings)) = lowerer.lower_bound(path, self_ty.clone()) else {
                    continue;
                };
                for (name, ty) in bindings {
                    goals.push(Goal::Projection {
                        projection: ProjectionTy {
                            trait_ref: trait_ref.clone(),
                            name,
                        },
                        ty,
                    });
                }
                goals.push(Goal::Implemented(trait_ref));
            }
        };
        for (index, param) in generics.params.iter().enumerate() {
            if let GenericParam::Type { bounds, .. } = param {
                let id = GenericParamId {
                    owner,
                    index: index as u32,
                };
                add_bounds(Ty::Param(id), bounds);
            }
        }
        for pred in &generics.where_preds {
            add_bounds(lowerer.lower_ty(&pred.ty), &pred.bounds);
        }
    }
    goals
}

/// Items of a trait or impl whose syntax declares a function named `name`
pub fn assoc_fn(db: &HirDb, container: DefId, name: &str) -> Option<DefId> {
    db.children(container)
        .find(|c| db.def_name(*c) == Some(name) && db.def(*c).kind() == DefKind::Function)
}

/// Whether the function declared by `def` has a `self` parameter
pub fn has_self_param(db: &HirDb, def: DefId) -> bool {
    matches!(&db.def(def).source, DefSource::Function(f) if f.self_param.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::{TestDb, def_named};
    use ferrite_ast::{GenericArg, GenericArgs, StructKind, make};
    use ferrite_hir::IntTy;

    #[test]
    fn test_lower_primitives_and_compounds() {
        let db = TestDb::new().krate("app", Vec::new()).build();
        let hir = db.hir();
        let root = hir.crate_root(hir.crates().next().unwrap());
        let lowerer = TyLowerer::new(hir, Resolver::for_module(hir, root));

        let ty = lowerer.lower_ty(&TypeRef::reference(TypeRef::Slice(Box::new(TypeRef::path("i64"))), true));
        assert_eq!(ty, Ty::reference(Ty::Slice(Box::new(Ty::Int(IntTy::I64))), true));
        assert_eq!(lowerer.lower_ty(&TypeRef::Infer), Ty::Unknown);
        assert_eq!(lowerer.lower_ty(&TypeRef::path("Missing")), Ty::Unknown);
        assert_eq!(lowerer.lower_ty(&TypeRef::unit()), Ty::unit());
    }

    #[test]
    fn test_alias_substitutes_arguments() {
        // struct Wrapper<T>(T); type Pair<T> = (T, Wrapper<T>);
        let mut wrapper = make::strukt("Wrapper", StructKind::Tuple(vec![make::field("0", TypeRef::path("T"))]));
        wrapper.generics = make::generics(&[("T", &[])]);
        let mut pair = make::type_alias(
            "Pair",
            Some(TypeRef::Tuple(vec![TypeRef::path("T"), TypeRef::path("Wrapper<T>")])),
        );
        pair.generics = make::generics(&[("T", &[])]);
        let db = TestDb::new().krate("app", vec![wrapper.into(), pair.into()]).build();
        let hir = db.hir();
        let root = hir.crate_root(hir.crates().next().unwrap());
        let lowerer = TyLowerer::new(hir, Resolver::for_module(hir, root));

        let wrapper = def_named(hir, "Wrapper");
        assert_eq!(
            lowerer.lower_ty(&TypeRef::path("Pair<bool>")),
            Ty::Tuple(vec![Ty::Bool, Ty::Adt { def: wrapper, args: vec![Ty::Bool] }])
        );
    }

    #[test]
    fn test_cyclic_alias_terminates() {
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    make::type_alias("A", Some(TypeRef::path("B"))).into(),
                    make::type_alias("B", Some(TypeRef::path("A"))).into(),
                ],
            )
            .build();
        let hir = db.hir();
        let root = hir.crate_root(hir.crates().next().unwrap());
        let lowerer = TyLowerer::new(hir, Resolver::for_module(hir, root));
        assert_eq!(lowerer.lower_ty(&TypeRef::path("A")), Ty::Unknown);
    }

    #[test]
    fn test_param_shorthand_projection() {
        // trait Iter { type Item; }  fn first<I: Iter>(it: I) -> I::Item;
        let iter = make::trait_("Iter", vec![make::type_alias("Item", None).into()]);
        let mut first = make::func("first", vec![TypeRef::path("I")], Some(TypeRef::path("I::Item")), None);
        first.generics = make::generics(&[("I", &["Iter"])]);
        let db = TestDb::new().krate("app", vec![iter.into(), first.into()]).build();
        let hir = db.hir();
        let first = def_named(hir, "first");
        let iter = def_named(hir, "Iter");

        let sig = fn_sig(hir, first).unwrap();
        let param = Ty::Param(GenericParamId { owner: first, index: 0 });
        assert_eq!(sig.params, vec![param.clone()]);
        assert_eq!(
            sig.ret,
            Ty::Projection(Box::new(ProjectionTy {
                trait_ref: TraitRef {
                    trait_: iter,
                    self_ty: param,
                    args: Vec::new()
                },
                name: "Item".to_string(),
            }))
        );
    }

    #[test]
    fn test_trait_default_argument_uses_self() {
        // trait Add<Rhs = Self> {}  struct S;  impl Add for S {}
        let mut add = make::trait_("Add", Vec::new());
        add.generics.params.push(GenericParam::Type {
            name: ferrite_ast::Ident::synthetic("Rhs"),
            bounds: Vec::new(),
            default: Some(TypeRef::path("Self")),
        });
        let db = TestDb::new()
            .krate(
                "app",
                vec![
                    add.into(),
                    make::strukt("S", StructKind::Unit).into(),
                    make::impl_(Some("Add"), TypeRef::path("S"), Vec::new()).into(),
                ],
            )
            .build();
        let hir = db.hir();
        let s = def_named(hir, "S");
        let imp = hir.impls().next().unwrap();
        let trait_ref = impl_trait_ref(hir, imp).unwrap();
        let s_ty = Ty::Adt { def: s, args: Vec::new() };
        assert_eq!(trait_ref.self_ty, s_ty);
        assert_eq!(trait_ref.args, vec![s_ty]);
    }

    #[test]
    fn test_predicates_include_bindings() {
        // trait Iter { type Item; }  fn f<I>() where I: Iter<Item = u8> {}
        let iter = make::trait_("Iter", vec![make::type_alias("Item", None).into()]);
        let mut f = make::func("f", Vec::new(), None, None);
        f.generics = make::generics(&[("I", &[])]);
        let mut bound = Path::parse("Iter");
        bound.segments[0].args = Some(GenericArgs {
            args: Vec::<GenericArg>::new(),
            bindings: vec![ferrite_ast::AssocTypeBinding {
                name: "Item".into(),
                ty: TypeRef::path("u8"),
            }],
        });
        f.generics.where_preds.push(ferrite_ast::WherePredicate {
            ty: TypeRef::path("I"),
            bounds: vec![TypeBound::Trait(bound)],
        });
        let db = TestDb::new().krate("app", vec![iter.into(), f.into()]).build();
        let hir = db.hir();
        let goals = generic_predicates(hir, def_named(hir, "f"));
        assert_eq!(goals.len(), 2);
        assert!(matches!(&goals[0], Goal::Projection { ty: Ty::Uint(_), .. }));
        assert!(matches!(&goals[1], Goal::Implemented(tr) if tr.trait_ == def_named(hir, "Iter")));
    }
}
