//! Method and associated item lookup.
//!
//! A receiver is dereferenced step by step. At every step the receiver is
//! tried by value, then auto-referenced; inherent methods are tried before
//! trait methods. The first step with a match wins.

use ferrite_hir::{DefId, DefKind, GenericParamId, HirDb};
use tracing::trace;

use crate::lower::{all_type_params, assoc_fn, fn_sig, has_self_param, identity_args, type_params};
use crate::traits::{InferCtxt, Normalized, Selection, elaborate};
use crate::ty::{InferTy, ProjectionTy, Subst, TRAIT_SELF_INDEX, TraitRef, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKind {
    Start,
    BuiltinDeref,
    OverloadedDeref,
    /// Array viewed as a slice
    Unsize,
}

#[derive(Debug, Clone)]
pub(crate) struct AutoderefStep {
    pub(crate) ty: Ty,
    pub(crate) kind: StepKind,
}

/// Where an associated item was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PickSource {
    Inherent(DefId),
    Trait(DefId),
}

#[derive(Debug, Clone)]
pub(crate) struct MethodPick {
    pub(crate) method: DefId,
    pub(crate) source: PickSource,
    /// Steps taken up to and including the one the method was found at
    pub(crate) steps: Vec<AutoderefStep>,
    /// Some(mutable) when the receiver is auto-referenced
    pub(crate) autoref: Option<bool>,
}

impl MethodPick {
    /// Receiver type at the step the method was found
    pub(crate) fn self_ty(&self) -> Ty {
        self.steps.last().map_or(Ty::Unknown, |step| step.ty.clone())
    }
}

impl InferCtxt<'_> {
    /// Types reachable from `ty` by dereferencing, `ty` itself first
    pub(crate) fn autoderef(&mut self, ty: &Ty) -> Vec<AutoderefStep> {
        let limit = self.db.config().autoderef_limit;
        let mut steps = vec![AutoderefStep {
            ty: self.resolve(ty),
            kind: StepKind::Start,
        }];
        while steps.len() <= limit {
            let Some(current) = steps.last().map(|s| s.ty.clone()) else { break };
            let next = match &current {
                Ty::Ref { inner, .. } => Some((inner.as_ref().clone(), StepKind::BuiltinDeref)),
                Ty::Infer(_) | Ty::Unknown | Ty::Never => None,
                _ => self.overloaded_deref(&current).map(|t| (t, StepKind::OverloadedDeref)),
            };
            let Some((next, kind)) = next else { break };
            let next = self.resolve(&next);
            if steps.iter().any(|s| s.ty == next) {
                break;
            }
            steps.push(AutoderefStep { ty: next, kind });
        }
        if let Some(Ty::Array { elem, .. }) = steps.last().map(|s| &s.ty) {
            let slice = Ty::Slice(elem.clone());
            steps.push(AutoderefStep {
                ty: slice,
                kind: StepKind::Unsize,
            });
        }
        trace!(steps = steps.len(), "autoderef");
        steps
    }

    /// `<ty as Deref>::Target` when a `Deref` impl applies
    pub(crate) fn overloaded_deref(&mut self, ty: &Ty) -> Option<Ty> {
        let deref = self.db.lang_trait("deref")?;
        let trait_ref = TraitRef {
            trait_: deref,
            self_ty: ty.clone(),
            args: Vec::new(),
        };
        let snapshot = self.table.snapshot();
        let target = match self.select(&trait_ref, 0) {
            Selection::Holds(_) => match self.normalize_projection(
                &ProjectionTy {
                    trait_ref,
                    name: "Target".into(),
                },
                0,
            ) {
                Normalized::Ty(ty, _) if !ty.is_unknown() => Some(ty),
                _ => None,
            },
            Selection::Ambiguous | Selection::NoSolution => None,
        };
        // variables created by the impl match stay alive when the deref applies
        if target.is_some() {
            self.table.commit(snapshot);
        } else {
            self.table.rollback_to(snapshot);
        }
        target
    }

    /// Find method `name` for a receiver of type `receiver`. `traits` are the
    /// traits in scope at the call.
    pub(crate) fn lookup_method(&mut self, receiver: &Ty, name: &str, traits: &[DefId]) -> Option<MethodPick> {
        let steps = self.autoderef(receiver);
        for (index, step) in steps.iter().enumerate() {
            let step_ty = step.ty.clone();
            if matches!(step_ty, Ty::Infer(InferTy::Var(_)) | Ty::Unknown) {
                break;
            }
            for autoref in [None, Some(false), Some(true)] {
                let adjusted = match autoref {
                    None => step_ty.clone(),
                    Some(mutable) => Ty::reference(step_ty.clone(), mutable),
                };
                let found = self
                    .probe_inherent_method(&step_ty, &adjusted, name)
                    .or_else(|| self.probe_trait_method(&step_ty, &adjusted, name, traits));
                if let Some((method, source)) = found {
                    trace!(name, step = index, ?autoref, "method picked");
                    return Some(MethodPick {
                        method,
                        source,
                        steps: steps[..=index].to_vec(),
                        autoref,
                    });
                }
            }
        }
        None
    }

    fn probe_inherent_method(&mut self, self_ty: &Ty, receiver: &Ty, name: &str) -> Option<(DefId, PickSource)> {
        let db = self.db;
        let hir = db.hir();
        for &imp in db.impls().inherent_impls(self_ty) {
            let Some(method) = assoc_fn(hir, imp, name) else { continue };
            if !has_self_param(hir, method) {
                continue;
            }
            let Some(sig) = fn_sig(hir, method) else { continue };
            let Some(data) = db.impls().impl_data(imp) else { continue };
            let matches = self.table.probe(|table| {
                let params = all_type_params(hir, method);
                let vars: Vec<Ty> = params.iter().map(|_| table.new_var()).collect();
                let subst = Subst::from_pairs(&params, vars);
                table.unify(&data.self_ty.subst(&subst), self_ty)
                    && sig.params.first().is_some_and(|first| table.unify(&first.subst(&subst), receiver))
            });
            if matches {
                return Some((method, PickSource::Inherent(imp)));
            }
        }
        None
    }

    fn probe_trait_method(
        &mut self,
        self_ty: &Ty,
        receiver: &Ty,
        name: &str,
        traits: &[DefId],
    ) -> Option<(DefId, PickSource)> {
        let hir = self.hir();
        for trait_ in self.candidate_traits(self_ty, traits) {
            let Some(method) = assoc_fn(hir, trait_, name) else { continue };
            if !has_self_param(hir, method) {
                continue;
            }
            let Some(sig) = fn_sig(hir, method) else { continue };
            let snapshot = self.table.snapshot();
            let mut subst = Subst::new();
            for param in all_type_params(hir, method) {
                let ty = if param.owner == trait_ && param.index == TRAIT_SELF_INDEX {
                    self_ty.clone()
                } else {
                    self.table.new_var()
                };
                subst.insert(param, ty);
            }
            let trait_ref = TraitRef {
                trait_,
                self_ty: self_ty.clone(),
                args: type_params(hir, trait_)
                    .into_iter()
                    .map(|p| subst.get(p).cloned().unwrap_or(Ty::Unknown))
                    .collect(),
            };
            let receiver_matches = sig
                .params
                .first()
                .is_some_and(|first| self.table.unify(&first.subst(&subst), receiver));
            let holds = receiver_matches && !matches!(self.select(&trait_ref, 0), Selection::NoSolution);
            self.table.rollback_to(snapshot);
            if holds {
                return Some((method, PickSource::Trait(trait_)));
            }
        }
        None
    }

    /// Traits whose methods may apply to `self_ty`: those in scope, those
    /// the environment bounds mention and the traits of a trait object,
    /// supertraits included
    fn candidate_traits(&self, self_ty: &Ty, in_scope: &[DefId]) -> Vec<DefId> {
        let hir = self.hir();
        let mut traits: Vec<DefId> = in_scope.to_vec();
        for trait_ in self.env.traits() {
            if !traits.contains(&trait_) {
                traits.push(trait_);
            }
        }
        if let Ty::Dyn(bounds) = self_ty {
            for bound in bounds {
                let principal = TraitRef {
                    trait_: bound.trait_,
                    self_ty: self_ty.clone(),
                    args: bound.args.clone(),
                };
                for trait_ref in elaborate(hir, principal) {
                    if !traits.contains(&trait_ref.trait_) {
                        traits.push(trait_ref.trait_);
                    }
                }
            }
        }
        traits
    }

    /// Associated function or const `name` of `self_ty` (`Type::name`)
    pub(crate) fn lookup_assoc_item(&mut self, self_ty: &Ty, name: &str, traits: &[DefId]) -> Option<(DefId, PickSource)> {
        let db = self.db;
        let hir = db.hir();
        let is_value = |def: DefId| matches!(hir.def(def).kind(), DefKind::Function | DefKind::Const);
        for &imp in db.impls().inherent_impls(self_ty) {
            let Some(item) = hir.child_by_name(imp, name).filter(|d| is_value(*d)) else { continue };
            let Some(data) = db.impls().impl_data(imp) else { continue };
            let matches = self.table.probe(|table| {
                let params = type_params(hir, imp);
                let vars: Vec<Ty> = params.iter().map(|_| table.new_var()).collect();
                table.unify(&data.self_ty.subst(&Subst::from_pairs(&params, vars)), self_ty)
            });
            if matches {
                return Some((item, PickSource::Inherent(imp)));
            }
        }
        for trait_ in self.candidate_traits(self_ty, traits) {
            let Some(item) = hir.child_by_name(trait_, name).filter(|d| is_value(*d)) else { continue };
            let snapshot = self.table.snapshot();
            let args = type_params(hir, trait_)
                .iter()
                .map(|_| self.table.new_var())
                .collect();
            let trait_ref = TraitRef {
                trait_,
                self_ty: self_ty.clone(),
                args,
            };
            let holds = !matches!(self.select(&trait_ref, 0), Selection::NoSolution);
            self.table.rollback_to(snapshot);
            if holds {
                return Some((item, PickSource::Trait(trait_)));
            }
        }
        None
    }

    /// Substitution for calling `item` found through `source` on `self_ty`;
    /// the item's bounds become obligations
    pub(crate) fn instantiate_assoc(&mut self, item: DefId, source: PickSource, self_ty: &Ty, explicit: &[Ty]) -> Subst {
        let db = self.db;
        let hir = db.hir();
        let mut preset = Subst::new();
        match source {
            PickSource::Inherent(imp) => {
                for param in type_params(hir, imp) {
                    preset.insert(param, self.table.new_var());
                }
                if let Some(data) = db.impls().impl_data(imp) {
                    let impl_self = data.self_ty.subst(&preset);
                    self.unify(&impl_self, self_ty);
                }
            }
            PickSource::Trait(trait_) => {
                let self_param = GenericParamId {
                    owner: trait_,
                    index: TRAIT_SELF_INDEX,
                };
                preset.insert(self_param, self_ty.clone());
            }
        }
        self.instantiate(item, preset, explicit)
    }

    /// Impl method a trait method call dispatches to once the receiver type
    /// is fully known
    pub(crate) fn refine_trait_method(&mut self, method: DefId, trait_ref: &TraitRef) -> Option<DefId> {
        let db = self.db;
        let hir = db.hir();
        let name = hir.def_name(method)?;
        let self_ty = self.resolve(&trait_ref.self_ty);
        if self_ty.contains_infer() || matches!(self_ty, Ty::Param(_) | Ty::Dyn(_) | Ty::Unknown) {
            return None;
        }
        let candidates: Vec<DefId> = db
            .impls()
            .trait_impls(trait_ref.trait_, &self_ty)
            .into_iter()
            .filter(|imp| {
                let Some(impl_trait) = db.impls().impl_data(*imp).and_then(|d| d.trait_ref.clone()) else {
                    return false;
                };
                self.table.probe(|table| {
                    let params = type_params(hir, *imp);
                    let vars: Vec<Ty> = params.iter().map(|_| table.new_var()).collect();
                    crate::traits::unify_trait_refs(
                        table,
                        &impl_trait.subst(&Subst::from_pairs(&params, vars)),
                        &TraitRef {
                            self_ty: self_ty.clone(),
                            ..trait_ref.clone()
                        },
                    )
                })
            })
            .collect();
        match candidates.as_slice() {
            [imp] => assoc_fn(hir, *imp, name).or_else(|| hir.child_by_name(*imp, name)),
            _ => None,
        }
    }
}

/// Trait reference a trait item was instantiated with
pub(crate) fn trait_ref_for(db: &HirDb, trait_: DefId, subst: &Subst) -> TraitRef {
    let self_ty = subst
        .get(GenericParamId {
            owner: trait_,
            index: TRAIT_SELF_INDEX,
        })
        .cloned()
        .unwrap_or(Ty::Unknown);
    TraitRef {
        trait_,
        self_ty,
        args: identity_args(db, trait_).iter().map(|arg| arg.subst(subst)).collect(),
    }
}
