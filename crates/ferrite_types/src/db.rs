//! Type database: the name-resolution snapshot plus the impl index, solver
//! limits and the shared inference cache.

use std::sync::Arc;

use ferrite_hir::{DefId, FloatTy, HirDb, IntTy, UintTy};
use ferrite_syntax::Cancellation;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::{InferError, InferenceCache};
use crate::result::InferenceResult;
use crate::lower::{impl_self_ty, impl_trait_ref};
use crate::ty::{TraitRef, Ty};

/// Limits of the inference engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Deref steps tried for method receivers and field access
    pub autoderef_limit: usize,
    /// Nesting of obligations produced while proving one bound
    pub solver_depth: u32,
    /// Fulfillment passes before giving up on reaching a fixed point
    pub fulfillment_rounds: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            autoderef_limit: 10,
            solver_depth: 32,
            fulfillment_rounds: 64,
        }
    }
}

/// Outermost type constructor, used to find impls without unification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TyFingerprint {
    Bool,
    Char,
    Str,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
    Ref(bool),
    Ptr(bool),
    Array,
    Slice,
    Tuple(usize),
    Fn(usize),
    Adt(DefId),
    Dyn(DefId),
    Never,
}

impl TyFingerprint {
    /// None for parameters, projections and anything not yet inferred
    pub fn for_ty(ty: &Ty) -> Option<TyFingerprint> {
        Some(match ty {
            Ty::Bool => TyFingerprint::Bool,
            Ty::Char => TyFingerprint::Char,
            Ty::Str => TyFingerprint::Str,
            Ty::Int(i) => TyFingerprint::Int(*i),
            Ty::Uint(u) => TyFingerprint::Uint(*u),
            Ty::Float(f) => TyFingerprint::Float(*f),
            Ty::Ref { mutable, .. } => TyFingerprint::Ref(*mutable),
            Ty::Ptr { mutable, .. } => TyFingerprint::Ptr(*mutable),
            Ty::Array { .. } => TyFingerprint::Array,
            Ty::Slice(_) => TyFingerprint::Slice,
            Ty::Tuple(elems) => TyFingerprint::Tuple(elems.len()),
            Ty::Fn { params, .. } => TyFingerprint::Fn(params.len()),
            Ty::Adt { def, .. } => TyFingerprint::Adt(*def),
            Ty::Dyn(bounds) => TyFingerprint::Dyn(bounds.first()?.trait_),
            Ty::Never => TyFingerprint::Never,
            Ty::Param(_) | Ty::Projection(_) | Ty::Infer(_) | Ty::Unknown => return None,
        })
    }
}

/// Lowered header of an impl block
#[derive(Debug, Clone)]
pub struct ImplData {
    pub def: DefId,
    pub self_ty: Ty,
    pub trait_ref: Option<TraitRef>,
}

#[derive(Debug, Default)]
struct TraitImpls {
    by_self: FxHashMap<TyFingerprint, Vec<DefId>>,
    /// Impls whose self type is a parameter
    blanket: Vec<DefId>,
}

/// Every impl of the workspace, indexed by self type constructor
#[derive(Debug, Default)]
pub struct ImplDb {
    impls: FxHashMap<DefId, ImplData>,
    inherent: FxHashMap<TyFingerprint, Vec<DefId>>,
    by_trait: FxHashMap<DefId, TraitImpls>,
}

impl ImplDb {
    pub fn collect(db: &HirDb) -> Self {
        let mut all: Vec<DefId> = db.impls().collect();
        all.sort_by_key(|d| (d.krate, d.local_id));

        let mut index = ImplDb::default();
        for def in all {
            let self_ty = impl_self_ty(db, def);
            let trait_ref = impl_trait_ref(db, def);
            let fingerprint = TyFingerprint::for_ty(&self_ty);
            match (&trait_ref, fingerprint) {
                (Some(trait_ref), Some(fp)) => index
                    .by_trait
                    .entry(trait_ref.trait_)
                    .or_default()
                    .by_self
                    .entry(fp)
                    .or_default()
                    .push(def),
                (Some(trait_ref), None) => index.by_trait.entry(trait_ref.trait_).or_default().blanket.push(def),
                (None, Some(fp)) => index.inherent.entry(fp).or_default().push(def),
                // inherent impls on parameters are not allowed
                (None, None) => {}
            }
            index.impls.insert(def, ImplData { def, self_ty, trait_ref });
        }
        debug!(impls = index.impls.len(), traits = index.by_trait.len(), "impl index built");
        index
    }

    pub fn impl_data(&self, def: DefId) -> Option<&ImplData> {
        self.impls.get(&def)
    }

    pub fn len(&self) -> usize {
        self.impls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impls.is_empty()
    }

    pub fn inherent_impls(&self, self_ty: &Ty) -> &[DefId] {
        TyFingerprint::for_ty(self_ty)
            .and_then(|fp| self.inherent.get(&fp))
            .map_or(&[], Vec::as_slice)
    }

    /// Impls of `trait_` that may apply to `self_ty`; every impl of the trait
    /// when the self type is not known yet
    pub fn trait_impls(&self, trait_: DefId, self_ty: &Ty) -> Vec<DefId> {
        let Some(impls) = self.by_trait.get(&trait_) else {
            return Vec::new();
        };
        match TyFingerprint::for_ty(self_ty) {
            Some(fp) => impls
                .by_self
                .get(&fp)
                .into_iter()
                .flatten()
                .chain(&impls.blanket)
                .copied()
                .collect(),
            None => {
                let mut all: Vec<DefId> = impls.by_self.values().flatten().chain(&impls.blanket).copied().collect();
                all.sort_by_key(|d| (d.krate, d.local_id));
                all
            }
        }
    }
}

/// Read-only view shared by every inference run over one workspace snapshot
pub struct TypeDb {
    hir: Arc<HirDb>,
    impls: ImplDb,
    config: InferenceConfig,
    cache: Arc<InferenceCache>,
}

impl TypeDb {
    pub fn new(hir: Arc<HirDb>) -> Self {
        Self::with_config(hir, InferenceConfig::default())
    }

    pub fn with_config(hir: Arc<HirDb>, config: InferenceConfig) -> Self {
        let impls = ImplDb::collect(&hir);
        Self {
            hir,
            impls,
            config,
            cache: Arc::new(InferenceCache::new()),
        }
    }

    /// Share a result cache with other snapshots; entries of older epochs
    /// are recomputed on access
    pub fn with_cache(mut self, cache: Arc<InferenceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn hir(&self) -> &HirDb {
        &self.hir
    }

    pub fn impls(&self) -> &ImplDb {
        &self.impls
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<InferenceCache> {
        &self.cache
    }

    /// Inference result of a function, const or static body. Results are
    /// cached per epoch; a body whose inference re-enters itself on the same
    /// thread fails with a cycle error.
    pub fn infer(&self, def: DefId, cancel: &Cancellation) -> Result<Arc<InferenceResult>, InferError> {
        let epoch = self.hir.epoch();
        if let Some(result) = self.cache.get(def, epoch) {
            return Ok(result);
        }
        let _guard = self.cache.begin(def, epoch)?;
        let result = Arc::new(crate::infer::infer_body(self, def, cancel)?);
        self.cache.insert(def, epoch, Arc::clone(&result));
        Ok(result)
    }

    /// Trait marked `#[lang = "name"]`
    pub fn lang_trait(&self, name: &str) -> Option<DefId> {
        self.hir.lang_item(name).filter(|def| self.hir.is_trait(*def))
    }
}
