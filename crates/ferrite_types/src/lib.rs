//! Type inference and trait resolution
//!
//! Each function, const or static body is inferred on its own:
//! 1. Signatures and written types are lowered from the resolved HIR
//! 2. The body is walked once, unifying inference variables as it goes
//! 3. Trait obligations are solved against the impl index and the
//!    declaration's where-clauses until no more progress is made
//! 4. Remaining variables are resolved, integer and float literals fall
//!    back to `i32` and `f64`, and the result is frozen and cached

mod cache;
mod db;
mod expr;
mod infer;
mod lower;
mod method;
mod pat;
mod result;
mod table;
mod traits;
mod ty;

#[cfg(test)]
mod test_db;

pub use cache::{CycleError, InFlightGuard, InferError, InferenceCache};
pub use db::{ImplData, ImplDb, InferenceConfig, TyFingerprint, TypeDb};
pub use lower::{TyLowerer, fn_sig, impl_self_ty, impl_trait_ref, value_ty};
pub use result::{
    Adjust, Adjustment, FieldRef, InferenceDiagnostic, InferenceResult, MethodResolution, NodeId,
};
pub use traits::{Goal, Obligation, ParamEnv};
pub use ty::{DynBound, FloatVid, FnSig, InferTy, IntVid, ProjectionTy, Subst, TraitRef, Ty, TyDisplay, TyVid};
