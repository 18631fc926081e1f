//! Frozen output of inferring one body

use std::ops::Index;

use ferrite_ast::{ExprId, PatId};
use ferrite_hir::{DefId, HirDb, ValueNs};
use la_arena::ArenaMap;
use rustc_hash::FxHashMap;

use crate::ty::{TraitRef, Ty};

static UNKNOWN: Ty = Ty::Unknown;

/// Implicit conversion applied to an expression or pattern scrutinee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub kind: Adjust,
    /// Type after the adjustment
    pub target: Ty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjust {
    /// `!` used where a value of another type is expected
    NeverToAny,
    /// Built-in `*` on references, or a `Deref` impl when `overloaded`
    Deref { overloaded: bool },
    /// Auto-ref of a method receiver, or `&mut T` reborrowed as `&T`
    Borrow { mutable: bool },
    /// `&[T; N]` to `&[T]`
    Unsize,
}

/// Method a call resolved to, with the receiver type it was picked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResolution {
    pub method: DefId,
    pub self_ty: Ty,
}

/// Field of a struct or variant, by declaration index; tuple fields of
/// tuple types have no owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub owner: Option<DefId>,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Expr(ExprId),
    Pat(PatId),
}

/// Problem found while inferring a body. Parameters are kept structured;
/// rendering is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceDiagnostic {
    TypeMismatch { node: NodeId, expected: Ty, actual: Ty },
    UnresolvedPath { node: NodeId, path: String },
    UnresolvedMethod { expr: ExprId, receiver: Ty, name: String },
    UnresolvedField { expr: ExprId, receiver: Ty, name: String },
    NoSuchField { node: NodeId, owner: DefId, name: String },
    UnsatisfiedBound { expr: Option<ExprId>, trait_ref: TraitRef },
    ProjectionError { expr: Option<ExprId>, trait_ref: TraitRef, name: String },
    /// A variable would have contained itself and was set to unknown
    CyclicType { expr: Option<ExprId> },
    ArgCountMismatch { expr: ExprId, expected: usize, found: usize },
    NotCallable { expr: ExprId, ty: Ty },
    BreakOutsideLoop { expr: ExprId },
    UnresolvedLabel { expr: ExprId, label: String },
    /// Macro call whose expansion was not supplied with the tree
    UnexpandedMacroCall { expr: ExprId, path: String },
}

impl InferenceDiagnostic {
    /// Short description with types rendered against `db`
    pub fn message(&self, db: &HirDb) -> String {
        match self {
            InferenceDiagnostic::TypeMismatch { expected, actual, .. } => format!(
                "mismatched types: expected `{}`, found `{}`",
                expected.display(db),
                actual.display(db)
            ),
            InferenceDiagnostic::UnresolvedPath { path, .. } => format!("unresolved path `{path}`"),
            InferenceDiagnostic::UnresolvedMethod { receiver, name, .. } => {
                format!("no method `{name}` on `{}`", receiver.display(db))
            }
            InferenceDiagnostic::UnresolvedField { receiver, name, .. } => {
                format!("no field `{name}` on `{}`", receiver.display(db))
            }
            InferenceDiagnostic::NoSuchField { owner, name, .. } => format!(
                "`{}` has no field `{name}`",
                db.def_name(*owner).unwrap_or("_")
            ),
            InferenceDiagnostic::UnsatisfiedBound { trait_ref, .. } => format!(
                "`{}` does not implement `{}`",
                trait_ref.self_ty.display(db),
                db.def_name(trait_ref.trait_).unwrap_or("_")
            ),
            InferenceDiagnostic::ProjectionError { trait_ref, name, .. } => format!(
                "cannot normalize `<{} as {}>::{name}`",
                trait_ref.self_ty.display(db),
                db.def_name(trait_ref.trait_).unwrap_or("_")
            ),
            InferenceDiagnostic::CyclicType { .. } => "cyclic type".to_string(),
            InferenceDiagnostic::ArgCountMismatch { expected, found, .. } => {
                format!("expected {expected} arguments, found {found}")
            }
            InferenceDiagnostic::NotCallable { ty, .. } => format!("`{}` is not callable", ty.display(db)),
            InferenceDiagnostic::BreakOutsideLoop { .. } => "`break` outside of a loop".to_string(),
            InferenceDiagnostic::UnresolvedLabel { label, .. } => format!("undeclared label `{label}`"),
            InferenceDiagnostic::UnexpandedMacroCall { path, .. } => format!("macro call `{path}!` was not expanded"),
        }
    }
}

/// Types and resolutions of every node of one body
#[derive(Debug, Default)]
pub struct InferenceResult {
    pub(crate) type_of_expr: ArenaMap<ExprId, Ty>,
    pub(crate) type_of_pat: ArenaMap<PatId, Ty>,
    pub(crate) expr_adjustments: FxHashMap<ExprId, Vec<Adjustment>>,
    /// References peeled off the scrutinee by match ergonomics
    pub(crate) pat_adjustments: FxHashMap<PatId, Vec<Ty>>,
    pub(crate) expr_paths: FxHashMap<ExprId, ValueNs>,
    pub(crate) pat_paths: FxHashMap<PatId, DefId>,
    pub(crate) methods: FxHashMap<ExprId, MethodResolution>,
    pub(crate) fields: FxHashMap<ExprId, FieldRef>,
    /// Struct literal field initializers and record pattern fields
    pub(crate) record_fields: FxHashMap<(NodeId, usize), FieldRef>,
    pub(crate) diagnostics: Vec<InferenceDiagnostic>,
    pub(crate) return_ty: Ty,
    pub(crate) has_cyclic_type: bool,
}

impl InferenceResult {
    pub fn type_of_expr(&self, expr: ExprId) -> Option<&Ty> {
        self.type_of_expr.get(expr)
    }

    pub fn type_of_pat(&self, pat: PatId) -> Option<&Ty> {
        self.type_of_pat.get(pat)
    }

    pub fn expr_adjustments(&self, expr: ExprId) -> &[Adjustment] {
        self.expr_adjustments.get(&expr).map_or(&[], Vec::as_slice)
    }

    pub fn pat_adjustments(&self, pat: PatId) -> &[Ty] {
        self.pat_adjustments.get(&pat).map_or(&[], Vec::as_slice)
    }

    /// What a path expression refers to, after associated item refinement
    pub fn path_resolution(&self, expr: ExprId) -> Option<ValueNs> {
        self.expr_paths.get(&expr).copied()
    }

    /// Constant, unit struct or variant named by a path pattern
    pub fn pat_resolution(&self, pat: PatId) -> Option<DefId> {
        self.pat_paths.get(&pat).copied()
    }

    pub fn method_resolution(&self, expr: ExprId) -> Option<&MethodResolution> {
        self.methods.get(&expr)
    }

    pub fn field_resolution(&self, expr: ExprId) -> Option<FieldRef> {
        self.fields.get(&expr).copied()
    }

    /// Field the `index`-th initializer of a struct literal, or the
    /// `index`-th field of a record pattern, refers to
    pub fn record_field(&self, node: NodeId, index: usize) -> Option<FieldRef> {
        self.record_fields.get(&(node, index)).copied()
    }

    pub fn diagnostics(&self) -> &[InferenceDiagnostic] {
        &self.diagnostics
    }

    pub fn return_ty(&self) -> &Ty {
        &self.return_ty
    }

    pub fn has_cyclic_type(&self) -> bool {
        self.has_cyclic_type
    }
}

impl Index<ExprId> for InferenceResult {
    type Output = Ty;

    fn index(&self, expr: ExprId) -> &Ty {
        self.type_of_expr.get(expr).unwrap_or(&UNKNOWN)
    }
}

impl Index<PatId> for InferenceResult {
    type Output = Ty;

    fn index(&self, pat: PatId) -> &Ty {
        self.type_of_pat.get(pat).unwrap_or(&UNKNOWN)
    }
}
