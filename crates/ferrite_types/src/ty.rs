//! Type representation

use std::fmt;

use ferrite_hir::{BuiltinType, DefId, FloatTy, GenericParamId, HirDb, IntTy, UintTy};
use rustc_hash::FxHashMap;

/// Index of the implicit `Self` parameter of a trait
pub const TRAIT_SELF_INDEX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVid(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntVid(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatVid(pub u32);

/// Inference variables; each kind lives in its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferTy {
    Var(TyVid),
    /// Integer literal of a not yet known integer type
    Int(IntVid),
    /// Float literal of a not yet known float type
    Float(FloatVid),
}

/// `Trait<args>` applied to a self type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraitRef {
    pub trait_: DefId,
    pub self_ty: Ty,
    pub args: Vec<Ty>,
}

/// `<self_ty as Trait<args>>::name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionTy {
    pub trait_ref: TraitRef,
    pub name: String,
}

/// One trait of a trait object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynBound {
    pub trait_: DefId,
    pub args: Vec<Ty>,
}

/// The type of a value. Lifetimes are erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Bool,
    Char,
    Str,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
    Ref { mutable: bool, inner: Box<Ty> },
    Ptr { mutable: bool, inner: Box<Ty> },
    /// `[T; N]`; length None when not a literal
    Array { elem: Box<Ty>, len: Option<u64> },
    Slice(Box<Ty>),
    /// `()` is the empty tuple
    Tuple(Vec<Ty>),
    /// Function pointers, function items and closures
    Fn { params: Vec<Ty>, ret: Box<Ty> },
    /// Struct or enum with its type arguments
    Adt { def: DefId, args: Vec<Ty> },
    Dyn(Vec<DynBound>),
    Param(GenericParamId),
    Projection(Box<ProjectionTy>),
    Infer(InferTy),
    Unknown,
    Never,
}

impl Default for Ty {
    fn default() -> Self {
        Ty::Unknown
    }
}

impl Ty {
    pub fn unit() -> Ty {
        Ty::Tuple(Vec::new())
    }

    pub fn reference(inner: Ty, mutable: bool) -> Ty {
        Ty::Ref {
            mutable,
            inner: Box::new(inner),
        }
    }

    pub fn func(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fn {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn builtin(ty: BuiltinType) -> Ty {
        match ty {
            BuiltinType::Bool => Ty::Bool,
            BuiltinType::Char => Ty::Char,
            BuiltinType::Str => Ty::Str,
            BuiltinType::Int(i) => Ty::Int(i),
            BuiltinType::Uint(u) => Ty::Uint(u),
            BuiltinType::Float(f) => Ty::Float(f),
        }
    }

    pub fn trait_self(trait_: DefId) -> Ty {
        Ty::Param(GenericParamId {
            owner: trait_,
            index: TRAIT_SELF_INDEX,
        })
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Ty::Tuple(elems) if elems.is_empty())
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Ty::Never)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown)
    }

    pub fn is_ty_var(&self) -> bool {
        matches!(self, Ty::Infer(InferTy::Var(_)))
    }

    /// Integer type or integer variable
    pub fn is_integral(&self) -> bool {
        matches!(self, Ty::Int(_) | Ty::Uint(_) | Ty::Infer(InferTy::Int(_)))
    }

    /// Float type or float variable
    pub fn is_floating(&self) -> bool {
        matches!(self, Ty::Float(_) | Ty::Infer(InferTy::Float(_)))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    /// Referent of a reference or raw pointer
    pub fn builtin_deref(&self) -> Option<&Ty> {
        match self {
            Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Visit every type inside `self`, `self` first
    pub fn walk(&self, f: &mut impl FnMut(&Ty)) {
        f(self);
        match self {
            Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } | Ty::Slice(inner) => inner.walk(f),
            Ty::Array { elem, .. } => elem.walk(f),
            Ty::Tuple(elems) => elems.iter().for_each(|t| t.walk(f)),
            Ty::Fn { params, ret } => {
                params.iter().for_each(|t| t.walk(f));
                ret.walk(f);
            }
            Ty::Adt { args, .. } => args.iter().for_each(|t| t.walk(f)),
            Ty::Dyn(bounds) => bounds.iter().flat_map(|b| &b.args).for_each(|t| t.walk(f)),
            Ty::Projection(proj) => {
                proj.trait_ref.self_ty.walk(f);
                proj.trait_ref.args.iter().for_each(|t| t.walk(f));
            }
            _ => {}
        }
    }

    /// Rebuild the type bottom-up, applying `f` to every node after its
    /// children were rebuilt
    pub fn fold(self, f: &mut impl FnMut(Ty) -> Ty) -> Ty {
        let folded = match self {
            Ty::Ref { mutable, inner } => Ty::Ref {
                mutable,
                inner: Box::new(inner.fold(f)),
            },
            Ty::Ptr { mutable, inner } => Ty::Ptr {
                mutable,
                inner: Box::new(inner.fold(f)),
            },
            Ty::Array { elem, len } => Ty::Array {
                elem: Box::new(elem.fold(f)),
                len,
            },
            Ty::Slice(elem) => Ty::Slice(Box::new(elem.fold(f))),
            Ty::Tuple(elems) => Ty::Tuple(elems.into_iter().map(|t| t.fold(f)).collect()),
            Ty::Fn { params, ret } => Ty::Fn {
                params: params.into_iter().map(|t| t.fold(f)).collect(),
                ret: Box::new(ret.fold(f)),
            },
            Ty::Adt { def, args } => Ty::Adt {
                def,
                args: args.into_iter().map(|t| t.fold(f)).collect(),
            },
            Ty::Dyn(bounds) => Ty::Dyn(
                bounds
                    .into_iter()
                    .map(|b| DynBound {
                        trait_: b.trait_,
                        args: b.args.into_iter().map(|t| t.fold(f)).collect(),
                    })
                    .collect(),
            ),
            Ty::Projection(proj) => {
                let ProjectionTy { trait_ref, name } = *proj;
                Ty::Projection(Box::new(ProjectionTy {
                    trait_ref: trait_ref.fold(f),
                    name,
                }))
            }
            other => other,
        };
        f(folded)
    }

    pub fn contains_infer(&self) -> bool {
        let mut found = false;
        self.walk(&mut |t| found |= matches!(t, Ty::Infer(_)));
        found
    }

    pub fn contains_unknown(&self) -> bool {
        let mut found = false;
        self.walk(&mut |t| found |= t.is_unknown());
        found
    }

    /// Replace generic parameters bound in `subst`
    pub fn subst(&self, subst: &Subst) -> Ty {
        if subst.is_empty() {
            return self.clone();
        }
        self.clone().fold(&mut |t| match t {
            Ty::Param(p) => subst.get(p).cloned().unwrap_or(Ty::Param(p)),
            other => other,
        })
    }

    pub fn display<'a>(&'a self, db: &'a HirDb) -> TyDisplay<'a> {
        TyDisplay { ty: self, db }
    }
}

impl TraitRef {
    pub fn fold(self, f: &mut impl FnMut(Ty) -> Ty) -> TraitRef {
        TraitRef {
            trait_: self.trait_,
            self_ty: self.self_ty.fold(f),
            args: self.args.into_iter().map(|t| t.fold(f)).collect(),
        }
    }

    pub fn subst(&self, subst: &Subst) -> TraitRef {
        TraitRef {
            trait_: self.trait_,
            self_ty: self.self_ty.subst(subst),
            args: self.args.iter().map(|t| t.subst(subst)).collect(),
        }
    }
}

/// Values for generic parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subst(FxHashMap<GenericParamId, Ty>);

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(params: &[GenericParamId], args: impl IntoIterator<Item = Ty>) -> Self {
        Self(params.iter().copied().zip(args).collect())
    }

    pub fn insert(&mut self, param: GenericParamId, ty: Ty) {
        self.0.insert(param, ty);
    }

    pub fn get(&self, param: GenericParamId) -> Option<&Ty> {
        self.0.get(&param)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, other: Subst) {
        self.0.extend(other.0);
    }
}

/// Signature of a function with generic parameters left as `Ty::Param`.
/// For methods the receiver is the first parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub has_self: bool,
}

impl FnSig {
    pub fn subst(&self, subst: &Subst) -> FnSig {
        FnSig {
            params: self.params.iter().map(|t| t.subst(subst)).collect(),
            ret: self.ret.subst(subst),
            has_self: self.has_self,
        }
    }

    pub fn to_fn_ty(&self) -> Ty {
        Ty::func(self.params.clone(), self.ret.clone())
    }
}

pub struct TyDisplay<'a> {
    ty: &'a Ty,
    db: &'a HirDb,
}

impl TyDisplay<'_> {
    fn child<'b>(&'b self, ty: &'b Ty) -> TyDisplay<'b> {
        TyDisplay { ty, db: self.db }
    }

    fn list(&self, f: &mut fmt::Formatter<'_>, tys: &[Ty]) -> fmt::Result {
        for (i, t) in tys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.child(t))?;
        }
        Ok(())
    }

    fn name(&self, def: DefId) -> &str {
        self.db.def_name(def).unwrap_or("?")
    }
}

impl fmt::Display for TyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Ty::Bool => write!(f, "bool"),
            Ty::Char => write!(f, "char"),
            Ty::Str => write!(f, "str"),
            Ty::Int(i) => write!(f, "{}", BuiltinType::Int(*i).name()),
            Ty::Uint(u) => write!(f, "{}", BuiltinType::Uint(*u).name()),
            Ty::Float(x) => write!(f, "{}", BuiltinType::Float(*x).name()),
            Ty::Ref { mutable, inner } => {
                write!(f, "&{}{}", if *mutable { "mut " } else { "" }, self.child(inner))
            }
            Ty::Ptr { mutable, inner } => {
                write!(f, "*{} {}", if *mutable { "mut" } else { "const" }, self.child(inner))
            }
            Ty::Array { elem, len: Some(len) } => write!(f, "[{}; {}]", self.child(elem), len),
            Ty::Array { elem, len: None } => write!(f, "[{}; _]", self.child(elem)),
            Ty::Slice(elem) => write!(f, "[{}]", self.child(elem)),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                self.list(f, elems)?;
                if elems.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Ty::Fn { params, ret } => {
                write!(f, "fn(")?;
                self.list(f, params)?;
                write!(f, ")")?;
                if !ret.is_unit() {
                    write!(f, " -> {}", self.child(ret))?;
                }
                Ok(())
            }
            Ty::Adt { def, args } => {
                write!(f, "{}", self.name(*def))?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    self.list(f, args)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::Dyn(bounds) => {
                write!(f, "dyn ")?;
                for (i, b) in bounds.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", self.name(b.trait_))?;
                }
                Ok(())
            }
            Ty::Param(p) if p.index == TRAIT_SELF_INDEX => write!(f, "Self"),
            Ty::Param(p) => {
                let name = ferrite_hir::generics_of(self.db, p.owner)
                    .and_then(|g| g.params.get(p.index as usize))
                    .and_then(|param| match param {
                        ferrite_ast::GenericParam::Type { name, .. } => Some(name.name.as_str()),
                        _ => None,
                    })
                    .unwrap_or("?");
                write!(f, "{}", name)
            }
            Ty::Projection(proj) => write!(
                f,
                "<{} as {}>::{}",
                self.child(&proj.trait_ref.self_ty),
                self.name(proj.trait_ref.trait_),
                proj.name
            ),
            Ty::Infer(InferTy::Var(v)) => write!(f, "?{}", v.0),
            Ty::Infer(InferTy::Int(_)) => write!(f, "{{integer}}"),
            Ty::Infer(InferTy::Float(_)) => write!(f, "{{float}}"),
            Ty::Unknown => write!(f, "{{unknown}}"),
            Ty::Never => write!(f, "!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_is_bottom_up() {
        let ty = Ty::reference(Ty::Tuple(vec![Ty::Bool, Ty::Unknown]), false);
        let mut order = Vec::new();
        let folded = ty.fold(&mut |t| {
            order.push(format!("{:?}", std::mem::discriminant(&t)));
            match t {
                Ty::Unknown => Ty::Char,
                other => other,
            }
        });
        assert_eq!(folded, Ty::reference(Ty::Tuple(vec![Ty::Bool, Ty::Char]), false));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_contains_infer() {
        assert!(Ty::Slice(Box::new(Ty::Infer(InferTy::Int(IntVid(0))))).contains_infer());
        assert!(!Ty::unit().contains_infer());
    }
}
