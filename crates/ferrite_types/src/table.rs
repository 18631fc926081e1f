//! Unification tables.
//!
//! Each kind of inference variable has its own union-find table. Tables log
//! every change while a snapshot is open; rolling back pops the log and
//! restores the previous values, committing the outermost snapshot drops it.

use std::marker::PhantomData;

use ferrite_hir::{FloatTy, IntTy, UintTy};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::traits::Obligation;
use crate::ty::{FloatVid, InferTy, IntVid, ProjectionTy, Ty, TyVid};

pub(crate) trait UnifyKey: Copy + std::fmt::Debug {
    fn index(self) -> u32;
    fn from_index(index: u32) -> Self;
}

macro_rules! unify_key {
    ($($key:ident),*) => {
        $(impl UnifyKey for $key {
            fn index(self) -> u32 {
                self.0
            }

            fn from_index(index: u32) -> Self {
                $key(index)
            }
        })*
    };
}

unify_key!(TyVid, IntVid, FloatVid);

#[derive(Debug, Clone)]
struct VarValue<V> {
    parent: u32,
    rank: u32,
    value: Option<V>,
}

#[derive(Debug)]
enum UndoEntry<V> {
    NewVar,
    SetVar(u32, VarValue<V>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TableSnapshot {
    undo_len: usize,
}

/// Union-find with an undo log
#[derive(Debug)]
pub(crate) struct UnificationTable<K, V> {
    values: Vec<VarValue<V>>,
    undo_log: Vec<UndoEntry<V>>,
    open_snapshots: usize,
    _key: PhantomData<K>,
}

impl<K: UnifyKey, V: Clone> UnificationTable<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            values: Vec::new(),
            undo_log: Vec::new(),
            open_snapshots: 0,
            _key: PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn new_key(&mut self, value: Option<V>) -> K {
        let index = self.values.len() as u32;
        self.values.push(VarValue {
            parent: index,
            rank: 0,
            value,
        });
        if self.open_snapshots > 0 {
            self.undo_log.push(UndoEntry::NewVar);
        }
        K::from_index(index)
    }

    fn set(&mut self, index: u32, value: VarValue<V>) {
        let old = std::mem::replace(&mut self.values[index as usize], value);
        if self.open_snapshots > 0 {
            self.undo_log.push(UndoEntry::SetVar(index, old));
        }
    }

    fn find_index(&mut self, index: u32) -> u32 {
        let parent = self.values[index as usize].parent;
        if parent == index {
            return index;
        }
        let root = self.find_index(parent);
        if root != parent {
            let mut compressed = self.values[index as usize].clone();
            compressed.parent = root;
            self.set(index, compressed);
        }
        root
    }

    pub(crate) fn find(&mut self, key: K) -> K {
        K::from_index(self.find_index(key.index()))
    }

    pub(crate) fn probe(&mut self, key: K) -> Option<V> {
        let root = self.find_index(key.index());
        self.values[root as usize].value.clone()
    }

    /// Merge two classes. The caller checks that at most one side is bound
    /// or that both bindings agree.
    pub(crate) fn union(&mut self, a: K, b: K) {
        let (ra, rb) = (self.find_index(a.index()), self.find_index(b.index()));
        if ra == rb {
            return;
        }
        let (va, vb) = (&self.values[ra as usize], &self.values[rb as usize]);
        let value = va.value.clone().or_else(|| vb.value.clone());
        let (root, child) = if va.rank >= vb.rank { (ra, rb) } else { (rb, ra) };
        let rank = if va.rank == vb.rank { va.rank + 1 } else { va.rank.max(vb.rank) };

        let mut child_value = self.values[child as usize].clone();
        child_value.parent = root;
        self.set(child, child_value);
        self.set(
            root,
            VarValue {
                parent: root,
                rank,
                value,
            },
        );
    }

    pub(crate) fn bind(&mut self, key: K, value: V) {
        let root = self.find_index(key.index());
        let mut entry = self.values[root as usize].clone();
        entry.value = Some(value);
        self.set(root, entry);
    }

    pub(crate) fn snapshot(&mut self) -> TableSnapshot {
        self.open_snapshots += 1;
        TableSnapshot {
            undo_len: self.undo_log.len(),
        }
    }

    pub(crate) fn rollback_to(&mut self, snapshot: TableSnapshot) {
        while self.undo_log.len() > snapshot.undo_len {
            match self.undo_log.pop() {
                Some(UndoEntry::NewVar) => {
                    self.values.pop();
                }
                Some(UndoEntry::SetVar(index, old)) => self.values[index as usize] = old,
                None => break,
            }
        }
        self.open_snapshots -= 1;
    }

    pub(crate) fn commit(&mut self, _snapshot: TableSnapshot) {
        self.open_snapshots -= 1;
        if self.open_snapshots == 0 {
            self.undo_log.clear();
        }
    }
}

/// Projection normalization state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionCacheEntry {
    /// Normalization of this projection is running; a nested request sees
    /// the projection as unknown
    InProgress,
    /// Not decidable yet; retried once more types are known
    Ambiguous,
    /// Can never be normalized; reported once
    Error,
    Resolved { ty: Ty, obligations: Vec<Obligation> },
}

#[derive(Debug, Default)]
pub(crate) struct ProjectionCache {
    map: FxHashMap<ProjectionTy, ProjectionCacheEntry>,
    undo_log: Vec<(ProjectionTy, Option<ProjectionCacheEntry>)>,
    open_snapshots: usize,
}

impl ProjectionCache {
    pub(crate) fn get(&self, key: &ProjectionTy) -> Option<&ProjectionCacheEntry> {
        self.map.get(key)
    }

    pub(crate) fn insert(&mut self, key: ProjectionTy, entry: ProjectionCacheEntry) {
        let old = self.map.insert(key.clone(), entry);
        if self.open_snapshots > 0 {
            self.undo_log.push((key, old));
        }
    }

    fn snapshot(&mut self) -> usize {
        self.open_snapshots += 1;
        self.undo_log.len()
    }

    fn rollback_to(&mut self, undo_len: usize) {
        while self.undo_log.len() > undo_len {
            let Some((key, old)) = self.undo_log.pop() else { break };
            match old {
                Some(entry) => self.map.insert(key, entry),
                None => self.map.remove(&key),
            };
        }
        self.open_snapshots -= 1;
    }

    fn commit(&mut self) {
        self.open_snapshots -= 1;
        if self.open_snapshots == 0 {
            self.undo_log.clear();
        }
    }
}

/// Concrete integer type an integer variable resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    Int(IntTy),
    Uint(UintTy),
}

impl IntKind {
    fn to_ty(self) -> Ty {
        match self {
            IntKind::Int(i) => Ty::Int(i),
            IntKind::Uint(u) => Ty::Uint(u),
        }
    }
}

/// Snapshot of every table plus the projection cache
#[derive(Debug)]
#[must_use]
pub struct InferenceSnapshot {
    ty_vars: TableSnapshot,
    int_vars: TableSnapshot,
    float_vars: TableSnapshot,
    projections: usize,
    cyclic_len: usize,
}

/// Unification state of one inference run
#[derive(Debug)]
pub struct InferenceTable {
    ty_vars: UnificationTable<TyVid, Ty>,
    int_vars: UnificationTable<IntVid, IntKind>,
    float_vars: UnificationTable<FloatVid, FloatTy>,
    pub(crate) projection_cache: ProjectionCache,
    cyclic_vars: Vec<TyVid>,
}

impl Default for InferenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceTable {
    pub fn new() -> Self {
        Self {
            ty_vars: UnificationTable::new(),
            int_vars: UnificationTable::new(),
            float_vars: UnificationTable::new(),
            projection_cache: ProjectionCache::default(),
            cyclic_vars: Vec::new(),
        }
    }

    pub fn new_var(&mut self) -> Ty {
        Ty::Infer(InferTy::Var(self.ty_vars.new_key(None)))
    }

    pub fn new_int_var(&mut self) -> Ty {
        Ty::Infer(InferTy::Int(self.int_vars.new_key(None)))
    }

    pub fn new_float_var(&mut self) -> Ty {
        Ty::Infer(InferTy::Float(self.float_vars.new_key(None)))
    }

    pub fn snapshot(&mut self) -> InferenceSnapshot {
        InferenceSnapshot {
            ty_vars: self.ty_vars.snapshot(),
            int_vars: self.int_vars.snapshot(),
            float_vars: self.float_vars.snapshot(),
            projections: self.projection_cache.snapshot(),
            cyclic_len: self.cyclic_vars.len(),
        }
    }

    pub fn rollback_to(&mut self, snapshot: InferenceSnapshot) {
        self.ty_vars.rollback_to(snapshot.ty_vars);
        self.int_vars.rollback_to(snapshot.int_vars);
        self.float_vars.rollback_to(snapshot.float_vars);
        self.projection_cache.rollback_to(snapshot.projections);
        self.cyclic_vars.truncate(snapshot.cyclic_len);
    }

    pub fn commit(&mut self, snapshot: InferenceSnapshot) {
        self.ty_vars.commit(snapshot.ty_vars);
        self.int_vars.commit(snapshot.int_vars);
        self.float_vars.commit(snapshot.float_vars);
        self.projection_cache.commit();
    }

    /// Run `f` and undo everything it did
    pub fn probe<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let snapshot = self.snapshot();
        let result = f(self);
        self.rollback_to(snapshot);
        result
    }

    /// Keep the effects of `f` only when it succeeds
    pub fn commit_if_ok<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.snapshot();
        let result = f(self);
        match result {
            Ok(_) => self.commit(snapshot),
            Err(_) => self.rollback_to(snapshot),
        }
        result
    }

    /// Follow variable bindings at the top level only. Unbound variables
    /// come back as their class representative.
    pub fn shallow_resolve(&mut self, ty: &Ty) -> Ty {
        let mut current = ty.clone();
        loop {
            current = match current {
                Ty::Infer(InferTy::Var(v)) => match self.ty_vars.probe(v) {
                    Some(bound) => bound,
                    None => return Ty::Infer(InferTy::Var(self.ty_vars.find(v))),
                },
                Ty::Infer(InferTy::Int(v)) => {
                    return match self.int_vars.probe(v) {
                        Some(kind) => kind.to_ty(),
                        None => Ty::Infer(InferTy::Int(self.int_vars.find(v))),
                    };
                }
                Ty::Infer(InferTy::Float(v)) => {
                    return match self.float_vars.probe(v) {
                        Some(float) => Ty::Float(float),
                        None => Ty::Infer(InferTy::Float(self.float_vars.find(v))),
                    };
                }
                other => return other,
            };
        }
    }

    /// Replace every bound variable, leaving unbound ones in place
    pub fn resolve_vars(&mut self, ty: &Ty) -> Ty {
        self.resolve_deep(ty, false)
    }

    /// Replace every variable; unbound ones become `Unknown`
    pub fn resolve_completely(&mut self, ty: &Ty) -> Ty {
        self.resolve_deep(ty, true)
    }

    fn resolve_deep(&mut self, ty: &Ty, unknown_for_unbound: bool) -> Ty {
        ty.clone().fold(&mut |t| match t {
            Ty::Infer(_) => {
                let resolved = self.shallow_resolve(&t);
                match resolved {
                    Ty::Infer(_) if unknown_for_unbound => Ty::Unknown,
                    Ty::Infer(_) => resolved,
                    // bound types may contain further variables
                    other => self.resolve_deep(&other, unknown_for_unbound),
                }
            }
            other => other,
        })
    }

    /// Make `a` and `b` equal. Nothing changes when they cannot be.
    pub fn unify(&mut self, a: &Ty, b: &Ty) -> bool {
        self.commit_if_ok(|table| table.unify_inner(a, b)).is_ok()
    }

    /// Whether `a` and `b` could be made equal, without changing anything
    pub fn can_unify(&mut self, a: &Ty, b: &Ty) -> bool {
        self.probe(|table| table.unify_inner(a, b).is_ok())
    }

    fn unify_inner(&mut self, a: &Ty, b: &Ty) -> Result<(), ()> {
        let a = self.shallow_resolve(a);
        let b = self.shallow_resolve(b);
        if a == b {
            return Ok(());
        }
        match (&a, &b) {
            (Ty::Infer(InferTy::Var(x)), Ty::Infer(InferTy::Var(y))) => {
                self.ty_vars.union(*x, *y);
                Ok(())
            }
            (Ty::Infer(InferTy::Var(x)), other) | (other, Ty::Infer(InferTy::Var(x))) => {
                self.bind_var(*x, other);
                Ok(())
            }
            (Ty::Never, _) | (_, Ty::Never) | (Ty::Unknown, _) | (_, Ty::Unknown) => Ok(()),

            (Ty::Infer(InferTy::Int(x)), Ty::Infer(InferTy::Int(y))) => {
                self.int_vars.union(*x, *y);
                Ok(())
            }
            (Ty::Infer(InferTy::Int(x)), Ty::Int(i)) | (Ty::Int(i), Ty::Infer(InferTy::Int(x))) => {
                self.int_vars.bind(*x, IntKind::Int(*i));
                Ok(())
            }
            (Ty::Infer(InferTy::Int(x)), Ty::Uint(u)) | (Ty::Uint(u), Ty::Infer(InferTy::Int(x))) => {
                self.int_vars.bind(*x, IntKind::Uint(*u));
                Ok(())
            }
            (Ty::Infer(InferTy::Float(x)), Ty::Infer(InferTy::Float(y))) => {
                self.float_vars.union(*x, *y);
                Ok(())
            }
            (Ty::Infer(InferTy::Float(x)), Ty::Float(f)) | (Ty::Float(f), Ty::Infer(InferTy::Float(x))) => {
                self.float_vars.bind(*x, *f);
                Ok(())
            }

            (
                Ty::Ref {
                    mutable: m1,
                    inner: i1,
                },
                Ty::Ref {
                    mutable: m2,
                    inner: i2,
                },
            )
            | (
                Ty::Ptr {
                    mutable: m1,
                    inner: i1,
                },
                Ty::Ptr {
                    mutable: m2,
                    inner: i2,
                },
            ) if m1 == m2 => self.unify_inner(i1, i2),
            (Ty::Array { elem: e1, len: l1 }, Ty::Array { elem: e2, len: l2 }) => {
                if let (Some(l1), Some(l2)) = (l1, l2) {
                    if l1 != l2 {
                        return Err(());
                    }
                }
                self.unify_inner(e1, e2)
            }
            (Ty::Slice(e1), Ty::Slice(e2)) => self.unify_inner(e1, e2),
            (Ty::Tuple(t1), Ty::Tuple(t2)) if t1.len() == t2.len() => self.unify_all(t1, t2),
            (Ty::Fn { params: p1, ret: r1 }, Ty::Fn { params: p2, ret: r2 }) if p1.len() == p2.len() => {
                self.unify_all(p1, p2)?;
                self.unify_inner(r1, r2)
            }
            (Ty::Adt { def: d1, args: a1 }, Ty::Adt { def: d2, args: a2 }) if d1 == d2 && a1.len() == a2.len() => {
                self.unify_all(a1, a2)
            }
            (Ty::Dyn(b1), Ty::Dyn(b2)) if b1.len() == b2.len() => {
                for (x, y) in b1.iter().zip(b2) {
                    if x.trait_ != y.trait_ || x.args.len() != y.args.len() {
                        return Err(());
                    }
                    self.unify_all(&x.args, &y.args)?;
                }
                Ok(())
            }
            (Ty::Projection(p1), Ty::Projection(p2))
                if p1.name == p2.name
                    && p1.trait_ref.trait_ == p2.trait_ref.trait_
                    && p1.trait_ref.args.len() == p2.trait_ref.args.len() =>
            {
                self.unify_inner(&p1.trait_ref.self_ty, &p2.trait_ref.self_ty)?;
                self.unify_all(&p1.trait_ref.args, &p2.trait_ref.args)
            }
            _ => Err(()),
        }
    }

    fn unify_all(&mut self, a: &[Ty], b: &[Ty]) -> Result<(), ()> {
        for (x, y) in a.iter().zip(b) {
            self.unify_inner(x, y)?;
        }
        Ok(())
    }

    fn bind_var(&mut self, var: TyVid, ty: &Ty) {
        if self.occurs_in(var, ty) {
            debug!(?var, "cyclic type; variable forced to unknown");
            self.ty_vars.bind(var, Ty::Unknown);
            self.cyclic_vars.push(var);
            return;
        }
        trace!(?var, ?ty, "bind type variable");
        self.ty_vars.bind(var, ty.clone());
    }

    fn occurs_in(&mut self, var: TyVid, ty: &Ty) -> bool {
        let root = self.ty_vars.find(var);
        let resolved = self.resolve_vars(ty);
        let mut vars = Vec::new();
        resolved.walk(&mut |t| {
            if let Ty::Infer(InferTy::Var(v)) = t {
                vars.push(*v);
            }
        });
        vars.into_iter().any(|v| self.ty_vars.find(v) == root)
    }

    /// Bind every unconstrained integer variable to `i32` and every float
    /// variable to `f64`
    pub fn fallback_numeric(&mut self) -> usize {
        let mut defaulted = 0;
        for index in 0..self.int_vars.len() as u32 {
            let var = IntVid(index);
            if self.int_vars.probe(var).is_none() {
                self.int_vars.bind(var, IntKind::Int(IntTy::I32));
                defaulted += 1;
            }
        }
        for index in 0..self.float_vars.len() as u32 {
            let var = FloatVid(index);
            if self.float_vars.probe(var).is_none() {
                self.float_vars.bind(var, FloatTy::F64);
                defaulted += 1;
            }
        }
        defaulted
    }

    /// Variables that were forced to `Unknown` by the occurs check
    pub fn cyclic_vars(&self) -> &[TyVid] {
        &self.cyclic_vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_transitive() {
        let mut table = InferenceTable::new();
        let (a, b, c) = (table.new_var(), table.new_var(), table.new_var());
        assert!(table.unify(&a, &b));
        assert!(table.unify(&b, &c));
        assert!(table.unify(&c, &Ty::Bool));
        assert_eq!(table.resolve_completely(&a), Ty::Bool);
    }

    #[test]
    fn test_int_var_binds_to_concrete_kind() {
        let mut table = InferenceTable::new();
        let x = table.new_int_var();
        assert!(!table.unify(&x, &Ty::Bool));
        assert!(table.unify(&x, &Ty::Uint(UintTy::U8)));
        assert_eq!(table.resolve_completely(&x), Ty::Uint(UintTy::U8));
        let y = table.new_int_var();
        assert_eq!(table.fallback_numeric(), 1);
        assert_eq!(table.resolve_completely(&y), Ty::Int(IntTy::I32));
    }

    #[test]
    fn test_reference_mutability_must_match() {
        let mut table = InferenceTable::new();
        let v = table.new_var();
        assert!(!table.unify(&Ty::reference(v.clone(), true), &Ty::reference(Ty::Char, false)));
        // the failed attempt left the variable untouched
        assert_eq!(table.resolve_vars(&v), v);
        assert!(table.unify(&Ty::reference(v.clone(), false), &Ty::reference(Ty::Char, false)));
    }

    #[test]
    fn test_cyclic_type_becomes_unknown() {
        let mut table = InferenceTable::new();
        let v = table.new_var();
        let cyclic = Ty::Tuple(vec![Ty::Bool, Ty::Slice(Box::new(v.clone()))]);
        assert!(table.unify(&v, &cyclic));
        assert_eq!(table.resolve_completely(&v), Ty::Unknown);
        assert_eq!(table.cyclic_vars().len(), 1);
    }

    #[test]
    fn test_rollback_restores_every_table() {
        let mut table = InferenceTable::new();
        let v = table.new_var();
        let i = table.new_int_var();
        let snapshot = table.snapshot();
        assert!(table.unify(&v, &Ty::Char));
        assert!(table.unify(&i, &Ty::Int(IntTy::I64)));
        let fresh = table.new_var();
        assert!(table.unify(&fresh, &Ty::Bool));
        table.rollback_to(snapshot);

        assert_eq!(table.resolve_vars(&v), v);
        assert!(matches!(table.resolve_vars(&i), Ty::Infer(InferTy::Int(_))));
        assert_eq!(table.ty_vars.len(), 1);
    }

    #[test]
    fn test_nested_snapshot_commit_then_outer_rollback() {
        let mut table = InferenceTable::new();
        let v = table.new_var();
        let outer = table.snapshot();
        let inner = table.snapshot();
        assert!(table.unify(&v, &Ty::Str));
        table.commit(inner);
        assert_eq!(table.resolve_vars(&v), Ty::Str);
        table.rollback_to(outer);
        assert_eq!(table.resolve_vars(&v), v);
    }

    #[test]
    fn test_resolve_completely_is_idempotent() {
        let mut table = InferenceTable::new();
        let v = table.new_var();
        let w = table.new_var();
        assert!(table.unify(&v, &Ty::reference(w.clone(), false)));
        let once = table.resolve_completely(&Ty::Tuple(vec![v.clone(), Ty::Bool]));
        let twice = table.resolve_completely(&once);
        assert_eq!(once, twice);
        assert_eq!(once, Ty::Tuple(vec![Ty::reference(Ty::Unknown, false), Ty::Bool]));
    }

    #[test]
    fn test_never_unifies_with_anything() {
        let mut table = InferenceTable::new();
        assert!(table.unify(&Ty::Never, &Ty::Bool));
        assert!(table.unify(&Ty::Tuple(vec![Ty::Never]), &Ty::Tuple(vec![Ty::Char])));
    }
}
