//! Scope walking for names used inside items and bodies.
//!
//! A [`Resolver`] is a stack of scopes, outermost first. Lookups walk it
//! innermost first:
//!
//! 1. local bindings and block items of the body,
//! 2. generic parameters and `Self`,
//! 3. the enclosing module's items and imports,
//! 4. the extern prelude (`extern crate` items of the crate root, then
//!    dependencies on 2018+),
//! 5. the standard prelude,
//! 6. builtin types.
//!
//! Enumeration hands each candidate to a processor that may stop the walk.
//! A name emitted at one level hides the same name at every outer level; the
//! names of a level are only added to that set once the level is done, so
//! entries of a single level never hide each other.

use std::cell::OnceCell;
use std::ops::ControlFlow;

use ferrite_ast::{Body, ExprId, GenericParam, Generics, PatId, Path, PathKind};
use ferrite_syntax::{Cancellation, Cancelled};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::body_scopes::{ExprScopes, ScopeId};
use crate::db::HirDb;
use crate::ids::{BuiltinType, DefId, DefKind, DefSource, LocalModuleId, ModuleId, Namespace, PerNs, Visibility};
use crate::macros::MacroPosition;
use crate::nameres::ImportGuard;
use crate::workspace::CrateId;

/// A generic parameter: index into its owner's parameter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericParamId {
    pub owner: DefId,
    pub index: u32,
}

/// What a single name stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local(PatId),
    Def(DefId),
    GenericParam(GenericParamId),
    /// `Self` of an impl or trait
    SelfType(DefId),
    BuiltinType(BuiltinType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeNs {
    Def(DefId),
    GenericParam(GenericParamId),
    SelfType(DefId),
    BuiltinType(BuiltinType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueNs {
    Local(PatId),
    /// Function, const, static, or a tuple/unit struct or variant constructor
    Def(DefId),
    /// `Self` used as a constructor inside an impl
    SelfCtor(DefId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveValueResult {
    Value(ValueNs),
    /// Type prefix resolved; segments from the index on name associated items
    Partial(TypeNs, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifetimeResolution {
    Param { owner: DefId, name: String },
    Static,
}

#[derive(Debug, Clone)]
enum Scope<'a> {
    Module(ModuleId),
    Generics(DefId),
    SelfType(DefId),
    Expr {
        owner: DefId,
        body: &'a Body,
        scopes: &'a ExprScopes,
        scope: ScopeId,
        expr: ExprId,
    },
}

enum Element {
    Ready(Resolution),
    /// Looked up in the module when asked for
    InModule(ModuleId),
    ExternCrate(CrateId),
}

/// One candidate handed to a scope processor. The element is computed the
/// first time [`ScopeEntry::resolve`] is called.
pub struct ScopeEntry<'a> {
    pub name: String,
    pub ns: Namespace,
    db: &'a HirDb,
    element: Element,
    resolved: OnceCell<Option<Resolution>>,
}

impl<'a> ScopeEntry<'a> {
    fn new(db: &'a HirDb, name: String, ns: Namespace, element: Element) -> Self {
        Self {
            name,
            ns,
            db,
            element,
            resolved: OnceCell::new(),
        }
    }

    pub fn resolve(&self) -> Option<Resolution> {
        *self.resolved.get_or_init(|| match self.element {
            Element::Ready(res) => Some(res),
            Element::InModule(module) => self
                .db
                .resolve_name_in_module(module, &self.name)
                .get(self.ns)
                .map(Resolution::Def),
            Element::ExternCrate(krate) => Some(Resolution::Def(self.db.module_def(self.db.crate_root(krate)))),
        })
    }
}

/// Generic parameters declared directly on `def`
pub fn generics_of(db: &HirDb, def: DefId) -> Option<&Generics> {
    match &db.def(def).source {
        DefSource::Function(f) => Some(&f.generics),
        DefSource::Struct(s) => Some(&s.generics),
        DefSource::Enum(e) | DefSource::Variant(e, _) => Some(&e.generics),
        DefSource::Trait(t) => Some(&t.generics),
        DefSource::Impl(i) => Some(&i.generics),
        DefSource::TypeAlias(t) => Some(&t.generics),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Resolver<'a> {
    db: &'a HirDb,
    krate: CrateId,
    scopes: Vec<Scope<'a>>,
    cancel: Cancellation,
}

impl<'a> Resolver<'a> {
    /// Names visible at item level of `module`
    pub fn for_module(db: &'a HirDb, module: ModuleId) -> Self {
        let map = db.def_map(module.krate);
        let mut chain: Vec<LocalModuleId> = vec![module.local_id];
        let mut current = module.local_id;
        while map.module(current).is_block() {
            match map.module(current).parent {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        let scopes = chain
            .into_iter()
            .rev()
            .map(|local_id| Scope::Module(map.module_id(local_id)))
            .collect();
        Self {
            db,
            krate: module.krate,
            scopes,
            cancel: Cancellation::new(),
        }
    }

    /// Names visible in the signature of `def`
    pub fn for_def(db: &'a HirDb, def: DefId) -> Self {
        let mut resolver = Self::for_module(db, db.def_module(def));
        let kind = db.def(def).kind();
        if let Some(container) = db.container(def) {
            match db.def(container).kind() {
                DefKind::Impl | DefKind::Trait => {
                    resolver.scopes.push(Scope::Generics(container));
                    resolver.scopes.push(Scope::SelfType(container));
                }
                DefKind::Enum => resolver.scopes.push(Scope::Generics(container)),
                _ => {}
            }
        }
        match kind {
            DefKind::Impl | DefKind::Trait => {
                resolver.scopes.push(Scope::Generics(def));
                resolver.scopes.push(Scope::SelfType(def));
            }
            DefKind::Function | DefKind::Struct | DefKind::Enum | DefKind::TypeAlias => {
                resolver.scopes.push(Scope::Generics(def));
            }
            _ => {}
        }
        resolver
    }

    /// Names visible at `expr` inside the body of `owner`
    pub fn for_expr(db: &'a HirDb, owner: DefId, body: &'a Body, scopes: &'a ExprScopes, expr: ExprId) -> Self {
        let mut resolver = Self::for_def(db, owner);
        let scope = scopes.scope_for(expr).unwrap_or(scopes.root());
        resolver.scopes.push(Scope::Expr {
            owner,
            body,
            scopes,
            scope,
            expr,
        });
        resolver
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn db(&self) -> &'a HirDb {
        self.db
    }

    /// Innermost module, block modules included
    pub fn module(&self) -> ModuleId {
        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Module(m) => return *m,
                Scope::Expr {
                    owner, scopes, scope, ..
                } => {
                    if let Some(block) = self.innermost_block_module(*owner, scopes, *scope) {
                        return block;
                    }
                }
                _ => {}
            }
        }
        self.db.crate_root(self.krate)
    }

    pub fn krate(&self) -> CrateId {
        self.krate
    }

    fn innermost_block_module(&self, owner: DefId, scopes: &ExprScopes, scope: ScopeId) -> Option<ModuleId> {
        let map = self.db.def_map(owner.krate);
        scopes.scope_chain(Some(scope)).find_map(|s| {
            let block = scopes.scope(s).block?;
            map.block_modules
                .get(&(owner.local_id, block))
                .map(|m| map.module_id(*m))
        })
    }

    /// Position used for textual macro scoping: the body owner's place in
    /// the source walk, refined by the statement reached in each enclosing
    /// block module
    pub fn macro_position(&self) -> MacroPosition {
        let Some((owner, scopes, expr)) = self.scopes.iter().rev().find_map(|s| match s {
            Scope::Expr { owner, scopes, expr, .. } => Some((*owner, *scopes, *expr)),
            _ => None,
        }) else {
            return MacroPosition::end();
        };
        let map = self.db.def_map(owner.krate);
        let blocks = scopes
            .enclosing_blocks(expr)
            .into_iter()
            .filter_map(|(block, stmt)| {
                map.block_modules
                    .get(&(owner.local_id, block))
                    .map(|module| (*module, stmt))
            })
            .collect();
        MacroPosition {
            order: self.db.def(owner).order,
            blocks,
        }
    }

    /// Items whose generic parameters are in scope, innermost first
    pub fn generic_owners(&self) -> impl Iterator<Item = DefId> + '_ {
        self.scopes.iter().rev().filter_map(|s| match s {
            Scope::Generics(def) => Some(*def),
            _ => None,
        })
    }

    /// Impl or trait `Self` refers to
    pub fn self_type(&self) -> Option<DefId> {
        self.scopes.iter().rev().find_map(|s| match s {
            Scope::SelfType(def) => Some(*def),
            _ => None,
        })
    }

    /// Look a single name up, innermost scope first
    pub fn resolve_name(&self, name: &str, ns: Namespace) -> Result<Option<Resolution>, Cancelled> {
        for scope in self.scopes.iter().rev() {
            self.cancel.check()?;
            let found = match scope {
                Scope::Expr {
                    owner, scopes, scope, ..
                } => self.name_in_expr_scopes(*owner, scopes, *scope, name, ns),
                Scope::Generics(def) => self.generic_param(*def, name, ns),
                Scope::SelfType(def) => (name == "Self" && ns != Namespace::Macros).then_some(Resolution::SelfType(*def)),
                Scope::Module(module) => self
                    .db
                    .resolve_name_in_module(*module, name)
                    .get(ns)
                    .map(Resolution::Def),
            };
            if found.is_some() {
                trace!(name, ?ns, ?found, "resolved in scope");
                return Ok(found);
            }
        }
        self.cancel.check()?;
        Ok(self.name_in_preludes(name, ns))
    }

    fn name_in_expr_scopes(
        &self,
        owner: DefId,
        scopes: &ExprScopes,
        scope: ScopeId,
        name: &str,
        ns: Namespace,
    ) -> Option<Resolution> {
        let map = self.db.def_map(owner.krate);
        for s in scopes.scope_chain(Some(scope)) {
            let data = scopes.scope(s);
            if ns == Namespace::Values {
                if let Some(entry) = data.entries.iter().rev().find(|e| e.name == name) {
                    return Some(Resolution::Local(entry.pat));
                }
            }
            if let Some(block) = data.block {
                if let Some(module) = map.block_modules.get(&(owner.local_id, block)) {
                    let found = self.db.resolve_name_in_module(map.module_id(*module), name).get(ns);
                    if let Some(def) = found {
                        return Some(Resolution::Def(def));
                    }
                }
            }
        }
        None
    }

    fn generic_param(&self, owner: DefId, name: &str, ns: Namespace) -> Option<Resolution> {
        let generics = generics_of(self.db, owner)?;
        generics.params.iter().enumerate().find_map(|(index, param)| {
            let matches = match param {
                GenericParam::Type { name: n, .. } => ns == Namespace::Types && n.name == name,
                GenericParam::Const { name: n, .. } => ns == Namespace::Values && n.name == name,
                GenericParam::Lifetime { .. } => false,
            };
            matches.then_some(Resolution::GenericParam(GenericParamId {
                owner,
                index: index as u32,
            }))
        })
    }

    fn name_in_preludes(&self, name: &str, ns: Namespace) -> Option<Resolution> {
        let krate = self.krate();
        if ns == Namespace::Types {
            if let Some(dep) = self.db.extern_prelude_crate(krate, name) {
                return Some(Resolution::Def(self.db.module_def(self.db.crate_root(dep))));
            }
        }
        if let Some(prelude) = self.db.prelude_module(krate) {
            if let Some(def) = self.db.resolve_name_in_module(prelude, name).get(ns) {
                return Some(Resolution::Def(def));
            }
        }
        if ns == Namespace::Types {
            return BuiltinType::from_name(name).map(Resolution::BuiltinType);
        }
        None
    }

    /// Walk every name visible in `ns`, innermost first, until `f` breaks
    pub fn process_names(
        &self,
        ns: Namespace,
        f: &mut dyn FnMut(&ScopeEntry<'_>) -> ControlFlow<()>,
    ) -> Result<(), Cancelled> {
        let mut shadowed: FxHashSet<String> = FxHashSet::default();
        let mut walk = |level: Vec<ScopeEntry<'a>>, shadowed: &mut FxHashSet<String>| -> ControlFlow<()> {
            let mut names = Vec::new();
            for entry in level {
                if shadowed.contains(&entry.name) {
                    continue;
                }
                names.push(entry.name.clone());
                f(&entry)?;
            }
            shadowed.extend(names);
            ControlFlow::Continue(())
        };

        for scope in self.scopes.iter().rev() {
            for level in self.scope_levels(scope, ns) {
                self.cancel.check()?;
                if walk(level, &mut shadowed).is_break() {
                    return Ok(());
                }
            }
        }
        for level in self.prelude_levels(ns) {
            self.cancel.check()?;
            if walk(level, &mut shadowed).is_break() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn scope_levels(&self, scope: &Scope<'a>, ns: Namespace) -> Vec<Vec<ScopeEntry<'a>>> {
        let db = self.db;
        match scope {
            Scope::Expr {
                owner, scopes, scope, ..
            } => {
                let map = db.def_map(owner.krate);
                let mut levels = Vec::new();
                for s in scopes.scope_chain(Some(*scope)) {
                    let data = scopes.scope(s);
                    if ns == Namespace::Values {
                        levels.push(
                            data.entries
                                .iter()
                                .rev()
                                .map(|e| {
                                    ScopeEntry::new(db, e.name.clone(), ns, Element::Ready(Resolution::Local(e.pat)))
                                })
                                .collect(),
                        );
                    }
                    if let Some(module) = data.block.and_then(|b| map.block_modules.get(&(owner.local_id, b))) {
                        levels.push(self.module_level(map.module_id(*module), ns));
                    }
                }
                levels
            }
            Scope::Generics(def) => {
                let Some(generics) = generics_of(db, *def) else {
                    return Vec::new();
                };
                let level = generics
                    .params
                    .iter()
                    .enumerate()
                    .filter_map(|(index, param)| {
                        let name = match (param, ns) {
                            (GenericParam::Type { name, .. }, Namespace::Types)
                            | (GenericParam::Const { name, .. }, Namespace::Values) => name,
                            _ => return None,
                        };
                        let id = GenericParamId {
                            owner: *def,
                            index: index as u32,
                        };
                        Some(ScopeEntry::new(
                            db,
                            name.name.clone(),
                            ns,
                            Element::Ready(Resolution::GenericParam(id)),
                        ))
                    })
                    .collect();
                vec![level]
            }
            Scope::SelfType(def) if ns != Namespace::Macros => vec![vec![ScopeEntry::new(
                db,
                "Self".to_string(),
                ns,
                Element::Ready(Resolution::SelfType(*def)),
            )]],
            Scope::SelfType(_) => Vec::new(),
            Scope::Module(module) => vec![self.module_level(*module, ns)],
        }
    }

    fn module_level(&self, module: ModuleId, ns: Namespace) -> Vec<ScopeEntry<'a>> {
        self.db
            .module_scope_names(module, ns)
            .into_iter()
            .map(|name| ScopeEntry::new(self.db, name, ns, Element::InModule(module)))
            .collect()
    }

    fn prelude_levels(&self, ns: Namespace) -> Vec<Vec<ScopeEntry<'a>>> {
        let db = self.db;
        let krate = self.krate();
        let mut levels = Vec::new();
        if ns == Namespace::Types {
            levels.push(
                db.extern_prelude(krate)
                    .into_iter()
                    .map(|(name, dep)| ScopeEntry::new(db, name, ns, Element::ExternCrate(dep)))
                    .collect(),
            );
        }
        if let Some(prelude) = db.prelude_module(krate) {
            levels.push(self.module_level(prelude, ns));
        }
        if ns == Namespace::Types {
            levels.push(
                BuiltinType::ALL
                    .iter()
                    .map(|(name, ty)| {
                        ScopeEntry::new(db, name.to_string(), ns, Element::Ready(Resolution::BuiltinType(*ty)))
                    })
                    .collect(),
            );
        }
        levels
    }

    /// Resolve a path in type position. The second element is the index of
    /// the first segment naming an associated item, if resolution stopped
    /// at a type.
    pub fn resolve_path_in_type_ns(&self, path: &Path) -> Result<Option<(TypeNs, Option<usize>)>, Cancelled> {
        if path.qualifier.is_some() {
            return Ok(None);
        }
        if path.kind != PathKind::Plain {
            let result = self.db.resolve_path_in_module(self.module(), path);
            return Ok(result
                .resolved
                .get(Namespace::Types)
                .map(|def| (TypeNs::Def(def), result.unresolved_from)));
        }
        let Some(first) = path.segments.first() else {
            return Ok(None);
        };
        let rest = (path.segments.len() > 1).then_some(1);
        Ok(match self.resolve_name(&first.name, Namespace::Types)? {
            None | Some(Resolution::Local(_)) => None,
            Some(Resolution::Def(def)) if rest.is_some() => {
                let result = self.db.resolve_segments(
                    self.module(),
                    PerNs::types(def, Visibility::Public),
                    &path.segments,
                    1,
                    &mut ImportGuard::default(),
                );
                result
                    .resolved
                    .get(Namespace::Types)
                    .map(|def| (TypeNs::Def(def), result.unresolved_from))
            }
            Some(Resolution::Def(def)) => Some((TypeNs::Def(def), None)),
            Some(Resolution::GenericParam(id)) => Some((TypeNs::GenericParam(id), rest)),
            Some(Resolution::SelfType(def)) => Some((TypeNs::SelfType(def), rest)),
            Some(Resolution::BuiltinType(ty)) => Some((TypeNs::BuiltinType(ty), rest)),
        })
    }

    /// Resolve a path in value position
    pub fn resolve_path_in_value_ns(&self, path: &Path) -> Result<Option<ResolveValueResult>, Cancelled> {
        if path.qualifier.is_some() {
            return Ok(None);
        }
        if path.kind == PathKind::Plain && path.segments.len() == 1 {
            let name = &path.segments[0].name;
            return Ok(match self.resolve_name(name, Namespace::Values)? {
                Some(Resolution::Local(pat)) => Some(ResolveValueResult::Value(ValueNs::Local(pat))),
                Some(Resolution::Def(def)) => Some(ResolveValueResult::Value(ValueNs::Def(def))),
                Some(Resolution::SelfType(def)) => Some(ResolveValueResult::Value(ValueNs::SelfCtor(def))),
                _ => None,
            });
        }

        let result = if path.kind == PathKind::Plain {
            let Some(first) = path.segments.first() else {
                return Ok(None);
            };
            match self.resolve_name(&first.name, Namespace::Types)? {
                Some(Resolution::Def(def)) => self.db.resolve_segments(
                    self.module(),
                    PerNs::types(def, Visibility::Public),
                    &path.segments,
                    1,
                    &mut ImportGuard::default(),
                ),
                Some(Resolution::GenericParam(id)) => {
                    return Ok(Some(ResolveValueResult::Partial(TypeNs::GenericParam(id), 1)));
                }
                Some(Resolution::SelfType(def)) => {
                    return Ok(Some(ResolveValueResult::Partial(TypeNs::SelfType(def), 1)));
                }
                Some(Resolution::BuiltinType(ty)) => {
                    return Ok(Some(ResolveValueResult::Partial(TypeNs::BuiltinType(ty), 1)));
                }
                None | Some(Resolution::Local(_)) => return Ok(None),
            }
        } else {
            self.db.resolve_path_in_module(self.module(), path)
        };

        Ok(match result.unresolved_from {
            Some(index) => result
                .resolved
                .get(Namespace::Types)
                .map(|def| ResolveValueResult::Partial(TypeNs::Def(def), index)),
            None => result
                .resolved
                .get(Namespace::Values)
                .map(|def| ResolveValueResult::Value(ValueNs::Def(def))),
        })
    }

    /// Loop or block labelled `label` around the current expression
    pub fn resolve_label(&self, label: &str) -> Option<ExprId> {
        let Scope::Expr { scopes, scope, .. } = self.scopes.last()? else {
            return None;
        };
        for s in scopes.scope_chain(Some(*scope)) {
            let data = scopes.scope(s);
            if let Some((name, target)) = &data.label {
                if name == label {
                    return Some(*target);
                }
            }
            if data.closure {
                break;
            }
        }
        None
    }

    /// `'static`, or a lifetime parameter of an enclosing item; `'_` and
    /// undeclared names resolve to nothing
    pub fn resolve_lifetime(&self, name: &str) -> Option<LifetimeResolution> {
        if name == "'static" {
            return Some(LifetimeResolution::Static);
        }
        if name == "'_" {
            return None;
        }
        self.generic_owners().find_map(|owner| {
            let generics = generics_of(self.db, owner)?;
            generics
                .lifetimes()
                .any(|l| l.name == name)
                .then(|| LifetimeResolution::Param {
                    owner,
                    name: name.to_string(),
                })
        })
    }

    /// Field `name` of the struct or variant named by `path` (struct literals
    /// and record patterns)
    pub fn resolve_struct_field(&self, path: &Path, name: &str) -> Result<Option<(DefId, usize)>, Cancelled> {
        let def = match self.resolve_path_in_type_ns(path)? {
            Some((TypeNs::Def(def), None)) => def,
            _ => return Ok(None),
        };
        Ok(self.db.field_index(def, name).map(|index| (def, index)))
    }

    /// Definition of the macro invoked by `path` here
    pub fn resolve_macro(&self, path: &Path) -> Result<Option<DefId>, Cancelled> {
        self.cancel.check()?;
        Ok(self.db.resolve_macro_path(self.module(), path, &self.macro_position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::{DbBuilder, first_fn};
    use ferrite_ast::{ArithOp, BinaryOp, BodyBuilder, ExprKind, Item, Stmt, StructKind, TypeRef, make};

    #[test]
    fn test_let_shadowing_resolves_locals() {
        // fn f() { let x = 1; let x = x + 1; x }
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let first = b.let_stmt("x", None, Some(one));
        let x_in_init = b.path("x");
        let one_again = b.int(1);
        let add = b.expr(ExprKind::Binary {
            lhs: x_in_init,
            op: BinaryOp::Arith(ArithOp::Add),
            rhs: one_again,
        });
        let second = b.let_stmt("x", None, Some(add));
        let tail = b.path("x");
        let root = b.block(vec![first.clone(), second.clone()], Some(tail));
        let body = b.finish(root);

        let db = DbBuilder::new().krate("app", vec![make::func("f", Vec::new(), None, Some(body)).into()]).build();
        let (owner, body) = first_fn(&db, "f");
        let scopes = ExprScopes::new(&body);

        let (Stmt::Let { pat: first_pat, .. }, Stmt::Let { pat: second_pat, .. }) = (first, second) else {
            unreachable!()
        };
        let at_init = Resolver::for_expr(&db, owner, &body, &scopes, x_in_init);
        assert_eq!(
            at_init.resolve_path_in_value_ns(&Path::ident("x")).unwrap(),
            Some(ResolveValueResult::Value(ValueNs::Local(first_pat)))
        );
        let at_tail = Resolver::for_expr(&db, owner, &body, &scopes, tail);
        assert_eq!(
            at_tail.resolve_path_in_value_ns(&Path::ident("x")).unwrap(),
            Some(ResolveValueResult::Value(ValueNs::Local(second_pat)))
        );
    }

    #[test]
    fn test_namespace_filtering() {
        // struct Foo {}  fn Foo() {}  fn bar() {}
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    make::strukt("Foo", StructKind::Record(Vec::new())).into(),
                    make::func("Foo", Vec::new(), None, None).into(),
                    make::func("bar", Vec::new(), None, None).into(),
                ],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let resolver = Resolver::for_module(&db, root);

        let ty = resolver.resolve_path_in_type_ns(&Path::ident("Foo")).unwrap();
        let Some((TypeNs::Def(ty_def), None)) = ty else { panic!("{:?}", ty) };
        assert_eq!(db.def(ty_def).kind(), DefKind::Struct);

        let value = resolver.resolve_path_in_value_ns(&Path::ident("Foo")).unwrap();
        let Some(ResolveValueResult::Value(ValueNs::Def(value_def))) = value else { panic!("{:?}", value) };
        assert_eq!(db.def(value_def).kind(), DefKind::Function);

        // a function never answers a type-position lookup
        assert_eq!(resolver.resolve_path_in_type_ns(&Path::ident("bar")).unwrap(), None);
    }

    #[test]
    fn test_unresolved_path_has_no_candidates() {
        let db = DbBuilder::new().krate("app", Vec::new()).build();
        let root = db.crate_root(db.crates().next().unwrap());
        let resolver = Resolver::for_module(&db, root);
        assert_eq!(resolver.resolve_path_in_value_ns(&Path::parse("foo::bar")).unwrap(), None);
        assert_eq!(resolver.resolve_path_in_type_ns(&Path::parse("foo::bar")).unwrap(), None);
    }

    #[test]
    fn test_generic_params_and_self() {
        let mut f = make::method("get", ferrite_ast::SelfParam::Ref { mutable: false }, None, None);
        f.generics = make::generics(&[("T", &[])]);
        f.generics.params.insert(
            0,
            GenericParam::Lifetime {
                name: ferrite_ast::Ident::synthetic("'a"),
            },
        );
        let imp = make::impl_(None, TypeRef::path("S"), vec![f.into()]);
        let db = DbBuilder::new()
            .krate("app", vec![make::strukt("S", StructKind::Unit).into(), imp.into()])
            .build();
        let map = db.def_map(db.crates().next().unwrap());
        let (method, _) = map
            .defs
            .iter()
            .find(|(_, d)| d.name.as_deref() == Some("get"))
            .unwrap();
        let method = map.def_id(method);
        let resolver = Resolver::for_def(&db, method);

        assert_eq!(
            resolver.resolve_name("T", Namespace::Types).unwrap(),
            Some(Resolution::GenericParam(GenericParamId { owner: method, index: 1 }))
        );
        assert!(matches!(
            resolver.resolve_name("Self", Namespace::Types).unwrap(),
            Some(Resolution::SelfType(_))
        ));
        assert!(matches!(
            resolver.resolve_lifetime("'a"),
            Some(LifetimeResolution::Param { owner, .. }) if owner == method
        ));
        assert_eq!(resolver.resolve_lifetime("'static"), Some(LifetimeResolution::Static));
        assert_eq!(resolver.resolve_lifetime("'b"), None);
        assert_eq!(
            resolver.resolve_path_in_type_ns(&Path::parse("T::Output")).unwrap(),
            Some((TypeNs::GenericParam(GenericParamId { owner: method, index: 1 }), Some(1)))
        );
    }

    #[test]
    fn test_builtin_types_are_shadowable() {
        let db = DbBuilder::new()
            .krate("app", vec![make::strukt("u8", StructKind::Unit).into()])
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let resolver = Resolver::for_module(&db, root);
        assert!(matches!(
            resolver.resolve_name("u8", Namespace::Types).unwrap(),
            Some(Resolution::Def(_))
        ));
        assert_eq!(
            resolver.resolve_name("u16", Namespace::Types).unwrap(),
            Some(Resolution::BuiltinType(BuiltinType::from_name("u16").unwrap()))
        );
    }

    #[test]
    fn test_process_names_shadowing_and_early_stop() {
        // fn f(a) { let b = 1; let a = 2; <here> }
        let mut b = BodyBuilder::new();
        let param = b.bind("a");
        b.param(param);
        let one = b.int(1);
        let let_b = b.let_stmt("b", None, Some(one));
        let two = b.int(2);
        let let_a = b.let_stmt("a", None, Some(two));
        let here = b.path("a");
        let root = b.block(vec![let_b, let_a.clone()], Some(here));
        let body = b.finish(root);
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    make::func("f", Vec::new(), None, Some(body)).into(),
                    make::func("b", Vec::new(), None, None).into(),
                ],
            )
            .build();
        let (owner, body) = first_fn(&db, "f");
        let scopes = ExprScopes::new(&body);
        let resolver = Resolver::for_expr(&db, owner, &body, &scopes, here);

        let mut seen = Vec::new();
        resolver
            .process_names(Namespace::Values, &mut |entry| {
                seen.push((entry.name.clone(), entry.resolve()));
                ControlFlow::Continue(())
            })
            .unwrap();
        let Stmt::Let { pat: inner_a, .. } = let_a else { unreachable!() };
        let a_entries: Vec<_> = seen.iter().filter(|(n, _)| n == "a").collect();
        assert_eq!(a_entries.len(), 1);
        assert_eq!(a_entries[0].1, Some(Resolution::Local(inner_a)));
        // the local `b` hides the module-level function `b`
        assert_eq!(seen.iter().filter(|(n, _)| n == "b").count(), 1);
        assert!(matches!(seen.iter().find(|(n, _)| n == "b"), Some((_, Some(Resolution::Local(_))))));

        let mut count = 0;
        resolver
            .process_names(Namespace::Values, &mut |_| {
                count += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_cancelled_walk() {
        let db = DbBuilder::new().krate("app", Vec::new()).build();
        let root = db.crate_root(db.crates().next().unwrap());
        let cancel = Cancellation::new();
        cancel.cancel();
        let resolver = Resolver::for_module(&db, root).with_cancellation(cancel);
        assert!(resolver.resolve_name("x", Namespace::Values).is_err());
        assert!(resolver.process_names(Namespace::Types, &mut |_| ControlFlow::Continue(())).is_err());
    }

    #[test]
    fn test_block_local_items() {
        // fn f() { fn helper() {} helper }
        let mut b = BodyBuilder::new();
        let call = b.path("helper");
        let root = b.block(
            vec![Stmt::Item(Item::Function(make::func("helper", Vec::new(), None, None)))],
            Some(call),
        );
        let body = b.finish(root);
        let db = DbBuilder::new()
            .krate("app", vec![make::func("f", Vec::new(), None, Some(body)).into()])
            .build();
        let (owner, body) = first_fn(&db, "f");
        let scopes = ExprScopes::new(&body);
        let resolver = Resolver::for_expr(&db, owner, &body, &scopes, call);

        let Some(ResolveValueResult::Value(ValueNs::Def(def))) =
            resolver.resolve_path_in_value_ns(&Path::ident("helper")).unwrap()
        else {
            panic!("helper not found");
        };
        assert_eq!(db.def_name(def), Some("helper"));
        assert!(db.module(resolver.module()).is_block());

        let outside = Resolver::for_module(&db, db.crate_root(owner.krate));
        assert_eq!(outside.resolve_path_in_value_ns(&Path::ident("helper")).unwrap(), None);
    }

    #[test]
    fn test_block_macros_are_visible_after_their_statement() {
        // fn f() { early; macro_rules! m {..} { inner_early; macro_rules! m {..} inner_late }; late }
        let mut b = BodyBuilder::new();
        let early = b.path("early");
        let inner_early = b.path("inner_early");
        let inner_late = b.path("inner_late");
        let nested = b.block(
            vec![
                Stmt::Expr {
                    expr: inner_early,
                    has_semi: true,
                },
                Stmt::Item(make::macro_rules("m", "() => { 2 }").into()),
            ],
            Some(inner_late),
        );
        let late = b.path("late");
        let root = b.block(
            vec![
                Stmt::Expr {
                    expr: early,
                    has_semi: true,
                },
                Stmt::Item(make::macro_rules("m", "() => { 1 }").into()),
                Stmt::Expr {
                    expr: nested,
                    has_semi: true,
                },
            ],
            Some(late),
        );
        let body = b.finish(root);
        let db = DbBuilder::new()
            .krate("app", vec![make::func("f", Vec::new(), None, Some(body)).into()])
            .build();
        let (owner, body) = first_fn(&db, "f");
        let scopes = ExprScopes::new(&body);
        let map = db.def_map(owner.krate);
        let macro_in = |block: ExprId| {
            let module = map.block_modules[&(owner.local_id, block)];
            map.macros
                .iter()
                .find(|m| m.module == module)
                .map(|m| map.def_id(m.def))
        };
        let at = |expr: ExprId| {
            Resolver::for_expr(&db, owner, &body, &scopes, expr)
                .resolve_macro(&Path::ident("m"))
                .unwrap()
        };

        assert_eq!(at(early), None);
        assert_eq!(at(inner_early), macro_in(root));
        assert_eq!(at(inner_late), macro_in(nested));
        assert_eq!(at(late), macro_in(root));
        assert!(macro_in(root).is_some() && macro_in(root) != macro_in(nested));
    }

    #[test]
    fn test_struct_literal_fields() {
        let point = make::strukt(
            "Point",
            StructKind::Record(vec![make::field("x", TypeRef::path("i32")), make::field("y", TypeRef::path("i32"))]),
        );
        let db = DbBuilder::new().krate("app", vec![point.into()]).build();
        let resolver = Resolver::for_module(&db, db.crate_root(db.crates().next().unwrap()));
        let (def, index) = resolver.resolve_struct_field(&Path::ident("Point"), "y").unwrap().unwrap();
        assert_eq!(db.def_name(def), Some("Point"));
        assert_eq!(index, 1);
        assert_eq!(resolver.resolve_struct_field(&Path::ident("Point"), "z").unwrap(), None);
    }
}
