//! Module-level name and path resolution.
//!
//! Imports are resolved on demand: looking up a name in a module checks its
//! declarations first, then named imports, then glob imports. A guard on
//! the `(module, name)` pairs being resolved cuts import cycles, so a
//! cyclic glob simply contributes nothing.

use ferrite_ast::{Path, PathKind, PathSegment};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::db::HirDb;
use crate::def_map::ImportKind;
use crate::ids::{DefId, DefKind, ModuleId, Namespace, PerNs, Visibility};
use crate::workspace::CrateId;

/// Outcome of resolving a path in module context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvePathResult {
    pub resolved: PerNs,
    /// Set when resolution stopped at a type: the index of the first
    /// segment naming an associated item of `resolved.types`
    pub unresolved_from: Option<usize>,
}

impl ResolvePathResult {
    fn none() -> Self {
        Self::default()
    }

    fn full(resolved: PerNs) -> Self {
        Self {
            resolved,
            unresolved_from: None,
        }
    }

    /// Fully resolved per-namespace result, empty when partial
    pub fn complete(&self) -> PerNs {
        match self.unresolved_from {
            Some(_) => PerNs::none(),
            None => self.resolved,
        }
    }
}

#[derive(Default)]
pub(crate) struct ImportGuard {
    active: FxHashSet<(ModuleId, String)>,
}

impl HirDb {
    /// What `name` means inside `module`: declarations, then named
    /// imports, then glob imports
    pub fn resolve_name_in_module(&self, module: ModuleId, name: &str) -> PerNs {
        self.name_in_module(module, name, &mut ImportGuard::default())
    }

    pub(crate) fn name_in_module(&self, module: ModuleId, name: &str, guard: &mut ImportGuard) -> PerNs {
        let key = (module, name.to_string());
        if !guard.active.insert(key.clone()) {
            trace!(module = ?module.local_id, name, "import cycle");
            return PerNs::none();
        }

        let scope = &self.module(module).scope;
        let mut result = scope.get(name);

        for import in scope.imports() {
            if result.is_full() {
                break;
            }
            if import.bound_name() != Some(name) {
                continue;
            }
            let resolved = match &import.kind {
                ImportKind::ExternCrate { name: krate, .. } => match self.dep_crate(module.krate, krate) {
                    Some(c) => PerNs::types(self.module_def(self.crate_root(c)), import.vis),
                    None => PerNs::none(),
                },
                _ => self
                    .resolve_import_path(module, &import.path, guard)
                    .complete()
                    .with_visibility(import.vis),
            };
            result = result.or(resolved);
        }

        for import in scope.imports() {
            if result.is_full() {
                break;
            }
            if import.kind != ImportKind::Glob {
                continue;
            }
            let found = self.glob_lookup(module, &import.path, name, guard);
            result = result.or(found.with_visibility(import.vis));
        }

        guard.active.remove(&key);
        result
    }

    /// `name` as seen through `use prefix::*;` in `module`
    fn glob_lookup(&self, module: ModuleId, prefix: &Path, name: &str, guard: &mut ImportGuard) -> PerNs {
        let Some(target) = self.resolve_import_path(module, prefix, guard).complete().get(Namespace::Types) else {
            return PerNs::none();
        };
        match self.def(target).kind() {
            DefKind::Module => {
                let Some(target) = self.as_module(target) else {
                    return PerNs::none();
                };
                self.name_in_module(target, name, guard)
                    .filter_visibility(|v| self.is_visible_from(v, module))
            }
            DefKind::Enum => self.variant_per_ns(target, name),
            _ => PerNs::none(),
        }
    }

    fn variant_per_ns(&self, enum_def: DefId, name: &str) -> PerNs {
        match self.child_by_name(enum_def, name) {
            Some(variant) => {
                let data = self.def(variant);
                PerNs::from_def(variant, data.vis, data.namespaces())
            }
            None => PerNs::none(),
        }
    }

    fn module_per_ns(&self, module: ModuleId) -> PerNs {
        PerNs::types(self.module_def(module), Visibility::Public)
    }

    fn crate_per_ns(&self, krate: Option<CrateId>) -> PerNs {
        match krate {
            Some(krate) => self.module_per_ns(self.crate_root(krate)),
            None => PerNs::none(),
        }
    }

    /// Resolve a path written in `from` (a `use`-less position such as a
    /// type in an item signature)
    pub fn resolve_path_in_module(&self, from: ModuleId, path: &Path) -> ResolvePathResult {
        self.resolve_path_with(from, path, false, &mut ImportGuard::default())
    }

    pub(crate) fn resolve_import_path(&self, module: ModuleId, path: &Path, guard: &mut ImportGuard) -> ResolvePathResult {
        self.resolve_path_with(module, path, true, guard)
    }

    fn resolve_path_with(
        &self,
        from: ModuleId,
        path: &Path,
        is_import: bool,
        guard: &mut ImportGuard,
    ) -> ResolvePathResult {
        if path.qualifier.is_some() {
            return ResolvePathResult::none();
        }
        let map = self.def_map(from.krate);
        let segments = &path.segments;

        let (start, index) = match &path.kind {
            PathKind::Crate => (self.module_per_ns(map.root_module()), 0),
            PathKind::SelfMod => (self.module_per_ns(map.module_id(map.non_block(from.local_id))), 0),
            PathKind::Super(n) => {
                let mut module = map.non_block(from.local_id);
                for _ in 0..*n {
                    match map.super_of(module) {
                        Some(parent) => module = parent,
                        None => return ResolvePathResult::none(),
                    }
                }
                (self.module_per_ns(map.module_id(module)), 0)
            }
            PathKind::Abs if map.edition.has_extern_prelude() => {
                let Some(first) = segments.first() else {
                    return ResolvePathResult::none();
                };
                (self.crate_per_ns(self.extern_prelude_crate(from.krate, &first.name)), 1)
            }
            PathKind::Abs => (self.module_per_ns(map.root_module()), 0),
            PathKind::DollarCrate(name) => (self.crate_per_ns(self.dep_crate(from.krate, name)), 0),
            PathKind::Plain => {
                let Some(first) = segments.first() else {
                    return ResolvePathResult::none();
                };
                let start = if is_import && !map.edition.has_extern_prelude() {
                    // 2015 `use` paths are relative to the crate root
                    let root = self.name_in_module(map.root_module(), &first.name, guard);
                    if root.is_none() {
                        self.crate_per_ns(self.extern_prelude_crate(from.krate, &first.name))
                    } else {
                        root
                    }
                } else {
                    self.first_segment_in_scope(from, &first.name, !is_import, guard)
                };
                (start, 1)
            }
        };
        if start.is_none() {
            return ResolvePathResult::none();
        }
        self.resolve_segments(from, start, segments, index, guard)
    }

    /// First segment of a plain path: enclosing blocks, the module, the
    /// crate root's extern crates, the extern prelude and optionally the
    /// standard prelude
    fn first_segment_in_scope(&self, from: ModuleId, name: &str, with_prelude: bool, guard: &mut ImportGuard) -> PerNs {
        let map = self.def_map(from.krate);
        let mut module = from.local_id;
        loop {
            let found = self.name_in_module(map.module_id(module), name, guard);
            if !found.is_none() {
                return found;
            }
            if !map.module(module).is_block() {
                break;
            }
            match map.module(module).parent {
                Some(parent) => module = parent,
                None => break,
            }
        }
        if let Some(krate) = self.extern_prelude_crate(from.krate, name) {
            return self.crate_per_ns(Some(krate));
        }
        if with_prelude {
            if let Some(prelude) = self.prelude_module(from.krate) {
                return self.name_in_module(prelude, name, guard);
            }
        }
        PerNs::none()
    }

    pub(crate) fn resolve_segments(
        &self,
        from: ModuleId,
        start: PerNs,
        segments: &[PathSegment],
        index: usize,
        guard: &mut ImportGuard,
    ) -> ResolvePathResult {
        let mut current = start;
        for (i, segment) in segments.iter().enumerate().skip(index) {
            let Some(def) = current.get(Namespace::Types) else {
                return ResolvePathResult::none();
            };
            current = match self.def(def).kind() {
                DefKind::Module => match self.as_module(def) {
                    Some(module) => self
                        .name_in_module(module, &segment.name, guard)
                        .filter_visibility(|v| self.is_visible_from(v, from)),
                    None => PerNs::none(),
                },
                DefKind::Enum => self.variant_per_ns(def, &segment.name),
                // associated items are looked up by type inference
                _ => {
                    return ResolvePathResult {
                        resolved: current,
                        unresolved_from: Some(i),
                    };
                }
            };
            if current.is_none() {
                return ResolvePathResult::none();
            }
        }
        ResolvePathResult::full(current)
    }

    /// Crates nameable by a bare identifier from `krate`, in priority order
    pub fn extern_prelude(&self, krate: CrateId) -> IndexMap<String, CrateId> {
        let map = self.def_map(krate);
        let data = self.workspace().crate_data(krate);
        let mut prelude = IndexMap::new();

        // `extern crate` in the crate root counts in every edition
        for import in map.module(map.root).scope.imports() {
            if let ImportKind::ExternCrate { name, alias } = &import.kind {
                if name == "self" {
                    continue;
                }
                if let Some(c) = self.dep_crate(krate, name) {
                    prelude.entry(alias.clone().unwrap_or_else(|| name.clone())).or_insert(c);
                }
            }
        }
        if map.edition.has_extern_prelude() {
            for dep in &data.deps {
                prelude.entry(dep.name.clone()).or_insert(dep.krate);
            }
        }
        let implicit: &[&str] = match (map.no_core, map.no_std) {
            (true, _) => &[],
            (false, true) => &["core"],
            (false, false) => &["std", "core"],
        };
        for name in implicit {
            if let Some(c) = self.dep_crate(krate, name) {
                if c != krate {
                    prelude.entry(name.to_string()).or_insert(c);
                }
            }
        }
        prelude
    }

    pub fn extern_prelude_crate(&self, krate: CrateId, name: &str) -> Option<CrateId> {
        self.extern_prelude(krate).get(name).copied()
    }

    /// `std::prelude::v1` (or `core::...` under `no_std`); none under `no_core`
    pub fn prelude_module(&self, krate: CrateId) -> Option<ModuleId> {
        let map = self.def_map(krate);
        if map.no_core {
            return None;
        }
        let std_name = if map.no_std { "core" } else { "std" };
        let std = self.dep_crate(krate, std_name)?;
        let std_map = self.def_map(std);
        let prelude = *std_map.module(std_map.root).children.get("prelude")?;
        let edition_module = match map.edition {
            crate::workspace::Edition::E2015 => "rust_2015",
            crate::workspace::Edition::E2018 => "rust_2018",
            crate::workspace::Edition::E2021 => "rust_2021",
        };
        let children = &std_map.module(prelude).children;
        let module = children.get(edition_module).or_else(|| children.get("v1"))?;
        Some(std_map.module_id(*module))
    }

    /// Names bound in `module` in one namespace: declarations, imports and
    /// glob-imported names, each once
    pub fn module_scope_names(&self, module: ModuleId, ns: Namespace) -> Vec<String> {
        let mut candidates = IndexSet::new();
        self.collect_scope_names(module, &mut candidates, &mut FxHashSet::default());
        candidates
            .into_iter()
            .filter(|name| self.resolve_name_in_module(module, name).get(ns).is_some())
            .collect()
    }

    fn collect_scope_names(&self, module: ModuleId, out: &mut IndexSet<String>, visited: &mut FxHashSet<ModuleId>) {
        if !visited.insert(module) {
            return;
        }
        let scope = &self.module(module).scope;
        for ns in [Namespace::Types, Namespace::Values, Namespace::Macros] {
            for (name, _, _) in scope.declarations(ns) {
                out.insert(name.to_string());
            }
        }
        for import in scope.imports() {
            if let Some(name) = import.bound_name() {
                out.insert(name.to_string());
            }
        }
        for import in scope.imports() {
            if import.kind != ImportKind::Glob {
                continue;
            }
            let target = self.resolve_import_path(module, &import.path, &mut ImportGuard::default());
            let Some(def) = target.complete().get(Namespace::Types) else {
                continue;
            };
            if let Some(target) = self.as_module(def) {
                self.collect_scope_names(target, out, visited);
            } else if self.def(def).kind() == DefKind::Enum {
                for variant in self.children(def) {
                    if let Some(name) = self.def_name(variant) {
                        out.insert(name.to_string());
                    }
                }
            }
        }
    }

    /// Traits whose methods are callable by name in `module`
    pub fn traits_in_scope(&self, module: ModuleId) -> Vec<DefId> {
        let map = self.def_map(module.krate);
        let mut traits = IndexSet::new();
        let mut current = Some(module.local_id);
        while let Some(local) = current {
            let m = map.module_id(local);
            for name in self.module_scope_names(m, Namespace::Types) {
                if let Some(def) = self.resolve_name_in_module(m, &name).get(Namespace::Types) {
                    if self.is_trait(def) {
                        traits.insert(def);
                    }
                }
            }
            for import in self.module(m).scope.imports() {
                if import.kind == ImportKind::Underscore {
                    let target = self.resolve_import_path(m, &import.path, &mut ImportGuard::default());
                    if let Some(def) = target.complete().get(Namespace::Types) {
                        if self.is_trait(def) {
                            traits.insert(def);
                        }
                    }
                }
            }
            current = if map.module(local).is_block() { map.module(local).parent } else { None };
        }
        if let Some(prelude) = self.prelude_module(module.krate) {
            for name in self.module_scope_names(prelude, Namespace::Types) {
                if let Some(def) = self.resolve_name_in_module(prelude, &name).get(Namespace::Types) {
                    if self.is_trait(def) {
                        traits.insert(def);
                    }
                }
            }
        }
        traits.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::DbBuilder;
    use crate::workspace::{CrateOrigin, Edition};
    use ferrite_ast::{self as ast, Attrs, Item, StructKind, TypeRef, make};

    fn unit(name: &str) -> Item {
        make::strukt(name, StructKind::Unit).into()
    }

    fn private_unit(name: &str) -> Item {
        let mut s = make::strukt(name, StructKind::Unit);
        s.vis = ast::Visibility::Private;
        s.into()
    }

    fn pub_use(path: &str, alias: Option<&str>) -> Item {
        let mut u = make::use_(path, alias);
        u.vis = ast::Visibility::Public;
        u.into()
    }

    fn pub_glob(path: &str) -> Item {
        let mut u = make::use_glob(path);
        u.vis = ast::Visibility::Public;
        u.into()
    }

    fn child(db: &HirDb, parent: ModuleId, name: &str) -> ModuleId {
        let local_id = db.module(parent).children[name];
        ModuleId {
            krate: parent.krate,
            local_id,
        }
    }

    fn resolved_name(db: &HirDb, per_ns: PerNs, ns: Namespace) -> Option<String> {
        per_ns.get(ns).and_then(|d| db.def_name(d)).map(str::to_string)
    }

    #[test]
    fn test_imports_and_reexports() {
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    make::module("a", vec![unit("S")]).into(),
                    make::module("b", vec![pub_use("crate::a::S", None)]).into(),
                    make::use_("b::S", Some("T")).into(),
                ],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());

        let t = db.resolve_name_in_module(root, "T");
        assert_eq!(resolved_name(&db, t, Namespace::Types).as_deref(), Some("S"));
        // a unit struct also lives in the value namespace
        assert!(t.get(Namespace::Values).is_some());
        assert!(db.resolve_name_in_module(root, "S").is_none());

        let via_path = db.resolve_path_in_module(root, &Path::parse("b::S")).complete();
        assert_eq!(via_path.get(Namespace::Types), t.get(Namespace::Types));
    }

    #[test]
    fn test_glob_cycle_terminates() {
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    make::module("a", vec![pub_glob("crate::b"), unit("A")]).into(),
                    make::module("b", vec![pub_glob("crate::a"), unit("B")]).into(),
                ],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let a = child(&db, root, "a");
        let b = child(&db, root, "b");

        assert_eq!(resolved_name(&db, db.resolve_name_in_module(b, "A"), Namespace::Types).as_deref(), Some("A"));
        assert_eq!(resolved_name(&db, db.resolve_name_in_module(a, "B"), Namespace::Types).as_deref(), Some("B"));
        assert!(db.resolve_name_in_module(a, "Missing").is_none());

        let mut names = db.module_scope_names(a, Namespace::Types);
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_private_items_hidden_from_outside() {
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![make::module("a", vec![private_unit("Hidden"), make::module("inner", Vec::new()).into()]).into()],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let a = child(&db, root, "a");
        let inner = child(&db, a, "inner");

        assert!(db.resolve_path_in_module(root, &Path::parse("a::Hidden")).complete().is_none());
        assert!(db.resolve_path_in_module(inner, &Path::parse("super::Hidden")).complete().get(Namespace::Types).is_some());
        assert!(db.resolve_path_in_module(inner, &Path::parse("crate::a::Hidden")).complete().get(Namespace::Types).is_some());
    }

    #[test]
    fn test_partial_path_stops_at_type() {
        let db = DbBuilder::new().krate("app", vec![unit("S")]).build();
        let root = db.crate_root(db.crates().next().unwrap());
        let result = db.resolve_path_in_module(root, &Path::parse("S::new"));
        assert_eq!(result.unresolved_from, Some(1));
        assert_eq!(resolved_name(&db, result.resolved, Namespace::Types).as_deref(), Some("S"));
        assert!(result.complete().is_none());
    }

    #[test]
    fn test_enum_variants() {
        let e = make::enum_(
            "E",
            vec![
                make::variant("A", StructKind::Unit),
                make::variant("B", StructKind::Tuple(vec![make::field("0", TypeRef::path("u8"))])),
                make::variant("C", StructKind::Record(Vec::new())),
            ],
        );
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![e.into(), make::module("m", vec![make::use_glob("crate::E").into()]).into()],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let m = child(&db, root, "m");

        let b = db.resolve_path_in_module(root, &Path::parse("E::B")).complete();
        assert!(b.get(Namespace::Values).is_some());
        let a = db.resolve_name_in_module(m, "A");
        assert!(a.get(Namespace::Types).is_some() && a.get(Namespace::Values).is_some());
        // record variants have no constructor value
        let c = db.resolve_name_in_module(m, "C");
        assert!(c.get(Namespace::Types).is_some());
        assert!(c.get(Namespace::Values).is_none());
    }

    #[test]
    fn test_extern_prelude_depends_on_edition() {
        let build = |edition: Edition, root_items: Vec<Item>| {
            let mut items = root_items;
            items.push(make::module("m", Vec::new()).into());
            DbBuilder::new()
                .krate("dep", vec![unit("D")])
                .krate_with("app", edition, CrateOrigin::Workspace, Attrs::new(), items)
                .dep("app", "dep")
                .build()
        };
        let lookup = |db: &HirDb| {
            let app = db.workspace().crate_by_name("app").unwrap();
            let m = child(db, db.crate_root(app), "m");
            db.resolve_path_in_module(m, &Path::parse("dep::D")).complete().get(Namespace::Types)
        };

        assert!(lookup(&build(Edition::E2018, Vec::new())).is_some());
        assert!(lookup(&build(Edition::E2015, Vec::new())).is_none());
        // a root `extern crate` joins the extern prelude in every edition
        assert!(lookup(&build(Edition::E2015, vec![make::extern_crate("dep", None).into()])).is_some());

        let aliased = build(Edition::E2015, vec![make::extern_crate("dep", Some("other")).into()]);
        let app = aliased.workspace().crate_by_name("app").unwrap();
        let prelude = aliased.extern_prelude(app);
        assert!(prelude.contains_key("other"));
        assert!(!prelude.contains_key("dep"));
    }

    #[test]
    fn test_2015_use_paths_are_crate_relative() {
        let items = || {
            vec![
                make::module("a", vec![unit("S")]).into(),
                make::module("b", vec![make::use_("a::S", None).into()]).into(),
            ]
        };
        for (edition, expected) in [(Edition::E2015, true), (Edition::E2021, false)] {
            let db = DbBuilder::new()
                .krate_with("app", edition, CrateOrigin::Workspace, Attrs::new(), items())
                .build();
            let root = db.crate_root(db.crates().next().unwrap());
            let b = child(&db, root, "b");
            assert_eq!(db.resolve_name_in_module(b, "S").get(Namespace::Types).is_some(), expected);
        }
    }

    fn with_std(app_attrs: Attrs) -> HirDb {
        let std_prelude = make::module("prelude", vec![make::module("rust_2021", vec![unit("Vec")]).into()]);
        let core_prelude = make::module("prelude", vec![make::module("v1", vec![unit("Option")]).into()]);
        DbBuilder::new()
            .krate_with("core", Edition::E2021, CrateOrigin::Stdlib, Attrs::new(), vec![core_prelude.into()])
            .krate_with("std", Edition::E2021, CrateOrigin::Stdlib, Attrs::new(), vec![std_prelude.into()])
            .krate_with("app", Edition::E2021, CrateOrigin::Workspace, app_attrs, Vec::new())
            .build()
    }

    #[test]
    fn test_std_prelude_selection() {
        let resolves = |db: &HirDb, name: &str| {
            let app = db.workspace().crate_by_name("app").unwrap();
            db.resolve_path_in_module(db.crate_root(app), &Path::ident(name))
                .complete()
                .get(Namespace::Types)
                .is_some()
        };

        let db = with_std(Attrs::new());
        assert!(resolves(&db, "Vec"));
        assert!(!resolves(&db, "Option"));
        assert!(resolves(&db, "std"));

        let db = with_std(Attrs::new().with("no_std"));
        assert!(!resolves(&db, "Vec"));
        assert!(resolves(&db, "Option"));
        assert!(!resolves(&db, "std"));
        assert!(resolves(&db, "core"));

        let db = with_std(Attrs::new().with("no_core"));
        let app = db.workspace().crate_by_name("app").unwrap();
        assert_eq!(db.prelude_module(app), None);
        assert!(!resolves(&db, "Option"));
        assert!(!resolves(&db, "core"));
    }

    #[test]
    fn test_traits_in_scope() {
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    make::module("t", vec![make::trait_("Hidden", Vec::new()).into(), make::trait_("Anon", Vec::new()).into()])
                        .into(),
                    make::trait_("Local", Vec::new()).into(),
                    make::use_("t::Anon", Some("_")).into(),
                ],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        let mut names: Vec<_> = db
            .traits_in_scope(root)
            .into_iter()
            .filter_map(|t| db.def_name(t).map(str::to_string))
            .collect();
        names.sort();
        assert_eq!(names, vec!["Anon".to_string(), "Local".to_string()]);
    }
}
