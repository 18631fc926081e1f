//! Macro name resolution: textual `macro_rules!` scoping, `#[macro_use]`
//! imports, and path-based lookup of `#[macro_export]` macros.

use std::sync::Arc;

use dashmap::DashMap;
use ferrite_ast::{Path, PathKind};
use ferrite_mbe::{MacroDef, MacroLookup};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::db::HirDb;
use crate::ids::{DefId, DefSource, LocalModuleId, ModuleId, Namespace};
use crate::workspace::CrateId;

/// Where a macro call sits, for textual `macro_rules!` scoping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroPosition {
    /// Source-walk order of the item holding the call
    pub order: u32,
    /// Block modules around a call inside a body, innermost first, each with
    /// the index of the statement that leads to the call
    pub blocks: Vec<(LocalModuleId, u32)>,
}

impl MacroPosition {
    /// Call at item level, after the item ordered `order`
    pub fn item(order: u32) -> Self {
        Self {
            order,
            blocks: Vec::new(),
        }
    }

    /// After every definition of the crate
    pub fn end() -> Self {
        Self::item(u32::MAX)
    }
}

/// Exported macros per crate, built on first use and rebuilt when the
/// database epoch moves on
#[derive(Debug, Default)]
pub struct ExportedMacroIndex {
    cache: DashMap<CrateId, (u64, Arc<FxHashMap<String, DefId>>)>,
}

impl ExportedMacroIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, db: &HirDb, krate: CrateId) -> Arc<FxHashMap<String, DefId>> {
        if let Some(entry) = self.cache.get(&krate) {
            if entry.0 == db.epoch() {
                return Arc::clone(&entry.1);
            }
        }
        let map = db.def_map(krate);
        // later definitions replace earlier ones of the same name
        let index: FxHashMap<String, DefId> = map
            .macros
            .iter()
            .filter(|m| m.exported)
            .map(|m| (m.name.clone(), map.def_id(m.def)))
            .collect();
        let index = Arc::new(index);
        debug!(?krate, count = index.len(), "indexed exported macros");
        self.cache.insert(krate, (db.epoch(), Arc::clone(&index)));
        index
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

impl HirDb {
    /// `#[macro_export]` macros of `krate` by name
    pub fn exported_macros(&self, krate: CrateId) -> Arc<FxHashMap<String, DefId>> {
        self.exported_macros.get(self, krate)
    }

    /// Latest `macro_rules!` named `name` textually visible in `module`
    /// before `position`.
    ///
    /// A definition is visible in the module it leaks into (climbing out of
    /// `#[macro_use]` modules) and that module's descendants, from the point
    /// of definition on. Inside a body, a block's definitions are visible to
    /// the statements after them and shadow everything outside the block.
    pub fn textual_macro(&self, module: ModuleId, name: &str, position: &MacroPosition) -> Option<DefId> {
        let map = self.def_map(module.krate);
        let named = || map.macros.iter().filter(move |m| m.name == name);
        for (block, at) in &position.blocks {
            let found = named()
                .filter(|m| m.module == *block && m.stmt.is_some_and(|stmt| stmt < *at))
                .max_by_key(|m| m.stmt);
            if let Some(m) = found {
                return Some(map.def_id(m.def));
            }
        }
        named()
            .filter(|m| m.order < position.order && map.is_ancestor(map.macro_leak_target(m.module), module.local_id))
            .max_by_key(|m| m.order)
            .map(|m| map.def_id(m.def))
    }

    /// Macros brought in by `#[macro_use] extern crate` and the implicit
    /// standard library
    pub fn macro_use_prelude(&self, krate: CrateId, name: &str) -> Option<DefId> {
        let map = self.def_map(krate);
        let implicit: &[&str] = match (map.no_core, map.no_std) {
            (true, _) => &[],
            (false, true) => &["core"],
            (false, false) => &["std", "core"],
        };
        map.macro_use_crates
            .iter()
            .map(String::as_str)
            .chain(implicit.iter().copied())
            .filter_map(|crate_name| self.dep_crate(krate, crate_name))
            .filter(|dep| *dep != krate)
            .find_map(|dep| self.exported_macros(dep).get(name).copied())
    }

    /// Macro invoked as `path!` from `module`, at `position` in the source
    /// walk of its crate.
    ///
    /// Bare names try textual scope, then the `#[macro_use]` prelude, then
    /// items and imports in scope, then the crate's own exported macros.
    /// Longer paths only resolve through modules.
    pub fn resolve_macro_path(&self, module: ModuleId, path: &Path, position: &MacroPosition) -> Option<DefId> {
        if path.qualifier.is_none() && path.kind == PathKind::Plain && path.segments.len() == 1 {
            let name = &path.segments[0].name;
            let found = self
                .textual_macro(module, name, position)
                .or_else(|| self.macro_use_prelude(module.krate, name))
                .or_else(|| self.resolve_path_in_module(module, path).resolved.get(Namespace::Macros))
                .or_else(|| self.exported_macros(module.krate).get(name.as_str()).copied());
            trace!(%path, ?found, "resolved macro name");
            return found;
        }
        let result = self.resolve_path_in_module(module, path);
        if result.unresolved_from.is_some() {
            return None;
        }
        result.resolved.get(Namespace::Macros)
    }

    /// Parsed rules of a macro definition; `None` when it failed to parse
    pub fn macro_def(&self, def: DefId) -> Option<Arc<MacroDef>> {
        match &self.def(def).source {
            DefSource::Macro(def) => def.clone(),
            _ => None,
        }
    }
}

/// Macro lookup for an expander working on one position in a module
pub struct MacroResolver<'db> {
    db: &'db HirDb,
    module: ModuleId,
    position: MacroPosition,
}

impl<'db> MacroResolver<'db> {
    pub fn new(db: &'db HirDb, module: ModuleId, position: MacroPosition) -> Self {
        Self { db, module, position }
    }
}

impl MacroLookup for MacroResolver<'_> {
    fn find_macro(&self, path: &Path) -> Option<Arc<MacroDef>> {
        let def = self.db.resolve_macro_path(self.module, path, &self.position)?;
        self.db.macro_def(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::DbBuilder;
    use ferrite_ast::{Attrs, Item, make};
    use ferrite_mbe::{EmptyHost, Expander};

    fn mac(name: &str, body: &str) -> Item {
        make::macro_rules(name, body).into()
    }

    fn exported(name: &str, body: &str) -> Item {
        let mut m = make::macro_rules(name, body);
        m.attrs = Attrs::new().with("macro_export");
        m.into()
    }

    #[test]
    fn test_textual_order_and_shadowing() {
        // macro_rules! m (1); fn a (2); macro_rules! m (3); fn b (4)
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![
                    mac("m", "() => { 1 }"),
                    make::func("a", Vec::new(), None, None).into(),
                    mac("m", "() => { 2 }"),
                    make::func("b", Vec::new(), None, None).into(),
                ],
            )
            .build();
        let krate = db.crates().next().unwrap();
        let root = db.crate_root(krate);
        let map = db.def_map(krate);

        assert_eq!(db.textual_macro(root, "m", &MacroPosition::item(1)), None);
        let at_a = db.textual_macro(root, "m", &MacroPosition::item(2)).unwrap();
        let at_b = db.textual_macro(root, "m", &MacroPosition::item(4)).unwrap();
        assert_eq!(at_a, map.def_id(map.macros[0].def));
        assert_eq!(at_b, map.def_id(map.macros[1].def));
    }

    #[test]
    fn test_macro_use_module_leaks_to_parent() {
        let mut inner = make::module("inner", vec![mac("helper", "() => {}")]);
        inner.attrs = Attrs::new().with("macro_use");
        let plain = make::module("plain", vec![mac("hidden", "() => {}")]);
        let db = DbBuilder::new()
            .krate(
                "app",
                vec![inner.into(), plain.into(), make::func("after", Vec::new(), None, None).into()],
            )
            .build();
        let root = db.crate_root(db.crates().next().unwrap());
        assert!(db.resolve_macro_path(root, &Path::ident("helper"), &MacroPosition::end()).is_some());
        assert!(db.resolve_macro_path(root, &Path::ident("hidden"), &MacroPosition::end()).is_none());
    }

    #[test]
    fn test_exported_macros_across_crates() {
        let db = DbBuilder::new()
            .krate("dep", vec![exported("make_one", "() => { 1 }")])
            .krate("app", Vec::new())
            .dep("app", "dep")
            .build();
        let app = db.workspace().crate_by_name("app").unwrap();
        let root = db.crate_root(app);

        let def = db
            .resolve_macro_path(root, &Path::parse("dep::make_one"), &MacroPosition::end())
            .unwrap();
        assert_eq!(db.def_name(def), Some("make_one"));
        // a bare name needs #[macro_use] or an import
        assert!(db.resolve_macro_path(root, &Path::ident("make_one"), &MacroPosition::end()).is_none());

        let resolver = MacroResolver::new(&db, root, MacroPosition::end());
        let expander = Expander::new("app", &resolver, &EmptyHost);
        let call = ferrite_ast::MacroCall {
            attrs: Attrs::new(),
            path: Path::parse("dep::make_one"),
            delimiter: ferrite_ast::Delimiter::Paren,
            input: String::new(),
            span: Default::default(),
        };
        assert_eq!(expander.expand_call(&call).unwrap().trim(), "1");
    }

    #[test]
    fn test_macro_use_extern_crate() {
        let mut ext = make::extern_crate("dep", None);
        ext.attrs = Attrs::new().with("macro_use");
        let db = DbBuilder::new()
            .krate("dep", vec![exported("shout", "($e:expr) => { $e }")])
            .krate("app", vec![ext.into()])
            .dep("app", "dep")
            .build();
        let app = db.workspace().crate_by_name("app").unwrap();
        let def = db.macro_use_prelude(app, "shout").unwrap();
        assert_eq!(db.def_name(def), Some("shout"));
        assert!(db.macro_def(def).is_some());
    }

    #[test]
    fn test_exported_index_is_cached_per_epoch() {
        let db = DbBuilder::new()
            .krate("app", vec![exported("a", "() => {}"), exported("b", "() => {}")])
            .build();
        let krate = db.crates().next().unwrap();
        let first = db.exported_macros(krate);
        let second = db.exported_macros(krate);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        db.exported_macros.invalidate();
        assert!(!Arc::ptr_eq(&first, &db.exported_macros(krate)));
    }
}
