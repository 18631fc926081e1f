//! The collected workspace: one [`DefMap`] per crate plus cross-crate indexes.

use std::sync::Arc;

use ferrite_ast::Attrs;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::collector::collect_crate;
use crate::def_map::{DefMap, ModuleData};
use crate::ids::{DefData, DefId, DefKind, DefSource, ModuleId, Visibility};
use crate::macros::ExportedMacroIndex;
use crate::workspace::{CrateId, CrateOrigin, Workspace};

/// Name-resolution view of a workspace.
///
/// Built once per workspace snapshot. `epoch` identifies the snapshot for
/// caches that outlive it.
pub struct HirDb {
    workspace: Arc<Workspace>,
    def_maps: FxHashMap<CrateId, Arc<DefMap>>,
    lang_items: FxHashMap<String, DefId>,
    pub(crate) exported_macros: ExportedMacroIndex,
    epoch: u64,
}

impl HirDb {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self::with_epoch(workspace, 0)
    }

    pub fn with_epoch(workspace: Arc<Workspace>, epoch: u64) -> Self {
        let def_maps: FxHashMap<_, _> = workspace
            .crates()
            .map(|(krate, _)| (krate, Arc::new(collect_crate(&workspace, krate))))
            .collect();
        let mut db = Self {
            workspace,
            def_maps,
            lang_items: FxHashMap::default(),
            exported_macros: ExportedMacroIndex::new(),
            epoch,
        };
        db.lang_items = db.collect_lang_items();
        info!(crates = db.def_maps.len(), epoch, "name resolution ready");
        db
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn crates(&self) -> impl Iterator<Item = CrateId> + '_ {
        self.workspace.crates().map(|(id, _)| id)
    }

    pub fn def_map(&self, krate: CrateId) -> &DefMap {
        &self.def_maps[&krate]
    }

    pub fn def(&self, id: DefId) -> &DefData {
        self.def_map(id.krate).def(id.local_id)
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        self.def_map(id.krate).module(id.local_id)
    }

    pub fn crate_root(&self, krate: CrateId) -> ModuleId {
        self.def_map(krate).root_module()
    }

    /// Definition standing for a module
    pub fn module_def(&self, module: ModuleId) -> DefId {
        DefId {
            krate: module.krate,
            local_id: self.module(module).def,
        }
    }

    pub fn as_module(&self, def: DefId) -> Option<ModuleId> {
        match self.def(def).source {
            DefSource::Module(local_id) => Some(ModuleId {
                krate: def.krate,
                local_id,
            }),
            _ => None,
        }
    }

    /// Module a definition is declared in
    pub fn def_module(&self, def: DefId) -> ModuleId {
        ModuleId {
            krate: def.krate,
            local_id: self.def(def).module,
        }
    }

    pub fn def_name(&self, def: DefId) -> Option<&str> {
        self.def(def).name.as_deref()
    }

    pub fn container(&self, def: DefId) -> Option<DefId> {
        self.def(def).container.map(|local_id| DefId {
            krate: def.krate,
            local_id,
        })
    }

    /// Items of a trait or impl, variants of an enum
    pub fn children(&self, def: DefId) -> impl Iterator<Item = DefId> + '_ {
        self.def_map(def.krate)
            .children_of(def.local_id)
            .iter()
            .map(move |local_id| DefId {
                krate: def.krate,
                local_id: *local_id,
            })
    }

    pub fn child_by_name(&self, def: DefId, name: &str) -> Option<DefId> {
        self.children(def).find(|c| self.def_name(*c) == Some(name))
    }

    pub fn impls(&self) -> impl Iterator<Item = DefId> + '_ {
        self.def_maps.values().flat_map(|map| map.impls.iter().map(|local_id| map.def_id(*local_id)))
    }

    pub fn lang_item(&self, name: &str) -> Option<DefId> {
        self.lang_items.get(name).copied()
    }

    pub fn is_visible_from(&self, vis: Visibility, from: ModuleId) -> bool {
        match vis {
            Visibility::Public => true,
            Visibility::Module(m) => self.def_map(m.krate).is_visible_from(vis, from),
        }
    }

    /// Index of a named (or numbered tuple) field of a struct or variant
    pub fn field_index(&self, def: DefId, name: &str) -> Option<usize> {
        let kind = self.def(def).struct_kind()?;
        kind.fields().iter().position(|f| f.name.name == name)
    }

    /// Crate a dependent crate knows as `name`: its dependencies first,
    /// then any crate of the workspace from the standard library
    pub fn dep_crate(&self, krate: CrateId, name: &str) -> Option<CrateId> {
        let data = self.workspace.crate_data(krate);
        if name == "self" || data.name == name {
            return Some(krate);
        }
        if let Some(dep) = data.deps.iter().find(|d| d.name == name) {
            return Some(dep.krate);
        }
        self.workspace
            .crate_by_name(name)
            .filter(|c| self.workspace.crate_data(*c).origin == CrateOrigin::Stdlib)
    }

    fn collect_lang_items(&self) -> FxHashMap<String, DefId> {
        let mut items = FxHashMap::default();
        for map in self.def_maps.values() {
            for (local_id, data) in map.defs.iter() {
                let attrs: &Attrs = match &data.source {
                    DefSource::Trait(t) => &t.attrs,
                    DefSource::Struct(s) => &s.attrs,
                    DefSource::Enum(e) => &e.attrs,
                    DefSource::Function(f) => &f.attrs,
                    DefSource::TypeAlias(t) => &t.attrs,
                    _ => continue,
                };
                if let Some(name) = attrs.lang_item() {
                    items.entry(name.to_string()).or_insert(map.def_id(local_id));
                }
            }
        }
        items
    }

    pub fn is_trait(&self, def: DefId) -> bool {
        self.def(def).kind() == DefKind::Trait
    }
}
