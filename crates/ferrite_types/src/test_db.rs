//! Workspace fixtures for unit tests

use std::sync::Arc;

use ferrite_ast::{Attrs, Body, Item, SourceFile};
use ferrite_hir::{CrateOrigin, DefId, DefSource, Edition, HirDb, Workspace};

use crate::db::TypeDb;

#[derive(Default)]
pub(crate) struct TestDb {
    ws: Workspace,
}

impl TestDb {
    pub(crate) fn new() -> Self {
        Self { ws: Workspace::new() }
    }

    /// 2021 workspace crate with one root file
    pub(crate) fn krate(self, name: &str, items: Vec<Item>) -> Self {
        self.krate_with(name, CrateOrigin::Workspace, Attrs::new(), items)
    }

    pub(crate) fn krate_with(mut self, name: &str, origin: CrateOrigin, attrs: Attrs, items: Vec<Item>) -> Self {
        let root = format!("/{name}/src/lib.rs");
        self.ws.add_crate(name, Edition::E2021, origin, &root);
        self.ws.add_file(&root, SourceFile { attrs, items });
        self
    }

    pub(crate) fn dep(mut self, from: &str, to: &str) -> Self {
        let from = self.ws.crate_by_name(from).expect("unknown crate");
        let to = self.ws.crate_by_name(to).expect("unknown crate");
        self.ws.add_dependency(from, to, None);
        self
    }

    pub(crate) fn build(self) -> TypeDb {
        TypeDb::new(Arc::new(HirDb::new(Arc::new(self.ws))))
    }
}

/// First definition called `name` in any crate
pub(crate) fn def_named(db: &HirDb, name: &str) -> DefId {
    for krate in db.crates() {
        let map = db.def_map(krate);
        for (local_id, data) in map.defs.iter() {
            if data.name.as_deref() == Some(name) {
                return map.def_id(local_id);
            }
        }
    }
    panic!("no definition named {name}")
}

/// Body of the function called `name`
pub(crate) fn fn_body(db: &HirDb, name: &str) -> (DefId, Body) {
    let def = def_named(db, name);
    match &db.def(def).source {
        DefSource::Function(f) => (def, f.body.clone().expect("function without body")),
        _ => panic!("{name} is not a function"),
    }
}
