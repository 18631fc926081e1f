//! Workspace fixtures for unit tests

use std::sync::Arc;

use ferrite_ast::{Attrs, Body, Item, SourceFile};

use crate::db::HirDb;
use crate::ids::{DefId, DefSource};
use crate::workspace::{CrateOrigin, Edition, Workspace};

#[derive(Default)]
pub(crate) struct DbBuilder {
    ws: Workspace,
}

pub(crate) fn root_file(name: &str) -> String {
    format!("/{}/src/lib.rs", name)
}

impl DbBuilder {
    pub(crate) fn new() -> Self {
        Self { ws: Workspace::new() }
    }

    /// 2021 workspace crate with one root file
    pub(crate) fn krate(self, name: &str, items: Vec<Item>) -> Self {
        self.krate_with(name, Edition::E2021, CrateOrigin::Workspace, Attrs::new(), items)
    }

    pub(crate) fn krate_with(
        mut self,
        name: &str,
        edition: Edition,
        origin: CrateOrigin,
        attrs: Attrs,
        items: Vec<Item>,
    ) -> Self {
        let root = root_file(name);
        self.ws.add_crate(name, edition, origin, &root);
        self.ws.add_file(&root, SourceFile { attrs, items });
        self
    }

    pub(crate) fn file(mut self, path: &str, items: Vec<Item>) -> Self {
        self.ws.add_file(
            path,
            SourceFile {
                attrs: Attrs::new(),
                items,
            },
        );
        self
    }

    pub(crate) fn dep(self, from: &str, to: &str) -> Self {
        self.dep_as(from, to, None)
    }

    pub(crate) fn dep_as(mut self, from: &str, to: &str, alias: Option<&str>) -> Self {
        let from = self.ws.crate_by_name(from).expect("unknown crate");
        let to = self.ws.crate_by_name(to).expect("unknown crate");
        self.ws.add_dependency(from, to, alias);
        self
    }

    pub(crate) fn build(self) -> HirDb {
        HirDb::new(Arc::new(self.ws))
    }
}

/// First function called `name` in any crate, with its body
pub(crate) fn first_fn(db: &HirDb, name: &str) -> (DefId, Body) {
    for krate in db.crates() {
        let map = db.def_map(krate);
        for (local_id, data) in map.defs.iter() {
            if let DefSource::Function(f) = &data.source {
                if f.name.name == name {
                    let body = f.body.clone().expect("function without body");
                    return (map.def_id(local_id), body);
                }
            }
        }
    }
    panic!("no function named {}", name)
}
