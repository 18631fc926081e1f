//! Builds the [`DefMap`] of a crate by walking its files from the root.

use std::sync::Arc;

use ferrite_ast::{self as ast, AssocItem, Body, ExprKind, Item, Path, PathKind, Span, Stmt, UseTree, UseTreeKind};
use ferrite_mbe::MacroDef;
use la_arena::{Arena, Idx, RawIdx};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::def_map::{DefDiagnostic, DefMap, Import, ImportKind, MacroEntry, ModuleData, ModuleOrigin};
use crate::ids::{DefData, DefSource, LocalDefId, LocalModuleId, Namespace, Visibility};
use crate::module_file::ModDir;
use crate::workspace::{CrateId, Workspace};

pub(crate) fn collect_crate(ws: &Workspace, krate: CrateId) -> DefMap {
    let data = ws.crate_data(krate);
    let root_file = ws.file(&data.root_file).cloned();
    let attrs = root_file.as_ref().map(|f| f.attrs.clone()).unwrap_or_default();

    let mut modules = Arena::new();
    let mut defs = Arena::new();
    let root = next_module_id(&modules);
    let root_def = defs.alloc(DefData {
        name: None,
        source: DefSource::Module(root),
        module: root,
        container: None,
        vis: Visibility::Public,
        order: 0,
        span: Span::default(),
    });
    modules.alloc(ModuleData {
        name: None,
        parent: None,
        children: Default::default(),
        origin: ModuleOrigin::CrateRoot,
        scope: Default::default(),
        def: root_def,
        macro_use: false,
        file: data.root_file.clone(),
    });

    let map = DefMap {
        krate,
        edition: data.edition,
        no_std: attrs.has("no_std"),
        no_core: attrs.has("no_core"),
        root,
        modules,
        defs,
        impls: Vec::new(),
        macros: Vec::new(),
        macro_use_crates: Vec::new(),
        block_modules: FxHashMap::default(),
        children: FxHashMap::default(),
        diagnostics: Vec::new(),
    };

    let mut collector = DefCollector {
        ws,
        crate_name: data.name.clone(),
        map,
        order: 0,
        block_stmt: None,
        active_files: FxHashSet::default(),
    };
    let dir = ModDir::root(&data.root_file);
    collector.active_files.insert(data.root_file.clone());
    match root_file {
        Some(file) => collector.collect_items(root, &file.items, &dir),
        None => warn!(file = %data.root_file, krate = %data.name, "crate root file is missing"),
    }
    debug!(
        krate = %data.name,
        modules = collector.map.modules.len(),
        defs = collector.map.defs.len(),
        "collected crate"
    );
    collector.map
}

struct DefCollector<'a> {
    ws: &'a Workspace,
    crate_name: String,
    map: DefMap,
    order: u32,
    /// Statement index of the item being collected when it sits in a block
    block_stmt: Option<u32>,
    /// Files on the current module path, to stop `#[path]` cycles
    active_files: FxHashSet<String>,
}

impl DefCollector<'_> {
    fn alloc_def(
        &mut self,
        name: Option<&str>,
        source: DefSource,
        module: LocalModuleId,
        container: Option<LocalDefId>,
        vis: Visibility,
        span: Span,
    ) -> LocalDefId {
        self.map.defs.alloc(DefData {
            name: name.map(str::to_string),
            source,
            module,
            container,
            vis,
            order: self.order,
            span,
        })
    }

    fn alloc_module(
        &mut self,
        name: Option<&str>,
        parent: LocalModuleId,
        origin: ModuleOrigin,
        file: &str,
        macro_use: bool,
        vis: Visibility,
        span: Span,
    ) -> LocalModuleId {
        let id = next_module_id(&self.map.modules);
        let def = self.alloc_def(name, DefSource::Module(id), parent, None, vis, span);
        self.map.modules.alloc(ModuleData {
            name: name.map(str::to_string),
            parent: Some(parent),
            children: Default::default(),
            origin,
            scope: Default::default(),
            def,
            macro_use,
            file: file.to_string(),
        })
    }

    /// Enter a definition into its module's namespaces
    fn declare(&mut self, module: LocalModuleId, def: LocalDefId) {
        let data = &self.map.defs[def];
        let Some(name) = data.name.clone() else {
            return;
        };
        let vis = data.vis;
        let namespaces = data.namespaces();
        let def_id = self.map.def_id(def);
        for ns in namespaces {
            self.map.modules[module].scope.declare(*ns, &name, def_id, vis);
        }
    }

    fn collect_items(&mut self, module: LocalModuleId, items: &[Item], dir: &ModDir) {
        for item in items {
            self.order += 1;
            self.block_stmt = None;
            self.collect_item(module, item, dir);
        }
    }

    fn collect_item(&mut self, module: LocalModuleId, item: &Item, dir: &ModDir) {
        match item {
            Item::Function(f) => {
                let vis = self.resolve_visibility(module, &f.vis);
                let f = Arc::new(f.clone());
                let def = self.alloc_def(Some(&f.name.name), DefSource::Function(f.clone()), module, None, vis, f.span);
                self.declare(module, def);
                if let Some(body) = &f.body {
                    self.collect_body(def, module, body, dir);
                }
            }
            Item::Struct(s) => {
                let vis = self.resolve_visibility(module, &s.vis);
                let def = self.alloc_def(
                    Some(&s.name.name),
                    DefSource::Struct(Arc::new(s.clone())),
                    module,
                    None,
                    vis,
                    s.span,
                );
                self.declare(module, def);
            }
            Item::Enum(e) => {
                let vis = self.resolve_visibility(module, &e.vis);
                let e = Arc::new(e.clone());
                let def = self.alloc_def(Some(&e.name.name), DefSource::Enum(e.clone()), module, None, vis, e.span);
                self.declare(module, def);
                let variants = e
                    .variants
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        self.alloc_def(
                            Some(&v.name.name),
                            DefSource::Variant(e.clone(), i),
                            module,
                            Some(def),
                            vis,
                            v.name.span,
                        )
                    })
                    .collect();
                self.map.children.insert(def, variants);
            }
            Item::Trait(t) => {
                let vis = self.resolve_visibility(module, &t.vis);
                let t = Arc::new(t.clone());
                let def = self.alloc_def(Some(&t.name.name), DefSource::Trait(t.clone()), module, None, vis, t.span);
                self.declare(module, def);
                // trait items share the trait's visibility
                self.collect_assoc_items(module, def, &t.items, Some(vis), dir);
            }
            Item::Impl(i) => {
                let vis = Visibility::Module(self.map.module_id(module));
                let i = Arc::new(i.clone());
                let def = self.alloc_def(None, DefSource::Impl(i.clone()), module, None, vis, i.span);
                self.map.impls.push(def);
                self.collect_assoc_items(module, def, &i.items, None, dir);
            }
            Item::Module(m) => self.collect_module(module, m, dir),
            Item::Use(u) => {
                let vis = self.resolve_visibility(module, &u.vis);
                let empty = Path::new(PathKind::Plain, Vec::new());
                self.collect_use_tree(module, &empty, &u.tree, vis, u.span, false);
            }
            Item::ExternCrate(e) => {
                let vis = self.resolve_visibility(module, &e.vis);
                if e.attrs.has("macro_use") {
                    self.map.macro_use_crates.push(e.name.name.clone());
                }
                self.map.modules[module].scope.push_import(Import {
                    path: Path::ident(&e.name.name),
                    kind: ImportKind::ExternCrate {
                        name: e.name.name.clone(),
                        alias: e.alias.as_ref().map(|a| a.name.clone()),
                    },
                    vis,
                    span: e.span,
                });
            }
            Item::MacroRules(m) => {
                let exported = m.attrs.has("macro_export");
                let parsed = MacroDef::from_ast(m, &self.crate_name);
                let vis = if exported {
                    Visibility::Public
                } else {
                    Visibility::Module(self.map.module_id(module))
                };
                let source = DefSource::Macro(parsed.as_ref().ok().map(|d| Arc::new(d.clone())));
                let def = self.alloc_def(Some(&m.name.name), source, module, None, vis, m.span);
                if let Err(err) = parsed {
                    warn!(name = %m.name.name, error = %err, "malformed macro_rules definition");
                    self.map.diagnostics.push(DefDiagnostic::MalformedMacro {
                        def,
                        message: err.to_string(),
                    });
                }
                if exported {
                    let root = self.map.root;
                    let def_id = self.map.def_id(def);
                    self.map.modules[root]
                        .scope
                        .declare(Namespace::Macros, &m.name.name, def_id, Visibility::Public);
                }
                self.map.macros.push(MacroEntry {
                    def,
                    name: m.name.name.clone(),
                    module,
                    order: self.order,
                    stmt: self.block_stmt,
                    exported,
                });
            }
            // expanded and re-collected by the caller; only ordering matters here
            Item::MacroCall(_) => {}
            Item::Const(c) => {
                let vis = self.resolve_visibility(module, &c.vis);
                let c = Arc::new(c.clone());
                let name = c.name.as_ref().map(|n| n.name.clone());
                let def = self.alloc_def(name.as_deref(), DefSource::Const(c.clone()), module, None, vis, c.span);
                self.declare(module, def);
                if let Some(body) = &c.body {
                    self.collect_body(def, module, body, dir);
                }
            }
            Item::Static(s) => {
                let vis = self.resolve_visibility(module, &s.vis);
                let s = Arc::new(s.clone());
                let def = self.alloc_def(Some(&s.name.name), DefSource::Static(s.clone()), module, None, vis, s.span);
                self.declare(module, def);
                if let Some(body) = &s.body {
                    self.collect_body(def, module, body, dir);
                }
            }
            Item::TypeAlias(t) => {
                let vis = self.resolve_visibility(module, &t.vis);
                let def = self.alloc_def(
                    Some(&t.name.name),
                    DefSource::TypeAlias(Arc::new(t.clone())),
                    module,
                    None,
                    vis,
                    t.span,
                );
                self.declare(module, def);
            }
        }
    }

    fn collect_assoc_items(
        &mut self,
        module: LocalModuleId,
        container: LocalDefId,
        items: &[AssocItem],
        shared_vis: Option<Visibility>,
        dir: &ModDir,
    ) {
        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let def = match item {
                AssocItem::Function(f) => {
                    let vis = shared_vis.unwrap_or_else(|| self.resolve_visibility(module, &f.vis));
                    let f = Arc::new(f.clone());
                    let def = self.alloc_def(
                        Some(&f.name.name),
                        DefSource::Function(f.clone()),
                        module,
                        Some(container),
                        vis,
                        f.span,
                    );
                    if let Some(body) = &f.body {
                        self.collect_body(def, module, body, dir);
                    }
                    def
                }
                AssocItem::TypeAlias(t) => {
                    let vis = shared_vis.unwrap_or_else(|| self.resolve_visibility(module, &t.vis));
                    self.alloc_def(
                        Some(&t.name.name),
                        DefSource::TypeAlias(Arc::new(t.clone())),
                        module,
                        Some(container),
                        vis,
                        t.span,
                    )
                }
                AssocItem::Const(c) => {
                    let vis = shared_vis.unwrap_or_else(|| self.resolve_visibility(module, &c.vis));
                    let c = Arc::new(c.clone());
                    let name = c.name.as_ref().map(|n| n.name.clone());
                    let def = self.alloc_def(
                        name.as_deref(),
                        DefSource::Const(c.clone()),
                        module,
                        Some(container),
                        vis,
                        c.span,
                    );
                    if let Some(body) = &c.body {
                        self.collect_body(def, module, body, dir);
                    }
                    def
                }
            };
            children.push(def);
        }
        self.map.children.insert(container, children);
    }

    fn collect_module(&mut self, parent: LocalModuleId, m: &ast::ModDef, dir: &ModDir) {
        let vis = self.resolve_visibility(parent, &m.vis);
        let name = m.name.name.as_str();
        let path_attr = m.attrs.value("path");
        let macro_use = m.attrs.has("macro_use");

        let (module, child_dir, items) = match &m.kind {
            ast::ModKind::Inline(items) => {
                let origin = ModuleOrigin::Inline { declaration: m.span };
                let module = self.alloc_module(Some(name), parent, origin, &dir.file, macro_use, vis, m.span);
                (module, dir.inline_child(name, path_attr), Some(items.clone()))
            }
            ast::ModKind::OutOfLine => {
                let origin = ModuleOrigin::File { declaration: m.span };
                match dir.resolve_declaration(self.ws, name, path_attr) {
                    Ok((file, child_dir)) if !self.active_files.contains(&file) => {
                        let module = self.alloc_module(Some(name), parent, origin, &file, macro_use, vis, m.span);
                        let items = self.ws.file(&file).map(|f| f.items.clone());
                        (module, child_dir, items)
                    }
                    Ok((file, child_dir)) => {
                        warn!(%file, "module file includes itself");
                        let module = self.alloc_module(Some(name), parent, origin, &file, macro_use, vis, m.span);
                        (module, child_dir, None)
                    }
                    Err(candidates) => {
                        debug!(module = name, ?candidates, "module file not found");
                        self.map.diagnostics.push(DefDiagnostic::UnresolvedModule {
                            module: parent,
                            name: name.to_string(),
                            candidates,
                            span: m.span,
                        });
                        let module = self.alloc_module(Some(name), parent, origin, &dir.file, macro_use, vis, m.span);
                        (module, dir.inline_child(name, None), None)
                    }
                }
            }
        };

        self.map.modules[parent].children.insert(name.to_string(), module);
        let def = self.map.modules[module].def;
        self.declare(parent, def);

        if let Some(items) = items {
            let entered = child_dir.file != dir.file && self.active_files.insert(child_dir.file.clone());
            self.collect_items(module, &items, &child_dir);
            if entered {
                self.active_files.remove(&child_dir.file);
            }
        }
    }

    /// Flatten a use tree into one import per leaf
    fn collect_use_tree(
        &mut self,
        module: LocalModuleId,
        prefix: &Path,
        tree: &UseTree,
        vis: Visibility,
        span: Span,
        in_list: bool,
    ) {
        let mut path = join_use_path(prefix, &tree.path);
        let kind = match &tree.kind {
            UseTreeKind::List(children) => {
                for child in children {
                    self.collect_use_tree(module, &path, child, vis, span, true);
                }
                return;
            }
            UseTreeKind::Glob => ImportKind::Glob,
            UseTreeKind::Single { alias } => {
                // `use a::{self}` imports `a` itself
                if in_list && path.last_segment().is_some_and(|s| s.name == "self") {
                    path.segments.pop();
                }
                match alias {
                    Some(ast::ImportAlias::Underscore) => ImportKind::Underscore,
                    Some(ast::ImportAlias::Named(name)) => ImportKind::Named(name.name.clone()),
                    None => match path.last_segment() {
                        Some(seg) => ImportKind::Named(seg.name.clone()),
                        None => return,
                    },
                }
            }
        };
        self.map.modules[module].scope.push_import(Import { path, kind, vis, span });
    }

    /// Walk a body for blocks that declare items; each becomes a block module
    fn collect_body(&mut self, owner: LocalDefId, module: LocalModuleId, body: &Body, dir: &ModDir) {
        for (expr_id, expr) in body.exprs.iter() {
            let ExprKind::Block { stmts, .. } = &expr.kind else {
                continue;
            };
            let items: Vec<(u32, Item)> = stmts
                .iter()
                .enumerate()
                .filter_map(|(index, s)| match s {
                    Stmt::Item(item) => Some((index as u32, item.clone())),
                    _ => None,
                })
                .collect();
            if items.is_empty() {
                continue;
            }
            let vis = Visibility::Module(self.map.module_id(module));
            let origin = ModuleOrigin::Block { owner, block: expr_id };
            let file = dir.file.clone();
            let block = self.alloc_module(None, module, origin, &file, false, vis, expr.span);
            self.map.block_modules.insert((owner, expr_id), block);
            for (stmt, item) in &items {
                self.order += 1;
                self.block_stmt = Some(*stmt);
                self.collect_item(block, item, dir);
            }
        }
    }

    fn resolve_visibility(&self, module: LocalModuleId, vis: &ast::Visibility) -> Visibility {
        let in_module = |m: LocalModuleId| Visibility::Module(self.map.module_id(m));
        match vis {
            ast::Visibility::Public => Visibility::Public,
            ast::Visibility::Private => in_module(module),
            ast::Visibility::Crate => in_module(self.map.root),
            ast::Visibility::Super => in_module(self.map.super_of(module).unwrap_or(self.map.root)),
            ast::Visibility::In(path) => in_module(self.restriction_module(module, path).unwrap_or(self.map.root)),
        }
    }

    /// Module named by `pub(in path)`; only ancestors qualify, and they are
    /// all collected by the time their descendants are
    fn restriction_module(&self, module: LocalModuleId, path: &Path) -> Option<LocalModuleId> {
        let mut current = match path.kind {
            PathKind::Crate => self.map.root,
            PathKind::SelfMod => self.map.non_block(module),
            PathKind::Super(n) => {
                let mut m = self.map.non_block(module);
                for _ in 0..n {
                    m = self.map.super_of(m)?;
                }
                m
            }
            PathKind::Plain | PathKind::Abs | PathKind::DollarCrate(_) => self.map.root,
        };
        for seg in &path.segments {
            current = *self.map.modules[current].children.get(&seg.name)?;
        }
        self.map.is_ancestor(current, module).then_some(current)
    }
}

/// `prefix::{tree}` as one path
/// Id the next module allocated in `modules` will get. A module and its
/// definition refer to each other, so the def is built before the module.
fn next_module_id(modules: &Arena<ModuleData>) -> LocalModuleId {
    Idx::from_raw(RawIdx::from(modules.len() as u32))
}

fn join_use_path(prefix: &Path, tree: &Path) -> Path {
    if prefix.segments.is_empty() && prefix.kind == PathKind::Plain {
        return tree.clone();
    }
    let mut segments = prefix.segments.clone();
    segments.extend(tree.segments.iter().cloned());
    Path::new(prefix.kind.clone(), segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_ast::{Attrs, Ident, ModDef, ModKind, SourceFile, StructDef, StructKind, UseDef};

    use crate::workspace::{CrateOrigin, Edition};

    fn strukt(name: &str, vis: ast::Visibility) -> Item {
        Item::Struct(StructDef {
            attrs: Attrs::new(),
            vis,
            name: Ident::synthetic(name),
            generics: Default::default(),
            kind: StructKind::Unit,
            span: Span::default(),
        })
    }

    fn module(name: &str, items: Vec<Item>) -> Item {
        Item::Module(ModDef {
            attrs: Attrs::new(),
            vis: ast::Visibility::Private,
            name: Ident::synthetic(name),
            kind: ModKind::Inline(items),
            span: Span::default(),
        })
    }

    fn collect(items: Vec<Item>) -> DefMap {
        let mut ws = Workspace::new();
        let krate = ws.add_crate("app", Edition::E2021, CrateOrigin::Workspace, "src/lib.rs");
        ws.add_file("src/lib.rs", SourceFile { attrs: Attrs::new(), items });
        collect_crate(&ws, krate)
    }

    #[test]
    fn test_module_defs_point_at_their_modules() {
        let map = collect(vec![module("a", vec![module("b", Vec::new())]), module("c", Vec::new())]);
        assert_eq!(map.modules.len(), 4);
        for (id, data) in map.modules.iter() {
            assert!(matches!(map.defs[data.def].source, DefSource::Module(m) if m == id));
            assert_eq!(map.defs[data.def].module, data.parent.unwrap_or(id));
        }
    }

    #[test]
    fn test_unit_struct_occupies_both_namespaces() {
        let map = collect(vec![strukt("S", ast::Visibility::Public)]);
        let per_ns = map.module(map.root).scope.get("S");
        assert!(per_ns.types.is_some());
        assert!(per_ns.values.is_some());
        assert!(per_ns.macros.is_none());
    }

    #[test]
    fn test_nested_use_tree_flattening() {
        let tree = UseTree {
            path: Path::parse("std::collections"),
            kind: UseTreeKind::List(vec![
                UseTree {
                    path: Path::parse("self"),
                    kind: UseTreeKind::Single { alias: None },
                },
                UseTree {
                    path: Path::parse("HashMap"),
                    kind: UseTreeKind::Single {
                        alias: Some(ast::ImportAlias::Named(Ident::synthetic("Map"))),
                    },
                },
                UseTree {
                    path: Path::parse("hash_map"),
                    kind: UseTreeKind::Glob,
                },
            ]),
        };
        let map = collect(vec![Item::Use(UseDef {
            attrs: Attrs::new(),
            vis: ast::Visibility::Private,
            tree,
            span: Span::default(),
        })]);
        let imports = map.module(map.root).scope.imports();
        let rendered: Vec<_> = imports.iter().map(|i| (i.path.to_string(), i.kind.clone())).collect();
        assert_eq!(
            rendered,
            vec![
                ("std::collections".to_string(), ImportKind::Named("collections".into())),
                ("std::collections::HashMap".to_string(), ImportKind::Named("Map".into())),
                ("std::collections::hash_map".to_string(), ImportKind::Glob),
            ]
        );
    }

    #[test]
    fn test_visibility_restrictions() {
        let inner = module(
            "b",
            vec![
                strukt("Private", ast::Visibility::Private),
                strukt("ToSuper", ast::Visibility::Super),
                strukt("InA", ast::Visibility::In(Path::parse("crate::a"))),
            ],
        );
        let map = collect(vec![module("a", vec![inner])]);
        let a = map.module(map.root).children["a"];
        let b = map.module(a).children["b"];
        let scope = &map.module(b).scope;
        let vis = |name: &str| scope.get(name).types.map(|(_, v)| v);

        assert_eq!(vis("Private"), Some(Visibility::Module(map.module_id(b))));
        assert_eq!(vis("ToSuper"), Some(Visibility::Module(map.module_id(a))));
        assert_eq!(vis("InA"), Some(Visibility::Module(map.module_id(a))));

        let in_a = vis("InA").unwrap();
        assert!(map.is_visible_from(in_a, map.module_id(b)));
        assert!(!map.is_visible_from(in_a, map.root_module()));
    }

    #[test]
    fn test_missing_module_file_is_reported() {
        let decl = Item::Module(ModDef {
            attrs: Attrs::new(),
            vis: ast::Visibility::Private,
            name: Ident::synthetic("gone"),
            kind: ModKind::OutOfLine,
            span: Span::default(),
        });
        let map = collect(vec![decl]);
        assert!(map.module(map.root).children.contains_key("gone"));
        assert!(matches!(
            &map.diagnostics[..],
            [DefDiagnostic::UnresolvedModule { name, .. }] if name == "gone"
        ));
    }

    #[test]
    fn test_macro_order_and_export() {
        let mac = |name: &str, export: bool| {
            let attrs = if export { Attrs::new().with("macro_export") } else { Attrs::new() };
            Item::MacroRules(ast::MacroRulesDef {
                attrs,
                name: Ident::synthetic(name),
                body: "() => {}".to_string(),
                span: Span::default(),
            })
        };
        let map = collect(vec![mac("first", false), module("m", vec![mac("inner", true)])]);
        let orders: Vec<_> = map.macros.iter().map(|m| (m.name.as_str(), m.order, m.exported)).collect();
        assert_eq!(orders, vec![("first", 1, false), ("inner", 3, true)]);
        assert!(map.module(map.root).scope.get("inner").macros.is_some());
        assert!(map.module(map.root).scope.get("first").macros.is_none());
    }
}
