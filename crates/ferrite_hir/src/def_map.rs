//! Per-crate module tree and the items declared in each module.

use ferrite_ast::{ExprId, Path, Span};
use indexmap::IndexMap;
use la_arena::Arena;
use rustc_hash::FxHashMap;

use crate::ids::{DefData, DefId, LocalDefId, LocalModuleId, ModuleId, Namespace, PerNs, Visibility};
use crate::workspace::{CrateId, Edition};

/// Items and imports of one module.
///
/// Declared items are stored per namespace. Imports are kept unresolved
/// and only looked at when a name is queried.
#[derive(Debug, Default)]
pub struct ItemScope {
    types: IndexMap<String, (DefId, Visibility)>,
    values: IndexMap<String, (DefId, Visibility)>,
    macros: IndexMap<String, (DefId, Visibility)>,
    imports: Vec<Import>,
}

impl ItemScope {
    fn map(&self, ns: Namespace) -> &IndexMap<String, (DefId, Visibility)> {
        match ns {
            Namespace::Types => &self.types,
            Namespace::Values => &self.values,
            Namespace::Macros => &self.macros,
        }
    }

    /// First declaration of a name wins
    pub(crate) fn declare(&mut self, ns: Namespace, name: &str, def: DefId, vis: Visibility) {
        let map = match ns {
            Namespace::Types => &mut self.types,
            Namespace::Values => &mut self.values,
            Namespace::Macros => &mut self.macros,
        };
        map.entry(name.to_string()).or_insert((def, vis));
    }

    pub(crate) fn push_import(&mut self, import: Import) {
        self.imports.push(import);
    }

    /// Declared items only
    pub fn get(&self, name: &str) -> PerNs {
        PerNs {
            types: self.types.get(name).copied(),
            values: self.values.get(name).copied(),
            macros: self.macros.get(name).copied(),
        }
    }

    pub fn declarations(&self, ns: Namespace) -> impl Iterator<Item = (&str, DefId, Visibility)> {
        self.map(ns).iter().map(|(name, (def, vis))| (name.as_str(), *def, *vis))
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }
}

/// One flattened `use` leaf or `extern crate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Full path; the prefix for globs
    pub path: Path,
    pub kind: ImportKind,
    pub vis: Visibility,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Binds the given name
    Named(String),
    /// `use path as _;`, only brings traits into scope
    Underscore,
    Glob,
    ExternCrate {
        name: String,
        alias: Option<String>,
    },
}

impl Import {
    /// Name this import binds, if any
    pub fn bound_name(&self) -> Option<&str> {
        match &self.kind {
            ImportKind::Named(name) => Some(name),
            ImportKind::ExternCrate { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            ImportKind::Underscore | ImportKind::Glob => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    CrateRoot,
    /// `mod foo;`
    File { declaration: Span },
    /// `mod foo { ... }`
    Inline { declaration: Span },
    /// Items declared inside a block of a body
    Block { owner: LocalDefId, block: ExprId },
}

#[derive(Debug)]
pub struct ModuleData {
    pub name: Option<String>,
    pub parent: Option<LocalModuleId>,
    pub children: IndexMap<String, LocalModuleId>,
    pub origin: ModuleOrigin,
    pub scope: ItemScope,
    /// The module's own definition
    pub def: LocalDefId,
    /// `#[macro_use]`: macros defined inside stay visible after the module
    pub macro_use: bool,
    pub file: String,
}

impl ModuleData {
    pub fn is_block(&self) -> bool {
        matches!(self.origin, ModuleOrigin::Block { .. })
    }
}

/// A `macro_rules!` definition in source order
#[derive(Debug, Clone)]
pub struct MacroEntry {
    pub def: LocalDefId,
    pub name: String,
    pub module: LocalModuleId,
    pub order: u32,
    /// Index of the defining statement when `module` is a block module
    pub stmt: Option<u32>,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefDiagnostic {
    UnresolvedModule {
        module: LocalModuleId,
        name: String,
        candidates: Vec<String>,
        span: Span,
    },
    MalformedMacro {
        def: LocalDefId,
        message: String,
    },
}

/// Module tree and definitions of one crate
#[derive(Debug)]
pub struct DefMap {
    pub krate: CrateId,
    pub edition: Edition,
    pub no_std: bool,
    pub no_core: bool,
    pub root: LocalModuleId,
    pub modules: Arena<ModuleData>,
    pub defs: Arena<DefData>,
    pub impls: Vec<LocalDefId>,
    pub macros: Vec<MacroEntry>,
    /// Crates named by `#[macro_use] extern crate`
    pub macro_use_crates: Vec<String>,
    /// Block modules keyed by body owner and block expression
    pub block_modules: FxHashMap<(LocalDefId, ExprId), LocalModuleId>,
    /// Items of traits and impls, variants of enums
    pub children: FxHashMap<LocalDefId, Vec<LocalDefId>>,
    pub diagnostics: Vec<DefDiagnostic>,
}

impl DefMap {
    pub fn module_id(&self, local_id: LocalModuleId) -> ModuleId {
        ModuleId {
            krate: self.krate,
            local_id,
        }
    }

    pub fn def_id(&self, local_id: LocalDefId) -> DefId {
        DefId {
            krate: self.krate,
            local_id,
        }
    }

    pub fn root_module(&self) -> ModuleId {
        self.module_id(self.root)
    }

    pub fn module(&self, id: LocalModuleId) -> &ModuleData {
        &self.modules[id]
    }

    pub fn def(&self, id: LocalDefId) -> &DefData {
        &self.defs[id]
    }

    pub fn children_of(&self, container: LocalDefId) -> &[LocalDefId] {
        self.children.get(&container).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `ancestor` is `module` or one of its parents
    pub fn is_ancestor(&self, ancestor: LocalModuleId, module: LocalModuleId) -> bool {
        let mut current = Some(module);
        while let Some(m) = current {
            if m == ancestor {
                return true;
            }
            current = self.modules[m].parent;
        }
        false
    }

    /// Nearest enclosing module that is not a block
    pub fn non_block(&self, mut module: LocalModuleId) -> LocalModuleId {
        while self.modules[module].is_block() {
            match self.modules[module].parent {
                Some(parent) => module = parent,
                None => break,
            }
        }
        module
    }

    /// Parent for `super`, skipping block modules
    pub fn super_of(&self, module: LocalModuleId) -> Option<LocalModuleId> {
        let module = self.non_block(module);
        self.modules[module].parent.map(|p| self.non_block(p))
    }

    /// `crate::a::b` style path of a module, for display
    pub fn module_path(&self, module: LocalModuleId) -> String {
        let mut names = Vec::new();
        let mut current = Some(module);
        while let Some(m) = current {
            if let Some(name) = &self.modules[m].name {
                names.push(name.clone());
            }
            current = self.modules[m].parent;
        }
        names.push("crate".to_string());
        names.reverse();
        names.join("::")
    }

    pub fn is_visible_from(&self, vis: Visibility, from: ModuleId) -> bool {
        match vis {
            Visibility::Public => true,
            Visibility::Module(m) => {
                m.krate == from.krate && from.krate == self.krate && self.is_ancestor(m.local_id, from.local_id)
            }
        }
    }

    /// Module a textual macro defined in `module` leaks into: climbing
    /// through `#[macro_use]` modules to their parents
    pub(crate) fn macro_leak_target(&self, mut module: LocalModuleId) -> LocalModuleId {
        while self.modules[module].macro_use {
            match self.modules[module].parent {
                Some(parent) => module = parent,
                None => break,
            }
        }
        module
    }
}
