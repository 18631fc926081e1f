//! Definitions and name resolution
//!
//! This crate turns parsed crates into a resolved module structure by:
//! 1. Collecting every item of every crate into a per-crate [`DefMap`]
//! 2. Resolving imports, paths and preludes lazily on demand
//! 3. Scoping `macro_rules!` textually and exported macros by path
//! 4. Walking lexical scopes of bodies for locals, labels and generics

mod body_scopes;
mod collector;
mod db;
mod def_map;
mod ids;
mod macros;
mod module_file;
mod nameres;
mod resolver;
mod workspace;

#[cfg(test)]
mod test_db;

pub use body_scopes::{ExprScopes, ScopeData, ScopeId};
pub use db::HirDb;
pub use def_map::{DefDiagnostic, DefMap, Import, ImportKind, ItemScope, MacroEntry, ModuleData, ModuleOrigin};
pub use ids::{
    BuiltinType, DefData, DefId, DefKind, DefSource, FloatTy, IntTy, LocalDefId, LocalModuleId, ModuleId,
    Namespace, PerNs, UintTy, Visibility,
};
pub use macros::{ExportedMacroIndex, MacroPosition, MacroResolver};
pub use module_file::ModDir;
pub use nameres::ResolvePathResult;
pub use resolver::{
    GenericParamId, LifetimeResolution, Resolution, ResolveValueResult, Resolver, ScopeEntry, TypeNs, ValueNs,
    generics_of,
};
pub use workspace::{
    CrateData, CrateId, CrateOrigin, Dependency, Edition, FileSystem, MemoryFileSystem, Workspace, join_path,
    parent_dir,
};
