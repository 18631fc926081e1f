//! The mutable analysis host and the immutable snapshots it hands out.
//!
//! [`AnalysisHost`] owns the current workspace. Every change builds a fresh
//! name-resolution and type database under a new epoch and cancels the
//! snapshots taken before it; inference results of older epochs stay in the
//! shared cache until they are evicted. [`Analysis`] is a cheap clone of the
//! current databases that queries run against, from any thread.

use std::ops::ControlFlow;
use std::sync::Arc;

use ferrite_ast::{Body, ExprId, MacroCall, Path};
use ferrite_hir::{
    CrateId, DefId, DefSource, Edition, ExprScopes, FileSystem, HirDb, MacroPosition, MacroResolver, MemoryFileSystem,
    ModuleId, Namespace, Resolution, Resolver, Workspace, parent_dir,
};
use ferrite_mbe::{ExpandError, Expander};
use ferrite_syntax::{Cancellation, Cancelled, Span};
use ferrite_types::{InferError, InferenceCache, InferenceResult, TypeDb};
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, ConfigError, SessionHost};
use crate::diagnostics::{self, Diagnostic};

pub struct AnalysisHost {
    config: Arc<AnalysisConfig>,
    edition: Edition,
    files: Arc<dyn FileSystem>,
    cache: Arc<InferenceCache>,
    epoch: u64,
    cancel: Cancellation,
    db: Arc<TypeDb>,
}

impl AnalysisHost {
    /// Host over an empty workspace
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        let edition = config.edition()?;
        let cache = Arc::new(InferenceCache::new());
        let db = build_db(Workspace::new(), 0, &config, &cache);
        Ok(Self {
            config: Arc::new(config),
            edition,
            files: Arc::new(MemoryFileSystem::new()),
            cache,
            epoch: 0,
            cancel: Cancellation::new(),
            db,
        })
    }

    /// Files read by `include!`
    pub fn with_file_system(mut self, files: Arc<dyn FileSystem>) -> Self {
        self.files = files;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Edition for crates whose manifest does not name one
    pub fn default_edition(&self) -> Edition {
        self.edition
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Replace the workspace. Snapshots of the previous workspace are
    /// cancelled and their cached results evicted.
    pub fn set_workspace(&mut self, workspace: Workspace) {
        self.request_cancellation();
        self.epoch += 1;
        self.db = build_db(workspace, self.epoch, &self.config, &self.cache);
        let evicted = self.cache.evict_stale(self.epoch);
        info!(epoch = self.epoch, evicted, "workspace replaced");
    }

    /// Cancel every query running on a snapshot taken so far
    pub fn request_cancellation(&mut self) {
        self.cancel.cancel();
        self.cancel = Cancellation::new();
    }

    pub fn analysis(&self) -> Analysis {
        Analysis {
            db: Arc::clone(&self.db),
            config: Arc::clone(&self.config),
            files: Arc::clone(&self.files),
            cancel: self.cancel.clone(),
        }
    }
}

fn build_db(workspace: Workspace, epoch: u64, config: &AnalysisConfig, cache: &Arc<InferenceCache>) -> Arc<TypeDb> {
    let hir = Arc::new(HirDb::with_epoch(Arc::new(workspace), epoch));
    Arc::new(TypeDb::with_config(hir, config.inference_config()).with_cache(Arc::clone(cache)))
}

/// Read-only snapshot of one workspace epoch
#[derive(Clone)]
pub struct Analysis {
    db: Arc<TypeDb>,
    config: Arc<AnalysisConfig>,
    files: Arc<dyn FileSystem>,
    cancel: Cancellation,
}

impl Analysis {
    pub fn hir(&self) -> &HirDb {
        self.db.hir()
    }

    pub fn types(&self) -> &TypeDb {
        &self.db
    }

    pub fn epoch(&self) -> u64 {
        self.hir().epoch()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Expand a macro call written in `module` at `position`
    pub fn expand_macro(
        &self,
        module: ModuleId,
        position: MacroPosition,
        call: &MacroCall,
    ) -> Result<String, ExpandError> {
        let hir = self.hir();
        let lookup = MacroResolver::new(hir, module, position);
        let host = SessionHost {
            env: &self.config.env,
            files: self.files.as_ref(),
            dir: parent_dir(&hir.module(module).file),
        };
        let krate = &hir.workspace().crate_data(module.krate).name;
        let expansion = Expander::new(krate, &lookup, &host)
            .with_cancellation(self.cancel.clone())
            .with_depth_limit(self.config.macro_expansion_depth)
            .expand_call(call);
        if let Err(err) = &expansion {
            debug!(path = %call.path, error = %err, "macro call not expanded");
        }
        expansion
    }

    /// Expand a macro call standing at `expr` in the body of `owner`. Only
    /// `macro_rules!` definitions above the call's statement are in scope.
    pub fn expand_macro_in_body(&self, owner: DefId, expr: ExprId, call: &MacroCall) -> Result<String, ExpandError> {
        let hir = self.hir();
        let Some(body) = body_of(hir, owner) else {
            return self.expand_macro(hir.def_module(owner), MacroPosition::item(hir.def(owner).order), call);
        };
        let scopes = ExprScopes::new(body);
        let resolver = Resolver::for_expr(hir, owner, body, &scopes, expr);
        self.expand_macro(resolver.module(), resolver.macro_position(), call)
    }

    /// Definitions `path` names from `module`, optionally restricted to one
    /// namespace. Empty when any segment fails to resolve.
    pub fn resolve_path(&self, module: ModuleId, path: &Path, ns: Option<Namespace>) -> Result<Vec<DefId>, Cancelled> {
        self.cancel.check()?;
        let result = self.hir().resolve_path_in_module(module, path);
        if result.unresolved_from.is_some() {
            return Ok(Vec::new());
        }
        let namespaces = match ns {
            Some(ns) => vec![ns],
            None => vec![Namespace::Types, Namespace::Values, Namespace::Macros],
        };
        let mut defs = Vec::new();
        for def in namespaces.into_iter().filter_map(|ns| result.resolved.get(ns)) {
            if !defs.contains(&def) {
                defs.push(def);
            }
        }
        Ok(defs)
    }

    /// Every name visible in `ns` inside the signature of `def`, innermost
    /// first, shadowed names omitted
    pub fn names_in_scope(&self, def: DefId, ns: Namespace) -> Result<Vec<(String, Resolution)>, Cancelled> {
        let resolver = Resolver::for_def(self.hir(), def).with_cancellation(self.cancel.clone());
        collect_names(&resolver, ns)
    }

    /// Every name visible in `ns` at `expr` of the body of `owner`
    pub fn names_at_expr(
        &self,
        owner: DefId,
        expr: ExprId,
        ns: Namespace,
    ) -> Result<Vec<(String, Resolution)>, Cancelled> {
        let hir = self.hir();
        let Some(body) = body_of(hir, owner) else {
            return self.names_in_scope(owner, ns);
        };
        let scopes = ExprScopes::new(body);
        let resolver = Resolver::for_expr(hir, owner, body, &scopes, expr).with_cancellation(self.cancel.clone());
        collect_names(&resolver, ns)
    }

    pub fn infer(&self, def: DefId) -> Result<Arc<InferenceResult>, InferError> {
        self.db.infer(def, &self.cancel)
    }

    /// Rendered type of one expression, for hovers
    pub fn type_of_expr(&self, owner: DefId, expr: ExprId) -> Result<Option<String>, InferError> {
        let result = self.infer(owner)?;
        Ok(result.type_of_expr(expr).map(|ty| ty.display(self.hir()).to_string()))
    }

    /// Span and rendered type of every expression of a body
    pub fn type_hints(&self, owner: DefId) -> Result<Vec<(Span, String)>, InferError> {
        let hir = self.hir();
        let body = body_of(hir, owner).ok_or(InferError::NoBody(owner))?;
        let result = self.infer(owner)?;
        Ok(body
            .exprs
            .iter()
            .filter_map(|(id, expr)| {
                let ty = result.type_of_expr(id)?;
                Some((expr.span, ty.display(hir).to_string()))
            })
            .collect())
    }

    /// Functions, consts and statics of `krate` that have a body
    pub fn body_owners(&self, krate: CrateId) -> Vec<DefId> {
        let hir = self.hir();
        let map = hir.def_map(krate);
        map.defs
            .iter()
            .filter(|(_, data)| body_of_source(&data.source).is_some())
            .map(|(local_id, _)| map.def_id(local_id))
            .collect()
    }

    /// Infer every body of `krate`, spreading the bodies over the available
    /// cores. Bodies that fail with a cycle are skipped.
    pub fn infer_crate(&self, krate: CrateId) -> Result<Vec<(DefId, Arc<InferenceResult>)>, Cancelled> {
        let owners = self.body_owners(krate);
        let workers = std::thread::available_parallelism()
            .map_or(1, |n| n.get())
            .clamp(1, owners.len().max(1));
        let chunk_size = owners.len().div_ceil(workers).max(1);
        debug!(?krate, bodies = owners.len(), workers, "inferring crate");

        let chunks: Vec<Result<Vec<_>, Cancelled>> = std::thread::scope(|scope| {
            let handles: Vec<_> = owners
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.infer_all(chunk)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut results = Vec::with_capacity(owners.len());
        for chunk in chunks {
            results.extend(chunk?);
        }
        Ok(results)
    }

    fn infer_all(&self, owners: &[DefId]) -> Result<Vec<(DefId, Arc<InferenceResult>)>, Cancelled> {
        let mut results = Vec::with_capacity(owners.len());
        for &def in owners {
            match self.infer(def) {
                Ok(result) => results.push((def, result)),
                Err(InferError::Cancelled(cancelled)) => return Err(cancelled),
                Err(err) => warn!(?def, error = %err, "body skipped"),
            }
        }
        Ok(results)
    }

    /// Name-resolution, macro and inference diagnostics of one crate
    pub fn diagnostics(&self, krate: CrateId) -> Result<Vec<Diagnostic>, Cancelled> {
        self.cancel.check()?;
        let hir = self.hir();
        let map = hir.def_map(krate);
        let mut out: Vec<Diagnostic> = map
            .diagnostics
            .iter()
            .map(|diag| diagnostics::from_def_diagnostic(hir, map, diag))
            .collect();
        for (owner, result) in self.infer_crate(krate)? {
            let Some(body) = body_of(hir, owner) else {
                continue;
            };
            out.extend(
                result
                    .diagnostics()
                    .iter()
                    .map(|diag| diagnostics::from_inference_diagnostic(hir, owner, body, diag)),
            );
        }
        debug!(?krate, count = out.len(), "diagnostics collected");
        Ok(out)
    }
}

fn collect_names(resolver: &Resolver<'_>, ns: Namespace) -> Result<Vec<(String, Resolution)>, Cancelled> {
    let mut names = Vec::new();
    resolver.process_names(ns, &mut |entry| {
        if let Some(resolution) = entry.resolve() {
            names.push((entry.name.clone(), resolution));
        }
        ControlFlow::Continue(())
    })?;
    Ok(names)
}

fn body_of(hir: &HirDb, def: DefId) -> Option<&Body> {
    body_of_source(&hir.def(def).source)
}

fn body_of_source(source: &DefSource) -> Option<&Body> {
    match source {
        DefSource::Function(f) => f.body.as_ref(),
        DefSource::Const(c) => c.body.as_ref(),
        DefSource::Static(s) => s.body.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticKind, DiagnosticSource, Severity};
    use ferrite_types::InferenceDiagnostic;
    use ferrite_ast::{Attrs, BodyBuilder, Delimiter, ExprKind, Item, SourceFile, Stmt, StructKind, TypeRef, make};
    use ferrite_hir::{CrateOrigin, DefKind};

    fn workspace(items: Vec<Item>) -> Workspace {
        let mut ws = Workspace::new();
        ws.add_crate("app", Edition::E2021, CrateOrigin::Workspace, "/app/src/lib.rs");
        ws.add_file("/app/src/lib.rs", SourceFile { attrs: Attrs::new(), items });
        ws
    }

    fn host(items: Vec<Item>) -> AnalysisHost {
        let mut host = AnalysisHost::new(AnalysisConfig::default()).unwrap();
        host.set_workspace(workspace(items));
        host
    }

    fn app(analysis: &Analysis) -> CrateId {
        analysis.hir().workspace().crate_by_name("app").unwrap()
    }

    fn def_named(analysis: &Analysis, name: &str) -> DefId {
        let map = analysis.hir().def_map(app(analysis));
        map.defs
            .iter()
            .find(|(_, data)| data.name.as_deref() == Some(name))
            .map(|(local_id, _)| map.def_id(local_id))
            .unwrap()
    }

    fn call(path: &str, input: &str) -> MacroCall {
        MacroCall {
            attrs: Attrs::new(),
            path: Path::parse(path),
            delimiter: Delimiter::Paren,
            input: input.to_string(),
            span: Span::default(),
        }
    }

    /// `fn name() { let y: bool = 1; }`
    fn mismatched(name: &str) -> Item {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_y = b.let_stmt("y", Some(TypeRef::path("bool")), Some(one));
        let root = b.block(vec![let_y], None);
        make::func(name, Vec::new(), None, Some(b.finish(root))).into()
    }

    /// `fn name() -> i32 { 7 }`
    fn seven(name: &str) -> Item {
        let mut b = BodyBuilder::new();
        let seven = b.int(7);
        let root = b.block(Vec::new(), Some(seven));
        make::func(name, Vec::new(), Some(TypeRef::path("i32")), Some(b.finish(root))).into()
    }

    #[test]
    fn test_expand_macro_uses_rules_and_configured_env() {
        let config = AnalysisConfig::from_json(r#"{ "env": { "PROFILE": "debug" } }"#).unwrap();
        let mut host = AnalysisHost::new(config).unwrap();
        host.set_workspace(workspace(vec![make::macro_rules("one", "() => { 1 }").into()]));
        let analysis = host.analysis();
        let root = analysis.hir().crate_root(app(&analysis));

        assert_eq!(analysis.expand_macro(root, MacroPosition::end(), &call("one", "")).unwrap().trim(), "1");
        assert_eq!(
            analysis.expand_macro(root, MacroPosition::end(), &call("env", r#""PROFILE""#)).unwrap(),
            r#""debug""#
        );
        assert!(matches!(
            analysis.expand_macro(root, MacroPosition::end(), &call("missing", "")),
            Err(ExpandError::UnresolvedMacro { .. })
        ));
    }

    #[test]
    fn test_include_reads_next_to_invoking_file() {
        let mut files = MemoryFileSystem::new();
        files.insert("/app/src/generated.rs", "fn generated() {}");
        let mut host = AnalysisHost::new(AnalysisConfig::default())
            .unwrap()
            .with_file_system(Arc::new(files));
        host.set_workspace(workspace(Vec::new()));
        let analysis = host.analysis();
        let root = analysis.hir().crate_root(app(&analysis));

        let expansion = analysis.expand_macro(root, MacroPosition::end(), &call("include", r#""generated.rs""#));
        assert_eq!(expansion.unwrap(), "fn generated() {}");
    }

    #[test]
    fn test_block_macro_is_not_visible_before_its_definition() {
        // fn f() { early; macro_rules! m { () => { 1 } } late }
        let mut b = BodyBuilder::new();
        let early = b.path("early");
        let late = b.path("late");
        let root = b.block(
            vec![
                Stmt::Expr {
                    expr: early,
                    has_semi: true,
                },
                Stmt::Item(make::macro_rules("m", "() => { 1 }").into()),
            ],
            Some(late),
        );
        let host = host(vec![make::func("f", Vec::new(), None, Some(b.finish(root))).into()]);
        let analysis = host.analysis();
        let f = def_named(&analysis, "f");

        assert!(matches!(
            analysis.expand_macro_in_body(f, early, &call("m", "")),
            Err(ExpandError::UnresolvedMacro { .. })
        ));
        assert_eq!(analysis.expand_macro_in_body(f, late, &call("m", "")).unwrap().trim(), "1");
    }

    #[test]
    fn test_resolve_path_filters_namespaces() {
        let host = host(vec![
            make::strukt("Unit", StructKind::Unit).into(),
            make::func("f", Vec::new(), None, None).into(),
        ]);
        let analysis = host.analysis();
        let root = analysis.hir().crate_root(app(&analysis));

        let unit = analysis.resolve_path(root, &Path::parse("Unit"), None).unwrap();
        assert_eq!(unit.len(), 1);
        assert_eq!(analysis.hir().def(unit[0]).kind(), DefKind::Struct);
        let f = analysis.resolve_path(root, &Path::parse("f"), Some(Namespace::Types)).unwrap();
        assert!(f.is_empty());
        let f = analysis.resolve_path(root, &Path::parse("f"), Some(Namespace::Values)).unwrap();
        assert_eq!(f, vec![def_named(&analysis, "f")]);
        assert!(analysis.resolve_path(root, &Path::parse("foo::bar"), None).unwrap().is_empty());
    }

    #[test]
    fn test_names_in_scope_lists_module_items() {
        let host = host(vec![
            make::func("f", Vec::new(), None, None).into(),
            make::func("g", Vec::new(), None, None).into(),
            make::strukt("S", StructKind::Unit).into(),
        ]);
        let analysis = host.analysis();
        let f = def_named(&analysis, "f");

        let values = analysis.names_in_scope(f, Namespace::Values).unwrap();
        let names: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
        assert!(names.contains(&"g"));
        assert!(names.contains(&"S"));
        assert!(values.contains(&("g".to_string(), Resolution::Def(def_named(&analysis, "g")))));
        let types = analysis.names_in_scope(f, Namespace::Types).unwrap();
        assert!(!types.iter().any(|(name, _)| name == "g"));
    }

    #[test]
    fn test_names_at_expr_include_locals() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_x = b.let_stmt("x", None, Some(one));
        let use_x = b.path("x");
        let root = b.block(vec![let_x], Some(use_x));
        let host = host(vec![make::func("f", Vec::new(), None, Some(b.finish(root))).into()]);
        let analysis = host.analysis();
        let f = def_named(&analysis, "f");

        let names = analysis.names_at_expr(f, use_x, Namespace::Values).unwrap();
        assert!(matches!(names.first(), Some((name, Resolution::Local(_))) if name == "x"));
        let before = analysis.names_at_expr(f, one, Namespace::Values).unwrap();
        assert!(!before.iter().any(|(name, _)| name == "x"));
    }

    #[test]
    fn test_hover_and_type_hints() {
        let host = host(vec![seven("f")]);
        let analysis = host.analysis();
        let f = def_named(&analysis, "f");
        let body = body_of(analysis.hir(), f).unwrap();

        let tail = body
            .exprs
            .iter()
            .find(|(_, e)| matches!(e.kind, ExprKind::Literal(_)))
            .unwrap()
            .0;
        assert_eq!(analysis.type_of_expr(f, tail).unwrap().as_deref(), Some("i32"));
        let hints = analysis.type_hints(f).unwrap();
        assert_eq!(hints.len(), body.exprs.len());
        assert!(hints.iter().all(|(_, ty)| ty == "i32"));

        let unit = make::strukt("S", StructKind::Unit);
        let host = self::host(vec![unit.into()]);
        let analysis = host.analysis();
        assert_eq!(
            analysis.type_hints(def_named(&analysis, "S")),
            Err(InferError::NoBody(def_named(&analysis, "S")))
        );
    }

    #[test]
    fn test_infer_crate_covers_every_body() {
        let mut items: Vec<Item> = (0..12).map(|i| seven(&format!("f{i}"))).collect();
        items.push(make::func("decl", Vec::new(), None, None).into());
        let host = host(items);
        let analysis = host.analysis();

        let owners = analysis.body_owners(app(&analysis));
        assert_eq!(owners.len(), 12);
        let results = analysis.infer_crate(app(&analysis)).unwrap();
        let inferred: Vec<DefId> = results.iter().map(|(def, _)| *def).collect();
        assert_eq!(inferred, owners);
        assert!(results.iter().all(|(_, r)| r.diagnostics().is_empty()));
    }

    #[test]
    fn test_diagnostics_merge_every_stage() {
        let host = host(vec![
            make::module_decl("gone").into(),
            make::macro_rules("broken", "($x) => { $x }").into(),
            mismatched("bad"),
            seven("good"),
        ]);
        let analysis = host.analysis();
        let diagnostics = analysis.diagnostics(app(&analysis)).unwrap();

        let sources: Vec<DiagnosticSource> = diagnostics.iter().map(|d| d.source).collect();
        assert!(sources.contains(&DiagnosticSource::NameResolution));
        assert!(sources.contains(&DiagnosticSource::Macro));
        let inference: Vec<&Diagnostic> = diagnostics
            .iter()
            .filter(|d| d.source == DiagnosticSource::Inference)
            .collect();
        assert_eq!(inference.len(), 1);
        assert_eq!(inference[0].owner, Some(def_named(&analysis, "bad")));
        assert!(matches!(
            &inference[0].kind,
            DiagnosticKind::Inference(InferenceDiagnostic::TypeMismatch { .. })
        ));
        assert_eq!(inference[0].message, "mismatched types: expected `bool`, found `i32`");
        assert_eq!(inference[0].file, "/app/src/lib.rs");
        let missing = diagnostics
            .iter()
            .find(|d| d.source == DiagnosticSource::NameResolution)
            .unwrap();
        assert_eq!(missing.file, "/app/src/lib.rs");
        assert!(missing.message.contains("/app/src/gone.rs"));
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Error));
    }

    #[test]
    fn test_workspace_change_cancels_old_snapshots() {
        let mut host = host(vec![seven("f")]);
        let old = host.analysis();
        let f = def_named(&old, "f");
        old.infer(f).unwrap();
        assert_eq!(host.cache.len(), 1);

        host.set_workspace(workspace(vec![seven("f")]));
        assert!(old.is_cancelled());
        assert_eq!(old.infer(f).unwrap_err(), InferError::Cancelled(Cancelled));
        assert_eq!(old.diagnostics(app(&old)), Err(Cancelled));
        assert!(host.cache.is_empty());

        let new = host.analysis();
        assert!(!new.is_cancelled());
        assert_eq!(new.epoch(), 2);
        assert!(new.infer(def_named(&new, "f")).is_ok());
    }

    #[test]
    fn test_snapshot_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Analysis>();
    }
}
