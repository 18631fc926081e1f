//! Crates, their dependency edges and the parsed source files they are made of.

use std::sync::Arc;

use ferrite_ast::SourceFile;
use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

pub type CrateId = Idx<CrateData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Edition {
    E2015,
    E2018,
    #[default]
    E2021,
}

impl Edition {
    pub fn parse(text: &str) -> Option<Edition> {
        match text {
            "2015" => Some(Edition::E2015),
            "2018" => Some(Edition::E2018),
            "2021" => Some(Edition::E2021),
            _ => None,
        }
    }

    /// Dependencies are nameable without `extern crate` from 2018 on
    pub fn has_extern_prelude(self) -> bool {
        self >= Edition::E2018
    }
}

/// Where a crate comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrateOrigin {
    Workspace,
    Dependency,
    Stdlib,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub krate: CrateId,
    /// Name the dependent crate uses for it (renames included)
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CrateData {
    /// Normalized crate name (`-` replaced by `_`)
    pub name: String,
    pub edition: Edition,
    pub origin: CrateOrigin,
    pub root_file: String,
    pub deps: Vec<Dependency>,
}

/// Every crate of the analyzed workspace plus the parsed trees of all files
/// known to it
#[derive(Debug, Default)]
pub struct Workspace {
    crates: Arena<CrateData>,
    files: FxHashMap<String, Arc<SourceFile>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_crate(&mut self, name: &str, edition: Edition, origin: CrateOrigin, root_file: &str) -> CrateId {
        self.crates.alloc(CrateData {
            name: ferrite_mbe::normalize_crate_name(name),
            edition,
            origin,
            root_file: normalize_path(root_file),
            deps: Vec::new(),
        })
    }

    /// `from` depends on `to`, under `alias` when the dependency is renamed
    pub fn add_dependency(&mut self, from: CrateId, to: CrateId, alias: Option<&str>) {
        let name = match alias {
            Some(alias) => ferrite_mbe::normalize_crate_name(alias),
            None => self.crates[to].name.clone(),
        };
        self.crates[from].deps.push(Dependency { krate: to, name });
    }

    pub fn add_file(&mut self, path: &str, file: SourceFile) {
        self.files.insert(normalize_path(path), Arc::new(file));
    }

    pub fn crate_data(&self, krate: CrateId) -> &CrateData {
        &self.crates[krate]
    }

    pub fn crates(&self) -> impl Iterator<Item = (CrateId, &CrateData)> {
        self.crates.iter()
    }

    pub fn crate_by_name(&self, name: &str) -> Option<CrateId> {
        let name = ferrite_mbe::normalize_crate_name(name);
        self.crates.iter().find(|(_, data)| data.name == name).map(|(id, _)| id)
    }

    pub fn file(&self, path: &str) -> Option<&Arc<SourceFile>> {
        self.files.get(path)
    }

    /// Exact match first, then a case-insensitive one
    pub fn find_file(&self, path: &str) -> Option<(&str, &Arc<SourceFile>)> {
        if let Some((key, file)) = self.files.get_key_value(path) {
            return Some((key.as_str(), file));
        }
        let lower = path.to_lowercase();
        let mut matches: Vec<_> = self
            .files
            .iter()
            .filter(|(key, _)| key.to_lowercase() == lower)
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches.into_iter().next().map(|(key, file)| (key.as_str(), file))
    }
}

/// Read access to file contents, used by `include!`
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &str) -> Option<String>;
}

/// Files held in memory, keyed by normalized path
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: FxHashMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<String>) {
        self.files.insert(normalize_path(path), contents.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &str) -> Option<String> {
        self.files.get(&normalize_path(path)).cloned()
    }
}

/// Directory part of a `/`-separated path; empty for bare file names
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "",
    }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

/// Join `rel` onto `dir`, folding `.` and `..` components. An absolute
/// `rel` replaces `dir`.
pub fn join_path(dir: &str, rel: &str) -> String {
    if dir.is_empty() || is_absolute(rel) {
        normalize_path(rel)
    } else {
        normalize_path(&format!("{}/{}", dir, rel))
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with(['/', '\\'])
}

/// Forward slashes, no empty or `.` components, `..` folded. A leading
/// root stays; `..` never climbs above it.
pub fn normalize_path(path: &str) -> String {
    let rooted = is_absolute(path);
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_dir("src/foo/bar.rs"), "src/foo");
        assert_eq!(parent_dir("lib.rs"), "");
        assert_eq!(file_stem("src/foo.rs"), "foo");
        assert_eq!(join_path("src/a", "../b/c.rs"), "src/b/c.rs");
        assert_eq!(join_path("", "./x.rs"), "x.rs");
        assert_eq!(normalize_path("src\\lib.rs"), "src/lib.rs");
    }

    #[test]
    fn test_absolute_paths_keep_their_root() {
        assert_eq!(normalize_path("/app/src/lib.rs"), "/app/src/lib.rs");
        assert_eq!(normalize_path("//app/./src/../lib.rs"), "/app/lib.rs");
        assert_eq!(normalize_path("/../x.rs"), "/x.rs");
        assert_eq!(normalize_path("../x.rs"), "../x.rs");
        assert_eq!(parent_dir("/lib.rs"), "/");
        assert_eq!(join_path("/", "lib.rs"), "/lib.rs");
        assert_eq!(join_path("/app/src", "gen/table.rs"), "/app/src/gen/table.rs");
        assert_eq!(join_path("/app/src", "/etc/shared.rs"), "/etc/shared.rs");
        assert_eq!(join_path(parent_dir("/app/src/lib.rs"), "../build.rs"), "/app/build.rs");
    }

    #[test]
    fn test_absolute_files_are_found_as_added() {
        let mut ws = Workspace::new();
        let app = ws.add_crate("app", Edition::E2021, CrateOrigin::Workspace, "/app/src/lib.rs");
        ws.add_file("/app/src/lib.rs", SourceFile::default());
        assert_eq!(ws.crate_data(app).root_file, "/app/src/lib.rs");
        assert!(ws.file("/app/src/lib.rs").is_some());
        assert!(ws.file("app/src/lib.rs").is_none());

        let mut fs = MemoryFileSystem::new();
        fs.insert("/app/src/gen/table.rs", "[1]");
        assert_eq!(fs.read_file("/app/src/gen/table.rs").as_deref(), Some("[1]"));
        assert_eq!(fs.read_file("app/src/gen/table.rs"), None);
    }

    #[test]
    fn test_dependency_alias_is_normalized() {
        let mut ws = Workspace::new();
        let app = ws.add_crate("my-app", Edition::E2021, CrateOrigin::Workspace, "app/src/main.rs");
        let dep = ws.add_crate("serde-json", Edition::E2018, CrateOrigin::Dependency, "dep/src/lib.rs");
        ws.add_dependency(app, dep, None);
        ws.add_dependency(app, dep, Some("json-alias"));

        assert_eq!(ws.crate_data(app).name, "my_app");
        let names: Vec<_> = ws.crate_data(app).deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["serde_json", "json_alias"]);
        assert_eq!(ws.crate_by_name("serde-json"), Some(dep));
    }

    #[test]
    fn test_case_insensitive_file_lookup() {
        let mut ws = Workspace::new();
        ws.add_file("src/Foo.rs", SourceFile::default());
        assert!(ws.file("src/foo.rs").is_none());
        let (found, _) = ws.find_file("src/foo.rs").unwrap();
        assert_eq!(found, "src/Foo.rs");
    }

    #[test]
    fn test_memory_file_system() {
        let mut fs = MemoryFileSystem::new();
        fs.insert("./data/x.txt", "hello");
        assert_eq!(fs.read_file("data/x.txt").as_deref(), Some("hello"));
        assert_eq!(fs.read_file("data/y.txt"), None);
    }
}
