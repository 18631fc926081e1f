//! Locating the file of an out-of-line `mod foo;` declaration.

use crate::workspace::{Workspace, file_name, join_path, parent_dir};

/// Where child modules of a module are looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDir {
    /// File holding the module's items
    pub file: String,
    /// Directory that `mod foo;` declarations are relative to
    pub dir: String,
    /// Inside a `mod foo { ... }` block of `file`
    pub inline: bool,
}

impl ModDir {
    /// Directory ownership of a file reached as a crate root, a `mod.rs`
    /// or through `#[path]`: such files own the directory they sit in.
    /// Any other file `foo.rs` owns `foo/` next to it.
    pub fn for_file(file: &str, owns_parent: bool) -> ModDir {
        let dir = if owns_parent || file_name(file) == "mod.rs" {
            parent_dir(file).to_string()
        } else {
            join_path(parent_dir(file), crate::workspace::file_stem(file))
        };
        ModDir {
            file: file.to_string(),
            dir,
            inline: false,
        }
    }

    pub fn root(file: &str) -> ModDir {
        ModDir::for_file(file, true)
    }

    /// `mod name { ... }`, optionally with `#[path = "..."]`
    pub fn inline_child(&self, name: &str, path_attr: Option<&str>) -> ModDir {
        ModDir {
            file: self.file.clone(),
            dir: join_path(&self.dir, path_attr.unwrap_or(name)),
            inline: true,
        }
    }

    /// Candidate files for `mod name;`, in lookup order
    pub fn candidates(&self, name: &str, path_attr: Option<&str>) -> Vec<String> {
        match path_attr {
            // outside inline modules the attribute is relative to the declaring file
            Some(path) if self.inline => vec![join_path(&self.dir, path)],
            Some(path) => vec![join_path(parent_dir(&self.file), path)],
            None => vec![
                join_path(&self.dir, &format!("{}.rs", name)),
                join_path(&self.dir, &format!("{}/mod.rs", name)),
            ],
        }
    }

    /// Resolve `mod name;` to its file and the child's own `ModDir`.
    /// On failure returns the candidates that were tried.
    pub fn resolve_declaration(
        &self,
        ws: &Workspace,
        name: &str,
        path_attr: Option<&str>,
    ) -> Result<(String, ModDir), Vec<String>> {
        let candidates = self.candidates(name, path_attr);
        for candidate in &candidates {
            if let Some((found, _)) = ws.find_file(candidate) {
                let child = ModDir::for_file(found, path_attr.is_some());
                return Ok((found.to_string(), child));
            }
        }
        Err(candidates)
    }
}
