//! The knowledge-base index the pipeline resolves references against.
//!
//! [`Vault`] is the collaborator interface; [`DirectoryVault`] is the
//! bundled implementation backed by a directory tree on disk.

use std::io;
use std::path::{Path, PathBuf};

use ignore::{Walk, WalkBuilder};
use snafu::ResultExt;

use crate::{ExportError, WalkDirSnafu};

type Result<T, E = ExportError> = std::result::Result<T, E>;

/// A single file known to the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Path relative to the vault root.
    pub relative: PathBuf,
    /// File name, including any extension.
    pub name: String,
    /// File name with the extension stripped.
    pub base: String,
}

impl FileHandle {
    fn new(absolute: PathBuf, root: &Path) -> Self {
        let relative = absolute
            .strip_prefix(root)
            .unwrap_or(&absolute)
            .to_path_buf();
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = absolute
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            absolute,
            relative,
            name,
            base,
        }
    }
}

/// The knowledge-base index and file-read primitives consumed by the
/// render pipeline.
///
/// `files` must enumerate in a stable, sorted order: the fallback search in
/// [`resolve`][crate::resolve::resolve] breaks ties by first-encountered
/// order, and an unstable enumeration would make resolution
/// non-deterministic.
pub trait Vault: Send + Sync {
    /// Resolve a reference using the knowledge base's native link
    /// conventions (same-name / same-folder / shortest-path), scoped to the
    /// folder containing `source`.
    fn resolve_by_link_convention(&self, name: &str, source: &Path) -> Option<&FileHandle>;

    /// Every file in the vault, sorted by vault-relative path.
    fn files(&self) -> &[FileHandle];

    /// Read a note's raw text.
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Turn a vault-relative path into an absolute one.
    fn absolute_path(&self, relative: &Path) -> PathBuf;

    /// Turn an absolute path back into a vault-relative one. Paths outside
    /// the vault are returned unchanged.
    fn relative_path(&self, absolute: &Path) -> PathBuf;
}

/// Options for walking a vault directory.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions<'a> {
    /// The filename for ignore files, following the
    /// [gitignore format](https://git-scm.com/docs/gitignore).
    ///
    /// By default this is set to `.export-ignore`.
    pub ignore_filename: &'a str,
    /// Whether to ignore hidden files.
    ///
    /// This is enabled by default.
    pub ignore_hidden: bool,
    /// Whether to honor git's ignore rules if the vault is a git repository.
    ///
    /// This is enabled by default.
    pub honor_gitignore: bool,
}

impl<'a> WalkOptions<'a> {
    #[must_use]
    pub const fn new() -> WalkOptions<'a> {
        WalkOptions {
            ignore_filename: ".export-ignore",
            ignore_hidden: true,
            honor_gitignore: true,
        }
    }

    fn build_walker(self, path: &Path) -> Walk {
        WalkBuilder::new(path)
            .standard_filters(false)
            .parents(true)
            .hidden(self.ignore_hidden)
            .add_custom_ignore_filename(self.ignore_filename)
            .require_git(true)
            .git_ignore(self.honor_gitignore)
            .git_global(self.honor_gitignore)
            .git_exclude(self.honor_gitignore)
            .build()
    }
}

impl Default for WalkOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Vault`] backed by a directory tree on disk.
#[derive(Debug, Clone)]
pub struct DirectoryVault {
    root: PathBuf,
    files: Vec<FileHandle>,
}

impl DirectoryVault {
    /// Enumerate `root` and build the index.
    ///
    /// The contents are sorted by vault-relative path so enumeration order
    /// is stable across platforms and filesystems.
    pub fn open(root: &Path, options: WalkOptions<'_>) -> Result<Self> {
        let root = root
            .canonicalize()
            .ok()
            .unwrap_or_else(|| root.to_path_buf());
        let mut files = Vec::new();
        for entry in options.build_walker(&root) {
            let entry = entry.context(WalkDirSnafu { path: &root })?;
            let path = entry.path();
            let metadata = entry.metadata().context(WalkDirSnafu { path })?;
            if metadata.is_dir() {
                continue;
            }
            files.push(FileHandle::new(path.to_path_buf(), &root));
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(Self { root, files })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Vault for DirectoryVault {
    fn resolve_by_link_convention(&self, name: &str, source: &Path) -> Option<&FileHandle> {
        let wanted = name.replace('\\', "/");
        let wanted_md = format!("{wanted}.md");

        // A pathed reference is anchored at the vault root.
        if wanted.contains('/') {
            return self.files.iter().find(|file| {
                let relative = file.relative.to_string_lossy().replace('\\', "/");
                relative == wanted || relative == wanted_md
            });
        }

        let name_matches =
            |file: &FileHandle| file.name == wanted || file.name == wanted_md;

        // Files sharing the source note's folder shadow files elsewhere.
        let folder = source.parent();
        if let Some(found) = self
            .files
            .iter()
            .find(|file| file.relative.parent() == folder && name_matches(file))
        {
            return Some(found);
        }

        // Otherwise the match with the shortest path wins; `files` is
        // sorted, so equal depths tie-break deterministically.
        self.files
            .iter()
            .filter(|file| name_matches(file))
            .min_by_key(|file| file.relative.components().count())
    }

    fn files(&self) -> &[FileHandle] {
        &self.files
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn absolute_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    fn relative_path(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(&self.root)
            .map_or_else(|_| absolute.to_path_buf(), Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn vault_with(files: &[&str]) -> (TempDir, DirectoryVault) {
        let tmp_dir = TempDir::new().expect("failed to make tempdir");
        for file in files {
            let path = tmp_dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "content\n").unwrap();
        }
        let vault = DirectoryVault::open(tmp_dir.path(), WalkOptions::default()).unwrap();
        (tmp_dir, vault)
    }

    #[test]
    fn enumeration_is_sorted_by_relative_path() {
        let (_tmp, vault) = vault_with(&["b.md", "a/nested.md", "a.md"]);
        let relative: Vec<_> = vault
            .files()
            .iter()
            .map(|f| f.relative.to_string_lossy().into_owned())
            .collect();
        // Path ordering is component-wise, so `a/` sorts before `a.md`.
        assert_eq!(relative, vec!["a/nested.md", "a.md", "b.md"]);
    }

    #[test]
    fn convention_prefers_same_folder() {
        let (_tmp, vault) = vault_with(&["Note.md", "sub/Note.md", "sub/Source.md"]);
        let found = vault
            .resolve_by_link_convention("Note", Path::new("sub/Source.md"))
            .unwrap();
        assert_eq!(found.relative, PathBuf::from("sub/Note.md"));
    }

    #[test]
    fn convention_falls_back_to_shortest_path() {
        let (_tmp, vault) = vault_with(&["deep/down/Note.md", "shallow/Note.md", "Source.md"]);
        let found = vault
            .resolve_by_link_convention("Note", Path::new("Source.md"))
            .unwrap();
        assert_eq!(found.relative, PathBuf::from("shallow/Note.md"));
    }

    #[test]
    fn pathed_references_anchor_at_the_root() {
        let (_tmp, vault) = vault_with(&["sub/Note.md", "Note.md"]);
        let found = vault
            .resolve_by_link_convention("sub/Note", Path::new("Source.md"))
            .unwrap();
        assert_eq!(found.relative, PathBuf::from("sub/Note.md"));
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let (_tmp, vault) = vault_with(&["Note.md"]);
        assert_eq!(
            vault.resolve_by_link_convention("Missing", Path::new("Note.md")),
            None
        );
    }
}
