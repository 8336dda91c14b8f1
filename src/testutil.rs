//! Shared helpers for unit tests.

use std::io;
use std::path::{Path, PathBuf};

use crate::vault::{FileHandle, Vault};

/// An in-memory vault with no native link conventions, forcing every
/// resolution through the fallback scan. Files live under a fictional
/// `/vault` root and read as empty unless contents are provided.
pub struct FlatVault {
    files: Vec<FileHandle>,
    contents: Vec<(PathBuf, String)>,
}

impl FlatVault {
    pub fn new(paths: &[&str]) -> Self {
        let files = paths
            .iter()
            .map(|path| {
                let relative = PathBuf::from(path);
                FileHandle {
                    absolute: PathBuf::from("/vault").join(&relative),
                    name: relative
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    base: relative
                        .file_stem()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    relative,
                }
            })
            .collect();
        Self {
            files,
            contents: Vec::new(),
        }
    }

    pub fn with_content(mut self, relative: &str, content: &str) -> Self {
        self.contents
            .push((PathBuf::from("/vault").join(relative), content.to_owned()));
        self
    }
}

impl Vault for FlatVault {
    fn resolve_by_link_convention(&self, _name: &str, _source: &Path) -> Option<&FileHandle> {
        None
    }

    fn files(&self) -> &[FileHandle] {
        &self.files
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.contents
            .iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn absolute_path(&self, relative: &Path) -> PathBuf {
        PathBuf::from("/vault").join(relative)
    }

    fn relative_path(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix("/vault")
            .map_or_else(|_| absolute.to_path_buf(), Path::to_path_buf)
    }
}
