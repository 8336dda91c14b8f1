use std::path::{Path, PathBuf};

use crate::OutputFormat;

/// `RenderContext` is the state threaded through one top-level render.
///
/// It tracks the chain of notes currently being expanded, which is how the
/// embed expander detects cycles, and the output format the render targets.
/// Descending into an embedded note extends a copy; an in-flight recursion
/// never observes a sibling's ancestry.
#[derive(Debug, Clone)]
pub struct RenderContext {
    file_tree: Vec<PathBuf>,
    /// The output format this render targets.
    pub format: OutputFormat,
}

impl RenderContext {
    /// Create a context for a top-level render of `src`.
    #[inline]
    #[must_use]
    pub fn new(src: PathBuf, format: OutputFormat) -> Self {
        Self {
            file_tree: vec![src],
            format,
        }
    }

    /// Create a context which inherits from a parent context, extended with
    /// the embedded note now being entered.
    #[inline]
    #[must_use]
    pub fn from_parent(context: &Self, child: &Path) -> Self {
        let mut context = context.clone();
        context.file_tree.push(child.to_path_buf());
        context
    }

    /// The absolute path of the note currently being rendered.
    #[inline]
    #[must_use]
    pub fn current_file(&self) -> &PathBuf {
        self.file_tree
            .last()
            .expect("context not initialized properly, file_tree is empty")
    }

    /// The absolute path of the root (outer-most) note.
    ///
    /// Typically this yields the same element as `current_file`, but when a
    /// note is embedded within another note, this returns the outer-most
    /// note.
    #[inline]
    #[must_use]
    pub fn root_file(&self) -> &PathBuf {
        self.file_tree
            .first()
            .expect("context not initialized properly, file_tree is empty")
    }

    /// Whether this context belongs to a top-level (non-embedded) render.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.file_tree.len() == 1
    }

    /// Whether `path` is already being expanded somewhere up the chain;
    /// embedding it again would recurse forever.
    #[inline]
    #[must_use]
    pub fn is_ancestor(&self, path: &Path) -> bool {
        self.file_tree.iter().any(|ancestor| ancestor == path)
    }

    /// The chain of files associated with this context, root first,
    /// current file last.
    #[inline]
    #[must_use]
    pub fn file_tree(&self) -> Vec<PathBuf> {
        self.file_tree.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_contexts_extend_a_copy_of_the_ancestry() {
        let root = RenderContext::new(PathBuf::from("/v/A.md"), OutputFormat::Pdf);
        let child = RenderContext::from_parent(&root, Path::new("/v/B.md"));

        assert!(child.is_ancestor(Path::new("/v/A.md")));
        assert!(child.is_ancestor(Path::new("/v/B.md")));
        assert!(!root.is_ancestor(Path::new("/v/B.md")));
        assert_eq!(child.current_file(), &PathBuf::from("/v/B.md"));
        assert_eq!(child.root_file(), &PathBuf::from("/v/A.md"));
        assert!(root.is_root());
        assert!(!child.is_root());
    }
}
