//! Reference-to-file resolution.
//!
//! Resolution runs as an ordered list of attempts, each checked explicitly
//! before the next is tried:
//!
//! 1. The vault's own link conventions
//!    ([`Vault::resolve_by_link_convention`]), scoped to the source note's
//!    folder.
//! 2. A vault-wide scan in four priority passes: exact file name, exact
//!    base name, path suffix, case-insensitive name.
//!
//! All comparisons apply Unicode normalization form C
//! (<https://www.w3.org/TR/charmod-norm/#unicodeNormalization>) so that
//! visually identical references with different encodings find the same
//! file. Ties within a pass are broken by first-encountered order, which is
//! deterministic because [`Vault::files`] enumerates in sorted order.

use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::vault::{FileHandle, Vault};

/// The result of resolving a [`NoteReference`][crate::NoteReference]:
/// a file that existed at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Absolute filesystem path.
    pub absolute: PathBuf,
    /// Vault-relative path.
    pub relative: PathBuf,
    /// File name with the extension stripped.
    pub base: String,
    /// Human-readable name used when link text must be synthesized.
    pub display: String,
}

impl From<&FileHandle> for ResolvedFile {
    fn from(handle: &FileHandle) -> Self {
        Self {
            absolute: handle.absolute.clone(),
            relative: handle.relative.clone(),
            base: handle.base.clone(),
            display: handle.base.clone(),
        }
    }
}

/// Resolve `reference` from the note at vault-relative path `source`.
///
/// Returns `None` when no file matches; callers must leave the original
/// reference syntax untouched rather than produce a broken link.
#[must_use]
pub fn resolve(vault: &dyn Vault, reference: &str, source: &Path) -> Option<ResolvedFile> {
    if let Some(handle) = vault.resolve_by_link_convention(reference, source) {
        return Some(handle.into());
    }
    scan_vault(vault.files(), reference).map(ResolvedFile::from)
}

fn scan_vault<'a>(files: &'a [FileHandle], reference: &str) -> Option<&'a FileHandle> {
    let wanted = nfc(reference).replace('\\', "/");
    let wanted_lower = wanted.to_lowercase();

    files
        .iter()
        .find(|file| nfc(&file.name) == wanted)
        .or_else(|| files.iter().find(|file| nfc(&file.base) == wanted))
        .or_else(|| {
            files.iter().find(|file| {
                let relative = nfc(&file.relative.to_string_lossy()).replace('\\', "/");
                let absolute = nfc(&file.absolute.to_string_lossy()).replace('\\', "/");
                suffix_matches(&relative, &wanted)
                    || absolute == wanted
                    || strip_extension(&relative)
                        .is_some_and(|stripped| suffix_matches(stripped, &wanted))
            })
        })
        .or_else(|| {
            files.iter().find(|file| {
                nfc(&file.name).to_lowercase() == wanted_lower
                    || nfc(&file.base).to_lowercase() == wanted_lower
            })
        })
}

fn nfc(input: &str) -> String {
    input.nfc().collect()
}

/// Suffix comparison on path component boundaries, so `te.md` does not
/// match `Note.md`.
fn suffix_matches(path: &str, wanted: &str) -> bool {
    path == wanted || path.ends_with(&format!("/{wanted}"))
}

fn strip_extension(path: &str) -> Option<&str> {
    let dot = path.rfind('.')?;
    if path[dot..].contains('/') {
        return None;
    }
    Some(&path[..dot])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FlatVault;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::LazyLock;

    static VAULT: LazyLock<FlatVault> = LazyLock::new(|| {
        FlatVault::new(&[
            "NoteA.md",
            "Document.pdf",
            "Note.1.md",
            "nested/NoteA.md",
            "Note\u{E4}.md", // Noteä.md
        ])
    });

    #[rstest]
    // Exact match
    #[case("NoteA.md", "NoteA.md")]
    #[case("NoteA", "NoteA.md")]
    // Same note in subdir; a pathed reference should find it
    #[case("nested/NoteA.md", "nested/NoteA.md")]
    #[case("nested/NoteA", "nested/NoteA.md")]
    // Different extensions
    #[case("Document.pdf", "Document.pdf")]
    #[case("Note.1", "Note.1.md")]
    #[case("Note.1.md", "Note.1.md")]
    // Case-insensitive matches
    #[case("notea.md", "NoteA.md")]
    #[case("notea", "NoteA.md")]
    // "Latin Small Letter A with Diaeresis" (U+00E4)
    #[case("Note\u{E4}.md", "Note\u{E4}.md")]
    #[case("Note\u{E4}", "Note\u{E4}.md")]
    // ASCII a followed by combining diaeresis (U+0308); different encoding,
    // same rendering, so it should find the same file.
    #[case("Note\u{61}\u{308}.md", "Note\u{E4}.md")]
    #[case("Note\u{61}\u{308}", "Note\u{E4}.md")]
    fn resolves_against_vault_scan(#[case] input: &str, #[case] expected: &str) {
        let resolved = resolve(&*VAULT, input, Path::new("Source.md")).unwrap();
        assert_eq!(resolved.relative, PathBuf::from(expected));
    }

    #[test]
    fn resolution_failure_returns_none() {
        assert_eq!(resolve(&*VAULT, "no-such-note", Path::new("Source.md")), None);
    }

    #[test]
    fn first_encountered_order_breaks_ties() {
        let vault = FlatVault::new(&["a/Twin.md", "b/Twin.md"]);
        let resolved = resolve(&vault, "Twin", Path::new("Source.md")).unwrap();
        assert_eq!(resolved.relative, PathBuf::from("a/Twin.md"));
    }

    #[test]
    fn resolved_file_carries_base_and_display_names() {
        let resolved = resolve(&*VAULT, "nested/NoteA", Path::new("Source.md")).unwrap();
        assert_eq!(resolved.base, "NoteA");
        assert_eq!(resolved.display, "NoteA");
        assert_eq!(resolved.absolute, PathBuf::from("/vault/nested/NoteA.md"));
    }

    #[test]
    fn suffix_matching_respects_component_boundaries() {
        let vault = FlatVault::new(&["Note.md"]);
        assert_eq!(resolve(&vault, "te.md", Path::new("Source.md")), None);
    }
}
