//! Internal hyperlink finalization.
//!
//! The renderer leaves internal cross-note links carrying the
//! [`INTERNAL_LINK_SCHEME`] URI scheme; this pass converts them into their
//! final form according to the configured [`LinkPolicy`]. External links
//! pass through untouched.

use std::mem;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use slug::slugify;

use crate::context::RenderContext;
use crate::fragment::{DocumentFragment, Edit, ElementKind, Node};
use crate::reference::NoteReference;
use crate::resolve::resolve;
use crate::vault::Vault;

/// URI scheme marking a hyperlink as internal to the knowledge base.
pub const INTERNAL_LINK_SCHEME: &str = "vault://";

/// What to do with internal cross-note links in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkPolicy {
    /// Keep the link, rewriting its target to an absolute path (or a
    /// current-folder guess when the target cannot be resolved).
    #[default]
    KeepAsLink,
    /// Remove the link element entirely, including its visible text.
    Strip,
    /// Replace the link element with its plain visible text.
    TextOnly,
    /// Reconstruct literal `[[...]]` wiki-link notation around the link's
    /// inner markup.
    Literal,
}

/// Apply the link policy to every internal link in the fragment.
///
/// The HTML output format always keeps links as links, regardless of the
/// configured policy: an HTML document loses nothing by staying navigable.
pub fn rewrite_links(
    fragment: &mut DocumentFragment,
    vault: &dyn Vault,
    context: &RenderContext,
    policy: LinkPolicy,
    extension: &str,
) {
    let policy = if context.format.is_html() {
        LinkPolicy::KeepAsLink
    } else {
        policy
    };

    fragment.rewrite(&mut |element| {
        if element.kind != ElementKind::Link {
            return Edit::Keep;
        }
        let Some(href) = element.attr("href") else {
            return Edit::Keep;
        };
        let Some(encoded) = href.strip_prefix(INTERNAL_LINK_SCHEME) else {
            return Edit::Keep;
        };

        match policy {
            LinkPolicy::KeepAsLink => {
                let decoded = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
                let href = final_href(vault, context, &decoded, extension);
                element.set_attr("href", href);
                Edit::Keep
            }
            LinkPolicy::Strip => Edit::Remove,
            LinkPolicy::TextOnly => Edit::Replace(vec![Node::Text(element.plain_text())]),
            LinkPolicy::Literal => {
                let mut nodes = Vec::with_capacity(element.children.len() + 2);
                nodes.push(Node::Text("[[".to_owned()));
                nodes.append(&mut mem::take(&mut element.children));
                nodes.push(Node::Text("]]".to_owned()));
                Edit::Replace(nodes)
            }
        }
    });
}

/// Compute the final href for an internal reference under `keep-as-link`.
fn final_href(
    vault: &dyn Vault,
    context: &RenderContext,
    reference: &str,
    extension: &str,
) -> String {
    let reference = NoteReference::from_str(reference);
    let section = reference.section.map(|section| slugify(section));

    let target = reference.file.map(|file| {
        let source = vault.relative_path(context.current_file());
        resolve(vault, file, &source).map_or_else(
            || {
                // Unresolved: guess a path relative to the current note's
                // folder rather than emit a dangling internal URI.
                let folder = context
                    .current_file()
                    .parent()
                    .unwrap_or_else(|| Path::new(""));
                with_link_extension(folder.join(file), extension)
            },
            |resolved| with_link_extension(resolved.absolute, extension),
        )
    });

    let base = target.map(|path| path.to_string_lossy().replace('\\', "/"));
    match (base, section) {
        (Some(base), Some(section)) => format!("{base}#{section}"),
        (Some(base), None) => base,
        (None, Some(section)) => format!("#{section}"),
        (None, None) => "#".to_owned(),
    }
}

fn with_link_extension(path: PathBuf, extension: &str) -> PathBuf {
    if extension.is_empty() || path.extension().is_some() {
        return path;
    }
    let mut path = path.into_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}
