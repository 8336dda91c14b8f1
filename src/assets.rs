//! Asset reference rewriting.
//!
//! Two passes make image references portable. The pre-render pass runs on
//! raw markdown, only for the plain-markdown target (which bypasses the
//! rendering engine's own image handling), and turns `![[image|WxH]]`
//! tokens into standard image references with `file://` URIs. The
//! post-render pass runs on the rendered tree and promotes embedded-note
//! elements that actually point at raster images into true image elements.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::fragment::{DocumentFragment, Edit, Element, ElementKind, Node};
use crate::reference::NoteReference;
use crate::resolve::resolve;
use crate::vault::Vault;

static EMBED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\[([^\[\]]+?)\]\]").unwrap());

/// Extensions the pre-render pass treats as images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "bmp", "webp"];

/// Extensions the post-render pass promotes to `<img>` elements. SVG stays
/// an embed; vector markup is the diagram rasterizer's concern.
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Build a converter-readable `file://` URI for an absolute path,
/// forward-slash normalized for cross-platform safety.
#[must_use]
pub(crate) fn file_uri(path: &Path) -> String {
    let mut path = path.to_string_lossy().replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    format!("file://{path}")
}

fn has_extension_in(path: &str, extensions: &[&str]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        })
}

/// Pre-render pass: rewrite `![[<name>[|<w>[x<h>]]]]` image-embed tokens in
/// raw markdown into `![<name>](file://<abs>){width=<w>px height=<h>px}`.
///
/// Unresolved references and non-image targets are left exactly as
/// written. Replacement is exact-substring, first-match, applied once per
/// occurrence: a reference text repeated verbatim elsewhere with a
/// different intended target is a known limitation.
#[must_use]
pub fn rewrite_image_embeds(markdown: &str, vault: &dyn Vault, source: &Path) -> String {
    let mut rewritten = markdown.to_owned();
    for captures in EMBED_TOKEN_RE.captures_iter(markdown) {
        let token = captures.get(0).expect("capture 0 is the whole match").as_str();
        let reference = NoteReference::from_str(&captures[1]);
        let Some(file) = reference.file else {
            continue;
        };
        let Some(resolved) = resolve(vault, file, source) else {
            continue;
        };
        if !has_extension_in(&resolved.relative.to_string_lossy(), IMAGE_EXTENSIONS) {
            continue;
        }

        let mut replacement = format!("![{file}]({})", file_uri(&resolved.absolute));
        if let Some(size) = reference.image_size() {
            match size.height {
                Some(height) => {
                    replacement
                        .push_str(&format!("{{width={}px height={height}px}}", size.width));
                }
                None => replacement.push_str(&format!("{{width={}px}}", size.width)),
            }
        }
        rewritten = rewritten.replacen(token, &replacement, 1);
    }
    rewritten
}

/// Post-render pass: promote embedded-note elements whose source is a
/// raster image to true image elements, discarding their inner content.
///
/// The image source becomes the `file://` URI of the resolved target; an
/// unresolved source is carried over verbatim so no information is lost.
pub fn promote_image_embeds(fragment: &mut DocumentFragment, vault: &dyn Vault, source: &Path) {
    fragment.rewrite(&mut |element| {
        if element.kind != ElementKind::EmbeddedNote {
            return Edit::Keep;
        }
        let Some(src) = element.attr("src") else {
            return Edit::Keep;
        };
        if !has_extension_in(src, RASTER_EXTENSIONS) {
            return Edit::Keep;
        }

        let (uri, alt) = match resolve(vault, src, source) {
            Some(resolved) => (file_uri(&resolved.absolute), resolved.display),
            None => (
                src.to_owned(),
                Path::new(src)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        };

        let mut image = Element::new(ElementKind::Image)
            .with_attr("src", uri)
            .with_attr("alt", alt);
        for dimension in ["width", "height"] {
            if let Some(value) = element.attr(dimension) {
                image.set_attr(dimension, value.to_owned());
            }
        }
        Edit::Replace(vec![Node::Element(image)])
    });
}
