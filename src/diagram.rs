//! Vector diagram conversion.
//!
//! Inline SVG diagrams reference the stylesheet and anchor namespace of the
//! document they were born in. Before a fragment leaves that context, each
//! diagram gets the theme CSS folded into its own markup and its
//! self-referencing marker URIs normalized. For output formats that cannot
//! embed vector markup, the diagram is then rasterized to a PNG data URI
//! through the [`DiagramRasterizer`] collaborator, a blocking call which
//! must either produce bytes or an explicit error.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use snafu::{ResultExt, Snafu};
use tracing::warn;

use crate::fragment::{DocumentFragment, Edit, Element, ElementKind, Node};
use crate::OutputFormat;

/// Matches the prefix of a `url(...)` reference up to an internal `#`
/// anchor, so `url(https://host/doc#marker)` can be reduced to
/// `url(#marker)`.
static MARKER_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*(['"]?)[^)#'"]*#"#).unwrap());

#[derive(Debug, Snafu)]
#[non_exhaustive]
/// Raised when a diagram cannot be converted to a raster image.
pub enum RasterizeError {
    #[snafu(display("failed to parse SVG markup"))]
    /// The diagram markup was not valid SVG.
    InvalidSvg { source: usvg::Error },

    #[snafu(display("cannot allocate a {width}x{height} pixel surface"))]
    /// The pixel surface for the requested size could not be allocated.
    SurfaceAllocation { width: u32, height: u32 },

    #[snafu(display("failed to encode PNG output: {message}"))]
    /// The rendered surface could not be encoded as PNG.
    PngEncoding { message: String },
}

/// An encoded raster image along with its logical (CSS pixel) dimensions.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Collaborator converting SVG markup into an encoded raster image.
///
/// Implementations are called synchronously from tree traversal and must
/// resolve every request with bytes or an error rather than leave the
/// render suspended.
pub trait DiagramRasterizer: Send + Sync {
    fn rasterize(&self, svg: &str, pixel_ratio: u32) -> Result<RasterImage, RasterizeError>;
}

/// The bundled [`DiagramRasterizer`], rendering through `usvg`/`resvg`.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct ResvgRasterizer;

impl DiagramRasterizer for ResvgRasterizer {
    fn rasterize(&self, svg: &str, pixel_ratio: u32) -> Result<RasterImage, RasterizeError> {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();

        let tree = usvg::Tree::from_str(svg, &options).context(InvalidSvgSnafu)?;
        let size = tree.size().to_int_size();
        let (width, height) = (size.width(), size.height());

        let mut pixmap = resvg::tiny_skia::Pixmap::new(
            width.saturating_mul(pixel_ratio),
            height.saturating_mul(pixel_ratio),
        )
        .ok_or(RasterizeError::SurfaceAllocation { width, height })?;
        let mut surface = pixmap.as_mut();
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::from_scale(pixel_ratio as f32, pixel_ratio as f32),
            &mut surface,
        );

        let png = pixmap
            .encode_png()
            .map_err(|error| RasterizeError::PngEncoding {
                message: error.to_string(),
            })?;
        Ok(RasterImage { png, width, height })
    }
}

/// Fold `css` into the diagram's own markup, right after the opening
/// `<svg>` tag, so the diagram stays legible once detached from the
/// document that styled it.
#[must_use]
pub(crate) fn inject_style(svg: &str, css: &str) -> String {
    if css.is_empty() {
        return svg.to_owned();
    }
    let Some(open_start) = svg.find("<svg") else {
        return svg.to_owned();
    };
    let Some(open_end) = svg[open_start..].find('>') else {
        return svg.to_owned();
    };
    let insert_at = open_start + open_end + 1;
    format!(
        "{}<style>{}</style>{}",
        &svg[..insert_at],
        css,
        &svg[insert_at..]
    )
}

/// Reduce absolute self-references like `url(https://host/doc#arrow)` to
/// bare `url(#arrow)` anchors that stay valid outside the original
/// document.
#[must_use]
pub(crate) fn normalize_marker_refs(svg: &str) -> String {
    MARKER_REF_RE.replace_all(svg, "url($1#").into_owned()
}

/// Prepare every diagram in the fragment for the given output format.
///
/// Already-processed diagrams (marked during recursive embed expansion)
/// are skipped on re-traversal. Rasterization failure is logged and leaves
/// the styled vector markup in place; it never aborts the render.
pub(crate) fn process_diagrams(
    fragment: &mut DocumentFragment,
    format: OutputFormat,
    theme_css: &str,
    hidpi: bool,
    rasterizer: &dyn DiagramRasterizer,
) {
    let pixel_ratio = if hidpi { 2 } else { 1 };
    fragment.rewrite(&mut |element| {
        if element.kind != ElementKind::Diagram || element.attr("data-processed").is_some() {
            return Edit::Keep;
        }
        let svg = match element.children.first() {
            Some(Node::Raw(markup)) => markup.clone(),
            _ => return Edit::Keep,
        };
        let svg = inject_style(&normalize_marker_refs(&svg), theme_css);

        if !format.is_html() {
            match rasterizer.rasterize(&svg, pixel_ratio) {
                Ok(image) => {
                    let uri = format!("data:image/png;base64,{}", BASE64.encode(&image.png));
                    return Edit::Replace(vec![Node::Element(
                        Element::new(ElementKind::Image)
                            .with_attr("src", uri)
                            .with_attr("width", image.width.to_string())
                            .with_attr("height", image.height.to_string()),
                    )]);
                }
                Err(error) => {
                    warn!(%error, "diagram rasterization failed, leaving vector markup in place");
                }
            }
        }

        element.children = vec![Node::Raw(svg)];
        element.set_attr("data-processed", "true");
        Edit::Keep
    });
}
