//! Flatten knowledge-base notes into portable, self-contained HTML.
//!
//! A note inside a vault leans on the vault for everything: wiki-style
//! links are resolved against a global index, embedded notes are inlined at
//! view time, images live wherever the vault keeps them, and diagrams are
//! styled by the application around them. This crate reconciles that
//! linking model with a flat document model so an external converter
//! (PDF, DOCX, ...) can consume a single self-contained HTML file.
//!
//! [`Exporter`] is the main interface. Users are expected to create one
//! with [`Exporter::new`], optionally customize it through its builder
//! methods, and then either render a single note with
//! [`Exporter::render_note`] or export every note in the vault with
//! [`Exporter::run`].
//!
//! ```no_run
//! use portadoc::{Exporter, OutputFormat};
//! use std::path::{Path, PathBuf};
//!
//! let mut exporter = Exporter::new(PathBuf::from("my-vault"), PathBuf::from("export"));
//! let rendered = exporter.render_note(Path::new("Note.md"), OutputFormat::Pdf)?;
//! println!("{}", rendered.html);
//! # Ok::<(), portadoc::ExportError>(())
//! ```
//!
//! The markdown renderer, the vault index and the diagram rasterizer are
//! collaborator traits ([`NoteRenderer`], [`Vault`], [`DiagramRasterizer`])
//! with bundled default implementations, so the pipeline can be embedded
//! into applications that bring their own.

pub extern crate pulldown_cmark;
pub extern crate serde_yaml;

mod assemble;
mod assets;
mod context;
mod diagram;
mod fragment;
mod frontmatter;
mod links;
mod reference;
mod render;
mod resolve;
#[cfg(test)]
mod testutil;
mod vault;

pub use assemble::{AssembledDocument, CssInjection};
pub use context::RenderContext;
pub use diagram::{DiagramRasterizer, RasterImage, RasterizeError, ResvgRasterizer};
pub use fragment::{DocumentFragment, Edit, Element, ElementKind, Node};
pub use frontmatter::Frontmatter;
pub use links::{LinkPolicy, INTERNAL_LINK_SCHEME};
pub use reference::NoteReference;
pub use render::{CmarkRenderer, NoteRenderer};
pub use resolve::{resolve, ResolvedFile};
pub use vault::{DirectoryVault, FileHandle, Vault, WalkOptions};

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

type Result<T, E = ExportError> = std::result::Result<T, E>;

#[non_exhaustive]
#[derive(Debug, Snafu)]
/// `ExportError` represents all errors which may be returned when using
/// this crate.
///
/// Per-element failures (an unresolvable reference, a failed embed
/// expansion, a diagram that would not rasterize) are absorbed where they
/// occur; only top-level orchestration failures surface here.
pub enum ExportError {
    #[snafu(display("failed to read from '{}'", path.display()))]
    /// This occurs when a read IO operation fails.
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write to '{}'", path.display()))]
    /// This occurs when a write IO operation fails.
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Encountered an error while trying to walk '{}'", path.display()))]
    /// This occurs when an error is encountered while trying to walk a
    /// vault directory.
    WalkDirError {
        path: PathBuf,
        source: ignore::Error,
    },

    #[snafu(display("No such file or directory: {}", path.display()))]
    /// This occurs when an operation is requested on a file or directory
    /// which does not exist.
    PathDoesNotExist { path: PathBuf },

    #[snafu(display("Failed to export '{}'", path.display()))]
    /// This occurs when a note fails to export successfully.
    FileExportError {
        path: PathBuf,
        #[snafu(source(from(ExportError, Box::new)))]
        source: Box<ExportError>,
    },

    #[snafu(display("Failed to decode YAML front matter in '{}'", path.display()))]
    FrontMatterDecodeError {
        path: PathBuf,
        #[snafu(source(from(serde_yaml::Error, Box::new)))]
        source: Box<serde_yaml::Error>,
    },
}

/// The output format a render targets.
///
/// `Html` keeps vector markup and navigable links; every other format gets
/// rasterized diagrams and policy-driven link rewriting. `Markdown` is the
/// plain-text mode which additionally rewrites image embeds in the raw
/// markdown, before the rendering engine ever sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutputFormat {
    #[default]
    Html,
    Pdf,
    Docx,
    Epub,
    Markdown,
}

impl OutputFormat {
    #[must_use]
    pub const fn is_html(self) -> bool {
        matches!(self, Self::Html)
    }

    /// Whether the rendering engine's own image handling covers this
    /// format. The plain-markdown mode bypasses it and relies on the
    /// pre-render asset pass instead.
    #[must_use]
    pub const fn uses_renderer_image_handling(self) -> bool {
        !matches!(self, Self::Markdown)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Epub => "epub",
            Self::Markdown => "markdown",
        }
    }
}

/// What a top-level render returns: the standalone HTML document and the
/// note's front matter flattened into a string-to-string mapping.
#[derive(Debug, Clone)]
pub struct RenderedNote {
    pub html: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone)]
/// Exporter provides the main interface to this library.
///
/// Users are expected to create an Exporter using [`Exporter::new`],
/// optionally followed by customization through the builder methods.
///
/// After that, calling [`Exporter::run`] will export every note under the
/// vault root, while [`Exporter::render_note`] renders a single note
/// in-memory.
pub struct Exporter<'a> {
    root: PathBuf,
    destination: PathBuf,
    format: OutputFormat,
    link_policy: LinkPolicy,
    css_injection: CssInjection,
    app_css: String,
    link_extension: String,
    hidpi_diagrams: bool,
    custom_css: Option<PathBuf>,
    walk_options: WalkOptions<'a>,
    vault: Option<Arc<dyn Vault>>,
    renderer: Arc<dyn NoteRenderer>,
    rasterizer: Arc<dyn DiagramRasterizer>,
}

impl fmt::Debug for Exporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("root", &self.root)
            .field("destination", &self.destination)
            .field("format", &self.format)
            .field("link_policy", &self.link_policy)
            .field("css_injection", &self.css_injection)
            .field("link_extension", &self.link_extension)
            .field("hidpi_diagrams", &self.hidpi_diagrams)
            .field("custom_css", &self.custom_css)
            .field("walk_options", &self.walk_options)
            .field("vault", &self.vault.as_ref().map(|v| v.files().len()))
            .finish_non_exhaustive()
    }
}

impl<'a> Exporter<'a> {
    /// Create a new exporter which renders notes under `root` and exports
    /// them to `destination`.
    #[must_use]
    pub fn new(root: PathBuf, destination: PathBuf) -> Exporter<'a> {
        Exporter {
            root,
            destination,
            format: OutputFormat::default(),
            link_policy: LinkPolicy::default(),
            css_injection: CssInjection::default(),
            app_css: String::new(),
            link_extension: String::new(),
            hidpi_diagrams: false,
            custom_css: None,
            walk_options: WalkOptions::default(),
            vault: None,
            renderer: Arc::new(CmarkRenderer),
            rasterizer: Arc::new(ResvgRasterizer),
        }
    }

    /// Set the output format used by [`Exporter::run`].
    pub fn output_format(&mut self, format: OutputFormat) -> &mut Exporter<'a> {
        self.format = format;
        self
    }

    /// Set the [`LinkPolicy`] applied to internal links.
    pub fn link_policy(&mut self, policy: LinkPolicy) -> &mut Exporter<'a> {
        self.link_policy = policy;
        self
    }

    /// Set the [`CssInjection`] mode for standalone documents.
    pub fn css_injection(&mut self, mode: CssInjection) -> &mut Exporter<'a> {
        self.css_injection = mode;
        self
    }

    /// Provide the application stylesheet used by
    /// [`CssInjection::CurrentTheme`].
    pub fn current_theme_css(&mut self, css: String) -> &mut Exporter<'a> {
        self.app_css = css;
        self
    }

    /// Extension to append to rewritten internal links whose target has
    /// none (e.g. `"md"` or `"html"`). Empty appends nothing.
    pub fn link_extension(&mut self, extension: String) -> &mut Exporter<'a> {
        self.link_extension = extension;
        self
    }

    /// Rasterize diagrams at 2x pixel density for high-DPI output.
    pub fn hidpi_diagrams(&mut self, hidpi: bool) -> &mut Exporter<'a> {
        self.hidpi_diagrams = hidpi;
        self
    }

    /// Concatenate a user-supplied stylesheet, read from an absolute or
    /// vault-relative path, into standalone documents.
    pub fn custom_css_file(&mut self, path: Option<PathBuf>) -> &mut Exporter<'a> {
        self.custom_css = path;
        self
    }

    /// Set the [`WalkOptions`] used when enumerating the vault.
    pub fn walk_options(&mut self, options: WalkOptions<'a>) -> &mut Exporter<'a> {
        self.walk_options = options;
        self
    }

    /// Replace the vault index collaborator. By default a
    /// [`DirectoryVault`] is built from the export root on first use.
    pub fn with_vault(&mut self, vault: Arc<dyn Vault>) -> &mut Exporter<'a> {
        self.vault = Some(vault);
        self
    }

    /// Replace the markdown rendering collaborator.
    pub fn with_renderer(&mut self, renderer: Arc<dyn NoteRenderer>) -> &mut Exporter<'a> {
        self.renderer = renderer;
        self
    }

    /// Replace the diagram rasterization collaborator.
    pub fn with_rasterizer(&mut self, rasterizer: Arc<dyn DiagramRasterizer>) -> &mut Exporter<'a> {
        self.rasterizer = rasterizer;
        self
    }

    /// Export every markdown note under the vault root as a standalone
    /// HTML document beneath the destination directory.
    ///
    /// Notes are independent of each other, so they are rendered in
    /// parallel; each render owns its fragment and context outright.
    pub fn run(&mut self) -> Result<()> {
        if !self.root.exists() {
            return PathDoesNotExistSnafu { path: &self.root }.fail();
        }
        self.ensure_vault()?;
        let vault = self.vault.clone().expect("vault was just ensured");

        // When a single file is specified, export just that note. This also
        // allows accepting the destination as either a file or a directory.
        if self.root.is_file() {
            let source = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
            let destination = if self.destination.is_dir() {
                let name = source
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.destination.join(format!("{name}.html"))
            } else {
                let parent = self.destination.parent().unwrap_or(&self.destination);
                if !parent.exists() {
                    return PathDoesNotExistSnafu { path: parent }.fail();
                }
                self.destination.clone()
            };
            return self.export_note(&source, &destination);
        }

        if !self.destination.exists() {
            return PathDoesNotExistSnafu { path: &self.destination }.fail();
        }
        vault
            .files()
            .to_vec()
            .into_par_iter()
            .filter(|file| is_markdown_file(&file.relative))
            .try_for_each(|file| {
                let destination = self.destination.join(file.relative.with_extension("html"));
                self.export_note(&file.absolute, &destination)
            })
    }

    /// Render a single note into a standalone document, returning the
    /// serialized HTML and the note's front matter metadata.
    ///
    /// This is the top-level entry into the pipeline: the ancestor chain
    /// starts empty and the document assembler runs. Relative paths are
    /// taken as vault-relative.
    pub fn render_note(&mut self, source: &Path, format: OutputFormat) -> Result<RenderedNote> {
        self.ensure_vault()?;
        let vault = self.vault.as_ref().expect("vault was just ensured");
        let source = if source.is_absolute() {
            source.canonicalize().unwrap_or_else(|_| source.to_path_buf())
        } else {
            vault.absolute_path(source)
        };
        self.render_document(&source, format)
    }

    fn ensure_vault(&mut self) -> Result<()> {
        if self.vault.is_some() {
            return Ok(());
        }
        let root = if self.root.is_file() {
            self.root.parent().unwrap_or(&self.root)
        } else {
            &self.root
        };
        if !root.exists() {
            return PathDoesNotExistSnafu { path: root }.fail();
        }
        self.vault = Some(Arc::new(DirectoryVault::open(root, self.walk_options)?));
        Ok(())
    }

    fn export_note(&self, source: &Path, destination: &Path) -> Result<()> {
        let rendered = self
            .render_document(source, self.format)
            .context(FileExportSnafu { path: source })?;
        let mut outfile = create_file(destination)?;
        outfile
            .write_all(rendered.html.as_bytes())
            .context(WriteSnafu { path: destination })?;
        Ok(())
    }

    /// Run the whole pipeline for one top-level note and assemble the
    /// result into a standalone document.
    fn render_document(&self, source: &Path, format: OutputFormat) -> Result<RenderedNote> {
        let vault = self.vault.as_ref().expect("render_document requires a vault");
        debug!(source = %source.display(), format = format.name(), "rendering note");

        let context = RenderContext::new(source.to_path_buf(), format);
        let (fragment, frontmatter) = self.render_fragment_for(&context)?;
        let body = fragment.to_html();

        let title = frontmatter::title_from(&frontmatter).unwrap_or_else(|| {
            source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let css = assemble::collect_css(
            self.css_injection,
            &self.app_css,
            &body,
            self.custom_css.as_deref(),
            vault.as_ref(),
        );
        let document = AssembledDocument { title, css, body };

        Ok(RenderedNote {
            html: document.to_html(),
            metadata: frontmatter::metadata_map(&frontmatter),
        })
    }

    /// Render the note named by `context` through every pipeline stage
    /// short of document assembly. Embed expansion re-enters this for each
    /// embedded note, depth-first and in document order.
    fn render_fragment_for(
        &self,
        context: &RenderContext,
    ) -> Result<(DocumentFragment, Frontmatter)> {
        let vault = self.vault.as_ref().expect("render requires a vault");
        let path = context.current_file();

        let content = vault.read_file(path).context(ReadSnafu { path })?;
        let (frontmatter_block, body) = frontmatter::split_frontmatter(&content);
        let frontmatter = frontmatter::frontmatter_from_str(frontmatter_block)
            .context(FrontMatterDecodeSnafu { path })?;

        let source_rel = vault.relative_path(path);
        let markdown = if context.format.uses_renderer_image_handling() {
            body.to_owned()
        } else {
            assets::rewrite_image_embeds(body, vault.as_ref(), &source_rel)
        };

        let folder = path.parent().unwrap_or_else(|| Path::new(""));
        let mut fragment = self.renderer.render_fragment(&markdown, folder);

        assets::promote_image_embeds(&mut fragment, vault.as_ref(), &source_rel);
        self.expand_embeds(&mut fragment, context);
        links::rewrite_links(
            &mut fragment,
            vault.as_ref(),
            context,
            self.link_policy,
            &self.link_extension,
        );
        diagram::process_diagrams(
            &mut fragment,
            context.format,
            assemble::diagram_css(self.css_injection, &self.app_css),
            self.hidpi_diagrams,
            self.rasterizer.as_ref(),
        );

        Ok((fragment, frontmatter))
    }

    /// Expand embedded-note elements by recursively rendering their
    /// targets and splicing the result in place.
    ///
    /// Expansion is sequential in document order. A target already on the
    /// ancestor chain is a cycle and collapses to a plain link; any read or
    /// render failure is contained to its element.
    fn expand_embeds(&self, fragment: &mut DocumentFragment, context: &RenderContext) {
        let vault = self.vault.clone().expect("render requires a vault");
        let source_rel = vault.relative_path(context.current_file());

        fragment.rewrite(&mut |element| {
            if element.kind != ElementKind::EmbeddedNote {
                return Edit::Keep;
            }
            let Some(reference) = element.attr("src").map(str::to_owned) else {
                return Edit::Keep;
            };
            let Some(resolved) = resolve(vault.as_ref(), &reference, &source_rel) else {
                warn!(
                    reference = %reference,
                    source = %context.current_file().display(),
                    "unable to find embedded note, leaving the embed unexpanded"
                );
                return Edit::Keep;
            };

            if context.is_ancestor(&resolved.absolute) {
                // Embedding an ancestor again would recurse forever; a
                // plain link keeps the document navigable instead.
                return Edit::Replace(vec![link_to_file(&resolved, element.plain_text())]);
            }

            if resolved.relative.extension().and_then(|ext| ext.to_str()) != Some("md") {
                // Attachments that are neither notes nor raster images
                // cannot be inlined; keep them reachable.
                return Edit::Replace(vec![link_to_file(&resolved, element.plain_text())]);
            }

            let child_context = RenderContext::from_parent(context, &resolved.absolute);
            match self.render_fragment_for(&child_context) {
                Ok((child_fragment, _frontmatter)) => Edit::Replace(child_fragment.nodes),
                Err(error) => {
                    warn!(
                        %error,
                        reference = %reference,
                        source = %context.current_file().display(),
                        "failed to expand embedded note, leaving the embed unexpanded"
                    );
                    Edit::Keep
                }
            }
        });
    }
}

/// A plain hyperlink to a resolved file, labelled with `text` or the
/// file's base name when the text is empty.
fn link_to_file(resolved: &ResolvedFile, text: String) -> Node {
    let text = if text.is_empty() {
        resolved.base.clone()
    } else {
        text
    };
    let href = resolved.absolute.to_string_lossy().replace('\\', "/");
    Node::Element(
        Element::new(ElementKind::Link)
            .with_attr("href", href)
            .with_children(vec![Node::Text(text)]),
    )
}

fn create_file(dest: &Path) -> Result<File> {
    let file = File::create(dest)
        .or_else(|err| {
            if err.kind() == ErrorKind::NotFound {
                let parent = dest.parent().expect("file should have a parent directory");
                std::fs::create_dir_all(parent)?;
            }
            File::create(dest)
        })
        .context(WriteSnafu { path: dest })?;
    Ok(file)
}

fn is_markdown_file(file: &Path) -> bool {
    file.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| ext == "md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FlatVault;
    use pretty_assertions::assert_eq;

    fn exporter_with(vault: FlatVault) -> Exporter<'static> {
        let mut exporter = Exporter::new(PathBuf::from("/vault"), PathBuf::from("/tmp/out"));
        exporter.with_vault(Arc::new(vault));
        exporter
    }

    #[test]
    fn renders_a_standalone_document_with_frontmatter_title() {
        let vault = FlatVault::new(&["Note.md"])
            .with_content("Note.md", "---\ntitle: Fancy Title\nauthor: me\n---\n# Hello\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("Note.md"), OutputFormat::Html)
            .unwrap();

        assert!(rendered.html.starts_with("<!DOCTYPE html>"));
        assert!(rendered.html.contains("<title>Fancy Title</title>"));
        assert!(rendered.html.contains("<h1 id=\"hello\">Hello</h1>"));
        assert_eq!(rendered.metadata.get("title"), Some(&"Fancy Title".to_owned()));
        assert_eq!(rendered.metadata.get("author"), Some(&"me".to_owned()));
    }

    #[test]
    fn title_falls_back_to_the_file_stem() {
        let vault = FlatVault::new(&["Plain Note.md"]).with_content("Plain Note.md", "body\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("Plain Note.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered.html.contains("<title>Plain Note</title>"));
    }

    #[test]
    fn embedded_notes_are_spliced_in_place() {
        let vault = FlatVault::new(&["A.md", "B.md"])
            .with_content("A.md", "before\n\n![[B]]\n\nafter\n")
            .with_content("B.md", "embedded *content*\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered.html.contains("embedded <em>content</em>"));
        assert!(!rendered.html.contains("internal-embed"));
    }

    #[test]
    fn embed_cycles_collapse_to_plain_links() {
        let vault = FlatVault::new(&["A.md", "B.md"])
            .with_content("A.md", "# A\n\n![[B]]\n")
            .with_content("B.md", "# B\n\n![[A]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Html)
            .unwrap();

        // B is expanded once; the embed of A inside B becomes a link.
        assert!(rendered.html.contains("<h1 id=\"b\">B</h1>"));
        assert!(rendered.html.contains("<a href=\"/vault/A.md\">A</a>"));
        assert!(!rendered.html.contains("internal-embed"));
    }

    #[test]
    fn self_embeds_terminate() {
        let vault = FlatVault::new(&["Loop.md"]).with_content("Loop.md", "![[Loop]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("Loop.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered.html.contains("<a href=\"/vault/Loop.md\">Loop</a>"));
    }

    #[test]
    fn unresolved_embeds_are_left_untouched() {
        let vault = FlatVault::new(&["A.md"]).with_content("A.md", "![[Missing]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered
            .html
            .contains("<span class=\"internal-embed\" src=\"Missing\">Missing</span>"));
    }

    #[test]
    fn unreadable_embeds_do_not_abort_the_render() {
        // B.md is indexed but has no readable content.
        let vault = FlatVault::new(&["A.md", "B.md"]).with_content("A.md", "intro\n\n![[B]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered.html.contains("intro"));
        assert!(rendered.html.contains("internal-embed"));
    }

    #[test]
    fn attachment_embeds_become_links() {
        let vault = FlatVault::new(&["A.md", "Paper.pdf"]).with_content("A.md", "![[Paper.pdf]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Html)
            .unwrap();
        assert!(rendered
            .html
            .contains("<a href=\"/vault/Paper.pdf\">Paper.pdf</a>"));
    }

    #[test]
    fn unreadable_root_note_is_fatal() {
        let vault = FlatVault::new(&["A.md"]);
        let mut exporter = exporter_with(vault);
        let result = exporter.render_note(Path::new("A.md"), OutputFormat::Html);
        assert!(matches!(result, Err(ExportError::ReadError { .. })));
    }

    #[test]
    fn markdown_mode_rewrites_image_embeds_before_rendering() {
        let vault = FlatVault::new(&["A.md", "assets/diagram.png"])
            .with_content("A.md", "![[diagram.png|300]]\n");
        let mut exporter = exporter_with(vault);
        let rendered = exporter
            .render_note(Path::new("A.md"), OutputFormat::Markdown)
            .unwrap();
        assert!(rendered
            .html
            .contains("<img src=\"file:///vault/assets/diagram.png\" alt=\"diagram.png\" />"));
    }
}
