use portadoc::{Exporter, OutputFormat};
use std::fs::{create_dir_all, write};
use std::path::Path;
use tempfile::TempDir;

fn make_vault(files: &[(&str, &str)]) -> TempDir {
    let vault = TempDir::new().expect("failed to make tempdir");
    for (path, content) in files {
        let path = vault.path().join(path);
        create_dir_all(path.parent().unwrap()).unwrap();
        write(path, content).unwrap();
    }
    vault
}

fn render(vault: &TempDir, source: &str) -> String {
    let destination = TempDir::new().expect("failed to make tempdir");
    Exporter::new(vault.path().to_path_buf(), destination.path().to_path_buf())
        .render_note(Path::new(source), OutputFormat::Html)
        .unwrap()
        .html
}

#[test]
fn embeds_are_expanded_recursively() {
    let vault = make_vault(&[
        ("Outer.md", "# Outer\n\n![[Middle]]\n"),
        ("Middle.md", "middle text\n\n![[Inner]]\n"),
        ("Inner.md", "innermost *text*\n"),
    ]);
    let html = render(&vault, "Outer.md");

    assert!(html.contains("middle text"));
    assert!(html.contains("innermost <em>text</em>"));
    assert!(!html.contains("internal-embed"));
}

#[test]
fn mutual_embed_cycle_expands_once_then_links() {
    let vault = make_vault(&[
        ("A.md", "# A\n\n![[B]]\n"),
        ("B.md", "# B\n\n![[A]]\n"),
    ]);
    let html = render(&vault, "A.md");

    // B's content is fully expanded once.
    assert!(html.contains("<h1 id=\"b\">B</h1>"));
    // The second embed of A renders as a plain link instead of recursing.
    assert!(html.contains(">A</a>"), "unexpected html: {html}");
    assert!(html.contains("A.md\""));
    assert!(!html.contains("internal-embed"));
}

#[test]
fn transitive_embed_cycle_terminates() {
    let vault = make_vault(&[
        ("A.md", "![[B]]\n"),
        ("B.md", "![[C]]\n"),
        ("C.md", "![[A]]\n\ndeepest\n"),
    ]);
    let html = render(&vault, "A.md");

    assert!(html.contains("deepest"));
    assert!(html.contains(">A</a>"), "unexpected html: {html}");
}

#[test]
fn missing_embed_targets_are_left_as_written() {
    let vault = make_vault(&[("A.md", "![[Nowhere]]\n")]);
    let html = render(&vault, "A.md");
    assert!(html.contains("<span class=\"internal-embed\" src=\"Nowhere\">Nowhere</span>"));
}

#[test]
fn image_embeds_are_promoted_to_images() {
    let vault = make_vault(&[
        ("A.md", "![[photo.png|640]]\n"),
        ("assets/photo.png", "\u{89}PNG fake bytes"),
    ]);
    let html = render(&vault, "A.md");

    assert!(html.contains("<img src=\"file://"), "unexpected html: {html}");
    assert!(html.contains("/assets/photo.png\""));
    assert!(html.contains("width=\"640\""));
    assert!(!html.contains("internal-embed"));
}

#[test]
fn attachment_embeds_fall_back_to_links() {
    let vault = make_vault(&[
        ("A.md", "![[Paper.pdf]]\n"),
        ("Paper.pdf", "%PDF-1.4 fake"),
    ]);
    let html = render(&vault, "A.md");
    assert!(html.contains(">Paper.pdf</a>"), "unexpected html: {html}");
}

#[test]
fn embeds_in_subfolders_resolve_relative_to_the_vault() {
    let vault = make_vault(&[
        ("notes/Outer.md", "![[Shared]]\n"),
        ("library/Shared.md", "shared content\n"),
    ]);
    let html = render(&vault, "notes/Outer.md");
    assert!(html.contains("shared content"));
}
