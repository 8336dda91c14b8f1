//! Standalone document assembly.
//!
//! A top-level render wraps its body fragment into a complete HTML
//! document: doctype, title, one `<style>` block with every stylesheet the
//! document needs to stand alone, and the body markup. Embedded renders
//! never pass through here.

use std::path::Path;

use tracing::warn;

use crate::fragment::escape_text;
use crate::vault::Vault;

/// Which stylesheet to inject into standalone documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum CssInjection {
    /// No stylesheet at all.
    None,
    /// The bundled light theme.
    #[default]
    Light,
    /// The bundled dark theme.
    Dark,
    /// The caller-supplied application stylesheet, falling back to the
    /// bundled light theme when none was provided.
    CurrentTheme,
}

/// Minimal bundled stylesheet for readable exports.
pub(crate) const LIGHT_CSS: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Helvetica,Arial,sans-serif;\
max-width:46em;margin:2em auto;padding:0 1em;color:#1f2328;background:#ffffff;line-height:1.55}\
a{color:#0969da}\
pre{background:#f6f8fa;padding:0.8em;overflow-x:auto;border-radius:4px}\
code{font-family:ui-monospace,SFMono-Regular,Menlo,monospace;font-size:0.92em}\
blockquote{border-left:3px solid #d0d7de;margin-left:0;padding-left:1em;color:#57606a}\
table{border-collapse:collapse}td,th{border:1px solid #d0d7de;padding:0.3em 0.6em}\
img{max-width:100%}\
";

pub(crate) const DARK_CSS: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Helvetica,Arial,sans-serif;\
max-width:46em;margin:2em auto;padding:0 1em;color:#e6edf3;background:#0d1117;line-height:1.55}\
a{color:#4493f8}\
pre{background:#161b22;padding:0.8em;overflow-x:auto;border-radius:4px}\
code{font-family:ui-monospace,SFMono-Regular,Menlo,monospace;font-size:0.92em}\
blockquote{border-left:3px solid #30363d;margin-left:0;padding-left:1em;color:#8d96a0}\
table{border-collapse:collapse}td,th{border:1px solid #30363d;padding:0.3em 0.6em}\
img{max-width:100%}\
";

/// Marker left in rendered markup by MathJax-style math renderers.
const MATHJAX_MARKER: &str = "mjx-";

/// Font fixes for MathJax containers, only worth the bytes when math is
/// actually present in the body.
const MATHJAX_FONT_CSS: &str = "\
mjx-container{display:inline-block;line-height:0;text-indent:0;font-family:serif}\
mjx-container svg{display:inline-block;vertical-align:middle}\
";

/// The final standalone output of a top-level render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    pub title: String,
    pub css: String,
    pub body: String,
}

impl AssembledDocument {
    /// Serialize into a complete, self-contained HTML document.
    #[must_use]
    pub fn to_html(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n\
             <title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            escape_text(&self.title),
            self.css,
            self.body,
        )
    }
}

/// The stylesheet a diagram gets folded into its own markup.
///
/// Diagrams are illegible without styling, so injection mode `None` still
/// yields the bundled light theme here.
#[must_use]
pub(crate) fn diagram_css(mode: CssInjection, app_css: &str) -> &str {
    match mode {
        CssInjection::None | CssInjection::Light => LIGHT_CSS,
        CssInjection::Dark => DARK_CSS,
        CssInjection::CurrentTheme => {
            if app_css.is_empty() {
                LIGHT_CSS
            } else {
                app_css
            }
        }
    }
}

/// Concatenate every stylesheet a standalone document needs: the injected
/// theme, a MathJax font supplement when the body contains math, and the
/// optional user-supplied custom stylesheet.
///
/// The custom stylesheet path is tried as given first, then relative to
/// the vault root; a missing file is a non-fatal warning contributing
/// empty CSS.
#[must_use]
pub(crate) fn collect_css(
    mode: CssInjection,
    app_css: &str,
    body: &str,
    custom_css: Option<&Path>,
    vault: &dyn Vault,
) -> String {
    let mut css = String::new();
    match mode {
        CssInjection::None => {}
        CssInjection::Light => css.push_str(LIGHT_CSS),
        CssInjection::Dark => css.push_str(DARK_CSS),
        CssInjection::CurrentTheme => {
            css.push_str(if app_css.is_empty() { LIGHT_CSS } else { app_css });
        }
    }
    if body.contains(MATHJAX_MARKER) {
        css.push_str(MATHJAX_FONT_CSS);
    }
    if let Some(path) = custom_css {
        match load_custom_css(vault, path) {
            Some(custom) => css.push_str(&custom),
            None => warn!(
                path = %path.display(),
                "custom stylesheet could not be read, continuing without it"
            ),
        }
    }
    css
}

fn load_custom_css(vault: &dyn Vault, path: &Path) -> Option<String> {
    let candidates = [path.to_path_buf(), vault.absolute_path(path)];
    for candidate in candidates {
        if let Ok(text) = vault.read_file(&candidate) {
            return Some(text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FlatVault;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn document_wraps_title_styles_and_body() {
        let doc = AssembledDocument {
            title: "A <Title>".to_owned(),
            css: "body{}".to_owned(),
            body: "<p>hi</p>".to_owned(),
        };
        let html = doc.to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>A &lt;Title&gt;</title>"));
        assert!(html.contains("<style>\nbody{}\n</style>"));
        assert!(html.contains("<body>\n<p>hi</p>\n</body>"));
    }

    #[test]
    fn injection_mode_none_yields_no_theme() {
        let vault = FlatVault::new(&[]);
        assert_eq!(collect_css(CssInjection::None, "", "<p></p>", None, &vault), "");
    }

    #[test]
    fn current_theme_falls_back_to_light() {
        let vault = FlatVault::new(&[]);
        assert_eq!(
            collect_css(CssInjection::CurrentTheme, "", "<p></p>", None, &vault),
            LIGHT_CSS
        );
        assert_eq!(
            collect_css(CssInjection::CurrentTheme, ".app{}", "<p></p>", None, &vault),
            ".app{}"
        );
    }

    #[test]
    fn mathjax_supplement_only_with_marker() {
        let vault = FlatVault::new(&[]);
        let without = collect_css(CssInjection::None, "", "<p>plain</p>", None, &vault);
        let with = collect_css(
            CssInjection::None,
            "",
            "<p><mjx-container></mjx-container></p>",
            None,
            &vault,
        );
        assert_eq!(without, "");
        assert!(with.contains("mjx-container"));
    }

    #[test]
    fn custom_css_is_read_vault_relative() {
        let vault = FlatVault::new(&["styles/custom.css"])
            .with_content("styles/custom.css", ".custom{color:red}");
        let css = collect_css(
            CssInjection::None,
            "",
            "<p></p>",
            Some(&PathBuf::from("styles/custom.css")),
            &vault,
        );
        assert_eq!(css, ".custom{color:red}");
    }

    #[test]
    fn missing_custom_css_contributes_empty_css() {
        let vault = FlatVault::new(&[]);
        let css = collect_css(
            CssInjection::Light,
            "",
            "<p></p>",
            Some(&PathBuf::from("styles/nope.css")),
            &vault,
        );
        assert_eq!(css, LIGHT_CSS);
    }

    #[test]
    fn diagrams_are_never_left_unstyled() {
        assert_eq!(diagram_css(CssInjection::None, ""), LIGHT_CSS);
        assert_eq!(diagram_css(CssInjection::CurrentTheme, ""), LIGHT_CSS);
        assert_eq!(diagram_css(CssInjection::CurrentTheme, ".app{}"), ".app{}");
        assert_eq!(diagram_css(CssInjection::Dark, ""), DARK_CSS);
    }
}
