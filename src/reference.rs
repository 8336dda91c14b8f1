use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static NOTE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^#|]+)??(#(?P<section>.+?))??(\|(?P<label>.+?))??$").unwrap()
});

static IMAGE_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<width>\d+)(x(?P<height>\d+))?$").unwrap());

/// `NoteReference` represents the structure of a `[[note]]` or `![[embed]]`
/// reference as written by the author.
///
/// References are not guaranteed to be unique across the knowledge base;
/// resolving one to a concrete file is the link resolver's job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NoteReference<'a> {
    /// The file (note name or partial path) being referenced.
    /// This will be None in the case that the reference is to a section
    /// within the same document.
    pub file: Option<&'a str>,
    /// If specified, a section/heading being referenced.
    pub section: Option<&'a str>,
    /// If specified, the custom label/text which was specified. For image
    /// embeds this position may instead hold a display size suffix.
    pub label: Option<&'a str>,
}

/// A display-size suffix on an image embed (`![[img.png|300]]`,
/// `![[img.png|300x200]]`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: Option<u32>,
}

impl NoteReference<'_> {
    #[must_use]
    pub fn from_str(text: &str) -> NoteReference<'_> {
        let captures = NOTE_REFERENCE_RE
            .captures(text)
            .expect("note reference regex is universal - this should never fail");
        let file = captures.name("file").map(|v| v.as_str().trim());
        let label = captures.name("label").map(|v| v.as_str());
        let section = captures.name("section").map(|v| v.as_str().trim());

        NoteReference {
            file,
            section,
            label,
        }
    }

    /// Interpret the label position as an image display size, if it has
    /// the `W` or `WxH` shape.
    #[must_use]
    pub fn image_size(&self) -> Option<ImageSize> {
        let captures = IMAGE_SIZE_RE.captures(self.label?)?;
        let width = captures.name("width")?.as_str().parse().ok()?;
        let height = captures
            .name("height")
            .and_then(|v| v.as_str().parse().ok());
        Some(ImageSize { width, height })
    }

    #[must_use]
    pub fn display(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for NoteReference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if let Some(label) = self.label {
            label.to_owned()
        } else {
            match (self.file, self.section) {
                (Some(file), Some(section)) => format!("{file} > {section}"),
                (Some(file), None) => file.to_owned(),
                (None, Some(section)) => section.to_owned(),
                _ => return Err(fmt::Error),
            }
        };
        write!(f, "{label}")
    }
}
