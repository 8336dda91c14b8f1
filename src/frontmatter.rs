use std::collections::BTreeMap;

use serde_yaml::{Result, Value};

/// YAML front matter from a note.
///
/// This is essentially an alias of [`serde_yaml::Mapping`] so all the
/// methods available on that type are available with `Frontmatter` as well.
pub type Frontmatter = serde_yaml::Mapping;

/// Split a note's raw text into its front matter block and body.
///
/// The front matter block is the YAML between a leading `---` line and the
/// next `---`/`...` line. Notes without one yield an empty block.
#[must_use]
pub fn split_frontmatter(content: &str) -> (&str, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return ("", content);
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return ("", content);
    };
    for terminator in ["\n---", "\n..."] {
        if let Some(end) = rest.find(terminator) {
            let body = &rest[end + terminator.len()..];
            let body = body.strip_prefix('\r').unwrap_or(body);
            let body = body.strip_prefix('\n').unwrap_or(body);
            return (&rest[..end], body);
        }
    }
    ("", content)
}

#[allow(clippy::module_name_repetitions)]
pub fn frontmatter_from_str(mut s: &str) -> Result<Frontmatter> {
    if s.trim().is_empty() {
        s = "{}";
    }
    let frontmatter: Frontmatter = serde_yaml::from_str(s)?;
    Ok(frontmatter)
}

/// The note title recorded in front matter, if any.
#[must_use]
pub fn title_from(frontmatter: &Frontmatter) -> Option<String> {
    match frontmatter.get("title")? {
        Value::String(title) => Some(title.clone()),
        _ => None,
    }
}

/// Flatten front matter scalars into the string-to-string metadata mapping
/// returned alongside a rendered note. Nested sequences and mappings are
/// skipped.
#[must_use]
pub fn metadata_map(frontmatter: &Frontmatter) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for (key, value) in frontmatter {
        let Value::String(key) = key else { continue };
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        metadata.insert(key.clone(), value);
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_string_should_yield_empty_frontmatter() {
        assert_eq!(frontmatter_from_str("").unwrap(), Frontmatter::new());
    }

    #[test]
    fn splits_leading_frontmatter_block() {
        let (block, body) = split_frontmatter("---\ntitle: Foo\n---\nBody text.\n");
        assert_eq!(block, "title: Foo");
        assert_eq!(body, "Body text.\n");
    }

    #[test]
    fn notes_without_frontmatter_are_untouched() {
        let (block, body) = split_frontmatter("Just some text.\n");
        assert_eq!(block, "");
        assert_eq!(body, "Just some text.\n");
    }

    #[test]
    fn unterminated_frontmatter_is_treated_as_body() {
        let (block, body) = split_frontmatter("---\ntitle: Foo\n");
        assert_eq!(block, "");
        assert_eq!(body, "---\ntitle: Foo\n");
    }

    #[test]
    fn title_is_read_from_frontmatter() {
        let frontmatter = frontmatter_from_str("title: My Note\ndraft: true").unwrap();
        assert_eq!(title_from(&frontmatter), Some("My Note".to_owned()));
    }

    #[test]
    fn metadata_keeps_scalars_only() {
        let frontmatter =
            frontmatter_from_str("title: My Note\nweight: 3\ndraft: true\ntags: [a, b]").unwrap();
        let metadata = metadata_map(&frontmatter);
        assert_eq!(metadata.get("title"), Some(&"My Note".to_owned()));
        assert_eq!(metadata.get("weight"), Some(&"3".to_owned()));
        assert_eq!(metadata.get("draft"), Some(&"true".to_owned()));
        assert_eq!(metadata.get("tags"), None);
    }
}
