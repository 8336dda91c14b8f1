//! Owned HTML tree model shared by all post-processing stages.
//!
//! The renderer produces a [`DocumentFragment`] instead of a string so that
//! the later pipeline stages (embed expansion, link rewriting, diagram
//! conversion) can match on semantic element kinds rather than scrape tag
//! names back out of markup. Each render invocation owns its fragment
//! exclusively; embedded notes produce a nested fragment whose nodes are
//! spliced into the parent and then discarded.

use std::fmt::Write as _;

/// A single node in a [`DocumentFragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Plain text, escaped on serialization.
    Text(String),
    /// Verbatim markup, emitted untouched (raw HTML blocks, SVG payloads).
    Raw(String),
    Element(Element),
}

/// Semantic element kinds the pipeline distinguishes.
///
/// Anything a pipeline stage needs to find gets its own variant; purely
/// structural markup is limited to what the bundled renderer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Heading(u8),
    BlockQuote,
    CodeBlock,
    List {
        ordered: bool,
    },
    Item,
    Table,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    InlineCode,
    FootnoteReference,
    /// A hyperlink. Internal links carry a `vault://` href until the link
    /// target rewriter finalizes them.
    Link,
    Image,
    /// A `![[note]]` inclusion directive awaiting expansion.
    EmbeddedNote,
    /// An inline vector diagram; its markup lives in a single [`Node::Raw`]
    /// child.
    Diagram,
    LineBreak,
    Rule,
}

impl ElementKind {
    const fn tag(self) -> &'static str {
        match self {
            Self::Paragraph => "p",
            Self::Heading(1) => "h1",
            Self::Heading(2) => "h2",
            Self::Heading(3) => "h3",
            Self::Heading(4) => "h4",
            Self::Heading(5) => "h5",
            Self::Heading(_) => "h6",
            Self::BlockQuote => "blockquote",
            Self::CodeBlock => "pre",
            Self::List { ordered: true } => "ol",
            Self::List { ordered: false } => "ul",
            Self::Item => "li",
            Self::Table => "table",
            Self::TableRow => "tr",
            Self::TableCell => "td",
            Self::Emphasis => "em",
            Self::Strong => "strong",
            Self::Strikethrough => "del",
            Self::InlineCode => "code",
            Self::FootnoteReference => "sup",
            Self::Link => "a",
            Self::Image => "img",
            Self::EmbeddedNote => "span",
            Self::Diagram => "svg",
            Self::LineBreak => "br",
            Self::Rule => "hr",
        }
    }

    const fn is_void(self) -> bool {
        matches!(self, Self::Image | Self::LineBreak | Self::Rule)
    }
}

/// An element with ordered attributes and children.
///
/// Attributes are kept as an ordered list rather than a map so serialized
/// output is deterministic and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    #[must_use]
    pub const fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Look up an attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing any existing value under the same name.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(key, _)| key == name) {
            entry.1 = value;
        } else {
            self.attrs.push((name.to_owned(), value));
        }
    }

    /// The concatenated visible text of this element's subtree.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn serialize(&self, out: &mut String) {
        // Diagrams carry their own complete markup; the wrapper element is
        // purely a pipeline artifact.
        if self.kind == ElementKind::Diagram {
            for child in &self.children {
                serialize_node(child, out);
            }
            return;
        }

        let tag = self.kind.tag();
        out.push('<');
        out.push_str(tag);
        for (name, value) in &self.attrs {
            if name.starts_with("data-") {
                continue;
            }
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if self.kind.is_void() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if self.kind == ElementKind::CodeBlock {
            out.push_str("<code>");
        }
        for child in &self.children {
            serialize_node(child, out);
        }
        if self.kind == ElementKind::CodeBlock {
            out.push_str("</code>");
        }
        let _ = write!(out, "</{tag}>");
    }
}

/// Decision returned by a [`DocumentFragment::rewrite`] visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Leave the element in place (it may have been mutated in place).
    Keep,
    /// Splice these nodes in place of the element. They are not revisited.
    Replace(Vec<Node>),
    /// Delete the element and its subtree.
    Remove,
}

/// The mutable HTML tree produced by one render invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFragment {
    pub nodes: Vec<Node>,
}

impl DocumentFragment {
    #[must_use]
    pub const fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Walk every element depth-first (children before parents) and apply
    /// the visitor's [`Edit`] decision.
    ///
    /// Replacement nodes are spliced in place and not revisited, so a
    /// visitor can insert fully-processed subtrees without risking
    /// re-expansion.
    pub fn rewrite(&mut self, visit: &mut dyn FnMut(&mut Element) -> Edit) {
        rewrite_nodes(&mut self.nodes, visit);
    }

    /// Serialize the fragment to an HTML string.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            serialize_node(node, &mut out);
        }
        out
    }
}

fn rewrite_nodes(nodes: &mut Vec<Node>, visit: &mut dyn FnMut(&mut Element) -> Edit) {
    let mut index = 0;
    while index < nodes.len() {
        let edit = match nodes.get_mut(index) {
            Some(Node::Element(element)) => {
                rewrite_nodes(&mut element.children, visit);
                visit(element)
            }
            _ => Edit::Keep,
        };
        match edit {
            Edit::Keep => index += 1,
            Edit::Remove => {
                nodes.remove(index);
            }
            Edit::Replace(replacement) => {
                let advance = replacement.len();
                nodes.splice(index..=index, replacement);
                index += advance;
            }
        }
    }
}

fn serialize_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Raw(markup) => out.push_str(markup),
        Node::Element(element) => element.serialize(out),
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Raw(_) => {}
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

pub(crate) fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}
