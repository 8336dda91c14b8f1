//! The markdown rendering collaborator.
//!
//! [`NoteRenderer`] is the interface the pipeline consumes; the bundled
//! [`CmarkRenderer`] delegates markdown parsing to `pulldown-cmark` and
//! recognizes `[[wikilink]]` and `![[embed]]` references on top of it.
//! Wikilink brackets are not markdown syntax, so they surface from the
//! parser as a run of loose text events; a small state machine reassembles
//! them into internal-link and embedded-note elements.

use std::mem;
use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag};
use slug::slugify;

use crate::fragment::{DocumentFragment, Element, ElementKind, Node};
use crate::links::INTERNAL_LINK_SCHEME;
use crate::reference::NoteReference;

pub(crate) const PERCENTENCODE_CHARS: &AsciiSet =
    &CONTROLS.add(b' ').add(b'(').add(b')').add(b'%').add(b'?');

/// Renders a note's markdown body into a [`DocumentFragment`].
///
/// Implementations must be side-effect-free on their inputs; the pipeline
/// may invoke them recursively while expanding embedded notes.
pub trait NoteRenderer: Send + Sync {
    fn render_fragment(&self, markdown: &str, context_folder: &Path) -> DocumentFragment;
}

/// The bundled [`NoteRenderer`] built on `pulldown-cmark`.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct CmarkRenderer;

impl NoteRenderer for CmarkRenderer {
    fn render_fragment(&self, markdown: &str, _context_folder: &Path) -> DocumentFragment {
        let mut parser_options = Options::empty();
        parser_options.insert(Options::ENABLE_TABLES);
        parser_options.insert(Options::ENABLE_FOOTNOTES);
        parser_options.insert(Options::ENABLE_STRIKETHROUGH);
        parser_options.insert(Options::ENABLE_TASKLISTS);

        let mut builder = TreeBuilder::default();
        let mut ref_parser = RefParser::new();
        // Most of the time, a reference triggers 5 events: [ or ![, [, <text>, ], ]
        let mut buffer = Vec::with_capacity(5);

        for event in Parser::new_ext(markdown, parser_options) {
            if ref_parser.state == RefParserState::Resetting {
                for buffered in buffer.drain(..) {
                    builder.emit(buffered);
                }
                ref_parser.reset();
            }
            buffer.push(event.clone());
            match ref_parser.state {
                RefParserState::NoState => match event {
                    Event::Text(CowStr::Borrowed("![")) => {
                        ref_parser.ref_type = Some(RefType::Embed);
                        ref_parser.transition(RefParserState::ExpectSecondOpenBracket);
                    }
                    Event::Text(CowStr::Borrowed("[")) => {
                        ref_parser.ref_type = Some(RefType::Link);
                        ref_parser.transition(RefParserState::ExpectSecondOpenBracket);
                    }
                    _ => {
                        builder.emit(event);
                        buffer.clear();
                    }
                },
                RefParserState::ExpectSecondOpenBracket => match event {
                    Event::Text(CowStr::Borrowed("[")) => {
                        ref_parser.transition(RefParserState::ExpectRefText);
                    }
                    _ => {
                        ref_parser.transition(RefParserState::Resetting);
                    }
                },
                RefParserState::ExpectRefText => match event {
                    Event::Text(CowStr::Borrowed("]")) => {
                        ref_parser.transition(RefParserState::Resetting);
                    }
                    Event::Text(text) => {
                        ref_parser.ref_text.push_str(&text);
                        ref_parser.transition(RefParserState::ExpectRefTextOrCloseBracket);
                    }
                    _ => {
                        ref_parser.transition(RefParserState::Resetting);
                    }
                },
                RefParserState::ExpectRefTextOrCloseBracket => match event {
                    Event::Text(CowStr::Borrowed("]")) => {
                        ref_parser.transition(RefParserState::ExpectFinalCloseBracket);
                    }
                    Event::Text(text) => {
                        ref_parser.ref_text.push_str(&text);
                    }
                    _ => {
                        ref_parser.transition(RefParserState::Resetting);
                    }
                },
                RefParserState::ExpectFinalCloseBracket => match event {
                    Event::Text(CowStr::Borrowed("]")) => {
                        match ref_parser.ref_type {
                            Some(RefType::Link) => {
                                builder.push_node(internal_link(&ref_parser.ref_text));
                            }
                            Some(RefType::Embed) => {
                                builder.push_node(embed_element(&ref_parser.ref_text));
                            }
                            None => unreachable!("ref_type is set on every transition out of NoState"),
                        }
                        buffer.clear();
                        ref_parser.transition(RefParserState::Resetting);
                    }
                    _ => {
                        ref_parser.transition(RefParserState::Resetting);
                    }
                },
                RefParserState::Resetting => {
                    unreachable!("Resetting is handled before the match block")
                }
            }
        }
        for buffered in buffer {
            builder.emit(buffered);
        }
        builder.finish()
    }
}

/// `RefParserState` enumerates the states of the wikilink reassembly
/// machine.
#[derive(PartialEq, Eq)]
enum RefParserState {
    NoState,
    ExpectSecondOpenBracket,
    ExpectRefText,
    ExpectRefTextOrCloseBracket,
    ExpectFinalCloseBracket,
    Resetting,
}

enum RefType {
    Link,
    Embed,
}

/// `RefParser` holds state which is used to reassemble wikilinks
/// (`[[note]]`, `![[embed]]`) from loose text events.
struct RefParser {
    state: RefParserState,
    ref_type: Option<RefType>,
    // References sometimes come in through multiple events. One example of
    // this is when notes start with an underscore (_), presumably because
    // this is also the literal which starts italic and bold text.
    //
    // ref_text concatenates the values from these partial events so that
    // there's a fully-formed string to work with by the time the final `]]`
    // is encountered.
    ref_text: String,
}

impl RefParser {
    const fn new() -> Self {
        Self {
            state: RefParserState::NoState,
            ref_type: None,
            ref_text: String::new(),
        }
    }

    fn transition(&mut self, new_state: RefParserState) {
        self.state = new_state;
    }

    fn reset(&mut self) {
        self.state = RefParserState::NoState;
        self.ref_type = None;
        self.ref_text.clear();
    }
}

fn internal_link(ref_text: &str) -> Node {
    let reference = NoteReference::from_str(ref_text);
    if reference.file.is_none() && reference.section.is_none() && reference.label.is_none() {
        return Node::Text(format!("[[{ref_text}]]"));
    }
    let encoded = utf8_percent_encode(ref_text, PERCENTENCODE_CHARS).to_string();
    Node::Element(
        Element::new(ElementKind::Link)
            .with_attr("href", format!("{INTERNAL_LINK_SCHEME}{encoded}"))
            .with_attr("class", "internal-link")
            .with_children(vec![Node::Text(reference.display())]),
    )
}

fn embed_element(ref_text: &str) -> Node {
    let reference = NoteReference::from_str(ref_text);
    let Some(file) = reference.file else {
        // A same-document section embed cannot be expanded without
        // recursing into the file currently being rendered; keep the
        // literal text instead.
        return Node::Text(format!("![[{ref_text}]]"));
    };

    let mut element =
        Element::new(ElementKind::EmbeddedNote).with_attr("class", "internal-embed");
    element.set_attr("src", file.to_owned());
    let display = if let Some(size) = reference.image_size() {
        element.set_attr("width", size.width.to_string());
        if let Some(height) = size.height {
            element.set_attr("height", height.to_string());
        }
        file.to_owned()
    } else {
        reference.display()
    };
    element.children = vec![Node::Text(display)];
    Node::Element(element)
}

/// Builds the fragment tree from the flat event stream.
#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<Element>,
    raw_html: String,
}

impl TreeBuilder {
    fn emit(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(_) => self.end_tag(),
            Event::Text(text) => self.push_node(Node::Text(text.into_string())),
            Event::Code(code) => self.push_node(Node::Element(
                Element::new(ElementKind::InlineCode)
                    .with_children(vec![Node::Text(code.into_string())]),
            )),
            Event::Html(html) => self.raw_html.push_str(&html),
            Event::FootnoteReference(name) => self.push_node(Node::Element(
                Element::new(ElementKind::FootnoteReference)
                    .with_children(vec![Node::Text(name.into_string())]),
            )),
            Event::SoftBreak => self.push_node(Node::Text("\n".to_owned())),
            Event::HardBreak => {
                self.push_node(Node::Element(Element::new(ElementKind::LineBreak)));
            }
            Event::Rule => self.push_node(Node::Element(Element::new(ElementKind::Rule))),
            Event::TaskListMarker(checked) => {
                let marker = if checked {
                    "<input type=\"checkbox\" checked disabled />"
                } else {
                    "<input type=\"checkbox\" disabled />"
                };
                self.push_node(Node::Raw(marker.to_owned()));
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        let element = match tag {
            Tag::Paragraph | Tag::FootnoteDefinition(_) => Element::new(ElementKind::Paragraph),
            Tag::Heading(level, _fragment_identifier, _classes) => {
                Element::new(ElementKind::Heading(heading_rank(level)))
            }
            Tag::BlockQuote => Element::new(ElementKind::BlockQuote),
            Tag::CodeBlock(kind) => {
                let mut element = Element::new(ElementKind::CodeBlock);
                if let CodeBlockKind::Fenced(language) = kind {
                    if !language.is_empty() {
                        element.set_attr("data-lang", language.into_string());
                    }
                }
                element
            }
            Tag::List(start) => {
                let mut element = Element::new(ElementKind::List {
                    ordered: start.is_some(),
                });
                if let Some(start) = start {
                    if start != 1 {
                        element.set_attr("start", start.to_string());
                    }
                }
                element
            }
            Tag::Item => Element::new(ElementKind::Item),
            Tag::Table(_) => Element::new(ElementKind::Table),
            Tag::TableHead | Tag::TableRow => Element::new(ElementKind::TableRow),
            Tag::TableCell => Element::new(ElementKind::TableCell),
            Tag::Emphasis => Element::new(ElementKind::Emphasis),
            Tag::Strong => Element::new(ElementKind::Strong),
            Tag::Strikethrough => Element::new(ElementKind::Strikethrough),
            Tag::Link(_, dest, title) => {
                let mut element = Element::new(ElementKind::Link).with_attr("href", dest.into_string());
                if !title.is_empty() {
                    element.set_attr("title", title.into_string());
                }
                element
            }
            Tag::Image(_, dest, title) => {
                let mut element = Element::new(ElementKind::Image).with_attr("src", dest.into_string());
                if !title.is_empty() {
                    element.set_attr("title", title.into_string());
                }
                element
            }
        };
        self.flush_raw();
        self.stack.push(element);
    }

    fn end_tag(&mut self) {
        self.flush_raw();
        let Some(mut element) = self.stack.pop() else {
            return;
        };
        match element.kind {
            ElementKind::Heading(_) => {
                let id = slugify(element.plain_text());
                element.set_attr("id", id);
            }
            ElementKind::Image => {
                // Markdown alt text arrives as child events; images are
                // void elements, so it moves into the alt attribute.
                let alt = element.plain_text();
                if !alt.is_empty() {
                    element.set_attr("alt", alt);
                }
                element.children.clear();
            }
            _ => {}
        }
        self.append(Node::Element(element));
    }

    fn push_node(&mut self, node: Node) {
        self.flush_raw();
        self.append(node);
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn flush_raw(&mut self) {
        if self.raw_html.is_empty() {
            return;
        }
        let raw = mem::take(&mut self.raw_html);
        let node = if raw.trim_start().starts_with("<svg") {
            Node::Element(
                Element::new(ElementKind::Diagram).with_children(vec![Node::Raw(raw)]),
            )
        } else {
            Node::Raw(raw)
        };
        self.append(node);
    }

    fn finish(mut self) -> DocumentFragment {
        self.flush_raw();
        // Unbalanced trees cannot come out of pulldown-cmark, but close
        // anything left open rather than drop content on the floor.
        while !self.stack.is_empty() {
            self.end_tag();
        }
        DocumentFragment::new(self.root)
    }
}

const fn heading_rank(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
