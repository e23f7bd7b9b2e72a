//! Balanced tree construction from an unbalanced event stream

use super::lexer::MarkupEvent;
use super::node::{ContentNode, Element};

/// Elements whose dissolved content must stay apart from what precedes it
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Builds a well-formed [`Element`] tree from [`MarkupEvent`]s
///
/// Every element in the output was closed by a close tag seen in the input.
/// Recovery rules:
/// - a close with no matching open element is ignored
/// - a close that skips over open elements dissolves them, hoisting their
///   children into the parent
/// - elements still open at [`TreeBuilder::finish`] are dissolved the same way
///
/// A dissolved block element is separated from preceding content by a
/// space, so `<p>one<p>two` reads "one two".
#[derive(Debug)]
pub struct TreeBuilder {
    stack: Vec<Element>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Start a new tree rooted at a fragment element
    pub fn new() -> Self {
        Self {
            stack: vec![Element::fragment()],
        }
    }

    /// Feed one event
    pub fn push(&mut self, event: MarkupEvent) {
        match event {
            MarkupEvent::Open {
                tag,
                attrs,
                self_closing,
            } => self.open(tag, attrs, self_closing),
            MarkupEvent::Close { tag } => self.close(&tag),
            MarkupEvent::Text(text) => self.append_text(text),
            MarkupEvent::EntityRef(code) => self.append(ContentNode::EntityRef(code)),
        }
    }

    /// Open an element
    pub fn open(&mut self, tag: String, attrs: Vec<(String, String)>, self_closing: bool) {
        let element = Element {
            tag,
            attrs,
            children: Vec::new(),
        };
        if self_closing {
            self.append(ContentNode::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    /// Close the nearest open element named `tag`
    pub fn close(&mut self, tag: &str) {
        // Index 0 is the fragment root, which no close tag can match
        let Some(index) = self.stack.iter().rposition(|el| el.tag == tag) else {
            log::debug!("Ignoring stray </{}>", tag);
            return;
        };
        if index == 0 {
            return;
        }

        while self.stack.len() > index + 1 {
            self.dissolve_top();
        }
        if let Some(element) = self.stack.pop() {
            self.append(ContentNode::Element(element));
        }
    }

    /// Append text to the innermost open element
    pub fn append_text(&mut self, text: String) {
        if let Some(ContentNode::Text(prev)) = self.top().children.last_mut() {
            prev.push_str(&text);
            return;
        }
        self.append(ContentNode::Text(text));
    }

    /// Append a finished node to the innermost open element
    pub fn append(&mut self, node: ContentNode) {
        self.top().children.push(node);
    }

    /// Dissolve anything still open and return the root
    pub fn finish(mut self) -> Element {
        while self.stack.len() > 1 {
            self.dissolve_top();
        }
        self.stack.pop().unwrap_or_else(Element::fragment)
    }

    fn top(&mut self) -> &mut Element {
        if self.stack.is_empty() {
            self.stack.push(Element::fragment());
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Whether the innermost open element ends in something other than whitespace
    fn needs_separator(&mut self) -> bool {
        match self.top().children.last() {
            None => false,
            Some(ContentNode::Text(text)) => !text.ends_with(char::is_whitespace),
            Some(_) => true,
        }
    }

    /// Drop the innermost open element's tag, keeping its children
    fn dissolve_top(&mut self) {
        if let Some(element) = self.stack.pop() {
            log::debug!("Recovering unclosed <{}>", element.tag);
            if BLOCK_ELEMENTS.contains(&element.tag.as_str())
                && !element.children.is_empty()
                && self.needs_separator()
            {
                self.append_text(" ".to_string());
            }
            for child in element.children {
                match child {
                    ContentNode::Text(text) => self.append_text(text),
                    other => self.append(other),
                }
            }
        }
    }
}
