//! Owned markup tree used for every section and diagram body

/// Tag name of the synthetic root that wraps a whole fragment.
///
/// The root is never written out by [`Element::to_html`]; only its children are.
pub const FRAGMENT_TAG: &str = "#fragment";

/// Elements that never have content or a close tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements that are visible content even when they hold no text
const EMBEDDED_ELEMENTS: &[&str] = &[
    "canvas", "embed", "hr", "iframe", "img", "object", "svg", "table", "video",
];

/// Elements whose text content is copied verbatim and never escaped
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// A node in a content tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    /// An element with its attributes and ordered children
    Element(Element),
    /// Character data, stored unescaped
    Text(String),
    /// An entity reference such as `nbsp` or `#8211`, kept undecoded
    EntityRef(String),
}

/// An element node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in source order, names lowercased, values unescaped
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<ContentNode>,
}

impl Element {
    /// Create an element with no attributes or children
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an empty fragment root
    pub fn fragment() -> Self {
        Self::new(FRAGMENT_TAG)
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Builder-style child appender
    pub fn with_child(mut self, child: impl Into<ContentNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Builder-style text appender
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(ContentNode::Text(text.into()))
    }

    /// Look up an attribute value by (lowercase) name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the whitespace-separated `class` attribute contains `token`
    pub fn has_class(&self, token: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == token))
    }

    /// Whether this is the synthetic fragment root
    pub fn is_fragment(&self) -> bool {
        self.tag == FRAGMENT_TAG
    }

    /// Heading level for `h1`..`h6`, `None` for any other tag
    pub fn heading_level(&self) -> Option<u8> {
        let level = self.tag.strip_prefix('h')?.parse::<u8>().ok()?;
        (1..=6).contains(&level).then_some(level)
    }

    /// Concatenated text of the subtree, with common entities decoded
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// True when the subtree has nothing a reader would see
    ///
    /// Empty wrappers and scripts are blank; text, entities and embedded
    /// media are not.
    pub fn is_blank(&self) -> bool {
        self.children.iter().all(|child| match child {
            ContentNode::Text(text) => text.trim().is_empty(),
            ContentNode::EntityRef(_) => false,
            ContentNode::Element(el) if RAW_TEXT_ELEMENTS.contains(&el.tag.as_str()) => true,
            ContentNode::Element(el) => {
                !EMBEDDED_ELEMENTS.contains(&el.tag.as_str()) && el.is_blank()
            }
        })
    }

    /// Whether any element in the subtree satisfies `predicate`
    pub fn contains_element(&self, predicate: &dyn Fn(&Element) -> bool) -> bool {
        self.children.iter().any(|child| match child {
            ContentNode::Element(el) => predicate(el) || el.contains_element(predicate),
            _ => false,
        })
    }

    /// Serialize to HTML
    ///
    /// A fragment root is transparent: only its children are written.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

impl From<Element> for ContentNode {
    fn from(element: Element) -> Self {
        ContentNode::Element(element)
    }
}

impl ContentNode {
    /// Borrow the element if this node is one
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            ContentNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

fn collect_text(nodes: &[ContentNode], out: &mut String) {
    for node in nodes {
        match node {
            ContentNode::Text(text) => out.push_str(text),
            ContentNode::EntityRef(code) => match decode_entity(code) {
                Some(c) => out.push(c),
                None => {
                    out.push('&');
                    out.push_str(code);
                    out.push(';');
                }
            },
            ContentNode::Element(el) => {
                if !RAW_TEXT_ELEMENTS.contains(&el.tag.as_str()) {
                    collect_text(&el.children, out);
                }
            }
        }
    }
}

/// Decode a named or numeric entity reference to a character
///
/// Only the entities that show up in report fragments are known by name;
/// numeric references are decoded in full.
pub fn decode_entity(code: &str) -> Option<char> {
    if let Some(numeric) = code.strip_prefix('#') {
        let value = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(value);
    }
    let c = match code {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "rarr" => '\u{2192}',
        "larr" => '\u{2190}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        _ => return None,
    };
    Some(c)
}

fn write_node(node: &ContentNode, raw_text: bool, out: &mut String) {
    match node {
        ContentNode::Element(el) => write_element(el, out),
        ContentNode::Text(text) if raw_text => out.push_str(text),
        ContentNode::Text(text) => out.push_str(&escape_text(text)),
        ContentNode::EntityRef(code) => {
            out.push('&');
            out.push_str(code);
            out.push(';');
        }
    }
}

fn write_element(el: &Element, out: &mut String) {
    let raw_text = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
    if el.is_fragment() {
        for child in &el.children {
            write_node(child, false, out);
        }
        return;
    }

    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_html(value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&el.tag.as_str()) {
        return;
    }

    for child in &el.children {
        write_node(child, raw_text, out);
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape special HTML characters for text and attribute values
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fragment_root_is_transparent() {
        let root = Element::fragment()
            .with_child(Element::new("p").with_text("a < b"))
            .with_child(ContentNode::EntityRef("nbsp".to_string()));

        assert_eq!(root.to_html(), "<p>a &lt; b</p>&nbsp;");
    }

    #[test]
    fn test_void_and_raw_text_elements() {
        let root = Element::fragment()
            .with_child(Element::new("br"))
            .with_child(Element::new("style").with_text(".a > .b { color: red; }"));

        assert_eq!(root.to_html(), "<br><style>.a > .b { color: red; }</style>");
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let el = Element::new("div").with_attr("title", "\"quoted\" & <more>");
        assert_eq!(
            el.to_html(),
            "<div title=\"&quot;quoted&quot; &amp; &lt;more&gt;\"></div>"
        );
    }

    #[test]
    fn test_text_content_decodes_entities_and_skips_style() {
        let el = Element::new("h2")
            .with_text("Chapter")
            .with_child(ContentNode::EntityRef("#8211".to_string()))
            .with_text("4")
            .with_child(Element::new("style").with_text("h2 {}"));

        assert_eq!(el.text_content(), "Chapter\u{2013}4");
    }

    #[test]
    fn test_has_class_is_token_membership() {
        let el = Element::new("div").with_attr("class", "paper results");
        assert!(el.has_class("paper"));
        assert!(el.has_class("results"));
        assert!(!el.has_class("pap"));
    }

    #[test]
    fn test_blank_detection() {
        assert!(Element::fragment().with_text("  \n ").is_blank());
        assert!(Element::fragment()
            .with_child(Element::new("div").with_text(" "))
            .with_child(Element::new("script").with_text("x()"))
            .is_blank());
        assert!(!Element::fragment().with_child(Element::new("hr")).is_blank());
        assert!(!Element::fragment()
            .with_child(ContentNode::EntityRef("nbsp".to_string()))
            .is_blank());
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(Element::new("h3").heading_level(), Some(3));
        assert_eq!(Element::new("h7").heading_level(), None);
        assert_eq!(Element::new("hr").heading_level(), None);
    }
}
