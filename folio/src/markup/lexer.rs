//! Lenient markup event stream
//!
//! Report fragments are hand-edited HTML: unclosed paragraphs, bare `&`,
//! `<` inside prose, inline `<script>` blocks. The lexer turns such input
//! into a flat stream of [`MarkupEvent`]s using `quick-xml` as the
//! tokenizer, with HTML rules layered on top:
//!
//! - tag and attribute names are lowercased
//! - void elements (`br`, `img`, ...) are always reported as self-closing
//! - `script` and `style` bodies are taken verbatim up to their close tag
//! - stray `&` and `<` are treated as text
//!
//! The stream is not guaranteed to be balanced. Balancing is the job of
//! [`super::tree::TreeBuilder`] and the extractor.

use super::node::{RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Matches a well-formed entity reference at the start of the input
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("entity pattern is valid")
});

/// One lexical event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    /// An opening tag; `self_closing` for `<x/>` and void elements
    Open {
        tag: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    /// A closing tag
    Close { tag: String },
    /// Character data, unescaped
    Text(String),
    /// An entity reference, without `&` and `;`
    EntityRef(String),
}

/// Tokenize a markup string into events
///
/// Never fails. A syntax error the tokenizer cannot recover from ends the
/// stream early with a warning.
pub fn tokenize(src: &str) -> Vec<MarkupEvent> {
    let mut events = Vec::new();
    for segment in split_raw_text(src) {
        match segment {
            Segment::Markup(markup) => lex_markup(markup, &mut events),
            Segment::RawText {
                tag,
                open_tag,
                body,
                closed,
            } => {
                // The open tag is ordinary markup; re-lex it for its attributes
                let mut open = Vec::new();
                lex_markup(open_tag, &mut open);
                let attrs = open
                    .into_iter()
                    .find_map(|event| match event {
                        MarkupEvent::Open { attrs, .. } => Some(attrs),
                        _ => None,
                    })
                    .unwrap_or_default();
                events.push(MarkupEvent::Open {
                    tag: tag.to_string(),
                    attrs,
                    self_closing: false,
                });
                if !body.is_empty() {
                    events.push(MarkupEvent::Text(body.to_string()));
                }
                if closed {
                    events.push(MarkupEvent::Close {
                        tag: tag.to_string(),
                    });
                }
            }
        }
    }
    events
}

/// A slice of the source that is either ordinary markup or a raw-text element
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Markup(&'a str),
    RawText {
        tag: &'static str,
        open_tag: &'a str,
        body: &'a str,
        closed: bool,
    },
}

/// Split out `<script>` and `<style>` elements so their bodies bypass the tokenizer
fn split_raw_text(src: &str) -> Vec<Segment<'_>> {
    // ASCII lowercasing keeps byte offsets identical to `src`
    let lower = src.to_ascii_lowercase();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let Some((start, tag)) = find_raw_open(&lower, pos) else {
            break;
        };
        let Some(open_end) = lower[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        if start > pos {
            segments.push(Segment::Markup(&src[pos..start]));
        }

        let close_pattern = format!("</{tag}");
        match lower[open_end..].find(&close_pattern) {
            Some(rel) => {
                let close_start = open_end + rel;
                let close_end = lower[close_start..]
                    .find('>')
                    .map_or(src.len(), |i| close_start + i + 1);
                segments.push(Segment::RawText {
                    tag,
                    open_tag: &src[start..open_end],
                    body: &src[open_end..close_start],
                    closed: true,
                });
                pos = close_end;
            }
            None => {
                log::debug!("Unterminated <{}> element runs to end of input", tag);
                segments.push(Segment::RawText {
                    tag,
                    open_tag: &src[start..open_end],
                    body: &src[open_end..],
                    closed: false,
                });
                pos = src.len();
            }
        }
    }

    if pos < src.len() {
        segments.push(Segment::Markup(&src[pos..]));
    }
    segments
}

/// Find the next `<script` or `<style` open tag at or after `from`
fn find_raw_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    RAW_TEXT_ELEMENTS
        .iter()
        .filter_map(|tag| {
            let needle = format!("<{tag}");
            let mut search = from;
            while let Some(rel) = lower[search..].find(&needle) {
                let start = search + rel;
                let after = lower[start + needle.len()..].chars().next();
                if matches!(after, None | Some('>' | '/')) || after.is_some_and(char::is_whitespace) {
                    return Some((start, *tag));
                }
                search = start + needle.len();
            }
            None
        })
        .min_by_key(|(start, _)| *start)
}

/// Escape `&` and `<` that cannot start an entity or a tag
fn escape_stray_markup(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for (i, c) in src.char_indices() {
        match c {
            '&' if !ENTITY_RE.is_match(&src[i..]) => out.push_str("&amp;"),
            '<' => {
                let next = src[i + 1..].chars().next();
                if next.is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')) {
                    out.push('<');
                } else {
                    out.push_str("&lt;");
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn lex_markup(markup: &str, events: &mut Vec<MarkupEvent>) {
    let cleaned = escape_stray_markup(markup);
    let mut reader = Reader::from_str(&cleaned);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => push_open(&e, false, events),
            Ok(Event::Empty(e)) => push_open(&e, true, events),
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if is_valid_tag_name(&tag) {
                    events.push(MarkupEvent::Close { tag });
                }
            }
            Ok(Event::Text(e)) => push_text(&String::from_utf8_lossy(e.as_ref()), events),
            Ok(Event::CData(e)) => push_text(&String::from_utf8_lossy(e.as_ref()), events),
            Ok(Event::GeneralRef(e)) => {
                events.push(MarkupEvent::EntityRef(
                    String::from_utf8_lossy(e.as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => break,
            // Comments, doctype, declarations and processing instructions
            Ok(_) => {}
            Err(err) => {
                log::warn!(
                    "Markup tokenizer stopped at byte {}: {}",
                    reader.buffer_position(),
                    err
                );
                break;
            }
        }
    }
}

fn push_open(e: &BytesStart<'_>, self_closing: bool, events: &mut Vec<MarkupEvent>) {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    if !is_valid_tag_name(&tag) {
        // Something like `< b>` that is not really a tag
        push_text(&format!("<{}>", String::from_utf8_lossy(e.as_ref())), events);
        return;
    }

    let attrs = e
        .html_attributes()
        .flatten()
        .map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = attr.unescape_value().map_or_else(
                |_| String::from_utf8_lossy(&attr.value).into_owned(),
                Cow::into_owned,
            );
            (name, value)
        })
        .collect();

    let self_closing = self_closing || VOID_ELEMENTS.contains(&tag.as_str());
    events.push(MarkupEvent::Open {
        tag,
        attrs,
        self_closing,
    });
}

/// Append text, merging with a preceding text event
fn push_text(text: &str, events: &mut Vec<MarkupEvent>) {
    if text.is_empty() {
        return;
    }
    if let Some(MarkupEvent::Text(prev)) = events.last_mut() {
        prev.push_str(text);
    } else {
        events.push(MarkupEvent::Text(text.to_string()));
    }
}

fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open(tag: &str) -> MarkupEvent {
        MarkupEvent::Open {
            tag: tag.to_string(),
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    fn close(tag: &str) -> MarkupEvent {
        MarkupEvent::Close {
            tag: tag.to_string(),
        }
    }

    fn text(t: &str) -> MarkupEvent {
        MarkupEvent::Text(t.to_string())
    }

    #[test]
    fn test_basic_events_are_lowercased() {
        let events = tokenize("<DIV Class=\"paper\">Hi</DIV>");
        assert_eq!(
            events,
            vec![
                MarkupEvent::Open {
                    tag: "div".to_string(),
                    attrs: vec![("class".to_string(), "paper".to_string())],
                    self_closing: false,
                },
                text("Hi"),
                close("div"),
            ]
        );
    }

    #[test]
    fn test_void_elements_are_self_closing() {
        let events = tokenize("a<br>b");
        assert_eq!(
            events,
            vec![
                text("a"),
                MarkupEvent::Open {
                    tag: "br".to_string(),
                    attrs: Vec::new(),
                    self_closing: true,
                },
                text("b"),
            ]
        );
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let events = tokenize("<p>x</p><script>if (a < b && c) { go(); }</script><p>y</p>");
        assert_eq!(
            events,
            vec![
                open("p"),
                text("x"),
                close("p"),
                open("script"),
                text("if (a < b && c) { go(); }"),
                close("script"),
                open("p"),
                text("y"),
                close("p"),
            ]
        );
    }

    #[test]
    fn test_style_close_tag_is_case_insensitive() {
        let events = tokenize("<style media=\"print\">.a{}</STYLE>");
        assert_eq!(
            events,
            vec![
                MarkupEvent::Open {
                    tag: "style".to_string(),
                    attrs: vec![("media".to_string(), "print".to_string())],
                    self_closing: false,
                },
                text(".a{}"),
                close("style"),
            ]
        );
    }

    #[test]
    fn test_stray_ampersand_and_angle_are_text() {
        let events = tokenize("<p>R&D: a < b</p>");
        assert_eq!(
            events,
            vec![
                open("p"),
                text("R"),
                MarkupEvent::EntityRef("amp".to_string()),
                text("D: a "),
                MarkupEvent::EntityRef("lt".to_string()),
                text(" b"),
                close("p"),
            ]
        );
    }

    #[test]
    fn test_entities_are_preserved() {
        let events = tokenize("Chapter&#8211;4&nbsp;");
        assert_eq!(
            events,
            vec![
                text("Chapter"),
                MarkupEvent::EntityRef("#8211".to_string()),
                text("4"),
                MarkupEvent::EntityRef("nbsp".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_and_doctype_are_skipped() {
        let events = tokenize("<!DOCTYPE html><!-- note --><p>x</p>");
        assert_eq!(events, vec![open("p"), text("x"), close("p")]);
    }

    #[test]
    fn test_mismatched_close_is_reported_not_rejected() {
        let events = tokenize("<div><p>x</div>");
        assert_eq!(events, vec![open("div"), open("p"), text("x"), close("div")]);
    }

    #[test]
    fn test_unterminated_script_swallows_rest() {
        let events = tokenize("<script>var x = 1;");
        assert_eq!(events, vec![open("script"), text("var x = 1;")]);
    }
}
