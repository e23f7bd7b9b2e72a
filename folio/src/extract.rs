//! Main-content recovery from semi-structured HTML fragments
//!
//! A chapter fragment is a small standalone page: head, navigation
//! controls, scripts, and somewhere inside a wrapper such as
//! `<div class="paper">` holding the content that matters. The extractor
//! walks the fragment's event stream with a depth counter restricted to the
//! wrapper's container tag and copies out the wrapper's inner content.
//!
//! The walk is an explicit state machine:
//! - **Seeking**: container opens and closes only move the depth counter.
//!   The first container whose class or role tokens include a marker
//!   becomes the target. Its own tag is consumed and its depth recorded.
//! - **Copying**: every event is copied into the output except denylisted
//!   or stripped subtrees, which are skipped whole (text included). When a
//!   container close brings the depth back to the target depth, the walk
//!   stops; whatever follows in the fragment is ignored.
//!
//! Output goes through [`TreeBuilder`], so it is well-formed even if the
//! copied region was not: nothing is emitted without its observed close.

use crate::markup::lexer::{tokenize, MarkupEvent};
use crate::markup::tree::TreeBuilder;
use crate::markup::Element;
use thiserror::Error;

/// Errors raised while extracting content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No content found in fragment: neither a main-content wrapper nor a document body with content")]
    NoContentFound,
}

/// What to extract and what to drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    /// Tag used as the structural wrapper and depth-counted
    pub container: String,
    /// Class or role tokens that mark the target; empty matches any container
    pub markers: Vec<String>,
    /// Tags whose whole subtree is dropped
    pub denylist: Vec<String>,
    /// Class tokens whose whole subtree is dropped
    pub strip_classes: Vec<String>,
}

impl ExtractionRule {
    /// Rule for chapter and front-matter fragments
    pub fn main_content() -> Self {
        Self {
            container: "div".to_string(),
            markers: vec![
                "paper".to_string(),
                "container".to_string(),
                "main".to_string(),
            ],
            denylist: vec!["script".to_string()],
            strip_classes: Vec::new(),
        }
    }

    /// Rule for diagram fragments
    pub fn diagram() -> Self {
        Self {
            container: "div".to_string(),
            markers: vec!["diagram-wrap".to_string()],
            denylist: vec!["script".to_string(), "style".to_string()],
            strip_classes: vec!["controls".to_string()],
        }
    }

    /// Rule for the body fallback
    fn body_fallback() -> Self {
        Self {
            container: "body".to_string(),
            markers: Vec::new(),
            denylist: vec!["script".to_string(), "nav".to_string()],
            strip_classes: vec!["controls".to_string()],
        }
    }

    fn is_target(&self, tag: &str, attrs: &[(String, String)]) -> bool {
        if tag != self.container {
            return false;
        }
        if self.markers.is_empty() {
            return true;
        }
        attrs
            .iter()
            .filter(|(name, _)| name == "class" || name == "role")
            .flat_map(|(_, value)| value.split_whitespace())
            .any(|token| self.markers.iter().any(|m| m == token))
    }

    fn is_skipped(&self, tag: &str, attrs: &[(String, String)]) -> bool {
        if self.denylist.iter().any(|t| t == tag) {
            return true;
        }
        attrs
            .iter()
            .filter(|(name, _)| name == "class")
            .flat_map(|(_, value)| value.split_whitespace())
            .any(|token| self.strip_classes.iter().any(|c| c == token))
    }
}

/// Extracts the main-content subtree of fragments
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    rule: ExtractionRule,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(ExtractionRule::main_content())
    }
}

impl ContentExtractor {
    pub fn new(rule: ExtractionRule) -> Self {
        Self { rule }
    }

    /// Extract a fragment's main content
    ///
    /// Tries the wrapper rule first, then the document body with scripts
    /// and navigation controls stripped.
    ///
    /// # Parameters
    /// * `raw` - Whole fragment markup
    ///
    /// # Returns
    /// * `Ok(Element)` - Fragment root holding the recovered content
    /// * `Err(ExtractError::NoContentFound)` - Both strategies came up blank
    pub fn extract(&self, raw: &str) -> Result<Element, ExtractError> {
        let events = tokenize(raw);

        if let Some(content) = extract_events(&events, &self.rule) {
            if !content.is_blank() {
                return Ok(content);
            }
        }

        log::debug!(
            "No <{}> wrapper with markers {:?}; falling back to document body",
            self.rule.container,
            self.rule.markers
        );
        let fallback = extract_body(&events);
        if fallback.is_blank() {
            return Err(ExtractError::NoContentFound);
        }
        Ok(fallback)
    }
}

/// Extract the first container matching `rule` from raw markup
///
/// Returns `None` when no container matches.
pub fn extract_container(raw: &str, rule: &ExtractionRule) -> Option<Element> {
    extract_events(&tokenize(raw), rule)
}

/// Concatenated text of every `<style>` element in a fragment
pub fn collect_styles(raw: &str) -> String {
    let mut styles = Vec::new();
    let mut in_style = false;
    for event in tokenize(raw) {
        match event {
            MarkupEvent::Open { tag, .. } if tag == "style" => in_style = true,
            MarkupEvent::Close { tag } if tag == "style" => in_style = false,
            MarkupEvent::Text(text) if in_style => styles.push(text.trim().to_string()),
            _ => {}
        }
    }
    styles.retain(|s| !s.is_empty());
    styles.join("\n")
}

/// Body fallback: outermost `<body>`, or the whole document when there is none
fn extract_body(events: &[MarkupEvent]) -> Element {
    let rule = ExtractionRule::body_fallback();
    if let Some(body) = extract_events(events, &rule) {
        return body;
    }

    // No body tag: treat everything outside <head> as the body
    let mut rule = rule;
    rule.denylist.push("head".to_string());
    rule.denylist.push("title".to_string());
    run(events, &rule, State::Copying { target_depth: 0 }).unwrap_or_else(Element::fragment)
}

fn extract_events(events: &[MarkupEvent], rule: &ExtractionRule) -> Option<Element> {
    run(events, rule, State::Seeking)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Seeking,
    Copying { target_depth: usize },
}

/// A dropped subtree being skipped
#[derive(Debug)]
struct SkipRegion<'a> {
    tag: &'a str,
    nesting: usize,
}

fn run(events: &[MarkupEvent], rule: &ExtractionRule, start: State) -> Option<Element> {
    let container = rule.container.as_str();
    let mut state = start;
    let mut depth = 0usize;
    let mut skip: Option<SkipRegion<'_>> = None;
    let mut out = TreeBuilder::new();

    for event in events {
        match state {
            State::Seeking => match event {
                MarkupEvent::Open {
                    tag,
                    attrs,
                    self_closing: false,
                } if tag == container => {
                    depth += 1;
                    if rule.is_target(tag, attrs) {
                        state = State::Copying {
                            target_depth: depth,
                        };
                    }
                }
                MarkupEvent::Close { tag } if tag == container => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            },

            State::Copying { target_depth } => {
                // Container bookkeeping happens even inside skipped regions
                match event {
                    MarkupEvent::Open {
                        tag,
                        self_closing: false,
                        ..
                    } if tag == container => depth += 1,
                    MarkupEvent::Close { tag } if tag == container => {
                        if depth == target_depth {
                            return Some(out.finish());
                        }
                        depth = depth.saturating_sub(1);
                    }
                    _ => {}
                }

                if let Some(region) = skip.as_mut() {
                    match event {
                        MarkupEvent::Open {
                            tag,
                            self_closing: false,
                            ..
                        } if tag == region.tag => region.nesting += 1,
                        MarkupEvent::Close { tag } if tag == region.tag => {
                            region.nesting -= 1;
                            if region.nesting == 0 {
                                skip = None;
                            }
                        }
                        _ => {}
                    }
                    continue;
                }

                match event {
                    MarkupEvent::Open {
                        tag,
                        attrs,
                        self_closing,
                    } => {
                        if rule.is_skipped(tag, attrs) {
                            if !self_closing {
                                skip = Some(SkipRegion { tag, nesting: 1 });
                            }
                        } else {
                            out.open(tag.clone(), attrs.clone(), *self_closing);
                        }
                    }
                    MarkupEvent::Close { tag } => out.close(tag),
                    MarkupEvent::Text(text) => out.append_text(text.clone()),
                    MarkupEvent::EntityRef(code) => {
                        out.push(MarkupEvent::EntityRef(code.clone()));
                    }
                }
            }
        }
    }

    match state {
        State::Seeking => None,
        State::Copying { .. } => {
            log::debug!("Wrapper <{}> never closed; keeping content to end of input", container);
            Some(out.finish())
        }
    }
}
