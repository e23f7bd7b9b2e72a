//! Markup parsing and the owned content tree
//!
//! Everything the pipeline manipulates is an [`Element`] tree:
//! - chapter bodies converted from Markdown
//! - content recovered from HTML fragments
//! - diagram bodies
//! - front-matter templates

pub mod lexer;
pub mod node;
pub mod tree;

pub use node::{escape_html, ContentNode, Element};

use pulldown_cmark::{html, Options, Parser};
use tree::TreeBuilder;

/// Parse an HTML fragment into a well-formed tree
///
/// # Parameters
/// * `html` - Possibly malformed markup
///
/// # Returns
/// * A fragment root whose children are the parsed top-level nodes
pub fn parse_fragment(html: &str) -> Element {
    let mut builder = TreeBuilder::new();
    for event in lexer::tokenize(html) {
        builder.push(event);
    }
    builder.finish()
}

/// Convert a Markdown section body to a content tree
///
/// Tables and strikethrough are enabled, matching what report authors use.
pub fn parse_markdown(markdown: &str) -> Element {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    parse_fragment(&html_output)
}
