//! Resolution of figure references to insertable diagram blocks

use crate::extract::{collect_styles, extract_container, ExtractionRule};
use crate::fragment_store::{join_name, FragmentStore, StoreError};
use crate::markup::{ContentNode, Element};
use crate::report_config::DiagramEntry;
use itertools::Itertools;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static CSS_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment pattern is valid"));

/// Why a figure could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The diagram table has no entry for the figure
    Unmapped,
    /// The mapped fragment does not exist in the store
    FragmentMissing,
    /// The fragment has no diagram wrapper, or the wrapper is empty
    WrapperMissing,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::Unmapped => write!(f, "no entry in the diagram table"),
            NotFoundReason::FragmentMissing => write!(f, "diagram fragment is missing"),
            NotFoundReason::WrapperMissing => write!(f, "fragment has no diagram-wrap content"),
        }
    }
}

/// Errors raised while resolving a figure
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Recoverable: the section renders without this diagram
    #[error("Diagram {figure} not found: {reason}")]
    NotFound {
        figure: String,
        reason: NotFoundReason,
    },

    #[error("Failed to load diagram {figure}: {source}")]
    Store {
        figure: String,
        #[source]
        source: StoreError,
    },
}

/// A resolved diagram, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    figure_id: String,
    caption: String,
    scoped_style: String,
    body: Element,
}

impl DiagramBlock {
    /// Caption line, e.g. `Figure 1: System Architecture`
    pub fn caption_line(&self) -> String {
        format!("{}: {}", self.figure_id, self.caption)
    }

    /// A fresh, self-contained `<figure>` ready to splice into a section
    ///
    /// Each call returns a deep copy; no two sections share nodes.
    pub fn to_figure(&self) -> Element {
        let mut figure = Element::new("figure")
            .with_attr("class", "report-figure")
            .with_attr("data-figure", self.figure_id.clone());
        if !self.scoped_style.is_empty() {
            figure = figure.with_child(Element::new("style").with_text(self.scoped_style.clone()));
        }
        figure
            .with_child(self.body.clone())
            .with_child(
                Element::new("figcaption")
                    .with_attr("class", "figure-caption")
                    .with_text(self.caption_line()),
            )
    }
}

/// Resolves figure identifiers against the diagram table
///
/// Each figure is loaded at most once; later lookups hit the cache,
/// including cached misses.
pub struct DiagramResolver<'a> {
    table: &'a BTreeMap<String, DiagramEntry>,
    store: &'a dyn FragmentStore,
    dir: String,
    rule: ExtractionRule,
    cache: HashMap<String, Result<DiagramBlock, NotFoundReason>>,
}

impl<'a> DiagramResolver<'a> {
    /// # Parameters
    /// * `table` - Figure identifier to fragment mapping
    /// * `store` - Store holding the diagram fragments
    /// * `dir` - Directory of the diagram fragments within the store
    pub fn new(
        table: &'a BTreeMap<String, DiagramEntry>,
        store: &'a dyn FragmentStore,
        dir: impl Into<String>,
    ) -> Self {
        Self {
            table,
            store,
            dir: dir.into(),
            rule: ExtractionRule::diagram(),
            cache: HashMap::new(),
        }
    }

    /// Resolve a figure to its diagram block
    ///
    /// # Returns
    /// * `Ok(&DiagramBlock)` - The cached block
    /// * `Err(ResolveError::NotFound)` - Recoverable; render without the diagram
    /// * `Err(ResolveError::Store)` - The fragment exists but could not be read
    pub fn resolve(&mut self, figure: &str) -> Result<&DiagramBlock, ResolveError> {
        if !self.cache.contains_key(figure) {
            let loaded = self.load(figure)?;
            self.cache.insert(figure.to_string(), loaded);
        }

        match self.cache.get(figure) {
            Some(Ok(block)) => Ok(block),
            Some(Err(reason)) => Err(ResolveError::NotFound {
                figure: figure.to_string(),
                reason: *reason,
            }),
            None => Err(ResolveError::NotFound {
                figure: figure.to_string(),
                reason: NotFoundReason::Unmapped,
            }),
        }
    }

    fn load(&self, figure: &str) -> Result<Result<DiagramBlock, NotFoundReason>, ResolveError> {
        let Some(entry) = self.table.get(figure) else {
            return Ok(Err(NotFoundReason::Unmapped));
        };
        let name = join_name(&self.dir, &entry.fragment);
        let raw = match self.store.read(&name) {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => return Ok(Err(NotFoundReason::FragmentMissing)),
            Err(source) => {
                return Err(ResolveError::Store {
                    figure: figure.to_string(),
                    source,
                })
            }
        };

        let Some(inner) = extract_container(&raw, &self.rule).filter(|el| !el.is_blank()) else {
            return Ok(Err(NotFoundReason::WrapperMissing));
        };
        log::info!("Resolved {} from {}", figure, name);

        let wrap = Element {
            tag: "div".to_string(),
            attrs: vec![("class".to_string(), "diagram-wrap".to_string())],
            children: inner.children,
        };
        let body = Element::new("div")
            .with_attr("class", "report-diagram")
            .with_child(ContentNode::Element(wrap));

        Ok(Ok(DiagramBlock {
            figure_id: figure.to_string(),
            caption: entry.caption.clone(),
            scoped_style: scope_css(&collect_styles(&raw), &figure_scope(figure)),
            body,
        }))
    }
}

/// Selector matching the `<figure>` built for `figure`
fn figure_scope(figure: &str) -> String {
    format!(
        "figure[data-figure=\"{}\"]",
        figure.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Prefix every selector in `css` with `scope`
///
/// `html`, `body` and `:root` selectors are replaced by the scope itself.
/// Rules inside `@media` and `@supports` are scoped too; other at-rules are
/// copied unchanged. Comments are dropped.
pub fn scope_css(css: &str, scope: &str) -> String {
    let css = CSS_COMMENT_RE.replace_all(css, "");
    let mut rules = Vec::new();
    let mut rest: &str = &css;

    while let Some(open) = rest.find('{') {
        let Some(close) = matching_brace(&rest[open..]).map(|offset| open + offset) else {
            log::debug!("Unbalanced braces in diagram style, rest dropped");
            break;
        };
        let mut prelude = rest[..open].trim();
        // Statements such as @import end with ';' and carry no block
        if let Some(end) = prelude.rfind(';') {
            rules.push(prelude[..=end].trim().to_string());
            prelude = prelude[end + 1..].trim();
        }
        let body = rest[open + 1..close].trim();

        let rule = match prelude.strip_prefix('@') {
            Some(at) if at.starts_with("media") || at.starts_with("supports") => {
                format!("{} {{\n{}\n}}", prelude, scope_css(body, scope))
            }
            Some(_) => css_rule(prelude, body),
            None => css_rule(
                &prelude
                    .split(',')
                    .map(|selector| scope_selector(selector.trim(), scope))
                    .join(", "),
                body,
            ),
        };
        rules.push(rule);
        rest = &rest[close + 1..];
    }

    rules.join("\n")
}

fn css_rule(selectors: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{} {{}}", selectors)
    } else {
        format!("{} {{ {} }}", selectors, body)
    }
}

/// Byte offset of the brace closing the one `block` starts with
fn matching_brace(block: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in block.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn scope_selector(selector: &str, scope: &str) -> String {
    for root in ["html", "body", ":root"] {
        if let Some(rest) = selector.strip_prefix(root) {
            if rest.is_empty() {
                return scope.to_string();
            }
            if rest.starts_with([' ', '>', '+', '~', '.', '#', ':', '[']) {
                return format!("{}{}", scope, rest);
            }
        }
    }
    format!("{} {}", scope, selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment_store::{DirStore, MemoryStore};
    use pretty_assertions::assert_eq;

    const ARCH: &str = r#"<!DOCTYPE html><html><head><style>.box { border: 1px solid; }</style>
<script>function zoom() {}</script></head><body>
<div class="controls"><button onclick="zoom()">Zoom</button></div>
<div class="diagram-wrap"><div class="box">Device</div><div class="controls">x</div></div>
</body></html>"#;

    fn table() -> BTreeMap<String, DiagramEntry> {
        let mut table = BTreeMap::new();
        table.insert(
            "Figure 1".to_string(),
            DiagramEntry {
                fragment: "01-system-architecture.html".to_string(),
                caption: "System Architecture".to_string(),
            },
        );
        table.insert(
            "Figure 2".to_string(),
            DiagramEntry {
                fragment: "02-missing.html".to_string(),
                caption: "Database Schema".to_string(),
            },
        );
        table.insert(
            "Figure 3".to_string(),
            DiagramEntry {
                fragment: "03-no-wrapper.html".to_string(),
                caption: "User Workflow".to_string(),
            },
        );
        table
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with("diagrams/01-system-architecture.html", ARCH)
            .with("diagrams/03-no-wrapper.html", "<body><p>only prose</p></body>")
    }

    #[test]
    fn test_resolve_builds_wrapped_block() {
        let table = table();
        let store = store();
        let mut resolver = DiagramResolver::new(&table, &store, "diagrams");

        let block = resolver.resolve("Figure 1").unwrap();

        assert_eq!(
            block.scoped_style,
            r#"figure[data-figure="Figure 1"] .box { border: 1px solid; }"#
        );
        assert_eq!(
            block.body.to_html(),
            r#"<div class="report-diagram"><div class="diagram-wrap"><div class="box">Device</div></div></div>"#
        );
        assert_eq!(block.caption_line(), "Figure 1: System Architecture");
    }

    #[test]
    fn test_figure_is_a_deep_copy_with_caption() {
        let table = table();
        let store = store();
        let mut resolver = DiagramResolver::new(&table, &store, "diagrams");
        let block = resolver.resolve("Figure 1").unwrap().clone();

        let mut first = block.to_figure();
        let second = block.to_figure();
        first.children.clear();

        assert_eq!(block.to_figure(), second);
        assert_eq!(second.attr("data-figure"), Some("Figure 1"));
        assert!(second.to_html().ends_with(
            r#"<figcaption class="figure-caption">Figure 1: System Architecture</figcaption></figure>"#
        ));
    }

    #[test]
    fn test_scope_css_confines_rules_to_figure() {
        let css = "/* page */ body { margin: 0; }\nh2, .node > span { color: red; }\n\
                   @media print { body .box { display: none; } }\n\
                   @keyframes pulse { from { opacity: 0; } to { opacity: 1; } }";
        let scope = r#"figure[data-figure="Figure 2"]"#;

        assert_eq!(
            scope_css(css, scope),
            [
                r#"figure[data-figure="Figure 2"] { margin: 0; }"#,
                r#"figure[data-figure="Figure 2"] h2, figure[data-figure="Figure 2"] .node > span { color: red; }"#,
                "@media print {\nfigure[data-figure=\"Figure 2\"] .box { display: none; }\n}",
                "@keyframes pulse { from { opacity: 0; } to { opacity: 1; } }",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_not_found_reasons() {
        let table = table();
        let store = store();
        let mut resolver = DiagramResolver::new(&table, &store, "diagrams");

        for (figure, expected) in [
            ("Figure 9", NotFoundReason::Unmapped),
            ("Figure 2", NotFoundReason::FragmentMissing),
            ("Figure 3", NotFoundReason::WrapperMissing),
        ] {
            match resolver.resolve(figure) {
                Err(ResolveError::NotFound { reason, .. }) => assert_eq!(reason, expected),
                other => panic!("expected NotFound for {}, got {:?}", figure, other),
            }
        }
    }

    #[test]
    fn test_store_errors_propagate() {
        let mut table = table();
        if let Some(entry) = table.get_mut("Figure 1") {
            entry.fragment = "../escape.html".to_string();
        }
        let dir = tempfile::tempdir().unwrap();
        let disk = DirStore::new(dir.path());
        let mut resolver = DiagramResolver::new(&table, &disk, "");

        assert!(matches!(
            resolver.resolve("Figure 1"),
            Err(ResolveError::Store { source: StoreError::InvalidName(_), .. })
        ));
    }

    #[test]
    fn test_misses_are_cached() {
        let table = table();
        let store = store();
        let mut resolver = DiagramResolver::new(&table, &store, "diagrams");

        assert!(resolver.resolve("Figure 2").is_err());
        store
            .write("diagrams/02-missing.html", ARCH.as_bytes())
            .unwrap();
        assert!(resolver.resolve("Figure 2").is_err());
    }
}
