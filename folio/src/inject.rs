//! Anchor matching and diagram injection
//!
//! Rules are applied in declaration order. For each rule that applies to a
//! section, the first anchor in document order wins: a heading whose
//! normalized text equals the pattern, or a text node containing it. The
//! diagram is inserted right after the anchor's block, and the
//! `(section, figure)` pair is recorded so it is never inserted twice.

use crate::diagram::{DiagramResolver, ResolveError};
use crate::document::Section;
use crate::markup::{ContentNode, Element};
use crate::report_config::{AnchorMode, AnchorRule};
use crate::sectionize::{normalize_marker, starts_with_word};
use std::collections::BTreeSet;
use std::fmt;

/// Containers a figure may be inserted into
const FLOW_CONTAINERS: &[&str] = &[
    "#fragment",
    "article",
    "blockquote",
    "body",
    "div",
    "main",
    "section",
];

/// What happened to one applicable rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionOutcome {
    Injected { section: String, figure: String },
    AlreadyPresent { section: String, figure: String },
    AnchorMissed {
        section: String,
        figure: String,
        pattern: String,
    },
    DiagramUnavailable {
        section: String,
        figure: String,
        reason: String,
    },
}

impl InjectionOutcome {
    /// Whether this outcome should surface as a build warning
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            InjectionOutcome::AnchorMissed { .. } | InjectionOutcome::DiagramUnavailable { .. }
        )
    }
}

impl fmt::Display for InjectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionOutcome::Injected { section, figure } => {
                write!(f, "{} injected into '{}'", figure, section)
            }
            InjectionOutcome::AlreadyPresent { section, figure } => {
                write!(f, "{} already present in '{}'", figure, section)
            }
            InjectionOutcome::AnchorMissed {
                section,
                figure,
                pattern,
            } => write!(
                f,
                "{} omitted from '{}': anchor '{}' not found",
                figure, section, pattern
            ),
            InjectionOutcome::DiagramUnavailable {
                section,
                figure,
                reason,
            } => write!(f, "{} omitted from '{}': {}", figure, section, reason),
        }
    }
}

/// Injects diagrams into sections, at most once per `(section, figure)`
#[derive(Debug, Default)]
pub struct Injector {
    consumed: BTreeSet<(String, String)>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every rule that targets `section`
    ///
    /// # Parameters
    /// * `section` - Section to modify in place
    /// * `resolver` - Source of diagram blocks
    /// * `rules` - Anchor rules in declaration order
    ///
    /// # Returns
    /// * `Ok(outcomes)` - One outcome per applicable rule
    /// * `Err(ResolveError::Store)` - A diagram fragment could not be read
    pub fn inject(
        &mut self,
        section: &mut Section,
        resolver: &mut DiagramResolver<'_>,
        rules: &[AnchorRule],
    ) -> Result<Vec<InjectionOutcome>, ResolveError> {
        let mut outcomes = Vec::new();
        let applicable: Vec<&AnchorRule> = rules
            .iter()
            .filter(|rule| rule_applies(rule, section))
            .collect();

        for rule in applicable {
            let key = (section.title.clone(), rule.figure.clone());
            if self.consumed.contains(&key) || has_figure(&section.content, &rule.figure) {
                self.consumed.insert(key);
                outcomes.push(InjectionOutcome::AlreadyPresent {
                    section: section.title.clone(),
                    figure: rule.figure.clone(),
                });
                continue;
            }

            let Some(path) = find_anchor(&section.content, &rule.pattern, rule.mode) else {
                log::warn!(
                    "Anchor '{}' for {} not found in '{}'",
                    rule.pattern,
                    rule.figure,
                    section.title
                );
                outcomes.push(InjectionOutcome::AnchorMissed {
                    section: section.title.clone(),
                    figure: rule.figure.clone(),
                    pattern: rule.pattern.clone(),
                });
                continue;
            };

            let figure = match resolver.resolve(&rule.figure) {
                Ok(block) => block.to_figure(),
                Err(ResolveError::NotFound { figure, reason }) => {
                    log::warn!("{} omitted from '{}': {}", figure, section.title, reason);
                    outcomes.push(InjectionOutcome::DiagramUnavailable {
                        section: section.title.clone(),
                        figure,
                        reason: reason.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            insert_after(&mut section.content, &path, figure);
            log::info!("Injected {} into '{}'", rule.figure, section.title);
            self.consumed.insert(key);
            outcomes.push(InjectionOutcome::Injected {
                section: section.title.clone(),
                figure: rule.figure.clone(),
            });
        }

        Ok(outcomes)
    }
}

/// Whether a rule's section predicate selects this section
///
/// Exact title match, or the predicate appears in the title or heading as
/// a whole-word, case-insensitive token sequence (so "Chapter 1" never
/// selects "Chapter 10").
pub fn rule_applies(rule: &AnchorRule, section: &Section) -> bool {
    if rule.section == section.title {
        return true;
    }
    let predicate = normalize_marker(&rule.section);
    if predicate.is_empty() {
        return false;
    }
    std::iter::once(section.title.as_str())
        .chain(section.heading.as_deref())
        .any(|candidate| contains_words(&normalize_marker(candidate), &predicate))
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && starts_with_word(&haystack[start..], needle)
    })
}

fn has_figure(root: &Element, figure: &str) -> bool {
    root.contains_element(&|el| el.attr("data-figure") == Some(figure))
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Path of child indices from `root` to the node after which to insert
pub fn find_anchor(root: &Element, pattern: &str, mode: AnchorMode) -> Option<Vec<usize>> {
    let wanted = normalize_text(pattern);
    let mut path = Vec::new();
    let mut parents = vec![root.tag.as_str()];
    search(root, pattern, &wanted, mode, &mut path, &mut parents)
}

/// Depth-first search in document order
///
/// `parents` holds the tags along `path`, root first, so the climb to a
/// flow-level block can happen without re-walking the tree. Literal text is
/// matched per text node first; an element whose decoded text contains the
/// pattern matches when no descendant does, which covers text split by
/// entity references.
fn search<'a>(
    element: &'a Element,
    pattern: &str,
    wanted: &str,
    mode: AnchorMode,
    path: &mut Vec<usize>,
    parents: &mut Vec<&'a str>,
) -> Option<Vec<usize>> {
    for (index, child) in element.children.iter().enumerate() {
        path.push(index);
        let hit = match child {
            ContentNode::Element(el) if el.heading_level().is_some() => {
                mode != AnchorMode::Text && normalize_text(&el.text_content()) == wanted
            }
            ContentNode::Text(text) => mode != AnchorMode::Heading && text.contains(pattern),
            _ => false,
        };
        if hit {
            return Some(climb_to_flow_block(path, parents));
        }

        if let ContentNode::Element(el) = child {
            if el.heading_level().is_none() || mode != AnchorMode::Heading {
                parents.push(el.tag.as_str());
                if let Some(found) = search(el, pattern, wanted, mode, path, parents) {
                    return Some(found);
                }
                parents.pop();
                if mode != AnchorMode::Heading && el.text_content().contains(pattern) {
                    return Some(climb_to_flow_block(path, parents));
                }
            }
        }
        path.pop();
    }
    None
}

/// Shorten `path` to the nearest ancestor whose parent is a flow container
fn climb_to_flow_block(path: &[usize], parents: &[&str]) -> Vec<usize> {
    // parents[k] is the tag of the node at path[..k]
    (1..=path.len())
        .rev()
        .find(|&len| FLOW_CONTAINERS.contains(&parents[len - 1]))
        .map_or_else(|| path[..1].to_vec(), |len| path[..len].to_vec())
}

fn insert_after(root: &mut Element, path: &[usize], figure: Element) {
    let Some((&last, parent_path)) = path.split_last() else {
        root.children.push(ContentNode::Element(figure));
        return;
    };
    let mut parent = root;
    for &index in parent_path {
        match parent.children.get_mut(index) {
            Some(ContentNode::Element(el)) => parent = el,
            _ => return,
        }
    }
    let at = (last + 1).min(parent.children.len());
    parent.children.insert(at, ContentNode::Element(figure));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SectionKind;
    use crate::fragment_store::MemoryStore;
    use crate::markup::{parse_fragment, parse_markdown};
    use crate::report_config::DiagramEntry;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const DIAGRAM: &str = r#"<style>.n{}</style><div class="diagram-wrap"><svg>arch</svg></div>"#;

    fn section(title: &str, html: &str) -> Section {
        Section {
            title: title.to_string(),
            heading: None,
            kind: SectionKind::Chapter,
            order: 0,
            content: parse_fragment(html),
        }
    }

    fn rule(section: &str, pattern: &str, figure: &str, mode: AnchorMode) -> AnchorRule {
        AnchorRule {
            section: section.to_string(),
            pattern: pattern.to_string(),
            figure: figure.to_string(),
            mode,
        }
    }

    fn table() -> BTreeMap<String, DiagramEntry> {
        let mut table = BTreeMap::new();
        table.insert(
            "Figure 1".to_string(),
            DiagramEntry {
                fragment: "arch.html".to_string(),
                caption: "System Architecture".to_string(),
            },
        );
        table.insert(
            "Figure 2".to_string(),
            DiagramEntry {
                fragment: "missing.html".to_string(),
                caption: "Database Schema".to_string(),
            },
        );
        table
    }

    fn figure_count(section: &Section, figure: &str) -> usize {
        fn count(el: &Element, figure: &str) -> usize {
            el.children
                .iter()
                .filter_map(ContentNode::as_element)
                .map(|c| usize::from(c.attr("data-figure") == Some(figure)) + count(c, figure))
                .sum()
        }
        count(&section.content, figure)
    }

    #[test]
    fn test_heading_anchor_inserts_after_heading() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section(
            "Chapter–4 Methodology / Approach",
            "<h2>4.1  System   Overview</h2><p>text</p>",
        );
        let rules = [rule("Chapter 4", "4.1 System Overview", "Figure 1", AnchorMode::Heading)];

        let outcomes = Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        assert_eq!(
            outcomes,
            vec![InjectionOutcome::Injected {
                section: "Chapter–4 Methodology / Approach".to_string(),
                figure: "Figure 1".to_string(),
            }]
        );
        let tags: Vec<&str> = section
            .content
            .children
            .iter()
            .filter_map(ContentNode::as_element)
            .map(|el| el.tag.as_str())
            .collect();
        assert_eq!(tags, vec!["h2", "figure", "p"]);
    }

    #[test]
    fn test_text_anchor_inserts_after_enclosing_block() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section(
            "Chapter 6",
            "<ul><li>As shown in <em>Figure 1</em> below</li><li>next</li></ul><p>after</p>",
        );
        let rules = [rule("Chapter 6", "Figure 1", "Figure 1", AnchorMode::Text)];

        Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        // Inserted after the <ul>, never inside <li> or <em>
        let html = section.content.to_html();
        assert!(html.starts_with("<ul><li>As shown in <em>Figure 1</em> below</li><li>next</li></ul><figure"));
        assert!(html.ends_with("</figure><p>after</p>"));
    }

    #[test]
    fn test_only_first_match_is_used() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section("Chapter 4", "<p>see Figure 1</p><p>again Figure 1</p>");
        let rules = [rule("Chapter 4", "Figure 1", "Figure 1", AnchorMode::Any)];

        Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        assert_eq!(figure_count(&section, "Figure 1"), 1);
        assert_eq!(
            section.content.children[1]
                .as_element()
                .map(|el| el.tag.as_str()),
            Some("figure")
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section("Chapter 4", "<h2>4.1 System Overview</h2>");
        let rules = [rule("Chapter 4", "4.1 System Overview", "Figure 1", AnchorMode::Any)];
        let mut injector = Injector::new();

        injector.inject(&mut section, &mut resolver, &rules).unwrap();
        let after_first = section.clone();
        let outcomes = injector.inject(&mut section, &mut resolver, &rules).unwrap();

        assert_eq!(section, after_first);
        assert!(matches!(outcomes[0], InjectionOutcome::AlreadyPresent { .. }));

        // A fresh injector sees the existing figure and also skips
        let outcomes = Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();
        assert_eq!(section, after_first);
        assert!(matches!(outcomes[0], InjectionOutcome::AlreadyPresent { .. }));
    }

    #[test]
    fn test_two_rules_same_figure_inject_once() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section("Chapter 4", "<h2>A</h2><h2>B</h2>");
        let rules = [
            rule("Chapter 4", "A", "Figure 1", AnchorMode::Heading),
            rule("Chapter 4", "B", "Figure 1", AnchorMode::Heading),
        ];

        Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        assert_eq!(figure_count(&section, "Figure 1"), 1);
    }

    #[test]
    fn test_misses_leave_section_unchanged() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = section("Chapter 5", "<h2>5.1 Hardware Design</h2>");
        let original = section.clone();
        let rules = [
            rule("Chapter 5", "5.9 Nowhere", "Figure 1", AnchorMode::Any),
            rule("Chapter 5", "5.1 Hardware Design", "Figure 2", AnchorMode::Any),
        ];

        let outcomes = Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        assert_eq!(section, original);
        assert!(outcomes.iter().all(InjectionOutcome::is_warning));
        assert!(matches!(outcomes[1], InjectionOutcome::DiagramUnavailable { .. }));
    }

    #[test]
    fn test_heading_mode_ignores_body_text() {
        let root = parse_fragment("<p>4.1 System Overview</p><h3>4.1 System Overview</h3>");
        assert_eq!(
            find_anchor(&root, "4.1 System Overview", AnchorMode::Heading),
            Some(vec![1])
        );
        assert_eq!(
            find_anchor(&root, "4.1 System Overview", AnchorMode::Any),
            Some(vec![0])
        );
    }

    #[test]
    fn test_text_anchor_matches_across_entities() {
        let root = parse_markdown("Intro.\n\nThe R&D results are below.\n\nOutro.\n");
        let path = find_anchor(&root, "R&D results", AnchorMode::Text).unwrap();
        assert_eq!(path.len(), 1);
        let anchor = root.children[path[0]].as_element().unwrap();
        assert_eq!(anchor.text_content(), "The R&D results are below.");

        let nested = parse_fragment("<div><p>x</p><p>Q&amp;A <em>session</em></p><p>y</p></div>");
        assert_eq!(
            find_anchor(&nested, "Q&A session", AnchorMode::Any),
            Some(vec![0, 1])
        );
        assert_eq!(find_anchor(&nested, "Q&A session", AnchorMode::Heading), None);
    }

    #[test]
    fn test_text_anchor_with_ampersand_injects() {
        let table = table();
        let store = MemoryStore::new().with("arch.html", DIAGRAM);
        let mut resolver = DiagramResolver::new(&table, &store, "");
        let mut section = Section {
            content: parse_markdown("The R&D results are below.\n\nNext.\n"),
            ..section("Chapter 7", "")
        };
        let rules = [rule("Chapter 7", "R&D results", "Figure 1", AnchorMode::Text)];

        let outcomes = Injector::new()
            .inject(&mut section, &mut resolver, &rules)
            .unwrap();

        assert!(matches!(outcomes[0], InjectionOutcome::Injected { .. }));
        let tags: Vec<&str> = section
            .content
            .children
            .iter()
            .filter_map(ContentNode::as_element)
            .map(|el| el.tag.as_str())
            .collect();
        assert_eq!(tags, vec!["p", "figure", "p"]);
    }

    #[test]
    fn test_rule_applies_by_word_bounded_token() {
        let r = rule("Chapter 1", "x", "Figure 1", AnchorMode::Any);
        assert!(rule_applies(&r, &section("Chapter–1 Introduction", "")));
        assert!(!rule_applies(&r, &section("Chapter–10 Appendix", "")));
        assert!(!rule_applies(&r, &section("References", "")));
    }
}
