//! Splits a monolithic Markdown report into manifest sections
//!
//! A section starts at a heading line whose level matches its kind
//! (front matter `##`, chapters and references `#` by default) and whose
//! text starts with the entry's marker. Everything before the first marker
//! is preamble and is dropped. Marker lines themselves are not part of the
//! section body; their text is kept as the section heading.

use crate::document::SectionKind;
use crate::report_config::{MarkerLevels, SectionEntry};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// `### N.M title` sub-headings that are promoted to `##`
static PROMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^###(\s+\d+\.\d+(?:\s|$))").expect("promotion pattern is valid"));

/// `Chapter–4`, `Chapter - 4` and friends
static NUMBER_DASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{L}+)\s*[-\u{2010}\u{2011}\u{2013}\u{2014}]\s*(\d)")
        .expect("dash pattern is valid")
});

/// Errors raised while splitting a monolithic source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionizeError {
    #[error("Malformed source: marker '{marker}' for section '{title}' was not found")]
    MissingMarker { marker: String, title: String },

    #[error("Malformed source: marker '{marker}' appears again at line {line}")]
    DuplicateMarker { marker: String, line: usize },

    #[error("Malformed source: marker '{marker}' at line {line} comes after '{previous}', out of manifest order")]
    OutOfOrder {
        marker: String,
        line: usize,
        previous: String,
    },
}

/// A section cut from the source, before Markdown conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// Index of the manifest entry
    pub order: usize,
    /// Canonical title from the manifest
    pub title: String,
    /// Marker line text with dashes normalized
    pub heading: String,
    pub kind: SectionKind,
    /// Section body with numbered sub-headings promoted
    pub markdown: String,
}

/// Precomputed matching data for one manifest entry
#[derive(Debug)]
struct MarkerSpec {
    level: u8,
    markers: Vec<String>,
}

/// Splits sources according to a manifest
#[derive(Debug)]
pub struct Sectionizer<'a> {
    manifest: &'a [SectionEntry],
    specs: Vec<MarkerSpec>,
}

impl<'a> Sectionizer<'a> {
    pub fn new(manifest: &'a [SectionEntry], levels: &MarkerLevels) -> Self {
        let specs = manifest
            .iter()
            .map(|entry| MarkerSpec {
                level: levels.level_for(entry.kind.into()),
                markers: entry.marker_texts().map(normalize_marker).collect(),
            })
            .collect();
        Self { manifest, specs }
    }

    /// Split a monolithic source into ordered sections
    ///
    /// # Parameters
    /// * `source` - The whole Markdown report
    ///
    /// # Returns
    /// * `Ok(Vec<RawSection>)` - One section per manifest entry, in manifest order
    /// * `Err(SectionizeError)` - A marker is missing, repeated or out of order
    pub fn sectionize(&self, source: &str) -> Result<Vec<RawSection>, SectionizeError> {
        let mut seen = vec![false; self.manifest.len()];
        let mut sections: Vec<RawSection> = Vec::with_capacity(self.manifest.len());
        let mut current: Option<RawSection> = None;
        let mut last_index: Option<usize> = None;
        let mut in_fence = false;

        for (line_no, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some((index, heading)) = self.match_marker(line) {
                    let entry = &self.manifest[index];
                    if seen[index] {
                        return Err(SectionizeError::DuplicateMarker {
                            marker: entry.marker.clone(),
                            line: line_no + 1,
                        });
                    }
                    if let Some(last) = last_index.filter(|&last| last > index) {
                        return Err(SectionizeError::OutOfOrder {
                            marker: entry.marker.clone(),
                            line: line_no + 1,
                            previous: self.manifest[last].marker.clone(),
                        });
                    }

                    log::debug!("Line {}: section '{}' starts", line_no + 1, entry.title);
                    sections.extend(current.take());
                    seen[index] = true;
                    last_index = Some(index);
                    current = Some(RawSection {
                        order: index,
                        title: entry.title.clone(),
                        heading,
                        kind: entry.kind.into(),
                        markdown: String::new(),
                    });
                    continue;
                }
            }

            // Lines before the first marker are preamble
            if let Some(section) = current.as_mut() {
                if in_fence {
                    section.markdown.push_str(line);
                } else {
                    section.markdown.push_str(&promote_heading(line));
                }
                section.markdown.push('\n');
            }
        }
        sections.extend(current);

        if let Some(index) = seen.iter().position(|found| !found) {
            let entry = &self.manifest[index];
            return Err(SectionizeError::MissingMarker {
                marker: entry.marker.clone(),
                title: entry.title.clone(),
            });
        }

        log::info!("Sectionized source into {} sections", sections.len());
        Ok(sections)
    }

    /// Match a line against every manifest marker
    ///
    /// Returns the manifest index and the display heading.
    fn match_marker(&self, line: &str) -> Option<(usize, String)> {
        let level = line.chars().take_while(|&c| c == '#').count();
        let rest = &line[level..];
        if level == 0 || !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let text = rest.trim();
        let normalized = normalize_marker(text);

        self.specs
            .iter()
            .position(|spec| {
                usize::from(spec.level) == level
                    && spec
                        .markers
                        .iter()
                        .any(|marker| starts_with_word(&normalized, marker))
            })
            .map(|index| (index, display_heading(text)))
    }
}

/// Lowercase, treat dashes as spaces, collapse whitespace
pub fn normalize_marker(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '-' | '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Heading text as recorded on the section: `Chapter–4 Design` becomes `Chapter 4 Design`
pub fn display_heading(text: &str) -> String {
    let replaced = NUMBER_DASH_RE.replace(text.trim(), "$1 $2");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `text` starts with `prefix` followed by a word boundary
///
/// `chapter 1` matches `chapter 1 introduction` but not `chapter 10`.
pub fn starts_with_word(text: &str, prefix: &str) -> bool {
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}

/// Promote `### N.M` to `##`, leaving `### N.M.K` alone
pub fn promote_heading(line: &str) -> std::borrow::Cow<'_, str> {
    PROMOTE_RE.replace(line, "##$1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_config::{EntryKind, ReportConfig};
    use pretty_assertions::assert_eq;

    fn entry(title: &str, kind: EntryKind, marker: &str) -> SectionEntry {
        SectionEntry {
            title: title.to_string(),
            kind,
            marker: marker.to_string(),
            aliases: Vec::new(),
            fragment: format!("{}.html", title.replace(' ', "-")),
        }
    }

    fn small_manifest() -> Vec<SectionEntry> {
        vec![
            entry("Title Page (i)", EntryKind::TitlePage, "Title Page"),
            entry("Abstract (v)", EntryKind::Abstract, "Abstract"),
            entry("Chapter–1 Introduction", EntryKind::Chapter, "Chapter 1"),
            entry("Chapter–10 Appendix", EntryKind::Chapter, "Chapter 10"),
            entry("References", EntryKind::Reference, "References"),
        ]
    }

    const SMALL_SOURCE: &str = "\
Draft notes, not part of the report

## Title Page
ATTENDRO

## Abstract
Attendance made simple.

# Chapter–1 Introduction
Intro text.

### 1.1 Background
### 1.1.2 Detail

# Chapter-10 Appendix
Extra.

# References
1. Someone, 2024.
";

    #[test]
    fn test_sections_follow_manifest_order() {
        let manifest = small_manifest();
        let sectionizer = Sectionizer::new(&manifest, &MarkerLevels::default());

        let sections = sectionizer.sectionize(SMALL_SOURCE).unwrap();

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        let expected: Vec<&str> = manifest.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, expected);
        assert_eq!(
            sections.iter().map(|s| s.order).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_preamble_and_marker_lines_are_excluded() {
        let manifest = small_manifest();
        let sections = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(SMALL_SOURCE)
            .unwrap();

        assert_eq!(sections[0].markdown, "ATTENDRO\n\n");
        assert!(sections.iter().all(|s| !s.markdown.contains("Draft notes")));
        assert_eq!(sections[2].heading, "Chapter 1 Introduction");
        assert_eq!(sections[3].heading, "Chapter 10 Appendix");
    }

    #[test]
    fn test_numbered_subheadings_are_promoted_one_level() {
        let manifest = small_manifest();
        let sections = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(SMALL_SOURCE)
            .unwrap();

        let body = &sections[2].markdown;
        assert!(body.contains("\n## 1.1 Background\n"));
        assert!(body.contains("\n### 1.1.2 Detail\n"));
    }

    #[test]
    fn test_promote_heading_patterns() {
        assert_eq!(promote_heading("### 4.1 System Overview"), "## 4.1 System Overview");
        assert_eq!(promote_heading("### 4.1.2 Detail"), "### 4.1.2 Detail");
        assert_eq!(promote_heading("#### 4.1 Deeper"), "#### 4.1 Deeper");
        assert_eq!(promote_heading("### Overview"), "### Overview");
    }

    #[test]
    fn test_missing_marker_names_it() {
        let manifest = small_manifest();
        let source = SMALL_SOURCE.replace("## Abstract\n", "");

        let err = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(&source)
            .unwrap_err();

        assert_eq!(
            err,
            SectionizeError::MissingMarker {
                marker: "Abstract".to_string(),
                title: "Abstract (v)".to_string(),
            }
        );
    }

    #[test]
    fn test_wrong_heading_level_does_not_match() {
        let manifest = small_manifest();
        let source = SMALL_SOURCE.replace("## Abstract", "### Abstract");

        let err = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(&source)
            .unwrap_err();

        assert!(matches!(err, SectionizeError::MissingMarker { marker, .. } if marker == "Abstract"));
    }

    #[test]
    fn test_duplicate_marker_is_rejected() {
        let manifest = small_manifest();
        let source = format!("{}\n## Abstract\nagain\n", SMALL_SOURCE);

        let err = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(&source)
            .unwrap_err();

        assert!(matches!(err, SectionizeError::DuplicateMarker { marker, .. } if marker == "Abstract"));
    }

    #[test]
    fn test_out_of_order_marker_is_rejected() {
        let manifest = small_manifest();
        let source = "## Title Page\nx\n# Chapter 1 Intro\ny\n## Abstract\nz\n";

        let err = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(source)
            .unwrap_err();

        assert_eq!(
            err,
            SectionizeError::OutOfOrder {
                marker: "Abstract".to_string(),
                line: 5,
                previous: "Chapter 1".to_string(),
            }
        );
    }

    #[test]
    fn test_markers_inside_code_fences_are_ignored() {
        let manifest = vec![
            entry("Chapter 1", EntryKind::Chapter, "Chapter 1"),
            entry("References", EntryKind::Reference, "References"),
        ];
        let source = "# Chapter 1\n```\n# References\n```\n# References\nr\n";

        let sections = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize(source)
            .unwrap();

        assert_eq!(sections[0].markdown, "```\n# References\n```\n");
        assert_eq!(sections[1].markdown, "r\n");
    }

    #[test]
    fn test_default_manifest_every_marker_is_required() {
        let config = ReportConfig::from_toml_str(ReportConfig::default_toml()).unwrap();
        let levels = config.markers;
        let lines: Vec<String> = config
            .sections
            .iter()
            .map(|e| {
                let hashes = "#".repeat(usize::from(levels.level_for(e.kind.into())));
                format!("{} {}\nBody of {}\n", hashes, e.marker, e.title)
            })
            .collect();
        let sectionizer = Sectionizer::new(&config.sections, &levels);

        let sections = sectionizer.sectionize(&lines.concat()).unwrap();
        assert_eq!(sections.len(), config.sections.len());

        for (removed, entry) in config.sections.iter().enumerate() {
            let source: String = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != removed)
                .map(|(_, l)| l.as_str())
                .collect();
            let err = sectionizer.sectionize(&source).unwrap_err();
            assert_eq!(
                err,
                SectionizeError::MissingMarker {
                    marker: entry.marker.clone(),
                    title: entry.title.clone(),
                }
            );
        }
    }

    #[test]
    fn test_alias_matches() {
        let mut toc = entry("Index / Table of Contents (iv)", EntryKind::TableOfContents, "Index");
        toc.aliases.push("Table of Contents".to_string());
        let manifest = vec![toc];

        let sections = Sectionizer::new(&manifest, &MarkerLevels::default())
            .sectionize("## Table of Contents\n1. Intro\n")
            .unwrap();
        assert_eq!(sections[0].heading, "Table of Contents");
    }
}
