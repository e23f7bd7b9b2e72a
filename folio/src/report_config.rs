//! Report configuration from folio.toml
//!
//! The configuration is the single source of truth for a build: report
//! metadata, the ordered section manifest, the diagram table and the anchor
//! rules. It is loaded once and passed by reference into every stage.

use crate::document::{FrontMatterKind, SectionKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Name of the configuration file at the root of a report project
pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// Default configuration written by `folio init`
const DEFAULT_CONFIG: &str = include_str!("templates/folio.toml");

/// Main report configuration from folio.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report metadata used by the front-matter templates
    pub report: ReportMetadata,

    /// Locations of sources and outputs, relative to the project root
    #[serde(default)]
    pub paths: PathsConfig,

    /// Heading levels that mark section boundaries in a monolithic source
    #[serde(default)]
    pub markers: MarkerLevels,

    /// Page setup and stylesheet overrides
    #[serde(default)]
    pub style: StyleConfig,

    /// The canonical, ordered section manifest
    pub sections: Vec<SectionEntry>,

    /// Figure identifier to diagram fragment mapping
    #[serde(default)]
    pub diagrams: BTreeMap<String, DiagramEntry>,

    /// Where diagrams are spliced into sections
    #[serde(default)]
    pub anchors: Vec<AnchorRule>,
}

/// Metadata describing the report and its authors
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportMetadata {
    /// Project title
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub programme: String,
    #[serde(default)]
    pub institute: String,
    #[serde(default)]
    pub academic_year: String,
    #[serde(default)]
    pub place: String,
}

/// File the save endpoint writes unless configured otherwise
pub const DEFAULT_SAVE_TARGET: &str = "Attendro_Research_Paper_IRJMETS.html";

/// Source and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Monolithic Markdown source
    pub source: String,
    /// Directory holding one HTML fragment per section
    pub fragments: String,
    /// Directory holding diagram fragments
    pub diagrams: String,
    /// Directory that receives rendered outputs
    pub output: String,
    /// Fragment written by the save endpoint
    pub save_target: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: "report.md".to_string(),
            fragments: "chapters".to_string(),
            diagrams: "diagrams".to_string(),
            output: "output".to_string(),
            save_target: DEFAULT_SAVE_TARGET.to_string(),
        }
    }
}

/// Markdown heading level of each marker family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkerLevels {
    pub front_matter_level: u8,
    pub chapter_level: u8,
    pub reference_level: u8,
}

impl Default for MarkerLevels {
    fn default() -> Self {
        Self {
            front_matter_level: 2,
            chapter_level: 1,
            reference_level: 1,
        }
    }
}

impl MarkerLevels {
    /// Heading level used by markers of the given section kind
    pub fn level_for(&self, kind: SectionKind) -> u8 {
        match kind {
            SectionKind::FrontMatter(_) => self.front_matter_level,
            SectionKind::Chapter => self.chapter_level,
            SectionKind::Reference => self.reference_level,
        }
    }
}

/// Page setup shared by every renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub margins: Margins,
    pub font_family: String,
    /// Body font size in points
    pub font_size: f32,
    /// Line spacing multiplier
    pub line_spacing: f32,
    /// Optional CSS file replacing the built-in web stylesheet
    pub web_css: Option<String>,
    /// Optional CSS file replacing the built-in print stylesheet
    pub print_css: Option<String>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            margins: Margins::default(),
            font_family: "Times New Roman".to_string(),
            font_size: 12.0,
            line_spacing: 2.0,
            web_css: None,
            print_css: None,
        }
    }
}

/// Page margins in centimetres
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 2.5,
            bottom: 1.25,
            left: 3.5,
            right: 1.25,
        }
    }
}

/// One entry of the section manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionEntry {
    /// Canonical section title
    pub title: String,
    /// What kind of section this is
    pub kind: EntryKind,
    /// Heading text that starts this section in a monolithic source
    pub marker: String,
    /// Alternative spellings of the marker
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Fragment file name under `paths.fragments`
    pub fragment: String,
}

impl SectionEntry {
    /// The marker followed by its aliases
    pub fn marker_texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.marker.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Section kind as spelled in the configuration file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    TitlePage,
    Certificate,
    Acknowledgement,
    TableOfContents,
    Abstract,
    ListOfFigures,
    ListOfTables,
    Chapter,
    Reference,
}

impl From<EntryKind> for SectionKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::TitlePage => SectionKind::FrontMatter(FrontMatterKind::TitlePage),
            EntryKind::Certificate => SectionKind::FrontMatter(FrontMatterKind::Certificate),
            EntryKind::Acknowledgement => {
                SectionKind::FrontMatter(FrontMatterKind::Acknowledgement)
            }
            EntryKind::TableOfContents => {
                SectionKind::FrontMatter(FrontMatterKind::TableOfContents)
            }
            EntryKind::Abstract => SectionKind::FrontMatter(FrontMatterKind::Abstract),
            EntryKind::ListOfFigures => SectionKind::FrontMatter(FrontMatterKind::ListOfFigures),
            EntryKind::ListOfTables => SectionKind::FrontMatter(FrontMatterKind::ListOfTables),
            EntryKind::Chapter => SectionKind::Chapter,
            EntryKind::Reference => SectionKind::Reference,
        }
    }
}

/// A diagram fragment and its caption
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagramEntry {
    /// Fragment file name under `paths.diagrams`
    pub fragment: String,
    /// Caption text following "Figure N: "
    pub caption: String,
}

/// Which nodes an anchor pattern may match
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    /// Only headings whose normalized text equals the pattern
    Heading,
    /// Only text containing the pattern
    Text,
    /// Whichever comes first in document order
    #[default]
    Any,
}

/// Static rule placing a diagram inside a section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnchorRule {
    /// Section title, or a token such as "Chapter 4" found in the title
    pub section: String,
    /// Heading text or literal text to anchor on
    pub pattern: String,
    /// Figure identifier from the diagram table
    pub figure: String,
    #[serde(default, rename = "match")]
    pub mode: AnchorMode,
}

impl ReportConfig {
    /// Load configuration from a folio.toml file
    ///
    /// # Parameters
    /// * `path` - Path to the folio.toml configuration file
    ///
    /// # Returns
    /// * `Ok(ReportConfig)` - Successfully loaded and validated configuration
    /// * `Err(ConfigError)` - Error reading, parsing or validating the file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReportConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in configuration for the reference report
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG
    }

    /// Save configuration to a folio.toml file
    ///
    /// # Parameters
    /// * `path` - Path where the folio.toml file will be written
    ///
    /// # Returns
    /// * `Ok(())` - Successfully saved configuration
    /// * `Err(ConfigError)` - Error serializing or writing the configuration file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        fs::write(&path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// Check the manifest, marker levels and anchors for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.is_empty() {
            return Err(ConfigError::Invalid("no sections in manifest".to_string()));
        }

        for level in [
            self.markers.front_matter_level,
            self.markers.chapter_level,
            self.markers.reference_level,
        ] {
            if !(1..=6).contains(&level) {
                return Err(ConfigError::Invalid(format!(
                    "marker level {} is outside 1..=6",
                    level
                )));
            }
        }

        let mut titles = HashSet::new();
        let mut fragments = HashSet::new();
        for entry in &self.sections {
            if !titles.insert(entry.title.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate section title '{}'",
                    entry.title
                )));
            }
            if !fragments.insert(entry.fragment.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate fragment '{}' (section '{}')",
                    entry.fragment, entry.title
                )));
            }
            if entry.marker_texts().any(|m| m.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "empty marker for section '{}'",
                    entry.title
                )));
            }
        }

        for rule in &self.anchors {
            if !self.diagrams.contains_key(&rule.figure) {
                return Err(ConfigError::Invalid(format!(
                    "anchor '{}' refers to unknown figure '{}'",
                    rule.pattern, rule.figure
                )));
            }
        }

        Ok(())
    }
}

/// Errors that can occur when loading or saving report configuration
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    /// IO error when reading or writing file
    IoError(std::io::Error),

    /// Error parsing TOML
    ParseError(toml::de::Error),

    /// Error serializing to TOML
    SerializeError(toml::ser::Error),

    /// Configuration parsed but is inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "TOML parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "TOML serialize error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderTarget;

    const MINIMAL: &str = r#"
[report]
title = "Smart Attendance"
author = "A. Student"

[[sections]]
title = "Title Page"
kind = "title-page"
marker = "Title Page"
fragment = "Title-Page.html"

[[sections]]
title = "Chapter 1 Introduction"
kind = "chapter"
marker = "Chapter 1"
fragment = "Chapter-1.html"

[diagrams."Figure 1"]
fragment = "01-arch.html"
caption = "System Architecture"

[[anchors]]
section = "Chapter 1"
pattern = "1.1 Overview"
figure = "Figure 1"
"#;

    #[test]
    fn test_parse_minimal_config_applies_defaults() {
        let config = ReportConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.report.title, "Smart Attendance");
        assert_eq!(config.paths.fragments, "chapters");
        assert_eq!(config.markers, MarkerLevels::default());
        assert_eq!(config.style.margins.left, 3.5);
        assert_eq!(config.sections.len(), 2);
        assert_eq!(config.sections[0].kind, EntryKind::TitlePage);
        assert_eq!(config.anchors[0].mode, AnchorMode::Any);
    }

    #[test]
    fn test_default_save_target_matches_template() {
        let minimal = ReportConfig::from_toml_str(MINIMAL).unwrap();
        let template = ReportConfig::from_toml_str(ReportConfig::default_toml()).unwrap();

        assert_eq!(minimal.paths.save_target, template.paths.save_target);
        assert!(RenderTarget::ALL
            .iter()
            .all(|target| target.file_name() != minimal.paths.save_target));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = ReportConfig::from_toml_str(MINIMAL).unwrap();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ReportConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(parsed.sections, config.sections);
        assert_eq!(parsed.diagrams, config.diagrams);
        assert_eq!(parsed.anchors, config.anchors);
        assert_eq!(parsed.report, config.report);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ReportConfig::from_toml_str(ReportConfig::default_toml()).unwrap();

        assert_eq!(config.sections.len(), 15);
        assert_eq!(config.sections[0].title, "Title Page (i)");
        assert_eq!(config.sections[14].title, "References");
        assert_eq!(config.diagrams.len(), 7);
    }

    #[test]
    fn test_duplicate_title_is_rejected() {
        let toml_str = MINIMAL.replace("Chapter 1 Introduction", "Title Page");
        let err = ReportConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(err.to_string().contains("duplicate section title 'Title Page'"));
    }

    #[test]
    fn test_anchor_to_unknown_figure_is_rejected() {
        let toml_str = MINIMAL.replace("figure = \"Figure 1\"", "figure = \"Figure 9\"");
        let err = ReportConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(err.to_string().contains("unknown figure 'Figure 9'"));
    }

    #[test]
    fn test_marker_level_out_of_range_is_rejected() {
        let toml_str = format!("{}\n[markers]\nchapter_level = 7\n", MINIMAL);
        assert!(ReportConfig::from_toml_str(&toml_str).is_err());
    }

    #[test]
    fn test_level_for_kind() {
        let levels = MarkerLevels::default();
        assert_eq!(levels.level_for(SectionKind::Chapter), 1);
        assert_eq!(
            levels.level_for(SectionKind::FrontMatter(FrontMatterKind::Abstract)),
            2
        );
    }
}
