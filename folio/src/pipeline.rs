//! Three-stage report pipeline
//!
//! This module orchestrates the three stages of report processing:
//! 1. **Loading**: Cut the monolithic source into sections, or recover each
//!    section from its HTML fragment
//! 2. **Injection**: Splice diagrams into sections at their anchors
//! 3. **Assembly**: Order sections, check completeness and apply the
//!    front-matter templates
//!
//! Rendering and fragment splitting work on the assembled document.

use crate::assemble::{assemble, AssembleError};
use crate::diagram::{DiagramResolver, ResolveError};
use crate::document::{Document, Section, SectionKind};
use crate::extract::{ContentExtractor, ExtractError};
use crate::fragment_store::{join_name, FragmentStore, StoreError};
use crate::front_matter::FrontMatterTemplates;
use crate::inject::{InjectionOutcome, Injector};
use crate::markup::{escape_html, parse_markdown, Element};
use crate::render::{RenderError, RenderTarget, StyleSheet};
use crate::report_config::ReportConfig;
use crate::sectionize::{SectionizeError, Sectionizer};
use itertools::Itertools;
use std::fmt;
use thiserror::Error;

/// Where section content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// One Markdown file split at marker headings
    Monolithic,
    /// One HTML fragment per manifest entry
    Fragments,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Monolithic => write!(f, "monolithic"),
            SourceMode::Fragments => write!(f, "fragments"),
        }
    }
}

/// Why one fragment could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("fragment is missing")]
    Missing,

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Errors that abort a build
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to read {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Sectionize(#[from] SectionizeError),

    #[error("{} fragment(s) failed: {}", .0.len(), describe_failures(.0))]
    FragmentsFailed(Vec<(String, FragmentError)>),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("Failed to render {target} output: {source}")]
    Render {
        target: RenderTarget,
        #[source]
        source: RenderError,
    },

    #[error("Failed to write {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: StoreError,
    },
}

fn describe_failures(failures: &[(String, FragmentError)]) -> String {
    failures
        .iter()
        .map(|(name, error)| format!("{} ({})", name, error))
        .join(", ")
}

/// A non-fatal problem found while building
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWarning(pub String);

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage 1: Load every manifest section
///
/// # Parameters
/// * `config` - Report configuration
/// * `store` - Store rooted at the project directory
/// * `mode` - Where section content comes from
/// * `templates` - Front-matter templates; their sections tolerate a missing fragment
///
/// # Returns
/// * `Ok(Vec<Section>)` - One section per manifest entry, in manifest order
/// * `Err(BuildError)` - Malformed source, failed fragments or an I/O error
pub fn load_sections(
    config: &ReportConfig,
    store: &dyn FragmentStore,
    mode: SourceMode,
    templates: &FrontMatterTemplates,
) -> Result<Vec<Section>, BuildError> {
    match mode {
        SourceMode::Monolithic => load_monolithic(config, store),
        SourceMode::Fragments => load_fragments(config, store, templates),
    }
}

fn load_monolithic(
    config: &ReportConfig,
    store: &dyn FragmentStore,
) -> Result<Vec<Section>, BuildError> {
    let name = &config.paths.source;
    let source = store.read(name).map_err(|source| BuildError::Store {
        name: name.clone(),
        source,
    })?;

    let raw_sections = Sectionizer::new(&config.sections, &config.markers).sectionize(&source)?;
    Ok(raw_sections
        .into_iter()
        .map(|raw| Section {
            content: parse_markdown(&raw.markdown),
            title: raw.title,
            heading: Some(raw.heading),
            kind: raw.kind,
            order: raw.order,
        })
        .collect())
}

fn load_fragments(
    config: &ReportConfig,
    store: &dyn FragmentStore,
    templates: &FrontMatterTemplates,
) -> Result<Vec<Section>, BuildError> {
    let extractor = ContentExtractor::default();
    let mut sections = Vec::with_capacity(config.sections.len());
    let mut failures = Vec::new();

    for (order, entry) in config.sections.iter().enumerate() {
        let kind: SectionKind = entry.kind.into();
        let templated = kind
            .front_matter()
            .is_some_and(|fm| templates.get(fm).is_some());
        let name = join_name(&config.paths.fragments, &entry.fragment);

        let content = match store.read(&name) {
            Ok(raw) => extractor.extract(&raw).map_err(FragmentError::from),
            Err(StoreError::NotFound(_)) => Err(FragmentError::Missing),
            Err(source) => return Err(BuildError::Store { name, source }),
        };

        let content = match content {
            Ok(content) => content,
            Err(error) if templated => {
                log::debug!("{}: {}; template will be used", name, error);
                Element::fragment()
            }
            Err(error) => {
                log::warn!("{}: {}", name, error);
                failures.push((name, error));
                continue;
            }
        };

        sections.push(Section {
            title: entry.title.clone(),
            heading: None,
            kind,
            order,
            content,
        });
    }

    if !failures.is_empty() {
        return Err(BuildError::FragmentsFailed(failures));
    }
    log::info!("Loaded {} fragments", sections.len());
    Ok(sections)
}

/// Stage 2: Inject diagrams into every section
///
/// # Returns
/// * `Ok(Vec<BuildWarning>)` - Missed anchors and unavailable diagrams
/// * `Err(BuildError)` - A diagram fragment could not be read
pub fn inject_diagrams(
    sections: &mut [Section],
    config: &ReportConfig,
    store: &dyn FragmentStore,
) -> Result<Vec<BuildWarning>, BuildError> {
    let mut resolver = DiagramResolver::new(&config.diagrams, store, config.paths.diagrams.as_str());
    let mut injector = Injector::new();
    let mut warnings = Vec::new();

    for section in sections.iter_mut() {
        let outcomes = injector.inject(section, &mut resolver, &config.anchors)?;
        warnings.extend(
            outcomes
                .iter()
                .filter(|outcome| outcome.is_warning())
                .map(|outcome| BuildWarning(outcome.to_string())),
        );
        let injected = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, InjectionOutcome::Injected { .. }))
            .count();
        if injected > 0 {
            log::info!("{} diagram(s) injected into '{}'", injected, section.title);
        }
    }

    Ok(warnings)
}

/// Stage 3: Assemble the final document
pub fn assemble_document(
    sections: Vec<Section>,
    config: &ReportConfig,
    templates: &FrontMatterTemplates,
) -> Result<Document, BuildError> {
    Ok(assemble(
        sections,
        &config.sections,
        templates,
        config.report.clone(),
    )?)
}

/// Run all three stages
///
/// # Returns
/// * `Ok((Document, Vec<BuildWarning>))` - The assembled document and every warning
/// * `Err(BuildError)` - The first fatal error
pub fn build_document(
    config: &ReportConfig,
    store: &dyn FragmentStore,
    mode: SourceMode,
) -> Result<(Document, Vec<BuildWarning>), BuildError> {
    let templates = FrontMatterTemplates::from_metadata(&config.report);
    let mut sections = load_sections(config, store, mode, &templates)?;
    let warnings = inject_diagrams(&mut sections, config, store)?;
    let document = assemble_document(sections, config, &templates)?;
    Ok((document, warnings))
}

/// Render the document for one target
pub fn render(
    document: &Document,
    target: RenderTarget,
    config: &ReportConfig,
    store: &dyn FragmentStore,
) -> Result<Vec<u8>, BuildError> {
    let style = StyleSheet::load(target, &config.style, store)
        .map_err(|source| BuildError::Render { target, source })?;
    let renderer = target.renderer();
    log::info!("Rendering {} output", renderer.target());
    renderer
        .render(document, &style)
        .map_err(|source| BuildError::Render { target, source })
}

/// Write every section to its fragment as a standalone page
///
/// Pages wrap their content in `<div class="paper">`, so reading them back
/// in fragments mode reproduces the document.
///
/// # Returns
/// * `Ok(Vec<String>)` - Names of the fragments written, in document order
/// * `Err(BuildError)` - A fragment could not be written
pub fn split(
    document: &Document,
    store: &dyn FragmentStore,
    config: &ReportConfig,
) -> Result<Vec<String>, BuildError> {
    let mut written = Vec::with_capacity(document.sections().len());

    for section in document.sections() {
        let Some(entry) = config.sections.get(section.order) else {
            continue;
        };
        let name = join_name(&config.paths.fragments, &entry.fragment);
        let page = standalone_page(section);
        store
            .write(&name, page.as_bytes())
            .map_err(|source| BuildError::Write {
                name: name.clone(),
                source,
            })?;
        log::info!("Wrote {}", name);
        written.push(name);
    }

    Ok(written)
}

fn standalone_page(section: &Section) -> String {
    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    page.push_str(&format!(
        "<title>{}</title>\n",
        escape_html(&section.title)
    ));
    page.push_str("</head>\n<body>\n<div class=\"paper\">\n");
    if let Some(heading) = &section.heading {
        page.push_str(&format!(
            "<h1 class=\"section-title\">{}</h1>\n",
            escape_html(heading)
        ));
    }
    page.push_str(&section.content.to_html());
    page.push_str("\n</div>\n</body>\n</html>\n");
    page
}

/// Result of a dry run over the whole pipeline
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Sections found in the source
    pub sections: usize,
    /// Figures that resolved
    pub figures_ok: Vec<String>,
    /// Figures that did not, with the reason
    pub figures_missing: Vec<(String, String)>,
    /// Anchor misses and other non-fatal problems
    pub warnings: Vec<BuildWarning>,
}

/// Load, resolve every figure and dry-run the anchors without writing anything
///
/// # Returns
/// * `Ok(ValidationReport)` - Nothing fatal; the report may still hold warnings
/// * `Err(BuildError)` - The build would fail
pub fn validate(
    config: &ReportConfig,
    store: &dyn FragmentStore,
    mode: SourceMode,
) -> Result<ValidationReport, BuildError> {
    let templates = FrontMatterTemplates::from_metadata(&config.report);
    let mut sections = load_sections(config, store, mode, &templates)?;

    let mut report = ValidationReport {
        sections: sections.len(),
        ..ValidationReport::default()
    };

    let mut resolver = DiagramResolver::new(&config.diagrams, store, config.paths.diagrams.as_str());
    for figure in config.diagrams.keys() {
        match resolver.resolve(figure) {
            Ok(_) => report.figures_ok.push(figure.clone()),
            Err(ResolveError::NotFound { reason, .. }) => report
                .figures_missing
                .push((figure.clone(), reason.to_string())),
            Err(e) => return Err(e.into()),
        }
    }

    report.warnings = inject_diagrams(&mut sections, config, store)?;
    assemble_document(sections, config, &templates)?;
    Ok(report)
}
