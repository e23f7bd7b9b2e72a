//! Section and document model shared by every pipeline stage

use crate::markup::Element;
use crate::report_config::ReportMetadata;

/// Front-matter pages of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrontMatterKind {
    TitlePage,
    Certificate,
    Acknowledgement,
    TableOfContents,
    Abstract,
    ListOfFigures,
    ListOfTables,
}

/// Structural role of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    FrontMatter(FrontMatterKind),
    Chapter,
    Reference,
}

impl SectionKind {
    /// The front-matter kind, if any
    pub fn front_matter(self) -> Option<FrontMatterKind> {
        match self {
            SectionKind::FrontMatter(kind) => Some(kind),
            _ => None,
        }
    }
}

/// One unit of document structure, created from one manifest entry
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Canonical title from the manifest
    pub title: String,
    /// Heading text recorded from the source marker, if the source had one
    pub heading: Option<String>,
    pub kind: SectionKind,
    /// Index of the manifest entry this section was created from
    pub order: usize,
    /// Owned content tree rooted at a fragment element
    pub content: Element,
}

/// The assembled report, ready for rendering
///
/// Built once per run by [`crate::assemble::assemble`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    metadata: ReportMetadata,
    sections: Vec<Section>,
}

impl Document {
    pub(crate) fn new(metadata: ReportMetadata, sections: Vec<Section>) -> Self {
        Self { metadata, sections }
    }

    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }

    /// Sections in manifest order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Number of diagrams injected across all sections
    pub fn figure_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| count_figures(&section.content))
            .sum()
    }
}

fn count_figures(element: &Element) -> usize {
    element
        .children
        .iter()
        .filter_map(|child| child.as_element())
        .map(|child| usize::from(child.attr("data-figure").is_some()) + count_figures(child))
        .sum()
}
