//! Document assembly: ordering, completeness and template substitution

use crate::document::{Document, Section};
use crate::front_matter::FrontMatterTemplates;
use crate::report_config::{ReportMetadata, SectionEntry};
use itertools::Itertools;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while assembling the document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("Required section '{title}' is missing")]
    MissingSection { title: String },

    #[error("Section '{title}' appears more than once")]
    DuplicateSection { title: String },

    #[error("Section '{title}' is not in the manifest")]
    UnexpectedSection { title: String },
}

/// Assemble sections into the final document
///
/// # Parameters
/// * `sections` - Sections in any order, at most one per manifest entry
/// * `manifest` - The canonical section manifest
/// * `templates` - Fixed front-matter pages
/// * `metadata` - Report metadata carried into the document
///
/// # Returns
/// * `Ok(Document)` - Sections in manifest order with templates applied
/// * `Err(AssembleError)` - The sections do not match the manifest one-to-one
pub fn assemble(
    mut sections: Vec<Section>,
    manifest: &[SectionEntry],
    templates: &FrontMatterTemplates,
    metadata: ReportMetadata,
) -> Result<Document, AssembleError> {
    sections.sort_by_key(|section| section.order);

    if let Some((_prev, curr)) = sections
        .iter()
        .tuple_windows()
        .find(|(a, b)| a.order == b.order || a.title == b.title)
    {
        return Err(AssembleError::DuplicateSection {
            title: curr.title.clone(),
        });
    }

    if let Some(section) = sections
        .iter()
        .find(|section| manifest.get(section.order).is_none_or(|e| e.title != section.title))
    {
        return Err(AssembleError::UnexpectedSection {
            title: section.title.clone(),
        });
    }

    let present: HashSet<usize> = sections.iter().map(|section| section.order).collect();
    if let Some(entry) = (0..manifest.len())
        .find(|index| !present.contains(index))
        .map(|index| &manifest[index])
    {
        return Err(AssembleError::MissingSection {
            title: entry.title.clone(),
        });
    }

    for section in &mut sections {
        let template = section
            .kind
            .front_matter()
            .and_then(|kind| templates.get(kind));
        if let Some(template) = template {
            log::debug!("Using template for '{}'", section.title);
            section.content = template.clone();
            section.heading = None;
        }
    }

    log::info!("Assembled {} sections", sections.len());
    Ok(Document::new(metadata, sections))
}
