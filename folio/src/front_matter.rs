//! Fixed front-matter pages built from report metadata

use crate::document::FrontMatterKind;
use crate::markup::{escape_html, parse_fragment, Element};
use crate::report_config::ReportMetadata;
use std::collections::BTreeMap;

const TITLE_PAGE_TEMPLATE: &str = r#"<div class="title-page-container">
<div class="title-project-title">{title}</div>
<p>A Project Report Submitted by</p>
<p><strong>{author}</strong></p>
<p>In partial fulfillment of the requirements for the</p>
<p><strong>{programme}</strong></p>
<p>At</p>
<p><strong>{institute}</strong></p>
<p><strong>{academic_year}</strong></p>
<br><br>
<p>Under the Guidance of</p>
<p><strong>{guide}</strong></p>
</div>"#;

const CERTIFICATE_TEMPLATE: &str = r#"<div class="certificate-container">
<div class="cert-title">CERTIFICATE</div>
<p>This is to certify that the project titled <strong>"{title}"</strong> has been carried out by <strong>{author}</strong> under my guidance and supervision in partial fulfillment of the requirements for the award of the <strong>{programme}</strong> at <strong>{institute}</strong>, during the academic year <strong>{academic_year}</strong>.</p>
<table class="sig-table">
<tr><td>___________________<br><strong>Guide</strong><br>{guide}</td><td>___________________<br><strong>H.O.D.</strong></td><td>___________________<br><strong>Principal</strong></td></tr>
<tr><td colspan="3" class="sig-date">Date: _______________<br>Place: {place}</td></tr>
</table>
</div>"#;

/// Parsed front-matter templates, keyed by kind
///
/// Built once per run; assembly clones the stored trees so every build
/// emits the same bytes.
#[derive(Debug, Clone, Default)]
pub struct FrontMatterTemplates {
    pages: BTreeMap<FrontMatterKind, Element>,
}

impl FrontMatterTemplates {
    /// Render the title page and certificate for a report
    pub fn from_metadata(metadata: &ReportMetadata) -> Self {
        let mut pages = BTreeMap::new();
        pages.insert(
            FrontMatterKind::TitlePage,
            parse_fragment(&fill(TITLE_PAGE_TEMPLATE, metadata)),
        );
        pages.insert(
            FrontMatterKind::Certificate,
            parse_fragment(&fill(CERTIFICATE_TEMPLATE, metadata)),
        );
        Self { pages }
    }

    /// Template for a front-matter kind, if it has one
    pub fn get(&self, kind: FrontMatterKind) -> Option<&Element> {
        self.pages.get(&kind)
    }
}

fn fill(template: &str, metadata: &ReportMetadata) -> String {
    [
        ("{title}", &metadata.title),
        ("{author}", &metadata.author),
        ("{guide}", &metadata.guide),
        ("{programme}", &metadata.programme),
        ("{institute}", &metadata.institute),
        ("{academic_year}", &metadata.academic_year),
        ("{place}", &metadata.place),
    ]
    .into_iter()
    .fold(template.to_string(), |html, (placeholder, value)| {
        html.replace(placeholder, &escape_html(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            title: "ATTENDRO: Smart Attendance using AI & IoT".to_string(),
            author: "[STUDENT NAME]".to_string(),
            guide: "[GUIDE NAME]".to_string(),
            programme: "Diploma in APPLIED AI & ML".to_string(),
            institute: "Rajarambapu Institute of Technology, Islampur".to_string(),
            academic_year: "2025\u{2013}2026".to_string(),
            place: "Islampur".to_string(),
        }
    }

    #[test]
    fn test_title_page_contains_metadata() {
        let templates = FrontMatterTemplates::from_metadata(&metadata());
        let page = templates.get(FrontMatterKind::TitlePage).unwrap();
        let text = page.text_content();

        assert!(text.contains("ATTENDRO: Smart Attendance using AI & IoT"));
        assert!(text.contains("A Project Report Submitted by"));
        assert!(text.contains("[GUIDE NAME]"));
        assert!(page.to_html().contains("AI &amp; IoT"));
    }

    #[test]
    fn test_certificate_has_signature_table() {
        let templates = FrontMatterTemplates::from_metadata(&metadata());
        let page = templates.get(FrontMatterKind::Certificate).unwrap();
        let text = page.text_content();

        for label in ["Guide", "H.O.D.", "Principal", "Date:", "Place: Islampur"] {
            assert!(text.contains(label), "missing {}", label);
        }
        assert!(page.contains_element(&|el| el.has_class("sig-table")));
    }

    #[test]
    fn test_metadata_is_escaped() {
        let mut meta = metadata();
        meta.author = "<script>alert(1)</script>".to_string();
        let templates = FrontMatterTemplates::from_metadata(&meta);
        let page = templates.get(FrontMatterKind::TitlePage).unwrap();

        assert!(!page.contains_element(&|el| el.tag == "script"));
        assert!(page.text_content().contains("<script>alert(1)</script>"));
    }

    #[test]
    fn test_only_title_and_certificate_have_templates() {
        let templates = FrontMatterTemplates::from_metadata(&metadata());
        assert!(templates.get(FrontMatterKind::TitlePage).is_some());
        assert!(templates.get(FrontMatterKind::Certificate).is_some());
        assert!(templates.get(FrontMatterKind::Abstract).is_none());
        assert!(templates.get(FrontMatterKind::Acknowledgement).is_none());
    }
}
