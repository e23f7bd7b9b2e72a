//! Paginated HTML laid out for PDF printing

use super::{css_number, PageSetup, RenderError, RenderTarget, Renderer, StyleSheet};
use crate::document::Document;
use crate::markup::escape_html;

pub struct PrintRenderer;

impl Renderer for PrintRenderer {
    fn target(&self) -> RenderTarget {
        RenderTarget::Print
    }

    fn render(&self, doc: &Document, style: &StyleSheet) -> Result<Vec<u8>, RenderError> {
        let mut output = String::new();
        output.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
        output.push_str(&format!(
            "<title>{}</title>\n",
            escape_html(&doc.metadata().title)
        ));
        output.push_str("<style>\n");
        output.push_str(&page_rules(&style.page));
        output.push_str(&style.css);
        output.push_str("</style>\n</head>\n<body>\n");

        for section in doc.sections() {
            output.push_str(&format!(
                "<div class=\"section-wrapper\" data-section=\"{}\">\n",
                escape_html(&section.title)
            ));
            if let Some(heading) = &section.heading {
                output.push_str(&format!("<h1>{}</h1>\n", escape_html(heading)));
            }
            output.push_str(&section.content.to_html());
            output.push_str("\n</div>\n");
        }

        output.push_str("</body>\n</html>\n");
        log::info!("Rendered {} sections as print HTML", doc.sections().len());
        Ok(output.into_bytes())
    }
}

/// `@page` box with margins and a footer page counter
fn page_rules(page: &PageSetup) -> String {
    let m = &page.margins;
    format!(
        "@page {{\n    size: A4;\n    margin-top: {}cm;\n    margin-bottom: {}cm;\n    \
         margin-left: {}cm;\n    margin-right: {}cm;\n    @bottom-center {{\n        \
         content: counter(page);\n        font-family: \"{font}\", Times, serif;\n        \
         font-size: 10pt;\n    }}\n}}\n\
         body {{ font-family: \"{font}\", Times, serif; font-size: {}pt; line-height: {}; }}\n",
        css_number(m.top),
        css_number(m.bottom),
        css_number(m.left),
        css_number(m.right),
        css_number(page.font_size),
        css_number(page.line_spacing),
        font = escape_html(&page.font_family),
    )
}

/// Built-in print stylesheet
pub const DEFAULT_CSS: &str = r#"
body {
    text-align: justify;
    margin: 0;
}

.section-wrapper {
    page-break-before: always;
}

.section-wrapper:first-child {
    page-break-before: auto;
}

h1 {
    font-size: 14pt;
    font-weight: bold;
    text-transform: uppercase;
    text-align: center;
    margin-top: 0;
}

h2 {
    font-size: 12pt;
    font-weight: bold;
    text-transform: uppercase;
    margin-top: 24pt;
    margin-bottom: 12pt;
    page-break-after: avoid;
    text-align: left;
}

h3 {
    font-size: 12pt;
    font-weight: bold;
    margin-top: 18pt;
    margin-bottom: 12pt;
    page-break-after: avoid;
    text-align: left;
}

p, li { margin-bottom: 12pt; text-indent: 0; }

table {
    width: 100%;
    border-collapse: collapse;
    margin-bottom: 12pt;
    line-height: 1.5;
}
th, td {
    border: 1px solid black;
    padding: 6pt;
    vertical-align: top;
    text-align: left;
}

.title-page-container {
    text-align: center;
    display: flex;
    flex-direction: column;
    justify-content: center;
    align-items: center;
    height: 100%;
    line-height: 1.5;
}
.title-project-title { font-size: 16pt; font-weight: bold; text-transform: uppercase; margin-bottom: 2cm; }
.certificate-container { text-align: justify; }
.cert-title { text-align: center; text-transform: uppercase; font-weight: bold; font-size: 14pt; margin-bottom: 2cm; }
.sig-table { width: 100%; border: none; margin-top: 3cm; }
.sig-table td { border: none; text-align: center; vertical-align: bottom; height: 2cm; }
.sig-table td.sig-date { text-align: left; padding-top: 1cm; }

.report-figure { margin: 20px 0; page-break-inside: avoid; }
.report-diagram {
    text-align: center;
    display: flex;
    justify-content: center;
}
.diagram-wrap {
    background: #fff;
    width: 100% !important;
    max-width: 600px;
    border: 1px solid #ccc;
    padding: 10px;
    line-height: 1.2;
    margin: 0 auto;
}
.figure-caption { text-align: center; font-style: italic; }
"#;
