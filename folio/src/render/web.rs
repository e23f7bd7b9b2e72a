//! Continuous HTML output
//!
//! Every section becomes one `<div class="paper">` sheet inside the
//! `full-report-content` wrapper, with a floating print control on top.

use super::{css_number, PageSetup, RenderError, RenderTarget, Renderer, StyleSheet};
use crate::document::{Document, FrontMatterKind, Section};
use crate::markup::escape_html;

pub struct WebRenderer;

impl Renderer for WebRenderer {
    fn target(&self) -> RenderTarget {
        RenderTarget::Web
    }

    fn render(&self, doc: &Document, style: &StyleSheet) -> Result<Vec<u8>, RenderError> {
        let mut output = String::new();

        write_html_header(&mut output, &doc.metadata().title, style);

        output.push_str("<body>\n");
        output.push_str("<div class=\"controls\">\n");
        output.push_str(
            "<button onclick=\"window.print()\" class=\"btn\">Download / Print PDF</button>\n",
        );
        output.push_str("</div>\n");
        output.push_str("<div id=\"full-report-content\">\n");

        for section in doc.sections() {
            write_section(&mut output, section);
        }

        output.push_str("</div>\n");
        output.push_str("</body>\n");
        output.push_str("</html>\n");

        log::info!("Rendered {} sections as web HTML", doc.sections().len());
        Ok(output.into_bytes())
    }
}

fn write_html_header(output: &mut String, title: &str, style: &StyleSheet) {
    output.push_str("<!DOCTYPE html>\n");
    output.push_str("<html lang=\"en\">\n");
    output.push_str("<head>\n");
    output.push_str("<meta charset=\"UTF-8\">\n");
    output.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    output.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    output.push_str("<style>\n");
    output.push_str(&page_rules(&style.page));
    output.push_str(&style.css);
    output.push_str("</style>\n");
    output.push_str("</head>\n");
}

/// Rules derived from the page setup, emitted ahead of the stylesheet
fn page_rules(page: &PageSetup) -> String {
    let m = &page.margins;
    format!(
        "@page {{ size: A4; margin: {top}cm {right}cm {bottom}cm {left}cm; }}\n\
         body {{ font-family: \"{font}\", Times, serif; font-size: {size}pt; line-height: {spacing}; }}\n\
         .paper {{ padding: {top}cm {right}cm {bottom}cm {left}cm; }}\n",
        top = css_number(m.top),
        right = css_number(m.right),
        bottom = css_number(m.bottom),
        left = css_number(m.left),
        font = escape_html(&page.font_family),
        size = css_number(page.font_size),
        spacing = css_number(page.line_spacing),
    )
}

fn write_section(output: &mut String, section: &Section) {
    let class = if section.kind.front_matter() == Some(FrontMatterKind::TitlePage) {
        "paper cover-page"
    } else {
        "paper"
    };
    output.push_str(&format!(
        "<div class=\"{}\" data-section=\"{}\">\n",
        class,
        escape_html(&section.title)
    ));
    if let Some(heading) = &section.heading {
        output.push_str(&format!(
            "<h1 class=\"section-title\">{}</h1>\n",
            escape_html(heading)
        ));
    }
    output.push_str(&section.content.to_html());
    output.push_str("\n</div>\n");
}

/// Built-in screen stylesheet
pub const DEFAULT_CSS: &str = r#"
body {
    text-align: justify;
    margin: 0;
    padding: 20px;
    background-color: #f0f2f5;
    color: black;
    display: flex;
    flex-direction: column;
    align-items: center;
}

.paper {
    background-color: white;
    width: 210mm;
    min-height: 297mm;
    box-sizing: border-box;
    box-shadow: 0 4px 15px rgba(0, 0, 0, 0.1);
    margin-bottom: 30px;
    position: relative;
    page-break-after: always;
}

.paper:last-child {
    page-break-after: auto;
}

h1.section-title {
    font-size: 14pt;
    text-transform: uppercase;
    text-align: center;
    font-weight: bold;
    margin-top: 0;
    margin-bottom: 24pt;
}

h2 {
    font-size: 12pt;
    text-transform: uppercase;
    font-weight: bold;
    margin-top: 18pt;
    margin-bottom: 12pt;
}

h3 {
    font-size: 12pt;
    font-weight: bold;
    margin-top: 12pt;
    margin-bottom: 6pt;
}

p { margin-bottom: 12pt; }
ul, ol { margin-bottom: 12pt; padding-left: 1.5cm; }
table { width: 100%; border-collapse: collapse; margin: 20px 0; font-size: 11pt; }
th, td { border: 1px solid black; padding: 8px; vertical-align: top; }
th { background-color: #f2f2f2; font-weight: bold; }

.report-figure { margin: 24pt 0; page-break-inside: avoid; }
.report-diagram { display: flex; justify-content: center; }
.diagram-wrap {
    background: #fff;
    width: 100%;
    max-width: 600px;
    border: 1px solid #ccc;
    padding: 10px;
    line-height: 1.2;
    margin: 0 auto;
}
.figure-caption { font-style: italic; text-align: center; margin-bottom: 12pt; font-weight: bold; }

.cover-page {
    text-align: center !important;
    display: flex;
    flex-direction: column;
    justify-content: center;
}
.title-project-title { font-size: 16pt; font-weight: bold; text-transform: uppercase; margin-bottom: 2cm; }
.cert-title { text-align: center; text-transform: uppercase; font-weight: bold; font-size: 14pt; margin-bottom: 2cm; }
.sig-table { width: 100%; border: none; margin-top: 3cm; }
.sig-table td { border: none; text-align: center; vertical-align: bottom; height: 2cm; }
.sig-table td.sig-date { text-align: left; padding-top: 1cm; }

.controls {
    position: fixed;
    top: 20px;
    right: 20px;
    z-index: 1000;
    background: #f8f9fa;
    padding: 15px;
    border-radius: 8px;
    box-shadow: 0 2px 10px rgba(0, 0, 0, 0.1);
}
.btn {
    background-color: #007bff;
    color: white;
    border: none;
    padding: 10px 15px;
    border-radius: 4px;
    cursor: pointer;
    font-family: sans-serif;
    font-size: 14px;
}
.btn:hover { background-color: #0056b3; }

@media print {
    body {
        background: none;
        padding: 0;
        display: block;
    }

    .paper {
        box-shadow: none;
        margin: 0;
        width: auto;
        min-height: auto;
        padding: 0;
    }

    .controls, .btn { display: none !important; }
}
"#;
