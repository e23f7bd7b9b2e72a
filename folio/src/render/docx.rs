//! DOCX output using the docx-rs library
//!
//! Content trees are first lowered to a flat list of [`Block`]s, which are
//! then written with docx-rs builders. Figures become their caption plus
//! the diagram's text in a monospace font, since diagram markup has no
//! Word equivalent.

use super::{PageSetup, RenderError, RenderTarget, Renderer, StyleSheet};
use crate::document::{Document, Section};
use crate::markup::{ContentNode, Element};
use docx_rs::{
    AlignmentType, BreakType, Docx, PageMargin, Paragraph, Run, RunFonts, Style, StyleType,
    Table, TableCell, TableRow, WidthType,
};
use std::io::Cursor;

/// Twips per centimetre
const TWIPS_PER_CM: f32 = 566.93;

const MONOSPACE_FONT: &str = "Consolas";
const DIAGRAM_FONT: &str = "Courier New";

pub struct DocxRenderer;

impl Renderer for DocxRenderer {
    fn target(&self) -> RenderTarget {
        RenderTarget::Docx
    }

    fn render(&self, doc: &Document, style: &StyleSheet) -> Result<Vec<u8>, RenderError> {
        log::info!(
            "Creating DOCX with docx-rs: {} sections",
            doc.sections().len()
        );

        let mut docx = page_setup(Docx::new(), &style.page);
        docx = add_heading_styles(docx);

        for (index, section) in doc.sections().iter().enumerate() {
            for block in section_blocks(section, index > 0) {
                docx = append_block(docx, block);
            }
        }

        let mut cursor = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut cursor)
            .map_err(|e| RenderError::FormatError(format!("Failed to write DOCX: {}", e)))?;
        Ok(cursor.into_inner())
    }
}

/// Inline text with formatting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub strike: bool,
}

/// Word-level block produced from a content tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    PageBreak,
    Heading { level: u8, spans: Vec<Span> },
    Paragraph { spans: Vec<Span>, centered: bool },
    ListItem { marker: String, depth: usize, spans: Vec<Span> },
    Code(String),
    Table(Vec<Vec<(bool, Vec<Span>)>>),
    Diagram(Vec<String>),
    Caption(String),
}

/// Lower one section to blocks, headed by its title when it has one
pub fn section_blocks(section: &Section, page_break: bool) -> Vec<Block> {
    let mut blocks = Vec::new();
    if page_break {
        blocks.push(Block::PageBreak);
    }
    if let Some(heading) = &section.heading {
        blocks.push(Block::Heading {
            level: 1,
            spans: vec![plain(heading)],
        });
    }
    lower_children(&section.content, &mut blocks);
    blocks
}

fn plain(text: &str) -> Span {
    Span {
        text: text.to_string(),
        ..Span::default()
    }
}

/// Whether an element starts a block of its own
fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "center"
            | "div"
            | "dl"
            | "figure"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

fn lower_children(parent: &Element, blocks: &mut Vec<Block>) {
    let mut pending: Vec<Span> = Vec::new();
    let centered = ["title-page-container", "title-project-title", "cert-title"]
        .iter()
        .any(|class| parent.has_class(class));

    for child in &parent.children {
        match child {
            ContentNode::Element(el) if is_block(&el.tag) => {
                flush_paragraph(&mut pending, centered, blocks);
                lower_block(el, blocks);
            }
            other => collect_spans(other, Span::default(), &mut pending),
        }
    }
    flush_paragraph(&mut pending, centered, blocks);
}

fn flush_paragraph(pending: &mut Vec<Span>, centered: bool, blocks: &mut Vec<Block>) {
    if pending.iter().any(|span| !span.text.trim().is_empty()) {
        blocks.push(Block::Paragraph {
            spans: trim_spans(std::mem::take(pending)),
            centered,
        });
    }
    pending.clear();
}

fn lower_block(el: &Element, blocks: &mut Vec<Block>) {
    if let Some(level) = el.heading_level() {
        blocks.push(Block::Heading {
            level,
            spans: inline_spans(el),
        });
        return;
    }
    match el.tag.as_str() {
        "p" => {
            let spans = inline_spans(el);
            if spans.iter().any(|span| !span.text.trim().is_empty()) {
                blocks.push(Block::Paragraph {
                    spans,
                    centered: el.has_class("figure-caption"),
                });
            }
        }
        "pre" => blocks.push(Block::Code(el.text_content())),
        "ul" | "ol" => lower_list(el, 0, blocks),
        "table" => blocks.push(Block::Table(table_rows(el))),
        "figure" => lower_figure(el, blocks),
        "hr" => {}
        _ => lower_children(el, blocks),
    }
}

fn lower_list(list: &Element, depth: usize, blocks: &mut Vec<Block>) {
    let ordered = list.tag == "ol";
    let start = list
        .attr("start")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    let items = list
        .children
        .iter()
        .filter_map(ContentNode::as_element)
        .filter(|el| el.tag == "li");
    for (index, item) in items.enumerate() {
        let marker = if ordered {
            format!("{}.", start + index)
        } else {
            "\u{2022}".to_string()
        };
        let mut spans = Vec::new();
        let mut nested = Vec::new();
        for child in &item.children {
            match child {
                ContentNode::Element(el) if el.tag == "ul" || el.tag == "ol" => nested.push(el),
                ContentNode::Element(el) if el.tag == "p" => {
                    collect_spans(child, Span::default(), &mut spans);
                    if !el.children.is_empty() {
                        spans.push(plain(" "));
                    }
                }
                other => collect_spans(other, Span::default(), &mut spans),
            }
        }
        blocks.push(Block::ListItem {
            marker,
            depth,
            spans: trim_spans(spans),
        });
        for sublist in nested {
            lower_list(sublist, depth + 1, blocks);
        }
    }
}

fn table_rows(table: &Element) -> Vec<Vec<(bool, Vec<Span>)>> {
    let mut rows = Vec::new();
    collect_rows(table, &mut rows);
    rows
}

fn collect_rows(el: &Element, rows: &mut Vec<Vec<(bool, Vec<Span>)>>) {
    for child in el.children.iter().filter_map(ContentNode::as_element) {
        if child.tag == "tr" {
            let cells = child
                .children
                .iter()
                .filter_map(ContentNode::as_element)
                .filter(|cell| cell.tag == "td" || cell.tag == "th")
                .map(|cell| (cell.tag == "th", trim_spans(inline_spans(cell))))
                .collect();
            rows.push(cells);
        } else if child.tag != "table" {
            collect_rows(child, rows);
        }
    }
}

fn lower_figure(figure: &Element, blocks: &mut Vec<Block>) {
    let mut lines = Vec::new();
    let mut current = String::new();
    for child in &figure.children {
        if let ContentNode::Element(el) = child {
            if el.tag != "figcaption" && el.tag != "style" {
                diagram_lines(el, &mut current, &mut lines);
            }
        }
    }
    push_line(&mut current, &mut lines);
    if !lines.is_empty() {
        blocks.push(Block::Diagram(lines));
    }

    let caption = figure
        .children
        .iter()
        .filter_map(ContentNode::as_element)
        .find(|el| el.tag == "figcaption")
        .map(Element::text_content);
    if let Some(caption) = caption {
        blocks.push(Block::Caption(caption.trim().to_string()));
    }
}

/// Text of a diagram body, one line per leaf block
fn diagram_lines(el: &Element, current: &mut String, lines: &mut Vec<String>) {
    if el.tag == "script" || el.tag == "style" {
        return;
    }
    let breaks = el.tag != "span" && el.tag != "strong" && el.tag != "em" && el.tag != "b";
    if breaks {
        push_line(current, lines);
    }
    for child in &el.children {
        match child {
            ContentNode::Element(inner) => diagram_lines(inner, current, lines),
            other => {
                let mut spans = Vec::new();
                collect_spans(other, Span::default(), &mut spans);
                for span in spans {
                    current.push_str(&span.text);
                }
            }
        }
    }
    if breaks {
        push_line(current, lines);
    }
}

fn push_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

fn inline_spans(el: &Element) -> Vec<Span> {
    let mut spans = Vec::new();
    for child in &el.children {
        collect_spans(child, Span::default(), &mut spans);
    }
    spans
}

/// Flatten inline content into formatted spans
fn collect_spans(node: &ContentNode, format: Span, spans: &mut Vec<Span>) {
    match node {
        ContentNode::Text(text) => push_span(spans, &format, text),
        ContentNode::EntityRef(_) => {
            let text = Element::fragment().with_child(node.clone()).text_content();
            push_span(spans, &format, &text);
        }
        ContentNode::Element(el) => {
            let mut format = format;
            match el.tag.as_str() {
                "script" | "style" => return,
                "br" => {
                    push_span(spans, &format, "\n");
                    return;
                }
                "strong" | "b" => format.bold = true,
                "em" | "i" => format.italic = true,
                "code" | "kbd" | "samp" => format.code = true,
                "del" | "s" | "strike" => format.strike = true,
                _ => {}
            }
            for child in &el.children {
                collect_spans(child, format.clone(), spans);
            }
        }
    }
}

fn push_span(spans: &mut Vec<Span>, format: &Span, text: &str) {
    if text.is_empty() {
        return;
    }
    // Whitespace runs collapse the way a browser would show them
    let collapsed = collapse_whitespace(text);
    match spans.last_mut() {
        Some(last)
            if last.bold == format.bold
                && last.italic == format.italic
                && last.code == format.code
                && last.strike == format.strike =>
        {
            last.text.push_str(&collapsed)
        }
        _ => spans.push(Span {
            text: collapsed,
            ..format.clone()
        }),
    }
}

fn collapse_whitespace(text: &str) -> String {
    if text == "\n" {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        // Non-breaking spaces survive
        if c.is_whitespace() && c != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn trim_spans(mut spans: Vec<Span>) -> Vec<Span> {
    if let Some(first) = spans.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = spans.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    spans.retain(|span| !span.text.is_empty());
    spans
}

/// Margins and default font from the page setup
fn page_setup(docx: Docx, page: &PageSetup) -> Docx {
    let twips = |cm: f32| (cm * TWIPS_PER_CM).round() as i32;
    let margins = PageMargin::new()
        .top(twips(page.margins.top))
        .bottom(twips(page.margins.bottom))
        .left(twips(page.margins.left))
        .right(twips(page.margins.right));
    let font = page.font_family.as_str();

    docx.page_margin(margins)
        .default_fonts(RunFonts::new().ascii(font).hi_ansi(font))
        .default_size((page.font_size * 2.0).round() as usize)
}

/// Add heading styles to the document
fn add_heading_styles(mut docx: Docx) -> Docx {
    // Sizes in points
    let heading_sizes = [
        ("Heading1", 14),
        ("Heading2", 12),
        ("Heading3", 12),
        ("Heading4", 12),
        ("Heading5", 11),
        ("Heading6", 11),
    ];

    for (style_id, size) in heading_sizes {
        let style = Style::new(style_id, StyleType::Paragraph)
            .name(style_id)
            .bold()
            .size(size * 2); // docx-rs uses half-points
        docx = docx.add_style(style);
    }

    docx
}

/// Get the heading style ID for a given heading level
fn heading_style_id(level: u8) -> &'static str {
    match level {
        0 | 1 => "Heading1",
        2 => "Heading2",
        3 => "Heading3",
        4 => "Heading4",
        5 => "Heading5",
        _ => "Heading6",
    }
}

fn append_block(docx: Docx, block: Block) -> Docx {
    match block {
        Block::PageBreak => {
            docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)))
        }
        Block::Heading { level, spans } => {
            let mut para = Paragraph::new().style(heading_style_id(level));
            if level == 1 {
                para = para.align(AlignmentType::Center);
            }
            docx.add_paragraph(add_runs(para, &spans, false))
        }
        Block::Paragraph { spans, centered } => {
            let mut para = Paragraph::new();
            if centered {
                para = para.align(AlignmentType::Center);
            }
            docx.add_paragraph(add_runs(para, &spans, false))
        }
        Block::ListItem {
            marker,
            depth,
            spans,
        } => {
            let prefix = format!("{}{} ", "    ".repeat(depth), marker);
            let para = Paragraph::new().add_run(Run::new().add_text(prefix));
            docx.add_paragraph(add_runs(para, &spans, false))
        }
        Block::Code(code) => code.trim_end_matches('\n').lines().fold(docx, |docx, line| {
            docx.add_paragraph(Paragraph::new().add_run(monospace_run(line, MONOSPACE_FONT)))
        }),
        Block::Table(rows) => {
            let rows = rows
                .iter()
                .map(|cells| {
                    TableRow::new(
                        cells
                            .iter()
                            .map(|(header, spans)| create_table_cell(spans, *header))
                            .collect(),
                    )
                })
                .collect();
            docx.add_table(Table::new(rows))
        }
        Block::Diagram(lines) => lines.iter().fold(docx, |docx, line| {
            docx.add_paragraph(
                Paragraph::new()
                    .align(AlignmentType::Center)
                    .add_run(monospace_run(line, DIAGRAM_FONT)),
            )
        }),
        Block::Caption(caption) => docx.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(caption).italic().bold()),
        ),
    }
}

fn monospace_run(text: &str, font: &str) -> Run {
    Run::new()
        .add_text(text)
        .fonts(RunFonts::new().ascii(font).hi_ansi(font))
}

/// Add spans to a paragraph as formatted runs
fn add_runs(mut para: Paragraph, spans: &[Span], make_bold: bool) -> Paragraph {
    for span in spans {
        para = para.add_run(create_run(span, make_bold));
    }
    para
}

/// Create a docx Run from a span with appropriate formatting
fn create_run(span: &Span, make_bold: bool) -> Run {
    let mut run = Run::new();
    for (index, piece) in span.text.split('\n').enumerate() {
        if index > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(piece);
    }

    if make_bold || span.bold {
        run = run.bold();
    }
    if span.italic {
        run = run.italic();
    }
    if span.strike {
        run = run.strike();
    }
    if span.code {
        run = run.fonts(RunFonts::new().ascii(MONOSPACE_FONT).hi_ansi(MONOSPACE_FONT));
    }

    run
}

/// Create a table cell from formatted spans
fn create_table_cell(spans: &[Span], make_bold: bool) -> TableCell {
    let mut para = Paragraph::new();
    if spans.is_empty() {
        // Empty cells still need at least one run
        para = para.add_run(Run::new().add_text(""));
    } else {
        para = add_runs(para, spans, make_bold);
    }

    TableCell::new()
        .width(2000, WidthType::Dxa)
        .add_paragraph(para)
}
