//! Renderers turning an assembled document into output bytes
//!
//! Every renderer emits every section, in document order. Stylesheets are
//! opaque to the pipeline: each target ships a built-in default that a
//! project can replace with its own CSS file.

pub mod docx;
pub mod print;
pub mod web;

use crate::document::Document;
use crate::fragment_store::{FragmentStore, StoreError};
use crate::report_config::{Margins, StyleConfig};
use std::fmt;

/// Output targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// Continuous HTML for reading and editing in a browser
    Web,
    /// Paginated HTML laid out for PDF printing
    Print,
    /// Word document
    Docx,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 3] = [RenderTarget::Web, RenderTarget::Print, RenderTarget::Docx];

    /// Output file name for this target
    pub fn file_name(self) -> &'static str {
        match self {
            RenderTarget::Web => "report.html",
            RenderTarget::Print => "report-print.html",
            RenderTarget::Docx => "report.docx",
        }
    }

    /// The renderer for this target
    pub fn renderer(self) -> Box<dyn Renderer> {
        match self {
            RenderTarget::Web => Box::new(web::WebRenderer),
            RenderTarget::Print => Box::new(print::PrintRenderer),
            RenderTarget::Docx => Box::new(docx::DocxRenderer),
        }
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderTarget::Web => write!(f, "web"),
            RenderTarget::Print => write!(f, "print"),
            RenderTarget::Docx => write!(f, "docx"),
        }
    }
}

/// Physical page description shared by all targets
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    /// Margins in centimetres
    pub margins: Margins,
    pub font_family: String,
    /// Body font size in points
    pub font_size: f32,
    pub line_spacing: f32,
}

impl From<&StyleConfig> for PageSetup {
    fn from(style: &StyleConfig) -> Self {
        Self {
            margins: style.margins,
            font_family: style.font_family.clone(),
            font_size: style.font_size,
            line_spacing: style.line_spacing,
        }
    }
}

/// Stylesheet handed to a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    /// CSS for HTML targets; empty for docx
    pub css: String,
    pub page: PageSetup,
}

impl StyleSheet {
    /// Built-in stylesheet for a target
    pub fn builtin(target: RenderTarget, style: &StyleConfig) -> Self {
        let css = match target {
            RenderTarget::Web => web::DEFAULT_CSS,
            RenderTarget::Print => print::DEFAULT_CSS,
            RenderTarget::Docx => "",
        };
        Self {
            css: css.to_string(),
            page: PageSetup::from(style),
        }
    }

    /// Stylesheet for a target, honouring the project's CSS overrides
    ///
    /// # Parameters
    /// * `target` - Output target
    /// * `style` - The `[style]` table of the configuration
    /// * `store` - Store rooted at the project directory
    ///
    /// # Returns
    /// * `Ok(StyleSheet)` - Override CSS if configured, the built-in one otherwise
    /// * `Err(RenderError)` - The configured CSS file could not be read
    pub fn load(
        target: RenderTarget,
        style: &StyleConfig,
        store: &dyn FragmentStore,
    ) -> Result<Self, RenderError> {
        let mut sheet = Self::builtin(target, style);
        let override_name = match target {
            RenderTarget::Web => style.web_css.as_deref(),
            RenderTarget::Print => style.print_css.as_deref(),
            RenderTarget::Docx => None,
        };
        if let Some(name) = override_name {
            sheet.css = store.read(name).map_err(|source| RenderError::Stylesheet {
                name: name.to_string(),
                source,
            })?;
            log::info!("Using stylesheet {} for {} output", name, target);
        }
        Ok(sheet)
    }
}

/// A document renderer for one output target
pub trait Renderer {
    fn target(&self) -> RenderTarget;

    /// Render the whole document
    fn render(&self, doc: &Document, style: &StyleSheet) -> Result<Vec<u8>, RenderError>;
}

/// Render errors
#[derive(Debug)]
pub enum RenderError {
    Stylesheet { name: String, source: StoreError },
    FormatError(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Stylesheet { name, source } => {
                write!(f, "Failed to load stylesheet {}: {}", name, source)
            }
            RenderError::FormatError(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Stylesheet { source, .. } => Some(source),
            RenderError::FormatError(_) => None,
        }
    }
}

/// `2.5` as `2.5`, `2.0` as `2`
pub(crate) fn css_number(value: f32) -> String {
    format!("{}", value)
}
