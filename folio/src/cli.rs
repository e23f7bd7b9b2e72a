//! Command-line interface definitions for folio

use crate::pipeline::SourceMode;
use crate::render::RenderTarget;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for the build command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Continuous HTML for the browser
    Web,
    /// Paginated HTML for PDF printing
    Print,
    /// Microsoft Word DOCX format
    Docx,
    /// Every format above
    All,
}

impl OutputFormat {
    /// Render targets selected by this format
    pub fn targets(self) -> Vec<RenderTarget> {
        match self {
            OutputFormat::Web => vec![RenderTarget::Web],
            OutputFormat::Print => vec![RenderTarget::Print],
            OutputFormat::Docx => vec![RenderTarget::Docx],
            OutputFormat::All => RenderTarget::ALL.to_vec(),
        }
    }
}

/// Where sections are read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Split the Markdown source at its marker headings
    #[default]
    Monolithic,
    /// Read one HTML fragment per section
    Fragments,
}

impl From<SourceArg> for SourceMode {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Monolithic => SourceMode::Monolithic,
            SourceArg::Fragments => SourceMode::Fragments,
        }
    }
}

/// CLI structure for the folio application
#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "Report assembly and reflow tool", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for folio
#[derive(Subcommand)]
pub enum Commands {
    /// Write the default folio.toml into a project directory
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing folio.toml
        #[arg(short, long)]
        force: bool,

        /// Report title to write into the new configuration
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Assemble the report and render it
    Build {
        /// Project directory (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,

        /// Output directory (defaults to paths.output from folio.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "all")]
        format: OutputFormat,

        /// Section source
        #[arg(long = "from", value_enum, default_value = "monolithic")]
        source: SourceArg,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Split the monolithic source into one fragment per section
    Split {
        /// Project directory (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the source, diagrams and anchors without writing anything
    Validate {
        /// Project directory (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,

        /// Section source
        #[arg(long = "from", value_enum, default_value = "monolithic")]
        source: SourceArg,

        /// Show detailed validation results
        #[arg(short, long)]
        verbose: bool,
    },

    /// Save an edited report read from stdin
    Save {
        /// Project directory (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,

        /// Request path the body is sent to
        #[arg(long, default_value = "/save-paper")]
        request_path: String,

        /// Declared body length in bytes (defaults to the whole body)
        #[arg(long)]
        content_length: Option<usize>,
    },

    /// List the section manifest
    Sections {
        /// Project directory (defaults to current directory)
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,
    },
}
