//! folio - report assembly and reflow
//!
//! A CLI tool that assembles a structured report from a monolithic Markdown
//! source or from per-section HTML fragments, injects diagrams at their
//! anchors and renders web, print and Word outputs.

#![deny(unsafe_code)]
#![cfg_attr(all(not(debug_assertions), not(test)), deny(clippy::all))]
// Allow some pedantic lints that are too strict for this project
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod cli;
mod document;
mod fragment_store;
mod markup;
mod report_config;

// Three-stage pipeline and its components
mod assemble;
mod diagram;
mod extract;
mod front_matter;
mod inject;
mod pipeline;
mod sectionize;

// Output renderers
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, OutputFormat, SourceArg};
use fragment_store::{DirStore, FragmentStore, SaveEndpoint, StoreError};
use pipeline::SourceMode;
use report_config::{ReportConfig, CONFIG_FILE_NAME};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Main entry point for the folio CLI application
fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

/// Run the CLI application
fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force, title } => {
            init_logging(false);
            handle_init_command(&path, force, title)?;
        }

        Commands::Build {
            input,
            output,
            format,
            source,
            verbose,
        } => {
            init_logging(verbose);
            handle_build_command(&input, output, format, source, verbose)?;
        }

        Commands::Split { input, verbose } => {
            init_logging(verbose);
            handle_split_command(&input)?;
        }

        Commands::Validate {
            input,
            source,
            verbose,
        } => {
            init_logging(verbose);
            handle_validate_command(&input, source, verbose)?;
        }

        Commands::Save {
            input,
            request_path,
            content_length,
        } => {
            init_logging(false);
            handle_save_command(&input, &request_path, content_length)?;
        }

        Commands::Sections { input } => {
            init_logging(false);
            handle_sections_command(&input)?;
        }
    }

    Ok(())
}

/// Warnings by default, info with --verbose; RUST_LOG overrides both
fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Load folio.toml from a project directory
fn load_config(root: &Path) -> Result<ReportConfig> {
    let config_path = root.join(CONFIG_FILE_NAME);
    ReportConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))
}

/// Handle the init command
fn handle_init_command(path: &Path, force: bool, title: Option<String>) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }

    let config_path = path.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it",
            config_path.display()
        );
    }

    match title {
        // A custom title means re-serializing, which drops the template's comments
        Some(title) => {
            let mut config = ReportConfig::from_toml_str(ReportConfig::default_toml())
                .with_context(|| "Built-in configuration is invalid")?;
            config.report.title = title;
            config
                .save(&config_path)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
        }
        None => {
            std::fs::write(&config_path, ReportConfig::default_toml())
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
        }
    }

    println!("✓ Created {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Edit {} to describe your report", CONFIG_FILE_NAME);
    println!("  2. Write the report source or the section fragments");
    println!("  3. Run 'folio build' to generate the outputs");

    Ok(())
}

/// Handle the build command
fn handle_build_command(
    input: &Path,
    output: Option<PathBuf>,
    format: OutputFormat,
    source: SourceArg,
    verbose: bool,
) -> Result<()> {
    let config = load_config(input)?;
    let store = DirStore::new(input);
    let mode = SourceMode::from(source);
    let output_dir = output.unwrap_or_else(|| input.join(&config.paths.output));

    println!("Building report...");
    println!("Input: {} ({})", input.display(), mode);
    println!("Output: {}", output_dir.display());

    // Stage 1: Load sections
    println!("\n[Stage 1/3] Loading sections...");
    let templates = front_matter::FrontMatterTemplates::from_metadata(&config.report);
    let mut sections = pipeline::load_sections(&config, &store, mode, &templates)
        .with_context(|| format!("Failed to load sections from {}", input.display()))?;
    println!("✓ Loaded {} sections", sections.len());

    // Stage 2: Inject diagrams
    println!("\n[Stage 2/3] Injecting diagrams...");
    let warnings = pipeline::inject_diagrams(&mut sections, &config, &store)
        .with_context(|| "Failed to inject diagrams")?;

    // Stage 3: Assemble
    println!("\n[Stage 3/3] Assembling document...");
    let document = pipeline::assemble_document(sections, &config, &templates)
        .with_context(|| "Failed to assemble document")?;
    println!(
        "✓ Assembled {} sections with {} diagrams",
        document.sections().len(),
        document.figure_count()
    );
    if verbose {
        for section in document.sections() {
            println!("  - {}", section.title);
        }
    }

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create directory {}", output_dir.display()))?;

    for target in format.targets() {
        let bytes = pipeline::render(&document, target, &config, &store)
            .with_context(|| format!("Failed to render {} output", target))?;
        let path = output_dir.join(target.file_name());
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✓ Successfully wrote: {}", path.display());
    }

    print_warnings(&warnings);
    println!("\n✓ Build completed successfully!");

    Ok(())
}

fn print_warnings(warnings: &[pipeline::BuildWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} warning(s):", warnings.len());
    for warning in warnings {
        println!("  ! {}", warning);
    }
}

/// Handle the split command
fn handle_split_command(input: &Path) -> Result<()> {
    let config = load_config(input)?;
    let store = DirStore::new(input);

    println!("Splitting {}...", input.join(&config.paths.source).display());
    let (document, warnings) = pipeline::build_document(&config, &store, SourceMode::Monolithic)
        .with_context(|| format!("Failed to build report from {}", input.display()))?;

    let written = pipeline::split(&document, &store, &config)
        .with_context(|| "Failed to write fragments")?;
    for name in &written {
        println!("  {}", name);
    }
    println!("✓ Wrote {} fragments", written.len());
    print_warnings(&warnings);

    Ok(())
}

/// Handle the validate command
fn handle_validate_command(input: &Path, source: SourceArg, verbose: bool) -> Result<()> {
    println!("Validating report...");
    println!("Input: {}", input.display());

    let config = load_config(input)?;
    let store = DirStore::new(input);
    let report = pipeline::validate(&config, &store, SourceMode::from(source))
        .with_context(|| format!("Validation of {} failed", input.display()))?;

    println!("✓ {} sections match the manifest", report.sections);
    println!(
        "✓ {}/{} diagrams resolved",
        report.figures_ok.len(),
        config.diagrams.len()
    );
    if verbose {
        for figure in &report.figures_ok {
            println!("  - {}", figure);
        }
    }
    for (figure, reason) in &report.figures_missing {
        println!("  ! {}: {}", figure, reason);
    }
    print_warnings(&report.warnings);

    Ok(())
}

/// Handle the save command
fn handle_save_command(input: &Path, request_path: &str, content_length: Option<usize>) -> Result<()> {
    let config = load_config(input)?;
    let store = DirStore::new(input);

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .with_context(|| "Failed to read request body from stdin")?;
    let content_length = content_length.unwrap_or(body.len());

    let endpoint = SaveEndpoint::new(config.paths.save_target.as_str());
    let response = endpoint.handle(&store, request_path, content_length, &body);

    println!("{} {}", response.status, response.body);
    if response.status != 200 {
        anyhow::bail!("Save failed with status {}", response.status);
    }
    Ok(())
}

/// Handle the sections command
fn handle_sections_command(input: &Path) -> Result<()> {
    let config = load_config(input)?;
    let store = DirStore::new(input);
    // No fragments directory yet just means nothing has been split
    let present = match store.list(&config.paths.fragments) {
        Err(StoreError::NotFound(_)) => Vec::new(),
        other => other.with_context(|| format!("Failed to list {}", config.paths.fragments))?,
    };

    println!("{} sections:\n", config.sections.len());
    for (index, entry) in config.sections.iter().enumerate() {
        let name = fragment_store::join_name(&config.paths.fragments, &entry.fragment);
        let marker = if present.contains(&name) { "✓" } else { " " };
        println!("  {:>2}. {} [{}] {}", index + 1, entry.title, marker, name);
    }

    Ok(())
}
