use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};

use pagekeeper::document::{DocumentSource, FixedGeometrySource, PageSize};
use pagekeeper::event_source::{ScriptedEventSource, run_events};
use pagekeeper::panic_handler::initialize_panic_handler;
use pagekeeper::{DecodeError, ReaderSession, YamlAnnotationStore, settings};

/// Windowed PDF reading engine
#[derive(Parser, Debug)]
#[command(name = "pagekeeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log file path
    #[arg(long, global = true, default_value = "pagekeeper.log")]
    log_file: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a JSON event script to a reader session and print the final state
    Replay {
        /// JSON array of reader events
        script: PathBuf,

        /// PDF to open (requires the `pdf` feature)
        #[arg(long, conflicts_with = "pages")]
        pdf: Option<PathBuf>,

        /// Synthetic document page count
        #[arg(long, default_value = "10")]
        pages: usize,

        #[arg(long, default_value = "612")]
        page_width: f32,

        #[arg(long, default_value = "792")]
        page_height: f32,

        /// Key under which annotations are stored
        #[arg(long)]
        book_id: Option<String>,

        /// Viewport width in pixels; narrow viewports open zoomed out
        #[arg(long, default_value = "1280")]
        viewport_width: f32,

        /// Annotation store directory
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },

    /// Print page count, reference page size and metadata of a PDF
    #[cfg(feature = "pdf")]
    Info { pdf: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?,
    )?;
    initialize_panic_handler();

    info!("Starting pagekeeper");
    match &cli.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }

    let result = match cli.command {
        Commands::Replay {
            script,
            pdf,
            pages,
            page_width,
            page_height,
            book_id,
            viewport_width,
            store_dir,
        } => {
            if store_dir.is_some() {
                settings::set_annotations_dir(store_dir);
            }
            let book_id = book_id
                .or_else(|| pdf.as_ref().map(|p| p.display().to_string()))
                .unwrap_or_else(|| format!("synthetic-{pages}"));
            let page_size = PageSize::new(page_width, page_height);
            replay(
                || open_source(pdf.as_deref(), pages, page_size),
                &script,
                &book_id,
                viewport_width,
            )
        }

        #[cfg(feature = "pdf")]
        Commands::Info { pdf } => print_info(&pdf),
    };

    if let Err(e) = &result {
        log::error!("{e:?}");
    }
    info!("Shutting down pagekeeper");
    result
}

fn open_source(
    pdf: Option<&Path>,
    pages: usize,
    page_size: PageSize,
) -> Result<Box<dyn DocumentSource>, DecodeError> {
    match pdf {
        #[cfg(feature = "pdf")]
        Some(path) => Ok(Box::new(pagekeeper::pdf::MupdfSource::open(path)?)),
        #[cfg(not(feature = "pdf"))]
        Some(path) => Err(DecodeError::new(format!(
            "{}: PDF support is not compiled in; rebuild with --features pdf",
            path.display()
        ))),
        None => Ok(Box::new(FixedGeometrySource::new(pages, page_size))),
    }
}

fn replay<F>(opener: F, script: &Path, book_id: &str, viewport_width: f32) -> Result<()>
where
    F: FnOnce() -> Result<Box<dyn DocumentSource>, DecodeError>,
{
    let mut store = YamlAnnotationStore::new(settings::annotations_dir().as_deref())?;
    let mut events = ScriptedEventSource::from_file(script)?;

    let mut session = ReaderSession::load(
        opener,
        &mut store,
        book_id,
        settings::viewport_config(),
        viewport_width,
    )?;
    let handled = run_events(&mut session, &mut events, &mut store, Instant::now())?;
    session.sync(&mut store);
    info!("Replayed {handled} events");

    let snapshot = serde_json::to_string_pretty(&session.snapshot())?;
    println!("{snapshot}");
    Ok(())
}

#[cfg(feature = "pdf")]
fn print_info(path: &Path) -> Result<()> {
    let source = pagekeeper::pdf::MupdfSource::open(path)?;
    let document = pagekeeper::load_document(&source);
    let info = serde_json::json!({
        "page_count": document.page_count,
        "reference_page_size": document.reference_page_size,
        "geometry_fallback": document.geometry_fallback,
        "metadata": document.metadata,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
