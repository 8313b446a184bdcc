use std::path::PathBuf;
use std::process::ExitCode;

mod controller;
mod domain;
mod filter;
mod gateway;
mod inputter;
mod model;
mod ui;

use arboard::Clipboard;
use clap::Parser;
use tracing::{info, trace};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use controller::Controller;
use domain::{
    DEFAULT_MAX_CELL_WIDTH, DEFAULT_PAGE_SIZE, FileKind, ViewerConfig, ViewerError, ViewerEvent,
    ViewerSettings,
};
use gateway::HttpGateway;
use model::{Model, Status};
use ui::TableUI;

/// Browse remote tabular data files (Parquet, Excel, CSV, TSV) from the
/// terminal.
#[derive(Parser, Debug)]
#[command(name = "tdv", version)]
struct Args {
    /// Path of the data file on the backend
    path: String,

    /// Base URL of the tabular data service
    #[arg(long, default_value = "http://127.0.0.1:8888/tabular-data-viewer")]
    server: String,

    /// Rows fetched per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Widest rendered cell, in characters
    #[arg(long, default_value_t = DEFAULT_MAX_CELL_WIDTH)]
    max_cell_width: usize,

    /// Append diagnostics to this file (filtered by RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not open Parquet files
    #[arg(long)]
    no_parquet: bool,

    /// Do not open Excel files
    #[arg(long)]
    no_excel: bool,

    /// Do not open CSV files
    #[arg(long)]
    no_csv: bool,

    /// Do not open TSV files
    #[arg(long)]
    no_tsv: bool,
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            ratatui::restore();
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn run() -> Result<(), ViewerError> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let settings = ViewerSettings {
        enable_parquet: !args.no_parquet,
        enable_excel: !args.no_excel,
        enable_csv: !args.no_csv,
        enable_tsv: !args.no_tsv,
    };
    let path = shellexpand::full(&args.path)
        .map_err(|e| ViewerError::PathExpansion(e.to_string()))?
        .into_owned();
    let kind = FileKind::detect(&path, &settings)?;
    info!("Opening {path} as {} via {}", kind.display_name(), args.server);

    let config = ViewerConfig::default()
        .with_page_size(args.page_size)
        .with_max_cell_width(args.max_cell_width);
    let controller = Controller::new(&config);
    let ui = TableUI::new();
    // Clipboard access can be unavailable (ssh, headless); copy actions are
    // then silently skipped.
    let mut clipboard = Clipboard::new().ok();

    let gateway = HttpGateway::new(args.server)?;
    let (width, height) = ratatui::crossterm::terminal::size()?;
    let mut model = Model::new(path, config, Box::new(gateway), width as usize, height as usize);
    model.initialize();

    let mut terminal = ratatui::init();

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        }

        for event in model.drain_events() {
            handle_viewer_event(event, clipboard.as_mut());
        }
    }

    Ok(())
}

fn handle_viewer_event(event: ViewerEvent, clipboard: Option<&mut Clipboard>) {
    match event {
        ViewerEvent::RowCopied(json) => {
            if let Some(clipboard) = clipboard {
                match clipboard.set_text(json) {
                    Ok(_) => trace!("Copied row content to clipboard."),
                    Err(e) => trace!("Error copying to clipboard: {:?}", e),
                }
            }
        }
        ViewerEvent::RowSelected(row) => {
            trace!("Row selected: {row:?}");
        }
    }
}

fn init_logging(log_file: Option<&std::path::Path>) -> Result<(), ViewerError> {
    // The terminal belongs to the UI; diagnostics only go to a file.
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}
