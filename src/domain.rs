use std::path::Path;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

use crate::gateway::{GatewayError, RowRecord};

/// Rows between the bottom of the viewport and the bottom of the loaded
/// content at which the next page fetch fires.
pub const SCROLL_FETCH_THRESHOLD: usize = 200;

pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_MAX_CELL_WIDTH: usize = 100;

/// Internal row-identity field sent by the backend. Never rendered, and
/// stripped before the row leaves the viewer (copy, selection export).
pub const ROW_INDEX_FIELD: &str = "__row_index__";

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct ViewerConfig {
    /// Terminal event poll timeout in milliseconds.
    pub event_poll_time: u64,
    /// Rows requested per data fetch.
    pub page_size: usize,
    /// Widest rendered cell, in characters.
    pub max_cell_width: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            page_size: DEFAULT_PAGE_SIZE,
            max_cell_width: DEFAULT_MAX_CELL_WIDTH,
        }
    }
}

/// Which file formats the viewer will open. Mirrors the recognized options
/// of the hosting environment's settings object.
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    pub enable_parquet: bool,
    pub enable_excel: bool,
    pub enable_csv: bool,
    pub enable_tsv: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            enable_parquet: true,
            enable_excel: true,
            enable_csv: true,
            enable_tsv: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PARQUET,
    XLSX,
    CSV,
    TSV,
}

impl FileKind {
    /// Resolve a path against the enabled file kinds.
    pub fn detect(path: &str, settings: &ViewerSettings) -> Result<Self, ViewerError> {
        let kind = match Path::new(path)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("PARQUET") | Some("PQ") => FileKind::PARQUET,
            Some("XLSX") => FileKind::XLSX,
            Some("CSV") => FileKind::CSV,
            Some("TSV") => FileKind::TSV,
            _ => return Err(ViewerError::UnknownFileType),
        };
        let enabled = match kind {
            FileKind::PARQUET => settings.enable_parquet,
            FileKind::XLSX => settings.enable_excel,
            FileKind::CSV => settings.enable_csv,
            FileKind::TSV => settings.enable_tsv,
        };
        if !enabled {
            return Err(ViewerError::DisabledFileType(kind.display_name()));
        }
        Ok(kind)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FileKind::PARQUET => "Parquet",
            FileKind::XLSX => "Excel",
            FileKind::CSV => "CSV",
            FileKind::TSV => "TSV",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveLeft,
    MoveRight,
    EnterFilter,
    Refresh,
    CopyRow,
    SelectRow,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

/// Typed notifications for the host loop. The viewer never touches the
/// clipboard or any other host resource itself.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// The user selected a row (identity field already stripped).
    RowSelected(RowRecord),
    /// A row was serialized for the clipboard.
    RowCopied(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    GatewayError(#[from] GatewayError),
    #[error("could not expand path: {0}")]
    PathExpansion(String),
    #[error("{0} support is disabled in the settings")]
    DisabledFileType(&'static str),
    #[error("unrecognized tabular file type")]
    UnknownFileType,
}

pub const HELP_TEXT: &str = "\
 tdv - remote tabular data viewer

 Up/k Down/j    move selection
 PgUp/PgDn      move one page
 g / G          first / last loaded row
 Left/h Right/l change column
 / or f         filter current column (Enter commits, Esc cancels)
 r              refresh from the backend
 y              copy row as JSON
 Enter          select row
 ?              this help
 q              quit
";
