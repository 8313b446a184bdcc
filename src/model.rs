use std::path::Path;

use ratatui::crossterm::event::KeyEvent;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, error, info, trace};

use crate::domain::{
    HELP_TEXT, Message, ROW_INDEX_FIELD, SCROLL_FETCH_THRESHOLD, ViewerConfig, ViewerError,
    ViewerEvent,
};
use crate::filter::{self, ColumnKind, Filter, FilterSet, FilterUpdate};
use crate::gateway::{ColumnSpec, DataGateway, RowRecord, RowsRequest};
use crate::inputter::{InputResult, Inputter};
use crate::ui::{
    COLUMN_WIDTH_MARGIN, MIN_COLUMN_WIDTH, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT, TITLEBAR_HEIGHT,
};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy)]
enum Modus {
    TABLE,
    FILTERINPUT,
    POPUP,
}

/// One column of the remote schema. The filter capability is resolved once
/// here, when the metadata arrives, not per keystroke.
pub struct Column {
    pub name: String,
    pub type_tag: String,
    pub kind: ColumnKind,
    /// Widest formatted cell seen so far. Grows as pages arrive.
    pub max_width: usize,
    pub render_width: usize,
}

impl Column {
    fn from_spec(spec: ColumnSpec) -> Self {
        let kind = ColumnKind::classify(&spec.type_tag);
        Column {
            name: spec.name,
            type_tag: spec.type_tag,
            kind,
            max_width: 0,
            render_width: 0,
        }
    }
}

/// Client-visible pagination state.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadState {
    pub offset: usize,
    pub limit: usize,
    pub total_rows: usize,
    pub has_more: bool,
    pub loading: bool,
}

impl LoadState {
    fn new(limit: usize) -> Self {
        LoadState {
            offset: 0,
            limit,
            total_rows: 0,
            has_more: true,
            loading: false,
        }
    }
}

pub struct Model {
    path: String,
    name: String,
    config: ViewerConfig,
    gateway: Box<dyn DataGateway>,
    pub status: Status,
    modus: Modus,
    columns: Vec<Column>,
    /// Raw accumulated rows, append-only between resets.
    rows: Vec<RowRecord>,
    /// Formatted display cells, one entry per accumulated row. Rows are
    /// formatted once on arrival and never reformatted.
    cells: Vec<Vec<String>>,
    filters: FilterSet,
    load: LoadState,
    error: Option<String>,
    status_message: String,
    curser_row: usize, // position within the viewport
    offset_row: usize, // first visible row
    curser_column: usize, // absolute column index
    offset_column: usize,
    visible_columns: Vec<usize>,
    table_width: usize,
    table_height: usize,
    events: Vec<ViewerEvent>,
    input: Inputter,
    last_input: InputResult,
    show_popup: bool,
    popup_message: String,
}

impl Model {
    pub fn new(
        path: String,
        config: ViewerConfig,
        gateway: Box<dyn DataGateway>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let name = Path::new(&path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        let mut model = Self {
            path,
            name,
            load: LoadState::new(config.page_size),
            config,
            gateway,
            status: Status::EMPTY,
            modus: Modus::TABLE,
            columns: Vec::new(),
            rows: Vec::new(),
            cells: Vec::new(),
            filters: FilterSet::new(),
            error: None,
            status_message: String::new(),
            curser_row: 0,
            offset_row: 0,
            curser_column: 0,
            offset_column: 0,
            visible_columns: Vec::new(),
            table_width: 0,
            table_height: 0,
            events: Vec::new(),
            input: Inputter::default(),
            last_input: InputResult::default(),
            show_popup: false,
            popup_message: String::new(),
        };
        model.ui_resize(ui_width, ui_height);
        model
    }

    /// Metadata fetch, then the initial page load. Runs once per file load;
    /// a failure halts the viewer in an error state until the next refresh.
    pub fn initialize(&mut self) {
        self.status = Status::LOADING;
        self.set_status_message("Loading...");
        match self.gateway.metadata(&self.path) {
            Ok(meta) => {
                info!(
                    "Loaded metadata for {}: {} columns, {} rows",
                    self.path,
                    meta.columns.len(),
                    meta.total_rows
                );
                self.columns = meta.columns.into_iter().map(Column::from_spec).collect();
                self.load.total_rows = meta.total_rows;
                self.update_visible_columns();
                self.load_page(true);
            }
            Err(e) => self.fail(format!("Failed to load file: {e}")),
        }
    }

    /// Full reset: the file may have changed shape, so columns, rows,
    /// filters and pagination all start over.
    pub fn refresh(&mut self) {
        info!("Refreshing {}", self.path);
        self.columns.clear();
        self.rows.clear();
        self.cells.clear();
        self.filters.clear();
        self.visible_columns.clear();
        self.load = LoadState::new(self.config.page_size);
        self.error = None;
        self.curser_row = 0;
        self.offset_row = 0;
        self.curser_column = 0;
        self.offset_column = 0;
        self.initialize();
    }

    /// Fetch one page at the current offset with the current filters. A
    /// request arriving while another is in flight is dropped, not queued.
    pub fn load_page(&mut self, reset: bool) {
        if self.load.loading {
            trace!("Fetch already in flight, dropping load request");
            return;
        }
        self.load.loading = true;
        self.set_status_message("Loading...");
        if reset {
            self.load.offset = 0;
            self.rows.clear();
            self.cells.clear();
            self.curser_row = 0;
            self.offset_row = 0;
        }
        let request = RowsRequest {
            path: &self.path,
            offset: self.load.offset,
            limit: self.load.limit,
            filters: &self.filters,
        };
        match self.gateway.rows(&request) {
            Ok(page) => {
                let received = page.data.len();
                debug!(
                    "Received {received} rows at offset {}, has_more: {}",
                    self.load.offset, page.has_more
                );
                self.append_rows(page.data);
                // Advance by what actually arrived, not by the requested
                // limit; short pages keep the offset honest.
                self.load.offset += received;
                self.load.has_more = page.has_more;
                if reset {
                    self.load.total_rows = page.total_rows;
                }
                self.error = None;
                self.status = Status::READY;
                self.update_status_line();
            }
            Err(e) => {
                if reset {
                    self.fail(format!("Failed to load data: {e}"));
                } else {
                    // Keep the rows from earlier pages, surface the error
                    // in the status line only.
                    error!("Incremental load failed: {e}");
                    self.set_status_message(format!("Failed to load data: {e}"));
                }
            }
        }
        self.load.loading = false;
    }

    /// Parse and commit one filter input, then reload from offset zero.
    /// The reload is unconditional, even when the filter map is unchanged.
    pub fn apply_filter(&mut self, column_idx: usize, raw: &str) {
        let Some(column) = self.columns.get(column_idx) else {
            return;
        };
        let name = column.name.clone();
        match filter::parse(raw, column.kind) {
            FilterUpdate::Set(f) => {
                debug!("Filter on {name}: {f:?}");
                self.filters.insert(name, f);
            }
            FilterUpdate::Clear => {
                self.filters.remove(&name);
            }
            FilterUpdate::Ignored => {}
        }
        self.load_page(true);
    }

    pub fn update(&mut self, message: Message) -> Result<(), ViewerError> {
        match self.modus {
            Modus::TABLE => match message {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_selection_down(1),
                Message::MoveUp => self.move_selection_up(1),
                Message::MovePageDown => self.move_selection_down(self.table_height.max(1)),
                Message::MovePageUp => self.move_selection_up(self.table_height.max(1)),
                Message::MoveBeginning => self.move_selection_beginning(),
                Message::MoveEnd => self.move_selection_end(),
                Message::MoveLeft => self.move_selection_left(),
                Message::MoveRight => self.move_selection_right(),
                Message::EnterFilter => self.enter_filter_input(),
                Message::Refresh => self.refresh(),
                Message::CopyRow => self.copy_row(),
                Message::SelectRow => self.select_row(),
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::RawKey(_) => {}
            },
            Modus::FILTERINPUT => match message {
                Message::RawKey(key) => self.filter_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => {}
            },
            Modus::POPUP => match message {
                Message::Quit => self.quit(),
                Message::Exit | Message::SelectRow | Message::Help => self.close_popup(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => {}
            },
        }
        Ok(())
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    /// In filter-input modus the controller forwards key events raw.
    pub fn raw_keyevents(&self) -> bool {
        matches!(self.modus, Modus::FILTERINPUT)
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn compute_status(loaded: usize, total: usize, active_filters: usize) -> String {
        let filter_text = match active_filters {
            0 => String::new(),
            1 => " (1 filter active)".to_string(),
            n => format!(" ({n} filters active)"),
        };
        format!("Showing {loaded} of {total} rows{filter_text}")
    }

    // -------------------- Fetch plumbing ---------------------- //

    fn append_rows(&mut self, new_rows: Vec<RowRecord>) {
        let max_cell_width = self.config.max_cell_width;
        let columns = &self.columns;
        let formatted: Vec<Vec<String>> = new_rows
            .par_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| format_cell(row.get(&c.name), max_cell_width))
                    .collect()
            })
            .collect();
        for row in formatted.iter() {
            for (column, cell) in self.columns.iter_mut().zip(row.iter()) {
                if cell.len() > column.max_width {
                    column.max_width = cell.len();
                }
            }
        }
        self.cells.extend(formatted);
        self.rows.extend(new_rows);
        self.update_visible_columns();
    }

    /// Rows between the bottom of the viewport and the bottom of the
    /// accumulated content.
    fn distance_to_bottom(&self) -> usize {
        self.cells
            .len()
            .saturating_sub(self.offset_row + self.table_height)
    }

    /// The sole incremental-load trigger: fires when the viewport scrolls
    /// close enough to the bottom of what is loaded.
    fn on_scroll(&mut self) {
        if self.distance_to_bottom() <= SCROLL_FETCH_THRESHOLD
            && self.load.has_more
            && !self.load.loading
        {
            self.load_page(false);
        }
    }

    fn fail(&mut self, message: String) {
        error!("{message}");
        self.rows.clear();
        self.cells.clear();
        self.curser_row = 0;
        self.offset_row = 0;
        self.error = Some(message);
        self.status = Status::FAILED;
        self.update_status_line();
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    fn update_status_line(&mut self) {
        self.status_message =
            Self::compute_status(self.cells.len(), self.load.total_rows, self.filters.len());
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter_filter_input(&mut self) {
        if self.columns.is_empty() {
            return;
        }
        trace!("Entering filter input for column {}", self.curser_column);
        self.modus = Modus::FILTERINPUT;
        let prefill = self
            .filters
            .get(&self.columns[self.curser_column].name)
            .map(Filter::input_text)
            .unwrap_or_default();
        self.input.start(&prefill);
        self.last_input = self.input.get();
    }

    fn filter_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.modus = Modus::TABLE;
            if !self.last_input.canceled {
                let raw = self.last_input.input.clone();
                self.apply_filter(self.curser_column, &raw);
            }
        }
    }

    fn show_help(&mut self) {
        self.modus = Modus::POPUP;
        self.popup_message = HELP_TEXT.to_string();
        self.show_popup = true;
    }

    fn close_popup(&mut self) {
        self.modus = Modus::TABLE;
        self.show_popup = false;
    }

    fn selected_row(&self) -> Option<&RowRecord> {
        self.rows.get(self.offset_row + self.curser_row)
    }

    fn select_row(&mut self) {
        if let Some(row) = self.selected_row() {
            let mut export = row.clone();
            export.remove(ROW_INDEX_FIELD);
            self.events.push(ViewerEvent::RowSelected(export));
        }
    }

    fn copy_row(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let mut export = row.clone();
        export.remove(ROW_INDEX_FIELD);
        match serde_json::to_string_pretty(&export) {
            Ok(json) => {
                self.events.push(ViewerEvent::RowCopied(json));
                self.set_status_message("Copied row as JSON");
            }
            Err(e) => self.set_status_message(format!("Could not serialize row: {e}")),
        }
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.table_width, width, self.table_height, height
        );
        self.table_width = width;
        self.table_height =
            height.saturating_sub(TITLEBAR_HEIGHT + TABLE_HEADER_HEIGHT + STATUSLINE_HEIGHT);
        self.update_visible_columns();
        let abs = self.offset_row + self.curser_row;
        let clamped = if self.cells.is_empty() {
            0
        } else {
            abs.min(self.cells.len() - 1)
        };
        self.offset_row = self.offset_row.min(clamped);
        self.scroll_to(clamped);
    }

    // -------------------- Table navigation ---------------------- //

    fn scroll_to(&mut self, abs: usize) {
        let height = self.table_height.max(1);
        if abs < self.offset_row {
            self.offset_row = abs;
        } else if abs >= self.offset_row + height {
            self.offset_row = abs + 1 - height;
        }
        self.curser_row = abs - self.offset_row;
    }

    fn move_selection_down(&mut self, size: usize) {
        if self.cells.is_empty() {
            return;
        }
        let abs = (self.offset_row + self.curser_row + size).min(self.cells.len() - 1);
        self.scroll_to(abs);
        self.on_scroll();
    }

    fn move_selection_up(&mut self, size: usize) {
        let abs = (self.offset_row + self.curser_row).saturating_sub(size);
        self.scroll_to(abs);
    }

    fn move_selection_beginning(&mut self) {
        self.scroll_to(0);
    }

    fn move_selection_end(&mut self) {
        if self.cells.is_empty() {
            return;
        }
        self.scroll_to(self.cells.len() - 1);
        self.on_scroll();
    }

    fn move_selection_left(&mut self) {
        if self.curser_column > 0 {
            self.curser_column -= 1;
            self.ensure_column_visible();
        }
    }

    fn move_selection_right(&mut self) {
        if self.curser_column + 1 < self.columns.len() {
            self.curser_column += 1;
            self.ensure_column_visible();
        }
    }

    fn ensure_column_visible(&mut self) {
        if self.curser_column < self.offset_column {
            self.offset_column = self.curser_column;
        }
        self.update_visible_columns();
        while !self.visible_columns.contains(&self.curser_column)
            && self.offset_column < self.curser_column
        {
            self.offset_column += 1;
            self.update_visible_columns();
        }
    }

    /// Greedy width fit from the column offset; the last visible column may
    /// render clipped.
    fn update_visible_columns(&mut self) {
        let max_cell_width = self.config.max_cell_width;
        for column in self.columns.iter_mut() {
            column.render_width = calculate_column_width(column, max_cell_width);
        }
        self.visible_columns.clear();
        let mut visible_width = 0;
        for idx in self.offset_column..self.columns.len() {
            let width = self.columns[idx].render_width + 1;
            if visible_width + width <= self.table_width || self.visible_columns.is_empty() {
                self.visible_columns.push(idx);
                visible_width += width;
            } else {
                break;
            }
        }
    }

    // -------------------- UI accessors ---------------------- //

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn visible_columns(&self) -> &[usize] {
        &self.visible_columns
    }

    pub(crate) fn visible_window(&self) -> (usize, usize) {
        let rbegin = self.offset_row;
        let rend = (rbegin + self.table_height).min(self.cells.len());
        (rbegin, rend.max(rbegin))
    }

    pub(crate) fn cells(&self) -> &[Vec<String>] {
        &self.cells
    }

    pub(crate) fn selected_visible_row(&self) -> usize {
        self.curser_row
    }

    pub(crate) fn selected_column(&self) -> usize {
        self.curser_column
    }

    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn status_line(&self) -> &str {
        &self.status_message
    }

    pub(crate) fn popup(&self) -> Option<&str> {
        self.show_popup.then_some(self.popup_message.as_str())
    }

    pub(crate) fn is_editing_column(&self, column_idx: usize) -> bool {
        matches!(self.modus, Modus::FILTERINPUT) && column_idx == self.curser_column
    }

    pub(crate) fn has_filter(&self, column_idx: usize) -> bool {
        self.columns
            .get(column_idx)
            .is_some_and(|c| self.filters.contains_key(&c.name))
    }

    /// Text for one cell of the filter row: the live input with a curser
    /// mark while editing, else the committed filter, else a placeholder.
    pub(crate) fn filter_cell_text(&self, column_idx: usize) -> String {
        if self.is_editing_column(column_idx) {
            let input = &self.last_input.input;
            let byte = input
                .char_indices()
                .nth(self.last_input.curser_pos)
                .map(|(b, _)| b)
                .unwrap_or(input.len());
            return format!("{}▏{}", &input[..byte], &input[byte..]);
        }
        let column = &self.columns[column_idx];
        match self.filters.get(&column.name) {
            Some(f) => f.input_text(),
            None => match column.kind {
                ColumnKind::NUMERIC => "=, >, <, >=, <=".to_string(),
                ColumnKind::TEXT => "Filter text...".to_string(),
            },
        }
    }
}

fn calculate_column_width(column: &Column, max_cell_width: usize) -> usize {
    let width = column
        .name
        .len()
        .max(column.type_tag.len())
        .max(column.max_width)
        + COLUMN_WIDTH_MARGIN;
    let cap = (max_cell_width + COLUMN_WIDTH_MARGIN).max(MIN_COLUMN_WIDTH);
    width.clamp(MIN_COLUMN_WIDTH, cap)
}

fn format_cell(value: Option<&Value>, max_width: usize) -> String {
    let mut text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.contains('\n') {
        text = text.replace("\r\n", " ↵ ").replace('\n', " ↵ ");
    }
    if text.chars().count() > max_width {
        let kept: String = text.chars().take(max_width.saturating_sub(3)).collect();
        text = kept + "...";
    }
    text
}
