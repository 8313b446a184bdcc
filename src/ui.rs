use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::model::Model;

pub const TITLEBAR_HEIGHT: usize = 1;
/// Filter-input row plus the column name and type rows.
pub const TABLE_HEADER_HEIGHT: usize = 3;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const MIN_COLUMN_WIDTH: usize = 4;

pub struct TableUI;

impl TableUI {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let area = frame.area();
        let [title_area, header_area, body_area, status_area] = Layout::vertical([
            Constraint::Length(TITLEBAR_HEIGHT as u16),
            Constraint::Length(TABLE_HEADER_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(area);

        self.draw_title(model, frame, title_area);
        self.draw_header(model, frame, header_area);
        if let Some(message) = model.error() {
            self.draw_error(message, frame, body_area);
        } else {
            self.draw_body(model, frame, body_area);
        }
        self.draw_status(model, frame, status_area);
        if let Some(help) = model.popup() {
            self.draw_popup(help, frame, area);
        }
    }

    fn draw_title(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            Span::from(format!(" {} ", model.name())).bold(),
            Span::from(model.path().to_string()).dim(),
        ]);
        frame.render_widget(Paragraph::new(title), area);
    }

    fn column_widths(&self, model: &Model) -> Vec<Constraint> {
        let columns = model.columns();
        model
            .visible_columns()
            .iter()
            .map(|&idx| Constraint::Length(columns[idx].render_width as u16))
            .collect()
    }

    fn draw_header(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let visible = model.visible_columns();
        if visible.is_empty() {
            return;
        }
        let columns = model.columns();

        let filter_cells: Vec<Cell> = visible
            .iter()
            .map(|&idx| {
                let text = model.filter_cell_text(idx);
                let line = if model.is_editing_column(idx) {
                    Line::from(text).bold()
                } else if model.has_filter(idx) {
                    Line::from(text).yellow()
                } else {
                    Line::from(text).dim().italic()
                };
                Cell::from(line)
            })
            .collect();

        let name_cells: Vec<Cell> = visible
            .iter()
            .map(|&idx| {
                let mut line = Line::from(columns[idx].name.clone()).bold();
                if idx == model.selected_column() {
                    line = line.underlined();
                }
                Cell::from(line)
            })
            .collect();

        let type_cells: Vec<Cell> = visible
            .iter()
            .map(|&idx| Cell::from(Line::from(columns[idx].type_tag.clone()).dim()))
            .collect();

        let header = Table::new(
            vec![
                Row::new(filter_cells),
                Row::new(name_cells),
                Row::new(type_cells),
            ],
            self.column_widths(model),
        )
        .column_spacing(1);
        frame.render_widget(header, area);
    }

    fn draw_body(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let visible = model.visible_columns();
        if visible.is_empty() {
            return;
        }
        let (rbegin, rend) = model.visible_window();
        let rows: Vec<Row> = model.cells()[rbegin..rend]
            .iter()
            .map(|cells| Row::new(visible.iter().map(|&idx| Cell::from(cells[idx].as_str()))))
            .collect();

        let table = Table::new(rows, self.column_widths(model))
            .column_spacing(1)
            .row_highlight_style(Style::new().reversed());
        let mut state = TableState::default().with_selected(Some(model.selected_visible_row()));
        frame.render_stateful_widget(table, area, &mut state);
    }

    /// A single full-width row carrying the message replaces the body.
    fn draw_error(&self, message: &str, frame: &mut Frame, area: Rect) {
        let line = Line::from(message.to_string()).red();
        frame.render_widget(Paragraph::new(line).wrap(Wrap { trim: true }), area);
    }

    fn draw_status(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::from(model.status_line().to_string())];
        if model.raw_keyevents() {
            spans.push(Span::from("  (Enter commits, Esc cancels)").dim());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_popup(&self, help: &str, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(area, 64, 16);
        frame.render_widget(Clear, popup);
        let block = Block::bordered().title(Line::from(" help ").centered());
        frame.render_widget(Paragraph::new(help.to_string()).block(block), popup);
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
