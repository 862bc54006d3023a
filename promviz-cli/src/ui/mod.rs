pub mod graph;
pub mod theme;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use promviz_core::panels::{PanelState, PanelView, QueryHistory, format_clock};

use graph::render_graph;
use theme::styles;

pub type Tui = Terminal<CrosstermBackend<io::Stdout>>;

const INSTRUCTIONS: &str = "Navigation: ← → Arrow keys or Tab/Shift+Tab to switch panels | q/Q to quit";

/// What a key press asks the dashboard to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiAction {
    Quit,
    FocusNext,
    FocusPrev,
}

pub fn map_key(key: KeyEvent) -> Option<UiAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), m) if m.contains(KeyModifiers::CONTROL) => Some(UiAction::Quit),
        (KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc, _) => Some(UiAction::Quit),
        (KeyCode::Tab | KeyCode::Right | KeyCode::Char('l'), _) => Some(UiAction::FocusNext),
        (KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h'), _) => Some(UiAction::FocusPrev),
        _ => None,
    }
}

/// Static facts shown in the header line
#[derive(Clone, Debug)]
pub struct HeaderInfo {
    pub backend: &'static str,
    pub refresh_interval: Duration,
}

// --- Terminal setup/teardown ---
pub fn setup_terminal() -> io::Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

pub fn restore_terminal(mut terminal: Tui) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn draw(f: &mut Frame, panels: &PanelState, header: &HeaderInfo) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    let header_line = Line::from(vec![
        Span::styled(" promviz ", styles::title(true)),
        Span::styled(
            format!(
                "backend: {}  refresh: {}s  panels: {}",
                header.backend,
                header.refresh_interval.as_secs(),
                panels.len()
            ),
            styles::text_dim(),
        ),
    ]);
    f.render_widget(Paragraph::new(header_line), rows[0]);

    draw_panels(f, panels, rows[1]);

    f.render_widget(
        Paragraph::new(Line::styled(panels.footer_text(), styles::text()))
            .alignment(Alignment::Center),
        rows[2],
    );
    f.render_widget(
        Paragraph::new(Line::styled(INSTRUCTIONS, styles::key_hint())).alignment(Alignment::Center),
        rows[3],
    );
}

fn draw_panels(f: &mut Frame, panels: &PanelState, area: Rect) {
    let range = panels.visible_range();
    if range.is_empty() {
        return;
    }

    let constraints = vec![Constraint::Ratio(1, range.len() as u32); range.len()];
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (column, index) in columns.iter().zip(range) {
        let Some(history) = panels.history(index) else {
            continue;
        };
        let focused = index == panels.focus();
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(styles::border(focused))
            .title(Span::styled(format!(" {} ", history.name), styles::title(focused)));
        let inner = block.inner(*column);
        let body = panel_lines(history, inner.width, inner.height);
        f.render_widget(Paragraph::new(body).block(block), *column);
    }
}

/// Body of one panel for its inner size
pub fn panel_lines(history: &QueryHistory, width: u16, height: u16) -> Vec<Line<'static>> {
    let view = history.view();
    let style = styles::view(&view);
    match view {
        PanelView::Initializing => vec![Line::styled("Initializing...", style)],
        PanelView::NoData => vec![Line::styled("No data available", style)],
        PanelView::Error(err) => vec![Line::styled(format!("Error: {err}"), style)],
        PanelView::Graph(series) => {
            let Some(graph) = render_graph(&history.name, series, width, height) else {
                return vec![Line::styled("No data available", styles::view(&PanelView::NoData))];
            };
            let mut lines = vec![
                Line::styled(format!("Current: {:.2}", graph.current), styles::current_value()),
                Line::styled(
                    format!(
                        "Time Range: {} to {}",
                        format_clock(graph.from),
                        format_clock(graph.to)
                    ),
                    styles::text_dim(),
                ),
                Line::default(),
            ];
            lines.extend(graph.plot.into_iter().map(|row| Line::styled(row, style)));
            lines
        }
    }
}
