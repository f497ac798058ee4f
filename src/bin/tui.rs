mod tui_app;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, BarChart, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table,
        TableState,
    },
    Frame, Terminal,
};
use tui_app::{format_ctr, format_hour, truncate, y_bounds, AppState, LoadStatus, RunReport};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    let report_path = std::env::var("REPORT_PATH").unwrap_or_else(|_| "./data/report.json".to_string());

    let mut app = AppState::new(PathBuf::from(report_path));

    // Initial load before rendering
    app.reload();

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut outlier_table_state = TableState::default();
    outlier_table_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &mut outlier_table_state);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    outlier_state: &mut TableState,
) -> io::Result<()> {
    let poll_interval = Duration::from_millis(250);

    loop {
        terminal.draw(|f| render(f, app, outlier_state))?;

        if event::poll(poll_interval)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => app.reload(),
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.outliers().len().saturating_sub(1);
                            let next = outlier_state.selected().map_or(0, |i| (i + 1).min(max));
                            outlier_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = outlier_state
                                .selected()
                                .map_or(0, |i| i.saturating_sub(1));
                            outlier_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, outlier_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | CTR chart | lower panels | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),       // header
            Constraint::Percentage(55),  // ctr over time
            Constraint::Min(0),          // sad | histogram | outliers
            Constraint::Length(1),       // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    match &app.report {
        Some(report) => {
            render_ctr_chart(f, app, report, chunks[1]);
            render_lower(f, app, report, outlier_state, chunks[2]);
        }
        None => {
            let msg = Paragraph::new(format!(
                "No report loaded from {}. Run the scanner first, then press [r].",
                app.report_path.display()
            ))
            .style(Style::default().fg(Color::DarkGray))
            .block(panel(" CTR "));
            f.render_widget(msg, chunks[1]);
        }
    }
    render_footer(f, chunks[3]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        LoadStatus::Loaded => (
            format!("● loaded {}s ago", app.last_load.elapsed().as_secs()),
            Color::Green,
        ),
        LoadStatus::Loading => ("◌ loading".to_string(), Color::Yellow),
        LoadStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mut title_spans = vec![
        Span::styled(
            " CTR Outlier Scanner  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
    ];

    if let Some(r) = &app.report {
        for text in [
            format!("{} hours ({} empty)", r.hours, r.empty_hours),
            format!("SMA{} ({})", r.window, r.window_choice),
            format!(
                "threshold {} = {} × {} {}",
                format_ctr(Some(r.threshold)),
                r.multiplier,
                r.dispersion_kind,
                format_ctr(Some(r.dispersion)),
            ),
            format!("{} outliers", r.outlier_count),
        ] {
            title_spans.push(Span::raw("  │  "));
            title_spans.push(Span::styled(text, Style::default().fg(Color::White)));
        }
    }

    let paragraph = Paragraph::new(Line::from(title_spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_ctr_chart(f: &mut Frame, app: &AppState, report: &RunReport, area: Rect) {
    let ctr = app.ctr_points();
    let sma = app.sma_points();
    let outliers = app.outlier_points();

    let datasets = vec![
        Dataset::default()
            .name("ctr")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&ctr),
        Dataset::default()
            .name(format!("sma{}", report.window))
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Yellow))
            .data(&sma),
        Dataset::default()
            .name("outliers")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
            .data(&outliers),
    ];

    let last = report.points.len().saturating_sub(1);
    let x_labels = [0, last / 2, last]
        .iter()
        .map(|&i| {
            report
                .points
                .get(i)
                .map(|p| format_hour(&p.hour))
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();
    let [y_lo, y_hi] = y_bounds(&ctr);

    let chart = Chart::new(datasets)
        .block(panel(" CTR OVER TIME "))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([0.0, last.max(1) as f64])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([y_lo, y_hi])
                .labels([format_ctr(Some(y_lo)), format_ctr(Some(y_hi))]),
        );

    f.render_widget(chart, area);
}

fn render_lower(
    f: &mut Frame,
    app: &AppState,
    report: &RunReport,
    outlier_state: &mut TableState,
    area: Rect,
) {
    let thirds = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Percentage(35),
        ])
        .split(area);

    render_sad_chart(f, app, report, thirds[0]);
    render_histogram(f, report, thirds[1]);
    render_outlier_table(f, app, outlier_state, thirds[2]);
}

fn render_sad_chart(f: &mut Frame, app: &AppState, report: &RunReport, area: Rect) {
    let sad = app.sad_points();
    let chosen: Vec<(f64, f64)> = sad
        .iter()
        .copied()
        .filter(|&(w, _)| w as usize == report.window)
        .collect();

    let (x_lo, x_hi) = report
        .scores
        .first()
        .zip(report.scores.last())
        .map_or((0.0, 1.0), |(a, b)| (a.window as f64, b.window as f64));
    let [y_lo, y_hi] = y_bounds(&sad);

    let datasets = vec![
        Dataset::default()
            .name("sad")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&sad),
        Dataset::default()
            .name("chosen")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            .data(&chosen),
    ];

    let chart = Chart::new(datasets)
        .block(panel(" SAD BY WINDOW "))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([x_lo, x_hi.max(x_lo + 1.0)])
                .labels([format!("{x_lo:.0}"), format!("{x_hi:.0}")]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([y_lo, y_hi])
                .labels([format!("{y_lo:.2}"), format!("{y_hi:.2}")]),
        );

    f.render_widget(chart, area);
}

fn render_histogram(f: &mut Frame, report: &RunReport, area: Rect) {
    let dist = &report.ctr_distribution;
    let labels: Vec<String> = dist
        .bins
        .iter()
        .map(|b| format!("{:.0}", b.lower * 100.0))
        .collect();
    let data: Vec<(&str, u64)> = labels
        .iter()
        .zip(&dist.bins)
        .map(|(label, b)| (label.as_str(), b.count))
        .collect();

    let inner_width = area.width.saturating_sub(2) as usize;
    let bar_width = (inner_width / data.len().max(1)).saturating_sub(1).clamp(1, 8) as u16;

    let title = format!(
        " CTR HISTOGRAM (%)  p50 {} p95 {} p99 {} ",
        format_ctr(dist.p50),
        format_ctr(dist.p95),
        format_ctr(dist.p99),
    );
    let top_bin = dist
        .bins
        .iter()
        .max_by_key(|b| b.count)
        .map(|b| format!("mode {:.1}–{:.1}%", b.lower * 100.0, b.upper * 100.0))
        .unwrap_or_default();

    let chart = BarChart::default()
        .block(panel(&title).title_bottom(Line::from(top_bin).style(Style::default().fg(Color::DarkGray))))
        .data(data.as_slice())
        .bar_width(bar_width)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, area);
}

fn render_outlier_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Hour", "CTR", "SMA", "Impr."]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .outliers()
        .into_iter()
        .map(|p| {
            let above = p.ctr.zip(p.sma).is_some_and(|(c, s)| c > s);
            let ctr_color = if above { Color::Green } else { Color::Red };
            Row::new(vec![
                Cell::from(format_hour(&p.hour)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format_ctr(p.ctr)).style(Style::default().fg(ctr_color)),
                Cell::from(format_ctr(p.sma)),
                Cell::from(format!("{} / {}", p.clicks, p.impressions)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(6),
        ],
    )
    .header(header)
    .block(panel(" OUTLIERS "))
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("reload report  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll outliers"),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}
