use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use typeflow::practice::PracticeTarget;
use typeflow::session::{CharState, Session, SessionResult};
use unicode_width::UnicodeWidthStr;

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const CHART_DAYS: usize = 7;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match &self.state {
            AppState::Practice => render_practice(self, area, buf),
            AppState::Results(result) => render_results(self, result, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn title_for(target: &PracticeTarget) -> String {
    match target {
        PracticeTarget::Lesson {
            category_id,
            exercise_id,
        } => format!("{category_id} / {exercise_id}"),
        PracticeTarget::Free { label } => label.clone(),
    }
}

/// Target text painted by character state, split on embedded newlines.
pub fn target_lines(session: &Session) -> Vec<Line<'static>> {
    let green_bold = bold().fg(Color::Green);
    let red_bold = bold().fg(Color::Red);
    let current = dim_bold().add_modifier(Modifier::UNDERLINED);

    let mut lines = Vec::new();
    let mut spans = Vec::new();
    for (c, state) in session.target().chars().iter().copied().zip(session.char_states()) {
        let style = match state {
            CharState::Correct => green_bold,
            CharState::Incorrect => red_bold,
            CharState::Current => current,
            CharState::Untyped => dim_bold(),
        };
        let symbol = match (c, state) {
            ('\n', _) => "⏎".to_string(),
            (' ', CharState::Incorrect) => "·".to_string(),
            (c, _) => c.to_string(),
        };
        spans.push(Span::styled(symbol, style));
        if c == '\n' {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }
    lines.push(Line::from(spans));
    lines
}

fn render_practice(app: &App, area: Rect, buf: &mut Buffer) {
    let session = app.controller.session();
    let now = app.now();
    let prefs = app.store.preferences();

    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let text = session.target().to_string();
    let single_line = !text.contains('\n') && text.width() <= max_chars_per_line as usize;
    let prompt_lines = if single_line {
        1
    } else {
        text.lines()
            .map(|l| (l.width() as u16 / max_chars_per_line) + 1)
            .sum::<u16>()
            + 1
    };

    let padding = area.height.saturating_sub(prompt_lines + 6) / 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Length(padding),
                Constraint::Length(2),
                Constraint::Length(prompt_lines),
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    Paragraph::new(Span::styled(title_for(app.controller.target()), bold()))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let progress = session.progress_at(now);
    let mut header = format!(
        "{} wpm   {}% acc   {:.0}%",
        progress.running_wpm, progress.running_accuracy, progress.progress_percent
    );
    if let Some(remaining) = session.remaining_seconds(now) {
        header = format!("{remaining:.0}s   {header}");
    }
    Paragraph::new(Span::styled(header, dim_bold()))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    Paragraph::new(target_lines(session))
        .alignment(if single_line {
            Alignment::Center
        } else {
            Alignment::Left
        })
        .wrap(Wrap { trim: false })
        .render(chunks[3], buf);

    if prefs.show_key_hints {
        let key_label = |k: Option<char>| match k {
            Some(' ') => "space".to_string(),
            Some('\n') => "enter".to_string(),
            Some(c) => c.to_string(),
            None => "-".to_string(),
        };
        let hints = format!(
            "pressed: {}   next: {}",
            key_label(session.active_key()),
            key_label(session.target_key())
        );
        Paragraph::new(Span::styled(hints, Style::default().fg(Color::Cyan)))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
    }

    render_footer(app, "(tab) restart / (esc)ape", chunks[6], buf);
}

fn render_results(app: &App, result: &SessionResult, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(area);

    render_recent_chart(app, chunks[0], buf);

    Paragraph::new(Span::styled(
        format!(
            "{} wpm   {}% acc   {:.1}s   {} mistakes",
            result.wpm, result.accuracy, result.elapsed_seconds, result.mistake_count
        ),
        bold(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let unlocked = app.controller.unlocks().and_then(|u| {
        u.next_category
            .as_ref()
            .map(|c| format!("category unlocked: {c}"))
            .or_else(|| u.next_exercise.as_ref().map(|e| format!("unlocked: {e}")))
    });
    if let Some(message) = unlocked {
        Paragraph::new(Span::styled(
            message,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);
    }

    let summary = app.store.summary();
    Paragraph::new(Span::styled(
        format!(
            "streak {} days   best {} wpm   {} sessions",
            summary.practice_streak, summary.best_wpm, summary.sessions
        ),
        Style::default().fg(Color::Gray),
    ))
    .alignment(Alignment::Center)
    .render(chunks[3], buf);

    let legend = if app.has_next_exercise() {
        "(r)etry / (n)ext / (esc)ape"
    } else {
        "(r)etry / (esc)ape"
    };
    render_footer(app, legend, chunks[5], buf);
}

/// Daily speed over the last week, today on the right.
fn render_recent_chart(app: &App, area: Rect, buf: &mut Buffer) {
    let recent = app.store.recent_stats(CHART_DAYS);
    let points: Vec<(f64, f64)> = recent
        .iter()
        .enumerate()
        .map(|(i, day)| (i as f64 + 1.0, day.wpm as f64))
        .collect();
    let highest = recent.iter().map(|d| d.wpm).max().unwrap_or(0).max(10) as f64;

    let labels_x = vec![
        Span::styled(
            recent.first().map(|d| d.date.format("%m-%d").to_string()).unwrap_or_default(),
            bold(),
        ),
        Span::styled("today", bold()),
    ];

    let datasets = vec![Dataset::default()
        .marker(ratatui::symbols::Marker::Braille)
        .style(Style::default().fg(Color::Magenta))
        .graph_type(GraphType::Line)
        .data(&points)];

    Chart::new(datasets)
        .x_axis(
            Axis::default()
                .title("day")
                .bounds([1.0, CHART_DAYS as f64])
                .labels(labels_x),
        )
        .y_axis(
            Axis::default()
                .title("wpm")
                .bounds([0.0, highest])
                .labels(vec![
                    Span::styled("0", bold()),
                    Span::styled(format!("{highest:.0}"), bold()),
                ]),
        )
        .render(area, buf);
}

fn render_footer(app: &App, legend: &str, area: Rect, buf: &mut Buffer) {
    let line = match app.store.storage_warning() {
        Some(warning) => Span::styled(
            warning.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        None => Span::styled(
            legend.to_string(),
            Style::default().add_modifier(Modifier::ITALIC),
        ),
    };
    Paragraph::new(line).render(area, buf);
}
