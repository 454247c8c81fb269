//! `ratatui` front-end for the monitoring console: a status pane, the live
//! signal gauge, and the detection log, driven by the same polling loop shape
//! the worker threads expect.

use crate::log_debug;
use crate::App;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, List, ListItem, Paragraph},
    Terminal,
};
use std::io;
use std::time::Duration;

/// Configure the terminal, run the drawing loop, and tear everything down.
/// The session is stopped before the alternate screen is left so the device
/// is released even when the loop errors out.
pub fn run_app(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app_loop(&mut terminal, app);

    app.shutdown();
    if let Err(err) = disable_raw_mode() {
        log_debug(&format!("failed to disable raw mode: {err}"));
    }
    if let Err(err) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
        log_debug(&format!("failed to leave alternate screen: {err}"));
    }
    let _ = terminal.show_cursor();

    result
}

/// Core event/render loop.
fn app_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    terminal.draw(|frame| draw(frame, app))?;

    loop {
        // While active the gauge animates, so redraw every tick.
        let active = app.is_active();
        let poll_duration = if active {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(100)
        };

        let mut should_draw = app.take_redraw_request() || active;
        let mut should_quit = false;

        if event::poll(poll_duration)? {
            match event::read()? {
                Event::Key(key) => {
                    should_quit = handle_key_event(app, key)?;
                    should_draw = true;
                }
                Event::Resize(_, _) => {
                    should_draw = true;
                }
                _ => {}
            }
        }

        if should_draw {
            terminal.draw(|frame| draw(frame, app))?;
        }

        if should_quit {
            break;
        }
    }
    Ok(())
}

/// Interpret keystrokes into modifications to the shared `App` state.
fn handle_key_event(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    match key.code {
        KeyCode::Char('s') | KeyCode::Char('S') => app.toggle_monitoring(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.clear_detections(),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(true),
        _ => {}
    }

    Ok(false)
}

fn kind_color(kind: crate::classify::AircraftKind) -> Color {
    use crate::classify::AircraftKind;
    match kind {
        AircraftKind::Drone => Color::Red,
        AircraftKind::Airplane => Color::Blue,
        AircraftKind::Helicopter => Color::Green,
    }
}

/// Render status, gauge, detection log, and key hints.
pub fn draw(frame: &mut ratatui::Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let border_color = Color::Rgb(90, 140, 255);
    let dim_border = Color::Rgb(70, 90, 130);
    let text_color = Color::Rgb(205, 210, 220);
    let hint_color = Color::Rgb(150, 155, 165);

    let stats = app.stats();
    let status_lines = vec![
        Line::from(app.status_text().to_string()),
        Line::from(format!(
            "Submitted: {}  Dropped: {}  Failed: {}",
            stats.submitted, stats.dropped, stats.failed
        )),
    ];
    let status_block = Paragraph::new(status_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border_color))
                .title(Span::styled(
                    " Status ",
                    Style::default()
                        .fg(border_color)
                        .add_modifier(Modifier::BOLD),
                )),
        )
        .style(Style::default().fg(text_color));
    frame.render_widget(status_block, chunks[0]);

    let level = app.signal_level();
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(dim_border))
                .title(Span::styled(" Signal ", Style::default().fg(hint_color))),
        )
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Rgb(40, 45, 55)))
        .percent(level.round().clamp(0.0, 100.0) as u16)
        .label(format!("{level:.0}%"));
    frame.render_widget(gauge, chunks[1]);

    let detections = app.detections();
    let threshold = app.alert_threshold();
    let items: Vec<ListItem> = if detections.is_empty() {
        let hint = if app.is_active() {
            "Listening... no aircraft detected yet."
        } else {
            "Press S to start monitoring."
        };
        vec![ListItem::new(Line::from(Span::styled(
            hint,
            Style::default().fg(hint_color),
        )))]
    } else {
        detections
            .iter()
            .map(|event| {
                let mut spans = vec![
                    Span::styled(
                        event.time.format("%H:%M:%S").to_string(),
                        Style::default().fg(hint_color),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format!("{:<10}", event.kind.label()),
                        Style::default()
                            .fg(kind_color(event.kind))
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!("{:>6.1}%", event.confidence)),
                ];
                if event.confidence >= threshold {
                    spans.push(Span::styled(
                        "  ALERT",
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect()
    };
    let detections_block = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border_color))
                .title(Span::styled(
                    format!(" Detections ({}) ", detections.len()),
                    Style::default()
                        .fg(border_color)
                        .add_modifier(Modifier::BOLD),
                )),
        )
        .style(Style::default().fg(text_color));
    frame.render_widget(detections_block, chunks[2]);

    let hints = Paragraph::new(Line::from(vec![
        Span::styled("S ", Style::default().fg(text_color).add_modifier(Modifier::BOLD)),
        Span::styled("start/stop  ", Style::default().fg(hint_color)),
        Span::styled("C ", Style::default().fg(text_color).add_modifier(Modifier::BOLD)),
        Span::styled("clear log  ", Style::default().fg(hint_color)),
        Span::styled("Q ", Style::default().fg(text_color).add_modifier(Modifier::BOLD)),
        Span::styled("quit", Style::default().fg(hint_color)),
    ]));
    frame.render_widget(hints, chunks[3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use clap::Parser;

    fn test_app() -> App {
        let mut config = AppConfig::parse_from(["test-app"]);
        config.validate().expect("defaults should be valid");
        App::new(config)
    }

    #[test]
    fn quit_keys_end_the_loop() {
        let mut app = test_app();
        for code in [KeyCode::Char('q'), KeyCode::Char('Q'), KeyCode::Esc] {
            let quit = handle_key_event(&mut app, KeyEvent::new(code, KeyModifiers::empty()))
                .expect("key event");
            assert!(quit, "{code:?} should quit");
        }

        let quit = handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        )
        .expect("key event");
        assert!(quit, "Ctrl+C should quit");
    }

    #[test]
    fn clear_key_does_not_quit() {
        let mut app = test_app();
        let quit = handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::empty()),
        )
        .expect("key event");
        assert!(!quit);
    }
}
