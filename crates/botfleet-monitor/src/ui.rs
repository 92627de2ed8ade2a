use crate::state::{App, Modal};
use crate::theme::{
    connection_color, fleet_theme, status_color, status_note_color, FleetTheme, SELECTED_STYLE,
};
use botfleet_core::{ActionKind, BotCard, Control, ControlButton, FleetView};
use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

pub fn render_ui(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let theme = fleet_theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(size);

    frame.render_widget(render_header(app, theme, layout[0].width), layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(layout[1]);
    render_fleet_list(frame, app, theme, body[0]);
    frame.render_widget(render_detail(app.selected_card(), theme), body[1]);

    match &app.modal {
        Some(Modal::Confirm(prompt)) => render_modal(
            frame,
            theme,
            "Confirm",
            vec![
                Line::from(Span::styled(
                    prompt.message(),
                    Style::default().fg(theme.text),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "y confirm    n cancel",
                    Style::default().fg(theme.muted),
                )),
            ],
            theme.warn,
        ),
        Some(Modal::Alert(message)) => render_modal(
            frame,
            theme,
            "Alert",
            vec![
                Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(theme.text),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "press any key",
                    Style::default().fg(theme.muted),
                )),
            ],
            theme.critical,
        ),
        None => {}
    }

    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn render_header(app: &App, theme: FleetTheme, width: u16) -> Paragraph<'static> {
    let inner_width = width.saturating_sub(4) as usize;
    let view = &app.view;
    let state_label = if app.suspended {
        format!("{} (suspended)", app.connection.label())
    } else {
        app.connection.label().to_string()
    };
    let counts = format!(
        "Online {}  Offline {}  Paused {}  Failed {}",
        view.counts.online, view.counts.offline, view.counts.paused, view.counts.failed
    );
    let status_line = Line::from(vec![
        Span::styled(
            state_label,
            Style::default()
                .fg(connection_color(app.connection, theme))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(" | ", Style::default().fg(theme.border)),
        Span::styled(counts, Style::default().fg(theme.text)),
        Span::styled(" | ", Style::default().fg(theme.border)),
        Span::styled(view.bot_count_label(), Style::default().fg(theme.text)),
        Span::styled(" | ", Style::default().fg(theme.border)),
        Span::styled(
            format!("Updated: {}", updated_label(view.updated_at)),
            Style::default().fg(theme.muted),
        ),
    ]);

    let (action_text, action_color) = match app.status_note.as_deref() {
        Some(note) => (
            format!("Last Action: {note}"),
            status_note_color(note, theme),
        ),
        None => (
            "Last Action: ready (s start/stop, r restart, ? help)".to_string(),
            theme.muted,
        ),
    };

    Paragraph::new(Text::from(vec![
        status_line,
        Line::from(Span::styled(
            ellipsize(&action_text, inner_width.max(12)),
            Style::default().fg(action_color),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(Span::styled(
                "Fleet",
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            )),
    )
}

fn updated_label(updated_at: Option<DateTime<Utc>>) -> String {
    match updated_at {
        Some(at) => at.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

fn render_fleet_list(frame: &mut Frame, app: &App, theme: FleetTheme, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            "Bots",
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ));

    if app.view.cards.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No bots reported yet",
            Style::default().fg(theme.muted),
        ))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .view
        .cards
        .iter()
        .map(|card| ListItem::new(card_line(card, theme)))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(SELECTED_STYLE)
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn card_line(card: &BotCard, theme: FleetTheme) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:<12}", ellipsize(&card.display_name, 12)),
            Style::default().fg(theme.text),
        ),
        Span::styled(
            format!("{:<8}", card.status.label()),
            Style::default()
                .fg(status_color(card.status, theme))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{:<10}", ellipsize(&card.raw_status, 10)),
            Style::default().fg(theme.muted),
        ),
        Span::styled(
            format!("pid {:<8}", card.pid),
            Style::default().fg(theme.muted),
        ),
        Span::styled(format!("up {}", card.uptime), Style::default().fg(theme.muted)),
    ])
}

fn render_detail(card: Option<&BotCard>, theme: FleetTheme) -> Paragraph<'static> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            "Detail",
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ));
    let Some(card) = card else {
        return Paragraph::new(Span::styled(
            "Select a bot",
            Style::default().fg(theme.muted),
        ))
        .block(block);
    };

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label:<8}"), Style::default().fg(theme.muted)),
            Span::styled(value, Style::default().fg(theme.text)),
        ])
    };
    let mut lines = vec![
        Line::from(Span::styled(
            card.display_name.clone(),
            Style::default()
                .fg(status_color(card.status, theme))
                .add_modifier(Modifier::BOLD),
        )),
        field("Name", card.name.clone()),
        field("Status", card.status.label().to_string()),
        field("Raw", card.raw_status.clone()),
        field("PID", card.pid.clone()),
        field("Uptime", card.uptime.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "Controls",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )),
    ];
    lines.extend(card.controls.iter().map(|button| control_line(button, theme)));

    Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
}

fn control_line(button: &ControlButton, theme: FleetTheme) -> Line<'static> {
    let style = if button.enabled {
        Style::default().fg(theme.text)
    } else {
        Style::default()
            .fg(theme.muted)
            .add_modifier(Modifier::DIM)
    };
    Line::from(vec![
        Span::styled(
            format!("  [{}] ", key_hint(button.control)),
            Style::default().fg(if button.enabled {
                theme.accent
            } else {
                theme.muted
            }),
        ),
        Span::styled(button.label, style),
    ])
}

pub fn key_hint(control: Control) -> char {
    match control {
        Control::Action(ActionKind::Start | ActionKind::Stop) => 's',
        Control::Action(ActionKind::Restart) => 'r',
        Control::Action(ActionKind::Pause | ActionKind::Resume) => 'p',
        Control::Action(ActionKind::ClearFailure) => 'c',
        Control::ViewLogs => 'l',
    }
}

fn render_modal(
    frame: &mut Frame,
    theme: FleetTheme,
    title: &'static str,
    lines: Vec<Line<'static>>,
    accent: Color,
) {
    let area = centered_rect(56, 24, frame.size());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .title(Span::styled(
                    title,
                    Style::default().fg(accent).add_modifier(Modifier::BOLD),
                )),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(modal, area);
}

fn render_help_overlay(frame: &mut Frame, theme: FleetTheme) {
    let area = centered_rect(70, 64, frame.size());
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        heading("Navigation"),
        Line::from("  j/k, Up/Down  select bot"),
        Line::from("  R, F5         refresh now"),
        Line::from(""),
        heading("Bot Controls"),
        Line::from("  s  start or stop (stop asks first)"),
        Line::from("  r  restart (asks first)"),
        Line::from("  p  pause or resume"),
        Line::from("  c  clear failure and restart"),
        Line::from("  l  save log to the download dir"),
        Line::from(""),
        heading("Session & Exit"),
        Line::from("  ?  toggle help"),
        Line::from("  q  quit"),
    ];
    frame.render_widget(Clear, area);
    let help = Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    "Help",
                    Style::default()
                        .fg(theme.title)
                        .add_modifier(Modifier::BOLD),
                )),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

/// Plain-text fleet table for the one-shot `snapshot` command.
pub fn fleet_table(view: &FleetView) -> String {
    let mut out = format!(
        "{:<14} {:<8} {:<10} {:<8} {}\n",
        "BOT", "STATE", "RAW", "PID", "UPTIME"
    );
    for card in &view.cards {
        out.push_str(&format!(
            "{:<14} {:<8} {:<10} {:<8} {}\n",
            ellipsize(&card.display_name, 14),
            card.status.label(),
            ellipsize(&card.raw_status, 10),
            card.pid,
            card.uptime
        ));
    }
    out.push_str(&format!(
        "{} | online {} offline {} paused {} failed {}\n",
        view.bot_count_label(),
        view.counts.online,
        view.counts.offline,
        view.counts.paused,
        view.counts.failed
    ));
    out
}
