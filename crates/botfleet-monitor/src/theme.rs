use botfleet_core::DisplayStatus;
use botfleet_sync::ConnectionState;
use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Copy)]
pub struct FleetTheme {
    pub bg: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn fleet_theme() -> FleetTheme {
    FleetTheme {
        bg: Color::Rgb(11, 18, 32),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(100, 116, 139),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(30, 41, 59))
    .add_modifier(Modifier::BOLD);

pub fn status_color(status: DisplayStatus, theme: FleetTheme) -> Color {
    match status {
        DisplayStatus::Online => theme.ok,
        DisplayStatus::Offline => theme.muted,
        DisplayStatus::Paused => theme.warn,
        DisplayStatus::Failed => theme.critical,
    }
}

pub fn connection_color(state: ConnectionState, theme: FleetTheme) -> Color {
    match state {
        ConnectionState::Connected => theme.ok,
        ConnectionState::Connecting => theme.warn,
        ConnectionState::Disconnected => theme.muted,
        ConnectionState::ReconnectExhausted => theme.critical,
    }
}

pub fn status_note_color(note: &str, theme: FleetTheme) -> Color {
    let normalized = note.to_ascii_lowercase();
    if normalized.starts_with("error")
        || normalized.contains("failed")
        || normalized.contains("lost")
        || normalized.contains("not available")
    {
        return theme.critical;
    }
    if normalized.contains("suspended") || normalized.contains("reconnect") {
        return theme.warn;
    }
    theme.info
}
