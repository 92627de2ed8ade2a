use botfleet_core::{ActionKind, BotCard, Control, FleetView};
use botfleet_sync::{ConfirmPrompt, ConnectionState, LogOutcome, SessionEvent};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Confirm(ConfirmPrompt),
    Alert(String),
}

/// What the event loop should do with the session after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    None,
    Dispatch(ActionKind, String),
    Confirm(ConfirmPrompt),
    SaveLog(String),
    Refresh,
    Quit,
}

pub struct App {
    pub connection: ConnectionState,
    pub view: FleetView,
    pub selected: usize,
    selected_name: Option<String>,
    pub modal: Option<Modal>,
    pub status_note: Option<String>,
    pub help_open: bool,
    pub suspended: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            view: FleetView::default(),
            selected: 0,
            selected_name: None,
            modal: None,
            status_note: None,
            help_open: false,
            suspended: false,
        }
    }

    /// Swaps in a fresh view, keeping the cursor on the same bot when it is
    /// still listed.
    pub fn set_view(&mut self, view: FleetView) {
        self.view = view;
        if let Some(index) = self
            .selected_name
            .as_deref()
            .and_then(|name| self.view.position(name))
        {
            self.selected = index;
        }
        self.clamp_selection();
    }

    pub fn selected_card(&self) -> Option<&BotCard> {
        self.view.cards.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) {
        if self.view.cards.is_empty() {
            self.selected = 0;
            self.selected_name = None;
            return;
        }
        let last = self.view.cards.len() - 1;
        self.selected = if delta < 0 {
            self.selected.saturating_sub(delta.unsigned_abs())
        } else {
            self.selected.saturating_add(delta as usize).min(last)
        };
        self.selected_name = self.selected_card().map(|card| card.name.clone());
    }

    fn clamp_selection(&mut self) {
        if self.view.cards.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.view.cards.len() {
            self.selected = self.view.cards.len() - 1;
        }
        self.selected_name = self.selected_card().map(|card| card.name.clone());
    }

    pub fn open_confirm(&mut self, prompt: ConfirmPrompt) {
        self.modal = Some(Modal::Confirm(prompt));
    }

    pub fn alert(&mut self, message: impl Into<String>) {
        self.modal = Some(Modal::Alert(message.into()));
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        if self.suspended == suspended {
            return;
        }
        self.suspended = suspended;
        self.status_note = Some(if suspended {
            "Updates suspended while the terminal is in the background".to_string()
        } else {
            "Updates resumed".to_string()
        });
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Intent {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Intent::Quit;
        }

        match self.modal.take() {
            Some(Modal::Alert(_)) => return Intent::None,
            Some(Modal::Confirm(prompt)) => {
                return match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                        Intent::Confirm(prompt)
                    }
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        self.status_note = Some("Cancelled".to_string());
                        Intent::None
                    }
                    _ => {
                        self.modal = Some(Modal::Confirm(prompt));
                        Intent::None
                    }
                };
            }
            None => {}
        }

        if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
            self.help_open = !self.help_open;
            return Intent::None;
        }
        if key.code == KeyCode::Esc && self.help_open {
            self.help_open = false;
            return Intent::None;
        }
        if self.help_open {
            return Intent::None;
        }

        match key.code {
            KeyCode::Char('q') => Intent::Quit,
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                Intent::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                Intent::None
            }
            KeyCode::Char('R') | KeyCode::F(5) => Intent::Refresh,
            KeyCode::Char('s') => self.action_intent(|card| {
                card.offered(ActionKind::Start, ActionKind::Stop)
                    .filter(|button| button.enabled)
                    .and_then(|button| match button.control {
                        Control::Action(action) => Some(action),
                        Control::ViewLogs => None,
                    })
            }),
            KeyCode::Char('r') => self.fixed_action(ActionKind::Restart),
            KeyCode::Char('p') => self.action_intent(|card| {
                card.offered(ActionKind::Pause, ActionKind::Resume)
                    .filter(|button| button.enabled)
                    .and_then(|button| match button.control {
                        Control::Action(action) => Some(action),
                        Control::ViewLogs => None,
                    })
            }),
            KeyCode::Char('c') => self.fixed_action(ActionKind::ClearFailure),
            KeyCode::Char('l') => match self.selected_card() {
                Some(card)
                    if card
                        .controls
                        .iter()
                        .any(|button| button.control == Control::ViewLogs && button.enabled) =>
                {
                    Intent::SaveLog(card.name.clone())
                }
                _ => Intent::None,
            },
            _ => Intent::None,
        }
    }

    fn fixed_action(&mut self, action: ActionKind) -> Intent {
        self.action_intent(|card| card.enabled_action(action).map(|_| action))
    }

    /// Only enabled controls of the selected card can produce a dispatch.
    fn action_intent<F>(&mut self, pick: F) -> Intent
    where
        F: FnOnce(&BotCard) -> Option<ActionKind>,
    {
        let Some(card) = self.selected_card() else {
            return Intent::None;
        };
        match pick(card) {
            Some(action) => Intent::Dispatch(action, card.name.clone()),
            None => {
                let note = format!("Not available for {}", card.display_name);
                self.status_note = Some(note);
                Intent::None
            }
        }
    }

    pub fn apply_session_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Snapshot { .. } => {}
            SessionEvent::Connection(state) => {
                if *state == ConnectionState::Connecting
                    && self.connection == ConnectionState::Connected
                {
                    self.status_note = Some("Connection dropped, reconnecting".to_string());
                }
                self.connection = *state;
            }
            SessionEvent::ConnectFailed { attempt, error } => {
                self.status_note = Some(format!("Connect attempt {attempt} failed: {error}"));
            }
            SessionEvent::ReconnectExhausted { attempts } => {
                self.connection = ConnectionState::ReconnectExhausted;
                self.alert(format!(
                    "Lost connection to the supervisor after {attempts} attempts. Press R to retry."
                ));
            }
            SessionEvent::Command(report) => {
                let message = report.operator_message();
                if !report.is_success() {
                    self.alert(message.clone());
                }
                self.status_note = Some(message);
            }
            SessionEvent::Log(report) => match report.outcome {
                LogOutcome::Saved { .. } => self.status_note = Some(report.operator_message()),
                LogOutcome::Failed { .. } => self.alert(report.operator_message()),
            },
        }
    }
}
