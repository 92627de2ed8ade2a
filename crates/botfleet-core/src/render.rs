use crate::action::ActionKind;
use crate::classify::{classify, display_name, extract_ordinal, sort_for_display, DisplayStatus};
use crate::{FleetSnapshot, ProcessRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const PID_PLACEHOLDER: &str = "N/A";
pub const UPTIME_PLACEHOLDER: &str = "0:00:00";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "action")]
pub enum Control {
    Action(ActionKind),
    ViewLogs,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ControlButton {
    pub control: Control,
    pub label: &'static str,
    pub enabled: bool,
}

impl ControlButton {
    fn action(action: ActionKind, enabled: bool) -> Self {
        Self {
            control: Control::Action(action),
            label: action.label(),
            enabled,
        }
    }

    fn logs() -> Self {
        Self {
            control: Control::ViewLogs,
            label: "Logs",
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BotCard {
    pub name: String,
    pub display_name: String,
    pub ordinal: Option<u64>,
    pub status: DisplayStatus,
    pub raw_status: String,
    pub pid: String,
    pub uptime: String,
    pub controls: Vec<ControlButton>,
}

impl BotCard {
    pub fn from_record(record: &ProcessRecord) -> Self {
        let status = classify(record);
        Self {
            name: record.name.clone(),
            display_name: display_name(&record.name),
            ordinal: extract_ordinal(&record.name),
            status,
            raw_status: record.status.clone(),
            pid: record
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| PID_PLACEHOLDER.to_string()),
            uptime: record
                .uptime
                .clone()
                .filter(|uptime| !uptime.trim().is_empty())
                .unwrap_or_else(|| UPTIME_PLACEHOLDER.to_string()),
            controls: controls_for(record, status),
        }
    }

    /// The enabled button carrying `action`, if the card offers it.
    pub fn enabled_action(&self, action: ActionKind) -> Option<&ControlButton> {
        self.controls
            .iter()
            .find(|button| button.control == Control::Action(action) && button.enabled)
    }

    /// Whichever of the two actions the card currently offers.
    pub fn offered(&self, first: ActionKind, second: ActionKind) -> Option<&ControlButton> {
        self.controls.iter().find(|button| {
            button.control == Control::Action(first) || button.control == Control::Action(second)
        })
    }
}

/// Failed bots only get clear-and-restart plus logs; everything else gets the
/// full set with restart and pause gated on the raw running state.
pub fn controls_for(record: &ProcessRecord, status: DisplayStatus) -> Vec<ControlButton> {
    if status == DisplayStatus::Failed {
        return vec![
            ControlButton::action(ActionKind::ClearFailure, true),
            ControlButton::logs(),
        ];
    }
    let running = record.is_running();
    let pause = if record.paused {
        ActionKind::Resume
    } else {
        ActionKind::Pause
    };
    vec![
        ControlButton::action(ActionKind::toggle_for(&record.status), true),
        ControlButton::action(ActionKind::Restart, running),
        ControlButton::action(pause, running),
        ControlButton::logs(),
    ]
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct FleetCounts {
    pub online: usize,
    pub offline: usize,
    pub paused: usize,
    pub failed: usize,
}

impl FleetCounts {
    pub fn record(&mut self, status: DisplayStatus) {
        match status {
            DisplayStatus::Online => self.online += 1,
            DisplayStatus::Offline => self.offline += 1,
            DisplayStatus::Paused => self.paused += 1,
            DisplayStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.online + self.offline + self.paused + self.failed
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FleetView {
    pub cards: Vec<BotCard>,
    pub counts: FleetCounts,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FleetView {
    pub fn bot_count_label(&self) -> String {
        match self.cards.len() {
            1 => "1 bot".to_string(),
            n => format!("{n} bots"),
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cards.iter().position(|card| card.name == name)
    }
}

pub fn build_fleet_view(snapshot: &FleetSnapshot) -> FleetView {
    let mut counts = FleetCounts::default();
    let cards: Vec<BotCard> = sort_for_display(snapshot.records())
        .into_iter()
        .map(|record| {
            let card = BotCard::from_record(record);
            counts.record(card.status);
            card
        })
        .collect();
    FleetView {
        cards,
        counts,
        updated_at: snapshot.accepted_at(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{IncomingSnapshot, ProcessListReconciler};

    fn record(name: &str, status: &str) -> ProcessRecord {
        ProcessRecord::new(name, status)
    }

    fn actions(card: &BotCard) -> Vec<(Control, bool)> {
        card.controls
            .iter()
            .map(|button| (button.control, button.enabled))
            .collect()
    }

    #[test]
    fn failed_card_offers_clear_and_logs_only() {
        let card = BotCard::from_record(&ProcessRecord {
            auto_paused: true,
            ..record("bot4", "RUNNING")
        });
        assert_eq!(card.status, DisplayStatus::Failed);
        assert_eq!(
            actions(&card),
            vec![
                (Control::Action(ActionKind::ClearFailure), true),
                (Control::ViewLogs, true)
            ]
        );
        assert_eq!(card.controls[0].label, "Clear & Restart");
    }

    #[test]
    fn running_card_enables_every_control() {
        let card = BotCard::from_record(&ProcessRecord {
            pid: Some(812),
            uptime: Some("3:04:05".to_string()),
            ..record("bot2", "RUNNING")
        });
        assert_eq!(
            actions(&card),
            vec![
                (Control::Action(ActionKind::Stop), true),
                (Control::Action(ActionKind::Restart), true),
                (Control::Action(ActionKind::Pause), true),
                (Control::ViewLogs, true)
            ]
        );
        assert_eq!(card.pid, "812");
        assert_eq!(card.uptime, "3:04:05");
        assert_eq!(card.display_name, "Bot #2");
    }

    #[test]
    fn stopped_card_disables_restart_and_pause() {
        let card = BotCard::from_record(&record("scheduler", "STOPPED"));
        assert_eq!(
            actions(&card),
            vec![
                (Control::Action(ActionKind::Start), true),
                (Control::Action(ActionKind::Restart), false),
                (Control::Action(ActionKind::Pause), false),
                (Control::ViewLogs, true)
            ]
        );
        assert_eq!(card.pid, PID_PLACEHOLDER);
        assert_eq!(card.uptime, UPTIME_PLACEHOLDER);
        assert!(card.enabled_action(ActionKind::Restart).is_none());
        assert!(card.enabled_action(ActionKind::Start).is_some());
    }

    #[test]
    fn paused_running_card_offers_resume() {
        let card = BotCard::from_record(&ProcessRecord {
            paused: true,
            ..record("bot7", "RUNNING")
        });
        assert_eq!(card.status, DisplayStatus::Paused);
        let button = card
            .offered(ActionKind::Pause, ActionKind::Resume)
            .expect("pause control");
        assert_eq!(button.control, Control::Action(ActionKind::Resume));
        assert!(button.enabled);
    }

    #[test]
    fn view_is_sorted_and_counted() {
        let snapshot = FleetSnapshot::new(
            vec![
                record("bot3", "RUNNING"),
                ProcessRecord {
                    auto_paused: true,
                    ..record("bot1", "FATAL")
                },
                ProcessRecord {
                    paused: true,
                    ..record("bot2", "RUNNING")
                },
                record("bot10", "STOPPED"),
            ],
            Utc::now(),
        );
        let view = build_fleet_view(&snapshot);
        let names: Vec<&str> = view.cards.iter().map(|card| card.name.as_str()).collect();
        assert_eq!(names, vec!["bot1", "bot2", "bot3", "bot10"]);
        assert_eq!(
            view.counts,
            FleetCounts {
                online: 1,
                offline: 1,
                paused: 1,
                failed: 1
            }
        );
        assert_eq!(view.counts.total(), 4);
        assert_eq!(view.bot_count_label(), "4 bots");
        assert_eq!(view.position("bot10"), Some(3));
    }

    #[test]
    fn online_bot_survives_an_empty_frame() {
        let mut reconciler = ProcessListReconciler::new();
        reconciler.apply(IncomingSnapshot::Records(vec![record("bot1", "RUNNING")]));
        reconciler.apply(IncomingSnapshot::Empty);

        let view = build_fleet_view(reconciler.current());
        assert_eq!(view.cards.len(), 1);
        assert_eq!(view.cards[0].display_name, "Bot #1");
        assert_eq!(view.cards[0].status, DisplayStatus::Online);
        assert_eq!(view.bot_count_label(), "1 bot");
    }
}
