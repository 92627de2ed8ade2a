use crate::STATUS_RUNNING;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Control-plane commands, named by their URL path segment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    Pause,
    Resume,
    ClearFailure,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::Restart,
        ActionKind::Pause,
        ActionKind::Resume,
        ActionKind::ClearFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Restart => "restart",
            ActionKind::Pause => "pause",
            ActionKind::Resume => "resume",
            ActionKind::ClearFailure => "clear_failure",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Start => "Start",
            ActionKind::Stop => "Stop",
            ActionKind::Restart => "Restart",
            ActionKind::Pause => "Pause",
            ActionKind::Resume => "Resume",
            ActionKind::ClearFailure => "Clear & Restart",
        }
    }

    /// Destructive actions need an operator confirmation before anything is sent.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, ActionKind::Stop | ActionKind::Restart)
    }

    /// Delay before the follow-up refresh once the command succeeded.
    pub fn refresh_delay(&self) -> Duration {
        match self {
            ActionKind::Start | ActionKind::Stop | ActionKind::Pause | ActionKind::Resume => {
                Duration::from_millis(1000)
            }
            ActionKind::ClearFailure => Duration::from_millis(1500),
            ActionKind::Restart => Duration::from_millis(2000),
        }
    }

    /// Start/stop toggle target for a raw supervisor status.
    pub fn toggle_for(status: &str) -> ActionKind {
        if status == STATUS_RUNNING {
            ActionKind::Stop
        } else {
            ActionKind::Start
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "start" => Ok(ActionKind::Start),
            "stop" => Ok(ActionKind::Stop),
            "restart" => Ok(ActionKind::Restart),
            "pause" => Ok(ActionKind::Pause),
            "resume" => Ok(ActionKind::Resume),
            "clear_failure" | "clear-failure" | "clear" => Ok(ActionKind::ClearFailure),
            other => Err(format!("Unknown action: {other}")),
        }
    }
}
