use crate::control::ControlPlane;
use crate::error::ControlError;
use botfleet_core::{display_name, ActionKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// A command cleared to go out. Destructive actions can only produce one
/// through [`ConfirmPrompt::confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    action: ActionKind,
    target: String,
}

impl Command {
    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    action: ActionKind,
    target: String,
}

impl ConfirmPrompt {
    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn message(&self) -> String {
        match self.action {
            ActionKind::Stop => format!(
                "Are you sure you want to stop {}?",
                display_name(&self.target)
            ),
            ActionKind::Restart => format!(
                "Are you sure you want to restart {}?",
                display_name(&self.target)
            ),
            other => format!("{} {}?", other.label(), display_name(&self.target)),
        }
    }

    pub fn confirm(self) -> Command {
        Command {
            action: self.action,
            target: self.target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Ready(Command),
    NeedsConfirmation(ConfirmPrompt),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded {
        message: Option<String>,
        refresh_after: Duration,
    },
    Rejected {
        message: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub action: ActionKind,
    pub target: String,
    pub outcome: DispatchOutcome,
}

impl CommandReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Succeeded { .. })
    }

    pub fn refresh_after(&self) -> Option<Duration> {
        match self.outcome {
            DispatchOutcome::Succeeded { refresh_after, .. } => Some(refresh_after),
            _ => None,
        }
    }

    pub fn operator_message(&self) -> String {
        let name = display_name(&self.target);
        match &self.outcome {
            DispatchOutcome::Succeeded {
                message: Some(message),
                ..
            } => message.clone(),
            DispatchOutcome::Succeeded { message: None, .. } => {
                format!("{} sent to {name}", self.action.label())
            }
            DispatchOutcome::Rejected { message } => format!("Error: {message}"),
            DispatchOutcome::Failed { error } => {
                format!("Failed to {} {name}: {error}", self.action.as_str().replace('_', " "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Saved { path: PathBuf, bytes: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub target: String,
    pub outcome: LogOutcome,
}

impl LogReport {
    pub fn operator_message(&self) -> String {
        match &self.outcome {
            LogOutcome::Saved { path, bytes } => {
                format!("Saved {bytes} bytes of logs to {}", path.display())
            }
            LogOutcome::Failed { error } => format!(
                "Failed to fetch logs for {}: {error}",
                display_name(&self.target)
            ),
        }
    }
}

/// Turns operator intents into control-plane calls.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    control: ControlPlane,
    download_dir: PathBuf,
}

impl ActionDispatcher {
    pub fn new(control: ControlPlane, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            control,
            download_dir: download_dir.into(),
        }
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn prepare(action: ActionKind, target: impl Into<String>) -> Dispatch {
        let target = target.into();
        if action.requires_confirmation() {
            Dispatch::NeedsConfirmation(ConfirmPrompt { action, target })
        } else {
            Dispatch::Ready(Command { action, target })
        }
    }

    /// One POST, no retries.
    pub async fn execute(&self, command: Command) -> CommandReport {
        let Command { action, target } = command;
        info!("command_dispatch: action={action} target={target}");
        let outcome = match self.control.send_command(action, &target).await {
            Ok(reply) => DispatchOutcome::Succeeded {
                message: reply.message,
                refresh_after: action.refresh_delay(),
            },
            Err(ControlError::Rejected(message)) => {
                warn!("command_rejected: action={action} target={target} message={message}");
                DispatchOutcome::Rejected { message }
            }
            Err(err) => {
                warn!("command_failed: action={action} target={target} error={err}");
                DispatchOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        CommandReport {
            action,
            target,
            outcome,
        }
    }

    pub async fn save_log(&self, target: &str) -> LogReport {
        let outcome = match self.download_log(target).await {
            Ok((path, bytes)) => {
                info!("log_saved: target={target} path={}", path.display());
                LogOutcome::Saved { path, bytes }
            }
            Err(err) => {
                warn!("log_fetch_failed: target={target} error={err}");
                LogOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        LogReport {
            target: target.to_string(),
            outcome,
        }
    }

    async fn download_log(&self, target: &str) -> Result<(PathBuf, usize), ControlError> {
        let body = self.control.fetch_log(target).await?;
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(log_file_name(target));
        tokio::fs::write(&path, &body).await?;
        Ok((path, body.len()))
    }
}

pub fn log_file_name(target: &str) -> String {
    format!("{}_log.txt", sanitize_component(target))
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
