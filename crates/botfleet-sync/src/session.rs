use crate::config::SyncConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, RefreshRoute};
use crate::control::ControlPlane;
use crate::dispatch::{ActionDispatcher, Command, CommandReport, ConfirmPrompt, Dispatch, LogReport};
use crate::error::SessionError;
use crate::transport::{Connector, WebSocketConnector};
use botfleet_core::{
    build_fleet_view, ActionKind, FleetSnapshot, FleetView, IncomingSnapshot,
    ProcessListReconciler, RejectReason,
};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Snapshot {
        accepted: bool,
        rejected: Option<RejectReason>,
    },
    Connection(ConnectionState),
    ConnectFailed {
        attempt: u32,
        error: String,
    },
    ReconnectExhausted {
        attempts: u32,
    },
    Command(CommandReport),
    Log(LogReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Sent,
    AwaitingConfirmation(ConfirmPrompt),
}

enum TaskOutcome {
    Command(CommandReport),
    Log(LogReport),
}

/// One live client: connection, timers, reconciler and dispatcher.
///
/// Everything it spawns is owned here and cancelled by `teardown`, which
/// also runs on drop.
pub struct ClientSession {
    connection: ConnectionManager,
    reconciler: ProcessListReconciler,
    dispatcher: ActionDispatcher,
    tasks: JoinSet<TaskOutcome>,
    refreshes: JoinSet<ActionKind>,
}

impl ClientSession {
    pub fn new(config: &SyncConfig) -> Result<Self, SessionError> {
        let connector = WebSocketConnector::from_config(config)?;
        Self::with_connector(config, connector)
    }

    pub fn with_connector(
        config: &SyncConfig,
        connector: impl Connector + 'static,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let control = ControlPlane::new(config.base_url.clone(), config.request_timeout)?;
        Ok(Self {
            connection: ConnectionManager::new(connector, config.poll_interval),
            reconciler: ProcessListReconciler::new(),
            dispatcher: ActionDispatcher::new(control, config.download_dir.clone()),
            tasks: JoinSet::new(),
            refreshes: JoinSet::new(),
        })
    }

    pub fn start(&mut self) {
        self.connection.start();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_suspended(&self) -> bool {
        self.connection.is_suspended()
    }

    pub fn control(&self) -> &ControlPlane {
        self.dispatcher.control()
    }

    pub fn snapshot(&self) -> &FleetSnapshot {
        self.reconciler.current()
    }

    pub fn fleet_view(&self) -> FleetView {
        build_fleet_view(self.reconciler.current())
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len() + self.refreshes.len()
    }

    pub fn request_refresh(&mut self) -> RefreshRoute {
        self.connection.request_refresh()
    }

    pub fn suspend(&mut self) {
        self.connection.suspend();
    }

    pub fn resume(&mut self) -> Option<RefreshRoute> {
        self.connection.resume()
    }

    pub fn dispatch(&mut self, action: ActionKind, target: impl Into<String>) -> Submission {
        match ActionDispatcher::prepare(action, target) {
            Dispatch::Ready(command) => {
                self.submit(command);
                Submission::Sent
            }
            Dispatch::NeedsConfirmation(prompt) => Submission::AwaitingConfirmation(prompt),
        }
    }

    pub fn confirm(&mut self, prompt: ConfirmPrompt) {
        self.submit(prompt.confirm());
    }

    fn submit(&mut self, command: Command) {
        let dispatcher = self.dispatcher.clone();
        self.tasks
            .spawn(async move { TaskOutcome::Command(dispatcher.execute(command).await) });
    }

    pub fn save_log(&mut self, target: impl Into<String>) {
        let target = target.into();
        let dispatcher = self.dispatcher.clone();
        self.tasks
            .spawn(async move { TaskOutcome::Log(dispatcher.save_log(&target).await) });
    }

    /// Cancel-safe.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            tokio::select! {
                event = self.connection.next_event() => {
                    return self.apply_connection_event(event);
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(TaskOutcome::Command(report)) => {
                            if let Some(delay) = report.refresh_after() {
                                self.schedule_refresh(report.action, delay);
                            }
                            return SessionEvent::Command(report);
                        }
                        Ok(TaskOutcome::Log(report)) => return SessionEvent::Log(report),
                        Err(err) if err.is_cancelled() => {}
                        Err(err) => warn!("session_task_failed: {err}"),
                    }
                }
                Some(joined) = self.refreshes.join_next(), if !self.refreshes.is_empty() => {
                    if let Ok(action) = joined {
                        debug!("post_action_refresh: action={action}");
                        self.connection.request_refresh();
                    }
                }
            }
        }
    }

    fn schedule_refresh(&mut self, action: ActionKind, delay: Duration) {
        self.refreshes.spawn(async move {
            tokio::time::sleep(delay).await;
            action
        });
    }

    fn apply_connection_event(&mut self, event: ConnectionEvent) -> SessionEvent {
        match event {
            ConnectionEvent::StatusUpdate(payload) => {
                let incoming = IncomingSnapshot::from_status_update(&payload);
                if let IncomingSnapshot::Malformed(reason) = &incoming {
                    debug!("snapshot_malformed: {reason}");
                }
                let outcome = self.reconciler.apply(incoming);
                if let Some(reason) = outcome.rejected {
                    debug!("snapshot_rejected: reason={reason}");
                }
                SessionEvent::Snapshot {
                    accepted: outcome.accepted,
                    rejected: outcome.rejected,
                }
            }
            ConnectionEvent::StateChanged(state) => SessionEvent::Connection(state),
            ConnectionEvent::ConnectFailed { attempt, error } => {
                SessionEvent::ConnectFailed { attempt, error }
            }
            ConnectionEvent::ReconnectExhausted { attempts } => {
                SessionEvent::ReconnectExhausted { attempts }
            }
        }
    }

    pub fn teardown(&mut self) {
        self.tasks.abort_all();
        self.refreshes.abort_all();
        self.connection.teardown();
    }

    pub async fn shutdown(&mut self) {
        self.tasks.abort_all();
        self.refreshes.abort_all();
        self.connection.shutdown(SHUTDOWN_GRACE).await;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
