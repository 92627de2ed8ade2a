use crate::transport::{Connector, TransportCommand, TransportEvent};
use serde_json::Value;
use std::fmt;
use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

const TRANSPORT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectExhausted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectExhausted => "reconnect_exhausted",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Live",
            ConnectionState::ReconnectExhausted => "Connection lost",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    ConnectFailed { attempt: u32, error: String },
    ReconnectExhausted { attempts: u32 },
    StatusUpdate(Value),
}

/// How a refresh request was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRoute {
    Requested,
    Hurried,
    Reopened,
    Dropped,
}

struct TransportLink {
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Sender<TransportCommand>,
    task: JoinHandle<()>,
}

/// At most one interval exists; arming replaces the previous one.
struct PollTimer {
    period: Duration,
    ticker: Option<Interval>,
}

impl PollTimer {
    fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    fn arm(&mut self) {
        self.ticker = None;
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn disarm(&mut self) {
        self.ticker = None;
    }

    fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => pending::<()>().await,
        }
    }
}

/// Owns the push transport and the poll timer that backs it up.
///
/// Retries live in the transport task; the manager only reacts to what the
/// task reports and never schedules its own reconnects.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    state: ConnectionState,
    link: Option<TransportLink>,
    poll: PollTimer,
    suspended: bool,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static, poll_interval: Duration) -> Self {
        Self {
            connector: Box::new(connector),
            state: ConnectionState::Disconnected,
            link: None,
            poll: PollTimer::new(poll_interval),
            suspended: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_armed()
    }

    pub fn start(&mut self) {
        if self.link.is_some() {
            return;
        }
        self.open();
    }

    fn open(&mut self) {
        self.close_link();
        let (event_tx, event_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let task = self.connector.spawn(event_tx, command_rx);
        self.link = Some(TransportLink {
            events: event_rx,
            commands: command_tx,
            task,
        });
        self.state = ConnectionState::Connecting;
        info!("socket_opening");
    }

    fn close_link(&mut self) {
        self.poll.disarm();
        if let Some(link) = self.link.take() {
            let _ = link.commands.try_send(TransportCommand::Close);
            link.task.abort();
        }
    }

    fn send(&self, command: TransportCommand) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };
        match link.commands.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                debug!("transport_command_dropped: {err}");
                false
            }
        }
    }

    pub fn request_refresh(&mut self) -> RefreshRoute {
        match self.state {
            ConnectionState::Connected => {
                if self.send(TransportCommand::RequestStatus) {
                    RefreshRoute::Requested
                } else {
                    RefreshRoute::Dropped
                }
            }
            ConnectionState::Connecting => {
                if self.send(TransportCommand::ConnectNow) {
                    RefreshRoute::Hurried
                } else {
                    RefreshRoute::Dropped
                }
            }
            ConnectionState::Disconnected | ConnectionState::ReconnectExhausted => {
                self.open();
                RefreshRoute::Reopened
            }
        }
    }

    pub fn suspend(&mut self) {
        if !self.suspended {
            debug!("sync_suspended");
        }
        self.suspended = true;
        self.poll.disarm();
    }

    /// No-op unless suspended. Otherwise one immediate refresh, and the poll
    /// timer comes back if the socket is up.
    pub fn resume(&mut self) -> Option<RefreshRoute> {
        if !self.suspended {
            return None;
        }
        self.suspended = false;
        debug!("sync_resumed");
        let route = self.request_refresh();
        if self.state == ConnectionState::Connected {
            self.poll.arm();
        }
        Some(route)
    }

    pub fn teardown(&mut self) {
        self.close_link();
        if self.state != ConnectionState::Disconnected {
            info!("socket_teardown: state={}", self.state);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Like `teardown`, but lets the transport say goodbye to the server first.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.poll.disarm();
        if let Some(mut link) = self.link.take() {
            let _ = link.commands.try_send(TransportCommand::Close);
            if tokio::time::timeout(grace, &mut link.task).await.is_err() {
                link.task.abort();
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Next event worth reporting. Poll ticks are handled internally.
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            tokio::select! {
                received = recv_transport(self.link.as_mut()) => {
                    let event = match received {
                        Some(event) => event,
                        None => {
                            if let Some(event) = self.handle_transport_gone() {
                                return event;
                            }
                            continue;
                        }
                    };
                    if let Some(event) = self.handle_transport_event(event) {
                        return event;
                    }
                }
                _ = self.poll.tick() => {
                    if self.state == ConnectionState::Connected {
                        debug!("poll_refresh");
                        self.send(TransportCommand::RequestStatus);
                    }
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) -> Option<ConnectionEvent> {
        match event {
            TransportEvent::Connected { .. } => {
                self.state = ConnectionState::Connected;
                self.send(TransportCommand::RequestStatus);
                if !self.suspended {
                    self.poll.arm();
                }
                Some(ConnectionEvent::StateChanged(ConnectionState::Connected))
            }
            TransportEvent::Disconnected { .. } => {
                self.poll.disarm();
                self.state = ConnectionState::Connecting;
                Some(ConnectionEvent::StateChanged(ConnectionState::Connecting))
            }
            TransportEvent::ConnectFailed { attempt, error } => {
                self.poll.disarm();
                self.state = ConnectionState::Connecting;
                Some(ConnectionEvent::ConnectFailed { attempt, error })
            }
            TransportEvent::ReconnectExhausted { attempts } => {
                self.poll.disarm();
                self.link = None;
                self.state = ConnectionState::ReconnectExhausted;
                Some(ConnectionEvent::ReconnectExhausted { attempts })
            }
            TransportEvent::StatusUpdate(payload) => Some(ConnectionEvent::StatusUpdate(payload)),
            TransportEvent::Closed => {
                self.poll.disarm();
                self.link = None;
                self.state = ConnectionState::Disconnected;
                Some(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
            }
        }
    }

    /// The task hung up without saying why.
    fn handle_transport_gone(&mut self) -> Option<ConnectionEvent> {
        self.poll.disarm();
        self.link = None;
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        Some(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_link();
    }
}

async fn recv_transport(link: Option<&mut TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.events.recv().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ScriptedLink {
        events: mpsc::Sender<TransportEvent>,
        commands: mpsc::Receiver<TransportCommand>,
    }

    impl ScriptedLink {
        fn drain(&mut self) -> Vec<TransportCommand> {
            let mut commands = Vec::new();
            while let Ok(command) = self.commands.try_recv() {
                commands.push(command);
            }
            commands
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedConnector {
        links: Arc<Mutex<Vec<ScriptedLink>>>,
    }

    impl ScriptedConnector {
        fn take_link(&self) -> ScriptedLink {
            self.links.lock().unwrap().remove(0)
        }

        fn spawned(&self) -> usize {
            self.links.lock().unwrap().len()
        }
    }

    impl Connector for ScriptedConnector {
        fn spawn(
            &self,
            events: mpsc::Sender<TransportEvent>,
            commands: mpsc::Receiver<TransportCommand>,
        ) -> JoinHandle<()> {
            self.links
                .lock()
                .unwrap()
                .push(ScriptedLink { events, commands });
            tokio::spawn(pending::<()>())
        }
    }

    const POLL: Duration = Duration::from_millis(3000);

    async fn connected_manager() -> (ConnectionManager, ScriptedConnector, ScriptedLink) {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        let mut link = connector.take_link();
        link.events
            .send(TransportEvent::Connected {
                sid: "s1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            manager.next_event().await,
            ConnectionEvent::StateChanged(ConnectionState::Connected)
        );
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);
        (manager, connector, link)
    }

    /// Drives the manager for `span` of virtual time and returns what it reported.
    async fn run_for(manager: &mut ConnectionManager, span: Duration) -> Vec<ConnectionEvent> {
        let mut seen = Vec::new();
        let deadline = Instant::now() + span;
        while let Ok(event) = tokio::time::timeout_at(deadline, manager.next_event()).await {
            seen.push(event);
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn start_moves_to_connecting_and_spawns_once() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.start();
        manager.start();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(connector.spawned(), 1);
        assert!(!manager.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_refreshes_immediately_then_polls_on_interval() {
        let (mut manager, _connector, mut link) = connected_manager().await;
        assert!(manager.is_polling());

        run_for(&mut manager, Duration::from_millis(2900)).await;
        assert!(link.drain().is_empty());

        run_for(&mut manager, Duration::from_millis(200)).await;
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);

        run_for(&mut manager, Duration::from_millis(6000)).await;
        assert_eq!(link.drain().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling_until_reconnected() {
        let (mut manager, _connector, mut link) = connected_manager().await;
        link.events
            .send(TransportEvent::Disconnected {
                reason: "stream ended".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            manager.next_event().await,
            ConnectionEvent::StateChanged(ConnectionState::Connecting)
        );
        assert!(!manager.is_polling());

        run_for(&mut manager, Duration::from_millis(10_000)).await;
        assert!(link.drain().is_empty());

        link.events
            .send(TransportEvent::Connected {
                sid: "s2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            manager.next_event().await,
            ConnectionEvent::StateChanged(ConnectionState::Connected)
        );
        assert!(manager.is_polling());
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_updates_pass_through() {
        let (mut manager, _connector, link) = connected_manager().await;
        let payload = serde_json::json!({"processes": []});
        link.events
            .send(TransportEvent::StatusUpdate(payload.clone()))
            .await
            .unwrap();
        assert_eq!(
            manager.next_event().await,
            ConnectionEvent::StatusUpdate(payload)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_silences_polling_and_resume_refreshes_once() {
        let (mut manager, _connector, mut link) = connected_manager().await;
        manager.suspend();
        assert!(!manager.is_polling());

        run_for(&mut manager, Duration::from_millis(12_000)).await;
        assert!(link.drain().is_empty());

        assert_eq!(manager.resume(), Some(RefreshRoute::Requested));
        assert_eq!(manager.resume(), None);
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);
        assert!(manager.is_polling());

        run_for(&mut manager, Duration::from_millis(3100)).await;
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_while_suspended_does_not_start_polling() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        manager.suspend();
        let mut link = connector.take_link();
        link.events
            .send(TransportEvent::Connected {
                sid: "s1".to_string(),
            })
            .await
            .unwrap();
        manager.next_event().await;
        assert_eq!(link.drain(), vec![TransportCommand::RequestStatus]);
        assert!(!manager.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_while_connecting_skips_backoff() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        let mut link = connector.take_link();
        assert_eq!(manager.request_refresh(), RefreshRoute::Hurried);
        assert_eq!(link.drain(), vec![TransportCommand::ConnectNow]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_terminal_until_manual_refresh() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        let link = connector.take_link();
        for attempt in 1..=5 {
            link.events
                .send(TransportEvent::ConnectFailed {
                    attempt,
                    error: "connection refused".to_string(),
                })
                .await
                .unwrap();
        }
        link.events
            .send(TransportEvent::ReconnectExhausted { attempts: 5 })
            .await
            .unwrap();
        drop(link);

        let events = run_for(&mut manager, Duration::from_millis(100)).await;
        assert_eq!(events.len(), 6);
        assert_eq!(
            events.last(),
            Some(&ConnectionEvent::ReconnectExhausted { attempts: 5 })
        );
        assert_eq!(manager.state(), ConnectionState::ReconnectExhausted);
        assert_eq!(connector.spawned(), 0);

        assert_eq!(manager.request_refresh(), RefreshRoute::Reopened);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(connector.spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_after_exhaustion_reopens() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        let link = connector.take_link();
        link.events
            .send(TransportEvent::ReconnectExhausted { attempts: 5 })
            .await
            .unwrap();
        manager.next_event().await;
        manager.suspend();
        assert_eq!(manager.resume(), Some(RefreshRoute::Reopened));
        assert_eq!(connector.spawned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_transport_reads_as_disconnected() {
        let connector = ScriptedConnector::default();
        let mut manager = ConnectionManager::new(connector.clone(), POLL);
        manager.start();
        drop(connector.take_link());
        assert_eq!(
            manager.next_event().await,
            ConnectionEvent::StateChanged(ConnectionState::Disconnected)
        );
        assert_eq!(manager.request_refresh(), RefreshRoute::Reopened);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_transport_and_timer() {
        let (mut manager, _connector, mut link) = connected_manager().await;
        manager.teardown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_polling());
        assert_eq!(link.drain(), vec![TransportCommand::Close]);
        assert!(link.commands.recv().await.is_none());

        assert!(run_for(&mut manager, Duration::from_millis(10_000))
            .await
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_manager_closes_the_link() {
        let (manager, _connector, mut link) = connected_manager().await;
        drop(manager);
        assert_eq!(link.drain(), vec![TransportCommand::Close]);
        assert!(link.events.is_closed());
    }
}
