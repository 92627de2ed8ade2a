#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use botfleet_sync::{ClientSession, SessionEvent, SyncConfig};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use url::Url;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct FakeOptions {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// Never ping, so the client's liveness window runs out.
    pub silent: bool,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            silent: false,
        }
    }
}

struct FakeState {
    options: FakeOptions,
    snapshots: Mutex<VecDeque<Value>>,
    status_requests: AtomicUsize,
    connections: AtomicUsize,
    active: AtomicUsize,
    commands: Mutex<Vec<(String, String)>>,
    command_reply: Mutex<(StatusCode, Value)>,
    logs: Mutex<HashMap<String, String>>,
    cron_hours: Mutex<u32>,
    kick: broadcast::Sender<()>,
}

impl FakeState {
    /// The last queued snapshot keeps being served once the queue runs down.
    fn next_snapshot(&self) -> Value {
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            snapshots.pop_front().unwrap()
        } else {
            snapshots
                .front()
                .cloned()
                .unwrap_or_else(|| json!({"status": "success", "processes": []}))
        }
    }
}

/// Supervisor backend stand-in: Socket.IO push channel plus the HTTP routes.
pub struct FakeSupervisor {
    pub base_url: Url,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeSupervisor {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(options: FakeOptions) -> Self {
        let (kick, _) = broadcast::channel(8);
        let state = Arc::new(FakeState {
            options,
            snapshots: Mutex::new(VecDeque::new()),
            status_requests: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            command_reply: Mutex::new((
                StatusCode::OK,
                json!({"status": "success", "message": "ok"}),
            )),
            logs: Mutex::new(HashMap::new()),
            cron_hours: Mutex::new(0),
            kick,
        });

        let app = Router::new()
            .route("/", get(|| async { "fleet" }))
            .route("/socket.io/", get(socket_handler))
            .route("/supervisor/status", get(status_handler))
            .route(
                "/supervisor/:action/:name",
                get(log_handler).post(command_handler),
            )
            .route("/config/cron", get(cron_get).post(cron_set))
            .route("/login", get(login_page).post(login_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake supervisor");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("base url"),
            state,
            server,
        }
    }

    /// Fast retries and a poll interval long enough to stay out of the way.
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.base_url.clone());
        config.poll_interval = Duration::from_secs(60);
        config.reconnect.initial_delay = Duration::from_millis(50);
        config.reconnect.max_delay = Duration::from_millis(200);
        config.reconnect.connect_timeout = Duration::from_secs(2);
        config.request_timeout = Duration::from_secs(5);
        config
    }

    pub fn queue_snapshot(&self, payload: Value) {
        self.state.snapshots.lock().unwrap().push_back(payload);
    }

    pub fn set_command_reply(&self, status: StatusCode, body: Value) {
        *self.state.command_reply.lock().unwrap() = (status, body);
    }

    pub fn set_log(&self, name: &str, body: &str) {
        self.state
            .logs
            .lock()
            .unwrap()
            .insert(name.to_string(), body.to_string());
    }

    pub fn status_requests(&self) -> usize {
        self.state.status_requests.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.commands.lock().unwrap().clone()
    }

    pub fn cron_hours(&self) -> u32 {
        *self.state.cron_hours.lock().unwrap()
    }

    /// Closes every live websocket from the server side.
    pub fn drop_connections(&self) {
        let _ = self.state.kick.send(());
    }
}

impl Drop for FakeSupervisor {
    fn drop(&mut self) {
        self.drop_connections();
        self.server.abort();
    }
}

async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FakeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<FakeState>) {
    let n = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    state.active.fetch_add(1, Ordering::SeqCst);
    run_socket(&mut socket, &state, n).await;
    state.active.fetch_sub(1, Ordering::SeqCst);
}

async fn run_socket(socket: &mut WebSocket, state: &FakeState, n: usize) {
    let mut kick = state.kick.subscribe();
    let options = state.options;
    let open = json!({
        "sid": format!("fake-{n}"),
        "upgrades": [],
        "pingInterval": options.ping_interval_ms,
        "pingTimeout": options.ping_timeout_ms,
    });
    if socket
        .send(Message::Text(format!("0{open}")))
        .await
        .is_err()
    {
        return;
    }
    let period = Duration::from_millis(options.ping_interval_ms);
    let mut ping = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else {
                    return;
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => return,
                    _ => continue,
                };
                if text == "40" {
                    let ack = format!("40{}", json!({"sid": format!("ns-{n}")}));
                    let hello = format!("42{}", json!(["connected", {"data": "Connected"}]));
                    if socket.send(Message::Text(ack)).await.is_err()
                        || socket.send(Message::Text(hello)).await.is_err()
                    {
                        return;
                    }
                } else if text == r#"42["request_status"]"# {
                    state.status_requests.fetch_add(1, Ordering::SeqCst);
                    let frame = format!("42{}", json!(["status_update", state.next_snapshot()]));
                    if socket.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                } else if text == "41" {
                    return;
                }
            }
            _ = kick.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            _ = ping.tick(), if !options.silent => {
                if socket.send(Message::Text("2".to_string())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn status_handler(State(state): State<Arc<FakeState>>) -> Json<Value> {
    Json(state.next_snapshot())
}

async fn command_handler(
    State(state): State<Arc<FakeState>>,
    Path((action, name)): Path<(String, String)>,
) -> Response {
    state.commands.lock().unwrap().push((action, name));
    let (status, body) = state.command_reply.lock().unwrap().clone();
    (status, Json(body)).into_response()
}

async fn log_handler(
    State(state): State<Arc<FakeState>>,
    Path((action, name)): Path<(String, String)>,
) -> Response {
    if action != "log" {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match state.logs.lock().unwrap().get(&name) {
        Some(body) => body.clone().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "Log file not found"})),
        )
            .into_response(),
    }
}

async fn cron_get(State(state): State<Arc<FakeState>>) -> Json<Value> {
    let hours = *state.cron_hours.lock().unwrap();
    Json(json!({"status": "success", "hours": hours}))
}

async fn cron_set(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Json<Value> {
    let hours = body.get("hours").and_then(Value::as_u64).unwrap_or(0) as u32;
    *state.cron_hours.lock().unwrap() = hours;
    Json(json!({"status": "success", "hours": hours}))
}

async fn login_page() -> Html<&'static str> {
    Html("<form method=\"post\"></form>")
}

async fn login_handler(Form(form): Form<HashMap<String, String>>) -> Response {
    let user = form.get("username").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    if user == Some("admin") && password == Some("hunter2") {
        Redirect::to("/").into_response()
    } else {
        Html("<p>Invalid credentials. Please try again.</p>").into_response()
    }
}

pub fn fleet(records: Value) -> Value {
    json!({"status": "success", "timestamp": "2024-05-01T10:00:00", "processes": records})
}

pub fn bot(name: &str, status: &str) -> Value {
    let running = status == "RUNNING";
    json!({
        "name": name,
        "status": status,
        "pid": if running { Value::String("4242".to_string()) } else { Value::Null },
        "uptime": if running { Value::String("0:05:00".to_string()) } else { Value::Null },
        "paused": false,
        "auto_paused": false,
    })
}

/// A local address nothing listens on.
pub async fn dead_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    Url::parse(&format!("http://{addr}")).expect("dead url")
}

pub async fn wait_for_event<F>(session: &mut ClientSession, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = session.next_event().await;
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Drives the session for `span`, returning everything it reported.
pub async fn drive_for(session: &mut ClientSession, span: Duration) -> Vec<SessionEvent> {
    let deadline = Instant::now() + span;
    let mut seen = Vec::new();
    while let Ok(event) = tokio::time::timeout_at(deadline, session.next_event()).await {
        seen.push(event);
    }
    seen
}

pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn read_file(path: &FsPath) -> String {
    std::fs::read_to_string(path).expect("read file")
}
