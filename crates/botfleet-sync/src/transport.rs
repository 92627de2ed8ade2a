use crate::config::{ReconnectPolicy, SyncConfig};
use crate::error::{ConfigError, TransportError};
use botfleet_core::socketio::{
    decode_packet, encode_packet, EnginePacket, OpenHandshake, SocketPacket, DEFAULT_NAMESPACE,
    EVENT_CONNECTED, EVENT_REQUEST_STATUS, EVENT_STATUS_UPDATE,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { sid: String },
    Disconnected { reason: String },
    ConnectFailed { attempt: u32, error: String },
    ReconnectExhausted { attempts: u32 },
    StatusUpdate(Value),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    RequestStatus,
    /// Skip whatever is left of the current backoff wait.
    ConnectNow,
    Close,
}

/// Starts one transport task. The task owns retries and reports through
/// `events`; it ends after `Closed` or `ReconnectExhausted`.
pub trait Connector: Send + Sync {
    fn spawn(
        &self,
        events: mpsc::Sender<TransportEvent>,
        commands: mpsc::Receiver<TransportCommand>,
    ) -> JoinHandle<()>;
}

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    policy: ReconnectPolicy,
}

impl WebSocketConnector {
    pub fn new(url: Url, policy: ReconnectPolicy) -> Self {
        Self { url, policy }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.socket_url()?, config.reconnect))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn spawn(
        &self,
        events: mpsc::Sender<TransportEvent>,
        commands: mpsc::Receiver<TransportCommand>,
    ) -> JoinHandle<()> {
        tokio::spawn(transport_loop(
            self.url.clone(),
            self.policy,
            events,
            commands,
        ))
    }
}

enum SocketExit {
    Closed,
    Dropped(String),
}

enum WaitOutcome {
    Retry,
    Closed,
}

async fn transport_loop(
    url: Url,
    policy: ReconnectPolicy,
    events: mpsc::Sender<TransportEvent>,
    mut commands: mpsc::Receiver<TransportCommand>,
) {
    let mut failures = 0u32;

    loop {
        let connect = tokio::time::timeout(policy.connect_timeout, open_socket(&url));
        tokio::pin!(connect);
        let opened = loop {
            tokio::select! {
                result = &mut connect => {
                    break result.unwrap_or(Err(TransportError::Timeout(policy.connect_timeout)));
                }
                command = commands.recv() => match command {
                    Some(TransportCommand::Close) | None => {
                        let _ = events.send(TransportEvent::Closed).await;
                        return;
                    }
                    Some(other) => debug!("transport_command_ignored: {other:?} while connecting"),
                }
            }
        };

        let delay = match opened {
            Ok((socket, handshake)) => {
                failures = 0;
                info!(
                    "socket_connected: sid={} ping_interval={}ms ping_timeout={}ms",
                    handshake.sid, handshake.ping_interval, handshake.ping_timeout
                );
                let connected = TransportEvent::Connected {
                    sid: handshake.sid.clone(),
                };
                if events.send(connected).await.is_err() {
                    return;
                }
                match run_socket(socket, &handshake, &events, &mut commands).await {
                    SocketExit::Closed => {
                        let _ = events.send(TransportEvent::Closed).await;
                        return;
                    }
                    SocketExit::Dropped(reason) => {
                        warn!("socket_dropped: {reason}");
                        if events
                            .send(TransportEvent::Disconnected { reason })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                policy.initial_delay
            }
            Err(err) => {
                failures += 1;
                warn!("socket_connect_error: attempt={failures} {err}");
                let failed = TransportEvent::ConnectFailed {
                    attempt: failures,
                    error: err.to_string(),
                };
                if events.send(failed).await.is_err() {
                    return;
                }
                if policy.is_exhausted(failures) {
                    warn!("socket_reconnect_exhausted: attempts={failures}");
                    let _ = events
                        .send(TransportEvent::ReconnectExhausted { attempts: failures })
                        .await;
                    return;
                }
                policy.delay_after(failures)
            }
        };

        match wait_backoff(delay, &mut commands).await {
            WaitOutcome::Retry => {}
            WaitOutcome::Closed => {
                let _ = events.send(TransportEvent::Closed).await;
                return;
            }
        }
    }
}

async fn wait_backoff(
    delay: Duration,
    commands: &mut mpsc::Receiver<TransportCommand>,
) -> WaitOutcome {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return WaitOutcome::Retry,
            command = commands.recv() => match command {
                Some(TransportCommand::ConnectNow) => {
                    debug!("socket_backoff_skipped");
                    return WaitOutcome::Retry;
                }
                Some(TransportCommand::RequestStatus) => {}
                Some(TransportCommand::Close) | None => return WaitOutcome::Closed,
            }
        }
    }
}

async fn open_socket(url: &Url) -> Result<(Socket, OpenHandshake), TransportError> {
    let (mut socket, _response) = connect_async(url.as_str()).await?;

    let handshake = match read_packet(&mut socket).await? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected open packet, got {}",
                other.kind()
            )))
        }
    };

    send_packet(&mut socket, &EnginePacket::Message(SocketPacket::connect())).await?;
    loop {
        match read_packet(&mut socket).await? {
            EnginePacket::Message(SocketPacket::Connect { namespace, .. })
                if namespace == DEFAULT_NAMESPACE =>
            {
                break
            }
            EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                let reason = data
                    .as_ref()
                    .and_then(|value| value.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| "no reason given".to_string());
                return Err(TransportError::Rejected(reason));
            }
            EnginePacket::Ping(payload) => {
                send_packet(&mut socket, &EnginePacket::Pong(payload)).await?;
            }
            EnginePacket::Close => return Err(TransportError::Closed),
            _ => {}
        }
    }
    Ok((socket, handshake))
}

async fn read_packet(socket: &mut Socket) -> Result<EnginePacket, TransportError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(decode_packet(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

async fn send_packet(socket: &mut Socket, packet: &EnginePacket) -> Result<(), TransportError> {
    socket.send(Message::Text(encode_packet(packet))).await?;
    Ok(())
}

async fn run_socket(
    mut socket: Socket,
    handshake: &OpenHandshake,
    events: &mpsc::Sender<TransportEvent>,
    commands: &mut mpsc::Receiver<TransportCommand>,
) -> SocketExit {
    let window = handshake.liveness_window();
    let silence = tokio::time::sleep(window);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            frame = socket.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) => {
                        return SocketExit::Dropped("server closed websocket".to_string())
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return SocketExit::Dropped(format!("websocket error: {err}")),
                    None => return SocketExit::Dropped("stream ended".to_string()),
                };
                silence.as_mut().reset(Instant::now() + window);

                let packet = match decode_packet(&text) {
                    Ok(packet) => packet,
                    Err(err) => {
                        warn!("socket_decode_error: {err}");
                        continue;
                    }
                };
                match packet {
                    EnginePacket::Ping(payload) => {
                        if let Err(err) = send_packet(&mut socket, &EnginePacket::Pong(payload)).await {
                            return SocketExit::Dropped(err.to_string());
                        }
                    }
                    EnginePacket::Close => {
                        return SocketExit::Dropped("server closed session".to_string())
                    }
                    EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                        return SocketExit::Dropped("server disconnected namespace".to_string())
                    }
                    EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                        if name == EVENT_STATUS_UPDATE {
                            let payload = args.into_iter().next().unwrap_or(Value::Null);
                            if events.send(TransportEvent::StatusUpdate(payload)).await.is_err() {
                                let _ = socket.close(None).await;
                                return SocketExit::Closed;
                            }
                        } else if name == EVENT_CONNECTED {
                            debug!("socket_server_hello");
                        } else {
                            debug!("socket_event_ignored: {name}");
                        }
                    }
                    _ => {}
                }
            }
            command = commands.recv() => match command {
                Some(TransportCommand::RequestStatus) => {
                    let request = EnginePacket::Message(SocketPacket::event(EVENT_REQUEST_STATUS, Vec::new()));
                    if let Err(err) = send_packet(&mut socket, &request).await {
                        return SocketExit::Dropped(err.to_string());
                    }
                }
                Some(TransportCommand::ConnectNow) => {}
                Some(TransportCommand::Close) | None => {
                    let goodbye = EnginePacket::Message(SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    });
                    let _ = send_packet(&mut socket, &goodbye).await;
                    let _ = socket.close(None).await;
                    return SocketExit::Closed;
                }
            },
            _ = &mut silence => {
                return SocketExit::Dropped(TransportError::Silent(window).to_string());
            }
        }
    }
}
