use crate::error::ControlError;
use botfleet_core::ActionKind;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const LOGIN_PATH: &str = "login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CronReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    hours: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CronUpdate {
    hours: u32,
}

/// HTTP side of the supervisor: commands, log download, status and cron.
///
/// The cookie store keeps the login session for every later call.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    client: Client,
    base_url: Url,
}

impl ControlPlane {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` as raw path segments; the url crate applies the
    /// percent-encoding the path grammar needs and nothing more.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ControlError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ControlError::Endpoint(format!("{} cannot be a base", self.base_url)))?;
            path.pop_if_empty().extend(segments);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub async fn send_command(
        &self,
        action: ActionKind,
        target: &str,
    ) -> Result<CommandReply, ControlError> {
        let url = self.endpoint(&["supervisor", action.as_str(), target])?;
        debug!("control_command: POST {url}");
        let response = self.client.post(url).send().await?;
        let reply: CommandReply = decode_json(response).await?;
        match reply.status {
            ReplyStatus::Success => Ok(reply),
            ReplyStatus::Error | ReplyStatus::Unknown => Err(ControlError::Rejected(
                reply
                    .message
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    pub async fn fetch_log(&self, target: &str) -> Result<Vec<u8>, ControlError> {
        let url = self.endpoint(&["supervisor", "log", target])?;
        debug!("control_log: GET {url}");
        let response = self.client.get(url).send().await?;
        ensure_authorized(&response)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Raw `/supervisor/status` body, meant for the reconciler.
    pub async fn fetch_status(&self) -> Result<Value, ControlError> {
        let url = self.endpoint(&["supervisor", "status"])?;
        let response = self.client.get(url).send().await?;
        decode_json(response).await
    }

    pub async fn cron_hours(&self) -> Result<u32, ControlError> {
        let url = self.endpoint(&["config", "cron"])?;
        let response = self.client.get(url).send().await?;
        cron_hours_from(decode_json(response).await?)
    }

    pub async fn set_cron_hours(&self, hours: u32) -> Result<u32, ControlError> {
        let url = self.endpoint(&["config", "cron"])?;
        let response = self
            .client
            .post(url)
            .json(&CronUpdate { hours })
            .send()
            .await?;
        let applied = cron_hours_from(decode_json(response).await?)?;
        info!("cron_interval_set: hours={applied}");
        Ok(applied)
    }

    /// Form login. The backend answers a bad password with the login page
    /// again and a good one with a redirect away from it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ControlError> {
        let url = self.endpoint(&[LOGIN_PATH])?;
        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status {
                status: status.as_u16(),
            });
        }
        if is_login_page(response.url()) {
            return Err(ControlError::LoginRejected(username.to_string()));
        }
        info!("login_ok: user={username}");
        Ok(())
    }
}

fn is_login_page(url: &Url) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|last| last == LOGIN_PATH)
}

/// Protected routes redirect anonymous callers to the login form.
fn ensure_authorized(response: &Response) -> Result<(), ControlError> {
    if response.status() == StatusCode::UNAUTHORIZED || is_login_page(response.url()) {
        return Err(ControlError::LoginRequired);
    }
    Ok(())
}

/// Error statuses still carry a JSON body that decides the outcome; only an
/// undecodable body falls back to the HTTP status.
async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ControlError> {
    ensure_authorized(&response)?;
    let status = response.status();
    let body = response.bytes().await?;
    match serde_json::from_slice::<T>(&body) {
        Ok(value) => Ok(value),
        Err(err) if status.is_success() => Err(ControlError::Decode(err.to_string())),
        Err(_) => Err(ControlError::Status {
            status: status.as_u16(),
        }),
    }
}

fn cron_hours_from(reply: CronReply) -> Result<u32, ControlError> {
    if reply.status.as_deref() == Some("error") {
        return Err(ControlError::Rejected(
            reply.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    reply
        .hours
        .ok_or_else(|| ControlError::Decode("missing hours".to_string()))
}
