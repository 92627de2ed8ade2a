use crate::error::ConfigError;
use botfleet_core::socketio::ENGINE_IO_VERSION;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_millis(5000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

const SOCKET_PATH: &str = "socket.io/";

/// Retry budget for the push transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: DEFAULT_RECONNECT_DELAY_MAX,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the attempt following `failures` consecutive failures.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..failures {
            delay = self.next_backoff(delay);
        }
        delay.min(self.max_delay)
    }

    pub fn next_backoff(&self, current: Duration) -> Duration {
        let next = current + current;
        if next > self.max_delay {
            self.max_delay
        } else {
            next
        }
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: Url,
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub request_timeout: Duration,
    pub download_dir: PathBuf,
}

impl SyncConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            download_dir: PathBuf::from("."),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero {
                name: "poll interval",
            });
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Zero {
                name: "reconnect attempts",
            });
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(ConfigError::Zero {
                name: "reconnect delay",
            });
        }
        Ok(())
    }

    /// `<base>/socket.io/?EIO=4&transport=websocket` with the matching ws scheme.
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        let scheme = match self.base_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut url = base
            .join(SOCKET_PATH)
            .map_err(|err| ConfigError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: err.to_string(),
            })?;
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        url.set_query(Some(&format!(
            "EIO={ENGINE_IO_VERSION}&transport=websocket"
        )));
        url.set_fragment(None);
        Ok(url)
    }
}

/// Accepts `host:port` shorthand as plain http.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|err| ConfigError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(raw: &str) -> SyncConfig {
        SyncConfig::new(parse_base_url(raw).unwrap())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=6)
            .map(|failures| policy.delay_after(failures).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000, 5000]);
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn socket_url_switches_scheme_and_adds_query() {
        assert_eq!(
            config("http://127.0.0.1:5000").socket_url().unwrap().as_str(),
            "ws://127.0.0.1:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            config("https://ops.example.com/panel").socket_url().unwrap().as_str(),
            "wss://ops.example.com/panel/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn parse_base_url_accepts_bare_host() {
        let url = parse_base_url("localhost:5000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/");
        assert!(matches!(
            parse_base_url("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(parse_base_url("http://").is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = config("http://localhost:5000");
        assert!(cfg.validate().is_ok());
        cfg.poll_interval = Duration::ZERO;
        assert!(matches!(cfg.validate(), Err(ConfigError::Zero { .. })));
    }
}
