use anyhow::{Context, Result};
use botfleet_sync::config::{
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY_MAX, DEFAULT_REQUEST_TIMEOUT,
};
use botfleet_sync::{parse_base_url, ReconnectPolicy, SyncConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOG_DIR: &str = ".botfleet/logs";

#[derive(Parser, Debug)]
#[command(name = "botfleet-monitor")]
#[command(about = "Live status view and controls for a supervised bot fleet", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connect: ConnectArgs,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Interactive fleet view (default)
    Watch,
    /// Fetch the fleet once over HTTP and print it
    Snapshot {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show or change the scheduled restart interval
    Cron {
        #[arg(long)]
        set: Option<u32>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    #[arg(long, global = true)]
    pub url: Option<String>,
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long, global = true)]
    pub reconnect_attempts: Option<u32>,
    #[arg(long, global = true)]
    pub reconnect_delay_ms: Option<u64>,
    #[arg(long, global = true)]
    pub reconnect_delay_max_ms: Option<u64>,
    #[arg(long, global = true)]
    pub connect_timeout_ms: Option<u64>,
    #[arg(long, global = true)]
    pub request_timeout_ms: Option<u64>,
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub username: Option<String>,
    #[arg(long, global = true)]
    pub password: Option<String>,
    #[arg(long, global = true, default_value_t = false)]
    pub no_suspend_on_blur: bool,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sync: SyncConfig,
    pub credentials: Option<Credentials>,
    pub suspend_on_blur: bool,
    pub log_dir: PathBuf,
    pub log_stdout: bool,
    pub log_level: String,
}

pub fn load_config(args: &ConnectArgs) -> Result<Config> {
    resolve_config(args, |key| std::env::var(key).ok())
}

/// Flag, then `BOTFLEET_*` env, then default.
pub fn resolve_config<F>(args: &ConnectArgs, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let raw_url = args
        .url
        .clone()
        .or_else(|| env("BOTFLEET_URL"))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = parse_base_url(&raw_url)?;

    let millis = |flag: Option<u64>, key: &str, default: Duration| -> Result<Duration> {
        match flag {
            Some(value) => Ok(Duration::from_millis(value)),
            None => match env(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("{key} must be a number of milliseconds")),
                None => Ok(default),
            },
        }
    };

    let max_attempts = match args.reconnect_attempts {
        Some(value) => value,
        None => match env("BOTFLEET_RECONNECT_ATTEMPTS") {
            Some(value) => value
                .trim()
                .parse()
                .context("BOTFLEET_RECONNECT_ATTEMPTS must be a whole number")?,
            None => DEFAULT_RECONNECT_ATTEMPTS,
        },
    };

    let mut sync = SyncConfig::new(base_url);
    sync.poll_interval = millis(
        args.poll_interval_ms,
        "BOTFLEET_POLL_INTERVAL_MS",
        DEFAULT_POLL_INTERVAL,
    )?;
    sync.reconnect = ReconnectPolicy {
        max_attempts,
        initial_delay: millis(
            args.reconnect_delay_ms,
            "BOTFLEET_RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY,
        )?,
        max_delay: millis(
            args.reconnect_delay_max_ms,
            "BOTFLEET_RECONNECT_DELAY_MAX_MS",
            DEFAULT_RECONNECT_DELAY_MAX,
        )?,
        connect_timeout: millis(
            args.connect_timeout_ms,
            "BOTFLEET_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT,
        )?,
    };
    sync.request_timeout = millis(
        args.request_timeout_ms,
        "BOTFLEET_REQUEST_TIMEOUT_MS",
        DEFAULT_REQUEST_TIMEOUT,
    )?;
    if let Some(dir) = args
        .download_dir
        .clone()
        .or_else(|| env("BOTFLEET_DOWNLOAD_DIR").map(PathBuf::from))
    {
        sync.download_dir = dir;
    }
    sync.validate()?;

    let username = args.username.clone().or_else(|| env("BOTFLEET_USERNAME"));
    let password = args.password.clone().or_else(|| env("BOTFLEET_PASSWORD"));
    let credentials = match (username, password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        (Some(_), None) => anyhow::bail!("--username given without --password"),
        _ => None,
    };

    let suspend_on_blur = !args.no_suspend_on_blur
        && env("BOTFLEET_SUSPEND_ON_BLUR")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(true);

    Ok(Config {
        sync,
        credentials,
        suspend_on_blur,
        log_dir: env("BOTFLEET_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        log_stdout: env("BOTFLEET_LOG_STDOUT")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(false),
        log_level: env("BOTFLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
