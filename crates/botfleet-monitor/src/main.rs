mod config;
mod state;
mod theme;
mod ui;

use anyhow::{Context, Result};
use botfleet_core::{build_fleet_view, IncomingSnapshot, ProcessListReconciler};
use botfleet_sync::{ClientSession, ControlPlane, RefreshRoute, SessionEvent, Submission};
use clap::Parser;
use config::{Cli, Commands, Config};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use state::{App, Intent};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.connect)?;
    let _log_guard = init_logging(&config);
    info!(
        "botfleet_monitor_start: url={} poll_ms={}",
        config.sync.base_url,
        config.sync.poll_interval.as_millis()
    );

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => run_watch(&config).await,
        Commands::Snapshot { json } => run_snapshot(&config, json).await,
        Commands::Cron { set } => run_cron(&config, set).await,
    }
}

async fn login_if_configured(control: &ControlPlane, config: &Config) -> Result<()> {
    if let Some(credentials) = &config.credentials {
        control
            .login(&credentials.username, &credentials.password)
            .await
            .context("login failed")?;
    }
    Ok(())
}

async fn run_watch(config: &Config) -> Result<()> {
    let mut session = ClientSession::new(&config.sync)?;
    login_if_configured(session.control(), config).await?;
    session.start();

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut session, config).await;
    session.shutdown().await;
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Tui,
    session: &mut ClientSession,
    config: &Config,
) -> Result<()> {
    let mut app = App::new();
    app.connection = session.state();
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::render_ui(frame, &app))?;
        tokio::select! {
            event = session.next_event() => {
                if matches!(event, SessionEvent::Snapshot { accepted: true, .. }) {
                    app.set_view(session.fleet_view());
                }
                app.apply_session_event(&event);
            }
            maybe_event = events.next() => {
                let Some(event) = maybe_event else {
                    return Ok(());
                };
                let event = event.context("terminal input")?;
                if handle_terminal_event(event, &mut app, session, config) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns true when the operator asked to quit.
fn handle_terminal_event(
    event: Event,
    app: &mut App,
    session: &mut ClientSession,
    config: &Config,
) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            apply_intent(app.handle_key(key), app, session)
        }
        Event::FocusLost if config.suspend_on_blur => {
            session.suspend();
            app.set_suspended(true);
            false
        }
        Event::FocusGained if config.suspend_on_blur => {
            session.resume();
            app.set_suspended(false);
            false
        }
        _ => false,
    }
}

fn apply_intent(intent: Intent, app: &mut App, session: &mut ClientSession) -> bool {
    match intent {
        Intent::None => false,
        Intent::Quit => true,
        Intent::Dispatch(action, target) => {
            match session.dispatch(action, target) {
                Submission::Sent => {}
                Submission::AwaitingConfirmation(prompt) => app.open_confirm(prompt),
            }
            false
        }
        Intent::Confirm(prompt) => {
            session.confirm(prompt);
            false
        }
        Intent::SaveLog(target) => {
            session.save_log(target);
            false
        }
        Intent::Refresh => {
            let note = match session.request_refresh() {
                RefreshRoute::Requested => "Refresh requested",
                RefreshRoute::Hurried => "Reconnecting now",
                RefreshRoute::Reopened => "Reopening connection",
                RefreshRoute::Dropped => "Refresh dropped",
            };
            app.status_note = Some(note.to_string());
            false
        }
    }
}

async fn run_snapshot(config: &Config, json: bool) -> Result<()> {
    let control = ControlPlane::new(config.sync.base_url.clone(), config.sync.request_timeout)?;
    login_if_configured(&control, config).await?;
    let payload = control.fetch_status().await?;

    let mut reconciler = ProcessListReconciler::new();
    let outcome = reconciler.apply(IncomingSnapshot::from_status_update(&payload));
    if let Some(reason) = outcome.rejected {
        warn!("snapshot_rejected: reason={reason}");
        anyhow::bail!("supervisor returned no usable process list ({reason})");
    }
    let view = build_fleet_view(reconciler.current());

    let mut stdout = io::stdout();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &view)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", ui::fleet_table(&view))?;
    }
    Ok(())
}

async fn run_cron(config: &Config, set: Option<u32>) -> Result<()> {
    let control = ControlPlane::new(config.sync.base_url.clone(), config.sync.request_timeout)?;
    login_if_configured(&control, config).await?;
    let hours = match set {
        Some(hours) => control.set_cron_hours(hours).await?,
        None => control.cron_hours().await?,
    };
    if hours == 0 {
        println!("scheduled restart: disabled");
    } else {
        println!("scheduled restart: every {hours}h");
    }
    Ok(())
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let stdout_enabled = config.log_stdout;
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone(), stdout_enabled));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

struct MultiWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>, stdout_enabled: bool) -> Self {
        Self {
            stdout: stdout_enabled.then(io::stdout),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<LogGuard> {
    if log_dir.as_os_str().is_empty() {
        return Ok(LogGuard { file: None });
    }
    if std::fs::create_dir_all(log_dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let path = log_dir.join(format!("botfleet-monitor-{}.log", std::process::id()));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}
