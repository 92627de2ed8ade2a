pub mod config;
pub mod connection;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{parse_base_url, ReconnectPolicy, SyncConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, RefreshRoute};
pub use control::{CommandReply, ControlPlane, ReplyStatus};
pub use dispatch::{
    log_file_name, ActionDispatcher, Command, CommandReport, ConfirmPrompt, Dispatch,
    DispatchOutcome, LogOutcome, LogReport,
};
pub use error::{ConfigError, ControlError, SessionError, TransportError};
pub use session::{ClientSession, SessionEvent, Submission};
pub use transport::{Connector, TransportCommand, TransportEvent, WebSocketConnector};
