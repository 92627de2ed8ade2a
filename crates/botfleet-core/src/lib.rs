use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub mod action;
pub mod classify;
pub mod reconcile;
pub mod render;
pub mod socketio;

pub use action::ActionKind;
pub use classify::{classify, display_name, extract_ordinal, sort_for_display, DisplayStatus};
pub use reconcile::{
    reconcile, reconcile_at, IncomingSnapshot, ProcessListReconciler, ReconcileOutcome,
    RejectReason,
};
pub use render::{build_fleet_view, BotCard, Control, ControlButton, FleetCounts, FleetView};

/// Supervisor state string for a live process.
pub const STATUS_RUNNING: &str = "RUNNING";

/// One supervised bot as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRecord {
    pub name: String,
    pub status: String,
    #[serde(
        default,
        deserialize_with = "deserialize_pid",
        skip_serializing_if = "Option::is_none"
    )]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub paused: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub auto_paused: bool,
}

impl ProcessRecord {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            pid: None,
            uptime: None,
            paused: false,
            auto_paused: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

/// The list currently shown to the operator, plus when it was accepted.
///
/// Records sit behind an `Arc` so a retained snapshot is shared rather than
/// copied when a frame is rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSnapshot {
    records: Arc<Vec<ProcessRecord>>,
    accepted_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    pub fn new(records: Vec<ProcessRecord>, accepted_at: DateTime<Utc>) -> Self {
        Self {
            records: Arc::new(records),
            accepted_at: Some(accepted_at),
        }
    }

    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `None` until the first non-empty list has been accepted.
    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn find(&self, name: &str) -> Option<&ProcessRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    pub fn shares_records_with(&self, other: &FleetSnapshot) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

/// The backend sends pids as strings, numbers, or null depending on the
/// supervisor version.
fn deserialize_pid<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .and_then(|u| u32::try_from(u).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("invalid pid")),
        _ => Err(serde::de::Error::custom("expected string, number or null for pid")),
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Option::<bool>::deserialize(deserializer)?;
    Ok(val.unwrap_or(false))
}
