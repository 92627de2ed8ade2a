use crate::{FleetSnapshot, ProcessRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// A snapshot as it arrived, before the accept-or-retain decision.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingSnapshot {
    Records(Vec<ProcessRecord>),
    Empty,
    Missing,
    Malformed(String),
    BackendError(Option<String>),
}

impl IncomingSnapshot {
    /// Decodes a `status_update` payload (or `/supervisor/status` body).
    ///
    /// A single undecodable record rejects the whole list.
    pub fn from_status_update(payload: &Value) -> Self {
        let object = match payload {
            Value::Null => return IncomingSnapshot::Missing,
            Value::Object(object) => object,
            other => {
                return IncomingSnapshot::Malformed(format!(
                    "expected object payload, got {}",
                    json_kind(other)
                ))
            }
        };

        if object.get("status").and_then(Value::as_str) == Some("error") {
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            return IncomingSnapshot::BackendError(message);
        }

        let processes = match object.get("processes") {
            None | Some(Value::Null) => return IncomingSnapshot::Missing,
            Some(Value::Array(items)) => items,
            Some(other) => {
                return IncomingSnapshot::Malformed(format!(
                    "expected processes array, got {}",
                    json_kind(other)
                ))
            }
        };

        if processes.is_empty() {
            return IncomingSnapshot::Empty;
        }

        let mut records = Vec::with_capacity(processes.len());
        for (index, item) in processes.iter().enumerate() {
            match decode_record(item) {
                Ok(record) => records.push(record),
                Err(err) => {
                    return IncomingSnapshot::Malformed(format!("process {index}: {err}"))
                }
            }
        }
        IncomingSnapshot::Records(records)
    }

    fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            IncomingSnapshot::Records(_) => None,
            IncomingSnapshot::Empty => Some(RejectReason::Empty),
            IncomingSnapshot::Missing => Some(RejectReason::Missing),
            IncomingSnapshot::Malformed(_) => Some(RejectReason::Malformed),
            IncomingSnapshot::BackendError(_) => Some(RejectReason::BackendError),
        }
    }
}

fn decode_record(item: &Value) -> Result<ProcessRecord, String> {
    let record = ProcessRecord::deserialize(item).map_err(|err| err.to_string())?;
    if record.name.trim().is_empty() {
        return Err("empty process name".to_string());
    }
    Ok(record)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    Missing,
    Malformed,
    BackendError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::Missing => "missing",
            RejectReason::Malformed => "malformed",
            RejectReason::BackendError => "backend_error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub accepted: bool,
    pub snapshot: FleetSnapshot,
    pub rejected: Option<RejectReason>,
}

pub fn reconcile(incoming: IncomingSnapshot, last_accepted: &FleetSnapshot) -> ReconcileOutcome {
    reconcile_at(incoming, last_accepted, Utc::now())
}

/// Accept-whole or retain-whole. Only a well-formed, non-empty list replaces
/// the last accepted snapshot.
pub fn reconcile_at(
    incoming: IncomingSnapshot,
    last_accepted: &FleetSnapshot,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let rejected = incoming.reject_reason();
    match incoming {
        IncomingSnapshot::Records(records) => ReconcileOutcome {
            accepted: true,
            snapshot: FleetSnapshot::new(records, now),
            rejected: None,
        },
        _ => ReconcileOutcome {
            accepted: false,
            snapshot: last_accepted.clone(),
            rejected,
        },
    }
}

/// Holds the last accepted snapshot between frames.
#[derive(Debug, Default)]
pub struct ProcessListReconciler {
    current: FleetSnapshot,
    accepted: u64,
    rejected: u64,
}

impl ProcessListReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, incoming: IncomingSnapshot) -> ReconcileOutcome {
        self.apply_at(incoming, Utc::now())
    }

    pub fn apply_at(&mut self, incoming: IncomingSnapshot, now: DateTime<Utc>) -> ReconcileOutcome {
        let outcome = reconcile_at(incoming, &self.current, now);
        if outcome.accepted {
            self.accepted += 1;
            self.current = outcome.snapshot.clone();
        } else {
            self.rejected += 1;
        }
        outcome
    }

    pub fn current(&self) -> &FleetSnapshot {
        &self.current
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
