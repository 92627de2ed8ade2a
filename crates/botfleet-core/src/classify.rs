use crate::ProcessRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Online,
    Offline,
    Paused,
    Failed,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Online => "online",
            DisplayStatus::Offline => "offline",
            DisplayStatus::Paused => "paused",
            DisplayStatus::Failed => "failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplayStatus::Online => "Online",
            DisplayStatus::Offline => "Offline",
            DisplayStatus::Paused => "Paused",
            DisplayStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(DisplayStatus::Online),
            "offline" => Ok(DisplayStatus::Offline),
            "paused" => Ok(DisplayStatus::Paused),
            "failed" => Ok(DisplayStatus::Failed),
            other => Err(format!("Unknown display status: {other}")),
        }
    }
}

/// Maps a record to the four-way operator status.
///
/// Precedence: auto-pause beats manual pause beats the raw supervisor state.
/// The running check is case-sensitive.
pub fn classify(record: &ProcessRecord) -> DisplayStatus {
    if record.auto_paused {
        DisplayStatus::Failed
    } else if record.paused {
        DisplayStatus::Paused
    } else if record.is_running() {
        DisplayStatus::Online
    } else {
        DisplayStatus::Offline
    }
}

fn ordinal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)bot(\d+)$").expect("valid regex"))
}

/// Trailing `bot<digits>` ordinal, if any. Digit runs that overflow `u64`
/// count as absent.
pub fn extract_ordinal(name: &str) -> Option<u64> {
    ordinal_pattern()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
}

pub fn display_name(name: &str) -> String {
    match extract_ordinal(name) {
        Some(ordinal) => format!("Bot #{ordinal}"),
        None => name.to_string(),
    }
}

/// Orders records by ordinal ascending; names without one sort as 0.
/// Ties keep their incoming order.
pub fn sort_for_display(records: &[ProcessRecord]) -> Vec<&ProcessRecord> {
    let mut sorted: Vec<&ProcessRecord> = records.iter().collect();
    sorted.sort_by_key(|record| extract_ordinal(&record.name).unwrap_or(0));
    sorted
}
