//! Core plate tracking types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::TrackerError;

/// Sentinel the recognizer returns when no plate could be read
pub const UNKNOWN_PLATE: &str = "unknown";

/// Logical camera role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Entry,
    Exit,
}

impl Panel {
    /// Both panels, in display order
    pub const ALL: [Panel; 2] = [Panel::Entry, Panel::Exit];

    /// Wire representation (`type` field of the backend request)
    pub fn as_str(&self) -> &'static str {
        match self {
            Panel::Entry => "entry",
            Panel::Exit => "exit",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Panel::Entry => 0,
            Panel::Exit => 1,
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Panel {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(Panel::Entry),
            "exit" => Ok(Panel::Exit),
            other => Err(TrackerError::UnknownPanel(other.to_string())),
        }
    }
}

/// A validated plate string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlateText(String);

impl PlateText {
    /// Validate a raw recognizer reading.
    ///
    /// Returns `None` for empty readings and for the "unknown" sentinel.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() || text.eq_ignore_ascii_case(UNKNOWN_PLATE) {
            return None;
        }
        Some(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlateText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A plate currently visible to one camera
#[derive(Debug, Clone)]
pub struct PlateSighting {
    pub plate: PlateText,
    pub panel: Panel,
    /// Start of the current continuous-visibility episode
    pub first_seen_at: Instant,
    /// Whether this episode already produced a confirmation
    pub confirmed: bool,
}

impl PlateSighting {
    /// Elapsed visibility within this episode
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen_at)
    }
}

/// Emitted once per episode when a plate has dwelled long enough
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedEvent {
    pub plate: PlateText,
    pub panel: Panel,
    pub confirmed_at: Instant,
    pub dwell: Duration,
}
