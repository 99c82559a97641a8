//! Plate Dispatch Engine
//!
//! Shields the gate backend from duplicate, bursty or redundant calls:
//! - In-flight deduplication per (plate, panel)
//! - Response cache with separate TTLs for normal and connection-error outcomes
//! - Per-camera and cross-camera cooldowns
//! - Global sliding-window rate limit
//!
//! All shared state is owned by [`DispatchController`] behind a single lock.

mod backend;
mod cache;
mod config;
mod controller;
mod cooldown;
mod outcome;
mod pending;
mod rate_limit;

pub use backend::{Backend, BackendConfig, BackendReply, CheckRequest, HttpBackend, RequestMode};
pub use cache::{CacheEntry, ResponseCache, TtlClass};
pub use config::DispatchConfig;
pub use controller::{DispatchController, DispatchRequest, DispatchStats, Submission};
pub use cooldown::CooldownTracker;
pub use outcome::{Outcome, OutcomeKind, CACHED_PREFIX, RATE_LIMITED_MESSAGE};
pub use pending::{PendingCallSet, PendingToken};
pub use rate_limit::{RateLimiter, RATE_WINDOW};

use plate_tracker::{Panel, PlateText};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors while talking to the backend. These never leave the
/// controller; they are folded into connection-error outcomes.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Identity of a dispatch: one plate seen on one panel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchKey {
    pub plate: PlateText,
    pub panel: Panel,
}

impl DispatchKey {
    pub fn new(plate: PlateText, panel: Panel) -> Self {
        Self { plate, panel }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.plate, self.panel)
    }
}
