//! Per-panel pause control
//!
//! The gate is shared between camera workers, dispatch completion tasks
//! and the supervisor's command loop. Workers never have their trackers
//! mutated from outside: resume and rescan bump a per-panel generation
//! counter, and each tracker clears itself the next time it observes a
//! changed generation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::Panel;

#[derive(Debug, Default)]
struct PanelControl {
    paused: AtomicBool,
    /// Bumped by every resume and rescan
    generation: AtomicU64,
    /// Bumped by rescans only
    rescans: AtomicU64,
}

/// Shared pause state for both panels
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    panels: Arc<[PanelControl; 2]>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn control(&self, panel: Panel) -> &PanelControl {
        &self.panels[panel.index()]
    }

    /// Suspend confirmations for a panel. Returns true if it was running.
    pub fn pause(&self, panel: Panel) -> bool {
        let was_paused = self.control(panel).paused.swap(true, Ordering::AcqRel);
        if !was_paused {
            info!("Panel {} paused for review", panel);
        }
        !was_paused
    }

    /// Resume confirmations. Dwell state restarts from zero.
    /// Returns true if the panel was paused.
    pub fn resume(&self, panel: Panel) -> bool {
        let control = self.control(panel);
        // Generation first: a tracker that sees the flag cleared must also
        // see the new generation
        control.generation.fetch_add(1, Ordering::AcqRel);
        let was_paused = control.paused.swap(false, Ordering::AcqRel);
        if was_paused {
            info!("Panel {} resumed", panel);
        }
        was_paused
    }

    /// Ask workers on this panel to forget dwell state, local cooldowns
    /// and ledger memos. Does not change the pause flag.
    pub fn request_rescan(&self, panel: Panel) {
        let control = self.control(panel);
        control.rescans.fetch_add(1, Ordering::AcqRel);
        control.generation.fetch_add(1, Ordering::AcqRel);
        info!("Rescan requested on panel {}", panel);
    }

    pub fn is_paused(&self, panel: Panel) -> bool {
        self.control(panel).paused.load(Ordering::Acquire)
    }

    /// Changes whenever tracked dwell state must be discarded
    pub fn generation(&self, panel: Panel) -> u64 {
        self.control(panel).generation.load(Ordering::Acquire)
    }

    /// Changes whenever a rescan was requested
    pub fn rescan_epoch(&self, panel: Panel) -> u64 {
        self.control(panel).rescans.load(Ordering::Acquire)
    }

    /// Pause flags for both panels
    pub fn snapshot(&self) -> [(Panel, bool); 2] {
        Panel::ALL.map(|panel| (panel, self.is_paused(panel)))
    }
}
