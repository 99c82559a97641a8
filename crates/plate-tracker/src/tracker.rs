//! Dwell-time plate confirmation
//!
//! One tracker per camera worker. A plate is confirmed once it has been
//! continuously visible for the minimum detection duration; each
//! continuous-visibility episode confirms at most once. A plate missing
//! from a frame ends its episode.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{ConfirmedEvent, Panel, PauseGate, PlateSighting, PlateText};

/// Per-camera confirmation state machine
#[derive(Debug)]
pub struct PlateConfirmationTracker {
    panel: Panel,
    /// Minimum continuous visibility before confirming
    min_dwell: Duration,
    gate: PauseGate,
    /// Gate generation this tracker last synchronized with
    generation: u64,
    sightings: HashMap<PlateText, PlateSighting>,
}

impl PlateConfirmationTracker {
    /// Create a tracker bound to a panel of the shared gate
    pub fn new(panel: Panel, min_dwell: Duration, gate: PauseGate) -> Self {
        let generation = gate.generation(panel);
        Self {
            panel,
            min_dwell,
            gate,
            generation,
            sightings: HashMap::new(),
        }
    }

    /// Feed the plates detected in one frame.
    ///
    /// Visibility bookkeeping always runs. While the panel is paused no
    /// events are emitted, and after a resume or rescan every episode
    /// restarts from zero.
    pub fn observe(&mut self, plates: &HashSet<PlateText>, now: Instant) -> Vec<ConfirmedEvent> {
        // Pause flag before generation, mirroring the store order in resume
        let paused = self.gate.is_paused(self.panel);
        let generation = self.gate.generation(self.panel);
        if generation != self.generation {
            if !self.sightings.is_empty() {
                debug!(
                    "Panel {}: discarding {} partial dwell timers",
                    self.panel,
                    self.sightings.len()
                );
            }
            self.sightings.clear();
            self.generation = generation;
        }

        self.sightings.retain(|plate, _| {
            let visible = plates.contains(plate);
            if !visible {
                debug!("Stopped tracking license plate: {}", plate);
            }
            visible
        });

        let panel = self.panel;
        for plate in plates {
            self.sightings.entry(plate.clone()).or_insert_with(|| {
                debug!("Started tracking license plate: {}", plate);
                PlateSighting {
                    plate: plate.clone(),
                    panel,
                    first_seen_at: now,
                    confirmed: false,
                }
            });
        }

        if paused {
            return Vec::new();
        }

        let mut confirmed = Vec::new();
        for sighting in self.sightings.values_mut().filter(|s| !s.confirmed) {
            let dwell = sighting.dwell(now);
            if dwell >= self.min_dwell {
                sighting.confirmed = true;
                info!(
                    "License plate {} confirmed on {} after {:.1}s",
                    sighting.plate,
                    self.panel,
                    dwell.as_secs_f64()
                );
                confirmed.push(ConfirmedEvent {
                    plate: sighting.plate.clone(),
                    panel: self.panel,
                    confirmed_at: now,
                    dwell,
                });
            } else {
                debug!(
                    "License plate {} seen for {:.1}s (need {:.1}s more)",
                    sighting.plate,
                    dwell.as_secs_f64(),
                    (self.min_dwell - dwell).as_secs_f64()
                );
            }
        }

        confirmed.sort_by(|a, b| a.plate.cmp(&b.plate));
        confirmed
    }

    /// Convenience wrapper over raw recognizer strings
    pub fn observe_readings<'a>(
        &mut self,
        readings: impl IntoIterator<Item = &'a str>,
        now: Instant,
    ) -> Vec<ConfirmedEvent> {
        let plates: HashSet<PlateText> = readings.into_iter().filter_map(PlateText::parse).collect();
        self.observe(&plates, now)
    }

    /// Forget every episode
    pub fn clear(&mut self) {
        self.sightings.clear();
    }

    /// Dwell of a currently tracked plate
    pub fn dwell(&self, plate: &PlateText, now: Instant) -> Option<Duration> {
        self.sightings.get(plate).map(|s| s.dwell(now))
    }

    /// Number of plates currently tracked
    pub fn tracked(&self) -> usize {
        self.sightings.len()
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn min_dwell(&self) -> Duration {
        self.min_dwell
    }
}
