//! Per-key dispatch cooldowns
//!
//! The same type backs both the per-camera tracker each worker owns and
//! the cross-camera tracker inside the controller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use plate_tracker::Panel;

use crate::DispatchKey;

#[derive(Debug, Clone)]
pub struct CooldownTracker {
    cooldown: Duration,
    last_dispatch: HashMap<DispatchKey, Instant>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_dispatch: HashMap::new(),
        }
    }

    /// True when the key was never dispatched or its cooldown has
    /// strictly elapsed.
    pub fn is_ready(&self, key: &DispatchKey, now: Instant) -> bool {
        match self.last_dispatch.get(key) {
            Some(last) => now.saturating_duration_since(*last) > self.cooldown,
            None => true,
        }
    }

    pub fn stamp(&mut self, key: DispatchKey, now: Instant) {
        self.last_dispatch.insert(key, now);
    }

    /// Time left before the key is ready again
    pub fn remaining(&self, key: &DispatchKey, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch.get(key)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed <= self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Drop stamps that can no longer block anything
    pub fn purge(&mut self, now: Instant) -> usize {
        let before = self.last_dispatch.len();
        let cooldown = self.cooldown;
        self.last_dispatch
            .retain(|_, last| now.saturating_duration_since(*last) <= cooldown);
        before - self.last_dispatch.len()
    }

    /// Forget every stamp for one panel
    pub fn clear_panel(&mut self, panel: Panel) -> usize {
        let before = self.last_dispatch.len();
        self.last_dispatch.retain(|key, _| key.panel != panel);
        before - self.last_dispatch.len()
    }

    pub fn clear(&mut self) {
        self.last_dispatch.clear();
    }

    pub fn len(&self) -> usize {
        self.last_dispatch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_dispatch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_tracker::PlateText;

    fn key(plate: &str, panel: Panel) -> DispatchKey {
        DispatchKey::new(PlateText::parse(plate).unwrap(), panel)
    }

    #[test]
    fn test_cooldown_is_strict() {
        let mut cooldowns = CooldownTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let k = key("51A-12345", Panel::Entry);

        assert!(cooldowns.is_ready(&k, t0));
        cooldowns.stamp(k.clone(), t0);
        assert!(!cooldowns.is_ready(&k, t0 + Duration::from_secs(5)));
        assert!(cooldowns.is_ready(&k, t0 + Duration::from_millis(5001)));
        assert_eq!(
            cooldowns.remaining(&k, t0 + Duration::from_secs(2)),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_panels_are_independent() {
        let mut cooldowns = CooldownTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cooldowns.stamp(key("51A-12345", Panel::Entry), t0);

        assert!(cooldowns.is_ready(&key("51A-12345", Panel::Exit), t0));
        assert_eq!(cooldowns.clear_panel(Panel::Exit), 0);
        assert_eq!(cooldowns.clear_panel(Panel::Entry), 1);
        assert!(cooldowns.is_ready(&key("51A-12345", Panel::Entry), t0));
    }

    #[test]
    fn test_purge_drops_stale_stamps() {
        let mut cooldowns = CooldownTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cooldowns.stamp(key("51A-12345", Panel::Entry), t0);
        cooldowns.stamp(key("30F-11111", Panel::Entry), t0 + Duration::from_secs(4));

        assert_eq!(cooldowns.purge(t0 + Duration::from_secs(6)), 1);
        assert_eq!(cooldowns.len(), 1);
    }
}
