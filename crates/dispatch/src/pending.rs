//! In-flight dispatch markers

use std::collections::HashMap;

use plate_tracker::Panel;

use crate::DispatchKey;

/// Identifies one in-flight call so a late completion cannot remove a
/// marker that belongs to a newer call for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToken(u64);

#[derive(Debug, Default)]
pub struct PendingCallSet {
    markers: HashMap<DispatchKey, PendingToken>,
    next_token: u64,
}

impl PendingCallSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key in flight. `None` if it already is.
    pub fn try_insert(&mut self, key: DispatchKey) -> Option<PendingToken> {
        if self.markers.contains_key(&key) {
            return None;
        }
        self.next_token += 1;
        let token = PendingToken(self.next_token);
        self.markers.insert(key, token);
        Some(token)
    }

    pub fn contains(&self, key: &DispatchKey) -> bool {
        self.markers.contains_key(key)
    }

    /// Remove the marker if it still belongs to this call
    pub fn complete(&mut self, key: &DispatchKey, token: PendingToken) -> bool {
        if self.markers.get(key) == Some(&token) {
            self.markers.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop all markers for a panel
    pub fn clear_panel(&mut self, panel: Panel) -> usize {
        let before = self.markers.len();
        self.markers.retain(|key, _| key.panel != panel);
        before - self.markers.len()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
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
    fn test_second_insert_is_refused() {
        let mut pending = PendingCallSet::new();
        let k = key("51A-12345", Panel::Entry);
        let token = pending.try_insert(k.clone()).unwrap();

        assert!(pending.try_insert(k.clone()).is_none());
        assert!(pending.complete(&k, token));
        assert!(!pending.contains(&k));
    }

    #[test]
    fn test_stale_completion_keeps_newer_marker() {
        let mut pending = PendingCallSet::new();
        let k = key("51A-12345", Panel::Exit);
        let stale = pending.try_insert(k.clone()).unwrap();

        assert_eq!(pending.clear_panel(Panel::Exit), 1);
        let fresh = pending.try_insert(k.clone()).unwrap();

        assert!(!pending.complete(&k, stale));
        assert!(pending.contains(&k));
        assert!(pending.complete(&k, fresh));
        assert!(pending.is_empty());
    }
}
