//! Memo of series whose labels have already been written.

use std::collections::HashSet;
use std::sync::Mutex;

/// Tracks which series keys already had a creation line emitted.
///
/// Grows for the lifetime of an encoding run and is never evicted. The
/// check-and-insert is done under one lock, so a registry may be shared by
/// concurrent encoders without two of them both seeing a first sighting.
#[derive(Debug, Default)]
pub struct LabelRegistry {
    seen: Mutex<HashSet<String>>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` and returns true if this is its first observation.
    pub fn mark_if_absent(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains(key) {
            return false;
        }
        seen.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
