//! Per-client cache of the last element revisions already accounted for.

use std::collections::HashMap;

use crate::element::Element;

/// Last `(version, versionNonce)` this client has sent or applied for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: u64,
    pub version_nonce: u32,
}

impl From<&Element> for VersionRecord {
    fn from(element: &Element) -> Self {
        Self {
            version: element.version,
            version_nonce: element.version_nonce,
        }
    }
}

/// Answers "has this element changed since I last saw it?".
///
/// Owned by one editing session and dropped with it; never persisted.
#[derive(Debug, Default)]
pub struct VersionTracker {
    records: HashMap<String, VersionRecord>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker that treats `elements` as already seen.
    pub fn seeded(elements: &[Element]) -> Self {
        let mut tracker = Self::new();
        tracker.seed(elements);
        tracker
    }

    /// Record every element in `elements`.
    pub fn seed(&mut self, elements: &[Element]) {
        for element in elements {
            self.record(element);
        }
    }

    /// Store the element's current pair, overwriting any prior entry.
    pub fn record(&mut self, element: &Element) {
        self.records
            .insert(element.id.clone(), VersionRecord::from(element));
    }

    /// True if there is no record for the id or the stored pair differs.
    pub fn has_changed(&self, element: &Element) -> bool {
        self.records
            .get(&element.id)
            .is_none_or(|seen| *seen != VersionRecord::from(element))
    }

    pub fn get(&self, id: &str) -> Option<VersionRecord> {
        self.records.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
