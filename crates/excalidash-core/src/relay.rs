//! Sender side of element synchronization.

use std::time::{Duration, Instant};

use crate::element::Element;
use crate::schedule::Throttle;
use crate::sync::ElementUpdate;
use crate::version::VersionTracker;

/// Default minimum spacing between element broadcasts.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(100);

/// Turns the full local scene into throttled element deltas.
///
/// Always fed the complete element list, soft-deleted elements included, so
/// deletions the engine hides from its visible-element callback still go out.
///
/// The throttle only carries a dirty mark. A trailing emission diffs the scene
/// as it is when the window closes, so remote merges applied inside the window
/// are never sent back out at their old revision.
#[derive(Debug)]
pub struct ChangeRelay {
    document_id: String,
    sender_id: String,
    tracker: VersionTracker,
    throttle: Throttle<()>,
}

impl ChangeRelay {
    pub fn new(document_id: impl Into<String>, sender_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            document_id: document_id.into(),
            sender_id: sender_id.into(),
            tracker: VersionTracker::new(),
            throttle: Throttle::new(interval),
        }
    }

    /// Treat `elements` as already known to the room (initial load).
    pub fn seed(&mut self, elements: &[Element]) {
        self.tracker.seed(elements);
    }

    /// Record elements applied from remote so they are not echoed back.
    pub fn acknowledge<'a>(&mut self, elements: impl IntoIterator<Item = &'a Element>) {
        for element in elements {
            self.tracker.record(element);
        }
    }

    /// Offer the current scene. Returns an update if the throttle lets one out now.
    pub fn broadcast_changes(&mut self, all_elements: &[Element], now: Instant) -> Option<ElementUpdate> {
        self.throttle.schedule((), now)?;
        self.diff(all_elements)
    }

    /// Emit the trailing update once the throttle window closes.
    ///
    /// `latest` is only called when an emission is due.
    pub fn poll(&mut self, now: Instant, latest: impl FnOnce() -> Vec<Element>) -> Option<ElementUpdate> {
        self.throttle.poll(now)?;
        self.diff(&latest())
    }

    /// Emit any pending update immediately, diffed against `latest`.
    pub fn flush_now(&mut self, latest: &[Element]) -> Option<ElementUpdate> {
        self.throttle.flush_now()?;
        self.diff(latest)
    }

    pub fn is_pending(&self) -> bool {
        self.throttle.is_pending()
    }

    pub fn cancel(&mut self) {
        self.throttle.cancel();
    }

    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    fn diff(&mut self, elements: &[Element]) -> Option<ElementUpdate> {
        let changed: Vec<Element> = elements
            .iter()
            .filter(|el| self.tracker.has_changed(el))
            .cloned()
            .collect();
        if changed.is_empty() {
            return None;
        }
        for el in &changed {
            self.tracker.record(el);
        }
        log::debug!("Broadcasting {} changed element(s)", changed.len());
        Some(ElementUpdate {
            document_id: self.document_id.clone(),
            elements: changed,
            sender_id: self.sender_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn relay() -> ChangeRelay {
        ChangeRelay::new("doc", "me", DEFAULT_BROADCAST_INTERVAL)
    }

    #[test]
    fn test_only_changed_elements_are_sent() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a"), Element::new("b")];
        relay.seed(&scene);

        scene[1].touch();
        let update = relay.broadcast_changes(&scene, t0).unwrap();
        assert_eq!(update.elements.len(), 1);
        assert_eq!(update.elements[0].id, "b");
        assert_eq!(update.sender_id, "me");
        assert_eq!(update.document_id, "doc");
    }

    #[test]
    fn test_unchanged_scene_sends_nothing() {
        let t0 = Instant::now();
        let mut relay = relay();
        let scene = vec![Element::new("a")];
        relay.seed(&scene);
        assert!(relay.broadcast_changes(&scene, t0).is_none());
    }

    #[test]
    fn test_deletion_is_broadcast() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a")];
        relay.seed(&scene);

        scene[0].mark_deleted();
        let update = relay.broadcast_changes(&scene, t0).unwrap();
        assert!(update.elements[0].is_deleted);
    }

    #[test]
    fn test_acknowledged_remote_not_echoed() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut remote = Element::new("r");
        remote.version = 7;
        relay.acknowledge([&remote]);
        assert!(relay.broadcast_changes(&[remote], t0).is_none());
    }

    #[test]
    fn test_burst_of_edits_is_throttled() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a")];
        relay.seed(&scene);

        let mut sent = Vec::new();
        for i in 0..20u64 {
            let now = t0 + ms(i * 10);
            sent.extend(relay.poll(now, || scene.clone()));
            scene[0].touch();
            sent.extend(relay.broadcast_changes(&scene, now));
        }
        for tail in [200, 300, 400] {
            sent.extend(relay.poll(t0 + ms(tail), || scene.clone()));
        }

        assert!(sent.len() <= 3, "sent {} updates", sent.len());
        let last = sent.last().unwrap();
        assert_eq!(last.elements[0].version_key(), scene[0].version_key());
    }

    #[test]
    fn test_cancel_drops_trailing_update() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a")];
        assert!(relay.broadcast_changes(&scene, t0).is_some());
        scene[0].touch();
        assert!(relay.broadcast_changes(&scene, t0 + ms(10)).is_none());
        relay.cancel();
        assert!(relay.poll(t0 + ms(500), || scene.clone()).is_none());
    }

    #[test]
    fn test_trailing_update_uses_scene_at_fire_time() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a"), Element::new("b")];
        relay.seed(&scene);

        scene[0].touch();
        assert!(relay.broadcast_changes(&scene, t0).is_some());
        scene[0].touch();
        assert!(relay.broadcast_changes(&scene, t0 + ms(10)).is_none());

        // A newer remote revision of `b` lands inside the window.
        let mut remote_b = scene[1].clone();
        remote_b.version = 5;
        relay.acknowledge([&remote_b]);
        scene[1] = remote_b.clone();
        scene[0].touch();

        let update = relay.poll(t0 + ms(100), || scene.clone()).unwrap();
        let sent: Vec<_> = update.elements.iter().map(|e| (e.id.as_str(), e.version)).collect();
        assert_eq!(sent, vec![("a", 4)]);
        assert_eq!(relay.tracker().get("b").map(|r| r.version), Some(5));
    }

    #[test]
    fn test_flush_now_diffs_latest() {
        let t0 = Instant::now();
        let mut relay = relay();
        let mut scene = vec![Element::new("a")];
        relay.seed(&scene);
        assert!(relay.flush_now(&scene).is_none());

        scene[0].touch();
        relay.broadcast_changes(&scene, t0);
        scene[0].touch();
        relay.broadcast_changes(&scene, t0 + ms(10));
        assert!(relay.is_pending());
        scene[0].touch();

        let update = relay.flush_now(&scene).unwrap();
        assert_eq!(update.elements[0].version, 4);
        assert!(!relay.is_pending());
    }
}
