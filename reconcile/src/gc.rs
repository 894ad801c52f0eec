//! Target group garbage-collection stabilization (spec.md §4.5
//! "Stabilization", §8 "Stabilization Time" in the glossary): after any
//! listener change, an unreferenced target group is retained until
//! `lb_stabilization_time` has elapsed without being referenced again, so a
//! rolling rule update doesn't flap a target group's registrations.

use elbv2_controller_core::NodeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks, per Gateway reconciliation key, the first instant each target
/// group logical ID was observed unreferenced. A target group is only
/// surfaced to [`crate::diff`]'s delete list once it has been continuously
/// unreferenced for the configured window; being referenced again at any
/// point resets its clock.
#[derive(Default)]
pub struct StabilizationTracker {
    unreferenced_since: Mutex<HashMap<String, Instant>>,
}

impl StabilizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters `candidates` (target group logical IDs the current desired
    /// graph no longer references) down to those that have been
    /// unreferenced for at least `window`. Candidates not yet past the
    /// window are recorded so a future call can detect they've stabilized;
    /// candidates not observed this round (because something now
    /// references them again) have their clocks cleared by `referenced`.
    pub fn ready_for_deletion(&self, candidates: &[NodeId], window: Duration, now: Instant) -> Vec<NodeId> {
        let mut since = self.unreferenced_since.lock();
        let mut ready = Vec::new();
        for id in candidates {
            let first_seen = *since.entry(id.as_str().to_string()).or_insert(now);
            if now.saturating_duration_since(first_seen) >= window {
                ready.push(id.clone());
            }
        }
        ready
    }

    /// Clears the stabilization clock for any tracked ID not present in
    /// `still_unreferenced` this round — it's referenced again, or gone.
    pub fn reconcile_tracked(&self, still_unreferenced: &[NodeId]) {
        let keep: std::collections::HashSet<&str> = still_unreferenced.iter().map(|id| id.as_str()).collect();
        self.unreferenced_since.lock().retain(|id, _| keep.contains(id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elbv2_controller_core::LogicalId;

    #[test]
    fn not_ready_before_window_elapses() {
        let tracker = StabilizationTracker::new();
        let id = LogicalId::of("TargetGroup", &"svc");
        let t0 = Instant::now();
        assert!(tracker.ready_for_deletion(&[id.clone()], Duration::from_secs(300), t0).is_empty());
        let later = t0 + Duration::from_secs(60);
        assert!(tracker.ready_for_deletion(&[id], Duration::from_secs(300), later).is_empty());
    }

    #[test]
    fn ready_once_window_elapses() {
        let tracker = StabilizationTracker::new();
        let id = LogicalId::of("TargetGroup", &"svc");
        let t0 = Instant::now();
        tracker.ready_for_deletion(&[id.clone()], Duration::from_secs(300), t0);
        let later = t0 + Duration::from_secs(301);
        assert_eq!(tracker.ready_for_deletion(&[id], Duration::from_secs(300), later).len(), 1);
    }

    #[test]
    fn clock_resets_when_referenced_again() {
        let tracker = StabilizationTracker::new();
        let id = LogicalId::of("TargetGroup", &"svc");
        let t0 = Instant::now();
        tracker.ready_for_deletion(&[id.clone()], Duration::from_secs(300), t0);
        tracker.reconcile_tracked(&[]); // referenced again this round
        let later = t0 + Duration::from_secs(301);
        assert_eq!(tracker.ready_for_deletion(&[id], Duration::from_secs(300), later).len(), 0);
    }
}
