use chrono::{DateTime, Utc};

/// Everything spec.md §4.4 step 5 says a rule's priority is derived from,
/// plus the tie-break spec.md §9's Open Questions leaves unspecified:
/// "Precedence between rules declared across two HTTPRoutes with identical
/// creation timestamp and UID is unspecified." This crate resolves that by
/// adding `route_namespace`/`route_name` as the final tie-break, giving a
/// deterministic total order — see DESIGN.md for the recorded decision.
///
/// More specific matches get lower priority numbers (higher precedence on
/// ALB/NLB listener rules), so `RoutePriorityKey` sorts *ascending* in the
/// order rules should be tried: earlier key ⇒ lower (more precedent)
/// priority number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePriorityKey {
    pub route_creation_timestamp: DateTime<Utc>,
    pub route_uid: String,
    pub route_namespace: String,
    pub route_name: String,
    pub rule_index: usize,
    pub match_index: usize,
    /// Higher specificity sorts first. Computed by the Model Builder from
    /// match kind (exact path > prefix path > regex; more header/query
    /// constraints > fewer).
    pub specificity: u32,
}

impl PartialOrd for RoutePriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoutePriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher specificity must compare as "earlier" (lower priority
        // number), so we reverse it before falling through to the
        // timestamp/UID/namespace/name/index tie-breaks, each of which
        // sorts in its natural ascending order.
        other
            .specificity
            .cmp(&self.specificity)
            .then_with(|| self.route_creation_timestamp.cmp(&other.route_creation_timestamp))
            .then_with(|| self.route_uid.cmp(&other.route_uid))
            .then_with(|| self.route_namespace.cmp(&other.route_namespace))
            .then_with(|| self.route_name.cmp(&other.route_name))
            .then_with(|| self.rule_index.cmp(&other.rule_index))
            .then_with(|| self.match_index.cmp(&other.match_index))
    }
}

/// Assigns ALB/NLB listener-rule priorities (1-based, unique per listener)
/// to `keys`, in the order defined by [`RoutePriorityKey`]'s `Ord` impl.
/// Returns, for each input index, its assigned priority.
pub fn rule_priority(keys: &[RoutePriorityKey]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));

    let mut priorities = vec![0u32; keys.len()];
    for (priority, &original_index) in order.iter().enumerate() {
        priorities[original_index] = priority as u32 + 1;
    }
    priorities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ts_secs: i64, uid: &str, ns: &str, name: &str, specificity: u32) -> RoutePriorityKey {
        RoutePriorityKey {
            route_creation_timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            route_uid: uid.into(),
            route_namespace: ns.into(),
            route_name: name.into(),
            rule_index: 0,
            match_index: 0,
            specificity,
        }
    }

    #[test]
    fn more_specific_gets_lower_priority_number() {
        let keys = vec![key(0, "a", "ns", "r", 10), key(0, "a", "ns", "r", 20)];
        let priorities = rule_priority(&keys);
        assert!(priorities[1] < priorities[0]);
    }

    #[test]
    fn identical_timestamp_and_uid_breaks_on_namespace_name() {
        let keys = vec![
            key(5, "same-uid", "zeta", "route", 1),
            key(5, "same-uid", "alpha", "route", 1),
        ];
        let priorities = rule_priority(&keys);
        // "alpha" sorts before "zeta" => lower priority number => higher precedence.
        assert!(priorities[1] < priorities[0]);
    }

    #[test]
    fn earlier_creation_timestamp_wins() {
        let keys = vec![key(10, "a", "ns", "r", 1), key(5, "a", "ns", "r", 1)];
        let priorities = rule_priority(&keys);
        assert!(priorities[1] < priorities[0]);
    }
}
