//! Client-side API throttling (spec.md §6 `--aws-api-throttle`, §9): a
//! token-bucket per configured `service:operationRegex=rate:burst` rule,
//! shared across every [`crate::client::CloudClient`] call that matches it.
//!
//! AWS's own SDKs rely on per-account service quotas that are easy to blow
//! through during a large reconciliation burst (hundreds of target groups
//! registered at once). This is a client-side backstop, not a replacement
//! for the SDK's own retry/backoff on `Throttling` responses.

use governor::{Quota, RateLimiter};
use regex::Regex;
use std::num::NonZeroU32;
use std::sync::Arc;

type Limiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

#[derive(Debug, thiserror::Error)]
pub enum ThrottleConfigError {
    #[error("rule {0:?} is missing a '=rate:burst' suffix")]
    MissingRate(String),
    #[error("rule {0:?} has an invalid rate or burst: {1}")]
    InvalidRate(String, std::num::ParseIntError),
    #[error("rule {0:?} has an invalid operation pattern: {1}")]
    InvalidPattern(String, regex::Error),
}

struct Rule {
    service: String,
    operation: Regex,
    limiter: Arc<Limiter>,
}

fn build_rule(service: &str, operation_pattern: &str, rate: u32, burst: u32) -> Rule {
    let rate = NonZeroU32::new(rate.max(1)).expect("max(1) is nonzero");
    let burst = NonZeroU32::new(burst.max(1)).expect("max(1) is nonzero");
    let quota = Quota::per_second(rate).allow_burst(burst);
    Rule {
        service: service.to_string(),
        operation: Regex::new(operation_pattern).expect("default throttle pattern is valid"),
        limiter: Arc::new(RateLimiter::direct(quota)),
    }
}

/// Bundled per-service defaults (spec.md §4.2: "Defaults are bundled per
/// service; user-supplied overrides replace the default list for any
/// service they mention."), applied when `--aws-api-throttle` doesn't name
/// a service at all. Calibrated to stay well under the AWS-side per-account
/// request quotas for these services while letting bursts of target-group
/// churn through without stalling a reconciliation.
const DEFAULT_RULES: &[(&str, &str, u32, u32)] = &[
    ("elasticloadbalancing", "^Describe", 20, 40),
    ("elasticloadbalancing", ".*", 10, 20),
    ("ec2", "^Describe", 20, 40),
    ("ec2", ".*", 10, 20),
    ("acm", ".*", 10, 20),
    ("resourcegroupstaggingapi", ".*", 5, 10),
    ("sts", "^AssumeRole", 5, 10),
    ("globalaccelerator", ".*", 5, 10),
];

/// Parses and holds the rules from `--aws-api-throttle`, a comma-separated
/// list of `service:operationRegex=rate:burst` entries, e.g.
/// `elasticloadbalancing:.*=10:20,ec2:DescribeInstances=5:5`. Starts from
/// [`DEFAULT_RULES`]; any service named by `spec` discards that service's
/// defaults entirely in favor of the rules `spec` gives it. A service
/// mentioned by neither falls back to its bundled default list.
pub struct Throttler {
    rules: Vec<Rule>,
}

impl Throttler {
    pub fn parse(spec: &str) -> Result<Self, ThrottleConfigError> {
        let mut user_rules = Vec::new();
        let mut user_services = std::collections::HashSet::new();
        for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (selector, rate_burst) = entry
                .split_once('=')
                .ok_or_else(|| ThrottleConfigError::MissingRate(entry.to_string()))?;
            let (service, operation_pattern) = selector.split_once(':').unwrap_or((selector, ".*"));
            let (rate, burst) = rate_burst
                .split_once(':')
                .ok_or_else(|| ThrottleConfigError::MissingRate(entry.to_string()))?;
            let rate: u32 = rate
                .parse()
                .map_err(|e| ThrottleConfigError::InvalidRate(entry.to_string(), e))?;
            let burst: u32 = burst
                .parse()
                .map_err(|e| ThrottleConfigError::InvalidRate(entry.to_string(), e))?;
            Regex::new(operation_pattern).map_err(|e| ThrottleConfigError::InvalidPattern(entry.to_string(), e))?;
            user_services.insert(service.to_string());
            user_rules.push(build_rule(service, operation_pattern, rate, burst));
        }

        let mut rules: Vec<Rule> = DEFAULT_RULES
            .iter()
            .filter(|(service, ..)| !user_services.contains(*service))
            .map(|(service, operation, rate, burst)| build_rule(service, operation, *rate, *burst))
            .collect();
        rules.extend(user_rules);
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Waits until a token is available for `service`/`operation` against
    /// *every* configured rule that matches, not just the first; the most
    /// restrictive rule dominates because its wait is longest (spec.md
    /// §4.2). Returns immediately for a service/operation no rule matches.
    pub async fn acquire(&self, service: &str, operation: &str) {
        for rule in self.rules.iter().filter(|r| r.service == service && r.operation.is_match(operation)) {
            rule.limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_rules() {
        let t = Throttler::parse("elasticloadbalancing:.*=10:20,ec2:DescribeInstances=5:5").unwrap();
        assert_eq!(
            t.rules.iter().filter(|r| r.service == "elasticloadbalancing").count(),
            1
        );
        assert_eq!(t.rules.iter().filter(|r| r.service == "ec2").count(), 1);
    }

    #[test]
    fn missing_rate_is_an_error() {
        assert!(Throttler::parse("ec2:Describe.*").is_err());
    }

    #[test]
    fn user_rule_replaces_the_bundled_default_for_its_service() {
        let t = Throttler::parse("ec2:.*=1:1").unwrap();
        let ec2_rules: Vec<_> = t.rules.iter().filter(|r| r.service == "ec2").collect();
        assert_eq!(ec2_rules.len(), 1);
        assert_eq!(ec2_rules[0].operation.as_str(), ".*");
    }

    #[test]
    fn unmentioned_service_keeps_its_bundled_default() {
        let t = Throttler::parse("ec2:.*=1:1").unwrap();
        assert!(t.rules.iter().any(|r| r.service == "elasticloadbalancing"));
    }

    #[test]
    fn empty_spec_still_applies_bundled_defaults() {
        let t = Throttler::parse("").unwrap();
        assert!(!t.rules.is_empty());
        assert!(t.rules.iter().any(|r| r.service == "elasticloadbalancing"));
    }

    #[tokio::test]
    async fn service_with_no_rule_at_all_never_waits() {
        let t = Throttler::parse("ec2:.*=1:1").unwrap();
        t.acquire("totally-unconfigured-service", "DescribeCertificate").await;
    }

    #[tokio::test]
    async fn matched_rule_admits_burst_immediately() {
        let t = Throttler::parse("ec2:.*=1:5").unwrap();
        for _ in 0..5 {
            t.acquire("ec2", "DescribeSubnets").await;
        }
    }

    #[tokio::test]
    async fn request_matching_two_rules_waits_on_both() {
        // A specific-operation rule and a broader wildcard rule for the
        // same service both apply to a single matching call; the wildcard
        // rule's burst of 1 is the more restrictive of the two, so the
        // second `acquire` for the same operation must wait on it even
        // though the specific rule's burst of 5 still has room.
        let t = Throttler::parse("ec2:^DescribeSubnets$=100:5,ec2:.*=100:1").unwrap();
        t.acquire("ec2", "DescribeSubnets").await;
        let start = std::time::Instant::now();
        t.acquire("ec2", "DescribeSubnets").await;
        assert!(start.elapsed() > std::time::Duration::from_millis(1));
    }
}
