//! Time-to-live rules deciding which rows a cleanup run removes.
//!
//! Rules are checked in configuration order and the first rule that matches
//! a row decides its TTL, so narrow rules should be listed before broad
//! ones. Rows no rule matches are kept forever.

use chrono::{DateTime, TimeDelta, Utc};
use horizon_core::models::{Event, WebhookLog, WebhookLogStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields of a Kubernetes event that a rule may additionally match.
///
/// Each field left unset matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesEventMatcher {
    /// `involvedObject.apiVersion`.
    pub api_version: Option<String>,
    /// `involvedObject.kind`.
    pub kind: Option<String>,
    /// `involvedObject.name`.
    pub name: Option<String>,
    /// `involvedObject.namespace`.
    pub namespace: Option<String>,
    /// Top-level `reason`.
    pub reason: Option<String>,
}

impl KubernetesEventMatcher {
    /// Returns whether the Kubernetes event in `extra` satisfies every set
    /// field. A missing payload only matches an empty matcher.
    pub fn matches(&self, extra: Option<&Value>) -> bool {
        let fields = KubernetesEventFields::from_extra(extra);
        field_matches(self.api_version.as_deref(), fields.api_version)
            && field_matches(self.kind.as_deref(), fields.kind)
            && field_matches(self.name.as_deref(), fields.name)
            && field_matches(self.namespace.as_deref(), fields.namespace)
            && field_matches(self.reason.as_deref(), fields.reason)
    }
}

fn field_matches(expected: Option<&str>, actual: Option<&str>) -> bool {
    expected.map_or(true, |expected| actual == Some(expected))
}

/// Identifying fields parsed out of a Kubernetes event payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KubernetesEventFields<'a> {
    /// `involvedObject.apiVersion`.
    pub api_version: Option<&'a str>,
    /// `involvedObject.kind`.
    pub kind: Option<&'a str>,
    /// `involvedObject.name`.
    pub name: Option<&'a str>,
    /// `involvedObject.namespace`.
    pub namespace: Option<&'a str>,
    /// `reason`.
    pub reason: Option<&'a str>,
}

impl<'a> KubernetesEventFields<'a> {
    /// Reads the fields from an event's `extra` payload.
    pub fn from_extra(extra: Option<&'a Value>) -> Self {
        let Some(extra) = extra else {
            return Self::default();
        };
        let involved = extra.get("involvedObject");
        let involved_str = |key: &str| involved.and_then(|object| object.get(key)).and_then(Value::as_str);

        Self {
            api_version: involved_str("apiVersion"),
            kind: involved_str("kind"),
            name: involved_str("name"),
            namespace: involved_str("namespace"),
            reason: extra.get("reason").and_then(Value::as_str),
        }
    }
}

/// TTL for events of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRetentionRule {
    /// Event type the rule applies to.
    pub event_type: String,
    /// Maximum age in seconds.
    pub ttl_seconds: u64,
    /// Extra conditions for Kubernetes events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesEventMatcher>,
}

impl EventRetentionRule {
    /// Creates a rule for `event_type` without payload conditions.
    pub fn new(event_type: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self { event_type: event_type.into(), ttl_seconds: ttl.as_secs(), kubernetes: None }
    }

    /// Restricts the rule to Kubernetes events matching `matcher`.
    #[must_use]
    pub fn with_kubernetes(mut self, matcher: KubernetesEventMatcher) -> Self {
        self.kubernetes = Some(matcher);
        self
    }

    /// Returns whether the rule applies to `event`.
    pub fn matches(&self, event: &Event) -> bool {
        event.event_type == self.event_type
            && self.kubernetes.as_ref().map_or(true, |matcher| matcher.matches(event.extra.as_ref()))
    }

    /// Returns whether `created_at` is older than the TTL at `now`.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        cutoff(now, self.ttl_seconds).is_some_and(|cutoff| created_at < cutoff)
    }
}

/// TTL for webhook logs, optionally restricted to one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookLogRetentionRule {
    /// Status the rule applies to; every status when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WebhookLogStatus>,
    /// Maximum time since the last update, in seconds.
    pub ttl_seconds: u64,
}

impl WebhookLogRetentionRule {
    /// Creates a rule for every status.
    pub fn new(ttl: std::time::Duration) -> Self {
        Self { status: None, ttl_seconds: ttl.as_secs() }
    }

    /// Restricts the rule to one status.
    #[must_use]
    pub fn for_status(mut self, status: WebhookLogStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns whether the rule applies to `log`.
    pub fn matches(&self, log: &WebhookLog) -> bool {
        self.status.map_or(true, |status| status == log.status)
    }

    /// Returns whether `updated_at` is older than the TTL at `now`.
    pub fn is_expired(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        cutoff(now, self.ttl_seconds).is_some_and(|cutoff| updated_at < cutoff)
    }
}

/// Returns whether the first matching event rule marks `event` expired.
pub fn event_expired(rules: &[EventRetentionRule], event: &Event, now: DateTime<Utc>) -> bool {
    rules
        .iter()
        .find(|rule| rule.matches(event))
        .is_some_and(|rule| rule.is_expired(event.created_at, now))
}

/// Returns whether the first matching log rule marks `log` expired.
pub fn webhook_log_expired(rules: &[WebhookLogRetentionRule], log: &WebhookLog, now: DateTime<Utc>) -> bool {
    rules
        .iter()
        .find(|rule| rule.matches(log))
        .is_some_and(|rule| rule.is_expired(log.updated_at, now))
}

/// Longest TTL a rule may carry: one hundred years.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Oldest timestamp still kept at `now`, or `None` when the TTL reaches
/// past the representable range and nothing ever expires.
fn cutoff(now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    let ttl = TimeDelta::try_seconds(i64::try_from(ttl_seconds).ok()?)?;
    now.checked_sub_signed(ttl)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use horizon_core::models::{EventId, ResourceType};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn event(event_type: &str, created_at: DateTime<Utc>, extra: Option<Value>) -> Event {
        Event {
            id: EventId(1),
            resource_type: ResourceType::Cluster,
            resource_id: 5,
            event_type: event_type.to_string(),
            extra,
            req_id: "req".to_string(),
            created_by: 0,
            created_at,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn pod_event() -> Value {
        json!({
            "involvedObject": {
                "apiVersion": "v1",
                "kind": "Pod",
                "name": "web-0",
                "namespace": "prod"
            },
            "reason": "BackOff"
        })
    }

    #[test]
    fn kubernetes_fields_are_read_from_extra() {
        let extra = pod_event();
        let fields = KubernetesEventFields::from_extra(Some(&extra));

        assert_eq!(fields.api_version, Some("v1"));
        assert_eq!(fields.kind, Some("Pod"));
        assert_eq!(fields.name, Some("web-0"));
        assert_eq!(fields.namespace, Some("prod"));
        assert_eq!(fields.reason, Some("BackOff"));
        assert_eq!(KubernetesEventFields::from_extra(None), KubernetesEventFields::default());
    }

    #[test]
    fn kubernetes_matcher_requires_every_set_field() {
        let extra = pod_event();
        let matcher = KubernetesEventMatcher {
            kind: Some("Pod".to_string()),
            reason: Some("BackOff".to_string()),
            ..KubernetesEventMatcher::default()
        };
        assert!(matcher.matches(Some(&extra)));

        let other_reason = KubernetesEventMatcher { reason: Some("Pulled".to_string()), ..matcher.clone() };
        assert!(!other_reason.matches(Some(&extra)));
        assert!(!matcher.matches(None));
        assert!(KubernetesEventMatcher::default().matches(None));
    }

    #[test]
    fn first_matching_rule_decides() {
        let day = std::time::Duration::from_secs(86_400);
        let rules = vec![
            EventRetentionRule::new("clusters_kubernetes_event", day * 30).with_kubernetes(KubernetesEventMatcher {
                reason: Some("BackOff".to_string()),
                ..KubernetesEventMatcher::default()
            }),
            EventRetentionRule::new("clusters_kubernetes_event", day),
        ];

        let two_days_old = now() - TimeDelta::days(2);
        let backoff = event("clusters_kubernetes_event", two_days_old, Some(pod_event()));
        let pulled = event("clusters_kubernetes_event", two_days_old, Some(json!({"reason": "Pulled"})));

        assert!(!event_expired(&rules, &backoff, now()));
        assert!(event_expired(&rules, &pulled, now()));
        assert!(!event_expired(&rules, &event("clusters_created", two_days_old, None), now()));
    }

    #[test]
    fn webhook_log_rules_filter_by_status() {
        let rule = WebhookLogRetentionRule::new(std::time::Duration::from_secs(3600))
            .for_status(WebhookLogStatus::Success);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json, json!({"status": "success", "ttl_seconds": 3600}));

        let parsed: WebhookLogRetentionRule = serde_json::from_value(json!({"ttl_seconds": 60})).unwrap();
        assert_eq!(parsed.status, None);
    }

    #[test]
    fn out_of_range_ttl_never_expires() {
        let ancient = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        for ttl_seconds in [u64::MAX, 10_000_000_000_000, u64::try_from(i64::MAX).unwrap()] {
            let log_rule = WebhookLogRetentionRule { status: None, ttl_seconds };
            assert!(!log_rule.is_expired(ancient, now()));
            assert!(!log_rule.is_expired(now(), now()));

            let event_rule = EventRetentionRule { event_type: "clusters_created".to_string(), ttl_seconds, kubernetes: None };
            assert!(!event_rule.is_expired(ancient, now()));
        }
    }

    #[test]
    fn longest_allowed_ttl_still_expires_old_rows() {
        let rule = WebhookLogRetentionRule { status: None, ttl_seconds: MAX_TTL_SECONDS };
        let older = now() - TimeDelta::seconds(i64::try_from(MAX_TTL_SECONDS).unwrap() + 1);
        assert!(rule.is_expired(older, now()));
        assert!(!rule.is_expired(now(), now()));
    }

    proptest! {
        #[test]
        fn event_expires_exactly_after_ttl(age_secs in 0i64..200_000, ttl_secs in 0u64..200_000) {
            let rule = EventRetentionRule::new("clusters_created", std::time::Duration::from_secs(ttl_secs));
            let created_at = now() - TimeDelta::seconds(age_secs);
            let ttl_i64 = i64::try_from(ttl_secs).unwrap();
            prop_assert_eq!(rule.is_expired(created_at, now()), age_secs > ttl_i64);
        }
    }
}
