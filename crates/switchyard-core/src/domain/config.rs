//! ComponentConfig - コンポーネントごとの設定
//!
//! # 既定値
//! - timeout: なし（呼び出しは完了まで待つ）
//! - retry_policy: 1 回のみ（`RetryPolicy::none()`）
//!
//! Duration は JSON ではミリ秒の整数として読み書きする。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ids::ComponentId;

/// Retry policy applied to a component's `initialize` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. `1` disables retries.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `attempt` failed attempts (1-indexed).
    ///
    /// delay = initial_delay * backoff_multiplier^(attempt - 1), capped at `max_delay`.
    ///
    /// With initial_delay=1s, multiplier=2.0, max_delay=10s:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 4: 8s
    /// - attempt 5: 10s (capped)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.backoff_multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }

    /// Whether another attempt is allowed after `attempts` attempts.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1_000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

/// Metrics collection settings carried with each component.
///
/// The runtime only records these; collection is up to the component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub enabled: bool,

    #[serde(with = "millis")]
    pub interval: Duration,

    #[serde(with = "millis")]
    pub retention: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_millis(60_000),
            retention: Duration::from_millis(86_400_000),
        }
    }
}

/// Configuration record every component carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub id: ComponentId,
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub auto_start: bool,

    /// Ids of the components this one needs initialized first.
    #[serde(default)]
    pub dependencies: Vec<ComponentId>,

    /// Start priority. Higher starts first; equal priorities start together.
    #[serde(default)]
    pub priority: i32,

    /// How long the lifecycle waits on each `initialize` / `start` / `stop` call.
    /// Unset means wait for completion. A call past its deadline is reported as a
    /// timeout but keeps running; it is never cancelled.
    #[serde(default, with = "option_millis")]
    pub timeout: Option<Duration>,

    /// Single attempt unless the component opts into retries.
    #[serde(default = "RetryPolicy::none")]
    pub retry_policy: RetryPolicy,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ComponentConfig {
    pub fn new(id: impl Into<ComponentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            auto_start: false,
            dependencies: Vec::new(),
            priority: 0,
            timeout: None,
            retry_policy: RetryPolicy::none(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<ComponentId>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

fn default_true() -> bool {
    true
}

/// `Duration` <-> integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// `Option<Duration>` <-> integer milliseconds or `null`.
pub(crate) mod option_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy_matches_runtime_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(1), Duration::from_secs(1));
        assert_eq!(policy.next_delay(2), Duration::from_secs(2));
        assert_eq!(policy.next_delay(4), Duration::from_secs(8));
        assert_eq!(policy.next_delay(5), Duration::from_secs(10));
        assert_eq!(policy.next_delay(60), Duration::from_secs(10));
    }

    #[test]
    fn no_retry_policy_allows_a_single_attempt() {
        let policy = RetryPolicy::none();
        assert!(!policy.allows_retry(1));
        assert!(RetryPolicy::default().allows_retry(2));
        assert!(!RetryPolicy::default().allows_retry(3));
    }

    #[test]
    fn config_reads_camel_case_with_defaults() {
        let json = serde_json::json!({
            "id": "chat-interface",
            "name": "ChatInterface",
            "dependencies": ["context-manager"],
            "priority": 5,
            "timeout": 2500,
            "retryPolicy": { "maxAttempts": 1 }
        });
        let config: ComponentConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.id, ComponentId::new("chat-interface"));
        assert_eq!(config.dependencies, vec![ComponentId::new("context-manager")]);
        assert_eq!(config.priority, 5);
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.retry_policy.max_attempts, 1);
        assert_eq!(config.retry_policy.initial_delay, Duration::from_secs(1));
        assert!(config.enabled);
        assert!(!config.auto_start);
    }

    #[test]
    fn unconfigured_component_waits_and_tries_once() {
        let config = ComponentConfig::new("slow", "Slow");
        assert_eq!(config.timeout, None);
        assert_eq!(config.retry_policy, RetryPolicy::none());

        let parsed: ComponentConfig =
            serde_json::from_value(serde_json::json!({ "id": "slow", "name": "Slow" })).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn timeout_survives_serialization() {
        let config = ComponentConfig::new("a", "A").with_timeout(Duration::from_millis(750));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["timeout"], serde_json::json!(750));

        let value = serde_json::to_value(ComponentConfig::new("a", "A")).unwrap();
        assert!(value["timeout"].is_null());
    }

    #[test]
    fn builder_setters() {
        let config = ComponentConfig::new("b", "B")
            .with_dependencies(["a"])
            .with_priority(-1)
            .with_retry_policy(RetryPolicy::none());

        assert_eq!(config.dependencies, vec![ComponentId::new("a")]);
        assert_eq!(config.priority, -1);
        assert_eq!(config.retry_policy.max_attempts, 1);
    }
}
