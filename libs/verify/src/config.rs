use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use converge_api::ConfigError;
use ingest::{KindConfig, PullConfig, PushConfig};

use crate::policy::RetryPolicy;

/// Name looked up by [`HarnessConfig::default_policy`].
pub const DEFAULT_POLICY: &str = "default";

// ---- TOML Config ----

/// Retry policy as written in TOML. Convert with `RetryPolicy::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    20
}
fn default_timeout_ms() -> u64 {
    15_000
}
fn default_poll_interval_ms() -> u64 {
    500
}

impl TryFrom<&RetryPolicyConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(c: &RetryPolicyConfig) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            c.max_attempts,
            Duration::from_millis(c.timeout_ms),
            Duration::from_millis(c.poll_interval_ms),
            Duration::from_millis(c.initial_delay_ms),
        )
    }
}

/// Harness configuration file.
///
/// ```toml
/// [policies.default]
/// max_attempts = 20
/// timeout_ms = 15000
/// poll_interval_ms = 500
///
/// [[kinds]]
/// name = "order-event"
/// suffix = "orders"
///
/// [[pull]]
/// name = "orders"
/// topics = ["prod.orders"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub policies: BTreeMap<String, RetryPolicyConfig>,
    #[serde(default)]
    pub kinds: Vec<KindConfig>,
    #[serde(default)]
    pub pull: Vec<PullConfig>,
    #[serde(default)]
    pub push: Vec<PushConfig>,
}

impl HarnessConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ConfigError::Invalid { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Named policy. An unlisted `"default"` falls back to `RetryPolicy::default()`.
    pub fn policy(&self, name: &str) -> Result<RetryPolicy, ConfigError> {
        match self.policies.get(name) {
            Some(c) => RetryPolicy::try_from(c).map_err(|e| match e {
                ConfigError::InvalidPolicy(detail) => ConfigError::InvalidPolicy(format!("{name}: {detail}")),
                other => other,
            }),
            None if name == DEFAULT_POLICY => Ok(RetryPolicy::default()),
            None => Err(ConfigError::UnknownPolicy(name.to_string())),
        }
    }

    pub fn default_policy(&self) -> Result<RetryPolicy, ConfigError> {
        self.policy(DEFAULT_POLICY)
    }

    /// Check everything that can be checked without connecting anywhere:
    /// policies, kind names and suffixes, ingestor settings and topic routing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.policies.keys() {
            self.policy(name)?;
        }

        let mut names = HashSet::new();
        let mut suffixes: BTreeMap<&str, &str> = BTreeMap::new();
        for kind in &self.kinds {
            if kind.name.is_empty() {
                return Err(ConfigError::Invalid { context: "kinds", detail: "empty kind name".into() });
            }
            if kind.suffix.is_empty() {
                return Err(ConfigError::Invalid {
                    context: "kinds",
                    detail: format!("kind '{}' has an empty suffix", kind.name),
                });
            }
            if !names.insert(kind.name.as_str()) {
                return Err(ConfigError::DuplicateKind(kind.name.clone()));
            }
            if let Some(first) = suffixes.insert(kind.suffix.as_str(), kind.name.as_str()) {
                return Err(ConfigError::DuplicateSuffix {
                    suffix: kind.suffix.clone(),
                    first: first.to_string(),
                    second: kind.name.clone(),
                });
            }
        }

        for pull in &self.pull {
            pull.validate()
                .map_err(|detail| ConfigError::Invalid { context: "pull config", detail })?;
            for topic in &pull.topics {
                if !self.kinds.iter().any(|k| topic.ends_with(&k.suffix)) {
                    return Err(ConfigError::UnroutableTopic(topic.clone()));
                }
            }
        }
        for push in &self.push {
            push.validate()
                .map_err(|detail| ConfigError::Invalid { context: "push config", detail })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [policies.default]
        max_attempts = 10
        timeout_ms = 5000
        poll_interval_ms = 250

        [policies.slow]
        timeout_ms = 60000
        initial_delay_ms = 1000

        [[kinds]]
        name = "order-event"
        suffix = "orders"

        [[kinds]]
        name = "trade-event"
        suffix = "trades"

        [[pull]]
        name = "orders"
        topics = ["prod.orders", "prod.trades"]
        start = "replay"

        [[push]]
        name = "fills"
        subject_pattern = "fills.>"
    "#;

    #[test]
    fn parses_and_validates_sample() {
        let cfg = HarnessConfig::parse(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.kinds.len(), 2);
        assert_eq!(cfg.pull[0].start, ingest::StartPosition::Beginning);

        let slow = cfg.policy("slow").unwrap();
        assert_eq!(slow.max_attempts(), 20);
        assert_eq!(slow.timeout(), Duration::from_secs(60));
        assert_eq!(slow.initial_delay(), Duration::from_secs(1));
        assert_eq!(cfg.default_policy().unwrap().max_attempts(), 10);
    }

    #[test]
    fn unknown_policy_is_an_error_but_default_falls_back() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.default_policy().unwrap(), RetryPolicy::default());
        assert_eq!(cfg.policy("fast"), Err(ConfigError::UnknownPolicy("fast".into())));
    }

    #[test]
    fn invalid_policy_fails_validation() {
        let cfg = HarnessConfig::parse("[policies.broken]\nmax_attempts = 0\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid retry policy: broken: max_attempts must be >= 1");
    }

    #[test]
    fn empty_suffix_fails_validation() {
        let cfg = HarnessConfig::parse(
            r#"
            [[kinds]]
            name = "order-event"
            suffix = ""
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Invalid { context: "kinds", detail: "kind 'order-event' has an empty suffix".into() })
        );
    }

    #[test]
    fn topic_without_matching_suffix_fails_validation() {
        let cfg = HarnessConfig::parse(
            r#"
            [[kinds]]
            name = "order-event"
            suffix = "orders"

            [[pull]]
            topics = ["prod.sessions"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.validate(), Err(ConfigError::UnroutableTopic("prod.sessions".into())));
    }

    #[test]
    fn duplicate_suffix_names_both_kinds() {
        let cfg = HarnessConfig::parse(
            r#"
            [[kinds]]
            name = "a"
            suffix = "orders"
            [[kinds]]
            name = "b"
            suffix = "orders"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateSuffix { suffix: "orders".into(), first: "a".into(), second: "b".into() })
        );
    }
}
