use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay before a retry grows with the attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,

    /// Delay doubles after each failed attempt
    Exponential,

    /// Any kind this queue does not recognize; retries use the default delay
    #[serde(other)]
    Unknown,
}

impl BackoffKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            _ => Err(format!("Invalid backoff kind: {}", s)),
        }
    }
}

/// Retry delay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    #[serde(alias = "type")]
    pub kind: BackoffKind,

    /// Base delay, serialized in milliseconds
    #[serde(alias = "delay", with = "duration_ms")]
    pub base_delay: Duration,
}

impl Backoff {
    pub fn fixed(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay,
        }
    }

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(2000))
    }
}

/// Fully resolved per-job options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Total number of executions allowed, first run included
    pub max_attempts: u32,

    pub backoff: Backoff,
}

impl JobOptions {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Overlay a producer patch on top of these options.
    ///
    /// An attempt count of 0 counts as unset: every job runs at least once.
    pub fn merge(&self, patch: &JobOptionsPatch) -> Self {
        Self {
            max_attempts: patch.attempts.filter(|&n| n > 0).unwrap_or(self.max_attempts),
            backoff: patch.backoff.unwrap_or(self.backoff),
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Producer-supplied overrides; unset fields fall back to the queue defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptionsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
}

impl JobOptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_overrides_only_set_fields() {
        let defaults = JobOptions::new(5, Backoff::exponential(Duration::from_millis(5000)));

        let merged = defaults.merge(&JobOptionsPatch::new().with_attempts(2));
        assert_eq!(merged.max_attempts, 2);
        assert_eq!(merged.backoff, defaults.backoff);

        let merged = defaults.merge(&JobOptionsPatch::default());
        assert_eq!(merged, defaults);
    }

    #[test]
    fn zero_attempts_override_keeps_default() {
        let defaults = JobOptions::new(5, Backoff::default());
        let merged = defaults.merge(&JobOptionsPatch::new().with_attempts(0));
        assert_eq!(merged.max_attempts, 5);
    }

    #[test]
    fn backoff_accepts_request_style_json() {
        let backoff: Backoff = serde_json::from_value(json!({"kind": "fixed", "baseDelay": 100})).unwrap();
        assert_eq!(backoff, Backoff::fixed(Duration::from_millis(100)));

        // Bull-style field names used by existing callers
        let backoff: Backoff = serde_json::from_value(json!({"type": "exponential", "delay": 2000})).unwrap();
        assert_eq!(backoff, Backoff::exponential(Duration::from_secs(2)));
    }

    #[test]
    fn unrecognized_backoff_kind_deserializes_to_unknown() {
        let backoff: Backoff = serde_json::from_value(json!({"kind": "linear", "baseDelay": 10})).unwrap();
        assert_eq!(backoff.kind, BackoffKind::Unknown);
    }

    #[test]
    fn patch_from_partial_json() {
        let patch: JobOptionsPatch = serde_json::from_value(json!({"attempts": 2})).unwrap();
        assert_eq!(patch.attempts, Some(2));
        assert!(patch.backoff.is_none());
    }
}
