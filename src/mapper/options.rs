use crate::mapper::MapperError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on `worker_count`. Workers occupy blocking-pool threads for
/// the whole call and tokio's default pool holds 512 of them; a larger pool
/// would leave some workers unscheduled while the distributor waits on them.
pub const MAX_WORKER_COUNT: usize = 512;

/// What happens to the rest of the batch once a transform fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure aborts distributor and workers, the call returns an error.
    #[default]
    FailFast,
    /// Failures are collected next to the successful outputs.
    BestEffort,
}

/// Defaults favor tiny bounded inboxes so a worker never races ahead of
/// its own unconsumed items.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(public, setter(into))]
#[serde(default)]
pub struct MapperOptions {
    #[builder(default = "4")]
    pub worker_count: usize,
    #[builder(default = "1")]
    pub inbox_capacity: usize,
    #[builder(default = "1")]
    pub result_buffer: usize,
    #[builder(default)]
    pub failure_policy: FailurePolicy,
    /// Deadline for the whole call. Once it passes, each worker finishes at
    /// most the item it is running. Values beyond what `Instant` can hold
    /// mean no deadline.
    #[builder(default = "None")]
    #[serde(rename = "timeout_secs", with = "timeout_secs")]
    pub timeout: Option<Duration>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            inbox_capacity: 1,
            result_buffer: 1,
            failure_policy: FailurePolicy::FailFast,
            timeout: None,
        }
    }
}

impl MapperOptions {
    /// Reject values that would make distribution impossible.
    pub fn validate(&self) -> Result<(), MapperError> {
        if self.worker_count == 0 {
            return Err(MapperError::InvalidConfiguration(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.worker_count > MAX_WORKER_COUNT {
            return Err(MapperError::InvalidConfiguration(format!(
                "worker_count must be at most {MAX_WORKER_COUNT}, got {}",
                self.worker_count
            )));
        }
        if self.inbox_capacity == 0 {
            return Err(MapperError::InvalidConfiguration(
                "inbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.result_buffer == 0 {
            return Err(MapperError::InvalidConfiguration(
                "result_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker count given as any integer; negative and zero counts are rejected.
pub fn worker_count_from<W>(worker_count: W) -> Result<usize, MapperError>
where
    W: TryInto<usize> + Copy + std::fmt::Display,
{
    match worker_count.try_into() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(MapperError::InvalidConfiguration(format!(
            "worker_count must be a positive integer, got {worker_count}"
        ))),
    }
}

// `timeout_secs: 2.5` in YAML, `None` when absent.
mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        match secs {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_defaults() {
        let options = MapperOptionsBuilder::default().build().unwrap();
        assert_eq!(options, MapperOptions::default());
        assert_eq!(options.worker_count, 4);
        assert_eq!(options.inbox_capacity, 1);
        assert_eq!(options.failure_policy, FailurePolicy::FailFast);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn options_builder_setters() {
        let options = MapperOptionsBuilder::default()
            .worker_count(8usize)
            .failure_policy(FailurePolicy::BestEffort)
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(options.worker_count, 8);
        assert_eq!(options.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut options = MapperOptions {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(MapperError::InvalidConfiguration(_))
        ));

        options.worker_count = MAX_WORKER_COUNT + 1;
        assert!(options.validate().is_err());
        options.worker_count = MAX_WORKER_COUNT;
        assert!(options.validate().is_ok());

        options.worker_count = 2;
        options.result_buffer = 0;
        assert!(options.validate().is_err());

        options.result_buffer = 1;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn huge_timeout_deserializes() {
        let options: MapperOptions =
            serde_yaml::from_str("worker_count: 2\ntimeout_secs: 1.0e19\n").unwrap();
        assert!(options.timeout.is_some());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn worker_count_conversion() {
        assert_eq!(worker_count_from(3i32).unwrap(), 3);
        assert_eq!(worker_count_from(1usize).unwrap(), 1);
        assert!(worker_count_from(0i64).is_err());
        assert!(worker_count_from(-1i32).is_err());
    }
}
