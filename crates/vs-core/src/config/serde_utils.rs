//! Shared serialization/deserialization utilities for configuration
//!
//! Durations are written as plain integers so the TOML file stays readable:
//! toolkit timeouts in seconds, migration timings in minutes.

/// Duration serialized as whole seconds (u64)
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "vs_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Duration serialized as whole minutes (u64). Sub-minute values round down.
pub mod duration_mins {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs() / 60)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mins = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(mins.saturating_mul(60)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(with = "duration_mins")]
        delay: Duration,
    }

    #[test]
    fn test_durations_serialize() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
            delay: Duration::from_secs(300),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":30,"delay":5}"#);
    }

    #[test]
    fn test_durations_deserialize() {
        let json = r#"{"timeout":60,"delay":2}"#;
        let config: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.delay, Duration::from_secs(120));
    }
}
