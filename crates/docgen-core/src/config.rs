//! Engine settings resolved from `DOCGEN_*` environment variables.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::scheduler::{SchedulerConfig, DEFAULT_CANCELLATION_GRACE};

/// Engine-level configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time an agent gets to stop after its deadline before it is aborted.
    pub cancellation_grace: Duration,
    /// Directory-walk depth of the built-in workspace analyzer.
    pub analyzer_max_depth: usize,
}

pub const DEFAULT_ANALYZER_MAX_DEPTH: usize = 12;

const GRACE_VAR: &str = "DOCGEN_CANCELLATION_GRACE_MS";
const DEPTH_VAR: &str = "DOCGEN_ANALYZER_MAX_DEPTH";

fn parse<T>(key: &str, raw: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cancellation_grace: DEFAULT_CANCELLATION_GRACE,
            analyzer_max_depth: DEFAULT_ANALYZER_MAX_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Read `DOCGEN_CANCELLATION_GRACE_MS` and `DOCGEN_ANALYZER_MAX_DEPTH`.
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(GRACE_VAR) {
            config.cancellation_grace = Duration::from_millis(parse(GRACE_VAR, &raw)?);
        }
        if let Some(raw) = lookup(DEPTH_VAR) {
            let depth: usize = parse(DEPTH_VAR, &raw)?;
            if depth == 0 {
                return Err(invalid(DEPTH_VAR, &raw, "must be at least 1"));
            }
            config.analyzer_max_depth = depth;
        }
        Ok(config)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            cancellation_grace: self.cancellation_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.cancellation_grace, DEFAULT_CANCELLATION_GRACE);
        assert_eq!(config.analyzer_max_depth, DEFAULT_ANALYZER_MAX_DEPTH);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DOCGEN_CANCELLATION_GRACE_MS", "40"),
            ("DOCGEN_ANALYZER_MAX_DEPTH", "3"),
        ]))
        .unwrap();
        assert_eq!(config.scheduler().cancellation_grace, Duration::from_millis(40));
        assert_eq!(config.analyzer_max_depth, 3);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("DOCGEN_CANCELLATION_GRACE_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref key, ref value, .. }
                if key == "DOCGEN_CANCELLATION_GRACE_MS" && value == "soon"
        ));

        let err = EngineConfig::from_lookup(lookup(&[("DOCGEN_ANALYZER_MAX_DEPTH", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref key, ref reason, .. }
                if key == "DOCGEN_ANALYZER_MAX_DEPTH" && reason == "must be at least 1"
        ));
    }
}
