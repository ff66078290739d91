use std::path::PathBuf;

use crate::schedule::{ScheduleConfig, SlotMinutes};

/// Process configuration, read once from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub schedule: ScheduleConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "invalid {var}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take their
    /// defaults; set but malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let slot_minutes: u32 = parse(&lookup, "SLOTBOOK_SLOT_MINUTES")?.unwrap_or(60);
        let slot = SlotMinutes::new(slot_minutes).map_err(|reason| ConfigError::Invalid {
            var: "SLOTBOOK_SLOT_MINUTES",
            value: slot_minutes.to_string(),
            reason,
        })?;
        let max_connections = parse(&lookup, "SLOTBOOK_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "SLOTBOOK_MAX_CONNECTIONS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Config {
            bind: lookup("SLOTBOOK_BIND").unwrap_or(defaults.bind),
            port: parse(&lookup, "SLOTBOOK_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("SLOTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections,
            compact_threshold: parse(&lookup, "SLOTBOOK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse(&lookup, "SLOTBOOK_METRICS_PORT")?,
            schedule: ScheduleConfig {
                slot,
                strict_deletes: parse_bool(&lookup, "SLOTBOOK_STRICT_DELETES")?.unwrap_or(false),
            },
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        })
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.schedule.slot.get(), 60);
        assert!(!cfg.schedule.strict_deletes);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/slotbook.wal"));
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("SLOTBOOK_PORT", "6000"),
            ("SLOTBOOK_DATA_DIR", "/tmp/sb"),
            ("SLOTBOOK_SLOT_MINUTES", "30"),
            ("SLOTBOOK_STRICT_DELETES", "TRUE"),
            ("SLOTBOOK_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/sb"));
        assert_eq!(cfg.schedule.slot.get(), 30);
        assert!(cfg.schedule.strict_deletes);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn rejects_slot_that_does_not_divide_a_day() {
        let err = config(&[("SLOTBOOK_SLOT_MINUTES", "7")]).unwrap_err();
        assert!(err.to_string().contains("SLOTBOOK_SLOT_MINUTES"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config(&[("SLOTBOOK_PORT", "http")]).is_err());
        assert!(config(&[("SLOTBOOK_STRICT_DELETES", "maybe")]).is_err());
        assert!(config(&[("SLOTBOOK_MAX_CONNECTIONS", "0")]).is_err());
        assert!(config(&[("SLOTBOOK_SLOT_MINUTES", "-60")]).is_err());
    }
}
