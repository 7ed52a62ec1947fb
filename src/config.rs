use std::str::FromStr;
use std::time::Duration;

use crate::actors::{EmulatorSettings, SupervisorSettings};
use crate::domain::order::DwellPolicy;
use crate::emulator::EmulatorMode;

// ============================================================================
// Configuration - environment variables, optionally from a .env file
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBackend {
    Memory,
    Redpanda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Scylla,
}

impl FromStr for ChannelBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(ChannelBackend::Memory),
            "redpanda" | "kafka" => Ok(ChannelBackend::Redpanda),
            _ => Err("expected memory or redpanda".to_string()),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "scylla" | "scylladb" => Ok(StoreBackend::Scylla),
            _ => Err("expected memory or scylla".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub machine_id: String,
    pub channel_backend: ChannelBackend,
    pub redpanda_brokers: String,
    pub redpanda_group_id: String,
    pub store_backend: StoreBackend,
    pub scylla_node: String,
    pub scylla_keyspace: String,
    pub dwell: DwellPolicy,
    pub dwell_sweep_interval: Duration,
    pub emulator_enabled: bool,
    pub emulator_mode: EmulatorMode,
    pub emulator_time_scale: f64,
    pub dlq_capacity: usize,
}

impl AppConfig {
    /// Read the process environment, after loading `.env` if one exists
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let machine_id = env.string("MACHINE_ID", "vm_001");
        if machine_id.trim().is_empty() || machine_id.contains('/') {
            return Err(ConfigError::Invalid {
                key: "MACHINE_ID",
                value: machine_id,
                reason: "must be non-empty and contain no '/'".to_string(),
            });
        }

        let emulator_time_scale: f64 = env.parse("EMULATOR_TIME_SCALE", 1.0)?;
        if !(emulator_time_scale.is_finite() && emulator_time_scale > 0.0) {
            return Err(ConfigError::Invalid {
                key: "EMULATOR_TIME_SCALE",
                value: emulator_time_scale.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let dlq_capacity: usize = env.parse("DLQ_CAPACITY", 1000)?;
        if dlq_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "DLQ_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: env.parse("PORT", 3000)?,
            machine_id,
            channel_backend: env.parse("CHANNEL_BACKEND", ChannelBackend::Memory)?,
            redpanda_brokers: env.string("REDPANDA_BROKERS", "127.0.0.1:9092"),
            redpanda_group_id: env.string("REDPANDA_GROUP_ID", "dispense-coordinator"),
            store_backend: env.parse("STORE_BACKEND", StoreBackend::Memory)?,
            scylla_node: env.string("SCYLLA_NODE", "127.0.0.1:9042"),
            scylla_keyspace: env.string("SCYLLA_KEYSPACE", "vending_ks"),
            dwell: DwellPolicy {
                pending: Duration::from_secs(env.parse("DWELL_PENDING_SECS", 900)?),
                paid: Duration::from_secs(env.parse("DWELL_PAID_SECS", 300)?),
                dispensing: Duration::from_secs(env.parse("DWELL_DISPENSING_SECS", 120)?),
            },
            dwell_sweep_interval: Duration::from_millis(env.parse("DWELL_SWEEP_INTERVAL_MS", 1000)?),
            emulator_enabled: env.flag("EMULATOR_ENABLED", true)?,
            emulator_mode: env.parse("EMULATOR_MODE", EmulatorMode::Nominal)?,
            emulator_time_scale,
            dlq_capacity,
        })
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            dwell_sweep_interval: self.dwell_sweep_interval,
            dlq_capacity: self.dlq_capacity,
            emulator: self.emulator_enabled.then(|| EmulatorSettings {
                mode: self.emulator_mode.clone(),
                time_scale: self.emulator_time_scale,
            }),
            ..SupervisorSettings::default()
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank both mean "use the default"
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key,
                    value,
                    reason: "expected true or false".to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.machine_id, "vm_001");
        assert_eq!(config.channel_backend, ChannelBackend::Memory);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.scylla_keyspace, "vending_ks");
        assert_eq!(config.dwell.pending, Duration::from_secs(900));
        assert_eq!(config.dwell.paid, Duration::from_secs(300));
        assert_eq!(config.dwell.dispensing, Duration::from_secs(120));
        assert_eq!(config.dwell_sweep_interval, Duration::from_millis(1000));
        assert!(config.emulator_enabled);
        assert_eq!(config.emulator_mode, EmulatorMode::Nominal);
        assert_eq!(config.dlq_capacity, 1000);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("MACHINE_ID", "vm_042"),
            ("CHANNEL_BACKEND", "redpanda"),
            ("STORE_BACKEND", "Scylla"),
            ("DWELL_DISPENSING_SECS", "30"),
            ("EMULATOR_ENABLED", "false"),
            ("EMULATOR_MODE", "fault:Out of cups"),
            ("EMULATOR_TIME_SCALE", "0.5"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.machine_id, "vm_042");
        assert_eq!(config.channel_backend, ChannelBackend::Redpanda);
        assert_eq!(config.store_backend, StoreBackend::Scylla);
        assert_eq!(config.dwell.dispensing, Duration::from_secs(30));
        assert!(!config.emulator_enabled);
        assert_eq!(config.emulator_mode, EmulatorMode::Fault("Out of cups".to_string()));
        assert!(config.supervisor_settings().emulator.is_none());
    }

    #[test]
    fn test_blank_value_uses_default() {
        let config = config(&[("PORT", "  ")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", ref value, .. } if value == "eighty"));

        let err = config(&[("CHANNEL_BACKEND", "mqtt")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CHANNEL_BACKEND", .. }));

        let err = config(&[("EMULATOR_ENABLED", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "EMULATOR_ENABLED", .. }));

        let err = config(&[("EMULATOR_TIME_SCALE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "EMULATOR_TIME_SCALE", .. }));

        let err = config(&[("MACHINE_ID", "vm/1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MACHINE_ID", .. }));

        let err = config(&[("DLQ_CAPACITY", "0")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value \"0\" for DLQ_CAPACITY: must be at least 1");
    }

    #[test]
    fn test_supervisor_settings_carry_emulator() {
        let settings = config(&[("EMULATOR_MODE", "silent"), ("DWELL_SWEEP_INTERVAL_MS", "250")])
            .unwrap()
            .supervisor_settings();

        assert_eq!(settings.dwell_sweep_interval, Duration::from_millis(250));
        assert_eq!(settings.emulator.map(|e| e.mode), Some(EmulatorMode::Silent));
    }
}
