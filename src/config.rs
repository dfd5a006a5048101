//! TOML-based imitator configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ups::engine::UpsSettings;

/// Imitator configuration parsed from TOML.
///
/// Every key except `ups_unit_id` is required. Load from a file with
/// [`ImitatorConfig::load`], which also runs [`ImitatorConfig::validate`];
/// downstream components trust a validated config and never re-check it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImitatorConfig {
    /// Modbus TCP endpoint of the monitored device (`host:port`).
    pub ups_addr: String,
    /// Modbus unit identifier used in every request.
    #[serde(default = "default_unit_id")]
    pub ups_unit_id: u8,
    /// Bind address of the REST control surface.
    pub rest_api_bind_addr: String,
    /// Telemetry push period (seconds).
    pub ups_sync_interval: u64,
    /// Pause between the end of a charge or discharge and the next phase (seconds).
    pub cycle_change_timeout: u64,
    /// Mains voltage while on AC power (V).
    pub default_input_ac_voltage: f32,
    /// Battery group voltage at full charge (V).
    pub max_bat_group_voltage: f32,
    /// Battery group voltage when empty (V).
    pub min_bat_group_voltage: f32,
    /// Constant load power (W).
    pub load_power: f32,
    /// Nominal battery capacity (Ah).
    pub default_bat_capacity: f32,
    /// Charging current ceiling (A).
    pub charge_current_limit: f32,
    /// State of charge below which the low battery alarm fires (fraction).
    pub low_soc_trigger_alarm: f32,
}

fn default_unit_id() -> u8 {
    1
}

impl Default for ImitatorConfig {
    fn default() -> Self {
        Self {
            ups_addr: "127.0.0.1:502".to_string(),
            ups_unit_id: default_unit_id(),
            rest_api_bind_addr: "127.0.0.1:8080".to_string(),
            ups_sync_interval: 1,
            cycle_change_timeout: 60,
            default_input_ac_voltage: 220.0,
            max_bat_group_voltage: 54.0,
            min_bat_group_voltage: 42.0,
            load_power: 1000.0,
            default_bat_capacity: 50.0,
            charge_current_limit: 20.0,
            low_soc_trigger_alarm: 0.2,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Config key (e.g., `"load_power"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ImitatorConfig {
    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns every problem found: a single read/parse error, or all
    /// validation failures at once.
    pub fn load(path: &Path) -> Result<Self, Vec<ConfigError>> {
        let config = Self::from_toml_file(path).map_err(|e| vec![e])?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }

    /// Parses a config from a TOML file without validating it.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a config from a TOML string without validating it.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, a required key is
    /// missing, or an unknown key is present.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.ups_addr.trim().is_empty() {
            errors.push(ConfigError::new("ups_addr", "must not be empty"));
        }
        if !is_host_port(&self.rest_api_bind_addr) {
            errors.push(ConfigError::new(
                "rest_api_bind_addr",
                format!(
                    "must be host:port like 0.0.0.0:8080 or localhost:8080, got \"{}\"",
                    self.rest_api_bind_addr
                ),
            ));
        }
        if self.ups_sync_interval < 1 {
            errors.push(ConfigError::new("ups_sync_interval", "must be >= 1 second"));
        }
        if self.cycle_change_timeout < 1 {
            errors.push(ConfigError::new(
                "cycle_change_timeout",
                "must be >= 1 second",
            ));
        }

        check_range(
            &mut errors,
            "default_input_ac_voltage",
            self.default_input_ac_voltage,
            150.0,
            300.0,
        );
        check_range(
            &mut errors,
            "max_bat_group_voltage",
            self.max_bat_group_voltage,
            52.0,
            100.0,
        );
        check_range(
            &mut errors,
            "min_bat_group_voltage",
            self.min_bat_group_voltage,
            12.0,
            50.0,
        );
        check_range(&mut errors, "load_power", self.load_power, 100.0, 200_000.0);
        check_range(
            &mut errors,
            "default_bat_capacity",
            self.default_bat_capacity,
            10.0,
            1000.0,
        );
        check_range(
            &mut errors,
            "charge_current_limit",
            self.charge_current_limit,
            10.0,
            500.0,
        );
        if !(self.low_soc_trigger_alarm > 0.0 && self.low_soc_trigger_alarm <= 0.5) {
            errors.push(ConfigError::new(
                "low_soc_trigger_alarm",
                format!("must be in (0.0, 0.5], got {}", self.low_soc_trigger_alarm),
            ));
        }

        errors
    }

    /// Telemetry push period.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.ups_sync_interval)
    }

    /// Physical settings consumed by the charge-cycle engine.
    pub fn ups_settings(&self) -> UpsSettings {
        UpsSettings {
            cycle_change_timeout: Duration::from_secs(self.cycle_change_timeout),
            default_input_ac_voltage: self.default_input_ac_voltage,
            max_bat_group_voltage: self.max_bat_group_voltage,
            min_bat_group_voltage: self.min_bat_group_voltage,
            load_power: self.load_power,
            default_bat_capacity: self.default_bat_capacity,
            charge_current_limit: self.charge_current_limit,
            low_soc_trigger_alarm: self.low_soc_trigger_alarm,
        }
    }
}

fn check_range(errors: &mut Vec<ConfigError>, field: &str, value: f32, min: f32, max: f32) {
    // written so that NaN fails too
    if !(value >= min && value <= max) {
        errors.push(ConfigError::new(
            field,
            format!("must be in [{min}, {max}], got {value}"),
        ));
    }
}

/// `host:port` as accepted by the listener; the host may be a name.
fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.trim().is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
