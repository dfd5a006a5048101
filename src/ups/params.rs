//! UPS parameter model: electrical readings, per-battery readings and alarms,
//! together with the partial-update forms operators send.
//!
//! JSON field names follow the control surface contract, so a few Rust names
//! differ from their serialized form (`temperature` → `temp`,
//! `on_battery_power` → `upc_in_battery_mode`, ...).

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::jitter::{BATTERY_DEVIATION, ELECTRICAL_DEVIATION, simulate_measurement_error_with};

/// Number of battery slots in one UPS. Slot index is the physical position.
pub const BATTERY_COUNT: usize = 4;

/// Readings of a single battery unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryParams {
    /// Terminal voltage (V).
    pub voltage: f32,
    /// Temperature (°C).
    #[serde(rename = "temp")]
    pub temperature: f32,
    /// Internal resistance (mΩ).
    #[serde(rename = "resist")]
    pub internal_resistance: f32,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            voltage: 13.5,
            temperature: 24.0,
            internal_resistance: 5.0,
        }
    }
}

impl BatteryParams {
    /// Overwrites every field that is present in `update`.
    pub fn apply(&mut self, update: &BatteryUpdate) {
        if let Some(voltage) = update.voltage {
            self.voltage = voltage;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(resistance) = update.internal_resistance {
            self.internal_resistance = resistance;
        }
    }
}

/// Partial update of a battery slot. Absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryUpdate {
    #[serde(default)]
    pub voltage: Option<f32>,
    #[serde(default, rename = "temp")]
    pub temperature: Option<f32>,
    #[serde(default, rename = "resist")]
    pub internal_resistance: Option<f32>,
}

/// Alarm flags reported over the coil region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarms {
    /// The UPS is feeding the load from its batteries.
    #[serde(rename = "upc_in_battery_mode")]
    pub on_battery_power: bool,
    /// State of charge dropped below the configured threshold.
    pub low_battery: bool,
    pub overload: bool,
}

impl Alarms {
    /// Overwrites every flag that is present in `update`.
    pub fn apply(&mut self, update: &AlarmsUpdate) {
        if let Some(on_battery_power) = update.on_battery_power {
            self.on_battery_power = on_battery_power;
        }
        if let Some(low_battery) = update.low_battery {
            self.low_battery = low_battery;
        }
        if let Some(overload) = update.overload {
            self.overload = overload;
        }
    }
}

/// Partial update of the alarm flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmsUpdate {
    #[serde(default, rename = "upc_in_battery_mode")]
    pub on_battery_power: Option<bool>,
    #[serde(default)]
    pub low_battery: Option<bool>,
    #[serde(default)]
    pub overload: Option<bool>,
}

/// Complete state of one simulated UPS.
///
/// Invariants maintained by the charge-cycle engine after every
/// recalculation: `0 <= remaining_bat_capacity <= bat_capacity` and
/// `soc == remaining_bat_capacity / bat_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpsParams {
    /// Mains input voltage (V). Zero while running on batteries.
    pub input_ac_voltage: f32,
    /// Mains input current (A).
    pub input_ac_current: f32,
    /// Battery group voltage (V).
    pub bat_group_voltage: f32,
    /// Battery group current (A). Negative while discharging.
    pub bat_group_current: f32,
    /// Current drawn by the load (A).
    pub load_current: f32,
    /// Nominal battery capacity (Ah).
    #[serde(rename = "battery_capacity")]
    pub bat_capacity: f32,
    /// Charge left in the batteries (Ah).
    #[serde(rename = "remaining_battery_capacity")]
    pub remaining_bat_capacity: f32,
    /// State of charge as a fraction (0.0 to 1.0).
    pub soc: f32,
    pub batteries: [BatteryParams; BATTERY_COUNT],
    pub alarms: Alarms,
}

impl UpsParams {
    /// Overwrites every electrical reading that is present in `update`.
    ///
    /// Derived quantities are not recomputed.
    pub fn apply(&mut self, update: &ParamsUpdate) {
        if let Some(voltage) = update.input_ac_voltage {
            self.input_ac_voltage = voltage;
        }
        if let Some(current) = update.input_ac_current {
            self.input_ac_current = current;
        }
        if let Some(voltage) = update.bat_group_voltage {
            self.bat_group_voltage = voltage;
        }
        if let Some(current) = update.bat_group_current {
            self.bat_group_current = current;
        }
    }

    /// Returns a copy as a measuring instrument would report it.
    ///
    /// Electrical aggregates get ±2% error, battery readings ±4%. Capacity,
    /// state of charge and alarms are copied as is.
    pub fn with_measurement_error(&self) -> Self {
        self.with_measurement_error_from(&mut rand::rng())
    }

    /// Same as [`Self::with_measurement_error`] but draws from `rng`.
    pub fn with_measurement_error_from<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut jitter =
            |deviation: f32, value: f32| simulate_measurement_error_with(&mut *rng, deviation, value);

        let input_ac_voltage = jitter(ELECTRICAL_DEVIATION, self.input_ac_voltage);
        let input_ac_current = jitter(ELECTRICAL_DEVIATION, self.input_ac_current);
        let bat_group_voltage = jitter(ELECTRICAL_DEVIATION, self.bat_group_voltage);
        let bat_group_current = jitter(ELECTRICAL_DEVIATION, self.bat_group_current);
        let load_current = jitter(ELECTRICAL_DEVIATION, self.load_current);
        let batteries = self.batteries.map(|battery| BatteryParams {
            voltage: jitter(BATTERY_DEVIATION, battery.voltage),
            temperature: jitter(BATTERY_DEVIATION, battery.temperature),
            internal_resistance: jitter(BATTERY_DEVIATION, battery.internal_resistance),
        });

        Self {
            input_ac_voltage,
            input_ac_current,
            bat_group_voltage,
            bat_group_current,
            load_current,
            batteries,
            ..*self
        }
    }
}

/// Partial update of the UPS-level electrical readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsUpdate {
    #[serde(default)]
    pub input_ac_voltage: Option<f32>,
    #[serde(default)]
    pub input_ac_current: Option<f32>,
    #[serde(default)]
    pub bat_group_voltage: Option<f32>,
    #[serde(default)]
    pub bat_group_current: Option<f32>,
}
