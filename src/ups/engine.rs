//! Charge-cycle engine: the state machine that moves a UPS through
//! charged → discharging → discharged → charging and back, recomputing the
//! electrical readings on every tick.
//!
//! All mutable state sits behind a single mutex. Every public method takes
//! the lock for its whole critical section, so callers never observe a
//! partially updated [`UpsParams`].

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::error::ImitatorError;

use super::params::{
    Alarms, AlarmsUpdate, BATTERY_COUNT, BatteryParams, BatteryUpdate, ParamsUpdate, UpsParams,
};

/// Battery current drawn while discharging, relative to the load current.
const DISCHARGE_CURRENT_FACTOR: f32 = 1.1;
/// Input power overhead on top of load and charging power.
const INPUT_POWER_FACTOR: f32 = 1.1;
/// Slope of the group voltage curve while charging, relative to discharging.
const CHARGE_VOLTAGE_SLOPE: f32 = 1.25;
/// State of charge from which the charging current starts to taper.
const TAPER_START_SOC: f32 = 0.8;
/// Taper steepness: the factor drops by this much per unit of SOC above the start.
const TAPER_SLOPE: f32 = 4.0;

/// Physical settings of the imitated UPS, taken from the validated config.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsSettings {
    pub cycle_change_timeout: Duration,
    pub default_input_ac_voltage: f32,
    pub max_bat_group_voltage: f32,
    pub min_bat_group_voltage: f32,
    pub load_power: f32,
    pub default_bat_capacity: f32,
    pub charge_current_limit: f32,
    pub low_soc_trigger_alarm: f32,
}

impl UpsSettings {
    /// Snapshot of a fully charged UPS running on mains power.
    pub fn default_params(&self) -> UpsParams {
        UpsParams {
            input_ac_voltage: self.default_input_ac_voltage,
            input_ac_current: self.load_power * INPUT_POWER_FACTOR
                / self.default_input_ac_voltage,
            bat_group_voltage: self.max_bat_group_voltage,
            bat_group_current: 0.0,
            load_current: self.load_power / self.max_bat_group_voltage,
            bat_capacity: self.default_bat_capacity,
            remaining_bat_capacity: self.default_bat_capacity,
            soc: 1.0,
            batteries: [BatteryParams::default(); BATTERY_COUNT],
            alarms: Alarms::default(),
        }
    }
}

/// Phase of the charge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    Charged,
    Discharging,
    Discharged,
    Charging,
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChargeState::Charged => "charged",
            ChargeState::Discharging => "discharging",
            ChargeState::Discharged => "discharged",
            ChargeState::Charging => "charging",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct CycleState {
    charge_state: ChargeState,
    last_update: Instant,
    /// When the last charge or discharge completed.
    cycle_done: Instant,
    params: UpsParams,
}

impl CycleState {
    fn fresh(settings: &UpsSettings, now: Instant) -> Self {
        Self {
            charge_state: ChargeState::Charged,
            last_update: now,
            cycle_done: now,
            params: settings.default_params(),
        }
    }

    fn set_state(&mut self, next: ChargeState) {
        info!(from = %self.charge_state, to = %next, soc = self.params.soc, "charge state changed");
        self.charge_state = next;
    }

    fn cycle_timed_out(&self, settings: &UpsSettings, now: Instant) -> bool {
        now.saturating_duration_since(self.cycle_done) > settings.cycle_change_timeout
    }

    fn elapsed_hours(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.last_update).as_secs_f32() / 3600.0
    }

    fn recalculate(&mut self, settings: &UpsSettings, now: Instant) {
        match self.charge_state {
            ChargeState::Charged => {
                if self.cycle_timed_out(settings, now) {
                    let p = &mut self.params;
                    p.input_ac_voltage = 0.0;
                    p.input_ac_current = 0.0;
                    recalc_load_current(p, settings);
                    p.bat_group_current = -p.load_current * DISCHARGE_CURRENT_FACTOR;
                    p.alarms.on_battery_power = true;
                    self.set_state(ChargeState::Discharging);
                }
            }
            ChargeState::Discharging => {
                let spent_ah = self.params.bat_group_current * self.elapsed_hours(now);
                self.params.remaining_bat_capacity += spent_ah;

                if self.params.remaining_bat_capacity < 0.0 {
                    let p = &mut self.params;
                    p.remaining_bat_capacity = 0.0;
                    p.soc = 0.0;
                    p.load_current = 0.0;
                    p.bat_group_current = 0.0;
                    self.cycle_done = now;
                    self.set_state(ChargeState::Discharged);
                } else {
                    let p = &mut self.params;
                    recalc_soc(p);
                    recalc_bat_group_voltage(p, settings);
                    recalc_load_current(p, settings);
                    p.bat_group_current = -p.load_current * DISCHARGE_CURRENT_FACTOR;
                    recalc_input_ac_current(p, settings);
                    if p.soc < settings.low_soc_trigger_alarm {
                        p.alarms.low_battery = true;
                    }
                }
            }
            ChargeState::Discharged => {
                if self.cycle_timed_out(settings, now) {
                    let p = &mut self.params;
                    p.input_ac_voltage = settings.default_input_ac_voltage;
                    p.bat_group_current = settings.charge_current_limit;
                    recalc_load_current(p, settings);
                    recalc_input_ac_current(p, settings);
                    p.alarms = Alarms::default();
                    self.set_state(ChargeState::Charging);
                }
            }
            ChargeState::Charging => {
                let received_ah = self.params.bat_group_current * self.elapsed_hours(now);
                self.params.remaining_bat_capacity += received_ah;

                if self.params.remaining_bat_capacity > self.params.bat_capacity {
                    let p = &mut self.params;
                    p.remaining_bat_capacity = p.bat_capacity;
                    p.soc = 1.0;
                    p.bat_group_current = 0.0;
                    self.cycle_done = now;
                    self.set_state(ChargeState::Charged);
                } else {
                    let p = &mut self.params;
                    recalc_soc(p);
                    recalc_bat_group_voltage(p, settings);
                    recalc_load_current(p, settings);
                    recalc_charging_current(p, settings);
                    recalc_input_ac_current(p, settings);
                }
            }
        }

        recalc_battery_voltages(&mut self.params);
        self.last_update = now;
    }
}

fn recalc_load_current(p: &mut UpsParams, settings: &UpsSettings) {
    p.load_current = settings.load_power / p.bat_group_voltage;
}

fn recalc_soc(p: &mut UpsParams) {
    p.soc = p.remaining_bat_capacity / p.bat_capacity;
}

/// Group voltage follows SOC linearly; the charge curve is steeper so the
/// voltage reaches its ceiling before the batteries are full.
fn recalc_bat_group_voltage(p: &mut UpsParams, settings: &UpsSettings) {
    let span = settings.max_bat_group_voltage - settings.min_bat_group_voltage;
    let slope = if p.bat_group_current < 0.0 {
        1.0
    } else {
        CHARGE_VOLTAGE_SLOPE
    };
    let voltage = settings.min_bat_group_voltage + slope * p.soc * span;
    p.bat_group_voltage = voltage.min(settings.max_bat_group_voltage);
}

fn recalc_input_ac_current(p: &mut UpsParams, settings: &UpsSettings) {
    if p.input_ac_voltage == 0.0 {
        p.input_ac_current = 0.0;
        return;
    }
    let total_power =
        INPUT_POWER_FACTOR * (settings.load_power + p.bat_group_voltage * p.bat_group_current);
    p.input_ac_current = total_power / p.input_ac_voltage;
}

fn recalc_charging_current(p: &mut UpsParams, settings: &UpsSettings) {
    p.bat_group_current = settings.charge_current_limit * charge_taper(p.soc);
}

/// Fraction of the charge current limit allowed at `soc`.
fn charge_taper(soc: f32) -> f32 {
    if soc < TAPER_START_SOC {
        1.0
    } else {
        (1.0 - TAPER_SLOPE * (soc - TAPER_START_SOC)).clamp(0.0, 1.0)
    }
}

fn recalc_battery_voltages(p: &mut UpsParams) {
    let per_battery = p.bat_group_voltage / BATTERY_COUNT as f32;
    for battery in &mut p.batteries {
        battery.voltage = per_battery;
    }
}

/// Owner of the simulated UPS state.
///
/// Methods that read the clock come in pairs: the plain form uses
/// [`Instant::now`], the `_at` form takes the instant explicitly.
#[derive(Debug)]
pub struct UpsEngine {
    settings: UpsSettings,
    state: Mutex<CycleState>,
}

impl UpsEngine {
    /// Creates an engine holding the default snapshot in the charged state.
    pub fn new(settings: UpsSettings) -> Self {
        Self::new_at(settings, Instant::now())
    }

    pub fn new_at(settings: UpsSettings, now: Instant) -> Self {
        let state = Mutex::new(CycleState::fresh(&settings, now));
        Self { settings, state }
    }

    pub fn settings(&self) -> &UpsSettings {
        &self.settings
    }

    /// Restores the default snapshot and restarts the cycle from charged.
    pub fn reset(&self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&self, now: Instant) {
        *self.state.lock() = CycleState::fresh(&self.settings, now);
        info!("UPS state reset to defaults");
    }

    /// Advances the simulation to now and returns the resulting snapshot.
    pub fn recalculate(&self) -> UpsParams {
        self.recalculate_at(Instant::now())
    }

    pub fn recalculate_at(&self, now: Instant) -> UpsParams {
        let mut state = self.state.lock();
        state.recalculate(&self.settings, now);
        state.params
    }

    /// Copy of the authoritative state.
    pub fn snapshot(&self) -> UpsParams {
        self.state.lock().params
    }

    pub fn charge_state(&self) -> ChargeState {
        self.state.lock().charge_state
    }

    /// Applies an operator override of the UPS-level readings.
    ///
    /// Nothing is recomputed; the next tick in auto mode overwrites the values.
    pub fn update_params(&self, update: &ParamsUpdate) {
        self.state.lock().params.apply(update);
    }

    /// Applies an operator override to one battery slot.
    ///
    /// # Errors
    ///
    /// Returns [`ImitatorError::OutOfRange`] if `slot >= BATTERY_COUNT`.
    pub fn update_battery(&self, slot: usize, update: &BatteryUpdate) -> Result<(), ImitatorError> {
        let mut state = self.state.lock();
        let battery = state
            .params
            .batteries
            .get_mut(slot)
            .ok_or(ImitatorError::OutOfRange {
                what: "battery",
                index: slot,
                len: BATTERY_COUNT,
            })?;
        battery.apply(update);
        Ok(())
    }

    pub fn update_alarms(&self, update: &AlarmsUpdate) {
        self.state.lock().params.alarms.apply(update);
    }

    #[cfg(test)]
    fn with_state<T>(&self, f: impl FnOnce(&mut CycleState) -> T) -> T {
        f(&mut self.state.lock())
    }
}
