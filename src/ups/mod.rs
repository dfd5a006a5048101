//! UPS model: parameter types, measurement jitter, register codec and the
//! charge-cycle engine.

pub mod engine;
pub mod jitter;
pub mod params;
pub mod registers;

pub use engine::{ChargeState, UpsEngine, UpsSettings};
pub use params::{
    Alarms, AlarmsUpdate, BATTERY_COUNT, BatteryParams, BatteryUpdate, ParamsUpdate, UpsParams,
};
pub use registers::{RegisterError, RegisterFrame};
