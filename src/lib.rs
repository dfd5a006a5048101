//! Imitator of a Modbus-connected UPS for testing monitoring software.
//!
//! The [`ups`] module simulates the charge cycle of a battery-backed UPS, the
//! [`imitator`] module pushes its state to a Modbus device on a fixed period,
//! and [`api`] lets operators inspect and override readings over HTTP.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
pub mod imitator;
pub mod ups;
