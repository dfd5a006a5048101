//! Modbus register map of the imitated UPS.
//!
//! Holding registers carry big-endian IEEE-754 `f32` values, two 16-bit
//! registers each. Every battery slot owns a block of `0x10` registers of
//! which only the first six are used; the rest stay zero. Alarms live in the
//! coil region, one bit per flag.

use thiserror::Error;

use super::params::{Alarms, BATTERY_COUNT, BatteryParams, UpsParams};

pub const REG_INPUT_AC_VOLTAGE: u16 = 0x0000;
pub const REG_INPUT_AC_CURRENT: u16 = 0x0002;
pub const REG_BAT_GROUP_VOLTAGE: u16 = 0x0004;
pub const REG_BAT_GROUP_CURRENT: u16 = 0x0006;
/// First register of battery slot 0.
pub const REG_BATTERY_BASE: u16 = 0x0010;
/// Register distance between consecutive battery slots.
pub const REG_BATTERY_STRIDE: u16 = 0x0010;
/// Offsets inside a battery block.
pub const REG_BATTERY_VOLTAGE: u16 = 0x0000;
pub const REG_BATTERY_TEMP: u16 = 0x0002;
pub const REG_BATTERY_RESIST: u16 = 0x0004;

pub const COIL_ON_BATTERY_POWER: u16 = 0x0000;
pub const COIL_LOW_BATTERY: u16 = 0x0001;
pub const COIL_OVERLOAD: u16 = 0x0002;
/// Number of alarm coils written per frame.
pub const ALARM_COIL_COUNT: u16 = 3;

const LAST_BATTERY_REGISTER: u16 =
    REG_BATTERY_BASE + REG_BATTERY_STRIDE * (BATTERY_COUNT as u16 - 1) + REG_BATTERY_RESIST;

/// Size of the holding register payload in bytes (140 for four batteries).
pub const REGISTER_BYTES: usize = (LAST_BATTERY_REGISTER as usize + 2) * 2;

/// Number of holding registers written per frame.
pub const REGISTER_COUNT: u16 = (REGISTER_BYTES / 2) as u16;

/// Errors raised while parsing wire buffers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register buffer must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// The part of [`UpsParams`] that is visible in the holding registers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegisterFrame {
    pub input_ac_voltage: f32,
    pub input_ac_current: f32,
    pub bat_group_voltage: f32,
    pub bat_group_current: f32,
    pub batteries: [BatteryParams; BATTERY_COUNT],
}

impl From<&UpsParams> for RegisterFrame {
    fn from(params: &UpsParams) -> Self {
        Self {
            input_ac_voltage: params.input_ac_voltage,
            input_ac_current: params.input_ac_current,
            bat_group_voltage: params.bat_group_voltage,
            bat_group_current: params.bat_group_current,
            batteries: params.batteries,
        }
    }
}

impl RegisterFrame {
    /// Serializes the frame into the holding register payload.
    pub fn encode(&self) -> [u8; REGISTER_BYTES] {
        let mut buf = [0u8; REGISTER_BYTES];
        put_f32(&mut buf, REG_INPUT_AC_VOLTAGE, self.input_ac_voltage);
        put_f32(&mut buf, REG_INPUT_AC_CURRENT, self.input_ac_current);
        put_f32(&mut buf, REG_BAT_GROUP_VOLTAGE, self.bat_group_voltage);
        put_f32(&mut buf, REG_BAT_GROUP_CURRENT, self.bat_group_current);
        for (slot, battery) in self.batteries.iter().enumerate() {
            let base = battery_block(slot);
            put_f32(&mut buf, base + REG_BATTERY_VOLTAGE, battery.voltage);
            put_f32(&mut buf, base + REG_BATTERY_TEMP, battery.temperature);
            put_f32(&mut buf, base + REG_BATTERY_RESIST, battery.internal_resistance);
        }
        buf
    }

    /// Parses a holding register payload produced by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Length`] if `buf` is not exactly
    /// [`REGISTER_BYTES`] long.
    pub fn decode(buf: &[u8]) -> Result<Self, RegisterError> {
        if buf.len() != REGISTER_BYTES {
            return Err(RegisterError::Length {
                expected: REGISTER_BYTES,
                actual: buf.len(),
            });
        }

        let mut batteries = [BatteryParams::default(); BATTERY_COUNT];
        for (slot, battery) in batteries.iter_mut().enumerate() {
            let base = battery_block(slot);
            *battery = BatteryParams {
                voltage: get_f32(buf, base + REG_BATTERY_VOLTAGE),
                temperature: get_f32(buf, base + REG_BATTERY_TEMP),
                internal_resistance: get_f32(buf, base + REG_BATTERY_RESIST),
            };
        }

        Ok(Self {
            input_ac_voltage: get_f32(buf, REG_INPUT_AC_VOLTAGE),
            input_ac_current: get_f32(buf, REG_INPUT_AC_CURRENT),
            bat_group_voltage: get_f32(buf, REG_BAT_GROUP_VOLTAGE),
            bat_group_current: get_f32(buf, REG_BAT_GROUP_CURRENT),
            batteries,
        })
    }
}

/// Packs the alarm flags into the coil byte: bit 0 on battery power, bit 1
/// low battery, bit 2 overload.
pub fn encode_alarm_coils(alarms: &Alarms) -> u8 {
    (u8::from(alarms.on_battery_power) << COIL_ON_BATTERY_POWER)
        | (u8::from(alarms.low_battery) << COIL_LOW_BATTERY)
        | (u8::from(alarms.overload) << COIL_OVERLOAD)
}

/// Inverse of [`encode_alarm_coils`]. Bits above bit 2 are ignored.
pub fn decode_alarm_coils(bits: u8) -> Alarms {
    let flag = |coil: u16| (bits >> coil) & 1 == 1;
    Alarms {
        on_battery_power: flag(COIL_ON_BATTERY_POWER),
        low_battery: flag(COIL_LOW_BATTERY),
        overload: flag(COIL_OVERLOAD),
    }
}

fn battery_block(slot: usize) -> u16 {
    REG_BATTERY_BASE + REG_BATTERY_STRIDE * slot as u16
}

fn put_f32(buf: &mut [u8], register: u16, value: f32) {
    let offset = usize::from(register) * 2;
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn get_f32(buf: &[u8], register: u16) -> f32 {
    let offset = usize::from(register) * 2;
    f32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
