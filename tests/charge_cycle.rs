mod common;

use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use ups_imitator::ups::registers::{
    REGISTER_BYTES, RegisterFrame, decode_alarm_coils, encode_alarm_coils,
};
use ups_imitator::ups::{ChargeState, UpsEngine};

const STEP: Duration = Duration::from_secs(30);
const MAX_STEPS: usize = 10_000;

/// Runs the engine until it has entered `target`, checking invariants on
/// every step. Returns the instant of the transition.
fn run_until(
    engine: &UpsEngine,
    mut now: Instant,
    target: ChargeState,
    seen: &mut Vec<ChargeState>,
) -> Instant {
    for _ in 0..MAX_STEPS {
        now += STEP;
        let params = engine.recalculate_at(now);
        common::assert_physical_invariants(&params, engine.settings());

        let state = engine.charge_state();
        if seen.last() != Some(&state) {
            seen.push(state);
        }
        if state == target {
            return now;
        }
    }
    panic!("engine never reached {target}; visited {seen:?}");
}

#[test]
fn two_full_cycles_keep_invariants() {
    let t0 = Instant::now();
    let engine = UpsEngine::new_at(common::fast_cycle_settings(), t0);
    let mut seen = vec![ChargeState::Charged];

    let mut now = t0;
    for _ in 0..2 {
        now = run_until(&engine, now, ChargeState::Discharging, &mut seen);
        now = run_until(&engine, now, ChargeState::Discharged, &mut seen);
        now = run_until(&engine, now, ChargeState::Charging, &mut seen);
        now = run_until(&engine, now, ChargeState::Charged, &mut seen);
    }

    use ChargeState::*;
    assert_eq!(
        seen,
        vec![
            Charged,
            Discharging,
            Discharged,
            Charging,
            Charged,
            Discharging,
            Discharged,
            Charging,
            Charged
        ]
    );
    let params = engine.snapshot();
    assert_eq!(params.soc, 1.0);
    assert_eq!(params.remaining_bat_capacity, params.bat_capacity);
}

#[test]
fn alarms_follow_the_cycle() {
    let t0 = Instant::now();
    let engine = UpsEngine::new_at(common::fast_cycle_settings(), t0);
    let mut seen = Vec::new();

    let now = run_until(&engine, t0, ChargeState::Discharging, &mut seen);
    assert!(engine.snapshot().alarms.on_battery_power);
    assert_eq!(engine.snapshot().input_ac_voltage, 0.0);
    assert_eq!(engine.snapshot().input_ac_current, 0.0);

    // step until SOC drops below the alarm threshold
    let mut now = now;
    while engine.snapshot().soc >= 0.2 {
        now += STEP;
        engine.recalculate_at(now);
        assert_eq!(engine.charge_state(), ChargeState::Discharging);
    }
    assert!(engine.snapshot().alarms.low_battery);

    let now = run_until(&engine, now, ChargeState::Discharged, &mut seen);
    let now = run_until(&engine, now, ChargeState::Charging, &mut seen);
    let params = engine.snapshot();
    assert!(!params.alarms.on_battery_power);
    assert!(!params.alarms.low_battery);
    assert_eq!(params.input_ac_voltage, 220.0);
    assert!(params.bat_group_current > 0.0);

    run_until(&engine, now, ChargeState::Charged, &mut seen);
    assert_eq!(engine.snapshot().bat_group_current, 0.0);
}

#[test]
fn nominal_scenario_encodes_default_snapshot() {
    let config = common::default_config();
    let engine = UpsEngine::new(config.ups_settings());
    let params = engine.snapshot();

    assert_relative_eq!(params.load_current, 18.52, epsilon = 0.01);

    let registers = RegisterFrame::from(&params).encode();
    assert_eq!(registers.len(), REGISTER_BYTES);
    assert_eq!(registers.len(), 140);
    assert_eq!(
        f32::from_be_bytes([registers[0], registers[1], registers[2], registers[3]]),
        220.0
    );
    assert_eq!(encode_alarm_coils(&params.alarms), 0x00);
}

#[test]
fn every_cycle_snapshot_survives_the_wire_format() {
    let t0 = Instant::now();
    let engine = UpsEngine::new_at(common::fast_cycle_settings(), t0);
    let mut coil_bytes = Vec::new();
    let mut cycles = 0;
    let mut previous = engine.charge_state();
    let mut now = t0;

    for _ in 0..MAX_STEPS {
        now += STEP;
        let params = engine.recalculate_at(now);

        let frame = RegisterFrame::from(&params);
        let decoded = RegisterFrame::decode(&frame.encode()).expect("full-length frame");
        assert_eq!(decoded, frame);
        assert_eq!(
            decoded.bat_group_current.to_bits(),
            params.bat_group_current.to_bits()
        );
        for (sent, received) in params.batteries.iter().zip(&decoded.batteries) {
            assert_eq!(sent.voltage.to_bits(), received.voltage.to_bits());
            assert_eq!(sent.temperature.to_bits(), received.temperature.to_bits());
        }

        let bits = encode_alarm_coils(&params.alarms);
        assert_eq!(decode_alarm_coils(bits), params.alarms);
        if !coil_bytes.contains(&bits) {
            coil_bytes.push(bits);
        }

        let state = engine.charge_state();
        if previous == ChargeState::Charging && state == ChargeState::Charged {
            cycles += 1;
            break;
        }
        previous = state;
    }

    assert_eq!(cycles, 1, "a full cycle completes within {MAX_STEPS} steps");
    coil_bytes.sort_unstable();
    // mains, on battery, on battery with low charge
    assert_eq!(coil_bytes, vec![0b000, 0b001, 0b011]);
}
