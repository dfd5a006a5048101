//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use ups_imitator::config::ImitatorConfig;
use ups_imitator::imitator::{Imitator, RecordingSink};
use ups_imitator::ups::{UpsParams, UpsSettings};

/// Baseline configuration: 1000 W load, 54/42 V group, 50 Ah, 1 s sync.
pub fn default_config() -> ImitatorConfig {
    ImitatorConfig::default()
}

/// Small battery and short cycle pause so a full cycle fits in a few
/// hundred simulated steps.
pub fn fast_cycle_settings() -> UpsSettings {
    ImitatorConfig {
        cycle_change_timeout: 1,
        default_bat_capacity: 10.0,
        ..ImitatorConfig::default()
    }
    .ups_settings()
}

/// Imitator wired to a recording sink. The returned sink shares its log
/// with the one the imitator writes to.
pub fn recording_imitator(config: &ImitatorConfig) -> (Arc<Imitator>, RecordingSink) {
    let sink = RecordingSink::new();
    let imitator = Imitator::from_config(Box::new(sink.clone()), config);
    (Arc::new(imitator), sink)
}

/// Asserts the invariants every recalculated snapshot must satisfy.
pub fn assert_physical_invariants(params: &UpsParams, settings: &UpsSettings) {
    assert!(
        params.remaining_bat_capacity >= 0.0,
        "remaining capacity negative: {params:?}"
    );
    assert!(
        params.remaining_bat_capacity <= params.bat_capacity,
        "remaining capacity above nominal: {params:?}"
    );
    let soc = params.remaining_bat_capacity / params.bat_capacity;
    assert!(
        (params.soc - soc).abs() < 1e-5,
        "soc {} does not match remaining/capacity {soc}",
        params.soc
    );
    assert!(params.bat_group_voltage <= settings.max_bat_group_voltage);
    for battery in &params.batteries {
        assert!((battery.voltage - params.bat_group_voltage / 4.0).abs() < 1e-4);
    }
}

/// Modbus TCP device that acknowledges every write request on a single
/// connection after `delay`. Returns the address to connect to.
pub async fn slow_modbus_device(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake device");
    let addr = listener.local_addr().expect("local addr").to_string();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        loop {
            let mut request = vec![0u8; 6];
            if socket.read_exact(&mut request).await.is_err() {
                return;
            }
            let length = usize::from(u16::from_be_bytes([request[4], request[5]]));
            request.resize(6 + length, 0);
            if socket.read_exact(&mut request[6..]).await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            // header, unit, function, address and count echoed with length 6
            let mut response = request[..12].to_vec();
            response[4] = 0;
            response[5] = 6;
            if socket.write_all(&response).await.is_err() {
                return;
            }
        }
    });
    addr
}
