//! Imitator coordinator: drives the charge-cycle engine on a fixed period,
//! switches between auto and manual mode and forwards encoded telemetry to a
//! [`RegisterSink`].
//!
//! In auto mode a background task recalculates the engine every sync
//! interval, applies measurement jitter to a copy of the state, encodes it
//! and writes registers then coils. In manual mode the task is stopped and the
//! state stays frozen except for operator edits.
//!
//! The task is stopped through a shutdown channel checked between ticks, so
//! a push that has started always runs to completion and never leaves a
//! half-finished transaction on the device connection.

pub mod modbus_tcp;
pub mod sink;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ImitatorConfig;
use crate::error::ImitatorError;
use crate::ups::engine::{ChargeState, UpsEngine};
use crate::ups::params::{AlarmsUpdate, BatteryUpdate, ParamsUpdate, UpsParams};
use crate::ups::registers::{ALARM_COIL_COUNT, REGISTER_COUNT, RegisterFrame, encode_alarm_coils};

pub use modbus_tcp::ModbusTcpSink;
pub use sink::{RecordingSink, RegisterSink, SinkError};

/// Sink shared between the tick task and [`Imitator::sync_once`].
pub type SharedSink = Arc<tokio::sync::Mutex<Box<dyn RegisterSink>>>;

/// First register and coil address of every telemetry write.
const TELEMETRY_ADDRESS: u16 = 0x0000;

/// Running tick task and the channel that stops it.
struct Ticker {
    handle: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
}

impl Ticker {
    /// Asks the task to exit after any push in progress. The handle is
    /// detached, not aborted.
    fn stop(self) -> JoinHandle<()> {
        // an error only means the task has already exited
        let _ = self.shutdown.send(());
        self.handle
    }
}

/// Coordinator for one imitated UPS.
///
/// Starts in auto mode with the tick not yet running; call
/// [`start`](Self::start) from inside a tokio runtime.
pub struct Imitator {
    engine: Arc<UpsEngine>,
    sink: SharedSink,
    auto: Arc<AtomicBool>,
    /// The running tick task. The lock also serializes mode switches.
    ticker: Mutex<Option<Ticker>>,
    sync_interval: Duration,
}

impl Imitator {
    /// # Panics
    ///
    /// Panics if `sync_interval` is zero.
    pub fn new(sink: Box<dyn RegisterSink>, engine: UpsEngine, sync_interval: Duration) -> Self {
        assert!(!sync_interval.is_zero(), "sync interval must be positive");
        Self {
            engine: Arc::new(engine),
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            auto: Arc::new(AtomicBool::new(true)),
            ticker: Mutex::new(None),
            sync_interval,
        }
    }

    /// Builds an imitator from a validated config.
    pub fn from_config(sink: Box<dyn RegisterSink>, config: &ImitatorConfig) -> Self {
        Self::new(
            sink,
            UpsEngine::new(config.ups_settings()),
            config.sync_interval(),
        )
    }

    /// Launches the periodic tick if the imitator is in auto mode and the
    /// tick is not running yet.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if self.mode() && ticker.is_none() {
            *ticker = Some(self.spawn_ticker());
        }
    }

    /// `true` in auto mode.
    pub fn mode(&self) -> bool {
        self.auto.load(Ordering::SeqCst)
    }

    /// Switches mode. Only an actual change has side effects: entering auto
    /// resets the engine and restarts the tick, entering manual stops it.
    ///
    /// Stopping does not interrupt a push already in flight; it finishes
    /// while holding the sink, and later writes wait for it.
    ///
    /// # Panics
    ///
    /// Panics if auto mode is entered outside a tokio runtime.
    pub fn set_mode(&self, auto: bool) {
        let mut ticker = self.ticker.lock();
        if self.auto.swap(auto, Ordering::SeqCst) == auto {
            return;
        }

        if let Some(running) = ticker.take() {
            running.stop();
        }
        if auto {
            self.engine.reset();
            *ticker = Some(self.spawn_ticker());
        }
        info!(auto, "imitator mode changed");
    }

    /// Authoritative state, never jittered.
    pub fn snapshot(&self) -> UpsParams {
        self.engine.snapshot()
    }

    pub fn charge_state(&self) -> ChargeState {
        self.engine.charge_state()
    }

    pub fn update_params(&self, update: &ParamsUpdate) {
        self.engine.update_params(update);
    }

    /// # Errors
    ///
    /// Returns [`ImitatorError::OutOfRange`] for a slot that does not exist.
    pub fn update_battery(&self, slot: usize, update: &BatteryUpdate) -> Result<(), ImitatorError> {
        self.engine.update_battery(slot, update)
    }

    pub fn update_alarms(&self, update: &AlarmsUpdate) {
        self.engine.update_alarms(update);
    }

    /// Runs one tick now, regardless of mode, and reports the sink result.
    ///
    /// # Errors
    ///
    /// Returns [`ImitatorError::Sink`] if either write fails. The engine
    /// state has already advanced at that point.
    pub async fn sync_once(&self) -> Result<(), ImitatorError> {
        push_telemetry(&self.engine, &self.sink).await
    }

    fn spawn_ticker(&self) -> Ticker {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_ticker(
            Arc::clone(&self.engine),
            Arc::clone(&self.sink),
            Arc::clone(&self.auto),
            self.sync_interval,
            shutdown_rx,
        ));
        Ticker { handle, shutdown }
    }
}

impl Drop for Imitator {
    fn drop(&mut self) {
        if let Some(running) = self.ticker.get_mut().take() {
            running.stop();
        }
    }
}

/// Periodic tick. The first tick fires one period after start. Exits when
/// a shutdown message arrives or the sender is dropped.
async fn run_ticker(
    engine: Arc<UpsEngine>,
    sink: SharedSink,
    auto: Arc<AtomicBool>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("telemetry tick stopped");
                break;
            }
            _ = interval.tick() => {
                if !auto.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(err) = push_telemetry(&engine, &sink).await {
                    warn!(error = %err, "failed to push UPS telemetry");
                }
            }
        }
    }
}

/// Recalculates, jitters and encodes the state, then writes registers and
/// coils. The engine lock is released before the sink is touched.
async fn push_telemetry(engine: &UpsEngine, sink: &SharedSink) -> Result<(), ImitatorError> {
    let measured = engine.recalculate().with_measurement_error();
    let registers = RegisterFrame::from(&measured).encode();
    let coils = [encode_alarm_coils(&measured.alarms)];

    let mut sink = sink.lock().await;
    sink.write_multiple_registers(TELEMETRY_ADDRESS, REGISTER_COUNT, &registers)
        .await?;
    sink.write_multiple_coils(TELEMETRY_ADDRESS, ALARM_COIL_COUNT, &coils)
        .await?;

    debug!(
        input_ac_voltage = measured.input_ac_voltage,
        bat_group_voltage = measured.bat_group_voltage,
        bat_group_current = measured.bat_group_current,
        soc = measured.soc,
        alarms = coils[0],
        "pushed UPS telemetry"
    );
    Ok(())
}
