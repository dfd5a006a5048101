//! Destination of encoded telemetry frames.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised while writing frames to the monitored device.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("modbus protocol error: {0}")]
    Protocol(rmodbus::ErrorKind),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("connection desynchronized by an interrupted request")]
    Desynchronized,
}

impl From<rmodbus::ErrorKind> for SinkError {
    fn from(err: rmodbus::ErrorKind) -> Self {
        SinkError::Protocol(err)
    }
}

/// Field-bus writer the imitator pushes telemetry through.
///
/// `payload` holds the raw wire bytes: big-endian register words for
/// [`write_multiple_registers`](Self::write_multiple_registers), a packed
/// coil bitmask (bit 0 = first coil) for
/// [`write_multiple_coils`](Self::write_multiple_coils).
#[async_trait]
pub trait RegisterSink: Send {
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError>;

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError>;
}

/// Which write a [`SinkWrite`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Registers,
    Coils,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkWrite {
    pub kind: WriteKind,
    pub address: u16,
    pub count: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Recorded {
    writes: Vec<SinkWrite>,
    failing: bool,
}

/// In-memory sink that records every write.
///
/// Clones share the same log, so a test can hand one clone to the imitator
/// and inspect the other. Failed writes are not recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail with a connection error (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn writes(&self) -> Vec<SinkWrite> {
        self.inner.lock().writes.clone()
    }

    pub fn register_writes(&self) -> Vec<SinkWrite> {
        self.writes_of(WriteKind::Registers)
    }

    pub fn coil_writes(&self) -> Vec<SinkWrite> {
        self.writes_of(WriteKind::Coils)
    }

    fn writes_of(&self, kind: WriteKind) -> Vec<SinkWrite> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|w| w.kind == kind)
            .cloned()
            .collect()
    }

    fn record(
        &self,
        kind: WriteKind,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(SinkError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "recording sink set to fail",
            )));
        }
        inner.writes.push(SinkWrite {
            kind,
            address,
            count,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl RegisterSink for RecordingSink {
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        self.record(WriteKind::Registers, address, count, payload)
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        self.record(WriteKind::Coils, address, count, payload)
    }
}
