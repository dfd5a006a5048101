//! Modbus TCP client implementing [`RegisterSink`].
//!
//! Requests are built and responses validated with `rmodbus`; framing on the
//! socket follows the MBAP header length field.
//!
//! A write future may be dropped at any await point. Received bytes are kept
//! in a buffer across calls and every request carries its own transaction id,
//! so a reply left over from a cancelled request is recognised and skipped.
//! A request cut off while being sent cannot be repaired on the same
//! connection and fails every later write with [`SinkError::Desynchronized`].

use std::io;

use async_trait::async_trait;
use rmodbus::ModbusProto;
use rmodbus::client::ModbusRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use super::sink::{RegisterSink, SinkError};

/// MBAP header without the unit identifier.
const MBAP_PREFIX_LEN: usize = 6;
/// Largest legal value of the MBAP length field (unit id + 253 byte PDU).
const MAX_MBAP_LENGTH: usize = 254;
/// Replies with a foreign transaction id skipped before giving up.
const MAX_STALE_REPLIES: usize = 8;

/// Single Modbus TCP connection to the monitored device.
#[derive(Debug)]
pub struct ModbusTcpSink {
    stream: TcpStream,
    unit_id: u8,
    last_tr_id: u16,
    /// Bytes received but not yet consumed as a whole frame.
    rx: Vec<u8>,
    /// Set while a request is being sent.
    sending: bool,
}

impl ModbusTcpSink {
    /// Opens the connection. No reconnection is attempted later.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the TCP connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs, unit_id: u8) -> Result<Self, SinkError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!(%peer, unit_id, "connected to modbus device");
        }
        Ok(Self {
            stream,
            unit_id,
            last_tr_id: 0,
            rx: Vec::new(),
            sending: false,
        })
    }

    fn request(&mut self) -> ModbusRequest {
        self.last_tr_id = self.last_tr_id.wrapping_add(1);
        let mut req = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        req.tr_id = self.last_tr_id;
        req
    }

    async fn transact(&mut self, req: &ModbusRequest, frame: &[u8]) -> Result<(), SinkError> {
        if self.sending {
            return Err(SinkError::Desynchronized);
        }
        self.sending = true;
        self.stream.write_all(frame).await?;
        self.sending = false;

        for _ in 0..=MAX_STALE_REPLIES {
            let response = self.read_frame().await?;
            let tr_id = u16::from_be_bytes([response[0], response[1]]);
            if tr_id != req.tr_id {
                debug!(tr_id, expected = req.tr_id, "skipping stale modbus reply");
                continue;
            }
            req.parse_ok(&response)?;
            return Ok(());
        }
        Err(SinkError::InvalidFrame(format!(
            "no reply for transaction {}",
            req.tr_id
        )))
    }

    /// Reads the next complete MBAP frame. Cancel safe: partial data stays
    /// in `rx` for the next call.
    async fn read_frame(&mut self) -> Result<Vec<u8>, SinkError> {
        loop {
            if let Some(frame) = self.take_buffered_frame()? {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.rx).await? == 0 {
                return Err(SinkError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "modbus device closed the connection",
                )));
            }
        }
    }

    fn take_buffered_frame(&mut self) -> Result<Option<Vec<u8>>, SinkError> {
        if self.rx.len() < MBAP_PREFIX_LEN {
            return Ok(None);
        }
        let length = usize::from(u16::from_be_bytes([self.rx[4], self.rx[5]]));
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(SinkError::InvalidFrame(format!(
                "MBAP length {length} out of range"
            )));
        }
        let total = MBAP_PREFIX_LEN + length;
        if self.rx.len() < total {
            return Ok(None);
        }
        Ok(Some(self.rx.drain(..total).collect()))
    }
}

#[async_trait]
impl RegisterSink for ModbusTcpSink {
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        let words = words_from_bytes(payload)?;
        if words.len() != usize::from(count) {
            return Err(SinkError::InvalidFrame(format!(
                "{count} registers requested but payload holds {}",
                words.len()
            )));
        }

        let mut req = self.request();
        let mut frame = Vec::new();
        req.generate_set_holdings_bulk(address, &words, &mut frame)?;
        debug!(address, count, "writing holding registers");
        self.transact(&req, &frame).await
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        count: u16,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        let coils = coils_from_bytes(payload, count)?;

        let mut req = self.request();
        let mut frame = Vec::new();
        req.generate_set_coils_bulk(address, &coils, &mut frame)?;
        debug!(address, count, "writing coils");
        self.transact(&req, &frame).await
    }
}

/// Splits a big-endian byte payload into register words.
fn words_from_bytes(payload: &[u8]) -> Result<Vec<u16>, SinkError> {
    if payload.len() % 2 != 0 {
        return Err(SinkError::InvalidFrame(format!(
            "register payload has odd length {}",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Unpacks `count` coil states, least significant bit of the first byte first.
fn coils_from_bytes(payload: &[u8], count: u16) -> Result<Vec<bool>, SinkError> {
    let count = usize::from(count);
    if payload.len() != count.div_ceil(8) {
        return Err(SinkError::InvalidFrame(format!(
            "{count} coils need {} bytes, payload has {}",
            count.div_ceil(8),
            payload.len()
        )));
    }
    Ok((0..count)
        .map(|i| (payload[i / 8] >> (i % 8)) & 1 == 1)
        .collect())
}
