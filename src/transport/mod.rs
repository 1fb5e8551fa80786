//! Transport module - Byte-stream endpoints the handshake runs over
//!
//! Provides:
//! - `Transport`: one opened endpoint at a fixed speed
//! - `Connector`: opens transports by port name and speed
//! - A `serialport` backed implementation of both

mod serial;
#[cfg(test)]
pub mod scripted;

pub use serial::*;

use bytes::Bytes;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Can't open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// An opened byte-stream endpoint
pub trait Transport {
    /// Write all bytes and flush them out
    fn write_all(&mut self, bytes: &[u8]) -> TransportResult<()>;

    /// Read up to `max` bytes, returning whatever arrived before the
    /// read timeout elapsed. An empty result is not an error.
    fn read_window(&mut self, max: usize) -> TransportResult<Bytes>;

    /// Release the endpoint
    fn close(self: Box<Self>) -> TransportResult<()>;
}

/// Opens transports
pub trait Connector {
    fn open(
        &mut self,
        port: &str,
        baud: u32,
        read_timeout: Duration,
    ) -> TransportResult<Box<dyn Transport>>;
}
