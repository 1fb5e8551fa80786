//! Packet session over one opened transport
//!
//! A session lives for exactly one link speed. It is closed before the
//! port is reopened at another speed.

use bytes::Bytes;
use std::ops::AddAssign;
use std::time::Duration;

use super::HandshakeResult;
use crate::protocol::{extract, extract_verified, frame, Command, ACK};
use crate::transport::{Connector, Transport};

/// Session statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Packets sent
    pub packets_sent: u64,
    /// Non-empty replies received
    pub packets_received: u64,
    /// Acknowledgments sent
    pub acks_sent: u64,
    /// Bytes written, acks included
    pub bytes_sent: u64,
    /// Bytes read
    pub bytes_received: u64,
}

impl AddAssign for SessionStats {
    fn add_assign(&mut self, other: Self) {
        self.packets_sent += other.packets_sent;
        self.packets_received += other.packets_received;
        self.acks_sent += other.acks_sent;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
    }
}

/// Options that shape how replies are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Read window per reply
    pub read_timeout: Duration,
    /// Maximum bytes read per reply
    pub max_response_size: usize,
    /// Treat replies with a bad checksum as empty
    pub verify_checksums: bool,
}

/// GDB packet session at one baud rate
pub struct Session {
    transport: Box<dyn Transport>,
    baud: u32,
    options: SessionOptions,
    stats: SessionStats,
}

impl Session {
    /// Open `port` at `baud`
    pub fn open<C>(
        connector: &mut C,
        port: &str,
        baud: u32,
        options: SessionOptions,
    ) -> HandshakeResult<Self>
    where
        C: Connector + ?Sized,
    {
        let transport = connector.open(port, baud, options.read_timeout)?;
        Ok(Self {
            transport,
            baud,
            options,
            stats: SessionStats::default(),
        })
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Frame and write a command
    pub fn send(&mut self, command: &Command) -> HandshakeResult<()> {
        let packet = frame(&command.payload());
        tracing::debug!("Tx: {}", packet.escape_ascii());
        self.transport.write_all(&packet)?;
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += packet.len() as u64;
        Ok(())
    }

    /// Read one reply window and return its payload.
    ///
    /// An empty payload means nothing usable arrived.
    pub fn receive(&mut self) -> HandshakeResult<Bytes> {
        let raw = self.transport.read_window(self.options.max_response_size)?;
        tracing::debug!("Rx: {}", raw.escape_ascii());
        self.stats.bytes_received += raw.len() as u64;

        let payload = if self.options.verify_checksums {
            match extract_verified(&raw) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("Discarding reply: {}", e);
                    Bytes::new()
                }
            }
        } else {
            extract(&raw)
        };

        if !payload.is_empty() {
            self.stats.packets_received += 1;
        }
        Ok(payload)
    }

    /// Send a command and read its reply
    pub fn request(&mut self, command: &Command) -> HandshakeResult<Bytes> {
        tracing::trace!("Request: {}", command);
        self.send(command)?;
        self.receive()
    }

    /// Write a single `+`
    pub fn acknowledge(&mut self) -> HandshakeResult<()> {
        tracing::debug!("Tx: +");
        self.transport.write_all(&[ACK])?;
        self.stats.acks_sent += 1;
        self.stats.bytes_sent += 1;
        Ok(())
    }

    /// Close the transport, returning what this session did
    pub fn close(self) -> HandshakeResult<SessionStats> {
        self.transport.close()?;
        Ok(self.stats)
    }
}
