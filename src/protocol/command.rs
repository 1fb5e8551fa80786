//! Protocol command definitions
//!
//! The handful of GDB remote commands the baud switch needs.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use super::codec::{hex_decode, hex_encode};

/// Capability query verb
pub const QUERY_SUPPORTED: &[u8] = b"qSupported";

/// Remote monitor command verb; its argument is hex-encoded
pub const MONITOR_PREFIX: &[u8] = b"qRcmd,";

/// Mini UART baud divider register (AUX_MU_BAUD_REG)
pub const DEFAULT_BAUD_REGISTER: u32 = 0x2021_5068;

/// Commands sent to the remote stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty packet, used to provoke the initial stop reply
    Probe,
    /// `qSupported`
    QuerySupported,
    /// `qRcmd,<hex>` wrapping a monitor command line
    Monitor(Bytes),
}

impl Command {
    /// Monitor command from a plain command line
    pub fn monitor(line: impl AsRef<[u8]>) -> Self {
        Command::Monitor(Bytes::copy_from_slice(line.as_ref()))
    }

    /// `mw32 <register> <divider>`: write the new divider into the target UART
    pub fn set_baud_divider(register: u32, divider: u32) -> Self {
        Command::monitor(format!("mw32 {:#010x} {}", register, divider))
    }

    /// Unframed payload bytes
    pub fn payload(&self) -> Bytes {
        match self {
            Command::Probe => Bytes::new(),
            Command::QuerySupported => Bytes::from_static(QUERY_SUPPORTED),
            Command::Monitor(line) => {
                let hex = hex_encode(line);
                let mut buf = BytesMut::with_capacity(MONITOR_PREFIX.len() + hex.len());
                buf.put_slice(MONITOR_PREFIX);
                buf.put_slice(&hex);
                buf.freeze()
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Probe => write!(f, "<probe>"),
            Command::QuerySupported => write!(f, "qSupported"),
            Command::Monitor(line) => write!(f, "monitor {}", line.escape_ascii()),
        }
    }
}

/// Decode an `O<hex>` console output reply from a monitor command.
///
/// Returns `None` for anything else, including the plain `OK` reply.
pub fn console_output(response: &[u8]) -> Option<Bytes> {
    match response.split_first() {
        Some((&b'O', hex)) if !hex.is_empty() => hex_decode(hex).ok(),
        _ => None,
    }
}
