//! Protocol module - GDB remote serial protocol framing
//!
//! Packets on the wire look like:
//! - `$` start marker
//! - escaped payload (`#`, `$` and `}` sent as `}` + byte ^ 0x20)
//! - `#` stop marker
//! - two lowercase hex digits: sum of the unescaped payload bytes, mod 256
//!
//! Every non-empty reply is acknowledged with a single `+`.

mod command;
mod codec;

pub use command::*;
pub use codec::*;

/// Packet start marker
pub const PACKET_START: u8 = b'$';

/// Packet stop marker, followed by the checksum
pub const PACKET_END: u8 = b'#';

/// Escape marker for reserved bytes
pub const ESCAPE: u8 = b'}';

/// Value XORed into an escaped byte
pub const ESCAPE_XOR: u8 = 0x20;

/// Positive acknowledgment
pub const ACK: u8 = b'+';

/// Largest reply read in one window (the stub's advertised PacketSize)
pub const MAX_RESPONSE_SIZE: usize = 1468;
