//! Handshake module - Drives the baud switch over the GDB link
//!
//! Provides:
//! - `Session`: one opened transport plus packet send/receive/ack
//! - `Sequencer`: the fixed probe, query, switch, reopen, confirm sequence
//! - UART divider arithmetic for the target

mod session;
mod sequencer;

pub use session::*;
pub use sequencer::*;

use thiserror::Error;

use crate::transport::TransportError;

/// Handshake errors
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{baud} baud cannot be derived from a {clock} Hz system clock")]
    BaudOutOfRange { baud: u32, clock: u32 },

    #[error("No open session")]
    NotOpen,
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// Divider for `baud` on a mini UART clocked at `system_clock_hz`:
/// `round(clock / (8 * baud) - 1)`, halves rounding to even.
///
/// `None` when the rate is zero or too fast for the clock (negative divider).
/// Slow rates are passed through unclamped; the target register decides
/// what to do with them.
pub fn uart_divider(system_clock_hz: u32, baud: u32) -> Option<u32> {
    if baud == 0 {
        return None;
    }
    let divider = (f64::from(system_clock_hz) / (8.0 * f64::from(baud)) - 1.0).round_ties_even();
    if !(0.0..=f64::from(u32::MAX)).contains(&divider) {
        return None;
    }
    Some(divider as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYS_CLOCK: u32 = 250_000_000;

    #[test]
    fn test_divider_for_common_bauds() {
        assert_eq!(uart_divider(SYS_CLOCK, 921_600), Some(33));
        assert_eq!(uart_divider(SYS_CLOCK, 115_200), Some(270));
        assert_eq!(uart_divider(SYS_CLOCK, 460_800), Some(67));
    }

    #[test]
    fn test_divider_halves_round_to_even() {
        assert_eq!(uart_divider(1000, 25), Some(4));
        // 20 / (8 * 1) - 1 = 1.5 -> 2, 28 / 8 - 1 = 2.5 -> 2
        assert_eq!(uart_divider(20, 1), Some(2));
        assert_eq!(uart_divider(28, 1), Some(2));
    }

    #[test]
    fn test_divider_out_of_range() {
        assert_eq!(uart_divider(SYS_CLOCK, 0), None);
        assert_eq!(uart_divider(SYS_CLOCK, 100_000_000), None);
    }

    #[test]
    fn test_divider_slow_rates_not_capped() {
        // 250e6 / 2400 - 1 = 104165.67
        assert_eq!(uart_divider(SYS_CLOCK, 300), Some(104_166));
        assert_eq!(uart_divider(SYS_CLOCK, 1), Some(31_249_999));
    }

    #[test]
    fn test_divider_boundary_at_fastest_rate() {
        // clock / 8 gives exactly 0; a little faster still rounds to 0
        assert_eq!(uart_divider(SYS_CLOCK, 31_250_000), Some(0));
        assert_eq!(uart_divider(SYS_CLOCK, 41_666_666), Some(0));
        // 250e6 / (8 * 62.5e6) - 1 = -0.5, rounds to even (-0)
        assert_eq!(uart_divider(SYS_CLOCK, 62_500_000), Some(0));
        assert_eq!(uart_divider(SYS_CLOCK, 62_500_001), None);
    }
}
