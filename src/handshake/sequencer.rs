//! Baud switch sequencer
//!
//! Runs the fixed sequence against a GDB stub:
//! 1. open the port at the initial speed
//! 2. send an empty probe and acknowledge whatever comes back
//! 3. query `qSupported`; on a reply, write the new divider via `qRcmd`
//! 4. close, settle, reopen at the target speed
//! 5. acknowledge and query `qSupported` again to confirm the switch
//!
//! There are no retries. An empty reply is an answer, not an error.

use std::thread;

use super::{uart_divider, HandshakeError, HandshakeResult, Session, SessionOptions, SessionStats};
use crate::config::Config;
use crate::protocol::{console_output, Command};
use crate::transport::Connector;

/// How the handshake ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The target answered at the new speed
    Confirmed,
    /// Nothing came back at the new speed
    NoResponse,
}

/// Sequencer states, visited strictly in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    OpenOld,
    Probe,
    QuerySupportedOld,
    Reopen,
    QuerySupportedNew,
    Done(Outcome),
}

/// What a completed handshake did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReport {
    pub outcome: Outcome,
    /// Divider written to the target, if the switch was attempted
    pub divider: Option<u32>,
    /// Whether the `mw32` monitor command went out
    pub speed_change_sent: bool,
    /// Totals over both sessions
    pub stats: SessionStats,
}

pub struct Sequencer<'a, C: Connector> {
    config: &'a Config,
    connector: C,
    state: HandshakeState,
    session: Option<Session>,
    divider: Option<u32>,
    speed_change_sent: bool,
    stats: SessionStats,
}

impl<'a, C: Connector> Sequencer<'a, C> {
    pub fn new(config: &'a Config, connector: C) -> Self {
        Self {
            config,
            connector,
            state: HandshakeState::OpenOld,
            session: None,
            divider: None,
            speed_change_sent: false,
            stats: SessionStats::default(),
        }
    }

    /// Run every remaining step
    pub fn run(mut self) -> HandshakeResult<HandshakeReport> {
        loop {
            if let HandshakeState::Done(outcome) = self.step()? {
                return Ok(HandshakeReport {
                    outcome,
                    divider: self.divider,
                    speed_change_sent: self.speed_change_sent,
                    stats: self.stats,
                });
            }
        }
    }

    /// Perform the current step and advance. `Done` is absorbing.
    pub fn step(&mut self) -> HandshakeResult<HandshakeState> {
        let next = match self.state {
            HandshakeState::OpenOld => {
                let baud = self.config.serial.initial_baud;
                tracing::info!("Opening serial port {} at {} baud", self.config.serial.port, baud);
                self.open(baud)?;
                HandshakeState::Probe
            }
            HandshakeState::Probe => {
                let session = self.session()?;
                session.request(&Command::Probe)?;
                session.acknowledge()?;
                HandshakeState::QuerySupportedOld
            }
            HandshakeState::QuerySupportedOld => {
                self.switch_speed()?;
                HandshakeState::Reopen
            }
            HandshakeState::Reopen => {
                self.close()?;
                thread::sleep(self.config.settle_delay());
                let baud = self.config.serial.target_baud;
                tracing::info!("Reopening at {} baud", baud);
                self.open(baud)?;
                HandshakeState::QuerySupportedNew
            }
            HandshakeState::QuerySupportedNew => {
                let session = self.session()?;
                session.acknowledge()?;
                let outcome = if session.request(&Command::QuerySupported)?.is_empty() {
                    Outcome::NoResponse
                } else {
                    session.acknowledge()?;
                    thread::sleep(self.config.settle_delay());
                    Outcome::Confirmed
                };
                self.close()?;
                HandshakeState::Done(outcome)
            }
            done @ HandshakeState::Done(_) => done,
        };

        tracing::trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Query capabilities at the old speed and, if the stub answers,
    /// write the new divider. A silent stub skips the write.
    fn switch_speed(&mut self) -> HandshakeResult<()> {
        let target_baud = self.config.serial.target_baud;
        let clock = self.config.target.system_clock_hz;
        let register = self.config.target.baud_register;

        let session = self.session()?;
        if session.request(&Command::QuerySupported)?.is_empty() {
            tracing::debug!("No qSupported reply at {} baud, leaving divider unchanged", session.baud());
            return Ok(());
        }
        session.acknowledge()?;

        tracing::info!("Setting {} baud", target_baud);
        let divider = uart_divider(clock, target_baud).ok_or(HandshakeError::BaudOutOfRange {
            baud: target_baud,
            clock,
        })?;
        let reply = session.request(&Command::set_baud_divider(register, divider))?;
        if let Some(text) = console_output(&reply) {
            tracing::debug!("Monitor: {}", text.escape_ascii());
        }

        self.divider = Some(divider);
        self.speed_change_sent = true;
        Ok(())
    }

    fn options(&self) -> SessionOptions {
        SessionOptions {
            read_timeout: self.config.read_timeout(),
            max_response_size: self.config.serial.max_response_size,
            verify_checksums: self.config.protocol.verify_checksums,
        }
    }

    fn open(&mut self, baud: u32) -> HandshakeResult<()> {
        let options = self.options();
        let session = Session::open(&mut self.connector, &self.config.serial.port, baud, options)?;
        self.session = Some(session);
        Ok(())
    }

    fn close(&mut self) -> HandshakeResult<()> {
        if let Some(session) = self.session.take() {
            let baud = session.baud();
            let stats = session.close()?;
            tracing::debug!("Session at {} baud: {:?}", baud, stats);
            self.stats += stats;
        }
        Ok(())
    }

    fn session(&mut self) -> HandshakeResult<&mut Session> {
        self.session.as_mut().ok_or(HandshakeError::NotOpen)
    }
}
