//! Scripted in-memory transport for tests.
//!
//! Every transport opened by a `ScriptedConnector` shares one reply
//! script and one event log, so a test can follow a session across a
//! close and reopen.

use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::{Connector, Transport, TransportError, TransportResult};

/// Everything that happened to the scripted transports, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open { port: String, baud: u32 },
    Write(Bytes),
    Read,
    Close,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Bytes>,
    events: Vec<TransportEvent>,
    unavailable_bauds: Vec<u32>,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Rc<RefCell<Script>>,
}

impl ScriptedConnector {
    /// Reads return these replies in order, then nothing
    pub fn new<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[u8]>,
    {
        let script = Script {
            replies: replies
                .into_iter()
                .map(|r| Bytes::copy_from_slice(r.as_ref()))
                .collect(),
            ..Default::default()
        };
        Self {
            script: Rc::new(RefCell::new(script)),
        }
    }

    /// Make opening at `baud` fail
    pub fn unavailable_at(self, baud: u32) -> Self {
        self.script.borrow_mut().unavailable_bauds.push(baud);
        self
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.script.borrow().events.clone()
    }

    pub fn writes(&self) -> Vec<Bytes> {
        self.script
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Connector for ScriptedConnector {
    fn open(
        &mut self,
        port: &str,
        baud: u32,
        _read_timeout: Duration,
    ) -> TransportResult<Box<dyn Transport>> {
        let mut script = self.script.borrow_mut();
        if script.unavailable_bauds.contains(&baud) {
            return Err(TransportError::Open {
                port: port.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "scripted failure"),
            });
        }
        script.events.push(TransportEvent::Open {
            port: port.to_string(),
            baud,
        });
        Ok(Box::new(ScriptedTransport {
            script: Rc::clone(&self.script),
        }))
    }
}

struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.script
            .borrow_mut()
            .events
            .push(TransportEvent::Write(Bytes::copy_from_slice(bytes)));
        Ok(())
    }

    fn read_window(&mut self, max: usize) -> TransportResult<Bytes> {
        let mut script = self.script.borrow_mut();
        script.events.push(TransportEvent::Read);
        let reply = script.replies.pop_front().unwrap_or_default();
        Ok(reply.slice(..reply.len().min(max)))
    }

    fn close(self: Box<Self>) -> TransportResult<()> {
        self.script.borrow_mut().events.push(TransportEvent::Close);
        Ok(())
    }
}
