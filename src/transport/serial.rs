//! Serial port transport

use bytes::Bytes;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::{Connector, Transport, TransportError, TransportResult};

/// Opens local serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl SerialConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SerialConnector {
    fn open(
        &mut self,
        port: &str,
        baud: u32,
        read_timeout: Duration,
    ) -> TransportResult<Box<dyn Transport>> {
        let handle = serialport::new(port, baud)
            .timeout(read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port.to_string(),
                source,
            })?;

        tracing::debug!("Opened {} at {} baud", port, baud);
        Ok(Box::new(SerialTransport {
            name: port.to_string(),
            port: handle,
            read_timeout,
        }))
    }
}

/// A reader whose per-call timeout can be shortened as the window runs out
pub trait TimedRead: Read {
    fn set_read_timeout(&mut self, timeout: Duration) -> TransportResult<()>;
}

impl TimedRead for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        self.set_timeout(timeout)?;
        Ok(())
    }
}

/// Read up to `max` bytes within `window`.
///
/// Partial reads accumulate. A timeout closes the window and keeps what
/// already arrived, so a silent peer yields an empty buffer.
pub fn read_until_deadline<R>(reader: &mut R, max: usize, window: Duration) -> TransportResult<Bytes>
where
    R: TimedRead + ?Sized,
{
    let deadline = Instant::now() + window;
    let mut buf = vec![0u8; max];
    let mut filled = 0;

    while filled < max {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        reader.set_read_timeout(deadline - now)?;

        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

/// A serial port opened at one speed
pub struct SerialTransport {
    name: String,
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_window(&mut self, max: usize) -> TransportResult<Bytes> {
        read_until_deadline(&mut self.port, max, self.read_timeout)
    }

    fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.port.flush()?;
        tracing::debug!("Closed {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    enum Step {
        Data(&'static [u8]),
        Timeout,
        Interrupted,
        Fail(io::ErrorKind),
    }

    /// Serial line stand-in; an exhausted script behaves like a silent line
    struct FakeLine {
        script: VecDeque<Step>,
        reads: usize,
        timeouts: Vec<Duration>,
    }

    impl FakeLine {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: script.into(),
                reads: 0,
                timeouts: Vec::new(),
            }
        }
    }

    impl Read for FakeLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.script.pop_front() {
                Some(Step::Data(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.script.push_front(Step::Data(&data[n..]));
                    }
                    Ok(n)
                }
                Some(Step::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
                Some(Step::Fail(kind)) => Err(kind.into()),
                Some(Step::Timeout) | None => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl TimedRead for FakeLine {
        fn set_read_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn test_partial_reads_accumulate() {
        let mut line = FakeLine::new(vec![Step::Data(b"+$OK"), Step::Data(b"#9a"), Step::Timeout]);
        let bytes = read_until_deadline(&mut line, 1468, WINDOW).unwrap();
        assert_eq!(&bytes[..], b"+$OK#9a");
        assert_eq!(line.reads, 3);
    }

    #[test]
    fn test_timeout_keeps_bytes_already_read() {
        let mut line = FakeLine::new(vec![Step::Data(b"$PacketSize"), Step::Timeout, Step::Data(b"=5bc#")]);
        let bytes = read_until_deadline(&mut line, 1468, WINDOW).unwrap();
        assert_eq!(&bytes[..], b"$PacketSize");
        assert_eq!(line.script.len(), 1);
    }

    #[test]
    fn test_silent_line_gives_empty_read() {
        let mut line = FakeLine::new(vec![]);
        let bytes = read_until_deadline(&mut line, 1468, WINDOW).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let mut line = FakeLine::new(vec![Step::Interrupted, Step::Data(b"+"), Step::Timeout]);
        let bytes = read_until_deadline(&mut line, 1468, WINDOW).unwrap();
        assert_eq!(&bytes[..], b"+");
        assert_eq!(line.reads, 3);
    }

    #[test]
    fn test_stops_at_max() {
        let mut line = FakeLine::new(vec![Step::Data(b"$0123456789#2d")]);
        let bytes = read_until_deadline(&mut line, 5, WINDOW).unwrap();
        assert_eq!(&bytes[..], b"$0123");
        assert_eq!(line.reads, 1);
        assert!(matches!(line.script.front(), Some(Step::Data(rest)) if *rest == &b"456789#2d"[..]));
    }

    #[test]
    fn test_timeout_shrinks_with_window() {
        let mut line = FakeLine::new(vec![Step::Data(b"a"), Step::Data(b"b"), Step::Timeout]);
        read_until_deadline(&mut line, 1468, WINDOW).unwrap();
        assert_eq!(line.timeouts.len(), 3);
        assert!(line.timeouts.iter().all(|t| *t <= WINDOW));
        assert!(line.timeouts.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_elapsed_window_reads_nothing() {
        let mut line = FakeLine::new(vec![Step::Data(b"late")]);
        let bytes = read_until_deadline(&mut line, 1468, Duration::ZERO).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(line.reads, 0);
    }

    #[test]
    fn test_other_errors_propagate() {
        let mut line = FakeLine::new(vec![Step::Data(b"$O"), Step::Fail(io::ErrorKind::BrokenPipe)]);
        let err = read_until_deadline(&mut line, 1468, WINDOW).unwrap_err();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
