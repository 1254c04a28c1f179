use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{trace, warn};

use crate::rtu::{
    FN_WRITE_MULTIPLE, FN_WRITE_SINGLE, Frame, MAX_FRAME, build_read_request,
    build_write_multiple, build_write_single, drain_idle, parse_read_response,
    parse_write_response, read_exact_with_timeout, read_first_byte, remaining_len,
};
use crate::transport::{DirectionControl, RawWords, Transport, TransportError};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);
pub const DRAIN_WINDOW: Duration = Duration::from_millis(100);

/// A byte stream whose read timeout can be adjusted between phases.
pub trait SerialLine: Read + Write {
    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

impl SerialLine for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(std::io::Error::from)
    }
}

/// Modbus RTU master for a single slave on a half-duplex line.
pub struct SerialTransport<P, D> {
    port: P,
    direction: D,
    slave: u8,
    response_timeout: Duration,
    drain_window: Duration,
}

impl<D: DirectionControl> SerialTransport<Box<dyn SerialPort>, D> {
    pub fn open(
        path: &str,
        baud: u32,
        slave: u8,
        response_timeout: Duration,
        direction: D,
    ) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(response_timeout)
            .open()
            .map_err(std::io::Error::from)?;
        Ok(Self::new(port, slave, response_timeout, direction))
    }
}

impl<P: SerialLine, D: DirectionControl> SerialTransport<P, D> {
    pub fn new(port: P, slave: u8, response_timeout: Duration, direction: D) -> Self {
        Self {
            port,
            direction,
            slave,
            response_timeout,
            drain_window: DRAIN_WINDOW,
        }
    }

    #[must_use]
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Frame, TransportError> {
        let result = self.send_and_receive(request);
        self.drain();
        result
    }

    fn send_and_receive(&mut self, request: &[u8]) -> Result<Frame, TransportError> {
        self.port.set_timeout(self.response_timeout)?;

        self.direction.before_exchange();
        let sent = self
            .port
            .write_all(request)
            .and_then(|()| self.port.flush());
        self.direction.after_exchange();
        sent?;

        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<Frame, TransportError> {
        let mut header = [0u8; 3];
        header[0] = read_first_byte(&mut self.port, self.response_timeout)?;
        read_exact_with_timeout(&mut self.port, &mut header[1..], self.response_timeout)?;

        let tail_len = remaining_len(header[1], header[2]);
        if header.len() + tail_len > MAX_FRAME {
            return Err(TransportError::Malformed(format!(
                "reply byte count {} exceeds frame buffer",
                header[2]
            )));
        }
        let mut tail = [0u8; MAX_FRAME];
        read_exact_with_timeout(&mut self.port, &mut tail[..tail_len], self.response_timeout)?;

        let mut frame = Frame::from_slice(&header).map_err(|()| TransportError::Capacity)?;
        frame
            .extend_from_slice(&tail[..tail_len])
            .map_err(|()| TransportError::Capacity)?;
        Ok(frame)
    }

    /// Leaves the line idle for the next exchange.
    fn drain(&mut self) {
        if self.port.set_timeout(self.drain_window).is_err() {
            return;
        }
        match drain_idle(&mut self.port, self.drain_window) {
            Ok((0, _)) => {}
            Ok((dropped, 0)) => trace!(dropped, "drained zero bytes after exchange"),
            Ok((dropped, non_zero)) => {
                warn!(dropped, non_zero, "discarded unexpected bytes after exchange");
            }
            Err(err) => warn!(%err, "drain after exchange failed"),
        }
    }
}

impl<P: SerialLine, D: DirectionControl> Transport for SerialTransport<P, D> {
    fn read(&mut self, address: u16, count: u16) -> Result<RawWords, TransportError> {
        let request = build_read_request(self.slave, address, count)?;
        let reply = self.exchange(&request)?;
        parse_read_response(&reply, self.slave, count)
    }

    fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        let request = build_write_single(self.slave, address, value)?;
        let reply = self.exchange(&request)?;
        parse_write_response(&reply, self.slave, FN_WRITE_SINGLE, address, value)
    }

    fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        let request = build_write_multiple(self.slave, address, values)?;
        let reply = self.exchange(&request)?;
        let count = u16::try_from(values.len()).map_err(|_| TransportError::Capacity)?;
        parse_write_response(&reply, self.slave, FN_WRITE_MULTIPLE, address, count)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::rc::Rc;
    use std::time::Duration;

    use super::{SerialLine, SerialTransport};
    use crate::rtu::{FN_READ_HOLDING, FN_WRITE_MULTIPLE, FN_WRITE_SINGLE, Frame, append_crc};
    use crate::transport::{CallbackDirection, NoDirectionControl, Transport, TransportError};

    /// Replays one canned reply per request and records what was written.
    #[derive(Default)]
    struct ScriptedLine {
        replies: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        written: Vec<Vec<u8>>,
    }

    impl ScriptedLine {
        fn with_replies(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "quiet line"));
            }
            let mut read = 0;
            while read < buf.len() {
                match self.pending.pop_front() {
                    Some(byte) => {
                        buf[read] = byte;
                        read += 1;
                    }
                    None => break,
                }
            }
            Ok(read)
        }
    }

    impl Write for ScriptedLine {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.push(buf.to_vec());
            if let Some(reply) = self.replies.pop_front() {
                self.pending.extend(reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLine for ScriptedLine {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = Frame::from_slice(body).expect("body should fit");
        append_crc(&mut frame).expect("crc should fit");
        frame.to_vec()
    }

    fn transport(replies: Vec<Vec<u8>>) -> SerialTransport<ScriptedLine, NoDirectionControl> {
        SerialTransport::new(
            ScriptedLine::with_replies(replies),
            0x01,
            Duration::from_millis(20),
            NoDirectionControl,
        )
        .with_drain_window(Duration::from_millis(20))
    }

    #[test]
    fn reads_status_word() {
        let mut transport = transport(vec![with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A])]);
        let words = transport.read(0x0813, 1).expect("read should succeed");
        assert_eq!(words.as_slice(), &[122]);
    }

    #[test]
    fn leading_zero_bytes_are_skipped_before_reply() {
        let mut reply = vec![0x00, 0x00, 0x00];
        reply.extend(with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A]));
        let mut transport = transport(vec![reply]);
        let words = transport.read(0x0813, 1).expect("read should succeed");
        assert_eq!(words.as_slice(), &[122]);
    }

    #[test]
    fn trailing_zero_bytes_are_drained_so_next_exchange_stays_in_sync() {
        let mut first = with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A]);
        first.extend([0x00, 0x00]);
        let second = with_crc(&[0x01, FN_READ_HOLDING, 0x04, 0x00, 0x00, 0x40, 0xA0]);
        let mut transport = transport(vec![first, second]);

        transport.read(0x0813, 1).expect("first read should succeed");
        let words = transport.read(0x100A, 2).expect("second read should succeed");
        assert_eq!(words.as_slice(), &[0x0000, 0x40A0]);
        assert!(transport.port.pending.is_empty());
    }

    #[test]
    fn silent_slave_times_out() {
        let mut transport = transport(Vec::new());
        let err = transport.read(0x0813, 1).expect_err("read should time out");
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn corrupted_reply_is_malformed() {
        let mut reply = with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A]);
        reply[4] ^= 0x01;
        let mut transport = transport(vec![reply]);
        let err = transport.read(0x0813, 1).expect_err("crc should fail");
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn write_one_checks_echo() {
        let mut transport =
            transport(vec![with_crc(&[0x01, FN_WRITE_SINGLE, 0x04, 0x00, 0x00, 0x01])]);
        transport.write_one(0x0400, 1).expect("write should be acknowledged");
        assert_eq!(
            &transport.port.written[0][..6],
            &[0x01, FN_WRITE_SINGLE, 0x04, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn write_many_checks_register_count() {
        let mut transport =
            transport(vec![with_crc(&[0x01, FN_WRITE_MULTIPLE, 0x02, 0xA6, 0x00, 0x02])]);
        transport
            .write_many(0x02A6, &[0x0000, 0x40A0])
            .expect("write should be acknowledged");
    }

    #[test]
    fn direction_hooks_bracket_the_transmit_phase() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let before = Rc::clone(&log);
        let after = Rc::clone(&log);
        let mut transport = SerialTransport::new(
            ScriptedLine::with_replies(vec![with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x01])]),
            0x01,
            Duration::from_millis(20),
            CallbackDirection::new(
                move || before.borrow_mut().push("tx"),
                move || after.borrow_mut().push("rx"),
            ),
        );

        transport.read(0x09AD, 1).expect("read should succeed");
        transport.read(0x09AD, 1).expect_err("second read has no reply");

        assert_eq!(*log.borrow(), vec!["tx", "rx", "tx", "rx"]);
    }
}
