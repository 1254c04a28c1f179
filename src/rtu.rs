use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::constants::MAX_WORDS;
use crate::transport::{RawWords, TransportError};

pub const FN_READ_HOLDING: u8 = 0x03;
pub const FN_WRITE_SINGLE: u8 = 0x06;
pub const FN_WRITE_MULTIPLE: u8 = 0x10;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Large enough for a write-multiple request of `MAX_WORDS` registers.
pub const MAX_FRAME: usize = 32;

pub type Frame = heapless::Vec<u8, MAX_FRAME>;

pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

pub fn append_crc(frame: &mut Frame) -> Result<(), TransportError> {
    let crc = crc16_modbus(frame);
    frame
        .extend_from_slice(&crc.to_le_bytes())
        .map_err(|()| TransportError::Capacity)
}

pub fn validate_crc(frame: &[u8]) -> Result<(), TransportError> {
    if frame.len() < 4 {
        return Err(TransportError::Malformed("rtu frame too short".into()));
    }
    let body_len = frame.len() - 2;
    let expected = crc16_modbus(&frame[..body_len]);
    let seen = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
    if expected != seen {
        return Err(TransportError::Malformed(format!(
            "invalid frame crc: expected 0x{expected:04X}, got 0x{seen:04X}"
        )));
    }
    Ok(())
}

fn frame_from(body: &[u8]) -> Result<Frame, TransportError> {
    let mut frame = Frame::from_slice(body).map_err(|()| TransportError::Capacity)?;
    append_crc(&mut frame)?;
    Ok(frame)
}

pub fn build_read_request(slave: u8, address: u16, count: u16) -> Result<Frame, TransportError> {
    if count == 0 || usize::from(count) > MAX_WORDS {
        return Err(TransportError::Capacity);
    }
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    frame_from(&[slave, FN_READ_HOLDING, addr_hi, addr_lo, count_hi, count_lo])
}

pub fn build_write_single(slave: u8, address: u16, value: u16) -> Result<Frame, TransportError> {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [value_hi, value_lo] = value.to_be_bytes();
    frame_from(&[slave, FN_WRITE_SINGLE, addr_hi, addr_lo, value_hi, value_lo])
}

pub fn build_write_multiple(
    slave: u8,
    address: u16,
    values: &[u16],
) -> Result<Frame, TransportError> {
    if values.is_empty() || values.len() > MAX_WORDS {
        return Err(TransportError::Capacity);
    }
    let count = u16::try_from(values.len()).map_err(|_| TransportError::Capacity)?;
    let byte_count = u8::try_from(values.len() * 2).map_err(|_| TransportError::Capacity)?;
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    let mut frame = Frame::from_slice(&[
        slave,
        FN_WRITE_MULTIPLE,
        addr_hi,
        addr_lo,
        count_hi,
        count_lo,
        byte_count,
    ])
    .map_err(|()| TransportError::Capacity)?;
    for value in values {
        frame
            .extend_from_slice(&value.to_be_bytes())
            .map_err(|()| TransportError::Capacity)?;
    }
    append_crc(&mut frame)?;
    Ok(frame)
}

/// Bytes still to read after the address, function and third header byte.
pub fn remaining_len(function: u8, third: u8) -> usize {
    if function & EXCEPTION_FLAG != 0 {
        2
    } else if function == FN_READ_HOLDING {
        usize::from(third) + 2
    } else {
        // write echoes are fixed 8-byte frames
        5
    }
}

fn check_header(frame: &[u8], slave: u8, function: u8) -> Result<(), TransportError> {
    validate_crc(frame)?;
    if frame[0] != slave {
        return Err(TransportError::Malformed(format!(
            "unexpected response address: expected 0x{slave:02X}, got 0x{:02X}",
            frame[0]
        )));
    }
    if frame[1] == function | EXCEPTION_FLAG {
        return Err(TransportError::Exception(frame[2]));
    }
    if frame[1] != function {
        return Err(TransportError::Malformed(format!(
            "unexpected response function: expected 0x{function:02X}, got 0x{:02X}",
            frame[1]
        )));
    }
    Ok(())
}

pub fn parse_read_response(frame: &[u8], slave: u8, count: u16) -> Result<RawWords, TransportError> {
    check_header(frame, slave, FN_READ_HOLDING)?;
    let byte_count = usize::from(frame[2]);
    if frame.len() != byte_count + 5 {
        return Err(TransportError::Malformed(format!(
            "read response length mismatch: count={byte_count}, frame_len={}",
            frame.len()
        )));
    }
    if byte_count < usize::from(count) * 2 {
        return Err(TransportError::Malformed(format!(
            "short read response: {byte_count} bytes for {count} registers"
        )));
    }
    let mut words = RawWords::new();
    for chunk in frame[3..3 + byte_count].chunks_exact(2).take(usize::from(count)) {
        words
            .push(u16::from_be_bytes([chunk[0], chunk[1]]))
            .map_err(|_| TransportError::Capacity)?;
    }
    Ok(words)
}

/// Write replies echo the register address and either the value (0x06) or
/// the register count (0x10).
pub fn parse_write_response(
    frame: &[u8],
    slave: u8,
    function: u8,
    address: u16,
    echo: u16,
) -> Result<(), TransportError> {
    check_header(frame, slave, function)?;
    if frame.len() != 8 {
        return Err(TransportError::Malformed(format!(
            "write response length mismatch: got {}",
            frame.len()
        )));
    }
    let seen_address = u16::from_be_bytes([frame[2], frame[3]]);
    let seen_echo = u16::from_be_bytes([frame[4], frame[5]]);
    if seen_address != address || seen_echo != echo {
        return Err(TransportError::Malformed(format!(
            "write response echo mismatch: address=0x{seen_address:04X}, echo={seen_echo} expected address=0x{address:04X}, echo={echo}"
        )));
    }
    Ok(())
}

fn is_quiet(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

pub fn read_exact_with_timeout<R: Read + ?Sized>(
    port: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(read) => filled += read,
            Err(err) if is_quiet(err.kind()) => {}
            Err(err) => return Err(TransportError::Io(err)),
        }
        if filled < buf.len() && Instant::now() >= deadline {
            return Err(TransportError::Timeout);
        }
    }
    Ok(())
}

/// Reads the first non-zero byte. Some replies are preceded by stray 0x00
/// bytes; no slave answers from address 0, so they are never payload.
pub fn read_first_byte<R: Read + ?Sized>(
    port: &mut R,
    timeout: Duration,
) -> Result<u8, TransportError> {
    let deadline = Instant::now() + timeout;
    let mut byte = [0u8; 1];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        read_exact_with_timeout(port, &mut byte, remaining)?;
        if byte[0] != 0 {
            return Ok(byte[0]);
        }
    }
}

/// Discards whatever arrives until the line stays quiet or `window` elapses.
/// Returns how many bytes were dropped and how many of those were non-zero.
pub fn drain_idle<R: Read + ?Sized>(
    port: &mut R,
    window: Duration,
) -> Result<(usize, usize), TransportError> {
    let deadline = Instant::now() + window;
    let mut scratch = [0u8; 16];
    let mut dropped = 0;
    let mut non_zero = 0;
    while Instant::now() < deadline {
        match port.read(&mut scratch) {
            Ok(0) => break,
            Ok(read) => {
                dropped += read;
                non_zero += scratch[..read].iter().filter(|byte| **byte != 0).count();
            }
            Err(err) if is_quiet(err.kind()) => break,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok((dropped, non_zero))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::{
        FN_READ_HOLDING, FN_WRITE_MULTIPLE, FN_WRITE_SINGLE, Frame, append_crc,
        build_read_request, build_write_multiple, build_write_single, crc16_modbus, drain_idle,
        parse_read_response, parse_write_response, read_exact_with_timeout, read_first_byte,
        validate_crc,
    };
    use crate::transport::TransportError;

    fn with_crc(body: &[u8]) -> Frame {
        let mut frame = Frame::from_slice(body).expect("body should fit");
        append_crc(&mut frame).expect("crc should fit");
        frame
    }

    #[test]
    fn crc_matches_known_vector() {
        let crc = crc16_modbus(b"123456789");
        assert_eq!(crc, 0x4B37);
    }

    #[test]
    fn read_request_matches_reference_frame() {
        let frame = build_read_request(0x01, 0x0000, 0x0001).expect("request should build");
        assert_eq!(frame.as_slice(), &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn read_request_rejects_oversized_count() {
        let err = build_read_request(0x01, 0x09B0, 9).expect_err("count should be rejected");
        assert!(matches!(err, TransportError::Capacity));
    }

    #[test]
    fn write_single_places_address_and_value_big_endian() {
        let frame = build_write_single(0x01, 0x0400, 1).expect("request should build");
        assert_eq!(&frame[..6], &[0x01, FN_WRITE_SINGLE, 0x04, 0x00, 0x00, 0x01]);
        validate_crc(&frame).expect("crc should validate");
    }

    #[test]
    fn write_multiple_carries_count_and_payload() {
        let frame =
            build_write_multiple(0x01, 0x02A6, &[0x0000, 0x40A0]).expect("request should build");
        assert_eq!(
            &frame[..11],
            &[0x01, FN_WRITE_MULTIPLE, 0x02, 0xA6, 0x00, 0x02, 0x04, 0x00, 0x00, 0x40, 0xA0]
        );
        assert_eq!(frame.len(), 13);
        validate_crc(&frame).expect("crc should validate");
    }

    #[test]
    fn parses_read_response_words() {
        let frame = with_crc(&[0x01, FN_READ_HOLDING, 0x04, 0x00, 0x00, 0x40, 0xA0]);
        let words = parse_read_response(&frame, 0x01, 2).expect("response should parse");
        assert_eq!(words.as_slice(), &[0x0000, 0x40A0]);
    }

    #[test]
    fn short_read_response_is_rejected() {
        let frame = with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A]);
        let err = parse_read_response(&frame, 0x01, 2).expect_err("short reply should fail");
        assert!(err.to_string().contains("short read response"));
    }

    #[test]
    fn exception_reply_surfaces_code() {
        let frame = with_crc(&[0x01, FN_READ_HOLDING | 0x80, 0x02]);
        let err = parse_read_response(&frame, 0x01, 1).expect_err("exception should fail");
        assert!(matches!(err, TransportError::Exception(0x02)));
    }

    #[test]
    fn validate_crc_fails_for_tampered_frame() {
        let mut frame = with_crc(&[0x01, FN_READ_HOLDING, 0x02, 0x00, 0x7A]);
        frame[3] ^= 0xFF;
        let err = validate_crc(&frame).expect_err("crc should fail");
        assert!(err.to_string().contains("invalid frame crc"));
    }

    #[test]
    fn parse_write_response_rejects_wrong_echo() {
        let frame = with_crc(&[0x01, FN_WRITE_SINGLE, 0x04, 0x00, 0x00, 0x02]);
        let err = parse_write_response(&frame, 0x01, FN_WRITE_SINGLE, 0x0400, 1)
            .expect_err("wrong value should fail");
        assert!(err.to_string().contains("echo mismatch"));
    }

    #[test]
    fn read_exact_times_out_on_short_stream() {
        let mut port = Cursor::new(vec![0x01, 0x03]);
        let mut buf = [0u8; 4];
        let err = read_exact_with_timeout(&mut port, &mut buf, Duration::from_millis(10))
            .expect_err("stream is too short");
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn first_byte_skips_leading_zeros() {
        let mut port = Cursor::new(vec![0x00, 0x00, 0x00, 0x01, 0x03]);
        let first = read_first_byte(&mut port, Duration::from_millis(10)).expect("byte expected");
        assert_eq!(first, 0x01);
        assert_eq!(port.position(), 4);
    }

    #[test]
    fn drain_discards_trailing_bytes() {
        let mut port = Cursor::new(vec![0x00, 0x00, 0x00, 0x55]);
        let (dropped, non_zero) =
            drain_idle(&mut port, Duration::from_millis(100)).expect("drain should succeed");
        assert_eq!(dropped, 4);
        assert_eq!(non_zero, 1);
    }
}
