use tracing::{debug, warn};

use crate::constants::{Command, MAX_WORDS};
use crate::transport::{RawWords, Transport, TransportError};

/// Outcome of one read exchange; `Ok` carries exactly `word_count` words.
pub type TransactionResult = Result<RawWords, TransportError>;

/// One bus exchange per call, sized by the register map.
///
/// Calls take `&mut self`, so a second transaction cannot start while one is
/// outstanding.
pub struct TransactionClient<T> {
    transport: T,
}

impl<T: Transport> TransactionClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn read(&mut self, command: Command) -> TransactionResult {
        let count = usize::from(command.word_count);
        if count > MAX_WORDS {
            return Err(TransportError::Capacity);
        }
        let result = self
            .transport
            .read(command.start_address, command.word_count)
            .and_then(|mut words| {
                if words.len() < count {
                    return Err(TransportError::Malformed(format!(
                        "expected {count} words, received {}",
                        words.len()
                    )));
                }
                words.truncate(count);
                Ok(words)
            });
        match &result {
            Ok(words) => debug!(
                address = format_args!("0x{:04X}", command.start_address),
                words = ?words.as_slice(),
                "read ok"
            ),
            Err(err) => warn!(
                address = format_args!("0x{:04X}", command.start_address),
                count,
                %err,
                "read failed"
            ),
        }
        result
    }

    pub fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        let result = self.transport.write_one(address, value);
        log_write(address, &[value], &result);
        result
    }

    pub fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        let result = self.transport.write_many(address, values);
        log_write(address, values, &result);
        result
    }
}

fn log_write(address: u16, values: &[u16], result: &Result<(), TransportError>) {
    match result {
        Ok(()) => debug!(address = format_args!("0x{address:04X}"), ?values, "write acknowledged"),
        Err(err) => warn!(address = format_args!("0x{address:04X}"), ?values, %err, "write failed"),
    }
}
