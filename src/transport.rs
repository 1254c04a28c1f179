//! The register bus as seen by the driver.
//!
//! A [`Transport`] performs exactly one request/response exchange per call.
//! Implementations own the half-duplex direction switching and must leave
//! the line idle (stray zero bytes drained) before returning.

use thiserror::Error;

use crate::constants::MAX_WORDS;

/// Words received by one read, bounded by the receive buffer capacity.
pub type RawWords = heapless::Vec<u16, MAX_WORDS>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("response timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("device exception code 0x{0:02X}")]
    Exception(u8),
    #[error("request exceeds the receive buffer")]
    Capacity,
    #[error("serial i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Transport {
    fn read(&mut self, address: u16, count: u16) -> Result<RawWords, TransportError>;
    fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError>;
    fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, address: u16, count: u16) -> Result<RawWords, TransportError> {
        (**self).read(address, count)
    }

    fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        (**self).write_one(address, value)
    }

    fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        (**self).write_many(address, values)
    }
}

/// Driver-enable switching around the transmit phase of an exchange.
pub trait DirectionControl {
    /// Called before the request is put on the wire.
    fn before_exchange(&mut self);
    /// Called once the request has been sent, before the reply is awaited.
    fn after_exchange(&mut self);
}

/// For adapters that switch direction in hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDirectionControl;

impl DirectionControl for NoDirectionControl {
    fn before_exchange(&mut self) {}

    fn after_exchange(&mut self) {}
}

/// Direction control from a pair of pin-toggling closures.
pub struct CallbackDirection<B, A> {
    before: B,
    after: A,
}

impl<B: FnMut(), A: FnMut()> CallbackDirection<B, A> {
    pub fn new(before: B, after: A) -> Self {
        Self { before, after }
    }
}

impl<B: FnMut(), A: FnMut()> DirectionControl for CallbackDirection<B, A> {
    fn before_exchange(&mut self) {
        (self.before)();
    }

    fn after_exchange(&mut self) {
        (self.after)();
    }
}
