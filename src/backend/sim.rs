use crate::sim::SimState;
use crate::transport::{RawWords, Transport, TransportError};

// Modbus "illegal data address"
const ILLEGAL_ADDRESS: u8 = 0x02;

/// Serves register transactions from a [`SimState`], advancing it one step
/// per exchange.
#[derive(Debug, Default)]
pub struct SimTransport {
    sim: SimState,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            sim: SimState::new(),
        }
    }

    pub fn state_mut(&mut self) -> &mut SimState {
        &mut self.sim
    }
}

impl Transport for SimTransport {
    fn read(&mut self, address: u16, count: u16) -> Result<RawWords, TransportError> {
        self.sim.tick();
        let words = self
            .sim
            .read(address, count)
            .ok_or(TransportError::Exception(ILLEGAL_ADDRESS))?;
        RawWords::from_slice(&words).map_err(|()| TransportError::Capacity)
    }

    fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        self.write_many(address, &[value])
    }

    fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        self.sim.tick();
        if self.sim.write(address, values) {
            Ok(())
        } else {
            Err(TransportError::Exception(ILLEGAL_ADDRESS))
        }
    }
}
