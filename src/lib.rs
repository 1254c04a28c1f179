//! Driver for the XY-TEK ultrasonic flow sensor on a half-duplex Modbus RTU
//! bus.
//!
//! ```text
//! PollScheduler -> SensorDriver -> TransactionClient -> Transport
//!                        ^                                  |
//!                        +------------ codec <--------------+
//! ```

pub mod backend;
pub mod client;
pub mod codec;
pub mod constants;
pub mod data;
pub mod driver;
pub mod input;
pub mod interface;
pub mod poll;
pub mod rtu;
pub mod sim;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use client::{TransactionClient, TransactionResult};
pub use constants::Command;
pub use data::{Readings, SystemStatus};
pub use driver::{Delay, DriverError, SensorDriver, StdDelay};
pub use poll::{PollScheduler, PollTarget};
pub use transport::{
    CallbackDirection, DirectionControl, NoDirectionControl, RawWords, Transport, TransportError,
};
