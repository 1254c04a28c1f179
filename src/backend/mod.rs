use tracing::info;

use crate::interface::InterfaceMode;
use crate::transport::{NoDirectionControl, Transport, TransportError};
use crate::worker::TransportConfig;

pub mod serial;
pub mod sim;

pub use serial::{SerialLine, SerialTransport};
pub use sim::SimTransport;

pub fn build_transport(
    config: &TransportConfig,
) -> Result<Box<dyn Transport + Send>, TransportError> {
    match config.interface {
        InterfaceMode::Serial => {
            let port = config.port.as_deref().ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "serial port required",
                ))
            })?;
            info!(port, baud = config.baud, address = config.address, "opening serial transport");
            let transport = SerialTransport::open(
                port,
                config.baud,
                config.address,
                config.response_timeout,
                NoDirectionControl,
            )?;
            Ok(Box::new(transport))
        }
        InterfaceMode::Simulation => {
            info!("using simulated sensor");
            Ok(Box::new(SimTransport::new()))
        }
    }
}
