//! Command-level access to one XY-TEK ultrasonic flow sensor.
//!
//! Every operation is a single best-effort attempt. Reads cache the decoded
//! value only on success, so a failed exchange leaves the previous value in
//! place.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::client::TransactionClient;
use crate::codec::{decode_ascii, decode_float, decode_u16, decode_u32, encode_float};
use crate::constants::{
    CMD_BUBBLE_STATUS, CMD_FLOW_RATE_AVG_1S, CMD_FLOW_RATE_AVG_2S, CMD_FLOW_RATE_REALTIME,
    CMD_RESET_VOLUME, CMD_SEARCH_DEVICE, CMD_SYSTEM_STATUS, CMD_TEMP_ENABLE, CMD_TEMP_PERIOD,
    CMD_TEMPERATURE, CMD_USER_INFO, CMD_VOLUME_NEG, CMD_VOLUME_NET, CMD_VOLUME_POS,
    CMD_ZERO_CAL_DONE, CMD_ZERO_CAL_START, CMD_ZERO_CAL_TIME, CMD_ZERO_CAL_VALUE, Command,
    DEVICE_TAG, FLAG_ON, SETTLE_DELAY_MS, TEMP_PERIOD_SECONDS, ZERO_CAL_SECONDS,
};
use crate::data::{Readings, SystemStatus};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// One step of a two-write command failed; earlier steps are not undone.
    #[error("sequenced write failed")]
    Sequence(#[source] TransportError),
}

pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

pub struct SensorDriver<T, D = StdDelay> {
    client: TransactionClient<T>,
    delay: D,
    readings: Readings,
    user_info: Option<String>,
}

impl<T: Transport> SensorDriver<T> {
    pub fn new(transport: T) -> Self {
        Self::with_delay(transport, StdDelay)
    }
}

impl<T: Transport, D: Delay> SensorDriver<T, D> {
    pub fn with_delay(transport: T, delay: D) -> Self {
        Self {
            client: TransactionClient::new(transport),
            delay,
            readings: Readings::default(),
            user_info: None,
        }
    }

    pub fn readings(&self) -> Readings {
        self.readings
    }

    pub fn user_info(&self) -> Option<&str> {
        self.user_info.as_deref()
    }

    pub fn system_status(&self) -> Option<SystemStatus> {
        self.readings.status()
    }

    pub fn temperature_celsius(&self) -> Option<f32> {
        self.readings.temperature_celsius()
    }

    pub fn device_found(&self) -> bool {
        self.readings.device_found()
    }

    pub fn client(&self) -> &TransactionClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut TransactionClient<T> {
        &mut self.client
    }

    fn read_with<V>(
        &mut self,
        command: Command,
        decode: impl FnOnce(&[u16]) -> V,
    ) -> Result<V, DriverError> {
        let words = self.client.read(command)?;
        Ok(decode(words.as_slice()))
    }

    /// Reads the identity tag. Succeeds whenever the exchange does; compare
    /// the tag with [`DEVICE_TAG`] (or call [`Self::device_found`]) to
    /// confirm the sensor model.
    pub fn search_device(&mut self) -> Result<u32, DriverError> {
        let tag = self.read_with(CMD_SEARCH_DEVICE, |words| decode_u32(words, 0, 1))?;
        self.readings.device_tag = Some(tag);
        if tag == DEVICE_TAG {
            info!("XY-TEK flow sensor found");
        } else {
            warn!(tag = format_args!("0x{tag:08X}"), "unexpected device tag");
        }
        Ok(tag)
    }

    pub fn read_status(&mut self) -> Result<u16, DriverError> {
        let status = self.read_with(CMD_SYSTEM_STATUS, |words| decode_u16(words, 0))?;
        self.readings.system_status = Some(status);
        Ok(status)
    }

    /// 1-second moving average; steadier than the realtime register.
    pub fn read_flowrate(&mut self) -> Result<f32, DriverError> {
        let flow = self.read_with(CMD_FLOW_RATE_AVG_1S, |words| decode_float(words, 0))?;
        self.readings.flow_rate = Some(flow);
        Ok(flow)
    }

    pub fn read_flowrate_realtime(&mut self) -> Result<f32, DriverError> {
        let flow = self.read_with(CMD_FLOW_RATE_REALTIME, |words| decode_float(words, 0))?;
        self.readings.flow_rate_realtime = Some(flow);
        Ok(flow)
    }

    pub fn read_flowrate_avg2s(&mut self) -> Result<f32, DriverError> {
        let flow = self.read_with(CMD_FLOW_RATE_AVG_2S, |words| decode_float(words, 0))?;
        self.readings.flow_rate_avg2s = Some(flow);
        Ok(flow)
    }

    pub fn read_volume_net(&mut self) -> Result<f32, DriverError> {
        let volume = self.read_with(CMD_VOLUME_NET, |words| decode_float(words, 0))?;
        self.readings.volume_net = Some(volume);
        Ok(volume)
    }

    pub fn read_volume_pos(&mut self) -> Result<f32, DriverError> {
        let volume = self.read_with(CMD_VOLUME_POS, |words| decode_float(words, 0))?;
        self.readings.volume_pos = Some(volume);
        Ok(volume)
    }

    pub fn read_volume_neg(&mut self) -> Result<f32, DriverError> {
        let volume = self.read_with(CMD_VOLUME_NEG, |words| decode_float(words, 0))?;
        self.readings.volume_neg = Some(volume);
        Ok(volume)
    }

    /// Raw temperature in tenths of a degree; zero until sampling is enabled.
    pub fn read_temperature(&mut self) -> Result<u16, DriverError> {
        let raw = self.read_with(CMD_TEMPERATURE, |words| decode_u16(words, 0))?;
        self.readings.temperature = Some(raw);
        Ok(raw)
    }

    pub fn read_zero_cal_done(&mut self) -> Result<bool, DriverError> {
        let done = self.read_with(CMD_ZERO_CAL_DONE, |words| decode_u16(words, 0) != 0)?;
        self.readings.zero_cal_done = Some(done);
        Ok(done)
    }

    pub fn read_zero_cal_value(&mut self) -> Result<f32, DriverError> {
        let offset = self.read_with(CMD_ZERO_CAL_VALUE, |words| decode_float(words, 0))?;
        self.readings.zero_cal_value = Some(offset);
        Ok(offset)
    }

    /// Bubble flags for the last 32 work cycles; bit 0 is the current one.
    pub fn read_bubble_status(&mut self) -> Result<u32, DriverError> {
        let bits = self.read_with(CMD_BUBBLE_STATUS, |words| decode_u32(words, 0, 1))?;
        self.readings.bubble_status = Some(bits);
        Ok(bits)
    }

    pub fn read_user_info(&mut self) -> Result<String, DriverError> {
        let text = self.read_with(CMD_USER_INFO, decode_ascii)?;
        self.user_info = Some(text.clone());
        Ok(text)
    }

    pub fn reset_volume(&mut self) -> Result<(), DriverError> {
        self.client.write_one(CMD_RESET_VOLUME.start_address, FLAG_ON)?;
        Ok(())
    }

    /// Writes the calibration time, then starts the calibration. The start
    /// flag is never written if the time write fails.
    pub fn zero_calibration(&mut self) -> Result<(), DriverError> {
        let words = encode_float(ZERO_CAL_SECONDS);
        self.sequenced(
            |client| client.write_many(CMD_ZERO_CAL_TIME.start_address, &words),
            CMD_ZERO_CAL_START,
        )
    }

    pub fn enable_temperature(&mut self) -> Result<(), DriverError> {
        self.sequenced(
            |client| client.write_one(CMD_TEMP_PERIOD.start_address, TEMP_PERIOD_SECONDS),
            CMD_TEMP_ENABLE,
        )
    }

    fn sequenced(
        &mut self,
        first: impl FnOnce(&mut TransactionClient<T>) -> Result<(), TransportError>,
        flag: Command,
    ) -> Result<(), DriverError> {
        let result = first(&mut self.client).and_then(|()| {
            self.delay.delay_ms(SETTLE_DELAY_MS);
            self.client.write_one(flag.start_address, FLAG_ON)
        });
        result.map_err(|err| {
            warn!(
                flag = format_args!("0x{:04X}", flag.start_address),
                %err,
                "sequenced write failed"
            );
            DriverError::Sequence(err)
        })
    }
}
