use std::collections::BTreeMap;

use crate::codec::{decode_float, encode_float, encode_u32};
use crate::constants::{
    CMD_APP_REQ_VOLUME, CMD_BUBBLE_STATUS, CMD_FLOW_RATE_AVG_1S, CMD_FLOW_RATE_AVG_2S,
    CMD_FLOW_RATE_REALTIME, CMD_RESET_VOLUME, CMD_SEARCH_DEVICE, CMD_SYSTEM_STATUS,
    CMD_TEMP_ENABLE, CMD_TEMP_PERIOD, CMD_TEMPERATURE, CMD_USER_INFO, CMD_VOLUME_NEG,
    CMD_VOLUME_NET, CMD_VOLUME_POS, CMD_ZERO_CAL_DONE, CMD_ZERO_CAL_START, CMD_ZERO_CAL_TIME,
    CMD_ZERO_CAL_VALUE, Command, DEVICE_TAG, FLAG_ON, STATUS_RUNNING, STATUS_ZERO_CALIBRATING,
};

/// Seconds of sensor time that pass per simulated transaction.
const TICK_SECONDS: f32 = 0.1;
const AMBIENT_TENTHS_C: u16 = 231;

/// An in-memory XY-TEK sensor: flow wanders around a set point, volumes
/// integrate it, and the write-side commands take effect.
#[derive(Debug, Clone)]
pub struct SimState {
    registers: BTreeMap<u16, u16>,
    set_point: f32,
    flow_rate: f32,
    flow_avg_1s: f32,
    flow_avg_2s: f32,
    volume_pos: f32,
    volume_neg: f32,
    temp_enabled: bool,
    temp_period: u16,
    zero_cal_time: f32,
    zero_cal_remaining: f32,
    zero_cal_done: bool,
    status: u16,
    step: u32,
}

impl SimState {
    pub fn new() -> Self {
        let mut sim = Self {
            registers: BTreeMap::new(),
            set_point: 12.0,
            flow_rate: 0.0,
            flow_avg_1s: 0.0,
            flow_avg_2s: 0.0,
            volume_pos: 0.0,
            volume_neg: 0.0,
            temp_enabled: false,
            temp_period: 0,
            zero_cal_time: 0.0,
            zero_cal_remaining: 0.0,
            zero_cal_done: false,
            status: u16::from(STATUS_RUNNING),
            step: 0,
        };
        sim.set_words(CMD_USER_INFO, &user_info_words(b"XYTEK SIMULATOR"));
        sim.sync_registers();
        sim
    }

    pub fn set_flow(&mut self, set_point: f32) {
        self.set_point = set_point;
    }

    pub fn tick(&mut self) {
        self.step = self.step.wrapping_add(1);
        let ripple = if self.step.is_multiple_of(2) { 0.05 } else { -0.05 };
        self.flow_rate += (self.set_point - self.flow_rate) * 0.3 + ripple;
        self.flow_avg_1s += (self.flow_rate - self.flow_avg_1s) * 0.5;
        self.flow_avg_2s += (self.flow_rate - self.flow_avg_2s) * 0.25;

        // flow is per minute
        let delta = self.flow_rate * TICK_SECONDS / 60.0;
        if delta >= 0.0 {
            self.volume_pos += delta;
        } else {
            self.volume_neg -= delta;
        }

        if self.zero_cal_remaining > 0.0 {
            self.zero_cal_remaining -= TICK_SECONDS;
            if self.zero_cal_remaining <= 0.0 {
                self.zero_cal_done = true;
                self.status = u16::from(STATUS_RUNNING);
            }
        }

        self.sync_registers();
    }

    pub fn read(&self, address: u16, count: u16) -> Option<Vec<u16>> {
        (0..count)
            .map(|index| {
                let register = address.checked_add(index)?;
                self.registers.get(&register).copied()
            })
            .collect()
    }

    /// Applies a write; `false` for registers the sensor does not accept.
    pub fn write(&mut self, address: u16, values: &[u16]) -> bool {
        match address {
            a if a == CMD_RESET_VOLUME.start_address && values == [FLAG_ON] => {
                self.volume_pos = 0.0;
                self.volume_neg = 0.0;
            }
            a if a == CMD_ZERO_CAL_START.start_address && values == [FLAG_ON] => {
                self.zero_cal_remaining = self.zero_cal_time;
                self.zero_cal_done = false;
                self.status = u16::from(STATUS_ZERO_CALIBRATING);
            }
            a if a == CMD_ZERO_CAL_TIME.start_address && values.len() == 2 => {
                self.zero_cal_time = decode_float(values, 0);
            }
            a if a == CMD_TEMP_PERIOD.start_address && values.len() == 1 => {
                self.temp_period = values[0];
            }
            a if a == CMD_TEMP_ENABLE.start_address && values.len() == 1 => {
                self.temp_enabled = values[0] == FLAG_ON;
            }
            _ => return false,
        }
        self.sync_registers();
        true
    }

    fn sync_registers(&mut self) {
        let net = self.volume_pos - self.volume_neg;
        let temperature = if self.temp_enabled && self.temp_period > 0 {
            AMBIENT_TENTHS_C + u16::try_from(self.step % 5).unwrap_or(0)
        } else {
            0
        };
        let bubbles = u32::from(self.flow_rate.abs() < 0.5);

        self.set_words(CMD_SEARCH_DEVICE, &encode_u32(DEVICE_TAG));
        self.set_words(CMD_SYSTEM_STATUS, &[self.status]);
        self.set_words(CMD_TEMPERATURE, &[temperature]);
        self.set_words(CMD_TEMP_PERIOD, &[self.temp_period]);
        self.set_words(CMD_TEMP_ENABLE, &[u16::from(self.temp_enabled)]);
        self.set_words(CMD_ZERO_CAL_TIME, &encode_float(self.zero_cal_time));
        self.set_words(CMD_ZERO_CAL_DONE, &[u16::from(self.zero_cal_done)]);
        self.set_words(CMD_ZERO_CAL_VALUE, &encode_float(0.012));
        self.set_words(CMD_BUBBLE_STATUS, &encode_u32(bubbles));
        self.set_words(CMD_APP_REQ_VOLUME, &encode_float(net));
        self.set_words(CMD_VOLUME_NET, &encode_float(net));
        self.set_words(CMD_VOLUME_POS, &encode_float(self.volume_pos));
        self.set_words(CMD_VOLUME_NEG, &encode_float(self.volume_neg));
        self.set_words(CMD_FLOW_RATE_REALTIME, &encode_float(self.flow_rate));
        self.set_words(CMD_FLOW_RATE_AVG_1S, &encode_float(self.flow_avg_1s));
        self.set_words(CMD_FLOW_RATE_AVG_2S, &encode_float(self.flow_avg_2s));
    }

    fn set_words(&mut self, command: Command, words: &[u16]) {
        for (register, word) in (command.start_address..).zip(words) {
            self.registers.insert(register, *word);
        }
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}

fn user_info_words(text: &[u8]) -> Vec<u16> {
    let mut padded = [b' '; 16];
    let len = text.len().min(padded.len());
    padded[..len].copy_from_slice(&text[..len]);
    padded
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
