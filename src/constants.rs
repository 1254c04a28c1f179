/// A register command: where it starts and how many 16-bit words it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub start_address: u16,
    pub word_count: u16,
}

impl Command {
    pub const fn new(start_address: u16, word_count: u16) -> Self {
        Self {
            start_address,
            word_count,
        }
    }
}

pub const CMD_APP_UPDATE_REQ: Command = Command::new(0x0200, 1);
pub const CMD_TEMP_PERIOD: Command = Command::new(0x02A2, 1);
pub const CMD_ZERO_CAL_TIME: Command = Command::new(0x02A6, 2);
pub const CMD_TEMP_ENABLE: Command = Command::new(0x02A8, 1);
pub const CMD_RESET_VOLUME: Command = Command::new(0x0400, 1);
pub const CMD_ZERO_CAL_START: Command = Command::new(0x0401, 1);
pub const CMD_SEARCH_DEVICE: Command = Command::new(0x0613, 2);
pub const CMD_APP_REQ_VOLUME: Command = Command::new(0x0809, 2);
pub const CMD_SYSTEM_STATUS: Command = Command::new(0x0813, 1);
pub const CMD_TEMPERATURE: Command = Command::new(0x0815, 1);
pub const CMD_ZERO_CAL_DONE: Command = Command::new(0x09AD, 1);
pub const CMD_ZERO_CAL_VALUE: Command = Command::new(0x09AE, 2);
pub const CMD_USER_INFO: Command = Command::new(0x09B0, 8);
pub const CMD_BUBBLE_STATUS: Command = Command::new(0x1000, 2);
pub const CMD_VOLUME_NET: Command = Command::new(0x1002, 2);
pub const CMD_VOLUME_POS: Command = Command::new(0x1004, 2);
pub const CMD_VOLUME_NEG: Command = Command::new(0x1006, 2);
pub const CMD_FLOW_RATE_REALTIME: Command = Command::new(0x1008, 2);
// 10 Hz update; steadier than the realtime register.
pub const CMD_FLOW_RATE_AVG_1S: Command = Command::new(0x100A, 2);
pub const CMD_FLOW_RATE_AVG_2S: Command = Command::new(0x100C, 2);

/// Receive buffer capacity in words; `CMD_USER_INFO` is the widest command.
pub const MAX_WORDS: usize = 8;

/// "XYKJ" as reassembled from the two identity words, low word first.
pub const DEVICE_TAG: u32 = u32::from_le_bytes(*b"XYKJ");

pub const STATUS_ZERO_CALIBRATING: u8 = 12;
pub const STATUS_PARAMETER_ERROR: u8 = 121;
pub const STATUS_RUNNING: u8 = 122;
pub const STATUS_NO_SIGNAL: u8 = 126;

pub const FLAG_ON: u16 = 1;

/// Zero calibration duration written before starting, in seconds.
pub const ZERO_CAL_SECONDS: f32 = 5.0;
/// Temperature sampling period written by `enable_temperature`, in seconds.
pub const TEMP_PERIOD_SECONDS: u16 = 1;
/// Pause between the two writes of a sequenced command, in milliseconds.
pub const SETTLE_DELAY_MS: u32 = 50;
