use std::fmt;

use crate::constants::{
    DEVICE_TAG, STATUS_NO_SIGNAL, STATUS_PARAMETER_ERROR, STATUS_RUNNING, STATUS_ZERO_CALIBRATING,
};

/// Operating state reported in the low byte of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    ZeroCalibrating,
    ParameterError,
    Running,
    /// No ultrasonic echo: empty tube or a bubble in the channel.
    NoSignal,
    Unknown(u8),
}

impl SystemStatus {
    pub fn from_word(word: u16) -> Self {
        let [_, code] = word.to_be_bytes();
        match code {
            STATUS_ZERO_CALIBRATING => Self::ZeroCalibrating,
            STATUS_PARAMETER_ERROR => Self::ParameterError,
            STATUS_RUNNING => Self::Running,
            STATUS_NO_SIGNAL => Self::NoSignal,
            other => Self::Unknown(other),
        }
    }

    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCalibrating => f.write_str("zero-calibrating"),
            Self::ParameterError => f.write_str("parameter-error"),
            Self::Running => f.write_str("running"),
            Self::NoSignal => f.write_str("no-signal"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Last successfully decoded value of every quantity; `None` until first read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub flow_rate: Option<f32>,
    pub flow_rate_realtime: Option<f32>,
    pub flow_rate_avg2s: Option<f32>,
    pub volume_net: Option<f32>,
    pub volume_pos: Option<f32>,
    pub volume_neg: Option<f32>,
    /// Tenths of a degree Celsius.
    pub temperature: Option<u16>,
    pub system_status: Option<u16>,
    pub device_tag: Option<u32>,
    pub zero_cal_done: Option<bool>,
    pub zero_cal_value: Option<f32>,
    pub bubble_status: Option<u32>,
}

impl Readings {
    pub fn temperature_celsius(&self) -> Option<f32> {
        self.temperature.map(|raw| f32::from(raw) / 10.0)
    }

    pub fn status(&self) -> Option<SystemStatus> {
        self.system_status.map(SystemStatus::from_word)
    }

    pub fn device_found(&self) -> bool {
        self.device_tag == Some(DEVICE_TAG)
    }

    pub fn has_bubble_now(&self) -> Option<bool> {
        self.bubble_status.map(|bits| bits & 1 == 1)
    }
}

impl fmt::Display for Readings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_field(f, "flow", self.flow_rate)?;
        write_field(f, " net", self.volume_net)?;
        if self.volume_pos.is_some() || self.volume_neg.is_some() {
            write_field(f, " pos", self.volume_pos)?;
            write_field(f, " neg", self.volume_neg)?;
        }
        if let Some(celsius) = self.temperature_celsius() {
            write!(f, " temp={celsius:.1}C")?;
        }
        if let Some(status) = self.status() {
            write!(f, " status={status}")?;
        }
        Ok(())
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, name: &str, value: Option<f32>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{name}={value:.3}"),
        None => write!(f, "{name}=--"),
    }
}

#[cfg(test)]
mod tests {
    use super::{Readings, SystemStatus};
    use crate::constants::DEVICE_TAG;

    #[test]
    fn status_uses_low_byte_only() {
        assert_eq!(SystemStatus::from_word(0x017A), SystemStatus::Running);
        assert_eq!(SystemStatus::from_word(12), SystemStatus::ZeroCalibrating);
        assert_eq!(SystemStatus::from_word(126), SystemStatus::NoSignal);
        assert_eq!(SystemStatus::from_word(121), SystemStatus::ParameterError);
        assert_eq!(SystemStatus::from_word(0x0005), SystemStatus::Unknown(5));
    }

    #[test]
    fn temperature_is_reported_in_tenths() {
        let readings = Readings {
            temperature: Some(235),
            ..Readings::default()
        };
        let celsius = readings.temperature_celsius().expect("temperature cached");
        assert!((celsius - 23.5).abs() < 1e-4);
    }

    #[test]
    fn device_found_requires_tag_match() {
        let mut readings = Readings::default();
        assert!(!readings.device_found());
        readings.device_tag = Some(0x1234_5678);
        assert!(!readings.device_found());
        readings.device_tag = Some(DEVICE_TAG);
        assert!(readings.device_found());
    }

    #[test]
    fn display_marks_missing_values() {
        let readings = Readings {
            flow_rate: Some(1.5),
            system_status: Some(122),
            ..Readings::default()
        };
        assert_eq!(readings.to_string(), "flow=1.500 net=-- status=running");
    }
}
