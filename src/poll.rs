use std::fmt;

use tracing::debug;

use crate::driver::{Delay, DriverError, SensorDriver};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    FlowRate,
    VolumeNet,
    VolumePos,
    VolumeNeg,
    Temperature,
    Status,
}

impl PollTarget {
    fn refresh<T: Transport, D: Delay>(
        self,
        driver: &mut SensorDriver<T, D>,
    ) -> Result<(), DriverError> {
        match self {
            Self::FlowRate => driver.read_flowrate().map(drop),
            Self::VolumeNet => driver.read_volume_net().map(drop),
            Self::VolumePos => driver.read_volume_pos().map(drop),
            Self::VolumeNeg => driver.read_volume_neg().map(drop),
            Self::Temperature => driver.read_temperature().map(drop),
            Self::Status => driver.read_status().map(drop),
        }
    }
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FlowRate => "flow-rate",
            Self::VolumeNet => "volume-net",
            Self::VolumePos => "volume-pos",
            Self::VolumeNeg => "volume-neg",
            Self::Temperature => "temperature",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

const DEFAULT_ROTATION: [PollTarget; 2] = [PollTarget::FlowRate, PollTarget::VolumeNet];

/// Round-robin refresh: one read per tick, cycling through the rotation.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    rotation: Vec<PollTarget>,
    stage: usize,
    last_tick_ms: Option<u64>,
}

impl PollScheduler {
    /// Returns `None` for an empty rotation.
    pub fn new(rotation: Vec<PollTarget>) -> Option<Self> {
        if rotation.is_empty() {
            return None;
        }
        Some(Self {
            rotation,
            stage: 0,
            last_tick_ms: None,
        })
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn rotation(&self) -> &[PollTarget] {
        &self.rotation
    }

    pub fn last_tick_ms(&self) -> Option<u64> {
        self.last_tick_ms
    }

    /// Issues exactly one read and advances the stage whether or not it
    /// succeeded. `now_ms` is recorded but does not drive the rotation.
    pub fn tick<T: Transport, D: Delay>(
        &mut self,
        driver: &mut SensorDriver<T, D>,
        now_ms: u64,
    ) -> (PollTarget, bool) {
        let target = self.rotation[self.stage];
        let ok = target.refresh(driver).is_ok();
        debug!(%target, ok, now_ms, "poll tick");
        self.stage = (self.stage + 1) % self.rotation.len();
        self.last_tick_ms = Some(now_ms);
        (target, ok)
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self {
            rotation: DEFAULT_ROTATION.to_vec(),
            stage: 0,
            last_tick_ms: None,
        }
    }
}
