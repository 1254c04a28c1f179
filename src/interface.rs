use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum InterfaceMode {
    /// Modbus RTU over an RS-485 serial adapter
    #[default]
    Serial,
    /// In-process simulated sensor
    Simulation,
}

impl InterfaceMode {
    pub const fn default_baud(self) -> u32 {
        match self {
            Self::Serial | Self::Simulation => 9_600,
        }
    }

    pub const fn default_address(self) -> u8 {
        match self {
            Self::Serial | Self::Simulation => 1,
        }
    }

    pub const fn needs_port(self) -> bool {
        matches!(self, Self::Serial)
    }
}
