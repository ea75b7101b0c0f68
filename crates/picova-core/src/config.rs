use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::ina219::{AdcMode, BusRange, Configuration, DEFAULT_ADDRESS, ShuntRange};

pub const DEFAULT_SHUNT_OHMS: f32 = 0.1;
pub const DEFAULT_DISPLAY_PERIOD_MS: u32 = 250;

/// Smallest accepted shunt. Full-scale readings on it still fit a report line.
pub const MIN_SHUNT_OHMS: f32 = 1e-3;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("shunt resistance must be at least 0.001 ohm, got {0}")]
    ShuntOhms(f32),
    #[error("{0:#04x} is not a 7-bit I2C address")]
    Address(u8),
    #[error("display period must be non-zero")]
    DisplayPeriod,
    #[error("could not parse {0}")]
    Unparsable(&'static str),
}

/// Startup configuration of the meter
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    /// 7-bit I2C address of the INA219
    pub address: u8,
    pub shunt_ohms: f32,
    /// Configuration written before the first calibration
    pub initial: Configuration,
    pub display_period_ms: u32,
    /// Widen ranges on saturation
    pub auto_range: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            shunt_ohms: DEFAULT_SHUNT_OHMS,
            initial: Configuration {
                bus_range: BusRange::V16,
                shunt_range: ShuntRange::Mv320,
                bus_adc: AdcMode::Bits9,
                shunt_adc: AdcMode::Bits11,
            },
            display_period_ms: DEFAULT_DISPLAY_PERIOD_MS,
            auto_range: true,
        }
    }
}

impl MeterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.shunt_ohms.is_finite() && self.shunt_ohms >= MIN_SHUNT_OHMS) {
            return Err(ConfigError::ShuntOhms(self.shunt_ohms));
        }
        if self.address > 0x7F {
            return Err(ConfigError::Address(self.address));
        }
        if self.display_period_ms == 0 {
            return Err(ConfigError::DisplayPeriod);
        }
        Ok(())
    }

    /// Sampling period: one full conversion of the initial configuration.
    /// Range changes leave the ADC modes alone, so this holds for the run.
    pub const fn sample_period(&self) -> Duration {
        self.initial.conversion_time()
    }

    pub const fn display_period(&self) -> Duration {
        Duration::from_millis(self.display_period_ms as u64)
    }
}

/// Parse a 7-bit address written as decimal or `0x`-prefixed hex.
pub fn parse_address(s: &str) -> Result<u8, ConfigError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(ConfigError::Address(address)),
        Err(_) => Err(ConfigError::Unparsable("sensor address")),
    }
}

pub fn parse_shunt_ohms(s: &str) -> Result<f32, ConfigError> {
    s.trim()
        .parse::<f32>()
        .map_err(|_| ConfigError::Unparsable("shunt resistance"))
}
