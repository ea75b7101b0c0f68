//! Meter configuration with the build-time overrides applied

use picova_core::config::{ConfigError, MeterConfig, parse_address, parse_shunt_ohms};

pub fn meter_config() -> Result<MeterConfig, ConfigError> {
    let mut cfg = MeterConfig::default();

    if let Some(ohms) = option_env!("PICOVA_SHUNT_OHMS") {
        cfg.shunt_ohms = parse_shunt_ohms(ohms)?;
    }
    if let Some(address) = option_env!("PICOVA_SENSOR_ADDRESS") {
        cfg.address = parse_address(address)?;
    }

    cfg.validate()?;
    Ok(cfg)
}
