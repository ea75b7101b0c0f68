//! TI INA219 current/voltage/power monitor
//!
//! The driver owns the bus handle and caches the configuration and
//! calibration it last wrote, so conversions never need to read them back.
//! It is meant to be owned by exactly one task; nothing in here is shared.

mod calibration;
mod registers;
mod sample;

pub use calibration::{Calibration, Scale};
pub use registers::{
    AdcMode, BusRange, Configuration, DEFAULT_ADDRESS, POWER_ON_CONFIG, Register, ShuntRange,
};
pub use sample::{RawSample, Reading, bus_v, current_ma, power_mw, shunt_mv};

use embassy_time::Duration;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::i2c::{Error as _, I2c};
use log::{debug, info};
use thiserror_no_std::Error;

use registers::RESET_BIT;

/// Errors raised by register transactions
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("INA219 bus transaction failed: {0:?}")]
    Bus(ErrorKind),
}

/// INA219 handle
///
/// The scale factors are only valid for the shunt range they were computed
/// for. Changing the shunt range drops the calibration until
/// [`Ina219::calibrate`] runs again.
pub struct Ina219<I> {
    i2c: I,
    address: u8,
    shunt_ohms: f32,
    config: u16,
    calibration: Option<Calibration>,
}

impl<I: I2c> Ina219<I> {
    /// Create a handle for the device at `address`. Nothing is written to the
    /// device until [`Self::configure`] is called.
    pub fn new(i2c: I, address: u8, shunt_ohms: f32) -> Self {
        Self {
            i2c,
            address,
            shunt_ohms,
            config: POWER_ON_CONFIG,
            calibration: None,
        }
    }

    pub async fn read_register(&mut self, reg: Register) -> Result<u16, SensorError> {
        let mut buf = [0; 2];
        self.i2c
            .write_read(self.address, &[reg.addr()], &mut buf)
            .await
            .map_err(|e| SensorError::Bus(e.kind()))?;
        Ok(u16::from_be_bytes(buf))
    }

    pub async fn write_register(&mut self, reg: Register, value: u16) -> Result<(), SensorError> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg.addr(), hi, lo])
            .await
            .map_err(|e| SensorError::Bus(e.kind()))
    }

    /// Reset all registers to their power-on values.
    pub async fn reset(&mut self) -> Result<(), SensorError> {
        self.write_register(Register::Config, RESET_BIT).await?;
        self.config = POWER_ON_CONFIG;
        self.calibration = None;
        debug!("INA219@{:#04x}: reset", self.address);
        Ok(())
    }

    /// Write `cfg` with continuous shunt and bus conversions selected.
    pub async fn configure(&mut self, cfg: &Configuration) -> Result<(), SensorError> {
        let reg = cfg.to_register();
        self.write_register(Register::Config, reg).await?;

        self.config = reg;
        if self
            .calibration
            .is_some_and(|cal| cal.shunt_range != cfg.shunt_range)
        {
            self.calibration = None;
        }

        debug!(
            "INA219@{:#04x}: config {:#06x} (bus {}, shunt {}, adc {:?}/{:?})",
            self.address,
            reg,
            cfg.bus_range.label(),
            cfg.shunt_range.label(),
            cfg.bus_adc,
            cfg.shunt_adc
        );
        Ok(())
    }

    /// The configuration last written to the device
    pub fn config(&self) -> Configuration {
        Configuration::from_register(self.config)
    }

    /// Compute and write the calibration for the cached shunt range.
    pub async fn calibrate(&mut self, shunt_ohms: f32) -> Result<(), SensorError> {
        let cal = Calibration::compute(self.config().shunt_range, shunt_ohms);
        self.write_register(Register::Calibration, cal.register).await?;

        self.shunt_ohms = shunt_ohms;
        self.calibration = Some(cal);

        info!(
            "INA219@{:#04x}: calibrated for {} over {} ohm (cal {}, {} A/bit)",
            self.address,
            cal.shunt_range.label(),
            shunt_ohms,
            cal.register,
            cal.scale.current_lsb
        );
        Ok(())
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Scale factors in effect, zero while uncalibrated.
    pub fn scale(&self) -> Scale {
        self.calibration.map(|cal| cal.scale).unwrap_or_default()
    }

    pub fn shunt_ohms(&self) -> f32 {
        self.shunt_ohms
    }

    /// Widen the bus range by one step. Returns `false` at the maximum.
    ///
    /// The bus range does not enter the calibration, so no recalibration
    /// is needed.
    pub async fn increase_bus_range(&mut self) -> Result<bool, SensorError> {
        let mut cfg = self.config();
        let Some(wider) = cfg.bus_range.widen() else {
            return Ok(false);
        };
        cfg.bus_range = wider;
        self.configure(&cfg).await?;
        Ok(true)
    }

    /// Widen the shunt range by one step and recalibrate. Returns `false`
    /// at the maximum.
    pub async fn increase_shunt_range(&mut self) -> Result<bool, SensorError> {
        let mut cfg = self.config();
        let Some(wider) = cfg.shunt_range.widen() else {
            return Ok(false);
        };
        cfg.shunt_range = wider;
        self.configure(&cfg).await?;
        self.calibrate(self.shunt_ohms).await?;
        Ok(true)
    }

    /// Capture bus, current and power registers as one sample.
    ///
    /// Power must be read last: reading it clears the conversion-ready flag
    /// in the bus register.
    pub async fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        let bus = self.read_register(Register::BusVoltage).await?;
        let current = self.read_register(Register::Current).await?;
        let power = self.read_register(Register::Power).await?;

        Ok(RawSample::new(bus, current, power, self.scale()))
    }

    pub async fn read_shunt_mv(&mut self) -> Result<f32, SensorError> {
        let reg = self.read_register(Register::ShuntVoltage).await?;
        Ok(shunt_mv(reg))
    }

    pub async fn read_bus_v(&mut self) -> Result<f32, SensorError> {
        let reg = self.read_register(Register::BusVoltage).await?;
        Ok(bus_v(reg))
    }

    /// Voltage on the supply side of the shunt
    pub async fn read_supply_v(&mut self) -> Result<f32, SensorError> {
        let bus = self.read_bus_v().await?;
        let shunt = self.read_shunt_mv().await?;
        Ok(bus + shunt / 1000.0)
    }

    pub async fn read_current_ma(&mut self) -> Result<f32, SensorError> {
        let reg = self.read_register(Register::Current).await?;
        Ok(current_ma(reg, self.scale().current_lsb))
    }

    pub async fn read_power_mw(&mut self) -> Result<f32, SensorError> {
        let reg = self.read_register(Register::Power).await?;
        Ok(power_mw(reg, self.scale().power_lsb))
    }

    pub fn conversion_time_us(&self) -> u32 {
        self.config().conversion_time_us()
    }

    pub fn conversion_time(&self) -> Duration {
        self.config().conversion_time()
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBus, Transfer};
    use embassy_futures::block_on;

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn meter_config() -> Configuration {
        Configuration {
            bus_range: BusRange::V16,
            shunt_range: ShuntRange::Mv320,
            bus_adc: AdcMode::Bits9,
            shunt_adc: AdcMode::Bits11,
        }
    }

    #[test]
    fn test_configure_writes_big_endian_register() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();

        let bus = ina.release();
        assert_eq!(bus.writes(), &[Transfer::new(ADDR, &[0x00, 0x18, 0x17])]);
    }

    #[test]
    fn test_calibrate_writes_calibration_register() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();

        let cal = *ina.calibration().unwrap();
        assert_eq!(cal.register, 4194);
        assert_eq!(ina.scale(), cal.scale);

        let bus = ina.release();
        assert_eq!(bus.writes()[1], Transfer::new(ADDR, &[0x05, 0x10, 0x62]));
    }

    #[test]
    fn test_repeated_calibration_is_identical() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();
        let first = *ina.calibration().unwrap();
        block_on(ina.calibrate(0.1)).unwrap();
        assert_eq!(*ina.calibration().unwrap(), first);

        let bus = ina.release();
        assert_eq!(bus.writes()[1], bus.writes()[2]);
    }

    #[test]
    fn test_read_raw_order_and_scale_snapshot() {
        let mut bus = ScriptedBus::new();
        bus.queue(Register::BusVoltage, (825 << 3) | 0b10);
        bus.queue(Register::Current, 1024);
        bus.queue(Register::Power, 169);

        let mut ina = Ina219::new(bus, ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();

        let sample = block_on(ina.read_raw()).unwrap();
        assert_eq!(sample.bus, (825 << 3) | 0b10);
        assert_eq!(sample.current, 1024);
        assert_eq!(sample.power, 169);
        assert_eq!(sample.scale, ina.scale());

        let bus = ina.release();
        assert_eq!(
            bus.reads(),
            &[Register::BusVoltage, Register::Current, Register::Power]
        );
    }

    #[test]
    fn test_read_raw_propagates_bus_error() {
        let mut bus = ScriptedBus::new();
        bus.fail_next_read(ErrorKind::Other);
        let mut ina = Ina219::new(bus, ADDR, 0.1);

        let err = block_on(ina.read_raw()).unwrap_err();
        assert_eq!(err, SensorError::Bus(ErrorKind::Other));
    }

    #[test]
    fn test_shunt_range_change_invalidates_calibration() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();

        // Same shunt range keeps the calibration
        let mut cfg = meter_config();
        cfg.bus_range = BusRange::V26;
        block_on(ina.configure(&cfg)).unwrap();
        assert!(ina.calibration().is_some());

        cfg.shunt_range = ShuntRange::Mv40;
        block_on(ina.configure(&cfg)).unwrap();
        assert!(ina.calibration().is_none());
        assert_eq!(ina.scale(), Scale::default());
    }

    #[test]
    fn test_increase_shunt_range_recalibrates() {
        let mut cfg = meter_config();
        cfg.shunt_range = ShuntRange::Mv40;
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&cfg)).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();

        assert!(block_on(ina.increase_shunt_range()).unwrap());
        assert_eq!(ina.config().shunt_range, ShuntRange::Mv80);
        let cal = ina.calibration().unwrap();
        assert_eq!(cal.shunt_range, ShuntRange::Mv80);
        assert_eq!(cal.register, 16777);
    }

    #[test]
    fn test_ranges_stop_at_maximum() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();

        assert!(!block_on(ina.increase_shunt_range()).unwrap());
        assert!(block_on(ina.increase_bus_range()).unwrap());
        assert!(!block_on(ina.increase_bus_range()).unwrap());
        assert_eq!(ina.config().bus_range, BusRange::V26);
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        block_on(ina.configure(&meter_config())).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();
        block_on(ina.reset()).unwrap();

        assert_eq!(ina.config(), Configuration::default());
        assert!(ina.calibration().is_none());
        let bus = ina.release();
        assert_eq!(
            bus.writes().last().unwrap(),
            &Transfer::new(ADDR, &[0x00, 0x80, 0x00])
        );
    }

    #[test]
    fn test_supply_voltage_adds_shunt_drop() {
        let mut bus = ScriptedBus::new();
        bus.queue(Register::BusVoltage, (1250 << 3) | 0b10);
        // 100 mV across the shunt
        bus.queue(Register::ShuntVoltage, 10_000);
        let mut ina = Ina219::new(bus, ADDR, 0.1);

        let supply = block_on(ina.read_supply_v()).unwrap();
        assert!((supply - 5.1).abs() < 1e-4);
    }

    #[test]
    fn test_conversion_time_follows_cached_config() {
        let mut ina = Ina219::new(ScriptedBus::new(), ADDR, 0.1);
        assert_eq!(ina.conversion_time_us(), 532 + 532);
        block_on(ina.configure(&meter_config())).unwrap();
        assert_eq!(ina.conversion_time_us(), 84 + 276);
    }
}
