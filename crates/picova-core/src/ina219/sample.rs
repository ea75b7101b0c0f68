//! Raw register snapshots and their conversion to physical units
//!
//! Everything here is pure: reading the bus is kept apart from the number
//! crunching so a sample can cross task boundaries and be converted later.

use super::calibration::Scale;
use super::registers::{BUS_CNVR, BUS_OVF};

/// Bus register resolution in volts
const BUS_LSB_V: f32 = 4e-3;

/// Shunt register resolution in millivolts
const SHUNT_LSB_MV: f32 = 10e-3;

/// Current register magnitude above which the shunt ADC is considered clipped
const SHUNT_NEARLY_FULL_SCALE: i16 = 0x7FF8;

/// Bus reading (in 4 mV steps) above which a 16 V range is about to overflow
const BUS_NEARLY_FULL_SCALE_16V: u16 = 0xF98;

/// Registers captured by one read cycle, together with the scale in effect
/// when they were read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    pub bus: u16,
    pub power: u16,
    pub current: u16,
    pub scale: Scale,
}

impl RawSample {
    pub const fn new(bus: u16, current: u16, power: u16, scale: Scale) -> Self {
        Self {
            bus,
            power,
            current,
            scale,
        }
    }

    /// The power or current calculation overflowed
    pub const fn overflowed(&self) -> bool {
        self.bus & BUS_OVF != 0
    }

    /// A fresh conversion was available when the sample was taken
    pub const fn ready(&self) -> bool {
        self.bus & BUS_CNVR != 0
    }

    pub const fn shunt_clipped(&self) -> bool {
        let current = self.current as i16;
        current > SHUNT_NEARLY_FULL_SCALE || current < -SHUNT_NEARLY_FULL_SCALE
    }

    /// Bus voltage within 8 LSBs of the 16 V full scale. Fires before the
    /// hardware overflow flag would.
    pub const fn bus_clipped(&self) -> bool {
        (self.bus >> 3) > BUS_NEARLY_FULL_SCALE_16V
    }

    pub fn bus_v(&self) -> f32 {
        bus_v(self.bus)
    }

    pub fn current_ma(&self) -> f32 {
        current_ma(self.current, self.scale.current_lsb)
    }

    pub fn power_mw(&self) -> f32 {
        power_mw(self.power, self.scale.power_lsb)
    }

    pub fn reading(&self) -> Reading {
        Reading {
            bus_v: self.bus_v(),
            current_ma: self.current_ma(),
            power_mw: self.power_mw(),
        }
    }
}

/// One decoded (V, mA, mW) triple
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub bus_v: f32,
    pub current_ma: f32,
    pub power_mw: f32,
}

/// Decode the bus voltage register.
///
/// Returns `+inf` when the overflow flag is set and `NaN` while no
/// conversion is ready.
pub fn bus_v(reg: u16) -> f32 {
    if reg & BUS_OVF != 0 {
        return f32::INFINITY;
    }
    if reg & BUS_CNVR == 0 {
        return f32::NAN;
    }
    (reg >> 3) as f32 * BUS_LSB_V
}

pub fn shunt_mv(reg: u16) -> f32 {
    reg as i16 as f32 * SHUNT_LSB_MV
}

pub fn current_ma(reg: u16, current_lsb: f32) -> f32 {
    reg as i16 as f32 * current_lsb * 1000.0
}

pub fn power_mw(reg: u16, power_lsb: f32) -> f32 {
    reg as f32 * power_lsb * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_current(current: u16) -> RawSample {
        RawSample::new(0b10, current, 0, Scale::default())
    }

    fn with_bus(bus: u16) -> RawSample {
        RawSample::new(bus, 0, 0, Scale::default())
    }

    #[test]
    fn test_bus_voltage_decoding() {
        // 3.3 V = 825 steps of 4 mV, conversion ready
        let v = bus_v((825 << 3) | 0b10);
        assert!((v - 3.3).abs() < 1e-5);
        assert_eq!(bus_v((825 << 3) | 0b11), f32::INFINITY);
        assert!(bus_v(825 << 3).is_nan());
    }

    #[test]
    fn test_shunt_voltage_is_signed() {
        // Datasheet table 7 samples
        assert!((shunt_mv(0x7CFF) - 319.99).abs() < 1e-3);
        assert!((shunt_mv(0xF05F) + 40.01).abs() < 1e-3);
        assert!((shunt_mv(0x8300) + 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_current_and_power_scaling() {
        let lsb = 3.2 / 32768.0;
        assert!((current_ma(1024, lsb) - 100.0).abs() < 1e-4);
        assert!((current_ma(-1024_i16 as u16, lsb) + 100.0).abs() < 1e-4);
        // The power register is unsigned
        assert!((power_mw(0xFFFF, 1e-3) - 65535.0).abs() < 0.1);
    }

    #[test]
    fn test_shunt_clip_boundary() {
        assert!(!with_current(0x0007).shunt_clipped());
        assert!(!with_current(0x7FF8).shunt_clipped());
        assert!(with_current(0x7FF9).shunt_clipped());
        assert!(!with_current(-0x7FF8_i16 as u16).shunt_clipped());
        assert!(with_current(-0x7FF9_i16 as u16).shunt_clipped());
    }

    #[test]
    fn test_bus_clip_boundary() {
        assert_eq!(0x7CC0 >> 3, 0xF98);
        assert!(!with_bus(0x7CC0).bus_clipped());
        assert!(with_bus(0x7CC8).bus_clipped());
    }

    #[test]
    fn test_status_flags() {
        assert!(with_bus(0b10).ready());
        assert!(!with_bus(0b10).overflowed());
        assert!(with_bus(0b01).overflowed());
        assert!(!with_bus(0b01).ready());
    }

    #[test]
    fn test_reading_uses_captured_scale() {
        let scale = Scale {
            current_lsb: 1e-4,
            power_lsb: 2e-3,
        };
        let sample = RawSample::new((1000 << 3) | 0b10, 500, 250, scale);
        let reading = sample.reading();
        assert!((reading.bus_v - 4.0).abs() < 1e-5);
        assert!((reading.current_ma - 50.0).abs() < 1e-4);
        assert!((reading.power_mw - 500.0).abs() < 1e-3);
    }
}
