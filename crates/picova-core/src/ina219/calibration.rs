//! Calibration arithmetic for the current and power registers

use super::registers::ShuntRange;

/// Fixed scaling constant of the calibration equation (datasheet eq. 1)
const CAL_SCALE: f32 = 0.04096;

/// Positive span of the signed current register
const CURRENT_REGISTER_SPAN: f32 = (1 << 15) as f32;

/// Largest calibration value the register holds (bit 0 is reserved)
const MAX_CAL: f32 = 0xFFFE as f32;

/// Power register LSB relative to the current LSB
const POWER_LSB_FACTOR: f32 = 20.0;

/// Physical value of one increment of the current and power registers
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scale {
    /// Amperes per current register bit
    pub current_lsb: f32,
    /// Watts per power register bit
    pub power_lsb: f32,
}

/// Result of calibrating for one shunt range and resistance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub shunt_range: ShuntRange,
    pub shunt_ohms: f32,
    pub scale: Scale,
    /// Value written to the calibration register
    pub register: u16,
}

impl Calibration {
    /// Compute the calibration that lets the current register span the full
    /// shunt range.
    ///
    /// The LSB is floored so the calibration register never exceeds its
    /// 16-bit range for very small shunts.
    pub fn compute(shunt_range: ShuntRange, shunt_ohms: f32) -> Self {
        let max_current_a = shunt_range.max_shunt_v() / shunt_ohms;
        let current_lsb = max_current_a / CURRENT_REGISTER_SPAN;
        let min_lsb = CAL_SCALE / (MAX_CAL * shunt_ohms);
        let current_lsb = current_lsb.max(min_lsb);

        let cal = CAL_SCALE / (current_lsb * shunt_ohms);
        // cal is positive and <= MAX_CAL, so this rounds to nearest
        let register = (cal + 0.5) as u16;

        Self {
            shunt_range,
            shunt_ohms,
            scale: Scale {
                current_lsb,
                power_lsb: POWER_LSB_FACTOR * current_lsb,
            },
            register,
        }
    }
}
