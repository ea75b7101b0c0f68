//! INA219 register map and configuration register encoding
//!
//! The configuration register packs the complete measurement setup into
//! 16 bits:
//!
//! | Bits  | Field       |
//! |-------|-------------|
//! | 15    | reset       |
//! | 13    | bus range   |
//! | 11-12 | shunt range |
//! | 7-10  | bus ADC     |
//! | 3-6   | shunt ADC   |
//! | 0-2   | mode        |

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Default 7-bit I2C address (A0 and A1 tied to GND)
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Configuration register content after power-on or reset
pub const POWER_ON_CONFIG: u16 = 0x399F;

/// Writing this to the configuration register resets the device
pub(crate) const RESET_BIT: u16 = 1 << 15;

/// Bus register flag: the power or current calculation overflowed
pub(crate) const BUS_OVF: u16 = 1 << 0;

/// Bus register flag: a new conversion result is available
pub(crate) const BUS_CNVR: u16 = 1 << 1;

/// Shunt and bus, continuous
const MODE_SHUNT_BUS_CONTINUOUS: u16 = 0b111;

const BUS_RANGE_SHIFT: u16 = 13;
const SHUNT_RANGE_SHIFT: u16 = 11;
const BUS_ADC_SHIFT: u16 = 7;
const SHUNT_ADC_SHIFT: u16 = 3;

/// Register pointers of the INA219
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Config = 0x00,
    ShuntVoltage = 0x01,
    BusVoltage = 0x02,
    Power = 0x03,
    Current = 0x04,
    Calibration = 0x05,
}

impl Register {
    #[inline(always)]
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// Maximum bus voltage the sensor can represent without overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BusRange {
    V16,
    V26,
}

impl BusRange {
    pub const fn bits(self) -> u16 {
        self as u16
    }

    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0x01 {
            0 => Self::V16,
            _ => Self::V26,
        }
    }

    /// The next wider range, or `None` at the maximum.
    pub const fn widen(self) -> Option<Self> {
        match self {
            Self::V16 => Some(Self::V26),
            Self::V26 => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::V16 => "16V",
            Self::V26 => "26V",
        }
    }
}

/// Maximum shunt voltage before the shunt ADC clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShuntRange {
    Mv40,
    Mv80,
    Mv160,
    Mv320,
}

impl ShuntRange {
    pub const ALL: [ShuntRange; 4] = [Self::Mv40, Self::Mv80, Self::Mv160, Self::Mv320];

    pub const fn bits(self) -> u16 {
        self as u16
    }

    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0 => Self::Mv40,
            1 => Self::Mv80,
            2 => Self::Mv160,
            _ => Self::Mv320,
        }
    }

    /// Full-scale shunt voltage in volts
    pub const fn max_shunt_v(self) -> f32 {
        match self {
            Self::Mv40 => 0.04,
            Self::Mv80 => 0.08,
            Self::Mv160 => 0.16,
            Self::Mv320 => 0.32,
        }
    }

    /// The next wider range, or `None` at the maximum.
    pub const fn widen(self) -> Option<Self> {
        match self {
            Self::Mv40 => Some(Self::Mv80),
            Self::Mv80 => Some(Self::Mv160),
            Self::Mv160 => Some(Self::Mv320),
            Self::Mv320 => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Mv40 => "40mV",
            Self::Mv80 => "80mV",
            Self::Mv160 => "160mV",
            Self::Mv320 => "320mV",
        }
    }
}

/// ADC sampling setup, shared by the bus and shunt converters
///
/// Bit-depth modes take a single sample. Oversampling modes average
/// several 12-bit samples, trading conversion time for noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdcMode {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
    Samples32,
    Samples64,
    Samples128,
}

impl AdcMode {
    pub const ALL: [AdcMode; 11] = [
        Self::Bits9,
        Self::Bits10,
        Self::Bits11,
        Self::Bits12,
        Self::Samples2,
        Self::Samples4,
        Self::Samples8,
        Self::Samples16,
        Self::Samples32,
        Self::Samples64,
        Self::Samples128,
    ];

    /// 4-bit field code. Oversampling codes start at 0b1001, so every mode
    /// past `Bits12` is offset by 5.
    pub const fn code(self) -> u16 {
        let index = self as u16;
        if index > Self::Bits12 as u16 {
            index + 5
        } else {
            index
        }
    }

    /// Decode a 4-bit field code.
    ///
    /// With bit 3 clear, bit 2 is ignored by the hardware; code 0b1000 is a
    /// second encoding of 12-bit.
    pub const fn from_code(code: u16) -> Self {
        let code = code & 0x0F;
        if code & 0x08 == 0 {
            return match code & 0x03 {
                0 => Self::Bits9,
                1 => Self::Bits10,
                2 => Self::Bits11,
                _ => Self::Bits12,
            };
        }
        match code {
            9 => Self::Samples2,
            10 => Self::Samples4,
            11 => Self::Samples8,
            12 => Self::Samples16,
            13 => Self::Samples32,
            14 => Self::Samples64,
            15 => Self::Samples128,
            _ => Self::Bits12,
        }
    }

    /// Conversion time in microseconds (datasheet, table 5)
    pub const fn conversion_time_us(self) -> u32 {
        match self {
            Self::Bits9 => 84,
            Self::Bits10 => 148,
            Self::Bits11 => 276,
            Self::Bits12 => 532,
            Self::Samples2 => 1060,
            Self::Samples4 => 2130,
            Self::Samples8 => 4260,
            Self::Samples16 => 8510,
            Self::Samples32 => 17020,
            Self::Samples64 => 34050,
            Self::Samples128 => 68100,
        }
    }
}

/// Decoded content of the configuration register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub bus_range: BusRange,
    pub shunt_range: ShuntRange,
    pub bus_adc: AdcMode,
    pub shunt_adc: AdcMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::from_register(POWER_ON_CONFIG)
    }
}

impl Configuration {
    /// Encode into the configuration register, always selecting continuous
    /// shunt and bus conversions.
    pub const fn to_register(self) -> u16 {
        (self.bus_range.bits() << BUS_RANGE_SHIFT)
            | (self.shunt_range.bits() << SHUNT_RANGE_SHIFT)
            | (self.bus_adc.code() << BUS_ADC_SHIFT)
            | (self.shunt_adc.code() << SHUNT_ADC_SHIFT)
            | MODE_SHUNT_BUS_CONTINUOUS
    }

    /// Decode a configuration register value. The reset and mode bits are
    /// not part of the configuration and are ignored.
    pub const fn from_register(reg: u16) -> Self {
        Self {
            bus_range: BusRange::from_bits(reg >> BUS_RANGE_SHIFT),
            shunt_range: ShuntRange::from_bits(reg >> SHUNT_RANGE_SHIFT),
            bus_adc: AdcMode::from_code(reg >> BUS_ADC_SHIFT),
            shunt_adc: AdcMode::from_code(reg >> SHUNT_ADC_SHIFT),
        }
    }

    /// Time for one complete bus + shunt conversion cycle
    pub const fn conversion_time_us(&self) -> u32 {
        self.bus_adc.conversion_time_us() + self.shunt_adc.conversion_time_us()
    }

    pub const fn conversion_time(&self) -> Duration {
        Duration::from_micros(self.conversion_time_us() as u64)
    }
}
