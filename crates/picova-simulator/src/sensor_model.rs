//! Register-level INA219 model behind an async I2C bus
//!
//! Conversions follow the datasheet arithmetic: the shunt ADC clips at the
//! selected PGA range, the current register is `shunt * cal / 4096`, power is
//! `current * bus / 5000`, and results that do not fit raise the overflow
//! flag. The conversion-ready flag is set once a full conversion time has
//! passed since the last power register read.

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use picova_core::ina219::{BusRange, Configuration, DEFAULT_ADDRESS, POWER_ON_CONFIG, Register};

const SHUNT_LSB_V: f32 = 10e-6;
const BUS_LSB_V: f32 = 4e-3;

/// Synthetic load: a rising supply with a rippling current and periodic
/// surges.
#[derive(Debug, Clone, Copy)]
pub struct Load {
    pub start_bus_v: f32,
    pub bus_ramp_v_per_s: f32,
    pub base_a: f32,
    pub ripple_a: f32,
    pub ripple_hz: f32,
    pub surge_a: f32,
    pub surge_period: Duration,
    pub surge_len: Duration,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            start_bus_v: 12.0,
            bus_ramp_v_per_s: 1.5,
            base_a: 0.15,
            ripple_a: 0.05,
            ripple_hz: 2.0,
            surge_a: 1.2,
            surge_period: Duration::from_secs(2),
            surge_len: Duration::from_millis(100),
        }
    }
}

impl Load {
    /// A constant supply and current
    pub fn steady(bus_v: f32, current_a: f32) -> Self {
        Self {
            start_bus_v: bus_v,
            bus_ramp_v_per_s: 0.0,
            base_a: current_a,
            ripple_a: 0.0,
            ripple_hz: 0.0,
            surge_a: 0.0,
            surge_period: Duration::from_secs(1),
            surge_len: Duration::ZERO,
        }
    }

    /// Bus volts and load amps `t` into the run
    pub fn at(&self, t: Duration) -> (f32, f32) {
        let secs = t.as_secs_f32();
        let bus_v = self.start_bus_v + self.bus_ramp_v_per_s * secs;

        let mut amps = self.base_a + self.ripple_a * (TAU * self.ripple_hz * secs).sin();
        let phase = t.as_nanos() % self.surge_period.as_nanos().max(1);
        if phase < self.surge_len.as_nanos() {
            amps += self.surge_a;
        }

        (bus_v, amps)
    }
}

pub struct SimulatedIna219 {
    address: u8,
    shunt_ohms: f32,
    load: Load,
    epoch: Instant,
    pointer: u8,
    config: u16,
    calibration: u16,
    last_power_read: Option<Instant>,
}

impl SimulatedIna219 {
    pub fn new(shunt_ohms: f32, load: Load) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            shunt_ohms,
            load,
            epoch: Instant::now(),
            pointer: 0,
            config: POWER_ON_CONFIG,
            calibration: 0,
            last_power_read: None,
        }
    }

    fn configuration(&self) -> Configuration {
        Configuration::from_register(self.config)
    }

    fn shunt_register(&self, t: Duration) -> i16 {
        let (_, amps) = self.load.at(t);
        let limit = self.configuration().shunt_range.max_shunt_v();
        let volts = (amps * self.shunt_ohms).clamp(-limit, limit);
        (volts / SHUNT_LSB_V).round() as i16
    }

    /// Bus reading in 4 mV steps, clipped at the selected range
    fn bus_steps(&self, t: Duration) -> u16 {
        let (volts, _) = self.load.at(t);
        let full_scale = match self.configuration().bus_range {
            BusRange::V16 => 16.0,
            BusRange::V26 => 32.0,
        };
        (volts.clamp(0.0, full_scale) / BUS_LSB_V) as u16
    }

    fn current_register(&self, t: Duration) -> (u16, bool) {
        let raw = self.shunt_register(t) as i32 * self.calibration as i32 / 4096;
        let clamped = raw.clamp(i16::MIN as i32, i16::MAX as i32);
        (clamped as i16 as u16, clamped != raw)
    }

    fn power_register(&self, t: Duration) -> (u16, bool) {
        let (current, _) = self.current_register(t);
        let raw = (current as i16 as i32).abs() * self.bus_steps(t) as i32 / 5000;
        let clamped = raw.min(u16::MAX as i32);
        (clamped as u16, clamped != raw)
    }

    fn ready(&self) -> bool {
        let conversion = Duration::from_micros(self.configuration().conversion_time_us() as u64);
        self.last_power_read
            .is_none_or(|read| read.elapsed() >= conversion)
    }

    fn read_pointed(&mut self) -> u16 {
        let t = self.epoch.elapsed();
        match self.pointer {
            p if p == Register::Config.addr() => self.config,
            p if p == Register::ShuntVoltage.addr() => self.shunt_register(t) as u16,
            p if p == Register::BusVoltage.addr() => {
                let overflow = self.current_register(t).1 || self.power_register(t).1;
                (self.bus_steps(t) << 3) | ((self.ready() as u16) << 1) | overflow as u16
            }
            p if p == Register::Power.addr() => {
                self.last_power_read = Some(Instant::now());
                self.power_register(t).0
            }
            p if p == Register::Current.addr() => self.current_register(t).0,
            p if p == Register::Calibration.addr() => self.calibration,
            _ => 0,
        }
    }

    fn store(&mut self, bytes: &[u8]) {
        let Some((&pointer, value)) = bytes.split_first() else {
            return;
        };
        self.pointer = pointer;

        let [hi, lo] = value else {
            return;
        };
        let value = u16::from_be_bytes([*hi, *lo]);
        match pointer {
            p if p == Register::Config.addr() => {
                if value & 0x8000 != 0 {
                    self.config = POWER_ON_CONFIG;
                    self.calibration = 0;
                } else {
                    self.config = value;
                }
            }
            // Bit 0 of the calibration register is read-only zero
            p if p == Register::Calibration.addr() => self.calibration = value & !1,
            _ => {}
        }
    }
}

impl ErrorType for SimulatedIna219 {
    type Error = ErrorKind;
}

impl I2c for SimulatedIna219 {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        let mut pending = Vec::new();
        for op in operations {
            match op {
                Operation::Write(bytes) => pending.extend_from_slice(bytes),
                Operation::Read(buf) => {
                    self.store(&pending);
                    pending.clear();
                    let value = self.read_pointed().to_be_bytes();
                    for (dst, src) in buf.iter_mut().zip(value) {
                        *dst = src;
                    }
                }
            }
        }
        self.store(&pending);
        Ok(())
    }
}
