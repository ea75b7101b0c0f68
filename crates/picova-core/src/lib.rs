//! Hardware-independent core of the picova power meter
//!
//! INA219 driver, auto-ranging, the sampler/reporter pipeline and the
//! display sink. Everything is generic over `embedded-hal-async` I2C and
//! `embedded-graphics` draw targets, so the same code runs on the ESP32-S3
//! firmware, in the desktop simulator and under host tests.
//!
//! The crate is `#![no_std]`; host tests build against std.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod display;
pub mod ina219;
pub mod pipeline;
pub mod queue;
pub mod ranging;
pub mod reporter;
pub mod sampler;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, MeterConfig};
pub use pipeline::{Pipeline, SetupError, bring_up_sensor};
