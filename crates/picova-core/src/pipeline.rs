//! Wiring between the sampling, reporting and display contexts
//!
//! [`Pipeline`] holds the only state the contexts share: the sample queue,
//! the two timer signals and the display inbox. It is `const`-constructible
//! so firmware can keep it in a `static`. Each context is handed just the
//! ends it uses; the sensor itself moves into the sampler and is never
//! shared.

use embedded_hal_async::i2c::I2c;
use log::info;
use thiserror_no_std::Error;

use crate::config::{ConfigError, MeterConfig};
use crate::display::{DisplayError, DisplayPanel, Panel};
use crate::ina219::{Ina219, SensorError};
use crate::queue::SampleQueue;
use crate::ranging::AutoRanger;
use crate::reporter::{DisplayChannel, PeriodSignal, ReportSink, Reporter};
use crate::sampler::{Sampler, WakeSignal};

/// Failures that stop the meter from starting
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
    #[error("sensor setup failed: {0}")]
    Sensor(SensorError),
    #[error("display setup failed: {0}")]
    Display(DisplayError),
    #[error("could not start the {0} task")]
    Spawn(&'static str),
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SensorError> for SetupError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<DisplayError> for SetupError {
    fn from(e: DisplayError) -> Self {
        Self::Display(e)
    }
}

pub struct Pipeline {
    pub samples: SampleQueue,
    /// Conversion timer to sampler
    pub wake: WakeSignal,
    /// Display period timer to reporter
    pub period: PeriodSignal,
    /// Reporter to display
    pub display: DisplayChannel,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub const fn new() -> Self {
        Self {
            samples: SampleQueue::new(),
            wake: WakeSignal::new(),
            period: PeriodSignal::new(),
            display: DisplayChannel::new(),
        }
    }

    pub fn sampler<I: I2c>(&self, sensor: Ina219<I>, cfg: &MeterConfig) -> Sampler<'_, I> {
        Sampler::new(
            sensor,
            AutoRanger::new(cfg.auto_range),
            &self.wake,
            self.samples.sender(),
        )
    }

    pub fn reporter<S: ReportSink>(&self, sink: S) -> Reporter<'_, S> {
        Reporter::new(
            self.samples.receiver(),
            sink,
            &self.period,
            self.display.sender(),
        )
    }

    /// Show the averages the reporter sends until the end of time.
    pub async fn drive_display<P: Panel>(&self, display: DisplayPanel<P>) -> ! {
        display.run(self.display.receiver()).await
    }
}

/// Validate `cfg`, then configure and calibrate the sensor behind `i2c`.
pub async fn bring_up_sensor<I: I2c>(i2c: I, cfg: &MeterConfig) -> Result<Ina219<I>, SetupError> {
    cfg.validate()?;

    let mut sensor = Ina219::new(i2c, cfg.address, cfg.shunt_ohms);
    sensor.configure(&cfg.initial).await?;
    sensor.calibrate(cfg.shunt_ohms).await?;

    info!(
        "INA219@{:#04x} up, sampling every {} us",
        cfg.address,
        sensor.conversion_time_us()
    );
    Ok(sensor)
}
