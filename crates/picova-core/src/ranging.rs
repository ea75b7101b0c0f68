//! One-way auto-ranging
//!
//! A saturated sample widens the range that saturated and is then dropped.
//! Ranges are only ever widened, never narrowed, so after a few saturation
//! events the sensor settles at the narrowest range that fits the signal.

use embedded_hal_async::i2c::I2c;
use log::warn;

use crate::ina219::{BusRange, Configuration, Ina219, RawSample, SensorError};

/// What a sample asks of the range controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAction {
    /// In range, forward it
    Accept,
    /// Overflow or shunt clip with a wider shunt range available
    WidenShunt,
    /// Bus reading close to the 16 V full scale
    WidenBus,
    /// Overflow or shunt clip at the widest shunt range; nothing to widen
    Saturated,
}

impl RangeAction {
    pub const fn accepted(self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Classify `sample` against the range it was taken with.
///
/// The near-full-scale bus threshold belongs to the 16 V range; at 26 V the
/// same reading is well inside the range.
pub fn assess(sample: &RawSample, cfg: &Configuration) -> RangeAction {
    if sample.overflowed() || sample.shunt_clipped() {
        return match cfg.shunt_range.widen() {
            Some(_) => RangeAction::WidenShunt,
            None => RangeAction::Saturated,
        };
    }

    if cfg.bus_range == BusRange::V16 && sample.bus_clipped() {
        return RangeAction::WidenBus;
    }

    RangeAction::Accept
}

/// Applies [`assess`] to the sensor it is handed
#[derive(Debug, Clone, Copy)]
pub struct AutoRanger {
    enabled: bool,
}

impl Default for AutoRanger {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AutoRanger {
    /// With `enabled` false, saturated samples are still dropped but the
    /// range is left alone.
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Assess `sample` and widen the sensor's range if it asks for it.
    /// The sample should be forwarded only when this returns
    /// [`RangeAction::Accept`].
    pub async fn regulate<I: I2c>(
        &self,
        sensor: &mut Ina219<I>,
        sample: &RawSample,
    ) -> Result<RangeAction, SensorError> {
        let cfg = sensor.config();
        let action = assess(sample, &cfg);
        if !self.enabled {
            return Ok(action);
        }

        match action {
            RangeAction::WidenShunt => {
                if sensor.increase_shunt_range().await? {
                    warn!(
                        "Shunt saturated, range {} -> {}",
                        cfg.shunt_range.label(),
                        sensor.config().shunt_range.label()
                    );
                }
            }
            RangeAction::WidenBus => {
                if sensor.increase_bus_range().await? {
                    warn!(
                        "Bus near full scale, range {} -> {}",
                        cfg.bus_range.label(),
                        sensor.config().bus_range.label()
                    );
                }
            }
            RangeAction::Accept | RangeAction::Saturated => {}
        }

        Ok(action)
    }
}
