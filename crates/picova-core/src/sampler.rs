//! Timer-paced producer
//!
//! The sampler is the only owner of the sensor. Each wake it reads one
//! sample, lets the range controller look at it and publishes what survives.
//! Errors never leave the loop: a failed or unusable cycle is dropped and the
//! next wake tries again. A sensor left uncalibrated by a failed range change
//! is recalibrated before anything else is read.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

use crate::ina219::{Ina219, SensorError};
use crate::queue::{Measurement, SampleSender};
use crate::ranging::{AutoRanger, RangeAction};

/// Coalescing wake from the conversion timer. At most one wake is pending.
pub type WakeSignal = Signal<CriticalSectionRawMutex, ()>;

/// What became of one sampling cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    Published,
    BusError(SensorError),
    NotReady,
    /// Calibration restored, nothing was sampled
    Recalibrated,
    /// Dropped by the range controller
    Ranged(RangeAction),
}

pub struct Sampler<'a, I> {
    sensor: Ina219<I>,
    ranger: AutoRanger,
    wake: &'a WakeSignal,
    queue: SampleSender<'a>,
}

impl<'a, I: I2c> Sampler<'a, I> {
    pub fn new(
        sensor: Ina219<I>,
        ranger: AutoRanger,
        wake: &'a WakeSignal,
        queue: SampleSender<'a>,
    ) -> Self {
        Self {
            sensor,
            ranger,
            wake,
            queue,
        }
    }

    pub fn sensor(&self) -> &Ina219<I> {
        &self.sensor
    }

    /// Run one read/assess/publish cycle. Waits for queue space when the
    /// sample is accepted and the queue is full.
    pub async fn cycle(&mut self, timestamp_us: u64) -> CycleOutcome {
        if self.sensor.calibration().is_none() {
            return self.recalibrate().await;
        }

        let sample = match self.sensor.read_raw().await {
            Ok(sample) => sample,
            Err(e) => {
                error!("Sensor read failed: {}", e);
                return CycleOutcome::BusError(e);
            }
        };

        if !sample.ready() {
            debug!("Conversion not ready, sample dropped");
            return CycleOutcome::NotReady;
        }

        match self.ranger.regulate(&mut self.sensor, &sample).await {
            Ok(RangeAction::Accept) => {}
            Ok(action) => {
                debug!("Sample dropped: {:?}", action);
                return CycleOutcome::Ranged(action);
            }
            Err(e) => {
                error!("Range change failed: {}", e);
                return CycleOutcome::BusError(e);
            }
        }

        self.queue
            .send(Measurement::new(timestamp_us, sample))
            .await;
        CycleOutcome::Published
    }

    async fn recalibrate(&mut self) -> CycleOutcome {
        let shunt_ohms = self.sensor.shunt_ohms();
        match self.sensor.calibrate(shunt_ohms).await {
            Ok(()) => {
                info!("Calibration restored");
                CycleOutcome::Recalibrated
            }
            Err(e) => {
                error!("Recalibration failed: {}", e);
                CycleOutcome::BusError(e)
            }
        }
    }

    /// Sample forever, one cycle per wake. `now_us` is read after each wake.
    pub async fn run(mut self, mut now_us: impl FnMut() -> u64) -> ! {
        loop {
            self.wake.wait().await;
            let timestamp_us = now_us();
            self.cycle(timestamp_us).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ina219::{AdcMode, BusRange, Configuration, Register, ShuntRange};
    use crate::queue::SampleQueue;
    use crate::testing::ScriptedBus;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::ErrorKind;

    const IN_RANGE: u16 = (825 << 3) | 0b10;

    fn sensor(bus: ScriptedBus, shunt_range: ShuntRange) -> Ina219<ScriptedBus> {
        let cfg = Configuration {
            bus_range: BusRange::V16,
            shunt_range,
            bus_adc: AdcMode::Bits9,
            shunt_adc: AdcMode::Bits11,
        };
        let mut ina = Ina219::new(bus, 0x40, 0.1);
        block_on(ina.configure(&cfg)).unwrap();
        block_on(ina.calibrate(0.1)).unwrap();
        ina
    }

    #[test]
    fn test_accepted_sample_is_published() {
        let mut bus = ScriptedBus::new();
        bus.queue_sample(IN_RANGE, 1024, 169);

        let wake = WakeSignal::new();
        let queue = SampleQueue::new();
        let mut sampler = Sampler::new(
            sensor(bus, ShuntRange::Mv320),
            AutoRanger::default(),
            &wake,
            queue.sender(),
        );

        assert_eq!(block_on(sampler.cycle(1234)), CycleOutcome::Published);
        let m = queue.try_receive().unwrap();
        assert_eq!(m.timestamp_us, 1234);
        assert_eq!(m.sample.current, 1024);
        assert_eq!(m.sample.scale, sampler.sensor().scale());
    }

    #[test]
    fn test_not_ready_sample_is_dropped() {
        let mut bus = ScriptedBus::new();
        bus.queue_sample(825 << 3, 1024, 169);

        let wake = WakeSignal::new();
        let queue = SampleQueue::new();
        let mut sampler = Sampler::new(
            sensor(bus, ShuntRange::Mv320),
            AutoRanger::default(),
            &wake,
            queue.sender(),
        );

        assert_eq!(block_on(sampler.cycle(0)), CycleOutcome::NotReady);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bus_error_skips_cycle() {
        let mut bus = ScriptedBus::new();
        bus.fail_next_read(ErrorKind::Other);
        bus.queue_sample(IN_RANGE, 1024, 169);

        let wake = WakeSignal::new();
        let queue = SampleQueue::new();
        let mut sampler = Sampler::new(
            sensor(bus, ShuntRange::Mv320),
            AutoRanger::default(),
            &wake,
            queue.sender(),
        );

        assert_eq!(
            block_on(sampler.cycle(0)),
            CycleOutcome::BusError(SensorError::Bus(ErrorKind::Other))
        );
        assert!(queue.is_empty());

        // The next cycle recovers without intervention
        assert_eq!(block_on(sampler.cycle(1)), CycleOutcome::Published);
    }

    #[test]
    fn test_overflow_widens_shunt_and_drops_sample() {
        let mut bus = ScriptedBus::new();
        bus.queue_sample(IN_RANGE | 0b01, 0, 0);

        let wake = WakeSignal::new();
        let queue = SampleQueue::new();
        let mut sampler = Sampler::new(
            sensor(bus, ShuntRange::Mv160),
            AutoRanger::default(),
            &wake,
            queue.sender(),
        );

        assert_eq!(
            block_on(sampler.cycle(0)),
            CycleOutcome::Ranged(RangeAction::WidenShunt)
        );
        assert!(queue.is_empty());
        assert_eq!(sampler.sensor().config().shunt_range, ShuntRange::Mv320);
    }

    #[test]
    fn test_failed_range_calibration_is_retried() {
        let mut bus = ScriptedBus::new();
        // The first calibration write is the bring-up one
        bus.fail_nth_write(Register::Calibration, 2, ErrorKind::Other);
        bus.queue_sample(IN_RANGE | 0b01, 0, 0);
        for _ in 0..3 {
            bus.queue_sample(IN_RANGE, 1024, 169);
        }

        let wake = WakeSignal::new();
        let queue = SampleQueue::new();
        let mut sampler = Sampler::new(
            sensor(bus, ShuntRange::Mv160),
            AutoRanger::default(),
            &wake,
            queue.sender(),
        );

        assert_eq!(
            block_on(sampler.cycle(0)),
            CycleOutcome::BusError(SensorError::Bus(ErrorKind::Other))
        );
        assert_eq!(sampler.sensor().config().shunt_range, ShuntRange::Mv320);
        assert!(sampler.sensor().calibration().is_none());

        assert_eq!(block_on(sampler.cycle(1)), CycleOutcome::Recalibrated);
        assert!(queue.is_empty());
        assert_eq!(sampler.sensor().calibration().unwrap().register, 4194);

        for t in 2..4 {
            assert_eq!(block_on(sampler.cycle(t)), CycleOutcome::Published);
            let reading = queue.try_receive().unwrap().sample.reading();
            assert!((reading.current_ma - 100.0).abs() < 1e-3);
            assert!((reading.power_mw - 330.0).abs() < 0.1);
        }
    }
}
