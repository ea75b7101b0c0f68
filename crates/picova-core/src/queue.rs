//! Sample handoff between the sampling and reporting contexts
//!
//! A bounded FIFO of [`Measurement`]s. `send` waits while the queue is full
//! so a stalled reporter slows the sampler down instead of losing samples.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::ina219::RawSample;

pub const SAMPLE_QUEUE_CAPACITY: usize = 255;

/// A sample stamped with the monotonic time it was taken
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub timestamp_us: u64,
    pub sample: RawSample,
}

impl Measurement {
    pub const fn new(timestamp_us: u64, sample: RawSample) -> Self {
        Self {
            timestamp_us,
            sample,
        }
    }
}

pub type SampleQueue = Channel<CriticalSectionRawMutex, Measurement, SAMPLE_QUEUE_CAPACITY>;
pub type SampleSender<'a> =
    Sender<'a, CriticalSectionRawMutex, Measurement, SAMPLE_QUEUE_CAPACITY>;
pub type SampleReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, Measurement, SAMPLE_QUEUE_CAPACITY>;
