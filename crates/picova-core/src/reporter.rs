//! Consumer side of the sample queue
//!
//! Every measurement becomes one report line. Readings are also averaged
//! over the display period and the average is offered to the display
//! without waiting: a busy display loses an update, the report stream never
//! stalls.

use core::fmt::{self, Write as _};
use core::str::FromStr;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use heapless::String;
use log::debug;
use thiserror_no_std::Error;

use crate::ina219::Reading;
use crate::queue::{Measurement, SampleReceiver};

pub const DISPLAY_CHANNEL_CAPACITY: usize = 2;

/// Longest report line, terminator included
pub const REPORT_LINE_MAX: usize = 96;

pub const LINE_END: &str = "\r\n";

/// Coalescing display-period expiry
pub type PeriodSignal = Signal<CriticalSectionRawMutex, ()>;

pub type DisplayChannel = Channel<CriticalSectionRawMutex, Reading, DISPLAY_CHANNEL_CAPACITY>;
pub type DisplaySender<'a> =
    Sender<'a, CriticalSectionRawMutex, Reading, DISPLAY_CHANNEL_CAPACITY>;
pub type DisplayReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, Reading, DISPLAY_CHANNEL_CAPACITY>;

/// One line of the report stream: `timestamp_us,V,mA,mW`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub timestamp_us: u64,
    pub reading: Reading,
}

impl Report {
    pub fn from_measurement(m: &Measurement) -> Self {
        Self {
            timestamp_us: m.timestamp_us,
            reading: m.sample.reading(),
        }
    }

    /// The report rendered as a terminated line
    pub fn to_line(&self) -> Result<String<REPORT_LINE_MAX>, fmt::Error> {
        let mut line = String::new();
        write!(line, "{}{}", self, LINE_END)?;
        Ok(line)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{:.6},{:.6},{:.6}",
            self.timestamp_us, self.reading.bus_v, self.reading.current_ma, self.reading.power_mw
        )
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid timestamp")]
    Timestamp,
    #[error("invalid {0} value")]
    Value(&'static str),
}

impl FromStr for Report {
    type Err = ReportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        let count = line.split(',').count();
        if count != 4 {
            return Err(ReportParseError::FieldCount(count));
        }

        let mut fields = line.split(',').map(str::trim);
        let timestamp_us = fields
            .next()
            .and_then(|f| f.parse::<u64>().ok())
            .ok_or(ReportParseError::Timestamp)?;
        let mut value = |name| {
            fields
                .next()
                .and_then(|f| f.parse::<f32>().ok())
                .ok_or(ReportParseError::Value(name))
        };

        Ok(Self {
            timestamp_us,
            reading: Reading {
                bus_v: value("voltage")?,
                current_ma: value("current")?,
                power_mw: value("power")?,
            },
        })
    }
}

/// Destination of the per-sample report lines
pub trait ReportSink {
    fn emit(&mut self, report: &Report) -> impl Future<Output = ()>;
}

/// Window accumulator for the display average
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    sum_v: f64,
    sum_ma: f64,
    sum_mw: f64,
    count: u32,
}

impl RunningAverage {
    pub const fn new() -> Self {
        Self {
            sum_v: 0.0,
            sum_ma: 0.0,
            sum_mw: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, reading: &Reading) {
        self.sum_v += reading.bus_v as f64;
        self.sum_ma += reading.current_ma as f64;
        self.sum_mw += reading.power_mw as f64;
        self.count += 1;
    }

    pub const fn count(&self) -> u32 {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the window, `None` when nothing was added.
    pub fn mean(&self) -> Option<Reading> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Reading {
            bus_v: (self.sum_v / n) as f32,
            current_ma: (self.sum_ma / n) as f32,
            power_mw: (self.sum_mw / n) as f32,
        })
    }

    /// Mean of the window, leaving the accumulator empty.
    pub fn take(&mut self) -> Option<Reading> {
        let mean = self.mean();
        *self = Self::new();
        mean
    }
}

pub struct Reporter<'a, S> {
    queue: SampleReceiver<'a>,
    sink: S,
    period: &'a PeriodSignal,
    display: DisplaySender<'a>,
    average: RunningAverage,
}

impl<'a, S: ReportSink> Reporter<'a, S> {
    pub fn new(
        queue: SampleReceiver<'a>,
        sink: S,
        period: &'a PeriodSignal,
        display: DisplaySender<'a>,
    ) -> Self {
        Self {
            queue,
            sink,
            period,
            display,
            average: RunningAverage::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn average(&self) -> &RunningAverage {
        &self.average
    }

    /// Report one measurement, fold it into the window and flush the window
    /// if the display period expired since the last check.
    pub async fn process(&mut self, m: Measurement) {
        let report = Report::from_measurement(&m);
        self.sink.emit(&report).await;
        self.average.add(&report.reading);

        if self.period.try_take().is_some() {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let Some(mean) = self.average.take() else {
            return;
        };
        if self.display.try_send(mean).is_err() {
            debug!("Display busy, average dropped");
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            let m = self.queue.receive().await;
            self.process(m).await;
        }
    }
}
