//! Desktop simulator for the picova power meter.
//!
//! Runs the firmware's sampling pipeline unchanged on the embassy std
//! executor, against a register-level INA219 model with a synthetic load.
//! The report stream goes to stdout; logs go to stderr (`RUST_LOG`). The
//! display is rendered off-screen and saved as a PNG on every update.
//!
//! The model starts at the narrowest ranges, so the first load surges and
//! the rising supply drive the auto-ranging.
//!
//! ```text
//! picova-simulator [SECONDS] [PNG]
//! ```

mod sensor_model;
mod sim_panel;
mod stdout_sink;

use std::path::PathBuf;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker, Timer};
use log::{error, info};

use picova_core::display::DisplayPanel;
use picova_core::ina219::{AdcMode, BusRange, Configuration, ShuntRange};
use picova_core::reporter::Reporter;
use picova_core::sampler::Sampler;
use picova_core::{MeterConfig, Pipeline, SetupError, bring_up_sensor};

use crate::sensor_model::{Load, SimulatedIna219};
use crate::sim_panel::PngPanel;
use crate::stdout_sink::StdoutSink;

const DEFAULT_RUN_SECS: u64 = 5;
const DEFAULT_PNG: &str = "picova-display.png";

static PIPELINE: Pipeline = Pipeline::new();

struct Args {
    run_for: Duration,
    png: PathBuf,
}

impl Args {
    fn from_env() -> Self {
        let mut args = std::env::args().skip(1);
        let secs = args
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RUN_SECS);
        let png = args.next().unwrap_or_else(|| DEFAULT_PNG.into());
        Self {
            run_for: Duration::from_secs(secs),
            png: png.into(),
        }
    }
}

#[embassy_executor::task]
async fn sampler_task(sampler: Sampler<'static, SimulatedIna219>) -> ! {
    sampler.run(|| Instant::now().as_micros()).await
}

#[embassy_executor::task]
async fn reporter_task(reporter: Reporter<'static, StdoutSink>) -> ! {
    reporter.run().await
}

#[embassy_executor::task]
async fn display_task(display: DisplayPanel<PngPanel>) -> ! {
    PIPELINE.drive_display(display).await
}

#[embassy_executor::task(pool_size = 2)]
async fn ticker_task(signal: &'static Signal<CriticalSectionRawMutex, ()>, period: Duration) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        signal.signal(());
    }
}

async fn start(spawner: &Spawner, args: &Args) -> Result<(), SetupError> {
    let cfg = MeterConfig {
        initial: Configuration {
            bus_range: BusRange::V16,
            shunt_range: ShuntRange::Mv40,
            bus_adc: AdcMode::Bits12,
            shunt_adc: AdcMode::Samples2,
        },
        ..Default::default()
    };

    let model = SimulatedIna219::new(cfg.shunt_ohms, Load::default());
    let sensor = bring_up_sensor(model, &cfg).await?;

    spawner.spawn(
        display_task(DisplayPanel::new(PngPanel::new(args.png.clone())))
            .map_err(|_| SetupError::Spawn("display"))?,
    );
    spawner.spawn(
        reporter_task(PIPELINE.reporter(StdoutSink::new()))
            .map_err(|_| SetupError::Spawn("reporter"))?,
    );
    spawner.spawn(
        sampler_task(PIPELINE.sampler(sensor, &cfg)).map_err(|_| SetupError::Spawn("sampler"))?,
    );
    spawner.spawn(
        ticker_task(&PIPELINE.period, cfg.display_period())
            .map_err(|_| SetupError::Spawn("display ticker"))?,
    );
    spawner.spawn(
        ticker_task(&PIPELINE.wake, cfg.sample_period())
            .map_err(|_| SetupError::Spawn("conversion ticker"))?,
    );

    info!(
        "Sampling every {} us for {} s, display frames to {}",
        cfg.sample_period().as_micros(),
        args.run_for.as_secs(),
        args.png.display()
    );
    Ok(())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::init();
    info!("Starting picova simulator");

    let args = Args::from_env();
    if let Err(e) = start(&spawner, &args).await {
        error!("Setup failed: {}", e);
        std::process::exit(1);
    }

    Timer::after(args.run_for).await;
    info!("Simulator exiting");
    std::process::exit(0);
}
