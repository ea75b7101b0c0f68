#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_hal::Async;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::usb_serial_jtag::UsbSerialJtag;
use log::{error, info, warn};

use picova_core::display::{DisplayPanel, SSD1306_ADDRESS, Ssd1306};
use picova_core::reporter::Reporter;
use picova_core::sampler::Sampler;
use picova_core::{Pipeline, SetupError, bring_up_sensor};
use picova_firmware::fail_stop::blink_forever;
use picova_firmware::settings::meter_config;
use picova_firmware::usb_report::UsbReportSink;

type Bus = I2c<'static, Async>;

const SENSOR_BUS_RATE: Rate = Rate::from_khz(1000);
const DISPLAY_BUS_RATE: Rate = Rate::from_khz(400);

static PIPELINE: Pipeline = Pipeline::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn sampler_task(sampler: Sampler<'static, Bus>) -> ! {
    sampler.run(|| Instant::now().as_micros()).await
}

#[embassy_executor::task]
async fn reporter_task(reporter: Reporter<'static, UsbReportSink>) -> ! {
    reporter.run().await
}

#[embassy_executor::task]
async fn display_task(display: DisplayPanel<Ssd1306<Bus>>) -> ! {
    PIPELINE.drive_display(display).await
}

/// Raises `signal` once per `period`. Late ticks coalesce in the signal.
#[embassy_executor::task(pool_size = 2)]
async fn ticker_task(signal: &'static Signal<CriticalSectionRawMutex, ()>, period: Duration) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        signal.signal(());
    }
}

/// Bring the sensor and display up and start every task.
async fn start(
    spawner: &Spawner,
    sensor_bus: Bus,
    display_bus: Bus,
    usb: UsbSerialJtag<'static, Async>,
) -> Result<(), SetupError> {
    let cfg = meter_config()?;
    let sensor = bring_up_sensor(sensor_bus, &cfg).await?;

    // The meter is useful without its display, so a dead panel is not fatal
    let mut oled = Ssd1306::new(display_bus, SSD1306_ADDRESS).rotated(true);
    match oled.init().await {
        Ok(()) => spawner.spawn(
            display_task(DisplayPanel::new(oled)).map_err(|_| SetupError::Spawn("display"))?,
        ),
        Err(e) => warn!("Display unavailable: {}", e),
    }

    let sampler = PIPELINE.sampler(sensor, &cfg);
    let reporter = PIPELINE.reporter(UsbReportSink::new(usb));

    spawner.spawn(reporter_task(reporter).map_err(|_| SetupError::Spawn("reporter"))?);
    spawner.spawn(sampler_task(sampler).map_err(|_| SetupError::Spawn("sampler"))?);
    spawner.spawn(
        ticker_task(&PIPELINE.period, cfg.display_period())
            .map_err(|_| SetupError::Spawn("display ticker"))?,
    );
    spawner.spawn(
        ticker_task(&PIPELINE.wake, cfg.sample_period())
            .map_err(|_| SetupError::Spawn("conversion ticker"))?,
    );

    info!(
        "Sampling every {} us, display every {} ms",
        cfg.sample_period().as_micros(),
        cfg.display_period_ms
    );
    Ok(())
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Lit while running, blinking once setup has failed
    let led = Output::new(peripherals.GPIO2, Level::High, OutputConfig::default());

    let sensor_bus = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(SENSOR_BUS_RATE),
    );
    let display_bus = I2c::new(
        peripherals.I2C1,
        I2cConfig::default().with_frequency(DISPLAY_BUS_RATE),
    );
    let (Ok(sensor_bus), Ok(display_bus)) = (sensor_bus, display_bus) else {
        error!("I2C bus configuration rejected");
        blink_forever(led).await
    };

    let sensor_bus = sensor_bus
        .with_sda(peripherals.GPIO8)
        .with_scl(peripherals.GPIO9)
        .into_async();
    let display_bus = display_bus
        .with_sda(peripherals.GPIO4)
        .with_scl(peripherals.GPIO5)
        .into_async();
    let usb = UsbSerialJtag::new(peripherals.USB_DEVICE).into_async();

    if let Err(e) = start(&spawner, sensor_bus, display_bus, usb).await {
        error!("Setup failed: {}", e);
        blink_forever(led).await
    }

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
