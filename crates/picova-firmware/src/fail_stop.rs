//! Fail-stop diagnostic: blink the status LED forever

use embassy_time::{Duration, Timer};
use esp_hal::gpio::Output;

const BLINK_PERIOD: Duration = Duration::from_millis(250);

/// Never returns. Nothing else runs on the meter once this is entered.
pub async fn blink_forever(mut led: Output<'_>) -> ! {
    loop {
        led.toggle();
        Timer::after(BLINK_PERIOD).await;
    }
}
