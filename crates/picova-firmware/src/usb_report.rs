//! Report stream over the USB serial/JTAG port

use embedded_io_async::Write;
use esp_hal::Async;
use esp_hal::usb_serial_jtag::UsbSerialJtag;
use log::warn;

use picova_core::reporter::{Report, ReportSink};

pub struct UsbReportSink {
    port: UsbSerialJtag<'static, Async>,
    dropped: u32,
}

impl UsbReportSink {
    pub fn new(port: UsbSerialJtag<'static, Async>) -> Self {
        Self { port, dropped: 0 }
    }

    /// Lines lost to formatting or port errors
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl ReportSink for UsbReportSink {
    async fn emit(&mut self, report: &Report) {
        let Ok(line) = report.to_line() else {
            self.dropped += 1;
            return;
        };

        if self.port.write_all(line.as_bytes()).await.is_err() {
            self.dropped += 1;
            // Only log the first of a run of failures
            if self.dropped == 1 {
                warn!("USB serial write failed, dropping report lines");
            }
        }
    }
}
