use std::io::{self, Write};

use log::warn;

use picova_core::reporter::{Report, ReportSink};

/// Report stream on stdout, one `\r\n` terminated line per sample
pub struct StdoutSink {
    out: io::Stdout,
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl ReportSink for StdoutSink {
    async fn emit(&mut self, report: &Report) {
        let Ok(line) = report.to_line() else {
            warn!("Report at {} us does not fit a line", report.timestamp_us);
            return;
        };
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(line.as_bytes()) {
            warn!("stdout write failed: {}", e);
        }
    }
}
