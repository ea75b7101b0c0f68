//! ESP32-S3 specific parts of the picova power meter
//!
//! Peripheral plumbing that cannot build on the desktop: the USB serial
//! report sink, build-time configuration and the fail-stop blinker. The
//! measurement pipeline itself lives in `picova_core`.

#![no_std]

pub mod fail_stop;
pub mod settings;
pub mod usb_report;
