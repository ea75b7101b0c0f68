//! SSD1306 I2C control-byte framing
//!
//! Every I2C transfer to the controller starts with a control byte telling it
//! whether the rest are commands (0x00) or display RAM data (0x40). Commands
//! are batched into one transfer; a data run always goes out as its own
//! transfer and closes any open command run first.

use core::mem;

use heapless::Vec;

pub const CONTROL_COMMAND: u8 = 0x00;
pub const CONTROL_DATA: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    InCommand,
    InData,
}

/// Batches command bytes into control-byte framed runs of at most `N`
/// bytes, prefix included.
#[derive(Debug)]
pub struct Framer<const N: usize> {
    state: FrameState,
    run: Vec<u8, N>,
}

impl<const N: usize> Default for Framer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Framer<N> {
    pub const fn new() -> Self {
        Self {
            state: FrameState::Idle,
            run: Vec::new(),
        }
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Append a command byte, opening a run if none is open.
    ///
    /// When the open run is full it is closed and returned, and the byte
    /// starts the next run.
    pub fn command(&mut self, byte: u8) -> Option<Vec<u8, N>> {
        let mut closed = None;
        if self.state == FrameState::InCommand && self.run.is_full() {
            closed = self.end();
        }
        if self.state != FrameState::InCommand {
            self.open();
        }
        // open() leaves room for at least one byte when N >= 2
        let _ = self.run.push(byte);
        closed
    }

    /// Enter a data run. An open command run is closed and returned so it
    /// goes out ahead of the data, which is sent prefixed by
    /// [`CONTROL_DATA`].
    pub fn begin_data(&mut self) -> Option<Vec<u8, N>> {
        let closed = self.end();
        self.state = FrameState::InData;
        closed
    }

    /// Close whatever run is open. Returns the pending command run, if any.
    pub fn end(&mut self) -> Option<Vec<u8, N>> {
        let state = mem::replace(&mut self.state, FrameState::Idle);
        let run = mem::take(&mut self.run);
        match state {
            FrameState::InCommand => Some(run),
            FrameState::Idle | FrameState::InData => None,
        }
    }

    fn open(&mut self) {
        self.run.clear();
        let _ = self.run.push(CONTROL_COMMAND);
        self.state = FrameState::InCommand;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_share_one_run() {
        let mut framer: Framer<16> = Framer::new();
        assert_eq!(framer.state(), FrameState::Idle);

        assert!(framer.command(0xAE).is_none());
        assert!(framer.command(0xD5).is_none());
        assert!(framer.command(0x80).is_none());
        assert_eq!(framer.state(), FrameState::InCommand);

        let run = framer.end().unwrap();
        assert_eq!(run.as_slice(), &[CONTROL_COMMAND, 0xAE, 0xD5, 0x80]);
        assert_eq!(framer.state(), FrameState::Idle);
        assert!(framer.end().is_none());
    }

    #[test]
    fn test_data_closes_command_run() {
        let mut framer: Framer<16> = Framer::new();
        framer.command(0x21);
        framer.command(0x00);

        let run = framer.begin_data().unwrap();
        assert_eq!(run.as_slice(), &[CONTROL_COMMAND, 0x21, 0x00]);
        assert_eq!(framer.state(), FrameState::InData);

        // Data run carries no pending commands
        assert!(framer.end().is_none());
        assert_eq!(framer.state(), FrameState::Idle);
    }

    #[test]
    fn test_command_after_data_opens_fresh_run() {
        let mut framer: Framer<16> = Framer::new();
        framer.command(0x22);
        framer.begin_data();
        assert!(framer.command(0xAF).is_none());

        let run = framer.end().unwrap();
        assert_eq!(run.as_slice(), &[CONTROL_COMMAND, 0xAF]);
    }

    #[test]
    fn test_full_run_is_split() {
        let mut framer: Framer<4> = Framer::new();
        assert!(framer.command(1).is_none());
        assert!(framer.command(2).is_none());
        assert!(framer.command(3).is_none());

        let first = framer.command(4).unwrap();
        assert_eq!(first.as_slice(), &[CONTROL_COMMAND, 1, 2, 3]);
        assert_eq!(framer.end().unwrap().as_slice(), &[CONTROL_COMMAND, 4]);
    }
}
