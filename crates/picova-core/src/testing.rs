//! In-memory I2C bus for host tests

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};

use crate::ina219::Register;
use crate::reporter::{Report, ReportSink};

const REGISTER_COUNT: usize = 6;

/// One recorded write transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub address: u8,
    pub bytes: Vec<u8>,
}

impl Transfer {
    pub fn new(address: u8, bytes: &[u8]) -> Self {
        Self {
            address,
            bytes: bytes.to_vec(),
        }
    }
}

/// Register-level bus model
///
/// Reads are answered from a per-register queue. Once a queue runs dry the
/// register keeps returning the last value handed out or written. A write of
/// a single byte only moves the register pointer; longer writes are recorded
/// and, when addressed to a register, update its value.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    pointer: u8,
    queued: [VecDeque<u16>; REGISTER_COUNT],
    values: [u16; REGISTER_COUNT],
    reads: Vec<Register>,
    writes: Vec<Transfer>,
    fail_reads: VecDeque<ErrorKind>,
    register_write_counts: [usize; REGISTER_COUNT],
    /// (register, 1-based write number, error)
    write_faults: Vec<(Register, usize, ErrorKind)>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, reg: Register, value: u16) {
        self.queued[reg.addr() as usize].push_back(value);
    }

    /// Queue one bus/current/power triple as returned by a single read cycle.
    pub fn queue_sample(&mut self, bus: u16, current: u16, power: u16) {
        self.queue(Register::BusVoltage, bus);
        self.queue(Register::Current, current);
        self.queue(Register::Power, power);
    }

    pub fn fail_next_read(&mut self, kind: ErrorKind) {
        self.fail_reads.push_back(kind);
    }

    /// Fail the `nth` write to `reg`, counting from 1. The failed write
    /// neither changes the register nor shows up in `writes()`.
    pub fn fail_nth_write(&mut self, reg: Register, nth: usize, kind: ErrorKind) {
        self.write_faults.push((reg, nth, kind));
    }

    pub fn reads(&self) -> &[Register] {
        &self.reads
    }

    pub fn writes(&self) -> &[Transfer] {
        &self.writes
    }

    /// Writes made to `reg`, as register values
    pub fn register_writes(&self, reg: Register) -> Vec<u16> {
        self.writes
            .iter()
            .filter(|t| t.bytes.len() == 3 && t.bytes[0] == reg.addr())
            .map(|t| u16::from_be_bytes([t.bytes[1], t.bytes[2]]))
            .collect()
    }

    fn register(pointer: u8) -> Register {
        match pointer {
            0 => Register::Config,
            1 => Register::ShuntVoltage,
            2 => Register::BusVoltage,
            3 => Register::Power,
            4 => Register::Current,
            _ => Register::Calibration,
        }
    }

    fn next_value(&mut self) -> u16 {
        let index = self.pointer as usize % REGISTER_COUNT;
        if let Some(value) = self.queued[index].pop_front() {
            self.values[index] = value;
        }
        self.values[index]
    }
}

impl ErrorType for ScriptedBus {
    type Error = ErrorKind;
}

impl ScriptedBus {
    fn finish_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        let Some(&pointer) = bytes.first() else {
            return Ok(());
        };
        self.pointer = pointer;
        if bytes.len() == 1 {
            return Ok(());
        }
        if bytes.len() == 3 && (pointer as usize) < REGISTER_COUNT {
            let index = pointer as usize;
            self.register_write_counts[index] += 1;
            let count = self.register_write_counts[index];
            if let Some(pos) = self
                .write_faults
                .iter()
                .position(|&(reg, nth, _)| reg.addr() == pointer && nth == count)
            {
                let (_, _, kind) = self.write_faults.remove(pos);
                return Err(kind);
            }
            self.values[index] = u16::from_be_bytes([bytes[1], bytes[2]]);
        }
        self.writes.push(Transfer::new(address, bytes));
        Ok(())
    }
}

impl I2c for ScriptedBus {
    /// Adjacent write operations form one transfer, as they would on the wire.
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut pending = Vec::new();
        for op in operations {
            match op {
                Operation::Write(bytes) => pending.extend_from_slice(bytes),
                Operation::Read(buf) => {
                    self.finish_write(address, &pending)?;
                    pending.clear();

                    if let Some(kind) = self.fail_reads.pop_front() {
                        return Err(kind);
                    }
                    self.reads.push(Self::register(self.pointer));
                    let value = self.next_value().to_be_bytes();
                    for (dst, src) in buf.iter_mut().zip(value) {
                        *dst = src;
                    }
                }
            }
        }
        self.finish_write(address, &pending)
    }
}

impl ReportSink for Vec<Report> {
    async fn emit(&mut self, report: &Report) {
        self.push(*report);
    }
}
