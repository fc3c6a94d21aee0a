//! Implements a dummy register bus and delay for testing.
//!
//! The bus holds a register file and emulates the FTP port on top of an NVM that behaves like
//! flash: erasing sets all bits, programming can only clear bits.

// Provides the critical section implementation for `AlertSignal`.
use critical_section as _;
use embedded_hal::delay::DelayNs;
use stusb4500_traits::RegisterBus;

use crate::codec::{OBJECT_SIZE, Pdo, encode_pdo};
use crate::nvm::{DEFAULT_IMAGE, NVM_SIZE, NvmImage, SECTOR_SIZE};
use crate::registers::{
    DEVICE_ID, DEVICE_ID_VALUE, FTP_CTRL_0, FTP_CTRL_1, FTP_CUST_PASSWORD, RDO_STATUS, RW_BUFFER, RX_DATA_OBJECTS,
    RX_HEADER,
};

/// Error of the dummy bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyError;

/// A recorded bus access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Read of `len` bytes.
    Read {
        /// First register.
        register: u8,
        /// Number of bytes.
        len: usize,
    },
    /// Write of `data`.
    Write {
        /// First register.
        register: u8,
        /// Written bytes.
        data: Vec<u8>,
    },
}

/// A dummy register bus for testing.
pub struct DummyBus {
    /// Register file.
    pub registers: [u8; 256],
    /// Emulated NVM content.
    pub nvm: NvmImage,
    /// Number of executed erase requests.
    pub nvm_erase_count: usize,
    /// Every access, including failed ones.
    pub trace: Vec<Access>,
    latch: [u8; SECTOR_SIZE],
    erase_armed: bool,
    read_failures: usize,
    failing_write: Option<usize>,
    write_count: usize,
    stuck_bits: Option<(usize, u8)>,
}

impl DummyBus {
    /// Create a bus with a present device and a factory NVM.
    pub fn new() -> Self {
        let mut registers = [0u8; 256];
        registers[DEVICE_ID as usize] = DEVICE_ID_VALUE;

        Self {
            registers,
            nvm: DEFAULT_IMAGE,
            nvm_erase_count: 0,
            trace: Vec::new(),
            latch: [0; SECTOR_SIZE],
            erase_armed: false,
            read_failures: 0,
            failing_write: None,
            write_count: 0,
            stuck_bits: None,
        }
    }

    /// Fail the next `count` reads.
    pub fn fail_reads(&mut self, count: usize) {
        self.read_failures = count;
    }

    /// Fail the write with the 0-based `index`, counted from the creation of the bus.
    pub fn fail_write(&mut self, index: usize) {
        self.failing_write = Some(index);
    }

    /// Keep the bits in `mask` of the NVM byte at `offset` cleared when programming.
    pub fn stick_nvm_bit(&mut self, offset: usize, mask: u8) {
        assert!(offset < NVM_SIZE);
        self.stuck_bits = Some((offset, mask));
    }

    /// Inject a received source capabilities message.
    pub fn inject_source_capabilities(&mut self, pdos: &[Pdo]) {
        let header: u16 = 0x01A1 | ((pdos.len() as u16) << 12);
        self.registers[RX_HEADER as usize..][..2].copy_from_slice(&header.to_le_bytes());

        for (index, pdo) in pdos.iter().enumerate() {
            let register = RX_DATA_OBJECTS as usize + index * OBJECT_SIZE;
            self.registers[register..][..OBJECT_SIZE].copy_from_slice(&encode_pdo(pdo).to_le_bytes());
        }
    }

    /// Inject the RDO of the active contract.
    pub fn inject_rdo(&mut self, raw: u32) {
        self.registers[RDO_STATUS as usize..][..OBJECT_SIZE].copy_from_slice(&raw.to_le_bytes());
    }

    /// All writes as register and data.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.trace
            .iter()
            .filter_map(|access| match access {
                Access::Write { register, data } => Some((*register, data.clone())),
                Access::Read { .. } => None,
            })
            .collect()
    }

    /// Number of writes of `data` to `register`.
    pub fn count_writes(&self, register: u8, data: &[u8]) -> usize {
        self.writes()
            .iter()
            .filter(|(r, d)| *r == register && d.as_slice() == data)
            .count()
    }

    /// Number of reads that start at `register`.
    pub fn count_reads(&self, register: u8) -> usize {
        self.trace
            .iter()
            .filter(|access| matches!(access, Access::Read { register: r, .. } if *r == register))
            .count()
    }

    fn buffer(&mut self) -> &mut [u8] {
        &mut self.registers[RW_BUFFER as usize..][..SECTOR_SIZE]
    }

    fn ftp_request(&mut self) {
        const PWR_RST_N: u8 = 0xC0;
        const REQ: u8 = 0x10;

        let ctrl = self.registers[FTP_CTRL_0 as usize];
        let unlocked = self.registers[FTP_CUST_PASSWORD as usize] == 0x47;
        if ctrl & REQ == 0 || ctrl & PWR_RST_N != PWR_RST_N || !unlocked {
            return;
        }

        let sector = (ctrl & 0x07) as usize;
        match self.registers[FTP_CTRL_1 as usize] {
            0x00 => {
                let data = self.nvm.sectors()[sector];
                self.buffer().copy_from_slice(&data);
            }
            0x01 => {
                let mut latch = [0u8; SECTOR_SIZE];
                latch.copy_from_slice(self.buffer());
                self.latch = latch;
            }
            0x06 => {
                let latch = self.latch;
                for (byte, value) in self.nvm.sector_mut(sector).iter_mut().zip(latch) {
                    *byte &= value;
                }
                if let Some((offset, mask)) = self.stuck_bits {
                    if offset / SECTOR_SIZE == sector {
                        self.nvm.sector_mut(sector)[offset % SECTOR_SIZE] &= !mask;
                    }
                }
            }
            0xFA => self.erase_armed = self.buffer()[0] == 0x00,
            0x07 => {}
            0x05 => {
                if self.erase_armed {
                    self.nvm = NvmImage::from_bytes(&[0xFF; NVM_SIZE]);
                    self.nvm_erase_count += 1;
                    self.erase_armed = false;
                }
            }
            _ => {}
        }

        self.registers[FTP_CTRL_0 as usize] &= !REQ;
    }
}

impl RegisterBus for DummyBus {
    type Error = DummyError;

    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.trace.push(Access::Read {
            register,
            len: buffer.len(),
        });

        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(DummyError);
        }

        let start = register as usize;
        buffer.copy_from_slice(&self.registers[start..start + buffer.len()]);
        Ok(())
    }

    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.trace.push(Access::Write {
            register,
            data: data.to_vec(),
        });

        let index = self.write_count;
        self.write_count += 1;
        if self.failing_write == Some(index) {
            return Err(DummyError);
        }

        let start = register as usize;
        self.registers[start..start + data.len()].copy_from_slice(data);

        if register == FTP_CTRL_0 {
            self.ftp_request();
        }
        Ok(())
    }
}

/// A delay that only counts.
#[derive(Default)]
pub struct DummyDelay {
    elapsed_ns: u64,
}

impl DummyDelay {
    /// Total delay in µs.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_ns / 1000
    }
}

impl DelayNs for DummyDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ftp_ignores_requests_while_locked() {
        let mut bus = DummyBus::new();

        bus.write(FTP_CTRL_1, &[0x05]).unwrap();
        bus.write(FTP_CTRL_0, &[0xD0]).unwrap();

        assert_eq!(bus.nvm_erase_count, 0);
        assert_eq!(bus.nvm, DEFAULT_IMAGE);
    }

    #[test]
    fn test_programming_without_erase_only_clears_bits() {
        let mut bus = DummyBus::new();
        bus.write(FTP_CUST_PASSWORD, &[0x47]).unwrap();
        bus.write(RW_BUFFER, &[0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00]).unwrap();
        bus.write(FTP_CTRL_1, &[0x01]).unwrap();
        bus.write(FTP_CTRL_0, &[0xD0]).unwrap();
        bus.write(FTP_CTRL_1, &[0x06]).unwrap();
        bus.write(FTP_CTRL_0, &[0xD1]).unwrap();

        assert_eq!(bus.nvm.sectors()[1], [0x10, 0x00, 0x9C, 0x00, 0xFF, 0x00, 0x3C, 0x00]);
        assert_eq!(bus.registers[FTP_CTRL_0 as usize], 0xC1);
    }
}
