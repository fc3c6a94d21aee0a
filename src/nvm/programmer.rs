//! NVM access through the FTP (flash test program) port.
//!
//! Every sequence runs inside a session: unlock and power up, run the operation, then reset the
//! port and clear the key. The closing step runs exactly once per session, also when the operation
//! failed, so that the port is never left unlocked by an aborted sequence.
use embedded_hal::delay::DelayNs;
use stusb4500_traits::RegisterBus;

use super::{NVM_SECTORS, NvmImage, diff};
use crate::Error;
use crate::device::Stusb4500;
use crate::registers::{FTP_CTRL_0, FTP_CTRL_1, FTP_CUST_PASSWORD, RW_BUFFER};

/// Key that unlocks the FTP port.
pub const UNLOCK_KEY: u8 = 0x47;

/// Key that locks the FTP port.
pub const LOCK_KEY: u8 = 0x00;

// FTP_CTRL_0 bits
const PWR: u8 = 1 << 7;
const RST_N: u8 = 1 << 6;
const REQ: u8 = 1 << 4;
const SECTOR_MASK: u8 = 0x07;

const CTRL_RESET: u8 = 0x00;
const CTRL_RUN: u8 = PWR | RST_N;
const CTRL_REQUEST: u8 = CTRL_RUN | REQ;
const CTRL_EXIT: u8 = RST_N;

const POWER_UP_SETTLE_US: u32 = 1000;

/// FTP opcodes, written to `FTP_CTRL_1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Read a sector into the data buffer.
    Read = 0x00,
    /// Load the data buffer into the program latch.
    Load = 0x01,
    /// Program the latch into a sector.
    Program = 0x06,
    /// Select all sectors for erasure.
    EraseSetup = 0xFA,
    /// Load the erase selection.
    EraseLoad = 0x07,
    /// Erase the selected sectors.
    EraseExecute = 0x05,
}

impl Opcode {
    /// Time the flash needs to complete the request.
    pub const fn wait_ms(self) -> u32 {
        match self {
            Self::Read | Self::Load | Self::EraseSetup => 1,
            Self::Program => 2,
            Self::EraseLoad | Self::EraseExecute => 5,
        }
    }
}

/// Phase of an NVM sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FtpState {
    /// Port locked, no sequence running.
    Locked,
    /// Key written, powering up the port.
    Unlocking,
    /// Reading a sector.
    Reading(u8),
    /// Erasing all sectors.
    Erasing,
    /// Programming a sector.
    Programming(u8),
    /// Comparing the programmed image.
    Verifying,
    /// The last sequence was aborted or did not verify.
    Failed,
}

/// Runs NVM sequences on a device.
pub struct NvmProgrammer<'d, B: RegisterBus, D: DelayNs> {
    device: &'d mut Stusb4500<B, D>,
    state: FtpState,
}

impl<'d, B: RegisterBus, D: DelayNs> NvmProgrammer<'d, B, D> {
    /// Create a programmer for a device.
    pub fn new(device: &'d mut Stusb4500<B, D>) -> Self {
        Self {
            device,
            state: FtpState::Locked,
        }
    }

    /// Phase of the current or last sequence.
    pub fn state(&self) -> FtpState {
        self.state
    }

    /// Read the whole NVM.
    pub fn read(&mut self) -> Result<NvmImage, Error<B::Error>> {
        self.session(Self::read_sectors)
    }

    /// Erase and program the whole NVM, then read it back and compare.
    ///
    /// A readback that differs from `image` results in [`Error::Verification`].
    pub fn write(&mut self, image: &NvmImage) -> Result<(), Error<B::Error>> {
        self.session(|ftp| {
            ftp.erase()?;
            ftp.program(image)
        })?;

        self.transition(FtpState::Verifying);
        let readback = self.session(Self::read_sectors)?;
        let mismatch = diff(&readback, image);

        if mismatch.is_empty() {
            info!("NVM programmed and verified");
            Ok(())
        } else {
            error!("NVM verification failed at {} byte(s)", mismatch.len());
            self.transition(FtpState::Failed);
            Err(Error::Verification(mismatch))
        }
    }

    fn transition(&mut self, state: FtpState) {
        trace!("FTP state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn session<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<T, Error<B::Error>>,
    ) -> Result<T, Error<B::Error>> {
        // The readback of a write stays in the verifying phase.
        if self.state != FtpState::Verifying {
            self.transition(FtpState::Unlocking);
        }

        let result = match self.unlock() {
            Ok(()) => operation(self),
            Err(error) => Err(error),
        };
        let lock = self.lock();

        match (result, lock) {
            (Ok(value), Ok(())) => {
                self.transition(FtpState::Locked);
                Ok(value)
            }
            (Ok(_), Err(error)) => {
                error!("Failed to lock the FTP port");
                self.transition(FtpState::Failed);
                Err(error)
            }
            (Err(error), lock) => {
                if lock.is_err() {
                    error!("Failed to lock the FTP port after an aborted sequence");
                }
                self.transition(FtpState::Failed);
                Err(error)
            }
        }
    }

    fn unlock(&mut self) -> Result<(), Error<B::Error>> {
        self.device.write_register(FTP_CUST_PASSWORD, &[UNLOCK_KEY])?;

        self.device.write_register(FTP_CTRL_0, &[CTRL_RESET])?;
        self.device.delay_us(POWER_UP_SETTLE_US);
        self.device.write_register(FTP_CTRL_0, &[CTRL_RUN])
    }

    fn lock(&mut self) -> Result<(), Error<B::Error>> {
        let reset = self.device.write_register(FTP_CTRL_0, &[CTRL_EXIT, Opcode::Read as u8]);
        let key = self.device.write_register(FTP_CUST_PASSWORD, &[LOCK_KEY]);

        reset.and(key)
    }

    fn request(&mut self, opcode: Opcode, sector: u8) -> Result<(), Error<B::Error>> {
        self.device.write_register(FTP_CTRL_1, &[opcode as u8])?;
        self.device
            .write_register(FTP_CTRL_0, &[CTRL_REQUEST | (sector & SECTOR_MASK)])?;
        self.device.delay_ms(opcode.wait_ms());

        Ok(())
    }

    fn read_sectors(&mut self) -> Result<NvmImage, Error<B::Error>> {
        let mut image = NvmImage::default();

        for index in 0..NVM_SECTORS {
            let sector = index as u8;
            if self.state != FtpState::Verifying {
                self.transition(FtpState::Reading(sector));
            }

            self.request(Opcode::Read, sector)?;
            self.device.read_register(RW_BUFFER, image.sector_mut(index))?;
        }

        Ok(image)
    }

    fn erase(&mut self) -> Result<(), Error<B::Error>> {
        self.transition(FtpState::Erasing);

        // Partial erase relies on a cleared buffer.
        self.device.write_register(RW_BUFFER, &[0x00])?;

        self.request(Opcode::EraseSetup, 0)?;
        self.request(Opcode::EraseLoad, 0)?;
        self.request(Opcode::EraseExecute, 0)
    }

    fn program(&mut self, image: &NvmImage) -> Result<(), Error<B::Error>> {
        for (index, data) in image.sectors().iter().enumerate() {
            let sector = index as u8;
            self.transition(FtpState::Programming(sector));

            self.device.write_register(RW_BUFFER, data)?;
            self.request(Opcode::Load, 0)?;
            self.request(Opcode::Program, sector)?;
        }

        Ok(())
    }
}
