//! Register level access to the controller.
use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::delay::DelayNs;
use stusb4500_traits::RegisterBus;

use crate::{ArgumentError, Error};
use crate::codec::{MessageHeader, OBJECT_SIZE, Pdo, Rdo, decode_pdo, decode_rdo, encode_pdo};
use crate::negotiation::{Negotiation, Outcome, ReceivedMessage, evaluate};
use crate::nvm::{NvmImage, NvmProgrammer};
use crate::registers::{
    AlertMask, DEVICE_ID, DPM_PDO_NUMB, DPM_SNK_PDO1, MAX_RX_OBJECTS, PD_COMMAND_CTRL, PE_FSM, PORT_STATUS_0,
    PRT_STATUS, PolicyEngineState, RDO_STATUS, RX_DATA_OBJECTS, RX_HEADER, Register, SINK_PDO_COUNT,
    STATUS_BLOCK_LEN, STATUS_BLOCK_START, StatusSnapshot, TX_HEADER,
};

/// Number of attempts for a register read.
pub const READ_ATTEMPTS: u8 = 3;

/// Pause between read attempts.
pub const READ_RETRY_DELAY_MS: u32 = 10;

/// Soft reset message type, written to the transmit header.
const SOFT_RESET_MESSAGE: u8 = 0x0D;
/// Command that transmits the message in the transmit header.
const SEND_MESSAGE_COMMAND: u8 = 0x26;
/// Command that issues a hard reset.
const HARD_RESET_COMMAND: u8 = 0x05;

/// An STUSB4500 on a register bus.
pub struct Stusb4500<B, D> {
    pub(crate) bus: B,
    pub(crate) delay: D,
}

impl<B: RegisterBus, D: DelayNs> Stusb4500<B, D> {
    /// Create a new device.
    pub fn new(bus: B, delay: D) -> Self {
        Self { bus, delay }
    }

    /// Release the bus and delay.
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Read consecutive registers.
    ///
    /// Transient failures are retried up to [`READ_ATTEMPTS`] times.
    pub fn read_register(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Error<B::Error>> {
        let mut attempt = 1;

        loop {
            match self.bus.read(register, buffer) {
                Ok(()) => return Ok(()),
                Err(_) if attempt < READ_ATTEMPTS => {
                    warn!(
                        "Read of register {:#x} failed (attempt {} of {})",
                        register, attempt, READ_ATTEMPTS
                    );
                    attempt += 1;
                    self.delay.delay_ms(READ_RETRY_DELAY_MS);
                }
                Err(error) => {
                    error!("Read of register {:#x} failed", register);
                    return Err(Error::Transport(error));
                }
            }
        }
    }

    /// Write consecutive registers.
    pub fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), Error<B::Error>> {
        self.bus.write(register, data).map_err(|error| {
            error!("Write of register {:#x} failed", register);
            Error::Transport(error)
        })
    }

    /// Read a described register.
    pub fn read<R: Register>(&mut self) -> Result<R, Error<B::Error>> {
        let mut buffer = [0u8; 1];
        self.read_register(R::ADDRESS, &mut buffer)?;
        trace!("{}: {:#x}", R::NAME, buffer[0]);

        Ok(R::from(buffer[0]))
    }

    /// Write a described register.
    pub fn write<R: Register>(&mut self, value: R) -> Result<(), Error<B::Error>> {
        self.write_register(R::ADDRESS, &[value.into()])
    }

    pub(crate) fn delay_ms(&mut self, milliseconds: u32) {
        self.delay.delay_ms(milliseconds);
    }

    pub(crate) fn delay_us(&mut self, microseconds: u32) {
        self.delay.delay_us(microseconds);
    }

    /// Device identification.
    pub fn device_id(&mut self) -> Result<u8, Error<B::Error>> {
        let mut buffer = [0u8; 1];
        self.read_register(DEVICE_ID, &mut buffer)?;

        Ok(buffer[0])
    }

    /// Read all status registers at once.
    pub fn status(&mut self) -> Result<StatusSnapshot, Error<B::Error>> {
        let mut block = [0u8; STATUS_BLOCK_LEN];
        self.read_register(STATUS_BLOCK_START, &mut block)?;

        Ok(StatusSnapshot::from_block(&block))
    }

    /// Clear latched alerts by reading the latched status registers.
    pub fn clear_alerts(&mut self) -> Result<(), Error<B::Error>> {
        let mut block = [0u8; (PRT_STATUS - PORT_STATUS_0) as usize + 1];
        self.read_register(PORT_STATUS_0, &mut block)
    }

    /// Select the alerts that assert the alert line.
    pub fn set_alert_mask(&mut self, mask: AlertMask) -> Result<(), Error<B::Error>> {
        self.write(mask)
    }

    /// State of the policy engine.
    pub fn policy_engine_state(&mut self) -> Result<PolicyEngineState, Error<B::Error>> {
        let mut buffer = [0u8; 1];
        self.read_register(PE_FSM, &mut buffer)?;

        Ok(buffer[0].into())
    }

    /// Issue a soft reset, which makes the controller renegotiate.
    pub fn soft_reset(&mut self) -> Result<(), Error<B::Error>> {
        debug!("Soft reset");
        self.write_register(TX_HEADER, &[SOFT_RESET_MESSAGE])?;
        self.write_register(PD_COMMAND_CTRL, &[SEND_MESSAGE_COMMAND])
    }

    /// Issue a hard reset.
    pub fn hard_reset(&mut self) -> Result<(), Error<B::Error>> {
        debug!("Hard reset");
        self.write_register(PD_COMMAND_CTRL, &[HARD_RESET_COMMAND])
    }

    /// Number of advertised sink PDOs.
    pub fn pdo_count(&mut self) -> Result<u8, Error<B::Error>> {
        let mut buffer = [0u8; 1];
        self.read_register(DPM_PDO_NUMB, &mut buffer)?;

        Ok(buffer[0] & 0x07)
    }

    /// Set the number of advertised sink PDOs.
    pub fn set_pdo_count(&mut self, count: u8) -> Result<(), Error<B::Error>> {
        if !(1..=SINK_PDO_COUNT).contains(&count) {
            return Err(ArgumentError::PdoCount.into());
        }

        self.write_register(DPM_PDO_NUMB, &[count])
    }

    fn sink_pdo_register(index: u8) -> Result<u8, Error<B::Error>> {
        if !(1..=SINK_PDO_COUNT).contains(&index) {
            return Err(ArgumentError::PdoIndex.into());
        }

        Ok(DPM_SNK_PDO1 + (index - 1) * OBJECT_SIZE as u8)
    }

    /// Read the sink PDO at a 1-based `index`.
    pub fn sink_pdo(&mut self, index: u8) -> Result<Pdo, Error<B::Error>> {
        let register = Self::sink_pdo_register(index)?;

        let mut buffer = [0u8; OBJECT_SIZE];
        self.read_register(register, &mut buffer)?;

        Ok(decode_pdo(LittleEndian::read_u32(&buffer)))
    }

    /// Write the sink PDO at a 1-based `index`.
    pub fn set_sink_pdo(&mut self, index: u8, pdo: &Pdo) -> Result<(), Error<B::Error>> {
        let register = Self::sink_pdo_register(index)?;

        let mut buffer = [0u8; OBJECT_SIZE];
        LittleEndian::write_u32(&mut buffer, encode_pdo(pdo));
        self.write_register(register, &buffer)
    }

    /// Request data object of the active contract.
    pub fn rdo(&mut self) -> Result<Rdo, Error<B::Error>> {
        let mut buffer = [0u8; OBJECT_SIZE];
        self.read_register(RDO_STATUS, &mut buffer)?;

        Ok(decode_rdo(LittleEndian::read_u32(&buffer)))
    }

    /// The last message that the controller received.
    pub fn received_message(&mut self) -> Result<ReceivedMessage, Error<B::Error>> {
        let mut header = [0u8; 2];
        self.read_register(RX_HEADER, &mut header)?;
        let header = MessageHeader(LittleEndian::read_u16(&header));

        let len = usize::from(header.num_objects()).min(MAX_RX_OBJECTS) * OBJECT_SIZE;
        let mut objects = [0u8; MAX_RX_OBJECTS * OBJECT_SIZE];
        if len > 0 {
            self.read_register(RX_DATA_OBJECTS, &mut objects[..len])?;
        }

        Ok(ReceivedMessage::from_bytes(header, &objects[..len]))
    }

    /// Read the received source capabilities and the RDO, and evaluate the contract.
    pub fn negotiate(&mut self) -> Result<Negotiation, Error<B::Error>> {
        let message = self.received_message()?;
        if !message.header.is_source_capabilities() {
            debug!("Received message is not a source capabilities message");
            return Ok(Negotiation::without_contract(Outcome::Pending));
        }
        let rdo = self.rdo()?;

        Ok(evaluate(&message.source_pdos(), &rdo))
    }

    /// Read the whole NVM.
    pub fn read_nvm(&mut self) -> Result<NvmImage, Error<B::Error>> {
        NvmProgrammer::new(self).read()
    }

    /// Program the whole NVM and verify it.
    pub fn write_nvm(&mut self, image: &NvmImage) -> Result<(), Error<B::Error>> {
        NvmProgrammer::new(self).write(image)
    }
}
