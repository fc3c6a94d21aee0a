//! Register bus on top of an `embedded-hal` I2C bus.
use embedded_hal::i2c::{I2c, Operation};
use stusb4500_traits::RegisterBus;

/// Default 7-bit address, with both address pins low.
pub const DEFAULT_ADDRESS: u8 = 0x28;

/// An I2C connection to the controller.
pub struct I2cBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cBus<I2C> {
    /// Connect at [`DEFAULT_ADDRESS`].
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Connect at a custom 7-bit address.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Release the I2C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterBus for I2cBus<I2C> {
    type Error = I2C::Error;

    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(self.address, &[register], buffer)
    }

    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        // Adjacent writes are sent without a repeated start.
        self.i2c
            .transaction(self.address, &mut [Operation::Write(&[register]), Operation::Write(data)])
    }
}
