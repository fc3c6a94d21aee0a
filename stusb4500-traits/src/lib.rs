//! STUSB4500 driver traits.
//!
//! Provides a register bus trait that allows to run the driver on top of various transports.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// Byte-oriented register bus, through which the driver talks to the controller.
///
/// Multi-byte accesses address consecutive registers, starting at `register`.
pub trait RegisterBus {
    /// Transport specific error.
    type Error;

    /// Read `buffer.len()` bytes, starting at `register`.
    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data`, starting at `register`.
    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    type Error = T::Error;

    fn read(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, register, buffer)
    }

    fn write(&mut self, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        T::write(self, register, data)
    }
}
