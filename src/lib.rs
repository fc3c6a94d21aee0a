//! Driver for the STUSB4500 USB-PD sink controller.
//!
//! The controller runs the USB PD policy engine on its own. This crate reads and writes its
//! register view of that engine, evaluates the negotiated power contract and persists sink
//! configuration to the controller's non-volatile memory.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bus;
pub mod codec;
pub mod config;
pub mod device;
pub mod manager;
pub mod negotiation;
pub mod nvm;
pub mod registers;
pub mod units;

#[cfg(test)]
pub mod dummy;

pub use config::SinkConfig;
pub use device::Stusb4500;
pub use manager::Manager;
pub use negotiation::PowerContract;
pub use nvm::{NvmDiff, NvmImage};
pub use stusb4500_traits::RegisterBus;

/// Driver errors.
///
/// `E` is the error type of the underlying register bus.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A register read (after all retries) or write failed on the bus.
    #[error("register transport failure")]
    Transport(E),
    /// An argument or the configuration was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),
    /// The NVM read back after programming does not match the image that was written.
    #[error("NVM verification failed at {} byte(s)", .0.len())]
    Verification(NvmDiff),
    /// The device was used before it was detected.
    #[error("device not ready")]
    NotReady,
    /// The device did not identify itself in time.
    #[error("device detection timed out")]
    Timeout,
}

/// Reasons for rejecting an argument or a configuration.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArgumentError {
    /// A sink PDO index is not in 1..=3.
    #[error("PDO index must be 1 to 3")]
    PdoIndex,
    /// The PDO index does not refer to a defined PDO of the configuration.
    #[error("PDO index must refer to a defined PDO")]
    UndefinedPdo,
    /// The PDO count is not in 1..=3.
    #[error("PDO count must be 1 to 3")]
    PdoCount,
    /// The PDO count differs from the number of defined PDOs, or the defined PDOs are not contiguous.
    #[error("PDO count does not match the defined PDOs")]
    DefinedPdos,
    /// PDO1 is not 5 V.
    #[error("PDO1 must be 5 V")]
    FirstPdoVoltage,
    /// A voltage exceeds 20 V.
    #[error("voltage out of range")]
    Voltage,
    /// A current exceeds 5 A.
    #[error("current out of range")]
    Current,
    /// A threshold or timing does not fit its 4-bit field.
    #[error("threshold or timing out of range")]
    FieldRange,
}
