//! Non-volatile memory image, its mapping to [`SinkConfig`] and the programming sequence.
//!
//! The NVM consists of five 8-byte sectors. Sectors 1, 3 and 4 hold the sink configuration,
//! sectors 0 and 2 hold vendor calibration and are always taken from [`DEFAULT_IMAGE`].
use heapless::Vec;

use crate::config::SinkConfig;

pub mod banks;
pub mod programmer;

pub use programmer::{FtpState, NvmProgrammer};

/// Number of sectors.
pub const NVM_SECTORS: usize = 5;

/// Size of a sector in bytes.
pub const SECTOR_SIZE: usize = 8;

/// Size of the NVM in bytes.
pub const NVM_SIZE: usize = NVM_SECTORS * SECTOR_SIZE;

/// Raw content of one sector.
pub type Sector = [u8; SECTOR_SIZE];

/// Factory content of the NVM.
pub const DEFAULT_IMAGE: NvmImage = NvmImage([
    [0x00, 0x00, 0xB0, 0xAA, 0x00, 0x45, 0x00, 0x00],
    [0x10, 0x40, 0x9C, 0x1C, 0xFF, 0x01, 0x3C, 0xDF],
    [0x02, 0x40, 0x0F, 0x00, 0x32, 0x00, 0xFC, 0xF1],
    [0x00, 0x19, 0x56, 0xAF, 0xF5, 0x35, 0x5F, 0x00],
    [0x00, 0x4B, 0x90, 0x21, 0x43, 0x00, 0x40, 0xFB],
]);

/// Content of the whole NVM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NvmImage([Sector; NVM_SECTORS]);

impl Default for NvmImage {
    fn default() -> Self {
        DEFAULT_IMAGE
    }
}

impl NvmImage {
    /// Build an image from raw bytes.
    pub fn from_bytes(bytes: &[u8; NVM_SIZE]) -> Self {
        let mut image = Self([[0; SECTOR_SIZE]; NVM_SECTORS]);
        for (sector, chunk) in image.0.iter_mut().zip(bytes.chunks_exact(SECTOR_SIZE)) {
            sector.copy_from_slice(chunk);
        }
        image
    }

    /// Raw bytes in sector order.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_flattened()
    }

    /// All sectors in order.
    pub fn sectors(&self) -> &[Sector; NVM_SECTORS] {
        &self.0
    }

    /// Mutable access to one sector.
    ///
    /// # Panics
    ///
    /// If `index` is not below [`NVM_SECTORS`].
    pub fn sector_mut(&mut self, index: usize) -> &mut Sector {
        &mut self.0[index]
    }

    /// Encode a configuration on top of [`DEFAULT_IMAGE`].
    ///
    /// Bits that carry no configuration keep their default value.
    pub fn encode(config: &SinkConfig) -> Self {
        let mut image = DEFAULT_IMAGE;
        for (sector, bank) in image.0.iter_mut().zip(banks::BANKS.iter()) {
            (bank.pack)(config, sector);
        }
        image
    }

    /// Decode the configuration held by this image.
    ///
    /// Settings without an NVM representation keep their default value.
    pub fn decode(&self) -> SinkConfig {
        let mut config = SinkConfig::default();
        for (sector, bank) in self.0.iter().zip(banks::BANKS.iter()) {
            (bank.unpack)(sector, &mut config);
        }
        config
    }

    /// Whether both images hold the same bytes.
    pub fn equals(&self, other: &NvmImage) -> bool {
        diff(self, other).is_empty()
    }
}

/// A byte that differs between two images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteDiff {
    /// Offset into the image.
    pub offset: u8,
    /// Value in the current image.
    pub current: u8,
    /// Value in the desired image.
    pub desired: u8,
}

/// Differences between two images, in offset order.
pub type NvmDiff = Vec<ByteDiff, NVM_SIZE>;

/// Compare two images byte by byte.
pub fn diff(current: &NvmImage, desired: &NvmImage) -> NvmDiff {
    current
        .as_bytes()
        .iter()
        .zip(desired.as_bytes())
        .enumerate()
        .filter(|(_, (current, desired))| current != desired)
        .map(|(offset, (&current, &desired))| ByteDiff {
            offset: offset as u8,
            current,
            desired,
        })
        .collect()
}
