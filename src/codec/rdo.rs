//! Request data object, as reported by the controller after negotiation.
use proc_bitfield::bitfield;

use super::MILLIAMPERES_PER_STEP;
use crate::units::{ElectricCurrent, current_from_milliamperes};

bitfield! {
    /// A fixed/variable supply request data object.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Rdo(pub u32): Debug, FromStorage, IntoStorage {
        /// Object position (0 means no contract)
        pub object_position: u8 @ 28..=30,
        /// Giveback flag
        pub giveback: bool @ 27,
        /// Capability mismatch
        pub capability_mismatch: bool @ 26,
        /// USB communications capable
        pub usb_comm_capable: bool @ 25,
        /// No USB suspend
        pub no_usb_suspend: bool @ 24,
        /// Unchunked extended messages supported
        pub unchunked_ext: bool @ 23,
        /// Operating current in 10 mA units
        pub raw_operating_current: u16 @ 10..=19,
        /// Maximum operating current in 10 mA units
        pub raw_max_operating_current: u16 @ 0..=9,
    }
}

#[allow(clippy::derivable_impls)]
impl Default for Rdo {
    fn default() -> Self {
        Self(0)
    }
}

impl Rdo {
    /// Operating current in mA.
    pub fn operating_ma(&self) -> u16 {
        self.raw_operating_current() * MILLIAMPERES_PER_STEP
    }

    /// Maximum operating current in mA.
    pub fn max_operating_ma(&self) -> u16 {
        self.raw_max_operating_current() * MILLIAMPERES_PER_STEP
    }

    /// Operating current.
    pub fn operating_current(&self) -> ElectricCurrent {
        current_from_milliamperes(self.operating_ma())
    }

    /// Maximum operating current.
    pub fn max_operating_current(&self) -> ElectricCurrent {
        current_from_milliamperes(self.max_operating_ma())
    }

    /// Whether the object position refers to any source PDO.
    pub fn is_contract(&self) -> bool {
        self.object_position() != 0
    }
}

/// Decode a raw RDO word.
pub fn decode_rdo(raw: u32) -> Rdo {
    Rdo(raw)
}
