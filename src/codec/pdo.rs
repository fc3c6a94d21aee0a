//! Sink fixed supply power data objects, as held in the sink PDO registers.
use proc_bitfield::bitfield;

use super::{MILLIAMPERES_PER_STEP, MILLIVOLTS_PER_STEP, TEN_BIT_MASK};
use crate::units::{ElectricCurrent, ElectricPotential, current_from_milliamperes, potential_from_millivolts};

/// Fast role swap support, as advertised by a sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FastRoleSwap {
    /// Fast role swap not supported.
    #[default]
    NotSupported,
    /// Default USB power.
    DefaultUsb,
    /// 1.5 A at 5 V.
    Current1A5,
    /// 3.0 A at 5 V.
    Current3A0,
}

impl From<u8> for FastRoleSwap {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::NotSupported,
            0b01 => Self::DefaultUsb,
            0b10 => Self::Current1A5,
            _ => Self::Current3A0,
        }
    }
}

impl From<FastRoleSwap> for u8 {
    fn from(value: FastRoleSwap) -> Self {
        match value {
            FastRoleSwap::NotSupported => 0b00,
            FastRoleSwap::DefaultUsb => 0b01,
            FastRoleSwap::Current1A5 => 0b10,
            FastRoleSwap::Current3A0 => 0b11,
        }
    }
}

bitfield! {
    /// Raw layout of a fixed supply PDO word.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RawPdo(pub u32): Debug, FromStorage, IntoStorage {
        /// Supply kind, zero for fixed supplies
        pub kind: u8 @ 30..=31,
        /// Dual-role power
        pub dual_role_power: bool @ 29,
        /// Higher capability (sink) or USB suspend supported (source)
        pub higher_capability: bool @ 28,
        /// Unconstrained power
        pub unconstrained_power: bool @ 27,
        /// USB communications capable
        pub usb_communications_capable: bool @ 26,
        /// Dual-role data
        pub dual_role_data: bool @ 25,
        /// Fast role swap required current
        pub raw_fast_role_swap: u8 @ 23..=24,
        /// Voltage in 50 mV units
        pub raw_voltage: u16 @ 10..=19,
        /// Current in 10 mA units
        pub raw_current: u16 @ 0..=9,
    }
}

/// A fixed supply PDO.
///
/// A sink current of 0 mA means that the shared flex current applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pdo {
    /// Voltage in mV.
    pub voltage_mv: u16,
    /// Current in mA.
    pub current_ma: u16,
    /// Dual-role power.
    pub dual_role_power: bool,
    /// Higher capability.
    pub higher_capability: bool,
    /// Unconstrained power.
    pub unconstrained_power: bool,
    /// USB communications capable.
    pub usb_comm_capable: bool,
    /// Fast role swap support.
    pub fast_role_swap: FastRoleSwap,
}

impl Pdo {
    /// A fixed PDO without any flags.
    pub const fn fixed(voltage_mv: u16, current_ma: u16) -> Self {
        Self {
            voltage_mv,
            current_ma,
            dual_role_power: false,
            higher_capability: false,
            unconstrained_power: false,
            usb_comm_capable: false,
            fast_role_swap: FastRoleSwap::NotSupported,
        }
    }

    /// The voltage of the supply.
    pub fn voltage(&self) -> ElectricPotential {
        potential_from_millivolts(self.voltage_mv)
    }

    /// The current of the supply.
    pub fn current(&self) -> ElectricCurrent {
        current_from_milliamperes(self.current_ma)
    }
}

/// Decode a raw PDO word.
pub fn decode_pdo(raw: u32) -> Pdo {
    let raw = RawPdo(raw);

    Pdo {
        voltage_mv: raw.raw_voltage() * MILLIVOLTS_PER_STEP,
        current_ma: raw.raw_current() * MILLIAMPERES_PER_STEP,
        dual_role_power: raw.dual_role_power(),
        higher_capability: raw.higher_capability(),
        unconstrained_power: raw.unconstrained_power(),
        usb_comm_capable: raw.usb_communications_capable(),
        fast_role_swap: raw.raw_fast_role_swap().into(),
    }
}

/// Encode a PDO into a raw word.
///
/// Voltage and current are truncated to the field granularity.
pub fn encode_pdo(pdo: &Pdo) -> u32 {
    RawPdo(0)
        .with_dual_role_power(pdo.dual_role_power)
        .with_higher_capability(pdo.higher_capability)
        .with_unconstrained_power(pdo.unconstrained_power)
        .with_usb_communications_capable(pdo.usb_comm_capable)
        .with_raw_fast_role_swap(pdo.fast_role_swap.into())
        .with_raw_voltage((pdo.voltage_mv / MILLIVOLTS_PER_STEP) & TEN_BIT_MASK)
        .with_raw_current((pdo.current_ma / MILLIAMPERES_PER_STEP) & TEN_BIT_MASK)
        .0
}
