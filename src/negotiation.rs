//! Evaluation of the power contract that the controller negotiated.
//!
//! The controller selects a source PDO on its own and reports its choice as an RDO. The contract
//! voltage comes from the selected source PDO, the currents come from the RDO.
use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use crate::codec::{MessageHeader, OBJECT_SIZE, Pdo, Rdo, decode_pdo};
use crate::registers::MAX_RX_OBJECTS;
use crate::units::{ElectricCurrent, ElectricPotential, Power, current_from_milliamperes, potential_from_millivolts};

/// A message, as held in the receive registers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceivedMessage {
    /// Message header.
    pub header: MessageHeader,
    /// Raw data objects.
    pub objects: Vec<u32, MAX_RX_OBJECTS>,
}

impl ReceivedMessage {
    /// Build a message from its header and little-endian data objects.
    ///
    /// Trailing bytes that do not form a full object and objects beyond the maximum are ignored.
    pub fn from_bytes(header: MessageHeader, objects: &[u8]) -> Self {
        Self {
            header,
            objects: objects
                .chunks_exact(OBJECT_SIZE)
                .take(MAX_RX_OBJECTS)
                .map(LittleEndian::read_u32)
                .collect(),
        }
    }

    /// Data objects, decoded as fixed supply PDOs.
    pub fn source_pdos(&self) -> Vec<Pdo, MAX_RX_OBJECTS> {
        self.objects.iter().map(|&raw| decode_pdo(raw)).collect()
    }
}

/// The power contract in effect.
///
/// An invalid contract is always all zeroes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerContract {
    /// Whether a contract exists.
    pub valid: bool,
    /// Voltage in mV.
    pub voltage_mv: u16,
    /// Operating current in mA.
    pub current_ma: u16,
    /// Maximum operating current in mA.
    pub max_current_ma: u16,
    /// 1-based position of the source PDO.
    pub pdo_index: u8,
}

impl PowerContract {
    /// Contract voltage.
    pub fn voltage(&self) -> ElectricPotential {
        potential_from_millivolts(self.voltage_mv)
    }

    /// Operating current.
    pub fn current(&self) -> ElectricCurrent {
        current_from_milliamperes(self.current_ma)
    }

    /// Operating power.
    pub fn power(&self) -> Power {
        self.voltage() * self.current()
    }
}

/// How the contract was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The RDO selects one of the received source PDOs.
    Established,
    /// No source capabilities were received yet.
    Pending,
    /// The RDO selects no source PDO.
    Failed,
    /// The RDO selects a source PDO that was not received.
    OutOfRange {
        /// Object position reported by the RDO.
        position: u8,
        /// Number of received source PDOs.
        available: u8,
    },
}

/// Result of a contract evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Negotiation {
    /// The derived contract, only valid for [`Outcome::Established`].
    pub contract: PowerContract,
    /// How the contract was derived.
    pub outcome: Outcome,
}

impl Negotiation {
    pub(crate) fn without_contract(outcome: Outcome) -> Self {
        Self {
            contract: PowerContract::default(),
            outcome,
        }
    }
}

/// Derive the power contract from the received source PDOs and the RDO.
pub fn evaluate(source_pdos: &[Pdo], rdo: &Rdo) -> Negotiation {
    if source_pdos.is_empty() {
        debug!("No source capabilities received");
        return Negotiation::without_contract(Outcome::Pending);
    }

    if !rdo.is_contract() {
        warn!("Negotiation failed, RDO selects no source PDO");
        return Negotiation::without_contract(Outcome::Failed);
    }

    let position = rdo.object_position();
    let Some(source) = source_pdos.get(usize::from(position) - 1) else {
        let available = source_pdos.len() as u8;
        warn!(
            "RDO selects source PDO {}, but only {} were received",
            position, available
        );
        return Negotiation::without_contract(Outcome::OutOfRange { position, available });
    };

    let contract = PowerContract {
        valid: true,
        voltage_mv: source.voltage_mv,
        current_ma: rdo.operating_ma(),
        max_current_ma: rdo.max_operating_ma(),
        pdo_index: position,
    };
    info!(
        "Contract: PDO {}, {} mV, {} mA (max. {} mA)",
        position, contract.voltage_mv, contract.current_ma, contract.max_current_ma
    );

    Negotiation {
        contract,
        outcome: Outcome::Established,
    }
}
