//! Header of the last message received by the controller.
use proc_bitfield::bitfield;

bitfield! {
    /// USB PD message header.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MessageHeader(pub u16): Debug, FromStorage, IntoStorage {
        /// Extended message
        pub extended: bool @ 15,
        /// Number of data objects
        pub num_objects: u8 @ 12..=14,
        /// Message ID
        pub message_id: u8 @ 9..=11,
        /// Port power role
        pub port_power_role: bool @ 8,
        /// Specification revision
        pub spec_revision: u8 @ 6..=7,
        /// Port data role
        pub port_data_role: bool @ 5,
        /// Message type
        pub message_type: u8 @ 0..=4,
    }
}

impl MessageHeader {
    /// Data message type of source capabilities.
    pub const SOURCE_CAPABILITIES: u8 = 0x01;

    /// Whether the header announces source capabilities.
    pub fn is_source_capabilities(&self) -> bool {
        !self.extended() && self.num_objects() > 0 && self.message_type() == Self::SOURCE_CAPABILITIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_capabilities_header() {
        let header = MessageHeader(0x71A1);

        assert_eq!(header.num_objects(), 7);
        assert_eq!(header.message_type(), MessageHeader::SOURCE_CAPABILITIES);
        assert!(header.port_power_role());
        assert!(header.is_source_capabilities());
        assert!(!MessageHeader(0x0001).is_source_capabilities());
    }
}
