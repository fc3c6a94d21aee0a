//! Register map and status register layouts.
//!
//! Every status register is described once by a bitfield type and its [`Register`] descriptor.
//! A [`StatusSnapshot`] decodes all of them from a single block read.
use proc_bitfield::bitfield;

/// Alert status register.
pub const ALERT_STATUS_1: u8 = 0x0B;
/// Alert mask register.
pub const ALERT_STATUS_1_MASK: u8 = 0x0C;
/// First latched status register. Reading from here clears the latched alerts.
pub const PORT_STATUS_0: u8 = 0x0D;
/// Port status.
pub const PORT_STATUS_1: u8 = 0x0E;
/// Type-C monitoring transitions.
pub const TYPEC_MONITORING_STATUS_0: u8 = 0x0F;
/// Type-C monitoring status.
pub const TYPEC_MONITORING_STATUS_1: u8 = 0x10;
/// CC line status.
pub const CC_STATUS: u8 = 0x11;
/// CC hardware fault transitions.
pub const CC_HW_FAULT_STATUS_0: u8 = 0x12;
/// CC hardware fault status.
pub const CC_HW_FAULT_STATUS_1: u8 = 0x13;
/// PD/Type-C handshake status.
pub const PD_TYPEC_STATUS: u8 = 0x14;
/// Type-C state machine status.
pub const TYPEC_STATUS: u8 = 0x15;
/// Protocol layer status.
pub const PRT_STATUS: u8 = 0x16;
/// PD command register.
pub const PD_COMMAND_CTRL: u8 = 0x1A;
/// Policy engine state.
pub const PE_FSM: u8 = 0x29;
/// Device identification.
pub const DEVICE_ID: u8 = 0x2F;
/// Header of the last received message.
pub const RX_HEADER: u8 = 0x31;
/// First data object of the last received message.
pub const RX_DATA_OBJECTS: u8 = 0x33;
/// Header of the message to transmit.
pub const TX_HEADER: u8 = 0x51;
/// FTP data buffer.
pub const RW_BUFFER: u8 = 0x53;
/// Number of valid sink PDOs.
pub const DPM_PDO_NUMB: u8 = 0x70;
/// First sink PDO register.
pub const DPM_SNK_PDO1: u8 = 0x85;
/// Request data object of the active contract.
pub const RDO_STATUS: u8 = 0x91;
/// FTP unlock key.
pub const FTP_CUST_PASSWORD: u8 = 0x95;
/// FTP control.
pub const FTP_CTRL_0: u8 = 0x96;
/// FTP opcode.
pub const FTP_CTRL_1: u8 = 0x97;

/// Expected content of [`DEVICE_ID`].
pub const DEVICE_ID_VALUE: u8 = 0x25;

/// Maximum number of data objects in a received message.
pub const MAX_RX_OBJECTS: usize = 7;

/// Number of sink PDO registers.
pub const SINK_PDO_COUNT: u8 = 3;

/// Descriptor of a single byte register.
pub trait Register: Copy + From<u8> + Into<u8> {
    /// Address of the register.
    const ADDRESS: u8;
    /// Datasheet name, used in diagnostics.
    const NAME: &'static str;
}

macro_rules! register {
    ($ty:ident, $address:expr) => {
        impl Register for $ty {
            const ADDRESS: u8 = $address;
            const NAME: &'static str = stringify!($address);
        }
    };
}

bitfield! {
    /// Alert sources. The mask register shares this layout, with set bits masking the alert.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AlertStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Port status changed
        pub port_status: bool @ 6,
        /// Type-C monitoring changed
        pub typec_monitoring: bool @ 5,
        /// CC hardware fault
        pub cc_hw_fault: bool @ 4,
        /// PD/Type-C handshake
        pub pd_typec: bool @ 3,
        /// Protocol layer status
        pub prt_status: bool @ 1,
    }
}

bitfield! {
    /// Alert mask, set bits mask the alert.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AlertMask(pub u8): Debug, FromStorage, IntoStorage {
        /// Mask port status alerts
        pub port_status: bool @ 6,
        /// Mask Type-C monitoring alerts
        pub typec_monitoring: bool @ 5,
        /// Mask CC hardware fault alerts
        pub cc_hw_fault: bool @ 4,
        /// Mask PD/Type-C handshake alerts
        pub pd_typec: bool @ 3,
        /// Mask protocol layer alerts
        pub prt_status: bool @ 1,
    }
}

impl Default for AlertMask {
    /// Unmask the alerts that the manager handles.
    fn default() -> Self {
        Self(0xFF)
            .with_port_status(false)
            .with_typec_monitoring(false)
            .with_cc_hw_fault(false)
            .with_prt_status(false)
    }
}

bitfield! {
    /// Latched port transitions.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PortStatus0(pub u8): Debug, FromStorage, IntoStorage {
        /// Attach state changed
        pub attach_transition: bool @ 0,
    }
}

/// Kind of device attached to the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachedDevice {
    /// Nothing attached.
    None,
    /// Attached as sink.
    Sink,
    /// Debug accessory.
    Debug,
    /// Reserved value.
    Unknown(u8),
}

impl From<u8> for AttachedDevice {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Sink,
            3 => Self::Debug,
            x => Self::Unknown(x),
        }
    }
}

bitfield! {
    /// Port status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PortStatus1(pub u8): Debug, FromStorage, IntoStorage {
        /// Attached device kind
        pub raw_attached_device: u8 @ 5..=7,
        /// Sinking power
        pub power_mode: bool @ 3,
        /// Data mode is UFP
        pub data_mode: bool @ 2,
        /// Device attached
        pub attached: bool @ 0,
    }
}

impl PortStatus1 {
    /// Kind of attached device.
    pub fn attached_device(&self) -> AttachedDevice {
        self.raw_attached_device().into()
    }
}

bitfield! {
    /// Latched VBUS monitoring transitions.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCMonitoringStatus0(pub u8): Debug, FromStorage, IntoStorage {
        /// VBUS above the high threshold
        pub vbus_high_status: bool @ 5,
        /// VBUS below the low threshold
        pub vbus_low_status: bool @ 4,
        /// VBUS ready changed
        pub vbus_ready_transition: bool @ 3,
        /// VBUS vSafe0V changed
        pub vbus_vsafe0v_transition: bool @ 2,
        /// VBUS valid sink changed
        pub vbus_valid_sink_transition: bool @ 1,
    }
}

bitfield! {
    /// VBUS monitoring status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCMonitoringStatus1(pub u8): Debug, FromStorage, IntoStorage {
        /// VBUS is ready
        pub vbus_ready: bool @ 3,
        /// VBUS is below vSafe0V
        pub vbus_vsafe0v: bool @ 2,
        /// VBUS is valid for the sink
        pub vbus_valid_sink: bool @ 1,
    }
}

/// State of a CC line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcState {
    /// No source pull-up detected.
    Open,
    /// Default USB power.
    SinkDefault,
    /// 1.5 A Type-C current.
    SinkPower1A5,
    /// 3.0 A Type-C current.
    SinkPower3A0,
}

impl From<u8> for CcState {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Open,
            1 => Self::SinkDefault,
            2 => Self::SinkPower1A5,
            _ => Self::SinkPower3A0,
        }
    }
}

bitfield! {
    /// CC line status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CcStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Looking for a connection
        pub looking_for_connection: bool @ 5,
        /// Presenting Rd
        pub connect_result: bool @ 4,
        /// CC2 state
        pub raw_cc2_state: u8 @ 2..=3,
        /// CC1 state
        pub raw_cc1_state: u8 @ 0..=1,
    }
}

impl CcStatus {
    /// State of CC1.
    pub fn cc1_state(&self) -> CcState {
        self.raw_cc1_state().into()
    }

    /// State of CC2.
    pub fn cc2_state(&self) -> CcState {
        self.raw_cc2_state().into()
    }
}

bitfield! {
    /// Latched CC hardware fault transitions.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CcHwFaultStatus0(pub u8): Debug, FromStorage, IntoStorage {
        /// Over-voltage fault changed
        pub vpu_ovp_fault_transition: bool @ 5,
        /// Pull-up valid changed
        pub vpu_valid_transition: bool @ 4,
    }
}

bitfield! {
    /// CC hardware fault status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CcHwFaultStatus1(pub u8): Debug, FromStorage, IntoStorage {
        /// Over-voltage fault on the CC pins
        pub vpu_ovp_fault: bool @ 7,
        /// CC pull-up is valid
        pub vpu_valid: bool @ 6,
        /// VBUS discharge fault
        pub vbus_discharge_fault: bool @ 4,
    }
}

/// PD/Type-C handshake state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandCheck {
    /// Nothing pending.
    Cleared,
    /// Hard reset completed.
    HardResetComplete,
    /// Hard reset received.
    HardResetReceived,
    /// Hard reset sent.
    HardResetSent,
    /// Other value.
    Unknown(u8),
}

impl From<u8> for HandCheck {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Cleared,
            0x8 => Self::HardResetComplete,
            0xE => Self::HardResetReceived,
            0xF => Self::HardResetSent,
            x => Self::Unknown(x),
        }
    }
}

bitfield! {
    /// PD/Type-C handshake status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PdTypeCStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Handshake state
        pub raw_hand_check: u8 @ 0..=3,
    }
}

impl PdTypeCStatus {
    /// Handshake state.
    pub fn hand_check(&self) -> HandCheck {
        self.raw_hand_check().into()
    }
}

/// Type-C connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TypeCState {
    /// No connection, looking for a source.
    UnattachedSink,
    /// Source detected, debouncing.
    AttachWaitSink,
    /// Attached to a source.
    AttachedSink,
    /// Attached to a debug accessory.
    DebugAccessorySink,
    /// Trying the source role.
    TrySource,
    /// No accessory attached.
    UnattachedAccessory,
    /// Accessory detected, debouncing.
    AttachWaitAccessory,
    /// Recovering from an error.
    ErrorRecovery,
    /// Other value.
    Unknown(u8),
}

impl From<u8> for TypeCState {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            0x00 => Self::UnattachedSink,
            0x01 => Self::AttachWaitSink,
            0x02 => Self::AttachedSink,
            0x03 => Self::DebugAccessorySink,
            0x0C => Self::TrySource,
            0x0D => Self::UnattachedAccessory,
            0x0E => Self::AttachWaitAccessory,
            0x13 => Self::ErrorRecovery,
            x => Self::Unknown(x),
        }
    }
}

bitfield! {
    /// Type-C status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Connection is on CC2
        pub cc_reverse: bool @ 7,
        /// Type-C state machine
        pub raw_typec_fsm_state: u8 @ 0..=4,
    }
}

impl TypeCStatus {
    /// State of the Type-C state machine.
    pub fn typec_fsm_state(&self) -> TypeCState {
        self.raw_typec_fsm_state().into()
    }
}

bitfield! {
    /// Protocol layer status.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PrtStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// BIST message received
        pub bist_received: bool @ 4,
        /// Message received
        pub msg_received: bool @ 2,
        /// Hard reset received
        pub hw_reset_received: bool @ 0,
    }
}

register!(AlertStatus, ALERT_STATUS_1);
register!(AlertMask, ALERT_STATUS_1_MASK);
register!(PortStatus0, PORT_STATUS_0);
register!(PortStatus1, PORT_STATUS_1);
register!(TypeCMonitoringStatus0, TYPEC_MONITORING_STATUS_0);
register!(TypeCMonitoringStatus1, TYPEC_MONITORING_STATUS_1);
register!(CcStatus, CC_STATUS);
register!(CcHwFaultStatus0, CC_HW_FAULT_STATUS_0);
register!(CcHwFaultStatus1, CC_HW_FAULT_STATUS_1);
register!(PdTypeCStatus, PD_TYPEC_STATUS);
register!(TypeCStatus, TYPEC_STATUS);
register!(PrtStatus, PRT_STATUS);

/// Policy engine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PolicyEngineState {
    /// Initialization after reset.
    Init,
    /// Soft reset received.
    SoftReset,
    /// Hard reset in progress.
    HardReset,
    /// Sending a soft reset.
    SendSoftReset,
    /// BIST carrier mode.
    BistCarrierMode,
    /// Sink startup.
    SinkStartup,
    /// Waiting for VBUS.
    SinkDiscovery,
    /// Waiting for source capabilities.
    SinkWaitForCapabilities,
    /// Evaluating received source capabilities.
    SinkEvaluateCapability,
    /// Request sent, waiting for the source to accept it.
    SinkSelectCapability,
    /// Waiting for the source to switch power.
    SinkTransitionSink,
    /// Explicit contract in place.
    SinkReady,
    /// Sending a message with a contract in place.
    SinkReadySending,
    /// Hard reset, removing power.
    HardResetShutdown,
    /// Hard reset, waiting for power.
    HardResetRecovery,
    /// Error recovery.
    ErrorRecovery,
    /// Other value.
    Unknown(u8),
}

impl From<u8> for PolicyEngineState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Init,
            0x01 => Self::SoftReset,
            0x02 => Self::HardReset,
            0x03 => Self::SendSoftReset,
            0x04 => Self::BistCarrierMode,
            0x12 => Self::SinkStartup,
            0x13 => Self::SinkDiscovery,
            0x14 => Self::SinkWaitForCapabilities,
            0x15 => Self::SinkEvaluateCapability,
            0x16 => Self::SinkSelectCapability,
            0x17 => Self::SinkTransitionSink,
            0x18 => Self::SinkReady,
            0x19 => Self::SinkReadySending,
            0x3A => Self::HardResetShutdown,
            0x3B => Self::HardResetRecovery,
            0x40 => Self::ErrorRecovery,
            x => Self::Unknown(x),
        }
    }
}

/// First register of the status block.
pub const STATUS_BLOCK_START: u8 = ALERT_STATUS_1;

/// Length of the status block, up to and including [`PRT_STATUS`].
pub const STATUS_BLOCK_LEN: usize = (PRT_STATUS - STATUS_BLOCK_START) as usize + 1;

/// All status registers, decoded from one block read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    /// Alert status.
    pub alert: AlertStatus,
    /// Alert mask.
    pub alert_mask: AlertMask,
    /// Latched port transitions.
    pub port_status_0: PortStatus0,
    /// Port status.
    pub port_status_1: PortStatus1,
    /// Latched VBUS monitoring transitions.
    pub typec_monitoring_0: TypeCMonitoringStatus0,
    /// VBUS monitoring status.
    pub typec_monitoring_1: TypeCMonitoringStatus1,
    /// CC line status.
    pub cc_status: CcStatus,
    /// Latched CC hardware fault transitions.
    pub cc_hw_fault_0: CcHwFaultStatus0,
    /// CC hardware fault status.
    pub cc_hw_fault_1: CcHwFaultStatus1,
    /// PD/Type-C handshake status.
    pub pd_typec_status: PdTypeCStatus,
    /// Type-C status.
    pub typec_status: TypeCStatus,
    /// Protocol layer status.
    pub prt_status: PrtStatus,
}

impl StatusSnapshot {
    /// Decode a block, read from [`STATUS_BLOCK_START`].
    pub fn from_block(block: &[u8; STATUS_BLOCK_LEN]) -> Self {
        Self {
            alert: field(block),
            alert_mask: field(block),
            port_status_0: field(block),
            port_status_1: field(block),
            typec_monitoring_0: field(block),
            typec_monitoring_1: field(block),
            cc_status: field(block),
            cc_hw_fault_0: field(block),
            cc_hw_fault_1: field(block),
            pd_typec_status: field(block),
            typec_status: field(block),
            prt_status: field(block),
        }
    }

    /// Alerts that are set and not masked.
    pub fn pending_alerts(&self) -> AlertStatus {
        AlertStatus(self.alert.0 & !self.alert_mask.0)
    }
}

fn field<R: Register>(block: &[u8; STATUS_BLOCK_LEN]) -> R {
    R::from(block[(R::ADDRESS - STATUS_BLOCK_START) as usize])
}
