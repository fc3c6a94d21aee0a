//! Sink configuration, as persisted in the NVM.
//!
//! The [`Default`] configuration is the controller's factory configuration.
use crate::ArgumentError;
use crate::codec::{FastRoleSwap, Pdo, current::is_table_current};
use crate::registers::{AlertMask, SINK_PDO_COUNT};

/// Voltage of the first PDO, which is fixed by USB PD.
pub const PDO1_VOLTAGE_MV: u16 = 5000;

/// Highest sink PDO voltage.
pub const MAX_VOLTAGE_MV: u16 = 20000;

/// Highest sink PDO current.
pub const MAX_CURRENT_MA: u16 = 5000;

/// Highest value of 4-bit threshold and timing fields.
const MAX_NIBBLE: u8 = 0x0F;

/// VBUS monitoring window around a PDO voltage, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VbusMonitor {
    /// Under-voltage threshold, 0 to 15 %.
    pub lower_pct: u8,
    /// Over-voltage threshold, 0 to 15 %.
    pub upper_pct: u8,
}

impl Default for VbusMonitor {
    fn default() -> Self {
        Self {
            lower_pct: 15,
            upper_pct: 5,
        }
    }
}

/// One entry of the sink power profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SinkPdo {
    /// Voltage in mV.
    pub voltage_mv: u16,
    /// Current in mA, 0 selects the flex current.
    pub current_ma: u16,
    /// VBUS monitoring window.
    pub monitor: VbusMonitor,
    /// Whether the PDO is advertised.
    pub defined: bool,
}

impl SinkPdo {
    /// A defined PDO with the default monitoring window.
    pub const fn new(voltage_mv: u16, current_ma: u16) -> Self {
        Self {
            voltage_mv,
            current_ma,
            monitor: VbusMonitor {
                lower_pct: 15,
                upper_pct: 5,
            },
            defined: true,
        }
    }
}

/// The sink power profile, up to three PDOs in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerProfile {
    /// PDO1 to PDO3.
    pub pdos: [SinkPdo; SINK_PDO_COUNT as usize],
    /// Number of advertised PDOs.
    pub pdo_number: u8,
    /// Current in mA for PDOs without a table current.
    pub flex_current_ma: u16,
    /// USB communications capable.
    pub usb_comm_capable: bool,
    /// Unconstrained power.
    pub unconstrained_power: bool,
    /// Dual-role power, only reflected in the runtime PDO registers.
    pub dual_role_power: bool,
    /// Higher capability, only reflected in the runtime PDO registers.
    pub higher_capability: bool,
    /// Fast role swap support, only reflected in the runtime PDO registers.
    pub fast_role_swap: FastRoleSwap,
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self {
            pdos: [
                SinkPdo {
                    monitor: VbusMonitor {
                        lower_pct: 15,
                        upper_pct: 10,
                    },
                    ..SinkPdo::new(PDO1_VOLTAGE_MV, 1500)
                },
                SinkPdo::new(15000, 1500),
                SinkPdo::new(20000, 1000),
            ],
            pdo_number: 3,
            flex_current_ma: 2000,
            usb_comm_capable: false,
            unconstrained_power: false,
            dual_role_power: false,
            higher_capability: false,
            fast_role_swap: FastRoleSwap::NotSupported,
        }
    }
}

impl PowerProfile {
    /// The PDO at a 1-based `index`, as written to the sink PDO registers.
    ///
    /// A current of 0 mA is replaced by the flex current.
    pub fn pdo(&self, index: u8) -> Option<Pdo> {
        let entry = self.pdos.get(usize::from(index).checked_sub(1)?)?;
        let current_ma = match entry.current_ma {
            0 => self.flex_current_ma,
            x => x,
        };

        Some(Pdo {
            voltage_mv: entry.voltage_mv,
            current_ma,
            dual_role_power: self.dual_role_power,
            higher_capability: self.higher_capability,
            unconstrained_power: self.unconstrained_power,
            usb_comm_capable: self.usb_comm_capable,
            fast_role_swap: self.fast_role_swap,
        })
    }

    /// Iterate the advertised PDOs.
    pub fn defined(&self) -> impl Iterator<Item = &SinkPdo> {
        self.pdos.iter().filter(|pdo| pdo.defined)
    }

    /// Whether any PDO current would be replaced by the flex current when stored in the NVM.
    pub fn has_lossy_current(&self) -> bool {
        self.pdos.iter().any(|pdo| !is_table_current(pdo.current_ma))
    }

    fn validate(&self) -> Result<(), ArgumentError> {
        if !(1..=SINK_PDO_COUNT).contains(&self.pdo_number) {
            return Err(ArgumentError::PdoCount);
        }

        let contiguous = self
            .pdos
            .iter()
            .enumerate()
            .all(|(index, pdo)| pdo.defined == (index < self.pdo_number as usize));
        if !contiguous {
            return Err(ArgumentError::DefinedPdos);
        }

        if self.pdos[0].voltage_mv != PDO1_VOLTAGE_MV {
            return Err(ArgumentError::FirstPdoVoltage);
        }

        for pdo in &self.pdos {
            if pdo.voltage_mv > MAX_VOLTAGE_MV {
                return Err(ArgumentError::Voltage);
            }
            if pdo.current_ma > MAX_CURRENT_MA {
                return Err(ArgumentError::Current);
            }
            if pdo.monitor.lower_pct > MAX_NIBBLE || pdo.monitor.upper_pct > MAX_NIBBLE {
                return Err(ArgumentError::FieldRange);
            }
        }

        if self.flex_current_ma > MAX_CURRENT_MA {
            return Err(ArgumentError::Current);
        }

        Ok(())
    }
}

/// VBUS discharge timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Discharge {
    /// Time to discharge to 0 V, in 84 ms units.
    pub time_to_0v: u8,
    /// Time to discharge to a lower PDO, in 24 ms units.
    pub time_to_pdo: u8,
}

impl Default for Discharge {
    fn default() -> Self {
        Self {
            time_to_0v: 9,
            time_to_pdo: 12,
        }
    }
}

impl Discharge {
    /// Time to discharge to 0 V, in ms.
    pub fn time_to_0v_ms(&self) -> u16 {
        u16::from(self.time_to_0v) * 84
    }

    /// Time to discharge to a lower PDO, in ms.
    pub fn time_to_pdo_ms(&self) -> u16 {
        u16::from(self.time_to_pdo) * 24
    }
}

/// Function of the GPIO pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpioFunction {
    /// Software controlled output.
    SoftwareControl,
    /// Hardware fault indication.
    #[default]
    ErrorRecovery,
    /// Debug accessory indication.
    Debug,
    /// Sink power indication.
    SinkPower,
}

impl From<u8> for GpioFunction {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::SoftwareControl,
            1 => Self::ErrorRecovery,
            2 => Self::Debug,
            _ => Self::SinkPower,
        }
    }
}

impl From<GpioFunction> for u8 {
    fn from(value: GpioFunction) -> Self {
        value as u8
    }
}

/// Behavior of the POWER_OK pins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerOk {
    /// VBUS_EN_SNK on VBUS presence, POWER_OK2/3 flag the PDO in use.
    Config1,
    /// Reserved.
    NotApplicable,
    /// VBUS_EN_SNK on VBUS presence, POWER_OK2 flags PDO2, POWER_OK3 flags PDO3.
    #[default]
    Config2,
    /// POWER_OK2/3 signal the Type-C current of the source.
    Config3,
}

impl From<u8> for PowerOk {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Config1,
            1 => Self::NotApplicable,
            2 => Self::Config2,
            _ => Self::Config3,
        }
    }
}

impl From<PowerOk> for u8 {
    fn from(value: PowerOk) -> Self {
        value as u8
    }
}

/// Complete sink configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SinkConfig {
    /// Power profile.
    pub power: PowerProfile,
    /// VBUS discharge timings.
    pub discharge: Discharge,
    /// GPIO pin function.
    pub gpio_function: GpioFunction,
    /// POWER_OK pin behavior.
    pub power_ok: PowerOk,
    /// Request the maximum source current instead of the PDO current.
    pub req_src_current: bool,
    /// Only enable VBUS output above 5 V.
    pub power_only_above_5v: bool,
    /// Alert mask, applied at runtime only.
    pub alert_mask: AlertMask,
}

impl SinkConfig {
    /// Check the configuration for values that the controller cannot hold.
    pub fn validate(&self) -> Result<(), ArgumentError> {
        self.power.validate()?;

        if self.discharge.time_to_0v > MAX_NIBBLE || self.discharge.time_to_pdo > MAX_NIBBLE {
            return Err(ArgumentError::FieldRange);
        }

        Ok(())
    }
}
