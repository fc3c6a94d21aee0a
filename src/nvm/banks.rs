//! Bit layout of the configuration banks.
//!
//! Each sector is handled by one [`BankCodec`]. Packing only touches the bits that belong to a
//! field, all other bits of the sector are preserved.
use super::{NVM_SECTORS, Sector};
use crate::codec::current::{code_from_current, current_from_code, is_table_current};
use crate::codec::{MILLIAMPERES_PER_STEP, MILLIVOLTS_PER_STEP, TEN_BIT_MASK};
use crate::config::{PDO1_VOLTAGE_MV, SinkConfig, SinkPdo};

/// Pack and unpack functions of one sector.
pub struct BankCodec {
    /// Copy the fields of this bank from a sector into a configuration.
    pub unpack: fn(&Sector, &mut SinkConfig),
    /// Copy the fields of this bank from a configuration into a sector.
    pub pack: fn(&SinkConfig, &mut Sector),
}

/// Calibration banks, which carry no configuration.
const RESERVED: BankCodec = BankCodec {
    unpack: |_, _| {},
    pack: |_, _| {},
};

const BANK1: BankCodec = BankCodec {
    unpack: unpack_bank1,
    pack: pack_bank1,
};

const BANK3: BankCodec = BankCodec {
    unpack: unpack_bank3,
    pack: pack_bank3,
};

const BANK4: BankCodec = BankCodec {
    unpack: unpack_bank4,
    pack: pack_bank4,
};

/// Codecs, indexed by sector.
pub const BANKS: [BankCodec; NVM_SECTORS] = [RESERVED, BANK1, RESERVED, BANK3, BANK4];

const GPIO_CFG_SHIFT: u8 = 4;
const GPIO_CFG_MASK: u8 = 0b11 << GPIO_CFG_SHIFT;

const POWER_OK_SHIFT: u8 = 5;
const POWER_OK_MASK: u8 = 0b11 << POWER_OK_SHIFT;
const FLEX_CURRENT_HIGH_MASK: u8 = 0x0F;
const POWER_ONLY_ABOVE_5V: u8 = 1 << 3;
const REQ_SRC_CURRENT: u8 = 1 << 4;

fn low_nibble(byte: u8) -> u8 {
    byte & 0x0F
}

fn high_nibble(byte: u8) -> u8 {
    byte >> 4
}

fn nibbles(low: u8, high: u8) -> u8 {
    (low & 0x0F) | (high << 4)
}

fn set_flag(byte: u8, mask: u8, value: bool) -> u8 {
    if value { byte | mask } else { byte & !mask }
}

/// 4-bit table code of a PDO current.
fn table_code(index: usize, pdo: &SinkPdo) -> u8 {
    if !is_table_current(pdo.current_ma) {
        warn!(
            "PDO{} current {} mA is not in the current table, the flex current applies instead",
            index + 1,
            pdo.current_ma
        );
    }

    code_from_current(pdo.current_ma)
}

/// 10-bit, 50 mV voltage field.
fn voltage_field(voltage_mv: u16) -> u16 {
    (voltage_mv / MILLIVOLTS_PER_STEP) & TEN_BIT_MASK
}

// Bank 1
//
// byte 0, bits 4..=5: GPIO function
// byte 2, bits 0..=3: discharge time to PDO
// byte 2, bits 4..=7: discharge time to 0 V

fn unpack_bank1(sector: &Sector, config: &mut SinkConfig) {
    config.gpio_function = ((sector[0] & GPIO_CFG_MASK) >> GPIO_CFG_SHIFT).into();
    config.discharge.time_to_pdo = low_nibble(sector[2]);
    config.discharge.time_to_0v = high_nibble(sector[2]);
}

fn pack_bank1(config: &SinkConfig, sector: &mut Sector) {
    sector[0] = (sector[0] & !GPIO_CFG_MASK) | (u8::from(config.gpio_function) << GPIO_CFG_SHIFT);
    sector[2] = nibbles(config.discharge.time_to_pdo, config.discharge.time_to_0v);
}

// Bank 3
//
// byte 2: bit 0 USB communications capable, bits 1..=2 PDO count, bit 3 unconstrained power,
//         bits 4..=7 PDO1 current code
// byte 3: PDO1 lower / upper VBUS threshold
// byte 4: PDO2 current code / lower threshold
// byte 5: PDO2 upper threshold / PDO3 current code
// byte 6: PDO3 lower / upper threshold

fn unpack_bank3(sector: &Sector, config: &mut SinkConfig) {
    let power = &mut config.power;
    let flags = sector[2];

    power.usb_comm_capable = flags & 0x01 != 0;
    power.pdo_number = (flags >> 1) & 0b11;
    power.unconstrained_power = flags & 0x08 != 0;

    let [pdo1, pdo2, pdo3] = &mut power.pdos;

    pdo1.current_ma = current_from_code(high_nibble(flags));
    pdo1.monitor.lower_pct = low_nibble(sector[3]);
    pdo1.monitor.upper_pct = high_nibble(sector[3]);

    pdo2.current_ma = current_from_code(low_nibble(sector[4]));
    pdo2.monitor.lower_pct = high_nibble(sector[4]);
    pdo2.monitor.upper_pct = low_nibble(sector[5]);

    pdo3.current_ma = current_from_code(high_nibble(sector[5]));
    pdo3.monitor.lower_pct = low_nibble(sector[6]);
    pdo3.monitor.upper_pct = high_nibble(sector[6]);

    let pdo_number = power.pdo_number as usize;
    for (index, pdo) in power.pdos.iter_mut().enumerate() {
        pdo.defined = index < pdo_number;
    }
}

fn pack_bank3(config: &SinkConfig, sector: &mut Sector) {
    let power = &config.power;
    let [pdo1, pdo2, pdo3] = &power.pdos;

    let mut flags = (power.pdo_number & 0b11) << 1;
    flags = set_flag(flags, 0x01, power.usb_comm_capable);
    flags = set_flag(flags, 0x08, power.unconstrained_power);

    sector[2] = nibbles(flags, table_code(0, pdo1));
    sector[3] = nibbles(pdo1.monitor.lower_pct, pdo1.monitor.upper_pct);
    sector[4] = nibbles(table_code(1, pdo2), pdo2.monitor.lower_pct);
    sector[5] = nibbles(pdo2.monitor.upper_pct, table_code(2, pdo3));
    sector[6] = nibbles(pdo3.monitor.lower_pct, pdo3.monitor.upper_pct);
}

// Bank 4
//
// PDO2 voltage: byte 0 bits 6..=7 (low), byte 1 (high)
// PDO3 voltage: byte 2 (low), byte 3 bits 0..=1 (high)
// Flex current: byte 3 bits 2..=7 (low), byte 4 bits 0..=3 (high)
// byte 4, bits 5..=6: POWER_OK configuration
// byte 6, bit 3: power only above 5 V, bit 4: request source current

fn unpack_bank4(sector: &Sector, config: &mut SinkConfig) {
    let pdo2_voltage = u16::from(sector[0] >> 6) | (u16::from(sector[1]) << 2);
    let pdo3_voltage = u16::from(sector[2]) | (u16::from(sector[3] & 0x03) << 8);
    let flex_current = u16::from(sector[3] >> 2) | (u16::from(sector[4] & FLEX_CURRENT_HIGH_MASK) << 6);

    let power = &mut config.power;
    power.pdos[0].voltage_mv = PDO1_VOLTAGE_MV;
    power.pdos[1].voltage_mv = pdo2_voltage * MILLIVOLTS_PER_STEP;
    power.pdos[2].voltage_mv = pdo3_voltage * MILLIVOLTS_PER_STEP;
    power.flex_current_ma = flex_current * MILLIAMPERES_PER_STEP;

    config.power_ok = ((sector[4] & POWER_OK_MASK) >> POWER_OK_SHIFT).into();
    config.power_only_above_5v = sector[6] & POWER_ONLY_ABOVE_5V != 0;
    config.req_src_current = sector[6] & REQ_SRC_CURRENT != 0;
}

fn pack_bank4(config: &SinkConfig, sector: &mut Sector) {
    let power = &config.power;
    let pdo2_voltage = voltage_field(power.pdos[1].voltage_mv);
    let pdo3_voltage = voltage_field(power.pdos[2].voltage_mv);
    let flex_current = (power.flex_current_ma / MILLIAMPERES_PER_STEP) & TEN_BIT_MASK;

    sector[0] = (sector[0] & 0x3F) | (((pdo2_voltage & 0x03) as u8) << 6);
    sector[1] = (pdo2_voltage >> 2) as u8;
    sector[2] = (pdo3_voltage & 0xFF) as u8;
    sector[3] = ((pdo3_voltage >> 8) as u8 & 0x03) | (((flex_current & 0x3F) as u8) << 2);
    sector[4] = (sector[4] & !(FLEX_CURRENT_HIGH_MASK | POWER_OK_MASK))
        | ((flex_current >> 6) as u8 & FLEX_CURRENT_HIGH_MASK)
        | (u8::from(config.power_ok) << POWER_OK_SHIFT);

    let mut options = sector[6];
    options = set_flag(options, POWER_ONLY_ABOVE_5V, config.power_only_above_5v);
    options = set_flag(options, REQ_SRC_CURRENT, config.req_src_current);
    sector[6] = options;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GpioFunction, PowerOk};
    use crate::nvm::{DEFAULT_IMAGE, NVM_SIZE, NvmImage};

    /// Bits that carry configuration, per byte.
    const FIELD_MASK: [u8; NVM_SIZE] = [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // bank 0
        0x30, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, // bank 1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // bank 2
        0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, // bank 3
        0xC0, 0xFF, 0xFF, 0xFF, 0x6F, 0x00, 0x18, 0x00, // bank 4
    ];

    fn pseudo_random_image(seed: u32) -> NvmImage {
        let mut state = seed;
        let mut bytes = [0u8; NVM_SIZE];
        for byte in bytes.iter_mut() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            *byte = (state >> 16) as u8;
        }
        NvmImage::from_bytes(&bytes)
    }

    #[test]
    fn test_decode_default_banks() {
        let config = DEFAULT_IMAGE.decode();

        assert_eq!(config.gpio_function, GpioFunction::ErrorRecovery);
        assert_eq!(config.discharge.time_to_0v, 9);
        assert_eq!(config.discharge.time_to_pdo, 12);
        assert_eq!(config.power.pdo_number, 3);
        assert_eq!(config.power.pdos[0].current_ma, 1500);
        assert_eq!(config.power.pdos[1].voltage_mv, 15000);
        assert_eq!(config.power.pdos[2].voltage_mv, 20000);
        assert_eq!(config.power.pdos[2].current_ma, 1000);
        assert_eq!(config.power.flex_current_ma, 2000);
        assert_eq!(config.power_ok, PowerOk::Config2);
        assert!(!config.req_src_current);
    }

    #[test]
    fn test_meaningful_bits_survive_round_trip() {
        for seed in 0..64 {
            let image = pseudo_random_image(seed);
            let encoded = NvmImage::encode(&image.decode());

            for (offset, ((&original, &encoded), &mask)) in image
                .as_bytes()
                .iter()
                .zip(encoded.as_bytes())
                .zip(FIELD_MASK.iter())
                .enumerate()
            {
                assert_eq!(original & mask, encoded & mask, "field bits differ at offset {offset}");
                assert_eq!(
                    DEFAULT_IMAGE.as_bytes()[offset] & !mask,
                    encoded & !mask,
                    "template bits differ at offset {offset}"
                );
            }
        }
    }

    #[test]
    fn test_split_fields_over_full_range() {
        let mut config = crate::SinkConfig::default();

        for raw in 0..=TEN_BIT_MASK {
            config.power.pdos[1].voltage_mv = raw * MILLIVOLTS_PER_STEP;
            config.power.pdos[2].voltage_mv = (TEN_BIT_MASK - raw) * MILLIVOLTS_PER_STEP;
            config.power.flex_current_ma = raw * MILLIAMPERES_PER_STEP;

            let decoded = NvmImage::encode(&config).decode();
            assert_eq!(decoded.power.pdos[1].voltage_mv, config.power.pdos[1].voltage_mv);
            assert_eq!(decoded.power.pdos[2].voltage_mv, config.power.pdos[2].voltage_mv);
            assert_eq!(decoded.power.flex_current_ma, config.power.flex_current_ma);
        }
    }

    #[test]
    fn test_nibble_fields_over_full_range() {
        let mut config = crate::SinkConfig::default();

        for value in 0..=0x0F {
            for pdo in config.power.pdos.iter_mut() {
                pdo.current_ma = current_from_code(value);
                pdo.monitor.lower_pct = value;
                pdo.monitor.upper_pct = 0x0F - value;
            }
            config.discharge.time_to_0v = value;
            config.discharge.time_to_pdo = 0x0F - value;
            config.gpio_function = value.into();
            config.power_ok = value.into();
            config.req_src_current = value & 1 != 0;
            config.power_only_above_5v = value & 2 != 0;
            config.power.usb_comm_capable = value & 4 != 0;
            config.power.unconstrained_power = value & 8 != 0;

            assert_eq!(NvmImage::encode(&config).decode(), config);
        }
    }

    #[test]
    fn test_lossy_current_stores_flex_code() {
        let mut config = crate::SinkConfig::default();
        config.power.pdos[1].current_ma = 600;

        let image = NvmImage::encode(&config);
        assert_eq!(low_nibble(image.sectors()[3][4]), 0);
        assert_eq!(image.decode().power.pdos[1].current_ma, 0);
    }
}
