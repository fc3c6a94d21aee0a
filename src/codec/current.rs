//! Current lookup table, used by the 4-bit PDO current fields of the NVM.

/// Currents in mA, indexed by their 4-bit code.
pub const CURRENT_TABLE: [u16; 16] = [
    0, 500, 750, 1000, 1250, 1500, 1750, 2000, 2250, 2500, 2750, 3000, 3500, 4000, 4500, 5000,
];

/// Look up the current in mA for a 4-bit code.
///
/// Only the low nibble of `code` is used.
pub fn current_from_code(code: u8) -> u16 {
    CURRENT_TABLE[(code & 0x0F) as usize]
}

/// Find the code for a current in mA.
///
/// This is lossy: currents that are not in the table map to code 0, which selects the
/// flex current instead.
pub fn code_from_current(current_ma: u16) -> u8 {
    CURRENT_TABLE
        .iter()
        .position(|&entry| entry == current_ma)
        .map_or(0, |code| code as u8)
}

/// Whether a current is exactly representable by the table.
pub fn is_table_current(current_ma: u16) -> bool {
    CURRENT_TABLE.contains(&current_ma)
}
