//! CRC-16 used by the actuator firmware.
//!
//! Named X25 by the firmware authors, but computed MSB-first with no
//! reflection and no final XOR (init `0xFFFF`, poly `0x1021`). The receiver
//! checks exactly this register walk, so it must not be swapped for a
//! table-driven or reflected variant.

pub const CRC_INIT: u16 = 0xFFFF;
pub const CRC_POLY: u16 = 0x1021;

pub fn crc16_x25(bytes: &[u8]) -> u16 {
    let mut crc: u16 = CRC_INIT;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if (crc & 0x8000) != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}
