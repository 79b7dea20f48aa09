//! CRC16 checksum
//!
//! CRC-16/ARC with the reflected polynomial 0xA001, driven by a 256-entry
//! lookup table. The table is a compile-time constant so there is no
//! process-start initialization to coordinate.

/// Width of an encoded checksum
pub const CHECKSUM_LEN: usize = 2;

/// Reflected CRC-16 polynomial
const POLYNOMIAL: u16 = 0xA001;

/// Precomputed lookup table, one entry per input byte value
static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut value: u16 = 0;
        let mut temp = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (value ^ temp) & 0x0001 != 0 {
                value = (value >> 1) ^ POLYNOMIAL;
            } else {
                value >>= 1;
            }
            temp >>= 1;
            bit += 1;
        }
        table[i] = value;
        i += 1;
    }
    table
}

/// Compute the CRC16 of a byte buffer
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in bytes {
        let index = ((crc ^ byte as u16) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    crc
}

/// Compute the CRC16 of a byte buffer, encoded as 2 little-endian bytes
pub fn crc16_bytes(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    crc16(bytes).to_le_bytes()
}
