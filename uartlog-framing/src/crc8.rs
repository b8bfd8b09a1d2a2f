//! CRC8 calculation for checked frames

use uartlog_core::{UartLogError, UartLogResult};

/// CRC8 calculation constants
const INITIAL_CRC: u8 = 0x00;
const POLYNOMIAL: u8 = 0x07; // x^8 + x^2 + x + 1, MSB first

/// Precomputed CRC table
static CRC_TABLE: once_cell::sync::Lazy<[u8; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u8; 256];
    for b in 0..=0xFFusize {
        let mut v = b as u8;
        for _ in 0..8 {
            if (v & 0x80) != 0 {
                v = (v << 1) ^ POLYNOMIAL;
            } else {
                v <<= 1;
            }
        }
        table[b] = v;
    }
    table
});

/// CRC8 calculator (polynomial 0x07, initial value 0x00, no reflection)
#[derive(Debug, Clone)]
pub struct Crc8 {
    crc_value: u8,
}

impl Crc8 {
    /// Create a new CRC calculator
    pub fn new() -> Self {
        Self {
            crc_value: INITIAL_CRC,
        }
    }

    /// Reset the CRC value to initial state
    pub fn reset(&mut self) {
        self.crc_value = INITIAL_CRC;
    }

    /// Update the CRC value with a single byte
    pub fn update(&mut self, data: u8) {
        self.crc_value = CRC_TABLE[(self.crc_value ^ data) as usize];
    }

    /// Update the CRC value with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.crc_value
    }

    /// Compare the current CRC value against an expected one
    pub fn validate(&self, expected: u8) -> UartLogResult<()> {
        if self.crc_value != expected {
            Err(UartLogError::InvalidData(format!(
                "CRC8 has wrong value: 0x{:02X}, expected 0x{:02X}",
                self.crc_value, expected
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for Crc8 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the CRC8 of a byte slice in one go
pub fn crc8(data: &[u8]) -> u8 {
    let mut calc = Crc8::new();
    calc.update_bytes(data);
    calc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_check_value() {
        // Standard check value for CRC-8 (poly 0x07, init 0x00)
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_crc8_empty_is_initial() {
        assert_eq!(crc8(&[]), INITIAL_CRC);
    }

    #[test]
    fn test_crc8_table_matches_bitwise() {
        fn bitwise(data: &[u8]) -> u8 {
            let mut crc = 0u8;
            for &byte in data {
                crc ^= byte;
                for _ in 0..8 {
                    crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
                }
            }
            crc
        }
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(crc8(&data), bitwise(&data));
    }

    #[test]
    fn test_crc8_reset_and_validate() {
        let mut calc = Crc8::new();
        calc.update_bytes(&[0x01, 0x02]);
        assert!(calc.validate(crc8(&[0x01, 0x02])).is_ok());
        assert!(calc.validate(calc.value() ^ 0x01).is_err());
        calc.reset();
        assert_eq!(calc.value(), INITIAL_CRC);
    }
}
