//! Intel HEX image parser (INHX8M / INHX32)
//!
//! MPASM and XC8 emit byte addresses with 14-bit words stored little-endian,
//! so word address = byte address / 2. The word address space splits into:
//!
//!   0x0000 - 0x1FFF : program memory
//!   0x2000 - 0x200F : ID locations, device ID, configuration words
//!   0x2100 - 0x21FF : data EEPROM, one byte per word (low byte)
//!
//! Record types 00 (data), 01 (EOF), 02 (extended segment) and 04
//! (extended linear) are understood; 03 and 05 are accepted and ignored.

use std::collections::BTreeMap;

/// Start of the configuration space (word address)
pub const CONFIG_BASE: u16 = 0x2000;
/// Start of the data EEPROM window (word address)
pub const EEPROM_BASE: u16 = 0x2100;
/// End of the data EEPROM window (exclusive)
pub const EEPROM_END: u16 = 0x2200;

/// Errors that can occur during parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("line {0}: record does not start with ':'")]
    MissingColon(usize),
    #[error("line {0}: invalid hex digit")]
    BadDigit(usize),
    #[error("line {0}: record shorter than its length field")]
    Truncated(usize),
    #[error("line {line}: bad checksum: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadChecksum { line: usize, expected: u8, actual: u8 },
    #[error("line {line}: unsupported record type {kind:02X}")]
    UnsupportedRecord { line: usize, kind: u8 },
    #[error("no end-of-file record")]
    MissingEof,
}

/// Parsed contents of a HEX file, keyed by word address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexImage {
    words: BTreeMap<u32, u16>,
}

impl HexImage {
    /// Parse the text of a HEX file
    pub fn parse(text: &str) -> Result<Self, HexError> {
        let mut image = HexImage::default();
        let mut base: u32 = 0;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let body = raw.strip_prefix(':').ok_or(HexError::MissingColon(line))?;
            let bytes = decode_bytes(body, line)?;
            if bytes.len() < 5 {
                return Err(HexError::Truncated(line));
            }
            let count = bytes[0] as usize;
            if bytes.len() < count + 5 {
                return Err(HexError::Truncated(line));
            }

            let record = &bytes[..count + 5];
            let sum = record[..count + 4]
                .iter()
                .fold(0u8, |acc, &b| acc.wrapping_add(b));
            let expected = sum.wrapping_neg();
            let actual = record[count + 4];
            if expected != actual {
                return Err(HexError::BadChecksum {
                    line,
                    expected,
                    actual,
                });
            }

            let offset = u16::from_be_bytes([record[1], record[2]]) as u32;
            let data = &record[4..count + 4];
            match record[3] {
                0x00 => {
                    for (i, &byte) in data.iter().enumerate() {
                        image.put_byte(base + offset + i as u32, byte);
                    }
                }
                0x01 => return Ok(image),
                0x02 if count == 2 => {
                    base = (u16::from_be_bytes([data[0], data[1]]) as u32) << 4;
                }
                0x04 if count == 2 => {
                    base = (u16::from_be_bytes([data[0], data[1]]) as u32) << 16;
                }
                0x03 | 0x05 => {}
                kind => return Err(HexError::UnsupportedRecord { line, kind }),
            }
        }
        Err(HexError::MissingEof)
    }

    fn put_byte(&mut self, byte_addr: u32, byte: u8) {
        let word = self.words.entry(byte_addr >> 1).or_insert(0x3FFF);
        *word = if byte_addr & 1 == 0 {
            (*word & 0xFF00) | byte as u16
        } else {
            (*word & 0x00FF) | ((byte as u16) << 8)
        };
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Program memory words as (address, word)
    pub fn program(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.words
            .range(..CONFIG_BASE as u32)
            .map(|(&a, &w)| (a as u16, w & 0x3FFF))
    }

    /// ID locations and configuration words as (address, word)
    pub fn config(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.words
            .range(CONFIG_BASE as u32..EEPROM_BASE as u32)
            .map(|(&a, &w)| (a as u16, w & 0x3FFF))
    }

    /// Data EEPROM bytes as (offset, byte)
    pub fn eeprom(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.words
            .range(EEPROM_BASE as u32..EEPROM_END as u32)
            .map(|(&a, &w)| ((a - EEPROM_BASE as u32) as usize, w as u8))
    }

    /// Highest program word address plus one
    pub fn program_len(&self) -> usize {
        self.program().last().map_or(0, |(a, _)| a as usize + 1)
    }
}

fn decode_bytes(body: &str, line: usize) -> Result<Vec<u8>, HexError> {
    if body.len() % 2 != 0 {
        return Err(HexError::Truncated(line));
    }
    body.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).ok_or(HexError::BadDigit(line))?;
            let lo = (pair[1] as char).to_digit(16).ok_or(HexError::BadDigit(line))?;
            Ok((hi * 16 + lo) as u8)
        })
        .collect()
}

/// Render program words as an INHX8M image
pub fn encode(words: &[(u16, u16)]) -> String {
    let mut out = String::new();
    for &(addr, word) in words {
        let byte_addr = addr.wrapping_mul(2);
        let fields = [2u8, (byte_addr >> 8) as u8, byte_addr as u8, 0, word as u8, (word >> 8) as u8];
        let sum = fields.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out.push(':');
        for b in fields {
            out.push_str(&format!("{:02X}", b));
        }
        out.push_str(&format!("{:02X}\n", sum.wrapping_neg()));
    }
    out.push_str(":00000001FF\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLINK: &str = "\
:020000040000FA
:08000000831600308600831214
:02400E00F23F7F
:02420000AB0011
:00000001FF
";

    #[test]
    fn test_parse_program_config_and_eeprom() {
        let image = HexImage::parse(BLINK).expect("valid hex");
        let program: Vec<_> = image.program().collect();
        assert_eq!(
            program,
            vec![(0, 0x1683), (1, 0x3000), (2, 0x0086), (3, 0x1283)]
        );
        assert_eq!(image.config().collect::<Vec<_>>(), vec![(0x2007, 0x3FF2)]);
        assert_eq!(image.eeprom().collect::<Vec<_>>(), vec![(0, 0xAB)]);
        assert_eq!(image.program_len(), 4);
    }

    #[test]
    fn test_reject_bad_checksum() {
        let err = HexImage::parse(":0400000083160030FF\n:00000001FF\n").unwrap_err();
        assert!(matches!(err, HexError::BadChecksum { line: 1, .. }));
    }

    #[test]
    fn test_reject_missing_eof() {
        let err = HexImage::parse(":02000000831665\n").unwrap_err();
        assert_eq!(err, HexError::MissingEof);
    }

    #[test]
    fn test_reject_garbage() {
        assert_eq!(HexImage::parse("0000\n"), Err(HexError::MissingColon(1)));
        assert_eq!(HexImage::parse(":0G"), Err(HexError::BadDigit(1)));
        assert_eq!(HexImage::parse(":0400"), Err(HexError::Truncated(1)));
    }

    #[test]
    fn test_records_after_eof_are_ignored() {
        let image = HexImage::parse(":00000001FF\n:zz\n").expect("stops at EOF");
        assert!(image.is_empty());
    }

    #[test]
    fn test_encode_parses_back() {
        let words = [(0u16, 0x2805u16), (5, 0x3FFF)];
        let image = HexImage::parse(&encode(&words)).expect("valid hex");
        assert_eq!(image.program().collect::<Vec<_>>(), words.to_vec());
    }
}
