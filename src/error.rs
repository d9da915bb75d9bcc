//! Configuration errors
//!
//! Hardware-level faults (wrong unlock sequence, write collision, overrun)
//! are never errors: they are status bits. The types here cover the
//! mis-wired chip models and bad inputs that callers hand the core.

use crate::hex::HexError;

/// Errors raised while building or addressing a simulated part
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown part: {0}")]
    UnknownChip(String),
    #[error("register address {0:#05x} is not mapped")]
    UnmappedAddress(u16),
    #[error("register address {0:#05x} is mapped twice")]
    DuplicateAddress(u16),
    #[error("register address {0:#05x} is outside the data space")]
    AddressOutOfRange(u16),
    #[error("pin {0} does not exist on this package")]
    PinOutOfRange(usize),
    #[error("peripheral {0} needs pin {1:?} which the package does not provide")]
    MissingPin(&'static str, &'static str),
    #[error("program of {0} words does not fit {1} words of program memory")]
    ProgramTooLarge(usize, usize),
    #[error("invalid HEX image: {0}")]
    Hex(#[from] HexError),
}

impl ConfigError {
    /// Negative status code used by the C ABI
    pub fn code(&self) -> i32 {
        match self {
            ConfigError::UnknownChip(_) => -2,
            ConfigError::UnmappedAddress(_) => -3,
            ConfigError::DuplicateAddress(_) => -4,
            ConfigError::AddressOutOfRange(_) => -5,
            ConfigError::PinOutOfRange(_) => -6,
            ConfigError::MissingPin(..) => -7,
            ConfigError::ProgramTooLarge(..) => -8,
            ConfigError::Hex(_) => -9,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_address() {
        let err = ConfigError::UnmappedAddress(0x18E);
        assert_eq!(err.to_string(), "register address 0x18e is not mapped");
    }

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let errs = [
            ConfigError::UnknownChip("x".into()),
            ConfigError::UnmappedAddress(0),
            ConfigError::DuplicateAddress(0),
            ConfigError::AddressOutOfRange(0),
            ConfigError::PinOutOfRange(0),
            ConfigError::MissingPin("ssp", "SCK"),
            ConfigError::ProgramTooLarge(1, 0),
            ConfigError::Hex(HexError::MissingEof),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }
}
