//! STATUS register bit definitions

/// Carry / not-borrow (bit 0)
pub const C: u8 = 0b0000_0001;
/// Digit carry / not-digit-borrow (bit 1)
pub const DC: u8 = 0b0000_0010;
/// Zero (bit 2)
pub const Z: u8 = 0b0000_0100;
/// Power-down, cleared by SLEEP (bit 3)
pub const PD: u8 = 0b0000_1000;
/// Time-out, cleared by a watchdog time-out (bit 4)
pub const TO: u8 = 0b0001_0000;
/// Register bank select, low bit (bit 5)
pub const RP0: u8 = 0b0010_0000;
/// Register bank select, high bit (bit 6)
pub const RP1: u8 = 0b0100_0000;
/// Bank select for indirect addressing (bit 7)
pub const IRP: u8 = 0b1000_0000;

/// Bits software cannot write
pub const READ_ONLY: u8 = TO | PD;
