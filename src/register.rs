//! Register model
//!
//! Every special function register is an [`Sfr`]: an 8-bit cell with a write
//! mask and reset-type-aware reset values. Registers are owned by exactly one
//! module; the module implements [`Peripheral`] for its register enum and
//! runs the side effects of `get`/`put` there. Chip descriptors map data
//! addresses to a [`RegKind`], which the bus uses to dispatch.
//!
//! Reset values follow the datasheet columns "Value on POR" and "Value on
//! all other resets": bits marked `u` (unchanged) in the second column are
//! the `keep` mask.

use crate::context::SimContext;
use crate::peripherals::adc::AdcReg;
use crate::peripherals::comparator::CmpReg;
use crate::peripherals::eeprom::EeReg;
use crate::peripherals::interrupt::IntReg;
use crate::peripherals::ports::PortReg;
use crate::peripherals::ssp::SspReg;
use crate::peripherals::timer::TimerReg;
use crate::peripherals::usart::UsartReg;
use crate::peripherals::watchdog::WdtReg;
use std::fmt;

/// Reset sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetType {
    /// Power-on reset
    PowerOn,
    /// Brown-out reset (same register values as power-on)
    Brownout,
    /// External MCLR pin
    Mclr,
    /// Watchdog timeout while awake
    Watchdog,
}

impl ResetType {
    /// Power-on and brown-out load the POR column
    pub fn is_power_on(self) -> bool {
        matches!(self, ResetType::PowerOn | ResetType::Brownout)
    }
}

/// One special function register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sfr {
    value: u8,
    /// Bits a `put` may change
    write_mask: u8,
    /// Value on power-on reset
    por: u8,
    /// Value on other resets (for bits not in `keep`)
    reset_value: u8,
    /// Bits left unchanged by non power-on resets
    keep: u8,
}

impl Sfr {
    /// Register whose other-reset value equals its POR value
    pub const fn new(por: u8, write_mask: u8) -> Self {
        Self {
            value: por,
            write_mask,
            por,
            reset_value: por,
            keep: 0,
        }
    }

    /// Override the value loaded by MCLR/watchdog resets
    pub const fn with_reset(mut self, reset_value: u8, keep: u8) -> Self {
        self.reset_value = reset_value;
        self.keep = keep;
        self
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.value
    }

    /// Masked write: `(old & !M) | (v & M)`
    #[inline]
    pub fn put(&mut self, value: u8) {
        self.value = self.masked(value);
    }

    /// Value a masked write of `value` would produce
    #[inline]
    pub fn masked(&self, value: u8) -> u8 {
        (self.value & !self.write_mask) | (value & self.write_mask)
    }

    /// Raw store, ignoring the write mask
    #[inline]
    pub fn put_value(&mut self, value: u8) {
        self.value = value;
    }

    pub fn write_mask(&self) -> u8 {
        self.write_mask
    }

    pub fn set_write_mask(&mut self, mask: u8) {
        self.write_mask = mask;
    }

    pub fn reset(&mut self, kind: ResetType) {
        self.value = if kind.is_power_on() {
            self.por
        } else {
            (self.value & self.keep) | (self.reset_value & !self.keep)
        };
    }

    #[inline]
    pub fn is_set(&self, mask: u8) -> bool {
        self.value & mask != 0
    }

    #[inline]
    pub fn set_bits(&mut self, mask: u8) {
        self.value |= mask;
    }

    #[inline]
    pub fn clear_bits(&mut self, mask: u8) {
        self.value &= !mask;
    }

    #[inline]
    pub fn assign(&mut self, mask: u8, on: bool) {
        if on {
            self.set_bits(mask);
        } else {
            self.clear_bits(mask);
        }
    }
}

impl Default for Sfr {
    fn default() -> Self {
        Self::new(0, 0xFF)
    }
}

/// Register access contract shared by all modules.
///
/// `get` may have read side effects (documented per register), `peek` never
/// does and is what debuggers use. `put` applies the write mask and then the
/// module's side effects; `put_value` stores raw bits.
pub trait Peripheral {
    type Reg: Copy + fmt::Debug;

    fn peek(&self, reg: Self::Reg, ctx: &SimContext) -> u8;

    fn get(&mut self, reg: Self::Reg, ctx: &mut SimContext) -> u8 {
        self.peek(reg, ctx)
    }

    fn put(&mut self, reg: Self::Reg, value: u8, ctx: &mut SimContext);

    fn put_value(&mut self, reg: Self::Reg, value: u8, ctx: &mut SimContext);

    /// Restore reset values and cancel every trigger the module owns
    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext);
}

/// Dispatch tag for one mapped data address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    Indf,
    Pcl,
    Status,
    Fsr,
    Pclath,
    Interrupt(IntReg),
    Timer(TimerReg),
    Port(PortReg),
    Eeprom(EeReg),
    Ssp(SspReg),
    Usart(UsartReg),
    Comparator(CmpReg),
    Adc(AdcReg),
    Watchdog(WdtReg),
    /// Storage-only register, index into the descriptor's plain table
    Plain(u8),
}

impl RegKind {
    /// Registers handled by the CPU core rather than a module
    pub fn is_core(self) -> bool {
        matches!(
            self,
            RegKind::Indf | RegKind::Pcl | RegKind::Status | RegKind::Fsr | RegKind::Pclath
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_applies_write_mask() {
        let mut reg = Sfr::new(0b1010_0000, 0b0000_1111);
        reg.put(0xFF);
        assert_eq!(reg.get(), 0b1010_1111);
        reg.put(0x00);
        assert_eq!(reg.get(), 0b1010_0000);
    }

    #[test]
    fn test_mask_property_over_values() {
        for mask in [0x00u8, 0x0F, 0x7E, 0xFF] {
            for old in [0x00u8, 0x5A, 0xFF] {
                for v in [0x00u8, 0xA5, 0xFF] {
                    let mut reg = Sfr::new(old, mask);
                    reg.put(v);
                    assert_eq!(reg.get(), (old & !mask) | (v & mask));
                }
            }
        }
    }

    #[test]
    fn test_put_value_bypasses_mask() {
        let mut reg = Sfr::new(0, 0x01);
        reg.put_value(0xC3);
        assert_eq!(reg.get(), 0xC3);
    }

    #[test]
    fn test_reset_types() {
        // TRIS-like register: 1111 1111 on POR and other resets
        let mut tris = Sfr::new(0xFF, 0xFF);
        tris.put(0x00);
        tris.reset(ResetType::Mclr);
        assert_eq!(tris.get(), 0xFF);

        // PORT-like register: xxxx xxxx / uuuu uuuu
        let mut port = Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF);
        port.put(0x3C);
        port.reset(ResetType::Watchdog);
        assert_eq!(port.get(), 0x3C);
        port.reset(ResetType::PowerOn);
        assert_eq!(port.get(), 0x00);

        // INTCON-like: 0000 000x / 0000 000u
        let mut intcon = Sfr::new(0x00, 0xFF).with_reset(0x00, 0x01);
        intcon.put(0xFF);
        intcon.reset(ResetType::Mclr);
        assert_eq!(intcon.get(), 0x01);
        intcon.reset(ResetType::Brownout);
        assert_eq!(intcon.get(), 0x00);
    }

    #[test]
    fn test_bit_helpers() {
        let mut reg = Sfr::default();
        reg.set_bits(0x81);
        assert!(reg.is_set(0x80));
        reg.clear_bits(0x80);
        assert!(!reg.is_set(0x80));
        reg.assign(0x02, true);
        assert_eq!(reg.get(), 0x03);
    }
}
