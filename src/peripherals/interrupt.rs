//! Interrupt controller
//!
//! Owns INTCON and the PIR/PIE pairs. Peripherals assert requests through an
//! [`InterruptSource`], a (flag register, bit) pair taken from the chip
//! descriptor when the module is built.
//!
//! An interrupt is pending when GIE is set and some flag is set together
//! with its enable. Core sources (T0IF, INTF, RBIF) are enabled by INTCON
//! directly; peripheral sources additionally require PEIE. Wake from sleep
//! uses the same test without GIE.

use crate::context::SimContext;
use crate::register::{Peripheral, ResetType, Sfr};

/// INTCON bit masks
pub mod intcon {
    pub const GIE: u8 = 0x80;
    /// PEIE, or EEIE on parts without PIR registers
    pub const PEIE: u8 = 0x40;
    pub const T0IE: u8 = 0x20;
    pub const INTE: u8 = 0x10;
    pub const RBIE: u8 = 0x08;
    pub const T0IF: u8 = 0x04;
    pub const INTF: u8 = 0x02;
    pub const RBIF: u8 = 0x01;
}

/// Number of PIR/PIE pairs modelled
pub const PIR_COUNT: usize = 2;

/// Register holding an interrupt flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagReg {
    Intcon,
    Pir(u8),
}

/// One interrupt flag bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    pub reg: FlagReg,
    pub mask: u8,
}

impl InterruptSource {
    pub const T0IF: InterruptSource = InterruptSource::intcon(intcon::T0IF);
    pub const INTF: InterruptSource = InterruptSource::intcon(intcon::INTF);
    pub const RBIF: InterruptSource = InterruptSource::intcon(intcon::RBIF);

    pub const fn intcon(mask: u8) -> Self {
        Self {
            reg: FlagReg::Intcon,
            mask,
        }
    }

    pub const fn pir(index: u8, mask: u8) -> Self {
        Self {
            reg: FlagReg::Pir(index),
            mask,
        }
    }
}

/// Registers owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntReg {
    Intcon,
    Pir(u8),
    Pie(u8),
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    intcon: Sfr,
    pir: [Sfr; PIR_COUNT],
    pie: [Sfr; PIR_COUNT],
    /// Flags that count as enabled without a PIE bit. Parts without PIR
    /// registers route EEIF here and gate it with INTCON bit 6.
    pie_fixed: [u8; PIR_COUNT],
    /// Flags only hardware may change (TXIF, RCIF)
    pir_readonly: [u8; PIR_COUNT],
}

impl InterruptController {
    pub fn new(pie_fixed: [u8; PIR_COUNT]) -> Self {
        Self {
            intcon: Sfr::new(0x00, 0xFF).with_reset(0x00, intcon::RBIF),
            pir: [Sfr::new(0, 0xFF); PIR_COUNT],
            pie: [Sfr::new(0, 0xFF); PIR_COUNT],
            pie_fixed,
            pir_readonly: [0; PIR_COUNT],
        }
    }

    /// Mark flags in PIR `index` as hardware-controlled
    pub fn with_readonly(mut self, index: usize, mask: u8) -> Self {
        if let Some(ro) = self.pir_readonly.get_mut(index) {
            *ro |= mask;
        }
        self
    }

    /// Set a flag bit
    pub fn raise(&mut self, source: InterruptSource) {
        if let Some(reg) = self.flag_reg(source.reg) {
            reg.set_bits(source.mask);
        }
    }

    /// Clear a flag bit (level-sensitive sources going inactive)
    pub fn clear(&mut self, source: InterruptSource) {
        if let Some(reg) = self.flag_reg(source.reg) {
            reg.clear_bits(source.mask);
        }
    }

    pub fn is_raised(&self, source: InterruptSource) -> bool {
        match source.reg {
            FlagReg::Intcon => self.intcon.is_set(source.mask),
            FlagReg::Pir(i) => self
                .pir
                .get(i as usize)
                .map(|r| r.is_set(source.mask))
                .unwrap_or(false),
        }
    }

    #[inline]
    pub fn intcon(&self) -> u8 {
        self.intcon.get()
    }

    pub fn gie(&self) -> bool {
        self.intcon.is_set(intcon::GIE)
    }

    /// Interrupt acceptance clears GIE
    pub fn clear_gie(&mut self) {
        self.intcon.clear_bits(intcon::GIE);
    }

    /// RETFIE sets GIE
    pub fn set_gie(&mut self) {
        self.intcon.set_bits(intcon::GIE);
    }

    /// Some enabled flag is set, ignoring GIE
    pub fn wake_pending(&self) -> bool {
        let v = self.intcon.get();
        if (v >> 3) & v & 0x07 != 0 {
            return true;
        }
        if v & intcon::PEIE == 0 {
            return false;
        }
        (0..PIR_COUNT).any(|i| self.pir[i].get() & (self.pie[i].get() | self.pie_fixed[i]) != 0)
    }

    /// An interrupt would be vectored now
    #[inline]
    pub fn irq_pending(&self) -> bool {
        self.gie() && self.wake_pending()
    }

    fn flag_reg(&mut self, reg: FlagReg) -> Option<&mut Sfr> {
        match reg {
            FlagReg::Intcon => Some(&mut self.intcon),
            FlagReg::Pir(i) => self.pir.get_mut(i as usize),
        }
    }

    /// Register read. The controller lives inside [`SimContext`], so the bus
    /// reaches it through these methods rather than the trait.
    pub fn read(&self, reg: IntReg) -> u8 {
        match reg {
            IntReg::Intcon => self.intcon.get(),
            IntReg::Pir(i) => self.pir.get(i as usize).map(Sfr::get).unwrap_or(0),
            IntReg::Pie(i) => self.pie.get(i as usize).map(Sfr::get).unwrap_or(0),
        }
    }

    pub fn write(&mut self, reg: IntReg, value: u8) {
        match reg {
            IntReg::Intcon => self.intcon.put(value),
            IntReg::Pir(i) => {
                let i = i as usize;
                if let Some(r) = self.pir.get_mut(i) {
                    let ro = self.pir_readonly[i];
                    r.put((r.get() & ro) | (value & !ro));
                }
            }
            IntReg::Pie(i) => {
                if let Some(r) = self.pie.get_mut(i as usize) {
                    r.put(value);
                }
            }
        }
    }

    pub fn write_raw(&mut self, reg: IntReg, value: u8) {
        match reg {
            IntReg::Intcon => self.intcon.put_value(value),
            IntReg::Pir(i) => {
                if let Some(r) = self.pir.get_mut(i as usize) {
                    r.put_value(value);
                }
            }
            IntReg::Pie(i) => {
                if let Some(r) = self.pie.get_mut(i as usize) {
                    r.put_value(value);
                }
            }
        }
    }

    pub fn reset_registers(&mut self, kind: ResetType) {
        self.intcon.reset(kind);
        for r in self.pir.iter_mut().chain(self.pie.iter_mut()) {
            r.reset(kind);
        }
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new([0; PIR_COUNT])
    }
}

impl Peripheral for InterruptController {
    type Reg = IntReg;

    fn peek(&self, reg: IntReg, _ctx: &SimContext) -> u8 {
        self.read(reg)
    }

    fn put(&mut self, reg: IntReg, value: u8, _ctx: &mut SimContext) {
        self.write(reg, value);
    }

    fn put_value(&mut self, reg: IntReg, value: u8, _ctx: &mut SimContext) {
        self.write_raw(reg, value);
    }

    fn reset(&mut self, kind: ResetType, _ctx: &mut SimContext) {
        self.reset_registers(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSPIF: InterruptSource = InterruptSource::pir(0, 0x08);
    const TXIF: InterruptSource = InterruptSource::pir(0, 0x10);

    #[test]
    fn test_core_source_needs_enable_and_gie() {
        let mut irq = InterruptController::default();
        irq.raise(InterruptSource::T0IF);
        assert!(!irq.wake_pending());

        irq.intcon.set_bits(intcon::T0IE);
        assert!(irq.wake_pending());
        assert!(!irq.irq_pending());

        irq.set_gie();
        assert!(irq.irq_pending());
        irq.clear_gie();
        assert!(!irq.irq_pending());
    }

    #[test]
    fn test_peripheral_source_needs_peie() {
        let mut irq = InterruptController::default();
        irq.raise(SSPIF);
        irq.pie[0].put(0x08);
        irq.set_gie();
        assert!(!irq.irq_pending());
        irq.intcon.set_bits(intcon::PEIE);
        assert!(irq.irq_pending());
        irq.clear(SSPIF);
        assert!(!irq.irq_pending());
    }

    #[test]
    fn test_fixed_enable_routes_through_eeie() {
        let eeif = InterruptSource::pir(0, 0x10);
        let mut irq = InterruptController::new([0x10, 0]);
        irq.raise(eeif);
        assert!(!irq.wake_pending());
        irq.intcon.set_bits(intcon::PEIE);
        assert!(irq.wake_pending());
    }

    #[test]
    fn test_readonly_flags_ignore_software() {
        let mut ctx = SimContext::for_test(&[]);
        let mut irq = InterruptController::default().with_readonly(0, 0x30);
        irq.raise(TXIF);
        irq.put(IntReg::Pir(0), 0x08, &mut ctx);
        assert!(irq.is_raised(TXIF));
        assert!(irq.is_raised(SSPIF));
        irq.put(IntReg::Pir(0), 0x00, &mut ctx);
        assert_eq!(irq.peek(IntReg::Pir(0), &ctx), 0x10);
    }

    #[test]
    fn test_reset_keeps_rbif_on_mclr() {
        let mut ctx = SimContext::for_test(&[]);
        let mut irq = InterruptController::default();
        irq.put(IntReg::Intcon, 0xFF, &mut ctx);
        irq.put(IntReg::Pir(1), 0xFF, &mut ctx);
        irq.reset(ResetType::Mclr, &mut ctx);
        assert_eq!(irq.intcon(), intcon::RBIF);
        assert_eq!(irq.peek(IntReg::Pir(1), &ctx), 0);
    }

    #[test]
    fn test_out_of_range_pir_is_ignored() {
        let mut irq = InterruptController::default();
        let bogus = InterruptSource::pir(7, 0x01);
        irq.raise(bogus);
        assert!(!irq.is_raised(bogus));
    }
}
