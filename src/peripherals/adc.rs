//! 10-bit analog-to-digital converter
//!
//! Setting GO/DONE with ADON starts a conversion of 11 TAD. The input is
//! sampled when the conversion completes; the result lands in ADRESH:ADRESL
//! with the selected justification, GO/DONE clears and ADIF is raised.
//! Clearing GO/DONE or ADON aborts a conversion in progress.

use crate::context::SimContext;
use crate::peripherals::comparator::FIXED_REFERENCE;
use crate::peripherals::interrupt::InterruptSource;
use crate::pins::PinId;
use crate::scheduler::EventId;
use crate::register::{Peripheral, ResetType, Sfr};

/// Conversion length in TAD
pub const CONVERSION_TAD: u64 = 11;
/// Typical dedicated RC oscillator period
pub const FRC_TAD: f64 = 4e-6;
/// Full-scale result
pub const FULL_SCALE: u16 = 1023;

pub const ADON: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcReg {
    Adcon0,
    Adcon1,
    Adresh,
    Adresl,
}

/// Where the control fields live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcLayout {
    /// ADCS1:0 CHS2:0 GO - ADON / ADFM ADCS2 VCFG1:0 (16F88)
    ThreeBitChannel,
    /// ADFM VCFG CHS3:0 GO ADON / - ADCS2:0 (16F690)
    FormatInAdcon0,
    /// ADCS1:0 CHS3:0 GO ADON / ADFM - VCFG1:0 (16F887)
    FormatInAdcon1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcSpec {
    pub layout: AdcLayout,
    /// ANx channel to pin
    pub channels: &'static [(u8, PinId)],
    /// Channel number wired to CVref
    pub cvref_channel: Option<u8>,
    /// Channel number wired to the 0.6 V reference
    pub fixed_channel: Option<u8>,
    pub vref_plus: Option<PinId>,
    pub vref_minus: Option<PinId>,
    pub adif: InterruptSource,
}

/// Control fields decoded from ADCON0/ADCON1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcControl {
    pub on: bool,
    pub go: bool,
    pub channel: u8,
    pub right_justified: bool,
    pub external_plus: bool,
    pub external_minus: bool,
    /// ADCS2:0 clock select
    pub clock: u8,
}

#[derive(Debug, Clone)]
pub struct Adc {
    spec: AdcSpec,
    adcon0: Sfr,
    adcon1: Sfr,
    adresh: Sfr,
    adresl: Sfr,
}

impl Adc {
    pub fn new(spec: AdcSpec) -> Self {
        let adcon1_mask = match spec.layout {
            AdcLayout::ThreeBitChannel => 0xF0,
            AdcLayout::FormatInAdcon0 => 0x70,
            AdcLayout::FormatInAdcon1 => 0xB0,
        };
        Self {
            spec,
            adcon0: Sfr::new(0x00, if spec.layout == AdcLayout::ThreeBitChannel { 0xFD } else { 0xFF }),
            adcon1: Sfr::new(0x00, adcon1_mask),
            adresh: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
            adresl: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
        }
    }

    fn go_bit(&self) -> u8 {
        match self.spec.layout {
            AdcLayout::ThreeBitChannel => 0x04,
            AdcLayout::FormatInAdcon0 | AdcLayout::FormatInAdcon1 => 0x02,
        }
    }

    pub fn control(&self) -> AdcControl {
        let a0 = self.adcon0.get();
        let a1 = self.adcon1.get();
        let go = a0 & self.go_bit() != 0;
        match self.spec.layout {
            AdcLayout::ThreeBitChannel => AdcControl {
                on: a0 & ADON != 0,
                go,
                channel: (a0 >> 3) & 0x07,
                right_justified: a1 & 0x80 != 0,
                external_plus: a1 & 0x20 != 0,
                external_minus: a1 & 0x10 != 0,
                clock: ((a1 >> 4) & 0x04) | ((a0 >> 6) & 0x03),
            },
            AdcLayout::FormatInAdcon0 => AdcControl {
                on: a0 & ADON != 0,
                go,
                channel: (a0 >> 2) & 0x0F,
                right_justified: a0 & 0x80 != 0,
                external_plus: a0 & 0x40 != 0,
                external_minus: false,
                clock: (a1 >> 4) & 0x07,
            },
            AdcLayout::FormatInAdcon1 => AdcControl {
                on: a0 & ADON != 0,
                go,
                channel: (a0 >> 2) & 0x0F,
                right_justified: a1 & 0x80 != 0,
                external_plus: a1 & 0x10 != 0,
                external_minus: a1 & 0x20 != 0,
                clock: (a0 >> 6) & 0x03,
            },
        }
    }

    pub fn is_converting(&self) -> bool {
        self.control().go
    }

    /// Conversion length in instruction cycles for the selected clock
    pub fn conversion_cycles(&self, ctx: &SimContext) -> u64 {
        let divisor = match self.control().clock {
            0b000 => 2,
            0b001 => 8,
            0b010 => 32,
            0b100 => 4,
            0b101 => 16,
            0b110 => 64,
            _ => return ctx.seconds_to_cycles(FRC_TAD * CONVERSION_TAD as f64),
        };
        (CONVERSION_TAD * divisor).div_ceil(4).max(1)
    }

    /// Voltage on the selected channel
    pub fn channel_voltage(&self, channel: u8, cvref: f64, ctx: &SimContext) -> f64 {
        if Some(channel) == self.spec.cvref_channel {
            return cvref;
        }
        if Some(channel) == self.spec.fixed_channel {
            return FIXED_REFERENCE;
        }
        self.spec
            .channels
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|&(_, pin)| ctx.pins.voltage(pin))
            .unwrap_or(0.0)
    }

    fn references(&self, control: &AdcControl, ctx: &SimContext) -> (f64, f64) {
        let hi = match self.spec.vref_plus {
            Some(pin) if control.external_plus => ctx.pins.voltage(pin),
            _ => ctx.pins.vdd(),
        };
        let lo = match self.spec.vref_minus {
            Some(pin) if control.external_minus => ctx.pins.voltage(pin),
            _ => 0.0,
        };
        (hi, lo)
    }

    /// Scale a voltage to a 10-bit code
    pub fn quantize(voltage: f64, vref_hi: f64, vref_lo: f64) -> u16 {
        let span = vref_hi - vref_lo;
        if span <= 0.0 {
            return 0;
        }
        let code = ((voltage - vref_lo) / span * FULL_SCALE as f64).floor();
        code.clamp(0.0, FULL_SCALE as f64) as u16
    }

    fn start(&mut self, ctx: &mut SimContext) {
        let cycles = self.conversion_cycles(ctx);
        tracing::debug!(channel = self.control().channel, cycles, "ADC: conversion started");
        ctx.schedule_in(EventId::AdcConversion, cycles);
    }

    /// Conversion trigger. `cvref` is the comparator reference for the
    /// internal channel.
    pub fn on_event(&mut self, event: EventId, cvref: f64, ctx: &mut SimContext) -> bool {
        if event != EventId::AdcConversion {
            return false;
        }
        let control = self.control();
        if !control.go || !control.on {
            return true;
        }
        let (hi, lo) = self.references(&control, ctx);
        let voltage = self.channel_voltage(control.channel, cvref, ctx);
        let code = Self::quantize(voltage, hi, lo);
        if control.right_justified {
            self.adresh.put_value((code >> 8) as u8);
            self.adresl.put_value(code as u8);
        } else {
            self.adresh.put_value((code >> 2) as u8);
            self.adresl.put_value(((code & 0x03) << 6) as u8);
        }
        tracing::debug!(channel = control.channel, voltage, code, "ADC: conversion done");
        self.adcon0.clear_bits(self.go_bit());
        ctx.raise(self.spec.adif);
        true
    }

    fn write_adcon0(&mut self, value: u8, raw: bool, ctx: &mut SimContext) {
        let was = self.control();
        if raw {
            self.adcon0.put_value(value);
        } else {
            self.adcon0.put(value);
        }
        let now = self.control();
        if now.go && !now.on {
            self.adcon0.clear_bits(self.go_bit());
        } else if now.go && !was.go {
            self.start(ctx);
        }
        if was.go && !self.control().go {
            ctx.cancel(EventId::AdcConversion);
        }
    }
}

impl Peripheral for Adc {
    type Reg = AdcReg;

    fn peek(&self, reg: AdcReg, _ctx: &SimContext) -> u8 {
        match reg {
            AdcReg::Adcon0 => self.adcon0.get(),
            AdcReg::Adcon1 => self.adcon1.get(),
            AdcReg::Adresh => self.adresh.get(),
            AdcReg::Adresl => self.adresl.get(),
        }
    }

    fn put(&mut self, reg: AdcReg, value: u8, ctx: &mut SimContext) {
        match reg {
            AdcReg::Adcon0 => self.write_adcon0(value, false, ctx),
            AdcReg::Adcon1 => self.adcon1.put(value),
            AdcReg::Adresh => self.adresh.put(value),
            AdcReg::Adresl => self.adresl.put(value),
        }
    }

    fn put_value(&mut self, reg: AdcReg, value: u8, ctx: &mut SimContext) {
        match reg {
            AdcReg::Adcon0 => self.write_adcon0(value, true, ctx),
            AdcReg::Adcon1 => self.adcon1.put_value(value),
            AdcReg::Adresh => self.adresh.put_value(value),
            AdcReg::Adresl => self.adresl.put_value(value),
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        ctx.cancel(EventId::AdcConversion);
        self.adcon0.reset(kind);
        self.adcon1.reset(kind);
        self.adresh.reset(kind);
        self.adresl.reset(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::{PinInput, PinSpec};

    const ADIF: InterruptSource = InterruptSource::pir(0, 0x40);

    fn adc(layout: AdcLayout) -> (Adc, SimContext) {
        let pins: Vec<PinSpec> = (0..4).map(|_| PinSpec::io("RA")).collect();
        let mut ctx = SimContext::for_test(&pins);
        let mut adc = Adc::new(AdcSpec {
            layout,
            channels: &[(0, 0), (1, 1), (2, 2), (3, 3)],
            cvref_channel: Some(12),
            fixed_channel: Some(13),
            vref_plus: Some(3),
            vref_minus: Some(2),
            adif: ADIF,
        });
        adc.reset(ResetType::PowerOn, &mut ctx);
        (adc, ctx)
    }

    /// Run the clock until the conversion trigger fires
    fn finish(adc: &mut Adc, ctx: &mut SimContext, cvref: f64) -> u64 {
        let start = ctx.cycles;
        for _ in 0..10_000 {
            ctx.cycles += 1;
            let pass = ctx.queue.pass(ctx.cycles);
            while let Some(ev) = ctx.queue.pop_due(&pass) {
                adc.on_event(ev, cvref, ctx);
            }
            if !adc.is_converting() {
                return ctx.cycles - start;
            }
        }
        panic!("conversion never finished");
    }

    #[test]
    fn test_quantize() {
        assert_eq!(Adc::quantize(0.0, 5.0, 0.0), 0);
        assert_eq!(Adc::quantize(5.0, 5.0, 0.0), 1023);
        assert_eq!(Adc::quantize(2.5, 5.0, 0.0), 511);
        assert_eq!(Adc::quantize(6.0, 5.0, 0.0), 1023);
        assert_eq!(Adc::quantize(0.5, 5.0, 1.0), 0);
        assert_eq!(Adc::quantize(1.0, 1.0, 1.0), 0);
    }

    #[test]
    fn test_conversion_right_justified() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon1);
        ctx.pins.set_stimulus(1, PinInput::Analog(5.0));
        adc.put(AdcReg::Adcon1, 0x80, &mut ctx);
        // Fosc/8, AN1, ADON
        adc.put(AdcReg::Adcon0, 0x40 | (1 << 2) | ADON, &mut ctx);
        adc.put(AdcReg::Adcon0, 0x40 | (1 << 2) | 0x02 | ADON, &mut ctx);
        assert!(adc.is_converting());
        assert_eq!(finish(&mut adc, &mut ctx, 0.0), 22);
        assert_eq!(adc.peek(AdcReg::Adresh, &ctx), 0x03);
        assert_eq!(adc.peek(AdcReg::Adresl, &ctx), 0xFF);
        assert!(ctx.irq.is_raised(ADIF));
    }

    #[test]
    fn test_conversion_left_justified() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon0);
        ctx.pins.set_stimulus(0, PinInput::Analog(2.5));
        adc.put(AdcReg::Adcon0, 0x02 | ADON, &mut ctx);
        finish(&mut adc, &mut ctx, 0.0);
        // 511 = 0b01_1111_1111
        assert_eq!(adc.peek(AdcReg::Adresh, &ctx), 0x7F);
        assert_eq!(adc.peek(AdcReg::Adresl, &ctx), 0xC0);
    }

    #[test]
    fn test_internal_channels() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon0);
        adc.put(AdcReg::Adcon0, 0x80 | (12 << 2) | 0x02 | ADON, &mut ctx);
        finish(&mut adc, &mut ctx, 2.5);
        assert_eq!(adc.peek(AdcReg::Adresl, &ctx), 0xFF);
        assert_eq!(adc.peek(AdcReg::Adresh, &ctx), 0x01);

        adc.put(AdcReg::Adcon0, 0x80 | (13 << 2) | 0x02 | ADON, &mut ctx);
        finish(&mut adc, &mut ctx, 2.5);
        // 0.6 / 5 * 1023 = 122.76
        assert_eq!(adc.peek(AdcReg::Adresl, &ctx), 122);
    }

    #[test]
    fn test_external_reference() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon1);
        ctx.pins.set_stimulus(3, PinInput::Analog(4.0));
        ctx.pins.set_stimulus(2, PinInput::Analog(2.0));
        ctx.pins.set_stimulus(0, PinInput::Analog(3.0));
        adc.put(AdcReg::Adcon1, 0x80 | 0x30, &mut ctx);
        adc.put(AdcReg::Adcon0, 0x02 | ADON, &mut ctx);
        finish(&mut adc, &mut ctx, 0.0);
        let code = (adc.peek(AdcReg::Adresh, &ctx) as u16) << 8 | adc.peek(AdcReg::Adresl, &ctx) as u16;
        assert_eq!(code, 511);
    }

    #[test]
    fn test_three_bit_layout_clock_and_go() {
        let (mut adc, mut ctx) = adc(AdcLayout::ThreeBitChannel);
        // ADCS2=1 with ADCS1:0=10 is Fosc/64
        adc.put(AdcReg::Adcon1, 0x40, &mut ctx);
        adc.put(AdcReg::Adcon0, 0x80 | (2 << 3) | 0x04 | ADON, &mut ctx);
        assert_eq!(adc.control().channel, 2);
        assert_eq!(adc.conversion_cycles(&ctx), 176);
        assert_eq!(finish(&mut adc, &mut ctx, 0.0), 176);
    }

    #[test]
    fn test_frc_clock() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon1);
        adc.put(AdcReg::Adcon0, 0xC0 | ADON, &mut ctx);
        assert_eq!(adc.conversion_cycles(&ctx), 44);
    }

    #[test]
    fn test_go_requires_adon_and_clear_aborts() {
        let (mut adc, mut ctx) = adc(AdcLayout::FormatInAdcon1);
        adc.put(AdcReg::Adcon0, 0x02, &mut ctx);
        assert!(!adc.is_converting());
        assert!(!ctx.queue.is_pending(EventId::AdcConversion));

        adc.put(AdcReg::Adcon0, 0x02 | ADON, &mut ctx);
        assert!(ctx.queue.is_pending(EventId::AdcConversion));
        adc.put(AdcReg::Adcon0, ADON, &mut ctx);
        assert!(!ctx.queue.is_pending(EventId::AdcConversion));
        assert!(!ctx.irq.is_raised(ADIF));
    }
}
