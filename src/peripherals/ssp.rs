//! Synchronous serial port (SSP / MSSP)
//!
//! Register front end shared by the SPI and I2C state machines. SSPCON.SSPM
//! selects the protocol; changing SSPEN or SSPM tears down the running
//! machine, releases its pin sources and attaches the ones the new mode
//! needs.
//!
//! | SSPM | mode |
//! |------|------|
//! | 0000-0011 | SPI master, Fosc/4, /16, /64, TMR2/2 |
//! | 0100, 0101 | SPI slave with / without SS |
//! | 0110, 0111 | I2C slave, 7 / 10-bit address |
//! | 1000 | I2C master, baud from SSPADD (MSSP) |
//! | 1001 | SSPADD writes go to SSPMSK (MSSP) |
//! | 1011 | I2C firmware-controlled master |
//! | 1110, 1111 | I2C slave 7 / 10-bit with START/STOP interrupts |

use crate::context::SimContext;
use crate::peripherals::i2c::I2c;
use crate::peripherals::interrupt::InterruptSource;
use crate::peripherals::spi::Spi;
use crate::pins::Drive;
use crate::pps::Signal;
use crate::register::{Peripheral, ResetType, Sfr};
use crate::scheduler::EventId;

/// SSPSTAT bits
pub mod sspstat {
    pub const SMP: u8 = 0x80;
    pub const CKE: u8 = 0x40;
    /// D/A: last byte was data
    pub const DA: u8 = 0x20;
    pub const P: u8 = 0x10;
    pub const S: u8 = 0x08;
    /// R/W from the address byte (slave) or transmit in progress (master)
    pub const RW: u8 = 0x04;
    pub const UA: u8 = 0x02;
    pub const BF: u8 = 0x01;
}

/// SSPCON bits
pub mod sspcon {
    pub const WCOL: u8 = 0x80;
    pub const SSPOV: u8 = 0x40;
    pub const SSPEN: u8 = 0x20;
    pub const CKP: u8 = 0x10;
    pub const SSPM_MASK: u8 = 0x0F;
}

/// SSPCON2 bits (MSSP)
pub mod sspcon2 {
    pub const GCEN: u8 = 0x80;
    pub const ACKSTAT: u8 = 0x40;
    pub const ACKDT: u8 = 0x20;
    pub const ACKEN: u8 = 0x10;
    pub const RCEN: u8 = 0x08;
    pub const PEN: u8 = 0x04;
    pub const RSEN: u8 = 0x02;
    pub const SEN: u8 = 0x01;
}

/// Registers owned by the SSP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SspReg {
    Sspbuf,
    Sspcon,
    Sspcon2,
    Sspstat,
    /// SSPADD, or SSPMSK while SSPM=1001
    Sspadd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SspKind {
    /// Basic SSP: SPI and I2C slave only
    Ssp,
    /// Master SSP: adds SSPCON2, SSPMSK and the I2C master
    Mssp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SspSpec {
    pub kind: SspKind,
    pub sspif: InterruptSource,
    pub bclif: Option<InterruptSource>,
}

/// SPI master bit clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiClock {
    Fosc4,
    Fosc16,
    Fosc64,
    Tmr2,
}

impl SpiClock {
    /// Cycles per clock half period; `None` when clocked by Timer2
    pub fn half_period(self) -> Option<u64> {
        match self {
            SpiClock::Fosc4 => Some(1),
            SpiClock::Fosc16 => Some(2),
            SpiClock::Fosc64 => Some(8),
            SpiClock::Tmr2 => None,
        }
    }
}

/// Decoded SSPCON.SSPM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SspMode {
    SpiMaster(SpiClock),
    SpiSlave { ss: bool },
    I2cSlave { ten_bit: bool, start_stop_irq: bool },
    I2cMaster,
    I2cFirmwareMaster,
    LoadMask,
    Reserved,
}

impl SspMode {
    pub fn decode(sspm: u8, kind: SspKind) -> Self {
        match (sspm & sspcon::SSPM_MASK, kind) {
            (0x0, _) => SspMode::SpiMaster(SpiClock::Fosc4),
            (0x1, _) => SspMode::SpiMaster(SpiClock::Fosc16),
            (0x2, _) => SspMode::SpiMaster(SpiClock::Fosc64),
            (0x3, _) => SspMode::SpiMaster(SpiClock::Tmr2),
            (0x4, _) => SspMode::SpiSlave { ss: true },
            (0x5, _) => SspMode::SpiSlave { ss: false },
            (0x6, _) => SspMode::I2cSlave {
                ten_bit: false,
                start_stop_irq: false,
            },
            (0x7, _) => SspMode::I2cSlave {
                ten_bit: true,
                start_stop_irq: false,
            },
            (0x8, SspKind::Mssp) => SspMode::I2cMaster,
            (0x9, SspKind::Mssp) => SspMode::LoadMask,
            (0xB, _) => SspMode::I2cFirmwareMaster,
            (0xE, _) => SspMode::I2cSlave {
                ten_bit: false,
                start_stop_irq: true,
            },
            (0xF, _) => SspMode::I2cSlave {
                ten_bit: true,
                start_stop_irq: true,
            },
            _ => SspMode::Reserved,
        }
    }

    pub fn is_spi(self) -> bool {
        matches!(self, SspMode::SpiMaster(_) | SspMode::SpiSlave { .. })
    }

    pub fn is_i2c(self) -> bool {
        matches!(
            self,
            SspMode::I2cSlave { .. } | SspMode::I2cMaster | SspMode::I2cFirmwareMaster
        )
    }
}

/// Register file shared by the protocol machines
#[derive(Debug, Clone)]
pub struct SspRegs {
    pub kind: SspKind,
    pub buf: Sfr,
    pub con: Sfr,
    pub con2: Sfr,
    pub stat: Sfr,
    pub add: Sfr,
    pub msk: Sfr,
    pub sspif: InterruptSource,
    pub bclif: Option<InterruptSource>,
}

impl SspRegs {
    fn new(spec: SspSpec) -> Self {
        let con2_mask = match spec.kind {
            SspKind::Mssp => !sspcon2::ACKSTAT,
            SspKind::Ssp => 0,
        };
        Self {
            kind: spec.kind,
            buf: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
            con: Sfr::new(0x00, 0xFF),
            con2: Sfr::new(0x00, con2_mask),
            stat: Sfr::new(0x00, sspstat::SMP | sspstat::CKE),
            add: Sfr::new(0x00, 0xFF),
            msk: Sfr::new(0xFF, 0xFF),
            sspif: spec.sspif,
            bclif: spec.bclif,
        }
    }

    pub fn mode(&self) -> SspMode {
        SspMode::decode(self.con.get(), self.kind)
    }

    pub fn enabled(&self) -> bool {
        self.con.is_set(sspcon::SSPEN)
    }

    pub fn bf(&self) -> bool {
        self.stat.is_set(sspstat::BF)
    }

    /// Deliver a received byte: SSPBUF and BF, or SSPOV when the last byte
    /// was not read. Returns false on overflow.
    pub fn receive(&mut self, byte: u8) -> bool {
        if self.bf() {
            self.con.set_bits(sspcon::SSPOV);
            false
        } else {
            self.buf.put_value(byte);
            self.stat.set_bits(sspstat::BF);
            true
        }
    }

    pub fn collision(&mut self) {
        self.con.set_bits(sspcon::WCOL);
    }

    /// 7-bit address mask from SSPMSK (MSSP) or all bits (SSP)
    pub fn address_mask(&self) -> u8 {
        match self.kind {
            SspKind::Mssp => self.msk.get() >> 1,
            SspKind::Ssp => 0x7F,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ssp {
    regs: SspRegs,
    spi: Spi,
    i2c: I2c,
    /// Mode the pins are currently wired for
    wired: Option<SspMode>,
}

impl Ssp {
    pub fn new(spec: SspSpec) -> Self {
        Self {
            regs: SspRegs::new(spec),
            spi: Spi::new(),
            i2c: I2c::new(),
            wired: None,
        }
    }

    /// Register sinks on the SSP input signals
    pub fn attach(&self, ctx: &mut SimContext) {
        for signal in [Signal::Sck, Signal::Sdi, Signal::Ss, Signal::Scl, Signal::Sda] {
            if let Some(pin) = ctx.pin_of(signal) {
                ctx.pins.attach_sink(pin, signal.sink_bit());
            }
        }
    }

    pub fn is_ssp_enabled(&self) -> bool {
        self.regs.enabled()
    }

    pub fn ssp_mode(&self) -> SspMode {
        self.regs.mode()
    }

    pub fn is_i2c_master(&self) -> bool {
        self.is_ssp_enabled()
            && matches!(
                self.regs.mode(),
                SspMode::I2cMaster | SspMode::I2cFirmwareMaster
            )
    }

    pub fn is_i2c_slave(&self) -> bool {
        self.is_ssp_enabled() && matches!(self.regs.mode(), SspMode::I2cSlave { .. })
    }

    pub fn spi(&self) -> &Spi {
        &self.spi
    }

    pub fn i2c(&self) -> &I2c {
        &self.i2c
    }

    fn active_mode(&self) -> Option<SspMode> {
        if self.regs.enabled() {
            Some(self.regs.mode())
        } else {
            None
        }
    }

    /// Re-wire pins after SSPEN or SSPM changed
    fn reconfigure(&mut self, ctx: &mut SimContext) {
        let mode = self.active_mode();
        if mode == self.wired {
            return;
        }
        tracing::debug!(from = ?self.wired, to = ?mode, "SSP: mode change");
        ctx.cancel(EventId::SspClock);
        self.spi.stop();
        self.i2c.stop();
        for signal in [Signal::Sck, Signal::Sdo, Signal::Scl, Signal::Sda] {
            if let Some(pin) = ctx.pin_of(signal) {
                ctx.pins.release_source(pin, signal);
            }
        }

        match mode {
            Some(SspMode::SpiMaster(_)) => {
                let idle = self.regs.con.is_set(sspcon::CKP);
                attach_source(ctx, Signal::Sck, Drive::Digital(idle));
                attach_source(ctx, Signal::Sdo, Drive::Digital(false));
            }
            Some(SspMode::SpiSlave { .. }) => {
                self.spi.enter_slave(ctx);
            }
            Some(m) if m.is_i2c() => {
                attach_source(ctx, Signal::Scl, Drive::Released);
                attach_source(ctx, Signal::Sda, Drive::Released);
                self.i2c.enter(ctx);
            }
            _ => {}
        }
        self.wired = mode;
    }

    fn put_sspcon(&mut self, value: u8, ctx: &mut SimContext) {
        let old = self.regs.con.get();
        self.regs.con.put(value);
        let new = self.regs.con.get();
        self.reconfigure(ctx);

        if (old ^ new) & sspcon::CKP != 0 {
            match self.active_mode() {
                Some(SspMode::SpiMaster(_)) => self.spi.set_idle_level(&self.regs, ctx),
                Some(SspMode::I2cSlave { .. }) if new & sspcon::CKP != 0 => {
                    self.i2c.release_clock(&mut self.regs, ctx)
                }
                _ => {}
            }
        }
    }

    fn put_sspbuf(&mut self, value: u8, ctx: &mut SimContext) {
        match self.active_mode() {
            Some(SspMode::SpiMaster(clock)) => self.spi.write_master(&mut self.regs, value, clock, ctx),
            Some(SspMode::SpiSlave { .. }) => self.spi.write_slave(&mut self.regs, value, ctx),
            Some(SspMode::I2cSlave { .. }) => self.i2c.write_slave(&mut self.regs, value, ctx),
            Some(SspMode::I2cMaster) => self.i2c.write_master(&mut self.regs, value, ctx),
            _ => self.regs.buf.put(value),
        }
    }

    fn put_sspcon2(&mut self, value: u8, ctx: &mut SimContext) {
        if self.regs.kind != SspKind::Mssp {
            return;
        }
        let old = self.regs.con2.get();
        self.regs.con2.put(value);
        if self.active_mode() == Some(SspMode::I2cMaster) {
            let started = self.regs.con2.get() & !old;
            self.i2c.command(&mut self.regs, started, ctx);
        }
    }

    /// Timer2 period match; clocks the SPI master in TMR2 mode
    pub fn on_tmr2_match(&mut self, ctx: &mut SimContext) {
        if self.active_mode() == Some(SspMode::SpiMaster(SpiClock::Tmr2)) {
            self.spi.tick(&mut self.regs, ctx);
        }
    }

    /// Trigger callback
    pub fn on_clock(&mut self, ctx: &mut SimContext) {
        match self.active_mode() {
            Some(SspMode::SpiMaster(_)) => self.spi.tick(&mut self.regs, ctx),
            Some(SspMode::I2cMaster) => self.i2c.master_tick(&mut self.regs, ctx),
            _ => {}
        }
    }

    /// Level change on one of the SSP input signals
    pub fn on_signal(&mut self, signal: Signal, level: bool, ctx: &mut SimContext) {
        match self.active_mode() {
            Some(SspMode::SpiSlave { ss }) => match signal {
                Signal::Sck => self.spi.slave_clock(&mut self.regs, level, ctx),
                Signal::Ss if ss => self.spi.slave_select(&mut self.regs, level, ctx),
                _ => {}
            },
            Some(mode) if mode.is_i2c() => match signal {
                Signal::Scl => self.i2c.scl_edge(&mut self.regs, level, ctx),
                Signal::Sda => self.i2c.sda_edge(&mut self.regs, level, ctx),
                _ => {}
            },
            _ => {}
        }
    }
}

pub(crate) fn attach_source(ctx: &mut SimContext, signal: Signal, drive: Drive) {
    if let Some(pin) = ctx.pin_of(signal) {
        ctx.pins.attach_source(pin, signal, drive);
    }
}

pub(crate) fn drive(ctx: &mut SimContext, signal: Signal, drive: Drive) {
    if let Some(pin) = ctx.pin_of(signal) {
        ctx.pins.drive(pin, signal, drive);
    }
}

pub(crate) fn level(ctx: &SimContext, signal: Signal) -> bool {
    ctx.pin_of(signal).map(|p| ctx.pins.level(p)).unwrap_or(false)
}

impl Peripheral for Ssp {
    type Reg = SspReg;

    fn peek(&self, reg: SspReg, _ctx: &SimContext) -> u8 {
        match reg {
            SspReg::Sspbuf => self.regs.buf.get(),
            SspReg::Sspcon => self.regs.con.get(),
            SspReg::Sspcon2 => self.regs.con2.get(),
            SspReg::Sspstat => self.regs.stat.get(),
            SspReg::Sspadd if self.regs.mode() == SspMode::LoadMask => self.regs.msk.get(),
            SspReg::Sspadd => self.regs.add.get(),
        }
    }

    /// Reading SSPBUF clears BF
    fn get(&mut self, reg: SspReg, ctx: &mut SimContext) -> u8 {
        let value = self.peek(reg, ctx);
        if reg == SspReg::Sspbuf {
            self.regs.stat.clear_bits(sspstat::BF);
        }
        value
    }

    fn put(&mut self, reg: SspReg, value: u8, ctx: &mut SimContext) {
        match reg {
            SspReg::Sspbuf => self.put_sspbuf(value, ctx),
            SspReg::Sspcon => self.put_sspcon(value, ctx),
            SspReg::Sspcon2 => self.put_sspcon2(value, ctx),
            SspReg::Sspstat => self.regs.stat.put(value),
            SspReg::Sspadd if self.regs.mode() == SspMode::LoadMask => self.regs.msk.put(value),
            SspReg::Sspadd => {
                self.regs.add.put(value);
                self.regs.stat.clear_bits(sspstat::UA);
                self.i2c.address_updated(ctx);
            }
        }
    }

    fn put_value(&mut self, reg: SspReg, value: u8, ctx: &mut SimContext) {
        match reg {
            SspReg::Sspbuf => self.regs.buf.put_value(value),
            SspReg::Sspcon => {
                self.regs.con.put_value(value);
                self.reconfigure(ctx);
            }
            SspReg::Sspcon2 => self.regs.con2.put_value(value),
            SspReg::Sspstat => self.regs.stat.put_value(value),
            SspReg::Sspadd if self.regs.mode() == SspMode::LoadMask => {
                self.regs.msk.put_value(value)
            }
            SspReg::Sspadd => self.regs.add.put_value(value),
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        for reg in [
            &mut self.regs.buf,
            &mut self.regs.con,
            &mut self.regs.con2,
            &mut self.regs.stat,
            &mut self.regs.add,
            &mut self.regs.msk,
        ] {
            reg.reset(kind);
        }
        self.reconfigure(ctx);
        self.spi.stop();
        self.i2c.stop();
        ctx.cancel(EventId::SspClock);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_decode() {
        assert_eq!(SspMode::decode(0x21, SspKind::Ssp), SspMode::SpiMaster(SpiClock::Fosc16));
        assert_eq!(SspMode::decode(0x05, SspKind::Ssp), SspMode::SpiSlave { ss: false });
        assert_eq!(SspMode::decode(0x08, SspKind::Ssp), SspMode::Reserved);
        assert_eq!(SspMode::decode(0x08, SspKind::Mssp), SspMode::I2cMaster);
        assert_eq!(SspMode::decode(0x09, SspKind::Mssp), SspMode::LoadMask);
        assert!(SspMode::decode(0x0E, SspKind::Ssp).is_i2c());
        assert!(SspMode::decode(0x03, SspKind::Ssp).is_spi());
    }

    #[test]
    fn test_raw_store_follows_sspmsk_window() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ssp = Ssp::new(SspSpec {
            kind: SspKind::Mssp,
            sspif: InterruptSource::pir(0, 0x08),
            bclif: None,
        });
        ssp.put(SspReg::Sspadd, 0x42, &mut ctx);
        ssp.put(SspReg::Sspcon, sspcon::SSPEN | 0x09, &mut ctx);
        ssp.put_value(SspReg::Sspadd, 0x3E, &mut ctx);
        assert_eq!(ssp.peek(SspReg::Sspadd, &ctx), 0x3E);

        // Back in a slave mode SSPADD is visible again, untouched
        ssp.put(SspReg::Sspcon, sspcon::SSPEN | 0x06, &mut ctx);
        assert_eq!(ssp.peek(SspReg::Sspadd, &ctx), 0x42);
        assert_eq!(ssp.regs.address_mask(), 0x1F);
    }

    #[test]
    fn test_receive_overflow() {
        let mut regs = SspRegs::new(SspSpec {
            kind: SspKind::Ssp,
            sspif: InterruptSource::pir(0, 0x08),
            bclif: None,
        });
        assert!(regs.receive(0x12));
        assert!(!regs.receive(0x34));
        assert_eq!(regs.buf.get(), 0x12);
        assert!(regs.con.is_set(sspcon::SSPOV));
    }

    #[test]
    fn test_address_mask() {
        let mut regs = SspRegs::new(SspSpec {
            kind: SspKind::Mssp,
            sspif: InterruptSource::pir(0, 0x08),
            bclif: None,
        });
        assert_eq!(regs.address_mask(), 0x7F);
        regs.msk.put(0xF0);
        assert_eq!(regs.address_mask(), 0x78);
    }
}
