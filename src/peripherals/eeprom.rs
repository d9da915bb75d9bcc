//! Data EEPROM and self-programming controller
//!
//! EECON1, EECON2, EEDATA, EEADR and (on wider parts) EEDATH/EEADRH live
//! here. Writes are armed by the EECON2 unlock sequence:
//!
//! ```text
//! EECON1.WREN = 1
//! EECON2 = 0x55      NotReady -> Have0x55
//! EECON2 = 0xAA      Have0x55 -> ReadyForWrite
//! EECON1.WR = 1      ReadyForWrite -> WriteInProgress
//! ```
//!
//! Any other byte, or a byte out of order, collapses the sequence to
//! `Unarmed`. A write completes [`EEPROM_WRITE_TIME`] cycles later through
//! the trigger queue; program memory writes stall the core meanwhile.
//!
//! Variants:
//! - `Basic` (16F84A): EEIF and WRERR live in EECON1.
//! - `Pir` (16F628A): EEIF in PIR1.
//! - `Wide` (16F690, 16F887): EEDATH/EEADRH, EEPGD program memory reads and
//!   single-word program writes where the part allows them.
//! - `Extended` (16F88): FREE row erase, write latches filled either in
//!   groups (the write of the last word in a group programs the group) or
//!   under LWLO control, CFGS configuration space reads, and a write-protect
//!   floor below which program writes are accepted but change nothing.

use crate::context::{Activity, SimContext};
use crate::memory::addr::CONFIG_SPACE;
use crate::peripherals::interrupt::InterruptSource;
use crate::register::{Peripheral, ResetType, Sfr};
use crate::scheduler::EventId;

/// Cycles from WR=1 to completion
pub const EEPROM_WRITE_TIME: u64 = 20;
/// Cycles for a program memory read to fill EEDATA/EEDATH
pub const PROGRAM_READ_TIME: u64 = 2;
/// Empty write latch marker
const LATCH_MT: u16 = 0x7FFF;

/// EECON1 bit masks
pub mod eecon1 {
    pub const RD: u8 = 0x01;
    pub const WR: u8 = 0x02;
    pub const WREN: u8 = 0x04;
    pub const WRERR: u8 = 0x08;
    /// EEIF on the basic variant
    pub const EEIF: u8 = 0x10;
    /// Row erase on the extended variant
    pub const FREE: u8 = 0x10;
    pub const LWLO: u8 = 0x20;
    pub const CFGS: u8 = 0x40;
    pub const EEPGD: u8 = 0x80;
}

/// Unlock / write state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EeState {
    /// WREN set, waiting for 0x55
    NotReady,
    Have0x55,
    ReadyForWrite,
    WriteInProgress,
    /// WREN clear, or the unlock sequence was violated
    #[default]
    Unarmed,
    /// Program memory read in flight
    Read,
}

/// Registers owned by the EEPROM module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EeReg {
    Eecon1,
    Eecon2,
    Eedata,
    Eeadr,
    Eedath,
    Eeadrh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromKind {
    Basic,
    Pir,
    Wide,
    Extended,
}

/// Chip-level EEPROM description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromSpec {
    pub kind: EepromKind,
    /// Data EEPROM size in bytes (power of two)
    pub size: usize,
    /// Completion flag
    pub eeif: InterruptSource,
    /// Part can write its own program memory
    pub program_write: bool,
    /// Words erased by FREE (extended)
    pub erase_block: usize,
    /// Program write latches (extended)
    pub write_latches: usize,
}

impl EepromSpec {
    fn eecon1_mask(&self) -> u8 {
        use eecon1::*;
        match self.kind {
            EepromKind::Basic => EEIF | WRERR | WREN | WR | RD,
            EepromKind::Pir => WRERR | WREN | WR | RD,
            EepromKind::Wide => EEPGD | WRERR | WREN | WR | RD,
            EepromKind::Extended => 0xFF,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self.kind, EepromKind::Wide | EepromKind::Extended)
    }
}

/// Write latched by WR=1, applied on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingWrite {
    Data { addr: usize, value: u8 },
    Word { addr: u16, word: u16 },
    /// Program the write latches into the group starting at `base`
    Latches { base: u16 },
    Erase { addr: u16 },
}

#[derive(Debug, Clone)]
pub struct Eeprom {
    spec: EepromSpec,
    data: Vec<u8>,
    eecon1: Sfr,
    eedata: Sfr,
    eeadr: Sfr,
    eedath: Sfr,
    eeadrh: Sfr,
    state: EeState,
    pending: Option<PendingWrite>,
    latches: Vec<u16>,
    /// Program writes below this word address change nothing
    write_protect_floor: u16,
}

impl Eeprom {
    pub fn new(spec: EepromSpec) -> Self {
        Self {
            spec,
            data: vec![0xFF; spec.size],
            eecon1: Sfr::new(0x00, spec.eecon1_mask()).with_reset(0x00, eecon1::WRERR),
            eedata: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
            eeadr: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
            eedath: Sfr::new(0x00, 0x3F).with_reset(0x00, 0x3F),
            eeadrh: Sfr::new(0x00, 0x1F).with_reset(0x00, 0x1F),
            state: EeState::Unarmed,
            pending: None,
            latches: vec![LATCH_MT; spec.write_latches],
            write_protect_floor: 0,
        }
    }

    /// Current unlock/write state
    pub fn eestate(&self) -> EeState {
        self.state
    }

    pub fn spec(&self) -> &EepromSpec {
        &self.spec
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Preload data EEPROM (HEX images place it at 0x2100)
    pub fn load_data(&mut self, offset: usize, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(cell) = self.data.get_mut(offset + i) {
                *cell = b;
            }
        }
    }

    pub fn set_write_protect_floor(&mut self, floor: u16) {
        self.write_protect_floor = floor;
    }

    pub fn write_protect_floor(&self) -> u16 {
        self.write_protect_floor
    }

    pub fn is_busy(&self) -> bool {
        self.state == EeState::WriteInProgress
    }

    fn data_address(&self) -> usize {
        let mut addr = self.eeadr.get() as usize;
        if self.spec.size > 256 {
            addr |= (self.eeadrh.get() as usize) << 8;
        }
        addr & self.spec.size.saturating_sub(1)
    }

    fn program_address(&self) -> u16 {
        ((self.eeadrh.get() as u16) << 8) | self.eeadr.get() as u16
    }

    fn program_word(&self) -> u16 {
        ((self.eedath.get() as u16 & 0x3F) << 8) | self.eedata.get() as u16
    }

    fn targets_program(&self) -> bool {
        self.spec.is_wide() && self.eecon1.is_set(eecon1::EEPGD)
    }

    /// Back to the idle state implied by WREN
    fn disarm(&mut self) {
        self.state = if self.eecon1.is_set(eecon1::WREN) {
            EeState::NotReady
        } else {
            EeState::Unarmed
        };
    }

    fn put_eecon1(&mut self, value: u8, ctx: &mut SimContext) {
        use eecon1::*;
        let old = self.eecon1.get();
        // RD and WR can be set but not cleared by software
        let new = self.eecon1.masked(value) | (old & (RD | WR));
        self.eecon1.put_value(new);

        if self.spec.kind == EepromKind::Basic && old & EEIF != 0 && new & EEIF == 0 {
            ctx.irq.clear(self.spec.eeif);
        }

        if self.state != EeState::WriteInProgress && self.state != EeState::Read {
            if new & WREN == 0 {
                self.state = EeState::Unarmed;
            } else if old & WREN == 0 {
                self.state = EeState::NotReady;
            }
        }

        if new & WR != 0 && old & WR == 0 {
            if new & WREN != 0 && self.state == EeState::ReadyForWrite {
                self.start_write(ctx);
            } else {
                tracing::debug!(state = ?self.state, "EEPROM: WR ignored, not armed");
                if self.state != EeState::WriteInProgress {
                    self.eecon1.clear_bits(WR);
                }
            }
        }

        if new & RD != 0 && old & RD == 0 {
            let config_read = new & CFGS != 0 && self.spec.kind == EepromKind::Extended;
            if self.targets_program() || config_read {
                self.start_program_memory_read(ctx);
            } else {
                self.eedata.put_value(self.data[self.data_address()]);
                self.eecon1.clear_bits(RD);
            }
        }
    }

    fn put_eecon2(&mut self, value: u8) {
        self.state = match (self.state, value) {
            (EeState::WriteInProgress, _) | (EeState::Read, _) => return,
            _ if !self.eecon1.is_set(eecon1::WREN) => EeState::Unarmed,
            (EeState::NotReady | EeState::Unarmed, 0x55) => EeState::Have0x55,
            (EeState::Have0x55, 0xAA) => EeState::ReadyForWrite,
            _ => EeState::Unarmed,
        };
    }

    /// Latch address and data and schedule completion
    pub fn start_write(&mut self, ctx: &mut SimContext) {
        let pending = if self.targets_program() {
            if !self.spec.program_write {
                tracing::debug!("EEPROM: part cannot write program memory");
                self.eecon1.clear_bits(eecon1::WR);
                self.disarm();
                return;
            }
            match self.program_pending() {
                Some(p) => p,
                None => {
                    // Word went to a latch; nothing to program yet
                    self.eecon1.clear_bits(eecon1::WR);
                    self.disarm();
                    return;
                }
            }
        } else {
            PendingWrite::Data {
                addr: self.data_address(),
                value: self.eedata.get(),
            }
        };

        tracing::debug!(?pending, at = ctx.now() + EEPROM_WRITE_TIME, "EEPROM: write started");
        if !matches!(pending, PendingWrite::Data { .. }) {
            ctx.activity = Activity::PmWrite;
        }
        self.pending = Some(pending);
        self.state = EeState::WriteInProgress;
        ctx.schedule_in(EventId::EepromWrite, EEPROM_WRITE_TIME);
    }

    fn program_pending(&mut self) -> Option<PendingWrite> {
        let addr = self.program_address();
        if self.spec.kind != EepromKind::Extended || self.spec.write_latches == 0 {
            return Some(PendingWrite::Word {
                addr,
                word: self.program_word(),
            });
        }
        if self.eecon1.is_set(eecon1::FREE) {
            return Some(PendingWrite::Erase { addr });
        }
        let n = self.spec.write_latches;
        let slot = addr as usize % n;
        self.latches[slot] = self.program_word();
        let last_in_group = slot == n - 1;
        let load_only = self.eecon1.is_set(eecon1::LWLO) || !last_in_group;
        if load_only {
            None
        } else {
            Some(PendingWrite::Latches {
                base: addr - slot as u16,
            })
        }
    }

    /// Trigger callback: apply the latched write
    pub fn write_is_complete(&mut self, ctx: &mut SimContext) {
        let floor = self.write_protect_floor;
        match self.pending.take() {
            Some(PendingWrite::Data { addr, value }) => {
                if let Some(cell) = self.data.get_mut(addr) {
                    *cell = value;
                }
            }
            Some(PendingWrite::Word { addr, word }) => {
                if addr >= floor {
                    ctx.program.write(addr, word);
                }
            }
            Some(PendingWrite::Latches { base }) => {
                for (i, latch) in self.latches.iter_mut().enumerate() {
                    let addr = base + i as u16;
                    if *latch != LATCH_MT && addr >= floor {
                        ctx.program.write(addr, *latch);
                    }
                    *latch = LATCH_MT;
                }
            }
            Some(PendingWrite::Erase { addr }) => {
                if addr >= floor {
                    ctx.program.erase_block(addr, self.spec.erase_block);
                }
            }
            None => return,
        }

        self.eecon1.clear_bits(eecon1::WR);
        if self.spec.kind == EepromKind::Basic {
            self.eecon1.set_bits(eecon1::EEIF);
        }
        ctx.raise(self.spec.eeif);
        if ctx.activity == Activity::PmWrite {
            ctx.activity = Activity::Active;
        }
        self.disarm();
        tracing::debug!("EEPROM: write complete");
    }

    /// Data EEPROM reads finish in the RD write; program memory and
    /// configuration reads take two cycles
    pub fn start_program_memory_read(&mut self, ctx: &mut SimContext) {
        self.state = EeState::Read;
        ctx.schedule_in(EventId::EepromRead, PROGRAM_READ_TIME);
    }

    fn program_read_complete(&mut self, ctx: &mut SimContext) {
        let addr = if self.eecon1.is_set(eecon1::CFGS) && self.spec.kind == EepromKind::Extended {
            CONFIG_SPACE | (self.eeadr.get() as u16 & 0x0F)
        } else {
            self.program_address()
        };
        let word = ctx.program.read(addr);
        self.eedata.put_value(word as u8);
        self.eedath.put_value((word >> 8) as u8 & 0x3F);
        self.eecon1.clear_bits(eecon1::RD);
        self.disarm();
    }

    pub fn on_event(&mut self, event: EventId, ctx: &mut SimContext) {
        match event {
            EventId::EepromWrite => self.write_is_complete(ctx),
            EventId::EepromRead => self.program_read_complete(ctx),
            _ => {}
        }
    }
}

impl Peripheral for Eeprom {
    type Reg = EeReg;

    fn peek(&self, reg: EeReg, _ctx: &SimContext) -> u8 {
        match reg {
            EeReg::Eecon1 => self.eecon1.get(),
            // Not a physical register
            EeReg::Eecon2 => 0,
            EeReg::Eedata => self.eedata.get(),
            EeReg::Eeadr => self.eeadr.get(),
            EeReg::Eedath => self.eedath.get(),
            EeReg::Eeadrh => self.eeadrh.get(),
        }
    }

    fn put(&mut self, reg: EeReg, value: u8, ctx: &mut SimContext) {
        match reg {
            EeReg::Eecon1 => self.put_eecon1(value, ctx),
            EeReg::Eecon2 => self.put_eecon2(value),
            EeReg::Eedata => self.eedata.put(value),
            EeReg::Eeadr => self.eeadr.put(value),
            EeReg::Eedath => self.eedath.put(value),
            EeReg::Eeadrh => self.eeadrh.put(value),
        }
    }

    fn put_value(&mut self, reg: EeReg, value: u8, _ctx: &mut SimContext) {
        match reg {
            EeReg::Eecon1 => self.eecon1.put_value(value),
            EeReg::Eecon2 => {}
            EeReg::Eedata => self.eedata.put_value(value),
            EeReg::Eeadr => self.eeadr.put_value(value),
            EeReg::Eedath => self.eedath.put_value(value),
            EeReg::Eeadrh => self.eeadrh.put_value(value),
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        let interrupted = self.state == EeState::WriteInProgress;
        ctx.cancel(EventId::EepromWrite);
        ctx.cancel(EventId::EepromRead);
        self.pending = None;
        self.latches.fill(LATCH_MT);

        self.eecon1.reset(kind);
        if interrupted && !kind.is_power_on() {
            tracing::debug!(?kind, "EEPROM: write aborted by reset");
            self.eecon1.set_bits(eecon1::WRERR);
        }
        for reg in [
            &mut self.eedata,
            &mut self.eeadr,
            &mut self.eedath,
            &mut self.eeadrh,
        ] {
            reg.reset(kind);
        }
        self.state = EeState::Unarmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eecon1::*;

    const EEIF_PIR: InterruptSource = InterruptSource::pir(0, 0x80);

    fn spec(kind: EepromKind) -> EepromSpec {
        EepromSpec {
            kind,
            size: 128,
            eeif: EEIF_PIR,
            program_write: true,
            erase_block: 32,
            write_latches: if kind == EepromKind::Extended { 4 } else { 0 },
        }
    }

    fn run(ee: &mut Eeprom, ctx: &mut SimContext, cycles: u64) {
        for _ in 0..cycles {
            ctx.cycles += 1;
            let pass = ctx.queue.pass(ctx.cycles);
            while let Some(ev) = ctx.queue.pop_due(&pass) {
                ee.on_event(ev, ctx);
            }
        }
    }

    fn unlock(ee: &mut Eeprom, ctx: &mut SimContext, extra: u8) {
        ee.put(EeReg::Eecon1, WREN | extra, ctx);
        ee.put(EeReg::Eecon2, 0x55, ctx);
        ee.put(EeReg::Eecon2, 0xAA, ctx);
    }

    fn write_data(ee: &mut Eeprom, ctx: &mut SimContext, addr: u8, value: u8) {
        ee.put(EeReg::Eeadr, addr, ctx);
        ee.put(EeReg::Eedata, value, ctx);
        unlock(ee, ctx, 0);
        ee.put(EeReg::Eecon1, WREN | WR, ctx);
    }

    #[test]
    fn test_unlock_sequence_states() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        assert_eq!(ee.eestate(), EeState::Unarmed);
        ee.put(EeReg::Eecon1, WREN, &mut ctx);
        assert_eq!(ee.eestate(), EeState::NotReady);
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Have0x55);
        ee.put(EeReg::Eecon2, 0xAA, &mut ctx);
        assert_eq!(ee.eestate(), EeState::ReadyForWrite);
        ee.put(EeReg::Eecon1, WREN | WR, &mut ctx);
        assert_eq!(ee.eestate(), EeState::WriteInProgress);
    }

    #[test]
    fn test_write_completes_after_write_time() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        write_data(&mut ee, &mut ctx, 0x10, 0x5A);
        assert_eq!(ctx.queue.when(EventId::EepromWrite), Some(EEPROM_WRITE_TIME));

        run(&mut ee, &mut ctx, EEPROM_WRITE_TIME - 1);
        assert_eq!(ee.data()[0x10], 0xFF);
        assert!(ee.peek(EeReg::Eecon1, &ctx) & WR != 0);

        run(&mut ee, &mut ctx, 1);
        assert_eq!(ee.data()[0x10], 0x5A);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & WR, 0);
        assert!(ctx.irq.is_raised(EEIF_PIR));
        assert_eq!(ee.eestate(), EeState::NotReady);
    }

    #[test]
    fn test_wrong_byte_disarms() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        ee.put(EeReg::Eedata, 0x11, &mut ctx);
        ee.put(EeReg::Eecon1, WREN, &mut ctx);
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        ee.put(EeReg::Eecon2, 0x56, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Unarmed);
        ee.put(EeReg::Eecon1, WREN | WR, &mut ctx);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & WR, 0);
        run(&mut ee, &mut ctx, 50);
        assert_eq!(ee.data()[0], 0xFF);
    }

    #[test]
    fn test_reversed_bytes_disarm() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        ee.put(EeReg::Eecon1, WREN, &mut ctx);
        ee.put(EeReg::Eecon2, 0xAA, &mut ctx);
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Have0x55);
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Unarmed);
    }

    #[test]
    fn test_unlock_without_wren_is_ignored() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        ee.put(EeReg::Eecon2, 0xAA, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Unarmed);
        ee.put(EeReg::Eecon1, WR, &mut ctx);
        assert!(!ctx.queue.is_pending(EventId::EepromWrite));
    }

    #[test]
    fn test_clearing_wren_disarms() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        unlock(&mut ee, &mut ctx, 0);
        ee.put(EeReg::Eecon1, 0, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Unarmed);
    }

    #[test]
    fn test_wr_while_busy_is_ignored() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        write_data(&mut ee, &mut ctx, 1, 0x22);
        run(&mut ee, &mut ctx, 5);
        ee.put(EeReg::Eedata, 0x33, &mut ctx);
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        ee.put(EeReg::Eecon2, 0xAA, &mut ctx);
        ee.put(EeReg::Eecon1, WREN | WR, &mut ctx);
        assert_eq!(ctx.queue.when(EventId::EepromWrite), Some(EEPROM_WRITE_TIME));
        run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
        assert_eq!(ee.data()[1], 0x22);
    }

    #[test]
    fn test_software_cannot_clear_wr() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        write_data(&mut ee, &mut ctx, 1, 0x22);
        ee.put(EeReg::Eecon1, 0, &mut ctx);
        assert!(ee.peek(EeReg::Eecon1, &ctx) & WR != 0);
        assert!(ee.is_busy());
    }

    #[test]
    fn test_data_read_is_synchronous() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        ee.load_data(3, &[0xC3]);
        ee.put(EeReg::Eeadr, 3, &mut ctx);
        ee.put(EeReg::Eecon1, RD, &mut ctx);
        assert_eq!(ee.peek(EeReg::Eedata, &ctx), 0xC3);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & RD, 0);
    }

    #[test]
    fn test_eecon2_reads_zero() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        ee.put(EeReg::Eecon2, 0x55, &mut ctx);
        assert_eq!(ee.get(EeReg::Eecon2, &mut ctx), 0);
    }

    #[test]
    fn test_basic_eeif_lives_in_eecon1() {
        let mut ctx = SimContext::for_test(&[]);
        let mut s = spec(EepromKind::Basic);
        s.eeif = InterruptSource::pir(0, 0x10);
        let mut ee = Eeprom::new(s);
        write_data(&mut ee, &mut ctx, 0, 0x01);
        run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
        assert!(ee.peek(EeReg::Eecon1, &ctx) & EEIF != 0);
        assert!(ctx.irq.is_raised(s.eeif));

        ee.put(EeReg::Eecon1, WREN, &mut ctx);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & EEIF, 0);
        assert!(!ctx.irq.is_raised(s.eeif));
    }

    #[test]
    fn test_reset_voids_write_and_sets_wrerr() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Pir));
        write_data(&mut ee, &mut ctx, 7, 0x77);
        ee.reset(ResetType::Mclr, &mut ctx);
        assert!(!ctx.queue.is_pending(EventId::EepromWrite));
        assert!(ee.peek(EeReg::Eecon1, &ctx) & WRERR != 0);
        assert_eq!(ee.eestate(), EeState::Unarmed);
        run(&mut ee, &mut ctx, 50);
        assert_eq!(ee.data()[7], 0xFF);

        // WRERR survives later non-POR resets, POR clears it
        ee.reset(ResetType::Mclr, &mut ctx);
        assert!(ee.peek(EeReg::Eecon1, &ctx) & WRERR != 0);
        ee.reset(ResetType::PowerOn, &mut ctx);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & WRERR, 0);
    }

    #[test]
    fn test_power_on_reset_restores_registers() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Wide));
        ee.put(EeReg::Eeadr, 0x12, &mut ctx);
        ee.put(EeReg::Eedath, 0x3F, &mut ctx);
        write_data(&mut ee, &mut ctx, 7, 0x77);
        ee.reset(ResetType::PowerOn, &mut ctx);
        for reg in [EeReg::Eecon1, EeReg::Eedata, EeReg::Eeadr, EeReg::Eedath] {
            assert_eq!(ee.peek(reg, &ctx), 0, "{reg:?}");
        }
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_program_memory_read_takes_two_cycles() {
        let mut ctx = SimContext::for_test(&[]);
        ctx.program.write(0x0123, 0x2A5C);
        let mut ee = Eeprom::new(spec(EepromKind::Wide));
        ee.put(EeReg::Eeadrh, 0x01, &mut ctx);
        ee.put(EeReg::Eeadr, 0x23, &mut ctx);
        ee.put(EeReg::Eecon1, EEPGD | RD, &mut ctx);
        assert_eq!(ee.eestate(), EeState::Read);
        run(&mut ee, &mut ctx, 1);
        assert_eq!(ee.peek(EeReg::Eedata, &ctx), 0);
        run(&mut ee, &mut ctx, 1);
        assert_eq!(ee.peek(EeReg::Eedata, &ctx), 0x5C);
        assert_eq!(ee.peek(EeReg::Eedath, &ctx), 0x2A);
        assert_eq!(ee.peek(EeReg::Eecon1, &ctx) & RD, 0);
    }

    #[test]
    fn test_program_word_write_stalls_core() {
        let mut ctx = SimContext::for_test(&[]);
        let mut ee = Eeprom::new(spec(EepromKind::Wide));
        ee.put(EeReg::Eeadr, 0x40, &mut ctx);
        ee.put(EeReg::Eedata, 0x34, &mut ctx);
        ee.put(EeReg::Eedath, 0x12, &mut ctx);
        unlock(&mut ee, &mut ctx, EEPGD);
        ee.put(EeReg::Eecon1, EEPGD | WREN | WR, &mut ctx);
        assert_eq!(ctx.activity, Activity::PmWrite);
        run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
        assert_eq!(ctx.activity, Activity::Active);
        assert_eq!(ctx.program.read(0x40), 0x1234);
    }

    mod extended {
        use super::*;

        fn write_word(ee: &mut Eeprom, ctx: &mut SimContext, addr: u16, word: u16) {
            ee.put(EeReg::Eeadrh, (addr >> 8) as u8, ctx);
            ee.put(EeReg::Eeadr, addr as u8, ctx);
            ee.put(EeReg::Eedata, word as u8, ctx);
            ee.put(EeReg::Eedath, (word >> 8) as u8, ctx);
            unlock(ee, ctx, EEPGD);
            ee.put(EeReg::Eecon1, EEPGD | WREN | WR, ctx);
        }

        #[test]
        fn test_group_programs_on_last_latch() {
            let mut ctx = SimContext::for_test(&[]);
            let mut ee = Eeprom::new(spec(EepromKind::Extended));
            for i in 0..3u16 {
                write_word(&mut ee, &mut ctx, 0x100 + i, 0x1000 + i);
                assert!(!ee.is_busy());
            }
            assert_eq!(ctx.program.read(0x100), 0x3FFF);

            write_word(&mut ee, &mut ctx, 0x103, 0x1003);
            assert!(ee.is_busy());
            run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
            for i in 0..4u16 {
                assert_eq!(ctx.program.read(0x100 + i), 0x1000 + i);
            }
        }

        #[test]
        fn test_lwlo_holds_latches() {
            let mut ctx = SimContext::for_test(&[]);
            let mut ee = Eeprom::new(spec(EepromKind::Extended));
            ee.put(EeReg::Eecon1, LWLO, &mut ctx);
            ee.put(EeReg::Eeadr, 0x03, &mut ctx);
            ee.put(EeReg::Eedata, 0x99, &mut ctx);
            unlock(&mut ee, &mut ctx, EEPGD | LWLO);
            ee.put(EeReg::Eecon1, EEPGD | LWLO | WREN | WR, &mut ctx);
            assert!(!ee.is_busy());
            assert_eq!(ctx.program.read(0x03), 0x3FFF);
        }

        #[test]
        fn test_free_erases_row() {
            let mut ctx = SimContext::for_test(&[]);
            for a in 0..64 {
                ctx.program.write(a, 0);
            }
            let mut ee = Eeprom::new(spec(EepromKind::Extended));
            ee.put(EeReg::Eeadr, 0x25, &mut ctx);
            unlock(&mut ee, &mut ctx, EEPGD | FREE);
            ee.put(EeReg::Eecon1, EEPGD | FREE | WREN | WR, &mut ctx);
            run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
            assert_eq!(ctx.program.read(0x1F), 0);
            assert_eq!(ctx.program.read(0x20), 0x3FFF);
            assert_eq!(ctx.program.read(0x3F), 0x3FFF);
        }

        #[test]
        fn test_write_below_floor_is_silent() {
            let mut ctx = SimContext::for_test(&[]);
            let mut ee = Eeprom::new(spec(EepromKind::Extended));
            ee.set_write_protect_floor(0x100);
            for i in 0..4u16 {
                write_word(&mut ee, &mut ctx, 0x80 + i, 0x0AAA);
            }
            assert!(ee.is_busy());
            run(&mut ee, &mut ctx, EEPROM_WRITE_TIME);
            assert!(!ee.is_busy());
            assert!(ctx.irq.is_raised(EEIF_PIR));
            assert_eq!(ctx.program.read(0x80), 0x3FFF);
        }

        #[test]
        fn test_cfgs_reads_configuration_space() {
            let mut ctx = SimContext::for_test(&[]);
            ctx.program.set_config_word(0, 0x2F50);
            let mut ee = Eeprom::new(spec(EepromKind::Extended));
            ee.put(EeReg::Eeadr, 0x07, &mut ctx);
            ee.put(EeReg::Eecon1, CFGS | RD, &mut ctx);
            run(&mut ee, &mut ctx, PROGRAM_READ_TIME);
            assert_eq!(ee.peek(EeReg::Eedata, &ctx), 0x50);
            assert_eq!(ee.peek(EeReg::Eedath, &ctx), 0x2F);
        }
    }
}
