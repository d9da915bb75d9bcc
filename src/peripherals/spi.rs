//! SPI shift engine
//!
//! One byte transfer is sixteen clock edges. The master generates them from
//! the SSP clock trigger (or Timer2 matches); the slave follows edges on the
//! SCK pin. Which edge shifts data out and which samples SDI depends on
//! CKP (idle level), CKE and SMP:
//!
//! | CKE | SMP | output | sample |
//! |-----|-----|--------|--------|
//! | 0 | 0 | leading edge | trailing edge |
//! | 0 | 1 | leading edge | next leading edge (last bit one half period late) |
//! | 1 | 0 | before the byte, then trailing edges | leading edge |
//! | 1 | 1 | before the byte, then trailing edges | trailing edge |
//!
//! SMP only applies to the master; a slave always samples mid-bit.

use crate::context::SimContext;
use crate::peripherals::ssp::{attach_source, drive, level, sspstat, SpiClock, SspRegs};
use crate::pins::Drive;
use crate::pps::Signal;
use crate::scheduler::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiState {
    #[default]
    Idle,
    Active,
    /// All eight bits are out; the final sample is one half period away
    WaitingForLastSample,
}

#[derive(Debug, Clone, Default)]
pub struct Spi {
    state: SpiState,
    /// Shift register
    sr: u8,
    /// Bits sampled
    bits: u8,
    /// Bits driven onto SDO
    out_bits: u8,
    /// Clock is in its active phase
    clock_active: bool,
    /// Cycles per half period, `None` when clocked by Timer2
    half_period: Option<u64>,
    master: bool,
    /// Slave select asserted (always true without SS)
    selected: bool,
}

impl Spi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SpiState {
        self.state
    }

    pub fn bits_transferred(&self) -> u8 {
        self.bits
    }

    /// Abort any transfer; pins are handled by the caller
    pub(crate) fn stop(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn enter_slave(&mut self, ctx: &mut SimContext) {
        self.stop();
        let ss_wired = ctx.pin_of(Signal::Ss).is_some();
        self.selected = !ss_wired || !level(ctx, Signal::Ss);
        let idle = if self.selected {
            Drive::Digital(false)
        } else {
            Drive::Released
        };
        attach_source(ctx, Signal::Sdo, idle);
    }

    /// CKP changed while a master is idle
    pub(crate) fn set_idle_level(&mut self, regs: &SspRegs, ctx: &mut SimContext) {
        if self.state == SpiState::Idle {
            let idle = regs.con.is_set(crate::peripherals::ssp::sspcon::CKP);
            drive(ctx, Signal::Sck, Drive::Digital(idle));
        }
    }

    fn busy(&self) -> bool {
        self.state != SpiState::Idle
    }

    /// SSPBUF write in master mode starts a transfer
    pub(crate) fn write_master(
        &mut self,
        regs: &mut SspRegs,
        value: u8,
        clock: SpiClock,
        ctx: &mut SimContext,
    ) {
        if self.busy() || regs.bf() {
            tracing::debug!(value, "SPI: write collision");
            regs.collision();
            return;
        }
        regs.buf.put_value(value);
        self.sr = value;
        self.bits = 0;
        self.out_bits = 0;
        self.clock_active = false;
        self.master = true;
        self.half_period = clock.half_period();
        self.state = SpiState::Active;
        if regs.stat.is_set(sspstat::CKE) {
            self.shift_out(ctx);
        }
        if let Some(half) = self.half_period {
            ctx.schedule_in(EventId::SspClock, half);
        }
    }

    /// SSPBUF write in slave mode loads the next byte to shift out
    pub(crate) fn write_slave(&mut self, regs: &mut SspRegs, value: u8, ctx: &mut SimContext) {
        if self.busy() {
            regs.collision();
            return;
        }
        regs.buf.put_value(value);
        self.sr = value;
        self.out_bits = 0;
        if regs.stat.is_set(sspstat::CKE) && self.selected {
            self.shift_out(ctx);
        }
    }

    /// One master half period
    pub(crate) fn tick(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        match self.state {
            SpiState::Idle => return,
            SpiState::Active => {
                self.clock_active = !self.clock_active;
                let idle = regs.con.is_set(crate::peripherals::ssp::sspcon::CKP);
                drive(ctx, Signal::Sck, Drive::Digital(self.clock_active ^ idle));
                if self.clock_active {
                    self.leading_edge(regs, ctx);
                } else {
                    self.trailing_edge(regs, ctx);
                }
            }
            SpiState::WaitingForLastSample => {
                self.sample(ctx);
                self.complete(regs, ctx);
            }
        }
        if self.busy() {
            if let Some(half) = self.half_period {
                ctx.schedule_in(EventId::SspClock, half);
            }
        }
    }

    /// Edge on the SCK pin in slave mode
    pub(crate) fn slave_clock(&mut self, regs: &mut SspRegs, level: bool, ctx: &mut SimContext) {
        if !self.selected {
            return;
        }
        let idle = regs.con.is_set(crate::peripherals::ssp::sspcon::CKP);
        let leading = level != idle;
        if self.state == SpiState::Idle {
            if !leading {
                return;
            }
            self.state = SpiState::Active;
            self.bits = 0;
            if regs.stat.is_set(sspstat::CKE) {
                if self.out_bits == 0 {
                    self.shift_out(ctx);
                }
            } else {
                self.out_bits = 0;
            }
        }
        if leading {
            self.leading_edge(regs, ctx);
        } else {
            self.trailing_edge(regs, ctx);
        }
    }

    /// SS pin change: high deselects and aborts
    pub(crate) fn slave_select(&mut self, regs: &mut SspRegs, level: bool, ctx: &mut SimContext) {
        self.selected = !level;
        if level {
            self.state = SpiState::Idle;
            self.bits = 0;
            self.out_bits = 0;
            drive(ctx, Signal::Sdo, Drive::Released);
        } else {
            self.out_bits = 0;
            drive(ctx, Signal::Sdo, Drive::Digital(false));
            if regs.stat.is_set(sspstat::CKE) {
                self.shift_out(ctx);
            }
        }
    }

    fn sample_late(&self, regs: &SspRegs) -> bool {
        self.master && regs.stat.is_set(sspstat::SMP)
    }

    fn leading_edge(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        let cke = regs.stat.is_set(sspstat::CKE);
        match (cke, self.sample_late(regs)) {
            (false, false) => self.shift_out(ctx),
            (false, true) => {
                if self.out_bits > 0 {
                    self.sample(ctx);
                }
                self.shift_out(ctx);
            }
            (true, false) => self.sample(ctx),
            (true, true) => {}
        }
    }

    fn trailing_edge(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        let cke = regs.stat.is_set(sspstat::CKE);
        match (cke, self.sample_late(regs)) {
            (false, false) => self.sample(ctx),
            (false, true) => {
                if self.out_bits == 8 {
                    self.state = SpiState::WaitingForLastSample;
                }
            }
            (true, false) => {
                if self.bits < 8 {
                    self.shift_out(ctx);
                }
            }
            (true, true) => {
                self.sample(ctx);
                if self.bits < 8 {
                    self.shift_out(ctx);
                }
            }
        }
        if self.bits == 8 {
            self.complete(regs, ctx);
        }
    }

    fn shift_out(&mut self, ctx: &mut SimContext) {
        drive(ctx, Signal::Sdo, Drive::Digital(self.sr & 0x80 != 0));
        self.out_bits += 1;
    }

    fn sample(&mut self, ctx: &mut SimContext) {
        let bit = level(ctx, Signal::Sdi) as u8;
        self.sr = (self.sr << 1) | bit;
        self.bits += 1;
    }

    fn complete(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        self.state = SpiState::Idle;
        self.bits = 0;
        self.out_bits = 0;
        self.clock_active = false;
        if regs.receive(self.sr) {
            ctx.raise(regs.sspif);
        } else {
            tracing::debug!(sr = self.sr, "SPI: receive overflow");
        }
    }
}
