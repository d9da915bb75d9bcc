//! Timer0 and Timer2
//!
//! Both timers are evaluated lazily: the count is derived from the cycle
//! counter relative to an origin, and the next overflow (Timer0) or period
//! match (Timer2) is scheduled on the trigger queue. Any write that changes
//! the rate rebases the origin first.
//!
//! Timer0 counts instruction cycles (T0CS=0) or T0CKI edges (T0CS=1),
//! through the prescaler when PSA=0. A write to TMR0 inhibits counting for
//! the next two cycles. Timer2 counts through a 1/4/16 prescaler up to PR2,
//! then resets and clocks the postscaler; each match is also returned to the
//! caller so it can clock the SSP.
//!
//! Both stop while the part sleeps.

use crate::context::SimContext;
use crate::peripherals::interrupt::InterruptSource;
use crate::register::{Peripheral, ResetType, Sfr};
use crate::scheduler::EventId;

/// OPTION register bits
pub mod option {
    pub const RBPU: u8 = 0x80;
    pub const INTEDG: u8 = 0x40;
    pub const T0CS: u8 = 0x20;
    pub const T0SE: u8 = 0x10;
    pub const PSA: u8 = 0x08;
    pub const PS_MASK: u8 = 0x07;
}

/// T2CON bits
pub mod t2con {
    pub const TOUTPS_MASK: u8 = 0x78;
    pub const TMR2ON: u8 = 0x04;
    pub const T2CKPS_MASK: u8 = 0x03;
}

/// Cycles TMR0 holds its value after a write
const TMR0_WRITE_INHIBIT: u64 = 2;

/// Registers owned by the timer block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerReg {
    Tmr0,
    Option,
    Tmr2,
    T2con,
    Pr2,
}

#[derive(Debug, Clone)]
pub struct Timer0 {
    /// Count at `origin`
    tmr0: Sfr,
    option: Sfr,
    /// Cycle the current count was taken at
    origin: u64,
    /// Prescaler ticks accumulated at `origin` (count * prescale + residue)
    origin_ticks: u64,
    /// External clock prescaler residue
    ext_ticks: u64,
    frozen: bool,
}

impl Timer0 {
    pub fn new() -> Self {
        Self {
            tmr0: Sfr::new(0x00, 0xFF).with_reset(0x00, 0xFF),
            option: Sfr::new(0xFF, 0xFF),
            origin: 0,
            origin_ticks: 0,
            ext_ticks: 0,
            frozen: false,
        }
    }

    pub fn option(&self) -> u8 {
        self.option.get()
    }

    /// Prescaler ratio seen by Timer0 (1 when assigned to the watchdog)
    pub fn prescale(&self) -> u64 {
        if self.option.is_set(option::PSA) {
            1
        } else {
            2 << (self.option.get() & option::PS_MASK)
        }
    }

    fn external(&self) -> bool {
        self.option.is_set(option::T0CS)
    }

    fn counting(&self) -> bool {
        !self.external() && !self.frozen
    }

    fn ticks_at(&self, now: u64) -> u64 {
        self.origin_ticks + now.saturating_sub(self.origin)
    }

    pub fn value(&self, now: u64) -> u8 {
        if !self.counting() {
            return self.tmr0.get();
        }
        (self.ticks_at(now) / self.prescale()) as u8
    }

    /// Fold elapsed cycles into the origin
    fn sync(&mut self, now: u64) {
        if self.counting() && now > self.origin {
            let period = 256 * self.prescale();
            self.origin_ticks = self.ticks_at(now) % period;
            self.origin = now;
        }
        if self.counting() {
            self.tmr0.put_value((self.origin_ticks / self.prescale()) as u8);
        }
    }

    fn schedule(&self, ctx: &mut SimContext) {
        if self.counting() {
            let period = 256 * self.prescale();
            let at = self.origin + (period - self.origin_ticks % period);
            ctx.queue.schedule(EventId::Timer0, at);
        } else {
            ctx.cancel(EventId::Timer0);
        }
    }

    /// Restart counting at `now` from the stored count, prescaler cleared
    fn rebase(&mut self, now: u64, ctx: &mut SimContext) {
        self.origin = self.origin.max(now);
        self.origin_ticks = self.tmr0.get() as u64 * self.prescale();
        self.schedule(ctx);
    }

    fn write_tmr0(&mut self, value: u8, ctx: &mut SimContext) {
        self.tmr0.put_value(value);
        self.ext_ticks = 0;
        self.origin = ctx.now() + TMR0_WRITE_INHIBIT;
        self.origin_ticks = value as u64 * self.prescale();
        self.schedule(ctx);
    }

    fn write_option(&mut self, value: u8, ctx: &mut SimContext) {
        let now = ctx.now();
        self.sync(now);
        self.option.put(value);
        self.rebase(now, ctx);
    }

    /// Trigger callback: TMR0 rolled over
    pub fn on_overflow(&mut self, ctx: &mut SimContext) {
        self.tmr0.put_value(0);
        self.origin = ctx.now();
        self.origin_ticks = 0;
        ctx.raise(InterruptSource::T0IF);
        self.schedule(ctx);
    }

    /// T0CKI level change
    pub fn on_t0cki(&mut self, level: bool, ctx: &mut SimContext) {
        if !self.external() || self.frozen {
            return;
        }
        let falling_edge = self.option.is_set(option::T0SE);
        if level == falling_edge {
            return;
        }
        self.ext_ticks += 1;
        if self.ext_ticks >= self.prescale() {
            self.ext_ticks = 0;
            let next = self.tmr0.get().wrapping_add(1);
            self.tmr0.put_value(next);
            if next == 0 {
                ctx.raise(InterruptSource::T0IF);
            }
        }
    }

    pub fn set_frozen(&mut self, frozen: bool, ctx: &mut SimContext) {
        if frozen == self.frozen {
            return;
        }
        let now = ctx.now();
        if frozen {
            self.sync(now);
            self.frozen = true;
            ctx.cancel(EventId::Timer0);
        } else {
            self.frozen = false;
            self.origin = now;
            self.schedule(ctx);
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        let now = ctx.now();
        self.sync(now);
        self.tmr0.reset(kind);
        self.option.reset(kind);
        self.ext_ticks = 0;
        self.frozen = false;
        self.origin = now;
        self.rebase(now, ctx);
    }
}

impl Default for Timer0 {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Timer2 {
    /// Count at `origin`
    tmr2: Sfr,
    t2con: Sfr,
    pr2: Sfr,
    origin: u64,
    /// Prescaler residue at `origin`
    origin_ticks: u64,
    postscaler: u8,
    frozen: bool,
    tmr2if: InterruptSource,
}

impl Timer2 {
    pub fn new(tmr2if: InterruptSource) -> Self {
        Self {
            tmr2: Sfr::new(0x00, 0xFF),
            t2con: Sfr::new(0x00, 0x7F),
            pr2: Sfr::new(0xFF, 0xFF),
            origin: 0,
            origin_ticks: 0,
            postscaler: 0,
            frozen: false,
            tmr2if,
        }
    }

    pub fn prescale(&self) -> u64 {
        match self.t2con.get() & t2con::T2CKPS_MASK {
            0 => 1,
            1 => 4,
            _ => 16,
        }
    }

    fn postscale(&self) -> u8 {
        ((self.t2con.get() & t2con::TOUTPS_MASK) >> 3) + 1
    }

    fn counting(&self) -> bool {
        self.t2con.is_set(t2con::TMR2ON) && !self.frozen
    }

    fn increments_at(&self, now: u64) -> u64 {
        (self.origin_ticks + now.saturating_sub(self.origin)) / self.prescale()
    }

    pub fn value(&self, now: u64) -> u8 {
        if !self.counting() {
            return self.tmr2.get();
        }
        (self.tmr2.get() as u64 + self.increments_at(now)) as u8
    }

    pub fn period_register(&self) -> u8 {
        self.pr2.get()
    }

    fn sync(&mut self, now: u64) {
        if self.counting() && now > self.origin {
            let ticks = self.origin_ticks + (now - self.origin);
            let inc = ticks / self.prescale();
            self.tmr2.put_value((self.tmr2.get() as u64 + inc) as u8);
            self.origin_ticks = ticks % self.prescale();
        }
        self.origin = now;
    }

    fn schedule(&self, ctx: &mut SimContext) {
        if !self.counting() {
            ctx.cancel(EventId::Timer2);
            return;
        }
        let v = self.tmr2.get() as u64;
        let pr = self.pr2.get() as u64;
        // Counts past 0xFF wrap to 0 when TMR2 starts above PR2
        let steps = if v <= pr { pr - v } else { 256 - v + pr };
        let at = self.origin + (steps + 1) * self.prescale() - self.origin_ticks;
        ctx.queue.schedule(EventId::Timer2, at);
    }

    /// Trigger callback: TMR2 matched PR2. Always returns true so the caller
    /// can clock the SSP from the match.
    pub fn on_match(&mut self, ctx: &mut SimContext) -> bool {
        self.tmr2.put_value(0);
        self.origin = ctx.now();
        self.origin_ticks = 0;
        self.postscaler += 1;
        if self.postscaler >= self.postscale() {
            self.postscaler = 0;
            ctx.raise(self.tmr2if);
        }
        self.schedule(ctx);
        true
    }

    fn write(&mut self, reg: TimerReg, value: u8, ctx: &mut SimContext) {
        self.sync(ctx.now());
        match reg {
            TimerReg::Tmr2 => {
                self.tmr2.put(value);
                self.origin_ticks = 0;
                self.postscaler = 0;
            }
            TimerReg::T2con => {
                self.t2con.put(value);
                self.origin_ticks = 0;
                self.postscaler = 0;
            }
            TimerReg::Pr2 => self.pr2.put(value),
            _ => {}
        }
        self.schedule(ctx);
    }

    pub fn set_frozen(&mut self, frozen: bool, ctx: &mut SimContext) {
        if frozen == self.frozen {
            return;
        }
        if frozen {
            self.sync(ctx.now());
            self.frozen = true;
            ctx.cancel(EventId::Timer2);
        } else {
            self.frozen = false;
            self.origin = ctx.now();
            self.schedule(ctx);
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        self.tmr2.reset(kind);
        self.t2con.reset(kind);
        self.pr2.reset(kind);
        self.origin = ctx.now();
        self.origin_ticks = 0;
        self.postscaler = 0;
        self.frozen = false;
        ctx.cancel(EventId::Timer2);
    }
}

/// Timer0 plus the optional Timer2 of the part
#[derive(Debug, Clone, Default)]
pub struct Timers {
    pub t0: Timer0,
    pub t2: Option<Timer2>,
}

impl Timers {
    pub fn new(tmr2if: Option<InterruptSource>) -> Self {
        Self {
            t0: Timer0::new(),
            t2: tmr2if.map(Timer2::new),
        }
    }

    pub fn option(&self) -> u8 {
        self.t0.option()
    }

    pub fn set_frozen(&mut self, frozen: bool, ctx: &mut SimContext) {
        self.t0.set_frozen(frozen, ctx);
        if let Some(t2) = &mut self.t2 {
            t2.set_frozen(frozen, ctx);
        }
    }

    /// Dispatch a due trigger; returns true on a Timer2 match
    pub fn on_event(&mut self, event: EventId, ctx: &mut SimContext) -> bool {
        match event {
            EventId::Timer0 => {
                self.t0.on_overflow(ctx);
                false
            }
            EventId::Timer2 => self.t2.as_mut().map(|t2| t2.on_match(ctx)).unwrap_or(false),
            _ => false,
        }
    }
}

impl Peripheral for Timers {
    type Reg = TimerReg;

    fn peek(&self, reg: TimerReg, ctx: &SimContext) -> u8 {
        let now = ctx.now();
        match reg {
            TimerReg::Tmr0 => self.t0.value(now),
            TimerReg::Option => self.t0.option(),
            TimerReg::Tmr2 => self.t2.as_ref().map(|t| t.value(now)).unwrap_or(0),
            TimerReg::T2con => self.t2.as_ref().map(|t| t.t2con.get()).unwrap_or(0),
            TimerReg::Pr2 => self.t2.as_ref().map(|t| t.pr2.get()).unwrap_or(0),
        }
    }

    fn put(&mut self, reg: TimerReg, value: u8, ctx: &mut SimContext) {
        match reg {
            TimerReg::Tmr0 => self.t0.write_tmr0(value, ctx),
            TimerReg::Option => self.t0.write_option(value, ctx),
            _ => {
                if let Some(t2) = &mut self.t2 {
                    t2.write(reg, value, ctx);
                }
            }
        }
    }

    fn put_value(&mut self, reg: TimerReg, value: u8, ctx: &mut SimContext) {
        match reg {
            TimerReg::Tmr0 => self.t0.write_tmr0(value, ctx),
            TimerReg::Option => {
                self.t0.option.put_value(value);
                let now = ctx.now();
                self.t0.rebase(now, ctx);
            }
            _ => {
                if let Some(t2) = &mut self.t2 {
                    t2.write(reg, value, ctx);
                }
            }
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        self.t0.reset(kind, ctx);
        if let Some(t2) = &mut self.t2 {
            t2.reset(kind, ctx);
        }
    }
}
