//! Watchdog timer
//!
//! The watchdog runs from its own RC oscillator, so it keeps counting while
//! the core sleeps. A timeout while awake resets the part (TO=0); while
//! asleep it wakes it instead. CLRWDT and SLEEP restart the count.
//!
//! Parts with a fixed ~18 ms base period use the OPTION postscaler when
//! PSA=1. Parts with WDTCON derive the period from the 31 kHz LFINTOSC and
//! the WDTPS prescaler, and let firmware enable the timer through SWDTEN
//! when the configuration word leaves it off.

use crate::context::SimContext;
use crate::register::{Peripheral, ResetType, Sfr};
use crate::scheduler::EventId;

/// Nominal base period of the fixed watchdog
pub const WDT_BASE_PERIOD: f64 = 0.018;
/// LFINTOSC frequency clocking WDTCON parts
pub const LFINTOSC_HZ: f64 = 31_000.0;

/// WDTCON bits
pub mod wdtcon {
    pub const SWDTEN: u8 = 0x01;
    pub const WDTPS_MASK: u8 = 0x1E;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WdtKind {
    /// 18 ms base, OPTION postscaler
    Fixed,
    /// LFINTOSC with WDTCON prescaler
    Wdtcon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WdtReg {
    Wdtcon,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    kind: WdtKind,
    wdtcon: Sfr,
    /// WDTE from the configuration word
    config_enable: bool,
    /// OPTION postscaler ratio (1 when the prescaler belongs to Timer0)
    postscale: u32,
}

impl Watchdog {
    pub fn new(kind: WdtKind) -> Self {
        Self {
            kind,
            wdtcon: Sfr::new(0x08, 0x1F),
            config_enable: false,
            postscale: 1,
        }
    }

    pub fn kind(&self) -> WdtKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.config_enable || (self.kind == WdtKind::Wdtcon && self.wdtcon.is_set(wdtcon::SWDTEN))
    }

    /// Timeout period in seconds
    pub fn period(&self) -> f64 {
        let base = match self.kind {
            WdtKind::Fixed => WDT_BASE_PERIOD,
            WdtKind::Wdtcon => {
                let ps = (self.wdtcon.get() & wdtcon::WDTPS_MASK) >> 1;
                (32u64 << ps.min(11)) as f64 / LFINTOSC_HZ
            }
        };
        base * self.postscale as f64
    }

    /// Apply the configuration word enable
    pub fn configure(&mut self, enabled: bool, ctx: &mut SimContext) {
        self.config_enable = enabled;
        self.clear(ctx);
    }

    /// Follow OPTION PSA/PS
    pub fn set_option(&mut self, option: u8, ctx: &mut SimContext) {
        use crate::peripherals::timer::option::{PSA, PS_MASK};
        let postscale = if option & PSA != 0 {
            1 << (option & PS_MASK)
        } else {
            1
        };
        if postscale != self.postscale {
            self.postscale = postscale;
            self.clear(ctx);
        }
    }

    /// CLRWDT / SLEEP: restart the count
    pub fn clear(&mut self, ctx: &mut SimContext) {
        if self.is_enabled() {
            let cycles = ctx.seconds_to_cycles(self.period());
            ctx.schedule_in(EventId::Watchdog, cycles);
        } else {
            ctx.cancel(EventId::Watchdog);
        }
    }

    /// Trigger callback
    pub fn on_timeout(&mut self, ctx: &mut SimContext) {
        if !self.is_enabled() {
            return;
        }
        if ctx.is_sleeping() {
            tracing::debug!(cycle = ctx.now(), "WDT: wake from sleep");
            ctx.request_watchdog_wake();
            self.clear(ctx);
        } else {
            tracing::debug!(cycle = ctx.now(), "WDT: timeout reset");
            ctx.request_reset(ResetType::Watchdog);
        }
    }
}

impl Peripheral for Watchdog {
    type Reg = WdtReg;

    fn peek(&self, _reg: WdtReg, _ctx: &SimContext) -> u8 {
        self.wdtcon.get()
    }

    fn put(&mut self, _reg: WdtReg, value: u8, ctx: &mut SimContext) {
        self.wdtcon.put(value);
        self.clear(ctx);
    }

    fn put_value(&mut self, _reg: WdtReg, value: u8, ctx: &mut SimContext) {
        self.wdtcon.put_value(value);
        self.clear(ctx);
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        self.wdtcon.reset(kind);
        self.postscale = 1;
        ctx.cancel(EventId::Watchdog);
        self.clear(ctx);
    }
}
