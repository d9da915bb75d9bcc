//! PIC mid-range peripheral modules
//!
//! This module contains the register-mapped peripherals:
//! - Interrupt controller (INTCON, PIRx/PIEx), held in the context
//! - I/O ports with analog select, pull-ups and interrupt-on-change
//! - Timer0 and Timer2
//! - Watchdog timer
//! - Data EEPROM and self-programming
//! - SSP/MSSP (SPI and I2C)
//! - USART/EUSART
//! - Comparators with the voltage reference
//! - 10-bit ADC
//!
//! [`Peripherals`] owns every module a part has and routes register
//! accesses, trigger callbacks and pin events to them. Cross-module links
//! (OPTION to the watchdog and ports, Timer2 match to the SSP, CVref to the
//! ADC) are wired here.

pub mod adc;
pub mod comparator;
pub mod eeprom;
pub mod i2c;
pub mod interrupt;
pub mod ports;
pub mod spi;
pub mod ssp;
pub mod timer;
pub mod usart;
pub mod watchdog;

pub use adc::Adc;
pub use comparator::Comparator;
pub use eeprom::{EeState, Eeprom};
pub use interrupt::{InterruptController, InterruptSource};
pub use ports::Ports;
pub use ssp::Ssp;
pub use timer::Timers;
pub use usart::Usart;
pub use watchdog::Watchdog;

use crate::chip::ChipDescriptor;
use crate::context::SimContext;
use crate::pins::{PinEvent, PinId, SINK_ANALOG, SINK_PORT};
use crate::pps::Signal;
use crate::register::{Peripheral, RegKind, ResetType};
use crate::scheduler::EventId;
use timer::TimerReg;

/// Pin events delivered per drain before the rest are dropped
const MAX_PIN_EVENTS: usize = 4096;

/// Signals whose pin changes are fed to a module
const INPUT_SIGNALS: [Signal; 7] = [
    Signal::Sck,
    Signal::Sdi,
    Signal::Ss,
    Signal::Scl,
    Signal::Sda,
    Signal::Rx,
    Signal::T0Cki,
];

/// Peripheral subsystem of one part
#[derive(Debug, Clone)]
pub struct Peripherals {
    pub ports: Ports,
    pub timers: Timers,
    pub watchdog: Watchdog,
    pub eeprom: Option<Eeprom>,
    pub ssp: Option<Ssp>,
    pub usart: Option<Usart>,
    pub comparator: Option<Comparator>,
    pub adc: Option<Adc>,
}

impl Peripherals {
    pub fn new(chip: &ChipDescriptor) -> Self {
        Self {
            ports: Ports::new(chip.ports, chip.analog, chip.ansel_por),
            timers: Timers::new(chip.tmr2if),
            watchdog: Watchdog::new(chip.watchdog),
            eeprom: chip.eeprom.map(Eeprom::new),
            ssp: chip.ssp.map(Ssp::new),
            usart: chip.usart.map(Usart::new),
            comparator: chip.comparator.map(Comparator::new),
            adc: chip.adc.map(Adc::new),
        }
    }

    /// Register every module's sinks on its pins
    pub fn attach(&self, ctx: &mut SimContext) {
        self.ports.attach(ctx);
        for signal in [Signal::Int, Signal::T0Cki] {
            if let Some(pin) = ctx.pin_of(signal) {
                ctx.pins.attach_sink(pin, signal.sink_bit());
            }
        }
        if let Some(ssp) = &self.ssp {
            ssp.attach(ctx);
        }
        if let Some(usart) = &self.usart {
            usart.attach(ctx);
        }
        if let Some(cmp) = &self.comparator {
            cmp.attach(ctx);
        }
    }

    /// Distribute a reset to every module
    pub fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        self.timers.reset(kind, ctx);
        self.ports.reset(kind, ctx);
        self.watchdog.reset(kind, ctx);
        let option = self.timers.option();
        self.watchdog.set_option(option, ctx);
        self.ports.set_option(option, ctx);
        if let Some(eeprom) = &mut self.eeprom {
            eeprom.reset(kind, ctx);
        }
        if let Some(ssp) = &mut self.ssp {
            ssp.reset(kind, ctx);
        }
        if let Some(usart) = &mut self.usart {
            usart.reset(kind, ctx);
        }
        if let Some(cmp) = &mut self.comparator {
            cmp.reset(kind, ctx);
        }
        if let Some(adc) = &mut self.adc {
            adc.reset(kind, ctx);
        }
    }

    /// Comparator reference voltage, 0 V on parts without one
    pub fn cvref(&self, ctx: &SimContext) -> f64 {
        self.comparator.as_ref().map(|c| c.cvref(ctx)).unwrap_or(0.0)
    }

    /// Read with side effects. `None` for registers this block does not own.
    pub fn read(&mut self, kind: RegKind, ctx: &mut SimContext) -> Option<u8> {
        Some(match kind {
            RegKind::Interrupt(reg) => ctx.irq.read(reg),
            RegKind::Timer(reg) => self.timers.get(reg, ctx),
            RegKind::Port(reg) => self.ports.get(reg, ctx),
            RegKind::Watchdog(reg) => self.watchdog.get(reg, ctx),
            RegKind::Eeprom(reg) => self.eeprom.as_mut()?.get(reg, ctx),
            RegKind::Ssp(reg) => self.ssp.as_mut()?.get(reg, ctx),
            RegKind::Usart(reg) => self.usart.as_mut()?.get(reg, ctx),
            RegKind::Comparator(reg) => self.comparator.as_mut()?.get(reg, ctx),
            RegKind::Adc(reg) => self.adc.as_mut()?.get(reg, ctx),
            _ => return None,
        })
    }

    /// Side-effect-free read
    pub fn peek(&self, kind: RegKind, ctx: &SimContext) -> Option<u8> {
        Some(match kind {
            RegKind::Interrupt(reg) => ctx.irq.read(reg),
            RegKind::Timer(reg) => self.timers.peek(reg, ctx),
            RegKind::Port(reg) => self.ports.peek(reg, ctx),
            RegKind::Watchdog(reg) => self.watchdog.peek(reg, ctx),
            RegKind::Eeprom(reg) => self.eeprom.as_ref()?.peek(reg, ctx),
            RegKind::Ssp(reg) => self.ssp.as_ref()?.peek(reg, ctx),
            RegKind::Usart(reg) => self.usart.as_ref()?.peek(reg, ctx),
            RegKind::Comparator(reg) => self.comparator.as_ref()?.peek(reg, ctx),
            RegKind::Adc(reg) => self.adc.as_ref()?.peek(reg, ctx),
            _ => return None,
        })
    }

    /// Masked write with side effects; returns false when not owned here
    pub fn write(&mut self, kind: RegKind, value: u8, ctx: &mut SimContext) -> bool {
        self.store(kind, value, false, ctx)
    }

    /// Raw write for debuggers and board code
    pub fn write_raw(&mut self, kind: RegKind, value: u8, ctx: &mut SimContext) -> bool {
        self.store(kind, value, true, ctx)
    }

    fn store(&mut self, kind: RegKind, value: u8, raw: bool, ctx: &mut SimContext) -> bool {
        fn put<P: Peripheral>(p: &mut P, reg: P::Reg, value: u8, raw: bool, ctx: &mut SimContext) {
            if raw {
                p.put_value(reg, value, ctx);
            } else {
                p.put(reg, value, ctx);
            }
        }

        match kind {
            RegKind::Interrupt(reg) => {
                if raw {
                    ctx.irq.write_raw(reg, value);
                } else {
                    ctx.irq.write(reg, value);
                }
            }
            RegKind::Timer(reg) => {
                put(&mut self.timers, reg, value, raw, ctx);
                if reg == TimerReg::Option {
                    let option = self.timers.option();
                    self.watchdog.set_option(option, ctx);
                    self.ports.set_option(option, ctx);
                }
            }
            RegKind::Port(reg) => put(&mut self.ports, reg, value, raw, ctx),
            RegKind::Watchdog(reg) => put(&mut self.watchdog, reg, value, raw, ctx),
            RegKind::Eeprom(reg) => match &mut self.eeprom {
                Some(m) => put(m, reg, value, raw, ctx),
                None => return false,
            },
            RegKind::Ssp(reg) => match &mut self.ssp {
                Some(m) => put(m, reg, value, raw, ctx),
                None => return false,
            },
            RegKind::Usart(reg) => match &mut self.usart {
                Some(m) => put(m, reg, value, raw, ctx),
                None => return false,
            },
            RegKind::Comparator(reg) => match &mut self.comparator {
                Some(m) => put(m, reg, value, raw, ctx),
                None => return false,
            },
            RegKind::Adc(reg) => match &mut self.adc {
                Some(m) => put(m, reg, value, raw, ctx),
                None => return false,
            },
            _ => return false,
        }
        true
    }

    /// Route a due trigger to its owner
    pub fn on_event(&mut self, event: EventId, ctx: &mut SimContext) {
        match event {
            EventId::EepromWrite | EventId::EepromRead => {
                if let Some(eeprom) = &mut self.eeprom {
                    eeprom.on_event(event, ctx);
                }
            }
            EventId::SspClock => {
                if let Some(ssp) = &mut self.ssp {
                    ssp.on_clock(ctx);
                }
            }
            EventId::UsartTx | EventId::UsartRx => {
                if let Some(usart) = &mut self.usart {
                    usart.on_event(event, ctx);
                }
            }
            EventId::AdcConversion => {
                let cvref = self.cvref(ctx);
                if let Some(adc) = &mut self.adc {
                    adc.on_event(event, cvref, ctx);
                }
            }
            EventId::Timer0 | EventId::Timer2 => {
                if self.timers.on_event(event, ctx) {
                    if let Some(ssp) = &mut self.ssp {
                        ssp.on_tmr2_match(ctx);
                    }
                }
            }
            EventId::Watchdog => self.watchdog.on_timeout(ctx),
        }
    }

    /// Deliver queued pin events to the sinks on each pin
    pub fn deliver_pin_events(&mut self, ctx: &mut SimContext) {
        let mut delivered = 0;
        while let Some(ev) = ctx.pins.next_event() {
            if delivered == MAX_PIN_EVENTS {
                let mut dropped = 1;
                while ctx.pins.next_event().is_some() {
                    dropped += 1;
                }
                tracing::warn!(dropped, cycle = ctx.now(), "pin event storm, dropping events");
                return;
            }
            delivered += 1;
            self.deliver(&ev, ctx);
        }
    }

    fn deliver(&mut self, ev: &PinEvent, ctx: &mut SimContext) {
        let sinks = ctx.pins.sinks(ev.pin);
        if sinks & SINK_ANALOG != 0 {
            if let Some(cmp) = &mut self.comparator {
                cmp.update(ctx);
            }
        }
        if !ev.edge {
            return;
        }
        if sinks & SINK_PORT != 0 {
            self.ports.on_pin_event(ev, ctx);
        }
        if sinks & Signal::Int.sink_bit() != 0 && ctx.pin_of(Signal::Int) == Some(ev.pin) {
            self.ports.on_int(ev.level, ctx);
        }
        for signal in INPUT_SIGNALS {
            if sinks & signal.sink_bit() == 0 || ctx.pin_of(signal) != Some(ev.pin) {
                continue;
            }
            match signal {
                Signal::Rx => {
                    if let Some(usart) = &mut self.usart {
                        usart.on_rx_edge(ev.level, ctx);
                    }
                }
                Signal::T0Cki => self.timers.t0.on_t0cki(ev.level, ctx),
                _ => {
                    if let Some(ssp) = &mut self.ssp {
                        ssp.on_signal(signal, ev.level, ctx);
                    }
                }
            }
        }
    }

    /// Core clock stopped or restarted
    pub fn set_sleeping(&mut self, sleeping: bool, ctx: &mut SimContext) {
        self.timers.set_frozen(sleeping, ctx);
    }

    /// Route `signal` to `pin`, carrying its source and sink along
    pub fn remap(&mut self, signal: Signal, pin: PinId, ctx: &mut SimContext) {
        let Some(old) = ctx.pps.assign(signal, pin) else {
            return;
        };
        if old == pin {
            return;
        }
        tracing::debug!(signal = signal.name(), from = old, to = pin, "PPS remap");
        if let Some(drive) = ctx.pins.source_drive(old, signal) {
            ctx.pins.release_source(old, signal);
            ctx.pins.attach_source(pin, signal, drive);
        }
        let bit = signal.sink_bit();
        if ctx.pins.sinks(old) & bit != 0 {
            ctx.pins.release_sink(old, bit);
            ctx.pins.attach_sink(pin, bit);
        }
        if signal == Signal::Int {
            self.ports.sync_int(ctx);
        }
    }
}
