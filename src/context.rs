//! Simulation context
//!
//! Everything a register access or trigger callback may touch besides its own
//! module: the cycle counter, the trigger queue, the pins, the PPS routing,
//! the interrupt controller and program memory. One context exists per
//! simulated part and is passed explicitly down the call chain.

use crate::memory::ProgramMemory;
use crate::peripherals::interrupt::{InterruptController, InterruptSource};
use crate::pins::{PinBank, PinId};
use crate::pps::{PpsMap, Signal};
use crate::register::ResetType;
use crate::scheduler::{EventId, TriggerQueue};

/// Electrical and clock parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Oscillator frequency (Fosc) in Hz
    pub clock_hz: u32,
    /// Supply voltage
    pub vdd: f64,
}

impl SimConfig {
    pub const DEFAULT_CLOCK_HZ: u32 = 4_000_000;
    pub const DEFAULT_VDD: f64 = 5.0;
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock_hz: Self::DEFAULT_CLOCK_HZ,
            vdd: Self::DEFAULT_VDD,
        }
    }
}

/// Processor activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Active,
    /// SLEEP executed, core clock stopped
    Sleeping,
    /// Stalled by a program memory write
    PmWrite,
    /// Held in reset by MCLR
    Reset,
}

/// Shared simulation state
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Instruction cycles since power-on
    pub cycles: u64,
    pub queue: TriggerQueue,
    pub pins: PinBank,
    pub pps: PpsMap,
    pub irq: InterruptController,
    pub program: ProgramMemory,
    pub config: SimConfig,
    pub activity: Activity,
    reset_request: Option<ResetType>,
    watchdog_wake: bool,
}

impl SimContext {
    pub fn new(
        pins: PinBank,
        pps: PpsMap,
        irq: InterruptController,
        program: ProgramMemory,
        config: SimConfig,
    ) -> Self {
        Self {
            cycles: 0,
            queue: TriggerQueue::new(),
            pins,
            pps,
            irq,
            program,
            config,
            activity: Activity::Active,
            reset_request: None,
            watchdog_wake: false,
        }
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.cycles
    }

    /// Schedule `event` `delay` cycles from now
    #[inline]
    pub fn schedule_in(&mut self, event: EventId, delay: u64) {
        self.queue.schedule(event, self.cycles + delay);
    }

    #[inline]
    pub fn cancel(&mut self, event: EventId) {
        self.queue.cancel(event);
    }

    #[inline]
    pub fn raise(&mut self, source: InterruptSource) {
        self.irq.raise(source);
    }

    #[inline]
    pub fn pin_of(&self, signal: Signal) -> Option<PinId> {
        self.pps.pin(signal)
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.activity == Activity::Sleeping
    }

    pub fn vdd(&self) -> f64 {
        self.config.vdd
    }

    /// Instruction cycle rate (Fosc/4)
    pub fn instruction_hz(&self) -> f64 {
        self.config.clock_hz as f64 / 4.0
    }

    /// Convert a duration to instruction cycles, at least one
    pub fn seconds_to_cycles(&self, seconds: f64) -> u64 {
        ((seconds * self.instruction_hz()).round() as u64).max(1)
    }

    /// Ask the processor to perform a reset after the current access
    pub fn request_reset(&mut self, kind: ResetType) {
        self.reset_request = Some(kind);
    }

    pub fn take_reset_request(&mut self) -> Option<ResetType> {
        self.reset_request.take()
    }

    /// Watchdog timed out while sleeping
    pub fn request_watchdog_wake(&mut self) {
        self.watchdog_wake = true;
    }

    pub fn take_watchdog_wake(&mut self) -> bool {
        std::mem::take(&mut self.watchdog_wake)
    }

    /// Bare context over `pins` for module tests
    #[cfg(test)]
    pub(crate) fn for_test(pins: &[crate::pins::PinSpec]) -> Self {
        Self::new(
            PinBank::new(pins, SimConfig::DEFAULT_VDD),
            PpsMap::default(),
            InterruptController::default(),
            ProgramMemory::new(2048, 0),
            SimConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::PinSpec;

    fn ctx() -> SimContext {
        SimContext::for_test(&[PinSpec::io("RA0")])
    }

    #[test]
    fn test_cycle_conversions() {
        let ctx = ctx();
        assert_eq!(ctx.instruction_hz(), 1_000_000.0);
        assert_eq!(ctx.seconds_to_cycles(0.018), 18_000);
        assert_eq!(ctx.seconds_to_cycles(0.0), 1);
    }

    #[test]
    fn test_schedule_relative_to_now() {
        let mut ctx = ctx();
        ctx.cycles = 100;
        ctx.schedule_in(EventId::EepromWrite, 20);
        assert_eq!(ctx.queue.when(EventId::EepromWrite), Some(120));
        ctx.cancel(EventId::EepromWrite);
        assert!(!ctx.queue.is_pending(EventId::EepromWrite));
    }

    #[test]
    fn test_reset_request_is_taken_once() {
        let mut ctx = ctx();
        ctx.request_reset(ResetType::Watchdog);
        assert_eq!(ctx.take_reset_request(), Some(ResetType::Watchdog));
        assert_eq!(ctx.take_reset_request(), None);
    }
}
