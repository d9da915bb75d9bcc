//! Cycle scheduler (trigger queue)
//!
//! Peripherals that need to act N instruction cycles in the future schedule
//! an [`EventId`] at an absolute cycle count. The processor loop advances the
//! queue once per elapsed cycle and hands each due event back to the module
//! that owns it.
//!
//! Ordering is by target cycle, then by insertion sequence, so two events
//! landing on the same cycle fire in the order they were scheduled. Each
//! event id has at most one pending entry: scheduling an id that is already
//! pending moves it (cancel-before-reschedule).

use std::collections::BTreeMap;

/// Event identifiers for scheduled callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventId {
    /// EEPROM / flash write completion
    EepromWrite = 0,
    /// Two-cycle program memory read
    EepromRead = 1,
    /// SSP bit clock (SPI master half period, I2C baud generator)
    SspClock = 2,
    /// USART transmit bit time
    UsartTx = 3,
    /// USART receive sample point
    UsartRx = 4,
    /// ADC conversion complete
    AdcConversion = 5,
    /// Timer0 overflow
    Timer0 = 6,
    /// Timer2 period match
    Timer2 = 7,
    /// Watchdog timeout
    Watchdog = 8,
}

impl EventId {
    /// Number of event types
    pub const COUNT: usize = 9;

    pub const ALL: [EventId; Self::COUNT] = [
        EventId::EepromWrite,
        EventId::EepromRead,
        EventId::SspClock,
        EventId::UsartTx,
        EventId::UsartRx,
        EventId::AdcConversion,
        EventId::Timer0,
        EventId::Timer2,
        EventId::Watchdog,
    ];
}

/// Snapshot of a scheduling pass.
///
/// Captures the cycle being processed and the sequence number boundary:
/// entries inserted after the pass began are left for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    cycle: u64,
    seq_limit: u64,
}

/// Future-ordered event queue keyed by absolute cycle count
#[derive(Debug, Clone)]
pub struct TriggerQueue {
    /// Pending entries keyed by (cycle, insertion sequence)
    entries: BTreeMap<(u64, u64), EventId>,
    /// Key of the pending entry for each event id
    slots: [Option<(u64, u64)>; EventId::COUNT],
    /// Next insertion sequence number
    next_seq: u64,
    /// Cycle reached by the last pass
    now: u64,
}

impl TriggerQueue {
    /// Create an empty queue at cycle 0
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            slots: [None; EventId::COUNT],
            next_seq: 0,
            now: 0,
        }
    }

    /// Drop every pending entry and rewind to cycle 0
    pub fn reset(&mut self) {
        self.clear();
        self.now = 0;
    }

    /// Drop every pending entry, keeping the current cycle
    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots = [None; EventId::COUNT];
    }

    /// Cycle reached by the most recent pass
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `event` to fire at absolute cycle `at`.
    ///
    /// A target at or before the current cycle fires on the next pass.
    pub fn schedule(&mut self, event: EventId, at: u64) {
        self.cancel(event);
        let key = (at, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, event);
        self.slots[event as usize] = Some(key);
    }

    /// Schedule `event` `delay` cycles after `from`
    pub fn schedule_in(&mut self, event: EventId, from: u64, delay: u64) {
        self.schedule(event, from.saturating_add(delay));
    }

    /// Remove a pending event. Cancelling an absent event is a no-op.
    pub fn cancel(&mut self, event: EventId) {
        if let Some(key) = self.slots[event as usize].take() {
            self.entries.remove(&key);
        }
    }

    /// Check if an event is pending
    pub fn is_pending(&self, event: EventId) -> bool {
        self.slots[event as usize].is_some()
    }

    /// Target cycle of a pending event
    pub fn when(&self, event: EventId) -> Option<u64> {
        self.slots[event as usize].map(|(cycle, _)| cycle)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending target cycle
    pub fn next_cycle(&self) -> Option<u64> {
        self.entries.keys().next().map(|(cycle, _)| *cycle)
    }

    /// Begin a pass over everything due at or before `cycle`
    pub fn pass(&mut self, cycle: u64) -> Pass {
        self.now = self.now.max(cycle);
        Pass {
            cycle,
            seq_limit: self.next_seq,
        }
    }

    /// Remove and return the next event due in `pass`
    pub fn pop_due(&mut self, pass: &Pass) -> Option<EventId> {
        let key = self
            .entries
            .range(..=(pass.cycle, u64::MAX))
            .find(|((_, seq), _)| *seq < pass.seq_limit)
            .map(|(key, _)| *key)?;
        let event = self.entries.remove(&key)?;
        self.slots[event as usize] = None;
        Some(event)
    }

    /// Fire every event due at or before `to_cycle`, in order.
    ///
    /// Each entry is removed before `fire` runs; `fire` receives the queue so
    /// it can reschedule.
    pub fn advance<F>(&mut self, to_cycle: u64, mut fire: F)
    where
        F: FnMut(&mut TriggerQueue, EventId),
    {
        let pass = self.pass(to_cycle);
        while let Some(event) = self.pop_due(&pass) {
            fire(self, event);
        }
    }
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new()
    }
}
