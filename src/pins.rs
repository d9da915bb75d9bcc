//! Pin and signal layer
//!
//! Each package pin resolves its level from, in priority order:
//! 1. the most recently attached peripheral source (if any is attached),
//! 2. the port driver (TRIS output with the latch value),
//! 3. the external stimulus set by the board,
//! 4. the weak pull-up,
//! 5. otherwise it floats and reads low.
//!
//! A peripheral source that is attached but released (open-drain high, or an
//! I2C line let go) hides the port driver and falls through to 3–5, which is
//! how wired-AND buses behave.
//!
//! Whenever a pin's resolved digital level or voltage changes, a
//! [`PinEvent`] is queued. The processor drains the queue after each register
//! access and trigger, delivering events to the sinks registered on the pin.

use crate::pps::Signal;
use std::collections::VecDeque;

/// Zero-based pin index (package pin number minus one)
pub type PinId = usize;

/// Sink bit for the I/O port block (interrupt-on-change, INT pin)
pub const SINK_PORT: u32 = 1 << 30;
/// Sink bit for analog listeners (comparators)
pub const SINK_ANALOG: u32 = 1 << 31;

/// Electrical role of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    /// General purpose I/O (possibly with peripheral functions)
    Io,
    /// Input-only pin (RA5/MCLR style)
    Input,
    /// Supply
    Vdd,
    /// Ground
    Vss,
    /// Oscillator or otherwise not simulated
    NotConnected,
}

/// Drive state of one signal source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drive {
    /// Attached but not driving (high impedance)
    Released,
    Digital(bool),
    /// Analog output such as CVref
    Voltage(f64),
}

/// External stimulus applied by the board
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PinInput {
    /// Nothing connected
    #[default]
    Released,
    Digital(bool),
    Analog(f64),
}

/// Direction as seen by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Snapshot returned to board code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinValue {
    pub digital: bool,
    pub voltage: f64,
    pub direction: Direction,
    pub kind: PinKind,
    /// Pin is selected as an analog input (ANSEL)
    pub analog: bool,
}

/// Change notification for one pin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinEvent {
    pub pin: PinId,
    pub level: bool,
    pub voltage: f64,
    /// The digital level changed (false for voltage-only updates)
    pub edge: bool,
}

/// Static description of one package pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSpec {
    pub name: &'static str,
    pub kind: PinKind,
    /// Port output can only pull low
    pub open_drain: bool,
}

impl PinSpec {
    pub const fn io(name: &'static str) -> Self {
        Self {
            name,
            kind: PinKind::Io,
            open_drain: false,
        }
    }

    pub const fn open_drain(name: &'static str) -> Self {
        Self {
            name,
            kind: PinKind::Io,
            open_drain: true,
        }
    }

    pub const fn input(name: &'static str) -> Self {
        Self {
            name,
            kind: PinKind::Input,
            open_drain: false,
        }
    }

    pub const fn vdd() -> Self {
        Self {
            name: "VDD",
            kind: PinKind::Vdd,
            open_drain: false,
        }
    }

    pub const fn vss() -> Self {
        Self {
            name: "VSS",
            kind: PinKind::Vss,
            open_drain: false,
        }
    }

    pub const fn nc(name: &'static str) -> Self {
        Self {
            name,
            kind: PinKind::NotConnected,
            open_drain: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Pin {
    spec: PinSpec,
    /// Attached peripheral sources, oldest first
    sources: Vec<(Signal, Drive)>,
    /// Port driver: `Some(level)` when TRIS selects output
    port_drive: Option<bool>,
    stimulus: PinInput,
    pull_up: bool,
    analog_select: bool,
    sinks: u32,
    level: bool,
    voltage: f64,
}

impl Pin {
    fn new(spec: PinSpec) -> Self {
        Self {
            spec,
            sources: Vec::new(),
            port_drive: None,
            stimulus: PinInput::Released,
            pull_up: false,
            analog_select: false,
            sinks: 0,
            level: false,
            voltage: 0.0,
        }
    }

    fn active_drive(&self) -> Drive {
        if let Some(&(_, drive)) = self.sources.last() {
            return drive;
        }
        match self.port_drive {
            Some(true) if self.spec.open_drain => Drive::Released,
            Some(level) => Drive::Digital(level),
            None => Drive::Released,
        }
    }

    fn resolve(&self, vdd: f64) -> (bool, f64) {
        match self.spec.kind {
            PinKind::Vdd => return (true, vdd),
            PinKind::Vss | PinKind::NotConnected => return (false, 0.0),
            PinKind::Io | PinKind::Input => {}
        }
        match self.active_drive() {
            Drive::Digital(level) => (level, if level { vdd } else { 0.0 }),
            Drive::Voltage(v) => (v > vdd * 0.5, v),
            Drive::Released => match self.stimulus {
                PinInput::Digital(level) => (level, if level { vdd } else { 0.0 }),
                PinInput::Analog(v) => (v > vdd * 0.5, v),
                PinInput::Released if self.pull_up => (true, vdd),
                PinInput::Released => (false, 0.0),
            },
        }
    }

    fn is_output(&self) -> bool {
        !matches!(self.active_drive(), Drive::Released)
    }
}

/// All pins of one package plus the pending change events
#[derive(Debug, Clone)]
pub struct PinBank {
    pins: Vec<Pin>,
    events: VecDeque<PinEvent>,
    vdd: f64,
}

impl PinBank {
    pub fn new(specs: &[PinSpec], vdd: f64) -> Self {
        let mut bank = Self {
            pins: specs.iter().copied().map(Pin::new).collect(),
            events: VecDeque::new(),
            vdd,
        };
        for pin in 0..bank.pins.len() {
            let (level, voltage) = bank.pins[pin].resolve(vdd);
            bank.pins[pin].level = level;
            bank.pins[pin].voltage = voltage;
        }
        bank
    }

    /// Detach every source, clear drivers and pending events.
    /// Sinks and board stimulus survive: they belong to the wiring.
    pub fn reset(&mut self) {
        for p in &mut self.pins {
            p.sources.clear();
            p.port_drive = None;
            p.pull_up = false;
            p.analog_select = false;
        }
        for pin in 0..self.pins.len() {
            self.update(pin);
        }
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn vdd(&self) -> f64 {
        self.vdd
    }

    pub fn set_vdd(&mut self, vdd: f64) {
        self.vdd = vdd;
        for pin in 0..self.pins.len() {
            self.update(pin);
        }
    }

    pub fn name(&self, pin: PinId) -> &'static str {
        self.pins.get(pin).map(|p| p.spec.name).unwrap_or("?")
    }

    pub fn kind(&self, pin: PinId) -> Option<PinKind> {
        self.pins.get(pin).map(|p| p.spec.kind)
    }

    /// Resolved digital level
    #[inline]
    pub fn level(&self, pin: PinId) -> bool {
        self.pins.get(pin).map(|p| p.level).unwrap_or(false)
    }

    /// Resolved voltage
    #[inline]
    pub fn voltage(&self, pin: PinId) -> f64 {
        self.pins.get(pin).map(|p| p.voltage).unwrap_or(0.0)
    }

    pub fn is_analog(&self, pin: PinId) -> bool {
        self.pins.get(pin).map(|p| p.analog_select).unwrap_or(false)
    }

    pub fn value(&self, pin: PinId) -> Option<PinValue> {
        let p = self.pins.get(pin)?;
        Some(PinValue {
            digital: p.level,
            voltage: p.voltage,
            direction: if p.is_output() {
                Direction::Output
            } else {
                Direction::Input
            },
            kind: p.spec.kind,
            analog: p.analog_select,
        })
    }

    /// Update the port driver (`None` = TRIS input)
    pub fn set_port_drive(&mut self, pin: PinId, drive: Option<bool>) {
        if let Some(p) = self.pins.get_mut(pin) {
            if p.port_drive != drive {
                p.port_drive = drive;
                self.update(pin);
            }
        }
    }

    pub fn port_drive(&self, pin: PinId) -> Option<bool> {
        self.pins.get(pin).and_then(|p| p.port_drive)
    }

    /// Attach `signal` as a source on `pin`. Re-attaching moves it on top.
    pub fn attach_source(&mut self, pin: PinId, signal: Signal, drive: Drive) {
        if let Some(p) = self.pins.get_mut(pin) {
            p.sources.retain(|(s, _)| *s != signal);
            p.sources.push((signal, drive));
            self.update(pin);
        }
    }

    /// Change the drive of an attached source; no-op when not attached
    pub fn drive(&mut self, pin: PinId, signal: Signal, drive: Drive) {
        if let Some(p) = self.pins.get_mut(pin) {
            let mut changed = false;
            for entry in p.sources.iter_mut().filter(|(s, _)| *s == signal) {
                if entry.1 != drive {
                    entry.1 = drive;
                    changed = true;
                }
            }
            if changed {
                self.update(pin);
            }
        }
    }

    pub fn release_source(&mut self, pin: PinId, signal: Signal) {
        if let Some(p) = self.pins.get_mut(pin) {
            let before = p.sources.len();
            p.sources.retain(|(s, _)| *s != signal);
            if p.sources.len() != before {
                self.update(pin);
            }
        }
    }

    pub fn source_drive(&self, pin: PinId, signal: Signal) -> Option<Drive> {
        self.pins
            .get(pin)?
            .sources
            .iter()
            .find(|(s, _)| *s == signal)
            .map(|(_, d)| *d)
    }

    /// Signal currently winning arbitration on `pin`
    pub fn active_source(&self, pin: PinId) -> Option<Signal> {
        self.pins.get(pin)?.sources.last().map(|(s, _)| *s)
    }

    pub fn attach_sink(&mut self, pin: PinId, bits: u32) {
        if let Some(p) = self.pins.get_mut(pin) {
            p.sinks |= bits;
        }
    }

    pub fn release_sink(&mut self, pin: PinId, bits: u32) {
        if let Some(p) = self.pins.get_mut(pin) {
            p.sinks &= !bits;
        }
    }

    #[inline]
    pub fn sinks(&self, pin: PinId) -> u32 {
        self.pins.get(pin).map(|p| p.sinks).unwrap_or(0)
    }

    pub fn set_stimulus(&mut self, pin: PinId, input: PinInput) {
        if let Some(p) = self.pins.get_mut(pin) {
            p.stimulus = input;
            self.update(pin);
        }
    }

    pub fn stimulus(&self, pin: PinId) -> PinInput {
        self.pins.get(pin).map(|p| p.stimulus).unwrap_or_default()
    }

    pub fn set_pull_up(&mut self, pin: PinId, on: bool) {
        if let Some(p) = self.pins.get_mut(pin) {
            if p.pull_up != on {
                p.pull_up = on;
                self.update(pin);
            }
        }
    }

    pub fn pull_up(&self, pin: PinId) -> bool {
        self.pins.get(pin).map(|p| p.pull_up).unwrap_or(false)
    }

    pub fn set_analog(&mut self, pin: PinId, on: bool) {
        if let Some(p) = self.pins.get_mut(pin) {
            p.analog_select = on;
        }
    }

    /// Next pending change event
    pub fn next_event(&mut self) -> Option<PinEvent> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn update(&mut self, pin: PinId) {
        let vdd = self.vdd;
        let p = &mut self.pins[pin];
        let (level, voltage) = p.resolve(vdd);
        let edge = level != p.level;
        let moved = (voltage - p.voltage).abs() > 1e-9;
        p.level = level;
        p.voltage = voltage;
        if edge || moved {
            self.events.push_back(PinEvent {
                pin,
                level,
                voltage,
                edge,
            });
        }
    }
}
