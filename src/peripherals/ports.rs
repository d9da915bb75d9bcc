//! I/O ports
//!
//! PORTx writes set the output latch; TRISx selects which latch bits drive
//! their pins. Reads return the resolved pin levels, with analog-selected
//! pins reading 0. The block also owns the analog select registers, the
//! weak pull-ups, interrupt-on-change and the external INT pin.
//!
//! Interrupt-on-change compares each enabled input against the value
//! latched by the last PORT read; a change that makes them differ sets
//! RBIF. Reading the port ends the mismatch.

use crate::context::SimContext;
use crate::peripherals::interrupt::InterruptSource;
use crate::peripherals::timer::option;
use crate::pins::{PinEvent, PinId, PinKind, SINK_PORT};
use crate::pps::Signal;
use crate::register::{Peripheral, ResetType, Sfr};

/// Port indices
pub const PORTA: u8 = 0;
pub const PORTB: u8 = 1;
pub const PORTC: u8 = 2;
pub const PORTD: u8 = 3;
pub const PORTE: u8 = 4;

/// Registers owned by the port block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReg {
    Port(u8),
    Tris(u8),
    /// Analog select for AN0-AN7
    Ansel,
    /// Analog select for AN8 and up
    Anselh,
    /// Weak pull-up enables
    Wpu(u8),
    /// Interrupt-on-change enables
    Ioc(u8),
}

/// Interrupt-on-change flavour of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IocMode {
    None,
    /// Hardwired bits (RB7:RB4 on older parts)
    Fixed(u8),
    /// Enabled per bit by an IOCx register
    Register,
}

/// Weak pull-up flavour of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullUpMode {
    None,
    /// Every input pin, gated by OPTION.RBPU
    Rbpu,
    /// Per-bit WPUx register, gated by OPTION.RBPU
    Wpu { por: u8 },
}

/// Static description of one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub name: char,
    /// Package pin of each bit
    pub pins: [Option<PinId>; 8],
    pub tris_por: u8,
    pub ioc: IocMode,
    pub pull_up: PullUpMode,
}

impl PortSpec {
    fn implemented(&self) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some())
            .fold(0, |m, (i, _)| m | (1 << i))
    }
}

#[derive(Debug, Clone)]
struct Port {
    spec: PortSpec,
    latch: Sfr,
    tris: Sfr,
    wpu: Sfr,
    ioc: Sfr,
    /// Levels captured by the last read, for change detection
    ioc_latch: u8,
}

impl Port {
    fn new(spec: PortSpec) -> Self {
        let implemented = spec.implemented();
        let wpu_por = match spec.pull_up {
            PullUpMode::Wpu { por } => por,
            _ => 0,
        };
        Self {
            spec,
            latch: Sfr::new(0x00, implemented).with_reset(0x00, 0xFF),
            tris: Sfr::new(spec.tris_por, implemented),
            wpu: Sfr::new(wpu_por, wpu_por),
            ioc: Sfr::new(0x00, implemented),
            ioc_latch: 0,
        }
    }

    fn ioc_mask(&self) -> u8 {
        match self.spec.ioc {
            IocMode::None => 0,
            IocMode::Fixed(mask) => mask,
            IocMode::Register => self.ioc.get(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ports {
    ports: Vec<Port>,
    /// ANx channel to pin
    analog: Vec<(u8, PinId)>,
    ansel: Sfr,
    anselh: Sfr,
    /// Last OPTION value (RBPU, INTEDG)
    option: u8,
    int_level: bool,
}

impl Ports {
    /// `ansel_por` is `None` on parts without ANSEL registers
    pub fn new(specs: &[PortSpec], analog: &[(u8, PinId)], ansel_por: Option<(u8, u8)>) -> Self {
        let (lo, hi) = ansel_por.unwrap_or((0, 0));
        Self {
            ports: specs.iter().copied().map(Port::new).collect(),
            analog: analog.to_vec(),
            ansel: Sfr::new(lo, lo),
            anselh: Sfr::new(hi, hi),
            option: 0xFF,
            int_level: false,
        }
    }

    /// Register the port block as a sink on every port pin
    pub fn attach(&self, ctx: &mut SimContext) {
        for port in &self.ports {
            for pin in port.spec.pins.iter().flatten() {
                ctx.pins.attach_sink(*pin, SINK_PORT);
            }
        }
    }

    /// Port and bit of a package pin
    pub fn locate(&self, pin: PinId) -> Option<(usize, u8)> {
        self.ports.iter().enumerate().find_map(|(i, port)| {
            port.spec
                .pins
                .iter()
                .position(|p| *p == Some(pin))
                .map(|bit| (i, bit as u8))
        })
    }

    pub fn pin_of(&self, port: u8, bit: u8) -> Option<PinId> {
        self.ports.get(port as usize)?.spec.pins.get(bit as usize).copied().flatten()
    }

    pub fn tris(&self, port: u8) -> u8 {
        self.ports.get(port as usize).map(|p| p.tris.get()).unwrap_or(0xFF)
    }

    fn pull_up_enabled(&self, port: &Port, bit: u8) -> bool {
        let input = port.tris.get() & (1 << bit) != 0;
        let global = self.option & option::RBPU == 0;
        input
            && global
            && match port.spec.pull_up {
                PullUpMode::None => false,
                PullUpMode::Rbpu => true,
                PullUpMode::Wpu { .. } => port.wpu.get() & (1 << bit) != 0,
            }
    }

    /// Push latch, direction and pull-up of one port onto its pins
    fn refresh(&self, index: usize, ctx: &mut SimContext) {
        let port = &self.ports[index];
        for (bit, pin) in port.spec.pins.iter().enumerate() {
            let Some(pin) = *pin else { continue };
            let bit = bit as u8;
            let output = port.tris.get() & (1 << bit) == 0;
            let drive = if output && ctx.pins.kind(pin) == Some(PinKind::Io) {
                Some(port.latch.get() & (1 << bit) != 0)
            } else {
                None
            };
            ctx.pins.set_port_drive(pin, drive);
            ctx.pins.set_pull_up(pin, self.pull_up_enabled(port, bit));
        }
    }

    fn refresh_all(&self, ctx: &mut SimContext) {
        for i in 0..self.ports.len() {
            self.refresh(i, ctx);
        }
    }

    fn apply_analog_select(&self, ctx: &mut SimContext) {
        let select = (self.anselh.get() as u16) << 8 | self.ansel.get() as u16;
        for &(channel, pin) in &self.analog {
            ctx.pins.set_analog(pin, select & (1 << channel) != 0);
        }
    }

    fn read_port(&self, index: usize, ctx: &SimContext) -> u8 {
        let port = &self.ports[index];
        port.spec
            .pins
            .iter()
            .enumerate()
            .fold(0u8, |v, (bit, pin)| match pin {
                Some(pin) if !ctx.pins.is_analog(*pin) && ctx.pins.level(*pin) => v | (1 << bit),
                _ => v,
            })
    }

    /// OPTION changed (RBPU, INTEDG)
    pub fn set_option(&mut self, value: u8, ctx: &mut SimContext) {
        if value == self.option {
            return;
        }
        self.option = value;
        self.refresh_all(ctx);
    }

    /// Change notification for a port pin
    pub fn on_pin_event(&mut self, ev: &PinEvent, ctx: &mut SimContext) {
        if !ev.edge || ctx.pins.is_analog(ev.pin) {
            return;
        }
        let Some((index, bit)) = self.locate(ev.pin) else {
            return;
        };
        let port = &self.ports[index];
        let mask = 1 << bit;
        let input = port.tris.get() & mask != 0;
        if input && port.ioc_mask() & mask != 0 {
            let latched = port.ioc_latch & mask != 0;
            if latched != ev.level {
                tracing::debug!(port = %port.spec.name, bit, "IOC mismatch");
                ctx.raise(InterruptSource::RBIF);
            }
        }
    }

    /// External interrupt pin level change
    pub fn on_int(&mut self, level: bool, ctx: &mut SimContext) {
        let previous = std::mem::replace(&mut self.int_level, level);
        if previous == level {
            return;
        }
        let rising = self.option & option::INTEDG != 0;
        if level == rising {
            ctx.raise(InterruptSource::INTF);
        }
    }

    /// Sample the INT pin without raising anything (after reset or remap)
    pub fn sync_int(&mut self, ctx: &SimContext) {
        if let Some(pin) = ctx.pin_of(Signal::Int) {
            self.int_level = ctx.pins.level(pin);
        }
    }
}

impl Peripheral for Ports {
    type Reg = PortReg;

    fn peek(&self, reg: PortReg, ctx: &SimContext) -> u8 {
        match reg {
            PortReg::Port(i) if (i as usize) < self.ports.len() => self.read_port(i as usize, ctx),
            PortReg::Tris(i) => self.ports.get(i as usize).map(|p| p.tris.get()).unwrap_or(0),
            PortReg::Wpu(i) => self.ports.get(i as usize).map(|p| p.wpu.get()).unwrap_or(0),
            PortReg::Ioc(i) => self.ports.get(i as usize).map(|p| p.ioc.get()).unwrap_or(0),
            PortReg::Ansel => self.ansel.get(),
            PortReg::Anselh => self.anselh.get(),
            PortReg::Port(_) => 0,
        }
    }

    /// PORT reads latch the current levels for change detection
    fn get(&mut self, reg: PortReg, ctx: &mut SimContext) -> u8 {
        let value = self.peek(reg, ctx);
        if let PortReg::Port(i) = reg {
            if let Some(port) = self.ports.get_mut(i as usize) {
                port.ioc_latch = value;
            }
        }
        value
    }

    fn put(&mut self, reg: PortReg, value: u8, ctx: &mut SimContext) {
        match reg {
            PortReg::Port(i) | PortReg::Tris(i) | PortReg::Wpu(i) | PortReg::Ioc(i) => {
                let Some(port) = self.ports.get_mut(i as usize) else {
                    return;
                };
                match reg {
                    PortReg::Port(_) => port.latch.put(value),
                    PortReg::Tris(_) => port.tris.put(value),
                    PortReg::Wpu(_) => port.wpu.put(value),
                    _ => port.ioc.put(value),
                }
                self.refresh(i as usize, ctx);
            }
            PortReg::Ansel => {
                self.ansel.put(value);
                self.apply_analog_select(ctx);
            }
            PortReg::Anselh => {
                self.anselh.put(value);
                self.apply_analog_select(ctx);
            }
        }
    }

    fn put_value(&mut self, reg: PortReg, value: u8, ctx: &mut SimContext) {
        match reg {
            PortReg::Port(i) | PortReg::Tris(i) | PortReg::Wpu(i) | PortReg::Ioc(i) => {
                let Some(port) = self.ports.get_mut(i as usize) else {
                    return;
                };
                match reg {
                    PortReg::Port(_) => port.latch.put_value(value),
                    PortReg::Tris(_) => port.tris.put_value(value),
                    PortReg::Wpu(_) => port.wpu.put_value(value),
                    _ => port.ioc.put_value(value),
                }
                self.refresh(i as usize, ctx);
            }
            PortReg::Ansel => {
                self.ansel.put_value(value);
                self.apply_analog_select(ctx);
            }
            PortReg::Anselh => {
                self.anselh.put_value(value);
                self.apply_analog_select(ctx);
            }
        }
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        for port in &mut self.ports {
            port.latch.reset(kind);
            port.tris.reset(kind);
            port.wpu.reset(kind);
            port.ioc.reset(kind);
            port.ioc_latch = 0;
        }
        self.ansel.reset(kind);
        self.anselh.reset(kind);
        self.option = 0xFF;
        self.refresh_all(ctx);
        self.apply_analog_select(ctx);
        self.sync_int(ctx);
    }
}
