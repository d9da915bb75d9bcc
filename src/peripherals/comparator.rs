//! Analog comparators and the comparator voltage reference
//!
//! Outputs are recomputed synchronously whenever a control register is
//! written or an input pin's voltage moves. Each comparator resolves its
//! non-inverting (Vpos) and inverting (Vneg) inputs to a voltage, compares
//! them, applies polarity, and raises its interrupt when the visible output
//! bit changes.
//!
//! Three register layouts are modelled:
//! - `Legacy`: a single CMCON with the CM2:0 mode table and VRCON
//! - `Dual`: CM1CON0/CM2CON0 plus CM2CON1 reference selects and VRCON
//! - `DualHysteresis`: the dual layout with per-comparator hysteresis in
//!   CM2CON1 and a VRCON that routes CVref or 0.6 V to each comparator

use crate::context::SimContext;
use crate::peripherals::interrupt::InterruptSource;
use crate::pins::{Drive, PinId};
use crate::pps::Signal;
use crate::register::{Peripheral, ResetType, Sfr};

/// Fixed internal reference
pub const FIXED_REFERENCE: f64 = 0.6;
/// Width of the hysteresis band
pub const HYSTERESIS: f64 = 0.045;

/// CMCON bits (legacy layout)
pub mod cmcon {
    pub const C2OUT: u8 = 0x80;
    pub const C1OUT: u8 = 0x40;
    pub const C2INV: u8 = 0x20;
    pub const C1INV: u8 = 0x10;
    pub const CIS: u8 = 0x08;
    pub const CM_MASK: u8 = 0x07;
}

/// CMxCON0 bits
pub mod cmxcon0 {
    pub const ON: u8 = 0x80;
    pub const OUT: u8 = 0x40;
    pub const OE: u8 = 0x20;
    pub const POL: u8 = 0x10;
    pub const R: u8 = 0x04;
    pub const CH_MASK: u8 = 0x03;
}

/// CM2CON1 bits
pub mod cm2con1 {
    pub const MC1OUT: u8 = 0x80;
    pub const MC2OUT: u8 = 0x40;
    pub const C1RSEL: u8 = 0x20;
    pub const C2RSEL: u8 = 0x10;
    pub const C1HYS: u8 = 0x08;
    pub const C2HYS: u8 = 0x04;
    pub const T1GSS: u8 = 0x02;
    pub const C2SYNC: u8 = 0x01;
}

/// VRCON bits
pub mod vrcon {
    pub const VREN: u8 = 0x80;
    pub const VROE: u8 = 0x40;
    pub const VRR: u8 = 0x20;
    pub const VRSS: u8 = 0x10;
    pub const VR_MASK: u8 = 0x0F;
    /// `DualHysteresis` layout: CVref to comparator 1 (else 0.6 V)
    pub const C1VREN: u8 = 0x80;
    /// `DualHysteresis` layout: CVref to comparator 2 (else 0.6 V)
    pub const C2VREN: u8 = 0x40;
    /// `DualHysteresis` layout: 0.6 V reference enable
    pub const VP6EN: u8 = 0x10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpReg {
    Cmcon,
    Cm1con0,
    Cm2con0,
    Cm2con1,
    Vrcon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpLayout {
    Legacy,
    Dual,
    DualHysteresis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparatorSpec {
    pub layout: CmpLayout,
    /// Legacy: RA0..RA3. Dual: C12IN0-..C12IN3-, C1IN+, C2IN+.
    pub inputs: [Option<PinId>; 6],
    /// Interrupt flag per comparator (the same flag twice for CMIF parts)
    pub cmif: [InterruptSource; 2],
    pub cmcon_por: u8,
    /// CMCON mode selects the analog pins (no ANSEL on the part)
    pub sets_analog: bool,
}

/// One comparator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Index into [`ComparatorSpec::inputs`]
    Pin(usize),
    CvRef,
    Fixed,
    Ground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Config {
    on: bool,
    vpos: Input,
    vneg: Input,
    invert: bool,
    hysteresis: bool,
    drive_pin: bool,
}

impl Config {
    const OFF: Config = Config {
        on: false,
        vpos: Input::Ground,
        vneg: Input::Ground,
        invert: false,
        hysteresis: false,
        drive_pin: false,
    };

    fn new(vpos: Input, vneg: Input) -> Self {
        Config {
            on: true,
            vpos,
            vneg,
            ..Config::OFF
        }
    }
}

const OUTPUTS: [Signal; 2] = [Signal::C1Out, Signal::C2Out];

#[derive(Debug, Clone)]
pub struct Comparator {
    spec: ComparatorSpec,
    cmcon: Sfr,
    cm1con0: Sfr,
    cm2con0: Sfr,
    cm2con1: Sfr,
    vrcon: Sfr,
    /// Raw comparison result (before polarity), kept for hysteresis
    raw: [bool; 2],
    /// Visible output after polarity
    out: [bool; 2],
    driving: [bool; 2],
    cvref_out: bool,
}

impl Comparator {
    pub fn new(spec: ComparatorSpec) -> Self {
        let (cm2con1_por, cm2con1_mask) = match spec.layout {
            CmpLayout::DualHysteresis => (0x00, cm2con1::C1HYS | cm2con1::C2HYS | 0x03),
            _ => (0x02, cm2con1::C1RSEL | cm2con1::C2RSEL | 0x03),
        };
        Self {
            spec,
            cmcon: Sfr::new(spec.cmcon_por, !(cmcon::C1OUT | cmcon::C2OUT)),
            cm1con0: Sfr::new(0x00, !cmxcon0::OUT),
            cm2con0: Sfr::new(0x00, !cmxcon0::OUT),
            cm2con1: Sfr::new(cm2con1_por, cm2con1_mask),
            vrcon: Sfr::new(0x00, 0xFF),
            raw: [false; 2],
            out: [false; 2],
            driving: [false; 2],
            cvref_out: false,
        }
    }

    /// Register analog sinks on every input pin
    pub fn attach(&self, ctx: &mut SimContext) {
        for pin in self.spec.inputs.iter().flatten() {
            ctx.pins.attach_sink(*pin, crate::pins::SINK_ANALOG);
        }
    }

    /// Comparator output as seen by firmware
    pub fn output(&self, n: usize) -> bool {
        self.out.get(n).copied().unwrap_or(false)
    }

    fn con0(&self, n: usize) -> &Sfr {
        if n == 0 {
            &self.cm1con0
        } else {
            &self.cm2con0
        }
    }

    fn con0_mut(&mut self, n: usize) -> &mut Sfr {
        if n == 0 {
            &mut self.cm1con0
        } else {
            &mut self.cm2con0
        }
    }

    fn reference_enabled(&self) -> bool {
        match self.spec.layout {
            CmpLayout::DualHysteresis => self.vrcon.is_set(vrcon::C1VREN | vrcon::C2VREN),
            _ => self.vrcon.is_set(vrcon::VREN),
        }
    }

    /// Comparator reference voltage, 0 V while disabled
    pub fn cvref(&self, ctx: &SimContext) -> f64 {
        if !self.reference_enabled() {
            return 0.0;
        }
        let vdd = ctx.pins.vdd();
        let vr = (self.vrcon.get() & vrcon::VR_MASK) as f64;
        if self.vrcon.is_set(vrcon::VRR) {
            vdd * vr / 24.0
        } else {
            vdd / 4.0 + vdd * vr / 32.0
        }
    }

    /// Current input selection for comparator `n`
    fn config(&self, n: usize) -> Config {
        match self.spec.layout {
            CmpLayout::Legacy => self.legacy_config(n),
            CmpLayout::Dual | CmpLayout::DualHysteresis => self.dual_config(n),
        }
    }

    fn legacy_config(&self, n: usize) -> Config {
        use Input::{CvRef, Pin};
        let cm = self.cmcon.get() & cmcon::CM_MASK;
        let cis = self.cmcon.is_set(cmcon::CIS);
        let mut cfg = match (cm, n) {
            (0b001, 0) => Config::new(Pin(2), Pin(if cis { 3 } else { 0 })),
            (0b001, _) => Config::new(Pin(2), Pin(1)),
            (0b010, 0) => Config::new(CvRef, Pin(if cis { 3 } else { 0 })),
            (0b010, _) => Config::new(CvRef, Pin(if cis { 2 } else { 1 })),
            (0b011 | 0b110, 0) => Config::new(Pin(2), Pin(0)),
            (0b011 | 0b110, _) => Config::new(Pin(2), Pin(1)),
            (0b100, 0) => Config::new(Pin(3), Pin(0)),
            (0b100 | 0b101, 1) => Config::new(Pin(2), Pin(1)),
            _ => Config::OFF,
        };
        let inv = if n == 0 { cmcon::C1INV } else { cmcon::C2INV };
        cfg.invert = self.cmcon.is_set(inv);
        cfg.drive_pin = cm == 0b110;
        cfg
    }

    fn dual_config(&self, n: usize) -> Config {
        let con = self.con0(n).get();
        if con & cmxcon0::ON == 0 {
            return Config::OFF;
        }
        let vneg = Input::Pin((con & cmxcon0::CH_MASK) as usize);
        let vpos = if con & cmxcon0::R == 0 {
            Input::Pin(4 + n)
        } else {
            let cvref = match self.spec.layout {
                CmpLayout::DualHysteresis => {
                    let bit = if n == 0 { vrcon::C1VREN } else { vrcon::C2VREN };
                    self.vrcon.is_set(bit)
                }
                _ => {
                    let bit = if n == 0 { cm2con1::C1RSEL } else { cm2con1::C2RSEL };
                    self.cm2con1.is_set(bit)
                }
            };
            if cvref {
                Input::CvRef
            } else {
                Input::Fixed
            }
        };
        let hys = if n == 0 { cm2con1::C1HYS } else { cm2con1::C2HYS };
        Config {
            on: true,
            vpos,
            vneg,
            invert: con & cmxcon0::POL != 0,
            hysteresis: self.spec.layout == CmpLayout::DualHysteresis && self.cm2con1.is_set(hys),
            drive_pin: con & cmxcon0::OE != 0,
        }
    }

    fn voltage(&self, input: Input, ctx: &SimContext) -> f64 {
        match input {
            Input::Pin(i) => self.spec.inputs[i].map(|p| ctx.pins.voltage(p)).unwrap_or(0.0),
            Input::CvRef => self.cvref(ctx),
            Input::Fixed => FIXED_REFERENCE,
            Input::Ground => 0.0,
        }
    }

    /// Voltage on the non-inverting input of comparator `n`
    pub fn get_vpos(&self, n: usize, ctx: &SimContext) -> f64 {
        self.voltage(self.config(n).vpos, ctx)
    }

    /// Voltage on the inverting input of comparator `n`
    pub fn get_vneg(&self, n: usize, ctx: &SimContext) -> f64 {
        self.voltage(self.config(n).vneg, ctx)
    }

    fn used_pins(&self) -> [bool; 6] {
        let mut used = [false; 6];
        let cm = self.cmcon.get() & cmcon::CM_MASK;
        if cm == 0b000 {
            used[..4].iter_mut().for_each(|u| *u = true);
        }
        for n in 0..2 {
            let cfg = self.config(n);
            for input in [cfg.vpos, cfg.vneg] {
                if let Input::Pin(i) = input {
                    used[i] = true;
                }
            }
        }
        // CIS may switch to the other pin at any time
        if cm == 0b001 || cm == 0b010 {
            used[..4].iter_mut().for_each(|u| *u = true);
        }
        used
    }

    /// Re-evaluate both comparators and everything hanging off them
    pub fn update(&mut self, ctx: &mut SimContext) {
        if self.spec.sets_analog {
            let used = self.used_pins();
            for (i, pin) in self.spec.inputs.iter().enumerate() {
                if let Some(pin) = pin {
                    ctx.pins.set_analog(*pin, used[i]);
                }
            }
        }

        for n in 0..2 {
            let cfg = self.config(n);
            let out = if cfg.on {
                let vp = self.voltage(cfg.vpos, ctx);
                let vn = self.voltage(cfg.vneg, ctx);
                let raw = if cfg.hysteresis {
                    let half = HYSTERESIS / 2.0;
                    if self.raw[n] {
                        vp > vn - half
                    } else {
                        vp > vn + half
                    }
                } else {
                    vp > vn
                };
                self.raw[n] = raw;
                raw ^ cfg.invert
            } else {
                self.raw[n] = false;
                false
            };
            if out != self.out[n] {
                tracing::debug!(comparator = n + 1, out, "CMP: output change");
                self.out[n] = out;
                ctx.raise(self.spec.cmif[n]);
            }
            self.drive_output(n, cfg.on && cfg.drive_pin, ctx);
        }
        self.mirror_outputs();
        self.drive_cvref(ctx);
    }

    fn mirror_outputs(&mut self) {
        match self.spec.layout {
            CmpLayout::Legacy => {
                self.cmcon.assign(cmcon::C1OUT, self.out[0]);
                self.cmcon.assign(cmcon::C2OUT, self.out[1]);
            }
            CmpLayout::Dual | CmpLayout::DualHysteresis => {
                let out = self.out;
                self.cm1con0.assign(cmxcon0::OUT, out[0]);
                self.cm2con0.assign(cmxcon0::OUT, out[1]);
                self.cm2con1.assign(cm2con1::MC1OUT, out[0]);
                self.cm2con1.assign(cm2con1::MC2OUT, out[1]);
            }
        }
    }

    fn drive_output(&mut self, n: usize, enable: bool, ctx: &mut SimContext) {
        let signal = OUTPUTS[n];
        let Some(pin) = ctx.pin_of(signal) else {
            return;
        };
        let drive = Drive::Digital(self.out[n]);
        match (self.driving[n], enable) {
            (false, true) => ctx.pins.attach_source(pin, signal, drive),
            (true, true) => ctx.pins.drive(pin, signal, drive),
            (true, false) => ctx.pins.release_source(pin, signal),
            (false, false) => {}
        }
        self.driving[n] = enable;
    }

    fn drive_cvref(&mut self, ctx: &mut SimContext) {
        let enable = self.spec.layout != CmpLayout::DualHysteresis
            && self.vrcon.is_set(vrcon::VREN)
            && self.vrcon.is_set(vrcon::VROE);
        let Some(pin) = ctx.pin_of(Signal::CvRef) else {
            return;
        };
        let drive = Drive::Voltage(self.cvref(ctx));
        match (self.cvref_out, enable) {
            (false, true) => ctx.pins.attach_source(pin, Signal::CvRef, drive),
            (true, true) => ctx.pins.drive(pin, Signal::CvRef, drive),
            (true, false) => ctx.pins.release_source(pin, Signal::CvRef),
            (false, false) => {}
        }
        self.cvref_out = enable;
    }

    fn reg_mut(&mut self, reg: CmpReg) -> &mut Sfr {
        match reg {
            CmpReg::Cmcon => &mut self.cmcon,
            CmpReg::Cm1con0 => self.con0_mut(0),
            CmpReg::Cm2con0 => self.con0_mut(1),
            CmpReg::Cm2con1 => &mut self.cm2con1,
            CmpReg::Vrcon => &mut self.vrcon,
        }
    }
}

impl Peripheral for Comparator {
    type Reg = CmpReg;

    fn peek(&self, reg: CmpReg, _ctx: &SimContext) -> u8 {
        match reg {
            CmpReg::Cmcon => self.cmcon.get(),
            CmpReg::Cm1con0 => self.cm1con0.get(),
            CmpReg::Cm2con0 => self.cm2con0.get(),
            CmpReg::Cm2con1 => self.cm2con1.get(),
            CmpReg::Vrcon => self.vrcon.get(),
        }
    }

    fn put(&mut self, reg: CmpReg, value: u8, ctx: &mut SimContext) {
        self.reg_mut(reg).put(value);
        self.update(ctx);
    }

    fn put_value(&mut self, reg: CmpReg, value: u8, ctx: &mut SimContext) {
        self.reg_mut(reg).put_value(value);
        self.update(ctx);
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        for reg in [
            CmpReg::Cmcon,
            CmpReg::Cm1con0,
            CmpReg::Cm2con0,
            CmpReg::Cm2con1,
            CmpReg::Vrcon,
        ] {
            self.reg_mut(reg).reset(kind);
        }
        self.raw = [false; 2];
        self.out = [false; 2];
        for n in 0..2 {
            self.drive_output(n, false, ctx);
        }
        self.update(ctx);
    }
}
