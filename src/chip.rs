//! Chip descriptors
//!
//! One static table per supported part: package pins, default signal
//! routing, the banked register map, GPR ranges and the configuration of
//! every peripheral module. [`Processor`](crate::Processor) builds a part
//! from a descriptor; nothing in the core is specialised per chip beyond
//! these tables.
//!
//! Data addresses are 9 bits: `RP1:RP0` (or `IRP`) selects the bank in
//! bits 8:7, the instruction supplies bits 6:0.

use crate::context::{SimConfig, SimContext};
use crate::error::{ConfigError, ConfigResult};
use crate::memory::ProgramMemory;
use crate::peripherals::adc::{AdcLayout, AdcReg, AdcSpec};
use crate::peripherals::comparator::{CmpLayout, CmpReg, ComparatorSpec};
use crate::peripherals::eeprom::{EeReg, EepromKind, EepromSpec};
use crate::peripherals::interrupt::{IntReg, InterruptController, InterruptSource, PIR_COUNT};
use crate::peripherals::ports::{IocMode, PortReg, PortSpec, PullUpMode, PORTA, PORTB, PORTC, PORTD, PORTE};
use crate::peripherals::ssp::{SspKind, SspReg, SspSpec};
use crate::peripherals::timer::TimerReg;
use crate::peripherals::usart::{UsartReg, UsartSpec};
use crate::peripherals::watchdog::{WdtKind, WdtReg};
use crate::pins::{PinBank, PinId, PinSpec};
use crate::pps::{PpsMap, Signal};
use crate::register::RegKind;

/// Size of the banked data space
pub const DATA_SPACE: u16 = 0x200;

/// Configuration word bits shared by the supported parts
pub mod config {
    /// Watchdog enable
    pub const WDTE: u16 = 0x0004;
    /// MCLR pin function enable
    pub const MCLRE: u16 = 0x0020;
}

/// One named register and every data address it answers at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub kind: RegKind,
    pub addrs: &'static [u16],
}

const fn reg(name: &'static str, kind: RegKind, addrs: &'static [u16]) -> RegisterDef {
    RegisterDef { name, kind, addrs }
}

/// Storage-only register (PCON, OSCCON and friends)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainDef {
    pub name: &'static str,
    pub por: u8,
    pub mask: u8,
}

/// Static description of one part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChipDescriptor {
    pub name: &'static str,
    pub pins: &'static [PinSpec],
    /// Default signal routing
    pub pps: &'static [(Signal, PinId)],
    pub mclr: Option<PinId>,
    /// Configuration bit that enables MCLR; `None` when the pin is always MCLR
    pub mclre: Option<u16>,
    pub program_words: usize,
    pub device_id: u16,
    pub config_words: usize,
    pub registers: &'static [RegisterDef],
    pub plain: &'static [PlainDef],
    /// Inclusive GPR address ranges with their own storage
    pub gpr: &'static [(u16, u16)],
    /// `(alias, target, len)`: aliases answer with the target's storage
    pub mirrors: &'static [(u16, u16, u16)],
    pub pie_fixed: [u8; PIR_COUNT],
    /// Flags firmware cannot clear (TXIF, RCIF)
    pub pir_readonly: [u8; PIR_COUNT],
    pub ports: &'static [PortSpec],
    pub analog: &'static [(u8, PinId)],
    pub ansel_por: Option<(u8, u8)>,
    pub tmr2if: Option<InterruptSource>,
    pub watchdog: WdtKind,
    pub eeprom: Option<EepromSpec>,
    pub ssp: Option<SspSpec>,
    pub usart: Option<UsartSpec>,
    pub comparator: Option<ComparatorSpec>,
    pub adc: Option<AdcSpec>,
}

impl ChipDescriptor {
    pub fn interrupt_controller(&self) -> InterruptController {
        (0..PIR_COUNT).fold(InterruptController::new(self.pie_fixed), |irq, i| {
            irq.with_readonly(i, self.pir_readonly[i])
        })
    }

    /// Fresh simulation context for this part
    pub fn context(&self, config: SimConfig) -> SimContext {
        SimContext::new(
            PinBank::new(self.pins, config.vdd),
            PpsMap::new(self.pps),
            self.interrupt_controller(),
            ProgramMemory::new(self.program_words, self.device_id),
            config,
        )
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Check the register map for overlaps and out-of-range entries
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = [false; DATA_SPACE as usize];
        let mut claim = |addr: u16| -> ConfigResult<()> {
            let slot = seen
                .get_mut(addr as usize)
                .ok_or(ConfigError::AddressOutOfRange(addr))?;
            if std::mem::replace(slot, true) {
                return Err(ConfigError::DuplicateAddress(addr));
            }
            Ok(())
        };
        for def in self.registers {
            for &addr in def.addrs {
                claim(addr)?;
            }
        }
        for &(start, end) in self.gpr {
            for addr in start..=end {
                claim(addr)?;
            }
        }
        for &(alias, _, len) in self.mirrors {
            for addr in alias..alias + len {
                claim(addr)?;
            }
        }
        for (signal, pin) in self.pps {
            if *pin >= self.pins.len() {
                return Err(ConfigError::MissingPin(self.name, signal.name()));
            }
        }
        Ok(())
    }
}

/// Look a part up by name: "16F628A", "PIC16F628A" and "p16f628a" all match
pub fn find(name: &str) -> Option<&'static ChipDescriptor> {
    let name = name.trim().to_ascii_uppercase();
    let name = name
        .strip_prefix("PIC")
        .or_else(|| name.strip_prefix('P'))
        .unwrap_or(&name);
    CHIPS.iter().copied().find(|c| c.name == name)
}

pub static CHIPS: [&ChipDescriptor; 5] = [&P16F84A, &P16F628A, &P16F690, &P16F88, &P16F887];

// Register kind shorthands
const INTCON: RegKind = RegKind::Interrupt(IntReg::Intcon);
const PIR1: RegKind = RegKind::Interrupt(IntReg::Pir(0));
const PIR2: RegKind = RegKind::Interrupt(IntReg::Pir(1));
const PIE1: RegKind = RegKind::Interrupt(IntReg::Pie(0));
const PIE2: RegKind = RegKind::Interrupt(IntReg::Pie(1));
const TMR0: RegKind = RegKind::Timer(TimerReg::Tmr0);
const OPTION: RegKind = RegKind::Timer(TimerReg::Option);
const TMR2: RegKind = RegKind::Timer(TimerReg::Tmr2);
const T2CON: RegKind = RegKind::Timer(TimerReg::T2con);
const PR2: RegKind = RegKind::Timer(TimerReg::Pr2);
const fn port(i: u8) -> RegKind {
    RegKind::Port(PortReg::Port(i))
}
const fn tris(i: u8) -> RegKind {
    RegKind::Port(PortReg::Tris(i))
}
const EECON1: RegKind = RegKind::Eeprom(EeReg::Eecon1);
const EECON2: RegKind = RegKind::Eeprom(EeReg::Eecon2);
const EEDATA: RegKind = RegKind::Eeprom(EeReg::Eedata);
const EEADR: RegKind = RegKind::Eeprom(EeReg::Eeadr);
const EEDATH: RegKind = RegKind::Eeprom(EeReg::Eedath);
const EEADRH: RegKind = RegKind::Eeprom(EeReg::Eeadrh);
const SSPBUF: RegKind = RegKind::Ssp(SspReg::Sspbuf);
const SSPCON: RegKind = RegKind::Ssp(SspReg::Sspcon);
const SSPCON2: RegKind = RegKind::Ssp(SspReg::Sspcon2);
const SSPSTAT: RegKind = RegKind::Ssp(SspReg::Sspstat);
const SSPADD: RegKind = RegKind::Ssp(SspReg::Sspadd);
const TXSTA: RegKind = RegKind::Usart(UsartReg::Txsta);
const RCSTA: RegKind = RegKind::Usart(UsartReg::Rcsta);
const TXREG: RegKind = RegKind::Usart(UsartReg::Txreg);
const RCREG: RegKind = RegKind::Usart(UsartReg::Rcreg);
const SPBRG: RegKind = RegKind::Usart(UsartReg::Spbrg);
const SPBRGH: RegKind = RegKind::Usart(UsartReg::Spbrgh);
const BAUDCTL: RegKind = RegKind::Usart(UsartReg::Baudctl);
const CMCON: RegKind = RegKind::Comparator(CmpReg::Cmcon);
const CM1CON0: RegKind = RegKind::Comparator(CmpReg::Cm1con0);
const CM2CON0: RegKind = RegKind::Comparator(CmpReg::Cm2con0);
const CM2CON1: RegKind = RegKind::Comparator(CmpReg::Cm2con1);
const VRCON: RegKind = RegKind::Comparator(CmpReg::Vrcon);
const ADCON0: RegKind = RegKind::Adc(AdcReg::Adcon0);
const ADCON1: RegKind = RegKind::Adc(AdcReg::Adcon1);
const ADRESH: RegKind = RegKind::Adc(AdcReg::Adresh);
const ADRESL: RegKind = RegKind::Adc(AdcReg::Adresl);
const ANSEL: RegKind = RegKind::Port(PortReg::Ansel);
const ANSELH: RegKind = RegKind::Port(PortReg::Anselh);
const WDTCON: RegKind = RegKind::Watchdog(WdtReg::Wdtcon);

/// The core registers present in every bank of a four-bank part
macro_rules! core_registers {
    () => {
        [
            reg("INDF", RegKind::Indf, &[0x000, 0x080, 0x100, 0x180]),
            reg("PCL", RegKind::Pcl, &[0x002, 0x082, 0x102, 0x182]),
            reg("STATUS", RegKind::Status, &[0x003, 0x083, 0x103, 0x183]),
            reg("FSR", RegKind::Fsr, &[0x004, 0x084, 0x104, 0x184]),
            reg("PCLATH", RegKind::Pclath, &[0x00A, 0x08A, 0x10A, 0x18A]),
            reg("INTCON", INTCON, &[0x00B, 0x08B, 0x10B, 0x18B]),
            reg("TMR0", TMR0, &[0x001, 0x101]),
            reg("OPTION_REG", OPTION, &[0x081, 0x181]),
        ]
    };
}

/// Shared RAM 0x70-0x7F visible from every bank
const SHARED_RAM: [(u16, u16, u16); 3] = [(0x0F0, 0x070, 16), (0x170, 0x070, 16), (0x1F0, 0x070, 16)];

const PCON: PlainDef = PlainDef {
    name: "PCON",
    por: 0x00,
    mask: 0x03,
};

// ---------------------------------------------------------------------------
// PIC16F84A
// ---------------------------------------------------------------------------

static P16F84A_PINS: [PinSpec; 18] = [
    PinSpec::io("RA2"),
    PinSpec::io("RA3"),
    PinSpec::open_drain("RA4/T0CKI"),
    PinSpec::input("MCLR"),
    PinSpec::vss(),
    PinSpec::io("RB0/INT"),
    PinSpec::io("RB1"),
    PinSpec::io("RB2"),
    PinSpec::io("RB3"),
    PinSpec::io("RB4"),
    PinSpec::io("RB5"),
    PinSpec::io("RB6"),
    PinSpec::io("RB7"),
    PinSpec::vdd(),
    PinSpec::nc("OSC2"),
    PinSpec::nc("OSC1"),
    PinSpec::io("RA0"),
    PinSpec::io("RA1"),
];

static P16F84A_PORTS: [PortSpec; 2] = [
    PortSpec {
        name: 'A',
        pins: [Some(16), Some(17), Some(0), Some(1), Some(2), None, None, None],
        tris_por: 0x1F,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'B',
        pins: [Some(5), Some(6), Some(7), Some(8), Some(9), Some(10), Some(11), Some(12)],
        tris_por: 0xFF,
        ioc: IocMode::Fixed(0xF0),
        pull_up: PullUpMode::Rbpu,
    },
];

static P16F84A_REGISTERS: [RegisterDef; 16] = [
        reg("INDF", RegKind::Indf, &[0x000, 0x080]),
        reg("TMR0", TMR0, &[0x001]),
        reg("OPTION_REG", OPTION, &[0x081]),
        reg("PCL", RegKind::Pcl, &[0x002, 0x082]),
        reg("STATUS", RegKind::Status, &[0x003, 0x083]),
        reg("FSR", RegKind::Fsr, &[0x004, 0x084]),
        reg("PORTA", port(PORTA), &[0x005]),
        reg("TRISA", tris(PORTA), &[0x085]),
        reg("PORTB", port(PORTB), &[0x006]),
        reg("TRISB", tris(PORTB), &[0x086]),
        reg("EEDATA", EEDATA, &[0x008]),
        reg("EECON1", EECON1, &[0x088]),
        reg("EEADR", EEADR, &[0x009]),
        reg("EECON2", EECON2, &[0x089]),
        reg("PCLATH", RegKind::Pclath, &[0x00A, 0x08A]),
        reg("INTCON", INTCON, &[0x00B, 0x08B]),
];

pub static P16F84A: ChipDescriptor = ChipDescriptor {
    name: "16F84A",
    pins: &P16F84A_PINS,
    pps: &[(Signal::T0Cki, 2), (Signal::Int, 5)],
    mclr: Some(3),
    mclre: None,
    program_words: 1024,
    device_id: 0x0560,
    config_words: 1,
    registers: &P16F84A_REGISTERS,
    plain: &[],
    gpr: &[(0x00C, 0x04F)],
    mirrors: &[(0x08C, 0x00C, 0x44)],
    // EEIF sits in a hidden flag register enabled by INTCON.EEIE
    pie_fixed: [0x10, 0x00],
    pir_readonly: [0x00, 0x00],
    ports: &P16F84A_PORTS,
    analog: &[],
    ansel_por: None,
    tmr2if: None,
    watchdog: WdtKind::Fixed,
    eeprom: Some(EepromSpec {
        kind: EepromKind::Basic,
        size: 64,
        eeif: InterruptSource::pir(0, 0x10),
        program_write: false,
        erase_block: 0,
        write_latches: 0,
    }),
    ssp: None,
    usart: None,
    comparator: None,
    adc: None,
};

// ---------------------------------------------------------------------------
// PIC16F628A
// ---------------------------------------------------------------------------

static P16F628A_PINS: [PinSpec; 18] = [
    PinSpec::io("RA2/AN2/VREF"),
    PinSpec::io("RA3/AN3/CMP1"),
    PinSpec::open_drain("RA4/T0CKI/CMP2"),
    PinSpec::input("RA5/MCLR"),
    PinSpec::vss(),
    PinSpec::io("RB0/INT"),
    PinSpec::io("RB1/RX"),
    PinSpec::io("RB2/TX"),
    PinSpec::io("RB3/CCP1"),
    PinSpec::io("RB4"),
    PinSpec::io("RB5"),
    PinSpec::io("RB6"),
    PinSpec::io("RB7"),
    PinSpec::vdd(),
    PinSpec::io("RA6"),
    PinSpec::io("RA7"),
    PinSpec::io("RA0/AN0"),
    PinSpec::io("RA1/AN1"),
];

static P16F628A_PORTS: [PortSpec; 2] = [
    PortSpec {
        name: 'A',
        pins: [Some(16), Some(17), Some(0), Some(1), Some(2), Some(3), Some(14), Some(15)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'B',
        pins: [Some(5), Some(6), Some(7), Some(8), Some(9), Some(10), Some(11), Some(12)],
        tris_por: 0xFF,
        ioc: IocMode::Fixed(0xF0),
        pull_up: PullUpMode::Rbpu,
    },
];

static P16F628A_REGISTERS: [RegisterDef; 29] = {
    let [indf, pcl, status, fsr, pclath, intcon, _, _] = core_registers!();
    [
        indf,
        pcl,
        status,
        fsr,
        pclath,
        intcon,
        reg("TMR0", TMR0, &[0x001, 0x101]),
        reg("OPTION_REG", OPTION, &[0x081, 0x181]),
        reg("PORTA", port(PORTA), &[0x005]),
        reg("TRISA", tris(PORTA), &[0x085]),
        reg("PORTB", port(PORTB), &[0x006, 0x106]),
        reg("TRISB", tris(PORTB), &[0x086, 0x186]),
        reg("PIR1", PIR1, &[0x00C]),
        reg("PIE1", PIE1, &[0x08C]),
        reg("TMR2", TMR2, &[0x011]),
        reg("T2CON", T2CON, &[0x012]),
        reg("PR2", PR2, &[0x092]),
        reg("RCSTA", RCSTA, &[0x018]),
        reg("TXREG", TXREG, &[0x019]),
        reg("RCREG", RCREG, &[0x01A]),
        reg("TXSTA", TXSTA, &[0x098]),
        reg("SPBRG", SPBRG, &[0x099]),
        reg("CMCON", CMCON, &[0x01F]),
        reg("VRCON", VRCON, &[0x09F]),
        reg("EEDATA", EEDATA, &[0x09A]),
        reg("EEADR", EEADR, &[0x09B]),
        reg("EECON1", EECON1, &[0x09C]),
        reg("EECON2", EECON2, &[0x09D]),
        reg("PCON", RegKind::Plain(0), &[0x08E]),
    ]
};

pub static P16F628A: ChipDescriptor = ChipDescriptor {
    name: "16F628A",
    pins: &P16F628A_PINS,
    pps: &[
        (Signal::T0Cki, 2),
        (Signal::Int, 5),
        (Signal::Rx, 6),
        (Signal::Tx, 7),
        (Signal::C1Out, 1),
        (Signal::C2Out, 2),
        (Signal::CvRef, 0),
    ],
    mclr: Some(3),
    mclre: Some(config::MCLRE),
    program_words: 2048,
    device_id: 0x1060,
    config_words: 1,
    registers: &P16F628A_REGISTERS,
    plain: &[PCON],
    gpr: &[(0x020, 0x07F), (0x0A0, 0x0EF), (0x120, 0x14F)],
    mirrors: &SHARED_RAM,
    pie_fixed: [0x00, 0x00],
    pir_readonly: [0x30, 0x00],
    ports: &P16F628A_PORTS,
    analog: &[],
    ansel_por: None,
    tmr2if: Some(InterruptSource::pir(0, 0x02)),
    watchdog: WdtKind::Fixed,
    eeprom: Some(EepromSpec {
        kind: EepromKind::Pir,
        size: 128,
        eeif: InterruptSource::pir(0, 0x80),
        program_write: false,
        erase_block: 0,
        write_latches: 0,
    }),
    ssp: None,
    usart: Some(UsartSpec {
        txif: InterruptSource::pir(0, 0x10),
        rcif: InterruptSource::pir(0, 0x20),
        eusart: false,
    }),
    comparator: Some(ComparatorSpec {
        layout: CmpLayout::Legacy,
        inputs: [Some(16), Some(17), Some(0), Some(1), None, None],
        cmif: [InterruptSource::pir(0, 0x40), InterruptSource::pir(0, 0x40)],
        cmcon_por: 0x00,
        sets_analog: true,
    }),
    adc: None,
};

// ---------------------------------------------------------------------------
// PIC16F690
// ---------------------------------------------------------------------------

static P16F690_PINS: [PinSpec; 20] = [
    PinSpec::vdd(),
    PinSpec::io("RA5"),
    PinSpec::io("RA4/AN3"),
    PinSpec::input("RA3/MCLR"),
    PinSpec::io("RC5"),
    PinSpec::io("RC4/C2OUT"),
    PinSpec::io("RC3/AN7/C12IN3-"),
    PinSpec::io("RC6/AN8/SS"),
    PinSpec::io("RC7/AN9/SDO"),
    PinSpec::io("RB7/TX"),
    PinSpec::io("RB6/SCK/SCL"),
    PinSpec::io("RB5/AN11/RX"),
    PinSpec::io("RB4/AN10/SDI/SDA"),
    PinSpec::io("RC2/AN6/C12IN2-"),
    PinSpec::io("RC1/AN5/C12IN1-"),
    PinSpec::io("RC0/AN4/C2IN+"),
    PinSpec::io("RA2/AN2/T0CKI/INT/C1OUT"),
    PinSpec::io("RA1/AN1/C12IN0-/VREF"),
    PinSpec::io("RA0/AN0/C1IN+"),
    PinSpec::vss(),
];

static P16F690_PORTS: [PortSpec; 3] = [
    PortSpec {
        name: 'A',
        pins: [Some(18), Some(17), Some(16), Some(3), Some(2), Some(1), None, None],
        tris_por: 0x3F,
        ioc: IocMode::Register,
        pull_up: PullUpMode::Wpu { por: 0x37 },
    },
    PortSpec {
        name: 'B',
        pins: [None, None, None, None, Some(12), Some(11), Some(10), Some(9)],
        tris_por: 0xF0,
        ioc: IocMode::Register,
        pull_up: PullUpMode::Wpu { por: 0xF0 },
    },
    PortSpec {
        name: 'C',
        pins: [Some(15), Some(14), Some(13), Some(6), Some(5), Some(4), Some(7), Some(8)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
];

static P16F690_ANALOG: [(u8, PinId); 12] = [
    (0, 18),
    (1, 17),
    (2, 16),
    (3, 2),
    (4, 15),
    (5, 14),
    (6, 13),
    (7, 6),
    (8, 7),
    (9, 8),
    (10, 12),
    (11, 11),
];

static P16F690_REGISTERS: [RegisterDef; 57] = {
    let [indf, pcl, status, fsr, pclath, intcon, tmr0, option] = core_registers!();
    [
        indf,
        pcl,
        status,
        fsr,
        pclath,
        intcon,
        tmr0,
        option,
        reg("PORTA", port(PORTA), &[0x005, 0x105]),
        reg("PORTB", port(PORTB), &[0x006, 0x106]),
        reg("PORTC", port(PORTC), &[0x007, 0x107]),
        reg("TRISA", tris(PORTA), &[0x085, 0x185]),
        reg("TRISB", tris(PORTB), &[0x086, 0x186]),
        reg("TRISC", tris(PORTC), &[0x087, 0x187]),
        reg("PIR1", PIR1, &[0x00C]),
        reg("PIR2", PIR2, &[0x00D]),
        reg("PIE1", PIE1, &[0x08C]),
        reg("PIE2", PIE2, &[0x08D]),
        reg("TMR2", TMR2, &[0x011]),
        reg("T2CON", T2CON, &[0x012]),
        reg("PR2", PR2, &[0x092]),
        reg("SSPBUF", SSPBUF, &[0x013]),
        reg("SSPCON", SSPCON, &[0x014]),
        reg("SSPADD", SSPADD, &[0x093]),
        reg("SSPSTAT", SSPSTAT, &[0x094]),
        reg("RCSTA", RCSTA, &[0x018]),
        reg("TXREG", TXREG, &[0x019]),
        reg("RCREG", RCREG, &[0x01A]),
        reg("TXSTA", TXSTA, &[0x098]),
        reg("SPBRG", SPBRG, &[0x099]),
        reg("SPBRGH", SPBRGH, &[0x09A]),
        reg("BAUDCTL", BAUDCTL, &[0x09B]),
        reg("ADRESH", ADRESH, &[0x01E]),
        reg("ADCON0", ADCON0, &[0x01F]),
        reg("ADRESL", ADRESL, &[0x09E]),
        reg("ADCON1", ADCON1, &[0x09F]),
        reg("PCON", RegKind::Plain(0), &[0x08E]),
        reg("OSCCON", RegKind::Plain(1), &[0x08F]),
        reg("OSCTUNE", RegKind::Plain(2), &[0x090]),
        reg("WPUA", RegKind::Port(PortReg::Wpu(PORTA)), &[0x095]),
        reg("IOCA", RegKind::Port(PortReg::Ioc(PORTA)), &[0x096]),
        reg("WDTCON", WDTCON, &[0x097]),
        reg("EEDAT", EEDATA, &[0x10C]),
        reg("EEADR", EEADR, &[0x10D]),
        reg("EEDATH", EEDATH, &[0x10E]),
        reg("EEADRH", EEADRH, &[0x10F]),
        reg("WPUB", RegKind::Port(PortReg::Wpu(PORTB)), &[0x115]),
        reg("IOCB", RegKind::Port(PortReg::Ioc(PORTB)), &[0x116]),
        reg("VRCON", VRCON, &[0x118]),
        reg("CM1CON0", CM1CON0, &[0x119]),
        reg("CM2CON0", CM2CON0, &[0x11A]),
        reg("CM2CON1", CM2CON1, &[0x11B]),
        reg("ANSEL", ANSEL, &[0x11E]),
        reg("ANSELH", ANSELH, &[0x11F]),
        reg("EECON1", EECON1, &[0x18C]),
        reg("EECON2", EECON2, &[0x18D]),
        reg("SRCON", RegKind::Plain(3), &[0x19E]),
    ]
};

pub static P16F690: ChipDescriptor = ChipDescriptor {
    name: "16F690",
    pins: &P16F690_PINS,
    pps: &[
        (Signal::Sck, 10),
        (Signal::Scl, 10),
        (Signal::Sdi, 12),
        (Signal::Sda, 12),
        (Signal::Sdo, 8),
        (Signal::Ss, 7),
        (Signal::Tx, 9),
        (Signal::Rx, 11),
        (Signal::C1Out, 16),
        (Signal::C2Out, 5),
        (Signal::T0Cki, 16),
        (Signal::Int, 16),
    ],
    mclr: Some(3),
    mclre: Some(config::MCLRE),
    program_words: 4096,
    device_id: 0x1400,
    config_words: 1,
    registers: &P16F690_REGISTERS,
    plain: &[
        PCON,
        PlainDef {
            name: "OSCCON",
            por: 0x68,
            mask: 0x71,
        },
        PlainDef {
            name: "OSCTUNE",
            por: 0x00,
            mask: 0x1F,
        },
        PlainDef {
            name: "SRCON",
            por: 0x00,
            mask: 0xFC,
        },
    ],
    gpr: &[(0x020, 0x07F), (0x0A0, 0x0EF), (0x120, 0x16F)],
    mirrors: &SHARED_RAM,
    pie_fixed: [0x00, 0x00],
    pir_readonly: [0x30, 0x00],
    ports: &P16F690_PORTS,
    analog: &P16F690_ANALOG,
    ansel_por: Some((0xFF, 0x0F)),
    tmr2if: Some(InterruptSource::pir(0, 0x02)),
    watchdog: WdtKind::Wdtcon,
    eeprom: Some(EepromSpec {
        kind: EepromKind::Wide,
        size: 256,
        eeif: InterruptSource::pir(1, 0x10),
        program_write: false,
        erase_block: 0,
        write_latches: 0,
    }),
    ssp: Some(SspSpec {
        kind: SspKind::Ssp,
        sspif: InterruptSource::pir(0, 0x08),
        bclif: None,
    }),
    usart: Some(UsartSpec {
        txif: InterruptSource::pir(0, 0x10),
        rcif: InterruptSource::pir(0, 0x20),
        eusart: true,
    }),
    comparator: Some(ComparatorSpec {
        layout: CmpLayout::DualHysteresis,
        inputs: [Some(17), Some(14), Some(13), Some(6), Some(18), Some(15)],
        cmif: [InterruptSource::pir(1, 0x20), InterruptSource::pir(1, 0x40)],
        cmcon_por: 0x00,
        sets_analog: false,
    }),
    adc: Some(AdcSpec {
        layout: AdcLayout::FormatInAdcon0,
        channels: &P16F690_ANALOG,
        cvref_channel: Some(12),
        fixed_channel: Some(13),
        vref_plus: Some(17),
        vref_minus: None,
        adif: InterruptSource::pir(0, 0x40),
    }),
};

// ---------------------------------------------------------------------------
// PIC16F88
// ---------------------------------------------------------------------------

static P16F88_PINS: [PinSpec; 18] = [
    PinSpec::io("RA2/AN2/CVREF/VREF-"),
    PinSpec::io("RA3/AN3/VREF+/C1OUT"),
    PinSpec::io("RA4/AN4/T0CKI/C2OUT"),
    PinSpec::input("RA5/MCLR"),
    PinSpec::vss(),
    PinSpec::io("RB0/INT"),
    PinSpec::io("RB1/SDI/SDA"),
    PinSpec::io("RB2/SDO/RX"),
    PinSpec::io("RB3/CCP1"),
    PinSpec::io("RB4/SCK/SCL"),
    PinSpec::io("RB5/SS/TX"),
    PinSpec::io("RB6/AN5"),
    PinSpec::io("RB7/AN6"),
    PinSpec::vdd(),
    PinSpec::io("RA6"),
    PinSpec::io("RA7"),
    PinSpec::io("RA0/AN0"),
    PinSpec::io("RA1/AN1"),
];

static P16F88_PORTS: [PortSpec; 2] = [
    PortSpec {
        name: 'A',
        pins: [Some(16), Some(17), Some(0), Some(1), Some(2), Some(3), Some(14), Some(15)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'B',
        pins: [Some(5), Some(6), Some(7), Some(8), Some(9), Some(10), Some(11), Some(12)],
        tris_por: 0xFF,
        ioc: IocMode::Fixed(0xF0),
        pull_up: PullUpMode::Rbpu,
    },
];

static P16F88_ANALOG: [(u8, PinId); 7] = [(0, 16), (1, 17), (2, 0), (3, 1), (4, 2), (5, 11), (6, 12)];

static P16F88_REGISTERS: [RegisterDef; 44] = {
    let [indf, pcl, status, fsr, pclath, intcon, tmr0, option] = core_registers!();
    [
        indf,
        pcl,
        status,
        fsr,
        pclath,
        intcon,
        tmr0,
        option,
        reg("PORTA", port(PORTA), &[0x005]),
        reg("PORTB", port(PORTB), &[0x006, 0x106]),
        reg("TRISA", tris(PORTA), &[0x085]),
        reg("TRISB", tris(PORTB), &[0x086, 0x186]),
        reg("PIR1", PIR1, &[0x00C]),
        reg("PIR2", PIR2, &[0x00D]),
        reg("PIE1", PIE1, &[0x08C]),
        reg("PIE2", PIE2, &[0x08D]),
        reg("TMR2", TMR2, &[0x011]),
        reg("T2CON", T2CON, &[0x012]),
        reg("PR2", PR2, &[0x092]),
        reg("SSPBUF", SSPBUF, &[0x013]),
        reg("SSPCON", SSPCON, &[0x014]),
        reg("SSPADD", SSPADD, &[0x093]),
        reg("SSPSTAT", SSPSTAT, &[0x094]),
        reg("RCSTA", RCSTA, &[0x018]),
        reg("TXREG", TXREG, &[0x019]),
        reg("RCREG", RCREG, &[0x01A]),
        reg("TXSTA", TXSTA, &[0x098]),
        reg("SPBRG", SPBRG, &[0x099]),
        reg("ADRESH", ADRESH, &[0x01E]),
        reg("ADCON0", ADCON0, &[0x01F]),
        reg("ADRESL", ADRESL, &[0x09E]),
        reg("ADCON1", ADCON1, &[0x09F]),
        reg("PCON", RegKind::Plain(0), &[0x08E]),
        reg("OSCCON", RegKind::Plain(1), &[0x08F]),
        reg("OSCTUNE", RegKind::Plain(2), &[0x090]),
        reg("ANSEL", ANSEL, &[0x09B]),
        reg("CMCON", CMCON, &[0x09C]),
        reg("CVRCON", VRCON, &[0x09D]),
        reg("EEDATA", EEDATA, &[0x10C]),
        reg("EEADR", EEADR, &[0x10D]),
        reg("EEDATH", EEDATH, &[0x10E]),
        reg("EEADRH", EEADRH, &[0x10F]),
        reg("EECON1", EECON1, &[0x18C]),
        reg("EECON2", EECON2, &[0x18D]),
    ]
};

pub static P16F88: ChipDescriptor = ChipDescriptor {
    name: "16F88",
    pins: &P16F88_PINS,
    pps: &[
        (Signal::Sdi, 6),
        (Signal::Sda, 6),
        (Signal::Sdo, 7),
        (Signal::Rx, 7),
        (Signal::Sck, 9),
        (Signal::Scl, 9),
        (Signal::Ss, 10),
        (Signal::Tx, 10),
        (Signal::C1Out, 1),
        (Signal::C2Out, 2),
        (Signal::CvRef, 0),
        (Signal::T0Cki, 2),
        (Signal::Int, 5),
    ],
    mclr: Some(3),
    mclre: Some(config::MCLRE),
    program_words: 4096,
    device_id: 0x0760,
    config_words: 2,
    registers: &P16F88_REGISTERS,
    plain: &[
        PCON,
        PlainDef {
            name: "OSCCON",
            por: 0x00,
            mask: 0x73,
        },
        PlainDef {
            name: "OSCTUNE",
            por: 0x00,
            mask: 0x3F,
        },
    ],
    gpr: &[(0x020, 0x07F), (0x0A0, 0x0EF), (0x110, 0x16F), (0x190, 0x1EF)],
    mirrors: &SHARED_RAM,
    pie_fixed: [0x00, 0x00],
    pir_readonly: [0x30, 0x00],
    ports: &P16F88_PORTS,
    analog: &P16F88_ANALOG,
    ansel_por: Some((0x7F, 0x00)),
    tmr2if: Some(InterruptSource::pir(0, 0x02)),
    watchdog: WdtKind::Fixed,
    eeprom: Some(EepromSpec {
        kind: EepromKind::Extended,
        size: 256,
        eeif: InterruptSource::pir(1, 0x10),
        program_write: true,
        erase_block: 32,
        write_latches: 4,
    }),
    ssp: Some(SspSpec {
        kind: SspKind::Ssp,
        sspif: InterruptSource::pir(0, 0x08),
        bclif: None,
    }),
    usart: Some(UsartSpec {
        txif: InterruptSource::pir(0, 0x10),
        rcif: InterruptSource::pir(0, 0x20),
        eusart: false,
    }),
    comparator: Some(ComparatorSpec {
        layout: CmpLayout::Legacy,
        inputs: [Some(16), Some(17), Some(0), Some(1), None, None],
        cmif: [InterruptSource::pir(1, 0x40), InterruptSource::pir(1, 0x40)],
        cmcon_por: 0x07,
        sets_analog: false,
    }),
    adc: Some(AdcSpec {
        layout: AdcLayout::ThreeBitChannel,
        channels: &P16F88_ANALOG,
        cvref_channel: None,
        fixed_channel: None,
        vref_plus: Some(1),
        vref_minus: Some(0),
        adif: InterruptSource::pir(0, 0x40),
    }),
};

// ---------------------------------------------------------------------------
// PIC16F887
// ---------------------------------------------------------------------------

static P16F887_PINS: [PinSpec; 40] = [
    PinSpec::input("RE3/MCLR"),
    PinSpec::io("RA0/AN0/C12IN0-"),
    PinSpec::io("RA1/AN1/C12IN1-"),
    PinSpec::io("RA2/AN2/VREF-/CVREF/C2IN+"),
    PinSpec::io("RA3/AN3/VREF+/C1IN+"),
    PinSpec::io("RA4/T0CKI/C1OUT"),
    PinSpec::io("RA5/AN4/SS/C2OUT"),
    PinSpec::io("RE0/AN5"),
    PinSpec::io("RE1/AN6"),
    PinSpec::io("RE2/AN7"),
    PinSpec::vdd(),
    PinSpec::vss(),
    PinSpec::io("RA7"),
    PinSpec::io("RA6"),
    PinSpec::io("RC0"),
    PinSpec::io("RC1"),
    PinSpec::io("RC2"),
    PinSpec::io("RC3/SCK/SCL"),
    PinSpec::io("RD0"),
    PinSpec::io("RD1"),
    PinSpec::io("RD2"),
    PinSpec::io("RD3"),
    PinSpec::io("RC4/SDI/SDA"),
    PinSpec::io("RC5/SDO"),
    PinSpec::io("RC6/TX"),
    PinSpec::io("RC7/RX"),
    PinSpec::io("RD4"),
    PinSpec::io("RD5"),
    PinSpec::io("RD6"),
    PinSpec::io("RD7"),
    PinSpec::vss(),
    PinSpec::vdd(),
    PinSpec::io("RB0/AN12/INT"),
    PinSpec::io("RB1/AN10/C12IN3-"),
    PinSpec::io("RB2/AN8"),
    PinSpec::io("RB3/AN9/C12IN2-"),
    PinSpec::io("RB4/AN11"),
    PinSpec::io("RB5/AN13"),
    PinSpec::io("RB6"),
    PinSpec::io("RB7"),
];

static P16F887_PORTS: [PortSpec; 5] = [
    PortSpec {
        name: 'A',
        pins: [Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(13), Some(12)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'B',
        pins: [Some(32), Some(33), Some(34), Some(35), Some(36), Some(37), Some(38), Some(39)],
        tris_por: 0xFF,
        ioc: IocMode::Register,
        pull_up: PullUpMode::Wpu { por: 0xFF },
    },
    PortSpec {
        name: 'C',
        pins: [Some(14), Some(15), Some(16), Some(17), Some(22), Some(23), Some(24), Some(25)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'D',
        pins: [Some(18), Some(19), Some(20), Some(21), Some(26), Some(27), Some(28), Some(29)],
        tris_por: 0xFF,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
    PortSpec {
        name: 'E',
        pins: [Some(7), Some(8), Some(9), Some(0), None, None, None, None],
        tris_por: 0x0F,
        ioc: IocMode::None,
        pull_up: PullUpMode::None,
    },
];

static P16F887_ANALOG: [(u8, PinId); 14] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (4, 6),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 34),
    (9, 35),
    (10, 33),
    (11, 36),
    (12, 32),
    (13, 37),
];

static P16F887_REGISTERS: [RegisterDef; 60] = {
    let [indf, pcl, status, fsr, pclath, intcon, tmr0, option] = core_registers!();
    [
        indf,
        pcl,
        status,
        fsr,
        pclath,
        intcon,
        tmr0,
        option,
        reg("PORTA", port(PORTA), &[0x005]),
        reg("PORTB", port(PORTB), &[0x006, 0x106]),
        reg("PORTC", port(PORTC), &[0x007]),
        reg("PORTD", port(PORTD), &[0x008]),
        reg("PORTE", port(PORTE), &[0x009]),
        reg("TRISA", tris(PORTA), &[0x085]),
        reg("TRISB", tris(PORTB), &[0x086, 0x186]),
        reg("TRISC", tris(PORTC), &[0x087]),
        reg("TRISD", tris(PORTD), &[0x088]),
        reg("TRISE", tris(PORTE), &[0x089]),
        reg("PIR1", PIR1, &[0x00C]),
        reg("PIR2", PIR2, &[0x00D]),
        reg("PIE1", PIE1, &[0x08C]),
        reg("PIE2", PIE2, &[0x08D]),
        reg("TMR2", TMR2, &[0x011]),
        reg("T2CON", T2CON, &[0x012]),
        reg("PR2", PR2, &[0x092]),
        reg("SSPBUF", SSPBUF, &[0x013]),
        reg("SSPCON", SSPCON, &[0x014]),
        reg("SSPCON2", SSPCON2, &[0x091]),
        reg("SSPADD", SSPADD, &[0x093]),
        reg("SSPSTAT", SSPSTAT, &[0x094]),
        reg("RCSTA", RCSTA, &[0x018]),
        reg("TXREG", TXREG, &[0x019]),
        reg("RCREG", RCREG, &[0x01A]),
        reg("TXSTA", TXSTA, &[0x098]),
        reg("SPBRG", SPBRG, &[0x099]),
        reg("SPBRGH", SPBRGH, &[0x09A]),
        reg("BAUDCTL", BAUDCTL, &[0x187]),
        reg("ADRESH", ADRESH, &[0x01E]),
        reg("ADCON0", ADCON0, &[0x01F]),
        reg("ADRESL", ADRESL, &[0x09E]),
        reg("ADCON1", ADCON1, &[0x09F]),
        reg("PCON", RegKind::Plain(0), &[0x08E]),
        reg("OSCCON", RegKind::Plain(1), &[0x08F]),
        reg("OSCTUNE", RegKind::Plain(2), &[0x090]),
        reg("WPUB", RegKind::Port(PortReg::Wpu(PORTB)), &[0x095]),
        reg("IOCB", RegKind::Port(PortReg::Ioc(PORTB)), &[0x096]),
        reg("VRCON", VRCON, &[0x097]),
        reg("WDTCON", WDTCON, &[0x105]),
        reg("CM1CON0", CM1CON0, &[0x107]),
        reg("CM2CON0", CM2CON0, &[0x108]),
        reg("CM2CON1", CM2CON1, &[0x109]),
        reg("EEDAT", EEDATA, &[0x10C]),
        reg("EEADR", EEADR, &[0x10D]),
        reg("EEDATH", EEDATH, &[0x10E]),
        reg("EEADRH", EEADRH, &[0x10F]),
        reg("SRCON", RegKind::Plain(3), &[0x185]),
        reg("ANSEL", ANSEL, &[0x188]),
        reg("ANSELH", ANSELH, &[0x189]),
        reg("EECON1", EECON1, &[0x18C]),
        reg("EECON2", EECON2, &[0x18D]),
    ]
};

pub static P16F887: ChipDescriptor = ChipDescriptor {
    name: "16F887",
    pins: &P16F887_PINS,
    pps: &[
        (Signal::Sck, 17),
        (Signal::Scl, 17),
        (Signal::Sdi, 22),
        (Signal::Sda, 22),
        (Signal::Sdo, 23),
        (Signal::Ss, 6),
        (Signal::Tx, 24),
        (Signal::Rx, 25),
        (Signal::C1Out, 5),
        (Signal::C2Out, 6),
        (Signal::CvRef, 3),
        (Signal::T0Cki, 5),
        (Signal::Int, 32),
    ],
    mclr: Some(0),
    mclre: Some(config::MCLRE),
    program_words: 8192,
    device_id: 0x2080,
    config_words: 2,
    registers: &P16F887_REGISTERS,
    plain: &[
        PCON,
        PlainDef {
            name: "OSCCON",
            por: 0x68,
            mask: 0x71,
        },
        PlainDef {
            name: "OSCTUNE",
            por: 0x00,
            mask: 0x1F,
        },
        PlainDef {
            name: "SRCON",
            por: 0x00,
            mask: 0xFD,
        },
    ],
    gpr: &[(0x020, 0x07F), (0x0A0, 0x0EF), (0x110, 0x16F), (0x190, 0x1EF)],
    mirrors: &SHARED_RAM,
    pie_fixed: [0x00, 0x00],
    pir_readonly: [0x30, 0x00],
    ports: &P16F887_PORTS,
    analog: &P16F887_ANALOG,
    ansel_por: Some((0xFF, 0x3F)),
    tmr2if: Some(InterruptSource::pir(0, 0x02)),
    watchdog: WdtKind::Wdtcon,
    eeprom: Some(EepromSpec {
        kind: EepromKind::Wide,
        size: 256,
        eeif: InterruptSource::pir(1, 0x10),
        program_write: true,
        erase_block: 0,
        write_latches: 0,
    }),
    ssp: Some(SspSpec {
        kind: SspKind::Mssp,
        sspif: InterruptSource::pir(0, 0x08),
        bclif: Some(InterruptSource::pir(1, 0x08)),
    }),
    usart: Some(UsartSpec {
        txif: InterruptSource::pir(0, 0x10),
        rcif: InterruptSource::pir(0, 0x20),
        eusart: true,
    }),
    comparator: Some(ComparatorSpec {
        layout: CmpLayout::Dual,
        inputs: [Some(1), Some(2), Some(35), Some(33), Some(4), Some(3)],
        cmif: [InterruptSource::pir(1, 0x20), InterruptSource::pir(1, 0x40)],
        cmcon_por: 0x00,
        sets_analog: false,
    }),
    adc: Some(AdcSpec {
        layout: AdcLayout::FormatInAdcon1,
        channels: &P16F887_ANALOG,
        cvref_channel: Some(14),
        fixed_channel: Some(15),
        vref_plus: Some(4),
        vref_minus: Some(3),
        adif: InterruptSource::pir(0, 0x40),
    }),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_accepts_prefixes() {
        assert_eq!(find("16F628A").map(|c| c.name), Some("16F628A"));
        assert_eq!(find("PIC16F887").map(|c| c.name), Some("16F887"));
        assert_eq!(find("p16f84a").map(|c| c.name), Some("16F84A"));
        assert!(find("18F452").is_none());
    }

    #[test]
    fn test_every_descriptor_validates() {
        for chip in CHIPS {
            if let Err(e) = chip.validate() {
                panic!("{}: {}", chip.name, e);
            }
        }
    }

    #[test]
    fn test_port_pins_exist_and_are_unique() {
        for chip in CHIPS {
            let mut seen = vec![false; chip.pins.len()];
            for port in chip.ports {
                for pin in port.pins.iter().flatten() {
                    assert!(*pin < chip.pins.len(), "{} port {}", chip.name, port.name);
                    assert!(!seen[*pin], "{} pin {} used twice", chip.name, pin);
                    seen[*pin] = true;
                }
            }
        }
    }

    #[test]
    fn test_plain_indices_resolve() {
        for chip in CHIPS {
            for def in chip.registers {
                if let RegKind::Plain(i) = def.kind {
                    assert!((i as usize) < chip.plain.len(), "{} {}", chip.name, def.name);
                }
            }
        }
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        static BROKEN: [RegisterDef; 2] = [
            reg("PORTA", port(PORTA), &[0x005]),
            reg("PORTB", port(PORTB), &[0x005]),
        ];
        let chip = ChipDescriptor {
            registers: &BROKEN,
            ..P16F84A
        };
        assert!(matches!(chip.validate(), Err(ConfigError::DuplicateAddress(0x005))));
    }

    #[test]
    fn test_context_uses_descriptor_routing() {
        let ctx = P16F887.context(SimConfig::default());
        assert_eq!(ctx.pin_of(Signal::Tx), Some(24));
        assert_eq!(ctx.pins.len(), 40);
        assert_eq!(ctx.program.len(), 8192);
    }
}
