//! Peripheral pin select
//!
//! Maps each routable peripheral signal to a package pin. Chip descriptors
//! provide the fixed default routing; [`crate::Processor::remap`] moves a
//! signal at runtime, carrying the attached source and sink with it.
//!
//! Conflicts are resolved last-write-wins: two outputs routed to one pin both
//! stay attached, and the one attached most recently drives the pin.

use crate::pins::PinId;

/// Routable peripheral signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Signal {
    /// SPI clock
    Sck = 0,
    /// SPI data in
    Sdi = 1,
    /// SPI data out
    Sdo = 2,
    /// SPI slave select
    Ss = 3,
    /// I2C clock
    Scl = 4,
    /// I2C data
    Sda = 5,
    /// USART transmit
    Tx = 6,
    /// USART receive
    Rx = 7,
    /// Comparator 1 output
    C1Out = 8,
    /// Comparator 2 output
    C2Out = 9,
    /// Comparator reference output
    CvRef = 10,
    /// Timer0 external clock
    T0Cki = 11,
    /// External interrupt
    Int = 12,
}

impl Signal {
    pub const COUNT: usize = 13;

    pub const ALL: [Signal; Self::COUNT] = [
        Signal::Sck,
        Signal::Sdi,
        Signal::Sdo,
        Signal::Ss,
        Signal::Scl,
        Signal::Sda,
        Signal::Tx,
        Signal::Rx,
        Signal::C1Out,
        Signal::C2Out,
        Signal::CvRef,
        Signal::T0Cki,
        Signal::Int,
    ];

    /// Look up a signal by its pin-function name ("TX", "sck")
    pub fn from_name(name: &str) -> Option<Signal> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Bit of this signal in a pin's sink set
    #[inline]
    pub fn sink_bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Sck => "SCK",
            Signal::Sdi => "SDI",
            Signal::Sdo => "SDO",
            Signal::Ss => "SS",
            Signal::Scl => "SCL",
            Signal::Sda => "SDA",
            Signal::Tx => "TX",
            Signal::Rx => "RX",
            Signal::C1Out => "C1OUT",
            Signal::C2Out => "C2OUT",
            Signal::CvRef => "CVREF",
            Signal::T0Cki => "T0CKI",
            Signal::Int => "INT",
        }
    }
}

/// Signal-to-pin routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpsMap {
    routes: [Option<PinId>; Signal::COUNT],
    defaults: [Option<PinId>; Signal::COUNT],
}

impl PpsMap {
    pub fn new(defaults: &[(Signal, PinId)]) -> Self {
        let mut routes = [None; Signal::COUNT];
        for &(signal, pin) in defaults {
            routes[signal as usize] = Some(pin);
        }
        Self {
            routes,
            defaults: routes,
        }
    }

    /// Restore the descriptor routing
    pub fn reset(&mut self) {
        self.routes = self.defaults;
    }

    #[inline]
    pub fn pin(&self, signal: Signal) -> Option<PinId> {
        self.routes[signal as usize]
    }

    /// Route `signal` to `pin`, returning the previous pin
    pub fn assign(&mut self, signal: Signal, pin: PinId) -> Option<PinId> {
        self.routes[signal as usize].replace(pin)
    }

    /// Signals currently routed to `pin`
    pub fn signals_on(&self, pin: PinId) -> impl Iterator<Item = Signal> + '_ {
        Signal::ALL
            .into_iter()
            .filter(move |s| self.routes[*s as usize] == Some(pin))
    }
}

impl Default for PpsMap {
    fn default() -> Self {
        Self::new(&[])
    }
}
