//! Asynchronous USART / EUSART
//!
//! Transmit and receive are independent bit engines clocked by the baud rate
//! generator. The receiver finds a start bit on the falling edge of RX and
//! then samples each bit three times inside a 16-state bit window, taking the
//! majority; a start bit that does not hold low is discarded. Received bytes
//! go into a two-deep FIFO read through RCREG. A third byte arriving while the
//! FIFO is full is dropped, sets OERR and stalls the receiver until CREN is
//! cleared.
//!
//! Synchronous mode is not modelled: with SYNC set both engines stay idle.
//!
//! TXIF and RCIF are level flags owned by this module: TXIF follows "TXREG
//! empty" while the transmitter is enabled, RCIF follows "FIFO not empty".

use std::collections::VecDeque;

use crate::context::SimContext;
use crate::peripherals::interrupt::InterruptSource;
use crate::pins::Drive;
use crate::pps::Signal;
use crate::register::{Peripheral, ResetType, Sfr};
use crate::scheduler::EventId;

/// TXSTA bits
pub mod txsta {
    pub const CSRC: u8 = 0x80;
    pub const TX9: u8 = 0x40;
    pub const TXEN: u8 = 0x20;
    pub const SYNC: u8 = 0x10;
    pub const SENDB: u8 = 0x08;
    pub const BRGH: u8 = 0x04;
    pub const TRMT: u8 = 0x02;
    pub const TX9D: u8 = 0x01;
}

/// RCSTA bits
pub mod rcsta {
    pub const SPEN: u8 = 0x80;
    pub const RX9: u8 = 0x40;
    pub const SREN: u8 = 0x20;
    pub const CREN: u8 = 0x10;
    pub const ADDEN: u8 = 0x08;
    pub const FERR: u8 = 0x04;
    pub const OERR: u8 = 0x02;
    pub const RX9D: u8 = 0x01;
}

/// BAUDCTL bits (EUSART)
pub mod baudctl {
    pub const ABDOVF: u8 = 0x80;
    pub const RCIDL: u8 = 0x40;
    /// Async: transmit inverted data
    pub const SCKP: u8 = 0x10;
    pub const BRG16: u8 = 0x08;
    pub const WUE: u8 = 0x02;
    pub const ABDEN: u8 = 0x01;
}

/// Receive FIFO depth
pub const RX_FIFO_DEPTH: usize = 2;

/// Sample points within the 16 sub-states of a bit
const SAMPLES_LOW_SPEED: [u64; 3] = [7, 8, 9];
const SAMPLES_HIGH_SPEED: [u64; 3] = [4, 8, 12];

/// Break frame: start bit, twelve zeros, stop bit
const BREAK_BITS: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsartReg {
    Txsta,
    Rcsta,
    Txreg,
    Rcreg,
    Spbrg,
    Spbrgh,
    Baudctl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsartSpec {
    pub txif: InterruptSource,
    pub rcif: InterruptSource,
    /// EUSART: BAUDCTL and SPBRGH present
    pub eusart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RxByte {
    data: u8,
    ninth: bool,
    ferr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxState {
    #[default]
    Idle,
    /// Inside a frame; `bit` 0 is the start bit
    Frame { bit: u8, sample: u8, votes: u8 },
}

#[derive(Debug, Clone)]
pub struct Usart {
    spec: UsartSpec,
    txsta: Sfr,
    rcsta: Sfr,
    spbrg: Sfr,
    spbrgh: Sfr,
    baudctl: Sfr,
    txreg: u8,
    txreg_full: bool,
    /// Transmit frame, LSB first
    tsr: u16,
    tx_len: u8,
    tx_bit: u8,
    tx_break: bool,
    fifo: VecDeque<RxByte>,
    rx: RxState,
    rx_start: u64,
    rsr: u16,
}

impl Usart {
    pub fn new(spec: UsartSpec) -> Self {
        Self {
            spec,
            txsta: Sfr::new(txsta::TRMT, !txsta::TRMT),
            rcsta: Sfr::new(0x00, !(rcsta::FERR | rcsta::OERR | rcsta::RX9D)),
            spbrg: Sfr::new(0x00, 0xFF),
            spbrgh: Sfr::new(0x00, 0xFF),
            baudctl: Sfr::new(baudctl::RCIDL, baudctl::SCKP | baudctl::BRG16 | baudctl::WUE | baudctl::ABDEN),
            txreg: 0,
            txreg_full: false,
            tsr: 0,
            tx_len: 0,
            tx_bit: 0,
            tx_break: false,
            fifo: VecDeque::with_capacity(RX_FIFO_DEPTH),
            rx: RxState::Idle,
            rx_start: 0,
            rsr: 0,
        }
    }

    /// Register the RX sink
    pub fn attach(&self, ctx: &mut SimContext) {
        if let Some(pin) = ctx.pin_of(Signal::Rx) {
            ctx.pins.attach_sink(pin, Signal::Rx.sink_bit());
        }
    }

    fn brg16(&self) -> bool {
        self.spec.eusart && self.baudctl.is_set(baudctl::BRG16)
    }

    /// Instruction cycles per bit from SPBRG(H), BRGH and BRG16
    pub fn cycles_per_bit(&self) -> u64 {
        let brgh = self.txsta.is_set(txsta::BRGH);
        let n = if self.brg16() {
            u16::from_le_bytes([self.spbrg.get(), self.spbrgh.get()]) as u64
        } else {
            self.spbrg.get() as u64
        };
        let scale = match (self.brg16(), brgh) {
            (false, false) => 16,
            (false, true) | (true, false) => 4,
            (true, true) => 1,
        };
        (n + 1) * scale
    }

    pub fn baud_rate(&self, ctx: &SimContext) -> f64 {
        ctx.instruction_hz() / self.cycles_per_bit() as f64
    }

    pub fn rx_state(&self) -> RxState {
        self.rx
    }

    pub fn rx_pending(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_transmitting(&self) -> bool {
        self.tx_len != 0
    }

    fn tx_enabled(&self) -> bool {
        self.rcsta.is_set(rcsta::SPEN)
            && self.txsta.is_set(txsta::TXEN)
            && !self.txsta.is_set(txsta::SYNC)
    }

    fn rx_enabled(&self) -> bool {
        self.rcsta.is_set(rcsta::SPEN)
            && !self.txsta.is_set(txsta::SYNC)
            && self.rcsta.is_set(rcsta::CREN)
            && !self.rcsta.is_set(rcsta::OERR)
    }

    fn inverted(&self) -> bool {
        self.spec.eusart && self.baudctl.is_set(baudctl::SCKP)
    }

    fn drive_tx(&self, level: bool, ctx: &mut SimContext) {
        if let Some(pin) = ctx.pin_of(Signal::Tx) {
            ctx.pins.drive(pin, Signal::Tx, Drive::Digital(level ^ self.inverted()));
        }
    }

    fn update_txif(&self, ctx: &mut SimContext) {
        if self.tx_enabled() && !self.txreg_full {
            ctx.raise(self.spec.txif);
        } else {
            ctx.irq.clear(self.spec.txif);
        }
    }

    /// Attach or release TX after SPEN/TXEN/SYNC changed
    fn refresh_tx(&mut self, ctx: &mut SimContext) {
        let pin = ctx.pin_of(Signal::Tx);
        if self.tx_enabled() {
            if let Some(pin) = pin {
                if ctx.pins.source_drive(pin, Signal::Tx).is_none() {
                    ctx.pins
                        .attach_source(pin, Signal::Tx, Drive::Digital(!self.inverted()));
                }
            }
            if self.txreg_full && !self.is_transmitting() {
                self.load_tsr(ctx);
            }
        } else {
            ctx.cancel(EventId::UsartTx);
            self.tx_len = 0;
            self.txsta.set_bits(txsta::TRMT);
            if let Some(pin) = pin {
                ctx.pins.release_source(pin, Signal::Tx);
            }
        }
        self.update_txif(ctx);
    }

    /// TXREG → TSR and start shifting
    fn load_tsr(&mut self, ctx: &mut SimContext) {
        self.txreg_full = false;
        self.tx_break = self.txsta.is_set(txsta::SENDB);
        if self.tx_break {
            self.tsr = 1 << (BREAK_BITS - 1);
            self.tx_len = BREAK_BITS;
        } else {
            let mut frame = (self.txreg as u16) << 1;
            let mut len = 10;
            if self.txsta.is_set(txsta::TX9) {
                frame |= ((self.txsta.get() & txsta::TX9D) as u16) << 9;
                len = 11;
            }
            self.tsr = frame | 1 << (len - 1);
            self.tx_len = len;
        }
        tracing::debug!(data = self.txreg, brk = self.tx_break, "USART: transmit");
        self.tx_bit = 0;
        self.txsta.clear_bits(txsta::TRMT);
        self.drive_tx(self.tsr & 1 != 0, ctx);
        ctx.schedule_in(EventId::UsartTx, self.cycles_per_bit());
        self.update_txif(ctx);
    }

    fn on_tx_bit(&mut self, ctx: &mut SimContext) {
        if !self.is_transmitting() {
            return;
        }
        self.tx_bit += 1;
        if self.tx_bit < self.tx_len {
            self.drive_tx((self.tsr >> self.tx_bit) & 1 != 0, ctx);
            ctx.schedule_in(EventId::UsartTx, self.cycles_per_bit());
            return;
        }
        if self.tx_break {
            self.txsta.clear_bits(txsta::SENDB);
            self.tx_break = false;
        }
        self.tx_len = 0;
        if self.txreg_full && self.tx_enabled() {
            self.load_tsr(ctx);
        } else {
            self.txsta.set_bits(txsta::TRMT);
        }
    }

    /// Edge on the RX pin
    pub fn on_rx_edge(&mut self, high: bool, ctx: &mut SimContext) {
        if high || self.rx != RxState::Idle || !self.rx_enabled() {
            return;
        }
        self.rx = RxState::Frame {
            bit: 0,
            sample: 0,
            votes: 0,
        };
        self.rx_start = ctx.now();
        self.rsr = 0;
        self.baudctl.clear_bits(baudctl::RCIDL);
        self.schedule_sample(0, 0, ctx);
    }

    fn schedule_sample(&self, bit: u8, sample: u8, ctx: &mut SimContext) {
        let offsets = if self.txsta.is_set(txsta::BRGH) {
            SAMPLES_HIGH_SPEED
        } else {
            SAMPLES_LOW_SPEED
        };
        let sub = 16 * bit as u64 + offsets[sample as usize];
        // Fast divisors fold sub-states onto one cycle; keep samples apart
        let at = (self.rx_start + self.cycles_per_bit() * sub / 16).max(ctx.now() + 1);
        ctx.queue.schedule(EventId::UsartRx, at);
    }

    fn rx_level(ctx: &SimContext) -> bool {
        ctx.pin_of(Signal::Rx)
            .map(|pin| ctx.pins.level(pin))
            .unwrap_or(true)
    }

    fn on_rx_sample(&mut self, ctx: &mut SimContext) {
        let RxState::Frame { bit, sample, votes } = self.rx else {
            return;
        };
        let votes = votes + Self::rx_level(ctx) as u8;
        if sample < 2 {
            self.rx = RxState::Frame {
                bit,
                sample: sample + 1,
                votes,
            };
            self.schedule_sample(bit, sample + 1, ctx);
            return;
        }

        let level = votes >= 2;
        let data_bits = if self.rcsta.is_set(rcsta::RX9) { 9 } else { 8 };
        match bit {
            0 if level => {
                tracing::debug!(cycle = ctx.now(), "USART: false start bit");
                self.rx_idle();
                return;
            }
            0 => {}
            b if b <= data_bits => self.rsr |= (level as u16) << (b - 1),
            _ => {
                self.finish_frame(!level, ctx);
                return;
            }
        }
        self.rx = RxState::Frame {
            bit: bit + 1,
            sample: 0,
            votes: 0,
        };
        self.schedule_sample(bit + 1, 0, ctx);
    }

    fn rx_idle(&mut self) {
        self.rx = RxState::Idle;
        self.baudctl.set_bits(baudctl::RCIDL);
    }

    fn finish_frame(&mut self, ferr: bool, ctx: &mut SimContext) {
        self.rx_idle();
        let byte = RxByte {
            data: self.rsr as u8,
            ninth: self.rsr & 0x100 != 0,
            ferr,
        };
        let rx9 = self.rcsta.is_set(rcsta::RX9);
        if rx9 && self.rcsta.is_set(rcsta::ADDEN) && !byte.ninth {
            return;
        }
        if self.fifo.len() >= RX_FIFO_DEPTH {
            tracing::debug!(data = byte.data, "USART: receive overrun");
            self.rcsta.set_bits(rcsta::OERR);
            return;
        }
        tracing::debug!(data = byte.data, ferr, "USART: received");
        self.fifo.push_back(byte);
        self.sync_rx_status();
        ctx.raise(self.spec.rcif);
    }

    /// FERR and RX9D describe the byte at the head of the FIFO
    fn sync_rx_status(&mut self) {
        if let Some(front) = self.fifo.front() {
            self.rcsta.assign(rcsta::FERR, front.ferr);
            self.rcsta.assign(rcsta::RX9D, front.ninth);
        }
    }

    fn abort_rx(&mut self, ctx: &mut SimContext) {
        ctx.cancel(EventId::UsartRx);
        self.rx_idle();
    }

    /// Trigger callback
    pub fn on_event(&mut self, event: EventId, ctx: &mut SimContext) {
        match event {
            EventId::UsartTx => self.on_tx_bit(ctx),
            EventId::UsartRx => self.on_rx_sample(ctx),
            _ => {}
        }
    }

    fn put_rcsta(&mut self, value: u8, ctx: &mut SimContext) {
        let old = self.rcsta.get();
        self.rcsta.put(value);
        let new = self.rcsta.get();
        let cren_off = old & rcsta::CREN != 0 && new & rcsta::CREN == 0;
        let spen_off = old & rcsta::SPEN != 0 && new & rcsta::SPEN == 0;
        if cren_off || spen_off {
            self.rcsta.clear_bits(rcsta::OERR);
            self.abort_rx(ctx);
        }
        if (old ^ new) & rcsta::SPEN != 0 {
            self.refresh_tx(ctx);
        }
    }

    fn put_txsta(&mut self, value: u8, ctx: &mut SimContext) {
        let old = self.txsta.get();
        self.txsta.put(value);
        let changed = old ^ self.txsta.get();
        if changed & txsta::SYNC != 0 && self.txsta.is_set(txsta::SYNC) {
            self.abort_rx(ctx);
        }
        if changed & (txsta::TXEN | txsta::SYNC) != 0 {
            self.refresh_tx(ctx);
        }
    }

    fn put_txreg(&mut self, value: u8, ctx: &mut SimContext) {
        self.txreg = value;
        self.txreg_full = true;
        if self.tx_enabled() && !self.is_transmitting() {
            self.load_tsr(ctx);
        } else {
            self.update_txif(ctx);
        }
    }
}

impl Peripheral for Usart {
    type Reg = UsartReg;

    fn peek(&self, reg: UsartReg, _ctx: &SimContext) -> u8 {
        match reg {
            UsartReg::Txsta => self.txsta.get(),
            UsartReg::Rcsta => self.rcsta.get(),
            UsartReg::Txreg => self.txreg,
            UsartReg::Rcreg => self.fifo.front().map(|b| b.data).unwrap_or(0),
            UsartReg::Spbrg => self.spbrg.get(),
            UsartReg::Spbrgh => self.spbrgh.get(),
            UsartReg::Baudctl => self.baudctl.get(),
        }
    }

    /// Reading RCREG pops the FIFO
    fn get(&mut self, reg: UsartReg, ctx: &mut SimContext) -> u8 {
        if reg != UsartReg::Rcreg {
            return self.peek(reg, ctx);
        }
        let data = match self.fifo.pop_front() {
            Some(byte) => byte.data,
            None => 0,
        };
        self.sync_rx_status();
        if self.fifo.is_empty() {
            ctx.irq.clear(self.spec.rcif);
        }
        data
    }

    fn put(&mut self, reg: UsartReg, value: u8, ctx: &mut SimContext) {
        match reg {
            UsartReg::Txsta => self.put_txsta(value, ctx),
            UsartReg::Rcsta => self.put_rcsta(value, ctx),
            UsartReg::Txreg => self.put_txreg(value, ctx),
            UsartReg::Rcreg => {}
            UsartReg::Spbrg => self.spbrg.put(value),
            UsartReg::Spbrgh => self.spbrgh.put(value),
            UsartReg::Baudctl => self.baudctl.put(value),
        }
    }

    fn put_value(&mut self, reg: UsartReg, value: u8, ctx: &mut SimContext) {
        match reg {
            UsartReg::Txsta => self.txsta.put_value(value),
            UsartReg::Rcsta => self.rcsta.put_value(value),
            UsartReg::Txreg => self.txreg = value,
            UsartReg::Rcreg => {}
            UsartReg::Spbrg => self.spbrg.put_value(value),
            UsartReg::Spbrgh => self.spbrgh.put_value(value),
            UsartReg::Baudctl => self.baudctl.put_value(value),
        }
        self.refresh_tx(ctx);
    }

    fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        for reg in [
            &mut self.txsta,
            &mut self.rcsta,
            &mut self.spbrg,
            &mut self.spbrgh,
            &mut self.baudctl,
        ] {
            reg.reset(kind);
        }
        self.txreg_full = false;
        self.fifo.clear();
        ctx.cancel(EventId::UsartTx);
        self.abort_rx(ctx);
        self.refresh_tx(ctx);
        ctx.irq.clear(self.spec.rcif);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::{PinInput, PinSpec};
    use crate::pps::PpsMap;

    const TXIF: InterruptSource = InterruptSource::pir(0, 0x10);
    const RCIF: InterruptSource = InterruptSource::pir(0, 0x20);
    const TX: usize = 0;
    const RX: usize = 1;
    /// SPBRG=0, BRGH=0
    const BIT: u64 = 16;

    fn setup(eusart: bool) -> (Usart, SimContext) {
        let mut ctx = SimContext::for_test(&[PinSpec::io("RC6"), PinSpec::io("RC7")]);
        ctx.pps = PpsMap::new(&[(Signal::Tx, TX), (Signal::Rx, RX)]);
        let mut usart = Usart::new(UsartSpec {
            txif: TXIF,
            rcif: RCIF,
            eusart,
        });
        usart.attach(&mut ctx);
        usart.reset(ResetType::PowerOn, &mut ctx);
        ctx.pins.set_stimulus(RX, PinInput::Digital(true));
        while ctx.pins.next_event().is_some() {}
        (usart, ctx)
    }

    fn receiver(eusart: bool) -> (Usart, SimContext) {
        let (mut usart, mut ctx) = setup(eusart);
        usart.put(UsartReg::Rcsta, rcsta::SPEN | rcsta::CREN, &mut ctx);
        (usart, ctx)
    }

    /// Advance `cycles`, driving RX from `line` and recording TX
    fn run(
        usart: &mut Usart,
        ctx: &mut SimContext,
        cycles: u64,
        line: impl Fn(u64) -> bool,
    ) -> Vec<bool> {
        let mut tx = Vec::new();
        for _ in 0..cycles {
            ctx.cycles += 1;
            ctx.pins.set_stimulus(RX, PinInput::Digital(line(ctx.cycles)));
            while let Some(ev) = ctx.pins.next_event() {
                if ev.edge && ev.pin == RX {
                    usart.on_rx_edge(ev.level, ctx);
                }
            }
            let pass = ctx.queue.pass(ctx.cycles);
            while let Some(ev) = ctx.queue.pop_due(&pass) {
                usart.on_event(ev, ctx);
            }
            tx.push(ctx.pins.level(TX));
        }
        tx
    }

    fn frame(byte: u8) -> Vec<bool> {
        let mut bits = vec![false];
        bits.extend((0..8).map(|i| (byte >> i) & 1 != 0));
        bits.push(true);
        bits
    }

    fn line(start: u64, bits: Vec<bool>, bit: u64) -> impl Fn(u64) -> bool {
        move |t| {
            if t < start {
                return true;
            }
            bits.get(((t - start) / bit) as usize).copied().unwrap_or(true)
        }
    }

    #[test]
    fn test_baud_divisors() {
        let (mut usart, mut ctx) = setup(true);
        usart.put(UsartReg::Spbrg, 25, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), 16 * 26);
        usart.put(UsartReg::Txsta, txsta::BRGH, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), 4 * 26);
        usart.put(UsartReg::Spbrgh, 0x01, &mut ctx);
        usart.put(UsartReg::Baudctl, baudctl::BRG16, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), 0x11A);
        usart.put(UsartReg::Txsta, 0, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), 4 * 0x11A);
        // 4 MHz, BRGH=1, SPBRG=25: 9615 baud
        usart.put(UsartReg::Baudctl, 0, &mut ctx);
        usart.put(UsartReg::Txsta, txsta::BRGH, &mut ctx);
        assert!((usart.baud_rate(&ctx) - 9615.38).abs() < 0.01);
    }

    #[test]
    fn test_sync_mode_leaves_engines_idle() {
        let (mut usart, mut ctx) = receiver(false);
        usart.put(UsartReg::Txsta, txsta::TXEN | txsta::SYNC, &mut ctx);
        usart.put(UsartReg::Txreg, 0x55, &mut ctx);
        let tx = run(&mut usart, &mut ctx, 200, line(5, frame(0xA5), BIT));
        assert!(!usart.is_transmitting());
        assert!(!ctx.irq.is_raised(RCIF));
        assert_eq!(usart.rx_pending(), 0);
        // TX pin not driven by the USART
        assert!(ctx.pins.source_drive(TX, Signal::Tx).is_none());
        assert!(tx.iter().all(|&l| l == tx[0]));
    }

    #[test]
    fn test_receive_byte() {
        let (mut usart, mut ctx) = receiver(false);
        run(&mut usart, &mut ctx, 200, line(5, frame(0xA5), BIT));
        assert!(ctx.irq.is_raised(RCIF));
        assert_eq!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::FERR, 0);
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0xA5);
        assert!(!ctx.irq.is_raised(RCIF));
    }

    #[test]
    fn test_majority_vote_rejects_single_glitch() {
        let (mut usart, mut ctx) = receiver(false);
        let base = line(5, frame(0xA5), BIT);
        // bit 3 of the frame (data bit 2, a one) dips low at its first sample
        let glitch = 5 + 3 * BIT + 7;
        run(&mut usart, &mut ctx, 200, move |t| {
            if t == glitch {
                !base(t)
            } else {
                base(t)
            }
        });
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0xA5);
    }

    #[test]
    fn test_majority_vote_follows_two_samples() {
        let (mut usart, mut ctx) = receiver(false);
        let base = line(5, frame(0xA5), BIT);
        // two of three samples of data bit 0 read low
        let first = 5 + BIT + 8;
        run(&mut usart, &mut ctx, 200, move |t| {
            if t == first || t == first + 1 {
                false
            } else {
                base(t)
            }
        });
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0xA4);
    }

    #[test]
    fn test_high_speed_sample_points() {
        let (mut usart, mut ctx) = receiver(false);
        usart.put(UsartReg::Txsta, txsta::BRGH, &mut ctx);
        usart.put(UsartReg::Spbrg, 3, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), BIT);
        let base = line(5, frame(0x3C), BIT);
        // sub-state 7 is not a sample point at high speed
        let ignored = 5 + 2 * BIT + 7;
        let single = 5 + 4 * BIT + 12;
        run(&mut usart, &mut ctx, 200, move |t| {
            if t == ignored || t == single {
                !base(t)
            } else {
                base(t)
            }
        });
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x3C);
    }

    #[test]
    fn test_false_start_bit_ignored() {
        let (mut usart, mut ctx) = receiver(false);
        run(&mut usart, &mut ctx, 40, |t| !(5..8).contains(&t));
        assert_eq!(usart.rx_state(), RxState::Idle);
        assert!(!ctx.irq.is_raised(RCIF));
        run(&mut usart, &mut ctx, 200, line(50, frame(0x42), BIT));
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x42);
    }

    #[test]
    fn test_fastest_divisor_samples_on_distinct_cycles() {
        let (mut usart, mut ctx) = receiver(true);
        usart.put(UsartReg::Baudctl, baudctl::BRG16, &mut ctx);
        usart.put(UsartReg::Txsta, txsta::BRGH, &mut ctx);
        assert_eq!(usart.cycles_per_bit(), 1);

        ctx.cycles = 10;
        ctx.pins.set_stimulus(RX, PinInput::Digital(false));
        while let Some(ev) = ctx.pins.next_event() {
            if ev.edge && ev.pin == RX {
                usart.on_rx_edge(ev.level, &mut ctx);
            }
        }

        let mut samples = 0;
        for _ in 0..64 {
            if let Some(at) = ctx.queue.next_cycle() {
                assert!(at > ctx.cycles, "sample at {} scheduled from {}", at, ctx.cycles);
            }
            ctx.cycles += 1;
            let pass = ctx.queue.pass(ctx.cycles);
            while let Some(ev) = ctx.queue.pop_due(&pass) {
                samples += 1;
                usart.on_event(ev, &mut ctx);
            }
        }
        // Start, eight data bits and stop, three votes each
        assert_eq!(samples, 30);
        assert_eq!(usart.rx_pending(), 1);
        assert!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::FERR != 0);
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x00);
    }

    #[test]
    fn test_framing_error() {
        let (mut usart, mut ctx) = receiver(false);
        let mut bits = frame(0x81);
        bits[9] = false;
        bits.push(true);
        run(&mut usart, &mut ctx, 220, line(5, bits, BIT));
        assert!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::FERR != 0);
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x81);
    }

    #[test]
    fn test_fifo_overrun_drops_newest_and_stalls() {
        let (mut usart, mut ctx) = receiver(false);
        for (i, byte) in [0x11u8, 0x22, 0x33, 0x44].into_iter().enumerate() {
            let start = ctx.cycles + 5;
            run(&mut usart, &mut ctx, 200, line(start, frame(byte), BIT));
            if i == 2 {
                assert!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::OERR != 0);
            }
        }
        assert_eq!(usart.rx_pending(), 2);
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x11);
        assert!(ctx.irq.is_raised(RCIF));
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x22);
        assert!(!ctx.irq.is_raised(RCIF));

        // still stalled until CREN is toggled
        let start = ctx.cycles + 5;
        run(&mut usart, &mut ctx, 200, line(start, frame(0x55), BIT));
        assert_eq!(usart.rx_pending(), 0);

        usart.put(UsartReg::Rcsta, rcsta::SPEN, &mut ctx);
        assert_eq!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::OERR, 0);
        usart.put(UsartReg::Rcsta, rcsta::SPEN | rcsta::CREN, &mut ctx);
        let start = ctx.cycles + 5;
        run(&mut usart, &mut ctx, 200, line(start, frame(0x66), BIT));
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x66);
    }

    #[test]
    fn test_address_detect_skips_data_frames() {
        let (mut usart, mut ctx) = setup(false);
        usart.put(
            UsartReg::Rcsta,
            rcsta::SPEN | rcsta::RX9 | rcsta::CREN | rcsta::ADDEN,
            &mut ctx,
        );
        let nine = |byte: u8, ninth: bool| {
            let mut bits = frame(byte);
            bits.insert(9, ninth);
            bits
        };
        let start = ctx.cycles + 5;
        run(&mut usart, &mut ctx, 220, line(start, nine(0x12, false), BIT));
        assert_eq!(usart.rx_pending(), 0);
        let start = ctx.cycles + 5;
        run(&mut usart, &mut ctx, 220, line(start, nine(0x34, true), BIT));
        assert!(usart.peek(UsartReg::Rcsta, &ctx) & rcsta::RX9D != 0);
        assert_eq!(usart.get(UsartReg::Rcreg, &mut ctx), 0x34);
    }

    fn transmitter() -> (Usart, SimContext) {
        let (mut usart, mut ctx) = setup(true);
        usart.put(UsartReg::Spbrg, 3, &mut ctx);
        usart.put(UsartReg::Rcsta, rcsta::SPEN, &mut ctx);
        usart.put(UsartReg::Txsta, txsta::TXEN | txsta::BRGH, &mut ctx);
        (usart, ctx)
    }

    /// Mid-bit levels of a recorded TX trace starting at index 0
    fn decode(trace: &[bool], bits: usize) -> Vec<bool> {
        (0..bits).map(|i| trace[i * BIT as usize + 7]).collect()
    }

    #[test]
    fn test_transmit_frame() {
        let (mut usart, mut ctx) = transmitter();
        assert!(ctx.pins.level(TX));
        assert!(ctx.irq.is_raised(TXIF));
        usart.put(UsartReg::Txreg, 0x5A, &mut ctx);
        assert!(!ctx.pins.level(TX));
        assert_eq!(usart.peek(UsartReg::Txsta, &ctx) & txsta::TRMT, 0);
        // TXREG moved straight into the shift register
        assert!(ctx.irq.is_raised(TXIF));

        let trace = run(&mut usart, &mut ctx, 10 * BIT, |_| true);
        assert_eq!(decode(&trace, 10), frame(0x5A));
        assert!(usart.peek(UsartReg::Txsta, &ctx) & txsta::TRMT != 0);
    }

    #[test]
    fn test_back_to_back_transmit() {
        let (mut usart, mut ctx) = transmitter();
        usart.put(UsartReg::Txreg, 0x01, &mut ctx);
        usart.put(UsartReg::Txreg, 0x80, &mut ctx);
        assert!(!ctx.irq.is_raised(TXIF));
        let trace = run(&mut usart, &mut ctx, 20 * BIT, |_| true);
        let mut expected = frame(0x01);
        expected.extend(frame(0x80));
        assert_eq!(decode(&trace, 20), expected);
        assert!(ctx.irq.is_raised(TXIF));
    }

    #[test]
    fn test_break_character() {
        let (mut usart, mut ctx) = transmitter();
        usart.put(UsartReg::Txsta, txsta::TXEN | txsta::BRGH | txsta::SENDB, &mut ctx);
        usart.put(UsartReg::Txreg, 0xFF, &mut ctx);
        let trace = run(&mut usart, &mut ctx, 14 * BIT, |_| true);
        let mut expected = vec![false; 13];
        expected.push(true);
        assert_eq!(decode(&trace, 14), expected);
        assert_eq!(usart.peek(UsartReg::Txsta, &ctx) & txsta::SENDB, 0);
    }

    #[test]
    fn test_inverted_transmit() {
        let (mut usart, mut ctx) = transmitter();
        usart.put(UsartReg::Txsta, 0, &mut ctx);
        usart.put(UsartReg::Baudctl, baudctl::SCKP, &mut ctx);
        usart.put(UsartReg::Txsta, txsta::TXEN | txsta::BRGH, &mut ctx);
        assert!(!ctx.pins.level(TX));
    }

    #[test]
    fn test_disable_transmitter_releases_pin() {
        let (mut usart, mut ctx) = transmitter();
        usart.put(UsartReg::Txreg, 0x00, &mut ctx);
        usart.put(UsartReg::Txsta, txsta::BRGH, &mut ctx);
        assert!(!usart.is_transmitting());
        assert!(!ctx.queue.is_pending(EventId::UsartTx));
        assert!(!ctx.irq.is_raised(TXIF));
        assert_eq!(ctx.pins.active_source(TX), None);
    }
}
