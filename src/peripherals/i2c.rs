//! I2C bus engine
//!
//! The slave side is driven purely by SCL/SDA pin edges, which may arrive at
//! any cycle. SDA changing while SCL is high is a START (falling) or STOP
//! (rising); otherwise data is sampled on SCL rising edges and the slave
//! changes SDA after SCL falls. The slave holds SCL low (clock stretching)
//! while firmware has work to do: after a read address until CKP is set,
//! after a 10-bit address byte until SSPADD is rewritten, and after each
//! received byte when SEN is set.
//!
//! The master (MSSP, SSPM=1000) runs one command at a time as a sequence of
//! half-bit steps on the SSP clock trigger. A step that releases SCL waits
//! until the line is actually high, so a stretching slave slows it down.

use crate::context::SimContext;
use crate::peripherals::ssp::{drive, level, sspcon, sspcon2, sspstat, SspKind, SspMode, SspRegs};
use crate::pins::Drive;
use crate::pps::Signal;
use crate::scheduler::EventId;

/// Master command being sequenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterOp {
    Start,
    RepeatedStart,
    Stop,
    Transmit,
    Receive,
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2cState {
    /// Not addressed; waiting for START
    #[default]
    Idle,
    /// Shifting in an address or data byte
    Receive,
    /// Driving ACK during the ninth clock
    Ack,
    /// Shifting out a data byte
    Transmit,
    /// Reading the master's ACK after a transmitted byte
    AwaitAck,
    /// Holding SCL low for firmware
    Stretch,
    Master(MasterOp),
}

/// Which byte of the transaction comes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Address,
    /// Second byte of a 10-bit address
    AddressLow,
    Data,
}

/// Direction after the current ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Next {
    #[default]
    Receive,
    Transmit,
}

enum Step {
    Next,
    /// SCL still held low by someone else
    Wait,
    Done,
    Collision,
}

#[derive(Debug, Clone, Default)]
pub struct I2c {
    state: I2cState,
    stage: Stage,
    next: Next,
    sr: u8,
    bits: u8,
    /// Both 10-bit address bytes matched since the last STOP
    addressed: bool,
    /// SSPIF is raised when the ninth clock ends
    irq_on_ack: bool,
    /// Stretching until firmware rewrites SSPADD
    ua_hold: bool,
    /// Master ACK seen on the ninth clock of a transmitted byte
    acked: bool,
    /// SCL level as of the last delivered edge
    scl_high: bool,
    step: u8,
}

fn hold_scl(ctx: &mut SimContext) {
    drive(ctx, Signal::Scl, Drive::Digital(false));
}

fn release_scl(ctx: &mut SimContext) {
    drive(ctx, Signal::Scl, Drive::Released);
}

fn set_sda(ctx: &mut SimContext, high: bool) {
    let d = if high {
        Drive::Released
    } else {
        Drive::Digital(false)
    };
    drive(ctx, Signal::Sda, d);
}

impl I2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> I2cState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == I2cState::Idle
    }

    pub(crate) fn stop(&mut self) {
        *self = Self::default();
    }

    /// Start following the bus in a freshly selected I2C mode
    pub(crate) fn enter(&mut self, ctx: &SimContext) {
        self.stop();
        self.scl_high = level(ctx, Signal::Scl);
    }

    fn go_idle(&mut self, ctx: &mut SimContext) {
        set_sda(ctx, true);
        release_scl(ctx);
        self.state = I2cState::Idle;
        self.bits = 0;
        self.ua_hold = false;
        self.irq_on_ack = false;
    }

    fn is_slave(regs: &SspRegs) -> Option<bool> {
        match regs.mode() {
            SspMode::I2cSlave { start_stop_irq, .. } => Some(start_stop_irq),
            _ => None,
        }
    }

    /// SDA edge; START or STOP when SCL is high, ignored otherwise
    pub(crate) fn sda_edge(&mut self, regs: &mut SspRegs, high: bool, ctx: &mut SimContext) {
        if !self.scl_high {
            return;
        }
        let slave = Self::is_slave(regs);
        if high {
            regs.stat.clear_bits(sspstat::S);
            regs.stat.set_bits(sspstat::P);
            if let Some(irq) = slave {
                tracing::debug!("I2C: stop");
                self.addressed = false;
                self.go_idle(ctx);
                if irq {
                    ctx.raise(regs.sspif);
                }
            }
        } else {
            regs.stat.set_bits(sspstat::S);
            regs.stat.clear_bits(sspstat::P);
            if let Some(irq) = slave {
                tracing::debug!("I2C: start");
                set_sda(ctx, true);
                self.state = I2cState::Receive;
                self.stage = Stage::Address;
                self.sr = 0;
                self.bits = 0;
                self.irq_on_ack = false;
                if irq {
                    ctx.raise(regs.sspif);
                }
            }
        }
    }

    /// SCL edge in slave mode
    pub(crate) fn scl_edge(&mut self, regs: &mut SspRegs, high: bool, ctx: &mut SimContext) {
        self.scl_high = high;
        if Self::is_slave(regs).is_none() {
            return;
        }
        if high {
            match self.state {
                I2cState::Receive if self.bits < 8 => {
                    self.sr = (self.sr << 1) | level(ctx, Signal::Sda) as u8;
                    self.bits += 1;
                }
                I2cState::AwaitAck => self.acked = !level(ctx, Signal::Sda),
                _ => {}
            }
            return;
        }
        match self.state {
            I2cState::Receive if self.bits == 8 => self.byte_received(regs, ctx),
            I2cState::Ack => self.end_ack(regs, ctx),
            I2cState::Transmit => {
                if self.bits < 8 {
                    self.sr <<= 1;
                    set_sda(ctx, self.sr & 0x80 != 0);
                    self.bits += 1;
                } else {
                    set_sda(ctx, true);
                    regs.stat.clear_bits(sspstat::BF);
                    self.state = I2cState::AwaitAck;
                }
            }
            I2cState::AwaitAck => {
                if self.acked {
                    ctx.raise(regs.sspif);
                    regs.con.clear_bits(sspcon::CKP);
                    hold_scl(ctx);
                    self.state = I2cState::Stretch;
                    self.next = Next::Transmit;
                } else {
                    tracing::debug!("I2C: master NACK ends read");
                    self.go_idle(ctx);
                }
            }
            _ => {}
        }
    }

    fn byte_received(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        let byte = self.sr;
        let ten_bit = matches!(regs.mode(), SspMode::I2cSlave { ten_bit: true, .. });
        let ack = match self.stage {
            Stage::Address if ten_bit => self.address_high(regs, byte),
            Stage::Address => self.address(regs, byte),
            Stage::AddressLow => self.address_low(regs, byte),
            Stage::Data => self.data(regs, byte),
        };
        if ack {
            set_sda(ctx, false);
            self.state = I2cState::Ack;
        } else {
            self.go_idle(ctx);
        }
    }

    /// 7-bit address or general call
    fn address(&mut self, regs: &mut SspRegs, byte: u8) -> bool {
        let general = byte == 0 && regs.con2.is_set(sspcon2::GCEN);
        let m = regs.address_mask();
        let matched = general || ((byte >> 1) & m) == ((regs.add.get() >> 1) & m);
        if !matched {
            tracing::debug!(byte, "I2C: address mismatch");
            return false;
        }
        if byte & 1 != 0 {
            self.begin_read(regs, byte);
            return true;
        }
        if !regs.receive(byte) {
            return false;
        }
        regs.stat.clear_bits(sspstat::DA | sspstat::RW);
        self.irq_on_ack = true;
        self.stage = Stage::Data;
        self.next = Next::Receive;
        true
    }

    /// `11110 A9 A8 R/W`
    fn address_high(&mut self, regs: &mut SspRegs, byte: u8) -> bool {
        if byte & 0xF8 != 0xF0 || (byte ^ regs.add.get()) & 0x06 != 0 {
            tracing::debug!(byte, "I2C: 10-bit high byte mismatch");
            return false;
        }
        if byte & 1 != 0 {
            if !self.addressed {
                return false;
            }
            self.begin_read(regs, byte);
            return true;
        }
        if !regs.receive(byte) {
            return false;
        }
        regs.stat.clear_bits(sspstat::DA | sspstat::RW);
        regs.stat.set_bits(sspstat::UA);
        self.irq_on_ack = true;
        self.ua_hold = true;
        self.stage = Stage::AddressLow;
        self.next = Next::Receive;
        true
    }

    fn address_low(&mut self, regs: &mut SspRegs, byte: u8) -> bool {
        if byte != regs.add.get() {
            tracing::debug!(byte, "I2C: 10-bit low byte mismatch");
            return false;
        }
        if !regs.receive(byte) {
            return false;
        }
        regs.stat.set_bits(sspstat::UA);
        self.irq_on_ack = true;
        self.ua_hold = true;
        self.addressed = true;
        self.stage = Stage::Data;
        self.next = Next::Receive;
        true
    }

    fn data(&mut self, regs: &mut SspRegs, byte: u8) -> bool {
        if !regs.receive(byte) {
            tracing::debug!(byte, "I2C: receive overflow");
            return false;
        }
        regs.stat.set_bits(sspstat::DA);
        regs.stat.clear_bits(sspstat::RW);
        self.irq_on_ack = true;
        true
    }

    /// Read address: SSPBUF holds the address, BF stays clear
    fn begin_read(&mut self, regs: &mut SspRegs, byte: u8) {
        regs.buf.put_value(byte);
        regs.stat.set_bits(sspstat::RW);
        regs.stat.clear_bits(sspstat::DA);
        self.irq_on_ack = true;
        self.stage = Stage::Data;
        self.next = Next::Transmit;
    }

    /// Ninth clock falling edge
    fn end_ack(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        set_sda(ctx, true);
        if std::mem::take(&mut self.irq_on_ack) {
            ctx.raise(regs.sspif);
        }
        self.bits = 0;
        self.sr = 0;
        match self.next {
            Next::Transmit => {
                regs.con.clear_bits(sspcon::CKP);
                hold_scl(ctx);
                self.state = I2cState::Stretch;
            }
            Next::Receive => {
                let sen = regs.kind == SspKind::Mssp
                    && regs.con2.is_set(sspcon2::SEN)
                    && regs.stat.is_set(sspstat::DA);
                if self.ua_hold && regs.stat.is_set(sspstat::UA) {
                    hold_scl(ctx);
                    self.state = I2cState::Stretch;
                } else if sen {
                    self.ua_hold = false;
                    regs.con.clear_bits(sspcon::CKP);
                    hold_scl(ctx);
                    self.state = I2cState::Stretch;
                } else {
                    self.ua_hold = false;
                    self.state = I2cState::Receive;
                }
            }
        }
    }

    /// CKP set by firmware
    pub(crate) fn release_clock(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        if self.state != I2cState::Stretch || self.ua_hold {
            return;
        }
        match self.next {
            Next::Transmit => {
                self.sr = regs.buf.get();
                self.bits = 1;
                set_sda(ctx, self.sr & 0x80 != 0);
                self.state = I2cState::Transmit;
            }
            Next::Receive => {
                self.bits = 0;
                self.state = I2cState::Receive;
            }
        }
        release_scl(ctx);
    }

    /// SSPADD written; ends a 10-bit address stretch
    pub(crate) fn address_updated(&mut self, ctx: &mut SimContext) {
        if self.state == I2cState::Stretch && self.ua_hold {
            self.ua_hold = false;
            self.bits = 0;
            self.state = I2cState::Receive;
            release_scl(ctx);
        }
    }

    pub(crate) fn write_slave(&mut self, regs: &mut SspRegs, value: u8, _ctx: &mut SimContext) {
        if regs.bf() || self.state == I2cState::Transmit {
            regs.collision();
            return;
        }
        regs.buf.put_value(value);
        if self.next == Next::Transmit {
            regs.stat.set_bits(sspstat::BF);
        }
    }

    fn busy(&self) -> bool {
        matches!(self.state, I2cState::Master(_))
    }

    fn begin(&mut self, op: MasterOp, regs: &SspRegs, ctx: &mut SimContext) {
        tracing::debug!(?op, "I2C: master command");
        self.state = I2cState::Master(op);
        self.step = 0;
        self.bits = 0;
        ctx.schedule_in(EventId::SspClock, half_period(regs));
    }

    /// SSPBUF write in master mode transmits a byte
    pub(crate) fn write_master(&mut self, regs: &mut SspRegs, value: u8, ctx: &mut SimContext) {
        if self.busy() {
            regs.collision();
            return;
        }
        regs.buf.put_value(value);
        regs.stat.set_bits(sspstat::BF | sspstat::RW);
        self.sr = value;
        self.begin(MasterOp::Transmit, regs, ctx);
    }

    /// SSPCON2 bits newly set by firmware
    pub(crate) fn command(&mut self, regs: &mut SspRegs, started: u8, ctx: &mut SimContext) {
        const COMMANDS: u8 = sspcon2::SEN
            | sspcon2::RSEN
            | sspcon2::PEN
            | sspcon2::RCEN
            | sspcon2::ACKEN;
        let started = started & COMMANDS;
        if started == 0 {
            return;
        }
        if self.busy() {
            regs.con2.clear_bits(started);
            regs.collision();
            return;
        }
        let op = if started & sspcon2::SEN != 0 {
            MasterOp::Start
        } else if started & sspcon2::RSEN != 0 {
            MasterOp::RepeatedStart
        } else if started & sspcon2::PEN != 0 {
            MasterOp::Stop
        } else if started & sspcon2::RCEN != 0 {
            self.sr = 0;
            MasterOp::Receive
        } else {
            MasterOp::Ack
        };
        if op == MasterOp::Start && !(level(ctx, Signal::Scl) && level(ctx, Signal::Sda)) {
            self.collide(regs, ctx);
            return;
        }
        self.begin(op, regs, ctx);
    }

    /// One master half period
    pub(crate) fn master_tick(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        let I2cState::Master(op) = self.state else {
            return;
        };
        let scl = level(ctx, Signal::Scl);
        let sda = level(ctx, Signal::Sda);
        let step = match op {
            MasterOp::Start => match self.step {
                0 if !(scl && sda) => Step::Collision,
                0 => {
                    set_sda(ctx, false);
                    Step::Next
                }
                _ => {
                    hold_scl(ctx);
                    Step::Done
                }
            },
            MasterOp::RepeatedStart => match self.step {
                0 => {
                    set_sda(ctx, true);
                    Step::Next
                }
                1 => {
                    release_scl(ctx);
                    Step::Next
                }
                2 if !scl => Step::Wait,
                2 if !sda => Step::Collision,
                2 => {
                    set_sda(ctx, false);
                    Step::Next
                }
                _ => {
                    hold_scl(ctx);
                    Step::Done
                }
            },
            MasterOp::Stop => match self.step {
                0 => {
                    set_sda(ctx, false);
                    Step::Next
                }
                1 => {
                    release_scl(ctx);
                    Step::Next
                }
                _ if !scl => Step::Wait,
                _ => {
                    set_sda(ctx, true);
                    Step::Done
                }
            },
            MasterOp::Transmit => self.transmit_step(regs, scl, sda, ctx),
            MasterOp::Receive => {
                if self.step % 2 == 0 {
                    if self.step == 0 {
                        set_sda(ctx, true);
                    }
                    release_scl(ctx);
                    Step::Next
                } else if !scl {
                    Step::Wait
                } else {
                    self.sr = (self.sr << 1) | sda as u8;
                    self.bits += 1;
                    hold_scl(ctx);
                    if self.bits == 8 {
                        Step::Done
                    } else {
                        Step::Next
                    }
                }
            }
            MasterOp::Ack => match self.step {
                0 => {
                    set_sda(ctx, regs.con2.is_set(sspcon2::ACKDT));
                    Step::Next
                }
                1 => {
                    release_scl(ctx);
                    Step::Next
                }
                2 if !scl => Step::Wait,
                2 => {
                    hold_scl(ctx);
                    Step::Next
                }
                _ => {
                    set_sda(ctx, true);
                    Step::Done
                }
            },
        };

        match step {
            Step::Next => {
                self.step += 1;
                ctx.schedule_in(EventId::SspClock, half_period(regs));
            }
            Step::Wait => ctx.schedule_in(EventId::SspClock, half_period(regs)),
            Step::Done => self.finish(op, regs, ctx),
            Step::Collision => self.collide(regs, ctx),
        }
    }

    /// Eight data bits then the ACK clock, two steps per bit
    fn transmit_step(&mut self, regs: &mut SspRegs, scl: bool, sda: bool, ctx: &mut SimContext) -> Step {
        let bit = self.step / 2;
        if self.step % 2 == 0 {
            if bit < 8 {
                set_sda(ctx, self.sr & (0x80 >> bit) != 0);
            } else {
                set_sda(ctx, true);
            }
            release_scl(ctx);
            return Step::Next;
        }
        if !scl {
            return Step::Wait;
        }
        if bit < 8 {
            let sent = self.sr & (0x80 >> bit) != 0;
            if sent && !sda {
                return Step::Collision;
            }
            hold_scl(ctx);
            Step::Next
        } else {
            regs.con2.assign(sspcon2::ACKSTAT, sda);
            hold_scl(ctx);
            Step::Done
        }
    }

    fn finish(&mut self, op: MasterOp, regs: &mut SspRegs, ctx: &mut SimContext) {
        self.state = I2cState::Idle;
        match op {
            MasterOp::Start => regs.con2.clear_bits(sspcon2::SEN),
            MasterOp::RepeatedStart => regs.con2.clear_bits(sspcon2::RSEN),
            MasterOp::Stop => regs.con2.clear_bits(sspcon2::PEN),
            MasterOp::Transmit => regs.stat.clear_bits(sspstat::BF | sspstat::RW),
            MasterOp::Receive => {
                regs.con2.clear_bits(sspcon2::RCEN);
                if !regs.receive(self.sr) {
                    tracing::debug!(sr = self.sr, "I2C: master receive overflow");
                }
            }
            MasterOp::Ack => regs.con2.clear_bits(sspcon2::ACKEN),
        }
        ctx.raise(regs.sspif);
    }

    /// Lost arbitration: abort, release the bus, flag BCLIF
    fn collide(&mut self, regs: &mut SspRegs, ctx: &mut SimContext) {
        tracing::debug!(state = ?self.state, "I2C: bus collision");
        regs.con2.clear_bits(
            sspcon2::SEN | sspcon2::RSEN | sspcon2::PEN | sspcon2::RCEN | sspcon2::ACKEN,
        );
        regs.stat.clear_bits(sspstat::BF | sspstat::RW);
        ctx.cancel(EventId::SspClock);
        self.go_idle(ctx);
        if let Some(bclif) = regs.bclif {
            ctx.raise(bclif);
        }
    }
}

/// Baud generator half period in cycles
fn half_period(regs: &SspRegs) -> u64 {
    ((regs.add.get() as u64 + 1) / 2).max(1)
}
