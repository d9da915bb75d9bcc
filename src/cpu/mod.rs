//! PIC14 (mid-range) CPU core
//!
//! The core owns W, the 13-bit program counter, STATUS, FSR, PCLATH and the
//! 8-level hardware stack. Everything else in the data space is reached
//! through the [`Bus`].
//!
//! # Module Organization
//!
//! - `flags`: STATUS bit constants
//! - `decode`: 14-bit word to [`Instruction`]
//! - `helpers`: file register access, banking, stack and ALU helpers
//! - `execute`: instruction semantics
//! - `asm`: instruction builders for test programs
//!
//! # Timing
//!
//! One instruction cycle is four oscillator clocks. Branches, taken skips,
//! returns and writes to PCL take two cycles; everything else takes one.

use crate::bus::Bus;
use crate::context::SimContext;
use crate::register::ResetType;

#[cfg(test)]
pub(crate) mod asm;
pub mod decode;
mod execute;
pub mod flags;
mod helpers;

#[cfg(test)]
mod tests;

pub use decode::{decode, encode, BitOp, Dest, FileOp, Instruction, LitOp};

/// Depth of the hardware return stack
pub const STACK_DEPTH: usize = 8;
/// Interrupt vector
pub const INTERRUPT_VECTOR: u16 = 0x0004;
/// Program counter width mask
pub const PC_MASK: u16 = 0x1FFF;

/// PIC14 CPU state
#[derive(Debug, Clone)]
pub struct Cpu {
    /// Working register
    pub w: u8,
    /// Program counter (13-bit)
    pub pc: u16,
    pub status: u8,
    pub fsr: u8,
    pub pclath: u8,
    stack: [u16; STACK_DEPTH],
    /// Next free stack slot; the stack wraps on overflow
    sp: usize,
    /// PC loaded by the executing instruction (branch or PCL write)
    pc_loaded: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            w: 0,
            pc: 0,
            status: flags::TO | flags::PD,
            fsr: 0,
            pclath: 0,
            stack: [0; STACK_DEPTH],
            sp: 0,
            pc_loaded: false,
        }
    }

    /// Core register state after a reset of `kind`
    pub fn reset(&mut self, kind: ResetType) {
        self.pc = 0;
        self.pclath = 0;
        self.pc_loaded = false;
        match kind {
            ResetType::PowerOn | ResetType::Brownout => {
                self.w = 0;
                self.fsr = 0;
                self.status = flags::TO | flags::PD;
                self.stack = [0; STACK_DEPTH];
                self.sp = 0;
            }
            // TO/PD keep what SLEEP left there
            ResetType::Mclr => self.status &= flags::TO | flags::PD | flags::Z | flags::DC | flags::C,
            ResetType::Watchdog => {
                self.status = (self.status & (flags::Z | flags::DC | flags::C)) | flags::PD;
            }
        }
    }

    /// Execute one instruction, returning the cycles it took
    pub fn step(&mut self, bus: &mut Bus, ctx: &mut SimContext) -> u32 {
        let word = ctx.program.fetch(self.pc);
        self.pc = (self.pc + 1) & PC_MASK;
        self.pc_loaded = false;
        self.execute(decode(word), bus, ctx)
    }

    /// Vector to 0x0004: push PC, clear GIE
    pub fn interrupt(&mut self, ctx: &mut SimContext) {
        self.push(self.pc);
        ctx.irq.clear_gie();
        self.pc = INTERRUPT_VECTOR;
    }

    /// Watchdog wake from sleep
    pub fn watchdog_wake(&mut self) {
        self.status &= !(flags::TO | flags::PD);
    }

    /// Return stack contents, oldest first
    pub fn stack(&self) -> Vec<u16> {
        (0..STACK_DEPTH)
            .map(|i| self.stack[(self.sp + i) % STACK_DEPTH])
            .collect()
    }

    /// Bank selected by RP1:RP0
    #[inline]
    pub fn bank(&self) -> u8 {
        (self.status >> 5) & 0x03
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
