//! CPU helper functions
//!
//! - Flag helpers
//! - Address resolution (direct with RP1:RP0, indirect with IRP:FSR)
//! - File register read/write, with the core registers handled here
//! - Stack push/pop
//! - ALU operations that set C, DC and Z

use super::flags;
use super::{Cpu, PC_MASK, STACK_DEPTH};
use crate::bus::Bus;
use crate::context::SimContext;
use crate::register::RegKind;

impl Cpu {
    // ========== Flag Helpers ==========

    #[inline]
    pub fn flag_c(&self) -> bool {
        self.status & flags::C != 0
    }

    #[inline]
    pub fn flag_z(&self) -> bool {
        self.status & flags::Z != 0
    }

    #[inline]
    pub fn flag_dc(&self) -> bool {
        self.status & flags::DC != 0
    }

    #[inline]
    pub(super) fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.status |= mask;
        } else {
            self.status &= !mask;
        }
    }

    #[inline]
    pub(super) fn set_z(&mut self, value: u8) {
        self.set_flag(flags::Z, value == 0);
    }

    // ========== Addressing ==========

    /// Full data address for file operand `f`. INDF resolves through FSR.
    pub fn resolve(&self, f: u8, bus: &Bus) -> u16 {
        let direct = ((self.bank() as u16) << 7) | (f as u16 & 0x7F);
        if bus.kind(direct) == Some(RegKind::Indf) {
            self.indirect_address()
        } else {
            direct
        }
    }

    #[inline]
    pub fn indirect_address(&self) -> u16 {
        (((self.status & flags::IRP) as u16) << 1) | self.fsr as u16
    }

    // ========== File Registers ==========

    pub(super) fn read_file(&mut self, f: u8, bus: &mut Bus, ctx: &mut SimContext) -> u8 {
        let addr = self.resolve(f, bus);
        self.read_address(addr, bus, ctx)
    }

    pub fn read_address(&mut self, addr: u16, bus: &mut Bus, ctx: &mut SimContext) -> u8 {
        match bus.kind(addr) {
            // INDF through FSR pointing at INDF
            Some(RegKind::Indf) => 0,
            Some(RegKind::Pcl) => self.pc as u8,
            Some(RegKind::Status) => self.status,
            Some(RegKind::Fsr) => self.fsr,
            Some(RegKind::Pclath) => self.pclath,
            _ => bus.read(addr, ctx),
        }
    }

    pub(super) fn write_file(&mut self, f: u8, value: u8, bus: &mut Bus, ctx: &mut SimContext) {
        let addr = self.resolve(f, bus);
        self.write_address(addr, value, bus, ctx);
    }

    pub fn write_address(&mut self, addr: u16, value: u8, bus: &mut Bus, ctx: &mut SimContext) {
        match bus.kind(addr) {
            Some(RegKind::Indf) => {}
            Some(RegKind::Pcl) => {
                self.pc = ((((self.pclath & 0x1F) as u16) << 8) | value as u16) & PC_MASK;
                self.pc_loaded = true;
            }
            Some(RegKind::Status) => {
                self.status = (self.status & flags::READ_ONLY) | (value & !flags::READ_ONLY);
            }
            Some(RegKind::Fsr) => self.fsr = value,
            Some(RegKind::Pclath) => self.pclath = value & 0x1F,
            _ => bus.write(addr, value, ctx),
        }
    }

    /// Debugger view of a data address, core registers included
    pub fn peek_address(&self, addr: u16, bus: &Bus, ctx: &SimContext) -> u8 {
        match bus.kind(addr) {
            Some(RegKind::Indf) => {
                let target = self.indirect_address();
                if bus.kind(target) == Some(RegKind::Indf) {
                    0
                } else {
                    self.peek_address(target, bus, ctx)
                }
            }
            Some(RegKind::Pcl) => self.pc as u8,
            Some(RegKind::Status) => self.status,
            Some(RegKind::Fsr) => self.fsr,
            Some(RegKind::Pclath) => self.pclath,
            _ => bus.peek(addr, ctx),
        }
    }

    /// Debugger write, core registers included. TO/PD are writable here.
    pub fn poke_address(&mut self, addr: u16, value: u8, bus: &mut Bus, ctx: &mut SimContext) {
        match bus.kind(addr) {
            Some(RegKind::Indf) => {
                let target = self.indirect_address();
                if bus.kind(target) != Some(RegKind::Indf) {
                    self.poke_address(target, value, bus, ctx);
                }
            }
            Some(RegKind::Pcl) => self.pc = (self.pc & 0x1F00) | value as u16,
            Some(RegKind::Status) => self.status = value,
            Some(RegKind::Fsr) => self.fsr = value,
            Some(RegKind::Pclath) => self.pclath = value & 0x1F,
            _ => bus.poke(addr, value, ctx),
        }
    }

    // ========== Stack ==========

    pub(super) fn push(&mut self, pc: u16) {
        self.stack[self.sp] = pc;
        self.sp = (self.sp + 1) % STACK_DEPTH;
    }

    pub(super) fn pop(&mut self) -> u16 {
        self.sp = (self.sp + STACK_DEPTH - 1) % STACK_DEPTH;
        self.stack[self.sp]
    }

    /// CALL/GOTO target: PCLATH<4:3> supply the page
    #[inline]
    pub(super) fn page_target(&self, target: u16) -> u16 {
        ((((self.pclath & 0x18) as u16) << 8) | target) & PC_MASK
    }

    // ========== ALU ==========

    pub(super) fn alu_add(&mut self, a: u8, b: u8) -> u8 {
        let (result, carry) = a.overflowing_add(b);
        self.set_flag(flags::C, carry);
        self.set_flag(flags::DC, (a & 0x0F) + (b & 0x0F) > 0x0F);
        self.set_z(result);
        result
    }

    /// `a - b`; C and DC are not-borrow
    pub(super) fn alu_sub(&mut self, a: u8, b: u8) -> u8 {
        let result = a.wrapping_sub(b);
        self.set_flag(flags::C, a >= b);
        self.set_flag(flags::DC, (a & 0x0F) >= (b & 0x0F));
        self.set_z(result);
        result
    }
}
