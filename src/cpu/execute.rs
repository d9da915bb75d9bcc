//! PIC14 instruction execution
//!
//! - execute: dispatch on the decoded instruction
//! - execute_file: byte-oriented `(f, d)` operations
//! - execute_bit: BCF/BSF/BTFSC/BTFSS
//! - execute_literal: operations on W and an 8-bit literal

use super::decode::{BitOp, Dest, FileOp, Instruction, LitOp};
use super::flags;
use super::Cpu;
use crate::bus::Bus;
use crate::context::{Activity, SimContext};
use crate::peripherals::ports::PortReg;
use crate::peripherals::timer::TimerReg;
use crate::register::RegKind;

impl Cpu {
    pub fn execute(&mut self, inst: Instruction, bus: &mut Bus, ctx: &mut SimContext) -> u32 {
        match inst {
            Instruction::Nop | Instruction::Invalid(_) => 1,
            Instruction::Return => {
                self.pc = self.pop();
                2
            }
            Instruction::Retfie => {
                self.pc = self.pop();
                ctx.irq.set_gie();
                2
            }
            Instruction::Sleep => {
                self.status |= flags::TO;
                self.status &= !flags::PD;
                bus.peripherals.watchdog.clear(ctx);
                // A wake condition already pending makes SLEEP a NOP
                if !ctx.irq.wake_pending() {
                    ctx.activity = Activity::Sleeping;
                    bus.peripherals.set_sleeping(true, ctx);
                }
                1
            }
            Instruction::Clrwdt => {
                self.status |= flags::TO | flags::PD;
                bus.peripherals.watchdog.clear(ctx);
                1
            }
            Instruction::Option => {
                bus.peripherals
                    .write(RegKind::Timer(TimerReg::Option), self.w, ctx);
                1
            }
            Instruction::Tris(f) => {
                bus.peripherals
                    .write(RegKind::Port(PortReg::Tris(f - 5)), self.w, ctx);
                1
            }
            Instruction::Movwf(f) => {
                self.write_file(f, self.w, bus, ctx);
                self.cycles_for_write()
            }
            Instruction::Clrw => {
                self.w = 0;
                self.status |= flags::Z;
                1
            }
            Instruction::Clrf(f) => {
                self.write_file(f, 0, bus, ctx);
                self.status |= flags::Z;
                self.cycles_for_write()
            }
            Instruction::File(op, f, d) => self.execute_file(op, f, d, bus, ctx),
            Instruction::Bit(op, f, b) => self.execute_bit(op, f, b, bus, ctx),
            Instruction::Call(target) => {
                self.push(self.pc);
                self.pc = self.page_target(target);
                2
            }
            Instruction::Goto(target) => {
                self.pc = self.page_target(target);
                2
            }
            Instruction::Literal(op, k) => self.execute_literal(op, k),
        }
    }

    /// A write that landed on PCL costs an extra cycle
    #[inline]
    fn cycles_for_write(&self) -> u32 {
        if self.pc_loaded {
            2
        } else {
            1
        }
    }

    fn store(&mut self, f: u8, d: Dest, value: u8, bus: &mut Bus, ctx: &mut SimContext) {
        match d {
            Dest::W => self.w = value,
            Dest::F => self.write_file(f, value, bus, ctx),
        }
    }

    fn execute_file(&mut self, op: FileOp, f: u8, d: Dest, bus: &mut Bus, ctx: &mut SimContext) -> u32 {
        let value = self.read_file(f, bus, ctx);
        let mut skip = false;
        let result = match op {
            FileOp::Subwf => self.alu_sub(value, self.w),
            FileOp::Addwf => self.alu_add(value, self.w),
            FileOp::Decf => {
                let r = value.wrapping_sub(1);
                self.set_z(r);
                r
            }
            FileOp::Incf => {
                let r = value.wrapping_add(1);
                self.set_z(r);
                r
            }
            FileOp::Iorwf => {
                let r = value | self.w;
                self.set_z(r);
                r
            }
            FileOp::Andwf => {
                let r = value & self.w;
                self.set_z(r);
                r
            }
            FileOp::Xorwf => {
                let r = value ^ self.w;
                self.set_z(r);
                r
            }
            FileOp::Movf => {
                self.set_z(value);
                value
            }
            FileOp::Comf => {
                let r = !value;
                self.set_z(r);
                r
            }
            FileOp::Decfsz => {
                let r = value.wrapping_sub(1);
                skip = r == 0;
                r
            }
            FileOp::Incfsz => {
                let r = value.wrapping_add(1);
                skip = r == 0;
                r
            }
            FileOp::Rrf => {
                let r = (value >> 1) | if self.flag_c() { 0x80 } else { 0 };
                self.set_flag(flags::C, value & 0x01 != 0);
                r
            }
            FileOp::Rlf => {
                let r = (value << 1) | u8::from(self.flag_c());
                self.set_flag(flags::C, value & 0x80 != 0);
                r
            }
            FileOp::Swapf => value.rotate_left(4),
        };

        // With STATUS as destination the flags the operation sets win
        let status_before = self.status;
        let to_status = d == Dest::F && bus.kind(self.resolve(f, bus)) == Some(RegKind::Status);
        self.store(f, d, result, bus, ctx);
        if to_status {
            let affected = affected_flags(op);
            self.status = (self.status & !affected) | (status_before & affected);
        }

        if skip {
            self.pc = (self.pc + 1) & super::PC_MASK;
            2
        } else {
            self.cycles_for_write()
        }
    }

    fn execute_bit(&mut self, op: BitOp, f: u8, b: u8, bus: &mut Bus, ctx: &mut SimContext) -> u32 {
        let mask = 1u8 << b;
        match op {
            BitOp::Bcf | BitOp::Bsf => {
                let value = self.read_file(f, bus, ctx);
                let result = if op == BitOp::Bsf {
                    value | mask
                } else {
                    value & !mask
                };
                self.write_file(f, result, bus, ctx);
                self.cycles_for_write()
            }
            BitOp::Btfsc | BitOp::Btfss => {
                let set = self.read_file(f, bus, ctx) & mask != 0;
                if set == (op == BitOp::Btfss) {
                    self.pc = (self.pc + 1) & super::PC_MASK;
                    2
                } else {
                    1
                }
            }
        }
    }

    fn execute_literal(&mut self, op: LitOp, k: u8) -> u32 {
        match op {
            LitOp::Movlw => self.w = k,
            LitOp::Retlw => {
                self.w = k;
                self.pc = self.pop();
                return 2;
            }
            LitOp::Iorlw => {
                self.w |= k;
                self.set_z(self.w);
            }
            LitOp::Andlw => {
                self.w &= k;
                self.set_z(self.w);
            }
            LitOp::Xorlw => {
                self.w ^= k;
                self.set_z(self.w);
            }
            LitOp::Sublw => self.w = self.alu_sub(k, self.w),
            LitOp::Addlw => self.w = self.alu_add(k, self.w),
        }
        1
    }
}

/// STATUS bits an operation sets from its result
fn affected_flags(op: FileOp) -> u8 {
    match op {
        FileOp::Subwf | FileOp::Addwf => flags::C | flags::DC | flags::Z,
        FileOp::Rrf | FileOp::Rlf => flags::C,
        FileOp::Decfsz | FileOp::Incfsz | FileOp::Swapf => 0,
        _ => flags::Z,
    }
}
