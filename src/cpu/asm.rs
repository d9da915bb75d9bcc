//! Instruction builders for test programs
//!
//! File operands take full data addresses; the bank bits are dropped the
//! way MPASM drops them, so `movwf(0x9B)` encodes `MOVWF 0x1B`.

use super::decode::{encode, BitOp, Dest, FileOp, Instruction, LitOp};

fn file(addr: u16) -> u8 {
    (addr & 0x7F) as u8
}

pub fn movlw(k: u8) -> u16 {
    encode(Instruction::Literal(LitOp::Movlw, k))
}

pub fn movwf(f: u16) -> u16 {
    encode(Instruction::Movwf(file(f)))
}

pub fn movf_w(f: u16) -> u16 {
    encode(Instruction::File(FileOp::Movf, file(f), Dest::W))
}

pub fn clrf(f: u16) -> u16 {
    encode(Instruction::Clrf(file(f)))
}

pub fn incf_f(f: u16) -> u16 {
    encode(Instruction::File(FileOp::Incf, file(f), Dest::F))
}

pub fn bsf(f: u16, b: u8) -> u16 {
    encode(Instruction::Bit(BitOp::Bsf, file(f), b))
}

pub fn bcf(f: u16, b: u8) -> u16 {
    encode(Instruction::Bit(BitOp::Bcf, file(f), b))
}

pub fn btfsc(f: u16, b: u8) -> u16 {
    encode(Instruction::Bit(BitOp::Btfsc, file(f), b))
}

pub fn btfss(f: u16, b: u8) -> u16 {
    encode(Instruction::Bit(BitOp::Btfss, file(f), b))
}

pub fn goto(k: u16) -> u16 {
    encode(Instruction::Goto(k))
}

pub fn sleep() -> u16 {
    encode(Instruction::Sleep)
}

pub fn nop() -> u16 {
    encode(Instruction::Nop)
}

/// STATUS and its bank select bits
pub const STATUS: u16 = 0x03;
pub const RP0: u8 = 5;

pub fn bank1() -> u16 {
    bsf(STATUS, RP0)
}

pub fn bank0() -> u16 {
    bcf(STATUS, RP0)
}
