//! Instruction-level tests for the PIC14 core
//!
//! - Moves: MOVLW, MOVWF, MOVF, CLRF, CLRW, SWAPF
//! - Arithmetic: ADDWF, ADDLW, SUBWF, SUBLW, INCF, DECF
//! - Logic: ANDLW, IORWF, XORLW, COMF
//! - Rotates: RLF, RRF
//! - Bit operations and skips: BCF, BSF, BTFSC, BTFSS, DECFSZ, INCFSZ
//! - Control flow: GOTO, CALL, RETURN, RETLW
//! - Core-only: OPTION, TRIS, CLRWDT, SLEEP

use super::*;
use crate::context::Activity;

#[test]
fn test_new_cpu() {
    let cpu = Cpu::new();
    assert_eq!(cpu.pc, 0);
    assert_eq!(cpu.status, flags::TO | flags::PD);
    assert_eq!(cpu.bank(), 0);
}

#[test]
fn test_reset_status_per_kind() {
    let mut cpu = Cpu::new();
    cpu.pc = 0x123;
    cpu.status = flags::RP0 | flags::C | flags::TO;
    cpu.reset(ResetType::Mclr);
    assert_eq!(cpu.pc, 0);
    assert_eq!(cpu.status, flags::C | flags::TO);

    cpu.status = flags::TO | flags::PD | flags::Z;
    cpu.reset(ResetType::Watchdog);
    assert_eq!(cpu.status, flags::PD | flags::Z);

    cpu.reset(ResetType::PowerOn);
    assert_eq!(cpu.status, flags::TO | flags::PD);
}

#[test]
fn test_movlw_movwf_movf() {
    // MOVLW 0x5A; MOVWF 0x20; CLRW; MOVF 0x20,W
    let mut h = Harness::f628a(&[0x305A, 0x00A0, 0x0103, 0x0820]);
    h.run(2);
    assert_eq!(h.read(0x20), 0x5A);
    h.step();
    assert_eq!(h.cpu.w, 0);
    assert!(h.cpu.flag_z());
    h.step();
    assert_eq!(h.cpu.w, 0x5A);
    assert!(!h.cpu.flag_z());
}

#[test]
fn test_addwf_flags() {
    // MOVLW 0x0F; ADDLW 0x01 -> 0x10, DC
    let mut h = Harness::f628a(&[0x300F, 0x3E01]);
    h.run(2);
    assert_eq!(h.cpu.w, 0x10);
    assert_flags(&h.cpu, false, true, false, "0x0F + 1");

    // MOVLW 0xFF; MOVWF 0x20; MOVLW 0x01; ADDWF 0x20,F -> 0x00, C DC Z
    let mut h = Harness::f628a(&[0x30FF, 0x00A0, 0x3001, 0x07A0]);
    h.run(4);
    assert_eq!(h.read(0x20), 0);
    assert_flags(&h.cpu, true, true, true, "0xFF + 1");
}

#[test]
fn test_subtraction_borrow_flags() {
    // MOVLW 0x05; SUBLW 0x03 -> 0x03 - 0x05 = 0xFE, borrow (C=0)
    let mut h = Harness::f628a(&[0x3005, 0x3C03]);
    h.run(2);
    assert_eq!(h.cpu.w, 0xFE);
    assert_flags(&h.cpu, false, false, false, "3 - 5");

    // MOVLW 0x10; MOVWF 0x20; MOVLW 0x10; SUBWF 0x20,W -> 0, C=1 DC=1 Z=1
    let mut h = Harness::f628a(&[0x3010, 0x00A0, 0x3010, 0x0220]);
    h.run(4);
    assert_eq!(h.cpu.w, 0);
    assert_flags(&h.cpu, true, true, true, "0x10 - 0x10");
}

#[test]
fn test_logic_ops() {
    // MOVLW 0xF0; ANDLW 0x3C; XORLW 0x30; MOVWF 0x21; COMF 0x21,F; IORWF 0x21,W
    let mut h = Harness::f628a(&[0x30F0, 0x393C, 0x3A30, 0x00A1, 0x09A1, 0x0421]);
    h.run(2);
    assert_eq!(h.cpu.w, 0x30);
    h.step();
    assert_eq!(h.cpu.w, 0x00);
    assert!(h.cpu.flag_z());
    h.run(2);
    assert_eq!(h.read(0x21), 0xFF);
    assert!(!h.cpu.flag_z());
    h.step();
    assert_eq!(h.cpu.w, 0xFF);
}

#[test]
fn test_rotates_through_carry() {
    // MOVLW 0x81; MOVWF 0x20; BCF STATUS,C; RLF 0x20,F; RRF 0x20,F
    let mut h = Harness::f628a(&[0x3081, 0x00A0, 0x1003, 0x0DA0, 0x0CA0]);
    h.run(4);
    assert_eq!(h.read(0x20), 0x02);
    assert!(h.cpu.flag_c());
    h.step();
    assert_eq!(h.read(0x20), 0x81);
    assert!(!h.cpu.flag_c());
}

#[test]
fn test_swapf_and_incf_decf() {
    // MOVLW 0xA5; MOVWF 0x20; SWAPF 0x20,F; INCF 0x20,F; DECF 0x20,W
    let mut h = Harness::f628a(&[0x30A5, 0x00A0, 0x0EA0, 0x0AA0, 0x0320]);
    h.run(3);
    assert_eq!(h.read(0x20), 0x5A);
    h.step();
    assert_eq!(h.read(0x20), 0x5B);
    h.step();
    assert_eq!(h.cpu.w, 0x5A);
}

#[test]
fn test_decfsz_skips_on_zero() {
    // MOVLW 2; MOVWF 0x20; DECFSZ 0x20,F; GOTO 2; NOP
    let mut h = Harness::f628a(&[0x3002, 0x00A0, 0x0BA0, 0x2802, 0x0000]);
    h.run(2);
    assert_eq!(h.step(), 1);
    assert_eq!(h.cpu.pc, 3);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 2);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 4);
    assert_eq!(h.read(0x20), 0);
}

#[test]
fn test_incfsz_wraps_and_skips() {
    // MOVLW 0xFF; MOVWF 0x20; INCFSZ 0x20,W; NOP; NOP
    let mut h = Harness::f628a(&[0x30FF, 0x00A0, 0x0F20, 0x0000, 0x0000]);
    h.run(2);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 4);
    assert_eq!(h.cpu.w, 0);
    assert_eq!(h.read(0x20), 0xFF);
}

#[test]
fn test_bit_ops_and_tests() {
    // BSF 0x20,3; BTFSS 0x20,3; NOP; BCF 0x20,3; BTFSC 0x20,3; NOP
    let mut h = Harness::f628a(&[0x15A0, 0x1DA0, 0x0000, 0x11A0, 0x19A0, 0x0000]);
    h.step();
    assert_eq!(h.read(0x20), 0x08);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 3);
    h.step();
    assert_eq!(h.read(0x20), 0x00);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 6);
}

#[test]
fn test_call_return_retlw() {
    // 0: CALL 4; 1: MOVWF 0x20; 2: GOTO 2; 4: RETLW 0x42
    let mut h = Harness::f628a(&[0x2004, 0x00A0, 0x2802, 0x0000, 0x3442]);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 4);
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 1);
    assert_eq!(h.cpu.w, 0x42);
    h.step();
    assert_eq!(h.read(0x20), 0x42);
}

#[test]
fn test_goto_uses_pclath_page() {
    // MOVLW 0x08; MOVWF PCLATH; GOTO 0x010 -> 0x810
    let mut h = Harness::f628a(&[0x3008, 0x008A, 0x2810]);
    h.run(3);
    assert_eq!(h.cpu.pc, 0x810);
}

#[test]
fn test_status_write_keeps_to_pd() {
    // CLRF STATUS: TO/PD unchanged, Z set
    let mut h = Harness::f628a(&[0x0183]);
    h.step();
    assert_eq!(h.cpu.status, flags::TO | flags::PD | flags::Z);
}

#[test]
fn test_status_destination_keeps_result_flags() {
    // MOVLW 0x01; ADDWF STATUS,F: 0x18 + 1 stored, then C/DC/Z from the addition
    let mut h = Harness::f628a(&[0x3001, 0x0783]);
    h.run(2);
    assert_eq!(h.cpu.status & flags::C, 0x00);
    assert_eq!(h.cpu.status & (flags::TO | flags::PD), flags::TO | flags::PD);
    assert!(!h.cpu.flag_z());
}

#[test]
fn test_option_and_tris_instructions() {
    // MOVLW 0x07; OPTION; MOVLW 0xF0; TRIS PORTB
    let mut h = Harness::f628a(&[0x3007, 0x0062, 0x30F0, 0x0066]);
    h.run(4);
    assert_eq!(h.read(0x81), 0x07);
    assert_eq!(h.read(0x86), 0xF0);
}

#[test]
fn test_clrwdt_sets_to_pd() {
    let mut h = Harness::f628a(&[0x0064]);
    h.cpu.status = 0;
    h.step();
    assert_eq!(h.cpu.status & (flags::TO | flags::PD), flags::TO | flags::PD);
}

#[test]
fn test_sleep_enters_low_power() {
    let mut h = Harness::f628a(&[0x0063]);
    h.step();
    assert_eq!(h.ctx.activity, Activity::Sleeping);
    assert_eq!(h.cpu.status & flags::PD, 0);
    assert_ne!(h.cpu.status & flags::TO, 0);
}

#[test]
fn test_sleep_with_pending_wake_is_nop() {
    use crate::peripherals::interrupt::intcon;
    let mut h = Harness::f628a(&[0x0063]);
    h.write(0x0B, intcon::T0IE | intcon::T0IF);
    h.step();
    assert_eq!(h.ctx.activity, Activity::Active);
    assert_eq!(h.cpu.status & flags::PD, 0);
}
