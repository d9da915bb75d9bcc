//! Addressing mode tests
//!
//! - Direct addressing with RP1:RP0 bank select
//! - Indirect addressing through INDF/FSR and IRP
//! - Computed jumps through PCL/PCLATH
//! - Hardware stack depth and wrap-around
//! - Interrupt vectoring

use super::*;
use crate::peripherals::interrupt::intcon;

#[test]
fn test_rp_bits_select_bank() {
    // BSF STATUS,RP0; MOVLW 0x11; MOVWF 0x20 (-> 0xA0); BCF STATUS,RP0; MOVWF 0x20
    let mut h = Harness::f628a(&[0x1683, 0x3011, 0x00A0, 0x1283, 0x3022, 0x00A0]);
    h.run(3);
    assert_eq!(h.cpu.bank(), 1);
    assert_eq!(h.read(0xA0), 0x11);
    h.run(3);
    assert_eq!(h.read(0x20), 0x22);
    assert_eq!(h.read(0xA0), 0x11);
}

#[test]
fn test_bank_two_and_three() {
    // BSF STATUS,RP1; MOVLW 0x33; MOVWF 0x20 (-> 0x120); BSF STATUS,RP0; MOVWF 0x06 (TRISB via 0x186)
    let mut h = Harness::f628a(&[0x1703, 0x3033, 0x00A0, 0x1683, 0x0086]);
    h.run(5);
    assert_eq!(h.cpu.bank(), 3);
    assert_eq!(h.read(0x120), 0x33);
    assert_eq!(h.read(0x86), 0x33);
}

#[test]
fn test_indirect_addressing() {
    // MOVLW 0x30; MOVWF FSR; MOVLW 0x99; MOVWF INDF; INCF FSR,F; MOVWF INDF
    let mut h = Harness::f628a(&[0x3030, 0x0084, 0x3099, 0x0080, 0x0A84, 0x0080]);
    h.run(6);
    assert_eq!(h.read(0x30), 0x99);
    assert_eq!(h.read(0x31), 0x99);
    assert_eq!(h.cpu.fsr, 0x31);
}

#[test]
fn test_irp_selects_upper_banks() {
    // BSF STATUS,IRP; MOVLW 0x20; MOVWF FSR; MOVLW 0x77; MOVWF INDF -> 0x120
    let mut h = Harness::f628a(&[0x1783, 0x3020, 0x0084, 0x3077, 0x0080]);
    h.run(5);
    assert_eq!(h.cpu.indirect_address(), 0x120);
    assert_eq!(h.read(0x120), 0x77);
    assert_eq!(h.read(0x20), 0x00);
}

#[test]
fn test_indf_through_indf_reads_zero() {
    // CLRF FSR; MOVLW 0x55; MOVWF INDF; MOVF INDF,W
    let mut h = Harness::f628a(&[0x0184, 0x3055, 0x0080, 0x0800]);
    h.run(4);
    assert_eq!(h.cpu.w, 0);
    assert!(h.cpu.flag_z());
}

#[test]
fn test_computed_jump_table() {
    // 0: MOVLW 2; 1: CALL 4; 2: MOVWF 0x20; 3: GOTO 3
    // 4: ADDWF PCL,F; 5: RETLW 0x0A; 6: RETLW 0x0B; 7: RETLW 0x0C
    let mut h = Harness::f628a(&[
        0x3002, 0x2004, 0x00A0, 0x2803, 0x0782, 0x340A, 0x340B, 0x340C,
    ]);
    h.run(2);
    assert_eq!(h.cpu.pc, 4);
    assert_eq!(h.step(), 2, "write to PCL takes two cycles");
    assert_eq!(h.cpu.pc, 7);
    h.run(2);
    assert_eq!(h.read(0x20), 0x0C);
}

#[test]
fn test_pcl_write_uses_pclath() {
    // MOVLW 0x01; MOVWF PCLATH; MOVLW 0x23; MOVWF PCL -> 0x123
    let mut h = Harness::f628a(&[0x3001, 0x008A, 0x3023, 0x0082]);
    h.run(4);
    assert_eq!(h.cpu.pc, 0x123);
}

#[test]
fn test_stack_wraps_after_eight_calls() {
    // Nine nested CALLs to the next word, then returns
    let mut program: Vec<u16> = (1..=9).map(|next| 0x2000 | next).collect();
    program.push(0x0008);
    let mut h = Harness::f628a(&program);
    h.run(9);
    assert_eq!(h.cpu.pc, 9);
    h.step();
    // The ninth return address overwrote the first
    assert_eq!(h.cpu.pc, 9);
    let stack = h.cpu.stack();
    assert_eq!(stack.len(), STACK_DEPTH);
}

#[test]
fn test_interrupt_vectors_and_retfie() {
    // 0: NOP; 1: NOP; 4: RETFIE
    let mut h = Harness::f628a(&[0x0000, 0x0000, 0x0000, 0x0000, 0x0009]);
    h.write(0x0B, intcon::GIE | intcon::T0IE | intcon::T0IF);
    h.step();
    assert!(h.ctx.irq.irq_pending());
    h.cpu.interrupt(&mut h.ctx);
    assert_eq!(h.cpu.pc, INTERRUPT_VECTOR);
    assert!(!h.ctx.irq.gie());
    assert_eq!(h.step(), 2);
    assert_eq!(h.cpu.pc, 1);
    assert!(h.ctx.irq.gie());
}

#[test]
fn test_f84a_bank_one_mirrors_gpr() {
    // BSF STATUS,RP0; MOVLW 0x44; MOVWF 0x0C (-> 0x8C, mirror of 0x0C)
    let mut h = Harness::new(&chip::P16F84A, &[0x1683, 0x3044, 0x008C]);
    h.run(3);
    assert_eq!(h.read(0x0C), 0x44);
}
