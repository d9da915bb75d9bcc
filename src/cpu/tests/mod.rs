//! PIC14 CPU tests
//!
//! - instructions.rs: individual instructions and their flags
//! - modes.rs: banking, indirect addressing, computed jumps, stack

use super::*;
use crate::bus::Bus;
use crate::chip::{self, ChipDescriptor};
use crate::context::{SimConfig, SimContext};

mod instructions;
mod modes;

// ========== Test Helpers ==========

/// CPU, bus and context for one part with `program` at address 0
struct Harness {
    cpu: Cpu,
    bus: Bus,
    ctx: SimContext,
}

impl Harness {
    fn new(chip: &'static ChipDescriptor, program: &[u16]) -> Self {
        let mut ctx = chip.context(SimConfig::default());
        let mut bus = Bus::new(chip).expect("valid descriptor");
        bus.peripherals.attach(&mut ctx);
        bus.reset(ResetType::PowerOn, &mut ctx);
        ctx.program.load(program);
        Self {
            cpu: Cpu::new(),
            bus,
            ctx,
        }
    }

    fn f628a(program: &[u16]) -> Self {
        Self::new(&chip::P16F628A, program)
    }

    fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.bus, &mut self.ctx)
    }

    fn run(&mut self, instructions: usize) {
        for _ in 0..instructions {
            self.step();
        }
    }

    fn read(&self, addr: u16) -> u8 {
        self.cpu.peek_address(addr, &self.bus, &self.ctx)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.cpu.poke_address(addr, value, &mut self.bus, &mut self.ctx);
    }
}

/// Helper to assert the arithmetic flags with readable output
fn assert_flags(cpu: &Cpu, c: bool, dc: bool, z: bool, context: &str) {
    assert_eq!(
        (cpu.flag_c(), cpu.flag_dc(), cpu.flag_z()),
        (c, dc, z),
        "{}: flags mismatch, STATUS={:08b}",
        context,
        cpu.status
    );
}
