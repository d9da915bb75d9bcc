//! Banked data bus
//!
//! The bus decodes 9-bit data addresses and routes each access to the
//! general purpose RAM, a storage-only register, or the peripheral module
//! that owns the register.
//!
//! Data space (per bank, 128 bytes each):
//! ```text
//! 0x000 - 0x07F : bank 0
//! 0x080 - 0x0FF : bank 1
//! 0x100 - 0x17F : bank 2
//! 0x180 - 0x1FF : bank 3
//! ```
//!
//! Core registers (INDF, PCL, STATUS, FSR, PCLATH) are mapped here so that
//! names and mirrors resolve, but their contents live in the CPU. Unmapped
//! addresses read as zero and ignore writes.

use crate::chip::{ChipDescriptor, DATA_SPACE};
use crate::context::SimContext;
use crate::error::{ConfigError, ConfigResult};
use crate::memory::DataRam;
use crate::peripherals::Peripherals;
use crate::register::{RegKind, ResetType, Sfr};

/// What a data address decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Unmapped,
    /// Index into the general purpose RAM
    Gpr(u16),
    /// Index into the descriptor's register table
    Reg(u16),
}

/// Data bus of one part
#[derive(Debug, Clone)]
pub struct Bus {
    chip: &'static ChipDescriptor,
    map: Vec<Slot>,
    ram: DataRam,
    plain: Vec<Sfr>,
    pub peripherals: Peripherals,
}

impl Bus {
    /// Build the address map of `chip`
    pub fn new(chip: &'static ChipDescriptor) -> ConfigResult<Self> {
        chip.validate()?;

        let mut map = vec![Slot::Unmapped; DATA_SPACE as usize];
        for (i, def) in chip.registers.iter().enumerate() {
            for &addr in def.addrs {
                map[addr as usize] = Slot::Reg(i as u16);
            }
        }

        let mut gpr_count = 0u16;
        for &(start, end) in chip.gpr {
            for addr in start..=end {
                map[addr as usize] = Slot::Gpr(gpr_count);
                gpr_count += 1;
            }
        }

        for &(alias, target, len) in chip.mirrors {
            for offset in 0..len {
                let target = map
                    .get((target + offset) as usize)
                    .copied()
                    .ok_or(ConfigError::AddressOutOfRange(target + offset))?;
                if target == Slot::Unmapped {
                    return Err(ConfigError::UnmappedAddress(alias + offset));
                }
                map[(alias + offset) as usize] = target;
            }
        }

        let plain = chip
            .plain
            .iter()
            .map(|def| Sfr::new(def.por, def.mask).with_reset(def.por, 0xFF))
            .collect();

        Ok(Self {
            chip,
            map,
            ram: DataRam::new(gpr_count as usize),
            plain,
            peripherals: Peripherals::new(chip),
        })
    }

    pub fn chip(&self) -> &'static ChipDescriptor {
        self.chip
    }

    #[inline]
    pub fn slot(&self, addr: u16) -> Slot {
        self.map
            .get((addr % DATA_SPACE) as usize)
            .copied()
            .unwrap_or(Slot::Unmapped)
    }

    /// Register kind at `addr`, if a register is mapped there
    #[inline]
    pub fn kind(&self, addr: u16) -> Option<RegKind> {
        match self.slot(addr) {
            Slot::Reg(i) => self.chip.registers.get(i as usize).map(|d| d.kind),
            _ => None,
        }
    }

    pub fn name_at(&self, addr: u16) -> Option<&'static str> {
        match self.slot(addr) {
            Slot::Reg(i) => self.chip.registers.get(i as usize).map(|d| d.name),
            _ => None,
        }
    }

    /// First address of the register called `name` (case-insensitive)
    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.chip
            .registers
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .and_then(|d| d.addrs.first().copied())
    }

    /// Resolve `addr` or report why it cannot be accessed
    pub fn checked(&self, addr: u16) -> ConfigResult<Slot> {
        if addr >= DATA_SPACE {
            return Err(ConfigError::AddressOutOfRange(addr));
        }
        match self.slot(addr) {
            Slot::Unmapped => Err(ConfigError::UnmappedAddress(addr)),
            slot => Ok(slot),
        }
    }

    pub fn ram(&self) -> &DataRam {
        &self.ram
    }

    /// Read with side effects (RCREG pops, SSPBUF clears BF)
    pub fn read(&mut self, addr: u16, ctx: &mut SimContext) -> u8 {
        match self.slot(addr) {
            Slot::Unmapped => 0,
            Slot::Gpr(i) => self.ram.read(i as usize),
            Slot::Reg(_) => match self.kind(addr) {
                Some(RegKind::Plain(p)) => self.plain.get(p as usize).map_or(0, Sfr::get),
                Some(kind) => self.peripherals.read(kind, ctx).unwrap_or(0),
                None => 0,
            },
        }
    }

    /// Debugger read, no side effects
    pub fn peek(&self, addr: u16, ctx: &SimContext) -> u8 {
        match self.slot(addr) {
            Slot::Unmapped => 0,
            Slot::Gpr(i) => self.ram.read(i as usize),
            Slot::Reg(_) => match self.kind(addr) {
                Some(RegKind::Plain(p)) => self.plain.get(p as usize).map_or(0, Sfr::get),
                Some(kind) => self.peripherals.peek(kind, ctx).unwrap_or(0),
                None => 0,
            },
        }
    }

    /// Instruction write through the register's write mask
    pub fn write(&mut self, addr: u16, value: u8, ctx: &mut SimContext) {
        self.store(addr, value, false, ctx);
    }

    /// Debugger write, ignores write masks
    pub fn poke(&mut self, addr: u16, value: u8, ctx: &mut SimContext) {
        self.store(addr, value, true, ctx);
    }

    fn store(&mut self, addr: u16, value: u8, raw: bool, ctx: &mut SimContext) {
        match self.slot(addr) {
            Slot::Unmapped => {}
            Slot::Gpr(i) => self.ram.write(i as usize, value),
            Slot::Reg(_) => match self.kind(addr) {
                Some(RegKind::Plain(p)) => {
                    if let Some(reg) = self.plain.get_mut(p as usize) {
                        if raw {
                            reg.put_value(value);
                        } else {
                            reg.put(value);
                        }
                    }
                }
                Some(kind) => {
                    let handled = if raw {
                        self.peripherals.write_raw(kind, value, ctx)
                    } else {
                        self.peripherals.write(kind, value, ctx)
                    };
                    if !handled && !kind.is_core() {
                        tracing::debug!(addr, ?kind, "write to absent module ignored");
                    }
                }
                None => {}
            },
        }
    }

    /// Reset RAM (power-on only), plain registers and every module
    pub fn reset(&mut self, kind: ResetType, ctx: &mut SimContext) {
        if kind.is_power_on() {
            self.ram.reset();
        }
        for reg in &mut self.plain {
            reg.reset(kind);
        }
        self.peripherals.reset(kind, ctx);
    }
}
