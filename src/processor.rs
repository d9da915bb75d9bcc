//! Processor front-end
//!
//! Coordinates the CPU, bus and peripherals of one simulated part. Owns the
//! time loop: every instruction cycle advances the trigger queue, fires due
//! callbacks and delivers pin changes before the next instruction runs.
//!
//! Sleep, wake, interrupt vectoring and the reset sources (power-on,
//! brown-out, MCLR, watchdog) are sequenced here.

use crate::bus::Bus;
use crate::chip::{self, config, ChipDescriptor};
use crate::context::{Activity, SimConfig, SimContext};
use crate::cpu::Cpu;
use crate::disasm::disassemble;
use crate::error::{ConfigError, ConfigResult};
use crate::hex::HexImage;
use crate::memory::addr;
use crate::peripherals::{EeState, Peripherals};
use crate::pins::{PinId, PinInput, PinValue};
use crate::pps::Signal;
use crate::register::ResetType;
use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Number of entries in the PC/opcode history ring buffer
const HISTORY_SIZE: usize = 64;

/// Single entry in the execution history
#[derive(Debug, Clone, Copy, Default)]
struct HistoryEntry {
    pc: u16,
    word: u16,
    cycle: u64,
}

/// Execution history ring buffer for crash diagnostics
#[derive(Debug, Clone)]
struct ExecutionHistory {
    entries: [HistoryEntry; HISTORY_SIZE],
    /// Write index (next position to write)
    write_idx: usize,
    /// Number of entries written (max HISTORY_SIZE)
    count: usize,
}

impl ExecutionHistory {
    fn new() -> Self {
        Self {
            entries: [HistoryEntry::default(); HISTORY_SIZE],
            write_idx: 0,
            count: 0,
        }
    }

    fn record(&mut self, pc: u16, word: u16, cycle: u64) {
        self.entries[self.write_idx] = HistoryEntry { pc, word, cycle };
        self.write_idx = (self.write_idx + 1) % HISTORY_SIZE;
        self.count = (self.count + 1).min(HISTORY_SIZE);
    }

    /// Entries oldest first
    fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        let start = (self.write_idx + HISTORY_SIZE - self.count) % HISTORY_SIZE;
        (0..self.count).map(move |i| &self.entries[(start + i) % HISTORY_SIZE])
    }

    fn clear(&mut self) {
        self.write_idx = 0;
        self.count = 0;
    }
}

static LOG_CALLBACK: AtomicPtr<std::ffi::c_void> = AtomicPtr::new(ptr::null_mut());

/// Install the host log sink. `None` removes it.
pub fn set_log_callback(cb: Option<extern "C" fn(*const c_char)>) {
    let ptr = cb
        .map(|f| f as *mut std::ffi::c_void)
        .unwrap_or(ptr::null_mut());
    LOG_CALLBACK.store(ptr, Ordering::SeqCst);
}

/// Forward a lifecycle message to the host log sink, if one is installed
pub fn log_event(message: &str) {
    let cb_ptr = LOG_CALLBACK.load(Ordering::SeqCst);
    if !cb_ptr.is_null() {
        // SAFETY: only `set_log_callback` stores non-null values, and those
        // come from a function pointer of exactly this type.
        let cb: extern "C" fn(*const c_char) = unsafe { std::mem::transmute(cb_ptr) };
        if let Ok(cstr) = CString::new(message) {
            cb(cstr.as_ptr());
        }
    }
}

/// Reason for stopping execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Completed requested cycles
    CyclesComplete,
    /// Completed requested cycles with the core asleep
    Sleeping,
    /// Held in reset by the MCLR pin
    HeldInReset,
    /// PC reached a breakpoint before executing it
    Breakpoint(u16),
}

/// One simulated PIC part
#[derive(Debug, Clone)]
pub struct Processor {
    chip: &'static ChipDescriptor,
    cpu: Cpu,
    bus: Bus,
    ctx: SimContext,
    history: ExecutionHistory,
    breakpoints: BTreeSet<u16>,
    /// MCLR driven low by the board
    mclr_held: bool,
    trace: bool,
    last_stop: StopReason,
}

impl Processor {
    /// Build a part by name ("16F628A", "PIC16F887", ...)
    pub fn new(name: &str, config: SimConfig) -> ConfigResult<Self> {
        let chip = chip::find(name).ok_or_else(|| ConfigError::UnknownChip(name.to_string()))?;
        Self::with_chip(chip, config)
    }

    /// Build a part from its descriptor and power it on
    pub fn with_chip(chip: &'static ChipDescriptor, config: SimConfig) -> ConfigResult<Self> {
        let bus = Bus::new(chip)?;
        let mut ctx = chip.context(config);
        bus.peripherals.attach(&mut ctx);
        let mut processor = Self {
            chip,
            cpu: Cpu::new(),
            bus,
            ctx,
            history: ExecutionHistory::new(),
            breakpoints: BTreeSet::new(),
            mclr_held: false,
            trace: false,
            last_stop: StopReason::CyclesComplete,
        };
        log_event(&format!("CREATE: {} at {} Hz", chip.name, config.clock_hz));
        processor.reset(ResetType::PowerOn);
        Ok(processor)
    }

    pub fn chip(&self) -> &'static ChipDescriptor {
        self.chip
    }

    // ========== Reset ==========

    /// Perform a reset of `kind`
    pub fn reset(&mut self, kind: ResetType) {
        tracing::debug!(?kind, cycle = self.ctx.cycles, "reset");
        log_event(&format!("RESET: {:?}", kind));
        self.cpu.reset(kind);
        if kind.is_power_on() {
            self.ctx.queue.clear();
            self.ctx.pins.reset();
            self.history.clear();
        }
        self.ctx.irq.reset_registers(kind);
        self.ctx.activity = Activity::Active;
        self.bus.peripherals.set_sleeping(false, &mut self.ctx);
        self.bus.reset(kind, &mut self.ctx);

        let config1 = self.ctx.program.config_word(0);
        self.bus
            .peripherals
            .watchdog
            .configure(config1 & config::WDTE != 0, &mut self.ctx);

        // Requests raised by the reset itself are stale
        self.ctx.take_reset_request();
        self.ctx.take_watchdog_wake();
        self.bus.peripherals.deliver_pin_events(&mut self.ctx);

        if self.mclr_held && self.mclr_enabled() {
            self.ctx.activity = Activity::Reset;
        }
    }

    /// MCLR acts as a reset input under the current configuration
    pub fn mclr_enabled(&self) -> bool {
        match (self.chip.mclr, self.chip.mclre) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(bit)) => self.ctx.program.config_word(0) & bit != 0,
        }
    }

    // ========== Execution ==========

    /// Advance by one instruction (or one cycle while stalled). Returns the
    /// cycles consumed.
    pub fn step(&mut self) -> u32 {
        match self.ctx.activity {
            Activity::Reset => {
                // Held by MCLR: nothing may reset or wake the part
                self.tick(1);
                self.ctx.take_reset_request();
                self.ctx.take_watchdog_wake();
                1
            }
            Activity::PmWrite => {
                self.tick(1);
                self.after_tick();
                1
            }
            Activity::Sleeping => {
                self.tick(1);
                self.after_tick();
                self.check_wake();
                1
            }
            Activity::Active => {
                let pc = self.cpu.pc;
                let word = self.ctx.program.fetch(pc);
                self.history.record(pc, word, self.ctx.cycles);
                if self.trace {
                    tracing::trace!(
                        pc = format_args!("{:04X}", pc),
                        w = format_args!("{:02X}", self.cpu.w),
                        "{}",
                        disassemble(word, Some(self.chip)).mnemonic
                    );
                }

                let cycles = self.cpu.step(&mut self.bus, &mut self.ctx);
                self.bus.peripherals.deliver_pin_events(&mut self.ctx);
                self.tick(cycles);
                if self.after_tick() {
                    return cycles;
                }

                if self.ctx.activity == Activity::Active && self.ctx.irq.irq_pending() {
                    tracing::trace!(from = self.cpu.pc, "interrupt");
                    self.cpu.interrupt(&mut self.ctx);
                }
                cycles
            }
        }
    }

    /// Run for at least `cycles` instruction cycles.
    ///
    /// Stops early when the PC reaches a breakpoint. A sleeping core with
    /// nothing scheduled skips straight to the end of the window.
    pub fn run_cycles(&mut self, cycles: u64) -> StopReason {
        let end = self.ctx.cycles.saturating_add(cycles);
        let mut first = true;
        while self.ctx.cycles < end {
            if self.ctx.activity == Activity::Active
                && !first
                && self.breakpoints.contains(&self.cpu.pc)
            {
                self.last_stop = StopReason::Breakpoint(self.cpu.pc);
                return self.last_stop;
            }
            first = false;

            if self.ctx.is_sleeping()
                && !self.ctx.pins.has_events()
                && !self.ctx.irq.wake_pending()
            {
                // Nothing can happen before the next trigger
                let next = self.ctx.queue.next_cycle().unwrap_or(end).min(end);
                if next > self.ctx.cycles + 1 {
                    self.ctx.cycles = next - 1;
                }
            }
            self.step();
        }

        self.last_stop = match self.ctx.activity {
            Activity::Sleeping => StopReason::Sleeping,
            Activity::Reset => StopReason::HeldInReset,
            _ => StopReason::CyclesComplete,
        };
        self.last_stop
    }

    /// Run for `seconds` of simulated time
    pub fn run_for(&mut self, seconds: f64) -> StopReason {
        let cycles = self.ctx.seconds_to_cycles(seconds);
        self.run_cycles(cycles)
    }

    pub fn last_stop_reason(&self) -> StopReason {
        self.last_stop
    }

    /// Advance time by `n` cycles, firing due triggers each cycle
    fn tick(&mut self, n: u32) {
        for _ in 0..n {
            self.ctx.cycles += 1;
            let pass = self.ctx.queue.pass(self.ctx.cycles);
            while let Some(event) = self.ctx.queue.pop_due(&pass) {
                self.bus.peripherals.on_event(event, &mut self.ctx);
            }
            self.bus.peripherals.deliver_pin_events(&mut self.ctx);
        }
    }

    /// Act on a reset raised during the last tick. Returns true if one ran.
    fn after_tick(&mut self) -> bool {
        match self.ctx.take_reset_request() {
            Some(kind) => {
                self.reset(kind);
                true
            }
            None => false,
        }
    }

    fn check_wake(&mut self) {
        if !self.ctx.is_sleeping() {
            return;
        }
        if self.ctx.take_watchdog_wake() {
            self.cpu.watchdog_wake();
            self.wake("watchdog");
        } else if self.ctx.irq.wake_pending() {
            self.wake("interrupt");
        }
    }

    /// Restart the core clock. The instruction after SLEEP runs next; an
    /// enabled interrupt then vectors.
    fn wake(&mut self, source: &str) {
        tracing::debug!(source, cycle = self.ctx.cycles, "wake from sleep");
        log_event(&format!("WAKE: {}", source));
        self.ctx.activity = Activity::Active;
        self.bus.peripherals.set_sleeping(false, &mut self.ctx);
    }

    // ========== Breakpoints and tracing ==========

    pub fn add_breakpoint(&mut self, pc: u16) {
        self.breakpoints.insert(pc);
    }

    pub fn remove_breakpoint(&mut self, pc: u16) -> bool {
        self.breakpoints.remove(&pc)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Log every executed instruction at trace level
    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    /// Recent instructions, oldest first, disassembled
    pub fn dump_history(&self) -> String {
        let mut out = String::new();
        for entry in self.history.iter() {
            let d = disassemble(entry.word, Some(self.chip));
            out.push_str(&format!(
                "{:>10} {:04X}: {} {}\n",
                entry.cycle, entry.pc, d.word, d.mnemonic
            ));
        }
        out
    }

    // ========== Program loading ==========

    /// Load an Intel HEX image (program, configuration words and EEPROM
    /// data) and power-on reset
    pub fn load_hex(&mut self, text: &str) -> ConfigResult<()> {
        let image = HexImage::parse(text)?;
        let len = image.program_len();
        if len > self.ctx.program.len() {
            return Err(ConfigError::ProgramTooLarge(len, self.ctx.program.len()));
        }

        let mut words = vec![addr::WORD_MASK; len];
        for (address, word) in image.program() {
            words[address as usize] = word;
        }
        self.ctx.program.load(&words);
        for (address, word) in image.config() {
            if !self.ctx.program.write(address, word) {
                tracing::debug!(address, "HEX config word ignored");
            }
        }
        let eeprom: Vec<(usize, u8)> = image.eeprom().collect();
        if let Some(ee) = &mut self.bus.peripherals.eeprom {
            for (offset, byte) in eeprom {
                ee.load_data(offset, &[byte]);
            }
        } else if !eeprom.is_empty() {
            tracing::warn!(part = self.chip.name, "HEX image has EEPROM data but the part has none");
        }

        log_event(&format!("LOAD_HEX: {} program words", len));
        self.reset(ResetType::PowerOn);
        Ok(())
    }

    /// Load raw program words from address 0 and power-on reset
    pub fn load_program(&mut self, words: &[u16]) -> ConfigResult<()> {
        if words.len() > self.ctx.program.len() {
            return Err(ConfigError::ProgramTooLarge(
                words.len(),
                self.ctx.program.len(),
            ));
        }
        self.ctx.program.load(words);
        self.reset(ResetType::PowerOn);
        Ok(())
    }

    /// Set configuration word `index` (0 = 0x2007). Takes effect at the
    /// next reset.
    pub fn set_config_word(&mut self, index: usize, word: u16) {
        if index < self.chip.config_words {
            self.ctx.program.set_config_word(index, word);
        }
    }

    pub fn config_word(&self, index: usize) -> u16 {
        self.ctx.program.config_word(index)
    }

    // ========== Board interface ==========

    pub fn pin_count(&self) -> usize {
        self.ctx.pins.len()
    }

    /// Resolved state of `pin`
    pub fn get_pin_value(&self, pin: PinId) -> ConfigResult<PinValue> {
        self.ctx.pins.value(pin).ok_or(ConfigError::PinOutOfRange(pin))
    }

    /// Apply a board stimulus to `pin`. Driving MCLR low holds the part in
    /// reset; releasing it restarts execution from address 0.
    pub fn set_pin(&mut self, pin: PinId, input: PinInput) -> ConfigResult<()> {
        if pin >= self.ctx.pins.len() {
            return Err(ConfigError::PinOutOfRange(pin));
        }
        self.ctx.pins.set_stimulus(pin, input);

        if Some(pin) == self.chip.mclr && self.mclr_enabled() {
            let low = match input {
                PinInput::Digital(level) => !level,
                PinInput::Analog(v) => v < self.ctx.vdd() / 2.0,
                PinInput::Released => false,
            };
            if low && !self.mclr_held {
                self.mclr_held = true;
                self.reset(ResetType::Mclr);
            } else if !low && self.mclr_held {
                // State latched while held is discarded by the release reset
                self.mclr_held = false;
                log_event("MCLR: released");
                self.reset(ResetType::Mclr);
            }
        }

        self.bus.peripherals.deliver_pin_events(&mut self.ctx);
        Ok(())
    }

    /// Route `signal` to `pin` (peripheral pin select)
    pub fn remap(&mut self, signal: Signal, pin: PinId) -> ConfigResult<()> {
        if pin >= self.ctx.pins.len() {
            return Err(ConfigError::PinOutOfRange(pin));
        }
        self.bus.peripherals.remap(signal, pin, &mut self.ctx);
        self.bus.peripherals.deliver_pin_events(&mut self.ctx);
        Ok(())
    }

    // ========== Register access ==========

    /// Handle on the register at data address `addr`
    pub fn register(&mut self, addr: u16) -> ConfigResult<RegisterRef<'_>> {
        self.bus.checked(addr)?;
        Ok(RegisterRef { proc: self, addr })
    }

    /// Data address of a named register ("PORTB", "eecon1")
    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.bus.address_of(name)
    }

    /// Value without side effects
    pub fn peek_register(&self, addr: u16) -> ConfigResult<u8> {
        self.bus.checked(addr)?;
        Ok(self.cpu.peek_address(addr, &self.bus, &self.ctx))
    }

    /// Store without side effects
    pub fn poke_register(&mut self, addr: u16, value: u8) -> ConfigResult<()> {
        self.bus.checked(addr)?;
        self.cpu
            .poke_address(addr, value, &mut self.bus, &mut self.ctx);
        Ok(())
    }

    // ========== Queries ==========

    pub fn pc(&self) -> u16 {
        self.cpu.pc
    }

    pub fn w(&self) -> u8 {
        self.cpu.w
    }

    pub fn status(&self) -> u8 {
        self.cpu.status
    }

    pub fn stack(&self) -> Vec<u16> {
        self.cpu.stack()
    }

    pub fn cycles(&self) -> u64 {
        self.ctx.cycles
    }

    pub fn activity(&self) -> Activity {
        self.ctx.activity
    }

    pub fn is_sleeping(&self) -> bool {
        self.ctx.is_sleeping()
    }

    /// EEPROM unlock state, `None` on parts without data EEPROM
    pub fn eeprom_state(&self) -> Option<EeState> {
        self.bus.peripherals.eeprom.as_ref().map(|e| e.eestate())
    }

    pub fn eeprom_data(&self) -> Option<&[u8]> {
        self.bus.peripherals.eeprom.as_ref().map(|e| e.data())
    }

    pub fn is_ssp_enabled(&self) -> bool {
        self.bus
            .peripherals
            .ssp
            .as_ref()
            .is_some_and(|s| s.is_ssp_enabled())
    }

    pub fn is_i2c_master(&self) -> bool {
        self.bus
            .peripherals
            .ssp
            .as_ref()
            .is_some_and(|s| s.is_i2c_master())
    }

    pub fn peripherals(&self) -> &Peripherals {
        &self.bus.peripherals
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }
}

/// Borrowed handle on one data register
pub struct RegisterRef<'a> {
    proc: &'a mut Processor,
    addr: u16,
}

impl RegisterRef<'_> {
    pub fn address(&self) -> u16 {
        self.addr
    }

    /// Register name, `None` for general purpose RAM
    pub fn name(&self) -> Option<&'static str> {
        self.proc.bus.name_at(self.addr)
    }

    /// Read as the CPU would, with side effects
    pub fn get(&mut self) -> u8 {
        let p = &mut *self.proc;
        p.cpu.read_address(self.addr, &mut p.bus, &mut p.ctx)
    }

    /// Read without side effects
    pub fn peek(&self) -> u8 {
        let p = &*self.proc;
        p.cpu.peek_address(self.addr, &p.bus, &p.ctx)
    }

    /// Write as the CPU would, with side effects
    pub fn put(&mut self, value: u8) {
        let p = &mut *self.proc;
        p.cpu.write_address(self.addr, value, &mut p.bus, &mut p.ctx);
        p.bus.peripherals.deliver_pin_events(&mut p.ctx);
    }

    /// Store the raw value without side effects
    pub fn put_value(&mut self, value: u8) {
        let p = &mut *self.proc;
        p.cpu.poke_address(self.addr, value, &mut p.bus, &mut p.ctx);
    }
}
