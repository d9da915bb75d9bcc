//! WebAssembly bindings for the PIC simulator
//!
//! This module provides JavaScript-friendly APIs using wasm-bindgen.

use crate::context::SimConfig;
use crate::pins::PinInput;
use crate::pps::Signal;
use crate::processor::{Processor, StopReason};
use crate::register::ResetType;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn warn(s: &str);
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

/// WASM-friendly wrapper around one simulated part.
/// Unlike the C FFI, this owns the processor directly without mutex
/// since WASM is single-threaded.
#[wasm_bindgen]
pub struct WasmPic {
    inner: Processor,
}

#[wasm_bindgen]
impl WasmPic {
    /// Create a part by name ("16F628A"). `clock_hz` of 0 selects 4 MHz.
    #[wasm_bindgen(constructor)]
    pub fn new(chip: &str, clock_hz: u32) -> Result<WasmPic, JsValue> {
        console_error_panic_hook::set_once();

        let config = SimConfig {
            clock_hz: if clock_hz == 0 {
                SimConfig::DEFAULT_CLOCK_HZ
            } else {
                clock_hz
            },
            ..SimConfig::default()
        };
        match Processor::new(chip, config) {
            Ok(inner) => {
                log(&format!("[WASM] created {}", inner.chip().name));
                Ok(WasmPic { inner })
            }
            Err(e) => {
                warn(&format!("[WASM] create: {}", e));
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    /// Load Intel HEX text. Returns 0 on success, negative error code on
    /// failure.
    #[wasm_bindgen]
    pub fn load_hex(&mut self, text: &str) -> i32 {
        match self.inner.load_hex(text) {
            Ok(()) => 0,
            Err(e) => {
                warn(&format!("[WASM] load_hex: {}", e));
                e.code()
            }
        }
    }

    /// Power-on reset
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.inner.reset(ResetType::PowerOn);
    }

    /// Run for `cycles` instruction cycles.
    /// Returns 0 complete, 1 asleep, 2 held in reset, 3 breakpoint.
    #[wasm_bindgen]
    pub fn run_cycles(&mut self, cycles: u32) -> i32 {
        match self.inner.run_cycles(cycles as u64) {
            StopReason::CyclesComplete => 0,
            StopReason::Sleeping => 1,
            StopReason::HeldInReset => 2,
            StopReason::Breakpoint(pc) => {
                log(&format!("[WASM] breakpoint at {:04X}", pc));
                3
            }
        }
    }

    #[wasm_bindgen]
    pub fn pin_count(&self) -> usize {
        self.inner.pin_count()
    }

    #[wasm_bindgen]
    pub fn pin_name(&self, pin: usize) -> String {
        self.inner
            .chip()
            .pins
            .get(pin)
            .map(|p| p.name.to_string())
            .unwrap_or_default()
    }

    /// Digital level of a pin (false for pins that do not exist)
    #[wasm_bindgen]
    pub fn pin_level(&self, pin: usize) -> bool {
        self.inner.get_pin_value(pin).map(|v| v.digital).unwrap_or(false)
    }

    #[wasm_bindgen]
    pub fn pin_voltage(&self, pin: usize) -> f64 {
        self.inner.get_pin_value(pin).map(|v| v.voltage).unwrap_or(0.0)
    }

    #[wasm_bindgen]
    pub fn set_pin_digital(&mut self, pin: usize, level: bool) -> i32 {
        self.set_pin(pin, PinInput::Digital(level))
    }

    #[wasm_bindgen]
    pub fn set_pin_analog(&mut self, pin: usize, volts: f64) -> i32 {
        self.set_pin(pin, PinInput::Analog(volts))
    }

    #[wasm_bindgen]
    pub fn release_pin(&mut self, pin: usize) -> i32 {
        self.set_pin(pin, PinInput::Released)
    }

    /// Route a signal ("TX", "SCK") to a pin
    #[wasm_bindgen]
    pub fn remap(&mut self, signal: &str, pin: usize) -> i32 {
        let Some(signal) = Signal::from_name(signal) else {
            warn(&format!("[WASM] remap: unknown signal {}", signal));
            return -1;
        };
        match self.inner.remap(signal, pin) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }

    /// Register value without side effects, negative on error
    #[wasm_bindgen]
    pub fn read_register(&self, addr: u16) -> i32 {
        match self.inner.peek_register(addr) {
            Ok(v) => v as i32,
            Err(e) => e.code(),
        }
    }

    #[wasm_bindgen]
    pub fn write_register(&mut self, addr: u16, value: u8) -> i32 {
        match self.inner.register(addr) {
            Ok(mut r) => {
                r.put(value);
                0
            }
            Err(e) => e.code(),
        }
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.inner.pc()
    }

    #[wasm_bindgen]
    pub fn w(&self) -> u8 {
        self.inner.w()
    }

    /// Cycle count as f64 (JS numbers)
    #[wasm_bindgen]
    pub fn cycles(&self) -> f64 {
        self.inner.cycles() as f64
    }

    #[wasm_bindgen]
    pub fn is_sleeping(&self) -> bool {
        self.inner.is_sleeping()
    }

    /// Recent instructions, disassembled
    #[wasm_bindgen]
    pub fn dump_history(&self) -> String {
        self.inner.dump_history()
    }

    /// Snapshot of core state for debugging
    #[wasm_bindgen]
    pub fn debug_status(&self) -> String {
        format!(
            "{} PC={:04X} W={:02X} STATUS={:02X} cycles={} {:?}",
            self.inner.chip().name,
            self.inner.pc(),
            self.inner.w(),
            self.inner.status(),
            self.inner.cycles(),
            self.inner.activity()
        )
    }
}

impl WasmPic {
    fn set_pin(&mut self, pin: usize, input: PinInput) -> i32 {
        match self.inner.set_pin(pin, input) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}
