//! PIC Mid-Range Simulation Core
//!
//! This crate provides a cycle-driven simulator for 14-bit PIC
//! microcontrollers with a stable C ABI. No OS APIs are used: programs come
//! in as Intel HEX text and the board talks to the part through its pins.
//!
//! # Architecture
//!
//! - `scheduler`: trigger queue keyed by absolute cycle count
//! - `register`: special function register cells and reset values
//! - `pins` / `pps`: package pins, drive resolution and signal routing
//! - `chip`: per-part descriptors (register map, pins, modules)
//! - `bus`: data address decoding and register routing
//! - `cpu`: 14-bit instruction core
//! - `peripherals`: ports, timers, watchdog, EEPROM, SSP, USART, comparator, ADC
//! - `processor`: time loop, sleep/wake, interrupts and resets
//!
//! # Parts
//!
//! | Part      | Program words | EEPROM | Serial           | Analog            |
//! |-----------|---------------|--------|------------------|-------------------|
//! | PIC16F84A | 1024          | 64     | none             | none              |
//! | PIC16F628A| 2048          | 128    | USART            | 2 comparators     |
//! | PIC16F690 | 4096          | 256    | SSP, EUSART      | comparators, ADC  |
//! | PIC16F88  | 4096          | 256    | SSP, USART       | comparators, ADC  |
//! | PIC16F887 | 8192          | 256    | MSSP, EUSART     | comparators, ADC  |

pub mod bus;
pub mod chip;
pub mod context;
pub mod cpu;
pub mod disasm;
pub mod error;
pub mod hex;
pub mod memory;
pub mod peripherals;
pub mod pins;
pub mod pps;
pub mod processor;
pub mod register;
pub mod scheduler;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::*;


#[cfg(test)]
mod serial_integration_test;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::Mutex;

pub use context::{Activity, SimConfig};
pub use disasm::{disassemble, DisasmResult};
pub use error::{ConfigError, ConfigResult};
pub use pins::{PinInput, PinValue};
pub use pps::Signal;
pub use processor::{log_event, Processor, RegisterRef, StopReason};
pub use register::ResetType;

/// Generic failure (null pointer, bad string, poisoned lock)
const ERR_INVALID: i32 = -1;

/// Thread-safe wrapper for one simulated part.
/// All FFI calls go through this mutex so a board thread setting pins and
/// a simulation thread running cycles never race.
/// This is an opaque type from C's perspective (used via void*).
pub struct SyncPic {
    inner: Mutex<Processor>,
}

/// Pin snapshot handed to C callers
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PicPin {
    /// Digital level, 0 or 1
    pub digital: u8,
    /// 1 when the part drives the pin
    pub output: u8,
    /// 1 when the pin is selected as an analog input
    pub analog: u8,
    pub voltage: f64,
}

/// Lock the part behind `pic` and run `f`, or return `fallback`
fn with_pic<T>(pic: *mut SyncPic, fallback: T, f: impl FnOnce(&mut Processor) -> T) -> T {
    if pic.is_null() {
        return fallback;
    }
    let sync = unsafe { &*pic };
    match sync.inner.lock() {
        Ok(mut p) => f(&mut p),
        Err(_) => fallback,
    }
}

fn status<T>(result: ConfigResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            log_event(&format!("ERROR: {}", e));
            e.code()
        }
    }
}

fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Create a part by name ("16F628A", "PIC16F887") clocked at `clock_hz`.
/// Returns null for unknown parts.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_create")]
pub extern "C" fn pic_create(chip: *const c_char, clock_hz: u32) -> *mut SyncPic {
    let Some(name) = c_str(chip) else {
        return std::ptr::null_mut();
    };
    let config = SimConfig {
        clock_hz: if clock_hz == 0 {
            SimConfig::DEFAULT_CLOCK_HZ
        } else {
            clock_hz
        },
        ..SimConfig::default()
    };
    match Processor::new(name, config) {
        Ok(p) => Box::into_raw(Box::new(SyncPic {
            inner: Mutex::new(p),
        })),
        Err(e) => {
            log_event(&format!("ERROR: {}", e));
            std::ptr::null_mut()
        }
    }
}

/// Destroy a part.
/// Safe to call with null pointer.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_destroy")]
pub extern "C" fn pic_destroy(pic: *mut SyncPic) {
    if !pic.is_null() {
        unsafe {
            drop(Box::from_raw(pic));
        }
    }
}

/// Set an optional log callback for lifecycle events.
/// The callback is called with a null-terminated C string.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_set_log_callback")]
pub extern "C" fn pic_set_log_callback(cb: Option<extern "C" fn(*const c_char)>) {
    processor::set_log_callback(cb);
}

/// Reset the part. `kind`: 0 power-on, 1 brown-out, 2 MCLR, 3 watchdog.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_reset")]
pub extern "C" fn pic_reset(pic: *mut SyncPic, kind: i32) -> i32 {
    let kind = match kind {
        0 => ResetType::PowerOn,
        1 => ResetType::Brownout,
        2 => ResetType::Mclr,
        3 => ResetType::Watchdog,
        _ => return ERR_INVALID,
    };
    with_pic(pic, ERR_INVALID, |p| {
        p.reset(kind);
        0
    })
}

/// Load an Intel HEX image (null-terminated text) and power-on reset.
/// Returns 0 on success, negative error code on failure.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_load_hex")]
pub extern "C" fn pic_load_hex(pic: *mut SyncPic, text: *const c_char) -> i32 {
    let Some(text) = c_str(text) else {
        return ERR_INVALID;
    };
    with_pic(pic, ERR_INVALID, |p| status(p.load_hex(text)))
}

/// Run for the given number of instruction cycles.
/// Returns 0 when the cycles completed, 1 asleep, 2 held in reset,
/// 3 stopped at a breakpoint, negative on error.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_run_cycles")]
pub extern "C" fn pic_run_cycles(pic: *mut SyncPic, cycles: u64) -> i32 {
    with_pic(pic, ERR_INVALID, |p| match p.run_cycles(cycles) {
        StopReason::CyclesComplete => 0,
        StopReason::Sleeping => 1,
        StopReason::HeldInReset => 2,
        StopReason::Breakpoint(_) => 3,
    })
}

/// Instruction cycles since creation
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_cycles")]
pub extern "C" fn pic_cycles(pic: *mut SyncPic) -> u64 {
    with_pic(pic, 0, |p| p.cycles())
}

/// Current program counter
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_pc")]
pub extern "C" fn pic_pc(pic: *mut SyncPic) -> i32 {
    with_pic(pic, ERR_INVALID, |p| p.pc() as i32)
}

/// Number of package pins
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_pin_count")]
pub extern "C" fn pic_pin_count(pic: *mut SyncPic) -> i32 {
    with_pic(pic, ERR_INVALID, |p| p.pin_count() as i32)
}

/// Read the resolved state of a pin into `out`.
/// Returns 0 on success, negative error code on failure.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_get_pin")]
pub extern "C" fn pic_get_pin(pic: *mut SyncPic, pin: usize, out: *mut PicPin) -> i32 {
    if out.is_null() {
        return ERR_INVALID;
    }
    with_pic(pic, ERR_INVALID, |p| match p.get_pin_value(pin) {
        Ok(v) => {
            let snapshot = PicPin {
                digital: v.digital as u8,
                output: (v.direction == pins::Direction::Output) as u8,
                analog: v.analog as u8,
                voltage: v.voltage,
            };
            unsafe { *out = snapshot };
            0
        }
        Err(e) => e.code(),
    })
}

/// Drive a pin to a logic level
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_set_pin_digital")]
pub extern "C" fn pic_set_pin_digital(pic: *mut SyncPic, pin: usize, level: i32) -> i32 {
    with_pic(pic, ERR_INVALID, |p| {
        status(p.set_pin(pin, PinInput::Digital(level != 0)))
    })
}

/// Drive a pin to a voltage
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_set_pin_analog")]
pub extern "C" fn pic_set_pin_analog(pic: *mut SyncPic, pin: usize, volts: f64) -> i32 {
    with_pic(pic, ERR_INVALID, |p| status(p.set_pin(pin, PinInput::Analog(volts))))
}

/// Stop driving a pin from the board
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_release_pin")]
pub extern "C" fn pic_release_pin(pic: *mut SyncPic, pin: usize) -> i32 {
    with_pic(pic, ERR_INVALID, |p| status(p.set_pin(pin, PinInput::Released)))
}

/// Route a peripheral signal ("TX", "SCK", ...) to a pin
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_remap")]
pub extern "C" fn pic_remap(pic: *mut SyncPic, signal: *const c_char, pin: usize) -> i32 {
    let Some(signal) = c_str(signal).and_then(Signal::from_name) else {
        return ERR_INVALID;
    };
    with_pic(pic, ERR_INVALID, |p| status(p.remap(signal, pin)))
}

/// Read a data register without side effects.
/// Returns the value (0-255) or a negative error code.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_read_register")]
pub extern "C" fn pic_read_register(pic: *mut SyncPic, addr: u16) -> i32 {
    with_pic(pic, ERR_INVALID, |p| match p.peek_register(addr) {
        Ok(v) => v as i32,
        Err(e) => e.code(),
    })
}

/// Write a data register as the CPU would
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_write_register")]
pub extern "C" fn pic_write_register(pic: *mut SyncPic, addr: u16, value: u8) -> i32 {
    with_pic(pic, ERR_INVALID, |p| {
        status(p.register(addr).map(|mut r| r.put(value)))
    })
}

/// Data address of a named register, or a negative error code
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_pic_register_address")]
pub extern "C" fn pic_register_address(pic: *mut SyncPic, name: *const c_char) -> i32 {
    let Some(name) = c_str(name) else {
        return ERR_INVALID;
    };
    with_pic(pic, ERR_INVALID, |p| {
        p.address_of(name).map_or(ERR_INVALID, |a| a as i32)
    })
}
