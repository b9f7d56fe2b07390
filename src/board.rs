// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Primitives provided by the bootloader that links this library.
//!
//! On non-ARM hosts these are inert so the crate can be built and unit tested anywhere.

#[cfg(target_arch = "arm")]
mod ffi {
    unsafe extern "C" {
        pub fn read32(addr: u32) -> u32;
        pub fn write32(addr: u32, value: u32);
        pub safe fn udelay(us: u32);
        pub safe fn mdelay(ms: u32);
        pub safe fn time_ms() -> u32;
        pub safe fn sunxi_wdg_set(seconds: u32);
        pub fn board_console_write(bytes: *const u8, len: usize);
    }
}

/// Reads the device register at `addr`.
///
/// # Safety
///
/// `addr` must be the address of a readable device register.
pub unsafe fn read32(addr: usize) -> u32 {
    #[cfg(target_arch = "arm")]
    // SAFETY: The caller guarantees that `addr` is a readable device register.
    let value = unsafe { ffi::read32(addr as u32) };
    #[cfg(not(target_arch = "arm"))]
    let value = {
        let _ = addr;
        0
    };
    value
}

/// Writes `value` to the device register at `addr`.
///
/// # Safety
///
/// `addr` must be the address of a writable device register, and the write must not break any
/// memory safety assumption.
pub unsafe fn write32(addr: usize, value: u32) {
    #[cfg(target_arch = "arm")]
    // SAFETY: The caller guarantees that the write is valid.
    unsafe {
        ffi::write32(addr as u32, value)
    };
    #[cfg(not(target_arch = "arm"))]
    let _ = (addr, value);
}

/// Busy-waits for `us` microseconds.
pub fn udelay(us: u32) {
    #[cfg(target_arch = "arm")]
    ffi::udelay(us);
    #[cfg(not(target_arch = "arm"))]
    let _ = us;
}

/// Busy-waits for `ms` milliseconds.
pub fn mdelay(ms: u32) {
    #[cfg(target_arch = "arm")]
    ffi::mdelay(ms);
    #[cfg(not(target_arch = "arm"))]
    let _ = ms;
}

/// Returns the board's monotonic millisecond counter.
pub fn time_ms() -> u32 {
    #[cfg(target_arch = "arm")]
    let now = ffi::time_ms();
    #[cfg(not(target_arch = "arm"))]
    let now = 0;
    now
}

/// Arms the SoC watchdog with the given timeout.
pub fn watchdog_set(seconds: u32) {
    #[cfg(target_arch = "arm")]
    ffi::sunxi_wdg_set(seconds);
    #[cfg(not(target_arch = "arm"))]
    let _ = seconds;
}

/// Writes raw bytes to the board console.
pub fn console_write(bytes: &[u8]) {
    #[cfg(target_arch = "arm")]
    // SAFETY: The pointer and length come from a valid slice which outlives the call.
    unsafe {
        ffi::board_console_write(bytes.as_ptr(), bytes.len())
    };
    #[cfg(not(target_arch = "arm"))]
    let _ = bytes;
}

/// The board console as a `core::fmt::Write` sink.
#[derive(Default)]
pub struct BoardConsole;

impl core::fmt::Write for BoardConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        console_write(s.as_bytes());
        Ok(())
    }
}
