// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Minimal AArch32 secure monitor for the Allwinner T113-S3.
//!
//! The bootloader calls [`psci_init`] once on the boot core, starts the Non-secure OS with
//! [`psci_enter_non_secure`], and from then on every SMC taken to Monitor mode arrives at
//! [`psci_handle_smc`].

#![cfg_attr(not(test), no_std)]

mod armv7;
mod board;
mod cache;
mod exceptions;
mod gic;
mod hal;
mod logger;
mod nonsecure;
mod platform;
mod services;
mod smccc;
mod stacks;
mod sysregs;

use crate::{
    platform::{Platform, PlatformImpl},
    services::Services,
};
use log::{info, warn};

/// Initialises logging and PSCI.
///
/// Must be called once, on the boot core, before the other core is started or any SMC is taken.
#[unsafe(no_mangle)]
pub extern "C" fn psci_init() {
    if logger::init(PlatformImpl::create_log_sink()).is_err() {
        // Only a repeated `psci_init` gets here. The logger from the first call stays installed.
        warn!("psci_init called more than once");
    }
    info!("Secure monitor starting");

    let psci = &Services::get().psci;
    psci.init();

    #[cfg(feature = "cpu-selftest")]
    if let Err(e) = psci.run_selftest() {
        panic!("CPU bring-up self-test failed: {e}");
    }
}

/// Handles an SMC with the given function ID and arguments, returning the value for `r0`.
#[unsafe(no_mangle)]
pub extern "C" fn psci_handle_smc(function_id: u32, arg0: u32, arg1: u32, arg2: u32) -> i32 {
    Services::get().handle_smc(&[function_id, arg0, arg1, arg2])
}

/// Hands the system over to the Non-secure OS at `entry`, with `arg0..arg2` in `r0..r2`.
///
/// This is the last thing the firmware does on the boot core. It halts if the security boundary
/// cannot be opened.
#[unsafe(no_mangle)]
pub extern "C" fn psci_enter_non_secure(entry: u32, arg0: u32, arg1: u32, arg2: u32) -> ! {
    nonsecure::enter_non_secure(
        Services::get().psci.hal(),
        PlatformImpl::GIC_CONFIG,
        PlatformImpl::SECURITY_SWITCHES,
        entry,
        [arg0, arg1, arg2],
    )
}
