// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The one-way hand-off from secure Monitor mode to the Non-secure OS.

use crate::{
    gic::{Gic, GicConfig},
    hal::Hal,
    sysregs::{Actlr, Nsacr, Sctlr},
};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{error, info};
use thiserror::Error;

static NON_SECURE_ENTERED: AtomicBool = AtomicBool::new(false);

/// A register which must be switched to allow Non-secure access before the hand-off.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SecuritySwitch {
    /// Name for diagnostics.
    pub name: &'static str,
    /// Register written with `value`.
    pub write: usize,
    /// Register read back to confirm the switch.
    pub readback: usize,
    /// Value to write.
    pub value: u32,
    /// Bits of the read-back register which must match `value`.
    pub mask: u32,
}

impl SecuritySwitch {
    /// Creates a switch which is written and read back at the same address, checking every bit of
    /// `value`.
    pub const fn new(name: &'static str, addr: usize, value: u32) -> Self {
        Self {
            name,
            write: addr,
            readback: addr,
            value,
            mask: value,
        }
    }

    /// Returns a copy of the switch which is read back from `readback`.
    pub const fn with_readback(self, readback: usize) -> Self {
        Self { readback, ..self }
    }
}

/// Failure to open the security boundary for the Non-secure world.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SecurityError {
    /// A switch did not read back as written.
    #[error("{name} switch at {address:#010x} reads {actual:#010x}, expected {expected:#010x}")]
    Mismatch {
        /// Name of the switch.
        name: &'static str,
        /// Read-back address.
        address: usize,
        /// Expected value of the masked bits.
        expected: u32,
        /// Value of the masked bits read back.
        actual: u32,
    },
}

/// Returns whether the hand-off to the Non-secure world has happened.
pub fn non_secure_entered() -> bool {
    NON_SECURE_ENTERED.load(Ordering::Acquire)
}

/// Writes every switch, then reads each of them back.
pub fn open_security_switches(
    hal: &impl Hal,
    switches: &[SecuritySwitch],
) -> Result<(), SecurityError> {
    for switch in switches {
        hal.write32(switch.write, switch.value);
    }
    hal.dsb();

    for switch in switches {
        let actual = hal.read32(switch.readback) & switch.mask;
        let expected = switch.value & switch.mask;
        if actual != expected {
            return Err(SecurityError::Mismatch {
                name: switch.name,
                address: switch.readback,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Returns `r0..r2` for booting Linux with the device tree at `dtb`.
pub const fn linux_boot_args(dtb: u32) -> [u32; 3] {
    [0, !0, dtb]
}

/// Opens the security switches, hands the GIC over, turns the MMU and caches off and jumps to
/// `entry` in Non-secure SVC mode with `args` in `r0..r2`.
///
/// Panics if any switch fails to read back as written. Must be called once, on the boot core, as
/// the last thing the firmware does.
pub fn enter_non_secure(
    hal: &impl Hal,
    gic: GicConfig,
    switches: &[SecuritySwitch],
    entry: u32,
    args: [u32; 3],
) -> ! {
    if let Err(e) = open_security_switches(hal, switches) {
        error!("{e}");
        panic!("Security hand-off failed: {e}");
    }

    let gic = Gic::new(hal, gic);
    gic.quiesce();
    gic.init_non_secure();

    hal.mask_interrupts();
    hal.clean_invalidate_dcache_all();
    let sctlr = hal.read_sctlr() - (Sctlr::M | Sctlr::C | Sctlr::I);
    // SAFETY: The data cache has been cleaned, the monitor runs from an identity mapping, and
    // nothing after this point depends on cached state.
    unsafe {
        hal.write_sctlr(sctlr);
    }
    hal.isb();
    hal.invalidate_icache_all();

    // The OS enables its caches with this core in the coherency domain, and uses VFP and NEON.
    // SAFETY: Still Secure, with the caches off.
    unsafe {
        hal.write_actlr(hal.read_actlr() | Actlr::SMP);
        hal.write_nsacr(hal.read_nsacr() | Nsacr::CP10 | Nsacr::CP11 | Nsacr::NS_SMP);
    }

    NON_SECURE_ENTERED.store(true, Ordering::Release);
    info!(
        "Entering Non-secure world at {entry:#010x} r0={:#x} r1={:#x} r2={:#x}",
        args[0], args[1], args[2]
    );
    // SAFETY: The MMU and caches are off, the security switches and GIC have been handed over, and
    // `entry` is the OS entry point given by the boot loader.
    unsafe { hal.enter_non_secure(entry, args) }
}
