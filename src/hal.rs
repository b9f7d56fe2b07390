// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The narrow interface through which the monitor touches hardware.
//!
//! Everything that needs a coprocessor instruction, a barrier, a cache maintenance operation or a
//! device register goes through [`Hal`]. The firmware build uses [`crate::armv7::Armv7`]; unit
//! tests use `fake::FakeHal`, which records what the code under test did.

#[cfg(test)]
pub mod fake;

use crate::sysregs::{Actlr, FaultRegisters, Mpidr, Nsacr, Sctlr};

/// Privileged operations and board primitives used by the monitor.
pub trait Hal: Sync {
    /// Reads a 32-bit device register.
    fn read32(&self, addr: usize) -> u32;

    /// Writes a 32-bit device register.
    fn write32(&self, addr: usize, value: u32);

    /// Sets the bits of `mask` in the register at `addr`.
    fn set_bits(&self, addr: usize, mask: u32) {
        self.write32(addr, self.read32(addr) | mask);
    }

    /// Clears the bits of `mask` in the register at `addr`.
    fn clear_bits(&self, addr: usize, mask: u32) {
        self.write32(addr, self.read32(addr) & !mask);
    }

    /// Busy-waits for at least `us` microseconds.
    fn udelay(&self, us: u32);

    /// Busy-waits for at least `ms` milliseconds.
    fn mdelay(&self, ms: u32) {
        self.udelay(ms.saturating_mul(1000));
    }

    /// Returns a monotonic millisecond timestamp, wrapping at `u32::MAX`.
    fn time_ms(&self) -> u32;

    /// Arms the system watchdog to reset the SoC after `seconds`.
    fn watchdog_set(&self, seconds: u32);

    /// Full system data synchronisation barrier.
    fn dsb(&self);

    /// Instruction synchronisation barrier.
    fn isb(&self);

    /// Signals an event to all cores.
    fn sev(&self);

    /// Waits for an interrupt.
    fn wfi(&self);

    /// Returns the smallest data cache line size in bytes.
    fn dcache_line_size(&self) -> usize;

    /// Returns the smallest instruction cache line size in bytes.
    fn icache_line_size(&self) -> usize;

    /// Cleans and invalidates the data cache line containing `addr` to the point of coherency.
    fn clean_invalidate_dcache_line(&self, addr: usize);

    /// Invalidates the instruction cache line containing `addr` to the point of unification.
    fn invalidate_icache_line(&self, addr: usize);

    /// Cleans and invalidates every data cache level by set/way.
    fn clean_invalidate_dcache_all(&self);

    /// Invalidates the whole instruction cache and the branch predictor.
    fn invalidate_icache_all(&self);

    /// Returns the affinity register of the calling core.
    fn read_mpidr(&self) -> Mpidr;

    /// Returns the system control register of the calling core.
    fn read_sctlr(&self) -> Sctlr;

    /// Writes the system control register of the calling core.
    ///
    /// # Safety
    ///
    /// Turning the MMU or caches off or on must not invalidate anything the running code relies
    /// on. Caches must have been cleaned before they are disabled.
    unsafe fn write_sctlr(&self, value: Sctlr);

    /// Returns the auxiliary control register of the calling core.
    fn read_actlr(&self) -> Actlr;

    /// Writes the auxiliary control register of the calling core.
    ///
    /// # Safety
    ///
    /// Must be called from the Secure state. Setting SMP must happen before the core's caches and
    /// MMU are enabled.
    unsafe fn write_actlr(&self, value: Actlr);

    /// Returns the Non-secure access control register.
    fn read_nsacr(&self) -> Nsacr;

    /// Writes the Non-secure access control register.
    ///
    /// # Safety
    ///
    /// Must be called from the Secure state.
    unsafe fn write_nsacr(&self, value: Nsacr);

    /// Returns the monitor vector base address of the calling core.
    fn read_mvbar(&self) -> usize;

    /// Sets the monitor vector base address of the calling core.
    ///
    /// # Safety
    ///
    /// `base` must point to a valid, 32-byte aligned monitor vector table which stays in place for
    /// the rest of the firmware lifetime.
    unsafe fn write_mvbar(&self, base: usize);

    /// Sets the banked Monitor mode stack pointer of the calling core.
    ///
    /// # Safety
    ///
    /// `top` must be the top of a stack reserved for Monitor mode on this core and not used for
    /// anything else.
    unsafe fn set_monitor_stack(&self, top: usize);

    /// Returns the fault status and address registers.
    fn read_fault_registers(&self) -> FaultRegisters;

    /// Masks IRQ, FIQ and asynchronous aborts on the calling core.
    fn mask_interrupts(&self);

    /// Stops the calling core for good.
    fn halt(&self) -> ! {
        loop {
            self.dsb();
            self.wfi();
        }
    }

    /// Performs an exception return into Non-secure SVC mode at `entry` with `args` in `r0..r2`.
    ///
    /// Bit 0 of `entry` selects the Thumb instruction set.
    ///
    /// # Safety
    ///
    /// The MMU and caches must be off, all secure state the Non-secure world must not observe
    /// must have been scrubbed, and `entry` must be the OS entry point.
    unsafe fn enter_non_secure(&self, entry: u32, args: [u32; 3]) -> !;
}
