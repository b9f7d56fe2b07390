// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The ARMv7-A implementation of [`Hal`], for Cortex-A7 cores running in Monitor mode.

use crate::{
    board, cache,
    hal::Hal,
    sysregs::{self, Actlr, Cpsr, FaultRegisters, Mpidr, Nsacr, Scr, Sctlr},
};
#[cfg(target_arch = "arm")]
use core::arch::asm;

/// Issues a full system data synchronisation barrier.
pub fn dsb_sy() {
    #[cfg(target_arch = "arm")]
    // SAFETY: A barrier has no effect on memory safety.
    unsafe {
        asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// Issues an instruction synchronisation barrier.
pub fn isb() {
    #[cfg(target_arch = "arm")]
    // SAFETY: A barrier has no effect on memory safety.
    unsafe {
        asm!("isb", options(nostack, preserves_flags));
    }
}

/// Signals an event to all cores.
pub fn sev() {
    #[cfg(target_arch = "arm")]
    // SAFETY: `sev` only wakes up cores waiting in `wfe`.
    unsafe {
        asm!("sev", options(nomem, nostack, preserves_flags));
    }
}

/// Waits for an interrupt.
pub fn wfi() {
    #[cfg(target_arch = "arm")]
    // SAFETY: `wfi` only suspends execution until the next interrupt.
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// DCCIMVAC: clean and invalidate data cache line by address to the point of coherency.
fn dccimvac(addr: usize) {
    #[cfg(target_arch = "arm")]
    // SAFETY: Cleaning and invalidating writes dirty data back, so no data is lost.
    unsafe {
        asm!("mcr p15, 0, {}, c7, c14, 1", in(reg) addr, options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "arm"))]
    let _ = addr;
}

/// DCCISW: clean and invalidate data cache line by set/way.
fn dccisw(operand: u32) {
    #[cfg(target_arch = "arm")]
    // SAFETY: Cleaning and invalidating writes dirty data back, so no data is lost.
    unsafe {
        asm!("mcr p15, 0, {}, c7, c14, 2", in(reg) operand, options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "arm"))]
    let _ = operand;
}

/// ICIMVAU: invalidate instruction cache line by address to the point of unification.
fn icimvau(addr: usize) {
    #[cfg(target_arch = "arm")]
    // SAFETY: The instruction cache never holds dirty data.
    unsafe {
        asm!("mcr p15, 0, {}, c7, c5, 1", in(reg) addr, options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "arm"))]
    let _ = addr;
}

/// ICIALLU and BPIALL: invalidate the whole instruction cache and the branch predictor.
fn iciallu_bpiall() {
    #[cfg(target_arch = "arm")]
    // SAFETY: The instruction cache and branch predictor never hold dirty data.
    unsafe {
        asm!(
            "mcr p15, 0, {zero}, c7, c5, 0",
            "mcr p15, 0, {zero}, c7, c5, 6",
            zero = in(reg) 0,
            options(nostack, preserves_flags),
        );
    }
}

/// The ARMv7-A privileged operations, backed by the bootloader's board primitives.
#[derive(Debug)]
pub struct Armv7 {
    _private: (),
}

impl Armv7 {
    /// Creates the hardware access object.
    ///
    /// # Safety
    ///
    /// The caller must be running in a secure privileged mode on the T113-S3, with exclusive
    /// ownership of the device registers this crate programs. Only one instance should exist.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Hal for Armv7 {
    fn read32(&self, addr: usize) -> u32 {
        // SAFETY: The creator of `Armv7` guaranteed that the monitor owns the device registers it
        // accesses, and all addresses passed here come from the platform register map.
        unsafe { board::read32(addr) }
    }

    fn write32(&self, addr: usize, value: u32) {
        // SAFETY: As for `read32`.
        unsafe { board::write32(addr, value) }
    }

    fn udelay(&self, us: u32) {
        board::udelay(us);
    }

    fn mdelay(&self, ms: u32) {
        board::mdelay(ms);
    }

    fn time_ms(&self) -> u32 {
        board::time_ms()
    }

    fn watchdog_set(&self, seconds: u32) {
        board::watchdog_set(seconds);
    }

    fn dsb(&self) {
        dsb_sy();
    }

    fn isb(&self) {
        isb();
    }

    fn sev(&self) {
        sev();
    }

    fn wfi(&self) {
        wfi();
    }

    fn dcache_line_size(&self) -> usize {
        // CTR.DminLine is log2 of the number of words in the smallest line.
        4 << ((sysregs::read_ctr() >> 16) & 0xf)
    }

    fn icache_line_size(&self) -> usize {
        4 << (sysregs::read_ctr() & 0xf)
    }

    fn clean_invalidate_dcache_line(&self, addr: usize) {
        dccimvac(addr);
    }

    fn invalidate_icache_line(&self, addr: usize) {
        icimvau(addr);
    }

    fn clean_invalidate_dcache_all(&self) {
        let clidr = sysregs::read_clidr();
        for level in 0..cache::level_of_coherency(clidr) {
            if !cache::level_has_data_cache(clidr, level) {
                continue;
            }
            // SAFETY: Selecting a cache level for CCSIDR has no effect on memory.
            unsafe { sysregs::write_csselr(level << 1) };
            isb();
            for operand in cache::set_way_operands(level, sysregs::read_ccsidr()) {
                dccisw(operand);
            }
        }
        dsb_sy();
        isb();
    }

    fn invalidate_icache_all(&self) {
        iciallu_bpiall();
        dsb_sy();
        isb();
    }

    fn read_mpidr(&self) -> Mpidr {
        Mpidr::from_bits_retain(sysregs::read_mpidr())
    }

    fn read_sctlr(&self) -> Sctlr {
        Sctlr::from_bits_retain(sysregs::read_sctlr())
    }

    unsafe fn write_sctlr(&self, value: Sctlr) {
        // SAFETY: The caller upholds the requirements for changing SCTLR.
        unsafe { sysregs::write_sctlr(value.bits()) };
        isb();
    }

    fn read_actlr(&self) -> Actlr {
        Actlr::from_bits_retain(sysregs::read_actlr())
    }

    unsafe fn write_actlr(&self, value: Actlr) {
        // SAFETY: The caller is in the Secure state and its caches are off.
        unsafe { sysregs::write_actlr(value.bits()) };
        isb();
    }

    fn read_nsacr(&self) -> Nsacr {
        Nsacr::from_bits_retain(sysregs::read_nsacr())
    }

    unsafe fn write_nsacr(&self, value: Nsacr) {
        // SAFETY: The caller is in the Secure state.
        unsafe { sysregs::write_nsacr(value.bits()) };
        isb();
    }

    fn read_mvbar(&self) -> usize {
        sysregs::read_mvbar() as usize
    }

    unsafe fn write_mvbar(&self, base: usize) {
        // SAFETY: The caller guarantees that `base` is a valid monitor vector table.
        unsafe { sysregs::write_mvbar(base as u32) };
        isb();
    }

    unsafe fn set_monitor_stack(&self, top: usize) {
        #[cfg(target_arch = "arm")]
        // SAFETY: Only the banked Monitor mode SP is changed, and the original mode is restored
        // before returning. The caller guarantees that `top` is a dedicated stack.
        unsafe {
            asm!(
                "mrs {saved}, cpsr",
                "cps #{mon}",
                "mov sp, {top}",
                "msr cpsr_c, {saved}",
                saved = out(reg) _,
                top = in(reg) top,
                mon = const Cpsr::MODE_MON,
                options(nomem, preserves_flags),
            );
        }
        #[cfg(not(target_arch = "arm"))]
        let _ = top;
    }

    fn read_fault_registers(&self) -> FaultRegisters {
        FaultRegisters::read()
    }

    fn mask_interrupts(&self) {
        #[cfg(target_arch = "arm")]
        // SAFETY: Masking interrupts cannot break memory safety.
        unsafe {
            asm!("cpsid aif", options(nomem, nostack, preserves_flags));
        }
    }

    unsafe fn enter_non_secure(&self, entry: u32, args: [u32; 3]) -> ! {
        let mut spsr = Cpsr::from_bits_retain(Cpsr::MODE_SVC) | Cpsr::A | Cpsr::I | Cpsr::F;
        if entry & 1 != 0 {
            spsr |= Cpsr::T;
        }
        // Exceptions stay with the Non-secure world, which may also change the F and A masks.
        const SCR_CLEAR: u32 = Scr::IRQ.bits() | Scr::FIQ.bits() | Scr::EA.bits();
        const SCR_SET: u32 = Scr::NS.bits() | Scr::FW.bits() | Scr::AW.bits();

        #[cfg(target_arch = "arm")]
        // SAFETY: The caller guarantees that the machine is ready to be handed to the Non-secure
        // world. Control never comes back here.
        unsafe {
            asm!(
                "cps #{mon}",
                "mrc p15, 0, r3, c1, c1, 0",
                "bic r3, r3, #{scr_clear}",
                "orr r3, r3, #{scr_set}",
                "mcr p15, 0, r3, c1, c1, 0",
                "isb",
                "msr spsr_cxsf, r5",
                "mov lr, r4",
                "movs pc, lr",
                mon = const Cpsr::MODE_MON,
                scr_clear = const SCR_CLEAR,
                scr_set = const SCR_SET,
                in("r0") args[0],
                in("r1") args[1],
                in("r2") args[2],
                in("r4") entry & !1,
                in("r5") spsr.bits(),
                options(noreturn),
            );
        }

        #[cfg(not(target_arch = "arm"))]
        {
            let _ = (entry, args, spsr, SCR_CLEAR, SCR_SET);
            self.halt()
        }
    }
}
