// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Monitor mode exception vectors and the Rust side of trap handling.
//!
//! SMCs go straight to [`crate::psci_handle_smc`]. Every other exception saves a [`TrapFrame`] and
//! calls [`handle_trap`]. IRQs taken after the Non-secure hand-off are suppressed through the GIC;
//! anything else is recorded in the [`DiagnosticBlock`] and is fatal.

use crate::{
    gic::{Gic, GicConfig},
    hal::Hal,
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::error;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Why the monitor was entered, as passed by the vector stubs.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum TrapReason {
    /// No trap recorded.
    None = 0,
    /// Undefined instruction.
    Undefined = 1,
    /// Prefetch abort.
    PrefetchAbort = 2,
    /// Data abort.
    DataAbort = 3,
    /// IRQ.
    Irq = 4,
    /// FIQ.
    Fiq = 5,
    /// Reset vector taken in Monitor mode.
    Reset = 6,
}

impl TrapReason {
    /// Returns how far the banked link register is past the faulting or interrupted instruction.
    const fn lr_offset(self) -> u32 {
        match self {
            Self::None | Self::Reset => 0,
            Self::DataAbort => 8,
            Self::Undefined | Self::PrefetchAbort | Self::Irq | Self::Fiq => 4,
        }
    }
}

/// Registers saved by the vector stubs, lowest address first.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct TrapFrame {
    /// SPSR of the interrupted mode.
    pub spsr: u32,
    /// r0 to r12.
    pub r: [u32; 13],
    /// Return address, already adjusted to the faulting or interrupted instruction.
    pub lr: u32,
}

/// Word indices of the [`DiagnosticBlock`].
#[derive(Clone, Copy, Debug)]
#[repr(usize)]
pub enum DiagnosticWord {
    /// The [`TrapReason`], or the raw value passed by the stub.
    Reason,
    /// SPSR.
    Spsr,
    /// Banked link register as taken.
    Lr,
    /// Faulting or interrupted instruction.
    Pc,
    /// Data Fault Status Register.
    Dfsr,
    /// Data Fault Address Register.
    Dfar,
    /// Instruction Fault Status Register.
    Ifsr,
    /// Instruction Fault Address Register.
    Ifar,
    /// MPIDR of the core which trapped.
    Mpidr,
}

const DIAGNOSTIC_WORDS: usize = DiagnosticWord::Mpidr as usize + 1;

/// Context of the last trap, kept for post-mortem inspection with a debugger.
#[derive(Debug)]
pub struct DiagnosticBlock {
    words: [AtomicU32; DIAGNOSTIC_WORDS],
}

impl DiagnosticBlock {
    /// Creates an empty block.
    pub const fn new() -> Self {
        Self {
            words: [const { AtomicU32::new(0) }; DIAGNOSTIC_WORDS],
        }
    }

    fn set(&self, word: DiagnosticWord, value: u32) {
        self.words[word as usize].store(value, Ordering::Relaxed);
    }

    /// Returns the value of one word.
    pub fn get(&self, word: DiagnosticWord) -> u32 {
        self.words[word as usize].load(Ordering::Relaxed)
    }

    fn record(&self, hal: &impl Hal, reason: u32, pc: u32, lr: u32, frame: &TrapFrame) {
        let faults = hal.read_fault_registers();
        self.set(DiagnosticWord::Reason, reason);
        self.set(DiagnosticWord::Spsr, frame.spsr);
        self.set(DiagnosticWord::Lr, lr);
        self.set(DiagnosticWord::Pc, pc);
        self.set(DiagnosticWord::Dfsr, faults.dfsr);
        self.set(DiagnosticWord::Dfar, faults.dfar);
        self.set(DiagnosticWord::Ifsr, faults.ifsr);
        self.set(DiagnosticWord::Ifar, faults.ifar);
        self.set(DiagnosticWord::Mpidr, hal.read_mpidr().bits());
    }
}

impl Default for DiagnosticBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// The diagnostic block written by the firmware's vectors.
pub static DIAGNOSTICS: DiagnosticBlock = DiagnosticBlock::new();

/// Handles a trap other than an SMC.
///
/// Returns only for an IRQ taken after the Non-secure hand-off, which is suppressed. Panics for
/// everything else, after recording it in `diagnostics`.
pub fn handle_trap(
    hal: &impl Hal,
    gic: GicConfig,
    handed_off: bool,
    diagnostics: &DiagnosticBlock,
    reason: u32,
    frame: &TrapFrame,
) {
    let decoded = TrapReason::try_from(reason).ok();
    let offset = decoded.map_or(0, TrapReason::lr_offset);
    let pc = frame.lr;
    let lr = frame.lr.wrapping_add(offset);
    diagnostics.record(hal, reason, pc, lr, frame);

    if decoded == Some(TrapReason::Irq) && handed_off {
        let gic = Gic::new(hal, gic);
        gic.suppress(gic.acknowledge());
        return;
    }

    let faults = hal.read_fault_registers();
    error!("Unexpected trap {decoded:?} ({reason}) in Monitor mode");
    error!(
        "pc={pc:#010x} lr={lr:#010x} spsr={:#010x} mpidr={:#010x}",
        frame.spsr,
        hal.read_mpidr().bits()
    );
    error!(
        "dfsr={:#010x} dfar={:#010x} ifsr={:#010x} ifar={:#010x}",
        faults.dfsr, faults.dfar, faults.ifsr, faults.ifar
    );
    for (i, value) in frame.r.iter().enumerate() {
        error!("r{i}={value:#010x}");
    }
    panic!("Unhandled {decoded:?} trap at {pc:#010x}");
}

/// Returns the address of the monitor vector table.
pub fn vector_table_address() -> usize {
    #[cfg(all(target_arch = "arm", not(test)))]
    let address = {
        unsafe extern "C" {
            safe static monitor_vectors: u32;
        }
        &raw const monitor_vectors as usize
    };
    #[cfg(not(all(target_arch = "arm", not(test))))]
    let address = 0;
    address
}

#[cfg(all(target_arch = "arm", not(test)))]
mod asm {
    use super::*;
    use crate::{
        nonsecure::non_secure_entered,
        platform::{Platform, PlatformImpl},
        services::Services,
    };
    use core::arch::global_asm;

    /// Called by the vector stubs for everything but SMCs.
    #[unsafe(no_mangle)]
    extern "C" fn monitor_trap(reason: u32, frame: &TrapFrame) {
        handle_trap(
            Services::get().psci.hal(),
            PlatformImpl::GIC_CONFIG,
            non_secure_entered(),
            &DIAGNOSTICS,
            reason,
            frame,
        );
    }

    global_asm!(
        ".macro trap_entry name, reason, adjust",
        "\\name:",
        ".if \\adjust",
        "    sub lr, lr, #\\adjust",
        ".endif",
        // Pad to keep the stack 8-byte aligned across the call.
        "    sub sp, sp, #4",
        "    stmfd sp!, {{r0-r12, lr}}",
        "    mrs r0, spsr",
        "    stmfd sp!, {{r0}}",
        "    mov r0, #\\reason",
        "    mov r1, sp",
        "    bl monitor_trap",
        "    ldmfd sp!, {{r0}}",
        "    msr spsr_cxsf, r0",
        "    ldmfd sp!, {{r0-r12, lr}}",
        "    add sp, sp, #4",
        "    movs pc, lr",
        ".endm",

        ".section .text.monitor_vectors, \"ax\"",
        ".arm",
        ".balign 32",
        ".global monitor_vectors",
        "monitor_vectors:",
        "    b monitor_reset",
        "    b monitor_undefined",
        "    b monitor_smc",
        "    b monitor_prefetch_abort",
        "    b monitor_data_abort",
        "    b .",
        "    b monitor_irq",
        "    b monitor_fiq",

        // r0-r3 already hold the function ID and arguments in the order psci_handle_smc takes
        // them. r4-r14 are preserved for the caller.
        "monitor_smc:",
        "    stmfd sp!, {{r4-r12, lr}}",
        "    bl psci_handle_smc",
        "    ldmfd sp!, {{r4-r12, lr}}",
        "    movs pc, lr",

        "trap_entry monitor_reset, {RESET}, 0",
        "trap_entry monitor_undefined, {UNDEFINED}, 4",
        "trap_entry monitor_prefetch_abort, {PREFETCH_ABORT}, 4",
        "trap_entry monitor_data_abort, {DATA_ABORT}, 8",
        "trap_entry monitor_irq, {IRQ}, 4",
        "trap_entry monitor_fiq, {FIQ}, 4",
        ".purgem trap_entry",

        RESET = const TrapReason::Reset as u32,
        UNDEFINED = const TrapReason::Undefined as u32,
        PREFETCH_ABORT = const TrapReason::PrefetchAbort as u32,
        DATA_ABORT = const TrapReason::DataAbort as u32,
        IRQ = const TrapReason::Irq as u32,
        FIQ = const TrapReason::Fiq as u32,
    );
}
