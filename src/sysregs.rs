// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! AArch32 CP15 system registers used by the monitor.

use bitflags::bitflags;

/// Generates `read_$name` and `write_$name` functions for the CP15 register encoded by
/// `opc1, CRn, CRm, opc2`.
///
/// Reads are safe, writes are `unsafe`. On non-ARM hosts the generated functions read as zero and
/// ignore writes.
macro_rules! cp15_register {
    ($name:ident, $opc1:literal, $crn:ident, $crm:ident, $opc2:literal) => {
        paste::paste! {
            #[doc = "Returns the value of the `" $name "` register."]
            #[allow(unused)]
            #[inline(always)]
            pub fn [< read_ $name >]() -> u32 {
                #[cfg(target_arch = "arm")]
                let value = {
                    let value: u32;
                    // SAFETY: Reading this register has no side effects.
                    unsafe {
                        core::arch::asm!(
                            concat!(
                                "mrc p15, ", stringify!($opc1), ", {value}, ",
                                stringify!($crn), ", ", stringify!($crm), ", ", stringify!($opc2)
                            ),
                            value = out(reg) value,
                            options(nomem, nostack, preserves_flags),
                        );
                    }
                    value
                };
                #[cfg(not(target_arch = "arm"))]
                let value = 0;
                value
            }

            cp15_register!(@write $name, $opc1, $crn, $crm, $opc2);
        }
    };
    (@write $name:ident, $opc1:literal, $crn:ident, $crm:ident, $opc2:literal) => {
        paste::paste! {
            #[doc = "Writes `value` to the `" $name "` register."]
            ///
            /// # Safety
            ///
            /// The caller must ensure that the new value does not violate any memory safety
            /// assumptions of the running code, e.g. by changing the translation regime or cache
            /// configuration underneath live references.
            #[allow(unused)]
            #[inline(always)]
            pub unsafe fn [< write_ $name >](value: u32) {
                #[cfg(target_arch = "arm")]
                // SAFETY: The caller upholds the safety requirements of this function.
                unsafe {
                    core::arch::asm!(
                        concat!(
                            "mcr p15, ", stringify!($opc1), ", {value}, ",
                            stringify!($crn), ", ", stringify!($crm), ", ", stringify!($opc2)
                        ),
                        value = in(reg) value,
                        options(nostack, preserves_flags),
                    );
                }
                #[cfg(not(target_arch = "arm"))]
                let _ = value;
            }
        }
    };
}

cp15_register!(mpidr, 0, c0, c0, 5);
cp15_register!(ccsidr, 1, c0, c0, 0);
cp15_register!(clidr, 1, c0, c0, 1);
cp15_register!(csselr, 2, c0, c0, 0);
cp15_register!(ctr, 0, c0, c0, 1);
cp15_register!(sctlr, 0, c1, c0, 0);
cp15_register!(actlr, 0, c1, c0, 1);
cp15_register!(scr, 0, c1, c1, 0);
cp15_register!(nsacr, 0, c1, c1, 2);
cp15_register!(dfsr, 0, c5, c0, 0);
cp15_register!(ifsr, 0, c5, c0, 1);
cp15_register!(dfar, 0, c6, c0, 0);
cp15_register!(ifar, 0, c6, c0, 2);
cp15_register!(mvbar, 0, c12, c0, 1);

bitflags! {
    /// Multiprocessor Affinity Register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Mpidr: u32 {
        /// Multiprocessing extensions implemented; reads as one.
        const M = 1 << 31;
        /// Uniprocessor system.
        const U = 1 << 30;
        /// Lowest affinity level consists of multithreaded logical processors.
        const MT = 1 << 24;
        const _ = !0;
    }
}

impl Mpidr {
    const AFF_MASK: u32 = 0xff;

    /// Creates an MPIDR for the given affinity levels, with the RES1 `M` bit set.
    pub const fn from_affinity(aff2: u8, aff1: u8, aff0: u8) -> Self {
        Self::from_bits_retain(
            Self::M.bits() | (aff2 as u32) << 16 | (aff1 as u32) << 8 | aff0 as u32,
        )
    }

    /// Returns affinity level 0.
    pub const fn aff0(self) -> u8 {
        (self.bits() & Self::AFF_MASK) as u8
    }

    /// Returns affinity level 1.
    pub const fn aff1(self) -> u8 {
        ((self.bits() >> 8) & Self::AFF_MASK) as u8
    }

    /// Returns affinity level 2.
    pub const fn aff2(self) -> u8 {
        ((self.bits() >> 16) & Self::AFF_MASK) as u8
    }
}

bitflags! {
    /// System Control Register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Sctlr: u32 {
        /// MMU enable.
        const M = 1 << 0;
        /// Alignment check enable.
        const A = 1 << 1;
        /// Data and unified cache enable.
        const C = 1 << 2;
        /// Branch prediction enable.
        const Z = 1 << 11;
        /// Instruction cache enable.
        const I = 1 << 12;
        /// Thumb exception enable.
        const TE = 1 << 30;
        const _ = !0;
    }
}

bitflags! {
    /// Cortex-A7 Auxiliary Control Register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Actlr: u32 {
        /// Takes part in coherency with the other cores.
        const SMP = 1 << 6;
        const _ = !0;
    }
}

bitflags! {
    /// Non-Secure Access Control Register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Nsacr: u32 {
        /// Non-secure access to coprocessor 10, VFP and Advanced SIMD.
        const CP10 = 1 << 10;
        /// Non-secure access to coprocessor 11.
        const CP11 = 1 << 11;
        /// ACTLR.SMP is writable from the Non-secure state.
        const NS_SMP = 1 << 18;
        const _ = !0;
    }
}

bitflags! {
    /// Secure Configuration Register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Scr: u32 {
        /// Non-secure bit.
        const NS = 1 << 0;
        /// IRQs are taken to Monitor mode.
        const IRQ = 1 << 1;
        /// FIQs are taken to Monitor mode.
        const FIQ = 1 << 2;
        /// External aborts are taken to Monitor mode.
        const EA = 1 << 3;
        /// CPSR.F is writable from the Non-secure state.
        const FW = 1 << 4;
        /// CPSR.A is writable from the Non-secure state.
        const AW = 1 << 5;
        const _ = !0;
    }
}

bitflags! {
    /// Current and saved program status register fields.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Cpsr: u32 {
        /// Thumb execution state.
        const T = 1 << 5;
        /// FIQ mask.
        const F = 1 << 6;
        /// IRQ mask.
        const I = 1 << 7;
        /// Asynchronous abort mask.
        const A = 1 << 8;
        const _ = !0;
    }
}

impl Cpsr {
    /// Mask of the mode field.
    pub const MODE_MASK: u32 = 0x1f;
    /// Supervisor mode.
    pub const MODE_SVC: u32 = 0x13;
    /// Monitor mode.
    pub const MODE_MON: u32 = 0x16;

    /// Returns the processor mode field.
    pub const fn mode(self) -> u32 {
        self.bits() & Self::MODE_MASK
    }
}

/// Fault status and address registers captured on an abort.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FaultRegisters {
    /// Data Fault Status Register.
    pub dfsr: u32,
    /// Data Fault Address Register.
    pub dfar: u32,
    /// Instruction Fault Status Register.
    pub ifsr: u32,
    /// Instruction Fault Address Register.
    pub ifar: u32,
}

impl FaultRegisters {
    /// Reads the current fault registers.
    pub fn read() -> Self {
        Self {
            dfsr: read_dfsr(),
            dfar: read_dfar(),
            ifsr: read_ifsr(),
            ifar: read_ifar(),
        }
    }
}
