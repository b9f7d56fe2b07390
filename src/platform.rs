// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

macro_rules! select_platform {
    ($condition:meta, $mod:ident::$plat_impl:ident) => {
        #[cfg($condition)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

pub mod t113;

select_platform!(not(test), t113::T113);
select_platform!(test, test::TestPlatform);

use crate::{
    gic::GicConfig,
    hal::Hal,
    logger::LogSink,
    nonsecure::SecuritySwitch,
    services::psci::{CpuBringup, PsciConfig},
};

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

pub type HalImpl = <PlatformImpl as Platform>::HalImpl;
pub type CpuBringupImpl = <PlatformImpl as Platform>::CpuBringupImpl;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// Base of the staging region through which secondary cores are started. It must be
    /// identity-mapped, reachable by a core with its MMU and caches off, and at least 256 bytes.
    const STAGING_BASE: usize;

    /// The GIC base addresses.
    const GIC_CONFIG: GicConfig;

    /// Registers to switch to Non-secure access before the hand-off, in order.
    const SECURITY_SWITCHES: &'static [SecuritySwitch];

    /// PSCI timing.
    const PSCI_CONFIG: PsciConfig;

    /// Privileged operations implementation.
    type HalImpl: Hal;

    /// Secondary core power sequencing implementation.
    type CpuBringupImpl: CpuBringup;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink;

    /// Creates the instance of the privileged operations.
    ///
    /// # Safety
    ///
    /// This must only be called once, and only on the boot core before the other core is started.
    unsafe fn create_hal() -> Self::HalImpl;

    /// Creates the secondary core power sequencer.
    fn create_cpu_bringup() -> Self::CpuBringupImpl;

    /// Creates the log sink for the logger.
    fn create_log_sink() -> Self::LogSinkImpl;
}
