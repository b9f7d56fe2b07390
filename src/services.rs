// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

pub mod psci;

use crate::{
    exceptions,
    platform::{CpuBringupImpl, HalImpl, Platform, PlatformImpl},
    smccc::{FunctionId, NOT_SUPPORTED},
    stacks,
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::debug;
use spin::Once;

/// Implements [`Service::owns`] for fast calls to `$owning_entity` whose function number, bits
/// 0-15 of the ID, is in `$range`.
macro_rules! owns {
    ($owning_entity:expr, $range:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && $range.contains(&function.number())
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
}
pub(crate) use owns;

/// A service which handles some range of SMC calls.
pub trait Service {
    /// Returns whether this service is intended to handle the given function ID.
    fn owns(&self, function: FunctionId) -> bool;

    /// Handles the given SMC call. `regs` holds the function ID in `regs[0]` and the arguments in
    /// `regs[1..]`. Returns the value for `r0`.
    fn handle_smc(&self, regs: &[u32; 4]) -> i32;
}

static SERVICES: Once<Services> = Once::new();

/// The SMC services of the monitor.
pub struct Services {
    /// The PSCI service.
    pub psci: psci::Psci<HalImpl, CpuBringupImpl>,
    smc_count: AtomicU32,
}

impl Services {
    /// Returns the services, creating them on first use.
    pub fn get() -> &'static Self {
        SERVICES.call_once(Self::new)
    }

    fn new() -> Self {
        // SAFETY: `Services` is only constructed once, through `SERVICES`, so this is the only
        // HAL instance.
        let hal = unsafe { PlatformImpl::create_hal() };
        Self {
            psci: psci::Psci::new(
                hal,
                PlatformImpl::create_cpu_bringup(),
                PlatformImpl::STAGING_BASE,
                PlatformImpl::PSCI_CONFIG,
                stacks::monitor_layout(exceptions::vector_table_address()),
            ),
            smc_count: AtomicU32::new(0),
        }
    }

    /// Returns the number of SMCs handled so far.
    pub fn smc_count(&self) -> u32 {
        self.smc_count.load(Ordering::Relaxed)
    }

    /// Dispatches an SMC to the service which owns its function ID.
    pub fn handle_smc(&self, regs: &[u32; 4]) -> i32 {
        let function = FunctionId(regs[0]);
        // No read-modify-write: exclusive accesses are unreliable once the MMU is off. Calls racing
        // on the two cores may share a number.
        let count = self.smc_count.load(Ordering::Relaxed).wrapping_add(1);
        self.smc_count.store(count, Ordering::Relaxed);
        debug!(
            "SMC #{count} {function:?} ({:#010x}, {:#010x}, {:#010x})",
            regs[1], regs[2], regs[3]
        );

        if !function.valid() {
            return NOT_SUPPORTED;
        }

        let service: &dyn Service = if self.psci.owns(function) {
            &self.psci
        } else {
            debug!("SMC #{count} has no owner");
            return NOT_SUPPORTED;
        };

        let result = service.handle_smc(regs);
        debug!("SMC #{count} returns {result}");
        result
    }
}
