// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The Allwinner T113-S3: two Cortex-A7 cores in one cluster and a GIC-400.

pub mod cpucfg;

use super::Platform;
use crate::{
    armv7::Armv7,
    board::BoardConsole,
    gic::GicConfig,
    logger::LockedWriter,
    nonsecure::SecuritySwitch,
    services::psci::PsciConfig,
};
#[cfg(feature = "soft-entry-bringup")]
use cpucfg::SoftEntryBringup;
#[cfg(not(feature = "soft-entry-bringup"))]
use cpucfg::RvbarBringup;

/// SRAM B, which the boot ROM leaves identity-mapped and uncached.
const STAGING_BASE: usize = 0x0003_0000;

const GICD_BASE: usize = 0x0302_1000;
const GICC_BASE: usize = 0x0302_2000;

const SPC_BASE: usize = 0x0300_8000;
const SPC_PORTS: usize = 16;
const SPC_PORT_STRIDE: usize = 0x10;
const SPC_STA: usize = 0x0;
const SPC_SET: usize = 0x4;

const CCU_SEC_SWITCH: usize = 0x0200_1f00;
const R_PRCM_SEC_SWITCH: usize = 0x0701_0290;
const DMA_SEC: usize = 0x0300_2020;

/// Every SPC decode port, then the CCU, R_PRCM and DMA security switches.
const SECURITY_SWITCHES: [SecuritySwitch; SPC_PORTS + 3] = {
    let mut switches = [SecuritySwitch::new("CCU", CCU_SEC_SWITCH, 0x7); SPC_PORTS + 3];
    let mut port = 0;
    while port < SPC_PORTS {
        let base = SPC_BASE + port * SPC_PORT_STRIDE;
        switches[port] =
            SecuritySwitch::new("SPC", base + SPC_SET, u32::MAX).with_readback(base + SPC_STA);
        port += 1;
    }
    switches[SPC_PORTS + 1] = SecuritySwitch::new("R_PRCM", R_PRCM_SEC_SWITCH, 0x1);
    switches[SPC_PORTS + 2] = SecuritySwitch::new("DMA", DMA_SEC, 0xffff);
    switches
};

/// The T113-S3 platform.
pub struct T113;

impl Platform for T113 {
    const STAGING_BASE: usize = STAGING_BASE;

    const GIC_CONFIG: GicConfig = GicConfig {
        distributor_base: GICD_BASE,
        cpu_interface_base: GICC_BASE,
    };

    const SECURITY_SWITCHES: &'static [SecuritySwitch] = &SECURITY_SWITCHES;

    const PSCI_CONFIG: PsciConfig = PsciConfig {
        cpu_on_timeout_ms: 100,
        poll_interval_us: 10,
    };

    type HalImpl = Armv7;

    #[cfg(not(feature = "soft-entry-bringup"))]
    type CpuBringupImpl = RvbarBringup;
    #[cfg(feature = "soft-entry-bringup")]
    type CpuBringupImpl = SoftEntryBringup;

    type LogSinkImpl = LockedWriter<BoardConsole>;

    unsafe fn create_hal() -> Armv7 {
        // SAFETY: Our caller guarantees that this is only called once.
        unsafe { Armv7::new() }
    }

    fn create_cpu_bringup() -> Self::CpuBringupImpl {
        Self::CpuBringupImpl::default()
    }

    fn create_log_sink() -> Self::LogSinkImpl {
        LockedWriter::new(BoardConsole)
    }
}
