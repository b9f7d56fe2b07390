// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Secondary core power sequencing through the T113-S3 CPUCFG and R_CPUCFG blocks.
//!
//! Two revisions of the sequence exist. [`RvbarBringup`] programs the per-core reset vector base
//! and run request of the CPUCFG block. [`SoftEntryBringup`] programs the soft entry registers and
//! walks the R_CPUCFG power-on reset and power-off gating registers instead.

use crate::{
    hal::Hal,
    services::psci::{CPU_COUNT, CpuBringup, SequencerError},
};
use log::debug;

const CPUCFG_BASE: usize = 0x0901_0000;
const R_CPUCFG_BASE: usize = 0x0700_0400;

/// R_CCU bus gating and reset register of the R_CPUCFG block.
const R_CPUCFG_BUS_REG: usize = 0x0701_022c;
const R_CPUCFG_BUS_GATE: u32 = 1 << 0;
const R_CPUCFG_BUS_RESET: u32 = 1 << 16;

/// Successively weaker power clamp values, ending fully released.
const CLAMP_RAMP: [u32; 5] = [0xfe, 0xf8, 0xe0, 0x80, 0x00];
const CLAMP_ENGAGED: u32 = 0xff;
const CLAMP_MASK: u32 = 0xff;

/// Brings the R_CPUCFG block out of reset with its clock enabled. Does nothing if it already is.
fn enable_r_cpucfg(hal: &impl Hal) {
    let enabled = R_CPUCFG_BUS_GATE | R_CPUCFG_BUS_RESET;
    if hal.read32(R_CPUCFG_BUS_REG) & enabled == enabled {
        return;
    }
    hal.set_bits(R_CPUCFG_BUS_REG, enabled);
    hal.dsb();
    hal.isb();
}

/// Walks the power clamp at `reg` down to fully released and checks that it stayed there.
fn release_clamp(hal: &impl Hal, cpu: usize, reg: usize) -> Result<(), SequencerError> {
    if hal.read32(reg) & CLAMP_MASK != 0 {
        for step in CLAMP_RAMP {
            hal.write32(reg, step);
        }
        hal.udelay(1);
    }

    let value = hal.read32(reg) & CLAMP_MASK;
    if value != 0 {
        return Err(SequencerError::ClampStuck { cpu, value });
    }
    Ok(())
}

fn engage_clamp(hal: &impl Hal, reg: usize) {
    if hal.read32(reg) & CLAMP_MASK != CLAMP_ENGAGED {
        hal.write32(reg, CLAMP_ENGAGED);
    }
}

/// Checks that `cpu` is a secondary core which may be power sequenced.
fn check_secondary(cpu: usize) -> Result<(), SequencerError> {
    if cpu == 0 || cpu >= CPU_COUNT {
        Err(SequencerError::InvalidCpu(cpu))
    } else {
        Ok(())
    }
}

/// Bring-up through the CPUCFG reset vector base and run request registers.
#[derive(Debug, Default)]
pub struct RvbarBringup;

impl RvbarBringup {
    const CPU_STRIDE: usize = 0x40;
    const CTRL: usize = 0x40;
    const STATUS: usize = 0x44;
    const RST_CTRL: usize = 0x48;
    const RVBAR_LO: usize = 0x4c;
    const RVBAR_HI: usize = 0x50;

    const CTRL_RUN_REQUEST: u32 = 1 << 0;
    const STATUS_RUNNING: u32 = 1 << 0;
    const RST_CTRL_CORE_RESET: u32 = 1 << 0;
    const RST_CTRL_DBG_RESET: u32 = 1 << 1;

    const SUPER_STANDBY_CTRL: usize = R_CPUCFG_BASE + 0x1d0;
    const SUPER_STANDBY_FLAG: usize = R_CPUCFG_BASE + 0x1d4;

    /// Polls of the run status bit before giving up on it.
    const STATUS_POLL_BUDGET: u32 = 100_000;

    const fn cpu_register(cpu: usize, offset: usize) -> usize {
        CPUCFG_BASE + Self::CPU_STRIDE * cpu + offset
    }

    const fn clamp_register(cpu: usize) -> usize {
        R_CPUCFG_BASE + 0x1b0 + (cpu - 1) * 4
    }

    fn disable_super_standby(hal: &impl Hal, cpu: usize) {
        let mask = 1 << (16 + cpu);
        if hal.read32(Self::SUPER_STANDBY_FLAG) & mask != 0 {
            hal.clear_bits(Self::SUPER_STANDBY_CTRL, mask);
        }
    }

    /// Returns a model of how secondary `cpu` reacts to these registers, for [`FakeHal`].
    ///
    /// [`FakeHal`]: crate::hal::fake::FakeHal
    #[cfg(test)]
    pub fn secondary_model(
        cpu: usize,
        behaviour: crate::hal::fake::Behaviour,
    ) -> crate::hal::fake::SecondaryModel {
        crate::hal::fake::SecondaryModel {
            cpu,
            release: (Self::cpu_register(cpu, Self::CTRL), Self::CTRL_RUN_REQUEST),
            boot_vector: Self::cpu_register(cpu, Self::RVBAR_LO),
            status: Some((Self::cpu_register(cpu, Self::STATUS), Self::STATUS_RUNNING)),
            behaviour,
        }
    }
}

impl CpuBringup for RvbarBringup {
    fn init(&self, hal: &impl Hal) {
        enable_r_cpucfg(hal);
    }

    fn cpu_on(&self, hal: &impl Hal, cpu: usize, boot_vector: usize) -> Result<(), SequencerError> {
        check_secondary(cpu)?;

        Self::disable_super_standby(hal, cpu);
        release_clamp(hal, cpu, Self::clamp_register(cpu))?;

        hal.write32(Self::cpu_register(cpu, Self::RVBAR_LO), boot_vector as u32);
        hal.write32(Self::cpu_register(cpu, Self::RVBAR_HI), 0);

        hal.clear_bits(
            Self::cpu_register(cpu, Self::RST_CTRL),
            Self::RST_CTRL_CORE_RESET | Self::RST_CTRL_DBG_RESET,
        );
        hal.set_bits(
            Self::cpu_register(cpu, Self::CTRL),
            Self::CTRL_RUN_REQUEST,
        );
        hal.dsb();
        hal.sev();

        // Advisory only: the staging header is the real completion signal.
        if !(0..Self::STATUS_POLL_BUDGET).any(|_| self.cpu_is_on(hal, cpu)) {
            debug!("CPU{cpu} has not reported running yet");
        }
        Ok(())
    }

    fn cpu_off(&self, hal: &impl Hal, cpu: usize) -> Result<(), SequencerError> {
        check_secondary(cpu)?;

        hal.clear_bits(
            Self::cpu_register(cpu, Self::CTRL),
            Self::CTRL_RUN_REQUEST,
        );
        hal.set_bits(
            Self::cpu_register(cpu, Self::RST_CTRL),
            Self::RST_CTRL_CORE_RESET | Self::RST_CTRL_DBG_RESET,
        );
        hal.dsb();
        engage_clamp(hal, Self::clamp_register(cpu));
        Ok(())
    }

    fn cpu_is_on(&self, hal: &impl Hal, cpu: usize) -> bool {
        cpu < CPU_COUNT
            && hal.read32(Self::cpu_register(cpu, Self::STATUS)) & Self::STATUS_RUNNING != 0
    }
}

/// Bring-up through the soft entry registers and the R_CPUCFG power-on reset and gating registers.
#[derive(Debug, Default)]
pub struct SoftEntryBringup;

impl SoftEntryBringup {
    const CLUSTER_RST_CTRL: usize = CPUCFG_BASE;
    const DBG_REG0: usize = CPUCFG_BASE + 0xc0;
    const PRIV0: usize = CPUCFG_BASE + 0x1a4;

    const POWERON_RST: usize = R_CPUCFG_BASE + 0x40;
    const POWEROFF_GATING: usize = R_CPUCFG_BASE + 0x44;
    const SOFT_ENTRY: usize = R_CPUCFG_BASE + 0x1a4;
    const PRCM_SOFT_ENTRY: usize = 0x0701_0164;

    /// Selects AArch64 at reset for a core when set.
    const GEN_CTRL_REG0: usize = 0x0810_0000;

    const fn clamp_register(cpu: usize) -> usize {
        R_CPUCFG_BASE + 0x50 + cpu * 4
    }

    const fn aarch64_bit(cpu: usize) -> u32 {
        1 << (4 + cpu)
    }

    /// Returns a model of how secondary `cpu` reacts to these registers, for [`FakeHal`].
    ///
    /// [`FakeHal`]: crate::hal::fake::FakeHal
    #[cfg(test)]
    pub fn secondary_model(
        cpu: usize,
        behaviour: crate::hal::fake::Behaviour,
    ) -> crate::hal::fake::SecondaryModel {
        crate::hal::fake::SecondaryModel {
            cpu,
            release: (Self::POWERON_RST, 1 << cpu),
            boot_vector: Self::PRIV0,
            status: None,
            behaviour,
        }
    }
}

impl CpuBringup for SoftEntryBringup {
    fn init(&self, hal: &impl Hal) {
        enable_r_cpucfg(hal);
    }

    fn cpu_on(&self, hal: &impl Hal, cpu: usize, boot_vector: usize) -> Result<(), SequencerError> {
        check_secondary(cpu)?;
        let bit = 1 << cpu;

        hal.write32(Self::PRIV0, boot_vector as u32);
        hal.write32(Self::SOFT_ENTRY, (boot_vector >> 2) as u32);
        hal.write32(Self::PRCM_SOFT_ENTRY, (boot_vector >> 2) as u32);
        hal.clear_bits(Self::GEN_CTRL_REG0, Self::aarch64_bit(cpu));

        hal.clear_bits(Self::CLUSTER_RST_CTRL, bit);
        hal.clear_bits(Self::POWERON_RST, bit);
        hal.dsb();
        hal.isb();
        release_clamp(hal, cpu, Self::clamp_register(cpu))?;
        hal.clear_bits(Self::POWEROFF_GATING, bit);
        hal.set_bits(Self::POWERON_RST, bit);
        hal.set_bits(Self::CLUSTER_RST_CTRL, bit);
        hal.set_bits(Self::DBG_REG0, bit);

        debug!(
            "CPU{cpu} rst={:#010x} por={:#010x} dbg={:#010x} gate={:#010x}",
            hal.read32(Self::CLUSTER_RST_CTRL),
            hal.read32(Self::POWERON_RST),
            hal.read32(Self::DBG_REG0),
            hal.read32(Self::POWEROFF_GATING),
        );

        hal.dsb();
        hal.isb();
        hal.sev();
        Ok(())
    }

    fn cpu_off(&self, hal: &impl Hal, cpu: usize) -> Result<(), SequencerError> {
        check_secondary(cpu)?;
        let bit = 1 << cpu;

        hal.clear_bits(Self::DBG_REG0, bit);
        hal.set_bits(Self::POWEROFF_GATING, bit);
        hal.clear_bits(Self::POWERON_RST, bit);
        hal.dsb();
        hal.isb();
        engage_clamp(hal, Self::clamp_register(cpu));
        Ok(())
    }

    fn cpu_is_on(&self, hal: &impl Hal, cpu: usize) -> bool {
        let bit = 1 << cpu;
        cpu < CPU_COUNT
            && hal.read32(Self::POWERON_RST) & bit != 0
            && hal.read32(Self::POWEROFF_GATING) & bit == 0
    }
}
