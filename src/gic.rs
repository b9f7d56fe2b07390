// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! GICv2 distributor and CPU interface access for the hand-off to the Non-secure world.

use crate::hal::Hal;
use log::{debug, warn};

const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_IGROUPR: usize = 0x080;
const GICD_ICENABLER: usize = 0x180;
const GICD_ICPENDR: usize = 0x280;
const GICD_ICACTIVER: usize = 0x380;

const GICC_CTLR: usize = 0x00;
const GICC_PMR: usize = 0x04;
const GICC_BPR: usize = 0x08;
const GICC_IAR: usize = 0x0c;
const GICC_EOIR: usize = 0x10;

const CTLR_ENABLE_GRP0: u32 = 1 << 0;
const CTLR_ENABLE_GRP1: u32 = 1 << 1;

const TYPER_IT_LINES_MASK: u32 = 0x1f;
const INTID_MASK: u32 = 0x3ff;
/// Interrupt IDs from here up are special or spurious.
const INTID_SPECIAL: u32 = 1020;

/// Lowest priority mask, letting every priority through.
const PMR_ALLOW_ALL: u32 = 0xff;

/// Base addresses of the GIC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GicConfig {
    /// Distributor base address.
    pub distributor_base: usize,
    /// CPU interface base address.
    pub cpu_interface_base: usize,
}

/// A GICv2 accessed through a [`Hal`].
pub struct Gic<'a, H: Hal> {
    hal: &'a H,
    config: GicConfig,
}

impl<'a, H: Hal> Gic<'a, H> {
    /// Creates a driver for the GIC described by `config`.
    pub const fn new(hal: &'a H, config: GicConfig) -> Self {
        Self { hal, config }
    }

    fn gicd(&self, offset: usize) -> usize {
        self.config.distributor_base + offset
    }

    fn gicc(&self, offset: usize) -> usize {
        self.config.cpu_interface_base + offset
    }

    /// Returns the number of 32-interrupt register words the distributor implements.
    fn register_words(&self) -> usize {
        ((self.hal.read32(self.gicd(GICD_TYPER)) & TYPER_IT_LINES_MASK) + 1) as usize
    }

    /// Acknowledges the highest priority pending interrupt and returns the raw IAR value.
    pub fn acknowledge(&self) -> u32 {
        self.hal.read32(self.gicc(GICC_IAR))
    }

    /// Signals the end of the interrupt acknowledged as `iar`.
    pub fn end_of_interrupt(&self, iar: u32) {
        self.hal.write32(self.gicc(GICC_EOIR), iar);
    }

    /// Disables, clears and deactivates the interrupt acknowledged as `iar`, then signals its end.
    ///
    /// Special interrupt IDs are only logged. Returns the ID of the interrupt suppressed, if any.
    pub fn suppress(&self, iar: u32) -> Option<u32> {
        let id = iar & INTID_MASK;
        if id >= INTID_SPECIAL {
            warn!("Spurious interrupt {id} in monitor mode");
            return None;
        }

        let word = (id / 32) as usize * 4;
        let bit = 1 << (id % 32);
        self.hal.write32(self.gicd(GICD_ICENABLER) + word, bit);
        self.hal.write32(self.gicd(GICD_ICPENDR) + word, bit);
        self.hal.write32(self.gicd(GICD_ICACTIVER) + word, bit);
        self.end_of_interrupt(iar);
        warn!("Suppressed interrupt {id} taken to monitor mode");
        Some(id)
    }

    /// Drains pending interrupts, disables both interfaces and clears every enable, pending and
    /// active bit.
    pub fn quiesce(&self) {
        for _ in 0..INTID_SPECIAL {
            let iar = self.acknowledge();
            if iar & INTID_MASK >= INTID_SPECIAL {
                break;
            }
            self.end_of_interrupt(iar);
        }

        self.hal.write32(self.gicc(GICC_CTLR), 0);
        self.hal.write32(self.gicd(GICD_CTLR), 0);

        for word in 0..self.register_words() {
            let offset = word * 4;
            self.hal.write32(self.gicd(GICD_ICENABLER) + offset, u32::MAX);
            self.hal.write32(self.gicd(GICD_ICPENDR) + offset, u32::MAX);
            self.hal.write32(self.gicd(GICD_ICACTIVER) + offset, u32::MAX);
        }
        debug!("GIC quiesced");
    }

    /// Puts every interrupt in group 1 and enables the interfaces for the Non-secure world, with
    /// all interrupts disabled.
    pub fn init_non_secure(&self) {
        self.hal.write32(self.gicc(GICC_CTLR), 0);
        self.hal.write32(self.gicd(GICD_CTLR), 0);

        for word in 0..self.register_words() {
            let offset = word * 4;
            self.hal.write32(self.gicd(GICD_IGROUPR) + offset, u32::MAX);
            self.hal.write32(self.gicd(GICD_ICENABLER) + offset, u32::MAX);
        }

        self.hal.write32(self.gicc(GICC_PMR), PMR_ALLOW_ALL);
        self.hal.write32(self.gicc(GICC_BPR), 0);

        let enable = CTLR_ENABLE_GRP0 | CTLR_ENABLE_GRP1;
        self.hal.write32(self.gicc(GICC_CTLR), enable);
        self.hal.write32(self.gicd(GICD_CTLR), enable);
        debug!("GIC configured for the Non-secure world");
    }
}
