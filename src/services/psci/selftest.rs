// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Boot-time check that the secondary core can be started and stopped.
//!
//! A tiny ARM payload is staged after the trampoline. It stores [`STAGE_ALIVE`] to a word next to
//! itself and parks in `wfe`. Once the boot core sees the word, the secondary is powered back down.

use super::{
    CpuBringup, CpuState, Psci,
    trampoline::{STAGED_SIZE, StagingError, poll_stage},
};
use crate::{cache, hal::Hal};
use arm_psci::ErrorCode;
use log::{info, warn};
use thiserror::Error;

/// Offset of the payload from the staging base, after the trampoline.
pub const PAYLOAD_OFFSET: usize = 0xc0;

/// Offset of the stage address literal within the payload.
pub const PAYLOAD_STAGE_OFFSET: usize = 0x1c;

/// Value the payload stores once it runs.
pub const STAGE_ALIVE: u32 = 0x53;

/// The payload. The last word is patched with the address of the stage word.
pub const PAYLOAD: [u32; 8] = [
    0xe59f_1014, // ldr r1, [pc, #0x14]
    0xe3a0_2053, // mov r2, #0x53
    0xe581_2000, // str r2, [r1]
    0xf57f_f04f, // dsb sy
    0xe320_f004, // sev
    0xe320_f002, // 1: wfe
    0xeaff_fffd, // b 1b
    0x0000_0000, // stage address
];

const PAYLOAD_SIZE: usize = PAYLOAD.len() * 4;

const _: () = assert!(PAYLOAD_OFFSET >= STAGED_SIZE);

/// Self-test failure.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SelfTestError {
    /// `CPU_ON` for the payload was refused.
    #[error("CPU_ON failed with {0:?}")]
    CpuOn(ErrorCode),
    /// The secondary jumped to the payload but the payload never reported in.
    #[error("payload did not run: {0}")]
    NotAlive(StagingError),
}

impl<H: Hal, B: CpuBringup> Psci<H, B> {
    /// Starts CPU1 on the self-test payload, waits for it to report in, then powers it down again.
    ///
    /// CPU1 is OFF afterwards unless it was already running.
    pub fn run_selftest(&self) -> Result<(), SelfTestError> {
        let payload = self.trampoline.base() + PAYLOAD_OFFSET;
        let stage = payload + PAYLOAD_SIZE;

        let mut words = PAYLOAD;
        words[PAYLOAD_STAGE_OFFSET / 4] = stage as u32;
        for (i, word) in words.iter().enumerate() {
            self.hal.write32(payload + i * 4, *word);
        }
        self.hal.write32(stage, 0);
        cache::clean_invalidate_range(&self.hal, payload, PAYLOAD_SIZE + 4);
        cache::invalidate_icache_range(&self.hal, payload, PAYLOAD_SIZE);

        info!("Self-test: starting CPU1 at {payload:#010x}");
        self.cpu_on(1, payload as u32, 0).map_err(SelfTestError::CpuOn)?;

        let result = poll_stage(
            &self.hal,
            stage,
            STAGE_ALIVE,
            self.config.cpu_on_timeout_ms,
            self.config.poll_interval_us,
        )
        .map_err(SelfTestError::NotAlive);

        if let Err(e) = self.bringup.cpu_off(&self.hal, 1) {
            warn!("Self-test: failed to power CPU1 down: {e}");
        }
        self.cpus[1].clear();
        debug_assert_eq!(self.cpus[1].state(), CpuState::Off);

        match &result {
            Ok(()) => info!("Self-test: CPU1 ran the payload"),
            Err(e) => warn!("Self-test: {e}"),
        }
        result
    }
}
