// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-core Monitor mode stacks.

use crate::services::psci::{CPU_COUNT, MonitorLayout};
use core::array;

/// The number of bytes of stack space to reserve for each core.
const STACK_SIZE: usize = 0x1000;

/// Stacks are aligned to a cache line.
const STACK_ALIGN: usize = 64;

const _: () = assert!(STACK_SIZE.is_multiple_of(STACK_ALIGN));

#[cfg(all(target_arch = "arm", not(test)))]
mod asm {
    use super::*;
    use core::arch::global_asm;

    global_asm!(
        ".section .bss.monitor_stacks, \"aw\", %nobits",
        ".balign {STACK_ALIGN}",
        ".global monitor_stacks",
        "monitor_stacks:",
        ".space {TOTAL_SIZE}, 0",
        STACK_ALIGN = const STACK_ALIGN,
        TOTAL_SIZE = const STACK_SIZE * CPU_COUNT,
    );
}

#[cfg(not(all(target_arch = "arm", not(test))))]
#[repr(C, align(64))]
struct HostStacks([u8; STACK_SIZE * CPU_COUNT]);

#[cfg(not(all(target_arch = "arm", not(test))))]
static HOST_STACKS: HostStacks = HostStacks([0; STACK_SIZE * CPU_COUNT]);

fn stacks_base() -> usize {
    #[cfg(all(target_arch = "arm", not(test)))]
    let base = {
        unsafe extern "C" {
            safe static monitor_stacks: u8;
        }
        &raw const monitor_stacks as usize
    };
    #[cfg(not(all(target_arch = "arm", not(test))))]
    let base = &raw const HOST_STACKS as usize;
    base
}

/// Returns the initial Monitor mode stack pointer for `cpu`.
pub fn monitor_stack_top(cpu: usize) -> usize {
    stacks_base() + (cpu + 1) * STACK_SIZE
}

/// Returns the monitor layout for the vector table at `vector_base` and the reserved stacks.
pub fn monitor_layout(vector_base: usize) -> MonitorLayout {
    MonitorLayout {
        vector_base,
        stack_tops: array::from_fn(monitor_stack_top),
    }
}
