// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Cache maintenance over address ranges, and set/way operand generation.

use crate::hal::Hal;
use core::iter::StepBy;
use core::ops::Range;

/// Returns the start address of each cache line of `line` bytes overlapping `[addr, addr + size)`.
pub fn cache_lines(addr: usize, size: usize, line: usize) -> StepBy<Range<usize>> {
    let start = addr & !(line - 1);
    let end = addr.saturating_add(size);
    (start..end).step_by(line)
}

/// Cleans and invalidates the data cache over `[addr, addr + size)` to the point of coherency,
/// then issues a DSB.
///
/// An empty range does nothing, not even the barrier.
pub fn clean_invalidate_range(hal: &impl Hal, addr: usize, size: usize) {
    if size == 0 {
        return;
    }
    for line in cache_lines(addr, size, hal.dcache_line_size()) {
        hal.clean_invalidate_dcache_line(line);
    }
    hal.dsb();
}

/// Invalidates the instruction cache over `[addr, addr + size)`, then issues a DSB and an ISB.
///
/// An empty range does nothing.
pub fn invalidate_icache_range(hal: &impl Hal, addr: usize, size: usize) {
    if size == 0 {
        return;
    }
    for line in cache_lines(addr, size, hal.icache_line_size()) {
        hal.invalidate_icache_line(line);
    }
    hal.dsb();
    hal.isb();
}

/// Returns the Level of Coherency field of CLIDR.
pub fn level_of_coherency(clidr: u32) -> u32 {
    (clidr >> 24) & 0x7
}

/// Returns whether cache `level` (zero-based) described by CLIDR holds data.
pub fn level_has_data_cache(clidr: u32, level: u32) -> bool {
    // Ctype values 2 (data only), 3 (separate) and 4 (unified) all include a data cache.
    (clidr >> (level * 3)) & 0x7 >= 2
}

/// Returns the DCCISW operands covering every set and way of the cache `level` described by
/// `ccsidr`.
pub fn set_way_operands(level: u32, ccsidr: u32) -> impl Iterator<Item = u32> {
    let line_shift = (ccsidr & 0x7) + 4;
    let ways = ((ccsidr >> 3) & 0x3ff) + 1;
    let sets = ((ccsidr >> 13) & 0x7fff) + 1;
    let way_shift = (ways - 1).leading_zeros();

    (0..ways).flat_map(move |way| {
        (0..sets).map(move |set| {
            way.checked_shl(way_shift).unwrap_or(0) | set << line_shift | level << 1
        })
    })
}
