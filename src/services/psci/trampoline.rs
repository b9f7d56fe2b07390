// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The secondary core entry trampoline.
//!
//! A released secondary core starts executing at a small position independent stub in the
//! staging area. The stub reports its progress through a header in front of it, moves itself into
//! Monitor mode to install the monitor vectors and stack, and then performs an exception return to
//! the requested entry point in Non-secure SVC mode with the context ID in `r0`.
//!
//! ```text
//! base + 0x00  header: stage, mpidr, scratch, reserved
//! base + 0x10  stub instructions followed by its literal pool
//! ```

use crate::{cache, hal::Hal};
use core::mem::offset_of;
use thiserror::Error;
use zerocopy::{FromBytes, IntoBytes};

/// Written by the stub once the core fetched its first instructions.
pub const STAGE_AWAKE: u32 = 1;
/// Written by the stub right before the exception return to the entry point.
pub const STAGE_JUMPING: u32 = 2;

/// The progress report shared between the primary core and a starting secondary.
#[derive(Clone, Copy, Debug, Default, Eq, FromBytes, IntoBytes, PartialEq)]
#[repr(C)]
pub struct Header {
    /// Last stage reached by the secondary.
    pub stage: u32,
    /// MPIDR as seen by the secondary.
    pub mpidr: u32,
    /// Context ID as delivered by the secondary.
    pub scratch: u32,
    reserved: u32,
}

/// Size of the header in front of the stub.
pub const HEADER_SIZE: usize = size_of::<Header>();
/// Offset of the stub from the staging base.
pub const STUB_OFFSET: usize = HEADER_SIZE;
/// Offset of the stage word from the staging base.
pub const STAGE_OFFSET: usize = offset_of!(Header, stage);
/// Offset of the reported MPIDR from the staging base.
pub const MPIDR_OFFSET: usize = offset_of!(Header, mpidr);
/// Offset of the reported context ID from the staging base.
pub const SCRATCH_OFFSET: usize = offset_of!(Header, scratch);

/// A literal pool slot of the stub.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Literal {
    /// Address of the header, where the stub reports the MPIDR.
    Diag,
    /// Address of the stage word.
    Stage,
    /// Address where the stub stores the context ID.
    Scratch,
    /// Context ID passed in `r0`.
    Context,
    /// Entry point, with bit 0 selecting Thumb.
    Entry,
    /// Monitor vector base address.
    Mvbar,
    /// Top of the core's Monitor mode stack.
    MonitorStack,
}

impl Literal {
    const ALL: [Self; 7] = [
        Self::Diag,
        Self::Stage,
        Self::Scratch,
        Self::Context,
        Self::Entry,
        Self::Mvbar,
        Self::MonitorStack,
    ];

    /// Placeholder word in the template literal pool.
    const fn marker(self) -> u32 {
        0x5eed_0000 | self as u32
    }

    /// Returns the byte offset of the slot from the start of the stub.
    pub const fn offset(self) -> usize {
        LITERAL_OFFSETS[self as usize]
    }
}

/// Words in the stub, instructions and literal pool together.
const STUB_WORDS: usize = 44;

/// The stub, with placeholders in its literal pool.
const STUB_TEMPLATE: [u32; STUB_WORDS] = [
    0xe59f_4090, // ldr   r4, STAGE
    0xee10_1fb0, // mrc   p15, 0, r1, c0, c0, 5
    0xe59f_5084, // ldr   r5, DIAG
    0xe585_1004, // str   r1, [r5, #4]
    0xe3a0_2001, // mov   r2, #STAGE_AWAKE
    0xe584_2000, // str   r2, [r4]
    0xf102_0016, // cps   #0x16
    0xe59f_d088, // ldr   sp, MON_STACK
    0xe59f_2080, // ldr   r2, MVBAR
    0xee0c_2f30, // mcr   p15, 0, r2, c12, c0, 1
    0xee11_2f30, // mrc   p15, 0, r2, c1, c0, 1
    0xe382_2040, // orr   r2, r2, #ACTLR_SMP
    0xee01_2f30, // mcr   p15, 0, r2, c1, c0, 1
    0xee11_2f51, // mrc   p15, 0, r2, c1, c1, 2
    0xe382_2b03, // orr   r2, r2, #(CP10 | CP11)
    0xe382_2701, // orr   r2, r2, #NS_SMP
    0xee01_2f51, // mcr   p15, 0, r2, c1, c1, 2
    0xee11_2f11, // mrc   p15, 0, r2, c1, c1, 0
    0xe3c2_200e, // bic   r2, r2, #(IRQ | FIQ | EA)
    0xe382_2031, // orr   r2, r2, #(NS | FW | AW)
    0xee01_2f11, // mcr   p15, 0, r2, c1, c1, 0
    0xf57f_f06f, // isb
    0xe59f_0040, // ldr   r0, CONTEXT
    0xe59f_3038, // ldr   r3, SCRATCH
    0xe583_0000, // str   r0, [r3]
    0xe59f_c038, // ldr   r12, ENTRY
    0xe20c_3001, // and   r3, r12, #1
    0xe3cc_c001, // bic   r12, r12, #1
    0xe3a0_2d07, // mov   r2, #0x1c0
    0xe382_2013, // orr   r2, r2, #0x13
    0xe182_2283, // orr   r2, r2, r3, lsl #5
    0xe16f_f002, // msr   spsr_cxsf, r2
    0xe3a0_2002, // mov   r2, #STAGE_JUMPING
    0xe584_2000, // str   r2, [r4]
    0xf57f_f04f, // dsb   sy
    0xe320_f004, // sev
    0xe1b0_f00c, // movs  pc, r12
    Literal::Diag.marker(),
    Literal::Stage.marker(),
    Literal::Scratch.marker(),
    Literal::Context.marker(),
    Literal::Entry.marker(),
    Literal::Mvbar.marker(),
    Literal::MonitorStack.marker(),
];

/// Size of the stub in bytes, including its literal pool.
pub const STUB_SIZE: usize = STUB_TEMPLATE.len() * 4;
/// Bytes of the staging area written for each bring-up.
pub const STAGED_SIZE: usize = STUB_OFFSET + STUB_SIZE;

const fn find_marker(marker: u32) -> usize {
    let mut i = 0;
    while i < STUB_TEMPLATE.len() {
        if STUB_TEMPLATE[i] == marker {
            return i * 4;
        }
        i += 1;
    }
    panic!("stub template lacks a literal slot");
}

const LITERAL_OFFSETS: [usize; Literal::ALL.len()] = {
    let mut offsets = [0; Literal::ALL.len()];
    let mut i = 0;
    while i < Literal::ALL.len() {
        offsets[i] = find_marker(Literal::ALL[i].marker());
        i += 1;
    }
    offsets
};

/// Where and in which instruction set a core starts executing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryPoint {
    /// ARM state at the given address.
    Arm(u32),
    /// Thumb state at the given address, without the interworking bit.
    Thumb(u32),
}

impl EntryPoint {
    /// Decodes an interworking address, where bit 0 selects Thumb.
    pub const fn from_raw(raw: u32) -> Self {
        if raw & 1 != 0 {
            Self::Thumb(raw & !1)
        } else {
            Self::Arm(raw)
        }
    }

    /// Returns whether the address is aligned for its instruction set.
    pub const fn is_aligned(self) -> bool {
        match self {
            Self::Arm(address) => address % 4 == 0,
            Self::Thumb(address) => address % 2 == 0,
        }
    }

    /// Returns the interworking address loaded by the stub.
    pub const fn literal(self) -> u32 {
        match self {
            Self::Arm(address) => address,
            Self::Thumb(address) => address | 1,
        }
    }
}

/// The Monitor mode environment given to a secondary core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonitorEnvironment {
    /// Monitor vector base address.
    pub vector_base: usize,
    /// Top of the core's Monitor mode stack.
    pub stack_top: usize,
}

/// Failure to observe a secondary core reaching an expected stage.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum StagingError {
    /// The timeout expired.
    #[error("secondary core stopped at stage {last_stage:#x}")]
    Timeout {
        /// The last stage value read back.
        last_stage: u32,
    },
}

/// Builds the stub for `entry` and `context` with header at `base`.
fn build_stub(
    base: usize,
    entry: EntryPoint,
    context: u32,
    monitor: MonitorEnvironment,
) -> [u32; STUB_WORDS] {
    let mut stub = STUB_TEMPLATE;
    patch_literal(&mut stub, Literal::Diag, base as u32);
    patch_literal(&mut stub, Literal::Stage, (base + STAGE_OFFSET) as u32);
    patch_literal(&mut stub, Literal::Scratch, (base + SCRATCH_OFFSET) as u32);
    patch_literal(&mut stub, Literal::Context, context);
    patch_literal(&mut stub, Literal::Entry, entry.literal());
    patch_literal(&mut stub, Literal::Mvbar, monitor.vector_base as u32);
    patch_literal(&mut stub, Literal::MonitorStack, monitor.stack_top as u32);
    stub
}

fn patch_literal(stub: &mut [u32; STUB_WORDS], literal: Literal, value: u32) {
    let offset = literal.offset();
    stub.as_mut_bytes()[offset..offset + 4].copy_from_slice(value.as_bytes());
}

/// Polls the word at `addr` until it reaches at least `target`, for up to `timeout_ms`.
///
/// The cache line is cleaned and invalidated before every read, as the writer runs with its caches
/// off.
pub fn poll_stage(
    hal: &impl Hal,
    addr: usize,
    target: u32,
    timeout_ms: u32,
    poll_us: u32,
) -> Result<(), StagingError> {
    let start = hal.time_ms();
    loop {
        cache::clean_invalidate_range(hal, addr, 4);
        let stage = hal.read32(addr);
        if stage >= target {
            return Ok(());
        }
        if hal.time_ms().wrapping_sub(start) >= timeout_ms {
            return Err(StagingError::Timeout { last_stage: stage });
        }
        hal.udelay(poll_us);
    }
}

/// The staging area through which secondary cores are started.
#[derive(Debug)]
pub struct Trampoline {
    base: usize,
}

impl Trampoline {
    /// Creates a trampoline using the staging area at `base`.
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Returns the staging base address.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Returns the address at which a released core must start.
    pub const fn stub_address(&self) -> usize {
        self.base + STUB_OFFSET
    }

    /// Returns the address of the stage word.
    pub const fn stage_address(&self) -> usize {
        self.base + STAGE_OFFSET
    }

    /// Writes a fresh header and a stub for `entry` to the staging area, and makes them visible to
    /// a core with its caches off. Returns the stub address.
    pub fn stage(
        &self,
        hal: &impl Hal,
        entry: EntryPoint,
        context: u32,
        monitor: MonitorEnvironment,
    ) -> usize {
        for offset in (0..STAGED_SIZE).step_by(4) {
            hal.write32(self.base + offset, 0);
        }
        let stub = build_stub(self.base, entry, context, monitor);
        for (i, word) in stub.iter().enumerate() {
            hal.write32(self.stub_address() + i * 4, *word);
        }
        cache::clean_invalidate_range(hal, self.base, STAGED_SIZE);
        cache::invalidate_icache_range(hal, self.stub_address(), STUB_SIZE);
        self.stub_address()
    }

    /// Reads back the header written by the secondary.
    pub fn read_header(&self, hal: &impl Hal) -> Header {
        cache::clean_invalidate_range(hal, self.base, HEADER_SIZE);
        let mut words = [0u32; HEADER_SIZE / 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = hal.read32(self.base + i * 4);
        }
        zerocopy::transmute!(words)
    }

    /// Waits until the secondary reports it is about to jump to its entry point.
    pub fn wait_for_jump(
        &self,
        hal: &impl Hal,
        timeout_ms: u32,
        poll_us: u32,
    ) -> Result<(), StagingError> {
        poll_stage(hal, self.stage_address(), STAGE_JUMPING, timeout_ms, poll_us)
    }
}
