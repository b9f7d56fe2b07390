// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A recording [`Hal`] for unit tests, with a simple model of secondary core release.

use super::Hal;
use crate::{
    services::psci::{
        selftest,
        trampoline::{Literal, MPIDR_OFFSET, STAGE_AWAKE, STAGE_JUMPING},
    },
    sysregs::{Actlr, FaultRegisters, Mpidr, Nsacr, Sctlr},
};
use std::{
    collections::{HashMap, VecDeque},
    panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// `Hal::halt` panics with this message so tests can unwind out of it.
pub const HALT_MAGIC: &str = "HALT_MAGIC";
/// `Hal::enter_non_secure` panics with this message so tests can unwind out of it.
pub const NON_SECURE_MAGIC: &str = "NON_SECURE_MAGIC";

/// Something the code under test did through the [`Hal`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HalEvent {
    Write { addr: usize, value: u32 },
    Dsb,
    Isb,
    Sev,
    Wfi,
    CleanInvalidateDcacheLine(usize),
    InvalidateIcacheLine(usize),
    CleanInvalidateDcacheAll,
    InvalidateIcacheAll,
    WriteSctlr(Sctlr),
    WriteActlr(Actlr),
    WriteNsacr(Nsacr),
}

/// How a modelled secondary core reacts to being released.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Behaviour {
    /// Runs the staged stub as soon as it is released.
    Immediate,
    /// Waits for [`FakeHal::open_gate`] before running the stub.
    Gated,
    /// Never starts.
    Never,
}

/// Describes the registers through which a secondary core is released.
#[derive(Clone, Copy, Debug)]
pub struct SecondaryModel {
    pub cpu: usize,
    /// The core starts when these bits of this register go from clear to set.
    pub release: (usize, u32),
    /// Register holding the address the core starts at.
    pub boot_vector: usize,
    /// Bits set once the core runs.
    pub status: Option<(usize, u32)>,
    pub behaviour: Behaviour,
}

/// What a simulated secondary core was given by the stub it ran.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BootRecord {
    pub cpu: usize,
    pub entry: u32,
    pub context: u32,
    pub mvbar: u32,
    pub stack: u32,
}

#[derive(Default)]
struct State {
    memory: HashMap<usize, u32>,
    stuck: HashMap<usize, u32>,
    queued_reads: HashMap<usize, VecDeque<u32>>,
    events: Vec<HalEvent>,
    mpidr: u32,
    sctlr: u32,
    actlr: u32,
    nsacr: u32,
    mvbar: usize,
    monitor_stack: Option<usize>,
    watchdog: Option<u32>,
    interrupts_masked: bool,
    fault_registers: FaultRegisters,
    clock_base: u32,
    secondaries: Vec<SecondaryModel>,
    gate_open: bool,
    pending: Vec<usize>,
    boots: Vec<BootRecord>,
    non_secure_entry: Option<(u32, [u32; 3])>,
}

impl State {
    fn peek(&self, addr: usize) -> u32 {
        self.stuck
            .get(&addr)
            .or_else(|| self.memory.get(&addr))
            .copied()
            .unwrap_or(0)
    }

    fn poke(&mut self, addr: usize, value: u32) {
        if !self.stuck.contains_key(&addr) {
            self.memory.insert(addr, value);
        }
    }

    fn check_release(&mut self, addr: usize, old: u32, new: u32) {
        for index in 0..self.secondaries.len() {
            let model = self.secondaries[index];
            let (register, mask) = model.release;
            if register != addr || old & mask != 0 || new & mask == 0 {
                continue;
            }
            match model.behaviour {
                Behaviour::Immediate => self.run_secondary(index),
                Behaviour::Gated if self.gate_open => self.run_secondary(index),
                Behaviour::Gated => self.pending.push(index),
                Behaviour::Never => {}
            }
        }
    }

    /// Does what the staged stub does on a real core.
    fn run_secondary(&mut self, index: usize) {
        let model = self.secondaries[index];
        let vector = self.peek(model.boot_vector) as usize;
        let literal = |state: &Self, literal: Literal| state.peek(vector + literal.offset());

        let diag = literal(self, Literal::Diag) as usize;
        let stage = literal(self, Literal::Stage) as usize;
        let scratch = literal(self, Literal::Scratch) as usize;
        let context = literal(self, Literal::Context);
        let entry = literal(self, Literal::Entry);
        let mvbar = literal(self, Literal::Mvbar);
        let stack = literal(self, Literal::MonitorStack);

        self.poke(
            diag + MPIDR_OFFSET,
            Mpidr::from_affinity(0, 0, model.cpu as u8).bits(),
        );
        self.poke(stage, STAGE_AWAKE);
        self.poke(scratch, context);
        self.poke(stage, STAGE_JUMPING);
        if let Some((register, mask)) = model.status {
            let value = self.peek(register) | mask;
            self.poke(register, value);
        }
        self.boots.push(BootRecord {
            cpu: model.cpu,
            entry,
            context,
            mvbar,
            stack,
        });

        let code = (entry & !1) as usize;
        if self.peek(code) == selftest::PAYLOAD[0] {
            let target = self.peek(code + selftest::PAYLOAD_STAGE_OFFSET) as usize;
            self.poke(target, selftest::STAGE_ALIVE);
        }
    }
}

/// A [`Hal`] backed by a register map and an event log.
pub struct FakeHal {
    state: Mutex<State>,
    epoch: Instant,
}

impl FakeHal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                mpidr: Mpidr::from_affinity(0, 0, 0).bits(),
                sctlr: (Sctlr::M | Sctlr::C | Sctlr::I).bits(),
                ..Default::default()
            }),
            epoch: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value stored at `addr`, without recording a read.
    pub fn peek(&self, addr: usize) -> u32 {
        self.lock().peek(addr)
    }

    /// Stores `value` at `addr`, without recording a write.
    pub fn poke(&self, addr: usize, value: u32) {
        self.lock().poke(addr, value);
    }

    /// Makes `addr` read as `value` and ignore all writes.
    pub fn stick(&self, addr: usize, value: u32) {
        self.lock().stuck.insert(addr, value);
    }

    /// Makes the next reads of `addr` return `values` in order.
    pub fn queue_reads(&self, addr: usize, values: &[u32]) {
        self.lock()
            .queued_reads
            .entry(addr)
            .or_default()
            .extend(values);
    }

    pub fn events(&self) -> Vec<HalEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Returns the register writes in order.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                HalEvent::Write { addr, value } => Some((*addr, *value)),
                _ => None,
            })
            .collect()
    }

    /// Returns the values written to `addr` in order.
    pub fn writes_to(&self, addr: usize) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|(written, _)| *written == addr)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn set_mpidr(&self, mpidr: Mpidr) {
        self.lock().mpidr = mpidr.bits();
    }

    pub fn sctlr(&self) -> Sctlr {
        Sctlr::from_bits_retain(self.lock().sctlr)
    }

    pub fn actlr(&self) -> Actlr {
        Actlr::from_bits_retain(self.lock().actlr)
    }

    pub fn nsacr(&self) -> Nsacr {
        Nsacr::from_bits_retain(self.lock().nsacr)
    }

    pub fn mvbar(&self) -> usize {
        self.lock().mvbar
    }

    pub fn monitor_stack(&self) -> Option<usize> {
        self.lock().monitor_stack
    }

    pub fn watchdog(&self) -> Option<u32> {
        self.lock().watchdog
    }

    pub fn interrupts_masked(&self) -> bool {
        self.lock().interrupts_masked
    }

    pub fn set_fault_registers(&self, fault_registers: FaultRegisters) {
        self.lock().fault_registers = fault_registers;
    }

    /// Shifts the millisecond clock so that it starts at `base`.
    pub fn set_clock_base(&self, base: u32) {
        self.lock().clock_base = base;
    }

    pub fn add_secondary(&self, model: SecondaryModel) {
        self.lock().secondaries.push(model);
    }

    /// Lets gated secondaries run, including those released already.
    pub fn open_gate(&self) {
        let mut state = self.lock();
        state.gate_open = true;
        for index in core::mem::take(&mut state.pending) {
            state.run_secondary(index);
        }
    }

    pub fn boots(&self) -> Vec<BootRecord> {
        self.lock().boots.clone()
    }

    pub fn non_secure_entry(&self) -> Option<(u32, [u32; 3])> {
        self.lock().non_secure_entry
    }
}

impl Hal for FakeHal {
    fn read32(&self, addr: usize) -> u32 {
        let mut state = self.lock();
        if let Some(value) = state
            .queued_reads
            .get_mut(&addr)
            .and_then(VecDeque::pop_front)
        {
            return value;
        }
        state.peek(addr)
    }

    fn write32(&self, addr: usize, value: u32) {
        let mut state = self.lock();
        state.events.push(HalEvent::Write { addr, value });
        if state.stuck.contains_key(&addr) {
            return;
        }
        let old = state.memory.insert(addr, value).unwrap_or(0);
        state.check_release(addr, old, value);
    }

    fn udelay(&self, us: u32) {
        std::thread::sleep(Duration::from_micros(us.into()));
    }

    fn time_ms(&self) -> u32 {
        let elapsed = self.epoch.elapsed().as_millis() as u32;
        self.lock().clock_base.wrapping_add(elapsed)
    }

    fn watchdog_set(&self, seconds: u32) {
        self.lock().watchdog = Some(seconds);
    }

    fn dsb(&self) {
        self.lock().events.push(HalEvent::Dsb);
    }

    fn isb(&self) {
        self.lock().events.push(HalEvent::Isb);
    }

    fn sev(&self) {
        self.lock().events.push(HalEvent::Sev);
    }

    fn wfi(&self) {
        self.lock().events.push(HalEvent::Wfi);
    }

    fn dcache_line_size(&self) -> usize {
        64
    }

    fn icache_line_size(&self) -> usize {
        32
    }

    fn clean_invalidate_dcache_line(&self, addr: usize) {
        self.lock()
            .events
            .push(HalEvent::CleanInvalidateDcacheLine(addr));
    }

    fn invalidate_icache_line(&self, addr: usize) {
        self.lock().events.push(HalEvent::InvalidateIcacheLine(addr));
    }

    fn clean_invalidate_dcache_all(&self) {
        self.lock().events.push(HalEvent::CleanInvalidateDcacheAll);
    }

    fn invalidate_icache_all(&self) {
        self.lock().events.push(HalEvent::InvalidateIcacheAll);
    }

    fn read_mpidr(&self) -> Mpidr {
        Mpidr::from_bits_retain(self.lock().mpidr)
    }

    fn read_sctlr(&self) -> Sctlr {
        self.sctlr()
    }

    unsafe fn write_sctlr(&self, value: Sctlr) {
        let mut state = self.lock();
        state.sctlr = value.bits();
        state.events.push(HalEvent::WriteSctlr(value));
    }

    fn read_actlr(&self) -> Actlr {
        self.actlr()
    }

    unsafe fn write_actlr(&self, value: Actlr) {
        let mut state = self.lock();
        state.actlr = value.bits();
        state.events.push(HalEvent::WriteActlr(value));
    }

    fn read_nsacr(&self) -> Nsacr {
        self.nsacr()
    }

    unsafe fn write_nsacr(&self, value: Nsacr) {
        let mut state = self.lock();
        state.nsacr = value.bits();
        state.events.push(HalEvent::WriteNsacr(value));
    }

    fn read_mvbar(&self) -> usize {
        self.mvbar()
    }

    unsafe fn write_mvbar(&self, base: usize) {
        self.lock().mvbar = base;
    }

    unsafe fn set_monitor_stack(&self, top: usize) {
        self.lock().monitor_stack = Some(top);
    }

    fn read_fault_registers(&self) -> FaultRegisters {
        self.lock().fault_registers
    }

    fn mask_interrupts(&self) {
        self.lock().interrupts_masked = true;
    }

    fn halt(&self) -> ! {
        panic!("{}", HALT_MAGIC);
    }

    unsafe fn enter_non_secure(&self, entry: u32, args: [u32; 3]) -> ! {
        self.lock().non_secure_entry = Some((entry, args));
        panic!("{}", NON_SECURE_MAGIC);
    }
}

/// Runs `f`, which is expected to end in a function that never returns and therefore panics with
/// `magic` under test.
pub fn expect_no_return<F: FnOnce()>(magic: &str, f: F) {
    // AssertUnwindSafe is required because the code under test holds atomics and spin locks.
    let result = catch_unwind(AssertUnwindSafe(f));

    if let Err(err) = result {
        if let Some(s) = err.downcast_ref::<String>()
            && *s == magic
        {
            return;
        }
        resume_unwind(err);
    } else {
        panic!("Expected {magic} did not happen");
    }
}
