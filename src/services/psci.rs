// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PSCI 1.0 for a single cluster of two cores.

#[cfg(any(test, feature = "cpu-selftest"))]
pub mod selftest;
pub mod trampoline;

use crate::{
    hal::Hal,
    services::{Service, owns},
    smccc::OwningEntityNumber,
    sysregs::Mpidr,
};
use arm_psci::{AffinityInfo, ErrorCode, FunctionId, Version};
use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{AtomicU32, Ordering},
};
use log::{debug, error, info, warn};
use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;
use trampoline::{EntryPoint, MonitorEnvironment, Trampoline};

const FUNCTION_NUMBER_MIN: u16 = 0x0000;
const FUNCTION_NUMBER_MAX: u16 = 0x001F;

/// The number of cores on the SoC. Core 0 is the boot core.
pub const CPU_COUNT: usize = 2;

const PSCI_VERSION: Version = Version { major: 1, minor: 0 };

/// Failure of the hardware power sequence for a core.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SequencerError {
    /// The core is the boot core or does not exist.
    #[error("CPU{0} cannot be power sequenced")]
    InvalidCpu(usize),
    /// The power clamp did not read back as released.
    #[error("CPU{cpu} power clamp stuck at {value:#04x}")]
    ClampStuck {
        /// The core whose clamp is stuck.
        cpu: usize,
        /// The clamp value read back.
        value: u32,
    },
}

/// Drives the SoC registers which power secondary cores up and down.
pub trait CpuBringup: Sync {
    /// Prepares the power control blocks. Called once from `psci_init`.
    fn init(&self, hal: &impl Hal);

    /// Powers up `cpu` and releases it from reset at `boot_vector`.
    fn cpu_on(&self, hal: &impl Hal, cpu: usize, boot_vector: usize) -> Result<(), SequencerError>;

    /// Puts `cpu` back into reset and engages its power clamp.
    fn cpu_off(&self, hal: &impl Hal, cpu: usize) -> Result<(), SequencerError>;

    /// Returns whether the hardware reports `cpu` as running.
    fn cpu_is_on(&self, hal: &impl Hal, cpu: usize) -> bool;
}

/// Run-time tunables of the PSCI implementation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PsciConfig {
    /// How long `CPU_ON` waits for the secondary to reach its entry point.
    pub cpu_on_timeout_ms: u32,
    /// Delay between two reads of the staging header.
    pub poll_interval_us: u32,
}

/// Where the monitor vectors and the per-core monitor stacks live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonitorLayout {
    /// Monitor vector base address.
    pub vector_base: usize,
    /// Top of each core's Monitor mode stack.
    pub stack_tops: [usize; CPU_COUNT],
}

/// Logical power state of a core.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, IntoPrimitive, PartialEq)]
#[repr(u32)]
pub enum CpuState {
    /// Powered down.
    #[num_enum(default)]
    Off = 0,
    /// `CPU_ON` is in progress.
    OnPending = 1,
    /// Running.
    On = 2,
}

impl From<CpuState> for AffinityInfo {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Off => AffinityInfo::Off,
            CpuState::OnPending => AffinityInfo::OnPending,
            CpuState::On => AffinityInfo::On,
        }
    }
}

/// SMC64 encodings which PSCI leaves undefined but callers use anyway, and the SMC32 function each
/// one stands for.
const SMC64_ALIASES: [(u32, FunctionId); 4] = [
    (0xc400_0006, FunctionId::MigrateInfoType),
    (0xc400_0008, FunctionId::SystemOff),
    (0xc400_0009, FunctionId::SystemReset),
    (0xc400_000a, FunctionId::PsciFeatures),
];

/// Decodes the function ID of an SMC, including the unofficial SMC64 aliases.
fn decode_function(function_id: u32) -> Option<FunctionId> {
    FunctionId::try_from(function_id).ok().or_else(|| {
        SMC64_ALIASES
            .iter()
            .find(|(alias, _)| *alias == function_id)
            .map(|(_, function)| *function)
    })
}

/// The per-core record. `state` is the single source of truth; `entry` and `context` are written
/// before `state` is published.
struct CpuRecord {
    state: AtomicU32,
    entry: AtomicU32,
    context: AtomicU32,
}

impl CpuRecord {
    const fn new(state: CpuState) -> Self {
        Self {
            state: AtomicU32::new(state as u32),
            entry: AtomicU32::new(0),
            context: AtomicU32::new(0),
        }
    }

    fn state(&self) -> CpuState {
        CpuState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CpuState) {
        self.state.store(state.into(), Ordering::Release);
    }

    /// Moves the record from OFF to ON_PENDING, or reports why it cannot.
    ///
    /// This is a plain load and store, as exclusive accesses are unreliable once the MMU is off.
    /// Only the boot core ever finds a secondary's record OFF: while the secondary runs, its record
    /// is ON_PENDING or ON.
    fn try_claim(&self) -> Result<(), ErrorCode> {
        match self.state() {
            CpuState::Off => {
                self.set_state(CpuState::OnPending);
                Ok(())
            }
            CpuState::OnPending => Err(ErrorCode::OnPending),
            CpuState::On => Err(ErrorCode::AlreadyOn),
        }
    }

    fn set_entry(&self, entry: u32, context: u32) {
        self.entry.store(entry, Ordering::Relaxed);
        self.context.store(context, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.set_entry(0, 0);
        self.set_state(CpuState::Off);
    }
}

impl Debug for CpuRecord {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} entry={:#010x} context={:#010x}",
            self.state(),
            self.entry.load(Ordering::Relaxed),
            self.context.load(Ordering::Relaxed)
        )
    }
}

/// Returns the core index for a `CPU_ON` or `AFFINITY_INFO` target affinity.
///
/// Bits 24 to 31 carry no affinity (M, U, MT) and are ignored. Only Aff0 may be non-zero.
fn cpu_index(target: u32) -> Option<usize> {
    let mpidr = Mpidr::from_bits_retain(target);
    if mpidr.aff1() != 0 || mpidr.aff2() != 0 {
        return None;
    }
    let cpu = usize::from(mpidr.aff0());
    (cpu < CPU_COUNT).then_some(cpu)
}

/// Main PSCI structure. Owns the per-core records and the hardware used to change them.
pub struct Psci<H: Hal, B: CpuBringup> {
    hal: H,
    bringup: B,
    trampoline: Trampoline,
    config: PsciConfig,
    monitor: MonitorLayout,
    cpus: [CpuRecord; CPU_COUNT],
}

impl<H: Hal, B: CpuBringup> Psci<H, B> {
    /// Creates the PSCI state with the boot core ON and every other core OFF.
    pub fn new(
        hal: H,
        bringup: B,
        staging_base: usize,
        config: PsciConfig,
        monitor: MonitorLayout,
    ) -> Self {
        Self {
            hal,
            bringup,
            trampoline: Trampoline::new(staging_base),
            config,
            monitor,
            cpus: [CpuRecord::new(CpuState::On), CpuRecord::new(CpuState::Off)],
        }
    }

    /// Prepares the power control blocks, installs the boot core's monitor vectors and stack, and
    /// adopts any secondary the hardware reports as already running.
    ///
    /// This must be called once on the boot core before any SMC is handled.
    pub fn init(&self) {
        info!("Initialising PSCI");
        self.bringup.init(&self.hal);

        // SAFETY: The monitor layout describes the monitor vector table and the stack reserved for
        // Monitor mode on the boot core.
        unsafe {
            self.hal.write_mvbar(self.monitor.vector_base);
            self.hal.set_monitor_stack(self.monitor.stack_tops[0]);
        }
        debug!(
            "Monitor vectors at {:#010x}, MVBAR reads {:#010x}",
            self.monitor.vector_base,
            self.hal.read_mvbar()
        );

        for cpu in 1..CPU_COUNT {
            if self.bringup.cpu_is_on(&self.hal, cpu) {
                warn!("CPU{cpu} is already running, adopting it as ON");
                self.cpus[cpu].set_state(CpuState::On);
            }
        }
    }

    /// Returns the HAL through which PSCI reaches the hardware.
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Returns the recorded state of `cpu`, or `None` if there is no such core.
    pub fn cpu_state(&self, cpu: usize) -> Option<CpuState> {
        self.cpus.get(cpu).map(CpuRecord::state)
    }

    /// Handles `CPU_ON`: starts the core identified by `target` at `entry` with `context` in `r0`.
    fn cpu_on(&self, target: u32, entry: u32, context: u32) -> Result<(), ErrorCode> {
        let cpu = cpu_index(target).ok_or(ErrorCode::InvalidParameters)?;
        if entry == 0 {
            return Err(ErrorCode::InvalidParameters);
        }
        if cpu == 0 {
            return Err(ErrorCode::AlreadyOn);
        }
        let entry_point = EntryPoint::from_raw(entry);
        if !entry_point.is_aligned() {
            return Err(ErrorCode::InvalidAddress);
        }

        let record = &self.cpus[cpu];
        record.try_claim()?;
        record.set_entry(entry, context);
        info!("CPU_ON CPU{cpu} entry {entry:#010x} context {context:#010x}");

        let monitor = MonitorEnvironment {
            vector_base: self.monitor.vector_base,
            stack_top: self.monitor.stack_tops[cpu],
        };
        let stub = self
            .trampoline
            .stage(&self.hal, entry_point, context, monitor);

        if let Err(e) = self.bringup.cpu_on(&self.hal, cpu, stub) {
            warn!("CPU{cpu} power sequencing failed: {e}");
            self.abort_cpu_on(cpu);
            return Err(ErrorCode::InternalFailure);
        }

        if let Err(e) = self.trampoline.wait_for_jump(
            &self.hal,
            self.config.cpu_on_timeout_ms,
            self.config.poll_interval_us,
        ) {
            warn!("CPU{cpu} did not reach its entry point: {e}");
            self.abort_cpu_on(cpu);
            return Err(ErrorCode::InternalFailure);
        }

        let header = self.trampoline.read_header(&self.hal);
        debug!("CPU{cpu} started, MPIDR {:#010x}", header.mpidr);
        record.set_state(CpuState::On);
        Ok(())
    }

    /// Powers a core which failed to start back down and forgets its request.
    fn abort_cpu_on(&self, cpu: usize) {
        if let Err(e) = self.bringup.cpu_off(&self.hal, cpu) {
            warn!("Failed to power CPU{cpu} back down: {e}");
        }
        self.cpus[cpu].clear();
    }

    /// Handles `CPU_OFF` on the calling core. Does not return on success.
    fn cpu_off(&self) -> Result<(), ErrorCode> {
        let cpu = cpu_index(self.hal.read_mpidr().bits()).ok_or(ErrorCode::InvalidParameters)?;
        if cpu == 0 {
            return Err(ErrorCode::Denied);
        }

        info!("CPU_OFF CPU{cpu}");
        self.cpus[cpu].clear();
        if let Err(e) = self.bringup.cpu_off(&self.hal, cpu) {
            error!("CPU{cpu} power down failed: {e}");
        }
        self.hal.halt()
    }

    /// Handles `AFFINITY_INFO`. Only affinity level 0 exists.
    fn affinity_info(&self, target: u32, lowest_level: u32) -> Result<AffinityInfo, ErrorCode> {
        if lowest_level != 0 {
            return Err(ErrorCode::InvalidParameters);
        }
        let cpu = cpu_index(target).ok_or(ErrorCode::InvalidParameters)?;
        Ok(self.cpus[cpu].state().into())
    }

    /// Handles `SYSTEM_RESET` through the watchdog. Does not return.
    fn system_reset(&self) -> ! {
        info!("SYSTEM_RESET");
        self.hal.watchdog_set(1);
        self.hal.halt()
    }

    /// Handles `PSCI_FEATURES`. Only the SMC32 encodings of the implemented calls are reported.
    fn features(&self, function_id: u32) -> Result<u32, ErrorCode> {
        const SUCCESS: u32 = 0;

        match FunctionId::try_from(function_id) {
            Ok(
                FunctionId::PsciVersion
                | FunctionId::CpuOff
                | FunctionId::CpuOn32
                | FunctionId::AffinityInfo32
                | FunctionId::SystemReset
                | FunctionId::PsciFeatures,
            ) => Ok(SUCCESS),
            _ => Err(ErrorCode::NotSupported),
        }
    }

    fn handle_smc_inner(&self, regs: &[u32; 4]) -> Result<u32, ErrorCode> {
        const SUCCESS: u32 = 0;
        let function = decode_function(regs[0]).ok_or(ErrorCode::NotSupported)?;

        match function {
            FunctionId::PsciVersion => Ok(u32::from(PSCI_VERSION)),
            FunctionId::CpuOff => {
                self.cpu_off()?;
                Ok(SUCCESS)
            }
            FunctionId::CpuOn32 | FunctionId::CpuOn64 => {
                self.cpu_on(regs[1], regs[2], regs[3])?;
                Ok(SUCCESS)
            }
            FunctionId::AffinityInfo32 | FunctionId::AffinityInfo64 => {
                let affinity_info = self.affinity_info(regs[1], regs[2])?;
                Ok(u32::from(affinity_info))
            }
            FunctionId::SystemReset => self.system_reset(),
            FunctionId::PsciFeatures => self.features(regs[1]),
            _ => Err(ErrorCode::NotSupported),
        }
    }
}

impl<H: Hal, B: CpuBringup> Service for Psci<H, B> {
    owns!(
        OwningEntityNumber::STANDARD_SECURE,
        FUNCTION_NUMBER_MIN..=FUNCTION_NUMBER_MAX
    );

    fn handle_smc(&self, regs: &[u32; 4]) -> i32 {
        match self.handle_smc_inner(regs) {
            Ok(result) => result as i32,
            Err(return_code) => u64::from(return_code) as i32,
        }
    }
}

impl<H: Hal, B: CpuBringup> Debug for Psci<H, B> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_list().entries(self.cpus.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hal::fake::{Behaviour, FakeHal, HALT_MAGIC, expect_no_return},
        platform::t113::cpucfg::RvbarBringup,
    };
    use std::thread;

    const STAGING_BASE: usize = 0x3_0000;
    const CONFIG: PsciConfig = PsciConfig {
        cpu_on_timeout_ms: 50,
        poll_interval_us: 100,
    };
    const MONITOR: MonitorLayout = MonitorLayout {
        vector_base: 0x4100_0000,
        stack_tops: [0x4101_1000, 0x4101_2000],
    };
    const CLAMP1: usize = 0x0700_05b0;

    const VERSION: u32 = 0x8400_0000;
    const CPU_SUSPEND: u32 = 0x8400_0001;
    const CPU_OFF: u32 = 0x8400_0002;
    const CPU_ON: u32 = 0x8400_0003;
    const AFFINITY_INFO: u32 = 0x8400_0004;
    const MIGRATE_INFO_TYPE: u32 = 0x8400_0006;
    const SYSTEM_OFF: u32 = 0x8400_0008;
    const SYSTEM_RESET: u32 = 0x8400_0009;
    const FEATURES: u32 = 0x8400_000a;
    const SMC64: u32 = 0x4000_0000;

    const ENTRY: u32 = 0x4000_1000;
    const CONTEXT: u32 = 0xdead_beef;

    const NOT_SUPPORTED: i32 = -1;
    const INVALID_PARAMETERS: i32 = -2;

    fn psci_with_config(behaviour: Behaviour, config: PsciConfig) -> Psci<FakeHal, RvbarBringup> {
        let hal = FakeHal::new();
        hal.add_secondary(RvbarBringup::secondary_model(1, behaviour));
        let psci = Psci::new(hal, RvbarBringup, STAGING_BASE, config, MONITOR);
        psci.init();
        psci
    }

    fn psci_with(behaviour: Behaviour) -> Psci<FakeHal, RvbarBringup> {
        psci_with_config(behaviour, CONFIG)
    }

    /// The closure is expected to end in a never-returning power down of the calling core.
    fn expect_cpu_power_down<F: FnOnce()>(f: F) {
        expect_no_return(HALT_MAGIC, f);
    }

    #[test]
    fn init_installs_monitor_and_enables_cpucfg() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.hal.mvbar(), MONITOR.vector_base);
        assert_eq!(psci.hal.monitor_stack(), Some(MONITOR.stack_tops[0]));
        assert_eq!(psci.hal.peek(0x0701_022c), 0x0001_0001);
        assert_eq!(psci.cpu_state(0), Some(CpuState::On));
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
    }

    #[test]
    fn init_adopts_running_secondary() {
        let hal = FakeHal::new();
        hal.poke(0x0901_0084, 1);
        let psci = Psci::new(hal, RvbarBringup, STAGING_BASE, CONFIG, MONITOR);
        psci.init();
        assert_eq!(psci.cpu_state(1), Some(CpuState::On));
        assert_eq!(psci.affinity_info(1, 0), Ok(AffinityInfo::On));
    }

    #[test]
    fn version() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.handle_smc(&[VERSION, 0, 0, 0]), 0x0001_0000);
        assert_eq!(psci.handle_smc(&[VERSION | SMC64, 0, 0, 0]), NOT_SUPPORTED);
    }

    #[test]
    fn features() {
        let psci = psci_with(Behaviour::Immediate);
        for function in [VERSION, CPU_ON, CPU_OFF, AFFINITY_INFO, SYSTEM_RESET, FEATURES] {
            assert_eq!(psci.features(function), Ok(0), "{function:#x}");
        }
        for function in [
            CPU_ON | SMC64,
            AFFINITY_INFO | SMC64,
            SYSTEM_RESET | SMC64,
            FEATURES | SMC64,
            VERSION | SMC64,
            CPU_OFF | SMC64,
            CPU_SUSPEND,
            CPU_SUSPEND | SMC64,
            0x8400_0005,
            MIGRATE_INFO_TYPE,
            0x8400_0007,
            SYSTEM_OFF,
            0x8400_000b,
            0x8400_001f,
            0x8600_0003,
            0x0400_0003,
            0x8401_0003,
            0,
            u32::MAX,
        ] {
            assert_eq!(
                psci.features(function),
                Err(ErrorCode::NotSupported),
                "{function:#x}"
            );
        }
        assert_eq!(psci.handle_smc(&[FEATURES | SMC64, CPU_ON, 0, 0]), 0);
        assert_eq!(
            psci.handle_smc(&[FEATURES, SYSTEM_RESET | SMC64, 0, 0]),
            NOT_SUPPORTED
        );
        assert_eq!(psci.handle_smc(&[FEATURES, SYSTEM_OFF, 0, 0]), NOT_SUPPORTED);
    }

    #[test]
    fn smc64_aliases() {
        assert_eq!(decode_function(CPU_ON | SMC64), Some(FunctionId::CpuOn64));
        assert_eq!(
            decode_function(SYSTEM_RESET | SMC64),
            Some(FunctionId::SystemReset)
        );
        assert_eq!(
            decode_function(FEATURES | SMC64),
            Some(FunctionId::PsciFeatures)
        );
        assert_eq!(decode_function(SYSTEM_RESET), Some(FunctionId::SystemReset));
        assert_eq!(decode_function(VERSION | SMC64), None);
        assert_eq!(decode_function(CPU_OFF | SMC64), None);
        assert_eq!(decode_function(0x8400_001f), None);
    }

    #[test]
    fn claim_only_from_off() {
        let record = CpuRecord::new(CpuState::Off);
        assert_eq!(record.try_claim(), Ok(()));
        assert_eq!(record.state(), CpuState::OnPending);
        assert_eq!(record.try_claim(), Err(ErrorCode::OnPending));
        assert_eq!(record.state(), CpuState::OnPending);

        record.set_state(CpuState::On);
        assert_eq!(record.try_claim(), Err(ErrorCode::AlreadyOn));
        assert_eq!(record.state(), CpuState::On);

        record.clear();
        assert_eq!(record.try_claim(), Ok(()));
    }

    #[test]
    fn cpu_state_out_of_range() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
        assert_eq!(psci.cpu_state(CPU_COUNT), None);
        assert_eq!(psci.cpu_state(usize::MAX), None);
    }

    #[test]
    fn unimplemented_calls() {
        let psci = psci_with(Behaviour::Immediate);
        for function in [
            CPU_SUSPEND,
            CPU_SUSPEND | SMC64,
            MIGRATE_INFO_TYPE,
            MIGRATE_INFO_TYPE | SMC64,
            SYSTEM_OFF,
            SYSTEM_OFF | SMC64,
            0x8400_000b,
        ] {
            assert_eq!(
                psci.handle_smc(&[function, 0, 0, 0]),
                NOT_SUPPORTED,
                "{function:#x}"
            );
        }
    }

    #[test]
    fn cpu_on_starts_secondary() {
        let psci = psci_with(Behaviour::Immediate);

        assert_eq!(psci.cpu_on(1, ENTRY, CONTEXT), Ok(()));
        assert_eq!(psci.cpu_state(1), Some(CpuState::On));
        assert_eq!(psci.affinity_info(1, 0), Ok(AffinityInfo::On));

        let boots = psci.hal.boots();
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].cpu, 1);
        assert_eq!(boots[0].entry, ENTRY);
        assert_eq!(boots[0].context, CONTEXT);
        assert_eq!(boots[0].mvbar as usize, MONITOR.vector_base);
        assert_eq!(boots[0].stack as usize, MONITOR.stack_tops[1]);

        let header = psci.trampoline.read_header(&psci.hal);
        assert_eq!(header.stage, trampoline::STAGE_JUMPING);
        assert_eq!(header.mpidr, Mpidr::from_affinity(0, 0, 1).bits());
        assert_eq!(header.scratch, CONTEXT);
    }

    #[test]
    fn cpu_on_thumb_entry_keeps_interworking_bit() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.cpu_on(1, ENTRY | 0x3, 0), Ok(()));
        assert_eq!(psci.hal.boots()[0].entry, ENTRY | 0x3);
    }

    #[test]
    fn cpu_on_ignores_top_byte_of_target() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.cpu_on(0xc000_0001, ENTRY, 0), Ok(()));
        assert_eq!(psci.affinity_info(0x8000_0001, 0), Ok(AffinityInfo::On));
    }

    #[test]
    fn cpu_on_primary_is_already_on() {
        let psci = psci_with(Behaviour::Immediate);
        psci.hal.clear_events();

        assert_eq!(psci.cpu_on(0, ENTRY, CONTEXT), Err(ErrorCode::AlreadyOn));
        assert_eq!(psci.cpu_on(0x4000_0000, ENTRY, CONTEXT), Err(ErrorCode::AlreadyOn));
        assert_eq!(psci.hal.events(), vec![]);
        assert_eq!(psci.cpu_state(0), Some(CpuState::On));
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
    }

    #[test]
    fn cpu_on_zero_entry() {
        let psci = psci_with(Behaviour::Immediate);
        for target in [0, 1, 2, 0x100] {
            assert_eq!(
                psci.cpu_on(target, 0, CONTEXT),
                Err(ErrorCode::InvalidParameters)
            );
        }
        assert_eq!(psci.cpu_on(1, ENTRY, 0), Ok(()));
        assert_eq!(psci.cpu_on(1, 0, 0), Err(ErrorCode::InvalidParameters));
    }

    #[test]
    fn cpu_on_invalid_target() {
        let psci = psci_with(Behaviour::Immediate);
        psci.hal.clear_events();
        for target in [2, 0xff, 0x100, 0x101, 0x1_0001] {
            assert_eq!(
                psci.cpu_on(target, ENTRY, CONTEXT),
                Err(ErrorCode::InvalidParameters)
            );
        }
        assert_eq!(psci.hal.events(), vec![]);
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
    }

    #[test]
    fn cpu_on_misaligned_arm_entry() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(
            psci.cpu_on(1, ENTRY | 0x2, CONTEXT),
            Err(ErrorCode::InvalidAddress)
        );
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
    }

    #[test]
    fn cpu_on_twice_is_already_on() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.cpu_on(1, ENTRY, CONTEXT), Ok(()));
        psci.hal.clear_events();

        assert_eq!(psci.cpu_on(1, ENTRY, CONTEXT), Err(ErrorCode::AlreadyOn));
        assert_eq!(psci.hal.events(), vec![]);
        assert_eq!(psci.hal.boots().len(), 1);
    }

    #[test]
    fn cpu_on_timeout_powers_core_down() {
        let psci = psci_with(Behaviour::Never);

        assert_eq!(
            psci.cpu_on(1, ENTRY, CONTEXT),
            Err(ErrorCode::InternalFailure)
        );
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
        assert_eq!(psci.hal.peek(CLAMP1), 0xff);
        assert_eq!(psci.hal.peek(0x0901_0080), 0);
        assert_eq!(psci.affinity_info(1, 0), Ok(AffinityInfo::Off));
    }

    #[test]
    fn cpu_on_timeout_across_clock_wrap() {
        let psci = psci_with(Behaviour::Never);
        psci.hal.set_clock_base(u32::MAX - 10);
        assert_eq!(
            psci.cpu_on(1, ENTRY, CONTEXT),
            Err(ErrorCode::InternalFailure)
        );
    }

    #[test]
    fn cpu_on_stuck_clamp_is_internal_failure() {
        let psci = psci_with(Behaviour::Immediate);
        psci.hal.stick(CLAMP1, 0x80);

        assert_eq!(
            psci.cpu_on(1, ENTRY, CONTEXT),
            Err(ErrorCode::InternalFailure)
        );
        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
        assert_eq!(psci.hal.boots(), vec![]);
    }

    #[test]
    fn cpu_on_while_pending() {
        let config = PsciConfig {
            cpu_on_timeout_ms: 5000,
            ..CONFIG
        };
        let psci = psci_with_config(Behaviour::Gated, config);

        thread::scope(|s| {
            let first = s.spawn(|| psci.cpu_on(1, ENTRY, CONTEXT));

            while psci.cpu_state(1) != Some(CpuState::OnPending) {
                thread::yield_now();
            }
            assert_eq!(
                psci.cpu_on(1, ENTRY + 0x100, 0),
                Err(ErrorCode::OnPending)
            );
            assert_eq!(psci.handle_smc(&[AFFINITY_INFO, 1, 0, 0]), 2);

            psci.hal.open_gate();
            assert_eq!(first.join().unwrap(), Ok(()));
        });

        assert_eq!(psci.handle_smc(&[AFFINITY_INFO, 1, 0, 0]), 0);
        let boots = psci.hal.boots();
        assert_eq!(boots.len(), 1);
        assert_eq!(boots[0].entry, ENTRY);
    }

    #[test]
    fn affinity_info_levels() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.handle_smc(&[AFFINITY_INFO, 0, 0, 0]), 0);
        assert_eq!(psci.handle_smc(&[AFFINITY_INFO, 1, 0, 0]), 1);
        assert_eq!(psci.handle_smc(&[AFFINITY_INFO | SMC64, 1, 0, 0]), 1);
        for target in [0, 1, 2] {
            for level in [1, 2, 3] {
                assert_eq!(
                    psci.handle_smc(&[AFFINITY_INFO, target, level, 0]),
                    INVALID_PARAMETERS
                );
            }
        }
        assert_eq!(
            psci.handle_smc(&[AFFINITY_INFO, 2, 0, 0]),
            INVALID_PARAMETERS
        );
        assert_eq!(
            psci.handle_smc(&[AFFINITY_INFO, 0x100, 0, 0]),
            INVALID_PARAMETERS
        );
    }

    #[test]
    fn cpu_off_denied_on_boot_core() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.handle_smc(&[CPU_OFF, 0, 0, 0]), -3);
        assert_eq!(psci.cpu_state(0), Some(CpuState::On));
    }

    #[test]
    fn cpu_off_invalid_caller() {
        let psci = psci_with(Behaviour::Immediate);
        psci.hal.set_mpidr(Mpidr::from_affinity(0, 1, 0));
        assert_eq!(psci.cpu_off(), Err(ErrorCode::InvalidParameters));
    }

    #[test]
    fn cpu_off_powers_down_secondary() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.cpu_on(1, ENTRY, CONTEXT), Ok(()));

        psci.hal.set_mpidr(Mpidr::from_affinity(0, 0, 1));
        expect_cpu_power_down(|| {
            psci.handle_smc(&[CPU_OFF, 0, 0, 0]);
        });

        assert_eq!(psci.cpu_state(1), Some(CpuState::Off));
        assert_eq!(psci.hal.peek(CLAMP1), 0xff);
        assert_eq!(psci.hal.peek(0x0901_0088), 0x3);

        // The core can be started again.
        psci.hal.set_mpidr(Mpidr::from_affinity(0, 0, 0));
        assert_eq!(psci.cpu_on(1, ENTRY, CONTEXT), Ok(()));
        assert_eq!(psci.hal.boots().len(), 2);
    }

    #[test]
    fn system_reset_arms_watchdog() {
        let psci = psci_with(Behaviour::Immediate);
        expect_cpu_power_down(|| {
            psci.handle_smc(&[SYSTEM_RESET, 0, 0, 0]);
        });
        assert_eq!(psci.hal.watchdog(), Some(1));
    }

    #[test]
    fn cpu_on_then_poll_affinity() {
        let psci = psci_with(Behaviour::Immediate);
        assert_eq!(psci.handle_smc(&[CPU_ON, 1, ENTRY, CONTEXT]), 0);

        let mut affinity = psci.handle_smc(&[AFFINITY_INFO, 1, 0, 0]);
        for _ in 0..100 {
            if affinity == 0 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(1));
            affinity = psci.handle_smc(&[AFFINITY_INFO, 1, 0, 0]);
        }
        assert_eq!(affinity, 0);
    }
}
