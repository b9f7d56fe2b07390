// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SMC Calling Convention function ID decoding, as seen by an AArch32 monitor.

use core::fmt::{self, Debug, Formatter};
use num_enum::TryFromPrimitive;

const FAST_CALL: u32 = 1 << 31;
const SMC64: u32 = 1 << 30;
const OEN_SHIFT: u32 = 24;
const OEN_MASK: u32 = 0x3f << OEN_SHIFT;
/// Bits 16-23 of a fast call. Bit 16 is the SVE hint, meaningless to AArch32 callers.
const RESERVED_BITS: u32 = 0xff << 16;

/// Returned in `r0` for any function ID nobody implements.
pub const NOT_SUPPORTED: i32 = -1;

/// The type of an SMCCC call: a fast call with one of the two calling conventions, or a yielding
/// call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmcccCallType {
    /// An SMC32 fast call.
    Fast32,
    /// An SMC64 fast call.
    Fast64,
    /// A yielding call.
    Yielding,
}

/// The architected owners, for logging.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
enum Owner {
    Arm = 0,
    Cpu = 1,
    SiP = 2,
    Oem = 3,
    StandardSecure = 4,
    StandardHypervisor = 5,
    VendorHypervisor = 6,
    VendorMonitor = 7,
}

/// Owning Entity Number (OEN), bits 24-29 of a function ID.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwningEntityNumber(pub u8);

impl OwningEntityNumber {
    /// Standard Secure services, which include PSCI.
    pub const STANDARD_SECURE: Self = Self(4);
}

/// An SMCCC function ID, as passed in `r0`.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Returns the Owning Entity Number.
    pub fn oen(self) -> OwningEntityNumber {
        OwningEntityNumber(((self.0 & OEN_MASK) >> OEN_SHIFT) as u8)
    }

    /// Returns the function number, bits 0-15.
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns what type of call this is.
    pub fn call_type(self) -> SmcccCallType {
        match (self.0 & FAST_CALL != 0, self.0 & SMC64 != 0) {
            (false, _) => SmcccCallType::Yielding,
            (true, false) => SmcccCallType::Fast32,
            (true, true) => SmcccCallType::Fast64,
        }
    }

    /// Returns false for a fast call with any of bits 16-23 set.
    pub fn valid(self) -> bool {
        self.call_type() == SmcccCallType::Yielding || self.0 & RESERVED_BITS == 0
    }
}

impl Debug for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#010x} ({:?} ", self.0, self.call_type())?;
        match Owner::try_from(self.oen().0) {
            Ok(owner) => write!(f, "{owner:?}")?,
            Err(_) => write!(f, "OEN {}", self.oen().0)?,
        }
        write!(f, " #{:#x})", self.number())
    }
}
