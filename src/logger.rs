// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! `log` backend for the monitor, writing through the platform's [`LogSink`].

use crate::{nonsecure::non_secure_entered, platform::LogSinkImpl};
use core::fmt::{Arguments, Write};
#[cfg(all(target_os = "none", not(test)))]
use core::panic::PanicInfo;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Once, mutex::SpinMutex};

/// Level used when `LOG_LEVEL` is unset or unrecognised.
const DEFAULT_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

static LOGGER: Once<Logger> = Once::new();

struct Logger {
    sink: LogSinkImpl,
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        writeln!(self.sink, "monitor {}: {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Installs the monitor's logger over `sink`.
///
/// Fails if a logger is already installed, in which case `sink` is still kept for the panic
/// handler.
pub fn init(sink: LogSinkImpl) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink });
    log::set_logger(logger)?;
    log::set_max_level(build_time_log_level());
    Ok(())
}

/// Returns the sink given to [`init`], if any.
pub fn get_log_sink() -> Option<&'static LogSinkImpl> {
    LOGGER.get().map(|logger| &logger.sink)
}

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(sink) = get_log_sink() {
        writeln!(sink, "monitor halted: {}", info);
    }
    loop {
        crate::armv7::dsb_sy();
        crate::armv7::wfi();
    }
}

/// Returns the level named by the `LOG_LEVEL` environment variable at build time.
///
/// Recognised values are the lower-case names of the [`LevelFilter`] variants.
pub const fn build_time_log_level() -> LevelFilter {
    match option_env!("LOG_LEVEL") {
        Some(level) => parse_log_level(level),
        None => DEFAULT_LEVEL,
    }
}

const fn parse_log_level(level: &str) -> LevelFilter {
    match level.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => DEFAULT_LEVEL,
    }
}

/// Destination for log lines.
///
/// `write_fmt` takes `&self` as both cores log through one shared sink, so any locking is up to
/// the implementation.
pub trait LogSink {
    /// Writes `args` to the sink.
    fn write_fmt(&self, args: Arguments);
}

/// A [`LogSink`] over any [`Write`], holding a spin lock for each line so that lines from the two
/// cores don't interleave.
///
/// The lock needs exclusive accesses, which stop working once the MMU is off after the hand-off.
/// From then on each line goes through a fresh `W::default()` without the lock, and lines from
/// the two cores may interleave.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Default> LockedWriter<W> {
    fn write_with(&self, args: Arguments, handed_off: bool) {
        // There is nowhere to report a console failure.
        if handed_off {
            let _ = W::default().write_fmt(args);
        } else {
            let _ = self.writer.lock().write_fmt(args);
        }
    }
}

impl<W: Write + Default> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        self.write_with(args, non_secure_entered());
    }
}
