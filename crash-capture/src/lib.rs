//! Process-wide capture of fatal signals to a crash artifact file.
//!
//! Calling [`arm`] installs a handler for the following
//! [signals](https://man7.org/linux/man-pages/man7/signal.7.html)
//!
//! ## `SIGSEGV`
//!
//! Signal sent to a process when it makes an invalid virtual memory reference,
//! a [segmentation fault](https://en.wikipedia.org/wiki/Segmentation_fault).
//! This covers infamous `null` pointer access, out of bounds access, use after
//! free, stack overflows, etc.
//!
//! ## `SIGABRT`
//!
//! Signal sent to a process to tell it to abort, i.e. to terminate. The signal
//! is usually initiated by the process itself when it calls `std::process::abort`
//! or `libc::abort`, but it can be sent to the process from outside like any
//! other signal.
//!
//! ## `SIGBUS`
//!
//! Signal sent to a process when it causes a [bus error](https://en.wikipedia.org/wiki/Bus_error).
//!
//! ## `SIGFPE`
//!
//! Signal sent to a process when it executes an erroneous arithmetic operation.
//! Though it stands for **f**loating **p**oint **e**xception this signal covers
//! integer operations as well.
//!
//! ## `SIGILL`
//!
//! Signal sent to a process when it attempts to execute an **illegal**, malformed,
//! unknown, or privileged, instruction.
//!
//! ## `SIGTRAP`
//!
//! Signal sent to a process when a trap is raised, eg. a breakpoint or debug
//! assertion.
//!
//! When one of these is delivered, the handler streams a minimal forensic
//! record to the artifact file supplied at arm time, one field per line:
//! the canonical signal name, the faulting address, and the raw program
//! counters of the call stack, all rendered as `0x`-prefixed lowercase hex.
//! It then restores whatever handler was installed before [`arm`] and
//! re-raises the signal, so the process terminates exactly as it would have
//! without instrumentation.
//!
//! Everything on the fault path obeys the async-signal-safety rules: no
//! allocation, no locks, no buffered I/O, no formatting machinery. All
//! buffers are statically sized and populated before the first fault can
//! occur, and the record is streamed field-by-field with raw `write(2)`
//! calls rather than assembled in memory.
//!
//! The handler runs on an alternate, pre-allocated signal stack, as the
//! fault may well have been a stack overflow that left the faulting
//! thread's own stack unusable.

#![allow(unsafe_code)]

mod error;

pub use error::Error;

#[cfg(feature = "debug-print")]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {
        let cstr = concat!($s, "\n");
        $crate::write_stderr(cstr);
    };
}

#[cfg(not(feature = "debug-print"))]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {};
}

/// Writes the specified string directly to stderr.
///
/// This is safe to be called from within a compromised context.
#[inline]
pub fn write_stderr(s: &'static str) {
    unsafe {
        libc::write(2, s.as_ptr().cast(), s.len());
    }
}

pub mod safe;
pub mod unwind;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;

        pub use unix::{arm, Signal, CAUGHT_SIGNALS, MAX_BACKTRACE_DEPTH};
    } else {
        compile_error!("crash-capture only supports unix targets");
    }
}
