mod state;

use crate::Error;
use std::path::Path;

/// The fatal signals that are captured and re-raised
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum Signal {
    Segv = libc::SIGSEGV,
    Abort = libc::SIGABRT,
    Bus = libc::SIGBUS,
    Fpe = libc::SIGFPE,
    Illegal = libc::SIGILL,
    Trap = libc::SIGTRAP,
}

/// The monitored signal set. Fixed at compile time; the table of displaced
/// handlers is index-aligned with this array.
pub const CAUGHT_SIGNALS: [Signal; 6] = [
    Signal::Segv,
    Signal::Abort,
    Signal::Bus,
    Signal::Fpe,
    Signal::Illegal,
    Signal::Trap,
];

/// The most program counters a single crash artifact will record.
pub const MAX_BACKTRACE_DEPTH: usize = 64;

impl Signal {
    /// The canonical name written as the first line of the crash artifact.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Segv => "SIGSEGV",
            Self::Abort => "SIGABRT",
            Self::Bus => "SIGBUS",
            Self::Fpe => "SIGFPE",
            Self::Illegal => "SIGILL",
            Self::Trap => "SIGTRAP",
        }
    }

    /// Maps a raw signal number back into the monitored set.
    #[inline]
    pub fn from_raw(sig: i32) -> Option<Self> {
        CAUGHT_SIGNALS.into_iter().find(|s| *s as i32 == sig)
    }
}

/// Arms the process-wide fault handler, writing crash artifacts to `path`.
///
/// This is a one-shot transition: once armed the handler stays installed for
/// the remaining lifetime of the process, there is no disarm. A second call
/// fails with [`Error::AlreadyArmed`].
///
/// The path is stored in a fixed buffer of 255 bytes and silently truncated
/// beyond that. `path` is also opened (created/truncated) immediately and
/// the descriptor kept as a fallback target; if that open fails it is *not*
/// an error, fault handling simply degrades to "no artifact written" should
/// the fault-time open fail as well.
///
/// On a fault the handler streams the artifact, restores whatever handler
/// was installed for that signal before this call, and re-raises, so the
/// process still terminates with the signal's original disposition. Nothing
/// on that path depends on the caller checking this function's result.
pub fn arm(path: impl AsRef<Path>) -> Result<(), Error> {
    state::arm(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_canonical() {
        assert_eq!(Signal::Segv.name(), "SIGSEGV");
        assert_eq!(Signal::Abort.name(), "SIGABRT");
        assert_eq!(Signal::Bus.name(), "SIGBUS");
        assert_eq!(Signal::Fpe.name(), "SIGFPE");
        assert_eq!(Signal::Illegal.name(), "SIGILL");
        assert_eq!(Signal::Trap.name(), "SIGTRAP");
    }

    #[test]
    fn raw_round_trip_covers_the_monitored_set() {
        for sig in CAUGHT_SIGNALS {
            assert_eq!(Signal::from_raw(sig as i32), Some(sig));
        }
        assert_eq!(Signal::from_raw(libc::SIGHUP), None);
    }
}
