use std::fmt;

/// An error that can occur when arming the crash handler
#[derive(Debug)]
pub enum Error {
    /// Unable to `mmap` memory for the alternate signal stack
    OutOfMemory,
    /// [`crate::arm`] has already been called; arming is a one-shot,
    /// process-lifetime transition.
    AlreadyArmed,
    /// An I/O or other syscall failed
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("unable to allocate memory"),
            Self::AlreadyArmed => f.write_str("the crash handler is already armed"),
            Self::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
