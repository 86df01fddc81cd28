//! Ways to bring a process to a violent end, on purpose.
//!
//! Used by the crash-capture integration tests to raise each monitored
//! fatal signal through a genuine hardware or runtime fault rather than a
//! plain `kill(2)`, so that the faulting address and stack actually mean
//! something.

#![allow(unsafe_code)]

use std::{arch::asm, fmt, str::FromStr};

/// A flavor of process death, one per monitored fatal signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mayhem {
    /// `SIGSEGV` via a null pointer dereference
    Segfault,
    /// `SIGABRT` via `std::process::abort`
    Abort,
    /// `SIGBUS` via a store into a mapping past the end of a truncated file
    Bus,
    /// `SIGFPE` via an integer division by zero
    DivideByZero,
    /// `SIGILL` via an undefined instruction
    Illegal,
    /// `SIGTRAP` via a breakpoint instruction
    Trap,
    /// `SIGSEGV` via exhausting the thread's stack
    StackOverflow,
}

impl fmt::Display for Mayhem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Segfault => "segfault",
            Self::Abort => "abort",
            Self::Bus => "bus",
            Self::DivideByZero => "divide-by-zero",
            Self::Illegal => "illegal",
            Self::Trap => "trap",
            Self::StackOverflow => "stack-overflow",
        })
    }
}

impl FromStr for Mayhem {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "segfault" => Self::Segfault,
            "abort" => Self::Abort,
            "bus" => Self::Bus,
            "divide-by-zero" => Self::DivideByZero,
            "illegal" => Self::Illegal,
            "trap" => Self::Trap,
            "stack-overflow" => Self::StackOverflow,
            _ => return Err(()),
        })
    }
}

impl Mayhem {
    /// Raises the fault. Does not return unless a signal handler somewhere
    /// decided the process should live.
    pub fn unleash(self) -> ! {
        match self {
            Self::Segfault => segfault(),
            Self::Abort => std::process::abort(),
            Self::Bus => bus_error(),
            Self::DivideByZero => divide_by_zero(),
            Self::Illegal => illegal_instruction(),
            Self::Trap => trap(),
            Self::StackOverflow => stack_overflow(),
        }

        unreachable!("the process should be dead by now");
    }
}

fn segfault() {
    let s: &u32 = unsafe {
        // avoid deref_nullptr lint
        fn definitely_not_null() -> *const u32 {
            std::ptr::null()
        }
        &*definitely_not_null()
    };

    println!("crashing via a null reference: {s}");
}

fn bus_error() {
    let path = std::env::temp_dir().join(format!("mayhem-bus-{}", std::process::id()));
    let path = std::ffi::CString::new(path.into_os_string().into_encoded_bytes()).unwrap();

    unsafe {
        // The file is zero length, so any poke at the mapping faults
        let bus_fd = libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o666);
        let mapping = std::slice::from_raw_parts_mut(
            libc::mmap(
                std::ptr::null_mut(),
                128,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                bus_fd,
                0,
            )
            .cast::<u8>(),
            128,
        );

        println!("{}", mapping[1]);
    }
}

fn divide_by_zero() {
    let ohno: u32;

    unsafe {
        #[cfg(target_arch = "x86_64")]
        {
            asm!(
                "mov eax, 1",
                "cdq",
                "mov {div:e}, 0",
                "idiv {div:e}",
                div = out(reg) ohno,
            );
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            // Integer division by zero does not fault on eg. aarch64, the
            // closest we can get is delivering the signal directly
            libc::raise(libc::SIGFPE);
            ohno = 0;
        }
    }

    println!("crashing via an arithmetic fault: {ohno}");
}

fn illegal_instruction() {
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("ud2");

        #[cfg(target_arch = "aarch64")]
        asm!("udf #0");
    }
}

fn trap() {
    unsafe {
        #[cfg(target_arch = "x86_64")]
        asm!("int3");

        #[cfg(target_arch = "aarch64")]
        asm!("brk #0");
    }
}

fn stack_overflow() {
    let mut big_boi = [0u8; 9 * 1024 * 1024];
    big_boi[big_boi.len() - 1] = 1;

    println!("{:?}", &big_boi[big_boi.len() - 20..]);
}
