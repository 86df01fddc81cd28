use super::{CAUGHT_SIGNALS, MAX_BACKTRACE_DEPTH, Signal};
use crate::{Error, debug_print, safe, unwind};
use std::{
    cell::UnsafeCell,
    mem, ptr,
    sync::atomic::{AtomicBool, Ordering},
};

// std::cmp::max is not const :(
const fn get_stack_size() -> usize {
    if libc::SIGSTKSZ > 16 * 1024 {
        libc::SIGSTKSZ
    } else {
        16 * 1024
    }
}

/// The size of the alternate stack the fault handler runs on.
///
/// This has a minimum size of 16k, which might seem a bit large, but this
/// memory will only ever be committed in case we actually take a fault,
/// and it must be generous enough for the unwinder to walk a ruined stack.
const SIG_STACK_SIZE: usize = get_stack_size();

/// Capacity of the artifact path buffer, including the trailing NUL.
const PATH_CAP: usize = 256;

/// Scratch capacity for one hex-rendered value. 16 digits cover a 64-bit
/// address; the rest is slack.
const SCRATCH_CAP: usize = 24;

/// The process-wide fault registration.
///
/// Every capacity here is fixed at compile time and populated before the
/// armed flag is published; nothing is resized or reallocated afterwards,
/// which is what makes it legal for the fault handler to use.
struct Registration {
    /// NUL-terminated artifact path, staged for the fault-time `open(2)`
    path: [u8; PATH_CAP],
    /// Descriptor opened at arm time, the target if the fault-time open fails
    fallback_fd: libc::c_int,
    /// Scratch for rendering one hex value
    scratch: [u8; SCRATCH_CAP],
    /// Program counters filled in by the unwinder
    frames: [usize; MAX_BACKTRACE_DEPTH],
    /// Displaced actions, index-aligned with [`CAUGHT_SIGNALS`]; populated
    /// once at arm time, consulted exactly once per fault to re-chain
    old_actions: [mem::MaybeUninit<libc::sigaction>; 6],
}

struct RegCell(UnsafeCell<Registration>);

// SAFETY: written only while holding ARM_LOCK, before ARMED is released.
// The fault handler reads it without synchronization: taking a lock inside
// a signal handler risks self-deadlock if the faulting thread held it, and
// the process is already terminating, so a racy read of the forensic
// buffers is the accepted trade.
unsafe impl Sync for RegCell {}

static REGISTRATION: RegCell = RegCell(UnsafeCell::new(Registration {
    path: [0; PATH_CAP],
    fallback_fd: -1,
    scratch: [0; SCRATCH_CAP],
    frames: [0; MAX_BACKTRACE_DEPTH],
    old_actions: [mem::MaybeUninit::uninit(); 6],
}));

/// Uninitialized -> Armed, never back.
static ARMED: AtomicBool = AtomicBool::new(false);

/// Serializes arm attempts. Never touched on the fault path.
static ARM_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

pub(super) fn arm(path: &std::path::Path) -> Result<(), Error> {
    use std::os::unix::ffi::OsStrExt;

    let _lock = ARM_LOCK.lock();

    if ARMED.load(Ordering::Acquire) {
        return Err(Error::AlreadyArmed);
    }

    // SAFETY: the registration is only ever written here, serialized by
    // ARM_LOCK and strictly before ARMED is published.
    let reg = unsafe { &mut *REGISTRATION.0.get() };

    safe::copy_cstr(path.as_os_str().as_bytes(), &mut reg.path);

    // Best effort: on failure the fallback stays invalid and fault handling
    // degrades to "no artifact written" if the fault-time open fails too.
    reg.fallback_fd = unsafe {
        libc::open(
            reg.path.as_ptr().cast(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        )
    };

    // SAFETY: syscalls
    unsafe {
        install_sigaltstack()?;
        install_handlers(reg);
    }

    ARMED.store(true, Ordering::Release);

    Ok(())
}

/// Create an alternative stack to run the fault handler on. This is done
/// since the signal might have been caused by a stack overflow.
unsafe fn install_sigaltstack() -> Result<(), Error> {
    unsafe {
        // Check to see if the existing sigaltstack, and if it exists, is it
        // big enough. If so we don't need to allocate our own.
        let mut old_stack = mem::zeroed();
        if libc::sigaltstack(ptr::null(), &mut old_stack) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        if old_stack.ss_flags & libc::SS_DISABLE == 0 && old_stack.ss_size >= SIG_STACK_SIZE {
            return Ok(());
        }

        // ... but failing that we need to allocate our own, so do all that
        // here.
        let guard_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
        let alloc_size = guard_size + SIG_STACK_SIZE;

        let ptr = libc::mmap(
            ptr::null_mut(),
            alloc_size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return Err(Error::OutOfMemory);
        }

        // Prepare the stack with readable/writable memory past the guard
        // page and then register it with `sigaltstack`.
        let stack_ptr = (ptr as usize + guard_size) as *mut libc::c_void;
        if libc::mprotect(stack_ptr, SIG_STACK_SIZE, libc::PROT_READ | libc::PROT_WRITE) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let new_stack = libc::stack_t {
            ss_sp: stack_ptr,
            ss_flags: 0,
            ss_size: SIG_STACK_SIZE,
        };
        if libc::sigaltstack(&new_stack, ptr::null_mut()) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(())
    }
}

/// Installs the fault handler for every monitored signal, saving whatever
/// action was previously installed into the registration's table.
unsafe fn install_handlers(reg: &mut Registration) {
    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask);

        // Mask all monitored signals while we're handling one of them.
        for sig in CAUGHT_SIGNALS {
            libc::sigaddset(&mut sa.sa_mask, sig as i32);
        }

        sa.sa_sigaction = fault_handler as usize;
        sa.sa_flags = libc::SA_ONSTACK | libc::SA_SIGINFO;

        for (sig, slot) in CAUGHT_SIGNALS.iter().copied().zip(reg.old_actions.iter_mut()) {
            // At this point it is impractical to back out changes, and so
            // failure to install a signal is intentionally ignored; the
            // zeroed "old" action then restores to the default disposition.
            let mut old = mem::zeroed();
            let _ = libc::sigaction(sig as i32, &sa, &mut old);
            *slot = mem::MaybeUninit::new(old);
        }
    }
}

#[inline]
unsafe fn fault_address(info: *mut libc::siginfo_t) -> usize {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            let addr = unsafe { (*info).si_addr() };
        } else {
            let addr = unsafe { (*info).si_addr };
        }
    }

    addr as usize
}

/// This is the actual function installed for each monitored signal, invoked
/// by the kernel on the alternate stack.
///
/// Everything in here is best-effort and unchecked beyond "did open
/// succeed": a failed write never aborts the sequence, because the process
/// is already in a fatal-fault state where further error handling could
/// itself fault. Whatever happens, the displaced handler is restored and
/// the signal re-raised.
unsafe extern "C" fn fault_handler(
    sig: i32,
    info: *mut libc::siginfo_t,
    _uc: *mut libc::c_void,
) {
    unsafe {
        // Deliberately lock-free, see the safety note on RegCell.
        let reg = &mut *REGISTRATION.0.get();

        debug_print!("entered fault handler");

        // Prefer a fresh descriptor so the artifact is truncated and
        // rewritten even if an earlier fault already wrote one.
        let mut fd = libc::open(
            reg.path.as_ptr().cast(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        );
        if fd < 0 {
            fd = reg.fallback_fd;
        }

        if fd >= 0 {
            let name = Signal::from_raw(sig).map_or("UNKNOWN", Signal::name);
            safe::write_raw(fd, name.as_bytes());
            safe::write_raw(fd, b"\n");

            safe::write_raw(fd, b"0x");
            let hex = safe::encode_uint(fault_address(info) as u64, 16, &mut reg.scratch);
            safe::write_raw(fd, hex.as_bytes());
            safe::write_raw(fd, b"\n");

            debug_print!("wrote signal identity");

            let depth = unwind::capture(&mut reg.frames);
            for i in 0..depth {
                let pc = reg.frames[i];
                safe::write_raw(fd, b"0x");
                let hex = safe::encode_uint(pc as u64, 16, &mut reg.scratch);
                safe::write_raw(fd, hex.as_bytes());
                safe::write_raw(fd, b"\n");
            }

            debug_print!("wrote backtrace");

            // The fallback descriptor is left open for a possible later
            // fault; a fresh one is single use.
            if fd != reg.fallback_fd {
                libc::close(fd);
            }
        }

        // Re-chain: put back whatever action this signal had before arming.
        if let Some(index) = CAUGHT_SIGNALS.iter().position(|s| *s as i32 == sig) {
            let _ = libc::sigaction(sig, reg.old_actions[index].as_ptr(), ptr::null_mut());
        }

        debug_print!("restored displaced handler, re-raising");

        // The signal is blocked while this handler runs, so the re-raise is
        // delivered once we return, landing on the restored handler or the
        // default disposition and reproducing the uninstrumented outcome.
        libc::raise(sig);
    }
}
