//! Glue to the platform unwinder for collecting raw program counters.
//!
//! This drives `_Unwind_Backtrace` from the unwind runtime that Rust already
//! links for its own panics, so no extra library is pulled in. Only the
//! instruction pointer of each frame is read; nothing here allocates or
//! locks, making the walk safe to perform from inside the fault handler.

use libc::{c_int, c_void};

/// Opaque cursor handed to the trace callback by the unwinder.
#[repr(C)]
pub struct UnwindContext {
    _opaque: [u8; 0],
}

type UnwindReasonCode = c_int;

const URC_NO_REASON: UnwindReasonCode = 0;
const URC_END_OF_STACK: UnwindReasonCode = 5;

type UnwindTraceFn =
    unsafe extern "C" fn(ctx: *mut UnwindContext, arg: *mut c_void) -> UnwindReasonCode;

unsafe extern "C" {
    fn _Unwind_Backtrace(trace: UnwindTraceFn, arg: *mut c_void) -> UnwindReasonCode;
    fn _Unwind_GetIP(ctx: *mut UnwindContext) -> usize;
}

struct TraceState {
    frames: *mut usize,
    cap: usize,
    len: usize,
}

unsafe extern "C" fn record_frame(ctx: *mut UnwindContext, arg: *mut c_void) -> UnwindReasonCode {
    let state = unsafe { &mut *arg.cast::<TraceState>() };

    if state.len >= state.cap {
        return URC_END_OF_STACK;
    }

    // A zero IP marks a frame the unwinder could not resolve, not the end
    // of the stack; skip it and keep walking.
    let pc = unsafe { _Unwind_GetIP(ctx) };
    if pc != 0 {
        unsafe {
            *state.frames.add(state.len) = pc;
        }
        state.len += 1;
    }

    URC_NO_REASON
}

/// Walks the current call stack, filling `frames` with program counters
/// innermost-first, and returns the number of frames captured.
///
/// The walk stops at the capacity of `frames` or at the top of the stack,
/// whichever comes first. Reentrant and non-allocating.
pub fn capture(frames: &mut [usize]) -> usize {
    let mut state = TraceState {
        frames: frames.as_mut_ptr(),
        cap: frames.len(),
        len: 0,
    };

    unsafe {
        _Unwind_Backtrace(record_frame, (&mut state as *mut TraceState).cast());
    }

    state.len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn snapshot(cap: usize) -> Vec<usize> {
        let mut frames = [0usize; 64];
        let n = capture(&mut frames[..cap]);
        frames[..n].to_vec()
    }

    #[inline(never)]
    fn nested_inner(cap: usize) -> Vec<usize> {
        snapshot(cap)
    }

    #[inline(never)]
    fn nested_outer(cap: usize) -> Vec<usize> {
        nested_inner(cap)
    }

    #[test]
    fn respects_capacity() {
        let frames = nested_outer(4);
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|&pc| pc != 0));
    }

    #[test]
    fn shallow_stack_fills_fewer_than_capacity() {
        // A fresh thread only has a handful of live frames
        let frames = std::thread::spawn(|| snapshot(64)).join().unwrap();
        assert!(!frames.is_empty());
        assert!(frames.len() < 64);
    }

    #[test]
    fn repeated_captures_from_one_call_site_agree() {
        let mut runs = Vec::new();
        for _ in 0..2 {
            runs.push(nested_outer(8));
        }
        assert_eq!(runs[0], runs[1]);
    }
}
