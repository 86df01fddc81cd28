//! Reentrant primitives that are safe to call from within a signal handler.
//!
//! Nothing in this module allocates, takes a lock, or calls a non-reentrant
//! libc function; the fault handler is built entirely on top of these. The
//! [signal-safety](https://man7.org/linux/man-pages/man7/signal-safety.7.html)
//! list permits raw `write(2)` and plain memory access, and little else.

use libc::c_int;

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Worst case is a `u64` rendered in base 2.
const MAX_DIGITS: usize = 64;

/// Renders `value` in the given base as lowercase text, most-significant
/// digit first, into `out`, returning the rendered prefix of `out`.
///
/// Zero is rendered as `"0"`. If `out` cannot hold every digit the value is
/// silently truncated to the most-significant digits that fit; a fault
/// handler has no safe way to surface that, so the bound is accepted rather
/// than reported.
pub fn encode_uint(value: u64, base: u64, out: &mut [u8]) -> &str {
    debug_assert!((2..=16).contains(&base));

    let mut tmp = [0u8; MAX_DIGITS];
    let mut n = 0;

    if value == 0 {
        tmp[0] = b'0';
        n = 1;
    } else {
        let mut v = value;
        while v > 0 && n < MAX_DIGITS {
            tmp[n] = DIGITS[(v % base) as usize];
            v /= base;
            n += 1;
        }
    }

    // Digits were produced least-significant first, reverse them out.
    let len = n.min(out.len());
    for (i, slot) in out[..len].iter_mut().enumerate() {
        *slot = tmp[n - 1 - i];
    }

    // SAFETY: only ASCII digits are ever written above
    unsafe { std::str::from_utf8_unchecked(&out[..len]) }
}

/// Copies `src` into `dst` as a NUL-terminated C string, returning the
/// number of data bytes copied.
///
/// At most `dst.len() - 1` bytes are copied and `dst` is always
/// NUL-terminated within its capacity. An interior NUL in `src` ends the
/// copy early. Only used outside the fault path, to stage the artifact
/// path for the fault-time `open(2)`.
pub fn copy_cstr(src: &[u8], dst: &mut [u8]) -> usize {
    if dst.is_empty() {
        return 0;
    }

    let mut i = 0;
    while i < src.len() && i < dst.len() - 1 && src[i] != 0 {
        dst[i] = src[i];
        i += 1;
    }
    dst[i] = 0;
    i
}

/// Issues a single unchecked `write(2)` of `bytes` to `fd`.
///
/// No-ops on a negative descriptor or an empty slice. A failed or partial
/// write is not retried, the caller is already in a best-effort regime.
pub fn write_raw(fd: c_int, bytes: &[u8]) {
    if fd < 0 || bytes.is_empty() {
        return;
    }

    unsafe {
        libc::write(fd, bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_bases() {
        let mut buf = [0u8; MAX_DIGITS];
        for base in 2..=16u64 {
            for &v in &[0u64, 1, 7, 42, 255, 4096, 0xdead_beef, u64::MAX] {
                let s = encode_uint(v, base, &mut buf);
                assert_eq!(u64::from_str_radix(s, base as u32), Ok(v), "base {base}");
            }
        }
    }

    #[test]
    fn zero_is_special_cased() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_uint(0, 16, &mut buf), "0");
    }

    #[test]
    fn hex_is_lowercase_with_no_padding() {
        let mut buf = [0u8; 32];
        assert_eq!(encode_uint(0xdead_beef, 16, &mut buf), "deadbeef");
        assert_eq!(encode_uint(0x1, 16, &mut buf), "1");
    }

    #[test]
    fn truncation_keeps_most_significant_digits() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_uint(0x0012_3456, 16, &mut buf), "1234");
    }

    #[test]
    fn copy_fits_and_terminates() {
        let mut dst = [0xffu8; 8];
        let n = copy_cstr(b"crash", &mut dst);
        assert_eq!(n, 5);
        assert_eq!(&dst[..6], b"crash\0");
    }

    #[test]
    fn copy_never_exceeds_capacity() {
        let mut dst = [0xffu8; 4];
        let n = copy_cstr(b"overlong", &mut dst);
        assert_eq!(n, 3);
        assert_eq!(&dst, b"ove\0");
    }

    #[test]
    fn copy_stops_at_interior_nul() {
        let mut dst = [0xffu8; 8];
        let n = copy_cstr(b"ab\0cd", &mut dst);
        assert_eq!(n, 2);
        assert_eq!(&dst[..3], b"ab\0");
    }

    #[test]
    fn write_ignores_invalid_descriptor() {
        write_raw(-1, b"nothing to see");
    }
}
