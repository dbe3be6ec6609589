//! Constant-time byte comparison.

use subtle::ConstantTimeEq;

/// Compares two byte strings without leaking where they first differ.
///
/// `subtle` folds the XOR of every byte pair into one accumulator, so the
/// running time depends only on the length. Lengths aren't secret (a
/// signature or derived key has a fixed size), but a mismatch still runs a
/// full-length comparison before failing, so both failure paths cost the
/// same.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        std::hint::black_box(a.ct_eq(a));
        return false;
    }
    a.ct_eq(b).into()
}
