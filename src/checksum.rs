//! 32-bit checksums and rollout bucketing.
//!
//! Everything that needs a deterministic non-cryptographic hash goes through
//! this module: version-vector checksums, audit-record checksums, and the
//! percentage-rollout bucket. The function is a djb2 xor-variant over UTF-8
//! bytes with wrapping `u32` arithmetic:
//!
//! ```text
//! h(0)   = 5381
//! h(n+1) = (h(n) * 33) ^ byte(n)
//! ```
//!
//! The exact function is part of the interop contract: two nodes (or two
//! releases) must agree on every `(seed, key, user_id)` bucket, so the
//! pinned vectors in the tests below must never change. This is an
//! error-detection and distribution hash, not a signature.

/// djb2 xor-variant over the UTF-8 bytes of `input`.
#[must_use]
pub fn checksum32(input: &str) -> u32 {
    let mut hash: u32 = 5381;
    for byte in input.as_bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(*byte);
    }
    hash
}

/// Checksum rendered as 8 lowercase hex chars, zero-padded.
#[must_use]
pub fn checksum_hex(input: &str) -> String {
    format!("{:08x}", checksum32(input))
}

/// Rollout bucket in `[0, 100)` for `(seed, flag_key, user_id)`.
///
/// The hash input is `"{seed}:{flag_key}:{user_id}"`. Identical inputs map
/// to the same bucket on every node; a user is included in a rollout iff
/// `bucket < percentage`.
#[must_use]
pub fn rollout_bucket(seed: &str, flag_key: &str, user_id: &str) -> u32 {
    checksum32(&format!("{seed}:{flag_key}:{user_id}")) % 100
}
