//! Session identifier generation.
//!
//! Production code draws identifiers from a real RNG. Tests inject a
//! predetermined sequence so generated sessions are predictable.

use rand::Rng;

/// Unambiguous, address-safe alphabet: no `0/O` or `1/I/l` look-alikes.
pub const SESSION_ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz";

/// Length of generated session identifiers.
pub const SESSION_ID_LEN: usize = 12;

/// Source of new session identifiers.
pub trait SessionIdGenerator: Send + Sync {
    /// Returns a fresh identifier.
    fn next_id(&self) -> String;
}

/// Generator backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSessionIds;

impl SessionIdGenerator for RandomSessionIds {
    fn next_id(&self) -> String {
        let mut rng = rand::rng();
        (0..SESSION_ID_LEN)
            .map(|_| char::from(SESSION_ID_ALPHABET[rng.random_range(0..SESSION_ID_ALPHABET.len())]))
            .collect()
    }
}
