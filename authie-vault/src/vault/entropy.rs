//! Source of randomness for salts and IVs.
//!
//! The store takes this as a collaborator so tests can pin the bytes that
//! end up in storage.

use rand::RngCore;

/// Fills buffers with random bytes.
pub trait EntropySource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Thread-local CSPRNG seeded from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::rng().fill_bytes(dest);
    }
}

/// Deterministic bytes: a counter that advances on every byte handed out.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CountingEntropy {
    next: std::sync::atomic::AtomicU8,
}

#[cfg(test)]
impl EntropySource for CountingEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        use std::sync::atomic::Ordering;
        for byte in dest.iter_mut() {
            *byte = self.next.fetch_add(1, Ordering::Relaxed);
        }
    }
}
