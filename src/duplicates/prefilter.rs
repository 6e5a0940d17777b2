//! Coarse signature gate run before the full Hamming comparison.
//!
//! The signature is a single scalar: the number of set bits in the
//! perceptual hash. Two hashes whose set-bit counts differ by `k` differ in
//! at least `k` positions, so rejecting a pair whose count gap already
//! exceeds the allowed distance can never drop a real match. The check is
//! one subtraction per pair, against a popcount done once per image.

use serde::{Deserialize, Serialize};

use super::perceptual::PerceptualHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoarseSignature {
    ones: u32,
    bits: u32,
}

impl CoarseSignature {
    pub fn from_hash(hash: &PerceptualHash) -> Self {
        Self {
            ones: hash.as_bytes().iter().map(|b| b.count_ones()).sum(),
            bits: hash.bits(),
        }
    }

    /// Set bits in the underlying hash
    pub fn ones(&self) -> u32 {
        self.ones
    }

    /// Lower bound on the Hamming distance between the underlying hashes.
    /// Signatures of different widths give no bound.
    pub fn distance_bound(&self, other: &CoarseSignature) -> u32 {
        if self.bits != other.bits {
            return 0;
        }
        self.ones.abs_diff(other.ones)
    }
}

/// True when the pair cannot possibly be within `max_distance`
pub fn quick_reject(a: &CoarseSignature, b: &CoarseSignature, max_distance: u32) -> bool {
    a.distance_bound(b) > max_distance
}
