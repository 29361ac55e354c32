//! Deterministic random streams.
//!
//! All stochastic choices in the simulation (positional jitter, attack coin
//! flips, ancestor sampling, mutation, sensing noise) are drawn either from
//! the simulation's single root generator inside sequential code, or from a
//! per-worker substream inside parallel regions. A substream seed is derived
//! from the root seed plus a tuple of context tags (purpose, species,
//! generation, tick), and the per-item generator is seeded from that xor the
//! item index. This keeps the trajectory independent of thread scheduling:
//! the draw order within one worker is fixed and workers never share a
//! stream.

use rand::SeedableRng;

pub type DetRng = rand_pcg::Pcg64Mcg;

// purpose tags for stream derivation
pub const INIT: u64 = 1;
pub const MOVE: u64 = 2;
pub const SPROUT: u64 = 3;

/// splitmix64 finalizer, used only to spread the tag bits
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// derive a substream seed from the root seed and a tuple of context tags
pub fn stream_seed(root: u64, tags: [u64; 4]) -> u64 {
    tags.iter().fold(root, |s, &t| mix(s ^ t))
}

/// one more scrambling step, for a second stream from the same context
pub fn remix(seed: u64) -> u64 {
    mix(seed)
}

/// per-item generator within a derived stream
pub fn item_rng(stream: u64, index: usize) -> DetRng {
    // seed_from_u64 runs its own splitmix, so xor-ing the index is enough
    DetRng::seed_from_u64(stream ^ index as u64)
}
