//! Proof-of-work search.
//!
//! A nonce is valid when the block hash starts with `difficulty` zero hex
//! digits. The parallel search splits the nonce space into strides, one per
//! worker, and stops every worker as soon as one of them succeeds.

use crate::core::block::{Block, BlockTemplate};
use crate::types::hash::{HASH_HEX_LEN, Hash, HashBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("difficulty must be positive")]
    NonPositiveDifficulty,
    #[error("difficulty {0} exceeds the 64 hex digits of a hash")]
    DifficultyTooHigh(u32),
    #[error("cannot commit an empty batch of transactions")]
    EmptyBatch,
    #[error("no nonce satisfies difficulty {difficulty} for block {index}")]
    NonceSpaceExhausted { index: u64, difficulty: u32 },
}

/// Validated count of leading zero hex digits, in `1..=64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Difficulty(u32);

impl Difficulty {
    pub const MAX: u32 = HASH_HEX_LEN as u32;

    pub fn new(digits: u32) -> Result<Self, ConsensusError> {
        match digits {
            0 => Err(ConsensusError::NonPositiveDifficulty),
            d if d > Self::MAX => Err(ConsensusError::DifficultyTooHigh(d)),
            d => Ok(Self(d)),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_met_by(self, hash: &Hash) -> bool {
        hash.meets_difficulty(self.0)
    }
}

/// Tries `start`, `start + stride`, ... until a hash meets `difficulty`,
/// `stop` is raised, or the nonce space runs out.
fn search(
    prefix: &HashBuilder,
    difficulty: Difficulty,
    start: u64,
    stride: u64,
    stop: Option<&AtomicBool>,
) -> Option<(u64, Hash)> {
    let mut nonce = start;
    loop {
        if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
            return None;
        }
        let hash = BlockTemplate::hash_from_prefix(prefix, nonce);
        if difficulty.is_met_by(&hash) {
            return Some((nonce, hash));
        }
        nonce = nonce.checked_add(stride)?;
    }
}

/// Single-threaded search from nonce 0 upward.
pub fn mine(template: BlockTemplate, difficulty: Difficulty) -> Result<Block, ConsensusError> {
    let prefix = template.hash_prefix();
    match search(&prefix, difficulty, 0, 1, None) {
        Some((nonce, hash)) => Ok(template.seal(nonce, hash)),
        None => Err(exhausted(&template, difficulty)),
    }
}

/// Search with `threads` workers; worker `k` tries nonces `k, k + n, k + 2n, ...`.
///
/// The first worker to claim the shared stop flag wins. Its result is read
/// only after every worker has joined.
pub fn mine_parallel(
    template: BlockTemplate,
    difficulty: Difficulty,
    threads: usize,
) -> Result<Block, ConsensusError> {
    if threads <= 1 {
        return mine(template, difficulty);
    }
    let prefix = template.hash_prefix();
    let stop = AtomicBool::new(false);
    let stride = threads as u64;

    let winner = thread::scope(|s| {
        let workers: Vec<_> = (0..stride)
            .map(|k| {
                let (prefix, stop) = (&prefix, &stop);
                s.spawn(move || {
                    let found = search(prefix, difficulty, k, stride, Some(stop))?;
                    stop.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                        .then_some(found)
                })
            })
            .collect();
        workers
            .into_iter()
            .filter_map(|w| w.join().ok().flatten())
            .next()
    });

    match winner {
        Some((nonce, hash)) => Ok(template.seal(nonce, hash)),
        None => Err(exhausted(&template, difficulty)),
    }
}

fn exhausted(template: &BlockTemplate, difficulty: Difficulty) -> ConsensusError {
    ConsensusError::NonceSpaceExhausted {
        index: template.header().index,
        difficulty: difficulty.get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash::Hash;
    use crate::utils::test_utils::utils::transfer;

    fn template() -> BlockTemplate {
        BlockTemplate::regular(1, 1_700_000_000, Hash::zero(), vec![transfer("alice", "bob", 1000)])
            .unwrap()
    }

    #[test]
    fn difficulty_bounds() {
        assert_eq!(Difficulty::new(0), Err(ConsensusError::NonPositiveDifficulty));
        assert_eq!(Difficulty::new(65), Err(ConsensusError::DifficultyTooHigh(65)));
        assert_eq!(Difficulty::new(1).unwrap().get(), 1);
        assert_eq!(Difficulty::new(64).unwrap().get(), 64);
    }

    #[test]
    fn sequential_mining_finds_smallest_nonce() {
        let difficulty = Difficulty::new(2).unwrap();
        let block = mine(template(), difficulty).unwrap();
        assert!(block.hash().to_hex().starts_with("00"));
        assert_eq!(block.compute_hash(), block.hash());

        let t = template();
        for nonce in 0..block.nonce() {
            assert!(!difficulty.is_met_by(&t.hash_with_nonce(nonce)));
        }
    }

    #[test]
    fn parallel_mining_yields_valid_block() {
        let difficulty = Difficulty::new(2).unwrap();
        let block = mine_parallel(template(), difficulty, 4).unwrap();
        assert!(difficulty.is_met_by(&block.hash()));
        assert_eq!(block.compute_hash(), block.hash());
        assert_eq!(block.index(), 1);
    }

    #[test]
    fn single_thread_parallel_equals_sequential() {
        let difficulty = Difficulty::new(1).unwrap();
        let a = mine(template(), difficulty).unwrap();
        let b = mine_parallel(template(), difficulty, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn genesis_is_deterministic() {
        let difficulty = Difficulty::new(2).unwrap();
        let a = mine(BlockTemplate::genesis(), difficulty).unwrap();
        let b = mine(BlockTemplate::genesis(), difficulty).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.nonce(), b.nonce());
    }
}
