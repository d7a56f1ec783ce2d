//! 7-bag randomizer for piece generation
//!
//! All 7 pieces are shuffled and dealt out before reshuffling. The queue is
//! topped up with whole bags whenever fewer than `MIN_LOOKAHEAD` remain.

use crate::tetromino::TetrominoType;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// Refill threshold for the preview queue
pub const MIN_LOOKAHEAD: usize = 10;

/// The 7-bag piece randomizer
#[derive(Debug, Clone)]
pub struct Bag {
    /// Preview queue for upcoming pieces
    queue: VecDeque<TetrominoType>,
    rng: ChaCha8Rng,
}

impl Default for Bag {
    fn default() -> Self {
        Self::new()
    }
}

impl Bag {
    /// Create a new bag randomizer with a random seed
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Create a bag whose sequence is fully determined by `seed`
    pub fn with_seed(seed: u64) -> Self {
        let mut bag = Self {
            queue: VecDeque::with_capacity(MIN_LOOKAHEAD + 7),
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        bag.top_up();
        bag
    }

    /// Get the next piece from the queue
    pub fn next(&mut self) -> TetrominoType {
        self.top_up();
        // top_up guarantees at least MIN_LOOKAHEAD pieces
        let piece = self.queue.pop_front().unwrap_or(TetrominoType::I);
        self.top_up();
        piece
    }

    /// Preview the next N pieces without removing them
    pub fn preview(&self, count: usize) -> Vec<TetrominoType> {
        self.queue.iter().take(count).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn top_up(&mut self) {
        while self.queue.len() < MIN_LOOKAHEAD {
            self.refill();
        }
    }

    /// Append a new shuffled bag
    fn refill(&mut self) {
        let mut new_bag = TetrominoType::all();
        new_bag.shuffle(&mut self.rng);
        self.queue.extend(new_bag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bag_contains_all_pieces() {
        let mut bag = Bag::with_seed(42);
        // Bag boundaries fall on multiples of 7 draws
        for _ in 0..20 {
            let pieces: HashSet<_> = (0..7).map(|_| bag.next()).collect();
            assert_eq!(pieces.len(), 7);
        }
    }

    #[test]
    fn test_lookahead_never_drops_below_minimum() {
        let mut bag = Bag::with_seed(1);
        for _ in 0..100 {
            assert!(bag.len() >= MIN_LOOKAHEAD);
            let _ = bag.next();
        }
    }

    #[test]
    fn test_preview_matches_draws() {
        let mut bag = Bag::with_seed(9);
        let preview = bag.preview(5);
        assert_eq!(preview.len(), 5);
        let drawn: Vec<_> = (0..5).map(|_| bag.next()).collect();
        assert_eq!(preview, drawn);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Bag::with_seed(1234);
        let mut b = Bag::with_seed(1234);
        for _ in 0..50 {
            assert_eq!(a.next(), b.next());
        }
    }
}
