use std::sync::Mutex;

use erna_core::UserId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Source of the permutation applied to a waiting list before grouping.
///
/// Production uses [`RandomShuffle`]; tests inject [`SeededShuffle`] or
/// [`IdentityShuffle`] to get a known order.
pub trait Shuffle: Send + Sync {
    /// Permute `users` in place.
    fn shuffle(&self, users: &mut [UserId]);
}

/// Uniform Fisher-Yates shuffle on the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShuffle;

impl Shuffle for RandomShuffle {
    fn shuffle(&self, users: &mut [UserId]) {
        users.shuffle(&mut rand::thread_rng());
    }
}

/// Uniform shuffle driven by a seeded RNG; the same seed replays the same
/// sequence of permutations.
pub struct SeededShuffle {
    rng: Mutex<StdRng>,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Shuffle for SeededShuffle {
    fn shuffle(&self, users: &mut [UserId]) {
        // A poisoned RNG is still a valid RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        users.shuffle(&mut *rng);
    }
}

/// Leaves the waiting list in join order.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityShuffle;

impl Shuffle for IdentityShuffle {
    fn shuffle(&self, _users: &mut [UserId]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(n: usize) -> Vec<UserId> {
        (0..n).map(|i| UserId::parse(format!("u{i}")).unwrap()).collect()
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let mut a = users(20);
        let mut b = users(20);
        SeededShuffle::new(7).shuffle(&mut a);
        SeededShuffle::new(7).shuffle(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut shuffled = users(50);
        RandomShuffle.shuffle(&mut shuffled);
        let mut sorted = shuffled.clone();
        sorted.sort();
        let mut expected = users(50);
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn random_shuffle_reaches_every_ordering_of_three() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2000 {
            let mut u = users(3);
            RandomShuffle.shuffle(&mut u);
            seen.insert(u);
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn identity_keeps_order() {
        let mut u = users(5);
        IdentityShuffle.shuffle(&mut u);
        assert_eq!(u, users(5));
    }
}
