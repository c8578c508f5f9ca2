use rand::Rng;
use rand::seq::SliceRandom;

/// Uniformly random ordering of the positions `0..len` (Fisher-Yates).
pub fn shuffled_positions<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}
