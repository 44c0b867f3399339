use rand::seq::SliceRandom;
use rand::Rng;

/// Draw `sample_size` distinct indices uniformly from `0..population_size`.
///
/// The full index range is shuffled and its prefix is returned, so every subset
/// of the requested size is equally likely.
///
/// # Arguments
///
/// * `rng` - The random number generator driving the shuffle.
/// * `population_size` - The number of elements to draw from.
/// * `sample_size` - The number of indices to return.
///
/// PRECONDITION: `population_size >= sample_size`.
///
/// Example:
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use stereo_ransac::sampler::pick_random_index;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let indices = pick_random_index(&mut rng, 10, 3);
/// assert_eq!(indices.len(), 3);
/// assert!(indices.iter().all(|&i| i < 10));
/// ```
pub fn pick_random_index<R: Rng + ?Sized>(
    rng: &mut R,
    population_size: usize,
    sample_size: usize,
) -> Vec<usize> {
    let mut indices = Vec::with_capacity(population_size);
    pick_random_index_into(rng, population_size, sample_size, &mut indices);
    indices
}

/// Same as [`pick_random_index`] but reuses the allocation of `indices`.
///
/// On return `indices` holds exactly `sample_size` elements.
pub fn pick_random_index_into<R: Rng + ?Sized>(
    rng: &mut R,
    population_size: usize,
    sample_size: usize,
    indices: &mut Vec<usize>,
) {
    assert!(
        population_size >= sample_size,
        "cannot draw {sample_size} distinct indices from a population of {population_size}"
    );

    indices.clear();
    indices.extend(0..population_size);
    indices.shuffle(rng);
    indices.truncate(sample_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_pick_random_index_distinct_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let mut indices = pick_random_index(&mut rng, 12, 5);
            assert_eq!(indices.len(), 5);
            assert!(indices.iter().all(|&i| i < 12));
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices.len(), 5);
        }
    }

    #[test]
    fn test_pick_random_index_full_population() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut indices = pick_random_index(&mut rng, 6, 6);
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_pick_random_index_empty_sample() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_random_index(&mut rng, 4, 0).is_empty());
    }

    #[test]
    fn test_pick_random_index_uniform() {
        let mut rng = StdRng::seed_from_u64(42);
        let population = 10;
        let draws = 20_000;
        let mut counts = vec![0usize; population];
        let mut buffer = Vec::new();
        for _ in 0..draws {
            pick_random_index_into(&mut rng, population, 3, &mut buffer);
            for &i in &buffer {
                counts[i] += 1;
            }
        }

        // every index is expected 3 / 10 of the time
        let expected = draws as f64 * 3.0 / population as f64;
        for count in counts {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(deviation < 0.05, "count {count} too far from {expected}");
        }
    }

    #[test]
    fn test_pick_random_index_seeded_is_reproducible() {
        let a = pick_random_index(&mut StdRng::seed_from_u64(3), 50, 4);
        let b = pick_random_index(&mut StdRng::seed_from_u64(3), 50, 4);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic]
    fn test_pick_random_index_oversized_sample() {
        let mut rng = StdRng::seed_from_u64(0);
        pick_random_index(&mut rng, 2, 3);
    }
}
