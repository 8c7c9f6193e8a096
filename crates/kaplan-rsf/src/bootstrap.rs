//! Bootstrap resampling of training rows, one set per ensemble member.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// How each ensemble member's training rows are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum BootstrapMode {
    /// Draw `n_samples` rows uniformly with replacement.
    #[default]
    WithReplacement,
    /// Use every row exactly once. Leaves no out-of-bag samples.
    Identity,
}

/// The rows one tree was grown on.
///
/// `indices` is a multiset of row indices; `in_bag` marks which rows appear
/// at least once.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BootstrapSet {
    indices: Vec<usize>,
    in_bag: Vec<bool>,
}

impl BootstrapSet {
    /// Build a set from drawn row indices over a training set of `n_samples` rows.
    ///
    /// Indices outside `0..n_samples` are ignored in the membership bitmap.
    #[must_use]
    pub fn new(indices: Vec<usize>, n_samples: usize) -> Self {
        let mut in_bag = vec![false; n_samples];
        for &i in &indices {
            if let Some(slot) = in_bag.get_mut(i) {
                *slot = true;
            }
        }
        Self { indices, in_bag }
    }

    /// Return the drawn row indices, in draw order.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Return `true` if `sample` was drawn at least once.
    #[must_use]
    pub fn contains(&self, sample: usize) -> bool {
        self.in_bag.get(sample).copied().unwrap_or(false)
    }

    /// Return the rows never drawn, in ascending order.
    #[must_use]
    pub fn oob_indices(&self) -> Vec<usize> {
        self.in_bag
            .iter()
            .enumerate()
            .filter(|&(_, &inside)| !inside)
            .map(|(i, _)| i)
            .collect()
    }

    /// Return the size of the training set the set was drawn from.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.in_bag.len()
    }
}

/// Derive one seed per ensemble member from the forest-level seed.
///
/// Without a forest seed the master generator is seeded from OS entropy, so
/// the run is not reproducible.
#[must_use]
pub fn tree_seeds(random_state: Option<u64>, n_estimators: usize) -> Vec<u64> {
    let mut master = match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    (0..n_estimators).map(|_| master.r#gen()).collect()
}

/// Draw one bootstrap set per seed over `n_samples` training rows.
///
/// Always returns exactly `seeds.len()` sets.
#[must_use]
pub fn draw_bootstrap_samples(
    n_samples: usize,
    seeds: &[u64],
    mode: BootstrapMode,
) -> Vec<BootstrapSet> {
    seeds
        .iter()
        .map(|&seed| match mode {
            BootstrapMode::WithReplacement => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let indices = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                BootstrapSet::new(indices, n_samples)
            }
            BootstrapMode::Identity => BootstrapSet::new((0..n_samples).collect(), n_samples),
        })
        .collect()
}
