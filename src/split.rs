//! Stratified train/test split and k-fold partitioning
//!
//! Both partitions shuffle each class separately with a seeded RNG and then
//! deal the members out, so every part keeps roughly the class proportions
//! of the input. The k-fold side is aprender's `StratifiedKFold`; aprender's
//! `train_test_split` is not stratified, so the holdout split is local.

use aprender::model_selection::StratifiedKFold;
use aprender::primitives::Vector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Indices of a train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// One cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Group `indices` by their label, preserving input order within a class
fn group_by_class(indices: &[usize], labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        groups.entry(labels[i]).or_default().push(i);
    }
    groups
}

/// Stratified split of all rows into train and test
///
/// Each class contributes `round(count * test_fraction)` rows to the test
/// set. Both index lists come back sorted.
pub fn stratified_train_test_split(
    labels: &[usize],
    test_fraction: f64,
    seed: u64,
) -> TrainTestSplit {
    let mut rng = StdRng::seed_from_u64(seed);
    let all: Vec<usize> = (0..labels.len()).collect();

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for (_, mut members) in group_by_class(&all, labels) {
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.min(members.len());
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    TrainTestSplit { train, test }
}

/// Stratified k-fold partition of `indices`
///
/// Each class is shuffled with `seed` and cut into `k` near-equal runs, one
/// per fold, so a class with fewer than `k` members leaves some folds
/// without it. Fold positions map back to row indices and both sides come
/// back sorted, which keeps the folds independent of aprender's hash-map
/// class order. Every index lands in exactly one validation set.
pub fn stratified_k_fold(indices: &[usize], labels: &[usize], k: usize, seed: u64) -> Vec<Fold> {
    let k = k.max(1);
    let y: Vec<f32> = indices.iter().map(|&i| labels[i] as f32).collect();
    let splitter = StratifiedKFold::new(k).with_random_state(seed);

    splitter
        .split(&Vector::from_vec(y))
        .into_iter()
        .map(|(train_pos, validation_pos)| {
            let to_rows = |positions: Vec<usize>| {
                let mut rows: Vec<usize> = positions.into_iter().map(|p| indices[p]).collect();
                rows.sort_unstable();
                rows
            };
            Fold {
                train: to_rows(train_pos),
                validation: to_rows(validation_pos),
            }
        })
        .collect()
}
