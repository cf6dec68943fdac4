use std::collections::BTreeMap;

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::LabeledDataset;
use crate::{
    config::SplitConfig,
    error::{ReportCardError, Result},
};

/// Smallest dataset that yields three non-empty splits.
const MIN_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Splits {
    pub train: LabeledDataset,
    pub val: LabeledDataset,
    pub test: LabeledDataset,
}

/// Row and label counts per split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitsSummary {
    pub n_total: usize,
    pub n_train: usize,
    pub n_val: usize,
    pub n_test: usize,
    pub label_counts_total: BTreeMap<String, usize>,
    pub label_counts_train: BTreeMap<String, usize>,
    pub label_counts_val: BTreeMap<String, usize>,
    pub label_counts_test: BTreeMap<String, usize>,
    /// Training label space, in index order.
    pub labels: Vec<String>,
}

impl Splits {
    pub fn summary(&self, labels: &[String]) -> SplitsSummary {
        let mut total = self.train.label_counts();
        for split in [&self.val, &self.test] {
            for (label, count) in split.label_counts() {
                *total.entry(label).or_insert(0) += count;
            }
        }
        SplitsSummary {
            n_total: self.train.len() + self.val.len() + self.test.len(),
            n_train: self.train.len(),
            n_val: self.val.len(),
            n_test: self.test.len(),
            label_counts_total: total,
            label_counts_train: self.train.label_counts(),
            label_counts_val: self.val.label_counts(),
            label_counts_test: self.test.label_counts(),
            labels: labels.to_vec(),
        }
    }
}

/// Split into train/val/test: first `test_size` of all rows, then
/// `val_size / (1 - test_size)` of the remainder for validation.
///
/// Held-out sizes round up, never consume a whole partition, and rows keep
/// their input order within each split.
pub fn split_dataset(dataset: &LabeledDataset, config: &SplitConfig) -> Result<Splits> {
    config.validate()?;
    if dataset.len() < MIN_ROWS {
        return Err(ReportCardError::TooFewRows {
            needed: MIN_ROWS,
            found: dataset.len(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let all: Vec<usize> = (0..dataset.len()).collect();
    let (train_val, test) = holdout(
        dataset.labels(),
        &all,
        config.test_size,
        config.stratify,
        &mut rng,
    );
    let (train, val) = holdout(
        dataset.labels(),
        &train_val,
        config.relative_val_size(),
        config.stratify,
        &mut rng,
    );

    info!(
        n_train = train.len(),
        n_val = val.len(),
        n_test = test.len(),
        seed = config.seed,
        "Split dataset"
    );
    Ok(Splits {
        train: dataset.select(&train),
        val: dataset.select(&val),
        test: dataset.select(&test),
    })
}

/// Partition `indices` into `(kept, held_out)` with `ceil(fraction * n)` held
/// out, clamped to `[1, n - 1]`.
fn holdout(
    labels: &[String],
    indices: &[usize],
    fraction: f64,
    stratify: bool,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let n = indices.len();
    let n_held = ((fraction * n as f64).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        groups.entry(labels[i].as_str()).or_default().push(i);
    }

    let stratified = stratify && can_stratify(&groups, n, n_held);
    let mut held = Vec::with_capacity(n_held);
    let mut kept = Vec::with_capacity(n - n_held);

    if stratified {
        let counts: Vec<usize> = groups.values().map(Vec::len).collect();
        let allocation = allocate(&counts, n_held);
        for (mut members, take) in groups.into_values().zip(allocation) {
            members.shuffle(rng);
            held.extend_from_slice(&members[..take]);
            kept.extend_from_slice(&members[take..]);
        }
    } else {
        let mut shuffled = indices.to_vec();
        shuffled.shuffle(rng);
        held.extend_from_slice(&shuffled[..n_held]);
        kept.extend_from_slice(&shuffled[n_held..]);
    }

    held.sort_unstable();
    kept.sort_unstable();
    (kept, held)
}

fn can_stratify(groups: &BTreeMap<&str, Vec<usize>>, n: usize, n_held: usize) -> bool {
    let n_classes = groups.len();
    if n_classes < 2 {
        warn!(n_classes, "Fewer than two classes, splitting without stratification");
        return false;
    }
    if let Some((label, members)) = groups.iter().find(|(_, members)| members.len() < 2) {
        warn!(
            label = *label,
            count = members.len(),
            "Class has fewer than two rows, splitting without stratification"
        );
        return false;
    }
    if n_held < n_classes || n - n_held < n_classes {
        warn!(
            n_classes,
            n_held,
            n_kept = n - n_held,
            "Partition too small to hold every class, splitting without stratification"
        );
        return false;
    }
    true
}

/// Largest-remainder allocation of `total` held-out rows across classes,
/// proportional to `counts`. Remainder ties go to the earlier class.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * total as f64 / n as f64)
        .collect();
    let mut allocation: Vec<usize> = exact.iter().map(|&x| x.floor() as usize).collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut remaining = total.saturating_sub(allocation.iter().sum());
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if allocation[class] < counts[class] {
            allocation[class] += 1;
            remaining -= 1;
        }
    }
    allocation
}
