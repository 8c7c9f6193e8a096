use rand::Rng;
use rand::seq::index;

use crate::labels::SurvivalLabels;
use crate::node::FeatureIndex;

/// Admissibility limits for a candidate split.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitConstraints {
    /// Minimum rows on each side.
    pub(crate) min_leaf: usize,
    /// Minimum distinct event times on each side.
    pub(crate) unique_deaths: usize,
    /// Maximum thresholds evaluated per feature.
    pub(crate) max_candidates: usize,
}

/// Best split found for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Absolute standardized log-rank statistic.
    pub(crate) statistic: f64,
    /// Standard deviation of the split feature at this node.
    pub(crate) feature_std: f64,
    /// Rows going to the first (`<= threshold`) child.
    pub(crate) left_rows: Vec<usize>,
    /// Rows going to the second child.
    pub(crate) right_rows: Vec<usize>,
}

/// Count distinct event times among `rows` flagged by `mask`.
///
/// `rows` must be sorted by time.
fn distinct_event_times(labels: &SurvivalLabels, rows: &[usize], mask: impl Fn(usize) -> bool) -> usize {
    let mut count = 0usize;
    let mut last: Option<f64> = None;
    for (pos, &r) in rows.iter().enumerate() {
        let label = labels.as_slice()[r];
        if label.event && mask(pos) && last != Some(label.time) {
            count += 1;
            last = Some(label.time);
        }
    }
    count
}

/// Standardized two-sample log-rank statistic, `|O - E| / sqrt(V)`.
///
/// `sorted_rows` must be sorted by ascending time; `goes_left[i]` tells
/// whether `sorted_rows[i]` belongs to the first group. Returns 0 when the
/// variance vanishes.
pub(crate) fn log_rank_statistic(
    labels: &SurvivalLabels,
    sorted_rows: &[usize],
    goes_left: &[bool],
) -> f64 {
    let mut at_risk = sorted_rows.len() as f64;
    let mut at_risk_left = goes_left.iter().filter(|&&l| l).count() as f64;
    let mut observed = 0.0;
    let mut expected = 0.0;
    let mut variance = 0.0;

    let mut i = 0;
    while i < sorted_rows.len() {
        let t = labels.as_slice()[sorted_rows[i]].time;
        let (mut deaths, mut deaths_left) = (0.0, 0.0);
        let (mut group, mut group_left) = (0.0, 0.0);
        while i < sorted_rows.len() && labels.as_slice()[sorted_rows[i]].time == t {
            let left = goes_left[i];
            if labels.as_slice()[sorted_rows[i]].event {
                deaths += 1.0;
                if left {
                    deaths_left += 1.0;
                }
            }
            group += 1.0;
            if left {
                group_left += 1.0;
            }
            i += 1;
        }
        if deaths > 0.0 && at_risk > 1.0 {
            expected += deaths * at_risk_left / at_risk;
            variance += at_risk_left * (at_risk - at_risk_left) * deaths * (at_risk - deaths)
                / (at_risk * at_risk * (at_risk - 1.0));
            observed += deaths_left;
        }
        at_risk -= group;
        at_risk_left -= group_left;
    }

    if variance <= 0.0 {
        0.0
    } else {
        (observed - expected).abs() / variance.sqrt()
    }
}

/// Midpoints between consecutive distinct values, at most `max_candidates`
/// of them (sampled with `rng` when there are more).
fn candidate_thresholds(values: &mut Vec<f64>, max_candidates: usize, rng: &mut impl Rng) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    let mids: Vec<f64> = values.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    if mids.len() <= max_candidates {
        return mids;
    }
    let mut picked: Vec<usize> = index::sample(rng, mids.len(), max_candidates).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| mids[i]).collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}

/// Find the split with the largest log-rank statistic.
///
/// `columns[k]` holds the values of feature `feature_subset[k]` for every
/// training row. Returns `None` when no admissible split separates the rows.
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    feature_subset: &[usize],
    labels: &SurvivalLabels,
    rows: &[usize],
    constraints: SplitConstraints,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n = rows.len();
    if n < constraints.min_leaf.saturating_mul(2) {
        return None;
    }

    let mut sorted: Vec<usize> = rows.to_vec();
    sorted.sort_by(|&a, &b| labels.as_slice()[a].time.total_cmp(&labels.as_slice()[b].time));
    let node_deaths = distinct_event_times(labels, &sorted, |_| true);
    if node_deaths < constraints.unique_deaths.saturating_mul(2) {
        return None;
    }

    let mut best: Option<(usize, f64, f64)> = None; // (column, threshold, statistic)
    let mut goes_left = vec![false; n];

    for (k, column) in columns.iter().enumerate() {
        let mut node_values: Vec<f64> = sorted.iter().map(|&r| column[r]).collect();
        let thresholds = candidate_thresholds(&mut node_values, constraints.max_candidates, rng);

        for threshold in thresholds {
            let mut n_left = 0usize;
            for (slot, &r) in goes_left.iter_mut().zip(&sorted) {
                *slot = column[r] <= threshold;
                n_left += usize::from(*slot);
            }
            if n_left < constraints.min_leaf || n - n_left < constraints.min_leaf {
                continue;
            }
            let left_deaths = distinct_event_times(labels, &sorted, |pos| goes_left[pos]);
            let right_deaths = distinct_event_times(labels, &sorted, |pos| !goes_left[pos]);
            if left_deaths < constraints.unique_deaths || right_deaths < constraints.unique_deaths {
                continue;
            }

            let statistic = log_rank_statistic(labels, &sorted, &goes_left);
            if statistic > best.map_or(0.0, |b| b.2) {
                best = Some((k, threshold, statistic));
            }
        }
    }

    let (k, threshold, statistic) = best?;
    let column = &columns[k];
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().partition(|&&r| column[r] <= threshold);
    let node_values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();

    Some(SplitResult {
        feature: FeatureIndex::new(feature_subset[k]),
        threshold,
        statistic,
        feature_std: std_dev(&node_values),
        left_rows,
        right_rows,
    })
}
