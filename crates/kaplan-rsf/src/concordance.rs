//! Rank-based scoring of risk predictions against censored outcomes.

use std::fmt;

/// A scoring function over (time, risk, event) triples.
///
/// Used for the OOB score and for the fuzzy-aggregate diagnostic. Implement
/// this to swap Harrell's C for another metric.
pub trait SurvivalMetric: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Score `risks` against observed `times` and `events`.
    ///
    /// Higher risk means an earlier expected event. Returns `None` when the
    /// score is undefined for this input.
    fn score(&self, times: &[f64], risks: &[f64], events: &[bool]) -> Option<f64>;
}

/// Harrell's concordance index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarrellConcordance;

impl SurvivalMetric for HarrellConcordance {
    fn name(&self) -> &'static str {
        "harrell_c"
    }

    fn score(&self, times: &[f64], risks: &[f64], events: &[bool]) -> Option<f64> {
        concordance_index(times, risks, events)
    }
}

/// Compute Harrell's C over all comparable pairs.
///
/// A pair `(i, j)` is comparable when `times[i] < times[j]` and sample `i`
/// had the event. It is concordant when `risks[i] > risks[j]`; tied risks
/// count one half. Returns `None` when the slices differ in length or no
/// pair is comparable.
#[must_use]
pub fn concordance_index(times: &[f64], risks: &[f64], events: &[bool]) -> Option<f64> {
    let n = times.len();
    if risks.len() != n || events.len() != n {
        return None;
    }

    let mut concordant = 0.0f64;
    let mut comparable = 0usize;
    for i in 0..n {
        if !events[i] {
            continue;
        }
        for j in 0..n {
            if times[i] < times[j] {
                comparable += 1;
                if risks[i] > risks[j] {
                    concordant += 1.0;
                } else if risks[i] == risks[j] {
                    concordant += 0.5;
                }
            }
        }
    }

    if comparable == 0 {
        None
    } else {
        Some(concordant / comparable as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ranking_scores_one() {
        let times = [1.0, 2.0, 3.0, 4.0];
        let risks = [4.0, 3.0, 2.0, 1.0];
        let events = [true, true, true, true];
        assert_eq!(concordance_index(&times, &risks, &events), Some(1.0));
    }

    #[test]
    fn reversed_ranking_scores_zero() {
        let times = [1.0, 2.0, 3.0];
        let risks = [1.0, 2.0, 3.0];
        let events = [true, true, true];
        assert_eq!(concordance_index(&times, &risks, &events), Some(0.0));
    }

    #[test]
    fn constant_risk_scores_half() {
        let times = [1.0, 2.0, 3.0];
        let risks = [0.7, 0.7, 0.7];
        let events = [true, false, true];
        assert_eq!(concordance_index(&times, &risks, &events), Some(0.5));
    }

    #[test]
    fn censored_samples_only_anchor_later_pairs() {
        // Sample 0 is censored first, so it forms no comparable pair of its own.
        let times = [1.0, 2.0, 3.0];
        let risks = [0.0, 2.0, 1.0];
        let events = [false, true, false];
        assert_eq!(concordance_index(&times, &risks, &events), Some(1.0));
    }

    #[test]
    fn no_comparable_pair_is_undefined() {
        let times = [1.0, 2.0];
        let risks = [0.1, 0.2];
        let events = [false, false];
        assert_eq!(concordance_index(&times, &risks, &events), None);
        assert_eq!(HarrellConcordance.score(&times, &risks, &events), None);
    }

    #[test]
    fn length_mismatch_is_undefined() {
        assert_eq!(concordance_index(&[1.0, 2.0], &[1.0], &[true, true]), None);
    }
}
