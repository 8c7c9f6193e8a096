//! Shared discretized time axis for hazard outputs.

use crate::error::RsfError;
use crate::labels::SurvivalLabels;

/// Largest number of time points a timeline may hold.
pub const MAX_TIMELINE_POINTS: usize = 1 << 24;

/// Integer time points from the smallest to the largest observed time, step 1.
///
/// Built once per fit and shared read-only by every tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timeline {
    points: Vec<f64>,
}

impl Timeline {
    /// Derive the timeline from the observed label times.
    ///
    /// Spans `floor(min)..=ceil(max)`, so every observed time falls inside it.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::ResourceExhausted`] when the span exceeds
    /// [`MAX_TIMELINE_POINTS`] or cannot be allocated.
    pub fn from_labels(labels: &SurvivalLabels) -> Result<Self, RsfError> {
        let (lo, hi) = labels.time_range();
        Self::from_range(lo.floor() as i64, hi.ceil() as i64)
    }

    /// Build the inclusive integer range `start..=end`.
    ///
    /// An inverted range yields the single point `start`.
    ///
    /// # Errors
    ///
    /// Same as [`Timeline::from_labels`].
    pub fn from_range(start: i64, end: i64) -> Result<Self, RsfError> {
        let end = end.max(start);
        let too_long = || RsfError::ResourceExhausted {
            reason: format!("timeline {start}..={end} exceeds {MAX_TIMELINE_POINTS} points"),
        };
        let len = end
            .checked_sub(start)
            .and_then(|span| usize::try_from(span).ok())
            .and_then(|span| span.checked_add(1))
            .filter(|&len| len <= MAX_TIMELINE_POINTS)
            .ok_or_else(too_long)?;

        let mut points = Vec::new();
        points
            .try_reserve_exact(len)
            .map_err(|e| RsfError::ResourceExhausted {
                reason: format!("timeline of {len} points: {e}"),
            })?;
        points.extend((start..=end).map(|t| t as f64));
        Ok(Self { points })
    }

    /// Return the time points.
    #[must_use]
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Return the number of time points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` if the timeline has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return the first time point.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.points.first().copied().unwrap_or(0.0)
    }

    /// Return the last time point.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.points.last().copied().unwrap_or(0.0)
    }

    /// Nelson-Aalen cumulative hazard of `rows` evaluated at every time point.
    ///
    /// `rows` may repeat indices (bootstrap multisets); each occurrence counts
    /// once in the risk set. Returns all zeros when `rows` has no events.
    #[must_use]
    pub fn nelson_aalen(&self, labels: &SurvivalLabels, rows: &[usize]) -> Vec<f64> {
        let mut observed: Vec<(f64, bool)> = rows
            .iter()
            .filter_map(|&r| labels.get(r).map(|l| (l.time, l.event)))
            .collect();
        observed.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (event time, hazard increment) in ascending time order.
        let mut increments: Vec<(f64, f64)> = Vec::new();
        let mut at_risk = observed.len();
        let mut i = 0;
        while i < observed.len() {
            let t = observed[i].0;
            let mut deaths = 0usize;
            let mut group = 0usize;
            while i < observed.len() && observed[i].0 == t {
                if observed[i].1 {
                    deaths += 1;
                }
                group += 1;
                i += 1;
            }
            if deaths > 0 {
                increments.push((t, deaths as f64 / at_risk as f64));
            }
            at_risk -= group;
        }

        let mut chf = Vec::with_capacity(self.points.len());
        let mut cumulative = 0.0;
        let mut next = 0;
        for &point in &self.points {
            while next < increments.len() && increments[next].0 <= point {
                cumulative += increments[next].1;
                next += 1;
            }
            chf.push(cumulative);
        }
        chf
    }
}
