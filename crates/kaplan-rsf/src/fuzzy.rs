//! Fuzzy membership tables and the fuzzy ensemble aggregate.
//!
//! Each tree exposes a [`FuzzyTable`]: one column per (node, kind, branch)
//! with one value per training row. Columns a tree never filled are treated
//! as explicit zero columns. The aggregate normalizes twice, first across a
//! tree's columns and then across trees, dividing only by the number of
//! nonzero contributors so an absent contribution never dilutes the mean.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::concordance::SurvivalMetric;
use crate::error::RsfError;
use crate::grower::HazardTree;
use crate::labels::SurvivalLabels;
use crate::node::NodeIndex;

/// Which hazard quantity a fuzzy column holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub enum ColumnKind {
    /// Membership-weighted child hazard at this node.
    Chf,
    /// Same, further weighted by the memberships accumulated along the path.
    AccumulatedChf,
}

/// Which child branch of a split a column refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub enum Branch {
    /// The `<= threshold` child.
    First,
    /// The `> threshold` child.
    Second,
}

/// Key of one fuzzy table column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FuzzyColumn {
    /// Node the column belongs to.
    pub node: NodeIndex,
    /// Hazard quantity.
    pub kind: ColumnKind,
    /// Child branch.
    pub branch: Branch,
}

impl FuzzyColumn {
    /// Create a column key.
    #[must_use]
    pub fn new(node: NodeIndex, kind: ColumnKind, branch: Branch) -> Self {
        Self { node, kind, branch }
    }

    /// The four columns every node contributes, in canonical order.
    #[must_use]
    pub fn canonical(node: NodeIndex) -> [FuzzyColumn; 4] {
        [
            FuzzyColumn::new(node, ColumnKind::Chf, Branch::First),
            FuzzyColumn::new(node, ColumnKind::Chf, Branch::Second),
            FuzzyColumn::new(node, ColumnKind::AccumulatedChf, Branch::First),
            FuzzyColumn::new(node, ColumnKind::AccumulatedChf, Branch::Second),
        ]
    }
}

/// Renders the flat column name used in exported tables, e.g. `3node_chfA2`.
impl fmt::Display for FuzzyColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ColumnKind::Chf => "chf",
            ColumnKind::AccumulatedChf => "chfA",
        };
        let branch = match self.branch {
            Branch::First => 1,
            Branch::Second => 2,
        };
        write!(f, "{}node_{kind}{branch}", self.node)
    }
}

/// Per-row hazard contributions of one tree, keyed by [`FuzzyColumn`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzyTable {
    n_rows: usize,
    columns: BTreeMap<FuzzyColumn, Vec<f64>>,
}

impl FuzzyTable {
    /// Create an empty table over `n_rows` rows.
    #[must_use]
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            columns: BTreeMap::new(),
        }
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of stored (non-synthesized) columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Set one cell, creating the column zero-filled if needed.
    ///
    /// Rows outside the table are ignored.
    pub fn set(&mut self, row: usize, column: FuzzyColumn, value: f64) {
        if row >= self.n_rows {
            return;
        }
        let n_rows = self.n_rows;
        self.columns
            .entry(column)
            .or_insert_with(|| vec![0.0; n_rows])[row] = value;
    }

    /// Insert a whole column, zero-padding or truncating it to the row count.
    pub fn insert_column(&mut self, column: FuzzyColumn, mut values: Vec<f64>) {
        values.resize(self.n_rows, 0.0);
        self.columns.insert(column, values);
    }

    /// Return a stored column.
    #[must_use]
    pub fn column(&self, column: &FuzzyColumn) -> Option<&[f64]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// One past the largest node index referenced by any column; 0 for an empty table.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.columns
            .keys()
            .map(|c| c.node.index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// All `4 * node_count()` canonical columns, absent ones as zero columns.
    pub fn canonical_columns(&self) -> impl Iterator<Item = (FuzzyColumn, Cow<'_, [f64]>)> + '_ {
        (0..self.node_count())
            .flat_map(|node| FuzzyColumn::canonical(NodeIndex::new(node)))
            .map(|column| {
                let values = match self.columns.get(&column) {
                    Some(values) => Cow::Borrowed(values.as_slice()),
                    None => Cow::Owned(vec![0.0; self.n_rows]),
                };
                (column, values)
            })
    }

    /// Row-wise sum over the canonical columns divided by the number of
    /// nonzero cells in that row; 0 for rows with no nonzero cell.
    ///
    /// Non-finite cells are treated as absent.
    #[must_use]
    pub fn normalized_rows(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_rows];
        let mut hits = vec![0usize; self.n_rows];
        for (_, values) in self.canonical_columns() {
            for (row, &v) in values.iter().enumerate() {
                if v.is_finite() && v != 0.0 {
                    totals[row] += v;
                    hits[row] += 1;
                }
            }
        }
        totals
            .iter()
            .zip(&hits)
            .map(|(&total, &count)| if count > 0 { total / count as f64 } else { 0.0 })
            .collect()
    }
}

/// Per-row first-branch membership at each split node of one tree.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzyPositions {
    n_rows: usize,
    memberships: BTreeMap<NodeIndex, Vec<f64>>,
}

impl FuzzyPositions {
    /// Create an empty position table over `n_rows` rows.
    #[must_use]
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            memberships: BTreeMap::new(),
        }
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Record the first-branch membership of `row` at `node`. Out-of-range rows are ignored.
    pub fn set(&mut self, row: usize, node: NodeIndex, membership: f64) {
        if row >= self.n_rows {
            return;
        }
        let n_rows = self.n_rows;
        self.memberships
            .entry(node)
            .or_insert_with(|| vec![0.0; n_rows])[row] = membership;
    }

    /// Return the memberships recorded at `node`.
    #[must_use]
    pub fn at(&self, node: NodeIndex) -> Option<&[f64]> {
        self.memberships.get(&node).map(Vec::as_slice)
    }

    /// Return the nodes with recorded memberships, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.memberships.keys().copied()
    }
}

/// Forest-level fuzzy hazard aggregate over the training rows.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzyAggregate {
    values: BTreeMap<usize, f64>,
    tree_counts: Vec<usize>,
    concordance: Option<f64>,
}

impl FuzzyAggregate {
    /// Aggregate value of `sample`; 0 when it is not an informative row.
    #[must_use]
    pub fn value(&self, sample: usize) -> f64 {
        self.values.get(&sample).copied().unwrap_or(0.0)
    }

    /// Informative rows (nonzero aggregate) as `(sample, value)`, ascending by sample.
    pub fn informative_rows(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().map(|(&s, &v)| (s, v))
    }

    /// Number of informative rows.
    #[must_use]
    pub fn n_informative(&self) -> usize {
        self.values.len()
    }

    /// Number of trees with a nonzero normalized value for `sample`.
    #[must_use]
    pub fn tree_count(&self, sample: usize) -> usize {
        self.tree_counts.get(sample).copied().unwrap_or(0)
    }

    /// Number of training rows the aggregate was computed over.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.tree_counts.len()
    }

    /// Concordance of the informative rows against their labels, if computed.
    #[must_use]
    pub fn concordance(&self) -> Option<f64> {
        self.concordance
    }
}

/// Combine every tree's fuzzy table into the forest-level aggregate.
///
/// `metric`, when given, scores the informative rows (aggregate as risk)
/// against `labels`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`RsfError::NoValidModel`] | `trees` is empty |
/// | [`RsfError::FuzzyTableShape`] | a tree's `U_s` or `fuzzy_pos` row count differs from `labels.len()` |
#[instrument(skip_all, fields(n_trees = trees.len(), n_rows = labels.len()))]
pub fn fuzzy_ensemble_chf<T: HazardTree>(
    trees: &[T],
    labels: &SurvivalLabels,
    metric: Option<&dyn SurvivalMetric>,
) -> Result<FuzzyAggregate, RsfError> {
    if trees.is_empty() {
        return Err(RsfError::NoValidModel);
    }
    let n_rows = labels.len();

    for (tree_index, tree) in trees.iter().enumerate() {
        for got in [tree.fuzzy_table().n_rows(), tree.fuzzy_positions().n_rows()] {
            if got != n_rows {
                return Err(RsfError::FuzzyTableShape {
                    tree_index,
                    expected: n_rows,
                    got,
                });
            }
        }
    }

    let per_tree: Vec<Vec<f64>> = trees
        .par_iter()
        .map(|tree| tree.fuzzy_table().normalized_rows())
        .collect();

    let mut totals = vec![0.0f64; n_rows];
    let mut tree_counts = vec![0usize; n_rows];
    for normalized in &per_tree {
        for (row, &v) in normalized.iter().enumerate() {
            if v != 0.0 {
                totals[row] += v;
                tree_counts[row] += 1;
            }
        }
    }

    let values: BTreeMap<usize, f64> = totals
        .iter()
        .zip(&tree_counts)
        .enumerate()
        .filter(|&(_, (_, &count))| count > 0)
        .map(|(row, (&total, &count))| (row, total / count as f64))
        .filter(|&(_, v)| v != 0.0)
        .collect();

    let concordance = metric.and_then(|m| {
        let rows: Vec<usize> = values.keys().copied().collect();
        let times: Vec<f64> = rows.iter().map(|&r| labels.as_slice()[r].time).collect();
        let events: Vec<bool> = rows.iter().map(|&r| labels.as_slice()[r].event).collect();
        let risks: Vec<f64> = values.values().copied().collect();
        m.score(&times, &risks, &events)
    });

    debug!(
        n_informative = values.len(),
        concordance = ?concordance,
        "fuzzy ensemble aggregate computed"
    );

    Ok(FuzzyAggregate {
        values,
        tree_counts,
        concordance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concordance::HarrellConcordance;
    use crate::testing::StubTree;

    fn col(node: usize, kind: ColumnKind, branch: Branch) -> FuzzyColumn {
        FuzzyColumn::new(NodeIndex::new(node), kind, branch)
    }

    fn labels(n: usize) -> SurvivalLabels {
        let pairs: Vec<(f64, bool)> = (0..n).map(|i| (i as f64 + 1.0, i % 2 == 0)).collect();
        SurvivalLabels::from_pairs(&pairs).unwrap()
    }

    #[test]
    fn column_display_matches_flat_names() {
        assert_eq!(col(3, ColumnKind::Chf, Branch::First).to_string(), "3node_chf1");
        assert_eq!(
            col(12, ColumnKind::AccumulatedChf, Branch::Second).to_string(),
            "12node_chfA2"
        );
    }

    #[test]
    fn node_count_is_max_index_plus_one() {
        let mut table = FuzzyTable::new(2);
        assert_eq!(table.node_count(), 0);
        table.set(0, col(0, ColumnKind::Chf, Branch::First), 1.0);
        table.set(1, col(4, ColumnKind::AccumulatedChf, Branch::Second), 1.0);
        assert_eq!(table.node_count(), 5);
    }

    #[test]
    fn canonical_columns_zero_fill_absent_nodes() {
        let mut table = FuzzyTable::new(3);
        table.set(1, col(2, ColumnKind::Chf, Branch::Second), 0.4);
        let columns: Vec<_> = table.canonical_columns().collect();
        assert_eq!(columns.len(), 12);
        let synthesized = columns
            .iter()
            .filter(|(c, _)| c.node.index() == 0)
            .all(|(_, values)| values.iter().all(|&v| v == 0.0) && values.len() == 3);
        assert!(synthesized);
    }

    #[test]
    fn normalization_divides_by_nonzero_cells_only() {
        let mut table = FuzzyTable::new(3);
        table.set(0, col(0, ColumnKind::Chf, Branch::First), 0.2);
        table.set(0, col(0, ColumnKind::Chf, Branch::Second), 0.6);
        table.set(0, col(1, ColumnKind::AccumulatedChf, Branch::First), 0.0);
        table.set(1, col(1, ColumnKind::Chf, Branch::First), 0.9);
        let rows = table.normalized_rows();
        assert!((rows[0] - 0.4).abs() < 1e-12);
        assert!((rows[1] - 0.9).abs() < 1e-12);
        assert_eq!(rows[2], 0.0);
    }

    #[test]
    fn non_finite_cells_are_ignored() {
        let mut table = FuzzyTable::new(1);
        table.set(0, col(0, ColumnKind::Chf, Branch::First), f64::NAN);
        table.set(0, col(0, ColumnKind::Chf, Branch::Second), 0.5);
        assert_eq!(table.normalized_rows(), vec![0.5]);
    }

    #[test]
    fn insert_column_pads_to_row_count() {
        let mut table = FuzzyTable::new(4);
        table.insert_column(col(1, ColumnKind::Chf, Branch::First), vec![1.0, 2.0]);
        assert_eq!(
            table.column(&col(1, ColumnKind::Chf, Branch::First)).unwrap(),
            &[1.0, 2.0, 0.0, 0.0]
        );
    }

    #[test]
    fn silent_tree_does_not_dilute_other_tree() {
        // Tree A has no nonzero column for sample 3; tree B has exactly one.
        let mut a = FuzzyTable::new(5);
        a.set(0, col(0, ColumnKind::Chf, Branch::First), 0.3);
        let mut b = FuzzyTable::new(5);
        b.set(3, col(1, ColumnKind::AccumulatedChf, Branch::Second), 0.8);
        b.set(0, col(0, ColumnKind::Chf, Branch::First), 0.5);

        let b_normalized = b.normalized_rows()[3];
        let trees = vec![StubTree::with_table(a), StubTree::with_table(b)];
        let aggregate = fuzzy_ensemble_chf(&trees, &labels(5), None).unwrap();

        assert_eq!(aggregate.value(3), b_normalized);
        assert_eq!(aggregate.tree_count(3), 1);
        assert!((aggregate.value(0) - 0.4).abs() < 1e-12);
        assert_eq!(aggregate.tree_count(0), 2);
    }

    #[test]
    fn rows_without_contribution_are_dropped() {
        let mut a = FuzzyTable::new(4);
        a.set(1, col(0, ColumnKind::Chf, Branch::First), 0.7);
        let trees = vec![StubTree::with_table(a)];
        let aggregate = fuzzy_ensemble_chf(&trees, &labels(4), None).unwrap();

        let rows: Vec<(usize, f64)> = aggregate.informative_rows().collect();
        assert_eq!(rows, vec![(1, 0.7)]);
        assert_eq!(aggregate.value(0), 0.0);
        assert_eq!(aggregate.n_rows(), 4);
        for (_, v) in aggregate.informative_rows() {
            assert!(v.is_finite() && v > 0.0);
        }
    }

    #[test]
    fn empty_forest_is_an_error() {
        let trees: Vec<StubTree> = Vec::new();
        let err = fuzzy_ensemble_chf(&trees, &labels(3), None).unwrap_err();
        assert!(matches!(err, RsfError::NoValidModel));
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let trees = vec![StubTree::with_table(FuzzyTable::new(2))];
        let err = fuzzy_ensemble_chf(&trees, &labels(3), None).unwrap_err();
        assert!(matches!(
            err,
            RsfError::FuzzyTableShape { tree_index: 0, expected: 3, got: 2 }
        ));
    }

    #[test]
    fn concordance_is_computed_over_informative_rows() {
        // Earlier times get larger hazards: perfectly concordant.
        let mut a = FuzzyTable::new(4);
        for (row, v) in [(0, 0.9), (1, 0.6), (2, 0.3)] {
            a.set(row, col(0, ColumnKind::Chf, Branch::First), v);
        }
        let pairs = [(1.0, true), (2.0, true), (3.0, true), (4.0, true)];
        let l = SurvivalLabels::from_pairs(&pairs).unwrap();
        let aggregate =
            fuzzy_ensemble_chf(&[StubTree::with_table(a)], &l, Some(&HarrellConcordance)).unwrap();
        assert_eq!(aggregate.concordance(), Some(1.0));
    }

    #[test]
    fn positions_record_memberships() {
        let mut pos = FuzzyPositions::new(2);
        pos.set(1, NodeIndex::new(0), 0.25);
        pos.set(5, NodeIndex::new(0), 0.9);
        assert_eq!(pos.at(NodeIndex::new(0)).unwrap(), &[0.0, 0.25]);
        assert_eq!(pos.nodes().count(), 1);
    }
}
