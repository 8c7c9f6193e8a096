use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::{
    RsfError,
    fuzzy::{Branch, ColumnKind, FuzzyColumn, FuzzyPositions, FuzzyTable},
    grower::{FuzzyTraversal, GrowRequest, HazardTree, TreeGrower},
    labels::SurvivalLabels,
    node::{Node, NodeIndex, mean_hazard},
    split::{SplitConstraints, find_best_split},
    timeline::Timeline,
};

/// Fuzzy walks stop descending once the path weight falls below this.
const MIN_PATH_WEIGHT: f64 = 1e-6;

/// RNG stream reserved for threshold sampling inside one tree.
const SPLIT_STREAM: u64 = 2;

/// Default survival tree grower: log-rank splits, Nelson-Aalen leaves and
/// logistic branch memberships.
///
/// # Defaults
///
/// | Parameter        | Default |
/// |------------------|---------|
/// | `max_candidates` | 32      |
/// | `fuzziness`      | 1.0     |
#[derive(Debug, Clone, Copy)]
pub struct LogRankGrower {
    max_candidates: usize,
    fuzziness: f64,
}

impl LogRankGrower {
    /// Create a grower with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_candidates: 32,
            fuzziness: 1.0,
        }
    }

    /// Set the maximum number of thresholds evaluated per feature and node.
    ///
    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Scale the logistic transition width at every split.
    ///
    /// `0.0` makes memberships crisp. Negative or non-finite values are treated as `0.0`.
    #[must_use]
    pub fn with_fuzziness(mut self, fuzziness: f64) -> Self {
        self.fuzziness = if fuzziness.is_finite() { fuzziness.max(0.0) } else { 0.0 };
        self
    }

    /// Return the per-feature threshold cap.
    #[must_use]
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Return the fuzziness factor.
    #[must_use]
    pub fn fuzziness(&self) -> f64 {
        self.fuzziness
    }
}

impl Default for LogRankGrower {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only state shared by every recursive call of one build.
struct BuildContext<'a> {
    columns: &'a [Vec<f64>],
    feature_subset: &'a [usize],
    labels: &'a SurvivalLabels,
    timeline: &'a Timeline,
    constraints: SplitConstraints,
    fuzziness: f64,
}

fn exhausted(what: &str, err: std::collections::TryReserveError) -> RsfError {
    RsfError::ResourceExhausted {
        reason: format!("{what}: {err}"),
    }
}

impl TreeGrower for LogRankGrower {
    type Tree = SurvivalTree;

    fn grow(&self, request: &GrowRequest<'_>) -> Result<SurvivalTree, RsfError> {
        let n_rows = request.labels.len();

        // Column-major copy of the subset features over every training row.
        let mut columns: Vec<Vec<f64>> = Vec::new();
        columns
            .try_reserve_exact(request.feature_subset.len())
            .map_err(|e| exhausted("feature columns", e))?;
        for &feature in request.feature_subset {
            let mut column = Vec::new();
            column
                .try_reserve_exact(n_rows)
                .map_err(|e| exhausted("feature column values", e))?;
            for (sample_index, row) in request.features.iter().enumerate() {
                let value = row.get(feature).copied().ok_or(RsfError::FeatureCountMismatch {
                    expected: request.n_features,
                    got: row.len(),
                    sample_index,
                })?;
                column.push(value);
            }
            columns.push(column);
        }

        let ctx = BuildContext {
            columns: &columns,
            feature_subset: request.feature_subset,
            labels: request.labels,
            timeline: request.timeline,
            constraints: SplitConstraints {
                min_leaf: request.min_leaf,
                unique_deaths: request.unique_deaths,
                max_candidates: self.max_candidates,
            },
            fuzziness: self.fuzziness,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(request.seed);
        rng.set_stream(SPLIT_STREAM);
        let mut arena: Vec<Node> = Vec::new();
        build_node(&ctx, request.rows, &mut rng, &mut arena);

        let mut tree = SurvivalTree {
            nodes: arena,
            n_features: request.n_features,
            table: FuzzyTable::new(n_rows),
            positions: FuzzyPositions::new(n_rows),
        };
        let (table, positions) = tree.training_fuzzy_tables(request.features);
        tree.table = table;
        tree.positions = positions;

        debug!(
            seed = request.seed,
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            "survival tree grown"
        );
        Ok(tree)
    }
}

/// Recursively build the arena and return the index of the node just created.
fn build_node(
    ctx: &BuildContext<'_>,
    rows: &[usize],
    rng: &mut ChaCha8Rng,
    arena: &mut Vec<Node>,
) -> NodeIndex {
    let chf = ctx.timeline.nelson_aalen(ctx.labels, rows);
    let risk = mean_hazard(&chf);
    let n_samples = rows.len();

    let Some(split) = find_best_split(
        ctx.columns,
        ctx.feature_subset,
        ctx.labels,
        rows,
        ctx.constraints,
        rng,
    ) else {
        let n_events = rows
            .iter()
            .filter(|&&r| ctx.labels.get(r).is_some_and(|l| l.event))
            .count();
        let idx = arena.len();
        arena.push(Node::Leaf {
            chf,
            risk,
            n_samples,
            n_events,
        });
        return NodeIndex::new(idx);
    };

    // Reserve the slot, build both children, then overwrite with the split.
    let node_idx = arena.len();
    arena.push(Node::Leaf {
        chf: Vec::new(),
        risk,
        n_samples,
        n_events: 0,
    });

    let left = build_node(ctx, &split.left_rows, rng, arena);
    let right = build_node(ctx, &split.right_rows, rng, arena);

    arena[node_idx] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        spread: split.feature_std * ctx.fuzziness,
        left,
        right,
        n_samples,
        statistic: split.statistic,
        risk,
    };

    NodeIndex::new(node_idx)
}

/// Membership of value `x` in the first (`<= threshold`) branch.
///
/// Logistic in `(x - threshold) / spread`; a step function when `spread` is 0.
#[must_use]
pub fn first_branch_membership(x: f64, threshold: f64, spread: f64) -> f64 {
    if spread > 0.0 && spread.is_finite() {
        1.0 / (1.0 + ((x - threshold) / spread).exp())
    } else if x <= threshold {
        1.0
    } else {
        0.0
    }
}

/// A fitted survival tree.
///
/// Nodes live in a `Vec<Node>` arena with the root at index 0. The fuzzy
/// tables are computed once at growth over every training row.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SurvivalTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) table: FuzzyTable,
    pub(crate) positions: FuzzyPositions,
}

impl SurvivalTree {
    /// Return the arena nodes, root first.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    fn check_width(&self, sample: &[f64]) -> Result<(), RsfError> {
        if sample.len() != self.n_features {
            return Err(RsfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Follow the crisp path from the root and return the leaf's arena index.
    fn traverse(&self, sample: &[f64]) -> usize {
        let mut idx = 0usize;
        while let Some(Node::Split {
            feature,
            threshold,
            left,
            right,
            ..
        }) = self.nodes.get(idx)
        {
            idx = if sample[feature.index()] <= *threshold {
                left.index()
            } else {
                right.index()
            };
        }
        idx
    }

    fn fuzzy_walk(&self, idx: usize, sample: &[f64], traversal: &mut FuzzyTraversal) {
        match &self.nodes[idx] {
            Node::Leaf { risk, .. } => traversal.contribute(*risk),
            Node::Split {
                feature,
                threshold,
                spread,
                left,
                right,
                ..
            } => {
                let mu = first_branch_membership(sample[feature.index()], *threshold, *spread);
                for (child, membership) in [(left, mu), (right, 1.0 - mu)] {
                    if traversal.weight() * membership < MIN_PATH_WEIGHT {
                        continue;
                    }
                    traversal.descend(membership, |t| self.fuzzy_walk(child.index(), sample, t));
                }
            }
        }
    }

    /// Build `U_s` and `fuzzy_pos` over every row of `features`.
    fn training_fuzzy_tables(&self, features: &[Vec<f64>]) -> (FuzzyTable, FuzzyPositions) {
        let mut table = FuzzyTable::new(features.len());
        let mut positions = FuzzyPositions::new(features.len());

        for (row, sample) in features.iter().enumerate() {
            let mut idx = 0usize;
            let mut weight = 1.0;
            while let Some(Node::Split {
                feature,
                threshold,
                spread,
                left,
                right,
                ..
            }) = self.nodes.get(idx)
            {
                let node = NodeIndex::new(idx);
                let x = sample.get(feature.index()).copied().unwrap_or(f64::NAN);
                let mu = first_branch_membership(x, *threshold, *spread);
                let branches = [
                    (Branch::First, mu, self.nodes[left.index()].risk()),
                    (Branch::Second, 1.0 - mu, self.nodes[right.index()].risk()),
                ];
                for (branch, membership, child_risk) in branches {
                    let value = membership * child_risk;
                    table.set(row, FuzzyColumn::new(node, ColumnKind::Chf, branch), value);
                    table.set(
                        row,
                        FuzzyColumn::new(node, ColumnKind::AccumulatedChf, branch),
                        weight * value,
                    );
                }
                positions.set(row, node, mu);

                if x <= *threshold {
                    weight *= mu;
                    idx = left.index();
                } else {
                    weight *= 1.0 - mu;
                    idx = right.index();
                }
            }
        }

        (table, positions)
    }
}

impl HazardTree for SurvivalTree {
    fn prediction_possible(&self) -> bool {
        matches!(self.nodes.first(), Some(Node::Split { .. }))
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_chf(&self, sample: &[f64]) -> Result<Vec<f64>, RsfError> {
        self.check_width(sample)?;
        match self.nodes.get(self.traverse(sample)) {
            Some(Node::Leaf { chf, .. }) => Ok(chf.clone()),
            _ => Err(RsfError::NoValidModel),
        }
    }

    fn predict_fuzzy(
        &self,
        sample: &[f64],
        traversal: &mut FuzzyTraversal,
    ) -> Result<(), RsfError> {
        self.check_width(sample)?;
        if !self.nodes.is_empty() {
            self.fuzzy_walk(0, sample, traversal);
        }
        Ok(())
    }

    fn fuzzy_table(&self) -> &FuzzyTable {
        &self.table
    }

    fn fuzzy_positions(&self) -> &FuzzyPositions {
        &self.positions
    }
}
