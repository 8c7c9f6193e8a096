use std::fmt;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a survival tree.
///
/// Also the node key of fuzzy tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in a survival tree arena.
///
/// Trees are stored as `Vec<Node>` where children are referenced by
/// [`NodeIndex`] rather than pointers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Threshold value: samples with feature <= threshold go to the first branch.
        threshold: f64,
        /// Width of the fuzzy transition around `threshold` (0 means crisp).
        spread: f64,
        /// Index of the first (left) child node.
        left: NodeIndex,
        /// Index of the second (right) child node.
        right: NodeIndex,
        /// Number of training rows that reached this node.
        n_samples: usize,
        /// Standardized log-rank statistic of the chosen split.
        statistic: f64,
        /// Mean cumulative hazard of the rows at this node.
        risk: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Nelson-Aalen cumulative hazard over the timeline.
        chf: Vec<f64>,
        /// Mean of `chf`.
        risk: f64,
        /// Number of training rows in this leaf.
        n_samples: usize,
        /// Number of observed events in this leaf.
        n_events: usize,
    },
}

impl Node {
    /// Return the scalar risk summary of this node.
    #[must_use]
    pub fn risk(&self) -> f64 {
        match self {
            Node::Split { risk, .. } | Node::Leaf { risk, .. } => *risk,
        }
    }

    /// Return the number of training rows that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Mean of a hazard curve; zero for an empty curve.
pub(crate) fn mean_hazard(chf: &[f64]) -> f64 {
    if chf.is_empty() {
        0.0
    } else {
        chf.iter().sum::<f64>() / chf.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Node, NodeIndex, mean_hazard};

    #[test]
    fn feature_index_display() {
        assert_eq!(format!("{}", FeatureIndex::new(3)), "3");
    }

    #[test]
    fn node_index_ordering() {
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
        assert_eq!(NodeIndex::new(42).index(), 42);
    }

    fn make_leaf() -> Node {
        Node::Leaf {
            chf: vec![0.0, 0.5, 1.0],
            risk: 0.5,
            n_samples: 10,
            n_events: 4,
        }
    }

    fn make_split() -> Node {
        Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 3.5,
            spread: 0.8,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            n_samples: 20,
            statistic: 2.1,
            risk: 0.4,
        }
    }

    #[test]
    fn leaf_accessors() {
        let leaf = make_leaf();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.n_samples(), 10);
        assert!((leaf.risk() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn split_accessors() {
        let split = make_split();
        assert!(!split.is_leaf());
        assert_eq!(split.n_samples(), 20);
        assert!((split.risk() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_hazard_of_empty_curve_is_zero() {
        assert_eq!(mean_hazard(&[]), 0.0);
        assert!((mean_hazard(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }
}
