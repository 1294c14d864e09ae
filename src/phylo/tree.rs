//! Phylogenetic tree types (array-based representation).

use crate::error::{ScoringError, ScoringResult};
use rustc_hash::FxHashMap;

/// A node in the phylogenetic tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Index of the parent node (`None` for the root).
    pub parent: Option<usize>,
    /// Length of the edge from this node to its parent.
    pub branch_length: f64,
    /// Tip label, or internal-node label (often empty).
    pub label: String,
    /// Child indices, in input order.
    pub children: Vec<usize>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A validated rooted tree: exactly one root, acyclic, non-negative finite
/// branch lengths and unique leaf labels.
#[derive(Debug, Clone)]
pub struct PhyloTree {
    nodes: Vec<TreeNode>,
    root: usize,
    leaf_index: FxHashMap<String, usize>,
}

impl PhyloTree {
    /// Parse a Newick-format tree string.
    pub fn from_newick(newick: &str) -> ScoringResult<Self> {
        super::newick::parse(newick)
    }

    /// Build from an explicit parent table.
    ///
    /// `parents[i]` is the parent of node `i` (`None` for the root),
    /// `lengths[i]` the length of the edge above it.
    pub fn from_parts(
        parents: Vec<Option<usize>>,
        lengths: Vec<f64>,
        labels: Vec<String>,
    ) -> ScoringResult<Self> {
        let n = parents.len();
        if n == 0 {
            return Err(ScoringError::MalformedTree("tree has no nodes".into()));
        }
        if lengths.len() != n || labels.len() != n {
            return Err(ScoringError::MalformedTree(format!(
                "{} parents, {} lengths and {} labels do not line up",
                n,
                lengths.len(),
                labels.len()
            )));
        }

        let mut root = None;
        let mut children = vec![Vec::new(); n];
        for (idx, parent) in parents.iter().enumerate() {
            match *parent {
                None => {
                    if let Some(existing) = root {
                        return Err(ScoringError::MalformedTree(format!(
                            "multiple roots (nodes {existing} and {idx})"
                        )));
                    }
                    root = Some(idx);
                }
                Some(p) if p >= n => {
                    return Err(ScoringError::MalformedTree(format!(
                        "node {idx} has out-of-range parent {p}"
                    )));
                }
                Some(p) if p == idx => {
                    return Err(ScoringError::MalformedTree(format!("node {idx} is its own parent")));
                }
                Some(p) => children[p].push(idx),
            }
        }
        let root = root.ok_or_else(|| ScoringError::MalformedTree("tree has no root".into()))?;

        for (idx, &len) in lengths.iter().enumerate() {
            if !len.is_finite() || len < 0.0 {
                return Err(ScoringError::MalformedTree(format!(
                    "node {idx} has invalid branch length {len}"
                )));
            }
        }

        // Every node must be reachable from the root; anything else sits on a cycle.
        let mut seen = vec![false; n];
        let mut stack = vec![root];
        let mut reached = 0usize;
        while let Some(node) = stack.pop() {
            if seen[node] {
                continue;
            }
            seen[node] = true;
            reached += 1;
            stack.extend(children[node].iter().copied());
        }
        if reached != n {
            return Err(ScoringError::MalformedTree(format!(
                "{} nodes are not reachable from the root (cycle in parent table)",
                n - reached
            )));
        }

        let nodes: Vec<TreeNode> = parents
            .into_iter()
            .zip(lengths)
            .zip(labels)
            .zip(children)
            .map(|(((parent, branch_length), label), children)| TreeNode {
                parent,
                // The root has no parent edge.
                branch_length: if parent.is_some() { branch_length } else { 0.0 },
                label,
                children,
            })
            .collect();

        let mut leaf_index = FxHashMap::default();
        for (idx, node) in nodes.iter().enumerate() {
            if node.is_leaf() && !node.label.is_empty() {
                if leaf_index.insert(node.label.clone(), idx).is_some() {
                    return Err(ScoringError::MalformedTree(format!(
                        "duplicate leaf label '{}'",
                        node.label
                    )));
                }
            }
        }

        Ok(Self { nodes, root, leaf_index })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Get the index of a leaf by its label.
    pub fn leaf_idx(&self, label: &str) -> Option<usize> {
        self.leaf_index.get(label).copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of labelled leaves.
    pub fn num_leaves(&self) -> usize {
        self.leaf_index.len()
    }

    /// Total branch length of the tree.
    pub fn total_branch_length(&self) -> f64 {
        self.nodes.iter().map(|n| n.branch_length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_parts_builds_children() {
        let tree = PhyloTree::from_parts(
            vec![None, Some(0), Some(0)],
            vec![0.0, 1.5, 2.5],
            labels(&["", "A", "B"]),
        )
        .unwrap();
        assert_eq!(tree.root(), 0);
        assert_eq!(tree.node(0).children, vec![1, 2]);
        assert_eq!(tree.leaf_idx("B"), Some(2));
        assert_eq!(tree.num_leaves(), 2);
        assert!((tree.total_branch_length() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_multiple_roots() {
        let err = PhyloTree::from_parts(vec![None, None], vec![0.0, 0.0], labels(&["A", "B"]));
        assert!(matches!(err, Err(ScoringError::MalformedTree(_))));
    }

    #[test]
    fn test_rejects_cycles() {
        // 0 is the root; 1 and 2 point at each other.
        let err = PhyloTree::from_parts(
            vec![None, Some(2), Some(1)],
            vec![0.0, 1.0, 1.0],
            labels(&["", "A", "B"]),
        );
        assert!(matches!(err, Err(ScoringError::MalformedTree(_))));
    }

    #[test]
    fn test_rejects_negative_and_nan_lengths() {
        for bad in [-0.5, f64::NAN, f64::INFINITY] {
            let err = PhyloTree::from_parts(
                vec![None, Some(0)],
                vec![0.0, bad],
                labels(&["", "A"]),
            );
            assert!(matches!(err, Err(ScoringError::MalformedTree(_))));
        }
    }

    #[test]
    fn test_rejects_out_of_range_parent_and_duplicates() {
        assert!(PhyloTree::from_parts(vec![None, Some(7)], vec![0.0, 1.0], labels(&["", "A"])).is_err());
        assert!(PhyloTree::from_parts(
            vec![None, Some(0), Some(0)],
            vec![0.0, 1.0, 1.0],
            labels(&["", "A", "A"]),
        )
        .is_err());
    }
}
