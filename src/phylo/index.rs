//! Phylogenetic distance index
//!
//! Built once from a tree and a tip mapping, then shared read-only across
//! scoring threads. MRCA queries use an Euler tour with a sparse-table range
//! minimum over node depths, so `lca(u, v)` costs O(1) after O(n log n)
//! construction.

use super::tips::TipMapping;
use super::tree::PhyloTree;
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Faith's PD together with the plants that could not be placed on the tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdDetail {
    pub faiths_pd: f64,
    pub mapped: usize,
    pub unmapped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PhylogeneticDistanceIndex {
    tree: PhyloTree,
    tips: TipMapping,
    depth: Vec<u32>,
    /// Sum of branch lengths from the root down to each node
    root_distance: Vec<f64>,
    /// First position of each node in the Euler tour
    first_visit: Vec<usize>,
    euler: Vec<u32>,
    /// `sparse[k][i]`: Euler position of the shallowest node in `euler[i..i + 2^k]`
    sparse: Vec<Vec<u32>>,
}

impl PhylogeneticDistanceIndex {
    pub fn new(tree: PhyloTree, tips: TipMapping) -> Self {
        let n = tree.num_nodes();
        let mut depth = vec![0u32; n];
        let mut root_distance = vec![0.0f64; n];
        let mut first_visit = vec![usize::MAX; n];
        let mut euler: Vec<u32> = Vec::with_capacity(2 * n);

        // Iterative DFS: (node, next child position)
        let mut stack: Vec<(usize, usize)> = vec![(tree.root(), 0)];
        first_visit[tree.root()] = 0;
        euler.push(tree.root() as u32);
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let children = &tree.node(node).children;
            if top.1 < children.len() {
                let child = children[top.1];
                top.1 += 1;
                depth[child] = depth[node] + 1;
                root_distance[child] = root_distance[node] + tree.node(child).branch_length;
                first_visit[child] = euler.len();
                euler.push(child as u32);
                stack.push((child, 0));
            } else {
                stack.pop();
                if let Some(&(parent, _)) = stack.last() {
                    euler.push(parent as u32);
                }
            }
        }

        let sparse = build_sparse_table(&euler, &depth);

        let unplaced = tips
            .iter()
            .filter(|(_, tip)| tree.leaf_idx(tip).is_none())
            .count();
        if unplaced > 0 {
            warn!(unplaced, "tip mapping entries name tips that are not in the tree");
        }
        info!(
            nodes = n,
            leaves = tree.num_leaves(),
            mapped_taxa = tips.len() - unplaced,
            "phylogenetic index built"
        );

        Self {
            tree,
            tips,
            depth,
            root_distance,
            first_visit,
            euler,
            sparse,
        }
    }

    /// Load a Newick tree file and its tip mapping table
    pub fn load(tree_path: &Path, mapping_path: &Path) -> Result<Self> {
        let newick = fs::read_to_string(tree_path)
            .with_context(|| format!("Failed to read tree file: {:?}", tree_path))?;
        let tree = PhyloTree::from_newick(&newick)
            .with_context(|| format!("Failed to parse tree file: {:?}", tree_path))?;
        let tips = TipMapping::load(mapping_path)
            .with_context(|| format!("Failed to load tip mapping: {:?}", mapping_path))?;
        Ok(Self::new(tree, tips))
    }

    pub fn tree(&self) -> &PhyloTree {
        &self.tree
    }

    pub fn num_leaves(&self) -> usize {
        self.tree.num_leaves()
    }

    pub fn num_nodes(&self) -> usize {
        self.tree.num_nodes()
    }

    /// Leaf node for a plant id, if the plant maps onto the tree
    pub fn leaf_of(&self, plant_id: &str) -> Option<usize> {
        self.tips.tip(plant_id).and_then(|tip| self.tree.leaf_idx(tip))
    }

    pub fn is_mapped(&self, plant_id: &str) -> bool {
        self.leaf_of(plant_id).is_some()
    }

    /// Lowest common ancestor of two nodes
    pub fn lca(&self, u: usize, v: usize) -> usize {
        let (a, b) = (self.first_visit[u], self.first_visit[v]);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.euler[self.range_min(lo, hi) as usize] as usize
    }

    fn range_min(&self, lo: usize, hi: usize) -> u32 {
        let span = hi - lo + 1;
        let level = (usize::BITS - 1 - span.leading_zeros()) as usize;
        let left = self.sparse[level][lo];
        let right = self.sparse[level][hi + 1 - (1 << level)];
        if self.depth_at(left) <= self.depth_at(right) {
            left
        } else {
            right
        }
    }

    fn depth_at(&self, euler_pos: u32) -> u32 {
        self.depth[self.euler[euler_pos as usize] as usize]
    }

    /// MRCA of a set of nodes: LCA of the earliest and latest in tour order
    fn mrca_of_nodes(&self, nodes: &[usize]) -> Option<usize> {
        let first = nodes.iter().min_by_key(|&&n| self.first_visit[n])?;
        let last = nodes.iter().max_by_key(|&&n| self.first_visit[n])?;
        Some(self.lca(*first, *last))
    }

    /// MRCA node of the mapped plants (`None` when none map)
    pub fn mrca_of(&self, plant_ids: &[String]) -> Option<usize> {
        let leaves: Vec<usize> = plant_ids.iter().filter_map(|id| self.leaf_of(id)).collect();
        self.mrca_of_nodes(&leaves)
    }

    /// Faith's phylogenetic diversity of a set of plants
    ///
    /// Unmapped plants are ignored. Fewer than two distinct mapped leaves
    /// give 0.0.
    pub fn faiths_pd(&self, plant_ids: &[String]) -> f64 {
        self.faiths_pd_detailed(plant_ids).faiths_pd
    }

    pub fn faiths_pd_detailed(&self, plant_ids: &[String]) -> PdDetail {
        let mut leaves = Vec::with_capacity(plant_ids.len());
        let mut unmapped = Vec::new();
        for id in plant_ids {
            match self.leaf_of(id) {
                Some(leaf) => leaves.push(leaf),
                None => unmapped.push(id.clone()),
            }
        }
        let mapped = leaves.len();
        PdDetail {
            faiths_pd: self.pd_of_leaves(leaves),
            mapped,
            unmapped,
        }
    }

    fn pd_of_leaves(&self, mut leaves: Vec<usize>) -> f64 {
        leaves.sort_unstable();
        leaves.dedup();
        if leaves.len() < 2 {
            return 0.0;
        }
        let Some(mrca) = self.mrca_of_nodes(&leaves) else {
            return 0.0;
        };

        // Each node owns the edge above it, so visiting a node counts that edge once.
        let mut visited: FxHashSet<usize> = FxHashSet::default();
        for &leaf in &leaves {
            let mut current = leaf;
            while current != mrca && visited.insert(current) {
                match self.tree.node(current).parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }

        // Sum in node order so the result does not depend on input order.
        let mut edges: Vec<usize> = visited.into_iter().collect();
        edges.sort_unstable();
        edges
            .into_iter()
            .map(|node| self.tree.node(node).branch_length)
            .sum()
    }

    /// Path length between two plants on the tree
    pub fn patristic_distance(&self, a: &str, b: &str) -> Option<f64> {
        let u = self.leaf_of(a)?;
        let v = self.leaf_of(b)?;
        let w = self.lca(u, v);
        Some(self.root_distance[u] + self.root_distance[v] - 2.0 * self.root_distance[w])
    }
}

fn build_sparse_table(euler: &[u32], depth: &[u32]) -> Vec<Vec<u32>> {
    let m = euler.len();
    let mut sparse: Vec<Vec<u32>> = vec![(0..m as u32).collect()];
    let mut width = 1usize;
    while width * 2 <= m {
        let prev = &sparse[sparse.len() - 1];
        let row: Vec<u32> = (0..=m - width * 2)
            .map(|i| {
                let left = prev[i];
                let right = prev[i + width];
                if depth[euler[left as usize] as usize] <= depth[euler[right as usize] as usize] {
                    left
                } else {
                    right
                }
            })
            .collect();
        sparse.push(row);
        width *= 2;
    }
    sparse
}
