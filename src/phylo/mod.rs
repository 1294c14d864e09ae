//! Phylogenetic tree, tip mapping and distance index

pub mod index;
pub mod newick;
pub mod tips;
pub mod tree;

pub use index::{PdDetail, PhylogeneticDistanceIndex};
pub use tips::TipMapping;
pub use tree::{PhyloTree, TreeNode};
