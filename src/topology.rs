//! Immutable indexed view of a bifurcating reference tree.
//!
//! # Overview
//! A `Topology` flattens a parsed `phylotree` tree into edge-indexed arrays:
//! every edge (a parent→child link) gets a stable index in `[0, edge_count)`,
//! a branch length, and (for internal edges) the pair of child edges on its
//! distal side. The root itself has no edge; its two child edges are kept
//! separately. This arena layout sidesteps node aliasing entirely and gives
//! the aggregation pass cache-friendly per-edge arrays.
//!
//! # Why strictly bifurcating
//! The distal-fraction recursion sums exactly two children per internal edge.
//! Any node with a different arity would silently corrupt the aggregation, so
//! it is rejected at construction time instead.
//!
//! The builder also returns a map from phylotree node ids to edge indices so
//! that the reader layer can translate per-node annotations (jplace edge
//! numbers, NHX attributes) into edge indices.

use crate::error::{DiversityError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashMap;

/// Index of an edge in a [`Topology`].
pub type EdgeIndex = usize;

/// An immutable bifurcating tree with indexed edges.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Branch length per edge, non-negative.
    lengths: Vec<f64>,
    /// Child edge pair on the distal side; `None` for leaf edges.
    children: Vec<Option<(EdgeIndex, EdgeIndex)>>,
    /// Every edge exactly once, both children strictly before their parent.
    postorder: Vec<EdgeIndex>,
    /// The root's two child edges. The root has no edge of its own.
    root_edges: (EdgeIndex, EdgeIndex),
}

impl Topology {
    /// Builds a topology from a parsed tree, validating that it is strictly
    /// bifurcating, and returns it together with a phylotree-node-id →
    /// edge-index map for annotation lookup.
    ///
    /// # Errors
    /// `NotBifurcating` if any node has other than 0 or 2 children (the root
    /// must have exactly 2), `NegativeBranchLength` for negative lengths,
    /// `TreeParse` if the underlying tree is malformed.
    pub fn from_tree(tree: &PhyloTree) -> Result<(Self, HashMap<usize, EdgeIndex>)> {
        let root_id = tree
            .get_root()
            .map_err(|e| DiversityError::TreeParse(e.to_string()))?;
        let root = tree
            .get(&root_id)
            .map_err(|e| DiversityError::TreeParse(e.to_string()))?;
        if root.children.len() != 2 {
            return Err(DiversityError::NotBifurcating {
                found: root.children.len(),
            });
        }

        let mut builder = Builder::default();
        let lhs = builder.descend(tree, root.children[0])?;
        let rhs = builder.descend(tree, root.children[1])?;

        let topology = Topology {
            lengths: builder.lengths,
            children: builder.children,
            postorder: builder.postorder,
            root_edges: (lhs, rhs),
        };
        Ok((topology, builder.node_edges))
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.lengths.len()
    }

    #[inline]
    pub fn branch_length(&self, edge: EdgeIndex) -> f64 {
        self.lengths[edge]
    }

    /// The two child edges on the distal side, or `None` for a leaf edge.
    #[inline]
    pub fn children(&self, edge: EdgeIndex) -> Option<(EdgeIndex, EdgeIndex)> {
        self.children[edge]
    }

    #[inline]
    pub fn is_leaf(&self, edge: EdgeIndex) -> bool {
        self.children[edge].is_none()
    }

    /// The root's two child edges.
    #[inline]
    pub fn root_edges(&self) -> (EdgeIndex, EdgeIndex) {
        self.root_edges
    }

    /// Edges in postorder: both children of an internal edge are yielded
    /// strictly before it, each edge exactly once, the root never.
    pub fn postorder(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.postorder.iter().copied()
    }
}

/// Accumulates edge arrays during the recursive walk.
#[derive(Default)]
struct Builder {
    lengths: Vec<f64>,
    children: Vec<Option<(EdgeIndex, EdgeIndex)>>,
    postorder: Vec<EdgeIndex>,
    node_edges: HashMap<usize, EdgeIndex>,
}

impl Builder {
    /// Registers the edge leading to `node_id`, then recurses into the
    /// subtree below it. Returns the new edge's index.
    fn descend(&mut self, tree: &PhyloTree, node_id: usize) -> Result<EdgeIndex> {
        let node = tree
            .get(&node_id)
            .map_err(|e| DiversityError::TreeParse(e.to_string()))?;

        let edge = self.lengths.len();
        let length = node.parent_edge.unwrap_or(0.0);
        if length < 0.0 {
            return Err(DiversityError::NegativeBranchLength { edge, length });
        }
        self.lengths.push(length);
        self.children.push(None);
        self.node_edges.insert(node_id, edge);

        match node.children.len() {
            0 => {}
            2 => {
                let lhs = self.descend(tree, node.children[0])?;
                let rhs = self.descend(tree, node.children[1])?;
                self.children[edge] = Some((lhs, rhs));
            }
            found => return Err(DiversityError::NotBifurcating { found }),
        }

        self.postorder.push(edge);
        Ok(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(newick: &str) -> Topology {
        let tree = PhyloTree::from_newick(newick).unwrap();
        Topology::from_tree(&tree).unwrap().0
    }

    #[test]
    fn three_taxon_tree_shape() {
        // ((A,B),C) has 4 edges: A, B, the AB cherry, and C
        let topo = topology("((A:1.0,B:1.0):2.0,C:1.0);");
        assert_eq!(topo.edge_count(), 4);
        assert_eq!(topo.postorder().count(), 4);

        let leaves = (0..topo.edge_count()).filter(|&e| topo.is_leaf(e)).count();
        assert_eq!(leaves, 3);

        let (lhs, rhs) = topo.root_edges();
        // one root child is the cherry, the other is leaf C
        assert!(topo.is_leaf(lhs) != topo.is_leaf(rhs));
    }

    #[test]
    fn postorder_children_before_parent() {
        let topo = topology("((A:1,B:1):1,((C:1,D:1):1,E:1):1);");
        let order: Vec<usize> = topo.postorder().collect();
        let rank: HashMap<usize, usize> =
            order.iter().enumerate().map(|(i, &e)| (e, i)).collect();
        for e in 0..topo.edge_count() {
            if let Some((lhs, rhs)) = topo.children(e) {
                assert!(rank[&lhs] < rank[&e]);
                assert!(rank[&rhs] < rank[&e]);
            }
        }
        // each edge exactly once
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..topo.edge_count()).collect::<Vec<_>>());
    }

    #[test]
    fn branch_lengths_follow_newick() {
        let topo = topology("((A:1.0,B:1.5):2.0,C:0.5);");
        let mut lengths: Vec<f64> = (0..topo.edge_count())
            .map(|e| topo.branch_length(e))
            .collect();
        lengths.sort_by(f64::total_cmp);
        assert_eq!(lengths, vec![0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn rejects_multifurcating_root() {
        let tree = PhyloTree::from_newick("(A:1.0,B:1.0,C:1.0);").unwrap();
        assert_eq!(
            Topology::from_tree(&tree).unwrap_err(),
            DiversityError::NotBifurcating { found: 3 }
        );
    }

    #[test]
    fn rejects_internal_multifurcation() {
        let tree = PhyloTree::from_newick("((A:1.0,B:1.0,C:1.0):1.0,D:1.0);").unwrap();
        assert_eq!(
            Topology::from_tree(&tree).unwrap_err(),
            DiversityError::NotBifurcating { found: 3 }
        );
    }

    #[test]
    fn node_edge_map_covers_all_non_root_nodes() {
        let tree = PhyloTree::from_newick("((A:1.0,B:1.0):2.0,C:1.0);").unwrap();
        let (topo, node_edges) = Topology::from_tree(&tree).unwrap();
        assert_eq!(node_edges.len(), topo.edge_count());
        let root = tree.get_root().unwrap();
        assert!(!node_edges.contains_key(&root));
    }
}
