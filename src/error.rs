//! Crate-wide error type.
//!
//! Everything in here is a precondition failure: the inputs are static, so a
//! failed computation is never retried. Variants carry the edge index or the
//! offending value so malformed upstream data can be traced; callers attach
//! the sample name when reporting.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiversityError {
    /// The reference tree is not strictly bifurcating.
    #[error("tree is not strictly bifurcating: found a node with {found} children")]
    NotBifurcating { found: usize },

    /// Postorder traversal covered a different number of edges than the
    /// topology declares. Internal consistency error.
    #[error("postorder traversal visited {visited} edges, expected {expected}")]
    TraversalMismatch { visited: usize, expected: usize },

    #[error("edge {edge} has negative branch length {length}")]
    NegativeBranchLength { edge: usize, length: f64 },

    /// The sample carries no mass at all.
    #[error("sample has zero total mass")]
    EmptySample,

    /// A mass value (or accumulated mass) left the [0, 1] range.
    #[error("mass {mass} out of range on edge {edge}")]
    MassOutOfRange { edge: usize, mass: f64 },

    /// A mass point lies outside its edge's branch length.
    #[error("mass offset {offset} out of range on edge {edge}")]
    OffsetOutOfRange { edge: usize, offset: f64 },

    /// Overlapping or misordered mass points within one edge.
    #[error("non-positive segment of length {length} between mass points on edge {edge}")]
    MisorderedMasses { edge: usize, length: f64 },

    #[error("failed to read {0}")]
    Read(String),

    #[error("failed to parse reference tree: {0}")]
    TreeParse(String),

    /// Malformed placement or attribute data.
    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, DiversityError>;
