//! Distal-fraction aggregation engine.
//!
//! The goal is to compute, for every edge i of the reference tree, D(i): the
//! fraction of the sample's mass on the distal side of that edge. This is
//! done bottom-up in postorder, dragging accumulated distal mass along. The
//! diversity score is then the sum over edges of branch length times a
//! weighting function of D(i). For the step weighting at θ = 0 and edges in
//! the sample's spanning tree this recovers the classic Faith PD, adapted to
//! phylogenetic placement.
//!
//! Both mass representations run through the same recursion, parameterized by
//! the [`EdgeMass`] capability: discrete counts contribute a scalar per edge
//! and nothing else, while a mass profile additionally contributes the
//! weighted sum over its own interior (see [`distal_edge_sum`]) whenever the
//! subtree hanging off an edge has accumulated no mass of its own.

use crate::error::{DiversityError, Result};
use crate::mass::{DiscreteCounts, MassProfile};
use crate::topology::{EdgeIndex, Topology};
use crate::weighting::{Weighting, equals_approx};

/// Per-edge local mass as seen by the postorder aggregation.
pub trait EdgeMass {
    /// Mass attached directly to this edge.
    fn edge_mass(&self, edge: EdgeIndex) -> f64;

    /// Total mass of the sample. Must be positive.
    fn total_mass(&self) -> f64;

    /// Weighted contribution of mass along the interior of `edge`, consulted
    /// when the subtree below the edge carries no accumulated mass.
    fn interior_sum(&self, edge: EdgeIndex, weighting: Weighting) -> Result<f64>;
}

impl EdgeMass for DiscreteCounts {
    fn edge_mass(&self, edge: EdgeIndex) -> f64 {
        self.count(edge) as f64
    }

    fn total_mass(&self) -> f64 {
        self.total() as f64
    }

    /// Discrete queries sit at their edge's terminal placement; there is no
    /// interior structure to sum over.
    fn interior_sum(&self, _edge: EdgeIndex, _weighting: Weighting) -> Result<f64> {
        Ok(0.0)
    }
}

impl EdgeMass for MassProfile {
    fn edge_mass(&self, edge: EdgeIndex) -> f64 {
        self.edge_total(edge)
    }

    fn total_mass(&self) -> f64 {
        self.total()
    }

    fn interior_sum(&self, edge: EdgeIndex, weighting: Weighting) -> Result<f64> {
        distal_edge_sum(self.points(edge), edge, weighting)
    }
}

/// Weighted sum over the interior of a single edge, ignoring everything above
/// it in the tree.
///
/// The distal fraction is not constant along an edge holding several mass
/// points: it steps upward as the scan moves from the distal tip toward the
/// proximal node. Points are processed most-distal first, accumulating
/// `dragged_mass`, the mass distal to the current scan position (a
/// monofurcating subtree of sorts). Each point weights the segment between
/// itself and the next (more proximal) point, the last point weighting the
/// run down to the proximal node.
///
/// # Errors
/// `MassOutOfRange` if the accumulated mass leaves [0, 1] beyond tolerance;
/// `MisorderedMasses` if a segment comes out non-positive (overlapping or
/// misordered points).
pub fn distal_edge_sum(
    points: &[(f64, f64)],
    edge: EdgeIndex,
    weighting: Weighting,
) -> Result<f64> {
    let mut sum = 0.0;
    let mut dragged_mass = 0.0;

    let mut iter = points.iter().rev().peekable();
    while let Some(&(offset, mass)) = iter.next() {
        dragged_mass += mass;
        if !(dragged_mass > 0.0 || equals_approx(dragged_mass, 0.0))
            || !(dragged_mass < 1.0 || equals_approx(dragged_mass, 1.0))
        {
            return Err(DiversityError::MassOutOfRange {
                edge,
                mass: dragged_mass,
            });
        }

        // segment down to the next point toward the proximal node, or down to
        // the proximal node itself for the last point
        let segment = match iter.peek() {
            Some(&&(next_offset, _)) => offset - next_offset,
            None => offset,
        };
        if segment <= 0.0 {
            return Err(DiversityError::MisorderedMasses {
                edge,
                length: segment,
            });
        }

        sum += segment * weighting.eval(dragged_mass);
    }
    Ok(sum)
}

/// Computes Σ branch_length(e) · g(D(e)) over all edges of `topology`.
///
/// Postorder pass: a leaf edge has no mass on its distal side, so D = 0. An
/// internal edge sums both children's accumulated distal mass plus the mass
/// attached to the children themselves. Before an internal edge is finalized,
/// any child whose accumulated distal mass is ≈ 0 has the mass along its own
/// interior folded in via [`EdgeMass::interior_sum`]: that mass is not part
/// of the tree structure proper and would otherwise go unweighted.
///
/// # Errors
/// `EmptySample` for a zero total mass; `TraversalMismatch` if the traversal
/// did not visit exactly `edge_count` edges; plus anything
/// [`distal_edge_sum`] raises.
pub fn weighted_distal_sum<M: EdgeMass>(
    topology: &Topology,
    mass: &M,
    weighting: Weighting,
) -> Result<f64> {
    let total = mass.total_mass();
    if !(total > 0.0) {
        return Err(DiversityError::EmptySample);
    }

    // accumulated mass on the distal side, indexed by edge
    let mut distal = vec![0.0f64; topology.edge_count()];
    let mut result = 0.0;
    let mut visited = 0usize;

    for edge in topology.postorder() {
        visited += 1;

        // a leaf edge cannot have mass on its distal side
        let Some((lhs, rhs)) = topology.children(edge) else {
            distal[edge] = 0.0;
            continue;
        };

        distal[edge] =
            distal[lhs] + mass.edge_mass(lhs) + distal[rhs] + mass.edge_mass(rhs);

        // fold in mass sitting along a child edge whose subtree is empty
        if equals_approx(distal[lhs], 0.0) {
            result += mass.interior_sum(lhs, weighting)?;
        }
        if equals_approx(distal[rhs], 0.0) {
            result += mass.interior_sum(rhs, weighting)?;
        }

        let d = distal[edge] / total;
        result += topology.branch_length(edge) * weighting.eval(d);
    }

    if visited != topology.edge_count() {
        return Err(DiversityError::TraversalMismatch {
            visited,
            expected: topology.edge_count(),
        });
    }
    Ok(result)
}
