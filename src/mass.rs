//! Per-sample mass assignments over a [`Topology`](crate::topology::Topology).
//!
//! Two representations:
//! - [`DiscreteCounts`]: an integer query count per edge, for samples built
//!   from best-hit placements.
//! - [`MassProfile`]: per edge, an ordered list of `(proximal_offset, mass)`
//!   points: mass positioned anywhere along the branch, not only at its
//!   nodes. Offsets are measured from the proximal (rootward) node, so a
//!   point at `offset == branch_length` sits on the distal node.
//!
//! Both are constructed by the reader layer and read-only afterwards. A
//! profile must be [`normalized`](MassProfile::normalized) before it is
//! handed to the aggregation engine: total mass 1.0, every mass non-negative,
//! every offset within its branch.

use crate::error::{DiversityError, Result};
use crate::topology::{EdgeIndex, Topology};
use crate::weighting::equals_approx;

/// Discrete per-edge query counts.
#[derive(Debug, Clone)]
pub struct DiscreteCounts {
    counts: Vec<u64>,
    total: u64,
}

impl DiscreteCounts {
    pub fn new(edge_count: usize) -> Self {
        DiscreteCounts {
            counts: vec![0; edge_count],
            total: 0,
        }
    }

    /// Attaches `count` more queries to `edge`.
    pub fn add(&mut self, edge: EdgeIndex, count: u64) {
        self.counts[edge] += count;
        self.total += count;
    }

    #[inline]
    pub fn count(&self, edge: EdgeIndex) -> u64 {
        self.counts[edge]
    }

    /// Total query count across all edges.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Continuous per-edge mass points, ordered by proximal offset.
#[derive(Debug, Clone)]
pub struct MassProfile {
    /// `(proximal_offset, mass)` per edge, ascending offset, offsets unique.
    points: Vec<Vec<(f64, f64)>>,
    /// Cached sum of mass per edge.
    edge_totals: Vec<f64>,
}

impl MassProfile {
    pub fn new(edge_count: usize) -> Self {
        MassProfile {
            points: vec![Vec::new(); edge_count],
            edge_totals: vec![0.0; edge_count],
        }
    }

    /// Deposits `mass` at `offset` from the proximal node of `edge`.
    /// Mass landing on an already-occupied offset is summed into that point.
    pub fn deposit(&mut self, edge: EdgeIndex, offset: f64, mass: f64) {
        let points = &mut self.points[edge];
        match points.binary_search_by(|(o, _)| o.total_cmp(&offset)) {
            Ok(i) => points[i].1 += mass,
            Err(i) => points.insert(i, (offset, mass)),
        }
        self.edge_totals[edge] += mass;
    }

    /// Validates the profile against `topology` and scales it to total mass
    /// 1.0.
    ///
    /// # Errors
    /// `MassOutOfRange` for a negative mass, `OffsetOutOfRange` for an offset
    /// outside `[0, branch_length]` (within tolerance), `EmptySample` if the
    /// profile carries no mass.
    pub fn normalized(mut self, topology: &Topology) -> Result<Self> {
        let mut total = 0.0;
        for (edge, points) in self.points.iter().enumerate() {
            let length = topology.branch_length(edge);
            for &(offset, mass) in points {
                if mass < 0.0 {
                    return Err(DiversityError::MassOutOfRange { edge, mass });
                }
                if offset < 0.0 || (offset > length && !equals_approx(offset, length)) {
                    return Err(DiversityError::OffsetOutOfRange { edge, offset });
                }
                total += mass;
            }
        }
        if equals_approx(total, 0.0) {
            return Err(DiversityError::EmptySample);
        }

        for points in &mut self.points {
            for point in points.iter_mut() {
                point.1 /= total;
            }
        }
        for edge_total in &mut self.edge_totals {
            *edge_total /= total;
        }
        Ok(self)
    }

    /// The edge's mass points, ascending by proximal offset.
    #[inline]
    pub fn points(&self, edge: EdgeIndex) -> &[(f64, f64)] {
        &self.points[edge]
    }

    /// Sum of the edge's mass values.
    #[inline]
    pub fn edge_total(&self, edge: EdgeIndex) -> f64 {
        self.edge_totals[edge]
    }

    /// Total mass across all edges.
    pub fn total(&self) -> f64 {
        self.edge_totals.iter().sum()
    }
}
