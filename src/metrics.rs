//! Per-sample metric driver.
//!
//! Evaluates the fixed metric family for one sample: phylogenetic entropy
//! (negated so typical values print non-negative), quadratic entropy, and
//! balance-weighted PD at five θ values, each via its own full aggregation
//! pass. Samples are independent, so batches run through rayon with no shared
//! state.

use crate::diversity::{EdgeMass, weighted_distal_sum};
use crate::error::Result;
use crate::topology::Topology;
use crate::weighting::Weighting;
use rayon::prelude::*;

/// θ values of the balance-weighted PD family, in output order.
pub const THETA_SET: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Metric names in the order [`sample_scores`] emits them.
pub fn metric_names() -> Vec<String> {
    let mut names = vec!["phylo_entropy".to_string(), "quadratic".to_string()];
    for theta in THETA_SET {
        names.push(format!("bwpd_{theta}"));
    }
    names
}

/// Computes all metrics for one sample, in [`metric_names`] order.
pub fn sample_scores<M: EdgeMass>(topology: &Topology, mass: &M) -> Result<Vec<f64>> {
    let mut scores = Vec::with_capacity(2 + THETA_SET.len());
    scores.push(-weighted_distal_sum(topology, mass, Weighting::Entropy)?);
    scores.push(weighted_distal_sum(
        topology,
        mass,
        Weighting::QuadraticEntropy,
    )?);
    for theta in THETA_SET {
        scores.push(weighted_distal_sum(
            topology,
            mass,
            Weighting::Step { theta },
        )?);
    }
    Ok(scores)
}

/// Scores a batch of samples in parallel, one result row per sample.
///
/// Each sample owns its topology (placement files each carry their own
/// reference tree), so the units share nothing.
pub fn compute_scores_parallel<M: EdgeMass + Sync>(
    samples: &[(Topology, M)],
) -> Vec<Result<Vec<f64>>> {
    samples
        .par_iter()
        .map(|(topology, mass)| sample_scores(topology, mass))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::DiscreteCounts;
    use crate::weighting::EPSILON;
    use itertools::Itertools;
    use phylotree::tree::Tree as PhyloTree;

    fn fixture() -> (Topology, DiscreteCounts) {
        let tree = PhyloTree::from_newick("((A:1.0,B:1.0):2.0,(C:1.0,D:1.0):3.0);").unwrap();
        let (topo, node_edges) = Topology::from_tree(&tree).unwrap();
        let mut counts = DiscreteCounts::new(topo.edge_count());
        for leaf_id in tree.get_leaves() {
            let name = tree.get(&leaf_id).unwrap().name.clone().unwrap();
            if name == "A" || name == "C" {
                counts.add(node_edges[&leaf_id], 1);
            }
        }
        (topo, counts)
    }

    #[test]
    fn header_names_are_fixed() {
        assert_eq!(
            metric_names(),
            vec![
                "phylo_entropy",
                "quadratic",
                "bwpd_0",
                "bwpd_0.25",
                "bwpd_0.5",
                "bwpd_0.75",
                "bwpd_1",
            ]
        );
    }

    #[test]
    fn scores_come_out_in_header_order() {
        let (topo, counts) = fixture();
        let scores = sample_scores(&topo, &counts).unwrap();
        assert_eq!(scores.len(), 7);

        // both internal edges split the mass 50/50
        let expected_entropy = -(2.0 + 3.0) * 0.5 * 0.5f64.ln();
        assert!((scores[0] - expected_entropy).abs() < EPSILON);
        assert!((scores[1] - 5.0 * 0.25).abs() < EPSILON);
        // at an exact 50/50 split every θ weights the split edges fully
        for bwpd in &scores[2..] {
            assert!((bwpd - 5.0).abs() < EPSILON);
        }
    }

    #[test]
    fn entropy_is_negated_to_non_negative() {
        let (topo, counts) = fixture();
        let scores = sample_scores(&topo, &counts).unwrap();
        assert!(scores[0] > 0.0);
    }

    #[test]
    fn parallel_batch_matches_sequential() {
        let (topo_a, counts_a) = fixture();
        let (topo_b, counts_b) = fixture();
        let sequential = vec![
            sample_scores(&topo_a, &counts_a).unwrap(),
            sample_scores(&topo_b, &counts_b).unwrap(),
        ];
        let samples = vec![(topo_a, counts_a), (topo_b, counts_b)];
        let parallel = compute_scores_parallel(&samples);
        for (seq, par) in sequential.iter().zip_eq(&parallel) {
            assert_eq!(seq, par.as_ref().unwrap());
        }
    }
}
