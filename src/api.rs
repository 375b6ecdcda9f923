//! Python binding layer for diversity calculations.
//!
//! Provides Python functions for scoring placement samples with the full
//! metric family (phylogenetic entropy, quadratic entropy, BWPD).

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::diversity::EdgeMass;
use crate::io::{read_jplace_sample, read_nhx_sample};
use crate::metrics::{compute_scores_parallel, metric_names};
use crate::topology::Topology;

/// Compute diversity metrics for a batch of jplace files.
///
/// Args:
///     paths: List of file paths to .jplace (optionally .gz) files
///     best_hit_counts: Score discrete best-hit counts instead of the
///         continuous placement mass profile (default: False)
///
/// Returns:
///     A tuple of (sample_names, metric_names, score_matrix) where
///     score_matrix[i][j] is the j-th metric of the i-th sample.
///
/// Raises:
///     ValueError: If a file cannot be read, its tree is not strictly
///     bifurcating, or its placement data is malformed.
#[pyfunction]
#[pyo3(signature = (paths, best_hit_counts=false))]
fn jplace_diversity(
    paths: Vec<String>,
    best_hit_counts: bool,
) -> PyResult<(Vec<String>, Vec<String>, Vec<Vec<f64>>)> {
    if paths.is_empty() {
        return Err(PyValueError::new_err("no input files given"));
    }

    let mut names = Vec::with_capacity(paths.len());
    let rows = if best_hit_counts {
        let mut samples = Vec::with_capacity(paths.len());
        for path in &paths {
            let placed = read_jplace_sample(path)
                .map_err(|e| PyValueError::new_err(format!("{path}: {e}")))?;
            let counts = placed.best_hit_counts();
            names.push(placed.name);
            samples.push((placed.topology, counts));
        }
        score_batch(&names, &samples)?
    } else {
        let mut samples = Vec::with_capacity(paths.len());
        for path in &paths {
            let placed = read_jplace_sample(path)
                .map_err(|e| PyValueError::new_err(format!("{path}: {e}")))?;
            let profile = placed
                .mass_profile()
                .map_err(|e| PyValueError::new_err(format!("{}: {e}", placed.name)))?;
            names.push(placed.name);
            samples.push((placed.topology, profile));
        }
        score_batch(&names, &samples)?
    };

    Ok((names, metric_names(), rows))
}

/// Compute diversity metrics for a batch of NHX species-count trees.
///
/// Args:
///     paths: List of file paths to NHX-annotated Newick files
///
/// Returns:
///     A tuple of (sample_names, metric_names, score_matrix).
///
/// Raises:
///     ValueError: If a file cannot be read or its tree is malformed.
#[pyfunction]
fn nhx_diversity(paths: Vec<String>) -> PyResult<(Vec<String>, Vec<String>, Vec<Vec<f64>>)> {
    if paths.is_empty() {
        return Err(PyValueError::new_err("no input files given"));
    }

    let mut names = Vec::with_capacity(paths.len());
    let mut samples = Vec::with_capacity(paths.len());
    for path in &paths {
        let sample = read_nhx_sample(path)
            .map_err(|e| PyValueError::new_err(format!("{path}: {e}")))?;
        names.push(sample.name);
        samples.push((sample.topology, sample.profile));
    }
    let rows = score_batch(&names, &samples)?;

    Ok((names, metric_names(), rows))
}

/// Scores samples in parallel and attaches sample names to failures.
fn score_batch<M: EdgeMass + Sync>(
    names: &[String],
    samples: &[(Topology, M)],
) -> PyResult<Vec<Vec<f64>>> {
    names
        .iter()
        .zip(compute_scores_parallel(samples))
        .map(|(name, result)| {
            result.map_err(|e| PyValueError::new_err(format!("sample {name}: {e}")))
        })
        .collect()
}

/// Python module definition
#[pymodule]
fn placement_diversity(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(jplace_diversity, m)?)?;
    m.add_function(wrap_pyfunction!(nhx_diversity, m)?)?;
    Ok(())
}
