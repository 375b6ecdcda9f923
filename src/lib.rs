//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `topology`: indexed immutable view of a bifurcating reference tree.
//! - `mass`: discrete count and continuous mass-profile sample models.
//! - `weighting`: the fixed family of edge weighting functions.
//! - `diversity`: postorder distal-fraction aggregation engine.
//! - `metrics`: per-sample metric driver and parallel batch scoring.
//! - `io`: reading jplace / NHX inputs and writing CSV score tables.
//! - `error`: crate-wide error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).
//!
//! Public API kept stable by re-exporting key items from the modules.

pub mod diversity;
pub mod error;
pub mod io;
pub mod mass;
pub mod metrics;
pub mod topology;
pub mod weighting;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use diversity::{EdgeMass, weighted_distal_sum};
pub use error::{DiversityError, Result};
pub use io::{read_jplace_sample, read_nhx_sample, write_scores_csv};
pub use mass::{DiscreteCounts, MassProfile};
pub use metrics::{compute_scores_parallel, metric_names, sample_scores};
pub use topology::Topology;
pub use weighting::Weighting;
