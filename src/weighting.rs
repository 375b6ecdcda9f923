//! Weighting functions folded over per-edge distal mass fractions.
//!
//! The set is small and fixed, so it is modeled as a closed enum rather than
//! a function pointer or trait object. Each variant is a pointwise function
//! g(x) over a mass fraction x ∈ [0, 1]:
//!
//! - `Entropy`: x·ln(x), with the limit value 0 at x = 0. Summed over edges
//!   (and negated by the metric driver) this gives phylogenetic entropy.
//! - `QuadraticEntropy`: x·(1−x), Rao's quadratic entropy analogue.
//! - `Step { theta }`: (2·min(x, 1−x))^θ, and 0 when x ≈ 0 or x ≈ 1: an
//!   edge whose mass split is degenerate lies outside the sample's spanning
//!   structure and contributes nothing. θ = 0 recovers the classic unweighted
//!   presence/absence measure; θ = 1 fully down-weights lopsided splits.

/// Absolute tolerance for all approximate float comparisons in this crate.
pub const EPSILON: f64 = 1e-10;

/// Approximate equality with absolute tolerance [`EPSILON`].
#[inline]
pub fn equals_approx(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// A pointwise weighting function g(x) over a distal mass fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    Entropy,
    QuadraticEntropy,
    Step { theta: f64 },
}

impl Weighting {
    /// Evaluates g(x). Callers guarantee x ∈ [0, 1] within tolerance.
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            Weighting::Entropy => {
                if equals_approx(x, 0.0) {
                    0.0
                } else {
                    x * x.ln()
                }
            }
            Weighting::QuadraticEntropy => x * (1.0 - x),
            Weighting::Step { theta } => {
                debug_assert!((0.0..=1.0).contains(&theta));
                // 0 or 1 fraction means the edge is not part of the sample's
                // spanning structure
                if equals_approx(x, 0.0) || equals_approx(x, 1.0) {
                    0.0
                } else {
                    (2.0 * x.min(1.0 - x)).powf(theta)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_boundaries() {
        // no NaN / log(0) leakage at either boundary
        assert_eq!(Weighting::Entropy.eval(0.0), 0.0);
        assert_eq!(Weighting::Entropy.eval(1.0), 0.0);
        let mid = Weighting::Entropy.eval(0.5);
        assert!((mid - 0.5 * 0.5f64.ln()).abs() < EPSILON);
        assert!(mid < 0.0);
    }

    #[test]
    fn quadratic_entropy_values() {
        assert_eq!(Weighting::QuadraticEntropy.eval(0.0), 0.0);
        assert_eq!(Weighting::QuadraticEntropy.eval(1.0), 0.0);
        assert!((Weighting::QuadraticEntropy.eval(0.5) - 0.25).abs() < EPSILON);
        assert!((Weighting::QuadraticEntropy.eval(0.25) - 0.1875).abs() < EPSILON);
    }

    #[test]
    fn step_excludes_non_spanning_edges() {
        for theta in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let g = Weighting::Step { theta };
            assert_eq!(g.eval(0.0), 0.0);
            assert_eq!(g.eval(1.0), 0.0);
            // within tolerance of the boundaries counts as outside the spanning tree
            assert_eq!(g.eval(1e-11), 0.0);
            assert_eq!(g.eval(1.0 - 1e-11), 0.0);
        }
    }

    #[test]
    fn step_theta_zero_is_presence_absence() {
        let g = Weighting::Step { theta: 0.0 };
        assert_eq!(g.eval(0.3), 1.0);
        assert_eq!(g.eval(0.9), 1.0);
    }

    #[test]
    fn step_theta_one_downweights_lopsided_splits() {
        let g = Weighting::Step { theta: 1.0 };
        assert!((g.eval(0.5) - 1.0).abs() < EPSILON);
        assert!((g.eval(0.25) - 0.5).abs() < EPSILON);
        // symmetric in x and 1-x
        assert!((g.eval(0.25) - g.eval(0.75)).abs() < EPSILON);
    }
}
