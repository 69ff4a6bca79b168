// sunline_core/src/frames.rs

use nalgebra::{Matrix3, Vector3};

/// Below this norm of `heading × reference` the local frame is not defined.
pub const DEGENERATE_BASIS_EPSILON: f64 = 1e-5;
/// Tolerance used when identifying which candidate is the active reference.
pub const CANDIDATE_MATCH_TOLERANCE: f64 = 1e-10;

/// The local "sun" frame S built from the heading estimate and a secondary
/// body-fixed reference vector.
///
/// The columns of `dcm_bs` are the S-frame axes expressed in the body frame:
/// `s1` along the heading, `s2` normal to the heading/reference plane and
/// `s3` completing the triad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBasis {
    /// Direction cosine matrix mapping S-frame components into the body frame.
    pub dcm_bs: Matrix3<f64>,
    /// True when the heading and reference are (nearly) parallel and the
    /// identity fallback was used.
    pub degenerate: bool,
}

impl FrameBasis {
    /// Builds the basis. The heading does not need to be normalized.
    pub fn new(heading: &Vector3<f64>, reference: &Vector3<f64>) -> Self {
        let normal = heading.cross(reference);
        if normal.norm() < DEGENERATE_BASIS_EPSILON {
            return Self {
                dcm_bs: Matrix3::identity(),
                degenerate: true,
            };
        }

        let s1 = heading.normalize();
        let s2 = normal.normalize();
        let s3 = heading.cross(&s2).normalize();

        Self {
            dcm_bs: Matrix3::from_columns(&[s1, s2, s3]),
            degenerate: false,
        }
    }

    /// Rotates a vector expressed in the local frame into the body frame.
    pub fn to_body(&self, v_s: &Vector3<f64>) -> Vector3<f64> {
        self.dcm_bs * v_s
    }
}

/// Absolute cosine between the reference vector and the normalized heading.
/// A zero heading has no direction and reports zero alignment.
pub fn alignment(heading: &Vector3<f64>, reference: &Vector3<f64>) -> f64 {
    let norm = heading.norm();
    if norm < f64::EPSILON {
        return 0.0;
    }
    (reference.dot(heading) / norm).abs()
}

/// The fixed pair of body axes the filter alternates between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceCandidates {
    pub primary: Vector3<f64>,
    pub secondary: Vector3<f64>,
}

impl Default for ReferenceCandidates {
    /// Body x and body y.
    fn default() -> Self {
        Self {
            primary: Vector3::x(),
            secondary: Vector3::y(),
        }
    }
}

impl ReferenceCandidates {
    /// Returns the candidate that is *not* the current reference.
    /// Anything that is not the primary axis switches back to the primary.
    pub fn other(&self, current: &Vector3<f64>) -> Vector3<f64> {
        if (current - self.primary).amax() < CANDIDATE_MATCH_TOLERANCE {
            self.secondary
        } else {
            self.primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_basis_is_orthonormal_and_aligned_with_heading() {
        let heading = Vector3::new(0.3, 0.8, -0.2);
        let basis = FrameBasis::new(&heading, &Vector3::x());

        assert!(!basis.degenerate);
        let c = basis.dcm_bs;
        assert_abs_diff_eq!(c.transpose() * c, Matrix3::identity(), epsilon = 1e-12);
        assert_abs_diff_eq!(c.column(0).into_owned(), heading.normalize(), epsilon = 1e-12);
        assert_abs_diff_eq!(c.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_reference_falls_back_to_identity() {
        let heading = Vector3::new(2.0, 0.0, 0.0);
        let basis = FrameBasis::new(&heading, &Vector3::x());

        assert!(basis.degenerate);
        assert_eq!(basis.dcm_bs, Matrix3::identity());
    }

    #[test]
    fn test_alignment_ignores_heading_magnitude() {
        let reference = Vector3::y();
        assert_abs_diff_eq!(
            alignment(&Vector3::new(0.0, -4.0, 0.0), &reference),
            1.0,
            epsilon = 1e-15
        );
        assert_eq!(alignment(&Vector3::zeros(), &reference), 0.0);
    }

    #[test]
    fn test_candidates_alternate() {
        let candidates = ReferenceCandidates::default();
        assert_eq!(candidates.other(&Vector3::x()), Vector3::y());
        assert_eq!(candidates.other(&Vector3::y()), Vector3::x());
        assert_eq!(candidates.other(&Vector3::z()), Vector3::x());
    }
}
