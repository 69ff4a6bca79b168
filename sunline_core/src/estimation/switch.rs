// sunline_core/src/estimation/switch.rs

use log::info;
use nalgebra::Vector3;

use crate::frames::{alignment, FrameBasis, ReferenceCandidates};
use crate::types::{heading_of, StateMatrix, StateVector, HEADING_STATES, RATE_STATES};

/// True when the heading has come close enough to the reference vector that
/// the local frame is about to degenerate.
pub fn switch_needed(heading: &Vector3<f64>, reference: &Vector3<f64>, threshold: f64) -> bool {
    alignment(heading, reference) > threshold
}

/// State, error and covariance re-expressed against a new reference vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSwitch {
    pub reference: Vector3<f64>,
    pub state: StateVector,
    pub carried_error: StateVector,
    pub covariance: StateMatrix,
    /// The change of basis that was applied.
    pub rotation: StateMatrix,
}

/// Change-of-basis matrix between the local frames built on `old` and `new`.
///
/// Identity on the heading; the rate block is the lower-right 2x2 of
/// `C_BS(new)ᵀ · C_BS(old)`, both frames sharing their first axis.
pub fn switch_matrix(
    heading: &Vector3<f64>,
    old: &Vector3<f64>,
    new: &Vector3<f64>,
) -> StateMatrix {
    let dcm_old = FrameBasis::new(heading, old).dcm_bs;
    let dcm_new = FrameBasis::new(heading, new).dcm_bs;
    let dcm_snew_sold = dcm_new.transpose() * dcm_old;

    let mut rotation = StateMatrix::identity();
    rotation
        .fixed_view_mut::<RATE_STATES, RATE_STATES>(HEADING_STATES, HEADING_STATES)
        .copy_from(&dcm_snew_sold.fixed_view::<RATE_STATES, RATE_STATES>(1, 1));
    rotation
}

/// Swaps to the other reference candidate and rotates everything that is
/// expressed in the local frame.
///
/// `state` should already include any carried error (see `synchronize`) so the
/// new frame is built on the best available heading.
pub fn switch_frame(
    reference: &Vector3<f64>,
    candidates: &ReferenceCandidates,
    state: &StateVector,
    carried_error: &StateVector,
    covariance: &StateMatrix,
) -> FrameSwitch {
    let heading = heading_of(state);
    let new_reference = candidates.other(reference);
    let rotation = switch_matrix(&heading, reference, &new_reference);

    info!(
        "sunline frame switch: reference [{:.3}, {:.3}, {:.3}] -> [{:.3}, {:.3}, {:.3}]",
        reference.x, reference.y, reference.z, new_reference.x, new_reference.y, new_reference.z
    );

    FrameSwitch {
        reference: new_reference,
        state: rotation * state,
        carried_error: rotation * carried_error,
        covariance: rotation * covariance * rotation.transpose(),
        rotation,
    }
}
