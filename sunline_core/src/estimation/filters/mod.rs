// sunline_core/src/estimation/filters/mod.rs

pub mod sekf;
pub mod ukf;

use log::error;

use crate::error::FilterError;
use crate::estimation::FilterPhase;

/// Common entry checks of `update`, run before anything is mutated.
pub(crate) fn check_cycle_entry(
    phase: FilterPhase,
    call_time: f64,
    time_tag: f64,
) -> Result<(), FilterError> {
    if phase != FilterPhase::Ready {
        error!("sunline update refused: filter has not been reset");
        return Err(FilterError::NotInitialized);
    }
    if call_time < time_tag {
        error!(
            "sunline update refused: call time {} s precedes time tag {} s",
            call_time, time_tag
        );
        return Err(FilterError::ClockRegression {
            call_time,
            time_tag,
        });
    }
    Ok(())
}
