// sunline_core/src/prelude.rs

// --- Core Abstractions ---
pub use crate::estimation::{CorrectionMode, CycleReport, FilterPhase, SunlineEstimator};
pub use crate::fsw::{Publisher, Stamped, Subscriber, SunlineFswModule};

// --- Core Data Structures ---
pub use crate::config::SunlineFilterConfig;
pub use crate::error::FilterError;
pub use crate::frames::{FrameBasis, ReferenceCandidates};
pub use crate::messages::{
    CssArrayMessage, CssConfigMessage, FilterOutput, NavAttMessage, SensorSample,
    SunlineFilterMessage,
};
pub use crate::types::{StateMatrix, StateVector, MAX_CSS_MEASUREMENTS, MAX_CSS_SENSORS, NANO2SEC};

// --- Estimation Algorithms ---
pub use crate::estimation::filters::sekf::SunlineSekf;
pub use crate::estimation::filters::ukf::{SunlineUkf, UkfParams};
