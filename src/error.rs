use gllm_value_model::ValueError;
use thiserror::Error;

use crate::gpu::DeviceError;

/// Errors that abort a run.
///
/// Verification mismatches are not errors while a run is in progress; they
/// are collected into the report and only surface as
/// [`EngineError::Verification`] through `RunReport::into_result`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("case {case} input types [{found}] do not match parameter types [{expected}]")]
    CaseShapeMismatch {
        case: usize,
        found: String,
        expected: String,
    },
    #[error("unsupported layout for type {0}")]
    UnsupportedLayout(String),
    #[error("value codec error: {0}")]
    Value(#[from] ValueError),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("flight control fault: {0}")]
    FlightControl(String),
    #[error("{failed_batches} batch(es) failed verification:\n{diagnostic}")]
    Verification {
        failed_batches: usize,
        diagnostic: String,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
