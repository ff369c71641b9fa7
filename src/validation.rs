//! Up-front validation of an operation definition.
//!
//! Everything checked here is a configuration error: it is raised before
//! any program is built or any batch is dispatched.
//!
//! # Design
//!
//! - Case shapes are checked against the declared parameter types
//! - Builder signature rules live on `ShaderBuilder::validate`
//! - Buffer sizes handed to the device go through `to_u64` with an overflow check

use gllm_value_model::ValueType;

use crate::error::{EngineError, EngineResult};
use crate::types::{Case, InputSource};
use crate::wgsl_builder::ShaderBuilder;

fn join_types(types: &[ValueType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every case's input types must equal `parameter_types`.
pub fn validate_case_shapes(parameter_types: &[ValueType], cases: &[Case]) -> EngineResult<()> {
    for (index, case) in cases.iter().enumerate() {
        let shape_ok = case.inputs.len() == parameter_types.len()
            && case
                .inputs
                .iter()
                .zip(parameter_types)
                .all(|(value, ty)| value.ty() == ty);
        if !shape_ok {
            return Err(EngineError::CaseShapeMismatch {
                case: index,
                found: join_types(&case.input_types()),
                expected: join_types(parameter_types),
            });
        }
    }
    Ok(())
}

/// Case shapes plus builder signature for the chosen input source.
pub fn validate_definition(
    builder: &ShaderBuilder,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    source: InputSource,
) -> EngineResult<()> {
    validate_case_shapes(parameter_types, cases)?;
    builder.validate(parameter_types, result_type, source)
}

/// Byte size checked against `u64`, for buffer descriptors.
#[inline]
pub fn to_u64(count: usize, stride: usize, name: &str) -> EngineResult<u64> {
    count
        .checked_mul(stride)
        .and_then(|bytes| u64::try_from(bytes).ok())
        .ok_or_else(|| EngineError::InvalidInput(format!("{name} size overflow")))
}
