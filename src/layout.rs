//! Binding-buffer layout: per-type strides, case record layout, and the
//! batch capacity derived from them.
//!
//! Strides here are the padded slot sizes of the synthesized struct members, so the
//! host packer and the program's record layout agree byte-for-byte.

use gllm_value_model::ValueType;

use crate::error::{EngineError, EngineResult};
use crate::gpu::DeviceLimits;
use crate::types::{Case, InputSource};

/// Cases per batch when inputs are baked in as constants. Drivers get slow
/// to optimize programs with many more constants than this.
pub const CONST_BATCH_SIZE: usize = 32;

/// Upper bound on uniform input bytes per batch; larger uniform buffers
/// make pipeline creation slow on some drivers.
pub const MAX_UNIFORM_BATCH_BYTES: u64 = 2048;

/// Byte stride of one value of `ty` inside an input record or output slot.
pub fn stride_of(ty: &ValueType) -> EngineResult<usize> {
    let stride = match *ty {
        ValueType::Scalar(_) => Some(16),
        ValueType::Vector { width: 2..=4, .. } => Some(16),
        ValueType::Matrix { cols, rows, .. } => match (cols, rows) {
            (2, 2) => Some(16),
            (2, 3) | (2, 4) | (3, 2) | (4, 2) => Some(32),
            (3, 3) | (3, 4) | (4, 3) | (4, 4) => Some(64),
            _ => None,
        },
        ValueType::Vector { .. } => None,
    };
    stride.ok_or_else(|| EngineError::UnsupportedLayout(ty.to_string()))
}

/// Sum of [`stride_of`] over `types`: the size of one input record.
pub fn combined_stride(types: &[ValueType]) -> EngineResult<usize> {
    types.iter().map(stride_of).sum()
}

/// Placement of one parameter inside an input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    pub index: usize,
    pub offset: usize,
    pub stride: usize,
    pub ty: ValueType,
}

/// Offsets of every parameter inside an input record, in declaration order.
pub fn struct_layout(types: &[ValueType]) -> EngineResult<Vec<MemberLayout>> {
    let mut offset = 0;
    types
        .iter()
        .enumerate()
        .map(|(index, ty)| {
            let stride = stride_of(ty)?;
            let member = MemberLayout {
                index,
                offset,
                stride,
                ty: ty.clone(),
            };
            offset += stride;
            Ok(member)
        })
        .collect()
}

/// Largest number of cases one batch may hold.
///
/// Buffer modes are bounded by the input binding limit and, like every
/// mode, by the output buffer fitting the storage binding limit.
pub fn batch_capacity(
    source: InputSource,
    parameter_types: &[ValueType],
    result_type: &ValueType,
    limits: &DeviceLimits,
) -> EngineResult<usize> {
    let output_stride = stride_of(result_type)? as u64;
    let output_cap = limits.max_storage_buffer_binding_size / output_stride;

    let input_cap = match source {
        InputSource::Const => CONST_BATCH_SIZE as u64,
        InputSource::Uniform | InputSource::StorageRead | InputSource::StorageReadWrite => {
            let record = combined_stride(parameter_types)? as u64;
            if record == 0 {
                return Err(EngineError::InvalidInput(format!(
                    "{source} input source needs at least one parameter"
                )));
            }
            let budget = match source {
                InputSource::Uniform => {
                    MAX_UNIFORM_BATCH_BYTES.min(limits.max_uniform_buffer_binding_size)
                }
                _ => limits.max_storage_buffer_binding_size,
            };
            budget / record
        }
    };

    let capacity = usize::try_from(input_cap.min(output_cap)).unwrap_or(usize::MAX);
    if capacity == 0 {
        return Err(EngineError::InvalidInput(format!(
            "a single case does not fit the {source} binding limits"
        )));
    }
    Ok(capacity)
}

/// Split `cases` into consecutive batches of at most `capacity` cases.
pub fn partition(cases: &[Case], capacity: usize) -> EngineResult<std::slice::Chunks<'_, Case>> {
    if capacity == 0 {
        return Err(EngineError::InvalidInput("batch size must be positive".into()));
    }
    Ok(cases.chunks(capacity))
}
