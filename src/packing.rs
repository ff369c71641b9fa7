//! Packing of scalar cases into vector cases.
//!
//! `W` consecutive scalar cases become one `vecW` case whose expectation
//! checks each lane against the expectation of the case it came from.

use std::sync::Arc;

use gllm_value_model::{Value, ValueType};

use crate::error::{EngineError, EngineResult};
use crate::expectation::{Comparator, Expectation, MatchResult};
use crate::types::{Case, VectorWidth};

/// Result of [`pack_scalars_to_vector`].
#[derive(Debug, Clone)]
pub struct PackedCases {
    pub parameter_types: Vec<ValueType>,
    pub result_type: ValueType,
    pub cases: Vec<Case>,
}

/// Lane-wise comparator of a packed case.
pub struct PackedComparator {
    packed_type: ValueType,
    lanes: Vec<Expectation>,
}

impl PackedComparator {
    #[must_use]
    pub fn lanes(&self) -> &[Expectation] {
        &self.lanes
    }
}

impl Comparator for PackedComparator {
    fn compare(&self, got: &Value) -> MatchResult {
        let lane_values: Vec<Value> = got.components().iter().copied().map(Value::from).collect();
        let mut matched = got.ty() == &self.packed_type && lane_values.len() == self.lanes.len();
        let mut got_lanes = Vec::with_capacity(self.lanes.len());
        let mut expected_lanes = Vec::with_capacity(self.lanes.len());
        for (lane, expectation) in lane_values.iter().zip(&self.lanes) {
            let result = expectation.evaluate(lane);
            matched &= result.matched;
            got_lanes.push(result.got);
            expected_lanes.push(result.expected);
        }
        MatchResult {
            matched,
            got: format!("{}({})", self.packed_type, got_lanes.join(", ")),
            expected: format!("{}({})", self.packed_type, expected_lanes.join(", ")),
        }
    }

    fn kind(&self) -> &'static str {
        "packed"
    }
}

/// Group scalar cases into `vecW` cases.
///
/// The final group reuses the last case for lanes past the end of the list,
/// so every packed case has exactly `W` populated lanes.
pub fn pack_scalars_to_vector(
    parameter_types: &[ValueType],
    result_type: &ValueType,
    cases: &[Case],
    width: VectorWidth,
) -> EngineResult<PackedCases> {
    if let Some(ty) = parameter_types
        .iter()
        .chain(std::iter::once(result_type))
        .find(|ty| !ty.is_scalar())
    {
        return Err(EngineError::InvalidInput(format!(
            "only scalar types can be packed into vectors, got {ty}"
        )));
    }

    let lanes = width.lanes();
    let vectorize = |ty: &ValueType| ValueType::vec(lanes as u8, ty.element());
    let packed_params: Vec<ValueType> = parameter_types.iter().map(vectorize).collect();
    let packed_result = vectorize(result_type);

    let case_count = cases.len().div_ceil(lanes);
    let mut packed = Vec::with_capacity(case_count);
    for group in 0..case_count {
        let members: Vec<&Case> = (0..lanes)
            .map(|lane| &cases[(group * lanes + lane).min(cases.len() - 1)])
            .collect();

        let inputs = (0..parameter_types.len())
            .map(|param| {
                let components = members
                    .iter()
                    .map(|case| {
                        case.inputs
                            .get(param)
                            .and_then(Value::as_scalar)
                            .ok_or_else(|| {
                                EngineError::InvalidInput(format!(
                                    "case input {param} is not a scalar"
                                ))
                            })
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(Value::vector(components)?)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let comparator = PackedComparator {
            packed_type: packed_result.clone(),
            lanes: members.iter().map(|case| case.expected.clone()).collect(),
        };
        packed.push(Case::new(inputs, Expectation::Comparator(Arc::new(comparator))));
    }

    Ok(PackedCases {
        parameter_types: packed_params,
        result_type: packed_result,
        cases: packed,
    })
}
