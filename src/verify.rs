//! Result verification: decode a batch's output buffer and judge every case.

use std::fmt;

use gllm_value_model::ValueType;

use crate::error::EngineResult;
use crate::layout::stride_of;
use crate::types::Case;

/// One mismatching case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Index of the case within its batch.
    pub case_index: usize,
    pub inputs: String,
    pub returned: String,
    pub expected: String,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) -> returned: {}, expected: {}",
            self.inputs, self.returned, self.expected
        )
    }
}

/// Verdict for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub case_count: usize,
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// All failure records, one per line.
    pub fn diagnostic(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Decode one value per case at `i * stride_of(result_type)` and evaluate
/// each case's expectation. Every mismatch is recorded.
pub fn verify_outputs(
    bytes: &[u8],
    cases: &[Case],
    result_type: &ValueType,
) -> EngineResult<BatchReport> {
    let stride = stride_of(result_type)?;
    let returned = cases
        .iter()
        .enumerate()
        .map(|(i, _)| result_type.read(bytes, i * stride))
        .collect::<Result<Vec<_>, _>>()?;

    let failures = cases
        .iter()
        .zip(&returned)
        .enumerate()
        .filter_map(|(case_index, (case, got))| {
            let verdict = case.expected.evaluate(got);
            (!verdict.matched).then(|| FailureRecord {
                case_index,
                inputs: case.describe_inputs(),
                returned: verdict.got,
                expected: verdict.expected,
            })
        })
        .collect();

    Ok(BatchReport {
        case_count: cases.len(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use gllm_value_model::Value;

    fn encode(values: &[Value]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * 16];
        for (i, v) in values.iter().enumerate() {
            v.write_to(&mut bytes, i * 16).unwrap();
        }
        bytes
    }

    #[test]
    fn all_mismatches_are_collected() {
        let cases = vec![
            Case::binary(2i32, 3i32, Value::from(6i32)),
            Case::binary(-1i32, 1i32, Value::from(0i32)),
            Case::binary(4i32, 4i32, Value::from(9i32)),
        ];
        let bytes = encode(&[Value::from(5i32), Value::from(0i32), Value::from(8i32)]);
        let report = verify_outputs(&bytes, &cases, &ValueType::I32).unwrap();
        assert!(!report.passed());
        assert_eq!(report.case_count, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(
            report.diagnostic(),
            "(2, 3) -> returned: 5, expected: 6\n(4, 4) -> returned: 8, expected: 9"
        );
    }

    #[test]
    fn bool_results_decode_from_u32() {
        let cases = vec![Case::unary(1u32, Value::from(true))];
        let bytes = encode(&[Value::from(1u32)]);
        assert!(verify_outputs(&bytes, &cases, &ValueType::BOOL).unwrap().passed());
    }

    #[test]
    fn short_buffer_is_an_error() {
        let cases = vec![Case::unary(1u32, Value::from(1u32)); 2];
        let err = verify_outputs(&[0u8; 16], &cases, &ValueType::U32);
        assert!(matches!(err, Err(EngineError::Value(_))));
    }
}
