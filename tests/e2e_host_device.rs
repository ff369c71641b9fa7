//! End-to-end runs through the host execution device.
//!
//! Every test drives the full pipeline: validation, packing, batching,
//! synthesis, program cache, flight control, readback and verification.
//! The host device evaluates buffer-driven programs with a Rust reference
//! implementation of the operation, so no GPU is needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gllm_expr_conformance::{
    run_blocking, Case, DeviceError, DeviceLimits, EngineError, Heartbeat, HostDevice,
    InputSource, Interval, RunConfig, Scalar, ScalarKind, ShaderBuilder, Value, ValueType,
    VectorWidth,
};

// ═══════════════════════════════════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════════════════════════════════

fn i32_pair() -> Vec<ValueType> {
    vec![ValueType::I32, ValueType::I32]
}

fn i32_adder() -> HostDevice {
    HostDevice::componentwise(i32_pair(), ValueType::I32, |args| match (args[0], args[1]) {
        (Scalar::I32(a), Scalar::I32(b)) => Scalar::I32(a.wrapping_add(b)),
        _ => Scalar::I32(i32::MIN),
    })
}

fn f32_doubler(ty: ValueType) -> HostDevice {
    HostDevice::componentwise(vec![ty.clone()], ty, |args| match args[0] {
        Scalar::F32(v) => Scalar::F32(v * 2.0),
        _ => Scalar::F32(f32::NAN),
    })
}

fn add_cases(n: i32) -> Vec<Case> {
    (0..n)
        .map(|i| Case::binary(i, i * 3, Value::from(i * 4)))
        .collect()
}

#[derive(Default)]
struct CountingHeartbeat(AtomicUsize);

impl Heartbeat for CountingHeartbeat {
    fn beat(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Verdicts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn i32_addition_from_read_only_storage_passes() {
    let device = i32_adder();
    let cases = vec![
        Case::binary(2i32, 3i32, Value::from(5i32)),
        Case::binary(-1i32, 1i32, Value::from(0i32)),
    ];
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &cases,
        &RunConfig::new(InputSource::StorageRead),
    )
    .unwrap();

    assert!(report.passed());
    assert_eq!(report.total_cases, 2);
    assert_eq!(report.batches, 1);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(device.stats().dispatches, 1);
    assert_eq!(device.stats().readbacks, 1);
}

#[test]
fn wrong_expectation_yields_one_record() {
    let device = i32_adder();
    let cases = vec![
        Case::binary(2i32, 3i32, Value::from(6i32)),
        Case::binary(-1i32, 1i32, Value::from(0i32)),
    ];
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &cases,
        &RunConfig::new(InputSource::StorageRead),
    )
    .unwrap();

    assert!(!report.passed());
    assert_eq!(report.failures.len(), 1);
    let records = &report.failures[0].records;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].to_string(), "(2, 3) -> returned: 5, expected: 6");

    match report.into_result() {
        Err(EngineError::Verification {
            failed_batches,
            diagnostic,
        }) => {
            assert_eq!(failed_batches, 1);
            assert!(diagnostic.contains("(2, 3)"));
        }
        other => panic!("expected a verification failure, got {other:?}"),
    }
}

#[test]
fn mismatches_do_not_stop_later_batches() {
    let device = i32_adder();
    let cases = vec![
        Case::binary(1i32, 1i32, Value::from(3i32)),
        Case::binary(2i32, 2i32, Value::from(5i32)),
        Case::binary(3i32, 3i32, Value::from(6i32)),
    ];
    let config = RunConfig::new(InputSource::StorageReadWrite).with_batch_size(1);
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &cases,
        &config,
    )
    .unwrap();

    assert_eq!(report.batches, 3);
    let failed: Vec<_> = report.failures.iter().map(|f| f.batch_index).collect();
    assert_eq!(failed, [0, 1]);
    assert_eq!(report.failures[1].first_case, 1);
    assert_eq!(device.stats().dispatches, 3);
}

#[test]
fn uniform_inputs_respect_small_binding_limit() {
    // 32-byte records: two per 64-byte uniform binding.
    let device = i32_adder().with_limits(DeviceLimits {
        max_uniform_buffer_binding_size: 64,
        max_storage_buffer_binding_size: 1 << 20,
    });
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(5),
        &RunConfig::new(InputSource::Uniform),
    )
    .unwrap();

    assert!(report.passed());
    assert_eq!(report.batches, 3);
    assert_eq!(report.programs_compiled, 2);
    assert_eq!(report.program_cache_hits, 1);
}

#[test]
fn bool_operands_round_trip() {
    let device = HostDevice::componentwise(
        vec![ValueType::BOOL, ValueType::BOOL],
        ValueType::BOOL,
        |args| match (args[0], args[1]) {
            (Scalar::Bool(a), Scalar::Bool(b)) => Scalar::Bool(a && b),
            _ => Scalar::Bool(false),
        },
    );
    let cases: Vec<Case> = [(false, false), (false, true), (true, false), (true, true)]
        .into_iter()
        .map(|(a, b)| Case::binary(a, b, Value::from(a && b)))
        .collect();
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("&&"),
        &[ValueType::BOOL, ValueType::BOOL],
        &ValueType::BOOL,
        &cases,
        &RunConfig::new(InputSource::StorageReadWrite),
    )
    .unwrap();
    assert!(report.passed());
}

#[test]
fn interval_expectations() {
    let device = f32_doubler(ValueType::F32);
    let cases = vec![
        Case::unary(1.5f32, Interval::new(2.9, 3.1).unwrap()),
        Case::unary(f32::INFINITY, Interval::any()),
        Case::unary(0.25f32, Interval::new(0.0, 0.4).unwrap()),
    ];
    let report = run_blocking(
        &device,
        &ShaderBuilder::unary_op("2.0 * "),
        &[ValueType::F32],
        &ValueType::F32,
        &cases,
        &RunConfig::default(),
    )
    .unwrap();
    assert_eq!(report.failure_count(), 1);
    assert_eq!(
        report.failures[0].records[0].to_string(),
        "(0.25) -> returned: 0.5, expected: [0.0, 0.4]"
    );
}

#[test]
fn empty_case_list_dispatches_nothing() {
    let device = i32_adder();
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &[],
        &RunConfig::default(),
    )
    .unwrap();
    assert!(report.passed());
    assert_eq!(report.batches, 0);
    assert_eq!(device.stats().programs_created, 0);
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Configuration errors
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn compound_with_wrong_result_type_fails_before_dispatch() {
    let device = i32_adder();
    let cases = vec![Case::binary(2i32, 3i32, Value::from(5u32))];
    let err = run_blocking(
        &device,
        &ShaderBuilder::compound("+="),
        &i32_pair(),
        &ValueType::U32,
        &cases,
        &RunConfig::new(InputSource::StorageRead),
    )
    .unwrap_err();

    assert!(matches!(err, EngineError::InvalidInput(_)), "{err}");
    let stats = device.stats();
    assert_eq!(stats.dispatches, 0);
    assert_eq!(stats.programs_created, 0);
    assert_eq!(stats.buffers_created, 0);
}

#[test]
fn compound_assignment_runs_in_buffer_modes() {
    let device = i32_adder();
    let report = run_blocking(
        &device,
        &ShaderBuilder::compound("+="),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(4),
        &RunConfig::new(InputSource::Uniform),
    )
    .unwrap();
    assert!(report.passed());
}

#[test]
fn case_shape_mismatch_is_reported() {
    let device = i32_adder();
    let cases = vec![
        Case::binary(1i32, 2i32, Value::from(3i32)),
        Case::binary(1i32, 2.0f32, Value::from(3i32)),
    ];
    let err = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &cases,
        &RunConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::CaseShapeMismatch { case: 1, .. }), "{err}");
    assert_eq!(device.stats().dispatches, 0);
}

#[test]
fn abstract_parameters_cannot_use_buffers() {
    let device = f32_doubler(ValueType::F32);
    let cases = vec![Case::unary(Value::abstract_float(0.5), Value::from(1.0f32))];
    let err = run_blocking(
        &device,
        &ShaderBuilder::builtin("abs"),
        &[ValueType::ABSTRACT_FLOAT],
        &ValueType::ABSTRACT_FLOAT,
        &cases,
        &RunConfig::new(InputSource::StorageRead),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)), "{err}");
}

#[test]
fn zero_batch_size_is_rejected() {
    let device = i32_adder();
    let err = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(2),
        &RunConfig::default().with_batch_size(0),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn const_programs_surface_device_error() {
    let device = i32_adder();
    let err = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(2),
        &RunConfig::new(InputSource::Const),
    )
    .unwrap_err();
    assert!(
        matches!(err, EngineError::Device(DeviceError::Unsupported { .. })),
        "{err}"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Packing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn five_scalars_pack_into_two_vec4_cases() {
    let vec4 = ValueType::vec(4, ScalarKind::F32);
    let device = f32_doubler(vec4);
    let cases: Vec<Case> = (1..=5)
        .map(|i| Case::unary(i as f32, Value::from(i as f32 * 2.0)))
        .collect();
    let config = RunConfig::default().with_vectorize(VectorWidth::Four);
    let report = run_blocking(
        &device,
        &ShaderBuilder::unary_op("2.0 * "),
        &[ValueType::F32],
        &ValueType::F32,
        &cases,
        &config,
    )
    .unwrap();
    assert!(report.passed());
    assert_eq!(report.total_cases, 2);
    assert_eq!(report.batches, 1);
}

#[test]
fn packed_failures_name_the_vector_lanes() {
    let vec2 = ValueType::vec(2, ScalarKind::F32);
    let device = f32_doubler(vec2);
    let cases = vec![
        Case::unary(1.0f32, Value::from(2.0f32)),
        Case::unary(2.0f32, Value::from(5.0f32)),
        Case::unary(3.0f32, Value::from(6.0f32)),
    ];
    let config = RunConfig::default().with_vectorize(VectorWidth::Two);
    let report = run_blocking(
        &device,
        &ShaderBuilder::unary_op("2.0 * "),
        &[ValueType::F32],
        &ValueType::F32,
        &cases,
        &config,
    )
    .unwrap();
    assert_eq!(report.failure_count(), 1);
    assert_eq!(
        report.failures[0].records[0].to_string(),
        "(vec2<f32>(1.0, 2.0)) -> returned: vec2<f32>(2.0, 4.0), expected: vec2<f32>(2.0, 5.0)"
    );
}

#[test]
fn packing_rejects_vector_signatures() {
    let vec2 = ValueType::vec(2, ScalarKind::F32);
    let device = f32_doubler(vec2.clone());
    let lane = Value::vector(vec![Scalar::F32(1.0), Scalar::F32(2.0)]).unwrap();
    let err = run_blocking(
        &device,
        &ShaderBuilder::unary_op("2.0 * "),
        &[vec2.clone()],
        &vec2,
        &[Case::unary(lane.clone(), lane)],
        &RunConfig::default().with_vectorize(VectorWidth::Two),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Program cache, flight control, heartbeat
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn equal_sized_batches_share_one_program() {
    let device = i32_adder();
    let config = RunConfig::default().with_batch_size(2);
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(6),
        &config,
    )
    .unwrap();
    assert!(report.passed());
    assert_eq!(report.batches, 3);
    assert_eq!(report.programs_compiled, 1);
    assert_eq!(report.program_cache_hits, 2);
    assert_eq!(device.stats().programs_created, 1);
}

#[test]
fn outstanding_batches_never_exceed_ceiling_plus_one() {
    let device = i32_adder();
    let config = RunConfig::default().with_batch_size(1);
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(12),
        &config,
    )
    .unwrap();
    assert!(report.passed());
    assert_eq!(report.batches, 12);
    assert_eq!(report.peak_in_flight, 6);
    assert_eq!(device.stats().readbacks, 12);
}

#[test]
fn custom_ceiling_bounds_flight() {
    let device = i32_adder();
    let mut config = RunConfig::default().with_batch_size(1);
    config.max_batches_in_flight = 2;
    let report = run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(8),
        &config,
    )
    .unwrap();
    assert!(report.passed());
    assert_eq!(report.peak_in_flight, 3);
}

#[test]
fn heartbeat_brackets_every_dispatch() {
    let device = i32_adder();
    let heartbeat = Arc::new(CountingHeartbeat::default());
    let config = RunConfig::default()
        .with_batch_size(2)
        .with_heartbeat(heartbeat.clone());
    run_blocking(
        &device,
        &ShaderBuilder::binary_op("+"),
        &i32_pair(),
        &ValueType::I32,
        &add_cases(5),
        &config,
    )
    .unwrap();
    assert_eq!(heartbeat.0.load(Ordering::SeqCst), 6);
}
