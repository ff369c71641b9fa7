//! Property-based tests for the conformance engine.
//!
//! Uses proptest to verify invariants that must hold for all inputs:
//! - Packed verdicts reproduce per-case verdicts
//! - Storage encoding round-trips
//! - Partitioning covers the case list and respects binding limits
//! - Program synthesis determinism

use proptest::prelude::*;

use gllm_expr_conformance::{
    batch_capacity, combined_stride, pack_scalars_to_vector, partition, stride_of, Case,
    DeviceLimits, InputSource, Scalar, ScalarKind, ShaderBuilder, SynthesisOptions, Value,
    ValueType, VectorWidth,
};

// ═══════════════════════════════════════════════════════════════════════
// Strategies
// ═══════════════════════════════════════════════════════════════════════

fn arb_width() -> impl Strategy<Value = VectorWidth> {
    prop_oneof![
        Just(VectorWidth::Two),
        Just(VectorWidth::Three),
        Just(VectorWidth::Four),
    ]
}

fn arb_scalar(kind: ScalarKind) -> BoxedStrategy<Scalar> {
    match kind {
        ScalarKind::Bool => any::<bool>().prop_map(Scalar::Bool).boxed(),
        ScalarKind::I32 => any::<i32>().prop_map(Scalar::I32).boxed(),
        ScalarKind::U32 => any::<u32>().prop_map(Scalar::U32).boxed(),
        ScalarKind::F16 => any::<u16>()
            .prop_map(|bits| Scalar::F16(half::f16::from_bits(bits)))
            .boxed(),
        _ => any::<u32>()
            .prop_map(|bits| Scalar::F32(f32::from_bits(bits)))
            .boxed(),
    }
}

fn arb_kind() -> impl Strategy<Value = ScalarKind> {
    prop_oneof![
        Just(ScalarKind::Bool),
        Just(ScalarKind::I32),
        Just(ScalarKind::U32),
        Just(ScalarKind::F32),
        Just(ScalarKind::F16),
    ]
}

/// Any representable scalar, vector or matrix value.
fn arb_value() -> impl Strategy<Value = Value> {
    let scalar = arb_kind().prop_flat_map(|kind| arb_scalar(kind).prop_map(Value::scalar));
    let vector = (arb_kind(), 2usize..=4).prop_flat_map(|(kind, width)| {
        prop::collection::vec(arb_scalar(kind), width)
            .prop_map(|c| Value::vector(c).expect("homogeneous vector"))
    });
    let matrix = (
        prop_oneof![Just(ScalarKind::F32), Just(ScalarKind::F16)],
        2u8..=4,
        2u8..=4,
    )
        .prop_flat_map(|(kind, cols, rows)| {
            prop::collection::vec(arb_scalar(kind), usize::from(cols) * usize::from(rows))
                .prop_map(move |c| Value::matrix(cols, rows, c).expect("float matrix"))
        });
    prop_oneof![scalar, vector, matrix]
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Packing preserves verdicts
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    /// A packed case fails iff one of the cases in its lanes fails, and the
    /// packed case count is ceil(len / W).
    #[test]
    fn prop_packed_verdicts_match_scalar_verdicts(
        width in arb_width(),
        rows in prop::collection::vec((-1000i32..1000, any::<bool>()), 1..40),
    ) {
        // Each case computes x + 1; `wrong` cases expect x + 2.
        let cases: Vec<Case> = rows
            .iter()
            .map(|&(x, wrong)| Case::unary(x, Value::from(x + if wrong { 2 } else { 1 })))
            .collect();
        let packed = pack_scalars_to_vector(&[ValueType::I32], &ValueType::I32, &cases, width)
            .unwrap();
        let lanes = width.lanes();
        prop_assert_eq!(packed.cases.len(), cases.len().div_ceil(lanes));

        for (group, case) in packed.cases.iter().enumerate() {
            let inputs = case.inputs[0].components();
            let returned: Vec<Scalar> = inputs
                .iter()
                .map(|s| match s {
                    Scalar::I32(x) => Scalar::I32(x + 1),
                    other => *other,
                })
                .collect();
            let verdict = case.expected.evaluate(&Value::vector(returned).unwrap());

            let members = (0..lanes).map(|lane| (group * lanes + lane).min(cases.len() - 1));
            let any_wrong = members.clone().any(|i| rows[i].1);
            prop_assert_eq!(verdict.matched, !any_wrong);
            for (lane, i) in members.enumerate() {
                prop_assert_eq!(inputs[lane], Scalar::I32(rows[i].0));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Storage encoding
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    /// decode(encode(v)) == v (bit-exact for floats via `matches`).
    #[test]
    fn prop_encode_decode_round_trip(value in arb_value(), slot in 0usize..4) {
        let stride = stride_of(value.ty()).unwrap();
        let mut bytes = vec![0u8; stride * 4];
        value.write_to(&mut bytes, slot * stride).unwrap();
        let decoded = value.ty().read(&bytes, slot * stride).unwrap();
        prop_assert!(decoded.matches(&value), "{} != {}", decoded, value);
        prop_assert!(value.ty().byte_size() <= stride);
    }

    /// Booleans travel as u32 0/1 and come back unchanged.
    #[test]
    fn prop_bool_storage_round_trip(lanes in prop::collection::vec(any::<bool>(), 1..=4)) {
        let value = if lanes.len() == 1 {
            Value::from(lanes[0])
        } else {
            Value::vector(lanes.iter().copied().map(Scalar::Bool).collect()).unwrap()
        };
        let mut bytes = vec![0u8; 16];
        value.write_to(&mut bytes, 0).unwrap();
        for (i, lane) in lanes.iter().enumerate() {
            let word = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
            prop_assert_eq!(word, u32::from(*lane));
        }
        prop_assert_eq!(value.ty().read(&bytes, 0).unwrap(), value);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Partitioning
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    /// Batches concatenate back to the case list and each batch's input and
    /// output buffers fit their binding limits.
    #[test]
    fn prop_partition_covers_cases_within_limits(
        count in 1usize..300,
        uniform_limit in 32u64..4096,
        storage_limit in 64u64..8192,
        source in prop_oneof![
            Just(InputSource::Const),
            Just(InputSource::Uniform),
            Just(InputSource::StorageRead),
            Just(InputSource::StorageReadWrite),
        ],
    ) {
        let params = [ValueType::I32, ValueType::I32];
        let result = ValueType::I32;
        let limits = DeviceLimits {
            max_uniform_buffer_binding_size: uniform_limit,
            max_storage_buffer_binding_size: storage_limit,
        };
        let cases: Vec<Case> = (0..count as i32)
            .map(|i| Case::binary(i, -i, Value::from(0i32)))
            .collect();
        let capacity = batch_capacity(source, &params, &result, &limits).unwrap();
        let record = combined_stride(&params).unwrap() as u64;
        let out_stride = stride_of(&result).unwrap() as u64;

        let mut rebuilt = Vec::new();
        for batch in partition(&cases, capacity).unwrap() {
            prop_assert!(!batch.is_empty() && batch.len() <= capacity);
            let len = batch.len() as u64;
            prop_assert!(len * out_stride <= storage_limit);
            match source {
                InputSource::Uniform => prop_assert!(len * record <= uniform_limit.min(2048)),
                InputSource::StorageRead | InputSource::StorageReadWrite => {
                    prop_assert!(len * record <= storage_limit)
                }
                InputSource::Const => prop_assert!(batch.len() <= 32),
            }
            rebuilt.extend(batch.iter().map(|c| c.inputs[0].clone()));
        }
        let original: Vec<Value> = cases.iter().map(|c| c.inputs[0].clone()).collect();
        prop_assert_eq!(rebuilt, original);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Synthesis determinism
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    /// Identical inputs give byte-identical source; a different case count
    /// gives different source.
    #[test]
    fn prop_synthesis_deterministic(
        xs in prop::collection::vec(any::<u32>(), 1..16),
        source in prop_oneof![Just(InputSource::Const), Just(InputSource::StorageRead)],
        unroll in any::<bool>(),
    ) {
        let builder = ShaderBuilder::builtin("countOneBits");
        let cases: Vec<Case> = xs
            .iter()
            .map(|&x| Case::unary(x, Value::from(x.count_ones())))
            .collect();
        let options = SynthesisOptions { unroll_const_loops: unroll };
        let build = |cases: &[Case]| {
            builder
                .build(&[ValueType::U32], &ValueType::U32, cases, source, options)
                .unwrap()
        };
        let a = build(&cases);
        prop_assert_eq!(&a, &build(&cases));
        if cases.len() > 1 {
            prop_assert_ne!(a, build(&cases[1..]));
        }
    }
}
