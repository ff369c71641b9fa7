//! gllm-expr-conformance: expression conformance testing on GPU-like devices.
//!
//! This crate checks that an execution device evaluates WGSL expressions the
//! way a reference says it should:
//! - **Program Synthesis**: one compute program per batch, built from an
//!   operation descriptor (`ShaderBuilder`)
//! - **Limit-Aware Batching**: cases are split so every input and output
//!   buffer fits the device binding limits
//! - **Flight Control**: at most `ceiling + 1` batches outstanding
//! - **Type-Aware Verification**: exact values, intervals and custom
//!   comparators, with every mismatch of a batch reported
//!
//! # Quick Start
//!
//! ```ignore
//! use gllm_expr_conformance::{run_blocking, Case, RunConfig, ShaderBuilder, ValueType, Value};
//!
//! let cases = vec![Case::binary(2i32, 3i32, Value::from(5i32))];
//! let report = run_blocking(
//!     &device,
//!     &ShaderBuilder::binary_op("+"),
//!     &[ValueType::I32, ValueType::I32],
//!     &ValueType::I32,
//!     &cases,
//!     &RunConfig::default(),
//! )?
//! .into_result()?;
//! ```

pub mod error;
pub mod expectation;
pub mod executor;
pub mod flight;
pub mod gpu;
pub mod layout;
pub mod packing;
pub mod program_cache;
pub mod runner;
pub mod types;
pub mod validation;
pub mod verify;
pub mod wgsl_builder;

// Execution devices
pub mod host_backend;
pub mod wgpu_backend;

pub use gllm_value_model::{Interval, Scalar, ScalarKind, Value, ValueError, ValueType};

pub use error::{EngineError, EngineResult};
pub use executor::{
    pack_inputs, BatchExecutor, BatchRequest, DispatchedBatch, Heartbeat, LogHeartbeat,
    PreparedBatch,
};
pub use expectation::{Comparator, Expectation, MatchResult};
pub use flight::{
    Admission, FlightController, FlightPermit, FlightState, DEFAULT_MAX_BATCHES_IN_FLIGHT,
};
pub use gpu::{BufferDesc, BufferUsage, DeviceError, DeviceLimits, ExecutionDevice};
pub use host_backend::{HostDevice, HostStats};
pub use layout::{
    batch_capacity, combined_stride, partition, stride_of, struct_layout, MemberLayout,
    CONST_BATCH_SIZE, MAX_UNIFORM_BATCH_BYTES,
};
pub use packing::{pack_scalars_to_vector, PackedCases, PackedComparator};
pub use program_cache::{source_hash, ProgramCache};
pub use runner::{run, run_blocking, BatchFailure, RunReport};
pub use types::{Case, InputSource, RunConfig, VectorWidth};
pub use verify::{verify_outputs, BatchReport, FailureRecord};
pub use wgpu_backend::WgpuDevice;
pub use wgsl_builder::{ExpressionBuilder, ShaderBuilder, SynthesisOptions};
