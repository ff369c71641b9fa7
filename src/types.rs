//! Case, input-source and run configuration types.

use std::fmt;
use std::sync::Arc;

use gllm_value_model::{Value, ValueType};

use crate::error::{EngineError, EngineResult};
use crate::executor::{Heartbeat, LogHeartbeat};
use crate::expectation::Expectation;
use crate::flight::DEFAULT_MAX_BATCHES_IN_FLIGHT;

/// Where case inputs come from inside the synthesized program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// Inputs are baked into the program as constant expressions.
    Const,
    /// Inputs are read from a `var<uniform>` binding.
    Uniform,
    /// Inputs are read from a `var<storage, read>` binding.
    StorageRead,
    /// Inputs are read from a `var<storage, read_write>` binding.
    StorageReadWrite,
}

impl InputSource {
    pub const ALL: [InputSource; 4] = [
        Self::Const,
        Self::Uniform,
        Self::StorageRead,
        Self::StorageReadWrite,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Uniform => "uniform",
            Self::StorageRead => "storage_r",
            Self::StorageReadWrite => "storage_rw",
        }
    }

    /// True when inputs travel through a bound buffer.
    #[must_use]
    pub fn is_buffer(&self) -> bool {
        !matches!(self, Self::Const)
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lane count used when packing scalar cases into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorWidth {
    Two = 2,
    Three = 3,
    Four = 4,
}

impl VectorWidth {
    #[must_use]
    pub fn lanes(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for VectorWidth {
    type Error = EngineError;

    fn try_from(width: usize) -> EngineResult<Self> {
        match width {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(EngineError::InvalidInput(format!(
                "vector width must be 2, 3 or 4, got {other}"
            ))),
        }
    }
}

/// One input/expected-output test vector.
#[derive(Debug, Clone)]
pub struct Case {
    pub inputs: Vec<Value>,
    pub expected: Expectation,
}

impl Case {
    pub fn new(inputs: Vec<Value>, expected: impl Into<Expectation>) -> Self {
        Self {
            inputs,
            expected: expected.into(),
        }
    }

    pub fn unary(input: impl Into<Value>, expected: impl Into<Expectation>) -> Self {
        Self::new(vec![input.into()], expected)
    }

    pub fn binary(
        lhs: impl Into<Value>,
        rhs: impl Into<Value>,
        expected: impl Into<Expectation>,
    ) -> Self {
        Self::new(vec![lhs.into(), rhs.into()], expected)
    }

    #[must_use]
    pub fn input_types(&self) -> Vec<ValueType> {
        self.inputs.iter().map(|v| v.ty().clone()).collect()
    }

    /// Inputs joined with `", "`, as shown in failure records.
    #[must_use]
    pub fn describe_inputs(&self) -> String {
        self.inputs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Configuration of one `run`.
#[derive(Clone)]
pub struct RunConfig {
    pub input_source: InputSource,
    /// Pack scalar cases into vectors of this width before batching.
    pub vectorize: Option<VectorWidth>,
    /// Cases per batch; `None` derives it from the device limits.
    pub batch_size: Option<usize>,
    /// Const mode only: one store statement per case instead of a loop.
    pub unroll_const_loops: bool,
    pub max_batches_in_flight: usize,
    pub heartbeat: Arc<dyn Heartbeat>,
}

impl RunConfig {
    #[must_use]
    pub fn new(input_source: InputSource) -> Self {
        Self {
            input_source,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_vectorize(mut self, width: VectorWidth) -> Self {
        self.vectorize = Some(width);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Arc<dyn Heartbeat>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Defaults overlaid with `GLLM_EXPR_UNROLL_CONST_LOOPS` and
    /// `GLLM_EXPR_MAX_BATCHES_IN_FLIGHT`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("GLLM_EXPR_UNROLL_CONST_LOOPS") {
            config.unroll_const_loops = matches!(raw.trim(), "1" | "true" | "on");
        }
        if let Ok(raw) = std::env::var("GLLM_EXPR_MAX_BATCHES_IN_FLIGHT") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_batches_in_flight = n,
                _ => log::warn!(
                    "ignoring GLLM_EXPR_MAX_BATCHES_IN_FLIGHT={raw:?}: expected a positive integer"
                ),
            }
        }
        config
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_source: InputSource::StorageRead,
            vectorize: None,
            batch_size: None,
            unroll_const_loops: false,
            max_batches_in_flight: DEFAULT_MAX_BATCHES_IN_FLIGHT,
            heartbeat: Arc::new(LogHeartbeat),
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("input_source", &self.input_source)
            .field("vectorize", &self.vectorize)
            .field("batch_size", &self.batch_size)
            .field("unroll_const_loops", &self.unroll_const_loops)
            .field("max_batches_in_flight", &self.max_batches_in_flight)
            .finish_non_exhaustive()
    }
}
