//! Batch executor: turns one batch of cases into a dispatched program and,
//! later, a verdict.
//!
//! A batch moves through three phases:
//! 1. [`BatchExecutor::prepare`] synthesizes the program, fetches it from the
//!    cache, packs inputs and binds buffers.
//! 2. [`PreparedBatch::dispatch`] enqueues one single-workgroup dispatch and
//!    submits it.
//! 3. [`DispatchedBatch::verify`] reads the outputs back and compares them.

use std::sync::Arc;

use gllm_value_model::ValueType;

use crate::error::EngineResult;
use crate::gpu::{BufferDesc, BufferUsage, ExecutionDevice};
use crate::layout::{combined_stride, stride_of, struct_layout};
use crate::program_cache::ProgramCache;
use crate::types::{Case, InputSource};
use crate::validation::{to_u64, validate_case_shapes};
use crate::verify::{verify_outputs, BatchReport};
use crate::wgsl_builder::{ShaderBuilder, SynthesisOptions};

/// Liveness signal emitted around every dispatch, so a harness watching a
/// long run can tell slow progress from a hang.
pub trait Heartbeat: Send + Sync {
    fn beat(&self);
}

/// Heartbeat that logs at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHeartbeat;

impl Heartbeat for LogHeartbeat {
    fn beat(&self) {
        log::trace!("heartbeat");
    }
}

/// Everything needed to build and run one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    pub builder: &'a ShaderBuilder,
    pub parameter_types: &'a [ValueType],
    pub result_type: &'a ValueType,
    pub cases: &'a [Case],
    pub input_source: InputSource,
    pub options: SynthesisOptions,
}

/// Pack case inputs into contiguous input records laid out by
/// [`struct_layout`].
pub fn pack_inputs(parameter_types: &[ValueType], cases: &[Case]) -> EngineResult<Vec<u8>> {
    let layout = struct_layout(parameter_types)?;
    let record = combined_stride(parameter_types)?;
    let mut bytes = vec![0u8; record * cases.len()];
    for (i, case) in cases.iter().enumerate() {
        for member in &layout {
            case.inputs[member.index].write_to(&mut bytes, i * record + member.offset)?;
        }
    }
    Ok(bytes)
}

pub struct BatchExecutor<'a, D: ExecutionDevice> {
    device: &'a D,
    heartbeat: Arc<dyn Heartbeat>,
}

impl<'a, D: ExecutionDevice> BatchExecutor<'a, D> {
    pub fn new(device: &'a D, heartbeat: Arc<dyn Heartbeat>) -> Self {
        BatchExecutor { device, heartbeat }
    }

    /// Build the program and resources for one batch.
    pub fn prepare(
        &self,
        request: &BatchRequest<'a>,
        cache: &mut ProgramCache<D::Program>,
    ) -> EngineResult<PreparedBatch<'a, D>> {
        validate_case_shapes(request.parameter_types, request.cases)?;
        let source = request.builder.build(
            request.parameter_types,
            request.result_type,
            request.cases,
            request.input_source,
            request.options,
        )?;

        let output_size = to_u64(request.cases.len(), stride_of(request.result_type)?, "output")?;
        let output = self.device.create_buffer(&BufferDesc {
            label: "expression outputs",
            size: output_size,
            usage: BufferUsage::Output,
            contents: None,
        })?;

        let input = match request.input_source {
            InputSource::Const => None,
            source => {
                let bytes = pack_inputs(request.parameter_types, request.cases)?;
                let usage = if source == InputSource::Uniform {
                    BufferUsage::UniformInput
                } else {
                    BufferUsage::StorageInput
                };
                Some(self.device.create_buffer(&BufferDesc {
                    label: "expression inputs",
                    size: bytes.len() as u64,
                    usage,
                    contents: Some(&bytes),
                })?)
            }
        };

        let program = cache.get_or_build(&source, |s| self.device.create_program(s))?;
        let bindings = self
            .device
            .create_bindings(&program, &output, input.as_ref())?;

        Ok(PreparedBatch {
            device: self.device,
            heartbeat: Arc::clone(&self.heartbeat),
            program,
            bindings,
            output,
            input,
            output_size,
            cases: request.cases,
            result_type: request.result_type.clone(),
        })
    }

    /// [`prepare`](Self::prepare) followed by [`PreparedBatch::dispatch`].
    pub fn submit_batch(
        &self,
        request: &BatchRequest<'a>,
        cache: &mut ProgramCache<D::Program>,
    ) -> EngineResult<DispatchedBatch<'a, D>> {
        self.prepare(request, cache)?.dispatch()
    }
}

/// A batch whose program and buffers exist but which is not yet submitted.
pub struct PreparedBatch<'a, D: ExecutionDevice> {
    device: &'a D,
    heartbeat: Arc<dyn Heartbeat>,
    program: Arc<D::Program>,
    bindings: D::Bindings,
    output: D::Buffer,
    input: Option<D::Buffer>,
    output_size: u64,
    cases: &'a [Case],
    result_type: ValueType,
}

impl<'a, D: ExecutionDevice> PreparedBatch<'a, D> {
    /// Enqueue exactly one single-workgroup dispatch and submit it.
    pub fn dispatch(self) -> EngineResult<DispatchedBatch<'a, D>> {
        self.heartbeat.beat();
        self.device.enqueue_dispatch(&self.program, &self.bindings, 1)?;
        self.device.submit()?;
        self.heartbeat.beat();

        Ok(DispatchedBatch {
            device: self.device,
            output: self.output,
            output_size: self.output_size,
            cases: self.cases,
            result_type: self.result_type,
            _resources: (self.program, self.bindings, self.input),
        })
    }
}

/// A submitted batch awaiting readback.
pub struct DispatchedBatch<'a, D: ExecutionDevice> {
    device: &'a D,
    output: D::Buffer,
    output_size: u64,
    cases: &'a [Case],
    result_type: ValueType,
    // Held until verification so the device work never outlives them.
    _resources: (Arc<D::Program>, D::Bindings, Option<D::Buffer>),
}

impl<'a, D: ExecutionDevice> DispatchedBatch<'a, D> {
    /// Read the outputs back and judge every case of the batch.
    pub async fn verify(self) -> EngineResult<BatchReport> {
        let bytes = self
            .device
            .read_buffer(&self.output, self.output_size)
            .await?;
        let report = verify_outputs(&bytes, self.cases, &self.result_type)?;
        self.device.submitted_work_done().await;
        Ok(report)
    }
}
