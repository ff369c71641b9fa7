//! Host execution device.
//!
//! Runs buffer-driven expression programs on the CPU: instead of compiling
//! the WGSL it unpacks each input record, calls a Rust reference evaluator
//! and writes the storage encoding of the result, exactly where the real
//! program would. Programs with constant inputs have nothing to unpack and
//! are rejected at dispatch.
//!
//! Readback resolves asynchronously (after one pending poll) so the
//! submission loop sees the same suspension points as with a GPU.

use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Poll;

use futures::future::BoxFuture;
use futures::FutureExt;
use gllm_value_model::{Scalar, Value, ValueType};

use crate::gpu::{BufferDesc, BufferUsage, DeviceError, DeviceLimits, ExecutionDevice};
use crate::layout::{combined_stride, stride_of, struct_layout};

type Evaluator = dyn Fn(&[Value]) -> Result<Value, DeviceError> + Send + Sync;

/// Counters of the work a [`HostDevice`] has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub buffers_created: usize,
    pub programs_created: usize,
    pub dispatches: usize,
    pub submissions: usize,
    pub readbacks: usize,
}

#[derive(Debug, Clone)]
pub struct HostBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl HostBuffer {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct HostProgram {
    source: String,
    reads_input: bool,
}

impl HostProgram {
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct HostBindings {
    output: HostBuffer,
    input: Option<HostBuffer>,
}

struct PendingDispatch {
    output: HostBuffer,
    input: HostBuffer,
}

/// CPU stand-in for a GPU, evaluating one fixed operation signature.
pub struct HostDevice {
    parameter_types: Vec<ValueType>,
    result_type: ValueType,
    evaluator: Arc<Evaluator>,
    limits: DeviceLimits,
    pending: Mutex<Vec<PendingDispatch>>,
    stats: Arc<Mutex<HostStats>>,
}

impl HostDevice {
    /// `evaluator` receives one decoded value per parameter and returns the
    /// result for that record.
    pub fn new(
        parameter_types: Vec<ValueType>,
        result_type: ValueType,
        evaluator: impl Fn(&[Value]) -> Result<Value, DeviceError> + Send + Sync + 'static,
    ) -> Self {
        HostDevice {
            parameter_types,
            result_type,
            evaluator: Arc::new(evaluator),
            limits: DeviceLimits::default(),
            pending: Mutex::new(Vec::new()),
            stats: Arc::new(Mutex::new(HostStats::default())),
        }
    }

    /// Evaluator applied per lane: scalar arguments are broadcast, vector
    /// arguments contribute the component of the current lane, and the
    /// lanes are reassembled into `result_type`.
    pub fn componentwise(
        parameter_types: Vec<ValueType>,
        result_type: ValueType,
        op: impl Fn(&[Scalar]) -> Scalar + Send + Sync + 'static,
    ) -> Self {
        let shape = result_type.clone();
        Self::new(parameter_types, result_type, move |args| {
            let lanes = shape.component_count();
            let components: Vec<Scalar> = (0..lanes)
                .map(|lane| {
                    let lane_args: Vec<Scalar> = args
                        .iter()
                        .map(|arg| {
                            let parts = arg.components();
                            parts[lane.min(parts.len() - 1)]
                        })
                        .collect();
                    op(&lane_args)
                })
                .collect();
            let value = match &shape {
                ValueType::Scalar(_) => Ok(Value::scalar(components[0])),
                ValueType::Vector { .. } => Value::vector(components),
                ValueType::Matrix { cols, rows, .. } => Value::matrix(*cols, *rows, components),
            };
            value.map_err(|e| DeviceError::Dispatch(e.to_string()))
        })
    }

    #[must_use]
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn stats(&self) -> HostStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self, f: impl FnOnce(&mut HostStats)) {
        f(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn run_records(&self, dispatch: &PendingDispatch) -> Result<(), DeviceError> {
        let layout = struct_layout(&self.parameter_types)
            .map_err(|e| DeviceError::Dispatch(e.to_string()))?;
        let record = combined_stride(&self.parameter_types)
            .map_err(|e| DeviceError::Dispatch(e.to_string()))?;
        let result_stride =
            stride_of(&self.result_type).map_err(|e| DeviceError::Dispatch(e.to_string()))?;

        let input = dispatch.input.lock().clone();
        let mut output = dispatch.output.lock();
        let count = output.len() / result_stride;
        for i in 0..count {
            let args = layout
                .iter()
                .map(|member| member.ty.read(&input, i * record + member.offset))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DeviceError::Dispatch(format!("record {i}: {e}")))?;
            let result = (self.evaluator)(&args)?;
            if result.ty() != &self.result_type {
                return Err(DeviceError::Dispatch(format!(
                    "evaluator returned {} for a {} output",
                    result.ty(),
                    self.result_type
                )));
            }
            result
                .write_to(&mut output, i * result_stride)
                .map_err(|e| DeviceError::Dispatch(e.to_string()))?;
        }
        Ok(())
    }
}

impl ExecutionDevice for HostDevice {
    type Buffer = HostBuffer;
    type Program = HostProgram;
    type Bindings = HostBindings;

    fn name(&self) -> &str {
        "host"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<HostBuffer, DeviceError> {
        let limit = match desc.usage {
            BufferUsage::UniformInput => self.limits.max_uniform_buffer_binding_size,
            BufferUsage::Output | BufferUsage::StorageInput => {
                self.limits.max_storage_buffer_binding_size
            }
        };
        if desc.size > limit {
            return Err(DeviceError::Allocation(format!(
                "{}: {} bytes exceeds the {limit}-byte binding limit",
                desc.label, desc.size
            )));
        }
        let size = usize::try_from(desc.size)
            .map_err(|_| DeviceError::Allocation(format!("{}: size overflow", desc.label)))?;
        let mut data = vec![0u8; size];
        if let Some(contents) = desc.contents {
            if contents.len() > size {
                return Err(DeviceError::Allocation(format!(
                    "{}: {} bytes of contents for a {size}-byte buffer",
                    desc.label,
                    contents.len()
                )));
            }
            data[..contents.len()].copy_from_slice(contents);
        }
        self.bump(|s| s.buffers_created += 1);
        Ok(HostBuffer {
            data: Arc::new(Mutex::new(data)),
        })
    }

    fn create_program(&self, source: &str) -> Result<HostProgram, DeviceError> {
        if !source.contains("fn main()") || !source.contains("@binding(0)") {
            return Err(DeviceError::ProgramCreation(
                "program lacks a `main` entry point or an output binding".into(),
            ));
        }
        self.bump(|s| s.programs_created += 1);
        Ok(HostProgram {
            source: source.to_string(),
            reads_input: source.contains("@binding(1)"),
        })
    }

    fn create_bindings(
        &self,
        program: &HostProgram,
        output: &HostBuffer,
        input: Option<&HostBuffer>,
    ) -> Result<HostBindings, DeviceError> {
        if program.reads_input != input.is_some() {
            return Err(DeviceError::Binding(format!(
                "program {} an input binding but {} was supplied",
                if program.reads_input { "declares" } else { "has no" },
                if input.is_some() { "one" } else { "none" },
            )));
        }
        Ok(HostBindings {
            output: output.clone(),
            input: input.cloned(),
        })
    }

    fn enqueue_dispatch(
        &self,
        program: &HostProgram,
        bindings: &HostBindings,
        workgroups: u32,
    ) -> Result<(), DeviceError> {
        if workgroups != 1 {
            return Err(DeviceError::Dispatch(format!(
                "expected a single workgroup, got {workgroups}"
            )));
        }
        let input = match (&bindings.input, program.reads_input) {
            (Some(input), true) => input.clone(),
            _ => {
                return Err(DeviceError::Unsupported {
                    device: self.name().to_string(),
                    detail: "programs with constant inputs".into(),
                })
            }
        };
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PendingDispatch {
                output: bindings.output.clone(),
                input,
            });
        self.bump(|s| s.dispatches += 1);
        Ok(())
    }

    fn submit(&self) -> Result<(), DeviceError> {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        for dispatch in &pending {
            self.run_records(dispatch)?;
        }
        self.bump(|s| s.submissions += 1);
        Ok(())
    }

    fn submitted_work_done(&self) -> BoxFuture<'static, ()> {
        futures::future::ready(()).boxed()
    }

    fn read_buffer(
        &self,
        buffer: &HostBuffer,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, DeviceError>> {
        self.bump(|s| s.readbacks += 1);
        let buffer = buffer.clone();
        let mut yielded = false;
        futures::future::poll_fn(move |cx| {
            if !yielded {
                yielded = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            let data = buffer.lock();
            let size = usize::try_from(size).unwrap_or(usize::MAX);
            if size > data.len() {
                return Poll::Ready(Err(DeviceError::Readback(format!(
                    "requested {size} bytes from a {}-byte buffer",
                    data.len()
                ))));
            }
            Poll::Ready(Ok(data[..size].to_vec()))
        })
        .boxed()
    }
}
