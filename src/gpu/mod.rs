//! Execution-device abstraction layer.
//!
//! The engine only needs a narrow slice of a GPU API: host-visible buffers,
//! programs compiled from WGSL source, a bind group linking buffers to the
//! program's slots, single-workgroup dispatch, and asynchronous readback.
//! Concrete implementations live in `wgpu_backend` (real adapters) and
//! `host_backend` (software evaluation for tests).
//!
//! Binding contract: slot 0 is the output buffer, slot 1 the input buffer
//! when the program reads one.

use futures::future::BoxFuture;
use thiserror::Error;

// ── Error ────────────────────────────────────────────────────────────

/// Errors from device operations. All of them abort the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("buffer allocation failed: {0}")]
    Allocation(String),
    #[error("program creation failed: {0}")]
    ProgramCreation(String),
    #[error("resource binding failed: {0}")]
    Binding(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("readback failed: {0}")]
    Readback(String),
    #[error("unsupported by {device}: {detail}")]
    Unsupported { device: String, detail: String },
}

// ── Limits ───────────────────────────────────────────────────────────

/// Binding-size limits reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_uniform_buffer_binding_size: u64,
    pub max_storage_buffer_binding_size: u64,
}

impl Default for DeviceLimits {
    /// WebGPU baseline limits.
    fn default() -> Self {
        Self {
            max_uniform_buffer_binding_size: 64 << 10,
            max_storage_buffer_binding_size: 128 << 20,
        }
    }
}

// ── Buffers ──────────────────────────────────────────────────────────

/// Role of a buffer within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written by the program, read back by the host.
    Output,
    /// Case records bound as `var<uniform>`.
    UniformInput,
    /// Case records bound as `var<storage>`.
    StorageInput,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'static str,
    pub size: u64,
    pub usage: BufferUsage,
    /// Initial contents; `None` leaves the buffer zeroed.
    pub contents: Option<&'a [u8]>,
}

// ── Device ───────────────────────────────────────────────────────────

/// A compute device able to run synthesized expression programs.
///
/// Dispatches are enqueued and then submitted; completion is observed
/// through `submitted_work_done` and `read_buffer`, both of which resolve
/// asynchronously relative to submission.
pub trait ExecutionDevice {
    type Buffer;
    type Program;
    type Bindings;

    /// Human-readable device name.
    fn name(&self) -> &str;

    fn limits(&self) -> DeviceLimits;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, DeviceError>;

    /// Compile WGSL source with entry point `main`.
    fn create_program(&self, source: &str) -> Result<Self::Program, DeviceError>;

    /// Bind `output` to slot 0 and `input`, if any, to slot 1.
    fn create_bindings(
        &self,
        program: &Self::Program,
        output: &Self::Buffer,
        input: Option<&Self::Buffer>,
    ) -> Result<Self::Bindings, DeviceError>;

    /// Record one dispatch of `workgroups` workgroups.
    fn enqueue_dispatch(
        &self,
        program: &Self::Program,
        bindings: &Self::Bindings,
        workgroups: u32,
    ) -> Result<(), DeviceError>;

    /// Submit everything enqueued since the last submission.
    fn submit(&self) -> Result<(), DeviceError>;

    /// Resolves once all work submitted so far has completed.
    fn submitted_work_done(&self) -> BoxFuture<'static, ()>;

    /// Copy the first `size` bytes of `buffer` back to the host.
    fn read_buffer(
        &self,
        buffer: &Self::Buffer,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, DeviceError>>;
}
