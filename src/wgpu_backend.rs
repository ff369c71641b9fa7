//! `wgpu` execution device.
//!
//! Programs are compiled inside a validation error scope so WGSL errors
//! surface as `DeviceError::ProgramCreation` instead of the uncaptured-error
//! handler. Pipelines use the auto layout derived from the program; group 0
//! holds the output at binding 0 and the inputs at binding 1.

use std::borrow::Cow;
use std::sync::Mutex;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use wgpu::util::DeviceExt;

use crate::gpu::{BufferDesc, BufferUsage, DeviceError, DeviceLimits, ExecutionDevice};

/// A compiled expression program.
pub struct WgpuProgram {
    pipeline: wgpu::ComputePipeline,
}

/// Bind group linking a program's slots to one batch's buffers.
pub struct WgpuBindings {
    bind_group: wgpu::BindGroup,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    name: String,
    limits: DeviceLimits,
    pending: Mutex<Vec<wgpu::CommandBuffer>>,
}

impl WgpuDevice {
    /// Wrap an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, name: impl Into<String>) -> Self {
        let raw = device.limits();
        let limits = DeviceLimits {
            max_uniform_buffer_binding_size: u64::from(raw.max_uniform_buffer_binding_size),
            max_storage_buffer_binding_size: u64::from(raw.max_storage_buffer_binding_size),
        };
        WgpuDevice {
            device,
            queue,
            name: name.into(),
            limits,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Request a high-performance adapter and a device with the adapter's
    /// full limits, enabling `f16` when available.
    pub fn create_default() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;

        let required_features = if adapter.features().contains(wgpu::Features::SHADER_F16) {
            wgpu::Features::SHADER_F16
        } else {
            wgpu::Features::empty()
        };
        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("gllm-expr-conformance"),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            },
        ))
        .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;

        log::debug!("wgpu device: {} ({:?})", info.name, info.backend);
        Ok(Self::new(device, queue, info.name))
    }

    pub fn supports_f16(&self) -> bool {
        self.device.features().contains(wgpu::Features::SHADER_F16)
    }
}

impl ExecutionDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;
    type Program = WgpuProgram;
    type Bindings = WgpuBindings;

    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer, DeviceError> {
        let (usage, limit) = match desc.usage {
            BufferUsage::Output => (
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                self.limits.max_storage_buffer_binding_size,
            ),
            BufferUsage::UniformInput => (
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                self.limits.max_uniform_buffer_binding_size,
            ),
            BufferUsage::StorageInput => (
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                self.limits.max_storage_buffer_binding_size,
            ),
        };
        if desc.size > limit {
            return Err(DeviceError::Allocation(format!(
                "{}: {} bytes exceeds the {limit}-byte binding limit",
                desc.label, desc.size
            )));
        }

        let buffer = match desc.contents {
            Some(contents) if contents.len() as u64 == desc.size => {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(desc.label),
                        contents,
                        usage,
                    })
            }
            Some(contents) => {
                let mut padded = contents.to_vec();
                padded.resize(desc.size as usize, 0);
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(desc.label),
                        contents: &padded,
                        usage,
                    })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size,
                usage,
                mapped_at_creation: false,
            }),
        };
        Ok(buffer)
    }

    fn create_program(&self, source: &str) -> Result<WgpuProgram, DeviceError> {
        if source.starts_with("enable f16;") && !self.supports_f16() {
            return Err(DeviceError::Unsupported {
                device: self.name.clone(),
                detail: "shader-f16".into(),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("expression program"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("expression pipeline"),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::ProgramCreation(err.to_string()));
        }
        Ok(WgpuProgram { pipeline })
    }

    fn create_bindings(
        &self,
        program: &WgpuProgram,
        output: &wgpu::Buffer,
        input: Option<&wgpu::Buffer>,
    ) -> Result<WgpuBindings, DeviceError> {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: output.as_entire_binding(),
        }];
        if let Some(input) = input {
            entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: input.as_entire_binding(),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = program.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("expression bindings"),
            layout: &layout,
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Binding(err.to_string()));
        }
        Ok(WgpuBindings { bind_group })
    }

    fn enqueue_dispatch(
        &self,
        program: &WgpuProgram,
        bindings: &WgpuBindings,
        workgroups: u32,
    ) -> Result<(), DeviceError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("expression dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("expression pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bindings.bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.pending
            .lock()
            .map_err(|_| DeviceError::Dispatch("pending command list lock poisoned".into()))?
            .push(encoder.finish());
        Ok(())
    }

    fn submit(&self) -> Result<(), DeviceError> {
        let commands = std::mem::take(
            &mut *self
                .pending
                .lock()
                .map_err(|_| DeviceError::Dispatch("pending command list lock poisoned".into()))?,
        );
        self.queue.submit(commands);
        Ok(())
    }

    fn submitted_work_done(&self) -> BoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        let device = self.device.clone();
        async move {
            if let Err(err) = device.poll(wgpu::PollType::Wait) {
                log::warn!("wgpu poll while waiting for submitted work failed: {err}");
            }
            let _ = receiver.await;
        }
        .boxed()
    }

    fn read_buffer(
        &self,
        buffer: &wgpu::Buffer,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, DeviceError>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("expression readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("expression readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = oneshot::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });

        let device = self.device.clone();
        async move {
            device.poll(wgpu::PollType::Wait).map_err(poll_failure)?;
            receiver
                .await
                .map_err(|_| DeviceError::Readback("map_async channel closed".into()))?
                .map_err(|err| DeviceError::Readback(format!("map_async failed: {err}")))?;

            let data = staging.slice(..).get_mapped_range();
            let bytes = data.to_vec();
            drop(data);
            staging.unmap();
            Ok(bytes)
        }
        .boxed()
    }
}

fn poll_failure(err: wgpu::PollError) -> DeviceError {
    DeviceError::Readback(format!("device poll failed: {err}"))
}
