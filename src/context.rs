use std::rc::Rc;

use anyhow::Context as _;

use crate::memory::{MemoryHandle, WgpuMemory};

/// Headless GPU context: adapter, device and queue without any surface.
///
/// The path tracer never presents anything itself, so no window is needed.
/// Scene buffers are allocated through [`GpuContext::memory`].
#[derive(Debug)]
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn headless() -> anyhow::Result<Self> {
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        log::info!("device and queue on {}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("scene device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await
            .context("failed to create GPU device")?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Blocking variant of [`GpuContext::headless`].
    pub fn headless_blocking() -> anyhow::Result<Self> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .context("failed to create setup runtime")?
            .block_on(Self::headless())
    }

    /// Device memory allocating wgpu storage buffers on this context's device.
    pub fn memory(&self) -> anyhow::Result<(Rc<WgpuMemory>, MemoryHandle)> {
        let memory = Rc::new(WgpuMemory::new(self.device.clone(), self.queue.clone())?);
        let handle: MemoryHandle = memory.clone();
        Ok((memory, handle))
    }
}
