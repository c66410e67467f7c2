use std::{cell::RefCell, collections::BTreeMap};

use anyhow::{Context as _, anyhow};

use super::{ALLOCATION_ALIGNMENT, Allocation, AllocationId, DeviceAddress, DeviceMemory, align_up};

const BASE_ADDRESS: DeviceAddress = 0x1_0000_0000;

struct GpuState {
    next_address: DeviceAddress,
    buffers: BTreeMap<DeviceAddress, wgpu::Buffer>,
}

/**
 * Device memory backed by wgpu storage buffers.
 *
 * wgpu has no raw buffer addresses, so every buffer is placed in a virtual
 * address space. A kernel binding the scene resolves each address back to
 * its `(buffer, offset)` pair with [`WgpuMemory::resolve`].
 */
pub struct WgpuMemory {
    device: wgpu::Device,
    queue: wgpu::Queue,
    runtime: tokio::runtime::Runtime,
    state: RefCell<GpuState>,
}

impl WgpuMemory {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("failed to create readback runtime")?;
        Ok(Self {
            device,
            queue,
            runtime,
            state: RefCell::new(GpuState {
                next_address: BASE_ADDRESS,
                buffers: BTreeMap::new(),
            }),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Find the buffer containing `address` and the byte offset into it.
    pub fn resolve(&self, address: DeviceAddress) -> Option<(wgpu::Buffer, u64)> {
        let state = self.state.borrow();
        let (&start, buffer) = state.buffers.range(..=address).next_back()?;
        let offset = address - start;
        (offset < buffer.size()).then(|| (buffer.clone(), offset))
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    fn buffer(&self, id: AllocationId) -> Option<wgpu::Buffer> {
        self.state.borrow().buffers.get(&id.0).cloned()
    }
}

impl DeviceMemory for WgpuMemory {
    fn allocate(&self, size: u64) -> Allocation {
        // wgpu copies work on 4 byte words, and zero sized bindings are invalid.
        let padded = align_up(size.max(1), wgpu::COPY_BUFFER_ALIGNMENT);
        // wgpu zero-initialises new buffers.
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene storage buffer"),
            size: padded,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let mut state = self.state.borrow_mut();
        let address = state.next_address;
        state.next_address = align_up(address + padded, ALLOCATION_ALIGNMENT);
        state.buffers.insert(address, buffer);
        Allocation {
            id: AllocationId(address),
            address,
            size,
        }
    }

    fn upload(&self, id: AllocationId, offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffer(id) else {
            log::error!("upload to released buffer {:#x}", id.0);
            return;
        };
        debug_assert_eq!(offset % wgpu::COPY_BUFFER_ALIGNMENT, 0);
        let remainder = data.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if remainder == 0 {
            self.queue.write_buffer(&buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len() + wgpu::COPY_BUFFER_ALIGNMENT as usize - remainder, 0);
            self.queue.write_buffer(&buffer, offset, &padded);
        }
    }

    fn download(&self, id: AllocationId, offset: u64, len: u64) -> anyhow::Result<Vec<u8>> {
        let buffer = self
            .buffer(id)
            .ok_or_else(|| anyhow!("buffer {:#x} is not live", id.0))?;
        let start = offset - offset % wgpu::COPY_BUFFER_ALIGNMENT;
        let end = align_up(offset + len, wgpu::COPY_BUFFER_ALIGNMENT).min(buffer.size());
        if end <= start {
            return Ok(Vec::new());
        }
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene readback buffer"),
            size: end - start,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene readback encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer, start, &staging, 0, end - start);
        self.queue.submit(std::iter::once(encoder.finish()));

        let bytes = self.runtime.block_on(async {
            // The mapping has to be requested before polling, otherwise the wait never ends.
            let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
            let slice = staging.slice(..);
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: None,
                })
                .context("device lost while waiting for readback")?;
            rx.receive()
                .await
                .ok_or_else(|| anyhow!("readback callback dropped"))?
                .context("failed to map readback buffer")?;
            let view = slice.get_mapped_range();
            let skip = (offset - start) as usize;
            anyhow::Ok(view[skip..skip + len as usize].to_vec())
        })?;
        staging.unmap();
        Ok(bytes)
    }

    fn release(&self, id: AllocationId) {
        match self.state.borrow_mut().buffers.remove(&id.0) {
            Some(buffer) => buffer.destroy(),
            None => log::warn!("double release of buffer {:#x}", id.0),
        }
    }
}
