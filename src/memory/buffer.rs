use std::rc::Rc;

use super::{Allocation, DeviceAddress, MemoryHandle};

/// A single block of device memory that is released when dropped.
pub struct DeviceBuffer {
    memory: MemoryHandle,
    allocation: Allocation,
}

impl DeviceBuffer {
    /// Allocate `size` zeroed bytes.
    pub fn new(memory: &MemoryHandle, size: u64) -> Self {
        let allocation = memory.allocate(size);
        Self {
            memory: Rc::clone(memory),
            allocation,
        }
    }

    /// Allocate exactly `data.len()` bytes and upload `data`.
    pub fn with_data(memory: &MemoryHandle, data: &[u8]) -> Self {
        let buffer = Self::new(memory, data.len() as u64);
        buffer.upload(0, data);
        buffer
    }

    pub fn with_record<T: bytemuck::Pod>(memory: &MemoryHandle, record: &T) -> Self {
        Self::with_data(memory, bytemuck::bytes_of(record))
    }

    pub fn upload(&self, offset: u64, data: &[u8]) {
        assert!(
            offset + data.len() as u64 <= self.allocation.size,
            "upload of {} bytes at offset {} overflows a {} byte buffer",
            data.len(),
            offset,
            self.allocation.size
        );
        if !data.is_empty() {
            self.memory.upload(self.allocation.id, offset, data);
        }
    }

    pub fn upload_record<T: bytemuck::Pod>(&self, record: &T) {
        self.upload(0, bytemuck::bytes_of(record));
    }

    pub fn download(&self) -> anyhow::Result<Vec<u8>> {
        self.memory
            .download(self.allocation.id, 0, self.allocation.size)
    }

    pub fn address(&self) -> DeviceAddress {
        self.allocation.address
    }

    pub fn size(&self) -> u64 {
        self.allocation.size
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("address", &format_args!("{:#x}", self.allocation.address))
            .field("size", &self.allocation.size)
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.memory.release(self.allocation.id);
    }
}

/**
 * A device buffer that only ever grows.
 *
 * A write reallocates only when the required size exceeds the current
 * capacity; otherwise the existing block is re-uploaded in place, so the
 * device address stays stable while sizes are stable.
 */
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    label: &'static str,
    buffer: Option<DeviceBuffer>,
    reallocations: u32,
}

impl GrowableBuffer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            buffer: None,
            reallocations: 0,
        }
    }

    /// Upload `data`, reallocating if it does not fit. Returns `true` on reallocation.
    pub fn write(&mut self, memory: &MemoryHandle, data: &[u8]) -> bool {
        self.write_reserving(memory, data, data.len() as u64)
    }

    pub fn write_slice<T: bytemuck::Pod>(&mut self, memory: &MemoryHandle, items: &[T]) -> bool {
        self.write(memory, bytemuck::cast_slice(items))
    }

    /// Upload `data` into a buffer of at least `required` bytes.
    pub fn write_reserving(&mut self, memory: &MemoryHandle, data: &[u8], required: u64) -> bool {
        let required = required.max(data.len() as u64);
        let reallocated = self.reserve(memory, required);
        if let Some(buffer) = &self.buffer {
            buffer.upload(0, data);
        }
        reallocated
    }

    /// Make sure at least `required` bytes are allocated without uploading anything.
    pub fn reserve(&mut self, memory: &MemoryHandle, required: u64) -> bool {
        match &self.buffer {
            Some(buffer) if buffer.size() >= required => false,
            current => {
                log::debug!(
                    "{}: growing from {} to {} bytes",
                    self.label,
                    current.as_ref().map_or(0, DeviceBuffer::size),
                    required
                );
                // Drop the old block before allocating so peak usage stays low.
                self.buffer = None;
                self.buffer = Some(DeviceBuffer::new(memory, required));
                self.reallocations += 1;
                true
            }
        }
    }

    pub fn buffer(&self) -> Option<&DeviceBuffer> {
        self.buffer.as_ref()
    }

    /// Device address of the backing block, or `0` before the first write.
    pub fn address(&self) -> DeviceAddress {
        self.buffer.as_ref().map_or(0, DeviceBuffer::address)
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.as_ref().map_or(0, DeviceBuffer::size)
    }

    /// How many times the backing block has been (re)allocated.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }
}

/// Create `slot` on first use, then keep re-uploading into it.
pub(crate) fn upload_record<T: bytemuck::Pod>(
    slot: &mut Option<DeviceBuffer>,
    memory: &MemoryHandle,
    record: &T,
) -> DeviceAddress {
    match slot {
        Some(buffer) => buffer.upload_record(record),
        None => *slot = Some(DeviceBuffer::with_record(memory, record)),
    }
    slot.as_ref().map_or(0, DeviceBuffer::address)
}
