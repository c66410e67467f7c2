//! Device memory: the opaque allocator behind every scene buffer.
//!
//! - `DeviceMemory` is the allocator seam (allocate / upload / download / release)
//! - `DeviceBuffer` owns exactly one allocation and frees it on drop
//! - `GrowableBuffer` reallocates only when a write outgrows its capacity
//! - `HostMemory` keeps allocations in host RAM behind a synthetic address space
//! - `WgpuMemory` backs allocations with wgpu storage buffers

mod buffer;
mod gpu;
mod host;

use std::rc::Rc;

pub use buffer::{DeviceBuffer, GrowableBuffer};
pub(crate) use buffer::upload_record;
pub use gpu::WgpuMemory;
pub use host::HostMemory;

/// Address of a byte in device memory. `0` is the null address.
pub type DeviceAddress = u64;

/// Every allocation starts on this boundary so any record can be addressed directly.
pub const ALLOCATION_ALIGNMENT: u64 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationId(pub u64);

/// A live block of device memory handed out by a [`DeviceMemory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub id: AllocationId,
    pub address: DeviceAddress,
    pub size: u64,
}

/// Allocator for device-resident memory.
///
/// Implementations hand out zero-initialised blocks. Running out of memory
/// is not recoverable, implementations abort instead of returning an error.
pub trait DeviceMemory {
    fn allocate(&self, size: u64) -> Allocation;
    /// Copies `data` into the allocation starting at `offset` bytes.
    fn upload(&self, id: AllocationId, offset: u64, data: &[u8]);
    /// Reads `len` bytes back to the host. Used for capture and debugging only.
    fn download(&self, id: AllocationId, offset: u64, len: u64) -> anyhow::Result<Vec<u8>>;
    fn release(&self, id: AllocationId);
}

/// Shared handle to the allocator. Scene data is single threaded, hence `Rc`.
pub type MemoryHandle = Rc<dyn DeviceMemory>;

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
