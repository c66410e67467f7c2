use std::{cell::RefCell, collections::BTreeMap};

use anyhow::anyhow;

use super::{ALLOCATION_ALIGNMENT, Allocation, AllocationId, DeviceAddress, DeviceMemory, align_up};

const BASE_ADDRESS: DeviceAddress = 0x1000_0000;

#[derive(Debug)]
struct HostState {
    next_address: DeviceAddress,
    blocks: BTreeMap<DeviceAddress, Vec<u8>>,
    total_allocations: usize,
}

/// Device memory emulated in host RAM.
///
/// Allocations get unique, aligned, non-null addresses that are never reused,
/// so a dangling address reads back as `None` instead of someone else's data.
#[derive(Debug)]
pub struct HostMemory {
    state: RefCell<HostState>,
}

impl HostMemory {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(HostState {
                next_address: BASE_ADDRESS,
                blocks: BTreeMap::new(),
                total_allocations: 0,
            }),
        }
    }

    /// Read `len` bytes at `address`, which may point anywhere inside a live allocation.
    pub fn read(&self, address: DeviceAddress, len: usize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let (&start, block) = state.blocks.range(..=address).next_back()?;
        let offset = (address - start) as usize;
        block.get(offset..offset + len).map(<[u8]>::to_vec)
    }

    /// Read `count` records of type `T` starting at `address`.
    pub fn read_records<T: bytemuck::Pod>(&self, address: DeviceAddress, count: usize) -> Option<Vec<T>> {
        let bytes = self.read(address, count * std::mem::size_of::<T>())?;
        Some(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn read_record<T: bytemuck::Pod>(&self, address: DeviceAddress) -> Option<T> {
        self.read_records::<T>(address, 1)
            .and_then(|records| records.into_iter().next())
    }

    /// Size of the live allocation starting exactly at `address`.
    pub fn allocation_size(&self, address: DeviceAddress) -> Option<u64> {
        self.state
            .borrow()
            .blocks
            .get(&address)
            .map(|block| block.len() as u64)
    }

    pub fn live_allocations(&self) -> usize {
        self.state.borrow().blocks.len()
    }

    /// Allocations made over the lifetime of this memory, including released ones.
    pub fn total_allocations(&self) -> usize {
        self.state.borrow().total_allocations
    }

    pub fn live_bytes(&self) -> u64 {
        self.state
            .borrow()
            .blocks
            .values()
            .map(|block| block.len() as u64)
            .sum()
    }
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMemory for HostMemory {
    fn allocate(&self, size: u64) -> Allocation {
        let mut state = self.state.borrow_mut();
        let address = state.next_address;
        // Empty allocations still consume address space so addresses stay unique.
        state.next_address = align_up(address + size.max(1), ALLOCATION_ALIGNMENT);
        state.blocks.insert(address, vec![0; size as usize]);
        state.total_allocations += 1;
        Allocation {
            id: AllocationId(address),
            address,
            size,
        }
    }

    fn upload(&self, id: AllocationId, offset: u64, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(block) = state.blocks.get_mut(&id.0) else {
            log::error!("upload to released allocation {:#x}", id.0);
            return;
        };
        let offset = offset as usize;
        block[offset..offset + data.len()].copy_from_slice(data);
    }

    fn download(&self, id: AllocationId, offset: u64, len: u64) -> anyhow::Result<Vec<u8>> {
        let state = self.state.borrow();
        let block = state
            .blocks
            .get(&id.0)
            .ok_or_else(|| anyhow!("allocation {:#x} is not live", id.0))?;
        let range = offset as usize..(offset + len) as usize;
        block
            .get(range)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("read of {len} bytes at {offset} is out of bounds"))
    }

    fn release(&self, id: AllocationId) {
        if self.state.borrow_mut().blocks.remove(&id.0).is_none() {
            log::warn!("double release of allocation {:#x}", id.0);
        }
    }
}
