//! Type-erased, chunked component storage.
//!
//! Components of one type are packed into 4 KiB chunks. Each slot holds the
//! owning object's id followed by the component itself. Chunks are never
//! moved or freed before the storage is dropped, so slots are stable.

use std::{
    alloc::{self, Layout},
    any::TypeId,
    ptr::NonNull,
};

use crate::scene::{
    ObjectId,
    component::{Component, Inspector, UpdateContext},
};

/// Target chunk size in bytes. A chunk holds at least one slot even if the slot is larger.
pub const CHUNK_SIZE: usize = 4096;

#[repr(C)]
struct Slot<T> {
    owner: ObjectId,
    value: T,
}

/// Position of a component inside its storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRef {
    pub(crate) chunk: u32,
    pub(crate) index: u32,
}

type UpdateFn = unsafe fn(*mut u8, &mut UpdateContext<'_>);
type InspectFn = unsafe fn(*mut u8, &mut dyn Inspector, &mut UpdateContext<'_>);

/// Per-type operations, resolved once when the storage is created.
struct ComponentVTable {
    type_id: TypeId,
    type_name: &'static str,
    value_offset: usize,
    drop: Option<unsafe fn(*mut u8)>,
    update: Option<UpdateFn>,
    inspect: Option<InspectFn>,
}

impl ComponentVTable {
    fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value_offset: std::mem::offset_of!(Slot<T>, value),
            drop: std::mem::needs_drop::<T>().then_some(drop_value::<T> as unsafe fn(*mut u8)),
            update: T::HAS_UPDATE.then_some(update_value::<T> as UpdateFn),
            inspect: T::HAS_INSPECT.then_some(inspect_value::<T> as InspectFn),
        }
    }
}

unsafe fn drop_value<T>(value: *mut u8) {
    unsafe { std::ptr::drop_in_place(value.cast::<T>()) }
}

unsafe fn update_value<T: Component>(value: *mut u8, ctx: &mut UpdateContext<'_>) {
    unsafe { (*value.cast::<T>()).update(ctx) }
}

unsafe fn inspect_value<T: Component>(
    value: *mut u8,
    ui: &mut dyn Inspector,
    ctx: &mut UpdateContext<'_>,
) {
    unsafe { (*value.cast::<T>()).inspect(ui, ctx) }
}

/// All components of a single type.
pub struct ComponentStorage {
    vtable: ComponentVTable,
    slot_size: usize,
    slots_per_chunk: usize,
    chunk_layout: Layout,
    chunks: Vec<NonNull<u8>>,
    /// Slots in use in the last chunk.
    fill: usize,
}

impl ComponentStorage {
    pub fn new<T: Component>() -> Self {
        let slot_size = std::mem::size_of::<Slot<T>>();
        let slots_per_chunk = (CHUNK_SIZE / slot_size).max(1);
        let chunk_layout =
            Layout::array::<Slot<T>>(slots_per_chunk).expect("chunk layout exceeds isize::MAX");
        let vtable = ComponentVTable::of::<T>();
        log::debug!(
            "registered component storage for {} ({} slots of {} bytes per chunk)",
            vtable.type_name,
            slots_per_chunk,
            slot_size
        );
        Self {
            vtable,
            slot_size,
            slots_per_chunk,
            chunk_layout,
            chunks: Vec::new(),
            fill: 0,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.vtable.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.vtable.type_name
    }

    pub fn has_update_hook(&self) -> bool {
        self.vtable.update.is_some()
    }

    pub fn has_inspect_hook(&self) -> bool {
        self.vtable.inspect.is_some()
    }

    pub fn slots_per_chunk(&self) -> usize {
        self.slots_per_chunk
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of stored components, from the chunk count and the last chunk's fill.
    pub fn count(&self) -> usize {
        match self.chunks.len() {
            0 => 0,
            n => (n - 1) * self.slots_per_chunk + self.fill,
        }
    }

    /// Append `value` owned by `owner`, starting a new chunk when the last one is full.
    pub fn allocate<T: Component>(&mut self, owner: ObjectId, value: T) -> SlotRef {
        self.assert_type::<T>();
        if self.chunks.is_empty() || self.fill == self.slots_per_chunk {
            // SAFETY: the layout has a non-zero size since every slot carries an ObjectId.
            let chunk = unsafe { alloc::alloc(self.chunk_layout) };
            let Some(chunk) = NonNull::new(chunk) else {
                alloc::handle_alloc_error(self.chunk_layout);
            };
            self.chunks.push(chunk);
            self.fill = 0;
        }
        let slot = SlotRef {
            chunk: (self.chunks.len() - 1) as u32,
            index: self.fill as u32,
        };
        // SAFETY: the slot is inside the last chunk and not yet initialised.
        unsafe {
            self.slot_ptr(slot)
                .cast::<Slot<T>>()
                .write(Slot { owner, value });
        }
        self.fill += 1;
        slot
    }

    pub fn get<T: Component>(&self, slot: SlotRef) -> &T {
        self.assert_type::<T>();
        self.assert_live(slot);
        // SAFETY: live slot of type T.
        unsafe { &*self.value_ptr(slot).cast::<T>() }
    }

    pub fn get_mut<T: Component>(&mut self, slot: SlotRef) -> &mut T {
        self.assert_type::<T>();
        self.assert_live(slot);
        // SAFETY: live slot of type T, exclusive through &mut self.
        unsafe { &mut *self.value_ptr(slot).cast::<T>() }
    }

    pub fn owner(&self, slot: SlotRef) -> ObjectId {
        self.assert_live(slot);
        // SAFETY: the owner id sits at offset 0 of every live slot.
        unsafe { *self.slot_ptr(slot).cast::<ObjectId>() }
    }

    /// Visit every component in insertion order.
    pub fn for_each<T: Component>(&mut self, mut visitor: impl FnMut(&mut T)) {
        self.for_each_with_owner(|_, value: &mut T| visitor(value));
    }

    /// Visit every component in insertion order together with its owner.
    pub fn for_each_with_owner<T: Component>(&mut self, mut visitor: impl FnMut(ObjectId, &mut T)) {
        self.assert_type::<T>();
        for (owner, value) in self.raw_slots() {
            // SAFETY: live slot of type T, exclusive through &mut self.
            visitor(owner, unsafe { &mut *value.cast::<T>() });
        }
    }

    /// Run the update hook on every component; does nothing if the type has none.
    pub fn run_update_hooks(&mut self, ctx: &mut UpdateContext<'_>) {
        let Some(update) = self.vtable.update else {
            return;
        };
        for (owner, value) in self.raw_slots() {
            ctx.set_owner(owner);
            // SAFETY: live slot of this storage's type, exclusive through &mut self.
            unsafe { update(value, ctx) };
        }
    }

    /// Run the inspect hook of one component. Returns `false` if the type has none.
    pub fn inspect(
        &mut self,
        slot: SlotRef,
        ui: &mut dyn Inspector,
        ctx: &mut UpdateContext<'_>,
    ) -> bool {
        self.assert_live(slot);
        let Some(inspect) = self.vtable.inspect else {
            return false;
        };
        ctx.set_owner(self.owner(slot));
        // SAFETY: live slot of this storage's type, exclusive through &mut self.
        unsafe { inspect(self.value_ptr(slot), ui, ctx) };
        true
    }

    /// `(owner, value pointer)` of every live slot. Iteration stops at the last chunk's fill mark.
    pub(crate) fn raw_slots(&self) -> impl Iterator<Item = (ObjectId, *mut u8)> + '_ {
        let last = self.chunks.len().saturating_sub(1);
        self.chunks.iter().enumerate().flat_map(move |(c, chunk)| {
            let used = if c == last {
                self.fill
            } else {
                self.slots_per_chunk
            };
            (0..used).map(move |i| {
                // SAFETY: `i` is below the chunk's fill so the slot is initialised.
                unsafe {
                    let slot = chunk.as_ptr().add(i * self.slot_size);
                    (*slot.cast::<ObjectId>(), slot.add(self.vtable.value_offset))
                }
            })
        })
    }

    /// Pointer to the value in `slot`. Callers must not create aliasing references.
    pub(crate) fn value_ptr(&self, slot: SlotRef) -> *mut u8 {
        // SAFETY: callers only pass slots handed out by `allocate`.
        unsafe { self.slot_ptr(slot).add(self.vtable.value_offset) }
    }

    unsafe fn slot_ptr(&self, slot: SlotRef) -> *mut u8 {
        unsafe {
            self.chunks[slot.chunk as usize]
                .as_ptr()
                .add(slot.index as usize * self.slot_size)
        }
    }

    fn assert_type<T: 'static>(&self) {
        assert_eq!(
            TypeId::of::<T>(),
            self.vtable.type_id,
            "{} accessed as {}",
            self.vtable.type_name,
            std::any::type_name::<T>()
        );
    }

    fn assert_live(&self, slot: SlotRef) {
        let chunk = slot.chunk as usize;
        let used = if chunk + 1 == self.chunks.len() {
            self.fill
        } else {
            self.slots_per_chunk
        };
        assert!(
            chunk < self.chunks.len() && (slot.index as usize) < used,
            "dangling {:?} in {}",
            slot,
            self.vtable.type_name
        );
    }
}

impl Drop for ComponentStorage {
    fn drop(&mut self) {
        if let Some(drop) = self.vtable.drop {
            for (_, value) in self.raw_slots() {
                // SAFETY: every live slot is dropped exactly once.
                unsafe { drop(value) };
            }
        }
        for chunk in self.chunks.drain(..) {
            // SAFETY: allocated with this layout in `allocate`.
            unsafe { alloc::dealloc(chunk.as_ptr(), self.chunk_layout) };
        }
    }
}

impl std::fmt::Debug for ComponentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStorage")
            .field("type", &self.vtable.type_name)
            .field("count", &self.count())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
