//! Component contract, per-frame hook context and scene events.

use crate::{memory::MemoryHandle, scene::ObjectId};

/**
 * Data attached to a scene object.
 *
 * A component may opt into a per-frame `update` hook and an `inspect` hook
 * for the UI by setting `HAS_UPDATE` / `HAS_INSPECT`. The flags are read
 * once when the type's storage is created; types without a hook are never
 * visited for it.
 */
pub trait Component: 'static {
    const HAS_UPDATE: bool = false;
    const HAS_INSPECT: bool = false;

    fn update(&mut self, _ctx: &mut UpdateContext<'_>) {}

    fn inspect(&mut self, _ui: &mut dyn Inspector, _ctx: &mut UpdateContext<'_>) {}
}

/// Something a hook changed that whoever renders the scene has to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    /// The camera record was rebuilt; accumulated samples are stale.
    CameraChanged { object: ObjectId },
    /// A material record was rebuilt. When it switched between emissive and
    /// non-emissive the light list has to be reassembled.
    MaterialChanged {
        object: ObjectId,
        emissive_changed: bool,
    },
    /// An object's translate / rotate / scale was edited.
    TransformChanged { object: ObjectId },
    ResetAccumulation,
}

/// What a component hook gets to work with: device memory and an event sink.
pub struct UpdateContext<'a> {
    memory: &'a MemoryHandle,
    owner: ObjectId,
    events: &'a mut Vec<SceneEvent>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(memory: &'a MemoryHandle, owner: ObjectId, events: &'a mut Vec<SceneEvent>) -> Self {
        Self {
            memory,
            owner,
            events,
        }
    }

    pub fn memory(&self) -> &MemoryHandle {
        self.memory
    }

    /// The object owning the component whose hook is running.
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: ObjectId) {
        self.owner = owner;
    }

    pub fn emit(&mut self, event: SceneEvent) {
        self.events.push(event);
    }
}

/// Immediate-mode UI the inspect hooks draw into.
///
/// Every widget returns `true` when the user changed the value this frame.
pub trait Inspector {
    fn text(&mut self, text: &str);
    fn separator(&mut self) {}
    /// Returns `true` while the section is expanded.
    fn collapsing_header(&mut self, label: &str) -> bool;
    fn button(&mut self, label: &str) -> bool;
    fn drag_int(&mut self, label: &str, value: &mut i32, min: i32, max: i32) -> bool;
    fn drag_float(&mut self, label: &str, value: &mut f32, speed: f32) -> bool;
    fn drag_float3(&mut self, label: &str, value: &mut [f32; 3], speed: f32) -> bool;
    fn combo(&mut self, label: &str, items: &[&str], current: &mut usize) -> bool;
}

/// Edit a `cgmath` vector through [`Inspector::drag_float3`].
pub fn drag_vector3(
    ui: &mut dyn Inspector,
    label: &str,
    value: &mut cgmath::Vector3<f32>,
    speed: f32,
) -> bool {
    let mut raw: [f32; 3] = (*value).into();
    let changed = ui.drag_float3(label, &mut raw, speed);
    if changed {
        *value = raw.into();
    }
    changed
}
