use std::any::TypeId;

use crate::{data_structures::transform::Transform, scene::storage::SlotRef};

/// Handle of a scene object: its index in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an object's component of one type lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ComponentRef {
    pub storage: usize,
    pub slot: SlotRef,
}

/// A named object with a local transform and at most one component per type.
#[derive(Debug)]
pub struct SceneObject {
    id: ObjectId,
    name: String,
    pub transform: Transform,
    components: Vec<(TypeId, ComponentRef)>,
}

impl SceneObject {
    pub(crate) fn new(id: ObjectId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            transform: Transform::default(),
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Composed local transform `T * Rz * Ry * Rx * S`, computed on every call.
    pub fn transform_matrix(&self) -> cgmath::Matrix4<f32> {
        self.transform.to_matrix()
    }

    pub fn has_component_type(&self, type_id: TypeId) -> bool {
        self.component_ref(type_id).is_some()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub(crate) fn component_ref(&self, type_id: TypeId) -> Option<ComponentRef> {
        self.components
            .iter()
            .find(|(ty, _)| *ty == type_id)
            .map(|(_, component)| *component)
    }

    pub(crate) fn component_refs(&self) -> impl Iterator<Item = ComponentRef> + '_ {
        self.components.iter().map(|(_, component)| *component)
    }

    pub(crate) fn attach(&mut self, type_id: TypeId, component: ComponentRef) {
        self.components.push((type_id, component));
    }
}
