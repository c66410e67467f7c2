//! Scene objects and their components.
//!
//! - `Scene` owns all objects and one `ComponentStorage` per component type
//! - `SceneObject` is an identity, a local transform and its component slots
//! - `Component` is the contract component types implement, with optional hooks
//! - `Query` drives joined iteration over several component types
//! - `SceneEvent` is how hooks tell the renderer what changed

pub mod component;
mod object;
pub mod query;
pub mod storage;

use std::{any::TypeId, collections::HashMap};

pub use component::{Component, Inspector, SceneEvent, UpdateContext};
pub use object::{ObjectId, SceneObject};
pub use query::Query;

use crate::{
    memory::MemoryHandle,
    scene::{
        component::drag_vector3,
        object::ComponentRef,
        storage::ComponentStorage,
    },
};

/// Fills a scene from some external description, e.g. a file format.
pub trait SceneLoader {
    fn load(&mut self, scene: &mut Scene) -> anyhow::Result<()>;
}

/**
 * Container of all scene objects and their components.
 *
 * Components of one type share a chunked storage that is created the first
 * time the type is attached to any object. Storages keep registration order,
 * which is the order `update` runs their hooks in.
 */
pub struct Scene {
    memory: MemoryHandle,
    objects: Vec<SceneObject>,
    storages: Vec<ComponentStorage>,
    storage_index: HashMap<TypeId, usize>,
    selected: usize,
}

impl Scene {
    pub fn new(memory: MemoryHandle) -> Self {
        Self {
            memory,
            objects: Vec::new(),
            storages: Vec::new(),
            storage_index: HashMap::new(),
            selected: 0,
        }
    }

    /// Device memory the scene's components allocate from.
    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    pub fn add_object(&mut self, name: &str) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(SceneObject::new(id, name));
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.index())
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id.index())
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Attach `value` to `object`.
    ///
    /// Returns `None` and drops `value` if the object already has a component
    /// of this type or does not exist.
    pub fn add_component<T: Component>(&mut self, object: ObjectId, value: T) -> Option<&mut T> {
        let type_id = TypeId::of::<T>();
        match self.objects.get(object.index()) {
            None => {
                log::warn!("add_component on unknown object {object}");
                return None;
            }
            Some(obj) if obj.has_component_type(type_id) => return None,
            Some(_) => {}
        }
        let storage = *self.storage_index.entry(type_id).or_insert_with(|| {
            self.storages.push(ComponentStorage::new::<T>());
            self.storages.len() - 1
        });
        let slot = self.storages[storage].allocate(object, value);
        self.objects[object.index()].attach(type_id, ComponentRef { storage, slot });
        Some(self.storages[storage].get_mut(slot))
    }

    pub fn has_component<T: Component>(&self, object: ObjectId) -> bool {
        self.object(object)
            .is_some_and(|obj| obj.has_component_type(TypeId::of::<T>()))
    }

    pub fn component<T: Component>(&self, object: ObjectId) -> Option<&T> {
        let component = self.object(object)?.component_ref(TypeId::of::<T>())?;
        Some(self.storages[component.storage].get(component.slot))
    }

    pub fn component_mut<T: Component>(&mut self, object: ObjectId) -> Option<&mut T> {
        let component = self.object(object)?.component_ref(TypeId::of::<T>())?;
        Some(self.storages[component.storage].get_mut(component.slot))
    }

    /// Number of components of type `T`, `0` if the type was never attached.
    pub fn count<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, ComponentStorage::count)
    }

    pub fn storage<T: Component>(&self) -> Option<&ComponentStorage> {
        self.storage_index
            .get(&TypeId::of::<T>())
            .map(|&index| &self.storages[index])
    }

    /// First object, in creation order, holding a `T`.
    pub fn first_object_with<T: Component>(&self) -> Option<ObjectId> {
        let type_id = TypeId::of::<T>();
        self.objects
            .iter()
            .find(|obj| obj.has_component_type(type_id))
            .map(SceneObject::id)
    }

    /**
     * Visit every object holding all component types of `Q`.
     *
     * `Q` is a tuple such as `(MeshComponent, MaterialComponent)`. Objects are
     * visited in the insertion order of the first type's storage. Naming the
     * same type twice is a programming error and panics.
     */
    pub fn for_each<Q: Query>(&mut self, mut visitor: impl FnMut(&SceneObject, Q::Item<'_>)) {
        let type_ids = Q::type_ids();
        for (i, ty) in type_ids.iter().enumerate() {
            assert!(
                !type_ids[..i].contains(ty),
                "component type queried twice in one join"
            );
        }
        let Some(&driver) = self.storage_index.get(&type_ids[0]) else {
            return;
        };
        let this: &Scene = self;
        for (owner, value) in this.storages[driver].raw_slots() {
            let object = &this.objects[owner.index()];
            // SAFETY: `self` is exclusively borrowed, every slot is visited once and
            // the queried types are distinct, so no two items alias.
            if let Some(item) = unsafe { Q::fetch(this, object, value) } {
                visitor(object, item);
            }
        }
    }

    /// Run every storage's update hooks, in registration order.
    pub fn update(&mut self) -> Vec<SceneEvent> {
        let mut events = Vec::new();
        let mut ctx = UpdateContext::new(&self.memory, ObjectId(0), &mut events);
        for storage in &mut self.storages {
            storage.run_update_hooks(&mut ctx);
        }
        events
    }

    pub fn select(&mut self, object: ObjectId) {
        if object.index() < self.objects.len() {
            self.selected = object.index();
        }
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.objects.get(self.selected).map(SceneObject::id)
    }

    /// Draw the scene panel: object picker, the selected object's transform
    /// and the inspect hooks of its components.
    pub fn inspect(&mut self, ui: &mut dyn Inspector) -> Vec<SceneEvent> {
        let mut events = Vec::new();
        if self.objects.is_empty() {
            ui.text("empty scene");
            return events;
        }
        ui.text(&format!("{} objects in total", self.objects.len()));
        let mut next = self.selected as i32;
        if ui.drag_int("select object", &mut next, 0, self.objects.len() as i32 - 1) {
            self.selected = next.clamp(0, self.objects.len() as i32 - 1) as usize;
        }
        ui.separator();

        let object = &mut self.objects[self.selected];
        let id = object.id();
        ui.text(&format!("object '{}'", object.name()));
        let mut moved = false;
        moved |= drag_vector3(ui, "translate", &mut object.transform.translate, 0.05);
        moved |= drag_vector3(ui, "rotate", &mut object.transform.rotate, 0.5);
        moved |= drag_vector3(ui, "scale", &mut object.transform.scale, 0.05);
        if moved {
            events.push(SceneEvent::TransformChanged { object: id });
        }

        let components: Vec<ComponentRef> = object.component_refs().collect();
        let mut ctx = UpdateContext::new(&self.memory, id, &mut events);
        for component in components {
            let storage = &mut self.storages[component.storage];
            if !storage.has_inspect_hook() {
                continue;
            }
            let header = format!("component '{}'", short_type_name(storage.type_name()));
            if ui.collapsing_header(&header) {
                storage.inspect(component.slot, ui, &mut ctx);
            }
        }
        events
    }

    /// Pointer to `object`'s component of type `type_id`.
    pub(crate) fn value_ptr(&self, object: &SceneObject, type_id: TypeId) -> Option<*mut u8> {
        let component = object.component_ref(type_id)?;
        Some(self.storages[component.storage].value_ptr(component.slot))
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("objects", &self.objects.len())
            .field("storages", &self.storages)
            .finish()
    }
}

fn short_type_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}
