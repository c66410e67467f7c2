//! Surface materials.

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use cgmath::{InnerSpace, Vector3};

use crate::{
    data_structures::{
        kernel::{BsdfKind, MaterialRaw, TaggedPtr},
        texture::Texture,
    },
    memory::{DeviceAddress, DeviceBuffer, MemoryHandle, upload_record},
    scene::{
        Component, SceneEvent, UpdateContext,
        component::{Inspector, drag_vector3},
    },
};

/**
 * Shading parameters of a surface plus their device record.
 *
 * Fields are edited directly; call [`Material::mark_changed`] afterwards so
 * the record in device memory follows. The record is allocated once and
 * updated in place, so [`Material::pointer`] stays valid across edits.
 */
pub struct Material {
    pub emission: Vector3<f32>,
    pub diffuse: Vector3<f32>,
    pub specular: Vector3<f32>,
    pub transmittance: Vector3<f32>,
    pub ior: f32,
    /// Blinn-Phong exponent.
    pub shininess: f32,
    pub opacity: f32,
    pub bsdf: BsdfKind,
    pub emission_map: Option<Rc<Texture>>,
    pub diffuse_map: Option<Rc<Texture>>,
    pub specular_map: Option<Rc<Texture>>,

    memory: MemoryHandle,
    record: Option<DeviceBuffer>,
}

impl Material {
    /// A grey diffuse, non-emissive material with its record already uploaded.
    pub fn new(memory: &MemoryHandle) -> Self {
        let mut material = Self {
            emission: Vector3::new(0.0, 0.0, 0.0),
            diffuse: Vector3::new(0.5, 0.5, 0.5),
            specular: Vector3::new(0.0, 0.0, 0.0),
            transmittance: Vector3::new(0.0, 0.0, 0.0),
            ior: 1.0,
            shininess: 1.0,
            opacity: 1.0,
            bsdf: BsdfKind::default(),
            emission_map: None,
            diffuse_map: None,
            specular_map: None,
            memory: Rc::clone(memory),
            record: None,
        };
        material.mark_changed();
        material
    }

    pub fn with_emission(mut self, emission: Vector3<f32>) -> Self {
        self.emission = emission;
        self.mark_changed();
        self
    }

    pub fn with_diffuse(mut self, diffuse: Vector3<f32>) -> Self {
        self.diffuse = diffuse;
        self.mark_changed();
        self
    }

    pub fn with_bsdf(mut self, bsdf: BsdfKind) -> Self {
        self.bsdf = bsdf;
        self.mark_changed();
        self
    }

    /// Rebuild the device record from the current fields.
    pub fn mark_changed(&mut self) {
        let raw = self.to_raw();
        upload_record(&mut self.record, &self.memory, &raw);
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.magnitude2() > 0.0
    }

    /// Tagged pointer to the record; the tag is the BSDF kind.
    pub fn pointer(&self) -> TaggedPtr {
        TaggedPtr::new(self.bsdf as u32, self.address())
    }

    pub fn address(&self) -> DeviceAddress {
        self.record.as_ref().map_or(0, DeviceBuffer::address)
    }

    pub fn to_raw(&self) -> MaterialRaw {
        let map = |t: &Option<Rc<Texture>>| t.as_ref().map_or(0, |t| t.address());
        MaterialRaw {
            emission: self.emission.extend(0.0).into(),
            diffuse: self.diffuse.extend(0.0).into(),
            specular: self.specular.extend(0.0).into(),
            transmittance: self.transmittance.extend(0.0).into(),
            ior: self.ior,
            shininess: self.shininess,
            opacity: self.opacity,
            _pad: 0,
            emission_map: map(&self.emission_map),
            diffuse_map: map(&self.diffuse_map),
            specular_map: map(&self.specular_map),
        }
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("bsdf", &self.bsdf)
            .field("emission", &self.emission)
            .field("diffuse", &self.diffuse)
            .finish_non_exhaustive()
    }
}

/// Attaches a (possibly shared) material to a scene object.
#[derive(Clone, Debug)]
pub struct MaterialComponent {
    material: Rc<RefCell<Material>>,
}

impl MaterialComponent {
    pub fn new(material: Material) -> Self {
        Self::shared(Rc::new(RefCell::new(material)))
    }

    pub fn shared(material: Rc<RefCell<Material>>) -> Self {
        Self { material }
    }

    pub fn material(&self) -> Ref<'_, Material> {
        self.material.borrow()
    }

    pub fn material_mut(&self) -> RefMut<'_, Material> {
        self.material.borrow_mut()
    }
}

impl Component for MaterialComponent {
    const HAS_INSPECT: bool = true;

    fn inspect(&mut self, ui: &mut dyn Inspector, ctx: &mut UpdateContext<'_>) {
        let mut material = self.material.borrow_mut();
        let was_emissive = material.is_emissive();
        let mut changed = false;
        changed |= drag_vector3(ui, "diffuse", &mut material.diffuse, 0.01);
        changed |= drag_vector3(ui, "emission", &mut material.emission, 0.01);
        let names = BsdfKind::ALL.map(BsdfKind::name);
        let mut current = material.bsdf as usize;
        if ui.combo("bsdf", &names, &mut current) {
            material.bsdf = BsdfKind::ALL[current.min(BsdfKind::ALL.len() - 1)];
            changed = true;
        }

        if changed {
            material.mark_changed();
            ctx.emit(SceneEvent::MaterialChanged {
                object: ctx.owner(),
                emissive_changed: was_emissive != material.is_emissive(),
            });
        }
    }
}
