use std::{collections::HashMap, rc::Rc};

use raytrace_scene::{
    Vector3,
    camera::CameraComponent,
    data_structures::{
        kernel::RenderParamsRaw,
        material::{Material, MaterialComponent},
        mesh::{Mesh, MeshComponent},
    },
    memory::{HostMemory, MemoryHandle},
    render::Kernel,
    scene::{Inspector, ObjectId, Scene},
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A scene on host memory; the `HostMemory` handle is kept for reading records back.
pub fn host_scene() -> (Rc<HostMemory>, Scene) {
    init_logger();
    let host = Rc::new(HostMemory::new());
    let memory: MemoryHandle = host.clone();
    (host, Scene::new(memory))
}

/// A single triangle in the xy plane with its corner at `origin`.
pub fn triangle(memory: &MemoryHandle, origin: [f32; 3]) -> Mesh {
    let [x, y, z] = origin;
    let mut mesh = Mesh::new(memory);
    mesh.set_positions(vec![[x, y, z], [x + 1.0, y, z], [x, y + 1.0, z]]);
    mesh.set_indices(vec![0, 1, 2]);
    mesh
}

/// Add an object holding a one-triangle mesh and a material.
pub fn add_triangle_object(scene: &mut Scene, name: &str, origin: [f32; 3], emission: Option<[f32; 3]>) -> ObjectId {
    let memory = Rc::clone(scene.memory());
    let object = scene.add_object(name);
    let mut material = Material::new(&memory);
    if let Some(emission) = emission {
        material = material.with_emission(emission.into());
    }
    scene.add_component(object, MeshComponent::new(triangle(&memory, origin)));
    scene.add_component(object, MaterialComponent::new(material));
    object
}

pub fn add_camera(scene: &mut Scene) -> ObjectId {
    let object = scene.add_object("camera");
    scene.add_component(
        object,
        CameraComponent::new(
            Vector3::new(0.0, 0.0, 5.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ),
    );
    object
}

/// Three dark triangles, one emissive triangle and a camera.
pub fn four_triangle_scene() -> (Rc<HostMemory>, Scene) {
    let (host, mut scene) = host_scene();
    add_camera(&mut scene);
    add_triangle_object(&mut scene, "left", [-3.0, 0.0, 0.0], None);
    add_triangle_object(&mut scene, "middle", [0.0, 0.0, 0.0], None);
    add_triangle_object(&mut scene, "right", [3.0, 0.0, 0.0], None);
    add_triangle_object(&mut scene, "lamp", [0.0, 4.0, 0.0], Some([10.0, 10.0, 10.0]));
    (host, scene)
}

/// Kernel that only remembers what it was asked to render.
#[derive(Default)]
pub struct RecordingKernel {
    pub frames: Vec<RenderParamsRaw>,
}

impl RecordingKernel {
    pub fn last(&self) -> Option<&RenderParamsRaw> {
        self.frames.last()
    }
}

impl Kernel for RecordingKernel {
    fn render(&mut self, params: &RenderParamsRaw) {
        self.frames.push(*params);
    }
}

pub enum Edit {
    Int(i32),
    Float(f32),
    Float3([f32; 3]),
    Choice(usize),
    Press,
}

/// Inspector replaying scripted edits.
///
/// Every widget whose label has a pending edit applies it once and reports a
/// change. All collapsing headers are open. Drawn labels are recorded.
#[derive(Default)]
pub struct ScriptedInspector {
    edits: HashMap<String, Edit>,
    pub drawn: Vec<String>,
}

impl ScriptedInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit(mut self, label: &str, edit: Edit) -> Self {
        self.edits.insert(label.to_string(), edit);
        self
    }

    pub fn pending(&self) -> usize {
        self.edits.len()
    }

    fn take(&mut self, label: &str) -> Option<Edit> {
        self.drawn.push(label.to_string());
        self.edits.remove(label)
    }
}

impl Inspector for ScriptedInspector {
    fn text(&mut self, text: &str) {
        self.drawn.push(text.to_string());
    }

    fn collapsing_header(&mut self, label: &str) -> bool {
        self.drawn.push(label.to_string());
        true
    }

    fn button(&mut self, label: &str) -> bool {
        matches!(self.take(label), Some(Edit::Press))
    }

    fn drag_int(&mut self, label: &str, value: &mut i32, min: i32, max: i32) -> bool {
        match self.take(label) {
            Some(Edit::Int(v)) => {
                *value = v.clamp(min, max);
                true
            }
            _ => false,
        }
    }

    fn drag_float(&mut self, label: &str, value: &mut f32, _speed: f32) -> bool {
        match self.take(label) {
            Some(Edit::Float(v)) => {
                *value = v;
                true
            }
            _ => false,
        }
    }

    fn drag_float3(&mut self, label: &str, value: &mut [f32; 3], _speed: f32) -> bool {
        match self.take(label) {
            Some(Edit::Float3(v)) => {
                *value = v;
                true
            }
            _ => false,
        }
    }

    fn combo(&mut self, label: &str, items: &[&str], current: &mut usize) -> bool {
        match self.take(label) {
            Some(Edit::Choice(i)) if i < items.len() => {
                *current = i;
                true
            }
            _ => false,
        }
    }
}
