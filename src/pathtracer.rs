//! Assembles the device-side scene and drives progressive rendering.
//!
//! The [`PathTracer`] turns every object holding both a mesh and a material
//! into a top-level BVH leaf and a flat instance, collects emissive instances
//! into the light list and hands the resulting [`SceneRaw`] to a [`Kernel`]
//! once per frame. Changes reported through [`SceneEvent`]s only mark parts
//! as dirty; [`PathTracer::sync`] rebuilds them in a fixed order.

use std::rc::Rc;

use crate::{
    accel::{self, AccelBuilder, MedianSplitBuilder},
    camera::CameraComponent,
    data_structures::{
        bbox::Bbox,
        kernel::{
            AccelNode, AccelTopInstanceRaw, AccelTopRaw, GeometryLightRaw, InstanceRaw, LightKind,
            LightSamplerRaw, RenderParamsRaw, SceneRaw, TaggedPtr,
        },
        material::MaterialComponent,
        mesh::MeshComponent,
    },
    memory::{DeviceAddress, DeviceBuffer, GrowableBuffer, MemoryHandle, upload_record},
    render::{Film, Kernel},
    scene::{Inspector, ObjectId, Scene, SceneEvent},
};

/// Deepest bounce count the UI lets you pick.
pub const MAX_DEPTH_LIMIT: i32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathTracerSettings {
    /// Maximum path length, `-1` for unbounded (russian roulette only).
    pub max_depth: i32,
    /// Stop accumulating after this many samples per pixel.
    pub max_spp: Option<u32>,
}

impl Default for PathTracerSettings {
    fn default() -> Self {
        Self {
            max_depth: -1,
            max_spp: None,
        }
    }
}

pub struct PathTracer {
    memory: MemoryHandle,
    builder: Box<dyn AccelBuilder>,
    settings: PathTracerSettings,

    camera: Option<TaggedPtr>,
    accel_nodes: GrowableBuffer,
    accel_bboxes: GrowableBuffer,
    accel_instances: GrowableBuffer,
    accel_top: Option<DeviceBuffer>,
    instances: GrowableBuffer,
    lights: GrowableBuffer,
    geometry_lights: Vec<DeviceBuffer>,
    /// Objects of the mesh/material join at the last top-level build, in join order.
    assembled: Vec<ObjectId>,

    num_top_instances: usize,
    num_instances: usize,
    num_lights: usize,
    curr_spp: u32,
    last_size: (u32, u32),

    camera_dirty: bool,
    accel_dirty: bool,
    instances_dirty: bool,
}

impl PathTracer {
    /// A path tracer allocating from the scene's device memory. Nothing is
    /// built until [`PathTracer::build_buffers`] or [`PathTracer::sync`].
    pub fn new(scene: &Scene, settings: PathTracerSettings) -> Self {
        Self::with_builder(scene, settings, Box::new(MedianSplitBuilder))
    }

    pub fn with_builder(
        scene: &Scene,
        settings: PathTracerSettings,
        builder: Box<dyn AccelBuilder>,
    ) -> Self {
        Self {
            memory: Rc::clone(scene.memory()),
            builder,
            settings,
            camera: None,
            accel_nodes: GrowableBuffer::new("top accel nodes"),
            accel_bboxes: GrowableBuffer::new("top accel bboxes"),
            accel_instances: GrowableBuffer::new("top accel instances"),
            accel_top: None,
            instances: GrowableBuffer::new("instances"),
            lights: GrowableBuffer::new("lights"),
            geometry_lights: Vec::new(),
            assembled: Vec::new(),
            num_top_instances: 0,
            num_instances: 0,
            num_lights: 0,
            curr_spp: 0,
            last_size: (0, 0),
            camera_dirty: true,
            accel_dirty: true,
            instances_dirty: true,
        }
    }

    /// Build everything from scratch.
    pub fn build_buffers(&mut self, scene: &mut Scene) {
        self.build_camera(scene);
        self.build_accel(scene);
        self.build_instances_and_lights(scene);
        self.reset_accumulation();
        log::info!(
            "scene assembled: {} instances, {} lights",
            self.num_instances,
            self.num_lights
        );
    }

    /// Rebuild whatever events, mesh edits or newly joined objects
    /// invalidated, camera first, then the top-level BVH, then instances and
    /// lights. Returns `true` if anything was rebuilt.
    pub fn sync(&mut self, scene: &mut Scene) -> bool {
        let mut meshes_changed = false;
        let mut members = Vec::with_capacity(self.assembled.len());
        scene.for_each::<(MeshComponent, MaterialComponent)>(|object, (mesh, _)| {
            meshes_changed |= mesh.mesh().needs_build();
            members.push(object.id());
        });
        if members != self.assembled {
            log::debug!(
                "instanced objects changed from {} to {}",
                self.assembled.len(),
                members.len()
            );
            meshes_changed = true;
        }
        if meshes_changed {
            self.accel_dirty = true;
            self.instances_dirty = true;
            self.reset_accumulation();
        }

        let mut rebuilt = false;
        if self.camera_dirty {
            self.build_camera(scene);
            rebuilt = true;
        }
        if self.accel_dirty {
            self.build_accel(scene);
            rebuilt = true;
        }
        if self.instances_dirty {
            self.build_instances_and_lights(scene);
            rebuilt = true;
        }
        rebuilt
    }

    /// Upload every camera's record in storage order; the last one renders.
    pub fn build_camera(&mut self, scene: &mut Scene) {
        self.camera_dirty = false;
        let memory = &self.memory;
        let mut camera = None;
        scene.for_each::<(CameraComponent,)>(|_, (component,)| {
            component.build_buffer(memory);
            camera = component.pointer();
        });
        if camera.is_none() {
            log::warn!("scene has no camera");
        }
        self.camera = camera;
    }

    /**
     * Build the top-level BVH over all objects with a mesh and a material.
     *
     * Each mesh's own BVH is built first if needed. Meshes without triangles
     * do not become leaves. With no leaves at all the top-level record is
     * dropped and rendering finds no geometry.
     */
    pub fn build_accel(&mut self, scene: &mut Scene) {
        self.accel_dirty = false;
        let builder = &*self.builder;
        let mut leaf_bboxes = Vec::new();
        let mut top_instances = Vec::new();
        let mut members = Vec::new();
        scene.for_each::<(MeshComponent, MaterialComponent)>(|object, (mesh, _)| {
            members.push(object.id());
            let mut mesh = mesh.mesh_mut();
            mesh.build_accel(builder);
            if mesh.accel_address() == 0 {
                return;
            }
            let transform = object.transform_matrix();
            leaf_bboxes.push(mesh.bbox().transform_by(&transform).to_raw());
            top_instances.push(AccelTopInstanceRaw {
                accel: mesh.accel_address(),
                transform: transform.into(),
                transform_inv: object.transform.to_inverse_matrix().into(),
            });
        });

        self.assembled = members;
        let n = top_instances.len();
        self.num_top_instances = n;
        if n == 0 {
            log::warn!("no instanced geometry, skipping top-level BVH build");
            self.accel_top = None;
            return;
        }

        let total = accel::node_count(n);
        let mut bboxes = vec![Bbox::EMPTY.to_raw(); total];
        bboxes[accel::leaf_index(n, 0)..].copy_from_slice(&leaf_bboxes);
        let merged = accel::merged_leaf_bbox(&bboxes, n);
        let mut nodes = vec![AccelNode::default(); total];
        self.builder.build(&mut nodes, &mut bboxes, &merged, n);

        self.accel_nodes.write_slice(&self.memory, &nodes);
        self.accel_bboxes.write_slice(&self.memory, &bboxes);
        // Sized like the node array, only the first `n` entries are used.
        self.accel_instances.write_reserving(
            &self.memory,
            bytemuck::cast_slice(&top_instances),
            (total * size_of::<AccelTopInstanceRaw>()) as u64,
        );

        let top = AccelTopRaw {
            nodes: self.accel_nodes.address(),
            bboxes: self.accel_bboxes.address(),
            instances: self.accel_instances.address(),
        };
        upload_record(&mut self.accel_top, &self.memory, &top);
        log::debug!("built top-level BVH: {n} instances, {total} nodes");
    }

    /// Flatten objects into instances and collect the emissive ones as lights.
    pub fn build_instances_and_lights(&mut self, scene: &mut Scene) {
        self.instances_dirty = false;
        let memory = &self.memory;
        let builder = &*self.builder;
        let geometry_lights = &mut self.geometry_lights;
        let mut instances = Vec::new();
        let mut lights = Vec::new();
        scene.for_each::<(MeshComponent, MaterialComponent)>(|object, (mesh, material)| {
            let mut mesh = mesh.mesh_mut();
            mesh.build_accel(builder);
            if mesh.accel_address() == 0 {
                return;
            }
            let material = material.material();
            let mut instance = InstanceRaw {
                geometry: mesh.geometry(),
                material: material.pointer(),
                light: TaggedPtr::null(LightKind::Geometry as u32),
            };

            if material.is_emissive() {
                let raw = GeometryLightRaw {
                    geometry: instance.geometry,
                    material: instance.material,
                    transform: object.transform_matrix().into(),
                    transform_it: object.transform.to_normal_matrix().into(),
                };
                let slot = lights.len();
                // Records are reused by position and only allocated for new lights.
                if slot < geometry_lights.len() {
                    geometry_lights[slot].upload_record(&raw);
                } else {
                    geometry_lights.push(DeviceBuffer::with_record(memory, &raw));
                }
                let address = geometry_lights[slot].address();
                instance.light = TaggedPtr::new(LightKind::Geometry as u32, address);
                lights.push(instance.light);
            }
            instances.push(instance);
        });
        self.geometry_lights.truncate(lights.len());

        self.num_instances = instances.len();
        self.num_lights = lights.len();
        if !instances.is_empty() {
            self.instances.write_slice(&self.memory, &instances);
        }
        if !lights.is_empty() {
            self.lights.write_slice(&self.memory, &lights);
        }
        log::debug!(
            "assembled {} instances, {} lights",
            self.num_instances,
            self.num_lights
        );
    }

    /// React to a change reported by the scene. Rebuilds happen in [`PathTracer::sync`].
    pub fn handle_event(&mut self, event: &SceneEvent) {
        match *event {
            SceneEvent::CameraChanged { .. } => {
                self.camera_dirty = true;
            }
            SceneEvent::MaterialChanged {
                object,
                emissive_changed,
            } => {
                if emissive_changed {
                    log::debug!("emission toggled on {object}, light list is stale");
                }
                // The material tag in instances and lights follows the BSDF.
                self.instances_dirty = true;
            }
            SceneEvent::TransformChanged { .. } => {
                self.accel_dirty = true;
                self.instances_dirty = true;
            }
            SceneEvent::ResetAccumulation => {}
        }
        self.reset_accumulation();
    }

    pub fn handle_events<'a>(&mut self, events: impl IntoIterator<Item = &'a SceneEvent>) {
        for event in events {
            self.handle_event(event);
        }
    }

    /**
     * Render one progressive sample into `film`.
     *
     * Skipped, returning `false`, without a camera, without lights or once
     * the sample budget is spent. A film size change restarts accumulation.
     */
    pub fn render_frame(&mut self, film: &mut Film, kernel: &mut dyn Kernel) -> bool {
        let Some(camera) = self.camera else {
            log::warn!("no camera, skipping frame");
            return false;
        };
        if self.num_lights == 0 {
            log::warn!("no lights, skipping frame");
            return false;
        }

        let size = (film.width(), film.height());
        if size != self.last_size {
            self.last_size = size;
            self.reset_accumulation();
        }
        if self
            .settings
            .max_spp
            .is_some_and(|max| self.curr_spp >= max)
        {
            return false;
        }
        self.curr_spp += 1;

        let params = RenderParamsRaw {
            scene: self.scene_descriptor(camera),
            output: film.map(),
            screen_width: size.0,
            screen_height: size.1,
            spp: self.curr_spp,
            max_depth: self.settings.max_depth as u32,
        };
        kernel.render(&params);
        film.unmap();
        true
    }

    fn scene_descriptor(&self, camera: TaggedPtr) -> SceneRaw {
        SceneRaw {
            camera,
            light_sampler: LightSamplerRaw {
                lights: self.lights.address(),
                num_lights: self.num_lights as u32,
                pdf: 1.0 / self.num_lights as f32,
            },
            instances: self.instances.address(),
            accel: self.accel_address(),
        }
    }

    /// Path tracer panel: bounce limit, sample count and a reset button.
    pub fn inspect(&mut self, ui: &mut dyn Inspector) {
        let mut depth = self.settings.max_depth;
        if ui.drag_int("max depth", &mut depth, -1, MAX_DEPTH_LIMIT) {
            self.settings.max_depth = depth.clamp(-1, MAX_DEPTH_LIMIT);
            self.reset_accumulation();
        }
        ui.text(&format!("{} spp", self.curr_spp));
        if ui.button("reset") {
            self.reset_accumulation();
        }
    }

    pub fn reset_accumulation(&mut self) {
        self.curr_spp = 0;
    }

    pub fn accumulated_spp(&self) -> u32 {
        self.curr_spp
    }

    pub fn settings(&self) -> &PathTracerSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut PathTracerSettings {
        &mut self.settings
    }

    pub fn instance_count(&self) -> usize {
        self.num_instances
    }

    /// Leaves of the top-level BVH.
    pub fn top_level_instance_count(&self) -> usize {
        self.num_top_instances
    }

    pub fn light_count(&self) -> usize {
        self.num_lights
    }

    pub fn camera(&self) -> Option<TaggedPtr> {
        self.camera
    }

    /// Address of the [`AccelTopRaw`] record, `0` before a successful build.
    pub fn accel_address(&self) -> DeviceAddress {
        self.accel_top.as_ref().map_or(0, DeviceBuffer::address)
    }

    pub fn instances_address(&self) -> DeviceAddress {
        self.instances.address()
    }

    pub fn lights_address(&self) -> DeviceAddress {
        self.lights.address()
    }
}

impl std::fmt::Debug for PathTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTracer")
            .field("settings", &self.settings)
            .field("instances", &self.num_instances)
            .field("lights", &self.num_lights)
            .field("spp", &self.curr_spp)
            .finish_non_exhaustive()
    }
}
