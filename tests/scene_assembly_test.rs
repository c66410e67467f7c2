use std::rc::Rc;

use raytrace_scene::{
    data_structures::{
        kernel::{AccelNode, AccelTopRaw, BboxRaw, BsdfKind, GeometryLightRaw, InstanceRaw, TaggedPtr},
        mesh::{Mesh, MeshComponent},
        material::{Material, MaterialComponent},
    },
    memory::MemoryHandle,
    pathtracer::{PathTracer, PathTracerSettings},
    render::Film,
    Vector3,
};

use crate::common::test_utils::{
    RecordingKernel, add_camera, add_triangle_object, four_triangle_scene, host_scene, triangle,
};

mod common;

fn raw(pmin: [f32; 3], pmax: [f32; 3]) -> BboxRaw {
    BboxRaw {
        pmin: [pmin[0], pmin[1], pmin[2], 1.0],
        pmax: [pmax[0], pmax[1], pmax[2], 1.0],
    }
}

#[test]
fn three_dark_and_one_emissive_triangle() {
    let (host, mut scene) = four_triangle_scene();
    let memory: MemoryHandle = host.clone();
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);

    assert_eq!(tracer.instance_count(), 4);
    assert_eq!(tracer.top_level_instance_count(), 4);
    assert_eq!(tracer.light_count(), 1);

    let top: AccelTopRaw = host.read_record(tracer.accel_address()).unwrap();
    assert_eq!(host.allocation_size(top.nodes), Some(7 * 8));
    let nodes: Vec<AccelNode> = host.read_records(top.nodes, 7).unwrap();
    for i in 0..4 {
        assert_eq!(nodes[3 + i], AccelNode::leaf(i as u32));
    }
    assert!(nodes[..3].iter().all(|node| !node.is_leaf()));

    let mut film = Film::new(&memory, 4, 4);
    let mut kernel = RecordingKernel::default();
    assert!(tracer.render_frame(&mut film, &mut kernel));
    let params = kernel.last().unwrap();
    assert_eq!(params.scene.light_sampler.num_lights, 1);
    assert_eq!(params.scene.light_sampler.pdf, 1.0);
    assert_eq!(params.scene.accel, tracer.accel_address());
    assert_eq!(params.scene.camera, tracer.camera().unwrap());
    assert_eq!(params.output, film.address());
    assert_eq!((params.screen_width, params.screen_height), (4, 4));
    assert_eq!(params.spp, 1);
    assert_eq!(params.max_depth, u32::MAX);
    assert!(!film.is_mapped());
}

#[test]
fn leaf_boxes_are_kept_and_root_holds_their_union() {
    let (host, mut scene) = four_triangle_scene();
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);

    let top: AccelTopRaw = host.read_record(tracer.accel_address()).unwrap();
    let bboxes: Vec<BboxRaw> = host.read_records(top.bboxes, 7).unwrap();
    assert_eq!(bboxes[3], raw([-3.0, 0.0, 0.0], [-2.0, 1.0, 0.0]));
    assert_eq!(bboxes[4], raw([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]));
    assert_eq!(bboxes[5], raw([3.0, 0.0, 0.0], [4.0, 1.0, 0.0]));
    assert_eq!(bboxes[6], raw([0.0, 4.0, 0.0], [1.0, 5.0, 0.0]));
    assert_eq!(bboxes[0], raw([-3.0, 0.0, 0.0], [4.0, 5.0, 0.0]));
}

#[test]
fn emissive_instances_reference_their_light() {
    let (host, mut scene) = four_triangle_scene();
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);

    let instances: Vec<InstanceRaw> = host.read_records(tracer.instances_address(), 4).unwrap();
    let lights: Vec<TaggedPtr> = host.read_records(tracer.lights_address(), 1).unwrap();
    assert!(instances[..3].iter().all(|instance| instance.light.is_null()));
    assert_eq!(instances[3].light, lights[0]);

    let light: GeometryLightRaw = host.read_record(lights[0].ptr).unwrap();
    assert_eq!(light.geometry, instances[3].geometry);
    assert_eq!(light.material.tag, BsdfKind::BlinnPhong as u32);
    assert_eq!(light.transform[3], [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn rebuilding_reuses_device_memory() {
    let (host, mut scene) = four_triangle_scene();
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    let allocations = host.total_allocations();
    let lights = tracer.lights_address();
    let light: Vec<TaggedPtr> = host.read_records(lights, 1).unwrap();

    tracer.build_accel(&mut scene);
    tracer.build_instances_and_lights(&mut scene);
    assert_eq!(host.total_allocations(), allocations);
    assert_eq!(tracer.lights_address(), lights);
    assert_eq!(host.read_records::<TaggedPtr>(lights, 1).unwrap(), light);
}

#[test]
fn nothing_is_rendered_without_lights() {
    let (host, mut scene) = host_scene();
    let memory: MemoryHandle = host.clone();
    add_camera(&mut scene);
    add_triangle_object(&mut scene, "a", [0.0, 0.0, 0.0], None);
    add_triangle_object(&mut scene, "b", [2.0, 0.0, 0.0], None);
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    assert_eq!(tracer.light_count(), 0);

    let mut film = Film::new(&memory, 2, 2);
    let mut kernel = RecordingKernel::default();
    assert!(!tracer.render_frame(&mut film, &mut kernel));
    assert!(kernel.frames.is_empty());
    assert_eq!(tracer.accumulated_spp(), 0);
}

#[test]
fn nothing_is_rendered_without_a_camera() {
    let (host, mut scene) = host_scene();
    let memory: MemoryHandle = host.clone();
    add_triangle_object(&mut scene, "lamp", [0.0, 0.0, 0.0], Some([1.0, 1.0, 1.0]));
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    assert_eq!(tracer.light_count(), 1);
    assert!(tracer.camera().is_none());

    let mut film = Film::new(&memory, 2, 2);
    let mut kernel = RecordingKernel::default();
    assert!(!tracer.render_frame(&mut film, &mut kernel));
    assert!(kernel.frames.is_empty());
}

#[test]
fn resizing_the_film_restarts_accumulation() {
    let (host, mut scene) = four_triangle_scene();
    let memory: MemoryHandle = host.clone();
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);

    let mut film = Film::new(&memory, 4, 4);
    let mut kernel = RecordingKernel::default();
    for _ in 0..3 {
        assert!(tracer.render_frame(&mut film, &mut kernel));
    }
    assert_eq!(tracer.accumulated_spp(), 3);

    assert!(film.resize(8, 2));
    assert!(tracer.render_frame(&mut film, &mut kernel));
    let params = kernel.last().unwrap();
    assert_eq!(params.spp, 1);
    assert_eq!((params.screen_width, params.screen_height), (8, 2));
    assert_eq!(params.output, film.address());
}

#[test]
fn accumulation_stops_at_the_sample_budget() {
    let (host, mut scene) = four_triangle_scene();
    let memory: MemoryHandle = host.clone();
    let settings = PathTracerSettings {
        max_depth: 4,
        max_spp: Some(2),
    };
    let mut tracer = PathTracer::new(&scene, settings);
    tracer.build_buffers(&mut scene);

    let mut film = Film::new(&memory, 1, 1);
    let mut kernel = RecordingKernel::default();
    assert!(tracer.render_frame(&mut film, &mut kernel));
    assert!(tracer.render_frame(&mut film, &mut kernel));
    assert!(!tracer.render_frame(&mut film, &mut kernel));
    assert_eq!(kernel.frames.len(), 2);
    assert_eq!(kernel.frames[1].max_depth, 4);

    tracer.reset_accumulation();
    assert!(tracer.render_frame(&mut film, &mut kernel));
    assert_eq!(kernel.last().unwrap().spp, 1);
}

#[test]
fn meshes_without_triangles_are_not_instanced() {
    let (_host, mut scene) = host_scene();
    let memory = Rc::clone(scene.memory());
    add_camera(&mut scene);
    add_triangle_object(&mut scene, "lamp", [0.0, 0.0, 0.0], Some([1.0, 1.0, 1.0]));
    let empty = scene.add_object("empty");
    scene.add_component(empty, MeshComponent::new(Mesh::new(&memory)));
    scene.add_component(empty, MaterialComponent::new(Material::new(&memory)));
    add_triangle_object(&mut scene, "floor", [0.0, -1.0, 0.0], None);

    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    assert_eq!(tracer.top_level_instance_count(), 2);
    assert_eq!(tracer.instance_count(), 2);
    assert_eq!(tracer.light_count(), 1);
}

#[test]
fn scene_without_geometry_has_no_top_level_accel() {
    let (_host, mut scene) = host_scene();
    add_camera(&mut scene);
    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    assert_eq!(tracer.accel_address(), 0);
    assert_eq!(tracer.instance_count(), 0);
}

#[test]
fn shared_meshes_share_one_bottom_level_accel() {
    let (host, mut scene) = host_scene();
    let memory = Rc::clone(scene.memory());
    let mesh = MeshComponent::new(triangle(&memory, [0.0, 0.0, 0.0]));
    for (i, x) in [0.0f32, 5.0].into_iter().enumerate() {
        let object = scene.add_object(&format!("copy {i}"));
        scene.object_mut(object).unwrap().transform.translate = Vector3::new(x, 0.0, 0.0);
        scene.add_component(object, MeshComponent::shared(mesh.handle()));
        scene.add_component(object, MaterialComponent::new(Material::new(&memory)));
    }

    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    let top: AccelTopRaw = host.read_record(tracer.accel_address()).unwrap();
    let bboxes: Vec<BboxRaw> = host.read_records(top.bboxes, 3).unwrap();
    assert_eq!(bboxes[1], raw([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]));
    assert_eq!(bboxes[2], raw([5.0, 0.0, 0.0], [6.0, 1.0, 0.0]));
    let instances: Vec<InstanceRaw> = host.read_records(tracer.instances_address(), 2).unwrap();
    assert_eq!(instances[0].geometry, instances[1].geometry);
    assert_eq!(instances[0].geometry, mesh.mesh().geometry());
}
