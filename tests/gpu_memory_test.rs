#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn wgpu_buffers_round_trip_and_resolve() {
    use raytrace_scene::{
        context::GpuContext,
        memory::{DeviceBuffer, GrowableBuffer},
    };

    common::test_utils::init_logger();
    let ctx = GpuContext::headless_blocking().unwrap();
    let (gpu, memory) = ctx.memory().unwrap();

    // odd sizes are padded on the device but not visible to callers
    let buffer = DeviceBuffer::with_data(&memory, &[1, 2, 3, 4, 5]);
    assert_eq!(buffer.size(), 5);
    assert_eq!(buffer.download().unwrap(), vec![1, 2, 3, 4, 5]);

    let (_, offset) = gpu.resolve(buffer.address() + 4).unwrap();
    assert_eq!(offset, 4);
    assert!(gpu.resolve(0).is_none());

    let mut growable = GrowableBuffer::new("gpu test");
    growable.write_slice(&memory, &[1.0f32; 8]);
    let address = growable.address();
    growable.write_slice(&memory, &[2.0f32; 4]);
    assert_eq!(growable.address(), address);
    assert_eq!(gpu.live_buffers(), 2);

    drop(buffer);
    drop(growable);
    assert_eq!(gpu.live_buffers(), 0);
}

#[test]
#[cfg(feature = "integration-tests")]
fn scene_assembles_on_the_gpu() {
    use raytrace_scene::{
        context::GpuContext,
        pathtracer::{PathTracer, PathTracerSettings},
        render::Film,
        scene::Scene,
    };

    use crate::common::test_utils::{RecordingKernel, add_camera, add_triangle_object};

    common::test_utils::init_logger();
    let ctx = GpuContext::headless_blocking().unwrap();
    let (gpu, memory) = ctx.memory().unwrap();
    let mut scene = Scene::new(memory.clone());
    add_camera(&mut scene);
    add_triangle_object(&mut scene, "floor", [0.0, 0.0, 0.0], None);
    add_triangle_object(&mut scene, "lamp", [0.0, 2.0, 0.0], Some([4.0, 4.0, 4.0]));

    let mut tracer = PathTracer::new(&scene, PathTracerSettings::default());
    tracer.build_buffers(&mut scene);
    assert_eq!(tracer.light_count(), 1);
    assert!(gpu.resolve(tracer.accel_address()).is_some());

    let mut film = Film::new(&memory, 3, 2);
    let mut kernel = RecordingKernel::default();
    assert!(tracer.render_frame(&mut film, &mut kernel));
    let pixels = film.read_pixels().unwrap();
    assert_eq!(pixels.len(), 6);
    assert!(pixels.iter().all(|p| *p == [0.0; 4]));
}
