//! raytrace-scene
//!
//! Host-side scene graph and device-resident scene assembly for a progressive
//! path tracer. Objects carry typed components (meshes, materials, cameras)
//! kept in chunked per-type storage; the path tracer flattens them into BVHs,
//! instance and light arrays in device memory and hands a single scene
//! descriptor to a ray-tracing kernel every frame.
//!
//! High-level modules
//! - `accel`: flat BVH layout and the builder contract
//! - `camera`: pinhole camera component
//! - `context`: headless wgpu device/queue setup
//! - `data_structures`: device records, meshes, materials, textures, transforms
//! - `memory`: device memory allocator seam and its host / wgpu backends
//! - `pathtracer`: scene assembly and per-frame orchestration
//! - `render`: the output film and the kernel seam
//! - `scene`: objects, component storage, joins and scene events
//!

pub mod accel;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod memory;
pub mod pathtracer;
pub mod render;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use cgmath::{Matrix4, Vector3};
pub use wgpu;
