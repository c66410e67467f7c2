//! Scene data: device records, geometry, materials and textures.
//!
//! - `bbox` is an axis-aligned bounding box with the merge / transform math
//! - `kernel` holds the `#[repr(C)]` records the kernel reads
//! - `material` contains surface parameters and the material component
//! - `mesh` contains triangle meshes, their BVH and the mesh component
//! - `texture` is an RGBA8 image in device memory
//! - `transform` holds per-object translate / rotate / scale

pub mod bbox;
pub mod kernel;
pub mod material;
pub mod mesh;
pub mod texture;
pub mod transform;
