//! Records shared with the ray-tracing kernel.
//!
//! Every struct here is `#[repr(C)]` plain old data and is uploaded byte for
//! byte. Pointers are device addresses (`u64`, `0` = null). Polymorphic data
//! (geometry, material, light, camera) is referenced through a [`TaggedPtr`]
//! whose tag selects the concrete record type on the kernel side.

/// A `{kind, address}` pair standing in for a pointer to a polymorphic record.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TaggedPtr {
    pub tag: u32,
    _pad: u32,
    pub ptr: u64,
}

impl TaggedPtr {
    pub fn new(tag: u32, ptr: u64) -> Self {
        Self { tag, _pad: 0, ptr }
    }

    pub fn null(tag: u32) -> Self {
        Self::new(tag, 0)
    }

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GeometryKind {
    TriMesh = 0,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LightKind {
    Geometry = 0,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CameraKind {
    Pinhole = 0,
}

/// Scattering model a material is shaded with. Doubles as the material tag.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BsdfKind {
    Lambert = 0,
    Phong = 1,
    #[default]
    BlinnPhong = 2,
    Microfacet = 3,
}

impl BsdfKind {
    pub const ALL: [BsdfKind; 4] = [
        BsdfKind::Lambert,
        BsdfKind::Phong,
        BsdfKind::BlinnPhong,
        BsdfKind::Microfacet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BsdfKind::Lambert => "lambert",
            BsdfKind::Phong => "phong",
            BsdfKind::BlinnPhong => "blinn-phong",
            BsdfKind::Microfacet => "microfacet",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BboxRaw {
    pub pmin: [f32; 4],
    pub pmax: [f32; 4],
}

/**
 * A node of a binary BVH stored as a flat array of `2N - 1` nodes.
 *
 * Internal nodes live at `[0, N - 2]` and reference their children by node
 * index. Leaf nodes live at `[N - 1, 2N - 2]`; `left` holds the primitive
 * index and `right` is [`AccelNode::LEAF`].
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccelNode {
    pub left: u32,
    pub right: u32,
}

impl AccelNode {
    pub const LEAF: u32 = u32::MAX;

    pub fn internal(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    pub fn leaf(primitive: u32) -> Self {
        Self {
            left: primitive,
            right: Self::LEAF,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.right == Self::LEAF
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TriMeshRaw {
    pub positions: u64,
    pub normals: u64,
    pub texcoords: u64,
    pub indices: u64,
    pub num_triangles: u32,
    pub _pad: u32,
}

/// Per-mesh BVH.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccelBottomRaw {
    pub nodes: u64,
    pub bboxes: u64,
    pub geometry: TaggedPtr,
}

/// Leaf payload of the scene BVH: one placed mesh.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccelTopInstanceRaw {
    pub accel: u64,
    pub transform: [[f32; 4]; 4],
    pub transform_inv: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccelTopRaw {
    pub nodes: u64,
    pub bboxes: u64,
    pub instances: u64,
}

/// What a ray hit: shape, surface and (for emitters) the light it belongs to.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub geometry: TaggedPtr,
    pub material: TaggedPtr,
    pub light: TaggedPtr,
}

/// An emissive instance, sampled directly for next event estimation.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GeometryLightRaw {
    pub geometry: TaggedPtr,
    pub material: TaggedPtr,
    pub transform: [[f32; 4]; 4],
    pub transform_it: [[f32; 4]; 4],
}

/// Uniform light selection: every light is picked with probability `pdf`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightSamplerRaw {
    pub lights: u64,
    pub num_lights: u32,
    pub pdf: f32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TextureRaw {
    /// Tightly packed RGBA8 texels, row by row.
    pub data: u64,
    pub width: u32,
    pub height: u32,
    pub srgb: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialRaw {
    pub emission: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub transmittance: [f32; 4],
    pub ior: f32,
    pub shininess: f32,
    pub opacity: f32,
    pub _pad: u32,
    /// Addresses of [`TextureRaw`] records, `0` when the map is absent.
    pub emission_map: u64,
    pub diffuse_map: u64,
    pub specular_map: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PinholeCameraRaw {
    pub pos: [f32; 4],
    pub frame_x: [f32; 4],
    pub frame_y: [f32; 4],
    pub frame_z: [f32; 4],
    pub x_dir: [f32; 4],
    pub y_dir: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneRaw {
    pub camera: TaggedPtr,
    pub light_sampler: LightSamplerRaw,
    pub instances: u64,
    pub accel: u64,
}

/// Everything one kernel launch needs.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderParamsRaw {
    pub scene: SceneRaw,
    /// RGBA32F pixels, `screen_width * screen_height` of them.
    pub output: u64,
    pub screen_width: u32,
    pub screen_height: u32,
    pub spp: u32,
    /// `u32::MAX` for unbounded depth.
    pub max_depth: u32,
}
