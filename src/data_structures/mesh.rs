//! Triangle meshes and their per-mesh BVH.

use std::{
    cell::{Ref, RefCell, RefMut},
    f32::consts::PI,
    rc::Rc,
};

use cgmath::{InnerSpace, Vector3};

use crate::{
    accel::{self, AccelBuilder},
    data_structures::{
        bbox::Bbox,
        kernel::{AccelBottomRaw, AccelNode, BboxRaw, GeometryKind, TaggedPtr, TriMeshRaw},
    },
    memory::{DeviceAddress, DeviceBuffer, GrowableBuffer, MemoryHandle, upload_record},
    scene::Component,
};

/**
 * An indexed triangle mesh living both on the host and in device memory.
 *
 * Every setter uploads right away into growth-only buffers. The bottom-level
 * BVH and the geometry record are built by [`Mesh::build_accel`], which is
 * a no-op until the mesh changes again.
 */
pub struct Mesh {
    memory: MemoryHandle,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    indices: Vec<u32>,
    bbox: Bbox,

    positions_buffer: GrowableBuffer,
    normals_buffer: GrowableBuffer,
    texcoords_buffer: GrowableBuffer,
    indices_buffer: GrowableBuffer,
    accel_nodes_buffer: GrowableBuffer,
    accel_bboxes_buffer: GrowableBuffer,
    geometry_buffer: Option<DeviceBuffer>,
    accel_buffer: Option<DeviceBuffer>,
    accel_dirty: bool,
}

impl Mesh {
    pub fn new(memory: &MemoryHandle) -> Self {
        Self {
            memory: Rc::clone(memory),
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            indices: Vec::new(),
            bbox: Bbox::EMPTY,
            positions_buffer: GrowableBuffer::new("mesh positions"),
            normals_buffer: GrowableBuffer::new("mesh normals"),
            texcoords_buffer: GrowableBuffer::new("mesh texcoords"),
            indices_buffer: GrowableBuffer::new("mesh indices"),
            accel_nodes_buffer: GrowableBuffer::new("mesh accel nodes"),
            accel_bboxes_buffer: GrowableBuffer::new("mesh accel bboxes"),
            geometry_buffer: None,
            accel_buffer: None,
            accel_dirty: true,
        }
    }

    pub fn set_positions(&mut self, positions: Vec<[f32; 3]>) {
        self.bbox = positions
            .iter()
            .fold(Bbox::EMPTY, |bbox, p| bbox.merge_point((*p).into()));
        self.positions = positions;
        self.positions_buffer
            .write_slice(&self.memory, &self.positions);
        self.accel_dirty = true;
    }

    pub fn set_normals(&mut self, normals: Vec<[f32; 3]>) {
        self.normals = normals;
        self.normals_buffer.write_slice(&self.memory, &self.normals);
        self.accel_dirty = true;
    }

    pub fn set_texcoords(&mut self, texcoords: Vec<[f32; 2]>) {
        self.texcoords = texcoords;
        self.texcoords_buffer
            .write_slice(&self.memory, &self.texcoords);
        self.accel_dirty = true;
    }

    /// Triangle list indices. A trailing partial triangle is dropped.
    pub fn set_indices(&mut self, mut indices: Vec<u32>) {
        if indices.len() % 3 != 0 {
            log::warn!(
                "index count {} is not a multiple of three, dropping the last {}",
                indices.len(),
                indices.len() % 3
            );
            indices.truncate(indices.len() - indices.len() % 3);
        }
        self.indices = indices;
        self.indices_buffer.write_slice(&self.memory, &self.indices);
        self.accel_dirty = true;
    }

    /// Smooth vertex normals: every face adds its area-weighted normal to its
    /// three corners, the sums are normalised afterwards.
    pub fn calc_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let p0 = Vector3::from(self.positions[tri[0] as usize]);
            let p1 = Vector3::from(self.positions[tri[1] as usize]);
            let p2 = Vector3::from(self.positions[tri[2] as usize]);
            // Not normalised: the cross product's length is twice the face area.
            let n = (p1 - p0).cross(p2 - p0);
            for &i in tri {
                normals[i as usize] += n;
            }
        }
        let normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0; 3]
                }
            })
            .collect();
        self.set_normals(normals);
    }

    /// Spherical texture coordinates around the bounding box centre:
    /// `u` follows the azimuth in `[0, 2pi)`, `v` the polar angle.
    pub fn calc_texcoords(&mut self) {
        let center = self.bbox.centroid();
        let texcoords = self
            .positions
            .iter()
            .map(|p| {
                let d = Vector3::from(*p) - center;
                if d.magnitude2() == 0.0 {
                    return [0.0, 0.5];
                }
                let d = d.normalize();
                let theta = d.y.clamp(-1.0, 1.0).acos();
                let mut phi = d.z.atan2(d.x);
                if phi < 0.0 {
                    phi += 2.0 * PI;
                }
                [phi / (2.0 * PI), 1.0 - theta / PI]
            })
            .collect();
        self.set_texcoords(texcoords);
    }

    /**
     * Build the bottom-level BVH, the triangle mesh record and the accel record.
     *
     * Missing normals and texture coordinates are generated first. Does
     * nothing when the mesh has not changed since the last build. A mesh
     * without triangles gets no BVH and [`Mesh::accel_address`] stays `0`.
     */
    pub fn build_accel(&mut self, builder: &dyn AccelBuilder) {
        if !self.accel_dirty {
            return;
        }
        if self.normals.len() != self.positions.len() {
            self.calc_normals();
        }
        if self.texcoords.len() != self.positions.len() {
            self.calc_texcoords();
        }
        self.accel_dirty = false;

        let num_triangles = self.triangle_count();
        if num_triangles == 0 {
            log::warn!("mesh without triangles, skipping BVH build");
            self.accel_buffer = None;
            return;
        }

        let num_nodes = accel::node_count(num_triangles);
        let mut bboxes = vec![Bbox::EMPTY.to_raw(); num_nodes];
        for (i, tri) in self.indices.chunks_exact(3).enumerate() {
            let leaf = tri
                .iter()
                .fold(Bbox::EMPTY, |b, &v| b.merge_point(self.positions[v as usize].into()));
            bboxes[accel::leaf_index(num_triangles, i)] = leaf.to_raw();
        }
        let merged = accel::merged_leaf_bbox(&bboxes, num_triangles);
        let mut nodes = vec![AccelNode::default(); num_nodes];
        builder.build(&mut nodes, &mut bboxes, &merged, num_triangles);
        log::debug!("built mesh BVH: {num_triangles} triangles, {num_nodes} nodes");

        self.accel_nodes_buffer.write_slice(&self.memory, &nodes);
        self.accel_bboxes_buffer
            .write_slice::<BboxRaw>(&self.memory, &bboxes);

        let trimesh = TriMeshRaw {
            positions: self.positions_buffer.address(),
            normals: self.normals_buffer.address(),
            texcoords: self.texcoords_buffer.address(),
            indices: self.indices_buffer.address(),
            num_triangles: num_triangles as u32,
            _pad: 0,
        };
        let geometry = upload_record(&mut self.geometry_buffer, &self.memory, &trimesh);

        let accel = AccelBottomRaw {
            nodes: self.accel_nodes_buffer.address(),
            bboxes: self.accel_bboxes_buffer.address(),
            geometry: TaggedPtr::new(GeometryKind::TriMesh as u32, geometry),
        };
        upload_record(&mut self.accel_buffer, &self.memory, &accel);
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn texcoords(&self) -> &[[f32; 2]] {
        &self.texcoords
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Object space bounds of all positions.
    pub fn bbox(&self) -> Bbox {
        self.bbox
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether [`Mesh::build_accel`] has work to do.
    pub fn needs_build(&self) -> bool {
        self.accel_dirty
    }

    /// Tagged pointer to the triangle mesh record, null before the first build.
    pub fn geometry(&self) -> TaggedPtr {
        TaggedPtr::new(
            GeometryKind::TriMesh as u32,
            self.geometry_buffer.as_ref().map_or(0, DeviceBuffer::address),
        )
    }

    /// Address of the [`AccelBottomRaw`] record, `0` if there is none.
    pub fn accel_address(&self) -> DeviceAddress {
        self.accel_buffer.as_ref().map_or(0, DeviceBuffer::address)
    }

    pub fn accel_nodes_address(&self) -> DeviceAddress {
        self.accel_nodes_buffer.address()
    }

    pub fn accel_bboxes_address(&self) -> DeviceAddress {
        self.accel_bboxes_buffer.address()
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("vertices", &self.positions.len())
            .field("triangles", &self.triangle_count())
            .field("bbox", &self.bbox)
            .finish()
    }
}

/// Attaches a (possibly shared) mesh to a scene object.
#[derive(Clone, Debug)]
pub struct MeshComponent {
    mesh: Rc<RefCell<Mesh>>,
}

impl MeshComponent {
    pub fn new(mesh: Mesh) -> Self {
        Self::shared(Rc::new(RefCell::new(mesh)))
    }

    /// Several objects may instance the same mesh; it is built once.
    pub fn shared(mesh: Rc<RefCell<Mesh>>) -> Self {
        Self { mesh }
    }

    pub fn mesh(&self) -> Ref<'_, Mesh> {
        self.mesh.borrow()
    }

    pub fn mesh_mut(&self) -> RefMut<'_, Mesh> {
        self.mesh.borrow_mut()
    }

    pub fn handle(&self) -> Rc<RefCell<Mesh>> {
        Rc::clone(&self.mesh)
    }
}

impl Component for MeshComponent {}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{accel::MedianSplitBuilder, memory::HostMemory};

    fn quad(memory: &MemoryHandle) -> Mesh {
        let mut mesh = Mesh::new(memory);
        mesh.set_positions(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        mesh.set_indices(vec![0, 1, 2, 0, 2, 3]);
        mesh
    }

    #[test]
    fn normals_are_area_weighted() {
        let memory: MemoryHandle = Rc::new(HostMemory::new());
        let mut mesh = Mesh::new(&memory);
        // A large face in the xy plane and a tiny one in the xz plane share vertex 0.
        mesh.set_positions(vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 0.1],
        ]);
        mesh.set_indices(vec![0, 1, 2, 0, 3, 1]);
        mesh.calc_normals();
        let n0 = Vector3::from(mesh.normals()[0]);
        assert!((n0.magnitude() - 1.0).abs() < 1e-5);
        assert!(n0.z > 0.99, "large face should dominate: {n0:?}");
        assert_eq!(mesh.normals()[2], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn texcoords_are_spherical_about_the_centroid() {
        let memory: MemoryHandle = Rc::new(HostMemory::new());
        let mut mesh = Mesh::new(&memory);
        mesh.set_positions(vec![
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0],
            [-1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        assert_eq!(mesh.bbox().centroid(), Vector3::new(0.0, 0.0, 0.0));
        mesh.calc_texcoords();
        let uv = mesh.texcoords();
        assert!((uv[0][1] - 1.0).abs() < 1e-5);
        assert!(uv[1][1].abs() < 1e-5);
        assert!(uv[2][0].abs() < 1e-5 && (uv[2][1] - 0.5).abs() < 1e-5);
        // atan2(-1, 0) wraps from -pi/2 to 3pi/2.
        assert!((uv[3][0] - 0.75).abs() < 1e-5);
    }

    #[test]
    fn build_places_triangle_boxes_in_the_leaf_half() {
        let host = Rc::new(HostMemory::new());
        let memory: MemoryHandle = host.clone();
        let mut mesh = quad(&memory);
        mesh.build_accel(&MedianSplitBuilder);

        assert_eq!(mesh.normals().len(), 4);
        assert_eq!(mesh.texcoords().len(), 4);
        let accel: AccelBottomRaw = host.read_record(mesh.accel_address()).unwrap();
        assert_eq!(accel.geometry, mesh.geometry());
        let bboxes: Vec<BboxRaw> = host.read_records(accel.bboxes, 3).unwrap();
        assert_eq!(Bbox::from_raw(&bboxes[1]).pmax, Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(Bbox::from_raw(&bboxes[2]).pmin, Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(Bbox::from_raw(&bboxes[0]), mesh.bbox());
        let trimesh: TriMeshRaw = host.read_record(mesh.geometry().ptr).unwrap();
        assert_eq!(trimesh.num_triangles, 2);
    }

    #[test]
    fn unchanged_mesh_is_not_rebuilt() {
        let host = Rc::new(HostMemory::new());
        let memory: MemoryHandle = host.clone();
        let mut mesh = quad(&memory);
        mesh.build_accel(&MedianSplitBuilder);
        let allocations = host.total_allocations();
        let address = mesh.accel_address();
        mesh.build_accel(&MedianSplitBuilder);
        assert_eq!(host.total_allocations(), allocations);

        mesh.set_indices(vec![0, 1, 2]);
        assert!(mesh.needs_build());
        mesh.build_accel(&MedianSplitBuilder);
        assert_eq!(mesh.accel_address(), address);
        assert_eq!(host.total_allocations(), allocations);
    }

    #[test]
    fn empty_mesh_has_no_accel() {
        let memory: MemoryHandle = Rc::new(HostMemory::new());
        let mut mesh = Mesh::new(&memory);
        mesh.set_positions(vec![[0.0; 3]]);
        mesh.set_indices(vec![0, 0]);
        mesh.build_accel(&MedianSplitBuilder);
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.accel_address(), 0);
    }
}
