//! Axis-aligned bounding boxes.

use cgmath::{ElementWise, Vector3, Vector4};

use crate::data_structures::kernel::BboxRaw;

/// Axis-aligned box stored as min/max corners.
///
/// The empty box has `pmin = +inf` and `pmax = -inf`, so merging anything into
/// it yields that thing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    pub pmin: Vector3<f32>,
    pub pmax: Vector3<f32>,
}

impl Bbox {
    pub const EMPTY: Bbox = Bbox {
        pmin: Vector3 {
            x: f32::INFINITY,
            y: f32::INFINITY,
            z: f32::INFINITY,
        },
        pmax: Vector3 {
            x: f32::NEG_INFINITY,
            y: f32::NEG_INFINITY,
            z: f32::NEG_INFINITY,
        },
    };

    pub fn new(pmin: Vector3<f32>, pmax: Vector3<f32>) -> Self {
        Self { pmin, pmax }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f32>>) -> Self {
        points
            .into_iter()
            .fold(Self::EMPTY, |bbox, point| bbox.merge_point(*point))
    }

    pub fn is_empty(&self) -> bool {
        self.pmin.x > self.pmax.x || self.pmin.y > self.pmax.y || self.pmin.z > self.pmax.z
    }

    pub fn merge_point(self, point: Vector3<f32>) -> Self {
        Self {
            pmin: min(self.pmin, point),
            pmax: max(self.pmax, point),
        }
    }

    pub fn merge(self, other: &Bbox) -> Self {
        Self {
            pmin: min(self.pmin, other.pmin),
            pmax: max(self.pmax, other.pmax),
        }
    }

    pub fn centroid(&self) -> Vector3<f32> {
        (self.pmin + self.pmax) * 0.5
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.pmax - self.pmin
    }

    /// Index of the widest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Box enclosing all eight corners after `transform`.
    pub fn transform_by(&self, transform: &cgmath::Matrix4<f32>) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut result = Self::EMPTY;
        for corner in 0..8 {
            let select = Vector3::new(
                (corner & 1) as f32,
                ((corner >> 1) & 1) as f32,
                ((corner >> 2) & 1) as f32,
            );
            let local = self.pmin + self.extent().mul_element_wise(select);
            let world = *transform * local.extend(1.0);
            result = result.merge_point(world.truncate() / world.w);
        }
        result
    }

    pub fn to_raw(&self) -> BboxRaw {
        BboxRaw {
            pmin: self.pmin.extend(1.0).into(),
            pmax: self.pmax.extend(1.0).into(),
        }
    }

    pub fn from_raw(raw: &BboxRaw) -> Self {
        Self {
            pmin: Vector4::from(raw.pmin).truncate(),
            pmax: Vector4::from(raw.pmax).truncate(),
        }
    }
}

impl Default for Bbox {
    fn default() -> Self {
        Self::EMPTY
    }
}

fn min(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

fn max(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}
