//! Pinhole camera component.

use cgmath::{InnerSpace, Vector3};

use crate::{
    data_structures::kernel::{CameraKind, PinholeCameraRaw, TaggedPtr},
    memory::{DeviceAddress, DeviceBuffer, MemoryHandle, upload_record},
    scene::{
        Component, SceneEvent, UpdateContext,
        component::{Inspector, drag_vector3},
    },
};

/// A pinhole camera looking from `pos` at `look_at`.
///
/// The device record is only written by [`CameraComponent::build_buffer`].
/// The film size is the resolution used for offline renders.
#[derive(Debug)]
pub struct CameraComponent {
    pub pos: Vector3<f32>,
    pub look_at: Vector3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub film_width: u32,
    pub film_height: u32,
    buffer: Option<DeviceBuffer>,
}

impl CameraComponent {
    pub fn new(pos: Vector3<f32>, look_at: Vector3<f32>, up: Vector3<f32>) -> Self {
        Self {
            pos,
            look_at,
            up,
            ..Default::default()
        }
    }

    /// Orthonormal camera frame and image plane extents at unit distance.
    pub fn to_raw(&self) -> PinholeCameraRaw {
        let frame_z = (self.pos - self.look_at).normalize();
        let frame_x = self.up.cross(frame_z).normalize();
        let frame_y = frame_z.cross(frame_x).normalize();
        let scale = (self.fov.to_radians() * 0.5).tan() * 2.0;
        PinholeCameraRaw {
            pos: self.pos.extend(1.0).into(),
            frame_x: frame_x.extend(0.0).into(),
            frame_y: frame_y.extend(0.0).into(),
            frame_z: frame_z.extend(0.0).into(),
            x_dir: [scale, 0.0, 0.0, 0.0],
            y_dir: [0.0, scale, 0.0, 0.0],
        }
    }

    /// Write the camera record, allocating it on first use.
    pub fn build_buffer(&mut self, memory: &MemoryHandle) -> DeviceAddress {
        let raw = self.to_raw();
        upload_record(&mut self.buffer, memory, &raw)
    }

    /// Tagged pointer to the record, `None` before the first build.
    pub fn pointer(&self) -> Option<TaggedPtr> {
        self.buffer
            .as_ref()
            .map(|buffer| TaggedPtr::new(CameraKind::Pinhole as u32, buffer.address()))
    }
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            pos: Vector3::new(0.0, 0.0, 1.0),
            look_at: Vector3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fov: 45.0,
            film_width: 1280,
            film_height: 720,
            buffer: None,
        }
    }
}

impl Component for CameraComponent {
    const HAS_INSPECT: bool = true;

    fn inspect(&mut self, ui: &mut dyn Inspector, ctx: &mut UpdateContext<'_>) {
        let mut changed = false;
        changed |= drag_vector3(ui, "pos", &mut self.pos, 0.05);
        changed |= drag_vector3(ui, "look at", &mut self.look_at, 0.05);
        changed |= drag_vector3(ui, "up", &mut self.up, 0.05);
        changed |= ui.drag_float("fov", &mut self.fov, 0.5);

        if changed {
            self.build_buffer(ctx.memory());
            ctx.emit(SceneEvent::CameraChanged {
                object: ctx.owner(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::memory::HostMemory;

    #[test]
    fn frame_is_orthonormal_and_faces_away_from_target() {
        let camera = CameraComponent::new(
            Vector3::new(0.0, 0.0, 5.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        let raw = camera.to_raw();
        assert_eq!(raw.frame_z, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(raw.frame_x, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(raw.frame_y, [0.0, 1.0, 0.0, 0.0]);
        let expected = (22.5f32).to_radians().tan() * 2.0;
        assert!((raw.x_dir[0] - expected).abs() < 1e-6);
        assert_eq!(raw.x_dir[0], raw.y_dir[1]);
    }

    #[test]
    fn rebuilding_keeps_the_record_address() {
        let host = Rc::new(HostMemory::new());
        let memory: MemoryHandle = host.clone();
        let mut camera = CameraComponent::default();
        assert!(camera.pointer().is_none());
        let first = camera.build_buffer(&memory);
        camera.fov = 60.0;
        let second = camera.build_buffer(&memory);
        assert_eq!(first, second);
        let raw: PinholeCameraRaw = host.read_record(second).unwrap();
        assert_eq!(raw, camera.to_raw());
        assert_eq!(camera.pointer().map(|p| p.tag), Some(CameraKind::Pinhole as u32));
    }
}
