//! The render target and the kernel seam.
//!
//! A [`Film`] is an RGBA32F surface in device memory. Each frame the path
//! tracer maps it, hands its address to a [`Kernel`] together with the scene
//! descriptor and unmaps it again. Unmapping is the point where the kernel's
//! writes are complete.

use std::{path::Path, rc::Rc};

use anyhow::*;

use crate::{
    data_structures::kernel::RenderParamsRaw,
    memory::{DeviceAddress, DeviceBuffer, MemoryHandle},
};

/// Bytes per film pixel (four `f32` channels).
pub const PIXEL_SIZE: u64 = 16;

/// Renders one progressive sample per pixel into `params.output`.
///
/// The kernel owns accumulation: with `params.spp == 1` it overwrites the
/// film, otherwise it blends the new sample into the running average.
pub trait Kernel {
    fn render(&mut self, params: &RenderParamsRaw);
}

impl<F: FnMut(&RenderParamsRaw)> Kernel for F {
    fn render(&mut self, params: &RenderParamsRaw) {
        self(params)
    }
}

pub struct Film {
    memory: MemoryHandle,
    buffer: DeviceBuffer,
    width: u32,
    height: u32,
    mapped: bool,
}

impl Film {
    pub fn new(memory: &MemoryHandle, width: u32, height: u32) -> Self {
        Self {
            memory: Rc::clone(memory),
            buffer: DeviceBuffer::new(memory, film_bytes(width, height)),
            width,
            height,
            mapped: false,
        }
    }

    /// Reallocate for a new size. Returns `false` if the size did not change.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (width, height) == (self.width, self.height) {
            return false;
        }
        assert!(!self.mapped, "film resized while mapped");
        log::debug!(
            "film resized from {}x{} to {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        self.buffer = DeviceBuffer::new(&self.memory, film_bytes(width, height));
        self.width = width;
        self.height = height;
        true
    }

    /// Hand the surface to the kernel for one frame.
    pub fn map(&mut self) -> DeviceAddress {
        assert!(!self.mapped, "film mapped twice");
        self.mapped = true;
        self.buffer.address()
    }

    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn address(&self) -> DeviceAddress {
        self.buffer.address()
    }

    /// Copy the pixels back to the host, row-major from the top left.
    pub fn read_pixels(&self) -> Result<Vec<[f32; 4]>> {
        ensure!(!self.mapped, "cannot read a mapped film");
        let bytes = self.buffer.download()?;
        let pixels: Vec<[f32; 4]> = bytemuck::pod_collect_to_vec(&bytes);
        Ok(pixels)
    }

    pub fn to_image(&self) -> Result<image::Rgba32FImage> {
        let data = self.read_pixels()?.into_iter().flatten().collect::<Vec<f32>>();
        image::Rgba32FImage::from_raw(self.width, self.height, data)
            .context("film size does not match its pixel data")
    }

    /// Write the film as an OpenEXR image.
    pub fn save_exr(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_image()?
            .save_with_format(path, image::ImageFormat::OpenExr)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("saved film to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Debug for Film {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Film")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mapped", &self.mapped)
            .finish()
    }
}

fn film_bytes(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * PIXEL_SIZE
}
