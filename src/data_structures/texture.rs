//! Material textures in device memory.
//!
//! This module provides [`Texture`], an RGBA8 image uploaded as a flat texel
//! buffer plus a [`TextureRaw`] record the kernel samples through.

use anyhow::*;
use image::GenericImageView;

use crate::{
    data_structures::kernel::TextureRaw,
    memory::{DeviceAddress, DeviceBuffer, MemoryHandle},
};

/// An RGBA8 image in device memory.
///
/// Typically created via [`from_bytes`](Self::from_bytes) from an encoded
/// image file, or via [`from_image`](Self::from_image).
#[derive(Debug)]
pub struct Texture {
    texels: DeviceBuffer,
    record: DeviceBuffer,
    width: u32,
    height: u32,
    srgb: bool,
}

impl Texture {
    /// Decode an encoded image (png, jpeg, exr, ...) and upload it.
    ///
    /// `srgb` marks colour data (emission / diffuse maps) that the kernel has
    /// to linearise when sampling.
    pub fn from_bytes(memory: &MemoryHandle, bytes: &[u8], srgb: bool) -> Result<Self> {
        let img = image::load_from_memory(bytes).context("failed to decode texture")?;
        Self::from_image(memory, &img, srgb)
    }

    pub fn from_image(memory: &MemoryHandle, img: &image::DynamicImage, srgb: bool) -> Result<Self> {
        // Three channel images get an opaque alpha channel.
        let rgba = img.to_rgba8();
        let (width, height) = img.dimensions();
        Self::from_rgba8(memory, width, height, rgba.as_raw(), srgb)
    }

    pub fn from_rgba8(memory: &MemoryHandle, width: u32, height: u32, texels: &[u8], srgb: bool) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        ensure!(width > 0 && height > 0, "texture has no texels ({width}x{height})");
        ensure!(
            texels.len() == expected,
            "{width}x{height} texture needs {expected} bytes, got {}",
            texels.len()
        );
        let texels = DeviceBuffer::with_data(memory, texels);
        let record = DeviceBuffer::with_record(
            memory,
            &TextureRaw {
                data: texels.address(),
                width,
                height,
                srgb: srgb as u32,
                _pad: 0,
            },
        );
        Ok(Self {
            texels,
            record,
            width,
            height,
            srgb,
        })
    }

    /// Address of the [`TextureRaw`] record.
    pub fn address(&self) -> DeviceAddress {
        self.record.address()
    }

    pub fn texels_address(&self) -> DeviceAddress {
        self.texels.address()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_srgb(&self) -> bool {
        self.srgb
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::memory::HostMemory;

    #[test]
    fn rgb_images_get_opaque_alpha() {
        let host = Rc::new(HostMemory::new());
        let memory: MemoryHandle = host.clone();
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30])));
        let texture = Texture::from_image(&memory, &img, true).unwrap();

        let record: TextureRaw = host.read_record(texture.address()).unwrap();
        assert_eq!((record.width, record.height, record.srgb), (2, 1, 1));
        assert_eq!(record.data, texture.texels_address());
        assert_eq!(host.read(record.data, 8), Some(vec![10, 20, 30, 255, 10, 20, 30, 255]));
    }

    #[test]
    fn mismatched_texel_count_is_rejected() {
        let memory: MemoryHandle = Rc::new(HostMemory::new());
        assert!(Texture::from_rgba8(&memory, 2, 2, &[0; 12], false).is_err());
        assert!(Texture::from_rgba8(&memory, 0, 2, &[], false).is_err());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let memory: MemoryHandle = Rc::new(HostMemory::new());
        assert!(Texture::from_bytes(&memory, b"not an image", false).is_err());
    }
}
