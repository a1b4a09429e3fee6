//! Texture resources created through the device abstraction.
//!
//! Provides depth targets (with a read view over the same texture), color
//! textures from RGBA pixels or image files, and procedural test patterns.

use std::path::Path;

use crate::error::Result;
use crate::gfx::device::{
    DepthStencilView, GraphicsDevice, ShaderResourceView, TextureDesc, TextureHandle, ViewDimension,
};

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes any format the `image` crate understands into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path.as_ref())?.to_rgba8();
        let (width, height) = image.dimensions();
        log::debug!("decoded {} ({}x{})", path.as_ref().display(), width, height);
        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: rgba.repeat((width * height) as usize),
        }
    }

    /// Two-color checkerboard with square cells of `cell` pixels.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
                pixels.extend_from_slice(&color);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Vertical gradient from `top` to `bottom`.
    pub fn gradient(size: u32, top: [u8; 4], bottom: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            let t = y as f32 / (size.max(2) - 1) as f32;
            let row: [u8; 4] = std::array::from_fn(|i| {
                (top[i] as f32 + (bottom[i] as f32 - top[i] as f32) * t).round() as u8
            });
            for _ in 0..size {
                pixels.extend_from_slice(&row);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

/// A sampled color texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureResource {
    pub texture: TextureHandle,
    pub view: ShaderResourceView,
}

impl TextureResource {
    /// Standard color format for uploaded images.
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn from_image(device: &mut dyn GraphicsDevice, label: &str, image: &ImageData) -> Result<Self> {
        let texture = device.create_texture(
            &TextureDesc::new_2d(
                label,
                image.width,
                image.height,
                Self::COLOR_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            &[&image.pixels],
        )?;
        let view = device.create_shader_resource_view(texture, ViewDimension::D2)?;
        Ok(Self { texture, view })
    }

    pub fn load(device: &mut dyn GraphicsDevice, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = ImageData::load(path)?;
        Self::from_image(device, &path.display().to_string(), &image)
    }
}

/// A depth texture with a write view and a read view over the same texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthTarget {
    pub texture: TextureHandle,
    pub depth_view: DepthStencilView,
    /// Present when the target was created readable.
    pub read_view: Option<ShaderResourceView>,
    pub width: u32,
    pub height: u32,
}

impl DepthTarget {
    /// Standard depth buffer format used throughout the renderer
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a depth buffer. With `readable`, a shader resource view over
    /// the same texture is created as well.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
        readable: bool,
    ) -> Result<Self> {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if readable {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }

        let texture = device.create_texture(
            &TextureDesc::new_2d(label, width, height, Self::DEPTH_FORMAT, usage),
            &[],
        )?;
        let depth_view = device.create_depth_stencil_view(texture)?;
        let read_view = if readable {
            Some(device.create_shader_resource_view(texture, ViewDimension::D2)?)
        } else {
            None
        };

        Ok(Self {
            texture,
            depth_view,
            read_view,
            width,
            height,
        })
    }

    /// Frees the texture and both views.
    pub fn release(self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.release_texture(self.texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;

    #[test]
    fn test_checkerboard_alternates() {
        let image = ImageData::checkerboard(4, 2, [255; 4], [0, 0, 0, 255]);
        assert_eq!(image.pixels.len(), 64);
        assert_eq!(&image.pixels[0..4], &[255; 4]);
        // (2, 0) starts the second cell
        assert_eq!(&image.pixels[8..12], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_gradient_endpoints() {
        let image = ImageData::gradient(3, [0, 0, 0, 255], [200, 100, 50, 255]);
        assert_eq!(&image.pixels[0..4], &[0, 0, 0, 255]);
        let last = image.pixels.len() - 4;
        assert_eq!(&image.pixels[last..], &[200, 100, 50, 255]);
    }

    #[test]
    fn test_readable_depth_target_shares_texture() {
        let mut device = RecordingDevice::new(8, 8);
        let target = DepthTarget::new(&mut device, "shadow", 16, 16, true).unwrap();
        let read_view = target.read_view.unwrap();
        assert_eq!(device.depth_stencil_view_texture(target.depth_view), Some(target.texture));
        assert_eq!(device.shader_resource_view_texture(read_view), Some(target.texture));
    }

    #[test]
    fn test_image_upload() {
        let mut device = RecordingDevice::new(8, 8);
        let image = ImageData::solid(2, 2, [1, 2, 3, 4]);
        let resource = TextureResource::from_image(&mut device, "solid", &image).unwrap();
        assert_eq!(device.texture_layer(resource.texture, 0), Some(image.pixels.as_slice()));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        assert!(ImageData::load("no/such/face.png").is_err());
    }
}
