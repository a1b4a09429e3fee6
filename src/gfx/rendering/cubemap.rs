//! Cube textures composed from six face images.
//!
//! Faces are uploaded as separate 2D textures and copied into the slices of
//! one six-layer texture in the fixed order +X, -X, +Y, -Y, +Z, -Z.

use std::path::Path;

use crate::error::{RenderError, Result};
use crate::gfx::device::{
    GraphicsContext, GraphicsDevice, ShaderResourceView, TextureDesc, TextureHandle, ViewDimension,
};
use crate::gfx::resources::{ImageData, TextureResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// Array slice order of a cube texture.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn slice(self) -> u32 {
        self as u32
    }

    /// File stem of this face in a sky directory.
    pub fn file_stem(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "right",
            CubeFace::NegativeX => "left",
            CubeFace::PositiveY => "up",
            CubeFace::NegativeY => "down",
            CubeFace::PositiveZ => "front",
            CubeFace::NegativeZ => "back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cubemap {
    pub texture: TextureHandle,
    pub view: ShaderResourceView,
    pub size: u32,
}

impl Cubemap {
    /// Builds a cube texture from six faces in `CubeFace::ALL` order.
    ///
    /// Faces are expected to share size and format. Mismatched faces are
    /// logged and copied as far as they overlap.
    pub fn from_faces<G>(gpu: &mut G, label: &str, faces: &[ImageData]) -> Result<Self>
    where
        G: GraphicsDevice + GraphicsContext,
    {
        if faces.len() != CubeFace::ALL.len() {
            return Err(RenderError::CubemapFaceCount(faces.len()));
        }

        let (width, height) = (faces[0].width, faces[0].height);
        for (face, image) in CubeFace::ALL.iter().zip(faces) {
            if (image.width, image.height) != (width, height) {
                log::warn!(
                    "cubemap '{}': face {:?} is {}x{}, expected {}x{}",
                    label,
                    face,
                    image.width,
                    image.height,
                    width,
                    height
                );
            }
        }

        let mut sources = Vec::with_capacity(faces.len());
        for (face, image) in CubeFace::ALL.iter().zip(faces) {
            let face_label = format!("{label}/{}", face.file_stem());
            let texture = gpu.create_texture(
                &TextureDesc::new_2d(
                    &face_label,
                    image.width,
                    image.height,
                    TextureResource::COLOR_FORMAT,
                    wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
                ),
                &[&image.pixels],
            )?;
            sources.push(texture);
        }

        let texture = gpu.create_texture(
            &TextureDesc {
                label,
                width,
                height,
                array_layers: 6,
                format: TextureResource::COLOR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                cube_compatible: true,
            },
            &[],
        )?;

        for (face, &source) in CubeFace::ALL.iter().zip(&sources) {
            gpu.copy_texture_to_slice(source, texture, face.slice())?;
        }
        for source in sources {
            gpu.release_texture(source)?;
        }

        let view = gpu.create_shader_resource_view(texture, ViewDimension::Cube)?;
        log::debug!("built cubemap '{}' ({}x{})", label, width, height);

        Ok(Self {
            texture,
            view,
            size: width,
        })
    }

    /// Loads `right`, `left`, `up`, `down`, `front` and `back` `.png` from `dir`.
    pub fn load_dir<G>(gpu: &mut G, dir: impl AsRef<Path>) -> Result<Self>
    where
        G: GraphicsDevice + GraphicsContext,
    {
        let dir = dir.as_ref();
        let faces = CubeFace::ALL
            .iter()
            .map(|face| ImageData::load(dir.join(format!("{}.png", face.file_stem()))))
            .collect::<Result<Vec<_>>>()?;
        Self::from_faces(gpu, &dir.display().to_string(), &faces)
    }
}

/// Vertical gradient faces: `zenith` on top, `horizon` around the sides and
/// `ground` below.
pub fn gradient_sky_faces(size: u32, zenith: [u8; 4], horizon: [u8; 4], ground: [u8; 4]) -> Vec<ImageData> {
    CubeFace::ALL
        .iter()
        .map(|face| match face {
            CubeFace::PositiveY => ImageData::solid(size, size, zenith),
            CubeFace::NegativeY => ImageData::solid(size, size, ground),
            _ => ImageData::gradient(size, zenith, horizon),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::recording::{Command, RecordingDevice};
    use cgmath::Vector3;

    const COLORS: [[u8; 4]; 6] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 0, 255],
        [0, 255, 255, 255],
        [255, 0, 255, 255],
    ];

    fn solid_faces() -> Vec<ImageData> {
        COLORS.iter().map(|&c| ImageData::solid(4, 4, c)).collect()
    }

    #[test]
    fn test_principal_directions_hit_matching_faces() {
        let mut device = RecordingDevice::new(8, 8);
        let cubemap = Cubemap::from_faces(&mut device, "test", &solid_faces()).unwrap();

        let directions = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];
        for (direction, color) in directions.iter().zip(COLORS) {
            assert_eq!(device.sample_cube(cubemap.view, *direction), Some(color.to_vec()));
        }
    }

    #[test]
    fn test_faces_copied_in_slice_order() {
        let mut device = RecordingDevice::new(8, 8);
        let cubemap = Cubemap::from_faces(&mut device, "test", &solid_faces()).unwrap();

        let slices = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::CopyTextureToSlice { destination, slice, .. } if *destination == cubemap.texture => {
                    Some(*slice)
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(slices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_staging_faces_are_released() {
        let mut device = RecordingDevice::new(8, 8);
        let cubemap = Cubemap::from_faces(&mut device, "test", &solid_faces()).unwrap();
        assert_eq!(device.texture_count(), 1);
        assert!(device.is_resident(cubemap.texture));
    }

    #[test]
    fn test_mismatched_faces_still_build() {
        let mut device = RecordingDevice::new(8, 8);

        // smaller face: only the overlap is copied
        let mut faces = solid_faces();
        faces[2] = ImageData::solid(2, 3, COLORS[2]);
        let cubemap = Cubemap::from_faces(&mut device, "smaller", &faces).unwrap();
        assert_eq!(cubemap.size, 4);
        let layer = device.texture_layer(cubemap.texture, 2).unwrap();
        assert_eq!(&layer[..4], &COLORS[2]);
        assert_eq!(&layer[2 * 4..3 * 4], &[0, 0, 0, 0]);
        let right = device.sample_cube(cubemap.view, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(right, Some(COLORS[0].to_vec()));

        // larger face: cropped to the cube size
        let mut faces: Vec<ImageData> = COLORS.iter().map(|&c| ImageData::solid(2, 2, c)).collect();
        faces[5] = ImageData::solid(8, 8, COLORS[5]);
        let cubemap = Cubemap::from_faces(&mut device, "larger", &faces).unwrap();
        assert_eq!(cubemap.size, 2);
        assert_eq!(device.texture_layer(cubemap.texture, 5), Some(COLORS[5].repeat(4).as_slice()));
    }

    #[test]
    fn test_wrong_face_count_is_rejected() {
        let mut device = RecordingDevice::new(8, 8);
        let mut faces = solid_faces();
        faces.pop();
        let err = Cubemap::from_faces(&mut device, "five", &faces).unwrap_err();
        assert!(matches!(err, RenderError::CubemapFaceCount(5)));
    }

    #[test]
    fn test_missing_directory_fails() {
        let mut device = RecordingDevice::new(8, 8);
        let dir = std::env::temp_dir().join("umbra_no_such_sky");
        assert!(Cubemap::load_dir(&mut device, dir).is_err());
    }

    #[test]
    fn test_gradient_sky_faces() {
        let faces = gradient_sky_faces(8, [10, 20, 200, 255], [180, 200, 230, 255], [40, 40, 40, 255]);
        assert_eq!(faces.len(), 6);
        assert_eq!(&faces[CubeFace::PositiveY.slice() as usize].pixels[0..4], &[10, 20, 200, 255]);
        assert_eq!(&faces[CubeFace::NegativeY.slice() as usize].pixels[0..4], &[40, 40, 40, 255]);
    }
}
