pub mod material;
pub mod mesh;
pub mod texture_resource;

pub use material::{Material, MaterialLibrary, MaterialParameters};
pub use mesh::{Mesh, MeshData};
pub use texture_resource::{DepthTarget, ImageData, TextureResource};
