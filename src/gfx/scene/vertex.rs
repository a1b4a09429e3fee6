//! # Vertex Data Structures
//!
//! The single vertex format every mesh in the renderer uses.

/// A vertex with position, normal, texture coordinate and tangent.
///
/// The `#[repr(C)]` layout is what the vertex buffer layout below describes,
/// and what the WGSL vertex inputs at locations 0..=3 expect.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Filled in by `MeshData::calculate_tangents`.
    pub tangent: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [0.0; 3],
        }
    }

    /// Returns the vertex buffer layout for wgpu rendering.
    ///
    /// - Attribute 0: position (Float32x3)
    /// - Attribute 1: normal (Float32x3)
    /// - Attribute 2: uv (Float32x2)
    /// - Attribute 3: tangent (Float32x3)
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x3
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_struct() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, 44);
        assert_eq!(Vertex::STRIDE, 44);

        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
    }
}
