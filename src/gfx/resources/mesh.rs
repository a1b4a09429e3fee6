//! Mesh geometry: CPU-side vertex/index data and its immutable GPU buffers.

use std::path::Path;

use cgmath::{InnerSpace, Vector2, Vector3};

use crate::error::{RenderError, Result};
use crate::gfx::device::{BufferDesc, BufferHandle, BufferUsage, GraphicsContext, GraphicsDevice};
use crate::gfx::scene::vertex::Vertex;

/// Triangle-list geometry before upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Area-weighted smooth normals, replacing whatever was there.
    pub fn calculate_normals(&mut self) {
        let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(va), Some(vb), Some(vc)) = (self.vertices.get(a), self.vertices.get(b), self.vertices.get(c)) else {
                continue;
            };
            let p0 = Vector3::from(va.position);
            let face = (Vector3::from(vb.position) - p0).cross(Vector3::from(vc.position) - p0);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }

        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            if normal.magnitude2() > 0.0 {
                vertex.normal = normal.normalize().into();
            }
        }
    }

    /// Per-vertex tangents from positions and texture coordinates,
    /// Gram-Schmidt orthogonalized against the normal.
    pub fn calculate_tangents(&mut self) {
        let mut tangents = vec![Vector3::new(0.0f32, 0.0, 0.0); self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(va), Some(vb), Some(vc)) = (self.vertices.get(a), self.vertices.get(b), self.vertices.get(c)) else {
                continue;
            };

            let p0 = Vector3::from(va.position);
            let edge1 = Vector3::from(vb.position) - p0;
            let edge2 = Vector3::from(vc.position) - p0;

            let uv0 = Vector2::from(va.uv);
            let duv1 = Vector2::from(vb.uv) - uv0;
            let duv2 = Vector2::from(vc.uv) - uv0;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) / det;

            tangents[a] += tangent;
            tangents[b] += tangent;
            tangents[c] += tangent;
        }

        for (vertex, tangent) in self.vertices.iter_mut().zip(tangents) {
            let normal = Vector3::from(vertex.normal);
            let orthogonal = tangent - normal * normal.dot(tangent);
            if orthogonal.magnitude2() > f32::EPSILON {
                vertex.tangent = orthogonal.normalize().into();
            }
        }
    }

    /// Loads every model in an OBJ file into one mesh.
    ///
    /// OBJ data is right-handed with a bottom-left texture origin; positions
    /// and normals are mirrored on Z, V is flipped and the winding reversed so
    /// the result matches the renderer's left-handed, clockwise-front
    /// convention.
    pub fn from_obj(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|source| RenderError::Model {
            path: path.to_path_buf(),
            source,
        })?;

        let mut data = MeshData::default();
        let mut missing_normals = false;

        for model in &models {
            let mesh = &model.mesh;
            let base = data.vertices.len() as u32;
            let count = mesh.positions.len() / 3;
            let has_normals = mesh.normals.len() == mesh.positions.len();
            let has_uvs = mesh.texcoords.len() / 2 == count;
            missing_normals |= !has_normals;

            for i in 0..count {
                let position = [mesh.positions[i * 3], mesh.positions[i * 3 + 1], -mesh.positions[i * 3 + 2]];
                let normal = if has_normals {
                    [mesh.normals[i * 3], mesh.normals[i * 3 + 1], -mesh.normals[i * 3 + 2]]
                } else {
                    [0.0, 0.0, 0.0]
                };
                let uv = if has_uvs {
                    [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
                } else {
                    [0.0, 0.0]
                };
                data.vertices.push(Vertex::new(position, normal, uv));
            }

            for tri in mesh.indices.chunks_exact(3) {
                data.indices.extend_from_slice(&[base + tri[0], base + tri[2], base + tri[1]]);
            }
        }

        if data.indices.is_empty() {
            return Err(RenderError::EmptyMesh(path.display().to_string()));
        }
        if missing_normals {
            log::debug!("{} has no normals, generating them", path.display());
            data.calculate_normals();
        }
        data.calculate_tangents();

        log::info!(
            "loaded {} ({} vertices, {} triangles)",
            path.display(),
            data.vertices.len(),
            data.triangle_count()
        );
        Ok(data)
    }
}

/// Uploaded geometry. Shared read-only between entities.
#[derive(Debug)]
pub struct Mesh {
    name: String,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    vertex_count: u32,
}

impl Mesh {
    pub fn new(device: &mut dyn GraphicsDevice, name: &str, data: &MeshData) -> Result<Self> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(RenderError::EmptyMesh(name.to_owned()));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

        let vertex_buffer = device.create_buffer(
            &BufferDesc {
                label: name,
                usage: BufferUsage::Vertex,
                size: vertex_bytes.len() as u64,
            },
            Some(vertex_bytes),
        )?;
        let index_buffer = device.create_buffer(
            &BufferDesc {
                label: name,
                usage: BufferUsage::Index,
                size: index_bytes.len() as u64,
            },
            Some(index_bytes),
        )?;

        log::debug!("uploaded mesh '{}' ({} indices)", name, data.indices.len());

        Ok(Self {
            name: name.to_owned(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            vertex_count: data.vertices.len() as u32,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Binds the buffers and issues one indexed draw over the whole mesh.
    pub fn draw(&self, ctx: &mut dyn GraphicsContext) -> Result<()> {
        ctx.set_vertex_buffer(self.vertex_buffer, Vertex::STRIDE);
        ctx.set_index_buffer(self.index_buffer);
        ctx.draw_indexed(self.index_count, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::RecordingDevice;
    use std::io::Write;

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0]),
                Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 1.0]),
                Vertex::new([1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0]),
                Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0]),
            ],
            vec![0, 2, 1, 0, 3, 2],
        )
    }

    #[test]
    fn test_tangents_follow_u_direction() {
        let mut data = quad();
        data.calculate_tangents();
        for vertex in &data.vertices {
            assert_eq!(vertex.tangent, [1.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_normals_from_winding() {
        let mut data = quad();
        for v in &mut data.vertices {
            v.normal = [0.0; 3];
        }
        data.calculate_normals();
        // Triangles (0,2,1) and (0,3,2) face -Z
        for vertex in &data.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, -1.0]);
        }
    }

    #[test]
    fn test_upload_and_draw() {
        let mut device = RecordingDevice::new(32, 32);
        let mesh = Mesh::new(&mut device, "quad", &quad()).unwrap();
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(
            device.buffer_contents(mesh.index_buffer()),
            Some(bytemuck::cast_slice::<u32, u8>(&[0, 2, 1, 0, 3, 2]))
        );
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mut device = RecordingDevice::new(32, 32);
        assert!(matches!(
            Mesh::new(&mut device, "nothing", &MeshData::default()),
            Err(RenderError::EmptyMesh(_))
        ));
    }

    #[test]
    fn test_obj_is_converted_to_left_handed() {
        let path = std::env::temp_dir().join(format!("umbra_mesh_test_{}.obj", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "v 0 0 1\nv 1 0 1\nv 0 1 1\nvt 0 0\nvt 1 0\nvt 0 1\nvn 0 0 1\nf 1/1/1 2/2/1 3/3/1").unwrap();
        }

        let data = MeshData::from_obj(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.vertices.len(), 3);
        assert_eq!(data.vertices[0].position, [0.0, 0.0, -1.0]);
        assert_eq!(data.vertices[0].normal, [0.0, 0.0, -1.0]);
        assert_eq!(data.vertices[0].uv, [0.0, 1.0]);
        assert_eq!(data.indices, vec![0, 2, 1]);
    }

    #[test]
    fn test_missing_obj_reports_path() {
        let err = MeshData::from_obj("does/not/exist.obj").unwrap_err();
        assert!(err.to_string().contains("exist.obj"));
    }
}
