//! # Primitive Shape Generation

use std::f32::consts::PI;

use cgmath::Vector3;

use crate::gfx::resources::mesh::MeshData;
use crate::gfx::scene::vertex::Vertex;

/// Unit cube centered at the origin, spanning -0.5..0.5 on every axis.
///
/// Each face has its own four vertices so normals stay flat; UVs run
/// left-to-right and top-to-bottom as seen from outside the face.
pub fn generate_cube() -> MeshData {
    let faces: [Vector3<f32>; 6] = [
        Vector3::unit_x(),
        -Vector3::unit_x(),
        Vector3::unit_y(),
        -Vector3::unit_y(),
        Vector3::unit_z(),
        -Vector3::unit_z(),
    ];

    let mut data = MeshData::default();
    for normal in faces {
        // Picture "up" on the face; the poles use Z instead of Y
        let up = if normal.y.abs() > 0.5 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        // cross(u, v) == normal keeps the winding outward
        let u = up.cross(normal) * 0.5;
        let v = up * 0.5;
        let center = normal * 0.5;

        let base = data.vertices.len() as u32;
        let corners = [
            (center - u - v, [0.0, 1.0]),
            (center + u - v, [1.0, 1.0]),
            (center + u + v, [1.0, 0.0]),
            (center - u + v, [0.0, 0.0]),
        ];
        for (position, uv) in corners {
            data.vertices.push(Vertex::new(position.into(), normal.into(), uv));
        }
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    data.calculate_tangents();
    data
}

/// UV sphere of radius 0.5 centered at the origin.
///
/// `longitude_segments` slices around Y, `latitude_segments` stacks from the
/// north pole to the south pole.
pub fn generate_sphere(longitude_segments: u32, latitude_segments: u32) -> MeshData {
    let longitude_segments = longitude_segments.max(3);
    let latitude_segments = latitude_segments.max(2);
    let radius = 0.5;

    let mut data = MeshData::default();
    for lat in 0..=latitude_segments {
        let theta = lat as f32 * PI / latitude_segments as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for lon in 0..=longitude_segments {
            let phi = lon as f32 * 2.0 * PI / longitude_segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
            let uv = [
                lon as f32 / longitude_segments as f32,
                lat as f32 / latitude_segments as f32,
            ];
            data.vertices.push(Vertex::new(position, normal, uv));
        }
    }

    let stride = longitude_segments + 1;
    for lat in 0..latitude_segments {
        for lon in 0..longitude_segments {
            let first = lat * stride + lon;
            let second = first + stride;

            data.indices.extend_from_slice(&[first, first + 1, second]);
            data.indices.extend_from_slice(&[second, first + 1, second + 1]);
        }
    }

    data.calculate_tangents();
    data
}

/// Flat plane in XZ facing +Y, centered at the origin.
pub fn generate_plane(width: f32, depth: f32, width_segments: u32, depth_segments: u32) -> MeshData {
    let width_segments = width_segments.max(1);
    let depth_segments = depth_segments.max(1);

    let mut data = MeshData::default();
    for z in 0..=depth_segments {
        for x in 0..=width_segments {
            let u = x as f32 / width_segments as f32;
            let v = z as f32 / depth_segments as f32;
            data.vertices.push(Vertex::new(
                [(u - 0.5) * width, 0.0, (v - 0.5) * depth],
                [0.0, 1.0, 0.0],
                [u, 1.0 - v],
            ));
        }
    }

    let stride = width_segments + 1;
    for z in 0..depth_segments {
        for x in 0..width_segments {
            let i = z * stride + x;
            let next_row = i + stride;

            data.indices.extend_from_slice(&[i, next_row, i + 1]);
            data.indices.extend_from_slice(&[i + 1, next_row, next_row + 1]);
        }
    }

    data.calculate_tangents();
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    /// Checks every non-degenerate triangle against `outward(centroid)`.
    fn assert_wound_outward(data: &MeshData, outward: impl Fn(Vector3<f32>) -> Vector3<f32>) {
        for tri in data.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vector3::from(data.vertices[tri[i] as usize].position));
            let face = (b - a).cross(c - a);
            if face.magnitude2() < 1e-10 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(face.dot(outward(centroid)) > 0.0, "triangle {tri:?} faces inward");
        }
    }

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertices.len(), 24); // 6 faces * 4 vertices
        assert_eq!(cube.indices.len(), 36); // 6 faces * 2 triangles * 3 indices
        assert_eq!(cube.triangle_count(), 12);
        assert_wound_outward(&cube, |c| c);
    }

    #[test]
    fn test_cube_corners() {
        let cube = generate_cube();
        for vertex in &cube.vertices {
            for coord in vertex.position {
                assert!((coord.abs() - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_sphere_generation() {
        let sphere = generate_sphere(8, 6);
        assert_eq!(sphere.vertices.len(), 9 * 7);
        assert_eq!(sphere.indices.len(), 8 * 6 * 6);
        assert_wound_outward(&sphere, |c| c);
        for vertex in &sphere.vertices {
            let length = Vector3::from(vertex.position).magnitude();
            assert!((length - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_plane_generation() {
        let plane = generate_plane(2.0, 2.0, 2, 2);
        assert_eq!(plane.vertices.len(), 9); // 3x3 grid
        assert_eq!(plane.indices.len(), 24); // 4 quads * 2 triangles * 3 indices
        assert_wound_outward(&plane, |_| Vector3::unit_y());
    }

    #[test]
    fn test_plane_tangents_follow_u() {
        let plane = generate_plane(4.0, 4.0, 1, 1);
        for vertex in &plane.vertices {
            assert_eq!(vertex.tangent, [1.0, 0.0, 0.0]);
        }
    }
}
