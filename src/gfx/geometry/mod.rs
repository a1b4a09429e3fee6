//! # Procedural Geometry Generation
//!
//! Common primitive shapes, generated with normals, texture coordinates and
//! tangents so they can be uploaded with `Mesh::new` directly.
//!
//! Every triangle is wound so that `cross(b - a, c - a)` points out of the
//! surface, which makes it clockwise when seen from outside in the renderer's
//! left-handed view space.
//!
//! ```rust
//! use umbra::gfx::geometry::{generate_cube, generate_plane, generate_sphere};
//!
//! let cube = generate_cube();
//! let sphere = generate_sphere(32, 16);
//! let floor = generate_plane(10.0, 10.0, 4, 4);
//! assert_eq!(cube.triangle_count(), 12);
//! # let _ = (sphere, floor);
//! ```

pub mod primitives;

pub use primitives::*;
