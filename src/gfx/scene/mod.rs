//! # Scene Management Module
//!
//! The scene is a flat list of entities plus the shared resources they point
//! at. There is no hierarchy: each entity owns one transform and references
//! one mesh and one material.
//!
//! ## Key Components
//!
//! - [`Scene`] - Camera, entities, meshes, materials and lights for one frame
//! - [`Entity`] - A transform paired with a shared mesh and material
//! - [`Vertex`] - Position, normal, texture coordinate and tangent

pub mod entity;
pub mod scene;
pub mod vertex;

pub use entity::Entity;
pub use scene::{Scene, SceneStatistics};
pub use vertex::Vertex;
