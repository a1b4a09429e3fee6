//! Position, rotation and scale with lazily rebuilt matrices.
//!
//! Every mutator only marks the transform dirty. The world matrix and its
//! inverse transpose are rebuilt on the first read after a change and served
//! from the cache until the next mutation.

use std::cell::Cell;

use cgmath::{Matrix, Matrix4, Rotation, SquareMatrix, Vector3};

use super::math::quaternion_from_euler;

#[derive(Debug, Clone)]
pub struct Transform {
    position: Vector3<f32>,
    /// Euler angles in radians (pitch, yaw, roll).
    rotation: Vector3<f32>,
    scale: Vector3<f32>,

    dirty: Cell<bool>,
    world: Cell<Matrix4<f32>>,
    world_inverse_transpose: Cell<Matrix4<f32>>,
    rebuilds: Cell<u64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity pose.
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            dirty: Cell::new(false),
            world: Cell::new(Matrix4::identity()),
            world_inverse_transpose: Cell::new(Matrix4::identity()),
            rebuilds: Cell::new(0),
        }
    }

    pub fn from_position(x: f32, y: f32, z: f32) -> Self {
        let mut transform = Self::new();
        transform.set_position(x, y, z);
        transform
    }

    // Setters

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Vector3::new(x, y, z);
        self.mark_dirty();
    }

    pub fn set_rotation(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation = Vector3::new(pitch, yaw, roll);
        self.mark_dirty();
    }

    pub fn set_scale(&mut self, x: f32, y: f32, z: f32) {
        self.scale = Vector3::new(x, y, z);
        self.mark_dirty();
    }

    /// Translates along the world axes.
    pub fn move_absolute(&mut self, dx: f32, dy: f32, dz: f32) {
        self.position += Vector3::new(dx, dy, dz);
        self.mark_dirty();
    }

    /// Translates along the transform's own rotated axes.
    pub fn move_relative(&mut self, dx: f32, dy: f32, dz: f32) {
        let offset = quaternion_from_euler(self.rotation).rotate_vector(Vector3::new(dx, dy, dz));
        self.position += offset;
        self.mark_dirty();
    }

    /// Adds to the current Euler angles.
    pub fn rotate(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation += Vector3::new(pitch, yaw, roll);
        self.mark_dirty();
    }

    /// Multiplies the current scale component-wise.
    pub fn scale_by(&mut self, x: f32, y: f32, z: f32) {
        self.scale = Vector3::new(self.scale.x * x, self.scale.y * y, self.scale.z * z);
        self.mark_dirty();
    }

    // Getters

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn rotation(&self) -> Vector3<f32> {
        self.rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    pub fn right(&self) -> Vector3<f32> {
        quaternion_from_euler(self.rotation).rotate_vector(Vector3::unit_x())
    }

    pub fn up(&self) -> Vector3<f32> {
        quaternion_from_euler(self.rotation).rotate_vector(Vector3::unit_y())
    }

    pub fn forward(&self) -> Vector3<f32> {
        quaternion_from_euler(self.rotation).rotate_vector(Vector3::unit_z())
    }

    /// Local-to-world matrix: scale, then rotate, then translate.
    pub fn world_matrix(&self) -> Matrix4<f32> {
        self.refresh();
        self.world.get()
    }

    /// Inverse transpose of the world matrix, for transforming normals.
    pub fn world_inverse_transpose(&self) -> Matrix4<f32> {
        self.refresh();
        self.world_inverse_transpose.get()
    }

    /// Number of times the cached matrices have been rebuilt.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.get()
    }

    fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    fn refresh(&self) {
        if !self.dirty.get() {
            return;
        }

        let translation = Matrix4::from_translation(self.position);
        let rotation = Matrix4::from(quaternion_from_euler(self.rotation));
        let scale = Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z);
        let world = translation * rotation * scale;

        // A zero scale axis makes the matrix singular; normals are meaningless then anyway.
        let inverse_transpose = world
            .transpose()
            .invert()
            .unwrap_or_else(Matrix4::identity);

        self.world.set(world);
        self.world_inverse_transpose.set(inverse_transpose);
        self.rebuilds.set(self.rebuilds.get() + 1);
        self.dirty.set(false);
    }
}
