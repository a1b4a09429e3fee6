//! Drawable entities: one transform, one shared mesh, one shared material.

use std::sync::Arc;

use cgmath::EuclideanSpace;

use crate::error::Result;
use crate::gfx::camera::Camera;
use crate::gfx::device::GraphicsContext;
use crate::gfx::resources::{Material, MaterialParameters, Mesh};
use crate::gfx::shader::ShaderParameterSink;
use crate::gfx::transform::Transform;

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub transform: Transform,
    mesh: Arc<Mesh>,
    material: Arc<Material>,
}

impl Entity {
    /// Identity pose. Mesh and material are required, so a constructed
    /// entity is always drawable.
    pub fn new(name: &str, mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self {
            name: name.to_owned(),
            transform: Transform::new(),
            mesh,
            material,
        }
    }

    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.set_position(x, y, z);
        self
    }

    pub fn with_rotation(mut self, pitch: f32, yaw: f32, roll: f32) -> Self {
        self.transform.set_rotation(pitch, yaw, roll);
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.set_scale(x, y, z);
        self
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    /// Swaps the material binding. The old material is left untouched.
    pub fn set_material(&mut self, material: Arc<Material>) {
        self.material = material;
    }

    /// Fresh staging blocks for this entity's material.
    pub fn parameters(&self) -> MaterialParameters {
        MaterialParameters::new(&self.material)
    }

    /// Draws the entity with the main lit programs.
    ///
    /// `params` may already hold frame-level values (lights, shadow data);
    /// per-entity values are written on top, everything is committed once and
    /// the mesh is drawn.
    pub fn draw(
        &self,
        ctx: &mut dyn GraphicsContext,
        camera: &dyn Camera,
        params: &mut MaterialParameters,
    ) -> Result<()> {
        params.activate(ctx);
        self.material.prepare(&mut params.pixel);

        let vertex = &mut params.vertex;
        vertex.set_matrix4x4("world", &self.transform.world_matrix());
        vertex.set_matrix4x4("worldInverseTranspose", &self.transform.world_inverse_transpose());
        vertex.set_matrix4x4("view", &camera.view_matrix());
        vertex.set_matrix4x4("projection", &camera.projection_matrix());

        let pixel = &mut params.pixel;
        pixel.set_float4("colorTint", self.material.color_tint());
        pixel.set_float("roughness", self.material.roughness());
        pixel.set_float2("uvScale", self.material.uv_scale());
        pixel.set_float3("cameraPosition", camera.position().to_vec());

        params.commit(ctx)?;
        self.mesh.draw(ctx)
    }
}
