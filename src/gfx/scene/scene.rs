use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::gfx::camera::FlyCamera;
use crate::gfx::device::GraphicsDevice;
use crate::gfx::lights::SceneLighting;
use crate::gfx::resources::{Material, MaterialLibrary, Mesh, MeshData};
use crate::input::Input;

use super::entity::Entity;

/// Everything the frame renderer draws: camera, entities, shared meshes and
/// materials, and the light rig.
///
/// Owned by the driver and passed by reference into update and draw.
#[derive(Debug)]
pub struct Scene {
    pub camera: FlyCamera,
    pub entities: Vec<Entity>,
    pub materials: MaterialLibrary,
    pub lighting: SceneLighting,
    meshes: HashMap<String, Arc<Mesh>>,
    /// Radians per second the sun travels around the Y axis.
    sun_orbit_speed: f32,
    total_time: f32,
}

impl Scene {
    pub fn new(camera: FlyCamera, lighting: SceneLighting) -> Self {
        Self {
            camera,
            entities: Vec::new(),
            materials: MaterialLibrary::new(),
            lighting,
            meshes: HashMap::new(),
            sun_orbit_speed: 0.0,
            total_time: 0.0,
        }
    }

    pub fn with_sun_orbit_speed(mut self, speed: f32) -> Self {
        self.sun_orbit_speed = speed;
        self
    }

    /// Uploads `data` and stores the mesh under `name`, replacing any mesh of
    /// the same name for future lookups. Entities already holding the old
    /// mesh keep it.
    pub fn add_mesh(&mut self, device: &mut dyn GraphicsDevice, name: &str, data: &MeshData) -> Result<Arc<Mesh>> {
        let mesh = Arc::new(Mesh::new(device, name, data)?);
        self.meshes.insert(name.to_owned(), mesh.clone());
        Ok(mesh)
    }

    pub fn mesh(&self, name: &str) -> Option<&Arc<Mesh>> {
        self.meshes.get(name)
    }

    pub fn add_material(&mut self, material: Material) -> Arc<Material> {
        self.materials.add_material(material)
    }

    /// Adds an entity and returns its index.
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn entity(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn entity_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Seconds accumulated by `update`.
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Advances time, flies the camera and moves the sun.
    pub fn update(&mut self, dt: f32, input: &Input) {
        self.total_time += dt;
        self.camera.update(dt, input);
        if self.sun_orbit_speed != 0.0 {
            self.lighting.orbit_sun(self.total_time * self.sun_orbit_speed);
        }
    }

    /// Rebuilds the camera projection after a resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.camera.update_projection_matrix(width as f32 / height as f32);
        }
    }

    pub fn statistics(&self) -> SceneStatistics {
        SceneStatistics {
            entity_count: self.entities.len(),
            mesh_count: self.meshes.len(),
            material_count: self.materials.len(),
            total_triangles: self.entities.iter().map(|e| e.mesh().index_count() / 3).sum(),
        }
    }
}

/// Scene statistics for logging and overlays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStatistics {
    pub entity_count: usize,
    pub mesh_count: usize,
    pub material_count: usize,
    pub total_triangles: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::gfx::device::RecordingDevice;
    use crate::gfx::geometry::{generate_cube, generate_plane};
    use crate::gfx::rendering::Programs;
    use winit::keyboard::KeyCode;

    fn scene() -> Scene {
        let camera = FlyCamera::new(16.0 / 9.0, &CameraConfig::default());
        Scene::new(camera, SceneLighting::reference([0.1, 0.1, 0.1]))
    }

    #[test]
    fn test_update_accumulates_time_and_moves_camera() {
        let mut scene = scene();
        let mut input = Input::new();
        input.set_key(KeyCode::KeyW, true);

        let start = scene.camera.transform.position();
        scene.update(0.5, &input);
        scene.update(0.5, &input);

        assert!((scene.total_time() - 1.0).abs() < 1e-6);
        assert!(scene.camera.transform.position().z > start.z);
    }

    #[test]
    fn test_sun_orbits_only_when_enabled() {
        let mut still = scene();
        let before = still.lighting.sun().direction;
        still.update(1.0, &Input::new());
        assert_eq!(still.lighting.sun().direction, before);

        let mut orbiting = scene().with_sun_orbit_speed(0.5);
        orbiting.update(1.0, &Input::new());
        assert_ne!(orbiting.lighting.sun().direction, before);
        // Elevation survives the orbit
        assert!((orbiting.lighting.sun().direction[1] - before[1]).abs() < 1e-5);
    }

    #[test]
    fn test_entities_and_statistics() {
        let mut device = RecordingDevice::new(32, 32);
        let programs = Programs::new(&mut device).unwrap();
        let mut scene = scene();

        let cube = scene.add_mesh(&mut device, "cube", &generate_cube()).unwrap();
        let floor = scene.add_mesh(&mut device, "floor", &generate_plane(4.0, 4.0, 1, 1)).unwrap();
        let material = scene.add_material(
            Material::new("plain", programs.lit_vertex.clone(), programs.lit_pixel.clone()).unwrap(),
        );

        scene.add_entity(Entity::new("a", cube.clone(), material.clone()));
        scene.add_entity(Entity::new("b", cube, material.clone()));
        let index = scene.add_entity(Entity::new("floor", floor, material));

        assert_eq!(index, 2);
        assert!(scene.find_entity("floor").is_some());
        assert!(scene.mesh("cube").is_some());

        let stats = scene.statistics();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.mesh_count, 2);
        assert_eq!(stats.material_count, 1);
        assert_eq!(stats.total_triangles, 12 + 12 + 2);
    }
}
