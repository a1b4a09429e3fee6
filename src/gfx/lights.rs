//! Light records and the named light slots of a scene.
//!
//! `Light` matches the shader-side block byte for byte: four 16-byte rows,
//! each a scalar followed by a 3-vector. Shaders read it as
//! `array<vec4<f32>, 4>` and unpack the rows.

use cgmath::{InnerSpace, Vector3};

use crate::gfx::shader::ShaderParameterSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub light_type: i32,
    pub direction: [f32; 3],
    pub range: f32,
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub spot_falloff: f32,
    pub padding: [f32; 3],
}

impl Light {
    /// Size of the shader-side block.
    pub const SIZE: u32 = std::mem::size_of::<Light>() as u32;

    pub fn directional(direction: Vector3<f32>, color: [f32; 3], intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional as i32,
            direction: unit_direction(direction),
            intensity,
            color,
            ..Self::zeroed_light()
        }
    }

    pub fn point(position: Vector3<f32>, range: f32, color: [f32; 3], intensity: f32) -> Self {
        Self {
            light_type: LightType::Point as i32,
            position: position.into(),
            range,
            intensity,
            color,
            ..Self::zeroed_light()
        }
    }

    pub fn spot(
        position: Vector3<f32>,
        direction: Vector3<f32>,
        range: f32,
        spot_falloff: f32,
        color: [f32; 3],
        intensity: f32,
    ) -> Self {
        Self {
            light_type: LightType::Spot as i32,
            position: position.into(),
            direction: unit_direction(direction),
            range,
            spot_falloff,
            intensity,
            color,
            ..Self::zeroed_light()
        }
    }

    fn zeroed_light() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    pub fn kind(&self) -> Option<LightType> {
        match self.light_type {
            0 => Some(LightType::Directional),
            1 => Some(LightType::Point),
            2 => Some(LightType::Spot),
            _ => None,
        }
    }

    /// Range falloff used by the lit shader: `saturate(1 - d^2 / r^2)^2`.
    pub fn attenuate(&self, distance: f32) -> f32 {
        if self.range <= 0.0 {
            return 0.0;
        }
        let falloff = (1.0 - (distance * distance) / (self.range * self.range)).clamp(0.0, 1.0);
        falloff * falloff
    }

    /// Cone term used by the lit shader for a spot light.
    ///
    /// `to_light` points from the surface towards the light.
    pub fn spot_term(&self, to_light: Vector3<f32>) -> f32 {
        let direction = Vector3::from(self.direction);
        let cos_angle = (-to_light.normalize()).dot(direction).clamp(0.0, 1.0);
        cos_angle.powf(self.spot_falloff)
    }
}

/// Normalized light direction. A zero vector falls back to straight down.
fn unit_direction(direction: Vector3<f32>) -> [f32; 3] {
    if direction.magnitude2() <= f32::EPSILON {
        log::warn!("light direction {:?} has no length, pointing it down", direction);
        return [0.0, -1.0, 0.0];
    }
    direction.normalize().into()
}

/// Fixed light slots, addressed by the names the lit shader declares.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLighting {
    pub ambient_color: [f32; 3],
    pub directional: [Light; 3],
    pub point: [Light; 2],
}

impl SceneLighting {
    pub const AMBIENT: &'static str = "ambientColor";
    pub const DIRECTIONAL_SLOTS: [&'static str; 3] = ["directionalLight1", "directionalLight2", "directionalLight3"];
    pub const POINT_SLOTS: [&'static str; 2] = ["pointLight1", "pointLight2"];

    /// The sun: first directional slot, also the shadow caster.
    pub fn sun(&self) -> &Light {
        &self.directional[0]
    }

    pub fn sun_mut(&mut self) -> &mut Light {
        &mut self.directional[0]
    }

    /// Slot names paired with their lights.
    pub fn slots(&self) -> impl Iterator<Item = (&'static str, &Light)> {
        Self::DIRECTIONAL_SLOTS
            .into_iter()
            .zip(self.directional.iter())
            .chain(Self::POINT_SLOTS.into_iter().zip(self.point.iter()))
    }

    /// Mutable access by slot name, for overlays and scripted motion.
    pub fn light_mut(&mut self, name: &str) -> Option<&mut Light> {
        if let Some(i) = Self::DIRECTIONAL_SLOTS.iter().position(|slot| *slot == name) {
            return self.directional.get_mut(i);
        }
        let i = Self::POINT_SLOTS.iter().position(|slot| *slot == name)?;
        self.point.get_mut(i)
    }

    /// Pushes the ambient color and every slot by name.
    pub fn apply(&self, sink: &mut dyn ShaderParameterSink) {
        sink.set_float3(Self::AMBIENT, self.ambient_color.into());
        for (name, light) in self.slots() {
            sink.set_data(name, bytemuck::bytes_of(light));
        }
    }

    /// Swings the sun around the world Y axis, keeping its elevation.
    pub fn orbit_sun(&mut self, angle: f32) {
        let sun = self.sun_mut();
        let direction = Vector3::from(sun.direction);
        let horizontal = (direction.x * direction.x + direction.z * direction.z).sqrt();
        let (sin, cos) = angle.sin_cos();
        let rotated = Vector3::new(horizontal * sin, direction.y, horizontal * cos);
        if rotated.magnitude2() > 0.0 {
            sun.direction = rotated.normalize().into();
        }
    }
}

impl SceneLighting {
    /// Reference rig: a warm sun, two dim fill lights and two point lights.
    pub fn reference(ambient_color: [f32; 3]) -> Self {
        Self {
            ambient_color,
            directional: [
                Light::directional(Vector3::new(0.4, -1.0, 0.6), [1.0, 0.95, 0.85], 1.0),
                Light::directional(Vector3::new(-1.0, -0.25, 0.0), [0.3, 0.35, 0.6], 0.4),
                Light::directional(Vector3::new(0.0, 0.5, -1.0), [0.4, 0.25, 0.2], 0.25),
            ],
            point: [
                Light::point(Vector3::new(-3.0, 1.5, 0.0), 6.0, [1.0, 0.3, 0.2], 1.0),
                Light::point(Vector3::new(3.0, 1.5, 2.0), 6.0, [0.2, 0.5, 1.0], 1.0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct CapturingSink {
        data: HashMap<String, Vec<u8>>,
    }

    impl ShaderParameterSink for CapturingSink {
        fn set_data(&mut self, name: &str, data: &[u8]) -> bool {
            self.data.insert(name.to_owned(), data.to_vec());
            true
        }

        fn set_shader_resource_view(&mut self, _: &str, _: crate::gfx::device::ShaderResourceView) -> bool {
            false
        }

        fn set_sampler_state(&mut self, _: &str, _: crate::gfx::device::SamplerState) -> bool {
            false
        }
    }

    #[test]
    fn test_light_layout() {
        assert_eq!(std::mem::size_of::<Light>(), 64);
        assert_eq!(std::mem::offset_of!(Light, direction), 4);
        assert_eq!(std::mem::offset_of!(Light, range), 16);
        assert_eq!(std::mem::offset_of!(Light, position), 20);
        assert_eq!(std::mem::offset_of!(Light, intensity), 32);
        assert_eq!(std::mem::offset_of!(Light, color), 36);
        assert_eq!(std::mem::offset_of!(Light, spot_falloff), 48);
        assert_eq!(std::mem::offset_of!(Light, padding), 52);
    }

    #[test]
    fn test_constructors_tag_type() {
        let sun = Light::directional(Vector3::new(0.0, -2.0, 0.0), [1.0; 3], 1.0);
        assert_eq!(sun.kind(), Some(LightType::Directional));
        assert_eq!(sun.direction, [0.0, -1.0, 0.0]);

        let lamp = Light::point(Vector3::new(1.0, 2.0, 3.0), 5.0, [1.0; 3], 2.0);
        assert_eq!(lamp.kind(), Some(LightType::Point));
        assert_eq!(lamp.position, [1.0, 2.0, 3.0]);

        let spot = Light::spot(Vector3::new(0.0, 0.0, 0.0), Vector3::unit_z(), 10.0, 8.0, [1.0; 3], 1.0);
        assert_eq!(spot.kind(), Some(LightType::Spot));
    }

    #[test]
    fn test_zero_direction_points_down() {
        let sun = Light::directional(Vector3::new(0.0, 0.0, 0.0), [1.0; 3], 1.0);
        assert_eq!(sun.direction, [0.0, -1.0, 0.0]);

        let spot = Light::spot(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.0, 0.0), 10.0, 8.0, [1.0; 3], 1.0);
        assert!(spot.direction.iter().all(|c| c.is_finite()));
        assert_eq!(spot.direction, [0.0, -1.0, 0.0]);
        assert!(spot.spot_term(Vector3::unit_y()).is_finite());
    }

    #[test]
    fn test_attenuation_reaches_zero_at_range() {
        let lamp = Light::point(Vector3::new(0.0, 0.0, 0.0), 4.0, [1.0; 3], 1.0);
        assert_eq!(lamp.attenuate(0.0), 1.0);
        assert!((lamp.attenuate(2.0) - 0.5625).abs() < 1e-6);
        assert_eq!(lamp.attenuate(4.0), 0.0);
        assert_eq!(lamp.attenuate(10.0), 0.0);
    }

    #[test]
    fn test_spot_term_is_strongest_on_axis() {
        let spot = Light::spot(Vector3::new(0.0, 0.0, 0.0), Vector3::unit_z(), 10.0, 8.0, [1.0; 3], 1.0);
        let on_axis = spot.spot_term(-Vector3::unit_z());
        let off_axis = spot.spot_term(Vector3::new(0.5, 0.0, -1.0));
        assert!((on_axis - 1.0).abs() < 1e-6);
        assert!(off_axis < on_axis);
        assert_eq!(spot.spot_term(Vector3::unit_z()), 0.0);
    }

    #[test]
    fn test_apply_pushes_every_slot_by_name() {
        let lighting = SceneLighting::reference([0.1, 0.2, 0.3]);
        let mut sink = CapturingSink::default();
        lighting.apply(&mut sink);

        assert_eq!(sink.data.len(), 6);
        assert_eq!(
            sink.data.get("pointLight2").map(Vec::as_slice),
            Some(bytemuck::bytes_of(&lighting.point[1]))
        );
        assert_eq!(
            sink.data.get("ambientColor").map(Vec::as_slice),
            Some(bytemuck::cast_slice::<f32, u8>(&[0.1, 0.2, 0.3]))
        );
    }

    #[test]
    fn test_light_mut_by_name() {
        let mut lighting = SceneLighting::reference([0.0; 3]);
        lighting.light_mut("pointLight1").unwrap().color = [0.0, 1.0, 0.0];
        assert_eq!(lighting.point[0].color, [0.0, 1.0, 0.0]);
        assert!(lighting.light_mut("pointLight9").is_none());
    }

    #[test]
    fn test_orbit_keeps_elevation() {
        let mut lighting = SceneLighting::reference([0.0; 3]);
        let before = lighting.sun().direction;
        lighting.orbit_sun(1.0);
        let after = lighting.sun().direction;

        assert!((before[1] - after[1]).abs() < 1e-5);
        assert_ne!(before, after);
    }
}
