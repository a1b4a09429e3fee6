//! Free-fly camera: WASD along the view axes, Q/E along world Y, drag to look.

use std::f32::consts::FRAC_PI_2;

use cgmath::{Matrix4, Point3, Rad, SquareMatrix, Vector3};

use super::{camera_controller::CameraController, Camera};
use crate::config::CameraConfig;
use crate::gfx::math::{look_to_lh, perspective_fov_lh};
use crate::gfx::transform::Transform;
use crate::input::Input;

/// Keeps forward off the world-up axis of the view construction.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub transform: Transform,
    pub controller: CameraController,
    aspect_ratio: f32,
    fov_y: Rad<f32>,
    near: f32,
    far: f32,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl FlyCamera {
    pub fn new(aspect_ratio: f32, config: &CameraConfig) -> Self {
        let start = config.start_position;
        let mut camera = Self {
            transform: Transform::from_position(start.x, start.y, start.z),
            controller: CameraController::new(config.move_speed, config.look_speed),
            aspect_ratio,
            fov_y: config.fov_y,
            near: config.near,
            far: config.far,
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        };
        camera.update_projection_matrix(aspect_ratio);
        camera.update_view_matrix();
        camera
    }

    /// Applies this frame's input, then rebuilds the view matrix.
    ///
    /// Call once per frame; pointer deltas are not consumed here, so a second
    /// call in the same frame applies them again.
    pub fn update(&mut self, dt: f32, input: &Input) {
        let motion = self.controller.motion(input, dt);

        if motion.relative != Vector3::new(0.0, 0.0, 0.0) {
            self.transform
                .move_relative(motion.relative.x, motion.relative.y, motion.relative.z);
        }
        if motion.vertical != 0.0 {
            self.transform.move_absolute(0.0, motion.vertical, 0.0);
        }
        if motion.pitch != 0.0 || motion.yaw != 0.0 {
            self.transform.rotate(motion.pitch, motion.yaw, 0.0);
            let rotation = self.transform.rotation();
            let pitch = rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
            if pitch != rotation.x {
                self.transform.set_rotation(pitch, rotation.y, rotation.z);
            }
        }

        self.update_view_matrix();
    }

    pub fn update_view_matrix(&mut self) {
        let position = self.transform.position();
        self.view = look_to_lh(
            Point3::new(position.x, position.y, position.z),
            self.transform.forward(),
            Vector3::unit_y(),
        );
    }

    /// Rebuilds the projection. Only needed when the surface is resized.
    pub fn update_projection_matrix(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.projection = perspective_fov_lh(self.fov_y, aspect_ratio, self.near, self.far);
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }
}

impl Camera for FlyCamera {
    fn view_matrix(&self) -> Matrix4<f32> {
        self.view
    }

    fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection
    }

    fn position(&self) -> Point3<f32> {
        let p = self.transform.position();
        Point3::new(p.x, p.y, p.z)
    }
}
