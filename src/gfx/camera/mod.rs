pub mod camera_controller;
pub mod fly_camera;

use cgmath::{Matrix4, Point3};

pub use camera_controller::{CameraBindings, CameraController};
pub use fly_camera::FlyCamera;

/// Anything that can supply the per-draw view data.
pub trait Camera {
    fn view_matrix(&self) -> Matrix4<f32>;
    fn projection_matrix(&self) -> Matrix4<f32>;
    fn position(&self) -> Point3<f32>;
}
