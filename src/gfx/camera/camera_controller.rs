use cgmath::Vector3;
use winit::{event::MouseButton, keyboard::KeyCode};

use crate::input::Input;

/// Which inputs drive the fly camera.
#[derive(Debug, Clone)]
pub struct CameraBindings {
    pub forward: KeyCode,
    pub back: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    /// World up, independent of where the camera looks.
    pub rise: KeyCode,
    pub sink: KeyCode,
    /// Held to turn pointer motion into look rotation.
    pub look: MouseButton,
}

impl Default for CameraBindings {
    fn default() -> Self {
        Self {
            forward: KeyCode::KeyW,
            back: KeyCode::KeyS,
            left: KeyCode::KeyA,
            right: KeyCode::KeyD,
            rise: KeyCode::KeyQ,
            sink: KeyCode::KeyE,
            look: MouseButton::Left,
        }
    }
}

/// Movement requested for one frame, already scaled by speed and delta time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMotion {
    /// Along the camera's own axes (x right, z forward).
    pub relative: Vector3<f32>,
    /// Along the world Y axis.
    pub vertical: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Default for CameraMotion {
    fn default() -> Self {
        Self {
            relative: Vector3::new(0.0, 0.0, 0.0),
            vertical: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraController {
    pub move_speed: f32,
    pub look_speed: f32,
    pub bindings: CameraBindings,
}

impl CameraController {
    pub fn new(move_speed: f32, look_speed: f32) -> Self {
        Self {
            move_speed,
            look_speed,
            bindings: CameraBindings::default(),
        }
    }

    /// Polls the input state for this frame's motion.
    pub fn motion(&self, input: &Input, dt: f32) -> CameraMotion {
        let step = self.move_speed * dt;
        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut value = 0.0;
            if input.key_down(positive) {
                value += step;
            }
            if input.key_down(negative) {
                value -= step;
            }
            value
        };

        let b = &self.bindings;
        let mut motion = CameraMotion {
            relative: Vector3::new(axis(b.right, b.left), 0.0, axis(b.forward, b.back)),
            vertical: axis(b.rise, b.sink),
            ..Default::default()
        };

        if input.mouse_down(b.look) {
            let delta = input.mouse_delta();
            motion.pitch = delta.y * dt * self.look_speed;
            motion.yaw = delta.x * dt * self.look_speed;
        }

        motion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_input_no_motion() {
        let controller = CameraController::new(5.0, 1.0);
        assert_eq!(controller.motion(&Input::new(), 0.016), CameraMotion::default());
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let controller = CameraController::new(5.0, 1.0);
        let mut input = Input::new();
        input.set_key(KeyCode::KeyW, true);
        input.set_key(KeyCode::KeyS, true);
        input.set_key(KeyCode::KeyD, true);

        let motion = controller.motion(&input, 0.5);
        assert_eq!(motion.relative, Vector3::new(2.5, 0.0, 0.0));
    }

    #[test]
    fn test_look_requires_button() {
        let controller = CameraController::new(5.0, 2.0);
        let mut input = Input::new();
        input.move_pointer_to(0.0, 0.0);
        input.move_pointer_to(10.0, 4.0);

        assert_eq!(controller.motion(&input, 0.5).yaw, 0.0);

        input.set_mouse_button(MouseButton::Left, true);
        let motion = controller.motion(&input, 0.5);
        assert_eq!(motion.yaw, 10.0);
        assert_eq!(motion.pitch, 4.0);
    }
}
