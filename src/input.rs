//! Keyboard and pointer state polled once per frame.

use std::collections::HashSet;

use cgmath::Vector2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks input state for keyboard and mouse.
#[derive(Debug, Clone)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    mouse_buttons_down: HashSet<MouseButton>,
    mouse_position: Vector2<f32>,
    mouse_delta: Vector2<f32>,
    scroll_delta: f32,
    has_position: bool,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            keys_down: HashSet::new(),
            keys_pressed: HashSet::new(),
            mouse_buttons_down: HashSet::new(),
            mouse_position: Vector2::new(0.0, 0.0),
            mouse_delta: Vector2::new(0.0, 0.0),
            scroll_delta: 0.0,
            has_position: false,
        }
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets per-frame deltas. Call after the frame has consumed them.
    pub fn end_frame(&mut self) {
        self.keys_pressed.clear();
        self.mouse_delta = Vector2::new(0.0, 0.0);
        self.scroll_delta = 0.0;
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.set_key(key, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_mouse_button(*button, *state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.move_pointer_to(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered while unfocused
                self.keys_down.clear();
                self.mouse_buttons_down.clear();
            }
            _ => {}
        }
    }

    pub fn set_key(&mut self, key: KeyCode, down: bool) {
        if down {
            if self.keys_down.insert(key) {
                self.keys_pressed.insert(key);
            }
        } else {
            self.keys_down.remove(&key);
        }
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, down: bool) {
        if down {
            self.mouse_buttons_down.insert(button);
        } else {
            self.mouse_buttons_down.remove(&button);
        }
    }

    /// Moves the pointer, accumulating the delta since the last frame.
    pub fn move_pointer_to(&mut self, x: f32, y: f32) {
        let new_position = Vector2::new(x, y);
        // The first reported position is a jump, not a motion.
        if self.has_position {
            self.mouse_delta += new_position - self.mouse_position;
        }
        self.mouse_position = new_position;
        self.has_position = true;
    }

    /// Returns true if the key is currently held down.
    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key went down this frame.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_down.contains(&button)
    }

    /// Current pointer position in window coordinates.
    pub fn mouse_position(&self) -> Vector2<f32> {
        self.mouse_position
    }

    /// Pointer movement this frame.
    pub fn mouse_delta(&self) -> Vector2<f32> {
        self.mouse_delta
    }

    /// Wheel movement this frame, in lines.
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_delta_accumulates_until_end_frame() {
        let mut input = Input::new();
        input.move_pointer_to(100.0, 100.0);
        assert_eq!(input.mouse_delta(), Vector2::new(0.0, 0.0));

        input.move_pointer_to(110.0, 95.0);
        input.move_pointer_to(115.0, 90.0);
        assert_eq!(input.mouse_delta(), Vector2::new(15.0, -10.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), Vector2::new(0.0, 0.0));
        assert_eq!(input.mouse_position(), Vector2::new(115.0, 90.0));
    }

    #[test]
    fn test_key_pressed_is_edge_triggered() {
        let mut input = Input::new();
        input.set_key(KeyCode::KeyW, true);
        assert!(input.key_down(KeyCode::KeyW));
        assert!(input.key_pressed(KeyCode::KeyW));

        input.end_frame();
        input.set_key(KeyCode::KeyW, true);
        assert!(input.key_down(KeyCode::KeyW));
        assert!(!input.key_pressed(KeyCode::KeyW));

        input.set_key(KeyCode::KeyW, false);
        assert!(!input.key_down(KeyCode::KeyW));
    }

    #[test]
    fn test_mouse_buttons() {
        let mut input = Input::new();
        input.set_mouse_button(MouseButton::Left, true);
        assert!(input.mouse_down(MouseButton::Left));
        assert!(!input.mouse_down(MouseButton::Right));
        input.set_mouse_button(MouseButton::Left, false);
        assert!(!input.mouse_down(MouseButton::Left));
    }
}
