//! Polled input state for the frame loop.
//!
//! Movement is never event-driven: winit events only update this snapshot,
//! and the navigation controller reads it exactly once per frame tick. Mouse
//! drag and scroll are accumulated between ticks and drained when consumed.

use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::KeyCode;

/// Held-key and pointer state, updated by window events and polled per frame.
#[derive(Clone, Debug, Default)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Whether the orbit (left) mouse button is held.
    pub orbiting: bool,
    /// Accumulated drag delta in pixels since the last frame.
    drag_delta: (f32, f32),
    /// Accumulated scroll delta (lines) since the last frame.
    scroll_delta: f32,
    /// Last observed cursor position, for drag deltas.
    last_cursor: Option<(f32, f32)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a keyboard event.
    pub fn on_key(&mut self, key: KeyCode, state: ElementState) {
        let held = state == ElementState::Pressed;
        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => self.forward = held,
            KeyCode::KeyS | KeyCode::ArrowDown => self.back = held,
            KeyCode::KeyA | KeyCode::ArrowLeft => self.left = held,
            KeyCode::KeyD | KeyCode::ArrowRight => self.right = held,
            KeyCode::KeyE => self.up = held,
            KeyCode::KeyQ => self.down = held,
            _ => {}
        }
    }

    /// Apply a mouse button event.
    pub fn on_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.orbiting = state == ElementState::Pressed;
            if !self.orbiting {
                self.last_cursor = None;
            }
        }
    }

    /// Apply a cursor-moved event, accumulating drag while orbiting.
    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        if self.orbiting {
            if let Some((lx, ly)) = self.last_cursor {
                self.drag_delta.0 += x - lx;
                self.drag_delta.1 += y - ly;
            }
        }
        self.last_cursor = Some((x, y));
    }

    /// Apply a scroll event.
    pub fn on_scroll(&mut self, delta: MouseScrollDelta) {
        self.scroll_delta += match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
        };
    }

    /// Take the accumulated drag delta, resetting it for the next frame.
    pub fn take_drag(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.drag_delta)
    }

    /// Take the accumulated scroll delta, resetting it for the next frame.
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll_delta)
    }

    /// Movement axis on the camera's right (negative = left).
    pub fn strafe_axis(&self) -> f32 {
        (self.right as i32 - self.left as i32) as f32
    }

    /// Movement axis along the camera's forward (negative = back).
    pub fn advance_axis(&self) -> f32 {
        (self.forward as i32 - self.back as i32) as f32
    }

    /// Vertical movement axis (negative = down).
    pub fn lift_axis(&self) -> f32 {
        (self.up as i32 - self.down as i32) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes_from_held_keys() {
        let mut input = InputState::new();
        input.on_key(KeyCode::KeyW, ElementState::Pressed);
        input.on_key(KeyCode::KeyA, ElementState::Pressed);
        assert_eq!(input.advance_axis(), 1.0);
        assert_eq!(input.strafe_axis(), -1.0);

        input.on_key(KeyCode::KeyW, ElementState::Released);
        assert_eq!(input.advance_axis(), 0.0);
    }

    #[test]
    fn test_drag_accumulates_only_while_orbiting() {
        let mut input = InputState::new();
        input.on_cursor_moved(10.0, 10.0);
        input.on_cursor_moved(20.0, 10.0);
        assert_eq!(input.take_drag(), (0.0, 0.0));

        input.on_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.on_cursor_moved(20.0, 10.0);
        input.on_cursor_moved(25.0, 14.0);
        assert_eq!(input.take_drag(), (5.0, 4.0));
        // Drained.
        assert_eq!(input.take_drag(), (0.0, 0.0));
    }

    #[test]
    fn test_drag_anchor_resets_on_release() {
        let mut input = InputState::new();
        input.on_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.on_cursor_moved(0.0, 0.0);
        input.on_mouse_button(MouseButton::Left, ElementState::Released);
        input.on_mouse_button(MouseButton::Left, ElementState::Pressed);
        // First move after re-press establishes a new anchor, no jump.
        input.on_cursor_moved(100.0, 100.0);
        assert_eq!(input.take_drag(), (0.0, 0.0));
    }
}
