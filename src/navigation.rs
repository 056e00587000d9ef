//! Per-frame camera navigation.
//!
//! Every frame the controller reads the polled [`InputState`] snapshot once,
//! integrates held-key movement along the camera's basis vectors, and advances
//! the orbit look with exponential velocity damping. Nothing here reacts to
//! events directly.

use crate::camera::Camera;
use crate::input::InputState;

/// Pitch is clamped just shy of straight up/down to keep the look-to basis
/// well defined.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Tunables for movement and orbit feel.
#[derive(Clone, Debug)]
pub struct NavigationConfig {
    /// Movement speed in world units per second.
    pub move_speed: f32,
    /// Radians of orbit per pixel of drag.
    pub orbit_sensitivity: f32,
    /// Fraction of orbit velocity retained after one second.
    pub orbit_damping: f32,
    /// Dolly distance per scroll line.
    pub zoom_step: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            orbit_sensitivity: 0.005,
            orbit_damping: 0.0001,
            zoom_step: 0.8,
        }
    }
}

/// Navigation controller: held-key movement plus damped orbit look.
#[derive(Clone, Debug, Default)]
pub struct Navigation {
    pub config: NavigationConfig,
    /// Residual orbit velocity in radians/second (yaw, pitch).
    yaw_velocity: f32,
    pitch_velocity: f32,
}

impl Navigation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame: integrate movement from held keys, apply drag to the
    /// orbit velocity, and decay the velocity toward rest.
    pub fn tick(&mut self, camera: &mut Camera, input: &mut InputState, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        // Held-key movement along the camera basis. Forward stays on the
        // ground plane so walking never changes altitude; E/Q lift does.
        let forward = camera.forward();
        let flat_forward = glam::Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let right = camera.right();

        let step = self.config.move_speed * dt;
        camera.position += flat_forward * input.advance_axis() * step;
        camera.position += right * input.strafe_axis() * step;
        camera.position.y += input.lift_axis() * step;

        // Scroll dollies along the true forward direction.
        let scroll = input.take_scroll();
        if scroll != 0.0 {
            camera.position += forward * scroll * self.config.zoom_step;
        }

        // Drag contributes orbit velocity; velocity decays exponentially so a
        // released drag coasts to a stop.
        let (dx, dy) = input.take_drag();
        if dx != 0.0 || dy != 0.0 {
            self.yaw_velocity = dx * self.config.orbit_sensitivity / dt;
            self.pitch_velocity = -dy * self.config.orbit_sensitivity / dt;
        }

        camera.yaw += self.yaw_velocity * dt;
        camera.pitch = (camera.pitch + self.pitch_velocity * dt).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let decay = self.config.orbit_damping.powf(dt);
        self.yaw_velocity *= decay;
        self.pitch_velocity *= decay;
        if self.yaw_velocity.abs() < 1e-4 {
            self.yaw_velocity = 0.0;
        }
        if self.pitch_velocity.abs() < 1e-4 {
            self.pitch_velocity = 0.0;
        }
    }

    /// Whether orbit inertia is still carrying the camera.
    pub fn is_coasting(&self) -> bool {
        self.yaw_velocity != 0.0 || self.pitch_velocity != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::event::ElementState;
    use winit::keyboard::KeyCode;

    #[test]
    fn test_forward_key_moves_on_ground_plane() {
        let mut camera = Camera::default();
        camera.pitch = 0.5; // Looking up must not make walking climb.
        let start = camera.position;
        let mut input = InputState::new();
        input.on_key(KeyCode::KeyW, ElementState::Pressed);

        let mut nav = Navigation::new();
        nav.tick(&mut camera, &mut input, 0.1);

        assert!((camera.position.y - start.y).abs() < 1e-6);
        assert!((camera.position - start).length() > 0.0);
    }

    #[test]
    fn test_no_input_no_motion() {
        let mut camera = Camera::default();
        let start = camera.position;
        let mut input = InputState::new();
        let mut nav = Navigation::new();
        nav.tick(&mut camera, &mut input, 0.016);
        assert_eq!(camera.position, start);
        assert!(!nav.is_coasting());
    }

    #[test]
    fn test_orbit_coasts_then_damps_out() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        input.on_mouse_button(winit::event::MouseButton::Left, ElementState::Pressed);
        input.on_cursor_moved(0.0, 0.0);
        input.on_cursor_moved(40.0, 0.0);

        let mut nav = Navigation::new();
        nav.tick(&mut camera, &mut input, 0.016);
        let yaw_after_drag = camera.yaw;
        assert!(yaw_after_drag != 0.0);
        assert!(nav.is_coasting());

        // Coast with no further drag: yaw keeps moving, then settles.
        nav.tick(&mut camera, &mut input, 0.016);
        assert!(camera.yaw != yaw_after_drag);
        for _ in 0..600 {
            nav.tick(&mut camera, &mut input, 0.016);
        }
        assert!(!nav.is_coasting());
    }

    #[test]
    fn test_pitch_clamped() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        input.on_mouse_button(winit::event::MouseButton::Left, ElementState::Pressed);
        input.on_cursor_moved(0.0, 0.0);
        input.on_cursor_moved(0.0, -10000.0);

        let mut nav = Navigation::new();
        for _ in 0..100 {
            nav.tick(&mut camera, &mut input, 0.016);
        }
        assert!(camera.pitch <= PITCH_LIMIT);
    }
}
