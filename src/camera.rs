//! Perspective camera for the viewer.
//!
//! The camera is a plain state struct: position plus yaw/pitch orientation
//! and projection parameters. Navigation (per-frame movement integration and
//! orbit damping) lives in [`crate::navigation`]; this module only derives
//! matrices and basis vectors from the current state.

use glam::{Mat4, Vec3};

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV: f32 = 60.0;

/// Camera state in world space.
///
/// Orientation is yaw (around world Y) and pitch (around the camera's right
/// axis), both in radians. Roll is intentionally absent.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Eye position in world space.
    pub position: Vec3,
    /// Yaw in radians. Zero looks down -Z.
    pub yaw: f32,
    /// Pitch in radians, positive looks up.
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
    /// Viewport aspect ratio (width / height).
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            // Slightly elevated three-quarter view of the maquette.
            position: Vec3::new(6.0, 4.0, 8.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
            near: 0.1,
            far: 200.0,
            aspect: 16.0 / 9.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vertical field of view in degrees.
    pub fn set_fov(&mut self, deg: f32) {
        self.fov = deg;
    }

    /// Update the aspect ratio after a viewport resize.
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Forward direction derived from yaw/pitch.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Right direction (perpendicular to forward on the ground plane).
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Compute the view matrix from position and orientation.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Compute the projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    /// Combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera() {
        let camera = Camera::default();
        assert_eq!(camera.fov, DEFAULT_FOV);
        assert!(camera.near > 0.0);
        assert!(camera.far > camera.near);
    }

    #[test]
    fn test_forward_at_zero_orientation() {
        let camera = Camera {
            yaw: 0.0,
            pitch: 0.0,
            ..Camera::default()
        };
        let f = camera.forward();
        assert!(f.x.abs() < 1e-6);
        assert!(f.y.abs() < 1e-6);
        assert!((f.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_right_is_horizontal() {
        let camera = Camera {
            yaw: 0.7,
            pitch: 0.4,
            ..Camera::default()
        };
        let r = camera.right();
        assert!(r.y.abs() < 1e-6);
        assert!((r.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_view_matrix_places_target_in_front() {
        let camera = Camera {
            position: Vec3::new(0.0, 0.0, 10.0),
            yaw: 0.0,
            pitch: 0.0,
            ..Camera::default()
        };
        let view = camera.view_matrix();
        let origin_in_view = view.transform_point3(Vec3::ZERO);
        assert!(origin_in_view.z < 0.0);
    }

    #[test]
    fn test_set_aspect_never_zero() {
        let mut camera = Camera::default();
        camera.set_aspect(0, 0);
        assert!(camera.aspect.is_finite());
        assert!(camera.aspect > 0.0);
    }
}
