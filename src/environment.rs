//! Environment map state.
//!
//! At most one equirectangular HDR map is active at a time; loading a new one
//! retires the previous. Intensity and Y-axis rotation are independent scalar
//! controls applied after load. The background toggle only swaps what is
//! visible behind the scene (flat color vs. the map); reflection contribution
//! is unaffected by it.

use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::error::ViewerError;

/// Scalar controls for the active environment map.
#[derive(Clone, Debug)]
pub struct EnvironmentSettings {
    /// Reflection/ambient contribution multiplier.
    pub intensity: f32,
    /// Rotation around the Y axis, in degrees.
    pub rotation_deg: f32,
    /// When true and a map is loaded, the map is the visible backdrop.
    pub use_background: bool,
    /// Flat backdrop color (linear RGB) used when the map is not shown.
    pub background_color: [f32; 3],
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            rotation_deg: 0.0,
            use_background: false,
            background_color: [0.12, 0.12, 0.14],
        }
    }
}

impl EnvironmentSettings {
    /// Rotation in radians, as consumed by the GPU.
    pub fn rotation_radians(&self) -> f32 {
        self.rotation_deg.to_radians()
    }

    pub fn to_uniforms(&self, map_loaded: bool) -> EnvironmentUniforms {
        EnvironmentUniforms {
            background_color: [
                self.background_color[0],
                self.background_color[1],
                self.background_color[2],
                1.0,
            ],
            intensity: self.intensity,
            rotation: self.rotation_radians(),
            show_map_background: if self.use_background && map_loaded { 1 } else { 0 },
            _padding: 0,
        }
    }
}

/// A decoded equirectangular HDR image: linear RGB, f32 per channel.
#[derive(Clone, Debug)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
    /// Source path or URL, for display.
    pub source: String,
}

impl EnvironmentMap {
    /// Decode a Radiance `.hdr` file into linear RGB floats.
    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let display = path.display().to_string();
        let img = image::open(path).map_err(|e| ViewerError::load(&display, e))?;
        let rgb = img.to_rgb32f();
        let (width, height) = (rgb.width(), rgb.height());
        Ok(Self {
            width,
            height,
            pixels: rgb.into_raw(),
            source: display,
        })
    }
}

/// GPU uniforms for the backdrop and environment contribution.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct EnvironmentUniforms {
    pub background_color: [f32; 4],
    pub intensity: f32,
    /// Y-axis rotation in radians.
    pub rotation: f32,
    /// 1 when the map is the visible backdrop.
    pub show_map_background: u32,
    pub _padding: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_degrees_to_radians() {
        let settings = EnvironmentSettings {
            rotation_deg: 180.0,
            ..Default::default()
        };
        assert!((settings.rotation_radians() - std::f32::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_background_requires_loaded_map() {
        let settings = EnvironmentSettings {
            use_background: true,
            ..Default::default()
        };
        assert_eq!(settings.to_uniforms(false).show_map_background, 0);
        assert_eq!(settings.to_uniforms(true).show_map_background, 1);
    }

    #[test]
    fn test_background_toggle_does_not_touch_intensity() {
        let mut settings = EnvironmentSettings::default();
        settings.intensity = 2.5;
        settings.use_background = true;
        let u = settings.to_uniforms(true);
        assert_eq!(u.intensity, 2.5);
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let err = EnvironmentMap::load(Path::new("/nonexistent/sky.hdr")).unwrap_err();
        assert!(matches!(err, ViewerError::Load { .. }));
    }
}
