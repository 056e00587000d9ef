//! Light rig: ambient term, one directional light, and shadow configuration.
//!
//! The directional light's position is always a pure function of its
//! direction/elevation angles and a fixed distance; it is never set directly.
//! The rig also owns the shadow buffer slot: changing the shadow map
//! resolution or filtering algorithm disposes the buffer and flags a rebuild,
//! because shadow buffers are not resizable in place. The GPU layer consults
//! the slot each frame and must never sample a disposed buffer.
//!
//! This component raises no errors; numeric clamping is the UI layer's job.

use bytemuck::{Pod, Zeroable};

/// Fixed distance of the directional light from the origin, in world units.
pub const LIGHT_DISTANCE: f32 = 10.0;

/// Shadow-edge filtering algorithm. The discriminants are the wire encoding
/// used by the settings record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowAlgorithm {
    /// Hard shadows, single depth compare.
    Basic = 0,
    /// Percentage-closer filtering.
    Pcf = 1,
    /// PCF with randomized soft taps.
    PcfSoft = 2,
    /// Variance shadow map.
    Vsm = 3,
}

impl ShadowAlgorithm {
    pub fn from_index(i: u32) -> Self {
        match i {
            1 => ShadowAlgorithm::Pcf,
            2 => ShadowAlgorithm::PcfSoft,
            3 => ShadowAlgorithm::Vsm,
            _ => ShadowAlgorithm::Basic,
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Descriptor of the currently allocated shadow buffer.
///
/// The actual GPU texture lives in the renderer; this slot records what was
/// allocated so a stale buffer can be detected and destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowMap {
    pub size: u32,
    pub algorithm: ShadowAlgorithm,
}

/// Shadow configuration owned by the light rig.
#[derive(Clone, Debug)]
pub struct ShadowConfig {
    pub enabled: bool,
    pub algorithm: ShadowAlgorithm,
    /// Shadow map resolution in texels (power of two).
    pub map_size: u32,
    pub bias: f32,
    pub normal_bias: f32,
    /// Softening radius for the filtered algorithms.
    pub radius: f32,
    /// Half-extent of the orthographic shadow camera's projection box.
    pub camera_extent: f32,
    /// Currently allocated buffer, if any.
    pub map: Option<ShadowMap>,
    /// Set when the buffer must be reconstructed before the next render.
    pub needs_rebuild: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: ShadowAlgorithm::Pcf,
            map_size: 2048,
            bias: -0.0005,
            normal_bias: 0.02,
            radius: 4.0,
            camera_extent: 15.0,
            map: None,
            needs_rebuild: true,
        }
    }
}

/// A whole shadow settings block, applied atomically so that a change to both
/// resolution and algorithm costs a single rebuild.
#[derive(Clone, Copy, Debug)]
pub struct ShadowBlock {
    pub enabled: bool,
    pub algorithm: ShadowAlgorithm,
    pub map_size: u32,
    pub bias: f32,
    pub normal_bias: f32,
    pub radius: f32,
    pub camera_extent: f32,
}

/// Ambient light term.
#[derive(Clone, Debug)]
pub struct AmbientLight {
    /// RGB color, 0-1 range.
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 0.4,
        }
    }
}

/// The single directional light.
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    /// RGB color, 0-1 range.
    pub color: [f32; 3],
    pub intensity: f32,
    /// Azimuth angle in degrees.
    pub direction_deg: f32,
    /// Elevation angle in degrees.
    pub elevation_deg: f32,
    /// World position, derived from the angles. Never mutated directly.
    position: [f32; 3],
}

impl Default for DirectionalLight {
    fn default() -> Self {
        let mut light = Self {
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            direction_deg: 45.0,
            elevation_deg: 45.0,
            position: [0.0; 3],
        };
        light.recompute_position();
        light
    }
}

impl DirectionalLight {
    /// position = distance * (sin d * cos e, sin e, cos d * cos e)
    fn recompute_position(&mut self) {
        let d = self.direction_deg.to_radians();
        let e = self.elevation_deg.to_radians();
        self.position = [
            LIGHT_DISTANCE * d.sin() * e.cos(),
            LIGHT_DISTANCE * e.sin(),
            LIGHT_DISTANCE * d.cos() * e.cos(),
        ];
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }
}

/// Ambient plus directional light with shadow state. Created once at startup
/// and mutated only through its setters for the rest of the session.
#[derive(Clone, Debug, Default)]
pub struct LightRig {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    pub shadow: ShadowConfig,
}

impl LightRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ambient_color(&mut self, color: [f32; 3]) {
        self.ambient.color = color;
    }

    pub fn set_ambient_intensity(&mut self, intensity: f32) {
        self.ambient.intensity = intensity;
    }

    pub fn set_directional_color(&mut self, color: [f32; 3]) {
        self.directional.color = color;
    }

    pub fn set_directional_intensity(&mut self, intensity: f32) {
        self.directional.intensity = intensity;
    }

    /// Set the azimuth angle in degrees and recompute the derived position.
    pub fn set_direction(&mut self, deg: f32) {
        self.directional.direction_deg = deg;
        self.directional.recompute_position();
    }

    /// Set the elevation angle in degrees and recompute the derived position.
    pub fn set_elevation(&mut self, deg: f32) {
        self.directional.elevation_deg = deg;
        self.directional.recompute_position();
    }

    pub fn set_shadows_enabled(&mut self, enabled: bool) {
        self.shadow.enabled = enabled;
    }

    /// Change the filtering algorithm. Disposes the current buffer and forces
    /// a rebuild on the next frame.
    pub fn set_shadow_algorithm(&mut self, algorithm: ShadowAlgorithm) {
        self.shadow.algorithm = algorithm;
        self.invalidate_shadow_map();
    }

    /// Change the map resolution. Disposes the current buffer and forces a
    /// rebuild on the next frame.
    pub fn set_shadow_resolution(&mut self, size: u32) {
        self.shadow.map_size = size;
        self.invalidate_shadow_map();
    }

    // Bias, normal bias, radius and frustum extent apply without a rebuild.

    pub fn set_shadow_bias(&mut self, bias: f32) {
        self.shadow.bias = bias;
    }

    pub fn set_shadow_normal_bias(&mut self, bias: f32) {
        self.shadow.normal_bias = bias;
    }

    pub fn set_shadow_radius(&mut self, radius: f32) {
        self.shadow.radius = radius;
    }

    pub fn set_shadow_camera_extent(&mut self, extent: f32) {
        self.shadow.camera_extent = extent;
    }

    /// Apply a full shadow block with at most one rebuild.
    pub fn apply_shadow_block(&mut self, block: ShadowBlock) {
        let rebuild =
            block.map_size != self.shadow.map_size || block.algorithm != self.shadow.algorithm;
        self.shadow.algorithm = block.algorithm;
        self.shadow.map_size = block.map_size;
        self.shadow.bias = block.bias;
        self.shadow.normal_bias = block.normal_bias;
        self.shadow.radius = block.radius;
        self.shadow.camera_extent = block.camera_extent;
        if rebuild {
            self.invalidate_shadow_map();
        }
        self.shadow.enabled = block.enabled;
    }

    /// The recovery procedure after a resize/type change: drop the buffer,
    /// flag the rebuild, and cycle the shadow system off-then-on so the next
    /// frame reconstructs from scratch.
    fn invalidate_shadow_map(&mut self) {
        self.shadow.map = None;
        self.shadow.needs_rebuild = true;
        let was_enabled = self.shadow.enabled;
        self.shadow.enabled = false;
        self.shadow.enabled = was_enabled;
    }

    /// Called by the renderer once it has reconstructed the buffer.
    pub fn shadow_map_rebuilt(&mut self) {
        self.shadow.map = Some(ShadowMap {
            size: self.shadow.map_size,
            algorithm: self.shadow.algorithm,
        });
        self.shadow.needs_rebuild = false;
    }

    /// Evaluate the rig into GPU-ready uniforms.
    pub fn to_uniforms(&self) -> LightingUniforms {
        let p = self.directional.position();
        let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        // Direction points FROM the surface TOWARD the light.
        let to_light = if len > 1e-4 {
            [p[0] / len, p[1] / len, p[2] / len, 0.0]
        } else {
            [0.0, 1.0, 0.0, 0.0]
        };
        LightingUniforms {
            light_direction: to_light,
            light_color: [
                self.directional.color[0],
                self.directional.color[1],
                self.directional.color[2],
                1.0,
            ],
            ambient_color: [
                self.ambient.color[0],
                self.ambient.color[1],
                self.ambient.color[2],
                1.0,
            ],
            light_intensity: self.directional.intensity,
            ambient_intensity: self.ambient.intensity,
            shadow_bias: self.shadow.bias,
            shadow_normal_bias: self.shadow.normal_bias,
            shadow_radius: self.shadow.radius,
            shadows_enabled: if self.shadow.enabled { 1 } else { 0 },
            _padding: [0; 2],
        }
    }
}

/// GPU-ready lighting uniforms, laid out for direct upload to a uniform
/// buffer. Total size: 80 bytes (16-byte aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightingUniforms {
    /// Normalized direction toward the light (xyz), w unused.
    pub light_direction: [f32; 4], // 16 bytes
    /// Directional light color (rgb), a = 1.
    pub light_color: [f32; 4], // 16 bytes
    /// Ambient color (rgb), a = 1.
    pub ambient_color: [f32; 4], // 16 bytes
    pub light_intensity: f32,   // 4 bytes
    pub ambient_intensity: f32, // 4 bytes
    pub shadow_bias: f32,       // 4 bytes
    pub shadow_normal_bias: f32, // 4 bytes
    pub shadow_radius: f32,      // 4 bytes
    /// Whether shadows are sampled (0 or 1).
    pub shadows_enabled: u32, // 4 bytes
    pub _padding: [u32; 2], // 8 bytes
} // Total: 80 bytes

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_position_at_zero_angles() {
        let mut rig = LightRig::new();
        rig.set_direction(0.0);
        rig.set_elevation(0.0);
        assert_vec3_close(rig.directional.position(), [0.0, 0.0, 10.0]);
    }

    #[test]
    fn test_position_at_direction_90() {
        let mut rig = LightRig::new();
        rig.set_direction(90.0);
        rig.set_elevation(0.0);
        assert_vec3_close(rig.directional.position(), [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_position_at_elevation_90_ignores_direction() {
        for dir in [0.0, 37.0, 90.0, 245.0] {
            let mut rig = LightRig::new();
            rig.set_direction(dir);
            rig.set_elevation(90.0);
            assert_vec3_close(rig.directional.position(), [0.0, 10.0, 0.0]);
        }
    }

    #[test]
    fn test_resolution_change_disposes_map() {
        let mut rig = LightRig::new();
        rig.shadow_map_rebuilt();
        assert!(rig.shadow.map.is_some());
        assert!(!rig.shadow.needs_rebuild);

        rig.set_shadow_resolution(4096);
        assert!(rig.shadow.map.is_none());
        assert!(rig.shadow.needs_rebuild);
        assert!(rig.shadow.enabled);

        rig.shadow_map_rebuilt();
        assert_eq!(rig.shadow.map.unwrap().size, 4096);
    }

    #[test]
    fn test_algorithm_change_disposes_map() {
        let mut rig = LightRig::new();
        rig.shadow_map_rebuilt();
        rig.set_shadow_algorithm(ShadowAlgorithm::Vsm);
        assert!(rig.shadow.map.is_none());
        assert!(rig.shadow.needs_rebuild);
    }

    #[test]
    fn test_soft_params_do_not_rebuild() {
        let mut rig = LightRig::new();
        rig.shadow_map_rebuilt();
        rig.set_shadow_bias(-0.001);
        rig.set_shadow_normal_bias(0.05);
        rig.set_shadow_radius(8.0);
        rig.set_shadow_camera_extent(30.0);
        assert!(rig.shadow.map.is_some());
        assert!(!rig.shadow.needs_rebuild);
    }

    #[test]
    fn test_shadow_block_single_rebuild() {
        let mut rig = LightRig::new();
        rig.shadow_map_rebuilt();
        rig.apply_shadow_block(ShadowBlock {
            enabled: true,
            algorithm: ShadowAlgorithm::Vsm,
            map_size: 1024,
            bias: -0.001,
            normal_bias: 0.01,
            radius: 2.0,
            camera_extent: 20.0,
        });
        assert!(rig.shadow.needs_rebuild);
        assert!(rig.shadow.map.is_none());

        // Re-applying an identical block must not invalidate anything.
        rig.shadow_map_rebuilt();
        rig.apply_shadow_block(ShadowBlock {
            enabled: true,
            algorithm: ShadowAlgorithm::Vsm,
            map_size: 1024,
            bias: -0.001,
            normal_bias: 0.01,
            radius: 2.0,
            camera_extent: 20.0,
        });
        assert!(!rig.shadow.needs_rebuild);
        assert!(rig.shadow.map.is_some());
    }

    #[test]
    fn test_algorithm_wire_encoding() {
        for i in 0..4 {
            assert_eq!(ShadowAlgorithm::from_index(i).index(), i);
        }
        assert_eq!(ShadowAlgorithm::from_index(99), ShadowAlgorithm::Basic);
    }

    #[test]
    fn test_uniforms_point_toward_light() {
        let mut rig = LightRig::new();
        rig.set_direction(0.0);
        rig.set_elevation(0.0);
        let u = rig.to_uniforms();
        assert!((u.light_direction[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 80);
    }
}
