//! Post-processing chain model.
//!
//! The chain is a fixed-order, fixed-length sequence of stages:
//! base render, bloom, color correction, output. The output stage performs
//! tone mapping and color-space conversion and always runs last, after all
//! additive effects; bloom always sees pre-graded linear color. A disabled
//! stage is a passthrough, never a removal from the chain.
//!
//! The per-pixel math for color correction and for each tone-mapping curve
//! is implemented here on the CPU as the reference the WGSL shaders mirror;
//! the tests pin the identity and curve properties against these functions.
//!
//! Color correction runs in linear space before tone mapping. That order is
//! deliberate and preserved from the original pipeline.

use bytemuck::{Pod, Zeroable};

/// Perceptual luminance weights used by the saturation adjustment.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// The stages of the chain, in their fixed execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    BaseRender,
    Bloom,
    ColorCorrection,
    Output,
}

/// Fixed execution order. The base render is always first and the output
/// stage (tone map + color space) is always last.
pub const STAGE_ORDER: [StageKind; 4] = [
    StageKind::BaseRender,
    StageKind::Bloom,
    StageKind::ColorCorrection,
    StageKind::Output,
];

/// Tone-mapping curve applied by the output stage. The discriminants are the
/// wire encoding used by the settings record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToneMapping {
    None = 0,
    Linear = 1,
    Reinhard = 2,
    /// Cineon-style filmic curve.
    Filmic = 3,
    AcesFilmic = 4,
}

impl ToneMapping {
    pub fn from_index(i: u32) -> Self {
        match i {
            1 => ToneMapping::Linear,
            2 => ToneMapping::Reinhard,
            3 => ToneMapping::Filmic,
            4 => ToneMapping::AcesFilmic,
            _ => ToneMapping::None,
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Bloom stage parameters. Strength, threshold and radius are independent.
#[derive(Clone, Debug)]
pub struct BloomSettings {
    pub enabled: bool,
    pub intensity: f32,
    pub threshold: f32,
    pub radius: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 0.4,
            threshold: 0.9,
            radius: 0.5,
        }
    }
}

impl BloomSettings {
    /// Clamp parameters to ranges the GPU passes accept.
    pub fn sanitize(&self) -> Self {
        Self {
            enabled: self.enabled,
            intensity: self.intensity.max(0.0),
            threshold: self.threshold.max(0.0),
            radius: self.radius.max(0.0),
        }
    }
}

/// Color-correction stage parameters. All zero is the identity transform.
#[derive(Clone, Debug)]
pub struct ColorCorrectionSettings {
    pub enabled: bool,
    /// -1 fully desaturates, 0 is identity, positive oversaturates.
    pub saturation: f32,
    /// Rescale around the 0.5 midpoint; 0 is identity.
    pub contrast: f32,
    /// Additive offset in linear space; 0 is identity.
    pub brightness: f32,
}

impl Default for ColorCorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            saturation: 0.0,
            contrast: 0.0,
            brightness: 0.0,
        }
    }
}

impl ColorCorrectionSettings {
    /// Reference per-pixel transform. Three independent, order-fixed
    /// adjustments: additive brightness, contrast about 0.5, then saturation
    /// as an interpolation of the pixel away from its luminance.
    pub fn grade(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut c = [
            rgb[0] + self.brightness,
            rgb[1] + self.brightness,
            rgb[2] + self.brightness,
        ];
        let contrast_scale = 1.0 + self.contrast;
        for ch in &mut c {
            *ch = (*ch - 0.5) * contrast_scale + 0.5;
        }
        let luma = c[0] * LUMA_WEIGHTS[0] + c[1] * LUMA_WEIGHTS[1] + c[2] * LUMA_WEIGHTS[2];
        let sat_scale = 1.0 + self.saturation;
        [
            luma + (c[0] - luma) * sat_scale,
            luma + (c[1] - luma) * sat_scale,
            luma + (c[2] - luma) * sat_scale,
        ]
    }
}

/// Output stage parameters: tone-mapping curve plus exposure multiplier.
#[derive(Clone, Debug)]
pub struct OutputSettings {
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            tone_mapping: ToneMapping::AcesFilmic,
            exposure: 1.0,
        }
    }
}

impl OutputSettings {
    /// Reference tone-map of a single channel. Exposure multiplies before the
    /// curve for every curve except `None`, which is a strict passthrough.
    pub fn tone_map_channel(&self, x: f32) -> f32 {
        match self.tone_mapping {
            ToneMapping::None => x,
            ToneMapping::Linear => (x * self.exposure).clamp(0.0, 1.0),
            ToneMapping::Reinhard => {
                let c = (x * self.exposure).max(0.0);
                c / (1.0 + c)
            }
            ToneMapping::Filmic => {
                // Optimized Cineon fit (Hable/Hejl), maps 0 -> 0 exactly.
                let c = ((x * self.exposure) - 0.004).max(0.0);
                (c * (6.2 * c + 0.5)) / (c * (6.2 * c + 1.7) + 0.06)
            }
            ToneMapping::AcesFilmic => {
                // Narkowicz ACES approximation.
                let c = (x * self.exposure).max(0.0);
                ((c * (2.51 * c + 0.03)) / (c * (2.43 * c + 0.59) + 0.14)).clamp(0.0, 1.0)
            }
        }
    }

    /// Reference tone-map of an RGB pixel.
    pub fn tone_map(&self, rgb: [f32; 3]) -> [f32; 3] {
        [
            self.tone_map_channel(rgb[0]),
            self.tone_map_channel(rgb[1]),
            self.tone_map_channel(rgb[2]),
        ]
    }
}

/// The fixed-order chain. Stage order is structural: the fields execute in
/// [`STAGE_ORDER`] and there is no way to reorder or remove a stage.
#[derive(Clone, Debug, Default)]
pub struct PostChain {
    pub bloom: BloomSettings,
    pub color_correction: ColorCorrectionSettings,
    pub output: OutputSettings,
}

impl PostChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages that will actually transform the image this frame, in order.
    /// Output is always present and always last.
    pub fn active_stages(&self) -> Vec<StageKind> {
        let mut stages = vec![StageKind::BaseRender];
        if self.bloom.enabled {
            stages.push(StageKind::Bloom);
        }
        if self.color_correction.enabled {
            stages.push(StageKind::ColorCorrection);
        }
        stages.push(StageKind::Output);
        stages
    }

    /// Reference evaluation of the post chain on a single linear-space pixel.
    /// Bloom is a spatial effect, so this covers grading and output only; it
    /// is what the shaders must agree with for a bloom-free pixel.
    pub fn evaluate_pixel(&self, rgb: [f32; 3]) -> [f32; 3] {
        let graded = if self.color_correction.enabled {
            self.color_correction.grade(rgb)
        } else {
            rgb
        };
        self.output.tone_map(graded)
    }
}

/// GPU uniforms for the color-correction pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ColorCorrectionUniforms {
    pub saturation: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub _padding: f32,
}

impl ColorCorrectionUniforms {
    pub fn from_settings(s: &ColorCorrectionSettings) -> Self {
        Self {
            saturation: s.saturation,
            contrast: s.contrast,
            brightness: s.brightness,
            _padding: 0.0,
        }
    }
}

/// GPU uniforms for the output (tone map + color space) pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct OutputUniforms {
    pub exposure: f32,
    /// Tone curve selector, same encoding as [`ToneMapping`].
    pub tone_mapping: u32,
    pub _padding: [f32; 2],
}

impl OutputUniforms {
    pub fn from_settings(s: &OutputSettings) -> Self {
        Self {
            exposure: s.exposure,
            tone_mapping: s.tone_mapping.index(),
            _padding: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_zero_color_correction_is_identity() {
        let cc = ColorCorrectionSettings {
            enabled: true,
            saturation: 0.0,
            contrast: 0.0,
            brightness: 0.0,
        };
        for px in [[0.0, 0.0, 0.0], [0.25, 0.5, 0.75], [1.0, 1.0, 1.0]] {
            assert_close(cc.grade(px), px);
        }
    }

    #[test]
    fn test_negative_saturation_desaturates() {
        let cc = ColorCorrectionSettings {
            enabled: true,
            saturation: -1.0,
            contrast: 0.0,
            brightness: 0.0,
        };
        let out = cc.grade([0.8, 0.2, 0.4]);
        // Fully desaturated: all channels collapse to the luminance.
        assert!((out[0] - out[1]).abs() < 1e-5);
        assert!((out[1] - out[2]).abs() < 1e-5);
        let expected = 0.8 * 0.299 + 0.2 * 0.587 + 0.4 * 0.114;
        assert!((out[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_positive_saturation_spreads_channels() {
        let cc = ColorCorrectionSettings {
            enabled: true,
            saturation: 0.5,
            contrast: 0.0,
            brightness: 0.0,
        };
        let out = cc.grade([0.8, 0.2, 0.4]);
        assert!(out[0] > 0.8);
        assert!(out[1] < 0.2);
    }

    #[test]
    fn test_contrast_pivots_on_midpoint() {
        let cc = ColorCorrectionSettings {
            enabled: true,
            saturation: 0.0,
            contrast: 0.5,
            brightness: 0.0,
        };
        assert_close(cc.grade([0.5, 0.5, 0.5]), [0.5, 0.5, 0.5]);
        let out = cc.grade([0.7, 0.7, 0.7]);
        assert!(out[0] > 0.7);
    }

    #[test]
    fn test_brightness_is_additive() {
        let cc = ColorCorrectionSettings {
            enabled: true,
            saturation: 0.0,
            contrast: 0.0,
            brightness: 0.1,
        };
        assert_close(cc.grade([0.2, 0.4, 0.6]), [0.3, 0.5, 0.7]);
    }

    #[test]
    fn test_tone_none_is_passthrough() {
        let out = OutputSettings {
            tone_mapping: ToneMapping::None,
            exposure: 3.0,
        };
        // None ignores exposure entirely.
        assert_eq!(out.tone_map_channel(1.7), 1.7);
    }

    #[test]
    fn test_reinhard_compresses_below_one() {
        let out = OutputSettings {
            tone_mapping: ToneMapping::Reinhard,
            exposure: 1.0,
        };
        assert!(out.tone_map_channel(100.0) < 1.0);
        assert!(out.tone_map_channel(0.5) < 0.5);
        assert_eq!(out.tone_map_channel(0.0), 0.0);
    }

    #[test]
    fn test_filmic_curves_map_black_to_black() {
        for curve in [ToneMapping::Filmic, ToneMapping::AcesFilmic] {
            let out = OutputSettings {
                tone_mapping: curve,
                exposure: 1.0,
            };
            assert!(out.tone_map_channel(0.0).abs() < 1e-5);
            assert!(out.tone_map_channel(10.0) <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_exposure_scales_before_curve() {
        let dim = OutputSettings {
            tone_mapping: ToneMapping::Reinhard,
            exposure: 0.5,
        };
        let bright = OutputSettings {
            tone_mapping: ToneMapping::Reinhard,
            exposure: 2.0,
        };
        assert!(bright.tone_map_channel(0.5) > dim.tone_map_channel(0.5));
    }

    #[test]
    fn test_stage_order_is_invariant() {
        let mut chain = PostChain::new();
        assert_eq!(
            chain.active_stages(),
            vec![StageKind::BaseRender, StageKind::Output]
        );

        chain.bloom.enabled = true;
        chain.color_correction.enabled = true;
        let stages = chain.active_stages();
        assert_eq!(stages.first(), Some(&StageKind::BaseRender));
        assert_eq!(stages.last(), Some(&StageKind::Output));
        let bloom_idx = stages.iter().position(|s| *s == StageKind::Bloom).unwrap();
        let cc_idx = stages
            .iter()
            .position(|s| *s == StageKind::ColorCorrection)
            .unwrap();
        assert!(bloom_idx < cc_idx);
    }

    #[test]
    fn test_disabled_stages_still_tone_map() {
        let chain = PostChain {
            bloom: BloomSettings {
                enabled: false,
                ..Default::default()
            },
            color_correction: ColorCorrectionSettings {
                enabled: false,
                ..Default::default()
            },
            output: OutputSettings {
                tone_mapping: ToneMapping::Reinhard,
                exposure: 1.0,
            },
        };
        let out = chain.evaluate_pixel([4.0, 4.0, 4.0]);
        assert!((out[0] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_disabled_color_correction_is_passthrough() {
        let mut chain = PostChain::new();
        chain.output.tone_mapping = ToneMapping::None;
        chain.color_correction.enabled = false;
        chain.color_correction.brightness = 0.5;
        assert_eq!(chain.evaluate_pixel([0.2, 0.2, 0.2]), [0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_tone_mapping_wire_encoding() {
        for i in 0..5 {
            assert_eq!(ToneMapping::from_index(i).index(), i);
        }
        assert_eq!(ToneMapping::from_index(42), ToneMapping::None);
    }

    #[test]
    fn test_bloom_sanitize() {
        let b = BloomSettings {
            enabled: true,
            intensity: -1.0,
            threshold: -0.5,
            radius: -2.0,
        };
        let s = b.sanitize();
        assert_eq!(s.intensity, 0.0);
        assert_eq!(s.threshold, 0.0);
        assert_eq!(s.radius, 0.0);
    }
}
