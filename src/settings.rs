//! The settings record: the canonical flat description of every configurable
//! viewer parameter.
//!
//! One record shape backs every persistence surface — the local store, file
//! export/import, and generated procedural code — and no surface has
//! privileged fields. The schema is fixed: every key has a defined default,
//! unknown keys in a document are ignored, and missing keys take their
//! defaults at the deserialize boundary. Applying a record drives exactly the
//! same typed setters a live UI interaction would, so UI-visible state and
//! component state cannot diverge.

use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

/// Flat record of all configurable parameters. Serialized as camelCase JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsRecord {
    // Camera
    pub camera_fov: f32,

    // Environment
    pub hdr_intensity: f32,
    pub hdr_rotation: f32,
    pub hdr_background: bool,

    // Ambient light
    pub ambient_color: String,
    pub ambient_intensity: f32,

    // Directional light
    pub dir_color: String,
    pub dir_intensity: f32,
    pub dir_direction: f32,
    pub dir_elevation: f32,

    // Shadows
    pub shadow_type: u32,
    pub shadows_enabled: bool,
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
    pub shadow_map_size: u32,
    pub shadow_radius: f32,
    pub shadow_camera_size: f32,

    // Output stage
    pub tone_mapping_type: u32,
    pub exposure: f32,

    // Color correction
    pub color_correction_enabled: bool,
    pub saturation: f32,
    pub contrast: f32,
    pub brightness: f32,

    // Bloom
    pub bloom_enabled: bool,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_radius: f32,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            camera_fov: 60.0,
            hdr_intensity: 1.0,
            hdr_rotation: 0.0,
            hdr_background: false,
            ambient_color: "#ffffff".to_string(),
            ambient_intensity: 0.4,
            dir_color: "#ffffff".to_string(),
            dir_intensity: 1.0,
            dir_direction: 45.0,
            dir_elevation: 45.0,
            shadow_type: 1,
            shadows_enabled: true,
            shadow_bias: -0.0005,
            shadow_normal_bias: 0.02,
            shadow_map_size: 2048,
            shadow_radius: 4.0,
            shadow_camera_size: 15.0,
            tone_mapping_type: 4,
            exposure: 1.0,
            color_correction_enabled: false,
            saturation: 0.0,
            contrast: 0.0,
            brightness: 0.0,
            bloom_enabled: false,
            bloom_intensity: 0.4,
            bloom_threshold: 0.9,
            bloom_radius: 0.5,
        }
    }
}

impl SettingsRecord {
    /// Canonical lossless text encoding: pretty-printed JSON.
    pub fn serialize(&self) -> String {
        // A flat struct of primitives cannot fail to serialize.
        serde_json::to_string_pretty(self).expect("settings record is always serializable")
    }

    /// Exact inverse of [`serialize`]. Malformed input yields a ParseError
    /// and must leave any live state untouched (nothing is applied here).
    pub fn deserialize(text: &str) -> Result<Self, ViewerError> {
        serde_json::from_str(text).map_err(|e| ViewerError::Parse(e.to_string()))
    }

    /// Generate human-readable procedural statements that reproduce this
    /// record's state when executed against a fresh session. A convenience
    /// export only; never re-imported. Float values print at full precision
    /// (shortest round-trip form) so executing the code rebuilds the exact
    /// record.
    pub fn generate_code(&self) -> String {
        let mut out = String::from("let mut session = ViewerSession::new();\n");
        let mut line = |s: String| {
            out.push_str(&s);
            out.push('\n');
        };
        line(format!("session.set_camera_fov({:?});", self.camera_fov));
        line(format!("session.set_hdr_intensity({:?});", self.hdr_intensity));
        line(format!("session.set_hdr_rotation({:?});", self.hdr_rotation));
        line(format!("session.set_hdr_background({});", self.hdr_background));
        line(format!(
            "session.set_ambient_color(\"{}\");",
            self.ambient_color
        ));
        line(format!(
            "session.set_ambient_intensity({:?});",
            self.ambient_intensity
        ));
        line(format!("session.set_dir_color(\"{}\");", self.dir_color));
        line(format!("session.set_dir_intensity({:?});", self.dir_intensity));
        line(format!("session.set_dir_direction({:?});", self.dir_direction));
        line(format!("session.set_dir_elevation({:?});", self.dir_elevation));
        line(format!("session.set_shadows_enabled({});", self.shadows_enabled));
        line(format!("session.set_shadow_type({});", self.shadow_type));
        line(format!("session.set_shadow_map_size({});", self.shadow_map_size));
        line(format!("session.set_shadow_bias({:?});", self.shadow_bias));
        line(format!(
            "session.set_shadow_normal_bias({:?});",
            self.shadow_normal_bias
        ));
        line(format!("session.set_shadow_radius({:?});", self.shadow_radius));
        line(format!(
            "session.set_shadow_camera_size({:?});",
            self.shadow_camera_size
        ));
        line(format!(
            "session.set_tone_mapping({});",
            self.tone_mapping_type
        ));
        line(format!("session.set_exposure({:?});", self.exposure));
        line(format!(
            "session.set_color_correction_enabled({});",
            self.color_correction_enabled
        ));
        line(format!("session.set_saturation({:?});", self.saturation));
        line(format!("session.set_contrast({:?});", self.contrast));
        line(format!("session.set_brightness({:?});", self.brightness));
        line(format!("session.set_bloom_enabled({});", self.bloom_enabled));
        line(format!("session.set_bloom_intensity({:?});", self.bloom_intensity));
        line(format!("session.set_bloom_threshold({:?});", self.bloom_threshold));
        line(format!("session.set_bloom_radius({:?});", self.bloom_radius));
        out
    }
}

// ============================================================================
// Color strings
// ============================================================================

/// Parse a `#rrggbb` color string into linear-as-stored RGB floats.
/// Unparseable strings fall back to white, matching the UI color widget.
pub fn parse_hex_color(text: &str) -> [f32; 3] {
    let hex = text.trim().trim_start_matches('#');
    // The length check alone would let multi-byte characters through to the
    // byte slices below and panic on a char boundary.
    if hex.len() != 6 || !hex.is_ascii() {
        return [1.0, 1.0, 1.0];
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map(|v| v as f32 / 255.0)
            .unwrap_or(1.0)
    };
    [channel(0), channel(2), channel(4)]
}

/// Format RGB floats as a `#rrggbb` string. Lossless for 8-bit channels.
pub fn format_hex_color(rgb: [f32; 3]) -> String {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(rgb[0]), byte(rgb[1]), byte(rgb[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_round_trip() {
        let mut record = SettingsRecord::default();
        record.camera_fov = 35.0;
        record.bloom_enabled = true;
        record.bloom_radius = 0.8;
        record.ambient_color = "#204060".to_string();
        record.shadow_type = 3;
        record.tone_mapping_type = 2;

        let text = record.serialize();
        let back = SettingsRecord::deserialize(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_deserialize_malformed_is_parse_error() {
        let err = SettingsRecord::deserialize("{ not json").unwrap_err();
        assert!(matches!(err, ViewerError::Parse(_)));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let record =
            SettingsRecord::deserialize(r#"{ "cameraFov": 42.0, "someFutureKey": true }"#).unwrap();
        assert_eq!(record.camera_fov, 42.0);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let record = SettingsRecord::deserialize(r#"{ "exposure": 2.0 }"#).unwrap();
        assert_eq!(record.exposure, 2.0);
        assert_eq!(record.shadow_map_size, 2048);
        assert_eq!(record.ambient_color, "#ffffff");
    }

    #[test]
    fn test_camel_case_wire_keys() {
        let text = SettingsRecord::default().serialize();
        for key in [
            "cameraFov",
            "hdrIntensity",
            "hdrRotation",
            "hdrBackground",
            "ambientColor",
            "ambientIntensity",
            "dirColor",
            "dirIntensity",
            "dirDirection",
            "dirElevation",
            "shadowType",
            "shadowsEnabled",
            "shadowBias",
            "shadowNormalBias",
            "shadowMapSize",
            "shadowRadius",
            "shadowCameraSize",
            "toneMappingType",
            "exposure",
            "colorCorrectionEnabled",
            "saturation",
            "contrast",
            "brightness",
            "bloomEnabled",
            "bloomIntensity",
            "bloomThreshold",
            "bloomRadius",
        ] {
            assert!(text.contains(&format!("\"{}\"", key)), "missing key {}", key);
        }
    }

    #[test]
    fn test_hex_color_round_trip() {
        for hex in ["#000000", "#ffffff", "#3fa08c", "#010203"] {
            assert_eq!(format_hex_color(parse_hex_color(hex)), hex);
        }
    }

    #[test]
    fn test_hex_color_garbage_falls_back_to_white() {
        assert_eq!(parse_hex_color("cornflower"), [1.0, 1.0, 1.0]);
        assert_eq!(parse_hex_color("#12"), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_hex_color_non_ascii_falls_back_to_white() {
        // Six bytes but not six ASCII characters; must not panic.
        assert_eq!(parse_hex_color("#aé€"), [1.0, 1.0, 1.0]);
        assert_eq!(parse_hex_color("#ééé"), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_non_ascii_color_in_document_applies_cleanly() {
        let record =
            SettingsRecord::deserialize(r##"{ "ambientColor": "#aé€" }"##).unwrap();
        let mut session = crate::session::ViewerSession::new();
        session.apply_settings(&record);
        assert_eq!(session.lights.ambient.color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_generated_code_mentions_every_setter() {
        let code = SettingsRecord::default().generate_code();
        assert!(code.starts_with("let mut session"));
        for setter in [
            "set_camera_fov",
            "set_hdr_intensity",
            "set_hdr_rotation",
            "set_hdr_background",
            "set_ambient_color",
            "set_ambient_intensity",
            "set_dir_color",
            "set_dir_intensity",
            "set_dir_direction",
            "set_dir_elevation",
            "set_shadows_enabled",
            "set_shadow_type",
            "set_shadow_map_size",
            "set_shadow_bias",
            "set_shadow_normal_bias",
            "set_shadow_radius",
            "set_shadow_camera_size",
            "set_tone_mapping",
            "set_exposure",
            "set_color_correction_enabled",
            "set_saturation",
            "set_contrast",
            "set_brightness",
            "set_bloom_enabled",
            "set_bloom_intensity",
            "set_bloom_threshold",
            "set_bloom_radius",
        ] {
            assert!(code.contains(setter), "missing {}", setter);
        }
    }

    #[test]
    fn test_generated_values_round_trip_to_record() {
        let mut record = SettingsRecord::default();
        record.camera_fov = 35.123456;
        record.shadow_bias = -0.00012345;
        record.shadow_normal_bias = 0.019999;
        record.exposure = 1.0172;
        record.bloom_intensity = 1.0 / 3.0;

        let code = record.generate_code();
        let emitted = |setter: &str| -> f32 {
            let line = code
                .lines()
                .find(|l| l.contains(&format!("{}(", setter)))
                .unwrap_or_else(|| panic!("missing {}", setter));
            let open = line.find('(').unwrap();
            let close = line.rfind(')').unwrap();
            line[open + 1..close].parse().unwrap()
        };

        assert_eq!(emitted("set_camera_fov"), record.camera_fov);
        assert_eq!(emitted("set_shadow_bias"), record.shadow_bias);
        assert_eq!(emitted("set_shadow_normal_bias"), record.shadow_normal_bias);
        assert_eq!(emitted("set_exposure"), record.exposure);
        assert_eq!(emitted("set_bloom_intensity"), record.bloom_intensity);
    }
}
