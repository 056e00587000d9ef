//! The viewer session: one explicit owner for all live state.
//!
//! Everything the UI can touch — camera, environment, light rig, post chain,
//! loaded models — hangs off [`ViewerSession`] rather than ambient globals.
//! Both the UI adapter and settings application go through the same typed
//! setters, so the two mutation paths cannot diverge.
//!
//! Loads are asynchronous and non-blocking: worker threads send completions
//! over a channel and the frame tick drains them on the single frame-loop
//! thread. A second model load adds another independent model; an
//! environment load always replaces the single active map. In-flight loads
//! cannot be cancelled.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::camera::Camera;
use crate::environment::{EnvironmentMap, EnvironmentSettings};
use crate::error::ViewerError;
use crate::input::InputState;
use crate::lighting::{LightRig, ShadowAlgorithm, ShadowBlock};
use crate::model::{self, LoadedModel};
use crate::navigation::Navigation;
use crate::post_processing::{PostChain, ToneMapping};
use crate::scene_graph::SceneModel;
use crate::settings::{format_hex_color, parse_hex_color, SettingsRecord};
use crate::stats::SceneStats;

/// A completed asynchronous load.
enum LoadEvent {
    Model(Result<LoadedModel, ViewerError>),
    Environment(Result<EnvironmentMap, ViewerError>),
}

/// All live viewer state, plus the load-completion channel.
pub struct ViewerSession {
    pub camera: Camera,
    pub navigation: Navigation,
    pub lights: LightRig,
    pub post: PostChain,
    pub environment: EnvironmentSettings,
    pub environment_map: Option<EnvironmentMap>,
    pub models: Vec<LoadedModel>,
    pub stats: SceneStats,
    /// Most recent user-visible failure message, if any.
    pub last_error: Option<String>,
    /// True when loaded content changed since the renderer last uploaded.
    pub scene_dirty: bool,

    load_tx: Sender<LoadEvent>,
    load_rx: Receiver<LoadEvent>,
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerSession {
    pub fn new() -> Self {
        let (load_tx, load_rx) = mpsc::channel();
        Self {
            camera: Camera::new(),
            navigation: Navigation::new(),
            lights: LightRig::new(),
            post: PostChain::new(),
            environment: EnvironmentSettings::default(),
            environment_map: None,
            models: Vec::new(),
            stats: SceneStats::default(),
            last_error: None,
            scene_dirty: false,
            load_tx,
            load_rx,
        }
    }

    // ========================================================================
    // Frame tick
    // ========================================================================

    /// Advance one frame: drain completed loads, integrate navigation, then
    /// refresh the displayed statistics. The renderer runs in between, driven
    /// by the frame loop; nothing here blocks.
    pub fn tick(&mut self, dt: f32, input: &mut InputState) {
        self.pump_loads();
        self.navigation.tick(&mut self.camera, input, dt);
        self.refresh_stats();
    }

    fn refresh_stats(&mut self) {
        let scenes: Vec<SceneModel> = self.models.iter().map(|m| m.scene.clone()).collect();
        self.stats = SceneStats::collect(&scenes);
    }

    /// Apply completed loads on the frame-loop thread.
    pub fn pump_loads(&mut self) {
        while let Ok(event) = self.load_rx.try_recv() {
            match event {
                LoadEvent::Model(Ok(loaded)) => {
                    log::info!("model '{}' ready", loaded.scene.name);
                    self.models.push(loaded);
                    self.scene_dirty = true;
                }
                LoadEvent::Model(Err(e)) => {
                    log::warn!("{}", e);
                    self.last_error = Some(e.to_string());
                }
                LoadEvent::Environment(Ok(map)) => {
                    if self.environment_map.is_some() {
                        log::info!("replacing environment map with '{}'", map.source);
                    }
                    // Replacing retires the previous map.
                    self.environment_map = Some(map);
                }
                LoadEvent::Environment(Err(e)) => {
                    log::warn!("{}", e);
                    self.last_error = Some(e.to_string());
                }
            }
        }
    }

    /// Begin loading a model bundle on a worker thread.
    pub fn request_model_load(&self, path: PathBuf) {
        let tx = self.load_tx.clone();
        std::thread::spawn(move || {
            let result = model::load_obj(&path);
            // The session may be gone by the time the load finishes.
            let _ = tx.send(LoadEvent::Model(result));
        });
    }

    /// Begin loading an equirectangular HDR environment map on a worker
    /// thread. The active map is replaced when the load completes.
    pub fn request_environment_load(&self, path: PathBuf) {
        let tx = self.load_tx.clone();
        std::thread::spawn(move || {
            let result = EnvironmentMap::load(&path);
            let _ = tx.send(LoadEvent::Environment(result));
        });
    }

    // ========================================================================
    // Typed setters (the single mutation path for UI and settings apply)
    // ========================================================================

    pub fn set_camera_fov(&mut self, deg: f32) {
        self.camera.set_fov(deg);
    }

    pub fn set_hdr_intensity(&mut self, intensity: f32) {
        self.environment.intensity = intensity;
    }

    pub fn set_hdr_rotation(&mut self, deg: f32) {
        self.environment.rotation_deg = deg;
    }

    pub fn set_hdr_background(&mut self, on: bool) {
        self.environment.use_background = on;
    }

    pub fn set_ambient_color(&mut self, hex: &str) {
        self.lights.set_ambient_color(parse_hex_color(hex));
    }

    pub fn set_ambient_intensity(&mut self, intensity: f32) {
        self.lights.set_ambient_intensity(intensity);
    }

    pub fn set_dir_color(&mut self, hex: &str) {
        self.lights.set_directional_color(parse_hex_color(hex));
    }

    pub fn set_dir_intensity(&mut self, intensity: f32) {
        self.lights.set_directional_intensity(intensity);
    }

    pub fn set_dir_direction(&mut self, deg: f32) {
        self.lights.set_direction(deg);
    }

    pub fn set_dir_elevation(&mut self, deg: f32) {
        self.lights.set_elevation(deg);
    }

    pub fn set_shadows_enabled(&mut self, on: bool) {
        self.lights.set_shadows_enabled(on);
    }

    pub fn set_shadow_type(&mut self, kind: u32) {
        self.lights
            .set_shadow_algorithm(ShadowAlgorithm::from_index(kind));
    }

    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.lights.set_shadow_resolution(size);
    }

    pub fn set_shadow_bias(&mut self, bias: f32) {
        self.lights.set_shadow_bias(bias);
    }

    pub fn set_shadow_normal_bias(&mut self, bias: f32) {
        self.lights.set_shadow_normal_bias(bias);
    }

    pub fn set_shadow_radius(&mut self, radius: f32) {
        self.lights.set_shadow_radius(radius);
    }

    pub fn set_shadow_camera_size(&mut self, extent: f32) {
        self.lights.set_shadow_camera_extent(extent);
    }

    pub fn set_tone_mapping(&mut self, kind: u32) {
        self.post.output.tone_mapping = ToneMapping::from_index(kind);
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.post.output.exposure = exposure;
    }

    pub fn set_color_correction_enabled(&mut self, on: bool) {
        self.post.color_correction.enabled = on;
    }

    pub fn set_saturation(&mut self, v: f32) {
        self.post.color_correction.saturation = v;
    }

    pub fn set_contrast(&mut self, v: f32) {
        self.post.color_correction.contrast = v;
    }

    pub fn set_brightness(&mut self, v: f32) {
        self.post.color_correction.brightness = v;
    }

    pub fn set_bloom_enabled(&mut self, on: bool) {
        self.post.bloom.enabled = on;
    }

    pub fn set_bloom_intensity(&mut self, v: f32) {
        self.post.bloom.intensity = v;
    }

    pub fn set_bloom_threshold(&mut self, v: f32) {
        self.post.bloom.threshold = v;
    }

    pub fn set_bloom_radius(&mut self, v: f32) {
        self.post.bloom.radius = v;
    }

    // ========================================================================
    // Settings capture / apply
    // ========================================================================

    /// Snapshot every live parameter into a record. Pure read.
    pub fn capture(&self) -> SettingsRecord {
        SettingsRecord {
            camera_fov: self.camera.fov,
            hdr_intensity: self.environment.intensity,
            hdr_rotation: self.environment.rotation_deg,
            hdr_background: self.environment.use_background,
            ambient_color: format_hex_color(self.lights.ambient.color),
            ambient_intensity: self.lights.ambient.intensity,
            dir_color: format_hex_color(self.lights.directional.color),
            dir_intensity: self.lights.directional.intensity,
            dir_direction: self.lights.directional.direction_deg,
            dir_elevation: self.lights.directional.elevation_deg,
            shadow_type: self.lights.shadow.algorithm.index(),
            shadows_enabled: self.lights.shadow.enabled,
            shadow_bias: self.lights.shadow.bias,
            shadow_normal_bias: self.lights.shadow.normal_bias,
            shadow_map_size: self.lights.shadow.map_size,
            shadow_radius: self.lights.shadow.radius,
            shadow_camera_size: self.lights.shadow.camera_extent,
            tone_mapping_type: self.post.output.tone_mapping.index(),
            exposure: self.post.output.exposure,
            color_correction_enabled: self.post.color_correction.enabled,
            saturation: self.post.color_correction.saturation,
            contrast: self.post.color_correction.contrast,
            brightness: self.post.color_correction.brightness,
            bloom_enabled: self.post.bloom.enabled,
            bloom_intensity: self.post.bloom.intensity,
            bloom_threshold: self.post.bloom.threshold,
            bloom_radius: self.post.bloom.radius,
        }
    }

    /// Replay a record through the typed setters. Application order is
    /// camera, environment, ambient, directional, shadow block, tone
    /// mapping, color correction, bloom; the shadow fields go through
    /// [`LightRig::apply_shadow_block`] so one rebuild covers them all.
    pub fn apply_settings(&mut self, record: &SettingsRecord) {
        self.set_camera_fov(record.camera_fov);

        self.set_hdr_intensity(record.hdr_intensity);
        self.set_hdr_rotation(record.hdr_rotation);
        self.set_hdr_background(record.hdr_background);

        self.set_ambient_color(&record.ambient_color);
        self.set_ambient_intensity(record.ambient_intensity);

        self.set_dir_color(&record.dir_color);
        self.set_dir_intensity(record.dir_intensity);
        self.set_dir_direction(record.dir_direction);
        self.set_dir_elevation(record.dir_elevation);

        self.lights.apply_shadow_block(ShadowBlock {
            enabled: record.shadows_enabled,
            algorithm: ShadowAlgorithm::from_index(record.shadow_type),
            map_size: record.shadow_map_size,
            bias: record.shadow_bias,
            normal_bias: record.shadow_normal_bias,
            radius: record.shadow_radius,
            camera_extent: record.shadow_camera_size,
        });

        self.set_tone_mapping(record.tone_mapping_type);
        self.set_exposure(record.exposure);

        self.set_color_correction_enabled(record.color_correction_enabled);
        self.set_saturation(record.saturation);
        self.set_contrast(record.contrast);
        self.set_brightness(record.brightness);

        self.set_bloom_enabled(record.bloom_enabled);
        self.set_bloom_intensity(record.bloom_intensity);
        self.set_bloom_threshold(record.bloom_threshold);
        self.set_bloom_radius(record.bloom_radius);
    }

    /// Import settings text atomically: parse first, apply only on success.
    pub fn import_settings(&mut self, text: &str) -> Result<(), ViewerError> {
        let record = SettingsRecord::deserialize(text)?;
        self.apply_settings(&record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_record() -> SettingsRecord {
        SettingsRecord {
            camera_fov: 35.0,
            hdr_intensity: 2.0,
            hdr_rotation: 90.0,
            hdr_background: true,
            ambient_color: "#336699".to_string(),
            ambient_intensity: 0.7,
            dir_color: "#ffcc00".to_string(),
            dir_intensity: 2.5,
            dir_direction: 120.0,
            dir_elevation: 30.0,
            shadow_type: 3,
            shadows_enabled: false,
            shadow_bias: -0.002,
            shadow_normal_bias: 0.05,
            shadow_map_size: 4096,
            shadow_radius: 8.0,
            shadow_camera_size: 25.0,
            tone_mapping_type: 2,
            exposure: 1.4,
            color_correction_enabled: true,
            saturation: 0.2,
            contrast: 0.1,
            brightness: -0.05,
            bloom_enabled: true,
            bloom_intensity: 0.8,
            bloom_threshold: 0.6,
            bloom_radius: 1.0,
        }
    }

    #[test]
    fn test_capture_of_fresh_session_is_default_record() {
        let session = ViewerSession::new();
        assert_eq!(session.capture(), SettingsRecord::default());
    }

    #[test]
    fn test_apply_then_capture_round_trips() {
        let mut session = ViewerSession::new();
        let record = custom_record();
        session.apply_settings(&record);
        assert_eq!(session.capture(), record);
    }

    #[test]
    fn test_apply_capture_is_idempotent() {
        let mut session = ViewerSession::new();
        session.apply_settings(&custom_record());
        let before = session.capture();
        // Shadow state should already be settled; remember it.
        session.lights.shadow_map_rebuilt();
        let map_before = session.lights.shadow.map;

        session.apply_settings(&before.clone());
        assert_eq!(session.capture(), before);
        // Re-applying identical shadow settings must not force a rebuild.
        assert_eq!(session.lights.shadow.map, map_before);
        assert!(!session.lights.shadow.needs_rebuild);
    }

    #[test]
    fn test_derived_light_position_follows_record() {
        let mut session = ViewerSession::new();
        let mut record = SettingsRecord::default();
        record.dir_direction = 90.0;
        record.dir_elevation = 0.0;
        session.apply_settings(&record);
        let p = session.lights.directional.position();
        assert!((p[0] - 10.0).abs() < 1e-4);
        assert!(p[1].abs() < 1e-4);
        assert!(p[2].abs() < 1e-4);
    }

    #[test]
    fn test_apply_shadow_block_changes_rebuild_once() {
        let mut session = ViewerSession::new();
        session.lights.shadow_map_rebuilt();
        let mut record = SettingsRecord::default();
        record.shadow_map_size = 512;
        record.shadow_type = 3;
        session.apply_settings(&record);
        assert!(session.lights.shadow.needs_rebuild);
        assert!(session.lights.shadow.map.is_none());
    }

    #[test]
    fn test_import_malformed_leaves_state_untouched() {
        let mut session = ViewerSession::new();
        session.apply_settings(&custom_record());
        let before = session.capture();

        let err = session.import_settings("{\"cameraFov\": \"not a number\"}");
        assert!(err.is_err());
        assert_eq!(session.capture(), before);
    }

    #[test]
    fn test_store_round_trip_through_capture() {
        let dir = std::env::temp_dir().join(format!("maquette-session-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = crate::store::SettingsStore::new(&dir);

        let mut session = ViewerSession::new();
        session.apply_settings(&custom_record());
        store.save(&session.capture()).unwrap();

        let mut reloaded = ViewerSession::new();
        let record = store.load().unwrap().unwrap();
        reloaded.apply_settings(&record);
        assert_eq!(reloaded.capture(), custom_record());
    }

    #[test]
    fn test_failed_model_load_reports_and_preserves_scene() {
        let mut session = ViewerSession::new();
        session.request_model_load(PathBuf::from("/nonexistent/maquette.obj"));
        // The worker thread finishes quickly for a missing file; poll for it.
        for _ in 0..200 {
            session.pump_loads();
            if session.last_error.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(session.last_error.is_some());
        assert!(session.models.is_empty());
    }

    #[test]
    fn test_tick_refreshes_stats() {
        let mut session = ViewerSession::new();
        let mut input = InputState::new();
        session.tick(0.016, &mut input);
        assert_eq!(session.stats.triangle_count, 0);
    }
}
