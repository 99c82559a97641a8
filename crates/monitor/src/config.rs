//! Monitor configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables such as `PLATE_MONITOR__DETECTION__COOLDOWN_SECS=10`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use camera_capture::CameraConfig;
use dispatch::{BackendConfig, DispatchConfig};
use notification::NotifierConfig;
use plate_tracker::Panel;
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;
use crate::MonitorError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PLATE_MONITOR";

/// Longest accepted confirmation dwell
pub const MAX_DETECTION_DURATION_SECS: f64 = 3600.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub api: BackendConfig,
    pub detection: DetectionConfig,
    pub review: ReviewConfig,
    pub notification: NotifierConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cameras: Vec<CameraSettings>,
}

/// Confirmation and dispatch tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub cooldown_secs: u64,
    pub cache_duration_secs: u64,
    pub connection_error_cache_secs: u64,
    /// Continuous visibility required before a plate is confirmed
    pub min_detection_duration_secs: f64,
    pub rate_limit_enabled: bool,
    pub max_requests_per_minute: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5,
            cache_duration_secs: 300,
            connection_error_cache_secs: 300,
            min_detection_duration_secs: 3.0,
            rate_limit_enabled: true,
            max_requests_per_minute: 30,
        }
    }
}

impl DetectionConfig {
    pub fn min_dwell(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_detection_duration_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn dispatch_config(&self, request_timeout: Duration) -> DispatchConfig {
        DispatchConfig {
            cooldown: Duration::from_secs(self.cooldown_secs),
            cache_ttl: Duration::from_secs(self.cache_duration_secs),
            connection_error_ttl: Duration::from_secs(self.connection_error_cache_secs),
            rate_limit_enabled: self.rate_limit_enabled,
            max_requests_per_minute: self.max_requests_per_minute,
            request_timeout,
        }
    }
}

/// Human review behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Pause the panel whenever an outcome is surfaced
    pub pause_on_outcome: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            pause_on_outcome: true,
        }
    }
}

/// Control API server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_addr: String,
    /// Seconds between quota replenishments per client IP
    pub per_second: u64,
    pub burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0:8080".to_string(),
            per_second: 2,
            burst_size: 5,
        }
    }
}

impl ServerConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            per_second: self.per_second,
            burst_size: self.burst_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// One camera, driven from a replay manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub id: String,
    pub panel: Panel,
    pub manifest: PathBuf,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub loop_replay: bool,
}

fn default_fps() -> u32 {
    30
}

impl CameraSettings {
    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.manifest.display().to_string(),
            fps: self.fps,
            ..CameraConfig::default()
        }
    }
}

impl MonitorConfig {
    /// Load from `path` (optional) layered under environment overrides
    pub fn load(path: &str) -> Result<Self, MonitorError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: MonitorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        let detection = &self.detection;
        if detection.rate_limit_enabled && detection.max_requests_per_minute == 0 {
            return Err(MonitorError::Config(
                "max_requests_per_minute must be positive when rate limiting is enabled".into(),
            ));
        }
        if !(0.0..=MAX_DETECTION_DURATION_SECS).contains(&detection.min_detection_duration_secs) {
            return Err(MonitorError::Config(format!(
                "invalid min_detection_duration_secs: {}",
                detection.min_detection_duration_secs
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(MonitorError::Config("api.timeout_secs must be positive".into()));
        }
        if !(1..=100).contains(&self.api.image_quality) {
            return Err(MonitorError::Config(format!(
                "api.image_quality must be within 1-100, got {}",
                self.api.image_quality
            )));
        }

        let mut ids = HashSet::new();
        for camera in &self.cameras {
            if camera.fps == 0 {
                return Err(MonitorError::Config(format!("camera {}: fps must be positive", camera.id)));
            }
            if !ids.insert(camera.id.as_str()) {
                return Err(MonitorError::Config(format!("duplicate camera id: {}", camera.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch::RequestMode;

    fn camera(id: &str) -> CameraSettings {
        CameraSettings {
            id: id.to_string(),
            panel: Panel::Entry,
            manifest: PathBuf::from("entry.json"),
            fps: 30,
            loop_replay: false,
        }
    }

    #[test]
    fn test_defaults_match_gate_deployment() {
        let config = MonitorConfig::default();
        assert_eq!(config.api.url(), "http://localhost:8000/api/entry-exit/check-vehicle");
        assert_eq!(config.api.request_mode, RequestMode::Json);
        assert_eq!(config.detection.min_dwell(), Duration::from_secs(3));
        assert!(config.review.pause_on_outcome);
        assert!(config.validate().is_ok());

        let dispatch = config.detection.dispatch_config(config.api.timeout());
        assert_eq!(dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MonitorConfig::default();
        config.detection.max_requests_per_minute = 0;
        assert!(config.validate().is_err());

        config.detection.rate_limit_enabled = false;
        assert!(config.validate().is_ok());

        config.detection.min_detection_duration_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_detection_duration() {
        let mut config = MonitorConfig::default();
        config.detection.min_detection_duration_secs = 1e300;
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
        // Never panics even when validation is skipped
        assert_eq!(config.detection.min_dwell(), Duration::MAX);

        config.detection.min_detection_duration_secs = MAX_DETECTION_DURATION_SECS;
        assert!(config.validate().is_ok());

        config.detection.min_detection_duration_secs = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_camera_ids() {
        let mut config = MonitorConfig::default();
        config.cameras = vec![camera("gate-1"), camera("gate-1")];
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        config.cameras = vec![camera("gate-1"), CameraSettings { fps: 0, ..camera("gate-2") }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = MonitorConfig::load("/nonexistent/plate-monitor.toml").unwrap();
        assert_eq!(config.detection.cooldown_secs, 5);
        assert!(config.cameras.is_empty());
    }

    #[test]
    fn test_camera_section_deserializes() {
        let toml_like = serde_json::json!({
            "id": "exit-cam",
            "panel": "exit",
            "manifest": "replays/exit.json"
        });
        let camera: CameraSettings = serde_json::from_value(toml_like).unwrap();
        assert_eq!(camera.panel, Panel::Exit);
        assert_eq!(camera.fps, 30);
        assert_eq!(camera.camera_config().frame_interval(), Duration::from_millis(33));
    }
}
