use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_DB_PATH: &str = "defects.db";
const DEFAULT_REPORT_DIR: &str = "reports";
const DEFAULT_MODEL_PATH: &str = "model/best.onnx";
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_BELT_SPEED: f64 = 50.0;
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_CAMERA_URI: &str = "stub://line_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct InspectorConfigFile {
    db_path: Option<String>,
    report_dir: Option<PathBuf>,
    belt_speed: Option<f64>,
    confidence_threshold: Option<f32>,
    detector: Option<DetectorConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub db_path: String,
    pub report_dir: PathBuf,
    /// Metres per second.
    pub belt_speed: f64,
    pub confidence_threshold: f32,
    pub detector: DetectorSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://<name>`, `dir://<path>` or a V4L2 device path.
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self::from_file(InspectorConfigFile::default())
    }
}

impl InspectorConfig {
    /// Defaults, then the TOML file named by `INSPECTOR_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INSPECTOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectorConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            report_dir: file
                .report_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
            belt_speed: file.belt_speed.unwrap_or(DEFAULT_BELT_SPEED),
            confidence_threshold: file.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            },
            camera: CameraSettings {
                uri: camera.uri.unwrap_or_else(|| DEFAULT_CAMERA_URI.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("INSPECTOR_DB_PATH") {
            self.db_path = path;
        }
        if let Some(dir) = non_empty_env("INSPECTOR_REPORT_DIR") {
            self.report_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty_env("INSPECTOR_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(backend) = non_empty_env("INSPECTOR_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(uri) = non_empty_env("INSPECTOR_CAMERA_URI") {
            self.camera.uri = uri;
        }
        if let Some(speed) = non_empty_env("INSPECTOR_BELT_SPEED") {
            self.belt_speed = speed
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECTOR_BELT_SPEED must be a number of metres per second"))?;
        }
        if let Some(conf) = non_empty_env("INSPECTOR_CONFIDENCE") {
            self.confidence_threshold = conf
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECTOR_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_belt_speed(self.belt_speed)?;
        validate_confidence(self.confidence_threshold)?;
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        Ok(())
    }
}

pub(crate) fn validate_belt_speed(speed: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(anyhow!(
            "belt speed must be a positive number of metres per second (got {})",
            speed
        ));
    }
    Ok(())
}

pub(crate) fn validate_confidence(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "confidence threshold must be within [0, 1] (got {})",
            threshold
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<InspectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
