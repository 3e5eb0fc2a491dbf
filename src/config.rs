use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::{AuthSession, User, DEFAULT_LOGIN_URL};
use crate::camera::{CameraConstraints, FacingMode};
use crate::detect::ModelSource;
use crate::persistence::{DetectionStore, HttpDetectionStore, SqliteDetectionStore};

const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MODEL_LABEL: &str = "object";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_DB_PATH: &str = "detections.db";

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    store: Option<StoreConfigFile>,
    auth: Option<AuthConfigFile>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    facing_mode: Option<FacingMode>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    label: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    min_score: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct StoreConfigFile {
    db_path: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AuthConfigFile {
    user_id: Option<String>,
    user_name: Option<String>,
    token: Option<String>,
    login_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub store: StoreSettings,
    pub auth: AuthSettings,
    /// Font for label text. Without one, tags are drawn without text.
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://...` for the synthetic camera, otherwise a V4L2 device node.
    pub device: String,
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// ONNX model. `None` selects the built-in stub detector.
    pub path: Option<PathBuf>,
    /// Label reported by the stub detector.
    pub label: String,
    pub input_width: u32,
    pub input_height: u32,
    pub min_score: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub db_path: String,
    /// Remote store base URL. Takes precedence over `db_path` when set.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub token: Option<String>,
    pub login_url: String,
}

impl DetectConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let store = file.store.unwrap_or_default();
        let auth = file.auth.unwrap_or_default();
        Self {
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                facing_mode: camera.facing_mode.unwrap_or_default(),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            model: ModelSettings {
                path: model.path,
                label: model
                    .label
                    .unwrap_or_else(|| DEFAULT_MODEL_LABEL.to_string()),
                input_width: model.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: model.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                min_score: model.min_score.unwrap_or(DEFAULT_MIN_SCORE),
                max_detections: model.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
            store: StoreSettings {
                db_path: store.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
                url: store.url,
            },
            auth: AuthSettings {
                user_id: auth.user_id,
                user_name: auth.user_name,
                token: auth.token,
                login_url: auth
                    .login_url
                    .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            },
            font_path: file.font_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("DETECT_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(mode) = non_empty_env("DETECT_FACING_MODE") {
            self.camera.facing_mode = mode
                .parse()
                .map_err(|e| anyhow!("DETECT_FACING_MODE: {}", e))?;
        }
        if let Some(path) = non_empty_env("DETECT_MODEL_PATH") {
            self.model.path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("DETECT_DB_PATH") {
            self.store.db_path = path;
        }
        if let Some(url) = non_empty_env("DETECT_STORE_URL") {
            self.store.url = Some(url);
        }
        if let Some(token) = non_empty_env("DETECT_AUTH_TOKEN") {
            self.auth.token = Some(token);
        }
        if let Some(user_id) = non_empty_env("DETECT_USER_ID") {
            self.auth.user_id = Some(user_id);
        }
        if let Some(path) = non_empty_env("DETECT_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.model.min_score) {
            return Err(anyhow!("model min_score must be within 0..=1"));
        }
        if self.model.max_detections == 0 {
            return Err(anyhow!("model max_detections must be greater than zero"));
        }
        if let Some(url) = &self.store.url {
            let parsed = url::Url::parse(url)
                .map_err(|e| anyhow!("invalid store url {}: {}", url, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("store url must be http or https: {}", url));
            }
        }
        if let Some(user_id) = &self.auth.user_id {
            let trimmed = user_id.trim();
            if trimmed.is_empty() {
                self.auth.user_id = None;
            } else {
                self.auth.user_id = Some(trimmed.to_string());
            }
        }
        Ok(())
    }

    pub fn camera_constraints(&self) -> CameraConstraints {
        CameraConstraints {
            facing_mode: self.camera.facing_mode,
            ideal_width: self.camera.width,
            ideal_height: self.camera.height,
            target_fps: self.camera.target_fps,
        }
    }

    pub fn model_source(&self) -> ModelSource {
        match &self.model.path {
            Some(path) => ModelSource::Onnx {
                path: path.clone(),
                input_width: self.model.input_width,
                input_height: self.model.input_height,
                min_score: self.model.min_score,
                max_detections: self.model.max_detections,
            },
            None => ModelSource::Stub {
                label: self.model.label.clone(),
            },
        }
    }

    /// The auth session handed over by the host: signed in when a user id is
    /// configured, anonymous otherwise.
    pub fn auth_session(&self) -> AuthSession {
        let session = match &self.auth.user_id {
            Some(id) => AuthSession::signed_in(
                User {
                    id: id.clone(),
                    name: self.auth.user_name.clone(),
                },
                self.auth.token.clone(),
            ),
            None => AuthSession::anonymous(),
        };
        session.with_login_url(self.auth.login_url.clone())
    }

    /// Open the configured detection store.
    pub fn open_store(&self) -> Result<Box<dyn DetectionStore>> {
        match &self.store.url {
            Some(url) => {
                log::info!("using remote detection store at {}", url);
                Ok(Box::new(HttpDetectionStore::new(url)?))
            }
            None => {
                log::info!("using local detection store at {}", self.store.db_path);
                Ok(Box::new(SqliteDetectionStore::open(&self.store.db_path)?))
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
