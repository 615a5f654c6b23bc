//! Runtime configuration loaded from a JSON file.

use std::{fs, net::SocketAddr, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, body_pose::DEFAULT_KEYPOINT_THRESHOLD, char_classifier::DEFAULT_STABLE_FRAMES,
    sign::DEFAULT_SIGN_THRESHOLD,
};

pub const DEFAULT_CONFIG_PATH: &str = "fusion.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub source: SourceConfig,
    pub models: ModelPaths,
    pub catalog_path: PathBuf,
    pub thresholds: Thresholds,
    pub scheduler: SchedulerConfig,
    pub text: TextConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub destination: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            destination: "127.0.0.1:5005".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceConfig {
    Camera { index: u32 },
    Images { directory: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Camera { index: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_landmarker: PathBuf,
    pub hand_landmarker: PathBuf,
    pub body_pose: PathBuf,
    pub sign_detector: PathBuf,
    pub char_classifier: PathBuf,
    /// Output labels of the character classifier, in score order.
    pub char_labels: Vec<String>,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_landmarker: PathBuf::from("models/face_landmarker.onnx"),
            hand_landmarker: PathBuf::from("models/hand_landmarker.onnx"),
            body_pose: PathBuf::from("models/body_pose.onnx"),
            sign_detector: PathBuf::from("models/sign_detr.onnx"),
            char_classifier: PathBuf::from("models/char_classifier.onnx"),
            char_labels: crate::char_classifier::DEFAULT_CHAR_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub sign_confidence: f32,
    pub body_keypoint: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sign_confidence: DEFAULT_SIGN_THRESHOLD,
            body_keypoint: DEFAULT_KEYPOINT_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on waiting for the in-flight frame's landmarks before
    /// falling back to the previous snapshot.
    pub wait_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub stable_frames: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            stable_frames: DEFAULT_STABLE_FRAMES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            source: SourceConfig::default(),
            models: ModelPaths::default(),
            catalog_path: PathBuf::from("config.json"),
            thresholds: Thresholds::default(),
            scheduler: SchedulerConfig::default(),
            text: TextConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates `path`. A missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            log::info!("loaded configuration from {}", path.display());
            config
        } else {
            log::info!(
                "configuration file {} not found, using defaults",
                path.display()
            );
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.destination()?;

        for (name, value) in [
            ("sign_confidence", self.thresholds.sign_confidence),
            ("body_keypoint", self.thresholds.body_keypoint),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "threshold {name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.scheduler.wait_timeout_ms == 0 {
            return Err(Error::Config(
                "scheduler.wait_timeout_ms must be positive".to_string(),
            ));
        }
        if self.text.stable_frames == 0 {
            return Err(Error::Config(
                "text.stable_frames must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn destination(&self) -> Result<SocketAddr> {
        self.transport.destination.parse().map_err(|e| {
            Error::Config(format!(
                "invalid transport destination {:?}: {e}",
                self.transport.destination
            ))
        })
    }
}
