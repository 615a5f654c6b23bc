pub mod common;
mod ort;

use std::path::Path;

use anyhow::{Result, bail};
use ndarray::{Array2, Array4};

use crate::{
    config::ModelPaths,
    types::{FaceResult, Frame, HandResult},
};

pub use self::ort::{
    OrtCharModel, OrtFaceLandmarker, OrtHandLandmarker, OrtPoseNetwork, OrtSignDetector,
};

/// Streaming face model. Timestamps must strictly increase between calls.
pub trait FaceLandmarker: Send + 'static {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<FaceResult>;
}

/// Streaming hand model, up to two hands per frame. Timestamps must
/// strictly increase between calls.
pub trait HandLandmarker: Send + 'static {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<HandResult>;
}

/// Body-pose network returning `[1, C, H, W]` confidence heatmaps.
pub trait PoseNetwork: Send + 'static {
    fn heatmaps(&mut self, frame: &Frame) -> Result<Array4<f32>>;
}

/// Raw detector outputs with the batch axis removed.
#[derive(Clone, Debug)]
pub struct SignOutputs {
    /// `[N, K+1]`, no-object class last.
    pub logits: Array2<f32>,
    /// `[N, 4]` normalized center-form boxes.
    pub boxes: Array2<f32>,
}

pub trait SignDetectorModel: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> Result<SignOutputs>;
}

/// Character classifier over the 42-float normalized hand vector.
pub trait CharModel: Send + 'static {
    fn predict(&mut self, features: &[f32]) -> Result<String>;
}

/// Rejects a streaming timestamp that does not move forward.
#[derive(Clone, Debug, Default)]
pub struct TimestampGuard {
    last: Option<u64>,
}

impl TimestampGuard {
    pub fn advance(&mut self, timestamp_ms: u64) -> Result<()> {
        if let Some(last) = self.last.filter(|&last| timestamp_ms <= last) {
            bail!("timestamp {timestamp_ms} ms does not follow {last} ms");
        }
        self.last = Some(timestamp_ms);
        Ok(())
    }
}

/// Everything the fusion loop runs per frame. Only the landmark models are
/// mandatory.
pub struct Engines {
    pub face: Box<dyn FaceLandmarker>,
    pub hand: Box<dyn HandLandmarker>,
    pub pose: Option<Box<dyn PoseNetwork>>,
    pub sign: Option<Box<dyn SignDetectorModel>>,
    pub char_model: Option<Box<dyn CharModel>>,
}

impl Engines {
    pub fn new(face: Box<dyn FaceLandmarker>, hand: Box<dyn HandLandmarker>) -> Self {
        Self {
            face,
            hand,
            pose: None,
            sign: None,
            char_model: None,
        }
    }
}

/// Opens every configured session. Missing optional models disable their
/// feature with a single log line; a missing landmark model is an error.
pub fn load_engines(paths: &ModelPaths) -> Result<Engines> {
    let face = OrtFaceLandmarker::new(&paths.face_landmarker)?;
    log::info!(
        "face landmarker ready using {}",
        paths.face_landmarker.display()
    );
    let hand = OrtHandLandmarker::new(&paths.hand_landmarker)?;
    log::info!(
        "hand landmarker ready using {}",
        paths.hand_landmarker.display()
    );

    let mut engines = Engines::new(Box::new(face), Box::new(hand));
    engines.pose = load_optional("body pose", &paths.body_pose, |p| {
        OrtPoseNetwork::new(p).map(|e| Box::new(e) as Box<dyn PoseNetwork>)
    });
    engines.sign = load_optional("sign detector", &paths.sign_detector, |p| {
        OrtSignDetector::new(p).map(|e| Box::new(e) as Box<dyn SignDetectorModel>)
    });
    engines.char_model = load_optional("character classifier", &paths.char_classifier, |p| {
        OrtCharModel::new(p, paths.char_labels.clone()).map(|e| Box::new(e) as Box<dyn CharModel>)
    });

    Ok(engines)
}

fn load_optional<T>(name: &str, path: &Path, open: impl FnOnce(&Path) -> Result<T>) -> Option<T> {
    if !path.exists() {
        log::warn!("{name} model not found at {}, disabled", path.display());
        return None;
    }
    match open(path) {
        Ok(engine) => {
            log::info!("{name} ready using {}", path.display());
            Some(engine)
        }
        Err(err) => {
            log::warn!("failed to load {name} model, disabled: {err:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_must_increase() {
        let mut guard = TimestampGuard::default();
        guard.advance(5).unwrap();
        guard.advance(6).unwrap();
        assert!(guard.advance(6).is_err());
        assert!(guard.advance(3).is_err());
        guard.advance(10).unwrap();
    }

    #[test]
    fn missing_optional_model_is_disabled() {
        let loaded = load_optional("test", Path::new("/nonexistent/model.onnx"), |_| Ok(1u8));
        assert!(loaded.is_none());
    }
}
