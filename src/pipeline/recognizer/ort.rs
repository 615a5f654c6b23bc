use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::{Array2, Array4, Axis, Ix3, Ix4};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    CharModel, FaceLandmarker, HandLandmarker, PoseNetwork, SignDetectorModel, SignOutputs,
    TimestampGuard,
    common::{self, BLENDSHAPE_NAMES},
};
use crate::{
    char_classifier::{CHAR_FEATURES, argmax},
    types::{
        BlendshapeSet, FACE_LANDMARKS, FaceObservation, FaceResult, Frame, HAND_LANDMARKS,
        HandResult,
    },
};

const MAX_HANDS: usize = 2;
const HAND_PRESENCE_THRESHOLD: f32 = 0.2;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

fn open_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

/// Face mesh model: output 0 holds 478 landmarks in input pixels, output 1
/// (optional) the 52 blendshape scores, output 2 (optional) a face score.
pub struct OrtFaceLandmarker {
    session: Session,
    timestamps: TimestampGuard,
}

impl OrtFaceLandmarker {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: open_session(model_path)?,
            timestamps: TimestampGuard::default(),
        })
    }
}

impl FaceLandmarker for OrtFaceLandmarker {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<FaceResult> {
        self.timestamps.advance(timestamp_ms)?;

        let (input, letterbox) = common::prepare_letterbox(frame, common::FACE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run face landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("face model returned no outputs"));
        }

        if outputs.len() > 2 {
            let presence = outputs[2]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(1.0);
            if presence < FACE_PRESENCE_THRESHOLD {
                return Ok(FaceResult::default());
            }
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmark_sets(&flattened, FACE_LANDMARKS, 1, &letterbox)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("face model returned no landmark set"))?;

        let blendshapes = if outputs.len() > 1 {
            let scores = outputs[1].try_extract_array::<f32>()?;
            Some(
                BLENDSHAPE_NAMES
                    .iter()
                    .copied()
                    .zip(scores.iter().copied())
                    .collect::<BlendshapeSet>(),
            )
        } else {
            None
        };

        Ok(FaceResult {
            faces: vec![FaceObservation {
                landmarks,
                blendshapes,
            }],
        })
    }
}

/// Hand model: output 0 holds `[H, 21, 3]` landmarks in input pixels and
/// output 1 one presence score per hand.
pub struct OrtHandLandmarker {
    session: Session,
    timestamps: TimestampGuard,
}

impl OrtHandLandmarker {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: open_session(model_path)?,
            timestamps: TimestampGuard::default(),
        })
    }
}

impl HandLandmarker for OrtHandLandmarker {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<HandResult> {
        self.timestamps.advance(timestamp_ms)?;

        let (input, letterbox) = common::prepare_letterbox(frame, common::HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run hand landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let sets =
            common::decode_landmark_sets(&flattened, HAND_LANDMARKS, MAX_HANDS, &letterbox)?;

        let presence: Vec<f32> = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()?
                .iter()
                .copied()
                .collect()
        } else {
            vec![1.0; sets.len()]
        };

        let hands = sets
            .into_iter()
            .zip(presence)
            .filter(|(_, score)| *score >= HAND_PRESENCE_THRESHOLD)
            .map(|(set, _)| set)
            .collect();

        Ok(HandResult { hands })
    }
}

pub struct OrtPoseNetwork {
    session: Session,
}

impl OrtPoseNetwork {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: open_session(model_path)?,
        })
    }
}

impl PoseNetwork for OrtPoseNetwork {
    fn heatmaps(&mut self, frame: &Frame) -> Result<Array4<f32>> {
        let input =
            common::prepare_planar(frame, common::POSE_INPUT_SIZE, common::pose_normalize)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run body pose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("body pose model returned no outputs"));
        }

        let maps = outputs[0]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()
            .context("body pose output is not [1, C, H, W]")?
            .to_owned();
        Ok(maps)
    }
}

/// Set-prediction sign detector: output 0 `pred_logits [1, N, K+1]`,
/// output 1 `pred_boxes [1, N, 4]`.
pub struct OrtSignDetector {
    session: Session,
}

impl OrtSignDetector {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: open_session(model_path)?,
        })
    }
}

impl SignDetectorModel for OrtSignDetector {
    fn infer(&mut self, frame: &Frame) -> Result<SignOutputs> {
        let input =
            common::prepare_planar(frame, common::SIGN_INPUT_SIZE, common::imagenet_normalize)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run sign detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "sign detector returned {} outputs, need logits and boxes",
                outputs.len()
            ));
        }

        let first_batch = |idx: usize, what: &str| -> Result<Array2<f32>> {
            let arr = outputs[idx]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix3>()
                .with_context(|| format!("sign {what} output is not rank 3"))?;
            Ok(arr.index_axis(Axis(0), 0).to_owned())
        };

        Ok(SignOutputs {
            logits: first_batch(0, "logits")?,
            boxes: first_batch(1, "boxes")?,
        })
    }
}

pub struct OrtCharModel {
    session: Session,
    labels: Vec<String>,
}

impl OrtCharModel {
    pub fn new(model_path: &Path, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("character classifier needs at least one label"));
        }
        Ok(Self {
            session: open_session(model_path)?,
            labels,
        })
    }
}

impl CharModel for OrtCharModel {
    fn predict(&mut self, features: &[f32]) -> Result<String> {
        if features.len() != CHAR_FEATURES {
            return Err(anyhow!(
                "character features: got {}, need {}",
                features.len(),
                CHAR_FEATURES
            ));
        }

        let input = Array2::from_shape_vec((1, CHAR_FEATURES), features.to_vec())
            .map_err(|err| anyhow!("failed to build character tensor: {err}"))?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run character classifier session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("character classifier returned no outputs"));
        }

        let scores: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let idx = argmax(&scores).ok_or_else(|| anyhow!("character classifier returned no scores"))?;
        self.labels
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("character class {idx} has no label"))
    }
}
