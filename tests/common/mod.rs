#![allow(dead_code)]

use anyhow::anyhow;
use std::collections::VecDeque;

use nalgebra::{Rotation3, Vector3};
use ndarray::{Array2, Array4};

use gesture_fusion::{
    head_pose::{CameraIntrinsics, FACE_TEMPLATE, POSE_LANDMARK_INDICES},
    pipeline::recognizer::{
        CharModel, FaceLandmarker, HandLandmarker, PoseNetwork, SignDetectorModel, SignOutputs,
    },
    types::{
        BlendshapeSet, FACE_LANDMARKS, FaceObservation, FaceResult, Frame, HAND_LANDMARKS,
        HandResult, LandmarkPoint, LandmarkSet,
    },
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn frame() -> Frame {
    Frame::new(vec![0; (WIDTH * HEIGHT * 4) as usize], WIDTH, HEIGHT)
}

/// Upright hand with the wrist at `(wx, wy)`; each finger either reaches
/// past its middle joint or curls back toward the wrist.
pub fn hand_at(wx: f32, wy: f32, extended: [bool; 5]) -> LandmarkSet {
    let mut points = vec![LandmarkPoint::new(wx, wy, 0.0); HAND_LANDMARKS];
    let columns = [-0.08f32, -0.03, 0.0, 0.03, 0.06];
    for (finger, &is_ext) in extended.iter().enumerate() {
        let base = 1 + finger * 4;
        let tip_reach = if is_ext { 0.18 } else { 0.05 };
        let reaches = [0.04, 0.10, (0.10 + tip_reach) / 2.0, tip_reach];
        for (k, reach) in reaches.into_iter().enumerate() {
            points[base + k] = LandmarkPoint::new(wx + columns[finger], wy - reach, 0.0);
        }
    }
    LandmarkSet::new(points)
}

/// Face mesh whose pose landmarks are the canonical face seen head-on.
pub fn frontal_face(blendshapes: Option<BlendshapeSet>) -> FaceResult {
    turned_face(0.0, blendshapes)
}

/// Canonical face turned `degrees` about the vertical axis.
pub fn turned_face(degrees: f64, blendshapes: Option<BlendshapeSet>) -> FaceResult {
    let intrinsics = CameraIntrinsics::for_frame(WIDTH, HEIGHT);
    let rotation = Rotation3::from_euler_angles(0.0, degrees.to_radians(), 0.0);
    let mut mesh = vec![LandmarkPoint::new(0.5, 0.5, 0.0); FACE_LANDMARKS];
    for (&idx, [x, y, z]) in POSE_LANDMARK_INDICES.iter().zip(FACE_TEMPLATE) {
        let camera = rotation * Vector3::new(x, y, z) + Vector3::new(0.0, 0.0, 1500.0);
        let (u, v) = intrinsics.project(&camera).unwrap();
        mesh[idx] = LandmarkPoint::new(
            (u / f64::from(WIDTH)) as f32,
            (v / f64::from(HEIGHT)) as f32,
            0.0,
        );
    }
    face_from_mesh(mesh, blendshapes)
}

/// Every mesh point piled onto the frame center.
pub fn collapsed_face(blendshapes: Option<BlendshapeSet>) -> FaceResult {
    face_from_mesh(
        vec![LandmarkPoint::new(0.5, 0.5, 0.0); FACE_LANDMARKS],
        blendshapes,
    )
}

fn face_from_mesh(mesh: Vec<LandmarkPoint>, blendshapes: Option<BlendshapeSet>) -> FaceResult {
    FaceResult {
        faces: vec![FaceObservation {
            landmarks: LandmarkSet::new(mesh),
            blendshapes,
        }],
    }
}

/// Returns the same face result every call, or fails every call when `None`.
pub struct ScriptedFace(pub Option<FaceResult>);

impl FaceLandmarker for ScriptedFace {
    fn detect(&mut self, _frame: &Frame, _timestamp_ms: u64) -> anyhow::Result<FaceResult> {
        self.0.clone().ok_or_else(|| anyhow!("face model unavailable"))
    }
}

/// Plays face results in order, repeating the last one once exhausted.
pub struct FaceSequence(pub VecDeque<FaceResult>);

impl FaceLandmarker for FaceSequence {
    fn detect(&mut self, _frame: &Frame, _timestamp_ms: u64) -> anyhow::Result<FaceResult> {
        let next = if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        };
        next.ok_or_else(|| anyhow!("no scripted face left"))
    }
}

pub struct ScriptedHands(pub Vec<LandmarkSet>);

impl HandLandmarker for ScriptedHands {
    fn detect(&mut self, _frame: &Frame, _timestamp_ms: u64) -> anyhow::Result<HandResult> {
        Ok(HandResult {
            hands: self.0.clone(),
        })
    }
}

pub struct FixedSign(pub SignOutputs);

impl SignDetectorModel for FixedSign {
    fn infer(&mut self, _frame: &Frame) -> anyhow::Result<SignOutputs> {
        Ok(self.0.clone())
    }
}

pub struct FixedPose(pub Array4<f32>);

impl PoseNetwork for FixedPose {
    fn heatmaps(&mut self, _frame: &Frame) -> anyhow::Result<Array4<f32>> {
        Ok(self.0.clone())
    }
}

pub struct FixedChar(pub &'static str);

impl CharModel for FixedChar {
    fn predict(&mut self, features: &[f32]) -> anyhow::Result<String> {
        assert_eq!(features.len(), HAND_LANDMARKS * 2);
        Ok(self.0.to_string())
    }
}

pub fn sign_outputs(logits: Array2<f32>, boxes: Array2<f32>) -> SignOutputs {
    SignOutputs { logits, boxes }
}
