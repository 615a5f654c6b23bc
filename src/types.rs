use std::{collections::HashMap, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{expression::Expression, gesture::GestureLabel};

pub const FACE_LANDMARKS: usize = 478;
pub const HAND_LANDMARKS: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// A frame with no pixels or a buffer that does not cover `width * height`.
    pub fn is_empty(&self) -> bool {
        let expected = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4);
        expected == 0 || self.rgba.len() != expected
    }
}

/// Normalized landmark position, `x`/`y` in `[0, 1]` relative to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_2d(&self, other: &LandmarkPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Ordered landmarks from one model; index meaning is fixed per model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&LandmarkPoint> {
        self.points.get(idx)
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }
}

impl FromIterator<LandmarkPoint> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = LandmarkPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Named facial action-unit scores. Unknown names read as `0.0`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendshapeSet {
    scores: HashMap<String, f32>,
}

impl BlendshapeSet {
    pub fn score(&self, name: &str) -> f32 {
        self.scores.get(name).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, name: impl Into<String>, score: f32) {
        self.scores.insert(name.into(), score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for BlendshapeSet {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceObservation {
    pub landmarks: LandmarkSet,
    pub blendshapes: Option<BlendshapeSet>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceResult {
    pub faces: Vec<FaceObservation>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandResult {
    pub hands: Vec<LandmarkSet>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// One confident body joint in source-image pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub conf: f32,
}

/// A kept detector slot in corner form, source-image pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct SignBox {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
}

/// Per-frame fusion result; this is what goes on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub face_found: bool,
    pub head_pose: HeadPose,
    pub expression: Expression,
    pub hand_found: bool,
    pub gesture: GestureLabel,
    pub sign_asl: String,
    pub sign_conf: f32,
    pub asl_char: String,
    pub current_text: String,
    pub body_pose: Vec<Option<Keypoint>>,
}

impl Default for OutputRecord {
    fn default() -> Self {
        Self {
            face_found: false,
            head_pose: HeadPose::default(),
            expression: Expression::Neutral,
            hand_found: false,
            gesture: GestureLabel::NoGesture,
            sign_asl: "none".to_string(),
            sign_conf: 0.0,
            asl_char: "none".to_string(),
            current_text: String::new(),
            body_pose: Vec::new(),
        }
    }
}

/// A record plus the kept sign boxes, which stay off the wire.
#[derive(Clone, Debug)]
pub struct FusedFrame {
    pub record: OutputRecord,
    pub sign_boxes: Vec<SignBox>,
}
