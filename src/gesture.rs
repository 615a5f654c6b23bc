use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{HAND_LANDMARKS, LandmarkSet};

pub const WRIST_HISTORY_CAPACITY: usize = 15;
pub const MAX_HAND_SLOTS: usize = 2;

const WAVE_MIN_TRAVEL: f32 = 0.2;
const WAVE_MAX_DRIFT: f32 = 0.1;

const WRIST: usize = 0;
// (tip, joint) index pairs tested for extension.
const THUMB: (usize, usize) = (4, 2);
const INDEX: (usize, usize) = (8, 6);
const MIDDLE: (usize, usize) = (12, 10);
const RING: (usize, usize) = (16, 14);
const PINKY: (usize, usize) = (20, 18);
const FINGERTIPS: [usize; 4] = [INDEX.0, MIDDLE.0, RING.0, PINKY.0];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureLabel {
    #[default]
    #[serde(rename = "none")]
    NoGesture,
    Hello,
    #[serde(rename = "i_love_you")]
    ILoveYou,
    Gun,
    Punch,
    WaveHorizontal,
    WaveVertical,
    ThankYou,
}

impl GestureLabel {
    pub fn label(&self) -> &'static str {
        match self {
            GestureLabel::NoGesture => "none",
            GestureLabel::Hello => "hello",
            GestureLabel::ILoveYou => "i_love_you",
            GestureLabel::Gun => "gun",
            GestureLabel::Punch => "punch",
            GestureLabel::WaveHorizontal => "wave_horizontal",
            GestureLabel::WaveVertical => "wave_vertical",
            GestureLabel::ThankYou => "thank_you",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, GestureLabel::NoGesture)
    }
}

/// Tip farther from the wrist than its joint.
pub fn is_extended(hand: &LandmarkSet, tip: usize, joint: usize) -> bool {
    match (hand.get(WRIST), hand.get(tip), hand.get(joint)) {
        (Some(wrist), Some(tip), Some(joint)) => tip.distance_2d(wrist) > joint.distance_2d(wrist),
        _ => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerExtension {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerExtension {
    pub fn from_hand(hand: &LandmarkSet) -> Option<Self> {
        if hand.len() < HAND_LANDMARKS {
            return None;
        }
        let ext = |(tip, joint): (usize, usize)| is_extended(hand, tip, joint);
        Some(Self {
            thumb: ext(THUMB),
            index: ext(INDEX),
            middle: ext(MIDDLE),
            ring: ext(RING),
            pinky: ext(PINKY),
        })
    }

    fn four_fingers_extended(&self) -> bool {
        self.index && self.middle && self.ring && self.pinky
    }
}

type ShapeRule = (fn(&FingerExtension) -> bool, GestureLabel);

/// Static shapes, first match wins:
///
/// | # | extended                 | folded               | label        |
/// |---|--------------------------|----------------------|--------------|
/// | 1 | all five                 |                      | `hello`      |
/// | 2 | thumb, index, pinky      | middle, ring         | `i_love_you` |
/// | 3 | thumb, index, middle     | ring, pinky          | `gun`        |
/// | 4 |                          | index, middle, ring, pinky | `punch` |
///
/// The thumb is not consulted for `punch`; a tucked or loose thumb both count.
pub const HAND_SHAPE_RULES: &[ShapeRule] = &[
    (|f| f.thumb && f.four_fingers_extended(), GestureLabel::Hello),
    (
        |f| f.thumb && f.index && f.pinky && !f.middle && !f.ring,
        GestureLabel::ILoveYou,
    ),
    (
        |f| f.index && f.middle && f.thumb && !f.ring && !f.pinky,
        GestureLabel::Gun,
    ),
    (
        |f| !f.index && !f.middle && !f.ring && !f.pinky,
        GestureLabel::Punch,
    ),
];

pub fn detect_hand_shape(hand: &LandmarkSet) -> GestureLabel {
    let Some(fingers) = FingerExtension::from_hand(hand) else {
        return GestureLabel::NoGesture;
    };
    HAND_SHAPE_RULES
        .iter()
        .find(|(matches, _)| matches(&fingers))
        .map(|(_, label)| *label)
        .unwrap_or(GestureLabel::NoGesture)
}

/// Gestures that need both hands. Anything other than exactly two hands is no gesture.
pub fn detect_two_handed_gestures(hands: &[LandmarkSet]) -> Option<GestureLabel> {
    if hands.len() != 2 {
        return None;
    }

    if hands.iter().all(is_open_palm_up) {
        Some(GestureLabel::ThankYou)
    } else {
        None
    }
}

fn is_open_palm_up(hand: &LandmarkSet) -> bool {
    let Some(fingers) = FingerExtension::from_hand(hand) else {
        return false;
    };
    if !fingers.four_fingers_extended() {
        return false;
    }

    let (Some(wrist), tips) = (hand.get(WRIST), FINGERTIPS.map(|i| hand.get(i))) else {
        return false;
    };
    let tip_y: f32 = tips.iter().flatten().map(|p| p.y).sum::<f32>() / FINGERTIPS.len() as f32;
    // Image y grows downward.
    tip_y < wrist.y
}

/// Bounded FIFO of wrist positions, one sample per processed frame.
#[derive(Clone, Debug, Default)]
pub struct WristHistory {
    samples: VecDeque<(f32, f32)>,
}

impl WristHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(WRIST_HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, x: f32, y: f32) {
        if self.samples.len() >= WRIST_HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((x, y));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= WRIST_HISTORY_CAPACITY
    }

    pub fn samples(&self) -> impl Iterator<Item = &(f32, f32)> {
        self.samples.iter()
    }

    /// Sustained motion over a full window; `none` until the window fills.
    pub fn classify_motion(&self) -> GestureLabel {
        if !self.is_full() {
            return GestureLabel::NoGesture;
        }

        let (min_x, max_x, min_y, max_y) = self.samples.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |acc, &(x, y)| (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y)),
        );
        let x_range = max_x - min_x;
        let y_range = max_y - min_y;

        if x_range > WAVE_MIN_TRAVEL && y_range < WAVE_MAX_DRIFT {
            GestureLabel::WaveHorizontal
        } else if y_range > WAVE_MIN_TRAVEL && x_range < WAVE_MAX_DRIFT {
            GestureLabel::WaveVertical
        } else {
            GestureLabel::NoGesture
        }
    }
}

/// Owns one wrist history per hand slot. Histories only ever slide; there is no reset.
///
/// `resolve` tracks the primary hand in slot 0 only. Slot 1 is fed solely by
/// callers that pass it to `update` directly.
#[derive(Clone, Debug)]
pub struct GestureTracker {
    slots: [WristHistory; MAX_HAND_SLOTS],
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureTracker {
    pub fn new() -> Self {
        Self {
            slots: [WristHistory::new(), WristHistory::new()],
        }
    }

    pub fn history(&self, slot: usize) -> Option<&WristHistory> {
        self.slots.get(slot)
    }

    /// Records the wrist for `slot`, then prefers a static shape over motion.
    pub fn update(&mut self, slot: usize, hand: &LandmarkSet) -> GestureLabel {
        let Some(history) = self.slots.get_mut(slot) else {
            log::warn!("hand slot {slot} out of range, ignoring");
            return GestureLabel::NoGesture;
        };
        let Some(wrist) = hand.get(WRIST) else {
            return GestureLabel::NoGesture;
        };
        history.push(wrist.x, wrist.y);

        let shape = detect_hand_shape(hand);
        if !shape.is_none() {
            return shape;
        }

        history.classify_motion()
    }

    /// Two-handed gestures first; otherwise the first hand goes through slot 0.
    pub fn resolve(&mut self, hands: &[LandmarkSet]) -> GestureLabel {
        if let Some(gesture) = detect_two_handed_gestures(hands) {
            return gesture;
        }
        match hands.first() {
            Some(hand) => self.update(0, hand),
            None => GestureLabel::NoGesture,
        }
    }
}
