use crate::types::{HAND_LANDMARKS, LandmarkSet};

pub const CHAR_FEATURES: usize = HAND_LANDMARKS * 2;
pub const NO_CHAR: &str = "none";
pub const DEFAULT_STABLE_FRAMES: usize = 10;

/// Letters plus the two editing labels the character model was trained with.
pub const DEFAULT_CHAR_LABELS: [&str; 28] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z", "space", "del",
];

/// Wrist-relative x/y pairs scaled by palm width, flattened to 42 floats.
pub fn normalize_hand(hand: &LandmarkSet) -> Option<Vec<f32>> {
    if hand.len() != HAND_LANDMARKS {
        return None;
    }

    let wrist = *hand.get(0)?;
    let pts: Vec<[f32; 2]> = hand
        .points()
        .iter()
        .map(|p| [p.x - wrist.x, p.y - wrist.y])
        .collect();

    // Index and pinky knuckles span the palm.
    let palm_width = {
        let dx = pts[5][0] - pts[17][0];
        let dy = pts[5][1] - pts[17][1];
        (dx * dx + dy * dy).sqrt()
    };
    let scale = if palm_width > 1e-6 {
        palm_width
    } else {
        let [dx, dy] = pts[9];
        (dx * dx + dy * dy).sqrt()
    };
    if scale <= 1e-6 {
        return None;
    }

    Some(pts.iter().flat_map(|[x, y]| [x / scale, y / scale]).collect())
}

/// Index of the highest score; the first one on ties.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
        .map(|(idx, _)| idx)
}

/// Running text built from debounced character predictions.
///
/// A label is committed once it has been seen on `stable_frames` consecutive
/// frames, and not again until the prediction changes.
#[derive(Clone, Debug)]
pub struct TextBuffer {
    text: String,
    candidate: Option<String>,
    streak: usize,
    committed: bool,
    stable_frames: usize,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_FRAMES)
    }
}

impl TextBuffer {
    pub fn new(stable_frames: usize) -> Self {
        Self {
            text: String::new(),
            candidate: None,
            streak: 0,
            committed: false,
            stable_frames: stable_frames.max(1),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn observe(&mut self, label: &str) -> &str {
        if self.candidate.as_deref() != Some(label) {
            self.candidate = Some(label.to_string());
            self.streak = 0;
            self.committed = false;
        }
        self.streak += 1;

        if !self.committed && self.streak >= self.stable_frames {
            self.committed = true;
            self.apply(label);
        }
        &self.text
    }

    fn apply(&mut self, label: &str) {
        match label {
            NO_CHAR => {}
            "space" => self.text.push(' '),
            "del" => {
                self.text.pop();
            }
            other => {
                log::debug!("text += {other}");
                self.text.push_str(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::tests::hand;

    #[test]
    fn normalized_hand_is_wrist_relative() {
        let features = normalize_hand(&hand([true; 5])).unwrap();
        assert_eq!(features.len(), CHAR_FEATURES);
        assert_eq!(&features[..2], &[0.0, 0.0]);

        // Index and pinky knuckles end up one palm width apart.
        let (ix, iy) = (features[10], features[11]);
        let (px, py) = (features[34], features[35]);
        let span = ((ix - px).powi(2) + (iy - py).powi(2)).sqrt();
        assert!((span - 1.0).abs() < 1e-5);
    }

    #[test]
    fn partial_hand_is_not_normalized() {
        let short: LandmarkSet = hand([true; 5]).points()[..20].iter().copied().collect();
        assert!(normalize_hand(&short).is_none());
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn commits_after_stable_run_once() {
        let mut buffer = TextBuffer::new(3);
        for _ in 0..2 {
            buffer.observe("A");
        }
        assert_eq!(buffer.as_str(), "");
        buffer.observe("A");
        assert_eq!(buffer.as_str(), "A");
        for _ in 0..10 {
            buffer.observe("A");
        }
        assert_eq!(buffer.as_str(), "A");
    }

    #[test]
    fn interrupted_run_restarts() {
        let mut buffer = TextBuffer::new(2);
        buffer.observe("B");
        buffer.observe("C");
        buffer.observe("B");
        assert_eq!(buffer.as_str(), "");
        buffer.observe("B");
        assert_eq!(buffer.as_str(), "B");
    }

    #[test]
    fn editing_labels() {
        let mut buffer = TextBuffer::new(1);
        for label in ["H", "I", "space", "X", "del", "none", "O"] {
            buffer.observe(label);
        }
        assert_eq!(buffer.as_str(), "HI O");
    }

    #[test]
    fn repeated_letter_needs_a_break() {
        let mut buffer = TextBuffer::new(1);
        buffer.observe("L");
        buffer.observe("L");
        buffer.observe("none");
        buffer.observe("L");
        assert_eq!(buffer.as_str(), "LL");
    }
}
