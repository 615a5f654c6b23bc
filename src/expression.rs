use serde::{Deserialize, Serialize};

use crate::types::BlendshapeSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Blink,
    Tongue,
    Cute,
    Angry,
    Surprised,
    Happy,
    Sad,
    #[default]
    Neutral,
}

impl Expression {
    pub fn label(&self) -> &'static str {
        match self {
            Expression::Blink => "blink",
            Expression::Tongue => "tongue",
            Expression::Cute => "cute",
            Expression::Angry => "angry",
            Expression::Surprised => "surprised",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Neutral => "neutral",
        }
    }
}

/// Scores the rule table reads. Paired action units are kept per side where
/// a rule needs both sides to pass on their own.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExpressionScores {
    pub smile: f32,
    pub frown: f32,
    pub blink_left: f32,
    pub blink_right: f32,
    pub brow_down_left: f32,
    pub brow_down_right: f32,
    pub jaw_open: f32,
    pub tongue_out: f32,
    pub brow_inner_up: f32,
    pub mouth_pucker: f32,
}

impl ExpressionScores {
    pub fn from_blendshapes(set: &BlendshapeSet) -> Self {
        let avg = |a: &str, b: &str| (set.score(a) + set.score(b)) / 2.0;
        Self {
            smile: avg("mouthSmileLeft", "mouthSmileRight"),
            frown: avg("mouthFrownLeft", "mouthFrownRight"),
            blink_left: set.score("eyeBlinkLeft"),
            blink_right: set.score("eyeBlinkRight"),
            brow_down_left: set.score("browDownLeft"),
            brow_down_right: set.score("browDownRight"),
            jaw_open: set.score("jawOpen"),
            tongue_out: set.score("tongueOut"),
            brow_inner_up: set.score("browInnerUp"),
            mouth_pucker: set.score("mouthPucker"),
        }
    }

    pub fn blink(&self) -> f32 {
        (self.blink_left + self.blink_right) / 2.0
    }

    pub fn brow_down(&self) -> f32 {
        (self.brow_down_left + self.brow_down_right) / 2.0
    }
}

type Rule = (fn(&ExpressionScores) -> bool, Expression);

/// Priority table, evaluated top to bottom; the first matching row wins.
///
/// | # | condition                                         | label       |
/// |---|---------------------------------------------------|-------------|
/// | 1 | both eye blinks > 0.5                             | `blink`     |
/// | 2 | tongueOut > 0.5 and jawOpen > 0.3                 | `tongue`    |
/// | 3 | mouthPucker > 0.5                                 | `cute`      |
/// | 4 | both brow downs > 0.3                             | `angry`     |
/// | 5 | browInnerUp > 0.4, or jawOpen > 0.3 and smile < 0.3 | `surprised` |
/// | 6 | smile > 0.35                                      | `happy`     |
/// | 7 | frown > 0.3                                       | `sad`       |
/// | - | otherwise                                         | `neutral`   |
pub const EXPRESSION_RULES: &[Rule] = &[
    (|s| s.blink_left > 0.5 && s.blink_right > 0.5, Expression::Blink),
    (|s| s.tongue_out > 0.5 && s.jaw_open > 0.3, Expression::Tongue),
    (|s| s.mouth_pucker > 0.5, Expression::Cute),
    (
        |s| s.brow_down_left > 0.3 && s.brow_down_right > 0.3,
        Expression::Angry,
    ),
    (
        |s| s.brow_inner_up > 0.4 || (s.jaw_open > 0.3 && s.smile < 0.3),
        Expression::Surprised,
    ),
    (|s| s.smile > 0.35, Expression::Happy),
    (|s| s.frown > 0.3, Expression::Sad),
];

pub fn classify_scores(scores: &ExpressionScores) -> Expression {
    EXPRESSION_RULES
        .iter()
        .find(|(matches, _)| matches(scores))
        .map(|(_, label)| *label)
        .unwrap_or(Expression::Neutral)
}

pub fn classify_expression(blendshapes: &BlendshapeSet) -> Expression {
    let scores = ExpressionScores::from_blendshapes(blendshapes);
    log::trace!(
        "smile:{:.2}, frown:{:.2}, blink:{:.2}, jawOpen:{:.2}, tongue:{:.2}, brow_down:{:.2}, brow_up:{:.2}",
        scores.smile,
        scores.frown,
        scores.blink(),
        scores.jaw_open,
        scores.tongue_out,
        scores.brow_down(),
        scores.brow_inner_up
    );
    classify_scores(&scores)
}
