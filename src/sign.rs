//! Sign-detector postprocessing and the class catalog it labels with.

use std::{fs, path::Path};

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, types::SignBox};

pub const DEFAULT_SIGN_THRESHOLD: f32 = 0.7;
pub const NO_SIGN: &str = "none";
pub const UNKNOWN_SIGN: &str = "unknown";

/// Ordered class names the detector was trained on, with an optional
/// parallel list of display colors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignCatalog {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<[u8; 3]>,
}

impl SignCatalog {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            classes,
            colors: Vec::new(),
        }
    }

    /// Reads the catalog file. A missing or malformed file yields an empty
    /// catalog so detection keeps running with `unknown` labels.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(catalog) => {
                log::info!(
                    "loaded {} sign classes from {}",
                    catalog.classes.len(),
                    path.display()
                );
                catalog
            }
            Err(err) => {
                log::warn!(
                    "sign catalog {} unavailable, continuing with no classes: {err}",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn label(&self, class_id: usize) -> &str {
        self.classes
            .get(class_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SIGN)
    }

    pub fn color(&self, class_id: usize) -> Option<[u8; 3]> {
        self.colors.get(class_id).copied()
    }
}

/// Best sign of the frame plus every slot that cleared the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct SignDetection {
    pub label: String,
    pub confidence: f32,
    pub boxes: Vec<SignBox>,
}

impl SignDetection {
    pub fn none() -> Self {
        Self {
            label: NO_SIGN.to_string(),
            confidence: 0.0,
            boxes: Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl Default for SignDetection {
    fn default() -> Self {
        Self::none()
    }
}

pub fn softmax(logits: ArrayView1<'_, f32>) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum_exps: f32 = exps.iter().sum();
    exps.iter().map(|&x| x / sum_exps).collect()
}

/// Center-form normalized box to corner-form pixels, truncating toward zero.
pub fn box_to_corners(cx: f32, cy: f32, w: f32, h: f32, width: u32, height: u32) -> [i32; 4] {
    let (fw, fh) = (width as f32, height as f32);
    [
        ((cx - w / 2.0) * fw) as i32,
        ((cy - h / 2.0) * fh) as i32,
        ((cx + w / 2.0) * fw) as i32,
        ((cy + h / 2.0) * fh) as i32,
    ]
}

/// Turns `[N, K+1]` logits and `[N, 4]` center-form boxes into a detection.
///
/// The last logit column is the no-object class and never wins. A slot is
/// kept when its best class probability is above `threshold`.
pub fn postprocess(
    logits: ArrayView2<'_, f32>,
    boxes: ArrayView2<'_, f32>,
    width: u32,
    height: u32,
    threshold: f32,
    catalog: &SignCatalog,
) -> Result<SignDetection> {
    let (slots, columns) = logits.dim();
    if columns < 2 {
        return Err(Error::InvalidInput(format!(
            "sign logits need a class and a no-object column, got {columns}"
        )));
    }
    if boxes.nrows() != slots || boxes.ncols() < 4 {
        return Err(Error::InvalidInput(format!(
            "sign boxes shape {:?} does not match {} slots",
            boxes.shape(),
            slots
        )));
    }

    let mut kept = Vec::new();
    let mut best: Option<(usize, f32)> = None;

    for (slot, row) in logits.outer_iter().enumerate() {
        let probs = softmax(row);
        let Some((class_id, confidence)) = probs[..columns - 1]
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .fold(None, |acc: Option<(usize, f32)>, (idx, p)| match acc {
                Some((_, top)) if top >= p => acc,
                _ => Some((idx, p)),
            })
        else {
            continue;
        };

        // NaN never clears the threshold.
        if !(confidence > threshold) {
            continue;
        }

        if best.is_none_or(|(_, top)| confidence > top) {
            best = Some((kept.len(), confidence));
        }

        let b = boxes.row(slot);
        kept.push(SignBox {
            class_id,
            label: catalog.label(class_id).to_string(),
            confidence,
            bbox: box_to_corners(b[0], b[1], b[2], b[3], width, height),
        });
    }

    let Some((best_idx, _)) = best else {
        return Ok(SignDetection::none());
    };
    let top = &kept[best_idx];
    log::trace!(
        "sign {} ({:.2}) best of {} kept slots",
        top.label,
        top.confidence,
        kept.len()
    );

    Ok(SignDetection {
        label: top.label.clone(),
        confidence: top.confidence,
        boxes: kept,
    })
}
