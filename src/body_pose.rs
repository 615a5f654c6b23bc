//! Heatmap decoding for the 18-joint body-pose network.

use ndarray::ArrayView4;

use crate::{Error, Result, types::Keypoint};

pub const BODY_KEYPOINTS: usize = 18;
/// Joint channels plus the background channel.
pub const MIN_HEATMAP_CHANNELS: usize = BODY_KEYPOINTS + 1;
pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.2;

pub const BODY_PART_NAMES: [&str; BODY_KEYPOINTS] = [
    "nose",
    "neck",
    "right_shoulder",
    "right_elbow",
    "right_wrist",
    "left_shoulder",
    "left_elbow",
    "left_wrist",
    "right_hip",
    "right_knee",
    "right_ankle",
    "left_hip",
    "left_knee",
    "left_ankle",
    "right_eye",
    "left_eye",
    "right_ear",
    "left_ear",
];

/// Joint-id pairs a consumer connects to draw the upper skeleton and legs.
pub const BODY_PAIRS: &[(usize, usize)] = &[
    (1, 2),
    (1, 5),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
];

/// Decodes `[1, C, H, W]` heatmaps into a fixed 18-slot keypoint list in
/// source-image pixels. A slot is `None` when its peak is not above `threshold`.
///
/// Peak search scans row-major and keeps the first maximum.
pub fn decode_heatmaps(
    heatmaps: ArrayView4<'_, f32>,
    source_width: u32,
    source_height: u32,
    threshold: f32,
) -> Result<Vec<Option<Keypoint>>> {
    let (batch, channels, rows, cols) = heatmaps.dim();
    if batch == 0 || channels < MIN_HEATMAP_CHANNELS || rows == 0 || cols == 0 {
        return Err(Error::InvalidInput(format!(
            "heatmap shape {:?} needs at least [1, {}, 1, 1]",
            heatmaps.shape(),
            MIN_HEATMAP_CHANNELS
        )));
    }

    let keypoints = (0..BODY_KEYPOINTS)
        .map(|id| {
            let channel = heatmaps.slice(ndarray::s![0, id, .., ..]);
            let (peak, (row, col)) = channel.indexed_iter().fold(
                (f32::NEG_INFINITY, (0, 0)),
                |best, (pos, &value)| if value > best.0 { (value, pos) } else { best },
            );

            (peak > threshold).then(|| Keypoint {
                id,
                x: (source_width as usize * col / cols) as i32,
                y: (source_height as usize * row / rows) as i32,
                conf: peak,
            })
        })
        .collect();

    Ok(keypoints)
}

/// Connected pairs whose endpoints are both present this frame.
pub fn visible_pairs(keypoints: &[Option<Keypoint>]) -> Vec<(Keypoint, Keypoint)> {
    BODY_PAIRS
        .iter()
        .filter_map(|&(a, b)| {
            let pa = keypoints.get(a).copied().flatten()?;
            let pb = keypoints.get(b).copied().flatten()?;
            Some((pa, pb))
        })
        .collect()
}
