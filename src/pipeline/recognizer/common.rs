use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LandmarkPoint, LandmarkSet};

pub const FACE_INPUT_SIZE: u32 = 256;
pub const HAND_INPUT_SIZE: u32 = 224;
pub const POSE_INPUT_SIZE: u32 = 368;
pub const SIGN_INPUT_SIZE: u32 = 224;

pub const POSE_MEAN: f32 = 127.5;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Output order of the face model's blendshape head.
pub const BLENDSHAPE_NAMES: [&str; 52] = [
    "_neutral",
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
];

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Model-input pixel position back to a normalized frame position.
    pub fn to_normalized(&self, x: f32, y: f32, z: f32) -> LandmarkPoint {
        let px = (x - self.pad_x) / self.scale;
        let py = (y - self.pad_y) / self.scale;
        LandmarkPoint::new(
            px / self.orig_w.max(1) as f32,
            py / self.orig_h.max(1) as f32,
            z / self.scale / self.orig_w.max(1) as f32,
        )
    }
}

fn check_buffer(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Bilinear resize of the RGBA frame to exactly `new_w` x `new_h`.
pub fn resize_rgba(frame: &Frame, new_w: u32, new_h: u32) -> Result<Vec<u8>> {
    check_buffer(frame)?;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    Ok(dst_image.into_vec())
}

/// Aspect-preserving resize onto a black `target_size` square, as an NHWC
/// tensor scaled to `[0, 1]`.
pub fn prepare_letterbox(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_buffer(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);
    let resized = resize_rgba(frame, new_w, new_h)?;

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    for px in canvas.chunks_mut(4) {
        px[3] = 255;
    }
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Stretches the frame to `size` x `size` and lays it out as an NCHW RGB
/// tensor, mapping each channel value through `normalize`.
pub fn prepare_planar<F>(frame: &Frame, size: u32, normalize: F) -> Result<Array4<f32>>
where
    F: Fn(usize, u8) -> f32 + Sync,
{
    let resized = resize_rgba(frame, size, size)?;
    let plane = (size as usize) * (size as usize);

    let mut data = vec![0f32; plane * 3];
    data.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(channel, out)| {
            for (dst, px) in out.iter_mut().zip(resized.chunks_exact(4)) {
                *dst = normalize(channel, px[channel]);
            }
        });

    Array4::<f32>::from_shape_vec((1, 3, size as usize, size as usize), data)
        .map_err(|err| anyhow!("failed to build planar tensor: {err}"))
}

pub fn pose_normalize(_channel: usize, value: u8) -> f32 {
    value as f32 - POSE_MEAN
}

pub fn imagenet_normalize(channel: usize, value: u8) -> f32 {
    (value as f32 / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
}

/// Splits a flat `[x, y, z, ...]` tensor into sets of `per_set` points,
/// mapping each through the letterbox back to frame space.
pub fn decode_landmark_sets(
    flat: &[f32],
    per_set: usize,
    max_sets: usize,
    letterbox: &LetterboxInfo,
) -> Result<Vec<LandmarkSet>> {
    let stride = per_set * 3;
    if flat.len() < stride {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            stride
        ));
    }

    Ok(flat
        .chunks_exact(stride)
        .take(max_sets)
        .map(|set| {
            set.chunks_exact(3)
                .map(|c| letterbox.to_normalized(c[0], c[1], c[2]))
                .collect()
        })
        .collect())
}
