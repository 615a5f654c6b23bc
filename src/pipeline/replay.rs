use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::{Context, Result, bail};
use crossbeam_channel::Sender;

use super::FrameStream;
use crate::types::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(image.into_raw(), width, height))
}

/// Still images in `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read image directory {}", dir.display()))?
    {
        let path = entry?.path();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if IMAGE_EXTENSIONS
                .iter()
                .any(|v| ext.eq_ignore_ascii_case(v))
            {
                images.push(path);
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Feeds every image in `dir` once, in order. Unlike the camera, replay
/// waits for the consumer instead of dropping frames.
pub fn start_replay_stream(dir: &Path, frame_tx: Sender<Frame>) -> Result<FrameStream> {
    let images = list_images(dir)?;
    if images.is_empty() {
        bail!("no png/jpg images in {}", dir.display());
    }
    log::info!("replaying {} images from {}", images.len(), dir.display());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        for path in images {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            let frame = match load_frame(&path) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("skipping {}: {err:?}", path.display());
                    continue;
                }
            };
            if frame_tx.send(frame).is_err() {
                break;
            }
        }
        log::info!("replay finished");
    });

    Ok(FrameStream::new(stop, handle))
}
