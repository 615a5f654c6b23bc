#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod recognizer;
pub mod replay;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, available_cameras, start_camera_stream};
pub use recognizer::{Engines, load_engines};
pub use replay::{list_images, load_frame, start_replay_stream};

/// Background producer feeding frames into a channel. Dropping it stops the
/// producer and waits for its thread.
#[derive(Debug)]
pub struct FrameStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameStream {
    pub(crate) fn new(stop: Arc<AtomicBool>, handle: thread::JoinHandle<()>) -> Self {
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Waits for the producer to run out of frames on its own.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
