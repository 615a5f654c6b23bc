//! Per-frame fusion of landmark, pose, sign and character results into one
//! output record.

use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::{
    body_pose::decode_heatmaps,
    char_classifier::{NO_CHAR, TextBuffer, normalize_hand},
    config::{Config, Thresholds},
    expression::classify_expression,
    gesture::GestureTracker,
    head_pose::PoseSolver,
    pipeline::recognizer::{CharModel, Engines, PoseNetwork, SignDetectorModel},
    scheduler::{DualModelScheduler, InferenceSnapshot},
    sign::{SignCatalog, SignDetection, postprocess},
    transport::RecordSink,
    types::{FusedFrame, Frame, Keypoint, LandmarkSet, OutputRecord},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub records: u64,
    pub skipped: u64,
    pub send_failures: u64,
}

pub struct FusionOrchestrator {
    scheduler: DualModelScheduler,
    pose_solver: PoseSolver,
    tracker: GestureTracker,
    text: TextBuffer,
    pose_network: Option<Box<dyn PoseNetwork>>,
    sign_detector: Option<Box<dyn SignDetectorModel>>,
    char_model: Option<Box<dyn CharModel>>,
    catalog: SignCatalog,
    thresholds: Thresholds,
    wait_timeout: Duration,
}

impl FusionOrchestrator {
    pub fn new(engines: Engines, catalog: SignCatalog, config: &Config) -> Self {
        let Engines {
            face,
            hand,
            pose,
            sign,
            char_model,
        } = engines;

        Self {
            scheduler: DualModelScheduler::start(face, hand),
            pose_solver: PoseSolver::new(),
            tracker: GestureTracker::new(),
            text: TextBuffer::new(config.text.stable_frames),
            pose_network: pose,
            sign_detector: sign,
            char_model,
            catalog,
            thresholds: config.thresholds,
            wait_timeout: Duration::from_millis(config.scheduler.wait_timeout_ms),
        }
    }

    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    pub fn current_text(&self) -> &str {
        self.text.as_str()
    }

    /// Fuses one frame. `None` when the frame is empty or no landmark
    /// snapshot exists yet; otherwise exactly one record.
    pub fn process_frame(&mut self, frame: &Frame) -> Option<FusedFrame> {
        if frame.is_empty() {
            log::debug!("skipping empty frame");
            return None;
        }

        let snapshot = match self.scheduler.submit(frame) {
            Some(seq) => self.scheduler.wait_for(seq, self.wait_timeout),
            None => self.scheduler.latest(),
        };
        let Some(snapshot) = snapshot else {
            log::trace!("no landmark snapshot yet, frame skipped");
            return None;
        };

        let mut record = OutputRecord::default();
        self.fuse_face(&snapshot, frame, &mut record);
        self.fuse_hands(&snapshot.hands.hands, &mut record);

        let sign = self.detect_sign(frame);
        record.sign_asl = sign.label.clone();
        record.sign_conf = sign.confidence;

        if let Some(body_pose) = self.decode_body(frame) {
            record.body_pose = body_pose;
        }

        record.current_text = self.text.as_str().to_string();

        log::debug!(
            "job {} face={} hand={} expression={} gesture={} sign={} char={}",
            snapshot.seq,
            record.face_found,
            record.hand_found,
            record.expression.label(),
            record.gesture.label(),
            record.sign_asl,
            record.asl_char
        );

        Some(FusedFrame {
            record,
            sign_boxes: sign.boxes,
        })
    }

    fn fuse_face(&self, snapshot: &InferenceSnapshot, frame: &Frame, record: &mut OutputRecord) {
        let Some(face) = snapshot.face.faces.first() else {
            return;
        };
        record.face_found = true;

        match self
            .pose_solver
            .estimate(&face.landmarks, frame.width, frame.height)
        {
            Ok(pose) => record.head_pose = pose,
            Err(err) => log::debug!("head pose unavailable: {err}"),
        }

        if let Some(blendshapes) = &face.blendshapes {
            record.expression = classify_expression(blendshapes);
        }
    }

    fn fuse_hands(&mut self, hands: &[LandmarkSet], record: &mut OutputRecord) {
        let Some(first) = hands.first() else {
            return;
        };
        record.hand_found = true;
        record.gesture = self.tracker.resolve(hands);

        if let Some(label) = self.classify_char(first) {
            self.text.observe(&label);
            record.asl_char = label;
        }
    }

    fn classify_char(&mut self, hand: &LandmarkSet) -> Option<String> {
        let model = self.char_model.as_mut()?;
        let Some(features) = normalize_hand(hand) else {
            return Some(NO_CHAR.to_string());
        };
        match model.predict(&features) {
            Ok(label) => Some(label),
            Err(err) => {
                log::warn!("character classification failed: {err:?}");
                None
            }
        }
    }

    fn detect_sign(&mut self, frame: &Frame) -> SignDetection {
        let Some(detector) = self.sign_detector.as_mut() else {
            return SignDetection::none();
        };
        let outputs = match detector.infer(frame) {
            Ok(outputs) => outputs,
            Err(err) => {
                log::warn!("sign detection failed: {err:?}");
                return SignDetection::none();
            }
        };
        postprocess(
            outputs.logits.view(),
            outputs.boxes.view(),
            frame.width,
            frame.height,
            self.thresholds.sign_confidence,
            &self.catalog,
        )
        .unwrap_or_else(|err| {
            log::warn!("sign postprocessing failed: {err}");
            SignDetection::none()
        })
    }

    fn decode_body(&mut self, frame: &Frame) -> Option<Vec<Option<Keypoint>>> {
        let network = self.pose_network.as_mut()?;
        let heatmaps = network
            .heatmaps(frame)
            .map_err(|err| log::warn!("body pose inference failed: {err:?}"))
            .ok()?;
        decode_heatmaps(
            heatmaps.view(),
            frame.width,
            frame.height,
            self.thresholds.body_keypoint,
        )
        .map_err(|err| log::warn!("body pose decoding failed: {err}"))
        .ok()
    }

    /// Fuses frames until the channel closes, sending each record to `sink`.
    /// Send failures drop that record and the loop carries on.
    pub fn run(&mut self, frames: &Receiver<Frame>, sink: &mut dyn RecordSink) -> RunStats {
        let mut stats = RunStats::default();

        while let Ok(frame) = frames.recv() {
            stats.frames += 1;
            let Some(fused) = self.process_frame(&frame) else {
                stats.skipped += 1;
                continue;
            };

            match sink.send(&fused.record) {
                Ok(()) => stats.records += 1,
                Err(err) => {
                    stats.send_failures += 1;
                    log::warn!("failed to send record: {err}");
                }
            }
        }

        log::info!(
            "frame source closed after {} frames ({} sent, {} skipped, {} send failures)",
            stats.frames,
            stats.records,
            stats.skipped,
            stats.send_failures
        );
        stats
    }
}
