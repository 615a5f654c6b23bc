mod common;

use std::collections::VecDeque;

use crossbeam_channel::unbounded;
use ndarray::{Array4, array};

use common::*;
use gesture_fusion::{
    Config, Error, Expression, FusionOrchestrator, GestureLabel, OutputRecord, Result,
    pipeline::recognizer::Engines,
    sign::SignCatalog,
    transport::{MemorySink, RecordSink},
    types::{BlendshapeSet, FaceResult, Frame, HeadPose},
};

fn config() -> Config {
    let mut config = Config::default();
    config.scheduler.wait_timeout_ms = 5_000;
    config.text.stable_frames = 2;
    config
}

fn orchestrator(engines: Engines) -> FusionOrchestrator {
    let catalog = SignCatalog::new(vec!["hello".into(), "thanks".into()]);
    FusionOrchestrator::new(engines, catalog, &config())
}

fn engines(face: Option<FaceResult>, hands: Vec<gesture_fusion::types::LandmarkSet>) -> Engines {
    Engines::new(Box::new(ScriptedFace(face)), Box::new(ScriptedHands(hands)))
}

#[test]
fn frame_without_snapshot_is_skipped() {
    let mut fusion = orchestrator(engines(None, Vec::new()));
    assert!(fusion.process_frame(&frame()).is_none());
    assert!(fusion.process_frame(&frame()).is_none());
}

#[test]
fn empty_frame_is_skipped() {
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), Vec::new()));
    assert!(fusion.process_frame(&Frame::new(Vec::new(), 0, 0)).is_none());
}

#[test]
fn nothing_detected_gives_default_record() {
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), Vec::new()));
    let fused = fusion.process_frame(&frame()).unwrap();
    assert_eq!(fused.record, OutputRecord::default());
    assert!(fused.sign_boxes.is_empty());
}

#[test]
fn face_yields_pose_and_expression() {
    let blink: BlendshapeSet = [("eyeBlinkLeft", 0.9), ("eyeBlinkRight", 0.8)]
        .into_iter()
        .collect();
    let mut fusion = orchestrator(engines(Some(frontal_face(Some(blink))), Vec::new()));

    let record = fusion.process_frame(&frame()).unwrap().record;
    assert!(record.face_found);
    assert_eq!(record.expression, Expression::Blink);
    assert!(record.head_pose.pitch.abs() < 0.1, "{:?}", record.head_pose);
    assert!(record.head_pose.yaw.abs() < 0.1, "{:?}", record.head_pose);
    assert!(record.head_pose.roll.abs() < 0.1, "{:?}", record.head_pose);
    assert!(!record.hand_found);
}

#[test]
fn face_without_blendshapes_stays_neutral() {
    let mut fusion = orchestrator(engines(Some(frontal_face(None)), Vec::new()));
    let record = fusion.process_frame(&frame()).unwrap().record;
    assert!(record.face_found);
    assert_eq!(record.expression, Expression::Neutral);
}

#[test]
fn unsolvable_face_zeroes_pose_for_that_frame_only() {
    let blink: BlendshapeSet = [("eyeBlinkLeft", 0.9), ("eyeBlinkRight", 0.8)]
        .into_iter()
        .collect();
    let faces = VecDeque::from([
        collapsed_face(Some(blink.clone())),
        turned_face(15.0, Some(blink)),
    ]);
    let engines = Engines::new(
        Box::new(FaceSequence(faces)),
        Box::new(ScriptedHands(Vec::new())),
    );
    let mut fusion = orchestrator(engines);

    let first = fusion.process_frame(&frame()).unwrap().record;
    assert!(first.face_found);
    assert_eq!(first.head_pose, HeadPose::default());
    assert_eq!(first.expression, Expression::Blink);

    let second = fusion.process_frame(&frame()).unwrap().record;
    assert!(second.face_found);
    assert!((second.head_pose.yaw + 15.0).abs() < 0.1, "{:?}", second.head_pose);
    assert_eq!(second.expression, Expression::Blink);
}

#[test]
fn thank_you_wins_over_single_hand_shape() {
    // Both hands are also a complete open palm, which alone would read as hello.
    let hands = vec![
        hand_at(0.3, 0.7, [true; 5]),
        hand_at(0.7, 0.7, [true; 5]),
    ];
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), hands));

    let record = fusion.process_frame(&frame()).unwrap().record;
    assert!(record.hand_found);
    assert_eq!(record.gesture, GestureLabel::ThankYou);
    assert_eq!(fusion.tracker().history(0).map(|h| h.len()), Some(0));
}

#[test]
fn single_hand_uses_tracker() {
    let hands = vec![hand_at(0.5, 0.6, [true, true, true, false, false])];
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), hands));

    let record = fusion.process_frame(&frame()).unwrap().record;
    assert_eq!(record.gesture, GestureLabel::Gun);
    assert_eq!(fusion.tracker().history(0).map(|h| h.len()), Some(1));
}

#[test]
fn sign_body_and_char_sections() {
    let mut engines = engines(
        Some(FaceResult::default()),
        vec![hand_at(0.5, 0.6, [false, true, true, false, false])],
    );
    engines.sign = Some(Box::new(FixedSign(sign_outputs(
        array![[0.0f32, 8.0, 0.0], [0.0, 0.0, 4.0]],
        array![[0.5f32, 0.5, 0.25, 0.5], [0.1, 0.1, 0.1, 0.1]],
    ))));
    let mut heatmaps = Array4::<f32>::zeros((1, 19, 46, 46));
    heatmaps[[0, 1, 23, 23]] = 0.9;
    engines.pose = Some(Box::new(FixedPose(heatmaps)));
    engines.char_model = Some(Box::new(FixedChar("A")));

    let mut fusion = orchestrator(engines);

    let first = fusion.process_frame(&frame()).unwrap();
    assert_eq!(first.record.sign_asl, "thanks");
    assert!(first.record.sign_conf > 0.99);
    assert_eq!(first.sign_boxes.len(), 1);
    assert_eq!(first.sign_boxes[0].bbox, [240, 120, 400, 360]);

    assert_eq!(first.record.body_pose.len(), 18);
    let neck = first.record.body_pose[1].unwrap();
    assert_eq!((neck.x, neck.y), (320, 240));
    assert_eq!(first.record.body_pose.iter().flatten().count(), 1);

    assert_eq!(first.record.asl_char, "A");
    assert_eq!(first.record.current_text, "");

    let second = fusion.process_frame(&frame()).unwrap();
    assert_eq!(second.record.current_text, "A");
    assert_eq!(fusion.current_text(), "A");
}

#[test]
fn no_hand_leaves_char_and_text_untouched() {
    let mut engines = engines(Some(FaceResult::default()), Vec::new());
    engines.char_model = Some(Box::new(FixedChar("B")));
    let mut fusion = orchestrator(engines);

    for _ in 0..3 {
        let record = fusion.process_frame(&frame()).unwrap().record;
        assert_eq!(record.asl_char, "none");
        assert_eq!(record.current_text, "");
    }
}

struct BrokenSink {
    attempts: usize,
}

impl RecordSink for BrokenSink {
    fn send(&mut self, _record: &OutputRecord) -> Result<()> {
        self.attempts += 1;
        Err(Error::Io(std::io::Error::other("network unreachable")))
    }
}

#[test]
fn send_failures_do_not_stop_the_loop() {
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), Vec::new()));
    let (tx, rx) = unbounded();
    for _ in 0..3 {
        tx.send(frame()).unwrap();
    }
    drop(tx);

    let mut sink = BrokenSink { attempts: 0 };
    let stats = fusion.run(&rx, &mut sink);
    assert_eq!(sink.attempts, 3);
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.send_failures, 3);
    assert_eq!(stats.records, 0);
}

#[test]
fn run_emits_one_record_per_processed_frame() {
    let mut fusion = orchestrator(engines(Some(FaceResult::default()), Vec::new()));
    let (tx, rx) = unbounded();
    tx.send(Frame::new(Vec::new(), 0, 0)).unwrap();
    for _ in 0..4 {
        tx.send(frame()).unwrap();
    }
    drop(tx);

    let mut sink = MemorySink::default();
    let stats = fusion.run(&rx, &mut sink);
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.skipped, 1);
    assert_eq!(sink.records.len(), 4);
}
