//! Runs the face and hand landmark models side by side on one worker thread
//! and publishes their joint result as a single snapshot.

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::{
    pipeline::recognizer::{FaceLandmarker, HandLandmarker},
    types::{FaceResult, Frame, HandResult},
};

/// Face and hand results computed from the same frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceSnapshot {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub face: FaceResult,
    pub hands: HandResult,
}

#[derive(Default)]
struct SharedState {
    snapshot: Option<Arc<InferenceSnapshot>>,
    /// Last job the worker finished, whether or not it published.
    completed_seq: u64,
}

type Shared = Arc<(Mutex<SharedState>, Condvar)>;

struct Job {
    seq: u64,
    frame: Frame,
}

pub struct DualModelScheduler {
    job_tx: Option<Sender<Job>>,
    shared: Shared,
    next_seq: u64,
    worker: Option<thread::JoinHandle<()>>,
}

impl DualModelScheduler {
    pub fn start(face: Box<dyn FaceLandmarker>, hand: Box<dyn HandLandmarker>) -> Self {
        // One queued job on top of the one in flight; anything more is dropped.
        let (job_tx, job_rx) = bounded(1);
        let shared: Shared = Arc::new((Mutex::new(SharedState::default()), Condvar::new()));
        let worker_shared = shared.clone();

        let worker = thread::spawn(move || run_worker(face, hand, job_rx, worker_shared));

        Self {
            job_tx: Some(job_tx),
            shared,
            next_seq: 0,
            worker: Some(worker),
        }
    }

    /// Queues `frame` for landmark inference without blocking.
    ///
    /// Returns the job sequence number, or `None` when the worker already has
    /// a frame waiting and this one was dropped.
    pub fn submit(&mut self, frame: &Frame) -> Option<u64> {
        let job_tx = self.job_tx.as_ref()?;
        let seq = self.next_seq + 1;
        match job_tx.try_send(Job {
            seq,
            frame: frame.clone(),
        }) {
            Ok(()) => {
                self.next_seq = seq;
                Some(seq)
            }
            Err(TrySendError::Full(_)) => {
                log::trace!("landmark worker busy, frame dropped");
                None
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("landmark worker is gone, frame dropped");
                None
            }
        }
    }

    /// Most recently published snapshot, `None` until the first joint result.
    pub fn latest(&self) -> Option<Arc<InferenceSnapshot>> {
        let (lock, _) = &*self.shared;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// Waits at most `timeout` for job `seq` to finish, then returns the
    /// latest snapshot. A timeout or failed job yields the previous one.
    pub fn wait_for(&self, seq: u64, timeout: Duration) -> Option<Arc<InferenceSnapshot>> {
        let (lock, cvar) = &*self.shared;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, wait) = cvar
            .wait_timeout_while(guard, timeout, |state| state.completed_seq < seq)
            .unwrap_or_else(PoisonError::into_inner);

        if wait.timed_out() {
            log::debug!(
                "landmarks for job {seq} not ready after {timeout:?}, using job {}",
                guard.snapshot.as_ref().map(|s| s.seq).unwrap_or(0)
            );
        }
        guard.snapshot.clone()
    }

    pub fn completed_seq(&self) -> u64 {
        let (lock, _) = &*self.shared;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed_seq
    }
}

impl Drop for DualModelScheduler {
    fn drop(&mut self) {
        self.job_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    mut face: Box<dyn FaceLandmarker>,
    mut hand: Box<dyn HandLandmarker>,
    job_rx: Receiver<Job>,
    shared: Shared,
) {
    let epoch = Instant::now();
    let mut last_timestamp: Option<u64> = None;

    while let Some(job) = recv_latest_job(&job_rx) {
        let elapsed = job.frame.timestamp.saturating_duration_since(epoch).as_millis() as u64;
        let timestamp_ms = match last_timestamp {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        last_timestamp = Some(timestamp_ms);

        let (face_result, hand_result) = rayon::join(
            || face.detect(&job.frame, timestamp_ms),
            || hand.detect(&job.frame, timestamp_ms),
        );

        let snapshot = match (face_result, hand_result) {
            (Ok(face), Ok(hands)) => Some(Arc::new(InferenceSnapshot {
                seq: job.seq,
                timestamp_ms,
                face,
                hands,
            })),
            (face_result, hand_result) => {
                if let Err(err) = face_result {
                    log::warn!("face landmark inference failed: {err:?}");
                }
                if let Err(err) = hand_result {
                    log::warn!("hand landmark inference failed: {err:?}");
                }
                None
            }
        };

        let (lock, cvar) = &*shared;
        {
            let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(snapshot) = snapshot {
                state.snapshot = Some(snapshot);
            }
            state.completed_seq = job.seq;
        }
        cvar.notify_all();
    }
}

fn recv_latest_job(job_rx: &Receiver<Job>) -> Option<Job> {
    let mut job = job_rx.recv().ok()?;
    while let Ok(newer) = job_rx.try_recv() {
        job = newer;
    }
    Some(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crossbeam_channel::unbounded;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<u64>>>);

    impl Recorded {
        fn timestamps(&self) -> Vec<u64> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeFace {
        seen: Recorded,
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    impl FaceLandmarker for FakeFace {
        fn detect(&mut self, _frame: &Frame, timestamp_ms: u64) -> anyhow::Result<FaceResult> {
            if let Some((started, release)) = &self.gate {
                started.send(()).unwrap();
                release.recv().unwrap();
            }
            self.seen.0.lock().unwrap().push(timestamp_ms);
            Ok(FaceResult::default())
        }
    }

    struct FakeHand {
        fail_on: Option<u64>,
        calls: u64,
    }

    impl HandLandmarker for FakeHand {
        fn detect(&mut self, _frame: &Frame, _timestamp_ms: u64) -> anyhow::Result<HandResult> {
            self.calls += 1;
            if Some(self.calls) == self.fail_on {
                return Err(anyhow!("hand model crashed"));
            }
            Ok(HandResult::default())
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 16], 2, 2)
    }

    fn scheduler(fail_on: Option<u64>) -> (DualModelScheduler, Recorded) {
        let seen = Recorded::default();
        let face = FakeFace {
            seen: seen.clone(),
            gate: None,
        };
        let hand = FakeHand { fail_on, calls: 0 };
        (
            DualModelScheduler::start(Box::new(face), Box::new(hand)),
            seen,
        )
    }

    #[test]
    fn nothing_published_before_first_job() {
        let (scheduler, _) = scheduler(None);
        assert!(scheduler.latest().is_none());
        assert_eq!(scheduler.completed_seq(), 0);
    }

    #[test]
    fn wait_returns_this_frames_snapshot() {
        let (mut scheduler, _) = scheduler(None);
        let seq = scheduler.submit(&frame()).unwrap();
        let snapshot = scheduler.wait_for(seq, WAIT).unwrap();
        assert_eq!(snapshot.seq, seq);
        assert_eq!(scheduler.latest().unwrap().seq, seq);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let (mut scheduler, seen) = scheduler(None);
        // Frames share one capture instant, so the worker has to bump them.
        let same = frame();
        for _ in 0..5 {
            let seq = scheduler.submit(&same).unwrap();
            scheduler.wait_for(seq, WAIT);
        }
        let stamps = seen.timestamps();
        assert_eq!(stamps.len(), 5);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]), "{stamps:?}");
    }

    #[test]
    fn failed_job_keeps_previous_snapshot() {
        let (mut scheduler, _) = scheduler(Some(2));
        let first = scheduler.submit(&frame()).unwrap();
        scheduler.wait_for(first, WAIT).unwrap();

        let second = scheduler.submit(&frame()).unwrap();
        let snapshot = scheduler.wait_for(second, WAIT).unwrap();
        assert_eq!(scheduler.completed_seq(), second);
        assert_eq!(snapshot.seq, first);
    }

    #[test]
    fn overlapping_submissions_are_dropped() {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let face = FakeFace {
            seen: Recorded::default(),
            gate: Some((started_tx, release_rx)),
        };
        let hand = FakeHand {
            fail_on: None,
            calls: 0,
        };
        let mut scheduler = DualModelScheduler::start(Box::new(face), Box::new(hand));

        let first = scheduler.submit(&frame()).unwrap();
        started_rx.recv().unwrap();
        let queued = scheduler.submit(&frame()).unwrap();
        assert!(scheduler.submit(&frame()).is_none());

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert_eq!(scheduler.wait_for(queued, WAIT).unwrap().seq, queued);
        assert!(queued > first);
    }

    #[test]
    fn short_wait_falls_back_to_stale_snapshot() {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let face = FakeFace {
            seen: Recorded::default(),
            gate: Some((started_tx, release_rx)),
        };
        let hand = FakeHand {
            fail_on: None,
            calls: 0,
        };
        let mut scheduler = DualModelScheduler::start(Box::new(face), Box::new(hand));

        let first = scheduler.submit(&frame()).unwrap();
        started_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        scheduler.wait_for(first, WAIT).unwrap();

        let second = scheduler.submit(&frame()).unwrap();
        started_rx.recv().unwrap();
        let stale = scheduler.wait_for(second, Duration::from_millis(10)).unwrap();
        assert_eq!(stale.seq, first);

        release_tx.send(()).unwrap();
        assert_eq!(scheduler.wait_for(second, WAIT).unwrap().seq, second);
    }
}
