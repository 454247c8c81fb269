//! The real-time capture-and-submission loop. Owns the microphone source for
//! the duration of a session, pumps fixed-length chunks to the classifier,
//! and keeps the in-memory detection log. Never more than one submission is
//! outstanding: when the backend is slower than the chunk interval, new
//! chunks are discarded rather than queued.

use crate::audio::{AudioChunk, AudioSource};
use crate::classify::{Classify, Detection};
use crate::log_debug;
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the pump re-checks the stop flag while waiting for a chunk.
const PUMP_POLL: Duration = Duration::from_millis(100);

/// Failure classes of the capture loop. Only device acquisition is fatal to
/// the caller; per-chunk failures are logged and swallowed by the loop.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("chunk submission failed: {0}")]
    SubmissionFailed(String),
    #[error("monitoring is already active")]
    AlreadyActive,
}

/// One classification result, newest first in the session log.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub id: u64,
    pub kind: crate::classify::AircraftKind,
    pub confidence: f32,
    pub time: DateTime<Local>,
}

/// Counters the UI and diagnostics read while a session runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Chunks actually handed to the classifier.
    pub submitted: usize,
    /// Chunks discarded because a submission was still in flight.
    pub dropped: usize,
    /// Submissions that failed (transport, status, or parse).
    pub failed: usize,
}

/// State shared between the pump, the submission worker, and the owner.
struct SessionShared {
    /// Single-permit guard: held from chunk handoff until the submission
    /// completes, success or failure.
    in_flight: AtomicBool,
    stopping: AtomicBool,
    submitted: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
    next_id: AtomicU64,
    log: Mutex<Vec<DetectionEvent>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            submitted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            log: Mutex::new(Vec::new()),
        }
    }
}

/// One monitoring session: `Inactive` until `start` succeeds, `Active` until
/// `stop` (or drop). The detection log outlives start/stop cycles and dies
/// with the session.
pub struct MonitorSession {
    source: Box<dyn AudioSource>,
    classifier: Arc<dyn Classify>,
    shared: Arc<SessionShared>,
    pump: Option<JoinHandle<()>>,
    submitter: Option<JoinHandle<()>>,
    active: bool,
}

impl MonitorSession {
    pub fn new(source: Box<dyn AudioSource>, classifier: Arc<dyn Classify>) -> Self {
        Self {
            source,
            classifier,
            shared: Arc::new(SessionShared::new()),
            pump: None,
            submitter: None,
            active: false,
        }
    }

    /// Acquire the device and begin producing chunks. Fails without changing
    /// state when the device cannot be opened; refuses to start twice.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.active {
            return Err(MonitorError::AlreadyActive);
        }

        let chunks = self
            .source
            .start()
            .map_err(|err| MonitorError::DeviceUnavailable(format!("{err:#}")))?;

        self.shared.stopping.store(false, Ordering::SeqCst);

        // Capacity 1 is enough: the guard ensures the pump never hands over
        // a chunk while a previous one is still with the worker.
        let (submit_tx, submit_rx) = bounded::<AudioChunk>(1);

        let worker_shared = self.shared.clone();
        let classifier = self.classifier.clone();
        self.submitter = Some(thread::spawn(move || {
            submit_worker(submit_rx, classifier, worker_shared);
        }));

        let pump_shared = self.shared.clone();
        self.pump = Some(thread::spawn(move || {
            chunk_pump(chunks, submit_tx, pump_shared);
        }));

        self.active = true;
        Ok(())
    }

    /// Tear the session down. Idempotent: calling while inactive is a no-op.
    /// Releases the device, halts the pump, and guarantees that no further
    /// submission starts, even if a chunk was mid-flight.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.shared.stopping.store(true, Ordering::SeqCst);

        // Each release step stands alone so one failure cannot keep the
        // others from running.
        self.source.stop();

        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                log_debug("chunk pump panicked during shutdown");
            }
        }

        // The worker exits once the pump's sender is gone. A mid-flight
        // request may still be waiting on the backend, so it is left to
        // finish on its own thread rather than blocking stop().
        if let Some(handle) = self.submitter.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log_debug("submission worker panicked during shutdown");
                }
            } else {
                drop(handle);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current 0-100 input level; always 0 while inactive.
    pub fn signal_level(&self) -> f32 {
        if self.active {
            self.source.current_level()
        } else {
            0.0
        }
    }

    /// Snapshot of the detection log, newest first.
    pub fn detections(&self) -> Vec<DetectionEvent> {
        self.shared
            .log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Explicit clear action; the only way besides dropping the session to
    /// discard recorded detections.
    pub fn clear_detections(&self) {
        if let Ok(mut log) = self.shared.log.lock() {
            log.clear();
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forwards chunks from the capture channel to the submission worker, or
/// discards them while a submission is outstanding.
fn chunk_pump(
    chunks: Receiver<AudioChunk>,
    submit_tx: Sender<AudioChunk>,
    shared: Arc<SessionShared>,
) {
    loop {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        match chunks.recv_timeout(PUMP_POLL) {
            Ok(chunk) => {
                if shared
                    .in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Overlap: drop the chunk, never queue it.
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    log_debug("chunk dropped: previous submission still in flight");
                    continue;
                }
                if submit_tx.send(chunk).is_err() {
                    shared.in_flight.store(false, Ordering::Release);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Runs submissions one at a time and releases the in-flight guard when each
/// completes, success or failure. Skips anything handed over after a stop was
/// requested so no new submission starts past `stop()`.
fn submit_worker(
    chunks: Receiver<AudioChunk>,
    classifier: Arc<dyn Classify>,
    shared: Arc<SessionShared>,
) {
    for chunk in chunks.iter() {
        if shared.stopping.load(Ordering::SeqCst) {
            shared.in_flight.store(false, Ordering::Release);
            continue;
        }

        shared.submitted.fetch_add(1, Ordering::Relaxed);
        match classifier.classify_chunk(chunk.bytes()) {
            Ok(detection) => record_detection(&shared, detection),
            Err(err) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                let failure = MonitorError::SubmissionFailed(format!("{err:#}"));
                log_debug(&failure.to_string());
            }
        }
        shared.in_flight.store(false, Ordering::Release);
    }
}

fn record_detection(shared: &SessionShared, detection: Detection) {
    let event = DetectionEvent {
        id: shared.next_id.fetch_add(1, Ordering::Relaxed),
        kind: detection.kind,
        confidence: detection.confidence,
        time: Local::now(),
    };
    if let Ok(mut log) = shared.log.lock() {
        log.insert(0, event);
    }
}
