//! Background execution of long-running validation jobs
//!
//! Validation runs on a dedicated named thread and talks to the caller
//! exclusively through a progress channel, a shared cancellation flag and
//! the join result. No locks; the worker owns its input snapshot outright.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{info, warn};

use crate::proximity::{ProximityInput, ProximityReport};
use crate::{Result, ValidationError};

/// Cooperative cancellation flag shared between a job and its caller.
///
/// Cancellation is polled between frame computations, never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed by the job between frames
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Progress notification emitted by a running validation job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Completion percentage in 0-100, non-decreasing over a run
    pub progress: f32,
}

/// The observer half handed into a validator run: a fire-and-forget
/// progress sink plus the cancellation flag.
#[derive(Debug, Clone)]
pub struct JobMonitor {
    token: CancellationToken,
    progress: Option<Sender<ProgressEvent>>,
}

impl JobMonitor {
    /// Monitor wired to a token and an optional progress channel
    pub fn new(token: CancellationToken, progress: Option<Sender<ProgressEvent>>) -> Self {
        Self { token, progress }
    }

    /// A monitor that reports nowhere and is never cancelled; for
    /// synchronous in-thread runs
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
            progress: None,
        }
    }

    /// Whether the observed token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Report completion percentage; never blocks, a gone receiver is fine
    pub fn report(&self, progress: f32) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ProgressEvent { progress });
        }
    }
}

/// A proximity validation running on its own worker thread.
///
/// The job owns a complete snapshot of its input; it never calls back into
/// the playback players.
#[derive(Debug)]
pub struct ProximityJob {
    token: CancellationToken,
    progress: Receiver<ProgressEvent>,
    handle: JoinHandle<Result<ProximityReport>>,
}

impl ProximityJob {
    /// Start validating `input` on a dedicated thread
    pub fn spawn(input: ProximityInput) -> Self {
        let token = CancellationToken::new();
        let (progress_tx, progress_rx) = unbounded();
        let monitor = JobMonitor::new(token.clone(), Some(progress_tx));

        let handle = thread::Builder::new()
            .name("proximity-validator".to_string())
            .spawn(move || {
                info!(
                    frames = input.frame_count,
                    drones = input.drone_count,
                    "proximity validation started"
                );
                let result = input.run(&monitor);
                match &result {
                    Ok(_) => info!("proximity validation finished"),
                    Err(ValidationError::Cancelled) => info!("proximity validation cancelled"),
                    Err(error) => warn!(%error, "proximity validation failed"),
                }
                result
            })
            .expect("failed to spawn proximity-validator thread");

        Self {
            token,
            progress: progress_rx,
            handle,
        }
    }

    /// Progress events in non-decreasing percentage order
    pub fn progress(&self) -> &Receiver<ProgressEvent> {
        &self.progress
    }

    /// Request cooperative cancellation of the run
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token observed by this job, for wiring into caller-side state
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the run to finish and return its result
    pub fn join(self) -> Result<ProximityReport> {
        self.handle
            .join()
            .expect("proximity-validator thread panicked")
    }
}
