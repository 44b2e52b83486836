//! SwarmView Safety - Show Validation Engine
//!
//! This crate checks whole drone shows for safety violations:
//! - Sampling every drone's trajectory into a flat per-frame position buffer
//! - Closest-pair proximity analysis over that buffer, frame by frame
//! - A background worker wrapper with progress events and cooperative
//!   cancellation, so validation never blocks an interactive thread
//!
//! The validator is logically a pure function over a snapshot of position
//! data; it shares no mutable state with the playback side.

#![warn(missing_docs)]

use thiserror::Error;

use swarmview_core::TrajectoryError;

pub mod proximity;
pub mod sampling;
pub mod worker;

// Validation
pub use proximity::{find_closest_pairs, ProximityInput, ProximityReport, ProximitySettings};

// Sampling
pub use sampling::{reference_positions, sample_show_positions, ShowPositions};

// Background jobs
pub use worker::{CancellationToken, JobMonitor, ProgressEvent, ProximityJob};

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The flat position buffer does not match `frames × drones × 3`
    #[error("position buffer holds {actual} floats, expected {expected} (frames x drones x 3)")]
    PositionBufferMismatch {
        /// Required buffer length
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// A takeoff/landing reference array does not cover every drone
    #[error("{side} reference positions cover {actual} drones, expected {expected}")]
    ReferenceLengthMismatch {
        /// Which reference array was malformed ("takeoff" or "landing")
        side: &'static str,
        /// Required entry count (the drone count)
        expected: usize,
        /// Entry count actually supplied
        actual: usize,
    },

    /// Sampling was requested at a non-finite or non-positive frame rate
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f64),

    /// Sampling was requested over a non-finite or negative duration
    #[error("invalid sample duration {0}")]
    InvalidDuration(f64),

    /// The run observed its cancellation signal and stopped; an expected
    /// outcome of a long validation, not a data error
    #[error("validation cancelled")]
    Cancelled,

    /// A trajectory could not be sampled
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

/// Result type for validation operations
pub type Result<T> = std::result::Result<T, ValidationError>;
