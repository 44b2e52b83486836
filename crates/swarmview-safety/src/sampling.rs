//! Sampling trajectory players into the validator's flat position buffer
//!
//! The validation workflow polls every drone's trajectory player at a fixed
//! frame rate across the show duration, in increasing time order so the
//! players' monotonic fast paths apply, and packs the results into the
//! row-major buffer the proximity validator consumes.

use glam::Vec3;
use tracing::debug;

use swarmview_core::TrajectoryPlayer;

use crate::proximity::{ProximityInput, ProximitySettings};
use crate::{Result, ValidationError};

/// Sampled positions for a whole show, row-major `frame × drone × 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowPositions {
    /// The flat position buffer
    pub data: Vec<f32>,
    /// Number of sampled frames
    pub frame_count: usize,
    /// Number of drones per frame
    pub drone_count: usize,
}

impl ShowPositions {
    /// Position of one drone in one frame
    pub fn position(&self, frame: usize, drone: usize) -> Vec3 {
        let index = (frame * self.drone_count + drone) * 3;
        Vec3::new(self.data[index], self.data[index + 1], self.data[index + 2])
    }

    /// Package this buffer into a validator input snapshot
    pub fn into_input(
        self,
        takeoff_positions: Option<Vec<Vec3>>,
        landing_positions: Option<Vec<Vec3>>,
        settings: ProximitySettings,
    ) -> ProximityInput {
        ProximityInput {
            positions: self.data,
            frame_count: self.frame_count,
            drone_count: self.drone_count,
            takeoff_positions,
            landing_positions,
            settings,
        }
    }
}

/// Sample every player at `fps` over `[0, duration]` seconds.
///
/// The number of frames is `floor(duration * fps) + 1`, covering both the
/// start and the end of the show.
pub fn sample_show_positions(
    players: &mut [TrajectoryPlayer],
    duration: f64,
    fps: f64,
) -> Result<ShowPositions> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(ValidationError::InvalidSampleRate(fps));
    }
    if !duration.is_finite() || duration < 0.0 {
        return Err(ValidationError::InvalidDuration(duration));
    }

    let frame_count = (duration * fps).floor() as usize + 1;
    let drone_count = players.len();
    let mut data = Vec::with_capacity(frame_count * drone_count * 3);

    for frame in 0..frame_count {
        let time = frame as f64 / fps;
        for player in players.iter_mut() {
            let position = player.position_at(time)?;
            data.extend_from_slice(&position.to_array());
        }
    }

    debug!(
        frames = frame_count,
        drones = drone_count,
        fps,
        "show positions sampled"
    );
    Ok(ShowPositions {
        data,
        frame_count,
        drone_count,
    })
}

/// Per-drone takeoff and landing reference positions (first and last
/// waypoint of each trajectory), for the validator's idle filter.
pub fn reference_positions(players: &[TrajectoryPlayer]) -> (Vec<Vec3>, Vec<Vec3>) {
    let takeoff = players.iter().map(TrajectoryPlayer::start_position).collect();
    let landing = players.iter().map(TrajectoryPlayer::end_position).collect();
    (takeoff, landing)
}
