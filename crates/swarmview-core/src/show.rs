//! Typed in-memory show data handed over by the external show loader
//!
//! Parsing the show container format (archives, manifests) is a collaborator's
//! job; this module is the decoded form the evaluation engine consumes.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bytecode::LightProgram;
use crate::light_player::LightProgramPlayer;
use crate::trajectory::{Trajectory, TrajectoryError, TrajectoryPlayer};

/// One drone's slice of a show: its LED program and its flight path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneData {
    /// Compact LED bytecode; base64 text on the wire
    pub light_program: LightProgram,
    /// Time-stamped flight path
    pub trajectory: Trajectory,
}

impl DroneData {
    /// Create a light program player for this drone
    pub fn light_player(&self) -> LightProgramPlayer {
        LightProgramPlayer::new(self.light_program.clone())
    }

    /// Create a trajectory player for this drone
    pub fn trajectory_player(&self) -> Result<TrajectoryPlayer, TrajectoryError> {
        TrajectoryPlayer::new(self.trajectory.clone())
    }
}

/// A complete decoded show: per-drone light programs and trajectories.
///
/// Immutable for the lifetime of a loaded show; players are created from it
/// when a show loads and discarded when another show replaces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowData {
    /// All drones taking part in the show
    pub drones: Vec<DroneData>,
}

impl ShowData {
    /// Number of drones in the show
    pub fn drone_count(&self) -> usize {
        self.drones.len()
    }

    /// Show duration in seconds: the latest trajectory end across the fleet
    pub fn duration(&self) -> f64 {
        self.drones
            .iter()
            .map(|drone| drone.trajectory.end_time())
            .fold(0.0, f64::max)
    }

    /// Create trajectory players for every drone, in drone order
    pub fn trajectory_players(&self) -> Result<Vec<TrajectoryPlayer>, TrajectoryError> {
        let players = self
            .drones
            .iter()
            .map(DroneData::trajectory_player)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            drones = players.len(),
            duration = self.duration(),
            "show trajectory players created"
        );
        Ok(players)
    }
}
