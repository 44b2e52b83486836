//! SwarmView Core - Show Evaluation Engine
//!
//! This crate contains the core evaluation engine for pre-computed drone
//! light shows, including:
//! - Light program bytecode decoding into color segment schedules
//! - Random-access color queries with a bounded lookback window
//! - Trajectory playback with cached segment interpolation
//! - The typed show data model handed over by a show loader
//!
//! Rendering, show-container parsing, audio sync and UI state live in
//! external collaborators; this crate answers "what color / what position
//! at time t" at interactive rates. Safety validation over whole shows is
//! in the `swarmview-safety` crate.

#![warn(missing_docs)]

pub use glam::Vec3;

pub mod bytecode;
pub mod color;
pub mod executor;
pub mod light_player;
pub mod show;
pub mod trajectory;

// --- Re-exports grouped by category ---

// Light programs
pub use bytecode::{LightProgram, LightProgramError, Opcode, TICK_MS};
pub use color::Rgb;
pub use executor::{ColorSegment, LightProgramExecutor};
pub use light_player::{Frames, LightProgramPlayer, SEGMENT_LOOKBACK};

// Trajectories
pub use trajectory::{
    Trajectory, TrajectoryError, TrajectoryPlayer, TrajectoryPoint, TRAJECTORY_VERSION,
};

// Show model
pub use show::{DroneData, ShowData};
