//! End-to-end demo: build a synthetic show, sample it and validate proximity.
//!
//! Run with `cargo run -p swarmview-safety --example validate_show`.

use glam::Vec3;
use swarmview_core::{Trajectory, TrajectoryPlayer, TrajectoryPoint};
use swarmview_safety::{
    reference_positions, sample_show_positions, ProximityJob, ProximitySettings,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A ring of drones rising from their pads, drifting towards the center
    // and returning
    let drone_count = 24;
    let mut players = Vec::with_capacity(drone_count);
    for drone in 0..drone_count {
        let angle = drone as f32 / drone_count as f32 * std::f32::consts::TAU;
        let pad = Vec3::new(angle.cos() * 30.0, angle.sin() * 30.0, 0.0);
        let hover = Vec3::new(pad.x, pad.y, 20.0);
        let cruise = Vec3::new(angle.cos() * 8.0, angle.sin() * 8.0, 20.0);
        let trajectory = Trajectory::new(vec![
            TrajectoryPoint::new(0.0, pad),
            TrajectoryPoint::new(10.0, hover),
            TrajectoryPoint::new(30.0, cruise),
            TrajectoryPoint::new(50.0, hover),
            TrajectoryPoint::new(60.0, pad),
        ]);
        players.push(TrajectoryPlayer::new(trajectory)?);
    }

    let sampled = sample_show_positions(&mut players, 60.0, 25.0)?;
    let (takeoff, landing) = reference_positions(&players);
    info!(
        frames = sampled.frame_count,
        drones = sampled.drone_count,
        "show sampled"
    );

    let input = sampled.into_input(Some(takeoff), Some(landing), ProximitySettings::default());
    let job = ProximityJob::spawn(input);
    for event in job.progress().iter() {
        info!(progress = event.progress, "validating");
    }

    let report = job.join()?;
    if let Some((frame, distance, (a, b))) = report.closest_approach() {
        info!(frame, distance, drone_a = a, drone_b = b, "closest approach");
    }
    let violations = report.violations(2.5);
    info!(count = violations.len(), "frames below 2.5 m separation");
    Ok(())
}
