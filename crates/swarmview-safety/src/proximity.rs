//! Closest-pair proximity validation over sampled show positions
//!
//! For every frame of a show the validator finds the two active drones
//! closest to each other. Drones parked at their takeoff or landing
//! position are excluded from the search; a fully parked fleet falls back
//! to considering everyone so a result still exists for every frame.

use std::time::{Duration, Instant};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::worker::JobMonitor;
use crate::{Result, ValidationError};

/// Tunable parameters of the proximity validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximitySettings {
    /// Component-wise tolerance, in show units (meters), for treating a
    /// drone as parked at its takeoff or landing reference position
    pub idle_tolerance: f32,
    /// Minimum wall-clock delay between progress events
    pub progress_interval: Duration,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            idle_tolerance: 1e-3,
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Everything one proximity validation run consumes; a complete snapshot,
/// safe to move onto a worker thread.
#[derive(Debug, Clone)]
pub struct ProximityInput {
    /// Flat positions, row-major `frame × drone × 3`
    pub positions: Vec<f32>,
    /// Number of sampled frames
    pub frame_count: usize,
    /// Number of drones per frame
    pub drone_count: usize,
    /// Per-drone takeoff reference positions, if known
    pub takeoff_positions: Option<Vec<Vec3>>,
    /// Per-drone landing reference positions, if known
    pub landing_positions: Option<Vec<Vec3>>,
    /// Validator tuning
    pub settings: ProximitySettings,
}

impl ProximityInput {
    /// Run the validator over this input
    pub fn run(&self, monitor: &JobMonitor) -> Result<ProximityReport> {
        find_closest_pairs(
            &self.positions,
            self.frame_count,
            self.drone_count,
            self.takeoff_positions.as_deref(),
            self.landing_positions.as_deref(),
            &self.settings,
            monitor,
        )
    }
}

/// Per-frame closest pairs for a whole show.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProximityReport {
    /// Minimum inter-drone distance per frame; `None` when fewer than two
    /// drones were eligible (only possible with fewer than two drones)
    pub distances: Vec<Option<f32>>,
    /// Original drone indices `(min, max)` attaining each frame's distance
    pub pairs: Vec<Option<(usize, usize)>>,
}

impl ProximityReport {
    /// The single closest approach across the show: `(frame, distance, pair)`
    pub fn closest_approach(&self) -> Option<(usize, f32, (usize, usize))> {
        let mut best: Option<(usize, f32, (usize, usize))> = None;
        for (frame, (distance, pair)) in self.distances.iter().zip(&self.pairs).enumerate() {
            if let (Some(distance), Some(pair)) = (distance, pair) {
                if best.map_or(true, |(_, d, _)| *distance < d) {
                    best = Some((frame, *distance, *pair));
                }
            }
        }
        best
    }

    /// Frames whose minimum distance is below `threshold`
    pub fn violations(&self, threshold: f32) -> Vec<usize> {
        self.distances
            .iter()
            .enumerate()
            .filter_map(|(frame, distance)| match distance {
                Some(d) if *d < threshold => Some(frame),
                _ => None,
            })
            .collect()
    }
}

/// Compute the closest pair of active drones for every frame of a show.
///
/// `positions` is row-major `frame × drone × 3`; its length must equal
/// `frame_count * drone_count * 3` exactly. Frames are processed in
/// strictly increasing order; progress percentages are non-decreasing and
/// throttled to the settings' interval. Cancellation is polled between
/// frames and surfaces as [`ValidationError::Cancelled`], never as a
/// partial result.
#[allow(clippy::too_many_arguments)]
pub fn find_closest_pairs(
    positions: &[f32],
    frame_count: usize,
    drone_count: usize,
    takeoff_positions: Option<&[Vec3]>,
    landing_positions: Option<&[Vec3]>,
    settings: &ProximitySettings,
    monitor: &JobMonitor,
) -> Result<ProximityReport> {
    let expected = frame_count * drone_count * 3;
    if positions.len() != expected {
        return Err(ValidationError::PositionBufferMismatch {
            expected,
            actual: positions.len(),
        });
    }
    check_reference("takeoff", takeoff_positions, drone_count)?;
    check_reference("landing", landing_positions, drone_count)?;

    let mut distances = vec![None; frame_count];
    let mut pairs = vec![None; frame_count];
    // Candidate indices reused across frames to avoid per-frame allocation
    let mut active: Vec<usize> = Vec::with_capacity(drone_count);
    let mut last_report = Instant::now();

    for frame in 0..frame_count {
        if monitor.is_cancelled() {
            debug!(frame, "cancellation observed");
            return Err(ValidationError::Cancelled);
        }

        let base = frame * drone_count * 3;
        active.clear();
        for drone in 0..drone_count {
            let position = read_position(positions, base, drone);
            let parked = |reference: Option<&[Vec3]>| {
                reference
                    .is_some_and(|r| approx_eq(position, r[drone], settings.idle_tolerance))
            };
            if !parked(takeoff_positions) && !parked(landing_positions) {
                active.push(drone);
            }
        }
        // A fully parked fleet is a legitimate show state, not an error:
        // fall back to comparing everyone
        if active.is_empty() {
            active.extend(0..drone_count);
        }

        let mut best: Option<(f32, (usize, usize))> = None;
        for (slot, &a) in active.iter().enumerate() {
            let position_a = read_position(positions, base, a);
            for &b in &active[slot + 1..] {
                let distance = position_a.distance(read_position(positions, base, b));
                if best.map_or(true, |(d, _)| distance < d) {
                    // `active` is ascending, so (a, b) is already (min, max)
                    best = Some((distance, (a, b)));
                }
            }
        }
        if let Some((distance, pair)) = best {
            distances[frame] = Some(distance);
            pairs[frame] = Some(pair);
        }

        if last_report.elapsed() >= settings.progress_interval {
            monitor.report(percent(frame + 1, frame_count));
            last_report = Instant::now();
        }
    }

    monitor.report(100.0);
    Ok(ProximityReport { distances, pairs })
}

fn check_reference(
    side: &'static str,
    reference: Option<&[Vec3]>,
    drone_count: usize,
) -> Result<()> {
    match reference {
        Some(entries) if entries.len() != drone_count => {
            Err(ValidationError::ReferenceLengthMismatch {
                side,
                expected: drone_count,
                actual: entries.len(),
            })
        }
        _ => Ok(()),
    }
}

fn percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        100.0
    } else {
        done as f32 * 100.0 / total as f32
    }
}

fn read_position(positions: &[f32], base: usize, drone: usize) -> Vec3 {
    let index = base + drone * 3;
    Vec3::new(positions[index], positions[index + 1], positions[index + 2])
}

/// Component-wise approximate equality within `tolerance`
fn approx_eq(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    (a - b).abs().cmple(Vec3::splat(tolerance)).all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::CancellationToken;

    fn flat(frames: &[&[[f32; 3]]]) -> (Vec<f32>, usize, usize) {
        let frame_count = frames.len();
        let drone_count = frames.first().map_or(0, |f| f.len());
        let data = frames
            .iter()
            .flat_map(|frame| frame.iter().flatten().copied())
            .collect();
        (data, frame_count, drone_count)
    }

    fn run(
        frames: &[&[[f32; 3]]],
        takeoff: Option<Vec<Vec3>>,
        landing: Option<Vec<Vec3>>,
    ) -> ProximityReport {
        let (positions, frame_count, drone_count) = flat(frames);
        find_closest_pairs(
            &positions,
            frame_count,
            drone_count,
            takeoff.as_deref(),
            landing.as_deref(),
            &ProximitySettings::default(),
            &JobMonitor::detached(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_drone_distance_is_euclidean() {
        let report = run(&[&[[0.0, 0.0, 0.0], [3.0, 4.0, 0.0]]], None, None);
        assert_eq!(report.distances, vec![Some(5.0)]);
        assert_eq!(report.pairs, vec![Some((0, 1))]);
    }

    #[test]
    fn test_closest_pair_among_three() {
        let report = run(
            &[&[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [11.0, 0.0, 0.0]]],
            None,
            None,
        );
        assert_eq!(report.distances, vec![Some(1.0)]);
        assert_eq!(report.pairs, vec![Some((1, 2))]);
    }

    #[test]
    fn test_parked_drones_are_excluded() {
        // Drone 0 sits at its takeoff spot; 1 and 2 fly close together
        let takeoff = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(100.0, 0.0, 0.0),
        ];
        let report = run(
            &[&[[0.0, 0.0, 0.0], [20.0, 0.0, 10.0], [22.0, 0.0, 10.0]]],
            Some(takeoff),
            None,
        );
        // Without the exclusion the closest pair would involve drone 0
        assert_eq!(report.pairs, vec![Some((1, 2))]);
        assert_eq!(report.distances, vec![Some(2.0)]);
    }

    #[test]
    fn test_landing_reference_also_excludes() {
        let landing = vec![Vec3::new(5.0, 0.0, 0.0), Vec3::new(99.0, 99.0, 99.0)];
        let report = run(
            &[&[[5.0, 0.0, 0.0], [6.0, 0.0, 0.0]]],
            None,
            Some(landing),
        );
        // Only drone 1 is active; the all-idle fallback does not apply,
        // but a single candidate cannot form a pair either
        assert_eq!(report.distances, vec![None]);
    }

    #[test]
    fn test_all_idle_falls_back_to_everyone() {
        let takeoff = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0)];
        let report = run(
            &[&[[0.0, 0.0, 0.0], [4.0, 0.0, 0.0]]],
            Some(takeoff),
            None,
        );
        assert_eq!(report.distances, vec![Some(4.0)]);
        assert_eq!(report.pairs, vec![Some((0, 1))]);
    }

    #[test]
    fn test_idle_tolerance_is_configurable() {
        let takeoff = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0)];
        let (positions, frame_count, drone_count) =
            flat(&[&[[0.05, 0.0, 0.0], [2.0, 0.0, 0.0]]]);
        let settings = ProximitySettings {
            idle_tolerance: 0.1,
            ..Default::default()
        };
        let report = find_closest_pairs(
            &positions,
            frame_count,
            drone_count,
            Some(&takeoff),
            None,
            &settings,
            &JobMonitor::detached(),
        )
        .unwrap();
        // Drone 0 is within the widened tolerance of its pad, so only
        // drone 1 is active and the frame has no pair
        assert_eq!(report.distances, vec![None]);
    }

    #[test]
    fn test_single_drone_has_no_pairs() {
        let report = run(&[&[[0.0, 0.0, 0.0]], &[[1.0, 0.0, 0.0]]], None, None);
        assert_eq!(report.distances, vec![None, None]);
        assert_eq!(report.pairs, vec![None, None]);
    }

    #[test]
    fn test_wrong_buffer_length_fails_fast() {
        let result = find_closest_pairs(
            &[0.0; 10],
            2,
            2,
            None,
            None,
            &ProximitySettings::default(),
            &JobMonitor::detached(),
        );
        assert!(matches!(
            result,
            Err(ValidationError::PositionBufferMismatch {
                expected: 12,
                actual: 10,
            })
        ));
    }

    #[test]
    fn test_wrong_reference_length_fails_fast() {
        let (positions, frame_count, drone_count) =
            flat(&[&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]]);
        let result = find_closest_pairs(
            &positions,
            frame_count,
            drone_count,
            Some(&[Vec3::ZERO]),
            None,
            &ProximitySettings::default(),
            &JobMonitor::detached(),
        );
        assert!(matches!(
            result,
            Err(ValidationError::ReferenceLengthMismatch { side: "takeoff", .. })
        ));
    }

    #[test]
    fn test_pre_cancelled_run_computes_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let monitor = JobMonitor::new(token, None);
        let (positions, frame_count, drone_count) =
            flat(&[&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]]);
        let result = find_closest_pairs(
            &positions,
            frame_count,
            drone_count,
            None,
            None,
            &ProximitySettings::default(),
            &monitor,
        );
        assert!(matches!(result, Err(ValidationError::Cancelled)));
    }

    #[test]
    fn test_closest_approach_over_frames() {
        let report = run(
            &[
                &[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]],
                &[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
                &[[0.0, 0.0, 0.0], [6.0, 0.0, 0.0]],
            ],
            None,
            None,
        );
        assert_eq!(report.closest_approach(), Some((1, 2.0, (0, 1))));
        assert_eq!(report.violations(3.0), vec![1]);
    }
}
