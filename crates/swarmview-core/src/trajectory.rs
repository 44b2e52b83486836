//! Trajectory playback: "position at time t" queries over waypoint lists
//!
//! A trajectory is a time-stamped sequence of 3D waypoints describing one
//! drone's flight path. The player interpolates linearly between waypoints
//! and clamps outside the covered range. Monotone playback is O(1) per
//! query via a segment cursor; arbitrary seeks fall back to binary search.

use std::fmt;

use glam::Vec3;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

/// The only trajectory format version this engine understands
pub const TRAJECTORY_VERSION: u32 = 1;

/// Errors raised while constructing or querying a trajectory player.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    /// The trajectory declares a format version other than 1
    #[error("unsupported trajectory version {0} (expected {TRAJECTORY_VERSION})")]
    UnsupportedVersion(u32),

    /// The trajectory carries no waypoints at all
    #[error("trajectory has no waypoints")]
    EmptyTrajectory,

    /// A queried segment uses Bezier control points, which this player
    /// recognizes but does not evaluate
    #[error("segment {segment} uses control points; curved segments are not supported")]
    CurvedSegmentsNotSupported {
        /// Index of the offending segment (0 = between the first two waypoints)
        segment: usize,
    },

    /// A position query was made with a NaN or infinite timestamp
    #[error("query time {0} is not finite")]
    NonFiniteTime(f64),
}

/// A single time-stamped waypoint of a drone trajectory.
///
/// On the wire a waypoint is a 2- or 3-element array
/// `[time, [x, y, z], controlPoints?]`; serde support uses that form.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    /// Timestamp in seconds, relative to takeoff
    pub time: f64,
    /// Position at this waypoint
    pub position: Vec3,
    /// Bezier control points of the segment arriving at this waypoint;
    /// empty for a linear segment
    pub control_points: Vec<Vec3>,
}

impl TrajectoryPoint {
    /// Create a linear waypoint
    pub fn new(time: f64, position: Vec3) -> Self {
        Self {
            time,
            position,
            control_points: Vec::new(),
        }
    }
}

impl Serialize for TrajectoryPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.control_points.is_empty() { 2 } else { 3 };
        let mut seq = serializer.serialize_seq(Some(fields))?;
        seq.serialize_element(&self.time)?;
        seq.serialize_element(&self.position)?;
        if !self.control_points.is_empty() {
            seq.serialize_element(&self.control_points)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for TrajectoryPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PointVisitor;

        impl<'de> Visitor<'de> for PointVisitor {
            type Value = TrajectoryPoint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [time, [x, y, z], controlPoints?] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let time = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let position = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let control_points = seq.next_element()?.unwrap_or_default();
                Ok(TrajectoryPoint {
                    time,
                    position,
                    control_points,
                })
            }
        }

        deserializer.deserialize_seq(PointVisitor)
    }
}

/// One drone's flight path as produced by the show loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    /// Trajectory format version; must be 1
    pub version: u32,
    /// Offset in seconds added to every waypoint timestamp
    #[serde(default)]
    pub takeoff_time: f64,
    /// Waypoints in non-decreasing time order (not re-sorted here)
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// Create a version-1 trajectory with no takeoff offset
    pub fn new(points: Vec<TrajectoryPoint>) -> Self {
        Self {
            version: TRAJECTORY_VERSION,
            takeoff_time: 0.0,
            points,
        }
    }

    /// End of the flight path in absolute seconds (takeoff offset applied);
    /// 0 for an empty trajectory
    pub fn end_time(&self) -> f64 {
        self.points
            .last()
            .map(|point| point.time + self.takeoff_time)
            .unwrap_or(0.0)
    }
}

/// Where the segment cursor currently sits relative to the waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Query times before the first waypoint (clamped)
    BeforeFirst,
    /// Between waypoint `i` and `i + 1`
    Segment(usize),
    /// Query times at or after the last waypoint (clamped)
    AfterLast,
}

/// Memoized interpolation data for one linear segment.
#[derive(Debug, Clone, Copy)]
struct PositionSegment {
    start: f64,
    duration: f64,
    from: Vec3,
    to: Vec3,
}

impl PositionSegment {
    fn position_at(&self, time: f64) -> Vec3 {
        if self.duration <= 0.0 {
            return self.from;
        }
        let ratio = ((time - self.start) / self.duration).clamp(0.0, 1.0) as f32;
        self.from.lerp(self.to, ratio)
    }
}

/// Answers "what position at time t" for one drone's trajectory.
///
/// Owned by a single playback context; queries mutate the segment cursor
/// and the memoized segment cache in place.
#[derive(Debug)]
pub struct TrajectoryPlayer {
    takeoff_time: f64,
    points: Vec<TrajectoryPoint>,
    /// Waypoint start times with the takeoff offset applied
    times: Vec<f64>,
    /// Lazily built interpolation data, one slot per segment
    segments: Vec<Option<PositionSegment>>,
    cursor: Cursor,
}

impl TrajectoryPlayer {
    /// Validate a trajectory and create a player over it.
    ///
    /// Fails on a version other than 1 and on an empty waypoint list.
    pub fn new(trajectory: Trajectory) -> Result<Self, TrajectoryError> {
        if trajectory.version != TRAJECTORY_VERSION {
            return Err(TrajectoryError::UnsupportedVersion(trajectory.version));
        }
        if trajectory.points.is_empty() {
            return Err(TrajectoryError::EmptyTrajectory);
        }
        let takeoff_time = trajectory.takeoff_time;
        let times: Vec<f64> = trajectory
            .points
            .iter()
            .map(|point| point.time + takeoff_time)
            .collect();
        let segment_count = trajectory.points.len() - 1;
        debug!(
            waypoints = trajectory.points.len(),
            takeoff_time, "trajectory player created"
        );
        Ok(Self {
            takeoff_time,
            points: trajectory.points,
            times,
            segments: vec![None; segment_count],
            cursor: Cursor::BeforeFirst,
        })
    }

    /// The takeoff time offset in seconds
    pub fn takeoff_time(&self) -> f64 {
        self.takeoff_time
    }

    /// Whether `time` precedes this drone's takeoff
    pub fn is_before_takeoff(&self, time: f64) -> bool {
        time < self.takeoff_time
    }

    /// End of the flight path in absolute seconds
    pub fn end_time(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Position at the first waypoint (the clamp value before takeoff)
    pub fn start_position(&self) -> Vec3 {
        self.points[0].position
    }

    /// Position at the last waypoint (the clamp value after landing)
    pub fn end_position(&self) -> Vec3 {
        self.points[self.points.len() - 1].position
    }

    /// Evaluate the drone position at `time` (absolute seconds).
    ///
    /// Times before the first waypoint clamp to its position; times after
    /// the last clamp to the last position; in between, segments
    /// interpolate linearly. Segments carrying control points fail with
    /// [`TrajectoryError::CurvedSegmentsNotSupported`].
    pub fn position_at(&mut self, time: f64) -> Result<Vec3, TrajectoryError> {
        if !time.is_finite() {
            return Err(TrajectoryError::NonFiniteTime(time));
        }
        let cursor = self.locate(time);
        self.cursor = cursor;
        match cursor {
            Cursor::BeforeFirst => Ok(self.points[0].position),
            Cursor::AfterLast => Ok(self.points[self.points.len() - 1].position),
            Cursor::Segment(index) => {
                let segment = self.segment(index)?;
                Ok(segment.position_at(time))
            }
        }
    }

    /// Find the cursor zone containing `time`: cached zone first, then the
    /// immediately following zone, then rightmost-insertion-point binary
    /// search.
    fn locate(&self, time: f64) -> Cursor {
        if self.contains(self.cursor, time) {
            return self.cursor;
        }
        if let Some(next) = self.next_zone(self.cursor) {
            if self.contains(next, time) {
                return next;
            }
        }
        // bisect_right: first waypoint time strictly greater than `time`,
        // so a query exactly at a waypoint start lands in the segment
        // beginning there
        let index = self.times.partition_point(|&start| start <= time);
        if index == 0 {
            Cursor::BeforeFirst
        } else if index == self.times.len() {
            Cursor::AfterLast
        } else {
            Cursor::Segment(index - 1)
        }
    }

    fn contains(&self, cursor: Cursor, time: f64) -> bool {
        match cursor {
            Cursor::BeforeFirst => time < self.times[0],
            Cursor::Segment(index) => time >= self.times[index] && time < self.times[index + 1],
            Cursor::AfterLast => time >= self.times[self.times.len() - 1],
        }
    }

    fn next_zone(&self, cursor: Cursor) -> Option<Cursor> {
        match cursor {
            Cursor::BeforeFirst if self.times.len() > 1 => Some(Cursor::Segment(0)),
            Cursor::BeforeFirst => Some(Cursor::AfterLast),
            Cursor::Segment(index) if index + 2 < self.times.len() => {
                Some(Cursor::Segment(index + 1))
            }
            Cursor::Segment(_) => Some(Cursor::AfterLast),
            Cursor::AfterLast => None,
        }
    }

    /// Fetch or build the interpolation data for segment `index`
    fn segment(&mut self, index: usize) -> Result<PositionSegment, TrajectoryError> {
        if let Some(segment) = self.segments[index] {
            return Ok(segment);
        }
        let to = &self.points[index + 1];
        if !to.control_points.is_empty() {
            return Err(TrajectoryError::CurvedSegmentsNotSupported { segment: index });
        }
        let segment = PositionSegment {
            start: self.times[index],
            duration: self.times[index + 1] - self.times[index],
            from: self.points[index].position,
            to: to.position,
        };
        self.segments[index] = Some(segment);
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Trajectory {
        Trajectory::new(vec![
            TrajectoryPoint::new(0.0, Vec3::ZERO),
            TrajectoryPoint::new(10.0, Vec3::new(10.0, 0.0, 0.0)),
        ])
    }

    fn zigzag() -> Trajectory {
        Trajectory::new(vec![
            TrajectoryPoint::new(0.0, Vec3::ZERO),
            TrajectoryPoint::new(1.0, Vec3::new(0.0, 0.0, 5.0)),
            TrajectoryPoint::new(3.0, Vec3::new(4.0, 0.0, 5.0)),
            TrajectoryPoint::new(6.0, Vec3::new(4.0, 4.0, 5.0)),
            TrajectoryPoint::new(7.0, Vec3::new(4.0, 4.0, 0.0)),
        ])
    }

    #[test]
    fn test_linear_interpolation() {
        let mut player = TrajectoryPlayer::new(line()).unwrap();
        assert_eq!(
            player.position_at(5.0).unwrap(),
            Vec3::new(5.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_clamp_before_and_after() {
        let mut player = TrajectoryPlayer::new(line()).unwrap();
        assert_eq!(player.position_at(-1.0).unwrap(), Vec3::ZERO);
        assert_eq!(
            player.position_at(20.0).unwrap(),
            Vec3::new(10.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_exact_waypoint_times() {
        let mut player = TrajectoryPlayer::new(zigzag()).unwrap();
        assert_eq!(player.position_at(0.0).unwrap(), Vec3::ZERO);
        assert_eq!(player.position_at(1.0).unwrap(), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(player.position_at(3.0).unwrap(), Vec3::new(4.0, 0.0, 5.0));
        assert_eq!(player.position_at(7.0).unwrap(), Vec3::new(4.0, 4.0, 0.0));
    }

    #[test]
    fn test_monotone_and_random_order_agree() {
        let times: Vec<f64> = (0..71).map(|i| i as f64 * 0.1).collect();
        let mut forward = TrajectoryPlayer::new(zigzag()).unwrap();
        let in_order: Vec<Vec3> = times
            .iter()
            .map(|&t| forward.position_at(t).unwrap())
            .collect();

        // Shuffled deterministically: stride through the indices
        let mut scattered = TrajectoryPlayer::new(zigzag()).unwrap();
        let mut results = vec![Vec3::ZERO; times.len()];
        for step in 0..times.len() {
            let index = (step * 37) % times.len();
            results[index] = scattered.position_at(times[index]).unwrap();
        }
        assert_eq!(in_order, results);
    }

    #[test]
    fn test_takeoff_offset_shifts_timestamps() {
        let mut trajectory = line();
        trajectory.takeoff_time = 5.0;
        let mut player = TrajectoryPlayer::new(trajectory).unwrap();
        assert!(player.is_before_takeoff(4.9));
        assert!(!player.is_before_takeoff(5.0));
        assert_eq!(player.position_at(2.0).unwrap(), Vec3::ZERO);
        assert_eq!(player.position_at(10.0).unwrap(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(player.end_time(), 15.0);
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let mut trajectory = line();
        trajectory.version = 2;
        assert!(matches!(
            TrajectoryPlayer::new(trajectory),
            Err(TrajectoryError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_empty_trajectory_is_rejected() {
        let trajectory = Trajectory::new(Vec::new());
        assert!(matches!(
            TrajectoryPlayer::new(trajectory),
            Err(TrajectoryError::EmptyTrajectory)
        ));
    }

    #[test]
    fn test_control_points_error_on_use() {
        let mut trajectory = line();
        trajectory.points.push(TrajectoryPoint {
            time: 20.0,
            position: Vec3::new(0.0, 10.0, 0.0),
            control_points: vec![Vec3::new(10.0, 5.0, 0.0)],
        });
        let mut player = TrajectoryPlayer::new(trajectory).unwrap();
        // The linear part still works
        assert!(player.position_at(5.0).is_ok());
        // Entering the curved segment fails loudly
        assert!(matches!(
            player.position_at(15.0),
            Err(TrajectoryError::CurvedSegmentsNotSupported { segment: 1 })
        ));
    }

    #[test]
    fn test_non_finite_time_is_rejected() {
        let mut player = TrajectoryPlayer::new(line()).unwrap();
        assert!(matches!(
            player.position_at(f64::NAN),
            Err(TrajectoryError::NonFiniteTime(_))
        ));
    }

    #[test]
    fn test_single_waypoint_clamps_everywhere() {
        let trajectory = Trajectory::new(vec![TrajectoryPoint::new(
            3.0,
            Vec3::new(1.0, 2.0, 3.0),
        )]);
        let mut player = TrajectoryPlayer::new(trajectory).unwrap();
        assert_eq!(player.position_at(0.0).unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(player.position_at(9.0).unwrap(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_coincident_waypoint_times() {
        let trajectory = Trajectory::new(vec![
            TrajectoryPoint::new(0.0, Vec3::ZERO),
            TrajectoryPoint::new(1.0, Vec3::new(1.0, 0.0, 0.0)),
            TrajectoryPoint::new(1.0, Vec3::new(2.0, 0.0, 0.0)),
            TrajectoryPoint::new(2.0, Vec3::new(3.0, 0.0, 0.0)),
        ]);
        let mut player = TrajectoryPlayer::new(trajectory).unwrap();
        // The zero-length segment resolves to its newer start point
        assert_eq!(player.position_at(1.0).unwrap(), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(player.position_at(1.5).unwrap(), Vec3::new(2.5, 0.0, 0.0));
    }

    #[test]
    fn test_wire_format_roundtrip() {
        let json = r#"{"version":1,"takeoffTime":2.5,"points":[[0,[0,0,0]],[10,[10,0,0]]]}"#;
        let trajectory: Trajectory = serde_json::from_str(json).unwrap();
        assert_eq!(trajectory.takeoff_time, 2.5);
        assert_eq!(trajectory.points.len(), 2);
        assert_eq!(trajectory.points[1].position, Vec3::new(10.0, 0.0, 0.0));

        let back = serde_json::to_string(&trajectory).unwrap();
        let again: Trajectory = serde_json::from_str(&back).unwrap();
        assert_eq!(trajectory, again);
    }

    #[test]
    fn test_wire_format_control_points() {
        let json = r#"{"version":1,"points":[[0,[0,0,0]],[4,[4,0,0],[[1,0,0],[3,0,0]]]]}"#;
        let trajectory: Trajectory = serde_json::from_str(json).unwrap();
        assert_eq!(trajectory.points[1].control_points.len(), 2);
    }
}
