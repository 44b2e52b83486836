//! Random-access "color at time t" queries over a light program
//!
//! The player wraps the executor's lazy segment sequence with a bounded
//! lookback window so a render loop can poll it once per frame without
//! re-running the program. Monotonically increasing query times are O(1)
//! amortized; seeking before the buffered window rewinds and replays.

use std::collections::VecDeque;

use tracing::debug;

use crate::bytecode::{LightProgram, LightProgramError};
use crate::color::Rgb;
use crate::executor::{ColorSegment, LightProgramExecutor};

/// Number of past segments kept for backward seeks before a full rewind
/// becomes necessary.
pub const SEGMENT_LOOKBACK: usize = 31;

/// A segment in playback units: time in seconds, channels normalized to
/// 0-1. The conversion from the executor's native units happens once per
/// segment, not per query.
#[derive(Debug, Clone, Copy)]
struct PlaybackSegment {
    start: f64,
    /// `f64::INFINITY` for the synthesized tail holding the final color
    end: f64,
    start_color: [f32; 3],
    end_color: Option<[f32; 3]>,
}

impl PlaybackSegment {
    fn from_segment(segment: &ColorSegment) -> Self {
        Self {
            start: segment.start_ms as f64 / 1000.0,
            end: segment.end_ms() as f64 / 1000.0,
            start_color: segment.start_color.to_normalized(),
            end_color: segment.end_color.map(Rgb::to_normalized),
        }
    }

    fn tail(start: f64, color: [f32; 3]) -> Self {
        Self {
            start,
            end: f64::INFINITY,
            start_color: color,
            end_color: None,
        }
    }

    fn color_at(&self, seconds: f64) -> [f32; 3] {
        let Some(end_color) = self.end_color else {
            return self.start_color;
        };
        let duration = self.end - self.start;
        if duration <= 0.0 {
            return self.start_color;
        }
        let ratio = (((seconds - self.start) / duration).clamp(0.0, 1.0)) as f32;
        let mix = |a: f32, b: f32| a + (b - a) * ratio;
        [
            mix(self.start_color[0], end_color[0]),
            mix(self.start_color[1], end_color[1]),
            mix(self.start_color[2], end_color[2]),
        ]
    }
}

/// Answers "what color at time t" for one drone's light program.
///
/// Owned by a single playback context; every query mutates the internal
/// window and cursor state.
#[derive(Debug)]
pub struct LightProgramPlayer {
    executor: LightProgramExecutor,
    window: VecDeque<PlaybackSegment>,
    lookback: usize,
    ended: bool,
}

impl LightProgramPlayer {
    /// Create a player with the default lookback capacity
    pub fn new(program: LightProgram) -> Self {
        Self::with_lookback(program, SEGMENT_LOOKBACK)
    }

    /// Create a player keeping up to `lookback` past segments buffered.
    ///
    /// A capacity of at least 1 is enforced; the window always holds the
    /// segment spanning the current query time.
    pub fn with_lookback(program: LightProgram, lookback: usize) -> Self {
        Self {
            executor: LightProgramExecutor::new(program),
            window: VecDeque::new(),
            lookback: lookback.max(1),
            ended: false,
        }
    }

    /// Create a player from the base64 text form of a program
    pub fn from_base64(text: &str) -> Result<Self, LightProgramError> {
        Ok(Self::new(LightProgram::from_base64(text)?))
    }

    /// Evaluate the LED color at `seconds`, normalized 0-1 per channel.
    ///
    /// Negative times clamp to the start of the program. Queries past the
    /// end of the program return the stable final color. Non-finite times
    /// fail with [`LightProgramError::NonFiniteTime`].
    pub fn evaluate_color_at(&mut self, seconds: f64) -> Result<[f32; 3], LightProgramError> {
        if !seconds.is_finite() {
            return Err(LightProgramError::NonFiniteTime(seconds));
        }
        let seconds = seconds.max(0.0);

        if let Some(first) = self.window.front() {
            if seconds < first.start {
                debug!(seconds, "query before buffered window, rewinding");
                self.rewind();
            }
        }

        while !self.covers(seconds) {
            self.advance()?;
        }

        // Scan newest-first: monotone playback almost always lands in the
        // most recently buffered segment
        for segment in self.window.iter().rev() {
            if seconds >= segment.start {
                return Ok(segment.color_at(seconds));
            }
        }

        // seconds >= 0 and the window starts at time zero after a rewind
        Ok(self
            .window
            .front()
            .map(|segment| segment.start_color)
            .unwrap_or([0.0; 3]))
    }

    /// Whether the underlying program has produced all of its segments
    pub fn program_ended(&self) -> bool {
        self.ended
    }

    /// Restartable per-frame iterator stepping time by `1 / fps`.
    ///
    /// Yields `(time, color)` pairs while the program still has content;
    /// programs with infinite loops iterate indefinitely. The player is
    /// rewound first, so iteration always starts at time zero.
    pub fn frames(&mut self, fps: f64) -> Result<Frames<'_>, LightProgramError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(LightProgramError::InvalidFrameRate(fps));
        }
        self.rewind();
        Ok(Frames {
            player: self,
            frame: 0,
            interval: 1.0 / fps,
        })
    }

    fn rewind(&mut self) {
        self.executor.reset();
        self.window.clear();
        self.ended = false;
    }

    /// Whether the buffered window extends past `seconds`
    fn covers(&self, seconds: f64) -> bool {
        self.window.back().is_some_and(|last| seconds < last.end)
    }

    /// Pull one more segment from the executor into the window, evicting
    /// the oldest entry once the window exceeds its capacity. When the
    /// program ends, synthesize an infinite tail holding the final color.
    fn advance(&mut self) -> Result<(), LightProgramError> {
        match self.executor.next_segment()? {
            Some(segment) => {
                self.push(PlaybackSegment::from_segment(&segment));
            }
            None => {
                let start = self.window.back().map(|s| s.end).unwrap_or(0.0);
                let color = self.executor.current_color().to_normalized();
                self.push(PlaybackSegment::tail(start, color));
                self.ended = true;
            }
        }
        Ok(())
    }

    fn push(&mut self, segment: PlaybackSegment) {
        self.window.push_back(segment);
        while self.window.len() > self.lookback {
            self.window.pop_front();
        }
    }

    /// Whether `seconds` lies past all of the program's real content
    fn past_end(&self, seconds: f64) -> bool {
        self.ended
            && self
                .window
                .back()
                .is_some_and(|tail| tail.end.is_infinite() && seconds >= tail.start)
    }
}

/// Iterator over per-frame `(time, color)` samples of a light program.
///
/// Created by [`LightProgramPlayer::frames`]; used for exhaustive sampling
/// (export, preview strips), not by the interactive player.
#[derive(Debug)]
pub struct Frames<'a> {
    player: &'a mut LightProgramPlayer,
    frame: u64,
    interval: f64,
}

impl Iterator for Frames<'_> {
    type Item = Result<(f64, [f32; 3]), LightProgramError>;

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.frame as f64 * self.interval;
        let color = match self.player.evaluate_color_at(time) {
            Ok(color) => color,
            Err(error) => return Some(Err(error)),
        };
        if self.player.past_end(time) {
            return None;
        }
        self.frame += 1;
        Some(Ok((time, color)))
    }
}
