//! Bytecode interpreter producing time-ordered color segments
//!
//! The executor is a pull-based state machine over a single drone's light
//! program: each call to [`LightProgramExecutor::next_segment`] decodes
//! instructions until one produces a visible segment or the program ends.
//! Segments come out contiguous, non-overlapping and in non-decreasing
//! start-time order.

use tracing::debug;

use crate::bytecode::{LightProgram, LightProgramError, Opcode, ProgramReader, TICK_MS};
use crate::color::Rgb;

/// A maximal time interval over which a drone's LED is either constant or
/// fading linearly between two colors.
///
/// The interval is `[start_ms, start_ms + duration_ms]`; the executor only
/// ever yields segments with `duration_ms > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSegment {
    /// Segment start in milliseconds from program start
    pub start_ms: u64,
    /// Segment length in milliseconds
    pub duration_ms: u64,
    /// Color at the start of the segment
    pub start_color: Rgb,
    /// Fade target reached at the end of the segment; `None` for constant
    /// segments
    pub end_color: Option<Rgb>,
}

impl ColorSegment {
    /// End of the segment in milliseconds from program start
    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }

    /// Whether this segment fades between two colors
    pub fn is_fade(&self) -> bool {
        self.end_color.is_some()
    }

    /// Color at an absolute time within the segment.
    ///
    /// Constant segments return the start color unchanged; fades
    /// interpolate per channel. The ratio is defined as 0 for
    /// zero-duration segments so the query never divides by zero.
    pub fn color_at(&self, time_ms: u64) -> Rgb {
        match self.end_color {
            None => self.start_color,
            Some(end) => {
                if self.duration_ms == 0 {
                    return self.start_color;
                }
                let elapsed = time_ms.saturating_sub(self.start_ms);
                let ratio = elapsed as f32 / self.duration_ms as f32;
                self.start_color.lerp(end, ratio)
            }
        }
    }
}

/// One entry of the loop stack: where the loop body begins and how many
/// passes remain. `remaining == 0` encodes an infinite loop.
#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    body_offset: usize,
    remaining: u8,
}

/// Decodes one drone's light program into a lazy, restartable sequence of
/// [`ColorSegment`]s.
#[derive(Debug)]
pub struct LightProgramExecutor {
    reader: ProgramReader,
    loops: Vec<LoopFrame>,
    time_ms: u64,
    color: Rgb,
    finished: bool,
}

impl LightProgramExecutor {
    /// Create an executor at the start of a program, black at time zero
    pub fn new(program: LightProgram) -> Self {
        Self {
            reader: ProgramReader::new(program),
            loops: Vec::new(),
            time_ms: 0,
            color: Rgb::BLACK,
            finished: false,
        }
    }

    /// Decode a base64 text program and create an executor over it
    pub fn from_base64(text: &str) -> Result<Self, LightProgramError> {
        Ok(Self::new(LightProgram::from_base64(text)?))
    }

    /// The color state after the most recently produced segment
    pub fn current_color(&self) -> Rgb {
        self.color
    }

    /// The timeline position after the most recently produced segment, in
    /// milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.time_ms
    }

    /// Whether the program has ended (end instruction or stream exhausted)
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rewind to the start of the program: cursor at byte zero, loop stack
    /// empty, color black at time zero
    pub fn reset(&mut self) {
        self.reset_from(Rgb::BLACK, 0);
    }

    /// Rewind to the start of the program with a caller-supplied initial
    /// color state and timeline position
    pub fn reset_from(&mut self, color: Rgb, time_ms: u64) {
        self.reader.rewind();
        self.loops.clear();
        self.time_ms = time_ms;
        self.color = color;
        self.finished = false;
        debug!(time_ms, "light program executor reset");
    }

    /// Produce the next visible segment, `Ok(None)` once the program ends.
    ///
    /// Zero-duration instructions advance internal state without yielding a
    /// segment. Decode errors are fatal for this program; the executor
    /// stays finished afterwards.
    pub fn next_segment(&mut self) -> Result<Option<ColorSegment>, LightProgramError> {
        if self.finished {
            return Ok(None);
        }
        match self.run() {
            Ok(segment) => Ok(segment),
            Err(error) => {
                self.finished = true;
                Err(error)
            }
        }
    }

    fn run(&mut self) -> Result<Option<ColorSegment>, LightProgramError> {
        loop {
            let offset = self.reader.offset();
            let Some(byte) = self.reader.read_byte() else {
                // Stream exhausted without an end instruction: terminate
                self.finished = true;
                return Ok(None);
            };
            let opcode = Opcode::from_byte(byte)
                .ok_or(LightProgramError::UnknownOpcode { opcode: byte, offset })?;

            let segment = match opcode {
                Opcode::End => {
                    self.finished = true;
                    return Ok(None);
                }
                Opcode::Nop => None,
                Opcode::Sleep => {
                    let duration_ms = self.read_duration_ms()?;
                    self.hold(duration_ms)
                }
                Opcode::WaitUntil => {
                    // Advances to max(current time, target); never backwards
                    let target_ms = self.read_duration_ms()?;
                    self.hold(target_ms.saturating_sub(self.time_ms))
                }
                Opcode::SetColor => {
                    let color = self.reader.read_rgb()?;
                    let duration_ms = self.read_duration_ms()?;
                    self.set(color, duration_ms)
                }
                Opcode::SetGray => {
                    let level = self.reader.expect_byte()?;
                    let duration_ms = self.read_duration_ms()?;
                    self.set(Rgb::gray(level), duration_ms)
                }
                Opcode::SetBlack => {
                    let duration_ms = self.read_duration_ms()?;
                    self.set(Rgb::BLACK, duration_ms)
                }
                Opcode::SetWhite => {
                    let duration_ms = self.read_duration_ms()?;
                    self.set(Rgb::WHITE, duration_ms)
                }
                Opcode::FadeToColor => {
                    let color = self.reader.read_rgb()?;
                    let duration_ms = self.read_duration_ms()?;
                    self.fade(color, duration_ms)
                }
                Opcode::FadeToGray => {
                    let level = self.reader.expect_byte()?;
                    let duration_ms = self.read_duration_ms()?;
                    self.fade(Rgb::gray(level), duration_ms)
                }
                Opcode::FadeToBlack => {
                    let duration_ms = self.read_duration_ms()?;
                    self.fade(Rgb::BLACK, duration_ms)
                }
                Opcode::FadeToWhite => {
                    let duration_ms = self.read_duration_ms()?;
                    self.fade(Rgb::WHITE, duration_ms)
                }
                Opcode::LoopBegin => {
                    let count = self.reader.expect_byte()?;
                    self.loops.push(LoopFrame {
                        body_offset: self.reader.offset(),
                        remaining: count,
                    });
                    None
                }
                Opcode::LoopEnd => {
                    let frame = self
                        .loops
                        .last_mut()
                        .ok_or(LightProgramError::UnmatchedLoopEnd { offset })?;
                    if frame.remaining == 0 {
                        // Infinite loop: always jump back
                        let body = frame.body_offset;
                        self.reader.jump(body);
                    } else {
                        frame.remaining -= 1;
                        if frame.remaining > 0 {
                            let body = frame.body_offset;
                            self.reader.jump(body);
                        } else {
                            self.loops.pop();
                        }
                    }
                    None
                }
                Opcode::SetPyro | Opcode::SetPyroAll => {
                    // Pyro channel byte is consumed but has no color effect
                    self.reader.expect_byte()?;
                    None
                }
            };

            if let Some(segment) = segment {
                return Ok(Some(segment));
            }
        }
    }

    /// Read a varuint duration operand and convert 1/50 s ticks to ms
    fn read_duration_ms(&mut self) -> Result<u64, LightProgramError> {
        Ok(self.reader.read_varuint()?.saturating_mul(TICK_MS))
    }

    /// Hold the current color; zero durations produce no segment
    fn hold(&mut self, duration_ms: u64) -> Option<ColorSegment> {
        if duration_ms == 0 {
            return None;
        }
        let segment = ColorSegment {
            start_ms: self.time_ms,
            duration_ms,
            start_color: self.color,
            end_color: None,
        };
        self.time_ms = self.time_ms.saturating_add(duration_ms);
        Some(segment)
    }

    /// Switch to a color instantly, then hold it
    fn set(&mut self, color: Rgb, duration_ms: u64) -> Option<ColorSegment> {
        self.color = color;
        self.hold(duration_ms)
    }

    /// Fade linearly from the current color to a target
    fn fade(&mut self, target: Rgb, duration_ms: u64) -> Option<ColorSegment> {
        if duration_ms == 0 {
            self.color = target;
            return None;
        }
        let segment = ColorSegment {
            start_ms: self.time_ms,
            duration_ms,
            start_color: self.color,
            end_color: Some(target),
        };
        self.color = target;
        self.time_ms = self.time_ms.saturating_add(duration_ms);
        Some(segment)
    }
}

impl Iterator for LightProgramExecutor {
    type Item = Result<ColorSegment, LightProgramError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}
