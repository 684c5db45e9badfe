//! Interleaved 16-bit PCM buffers, indexed by time, sample, or interval.

pub mod assemble;
pub mod codec;

pub use assemble::{ASSEMBLY_SLACK_FRAMES, assemble, mix};
pub use codec::{AudioCodec, CodecError, DecodedAudio, FfmpegCodec, OutputFormat};

use crate::quantum::{Interval, Quantum, Span};
use std::ops::Add;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Absorbs float error when converting seconds to sample indices, so that
/// e.g. `0.7 s * 10 Hz` lands on sample 7 rather than 6.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Append of {needed} frames exceeds capacity ({available} free)")]
    CapacityExceeded { needed: usize, available: usize },
    #[error("Incompatible buffers: {0}")]
    IncompatibleBuffers(String),
    #[error("Sample {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("{samples} samples do not divide into {channels} channels")]
    ShapeMismatch { samples: usize, channels: u16 },
    #[error("Mix ratio {0} outside [0, 1]")]
    InvalidRatio(f64),
    #[error("Requested buffer too large: {0}")]
    TooLarge(String),
}

/// How to address a [`SampleBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Index {
    /// Seconds from the start; selects one frame.
    Time(f64),
    /// Frame number; selects one frame.
    Sample(usize),
    /// Copy of `[start, start + duration)`.
    Interval(Span),
    /// Copy from the start of the first interval to the end of the second.
    Range(Span, Span),
}

impl Index {
    pub fn interval(x: &impl Interval) -> Self {
        Index::Interval(Span::new(x.start(), x.duration()))
    }

    pub fn range(from: &impl Interval, to: &impl Interval) -> Self {
        Index::Range(
            Span::new(from.start(), from.duration()),
            Span::new(to.start(), to.duration()),
        )
    }
}

impl From<f64> for Index {
    fn from(t: f64) -> Self {
        Index::Time(t)
    }
}

impl From<usize> for Index {
    fn from(i: usize) -> Self {
        Index::Sample(i)
    }
}

impl From<Span> for Index {
    fn from(s: Span) -> Self {
        Index::Interval(s)
    }
}

impl From<&Quantum> for Index {
    fn from(q: &Quantum) -> Self {
        Index::interval(q)
    }
}

/// Result of [`SampleBuffer::get`]: a borrowed frame or a copied sub-buffer.
#[derive(Debug, PartialEq)]
pub enum Selection<'a> {
    Frame(&'a [i16]),
    Buffer(SampleBuffer),
}

impl<'a> Selection<'a> {
    pub fn frame(&self) -> Option<&'a [i16]> {
        match self {
            Selection::Frame(f) => Some(*f),
            Selection::Buffer(_) => None,
        }
    }

    pub fn into_buffer(self) -> Option<SampleBuffer> {
        match self {
            Selection::Buffer(b) => Some(b),
            Selection::Frame(_) => None,
        }
    }
}

/// Interleaved sample storage with a write cursor.
///
/// Storage may be larger than the populated prefix: `len()` counts frames
/// written so far, `capacity()` counts frames allocated. Everything past
/// `len()` is allocation slack, not audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
    channels: u16,
    sample_rate: u32,
    end: usize,
}

impl SampleBuffer {
    /// Fully populated buffer over interleaved `samples`.
    pub fn from_samples(
        samples: Vec<i16>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, BufferError> {
        if channels == 0 || samples.len() % channels as usize != 0 {
            return Err(BufferError::ShapeMismatch {
                samples: samples.len(),
                channels,
            });
        }
        let end = samples.len() / channels as usize;
        Ok(Self {
            samples,
            channels,
            sample_rate,
            end,
        })
    }

    /// Zero-filled storage for `frames` frames, nothing written yet.
    ///
    /// Panics if `frames * channels` overflows, like `Vec::with_capacity`.
    pub fn with_capacity(frames: usize, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0; frames * channels as usize],
            channels,
            sample_rate,
            end: 0,
        }
    }

    pub fn from_decoded(audio: DecodedAudio) -> Result<Self, BufferError> {
        Self::from_samples(audio.samples, audio.channels, audio.sample_rate)
    }

    /// Decode `path` with `codec`.
    pub fn load(path: &Path, codec: &dyn AudioCodec) -> Result<Self, CodecError> {
        let decoded = codec.decode(path)?;
        log::debug!(
            "Decoded {}: {} Hz, {} channels, {} samples",
            path.display(),
            decoded.sample_rate,
            decoded.channels,
            decoded.samples.len()
        );
        Ok(Self::from_decoded(decoded)?)
    }

    /// Encode the populated frames to `path`. The format follows the
    /// extension; returns the path actually written.
    pub fn save(&self, path: &Path, codec: &dyn AudioCodec) -> Result<PathBuf, CodecError> {
        let (format, target) = OutputFormat::from_path(path);
        codec.encode(
            self.populated(),
            self.sample_rate,
            self.channels,
            &target,
            format,
        )?;
        log::info!(
            "Wrote {:.2}s of audio to {}",
            self.duration(),
            target.display()
        );
        Ok(target)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames written.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Frames allocated.
    pub fn capacity(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Seconds of populated audio.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.end as f64 / self.sample_rate as f64
    }

    /// Interleaved populated samples.
    pub fn populated(&self) -> &[i16] {
        &self.samples[..self.end * self.channels as usize]
    }

    /// Whole storage, slack included.
    pub fn storage(&self) -> &[i16] {
        &self.samples
    }

    /// Drop the allocation slack.
    pub fn into_trimmed(mut self) -> Self {
        self.samples.truncate(self.end * self.channels as usize);
        self.samples.shrink_to_fit();
        self
    }

    /// Frame index for a time offset in seconds (floored; negative is 0).
    pub fn time_to_frame(&self, seconds: f64) -> usize {
        let f = (seconds * self.sample_rate as f64 + TIME_EPSILON).floor();
        if f.is_finite() && f > 0.0 {
            f as usize
        } else {
            0
        }
    }

    pub fn frame(&self, index: usize) -> Result<&[i16], BufferError> {
        if index >= self.end {
            return Err(BufferError::OutOfRange {
                index,
                len: self.end,
            });
        }
        let ch = self.channels as usize;
        Ok(&self.samples[index * ch..(index + 1) * ch])
    }

    /// Copy of frames `[from, to)`, clamped to the populated length.
    pub fn slice(&self, from: usize, to: usize) -> SampleBuffer {
        let to = to.min(self.end);
        let from = from.min(to);
        let ch = self.channels as usize;
        SampleBuffer {
            samples: self.samples[from * ch..to * ch].to_vec(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            end: to - from,
        }
    }

    /// Frame range `[start, start + duration)` covered by an interval.
    /// Saturates for durations beyond the addressable range.
    pub fn frames_of(&self, x: &impl Interval) -> (usize, usize) {
        let start = self.time_to_frame(x.start());
        (start, start.saturating_add(self.time_to_frame(x.duration())))
    }

    /// Number of populated frames `get` would copy for an interval.
    pub fn frames_within(&self, x: &impl Interval) -> usize {
        let (from, to) = self.frames_of(x);
        to.min(self.end).saturating_sub(from)
    }

    pub fn get(&self, index: impl Into<Index>) -> Result<Selection<'_>, BufferError> {
        match index.into() {
            Index::Time(t) => self.frame(self.time_to_frame(t)).map(Selection::Frame),
            Index::Sample(i) => self.frame(i).map(Selection::Frame),
            Index::Interval(span) => {
                let (from, to) = self.frames_of(&span);
                Ok(Selection::Buffer(self.slice(from, to)))
            }
            Index::Range(first, last) => {
                let from = self.time_to_frame(first.start());
                let to = self.time_to_frame(last.end());
                Ok(Selection::Buffer(self.slice(from, to)))
            }
        }
    }

    fn check_compatible(&self, other: &SampleBuffer) -> Result<(), BufferError> {
        if self.channels != other.channels || self.sample_rate != other.sample_rate {
            return Err(BufferError::IncompatibleBuffers(format!(
                "{} ch @ {} Hz vs {} ch @ {} Hz",
                self.channels, self.sample_rate, other.channels, other.sample_rate
            )));
        }
        Ok(())
    }

    /// Copy `other`'s populated frames in at the write cursor.
    pub fn append(&mut self, other: &SampleBuffer) -> Result<(), BufferError> {
        self.check_compatible(other)?;
        let available = self.capacity() - self.end;
        if other.end > available {
            return Err(BufferError::CapacityExceeded {
                needed: other.end,
                available,
            });
        }
        let ch = self.channels as usize;
        let at = self.end * ch;
        self.samples[at..at + other.end * ch].copy_from_slice(other.populated());
        self.end += other.end;
        Ok(())
    }

    /// New buffer holding `self`'s populated frames followed by `other`'s.
    /// An empty operand yields a copy of the other one.
    pub fn concat(&self, other: &SampleBuffer) -> Result<SampleBuffer, BufferError> {
        if other.is_empty() {
            return Ok(self.clone().into_trimmed());
        }
        if self.is_empty() {
            return Ok(other.clone().into_trimmed());
        }
        self.check_compatible(other)?;
        let mut samples = Vec::with_capacity(self.populated().len() + other.populated().len());
        samples.extend_from_slice(self.populated());
        samples.extend_from_slice(other.populated());
        Ok(SampleBuffer {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
            end: self.end + other.end,
        })
    }
}

impl Add for &SampleBuffer {
    type Output = Result<SampleBuffer, BufferError>;

    fn add(self, rhs: &SampleBuffer) -> Self::Output {
        self.concat(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::Kind;

    /// 4 channels x 100 frames at 10 Hz; frame i holds [i, i+1000, i+2000, i+3000].
    pub(crate) fn ramp() -> SampleBuffer {
        let samples = (0..100i16)
            .flat_map(|i| [i, i + 1000, i + 2000, i + 3000])
            .collect();
        SampleBuffer::from_samples(samples, 4, 10).unwrap()
    }

    #[test]
    fn test_shape() {
        let b = ramp();
        assert_eq!(b.len(), 100);
        assert_eq!(b.capacity(), 100);
        assert_eq!(b.channels(), 4);
        assert!((b.duration() - 10.0).abs() < 1e-12);

        assert!(matches!(
            SampleBuffer::from_samples(vec![0; 7], 2, 44100),
            Err(BufferError::ShapeMismatch { .. })
        ));
        assert!(SampleBuffer::from_samples(vec![], 0, 44100).is_err());
    }

    #[test]
    fn test_get_by_time_and_sample() {
        let b = ramp();
        assert_eq!(b.get(0.55).unwrap().frame(), Some(&[5, 1005, 2005, 3005][..]));
        assert_eq!(b.get(0.7).unwrap().frame(), Some(&[7, 1007, 2007, 3007][..]));
        assert_eq!(b.get(42usize).unwrap().frame().unwrap()[0], 42);
        assert!(matches!(
            b.get(100usize),
            Err(BufferError::OutOfRange { index: 100, len: 100 })
        ));
        assert!(b.get(12.0).is_err());
    }

    #[test]
    fn test_get_by_interval() {
        let b = ramp();
        let q = Quantum::new(Kind::Beat, 0.5, 0.2);
        let sub = b.get(&q).unwrap().into_buffer().unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.sample_rate(), 10);
        assert_eq!(sub.frame(0).unwrap()[0], 5);
        assert_eq!(sub.frame(1).unwrap()[3], 3006);
    }

    #[test]
    fn test_get_by_range() {
        let b = ramp();
        let first = Span::new(1.0, 0.5);
        let last = Span::new(2.0, 0.3);
        let sub = b.get(Index::range(&first, &last)).unwrap().into_buffer().unwrap();
        assert_eq!(sub.len(), 13);
        assert_eq!(sub.frame(0).unwrap()[0], 10);
        assert_eq!(sub.frame(12).unwrap()[0], 22);
    }

    #[test]
    fn test_interval_past_end_is_clamped() {
        let b = ramp();
        let sub = b.get(Span::new(9.5, 3.0)).unwrap().into_buffer().unwrap();
        assert_eq!(sub.len(), 5);
        let none = b.get(Span::new(20.0, 1.0)).unwrap().into_buffer().unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_huge_interval_saturates() {
        let b = ramp();
        let span = Span::new(1.0, 1e300);
        assert_eq!(b.frames_of(&span), (10, usize::MAX));
        assert_eq!(b.frames_within(&span), 90);

        let sub = b.get(span).unwrap().into_buffer().unwrap();
        assert_eq!(sub.len(), 90);
        assert_eq!(sub.frame(89).unwrap()[0], 99);

        let range = b.get(Index::range(&span, &span)).unwrap().into_buffer().unwrap();
        assert_eq!(range.len(), 90);
    }

    #[test]
    fn test_append_respects_capacity() {
        let src = ramp();
        let mut dst = SampleBuffer::with_capacity(5, 4, 10);
        assert!(dst.is_empty());
        dst.append(&src.slice(0, 3)).unwrap();
        dst.append(&src.slice(50, 52)).unwrap();
        assert_eq!(dst.len(), 5);
        assert_eq!(dst.frame(3).unwrap()[0], 50);

        assert_eq!(
            dst.append(&src.slice(0, 1)),
            Err(BufferError::CapacityExceeded {
                needed: 1,
                available: 0
            })
        );

        let stereo = SampleBuffer::with_capacity(1, 2, 10);
        let mut dst = SampleBuffer::with_capacity(5, 4, 10);
        assert!(matches!(
            dst.append(&stereo),
            Err(BufferError::IncompatibleBuffers(_))
        ));
    }

    #[test]
    fn test_concat() {
        let b = ramp();
        let joined = (&b.slice(0, 2) + &b.slice(98, 100)).unwrap();
        assert_eq!(joined.len(), 4);
        let firsts: Vec<i16> = (0..4).map(|i| joined.frame(i).unwrap()[0]).collect();
        assert_eq!(firsts, vec![0, 1, 98, 99]);

        let empty = SampleBuffer::with_capacity(10, 1, 22050);
        assert_eq!((&empty + &b).unwrap(), b);
        assert_eq!((&b + &empty).unwrap(), b);
    }

    #[test]
    fn test_trim_drops_slack() {
        let src = ramp();
        let mut dst = SampleBuffer::with_capacity(50, 4, 10);
        dst.append(&src.slice(0, 10)).unwrap();
        assert_eq!(dst.capacity(), 50);
        assert_eq!(dst.storage().len(), 200);
        let trimmed = dst.into_trimmed();
        assert_eq!(trimmed.capacity(), 10);
        assert_eq!(trimmed.populated(), src.slice(0, 10).populated());
    }
}
