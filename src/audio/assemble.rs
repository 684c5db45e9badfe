use super::{BufferError, SampleBuffer};
use crate::quantum::Interval;

/// Extra frames allocated by [`assemble`] beyond the summed interval
/// lengths, about two seconds at common rates, to absorb rounding.
pub const ASSEMBLY_SLACK_FRAMES: usize = 100_000;

/// Render `intervals` of `source`, in order, into a new buffer.
///
/// Intervals reaching past the end of `source` contribute only the frames it
/// holds. The result's `len()` is the number of frames written; its storage
/// keeps [`ASSEMBLY_SLACK_FRAMES`] of zeroed slack until trimmed.
pub fn assemble<'a, I, T>(source: &SampleBuffer, intervals: I) -> Result<SampleBuffer, BufferError>
where
    I: IntoIterator<Item = &'a T>,
    T: Interval + 'a,
{
    let intervals: Vec<&T> = intervals.into_iter().collect();
    let too_large = || BufferError::TooLarge(format!("{} intervals", intervals.len()));
    let total = intervals
        .iter()
        .try_fold(0usize, |acc, x| acc.checked_add(source.frames_within(*x)))
        .ok_or_else(too_large)?;
    let frames = total
        .checked_add(ASSEMBLY_SLACK_FRAMES)
        .filter(|f| f.checked_mul(source.channels() as usize).is_some())
        .ok_or_else(too_large)?;

    let mut out = SampleBuffer::with_capacity(
        frames,
        source.channels(),
        source.sample_rate(),
    );
    for x in &intervals {
        let (from, to) = source.frames_of(*x);
        out.append(&source.slice(from, to))?;
    }
    log::debug!(
        "Assembled {} intervals into {} frames ({:.2}s)",
        intervals.len(),
        out.len(),
        out.duration()
    );
    Ok(out)
}

/// Blend two buffers. `ratio` weights `a` when `a` is at least as long as
/// `b`, and weights `b` otherwise; the other operand gets `1 - ratio`. The
/// result is as long as the longer operand, with the shorter one mixed into
/// its prefix.
pub fn mix(a: &SampleBuffer, b: &SampleBuffer, ratio: f64) -> Result<SampleBuffer, BufferError> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(BufferError::InvalidRatio(ratio));
    }
    a.check_compatible(b)?;

    let (long, short, long_weight) = if a.len() >= b.len() {
        (a, b, ratio)
    } else {
        (b, a, 1.0 - ratio)
    };
    let short_weight = 1.0 - long_weight;

    let short_samples = short.populated();
    let samples: Vec<i16> = long
        .populated()
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            let mut v = l as f64 * long_weight;
            if let Some(&s) = short_samples.get(i) {
                v += s as f64 * short_weight;
            }
            // float-to-int casts saturate
            v.round() as i16
        })
        .collect();

    SampleBuffer::from_samples(samples, long.channels(), long.sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::ramp;
    use crate::quantum::{Kind, Quantum, QuantumList, Span};

    #[test]
    fn test_assemble_picks_rows_in_order() {
        let src = ramp();
        let intervals = [Span::new(0.0, 0.3), Span::new(0.5, 0.2)];
        let out = assemble(&src, &intervals).unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(out.capacity(), 5 + ASSEMBLY_SLACK_FRAMES);
        assert_eq!(out.channels(), 4);
        assert_eq!(out.sample_rate(), 10);
        let rows: Vec<i16> = (0..5).map(|i| out.frame(i).unwrap()[0]).collect();
        assert_eq!(rows, vec![0, 1, 2, 5, 6]);
        assert_eq!(out.frame(4).unwrap(), src.frame(6).unwrap());
        assert!(out.storage()[5 * 4..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_assemble_round_trip() {
        let src = ramp();
        let picked = QuantumList::from_quanta(
            Some(Kind::Beat),
            vec![
                Quantum::new(Kind::Beat, 7.0, 1.5),
                Quantum::new(Kind::Beat, 0.0, 0.4),
                Quantum::new(Kind::Beat, 3.3, 2.0),
            ],
        );
        let out = assemble(&src, &picked).unwrap().into_trimmed();

        let mut offset = 0.0;
        for q in &picked {
            let moved = Span::new(offset, q.duration);
            let expected = src.get(q).unwrap().into_buffer().unwrap();
            let got = out.get(moved).unwrap().into_buffer().unwrap();
            assert_eq!(got.populated(), expected.populated());
            offset += q.duration;
        }
        assert_eq!(out.len(), 15 + 4 + 20);
    }

    #[test]
    fn test_assemble_reversed_and_empty() {
        let src = ramp();
        let forward = [Span::new(1.0, 0.1), Span::new(2.0, 0.1)];
        let reversed: Vec<Span> = forward.iter().rev().copied().collect();
        let out = assemble(&src, &reversed).unwrap();
        assert_eq!(out.frame(0).unwrap()[0], 20);
        assert_eq!(out.frame(1).unwrap()[0], 10);

        let none: [Span; 0] = [];
        assert!(assemble(&src, &none).unwrap().is_empty());
    }

    #[test]
    fn test_assemble_clamps_oversized_intervals() {
        let src = ramp();
        let intervals = [Span::new(9.0, 1e300), Span::new(0.0, 1e300), Span::new(1e300, 1.0)];
        let out = assemble(&src, &intervals).unwrap();
        assert_eq!(out.len(), 10 + 100);
        assert_eq!(out.capacity(), 110 + ASSEMBLY_SLACK_FRAMES);
        assert_eq!(out.frame(0).unwrap()[0], 90);
        assert_eq!(out.frame(10).unwrap()[0], 0);
    }

    #[test]
    fn test_self_mix_is_identity() {
        let src = ramp();
        assert_eq!(mix(&src, &src, 0.5).unwrap(), src);
    }

    #[test]
    fn test_mix_weights_follow_longer_operand() {
        let long = SampleBuffer::from_samples(vec![1000; 4], 1, 8000).unwrap();
        let short = SampleBuffer::from_samples(vec![-1000; 2], 1, 8000).unwrap();

        // a is longer: ratio weights a
        let m = mix(&long, &short, 0.75).unwrap();
        assert_eq!(m.populated(), &[500, 500, 750, 750]);

        // b is longer: ratio weights a, the shorter one
        let m = mix(&short, &long, 0.75).unwrap();
        assert_eq!(m.populated(), &[-500, -500, 250, 250]);
    }

    #[test]
    fn test_mix_saturates_and_validates() {
        let loud = SampleBuffer::from_samples(vec![i16::MAX, i16::MIN], 2, 8000).unwrap();
        assert_eq!(mix(&loud, &loud, 1.0).unwrap(), loud);

        assert_eq!(
            mix(&loud, &loud, 1.5),
            Err(BufferError::InvalidRatio(1.5))
        );
        let other = SampleBuffer::from_samples(vec![0, 0], 2, 44100).unwrap();
        assert!(matches!(
            mix(&loud, &other, 0.5),
            Err(BufferError::IncompatibleBuffers(_))
        ));
    }
}
