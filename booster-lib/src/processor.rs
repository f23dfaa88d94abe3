//! Saturating gain over 16-bit signed samples.

const DEFAULT_SCALE: f32 = 1.0;

/// Scale one sample, clamping to the `i16` range and rounding to nearest.
#[inline]
pub fn scale_sample(sample: i16, scale: f32) -> i16 {
    let scaled = (sample as f32 * scale).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Return a scaled copy of `samples`.
///
/// # Arguments
/// - `scale`: Linear gain. Non-finite values leave samples unchanged and
///   negative values are treated as silence.
/// - `samples`: Interleaved 16-bit input samples.
///
/// # Returns
/// A new buffer of the same length.
pub fn apply(scale: f32, samples: &[i16]) -> Vec<i16> {
    let mut out = samples.to_vec();
    apply_in_place(scale, &mut out);
    out
}

/// Scale `samples` in place.
pub fn apply_in_place(scale: f32, samples: &mut [i16]) {
    let scale = sanitize_scale(scale);
    if scale == DEFAULT_SCALE {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = scale_sample(*sample, scale);
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        DEFAULT_SCALE
    } else {
        scale.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_samples(len: usize) -> Vec<i16> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.gen::<i16>()).collect()
    }

    #[test]
    fn unit_scale_is_identity() {
        for len in [0, 1, 7, 4_096] {
            let samples = random_samples(len);
            assert_eq!(apply(1.0, &samples), samples);
        }
        let extremes = vec![i16::MIN, -1, 0, 1, i16::MAX];
        assert_eq!(apply(1.0, &extremes), extremes);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut rng = rand::thread_rng();
        let samples = random_samples(4_096);
        for _ in 0..32 {
            let scale = rng.gen_range(0.0_f32..64.0);
            let out = apply(scale, &samples);
            assert_eq!(out.len(), samples.len());
            for (&input, &output) in samples.iter().zip(out.iter()) {
                let expected = (input as f32 * scale).round();
                if expected >= i16::MAX as f32 {
                    assert_eq!(output, i16::MAX);
                } else if expected <= i16::MIN as f32 {
                    assert_eq!(output, i16::MIN);
                } else {
                    assert_eq!(output as f32, expected);
                }
            }
        }
    }

    #[test]
    fn clamps_at_both_rails() {
        assert_eq!(scale_sample(20_000, 2.0), i16::MAX);
        assert_eq!(scale_sample(-20_000, 2.0), i16::MIN);
        assert_eq!(scale_sample(i16::MIN, 1.5), i16::MIN);
        assert_eq!(scale_sample(16_384, 2.0), i16::MAX);
        assert_eq!(scale_sample(-16_384, 2.0), i16::MIN);
    }

    #[test]
    fn doubles_mid_range_samples() {
        assert_eq!(apply(2.0, &[100, -100, 0, 8_000]), vec![200, -200, 0, 16_000]);
    }

    #[test]
    fn zero_scale_silences() {
        assert_eq!(apply(0.0, &[100, -100, i16::MIN]), vec![0, 0, 0]);
    }

    #[test]
    fn invalid_scales_are_sanitized() {
        let samples = vec![100_i16, -100];
        assert_eq!(apply(f32::NAN, &samples), samples);
        assert_eq!(apply(f32::INFINITY, &samples), samples);
        assert_eq!(apply(-3.0, &samples), vec![0, 0]);
    }

    #[test]
    fn in_place_matches_copy() {
        let samples = random_samples(1_024);
        let mut in_place = samples.clone();
        apply_in_place(1.37, &mut in_place);
        assert_eq!(in_place, apply(1.37, &samples));
    }
}
