//! Conversions between raw little-endian PCM bytes and 16-bit samples.

/// Interpret `bytes` as consecutive little-endian `i16` samples.
///
/// A trailing odd byte is ignored.
///
/// # Example
/// ```rust
/// use booster_lib::audio::samples::samples_from_le_bytes;
///
/// let samples = samples_from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x7f]);
/// assert_eq!(samples, vec![1, -1]);
/// ```
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize samples as little-endian bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Average interleaved frames of `channels` samples into one channel.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}
