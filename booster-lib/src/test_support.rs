//! Fixture helpers shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A unique path in the system temp dir.
pub(crate) fn temp_path(name: &str, extension: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "booster-{}-{}-{}-{}.{}",
        name,
        std::process::id(),
        nanos,
        count,
        extension
    ))
}

/// Write interleaved 16-bit samples to a WAV file.
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for &sample in samples {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

/// Read all samples of a 16-bit WAV file.
pub(crate) fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).expect("open wav");
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .expect("read samples");
    (spec, samples)
}

/// Write an MPEG-4 file with a movie box but no tracks.
pub(crate) fn trackless_movie(path: &Path) {
    let config = mp4::Mp4Config {
        major_brand: "M4A ".parse().expect("brand"),
        minor_version: 512,
        compatible_brands: vec!["isom".parse().expect("brand")],
        timescale: 1000,
    };
    let file = std::fs::File::create(path).expect("create mp4");
    let mut writer =
        mp4::Mp4Writer::write_start(std::io::BufWriter::new(file), &config).expect("start mp4");
    writer.write_end().expect("end mp4");
    let mut file = writer.into_writer();
    std::io::Write::flush(&mut file).expect("flush mp4");
}

/// Frames decoded from each frame written by [`write_silent_mp3`].
pub(crate) const MP3_FRAME_LEN: u64 = 1_152;

/// Write `frames` silent MPEG-1 layer III frames, 44.1 kHz mono at 32 kbps.
///
/// The frame at `corrupt` declares scale factors longer than its granule,
/// which the decoder rejects.
pub(crate) fn write_silent_mp3(path: &Path, frames: usize, corrupt: Option<usize>) {
    // 144 * 32000 / 44100 bytes, no padding.
    const FRAME_BYTES: usize = 104;
    let mut bytes = Vec::with_capacity(frames * FRAME_BYTES);
    for index in 0..frames {
        let mut frame = vec![0_u8; FRAME_BYTES];
        frame[..4].copy_from_slice(&[0xff, 0xfb, 0x10, 0xc0]);
        if corrupt == Some(index) {
            // scalefac_compress = 15 in the first granule, part2_3_length stays 0.
            frame[9] |= 0x01;
            frame[10] |= 0xe0;
        }
        bytes.extend_from_slice(&frame);
    }
    std::fs::write(path, bytes).expect("write mp3");
}
