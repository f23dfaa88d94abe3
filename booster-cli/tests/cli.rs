use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn booster() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("booster"))
}

fn write_wav(path: &Path, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for &sample in samples {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn half_scale_clip() -> Vec<i16> {
    let mut samples = vec![500_i16; 8_000];
    samples[4_000] = 16_384;
    samples
}

#[test]
fn create_config_json_outputs_defaults() {
    booster()
        .args(["create", "config-json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"queue_depth\": 2"))
        .stdout(predicate::str::contains("\"downmix_to_mono\": true"))
        .stdout(predicate::str::contains("\"bit_rate\": 128000"))
        .stdout(predicate::str::contains("\"max_scale\": null"));
}

#[test]
fn scan_prints_peak_and_scale() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("clip.wav");
    write_wav(&input, &half_scale_clip());

    let output = booster()
        .arg("scan")
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(json["max_sample"], 16_384);
    assert_eq!(json["frames"], 8_000);
    assert_eq!(json["codec"], "pcm_s16le");
    assert_eq!(json["track_count"], 1);
    let gain_db = json["gain_db"].as_f64().expect("gain_db");
    assert!((gain_db - 6.02).abs() < 0.05);
    let scale = json["scale"].as_f64().expect("scale");
    assert!((scale - 2.0).abs() < 1e-2);
}

#[test]
fn boost_writes_a_full_scale_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("quiet.wav");
    let output = dir.path().join("loud.wav");
    write_wav(&input, &half_scale_clip());

    booster()
        .arg("boost")
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"frames\": 8000"));

    let mut reader = hound::WavReader::open(&output).expect("open output");
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .expect("samples");
    assert_eq!(samples.len(), 8_000);
    assert_eq!(samples[4_000], i16::MAX);
    assert_eq!(samples[0], 1_000);
}

#[test]
fn boost_honors_an_explicit_scale() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_wav(&input, &[100; 400]);

    booster()
        .args(["--quiet", "boost"])
        .arg(&input)
        .arg(&output)
        .args(["--scale", "3"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    let mut reader = hound::WavReader::open(&output).expect("open output");
    assert!(reader.samples::<i16>().all(|s| s.expect("sample") == 300));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("absent.wav");
    let output = dir.path().join("out.wav");

    booster()
        .arg("boost")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[ERROR]"));
    assert!(!output.exists());
}

#[test]
fn invalid_config_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.wav");
    let config = dir.path().join("config.json");
    write_wav(&input, &[1; 100]);
    std::fs::write(&config, r#"{ "queue_depth": 0 }"#).expect("write config");

    booster()
        .arg("scan")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue_depth"));
}

#[test]
fn waveform_prints_bins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.wav");
    let samples: Vec<i16> = (0..800).map(|i| if i < 400 { 250 } else { 1_000 }).collect();
    write_wav(&input, &samples);

    let output = booster()
        .arg("waveform")
        .arg(&input)
        .args(["--width", "2", "--height", "2000"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let bins: Vec<f32> = serde_json::from_slice(&output).expect("json");
    assert_eq!(bins, vec![250.0, 1_000.0]);
}
