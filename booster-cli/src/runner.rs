use std::path::PathBuf;

use booster_lib::audio::asset::AudioAsset;
use booster_lib::config::level::{linear_to_db, parse_linear_gain};
use booster_lib::config::{BoosterConfig, OutputFormat};
use booster_lib::waveform::load_waveform;
use booster_lib::{BoostError, BoostRequest, Booster, PeakScanner, ScaleFactor};
use clap::ArgMatches;
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ScanOutput {
    input: PathBuf,
    codec: &'static str,
    track_count: usize,
    peak: f32,
    scale: f32,
    gain_db: f32,
    max_sample: u16,
    frames: u64,
    sample_rate: u32,
}

#[derive(Debug, Serialize)]
struct BoostOutput {
    input: PathBuf,
    output: PathBuf,
    peak: Option<f32>,
    scale: f32,
    gain_db: f32,
    frames: u64,
}

/// Run the selected subcommand and return the process exit code.
pub fn run(args: &ArgMatches) -> Result<i32, BoostError> {
    match args.subcommand() {
        Some(("scan", sub)) => run_scan(sub),
        Some(("boost", sub)) => run_boost(sub),
        Some(("waveform", sub)) => run_waveform(sub),
        Some(("create", sub)) => run_create(sub),
        _ => Ok(2),
    }
}

fn run_scan(args: &ArgMatches) -> Result<i32, BoostError> {
    let input = required_path(args, "INPUT")?;
    let config = load_config(args)?;

    let asset = AudioAsset::inspect(&input)?;
    let scan = PeakScanner::from_config(&config).scan(&input)?;
    print_json(&ScanOutput {
        input,
        codec: asset.codec(),
        track_count: asset.track_count(),
        peak: scan.peak,
        scale: scan.scale.value(),
        gain_db: linear_to_db(scan.scale.value()),
        max_sample: scan.max_sample,
        frames: scan.frames,
        sample_rate: scan.sample_rate,
    })?;
    Ok(0)
}

fn run_boost(args: &ArgMatches) -> Result<i32, BoostError> {
    let input = required_path(args, "INPUT")?;
    let output = required_path(args, "OUTPUT")?;
    let mut config = load_config(args)?;

    if let Some(format) = args.get_one::<String>("format") {
        config.writer.format = Some(OutputFormat::parse(format).ok_or_else(|| {
            BoostError::InvalidConfig(format!("unknown output format {}", format))
        })?);
    }

    let mut request = BoostRequest::new(&input, &output);
    if let Some(scan_from) = args.get_one::<String>("scan-from") {
        request = request.scan_from(scan_from);
    }
    if let Some(scale) = args.get_one::<String>("scale") {
        request = request.with_scale(ScaleFactor::new(parse_gain("scale", scale)?)?);
    }

    debug!("boost request: {:?}", request);
    let report = Booster::new(config).process_asset_blocking(request)?;
    info!(
        "wrote {} ({} frames)",
        report.transcode.output.display(),
        report.transcode.frames
    );

    print_json(&BoostOutput {
        input: report.transcode.input,
        output: report.transcode.output,
        peak: report.scan.map(|scan| scan.peak),
        scale: report.transcode.scale,
        gain_db: linear_to_db(report.transcode.scale),
        frames: report.transcode.frames,
    })?;
    Ok(0)
}

fn run_waveform(args: &ArgMatches) -> Result<i32, BoostError> {
    let input = required_path(args, "INPUT")?;
    let width = args.get_one::<usize>("width").copied().unwrap_or(100);
    let height = args.get_one::<f32>("height").copied().unwrap_or(100.0);

    let bins = load_waveform(&input, width, height)?;
    print_json(&bins)?;
    Ok(0)
}

fn run_create(args: &ArgMatches) -> Result<i32, BoostError> {
    match args.subcommand() {
        Some(("config-json", _)) => {
            println!("{}", BoosterConfig::default().to_json_pretty()?);
            Ok(0)
        }
        _ => Ok(2),
    }
}

fn load_config(args: &ArgMatches) -> Result<BoosterConfig, BoostError> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => {
            debug!("loading config from {}", path);
            BoosterConfig::from_json_file(path)?
        }
        None => BoosterConfig::default(),
    };

    if let Some(max_scale) = args.get_one::<String>("max-scale") {
        config.policy.max_scale = Some(parse_gain("max-scale", max_scale)?);
    }
    config.validate()?;
    Ok(config)
}

fn parse_gain(name: &str, value: &str) -> Result<f32, BoostError> {
    parse_linear_gain(value).ok_or_else(|| {
        BoostError::InvalidConfig(format!("--{} expects a gain, got {}", name, value))
    })
}

fn required_path(args: &ArgMatches, name: &str) -> Result<PathBuf, BoostError> {
    args.get_one::<String>(name)
        .map(PathBuf::from)
        .ok_or_else(|| BoostError::InvalidConfig(format!("missing {}", name)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoostError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
