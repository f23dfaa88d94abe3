//! CLI argument definitions for `booster-cli`.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("Booster")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Peak-normalize audio files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .conflicts_with("debug")
                .help("Suppress all log output"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .short('d')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .subcommand(
            Command::new("scan")
                .about("Measure the peak of a file and print it as JSON")
                .arg(input_arg())
                .arg(config_arg())
                .arg(max_scale_arg()),
        )
        .subcommand(
            Command::new("boost")
                .about("Rewrite a file so its loudest sample reaches full scale")
                .arg(input_arg())
                .arg(
                    Arg::new("OUTPUT")
                        .help("The output file path (.wav, or .m4a with the m4a feature)")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::new("scan-from")
                        .long("scan-from")
                        .value_name("PATH")
                        .help("Measure the peak on this file instead of INPUT"),
                )
                .arg(
                    Arg::new("scale")
                        .long("scale")
                        .short('s')
                        .value_name("GAIN")
                        .conflicts_with("scan-from")
                        .help("Apply this gain instead of scanning (e.g. 2.0 or 6db)"),
                )
                .arg(max_scale_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .value_name("FORMAT")
                        .value_parser(["wav", "m4a"])
                        .help("Output format; inferred from OUTPUT when omitted"),
                )
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("waveform")
                .about("Print waveform display bins as JSON")
                .arg(input_arg())
                .arg(
                    Arg::new("width")
                        .long("width")
                        .value_name("BINS")
                        .default_value("100")
                        .value_parser(value_parser!(usize))
                        .help("Number of bins"),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_name("HEIGHT")
                        .default_value("100")
                        .value_parser(value_parser!(f32))
                        .help("Height the loudest bin is scaled to twice"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("config-json").about("Print the default booster configuration"),
                ),
        )
}

fn input_arg() -> Arg {
    Arg::new("INPUT")
        .help("The input file path")
        .required(true)
        .index(1)
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_name("PATH")
        .help("Path to a JSON booster configuration")
}

fn max_scale_arg() -> Arg {
    Arg::new("max-scale")
        .long("max-scale")
        .value_name("GAIN")
        .help("Upper bound for the derived scale (e.g. 8.0 or 18db)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn boost_accepts_overrides() {
        let matches = build_cli()
            .try_get_matches_from([
                "booster", "boost", "in.wav", "out.wav", "--scale", "6db", "--format", "wav",
            ])
            .expect("matches");
        let (name, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "boost");
        assert_eq!(sub.get_one::<String>("scale").map(String::as_str), Some("6db"));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("wav"));
    }

    #[test]
    fn scale_conflicts_with_scan_source() {
        let result = build_cli().try_get_matches_from([
            "booster", "boost", "in.wav", "out.wav", "--scale", "2", "--scan-from", "ref.wav",
        ]);
        assert!(result.is_err());
    }
}
