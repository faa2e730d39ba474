//! `mixdown` - mix WAV files into one stereo file, optionally peak-normalized.
//!
//! Set RUST_LOG=debug for per-window output.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};

use mix_engine::{linear_to_db, MixConfig, MixReport, Mixdown, Normalization, OutputFormat};

const USAGE: &str = "\
Usage: mixdown [options] <output.wav> <input.wav>...

Options:
  -n, --normalize <dB>     normalize the mix to this peak level (usually 0 to -24)
  -c, --config <file>      read mix settings from a JSON file
  -f, --format <format>    output encoding: float (default), pcm16 or pcm24
      --chunk-frames <n>   frames read per block
  -h, --help               print this message";

#[derive(Debug, Default, PartialEq)]
struct Args {
    output: Option<PathBuf>,
    inputs: Vec<PathBuf>,
    target_db: Option<f32>,
    config: Option<PathBuf>,
    format: Option<OutputFormat>,
    chunk_frames: Option<usize>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--" {
            positional.extend(args.by_ref());
            break;
        }

        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };

        let mut value = |name: &str| -> anyhow::Result<String> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => args.next().ok_or_else(|| anyhow!("{} needs a value", name)),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-n" | "--normalize" => {
                let v = value(&flag)?;
                parsed.target_db = Some(v.parse().with_context(|| format!("invalid decibel level '{}'", v))?);
            }
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value(&flag)?)),
            "-f" | "--format" => {
                parsed.format = Some(value(&flag)?.parse().map_err(|e: String| anyhow!(e))?);
            }
            "--chunk-frames" => {
                let v = value(&flag)?;
                parsed.chunk_frames = Some(v.parse().with_context(|| format!("invalid frame count '{}'", v))?);
            }
            other if other.starts_with('-') && other.len() > 1 => bail!("unknown option '{}'", other),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter().map(PathBuf::from);
    parsed.output = positional.next();
    parsed.inputs = positional.collect();

    Ok(parsed)
}

fn load_config(args: &Args) -> anyhow::Result<MixConfig> {
    let mut config = match &args.config {
        Some(path) => MixConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MixConfig::default(),
    };

    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(chunk_frames) = args.chunk_frames {
        config.chunk_frames = chunk_frames;
    }

    Ok(config)
}

fn print_report(report: &MixReport) {
    println!("Created {}", report.output.display());
    println!("Peak: {:.1} dB", report.peak.db());

    match report.normalization {
        Normalization::NotRequested => {}
        Normalization::Applied { target_db, gain, peak } => {
            println!("Normalized to {:.1} dB (gain {:.4}, peak now {:.1} dB)", target_db, gain, peak.db());
        }
        Normalization::SkippedLowSignal { peak, threshold } => {
            println!(
                "Warning: peak of {:.1} dB is below {:.1} dB, too quiet to normalize. {} was still created.",
                linear_to_db(peak),
                linear_to_db(threshold),
                report.output.display()
            );
        }
    }
}

fn run(args: Args) -> ExitCode {
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(output) = args.output else {
        eprintln!("Error: no output file given");
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let mut mixdown = Mixdown::new(output, args.inputs, config);
    if let Some(target_db) = args.target_db {
        mixdown = mixdown.normalize_to(target_db);
    }

    match mixdown.run() {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_usage() {
                eprintln!("{}", USAGE);
            }
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match parse_args(std::env::args().skip(1)) {
        Ok(args) => run(args),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("{}", USAGE);
            ExitCode::FAILURE
        }
    }
}
