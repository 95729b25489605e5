//! # shelfcam_cli
//!
//! Part of the shelfcam crate family.
//!
//! This is the command line video generator. It plays one experiment with its
//! weight plot overlaid (optionally writing the composite video), or synchronizes
//! every experiment of a folder in batch.
//!
//! ## Install
//!
//! Use `cargo install --path ./shelfcam_cli`
//!
//! ## Use
//!
//! Make a template configuration and set `weight_offset_s` for your rig
//!
//! ```bash
//! shelfcam_cli new -p config.yml
//! ```
//!
//! Play camera 3 of an experiment against load cell 5309446, showing the video
//!
//! ```bash
//! shelfcam_cli --config config.yml -c 3 -w 5309446 --show path/to/2019-05-01_12-00-00
//! ```
//!
//! With `-c -1` (the default) the stitched multicam video is played next to one
//! plot per shelf. `--label` turns on labeling: `b`/`n` print segment start/end
//! marks and unknown keys no longer exit.
//!
//! Synchronize every experiment in a folder with a pool of workers
//!
//! ```bash
//! shelfcam_cli --config config.yml --multi-cam path/to/experiments
//! ```
//!
//! ## Keys
//!
//! - space: pause/resume
//! - left/right: skip 80 frames back/forward; up/down: skip 8 frames forward/back
//! - a/d: move the weight plot 1s; w/s: move it 0.1s
//! - b/n: mark segment start/end (labeling only)
//! - escape: exit
mod batch;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use libshelfcam::config::Config;
use libshelfcam::error::{ConfigError, ProcessorError};
use libshelfcam::experiment::Experiment;
use libshelfcam::player::EventHandler;
use libshelfcam::process::{run_session, SessionRequest};
use libshelfcam::timestamp::{format_timestamp, Timestamp};
use libshelfcam::weights::WeightSelection;

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

fn build_cli() -> Command {
    Command::new("shelfcam_cli")
        .about("Synchronize shelf camera recordings and overlay weight plots")
        .arg_required_else_help(true)
        .subcommand_negates_reqs(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .help("Path to the file"),
                ),
        )
        .arg(
            Arg::new("folder")
                .required(true)
                .help("Folder containing the experiment to visualize (or, with --multi-cam, the experiments)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Configuration yaml file; defaults are used when omitted"),
        )
        .arg(
            Arg::new("cam")
                .short('c')
                .long("cam")
                .default_value("-1")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("ID of the camera to visualize (-1 for the multicam video)"),
        )
        .arg(
            Arg::new("weight")
                .short('w')
                .long("weight")
                .default_value("-1")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("ID of the weight sensor to visualize (-1 for all shelves)"),
        )
        .arg(
            Arg::new("t-lims")
                .short('l')
                .long("t-lims")
                .value_parser(value_parser!(f64))
                .help("Half length (in s) of the weight plot sliding window"),
        )
        .arg(
            Arg::new("t-start")
                .short('s')
                .long("t-start")
                .default_value("0")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("Experiment time at which to start generating the video"),
        )
        .arg(
            Arg::new("t-end")
                .short('e')
                .long("t-end")
                .default_value("-1")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("Experiment time at which to stop generating the video (-1 for no limit)"),
        )
        .arg(
            Arg::new("scale")
                .short('k')
                .long("scale")
                .value_parser(value_parser!(f64))
                .help("Ratio (0-1) to scale down the weight plot wrt the video's height (1 puts it beside the video)"),
        )
        .arg(
            Arg::new("fps")
                .short('r')
                .long("fps")
                .value_parser(value_parser!(u32))
                .help("Output video frame rate"),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("Seconds the camera clock is ahead of the weight sensor clock"),
        )
        .arg(
            Arg::new("threads")
                .short('j')
                .long("threads")
                .value_parser(value_parser!(usize))
                .help("Number of batch workers (defaults to the available parallelism)"),
        )
        .arg(
            Arg::new("multi-cam")
                .long("multi-cam")
                .action(ArgAction::SetTrue)
                .help("Generate the multi-cam videos of every experiment in the folder"),
        )
        .arg(
            Arg::new("show")
                .long("show")
                .action(ArgAction::SetTrue)
                .help("Show the video and take keyboard commands"),
        )
        .arg(
            Arg::new("label")
                .long("label")
                .action(ArgAction::SetTrue)
                .help("Print segment marks placed with b/n (implies --show)"),
        )
        .arg(
            Arg::new("no-save")
                .long("no-save")
                .action(ArgAction::SetTrue)
                .help("Don't write the composite video"),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .help("Regenerate existing multi-cam videos and alignments"),
        )
}

/// Load the config (if any) and apply the command line overrides
fn load_config(matches: &ArgMatches) -> Result<Config, ConfigError> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            log::info!("Loading config from {path}...");
            Config::read_config_file(Path::new(path))?
        }
        None => Config::default(),
    };
    if let Some(fps) = matches.get_one::<u32>("fps") {
        config.video_fps = *fps;
    }
    if let Some(window) = matches.get_one::<f64>("t-lims") {
        config.plot_window_s = *window;
    }
    if let Some(scale) = matches.get_one::<f64>("scale") {
        config.plot_scale = *scale;
    }
    if let Some(offset) = matches.get_one::<f64>("offset") {
        config.weight_offset_s = Some(*offset);
    }
    if let Some(threads) = matches.get_one::<usize>("threads") {
        config.n_threads = Some(*threads);
    }
    if matches.get_flag("overwrite") {
        config.overwrite = true;
    }
    // Catch a bad timezone or frame rate before any work starts
    config.timezone()?;
    config.fps()?;
    Ok(config)
}

/// Positive values only; 0 and negative mean "no limit"
fn positive(value: Option<&f64>) -> Option<f64> {
    value.copied().filter(|v| *v > 0.0)
}

fn print_event(is_start: bool, timestamp: &Timestamp) {
    let what = if is_start { "start" } else { "end" };
    match format_timestamp(timestamp) {
        Ok(t) => {
            log::info!("Marked segment {what} at {t}");
            println!("{what} {t}");
        }
        Err(e) => log::error!("Could not format event timestamp: {e}"),
    }
}

fn run_single(folder: &Path, matches: &ArgMatches, config: &Config) -> Result<(), ProcessorError> {
    let experiment = Experiment::new(folder, config.timezone()?)?;
    let camera = matches.get_one::<i64>("cam").copied().unwrap_or(-1);
    let label = matches.get_flag("label");
    let request = SessionRequest {
        camera: usize::try_from(camera).ok(),
        weights: WeightSelection::from_id(matches.get_one::<i64>("weight").copied().unwrap_or(-1)),
        clip_start_s: positive(matches.get_one::<f64>("t-start")),
        clip_end_s: positive(matches.get_one::<f64>("t-end")),
        save_video: !matches.get_flag("no-save"),
        visualize: label || matches.get_flag("show"),
    };
    log::info!("Experiment: {}", experiment.name());

    let mut on_event = print_event;
    let events: Option<&mut dyn EventHandler> = if label { Some(&mut on_event) } else { None };
    let outcome = run_session(&experiment, &request, config, events)?;
    let offset = format_timestamp(&outcome.time_offset)?;
    println!(
        "Weight recording starts at camera time {offset} (offset {:.3}s)",
        -outcome.start_offset_s
    );
    Ok(())
}

fn main() -> ExitCode {
    // Create a cli
    let matches = build_cli().get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    if let Some(("new", sub_matches)) = matches.subcommand() {
        let path = PathBuf::from(sub_matches.get_one::<String>("path").expect("We require args"));
        log::info!("Making a template config at {}...", path.to_string_lossy());
        make_template_config(&path);
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&matches) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let folder = PathBuf::from(matches.get_one::<String>("folder").expect("We require args"));

    if matches.get_flag("multi-cam") {
        match batch::run_batch(&folder, &config, &pb_manager) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{e}");
                ExitCode::FAILURE
            }
        }
    } else {
        match run_single(&folder, &matches, &config) {
            Ok(()) => {
                log::info!("Done.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Video generation failed with error: {e}");
                ExitCode::FAILURE
            }
        }
    }
}
