use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Select;
use image::RgbaImage;
use tracing::{debug, info};

use boardsight::calibrate::{Calibration, CalibrationController, CalibrationSource};
use boardsight::capture::{FrameSource, ImageFileSource, ScreenCapture, load_frame};
use boardsight::config::{self, CalibrationStore, JsonFileStore, Tunables};
use boardsight::diff::{BoardSnapshot, FrameDifferencer};
use boardsight::engine::RemoteEngine;
use boardsight::execute::ConsoleExecutor;
use boardsight::geometry::BoardRegion;
use boardsight::locate::BoardLocalizer;
use boardsight::watch::Watcher;
use boardsight::{PlayerSide, logging};

fn cli() -> Command {
    Command::new("boardsight")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Finds a chessboard on screen and reads moves off it")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.json and calibration.json")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging (-v debug, -vv trace); RUST_LOG overrides")
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("watch")
                .about("Watch the primary display and play against the remote engine")
                .arg(
                    Arg::new("engine-url")
                        .long("engine-url")
                        .value_name("URL")
                        .help("Engine server base URL (default from config.json)"),
                )
                .arg(
                    Arg::new("engine-color")
                        .long("engine-color")
                        .value_name("COLOR")
                        .help("Colour the engine plays")
                        .value_parser(["white", "black"]),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Only print detected moves; never contact the engine")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("frames")
                        .long("frames")
                        .value_name("IMAGES")
                        .help("Replay these screenshots instead of capturing the display; the last one repeats")
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("calibrate")
                .about("Confirm the board region manually; overrides auto-detection until reset")
                .arg(pixel_arg("x", "Left edge of the board in screen pixels"))
                .arg(pixel_arg("y", "Top edge of the board in screen pixels"))
                .arg(pixel_arg("size", "Board width/height in screen pixels"))
                .arg(
                    Arg::new("side")
                        .long("side")
                        .value_name("COLOR")
                        .help("Side shown at the bottom of the screen (asked if omitted)")
                        .value_parser(["white", "black"]),
                ),
        )
        .subcommand(
            Command::new("locate")
                .about("Run board localization on a screenshot")
                .arg(image_arg("image", "Screenshot to analyse")),
        )
        .subcommand(
            Command::new("diff")
                .about("Detect the move between two screenshots")
                .arg(image_arg("before", "Screenshot before the move"))
                .arg(image_arg("after", "Screenshot after the move")),
        )
        .subcommand(Command::new("status").about("Show the stored calibration"))
        .subcommand(Command::new("reset").about("Clear the stored calibration"))
}

fn pixel_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("PX")
        .help(help)
        .required(true)
        .value_parser(value_parser!(u32))
}

fn image_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .value_name("IMAGE")
        .help(help)
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    logging::init(matches.get_count("verbose"));

    let dir = config::config_dir(matches.get_one::<PathBuf>("config-dir").map(PathBuf::as_path));
    debug!("Config directory: {}", dir.display());
    let tunables = config::load_tunables(&dir);

    match matches.subcommand() {
        Some(("watch", sub)) => watch(&dir, tunables, sub).await,
        Some(("calibrate", sub)) => calibrate(&dir, tunables, sub),
        Some(("locate", sub)) => locate(&tunables, sub),
        Some(("diff", sub)) => diff(&dir, &tunables, sub),
        Some(("status", _)) => status(&dir),
        Some(("reset", _)) => reset(&dir, tunables),
        _ => anyhow::bail!("Unknown command. Run with --help for usage."),
    }
}

async fn watch(dir: &Path, mut tunables: Tunables, args: &ArgMatches) -> Result<()> {
    if let Some(url) = args.get_one::<String>("engine-url") {
        tunables.watch.engine_url = url.clone();
    }
    if let Some(color) = args.get_one::<String>("engine-color") {
        tunables.watch.engine_color = color.parse()?;
    }

    let engine = if args.get_flag("dry-run") {
        None
    } else {
        let timeout = Duration::from_secs(tunables.watch.request_timeout_secs);
        let engine = RemoteEngine::new(&tunables.watch.engine_url, timeout)?;
        println!(
            "Engine: {} (engine plays {})",
            engine.base_url(),
            tunables.watch.engine_color
        );
        Some(Arc::new(engine))
    };

    let controller = CalibrationController::new(
        JsonFileStore::in_dir(dir),
        BoardLocalizer::new(tunables.locate.clone()),
    );
    let current = controller.current();
    if current.is_usable() {
        println!("Calibration: {}", describe(&current));
    } else {
        println!("No calibration stored; the board will be located automatically.");
    }

    match args.get_many::<PathBuf>("frames") {
        Some(paths) => {
            let paths: Vec<PathBuf> = paths.cloned().collect();
            info!("Replaying {} screenshot(s)", paths.len());
            run_watcher(ImageFileSource::new(paths), controller, engine, &tunables).await
        }
        None => run_watcher(ScreenCapture::new(), controller, engine, &tunables).await,
    }
}

async fn run_watcher<F>(
    source: F,
    controller: CalibrationController<JsonFileStore>,
    engine: Option<Arc<RemoteEngine>>,
    tunables: &Tunables,
) -> Result<()>
where
    F: FrameSource + Send + 'static,
{
    let watcher = Watcher::new(
        source,
        controller,
        tunables.diff.clone(),
        engine,
        Arc::new(ConsoleExecutor),
        tunables.watch.clone(),
    );
    watcher.run().await
}

fn calibrate(dir: &Path, tunables: Tunables, args: &ArgMatches) -> Result<()> {
    let region = BoardRegion::new(
        *args.get_one::<u32>("x").context("--x is required")?,
        *args.get_one::<u32>("y").context("--y is required")?,
        *args.get_one::<u32>("size").context("--size is required")?,
    );
    let bottom = match args.get_one::<String>("side") {
        Some(side) => side.parse::<PlayerSide>()?,
        None => ask_bottom_side()?,
    };

    let mut controller = CalibrationController::new(JsonFileStore::in_dir(dir), BoardLocalizer::new(tunables.locate));
    let calibration = controller
        .confirm_manual(region, bottom == PlayerSide::White)
        .context("Failed to confirm calibration")?;
    println!("Saved: {}", describe(&calibration));
    Ok(())
}

fn ask_bottom_side() -> Result<PlayerSide> {
    let sides = [PlayerSide::White, PlayerSide::Black];
    let labels = ["White at the bottom", "Black at the bottom"];
    let choice = Select::new()
        .with_prompt("Which side is at the bottom of the screen?")
        .items(&labels)
        .default(0)
        .interact()
        .context("Failed to read side selection")?;
    Ok(sides[choice])
}

fn locate(tunables: &Tunables, args: &ArgMatches) -> Result<()> {
    let path = args.get_one::<PathBuf>("image").context("IMAGE is required")?;
    let frame = load_frame(path)?;
    let localizer = BoardLocalizer::new(tunables.locate.clone());
    let found = localizer
        .locate(&frame)
        .with_context(|| format!("Failed to locate a board in {}", path.display()))?;

    println!(
        "Region: x={} y={} size={}",
        found.region.origin_x, found.region.origin_y, found.region.size
    );
    println!("Bottom side: {}", bottom_side(found.orientation.pieces_flipped));
    println!("Strategy: {}", found.strategy);
    Ok(())
}

fn diff(dir: &Path, tunables: &Tunables, args: &ArgMatches) -> Result<()> {
    let before_path = args.get_one::<PathBuf>("before").context("BEFORE is required")?;
    let after_path = args.get_one::<PathBuf>("after").context("AFTER is required")?;
    let before = load_frame(before_path)?;
    let after = load_frame(after_path)?;

    // A manual calibration is honoured; otherwise locate on the first screenshot without saving
    let stored = JsonFileStore::in_dir(dir)
        .load()
        .context("Failed to read stored calibration")?
        .filter(|c| c.is_manual() && c.is_usable());
    let calibration = match stored {
        Some(manual) => manual,
        None => {
            let found = BoardLocalizer::new(tunables.locate.clone())
                .locate(&before)
                .with_context(|| format!("Failed to locate a board in {}", before_path.display()))?;
            Calibration {
                region: found.region,
                orientation: found.orientation,
                source: CalibrationSource::AutoDetected,
            }
        }
    };
    println!("Calibration: {}", describe(&calibration));

    let snapshot = |frame: &RgbaImage, path: &Path| {
        BoardSnapshot::capture(frame, calibration.region, calibration.orientation, &tunables.diff)
            .with_context(|| format!("Failed to read the board in {}", path.display()))
    };
    let mut differ = FrameDifferencer::new(tunables.diff.clone());
    let first = snapshot(&before, before_path)?;
    info!("Before:\n{}", first.ascii());
    differ.observe(first);
    let second = snapshot(&after, after_path)?;
    info!("After:\n{}", second.ascii());
    let moves = differ.observe(second);

    if moves.is_empty() {
        println!("No move detected.");
    }
    for mv in moves {
        let tag = if mv.special { " (special)" } else { "" };
        println!("Move: {}{}", mv, tag);
    }
    Ok(())
}

fn status(dir: &Path) -> Result<()> {
    let store = JsonFileStore::in_dir(dir);
    match store
        .load()
        .with_context(|| format!("Failed to read {}", store.path().display()))?
    {
        Some(calibration) if calibration.is_usable() => println!("{}", describe(&calibration)),
        _ => println!("Not calibrated ({})", store.path().display()),
    }
    Ok(())
}

fn reset(dir: &Path, tunables: Tunables) -> Result<()> {
    let mut controller = CalibrationController::new(JsonFileStore::in_dir(dir), BoardLocalizer::new(tunables.locate));
    controller.forget();
    println!("Calibration cleared.");
    Ok(())
}

fn describe(calibration: &Calibration) -> String {
    let region = calibration.region;
    format!(
        "x={} y={} size={}, {} at the bottom, {}",
        region.origin_x,
        region.origin_y,
        region.size,
        bottom_side(calibration.orientation.pieces_flipped),
        calibration.source
    )
}

fn bottom_side(pieces_flipped: bool) -> PlayerSide {
    if pieces_flipped { PlayerSide::Black } else { PlayerSide::White }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_watch_accepts_replay_frames() {
        let matches = cli()
            .try_get_matches_from(["boardsight", "watch", "--dry-run", "--frames", "a.png", "b.png"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "watch");
        let frames: Vec<PathBuf> = sub.get_many::<PathBuf>("frames").unwrap().cloned().collect();
        assert_eq!(frames, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
        assert!(sub.get_flag("dry-run"));

        let live = cli().try_get_matches_from(["boardsight", "watch"]).unwrap();
        assert!(live.subcommand_matches("watch").unwrap().get_many::<PathBuf>("frames").is_none());
    }
}
