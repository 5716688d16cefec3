use panelplayer::cli::Args;
use panelplayer::config::{DEFAULT_LOG_FILE, PlayerConfig, QUEUE_SIZE};
use panelplayer::core::loader::Loader;
use panelplayer::core::player::Player;
use panelplayer::entities::effects::{Extension, Hook};
use panelplayer::entities::frame::DisplayBuffer;
use panelplayer::output::colorlight::Transmitter;
use panelplayer::output::socket::RawSocket;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::{debug, error, info};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

fn init_logging(args: &Args) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILE.into());

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging, RUST_LOG wins over -v
        let default_level = log_level.as_str().to_ascii_lowercase();
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }

    Ok(())
}

/// Acquire everything in order, play, then release in reverse on drop.
fn run(config: PlayerConfig) -> anyhow::Result<()> {
    let buffer = DisplayBuffer::new(config.width, config.height);

    let loader = Loader::new(QUEUE_SIZE).context("Failed to create loader")?;

    let socket = RawSocket::open(&config.port)
        .with_context(|| format!("Failed to open interface {}", config.port))?;

    let extension = Extension::load(&config.extension).context("Failed to load extension")?;
    let hook = Hook::init(extension).context("Failed to initialise extension")?;

    let mut player = Player::new(
        config.playback,
        config.sources,
        buffer,
        loader,
        Transmitter::new(socket),
        hook,
    );

    let stop = player.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
        .context("Failed to install Ctrl+C handler")?;

    let summary = player.run();
    let stats = player.transmitter().stats();
    info!(
        "Played {} source(s), skipped {}, {} frames; {} packets sent, {} failed",
        summary.played, summary.skipped, summary.frames, stats.packets, stats.failed
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    info!("PanelPlayer starting...");
    debug!("Command-line args: {:?}", args);

    let config = match PlayerConfig::try_from(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", Args::command().render_usage());
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
