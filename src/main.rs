use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use ffmpeg_pipeline::{FfmpegBackend, Player, PlayerEvent};

mod config;
mod console;

use console::Command;

/// Plays an RTSP or file URL through the hardware decode pipeline and takes
/// recording and screenshot commands on stdin.
#[derive(Debug, Parser)]
#[command(name = "lite-player", version)]
struct Args {
    /// Stream to start playing right away.
    url: Option<String>,

    /// JSON file with pipeline settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hardware device type (d3d11va, cuda, vaapi, videotoolbox, ...).
    #[arg(long)]
    hw_device: Option<String>,

    #[arg(long)]
    display_capacity: Option<usize>,

    /// Start recording to this file as soon as the stream is open.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Append log records to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pipeline", log::LevelFilter::Debug)
        .filter_module("lite_player", log::LevelFilter::Debug);
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

/// Stand-in for a video widget: takes one frame per tick and reports the
/// render rate now and then.
fn start_renderer(player: Arc<Player>, cancel: CancellationToken) {
    let display = player.display_queue();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(40));
        let mut rendered: u64 = 0;
        let mut since = Instant::now();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(frame) = display.pop() {
                        rendered += 1;
                        log::trace!("render {}", frame);
                    }
                    if since.elapsed() >= Duration::from_secs(5) {
                        if rendered > 0 {
                            log::info!(
                                "rendered {} frames in {:?}, {} waiting",
                                rendered,
                                since.elapsed(),
                                display.len()
                            );
                        }
                        rendered = 0;
                        since = Instant::now();
                    }
                }
            }
        }
    });
}

fn start_event_printer(player: Arc<Player>, cancel: CancellationToken) {
    let mut events = player.events();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => {
                    let Some(event) = event else { break };
                    match event {
                        PlayerEvent::FirstFrame => println!("first frame received"),
                        PlayerEvent::StreamFailed(e) => println!("stream failed: {}", e),
                        PlayerEvent::RecordStarted { path } => {
                            println!("recording started: {}", path.display())
                        }
                        PlayerEvent::RecordFinished { path } => {
                            println!("recording saved: {}", path.display())
                        }
                        PlayerEvent::RecordFailed { path, reason } => {
                            println!("recording to {} failed: {}", path.display(), reason)
                        }
                        PlayerEvent::ScreenshotFinished { path, success } => {
                            if success {
                                println!("screenshot saved: {}", path.display())
                            } else {
                                println!("screenshot failed: {}", path.display())
                            }
                        }
                    }
                }
            }
        }
    });
}

/// Arms recording once the demuxer has published the stream.
fn record_when_ready(player: Arc<Player>, path: PathBuf, cancel: CancellationToken) {
    tokio::spawn(async move {
        let deadline = Instant::now() + player.config().read_timeout() * 2;
        while Instant::now() < deadline && !cancel.is_cancelled() {
            if player.stream().await.is_some() {
                if !player.start_record(&path).await {
                    log::warn!("could not start recording to {}", path.display());
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        log::warn!("stream not ready, recording to {} skipped", path.display());
    });
}

async fn handle_command(player: &Player, command: Command, cancel: &CancellationToken) {
    match command {
        Command::Play(url) => {
            if !player.start_play(&url).await {
                println!("already playing, stop first");
            }
        }
        Command::Stop => player.stop_play().await,
        Command::Record(path) => {
            if !player.start_record(&path).await {
                println!("cannot record now: not playing, stream not open or already recording");
            }
        }
        Command::StopRecord => player.stop_record().await,
        Command::Shot(path) => {
            if !player.screenshot(&path).await {
                println!("screenshot request dropped");
            }
        }
        Command::Quit => cancel.cancel(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;
    ffmpeg_pipeline::init()?;

    let config = config::load(
        args.config.as_deref(),
        config::Overrides {
            hw_device: args.hw_device.clone(),
            display_capacity: args.display_capacity,
        },
    )?;
    log::info!("pipeline config: {:?}", config);

    let player = Arc::new(Player::new(Arc::new(FfmpegBackend), config));
    let cancel = CancellationToken::new();

    start_renderer(player.clone(), cancel.clone());
    start_event_printer(player.clone(), cancel.clone());

    if let Some(url) = &args.url {
        player.start_play(url).await;
        if let Some(path) = args.record.clone() {
            record_when_ready(player.clone(), path, cancel.clone());
        }
    }

    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match Command::parse(&line) {
                        Ok(Some(command)) => handle_command(&player, command, &cancel).await,
                        Ok(None) => {}
                        Err(e) => println!("{}\n{}", e, console::HELP),
                    },
                    // stdin closed, keep playing until ctrl-c
                    Ok(None) => {
                        let _ = tokio::signal::ctrl_c().await;
                        cancel.cancel();
                    }
                    Err(e) => {
                        log::error!("stdin read error: {}", e);
                        cancel.cancel();
                    }
                }
            },
        }
    }

    player.stop_play().await;
    log::info!("bye");
    Ok(())
}
