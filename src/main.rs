use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mplayer_slave::{
  default_config_path, MplayerClient, PlayerConfig, PlayerEvent, Progress, Status,
};

/// Play a file through MPlayer's slave mode, printing metadata and progress.
#[derive(Parser, Debug)]
#[command(name = "mplayer-slave", version)]
struct Args {
  /// File to play
  file: PathBuf,

  /// JSON config file (defaults to the user config directory)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// MPlayer executable, overriding the config
  #[arg(short, long)]
  executable: Option<String>,

  /// Seconds between progress reports
  #[arg(long, default_value_t = 1)]
  interval: u64,
}

fn load_config(args: &Args) -> Result<PlayerConfig, Box<dyn std::error::Error>> {
  let mut config = match args.config.clone().or_else(default_config_path) {
    Some(path) if path.exists() => PlayerConfig::load(&path)?,
    _ => PlayerConfig::default(),
  };
  if let Some(exe) = &args.executable {
    config.executable = Some(exe.clone());
  }
  config.validate()?;
  Ok(config)
}

/// Progress report, or None once the engine went idle at the end of the track.
fn progress_line(p: &Progress) -> Option<String> {
  p.is_complete()
    .then(|| format!("{:6.2}s / {:6.2}s ({:3.0}%)", p.time, p.total, p.percent))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let args = Args::parse();
  let config = load_config(&args)?;

  let player = MplayerClient::spawn(&config);
  let mut events = player.subscribe();
  tokio::spawn(async move {
    while let Ok(event) = events.recv().await {
      match event {
        PlayerEvent::StatusChange { status } => log::info!("Status: {}", status),
        PlayerEvent::Error { error } => log::warn!("Player error: {}", error),
        _ => {}
      }
    }
  });

  player.await_ready().await?;
  player.play(&args.file, false).await?;

  let info = player.get_track_infos().await?;
  println!("{}", serde_json::to_string_pretty(&info)?);

  let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        log::info!("Interrupted");
        break;
      }
      _ = ticker.tick() => {
        if player.status() == Status::Stopped {
          break;
        }
        match player.get_progress().await {
          Ok(p) => match progress_line(&p) {
            Some(line) => println!("{}", line),
            None => {
              log::info!("Playback finished");
              break;
            }
          },
          Err(e) => {
            log::warn!("Progress unavailable: {}", e);
            break;
          }
        }
      }
    }
  }

  let report = player.exit().await?;
  log::info!("MPlayer exited (code: {:?}, signal: {:?})", report.code, report.signal);
  Ok(())
}
