mod app;
mod chat;
mod commands;
mod config;
mod constants;
mod error;
mod fetcher;
mod input;
mod locator;
mod search;
mod segment;
mod store;
mod theme;
mod transcript;
mod ui;
mod youtube;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Settings;
use segment::SegmentPolicy;
use store::{TranscriptStore, download_file_name};
use youtube::{YouTube, http_client, timestamp_url, video_id_from_url};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Video URL or id to open in the panel
  url: Option<String>,

  /// API key for the chat model (not saved to settings)
  #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
  api_key: Option<String>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Print a video's transcript
  Transcript {
    url: String,
    /// Write to this file (or into this directory) instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Emit JSON instead of plain text
    #[arg(long)]
    json: bool,
  },
  /// Print the transcript lines matching QUERY
  Search { url: String, query: String },
  /// Ask a question about a video
  Ask { url: String, question: String },
  /// Answer JSON commands on stdin, one per line
  Serve,
  /// Generate shell completions
  Completions { shell: clap_complete::Shell },
}

// --- Logging ---

/// Log to a daily file in the data dir; the terminal belongs to the panel.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let dirs = ProjectDirs::from("", "", "ytx")?;
  let log_dir = dirs.data_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "ytx.log"));
  let filter = EnvFilter::try_from_env("YTX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging();
  info!(version = env!("CARGO_PKG_VERSION"), "ytx starting");

  let youtube = YouTube::new(http_client().context("Failed to build HTTP client")?);
  let new_app = |settings: Settings| {
    let mut app = App::new(settings, Settings::path(), youtube.clone());
    app.api_key_override = args.api_key.clone().filter(|k| !k.trim().is_empty());
    app
  };

  match &args.command {
    Some(Cmd::Completions { shell }) => {
      clap_complete::generate(*shell, &mut Args::command(), "ytx", &mut std::io::stdout());
      Ok(())
    }
    Some(Cmd::Transcript { url, output, json }) => print_transcript(&youtube, url, output.as_deref(), *json).await,
    Some(Cmd::Search { url, query }) => print_matches(&youtube, url, query).await,
    Some(Cmd::Ask { url, question }) => {
      let app = new_app(Settings { auto_fetch: true, ..Settings::load() });
      ask(app, url, question).await
    }
    Some(Cmd::Serve) => serve(new_app(Settings::load())).await,
    None => {
      let mut app = new_app(Settings::load());
      if let Some(url) = &args.url
        && let Err(e) = app.navigate(url)
      {
        app.set_error(e.to_string());
      }

      let default_hook = std::panic::take_hook();
      std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        default_hook(info);
      }));

      let mut terminal = ratatui::init();
      let result = run(&mut terminal, app).await;
      ratatui::restore();
      result
    }
  }
}

async fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.transcript_state.cancel();
  Ok(())
}

// --- Subcommands ---

async fn load_store(youtube: &YouTube, url: &str) -> Result<TranscriptStore> {
  let video_id = video_id_from_url(url)?;
  let loaded = transcript::load_transcript(youtube, &video_id, &SegmentPolicy::default())
    .await
    .with_context(|| format!("Failed to load transcript for {}", video_id))?;
  let mut store = TranscriptStore::new();
  store.begin(&video_id);
  store.replace(&video_id, &loaded.info.title, loaded.lines);
  Ok(store)
}

async fn print_transcript(youtube: &YouTube, url: &str, output: Option<&std::path::Path>, json: bool) -> Result<()> {
  let store = load_store(youtube, url).await?;
  let text = match (json, store.current()) {
    (true, Some(t)) => serde_json::to_string_pretty(&serde_json::json!({
      "videoId": t.video_id,
      "title": t.title,
      "lines": t.lines,
    }))?,
    _ => store.as_plain_text(),
  };

  match output {
    Some(path) => {
      let path = match store.current() {
        Some(t) if path.is_dir() => path.join(download_file_name(&t.title, &t.video_id)),
        _ => path.to_path_buf(),
      };
      std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
      eprintln!("Saved {}", path.display());
    }
    None => println!("{}", text),
  }
  Ok(())
}

async fn print_matches(youtube: &YouTube, url: &str, query: &str) -> Result<()> {
  let store = load_store(youtube, url).await?;
  let state = search::set_query(store.lines(), query);
  let video_id = store.video_id().unwrap_or_default();
  for &i in &state.match_lines {
    let line = &store.lines()[i];
    println!("[{}] {}  {}", line.timestamp, line.text, timestamp_url(video_id, line.start_secs));
  }
  eprintln!("{}", if state.match_lines.is_empty() { "No matches found".to_string() } else { state.counter() });
  Ok(())
}

async fn ask(mut app: App, url: &str, question: &str) -> Result<()> {
  app.navigate(url)?;
  app.settle_transcript().await;
  if let transcript::TranscriptState::Failed { message, .. } = &app.transcript_state {
    eprintln!("warning: {} (answering without a transcript)", message);
  }
  let answer = app.ask_now(question).await?;
  println!("{}", answer);
  Ok(())
}

async fn serve(mut app: App) -> Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut stdout = tokio::io::stdout();
  info!("serve: reading commands from stdin");
  while let Some(line) = lines.next_line().await.context("Failed to read command")? {
    if line.trim().is_empty() {
      continue;
    }
    let response = commands::handle_line(&mut app, &line).await;
    let mut out = serde_json::to_string(&response).context("Failed to encode response")?;
    out.push('\n');
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await?;
  }
  Ok(())
}
