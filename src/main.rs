use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use saffron_engine::Engine;
use saffron_store::{MemoryStore, RunStore, SqliteStore};

/// Saffron - a news scraping service on a minimal workflow engine
#[derive(Parser)]
#[command(name = "saffron")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.saffron)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Keep run state in memory instead of SQLite
  #[arg(long, global = true)]
  in_memory: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Start the HTTP server
  Serve {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: SocketAddr,
  },

  /// Trigger one workflow run and print its result
  Run {
    /// The triggering event name (e.g. scraper:start)
    event: String,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();

  let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
    dirs::home_dir()
      .expect("could not determine home directory")
      .join(".saffron")
  });

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Commands::Serve { bind } => rt.block_on(serve(bind, data_dir, cli.in_memory)),
    Commands::Run { event } => rt.block_on(run_once(event, data_dir, cli.in_memory)),
  }
}

async fn serve(bind: SocketAddr, data_dir: PathBuf, in_memory: bool) -> Result<()> {
  let store = open_store(&data_dir, in_memory).await?;
  let engine = Engine::new(store);
  saffron_scrapers::register_all(&engine).context("failed to register scraping workflows")?;

  let app = saffron_server::build_app(engine.clone());
  let listener = tokio::net::TcpListener::bind(bind)
    .await
    .with_context(|| format!("failed to bind {bind}"))?;
  info!(%bind, "saffron listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("shutdown signal received");
    })
    .await
    .context("server error")?;

  engine.shutdown();
  Ok(())
}

async fn run_once(event: String, data_dir: PathBuf, in_memory: bool) -> Result<()> {
  let store = open_store(&data_dir, in_memory).await?;
  let engine = Engine::new(store);
  saffron_scrapers::register_all(&engine).context("failed to register scraping workflows")?;

  let payload = read_payload_from_stdin()?;
  let handle = engine
    .spawn_run(&event, payload)
    .await
    .with_context(|| format!("failed to trigger '{event}'"))?;
  eprintln!("Triggered run: {}", handle.run_id());

  let mut events = engine.subscribe(handle.run_id()).await?;
  let printer = tokio::spawn(async move {
    while let Some(event) = events.next().await {
      match serde_json::to_string(&event) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!("{event:?}"),
      }
    }
  });

  let result = handle.result().await;
  let _ = printer.await;

  match result {
    Ok(result) => {
      println!("{}", serde_json::to_string_pretty(&result)?);
      Ok(())
    }
    Err(error) => anyhow::bail!("run failed: {}", error.message()),
  }
}

async fn open_store(data_dir: &Path, in_memory: bool) -> Result<Arc<dyn RunStore>> {
  use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

  if in_memory {
    return Ok(Arc::new(MemoryStore::new()));
  }

  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
  let db_path = data_dir.join("saffron.db");

  let options = SqliteConnectOptions::new()
    .filename(&db_path)
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .with_context(|| format!("failed to open database {}", db_path.display()))?;

  let store = SqliteStore::new(pool);
  store.migrate().await.context("failed to run migrations")?;
  Ok(Arc::new(store))
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
