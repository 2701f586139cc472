use clap::Parser;
use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flashsync::cache::{cache_key, CacheStorage, NoopStorage, SqliteStorage};
use flashsync::cli::{self, Args, Command};
use flashsync::config::{Config, LogConfig};
use flashsync::store::FirestoreClient;
use flashsync::SyncCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config.log)?;

  if args.command.is_mutation() {
    Config::require_admin_token()?;
  }

  let client = FirestoreClient::new(&config)?;
  let key = cache_key(client.database());

  if args.no_cache || !config.cache.enabled {
    tracing::debug!("Local snapshot disabled");
    return dispatch(client, NoopStorage, key, args.command).await;
  }

  let storage = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  dispatch(client, storage, key, args.command).await
}

async fn dispatch<S: CacheStorage>(
  client: FirestoreClient,
  storage: S,
  key: String,
  command: Command,
) -> Result<()> {
  let sync = SyncCoordinator::new(client, storage, key);
  cli::run(&sync, command).await
}

/// Log to stderr, or to `log.file` through a non-blocking writer.
///
/// The returned guard must live until exit so buffered lines are flushed.
fn init_logging(log: &LogConfig) -> Result<Option<WorkerGuard>> {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

  match &log.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      std::fs::create_dir_all(dir)?;
      let file_name = path.file_name().unwrap_or_else(|| "flashsync.log".as_ref());

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
      Ok(None)
    }
  }
}
