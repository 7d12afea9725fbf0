use bzharvest::bugzilla::{self, BugzillaClient, BugzillaRest, HttpTransport};
use bzharvest::cache::{CacheLog, SqliteCacheLog};
use bzharvest::config::Config;
use bzharvest::dates;
use bzharvest::harvest::{harvest, Mode};
use chrono::{DateTime, Utc};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(name = "bzharvest")]
#[command(about = "Harvest bugs from a Bugzilla REST server, with an offline replay cache")]
#[command(version)]
struct Args {
  /// URL of the Bugzilla server (default: bugzilla.url from the config file)
  url: Option<String>,

  /// Path to config file (default: ./bzharvest.yaml or $XDG_CONFIG_HOME/bzharvest/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Bugzilla login; the password is read from BZHARVEST_PASSWORD
  #[arg(short = 'u', long)]
  backend_user: Option<String>,

  /// Bugzilla API token (default: BZHARVEST_API_TOKEN)
  #[arg(short = 't', long)]
  backend_token: Option<String>,

  /// Maximum number of bugs requested on the same query
  #[arg(long, allow_negative_numbers = true)]
  max_bugs: Option<i64>,

  /// Fetch bugs changed since this date (RFC 3339, "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD")
  #[arg(long, value_parser = parse_from_date)]
  from_date: Option<DateTime<Utc>>,

  /// Origin reported in items (default: the URL)
  #[arg(long)]
  origin: Option<String>,

  /// Replay bugs from the cache instead of the server
  #[arg(long, conflicts_with = "no_cache")]
  fetch_cache: bool,

  /// Run without a cache
  #[arg(long)]
  no_cache: bool,

  /// Wipe the cache before fetching
  #[arg(long, conflicts_with = "fetch_cache")]
  clean_cache: bool,

  /// Base directory for cache files
  #[arg(long)]
  cache_path: Option<PathBuf>,

  /// Write items to this file instead of stdout
  #[arg(short, long)]
  output: Option<PathBuf>,
}

fn parse_from_date(s: &str) -> std::result::Result<DateTime<Utc>, String> {
  dates::parse_datetime(s).map_err(|e| format!("invalid date {s:?}: {e}"))
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(config.log_file.as_deref())?;

  let mut backend = build_backend(&args, &config)?;

  let mut out: Box<dyn Write> = match &args.output {
    Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
      eyre!("Failed to create output file {}: {}", path.display(), e)
    })?)),
    None => Box::new(BufWriter::new(io::stdout().lock())),
  };

  let mode = if args.fetch_cache {
    Mode::Replay
  } else {
    Mode::Fetch(args.from_date)
  };

  let count = harvest(&mut backend, mode, &mut out)?;
  info!(items = count, "Done");
  Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("BZHARVEST_LOG")
    .unwrap_or_else(|_| EnvFilter::new("bzharvest=info,warn"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      // stdout carries the items
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
      Ok(None)
    }
  }
}

/// Build the backend from flags, falling back to the config file.
fn build_backend(
  args: &Args,
  config: &Config,
) -> Result<BugzillaRest<HttpTransport, SqliteCacheLog>> {
  let url = args
    .url
    .clone()
    .or_else(|| config.bugzilla.url.clone())
    .ok_or_else(|| {
      eyre!("No Bugzilla URL given. Pass it as an argument or set bugzilla.url in the config file.")
    })?;

  let timeout = Duration::from_secs(
    config
      .bugzilla
      .timeout_secs
      .unwrap_or(DEFAULT_TIMEOUT_SECS),
  );
  let user = args
    .backend_user
    .as_deref()
    .or(config.bugzilla.user.as_deref());
  let token = args.backend_token.clone().or_else(Config::get_api_token);
  let password = Config::get_password();
  let client = BugzillaClient::new(&url, HttpTransport::new(timeout)?)?.authenticate(
    token,
    user,
    password.as_deref(),
  )?;

  let cache = if args.no_cache {
    None
  } else {
    let base = args
      .cache_path
      .clone()
      .or_else(|| config.cache.path.clone())
      .or_else(SqliteCacheLog::default_dir)
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    let mut cache = SqliteCacheLog::open(&SqliteCacheLog::path_for(&base, &url))?;
    if args.clean_cache {
      cache.clean()?;
    } else {
      cache.backup()?;
    }
    Some(cache)
  };

  let origin = args.origin.as_deref().or(config.bugzilla.origin.as_deref());
  let max_bugs = args
    .max_bugs
    .or(config.bugzilla.max_bugs)
    .unwrap_or(bugzilla::MAX_BUGS);

  Ok(
    BugzillaRest::new(&url, client, cache)
      .with_max_bugs(max_bugs)
      .with_origin(origin),
  )
}
