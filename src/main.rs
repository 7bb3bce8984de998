use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use pagestash::cache::{CacheManager, CacheSource, KeyValueStore, NoopStore, SqliteStore};
use pagestash::config::Config;
use pagestash::fetch::CancelToken;
use pagestash::loader::{FetchPlan, LoadOptions, Loader, SourceKey};
use pagestash::project::ProjectedRecord;
use pagestash::source::RestSource;

#[derive(Parser, Debug)]
#[command(name = "pagestash")]
#[command(about = "Fetch paged REST data through a local TTL cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pagestash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache namespace to use instead of the configured one
  #[arg(short, long)]
  namespace: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load a source, from cache when fresh
  Fetch {
    source: String,
    /// Ignore the cached copy and fetch again
    #[arg(long)]
    refresh: bool,
    /// Print records as JSON
    #[arg(long)]
    json: bool,
    /// Keep pages fetched before a failure instead of failing the whole load
    #[arg(long)]
    partial: bool,
  },
  /// List configured sources
  Sources,
  /// Inspect or clean the cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Show what is cached for a source
  Show { source: String },
  /// Drop cached data for one source, or the whole namespace
  Clear { source: Option<String> },
  /// Delete entries older than the given age
  Purge {
    #[arg(long, value_name = "SECS", default_value_t = 86_400)]
    older_than: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(namespace) = args.namespace {
    config.cache.namespace = namespace;
  }

  let _log_guard = pagestash::logging::init(&config.log)?;

  if !config.cache.enabled {
    return run(&config, NoopStore, args.command).await;
  }

  let store = match &config.cache.path {
    Some(path) => SqliteStore::open_at(path, &config.cache.namespace)?,
    None => SqliteStore::open(&config.cache.namespace)?,
  };
  run(&config, store, args.command).await
}

async fn run<S: KeyValueStore>(config: &Config, store: S, command: Command) -> Result<()> {
  let loader = Loader::new(CacheManager::new(store));

  match command {
    Command::Fetch {
      source,
      refresh,
      json,
      partial,
    } => fetch(config, &loader, &source, refresh, json, partial).await,
    Command::Sources => {
      for (name, source) in &config.sources {
        println!("{:<20} ttl={}s  {}", name, source.ttl_secs, source.url);
      }
      Ok(())
    }
    Command::Cache(CacheCommand::Show { source }) => {
      let source_config = config.source(&source)?;
      let key = SourceKey::for_source(&source, source_config);
      match loader.peek(&key) {
        Some(entry) => {
          let age = Utc::now() - entry.written_at;
          let fresh = loader.cache().is_fresh(&entry, source_config.ttl());
          println!(
            "{}: {} records, cached {} ago{}{}",
            source,
            entry.value.records.len(),
            format_age(age),
            if fresh { "" } else { " (stale)" },
            if entry.value.truncated { " (truncated)" } else { "" },
          );
        }
        None => println!("{}: nothing cached", source),
      }
      Ok(())
    }
    Command::Cache(CacheCommand::Clear { source: Some(source) }) => {
      let source_config = config.source(&source)?;
      loader.invalidate(&SourceKey::for_source(&source, source_config))?;
      println!("Cleared {}", source);
      Ok(())
    }
    Command::Cache(CacheCommand::Clear { source: None }) => {
      loader.cache().store().clear()?;
      println!("Cleared namespace {}", config.cache.namespace);
      Ok(())
    }
    Command::Cache(CacheCommand::Purge { older_than }) => {
      let ttl = purge_age(older_than);
      let purged = loader.cache().purge_expired(ttl)?;
      println!("Purged {} entries", purged);
      Ok(())
    }
  }
}

async fn fetch<S: KeyValueStore>(
  config: &Config,
  loader: &Loader<S>,
  name: &str,
  refresh: bool,
  json: bool,
  partial: bool,
) -> Result<()> {
  let source_config = config.source(name)?;
  let source = RestSource::from_config(source_config)?;
  let projector = source_config.projection.projector();

  let mut plan = FetchPlan::new(source_config.pagination.first_request());
  plan.limits = source_config.pagination.limits();
  plan.dedup = source_config.dedup;
  plan.policy = source_config.failure_policy(partial);

  // Ctrl-C stops after the page in flight
  let cancel = CancelToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      trigger.cancel();
    }
  });

  let key = SourceKey::for_source(name, source_config);
  let options = LoadOptions {
    refresh,
    cancel: Some(cancel),
  };
  let result = loader
    .load(
      &key,
      source_config.ttl(),
      &plan,
      &projector,
      |request| source.fetch_page(request),
      options,
    )
    .await
    .map_err(|e| eyre!("couldn't load {}: {}", name, e))?;

  if result.source == CacheSource::Offline {
    let age = result
      .cached_at
      .map(|at| format_age(Utc::now() - at))
      .unwrap_or_else(|| "unknown".to_string());
    eprintln!(
      "warning: showing cached data from {} ago ({})",
      age,
      result.error.as_deref().unwrap_or("fetch failed")
    );
  }
  if result.data.partial {
    eprintln!(
      "warning: incomplete result{}",
      result
        .error
        .as_deref()
        .map(|e| format!(" ({})", e))
        .unwrap_or_default()
    );
  }
  if result.data.truncated {
    eprintln!("warning: result truncated at the configured page or item limit");
  }

  if json {
    let out = serde_json::to_string_pretty(&result.data.records)
      .map_err(|e| eyre!("Failed to serialize records: {}", e))?;
    println!("{}", out);
  } else {
    print_records(&result.data.records);
  }

  Ok(())
}

fn print_records(records: &[ProjectedRecord]) {
  let width = records
    .iter()
    .map(|r| r.title.chars().count())
    .max()
    .unwrap_or(0)
    .min(60);

  for record in records {
    let mut line = format!("{:<width$}  {}", record.title, record.id, width = width);
    if let Some(subtitle) = &record.subtitle {
      line.push_str("  ");
      line.push_str(subtitle);
    }
    for (key, value) in &record.metadata {
      line.push_str(&format!("  {}={}", key, value));
    }
    println!("{}", line);
  }
}

/// Largest age chrono can represent in whole seconds.
const MAX_PURGE_AGE_SECS: u64 = (i64::MAX / 1_000) as u64;

fn purge_age(older_than: u64) -> Duration {
  Duration::seconds(older_than.min(MAX_PURGE_AGE_SECS) as i64)
}

fn format_age(age: Duration) -> String {
  let secs = age.num_seconds().max(0);
  match secs {
    s if s < 60 => format!("{}s", s),
    s if s < 3_600 => format!("{}m", s / 60),
    s if s < 86_400 => format!("{}h", s / 3_600),
    s => format!("{}d", s / 86_400),
  }
}
