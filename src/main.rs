use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kindercache::api::CachedClient;
use kindercache::cache::{FilterOp, QueryDescriptor, SortOrder, DEFAULT_PAGE_SIZE};
use kindercache::config::Config;

#[derive(Parser, Debug)]
#[command(name = "kindercache")]
#[command(about = "Cached command-line client for a childcare-management API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kindercache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List a page of records
  List {
    resource: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Field to sort by
    #[arg(long)]
    sort: Option<String>,
    /// Sort descending
    #[arg(long)]
    desc: bool,
    /// Filter as field:op:value, e.g. age:gte:3 (repeatable)
    #[arg(short, long = "filter")]
    filters: Vec<String>,
    /// Issue the same query this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,
  },
  /// Fetch records by id
  Get {
    resource: String,
    #[arg(required = true)]
    ids: Vec<String>,
  },
  /// Create a record from a JSON document
  Create { resource: String, json: String },
  /// Replace a record with a JSON document
  Update {
    resource: String,
    id: String,
    json: String,
  },
  /// Delete a record
  Delete { resource: String, id: String },
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default: warn). With `log_file` set, output
/// goes to that file instead of stderr; keep the returned guard alive.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
      Ok(None)
    }
  }
}

fn parse_filter(raw: &str) -> Result<(String, FilterOp, String)> {
  let mut parts = raw.splitn(3, ':');
  match (parts.next(), parts.next(), parts.next()) {
    (Some(field), Some(op), Some(value)) if !field.is_empty() => {
      let op = FilterOp::parse(op).ok_or_else(|| eyre!("Unknown filter operator: {}", op))?;
      Ok((field.to_string(), op, value.to_string()))
    }
    _ => Err(eyre!("Filter must look like field:op:value, got {:?}", raw)),
  }
}

fn parse_json(raw: &str) -> Result<serde_json::Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON body: {}", e))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(config.log_file.as_deref())?;

  let client = CachedClient::new(&config)?;
  let mut sweeper = client.sweeper();
  sweeper.start();

  let result = run(&client, args.command).await;

  sweeper.stop().await;
  let stats = client.stats();
  info!(
    hits = stats.hits,
    misses = stats.misses,
    absorbed = stats.absorbed,
    "Done"
  );

  result
}

async fn run(client: &CachedClient, command: Command) -> Result<()> {
  match command {
    Command::List {
      resource,
      page,
      page_size,
      sort,
      desc,
      filters,
      repeat,
    } => {
      let mut descriptor = QueryDescriptor::new(resource.as_str())
        .page(page)
        .page_size(page_size);
      if let Some(field) = sort {
        let order = if desc {
          SortOrder::Descending
        } else {
          SortOrder::Ascending
        };
        descriptor = descriptor.sort(field, order);
      }
      for raw in &filters {
        let (field, op, value) = parse_filter(raw)?;
        descriptor = descriptor.filter(field, op, value);
      }

      for _ in 0..repeat.max(1) {
        let page = client.list(&resource, &descriptor).await?;
        print_json(&page)?;
      }
    }
    Command::Get { resource, ids } => {
      let lookups = ids.iter().map(|id| client.get(&resource, id));
      let records = futures::future::join_all(lookups).await;
      for (id, record) in ids.iter().zip(records) {
        match record? {
          Some(record) => print_json(&record)?,
          None => eprintln!("{} {}: no data", resource, id),
        }
      }
    }
    Command::Create { resource, json } => {
      let created = client.create(&resource, &parse_json(&json)?).await?;
      print_json(&created)?;
    }
    Command::Update { resource, id, json } => {
      let updated = client.update(&resource, &id, &parse_json(&json)?).await?;
      print_json(&updated)?;
    }
    Command::Delete { resource, id } => {
      client.delete(&resource, &id).await?;
      eprintln!("Deleted {} {}", resource, id);
    }
  }

  Ok(())
}
