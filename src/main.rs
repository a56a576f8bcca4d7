mod app;
mod cache;
mod catalog;
mod commands;
mod config;
mod event;
mod loading;
mod logging;
mod query;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "toolshelf")]
#[command(about = "A terminal client for a catalog of AI tools, articles and prompts")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/toolshelf/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Inspect or reset the persisted query cache
  Cache {
    #[command(subcommand)]
    action: CacheCmd,
  },
}

#[derive(Subcommand, Debug)]
enum CacheCmd {
  /// Show size, entry count and version of the persisted cache
  Info,
  /// Delete the persisted cache
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Held until exit so buffered log lines get flushed
  let _guard = logging::init(&config.log)?;

  match args.command {
    Some(Cmd::Cache { action }) => run_cache_command(&config, action),
    None => {
      let mut app = app::App::new(config);
      app.run().await
    }
  }
}

fn run_cache_command(config: &config::Config, action: CacheCmd) -> Result<()> {
  let queries = query::QueryClient::new(config.cache.stale_time());
  let store = cache::PersistentCacheStore::new(
    cache::open_storage(&config.cache),
    cache::PersistOptions::from_config(&config.cache),
  );
  store.restore(&queries);

  let admin = cache::CacheAdministration::new(&store, &queries);
  match action {
    CacheCmd::Info => {
      for (label, value) in admin.cache_info().rows() {
        println!("{:<14} {}", label, value);
      }
    }
    CacheCmd::Clear => {
      admin.clear_cache();
      println!("Cache cleared");
    }
  }

  Ok(())
}
