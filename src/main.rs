use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use feeder::app::{write_feed_list, write_unread, App, FetchReport, Settings};
use feeder::config::{self, Config};
use feeder::feed::Fetcher;
use feeder::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "feeder", version, about = "Personal RSS/Atom feed aggregator")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/feeder/config.toml)
    #[arg(long, global = true, env = "FEEDER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the database
    #[arg(long, global = true, env = "FEEDER_DB_DIR", value_name = "DIR")]
    db_dir: Option<PathBuf>,

    /// Database file name inside the database directory
    #[arg(long, global = true, env = "FEEDER_DB_FILE", value_name = "NAME")]
    db_file: Option<String>,

    /// Items considered per fetch and kept per feed by trim
    #[arg(long, global = true, env = "FEEDER_MAX_ITEMS", value_name = "N")]
    max_items: Option<u32>,

    /// Log debug events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed, or to the feed a web page advertises
    Add { url: String },
    /// Unsubscribe from a feed and delete its items
    Delete { id: i64 },
    /// Fetch every feed and store new items
    Fetch,
    /// List subscribed feeds
    List,
    /// Mark every item as read
    Mark,
    /// Drop old items beyond the retention count and compact the database
    Trim,
    /// Write subscribed feed URLs, one per line
    Export {
        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Subscribe to every URL in a file, one per line
    Import { file: PathBuf },
    /// Show unread items grouped by feed
    Unread,
    /// Fetch, show unread items, then mark them read
    Daily,
    /// Show the effective configuration
    Config,
}

/// Warnings only, or debug events from feeder when verbose. `RUST_LOG` wins
/// over both.
fn log_filter(verbose: bool) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(if verbose { "warn,feeder=debug" } else { "warn" })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging starts before the config file is read so its warnings are
    // visible; the filter is widened afterwards if the file asks for it.
    let (filter, filter_handle) = reload::Layer::new(log_filter(cli.verbose));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_dir()?.join(config::CONFIG_FILE),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    apply_overrides(&mut config, &cli);
    if config.verbose && !cli.verbose {
        if let Err(e) = filter_handle.reload(log_filter(true)) {
            tracing::warn!(error = %e, "Failed to raise log level");
        }
    }

    let db_path = config.db_path()?;
    if let Command::Config = cli.command {
        print_config(&config, &config_path, &db_path);
        return Ok(());
    }

    let fetcher = Fetcher::new(Duration::from_secs(config.request_timeout_secs))
        .context("Failed to build HTTP client")?;
    let db = open_database(&db_path).await?;
    let app = App::new(
        db,
        fetcher,
        Settings {
            max_items: config.max_items,
        },
    );

    let result = run(&app, cli.command).await;
    app.close().await;
    result
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(dir) = &cli.db_dir {
        config.db_dir = Some(dir.clone());
    }
    if let Some(file) = &cli.db_file {
        config.db_file = file.clone();
    }
    if let Some(max) = cli.max_items {
        config.max_items = max;
    }
    config.verbose |= cli.verbose;
}

async fn open_database(db_path: &Path) -> Result<Database> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(path = %dir.display(), error = %e, "Failed to set data directory permissions to 0700");
                }
            }
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(e @ DatabaseError::Locked) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to open {}", db_path.display()))),
    }
}

async fn run(app: &App, command: Command) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    match command {
        Command::Add { url } => {
            let feed = app.add(&url).await?;
            writeln!(stdout, "Added {}: {} ({})", feed.id.unwrap_or_default(), feed.title, feed.url)?;
        }
        Command::Delete { id } => {
            app.delete(id).await?;
            writeln!(stdout, "Deleted feed {id}")?;
        }
        Command::Fetch => {
            let reports = app.fetch_all().await?;
            summarize(&reports);
        }
        Command::List => write_feed_list(&app.list().await?, &mut stdout)?,
        Command::Mark => {
            let marked = app.mark_all_read().await?;
            writeln!(stdout, "Marked {marked} items read")?;
        }
        Command::Trim => {
            let deleted = app.trim().await?;
            writeln!(stdout, "Deleted {deleted} old items")?;
        }
        Command::Export { output } => {
            let listing: String = app
                .export()
                .await?
                .into_iter()
                .map(|url| url + "\n")
                .collect();
            match output {
                Some(path) => std::fs::write(&path, listing)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => stdout.write_all(listing.as_bytes())?,
            }
        }
        Command::Import { file } => {
            let list = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let added = app.import(&list).await?;
            writeln!(stdout, "Imported {} feeds", added.len())?;
        }
        Command::Unread => write_unread(&app.unread().await?, &mut stdout)?,
        Command::Daily => {
            let reports = app.fetch_all().await?;
            summarize(&reports);
            write_unread(&app.unread().await?, &mut stdout)?;
            app.mark_all_read().await?;
        }
        Command::Config => {}
    }

    stdout.flush()?;
    Ok(())
}

/// Report failed feeds on stderr.
fn summarize(reports: &[FetchReport]) {
    let mut new_items = 0;
    let mut failed = 0;
    for report in reports {
        match &report.result {
            Ok(n) => new_items += n,
            Err(e) => {
                failed += 1;
                eprintln!("Error: feed {}: {}", report.feed_id, e);
            }
        }
    }
    eprintln!(
        "Fetched {} feeds: {} new items, {} failed",
        reports.len(),
        new_items,
        failed
    );
}

fn print_config(config: &Config, config_path: &Path, db_path: &Path) {
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    println!("config file: {source}");
    println!("database: {}", db_path.display());
    println!("max_items = {}", config.max_items);
    println!("request_timeout_secs = {}", config.request_timeout_secs);
    println!("verbose = {}", config.verbose);
}
