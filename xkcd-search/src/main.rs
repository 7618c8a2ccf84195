use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xkcd_search::{
    Error,
    config::ServiceConfig,
    health::PingReport,
    events::{
        EventBus,
        local_bus::LocalBus,
        maintainer::{CorpusMaintainer, spawn_periodic_update},
    },
    retrieval::{
        index_updater::{spawn_event_listeners, spawn_periodic_rebuild},
        normalizer::{Normalizer, WordsNormalizer},
        search_engine::{IndexInfo, SearchEngine},
        update_engine::{UpdateEngine, UpdateEngineConfig, UpdateStatus},
    },
    source::xkcd_client::XkcdClient,
    storage::{Comic, CorpusStore, memory_store::MemoryStore, sqlite_store::SqliteStore},
};

/// Keep a local xkcd corpus fresh and search it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the configuration (`:memory:` for a throwaway corpus)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch comics missing from the corpus and announce the change
    ///
    /// Without `events.redis_url` the announcement stays inside this process.
    Update {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Erase the corpus and announce the change
    ///
    /// Without `events.redis_url` the announcement stays inside this process.
    Drop,
    /// Show corpus statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show whether an update is running in this process
    Status,
    /// Search comics by keywords
    Search {
        /// Free-text phrase
        phrase: String,
        /// Maximum number of results, 0 for all
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
        /// Build the inverted index and query it instead of scanning the corpus
        #[arg(long)]
        index: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Host the search index: rebuild on events and on a timer, answer one phrase per stdin line
    ///
    /// Changes made by other `update`/`drop` processes arrive only over the Redis bus
    /// (`events.redis_url`, `redis` feature). Without it the index follows them on the
    /// periodic rebuild (`search.index_ttl_secs`) or sees only `--update-every` passes.
    Serve {
        /// Also run an update pass every SECS seconds
        #[arg(long, value_name = "SECS")]
        update_every: Option<u64>,
        /// Maximum number of results per query, 0 for all
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
    /// Report whether the store, the upstream feed and the event bus are reachable
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    phrase: &'a str,
    indexed: bool,
    comics: &'a [Comic],
}

#[derive(Serialize)]
struct StatusOutput {
    update: UpdateStatus,
    index: IndexInfo,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        let code = match e.downcast_ref::<Error>() {
            Some(Error::NotFound) => 2,
            Some(Error::InvalidInput { .. }) => 64,
            _ => 1,
        };
        process::exit(code);
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything a command may need, wired from the configuration.
struct Services {
    config: ServiceConfig,
    store: Arc<dyn CorpusStore>,
    normalizer: Arc<dyn Normalizer>,
}

impl Services {
    async fn open(config: ServiceConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn CorpusStore> = if config.is_in_memory() {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SqliteStore::open(&config.db_path).await?)
        };
        Ok(Self {
            config,
            store,
            normalizer: Arc::new(WordsNormalizer),
        })
    }

    fn update_engine(&self) -> anyhow::Result<Arc<UpdateEngine>> {
        let feed = XkcdClient::new(&self.config.xkcd.url, self.config.timeout())?;
        Ok(Arc::new(UpdateEngine::new(
            self.store.clone(),
            Arc::new(feed),
            self.normalizer.clone(),
            UpdateEngineConfig::new(self.config.xkcd.concurrency),
        )))
    }

    fn search_engine(&self) -> Arc<SearchEngine> {
        Arc::new(SearchEngine::new(
            self.store.clone(),
            self.normalizer.clone(),
        ))
    }

    async fn bus(&self) -> anyhow::Result<Arc<dyn EventBus>> {
        match &self.config.events.redis_url {
            None => Ok(Arc::new(LocalBus::default())),
            #[cfg(feature = "redis")]
            Some(url) => Ok(Arc::new(
                xkcd_search::events::redis_bus::RedisBus::connect(url).await?,
            )),
            #[cfg(not(feature = "redis"))]
            Some(_) => anyhow::bail!("events.redis_url is set but this build has no `redis` feature"),
        }
    }

    async fn maintainer(&self) -> anyhow::Result<Arc<CorpusMaintainer>> {
        Ok(Arc::new(CorpusMaintainer::new(
            self.update_engine()?,
            self.bus().await?,
        )))
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(db) = args.db {
        config.db_path = db;
    }
    init_tracing(&config.log_level);

    let services = Services::open(config).await?;

    match args.command {
        Commands::Update { format } => {
            let maintainer = services.maintainer().await?;
            maintainer.warn_if_process_local();
            let summary = maintainer.update().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Summary => println!(
                    "Fetched {} new comics (latest upstream #{}, {} missing upstream)",
                    summary.persisted, summary.latest_id, summary.skipped
                ),
            }
        }
        Commands::Drop => {
            let maintainer = services.maintainer().await?;
            maintainer.warn_if_process_local();
            maintainer.drop_corpus().await?;
            println!("Corpus dropped");
        }
        Commands::Stats { format } => {
            let stats = services.update_engine()?.stats().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Comics fetched: {}", stats.store.comics_fetched);
                    println!("Comics upstream: {}", stats.comics_total);
                    println!("Words total: {}", stats.store.words_total);
                    println!("Words unique: {}", stats.store.words_unique);
                }
            }
        }
        Commands::Status => {
            println!(
                "{}",
                serde_json::to_string(&services.update_engine()?.status())?
            );
        }
        Commands::Search {
            phrase,
            limit,
            index,
            format,
        } => {
            let phrase = validate_phrase(&phrase)?;
            let engine = services.search_engine();
            let comics = if index {
                engine.build_index().await?;
                engine.search_index(phrase, limit).await?
            } else {
                engine.search(phrase, limit).await?
            };
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&SearchOutput {
                        phrase,
                        indexed: index,
                        comics: &comics,
                    })?
                ),
                OutputFormat::Summary => print_comics(&comics),
            }
        }
        Commands::Serve {
            update_every,
            limit,
        } => serve(&services, update_every, limit).await?,
        Commands::Ping => {
            let feed = XkcdClient::new(&services.config.xkcd.url, services.config.timeout())?;
            let mut report = PingReport::check(services.store.as_ref(), &feed).await;
            match services.bus().await {
                Ok(bus) => report.check_bus(bus.as_ref()).await,
                Err(e) => report.record("bus", Err(e)),
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_ok() {
                anyhow::bail!("some dependencies are unavailable");
            }
        }
    }

    Ok(())
}

fn validate_phrase(phrase: &str) -> Result<&str, Error> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return Err(Error::invalid_input("phrase must not be empty"));
    }
    Ok(phrase)
}

fn print_comics(comics: &[Comic]) {
    println!("Found {} comics:", comics.len());
    for comic in comics {
        println!(
            "  #{:<5} score {:<3} {}  {}",
            comic.id, comic.score, comic.title, comic.url
        );
    }
}

async fn serve(services: &Services, update_every: Option<u64>, limit: i64) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let engine = services.search_engine();
    let bus = services.bus().await?;

    let mut tasks = spawn_event_listeners(engine.clone(), bus.as_ref(), shutdown.clone()).await?;
    tasks.push(spawn_periodic_rebuild(
        engine.clone(),
        services.config.index_ttl(),
        shutdown.clone(),
    ));

    let updater = match update_every {
        Some(secs) => {
            let maintainer = Arc::new(CorpusMaintainer::new(
                services.update_engine()?,
                bus.clone(),
            ));
            tasks.push(spawn_periodic_update(
                maintainer.clone(),
                Duration::from_secs(secs),
                shutdown.clone(),
            ));
            Some(maintainer)
        }
        None => None,
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    info!("serving queries from stdin, one phrase per line");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            ":status" => {
                let status = StatusOutput {
                    update: updater
                        .as_ref()
                        .map_or(UpdateStatus::Idle, |m| m.status()),
                    index: engine.index_info().await,
                };
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            phrase => match engine.search_index(phrase, limit).await {
                Ok(comics) => print_comics(&comics),
                Err(Error::NotFound) => println!("No comics found"),
                Err(e) => warn!(error = %e, "query failed"),
            },
        }
    }

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}
