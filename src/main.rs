//! # Catalog Harvest CLI (`harvest`)
//!
//! The `harvest` binary drives every pipeline stage: database setup, the
//! crawl and its retry ladder, catalog-tree discovery, repository sync,
//! indexing, question answering and the HTTP trigger server.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest crawl` | Discover products and extract them through the retry ladder |
//! | `harvest retry` | Replay the failed queue through the retry tiers |
//! | `harvest discover` | Write the category → product → internal link tree |
//! | `harvest merge` | Flatten the catalog tree into the merged product list |
//! | `harvest enrich` | Fetch the content of every internal link |
//! | `harvest sync` | Save canonical records to the database |
//! | `harvest index` | Build the vector index over canonical records |
//! | `harvest ask "<question>"` | Answer a question from the index |
//! | `harvest failed list` | Show targets no tier has extracted yet |
//! | `harvest failed clear` | Empty the failed queue |
//! | `harvest serve` | Start the HTTP trigger server |
//!
//! ## Examples
//!
//! ```bash
//! # Full crawl, then retry whatever is left a day later
//! harvest crawl --config ./config/harvest.toml
//! harvest retry --config ./config/harvest.toml
//!
//! # Index with OpenAI embeddings and ask a question
//! OPENAI_API_KEY=... harvest index
//! OPENAI_API_KEY=... harvest ask "Which switches support PoE?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use catalog_harvest::config::{self, Config, OPENAI_API_KEY};
use catalog_harvest::driver::HttpDriver;
use catalog_harvest::pipeline::Harvester;
use catalog_harvest::repository::SqliteRepository;
use catalog_harvest::retry::PassReport;
use catalog_harvest::server::{self, AppState};
use catalog_harvest::{db, logging};

/// Catalog Harvest CLI: schema-driven catalog crawling with tiered retry
/// and similarity retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Catalog Harvest: resilient catalog crawling, extraction, and retrieval",
    version,
    long_about = "Catalog Harvest walks a product catalog, extracts structured records with \
    declarative selector schemas, retries incomplete pages through progressively looser \
    schemas, and answers questions over the harvested records."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Discover every product and extract it through the whole retry ladder.
    ///
    /// Writes the product list, the canonical records and the failed queue.
    Crawl,

    /// Replay the failed queue through the retry tiers only.
    Retry,

    /// Walk categories, products and internal links into the catalog tree.
    Discover,

    /// Flatten the catalog tree into the merged product list.
    Merge,

    /// Fetch the text content of every internal link of every merged product.
    Enrich,

    /// Save every canonical record to the SQLite database.
    Sync,

    /// Build the vector index over the canonical records.
    Index,

    /// Answer a question from the vector index.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Inspect or reset the failed queue.
    Failed {
        #[command(subcommand)]
        action: FailedAction,
    },

    /// Start the HTTP trigger server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

/// Failed queue subcommands.
#[derive(Subcommand)]
enum FailedAction {
    /// List failed targets with their last error and first-seen time.
    List,
    /// Remove every target from the failed queue.
    Clear,
}

impl Commands {
    /// Whether the command talks to a remote embedding or generation provider.
    fn uses_providers(&self) -> bool {
        matches!(self, Commands::Index | Commands::Ask { .. } | Commands::Serve)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if cli.command.uses_providers() && cfg.needs_openai() {
        config::credential(OPENAI_API_KEY)?;
    }

    match cli.command {
        Commands::Init => {
            db::open(&cfg.db).await?.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Crawl => {
            let summary = crawler(cfg).run_full_crawl_and_retry_ladder().await?;
            println!("categories: {}", summary.categories);
            println!("products: {}", summary.products);
            print_passes(&summary.ladder.passes);
            println!("extracted: {}", summary.ladder.extracted());
            println!("remaining: {}", summary.ladder.remaining);
            println!("ok");
        }
        Commands::Retry => {
            let passes = crawler(cfg).retry_failed().await?;
            print_passes(&passes);
            println!("ok");
        }
        Commands::Discover => {
            let tree = crawler(cfg).run_category_product_discovery().await?;
            let products: usize = tree.iter().map(|c| c.products.len()).sum();
            println!("categories: {}", tree.len());
            println!("products: {}", products);
            println!("ok");
        }
        Commands::Merge => {
            let merged = crawler(cfg).merge_category_products_to_flat_list()?;
            println!("products: {}", merged);
            println!("ok");
        }
        Commands::Enrich => {
            let summary = crawler(cfg).enrich_internal_links_with_content().await?;
            println!("products: {}", summary.products);
            println!("documents: {}", summary.documents);
            println!("skipped: {}", summary.skipped);
            println!("ok");
        }
        Commands::Sync => {
            let pool = db::open(&cfg.db).await?;
            let repository = SqliteRepository::new(pool.clone());
            let harvester = crawler(cfg);
            let records = harvester.canonical_store()?.len();
            let all_saved = harvester
                .sync_json_store_to_repository(&repository)
                .await?;
            pool.close().await;
            println!("records: {}", records);
            if !all_saved {
                anyhow::bail!("some records failed to save; see log for details");
            }
            println!("ok");
        }
        Commands::Index => {
            let index = crawler(cfg).build_vector_index().await?;
            println!("entries: {}", index.len());
            println!("model: {}", index.model);
            println!("dims: {}", index.dims);
            println!("ok");
        }
        Commands::Ask { question } => {
            let answer = Harvester::from_config(cfg)?.answer(&question).await?;
            match &answer.answer {
                Some(text) => println!("{}\n", text),
                None => println!("(generation disabled)\n"),
            }
            for (i, hit) in answer.sources.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.url);
            }
        }
        Commands::Failed { action } => match action {
            FailedAction::List => {
                let failed = crawler(cfg).failed_list()?;
                if failed.is_empty() {
                    println!("No failed targets.");
                }
                for target in &failed {
                    println!(
                        "{}  {}  (since {})",
                        target.url,
                        target.error_reason,
                        target.first_seen_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            FailedAction::Clear => {
                let cleared = crawler(cfg).failed_clear()?;
                println!("cleared: {}", cleared);
                println!("ok");
            }
        },
        Commands::Serve => {
            let pool = db::open(&cfg.db).await?;
            let bind = cfg.server.bind.clone();
            let harvester = Arc::new(Harvester::from_config(cfg)?);
            let repository = Arc::new(SqliteRepository::new(pool));
            server::run_server(&bind, AppState::new(harvester, repository)).await?;
        }
    }

    Ok(())
}

/// A harvester without a generation provider, for stages that never answer.
fn crawler(cfg: Config) -> Harvester {
    let driver = Arc::new(HttpDriver::new(&cfg.navigation.user_agent));
    Harvester::new(cfg, driver)
}

fn print_passes(passes: &[PassReport]) {
    for pass in passes {
        println!(
            "tier {} ({}): attempted {}, succeeded {}, failed {}",
            pass.tier, pass.tier_name, pass.attempted, pass.succeeded, pass.failed
        );
    }
}
