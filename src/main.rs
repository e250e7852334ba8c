//! # QueryBox CLI (`qbx`)
//!
//! The `qbx` binary asks questions from the terminal, browses the library of
//! past answers, and starts the web server.
//!
//! ## Usage
//!
//! ```bash
//! qbx --config ./config/qbx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qbx init` | Create the SQLite database and run schema migrations |
//! | `qbx ask "<question>"` | Ask one question and print the answer |
//! | `qbx chat` | Interactive session (`/new` starts a new thread, `/quit` exits) |
//! | `qbx history` | List saved exchanges, newest first |
//! | `qbx serve` | Start the web server |
//!
//! ## Examples
//!
//! ```bash
//! qbx init --config ./config/qbx.toml
//! qbx ask "what is the meaning of life?" --user me@example.com
//! qbx history --filter banana --json
//! qbx serve
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use querybox::completion::create_completion_service;
use querybox::config::{self, Config};
use querybox::flow::{PersistHandle, QueryFlow, SubmitOutcome};
use querybox::identity::{create_identity_provider, require_cli_identity};
use querybox::library::{HistoryBrowser, LibraryPage};
use querybox::progress::{ProgressMode, TurnEvent, TurnReporter};
use querybox::session::{SubmitRejection, FETCH_FAILED};
use querybox::store::open_store;
use querybox::{logging, migrate, server};

const DEFAULT_CONFIG: &str = "./config/qbx.toml";

/// QueryBox: ask a question, get an answer, keep a searchable library.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qbx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qbx",
    about = "QueryBox: ask questions, get answers, browse your library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Act as this email address instead of the configured identity.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Turn progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `queries` table.
    /// Running it more than once is safe.
    Init,

    /// Ask a single question and print the answer on stdout.
    Ask {
        /// The question to send.
        question: String,
    },

    /// Interactive session reading questions from stdin.
    Chat,

    /// List saved exchanges, newest first.
    History {
        /// Only show exchanges whose question or answer contains this text.
        #[arg(long)]
        filter: Option<String>,

        /// Print the page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the web server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = load_or_default(&cli.config)?;
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Init => {
            if cfg.store.backend != "sqlite" {
                println!(
                    "Store backend is '{}'; no local schema to create.",
                    cfg.store.backend
                );
            } else {
                migrate::run_migrations(&cfg).await?;
                println!("Database initialized successfully.");
            }
        }
        Commands::Ask { question } => {
            let mut flow = open_flow(&cfg, cli.user.as_deref()).await?;
            run_ask(&mut flow, &question, reporter.as_ref()).await?;
        }
        Commands::Chat => {
            let mut flow = open_flow(&cfg, cli.user.as_deref()).await?;
            run_chat(&mut flow, reporter.as_ref()).await?;
        }
        Commands::History { filter, json } => {
            run_history(&cfg, cli.user.as_deref(), filter.as_deref().unwrap_or(""), json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, cli.user.as_deref()).await?;
        }
    }

    Ok(())
}

/// An explicit `--config` must exist; a missing default file means built-in defaults.
fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

async fn open_flow(cfg: &Config, user: Option<&str>) -> anyhow::Result<QueryFlow> {
    let identity = create_identity_provider(&cfg.identity, user)?;
    let owner = require_cli_identity(identity.as_ref()).await?;
    let completion = create_completion_service(&cfg.completion)?;
    let store = open_store(cfg).await?;
    Ok(QueryFlow::new(completion, store, owner))
}

/// Submit one question. Returns the persistence task when an answer arrived.
async fn ask_once(
    flow: &mut QueryFlow,
    question: &str,
    reporter: &dyn TurnReporter,
) -> Result<Option<PersistHandle>, SubmitRejection> {
    reporter.report(TurnEvent::Thinking {
        model: flow.model_name().to_string(),
    });
    match flow.submit(question).await {
        SubmitOutcome::Rejected(rejection) => Err(rejection),
        SubmitOutcome::Answered { answer, persist } => {
            reporter.report(TurnEvent::Answered {
                chars: answer.chars().count(),
            });
            println!("{}", answer);
            Ok(Some(persist))
        }
        SubmitOutcome::Failed => {
            reporter.report(TurnEvent::Failed);
            println!("{}", FETCH_FAILED);
            Ok(None)
        }
    }
}

async fn finish_persist(handle: PersistHandle, reporter: &dyn TurnReporter) {
    if let Err(e) = handle.wait().await {
        reporter.report(TurnEvent::NotSaved {
            reason: format!("{:#}", e),
        });
    }
}

async fn run_ask(flow: &mut QueryFlow, question: &str, reporter: &dyn TurnReporter) -> anyhow::Result<()> {
    match ask_once(flow, question, reporter).await {
        Ok(Some(persist)) => {
            finish_persist(persist, reporter).await;
            Ok(())
        }
        Ok(None) => bail!("no answer received"),
        Err(rejection) => bail!(rejection),
    }
}

async fn run_chat(flow: &mut QueryFlow, reporter: &dyn TurnReporter) -> anyhow::Result<()> {
    eprintln!("Signed in as {}. Type /new for a new thread, /quit to exit.", flow.owner().email);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        match line.trim() {
            "/quit" | "/exit" => break,
            "/new" => {
                flow.reset();
                eprintln!("Started a new thread.");
            }
            question => match ask_once(flow, question, reporter).await {
                Ok(Some(persist)) => finish_persist(persist, reporter).await,
                Ok(None) | Err(SubmitRejection::EmptyDraft) => {}
                Err(rejection) => eprintln!("{}", rejection),
            },
        }
    }
    Ok(())
}

async fn run_history(cfg: &Config, user: Option<&str>, term: &str, json: bool) -> anyhow::Result<()> {
    let identity = create_identity_provider(&cfg.identity, user)?;
    let owner = require_cli_identity(identity.as_ref()).await?;
    let store = open_store(cfg).await?;

    let mut browser = HistoryBrowser::new();
    browser.load(store.as_ref(), &owner.email).await;
    let page = LibraryPage::build(
        &browser,
        term,
        cfg.library.truncate_chars,
        cfg.library.utc_offset_minutes,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.degraded {
        bail!("could not load your library from the '{}' store", store.backend());
    }
    if page.total == 0 {
        println!("No conversations yet.");
        return Ok(());
    }
    if page.shown == 0 {
        println!("No results found for \"{}\".", term);
    }
    for row in &page.exchanges {
        println!("{}  {}", row.asked_at, row.question);
        println!("    {}", row.response.replace('\n', "\n    "));
        println!();
    }
    println!("{}", page.summary());
    Ok(())
}
