use anyhow::{Context, anyhow, bail};
use backup::{BackupError, BackupService};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use configuration::{DatabaseSettings, Settings};
use core_types::{
    DeckSide, MatchUpdate, NewMatchResult, Outcome, PlayOrder, ResultFilter, SortDirection, SortKey,
};
use database::{Database, DbRepository, connect, run_migrations};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

mod render;

/// The main entry point for the matchtally application.
#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file, if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Records card game match results and reports win rates.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Manage login accounts.
    #[command(subcommand)]
    User(UserCommand),
    /// Manage a user's own and opponent deck lists.
    Deck(DeckArgs),
    /// Record, list, edit and delete match results.
    Result(ResultArgs),
    /// Win-rate report over a selection of results.
    Report(ReportArgs),
    /// Whole-database snapshot archives (embedded store only).
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Per-user CSV data archives.
    #[command(subcommand)]
    Data(DataCommand),
    /// Run the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create an account.
    Add {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Change an account's password.
    Passwd {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// List accounts.
    List,
}

#[derive(Args)]
struct DeckArgs {
    /// Account the decks belong to.
    #[arg(long)]
    user: String,
    #[command(subcommand)]
    command: DeckCommand,
}

#[derive(Subcommand)]
enum DeckCommand {
    Add {
        /// `own` or `opponent`.
        side: DeckSide,
        name: String,
    },
    List {
        side: DeckSide,
        /// Only enabled decks.
        #[arg(long)]
        active: bool,
    },
    Rename {
        side: DeckSide,
        id: i64,
        name: String,
    },
    Enable {
        side: DeckSide,
        id: i64,
    },
    Disable {
        side: DeckSide,
        id: i64,
    },
    /// Delete a deck no result refers to.
    Remove {
        side: DeckSide,
        id: i64,
    },
}

#[derive(Args)]
struct ResultArgs {
    #[arg(long)]
    user: String,
    #[command(subcommand)]
    command: ResultCommand,
}

#[derive(Subcommand)]
enum ResultCommand {
    Add {
        /// Defaults to today (format: YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Own deck id.
        #[arg(long)]
        deck: i64,
        /// Opponent deck id.
        #[arg(long)]
        opponent: Option<i64>,
        #[arg(long, default_value = "unknown")]
        order: PlayOrder,
        #[arg(long)]
        outcome: Outcome,
        #[arg(long, default_value = "")]
        note: String,
    },
    List(FilterArgs),
    Show {
        id: i64,
    },
    Edit {
        id: i64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        deck: Option<i64>,
        #[arg(long, conflicts_with = "clear_opponent")]
        opponent: Option<i64>,
        /// Remove the opponent deck.
        #[arg(long)]
        clear_opponent: bool,
        #[arg(long)]
        order: Option<PlayOrder>,
        #[arg(long)]
        outcome: Option<Outcome>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete one or more results by id.
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// First date included (format: YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last date included (format: YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    deck: Option<i64>,
    #[arg(long)]
    opponent: Option<i64>,
    #[arg(long)]
    order: Option<PlayOrder>,
    #[arg(long)]
    outcome: Option<Outcome>,
    /// Matched against the note and both deck names.
    #[arg(long)]
    keyword: Option<String>,
    #[arg(long, default_value = "date")]
    sort: SortKey,
    #[arg(long, default_value = "desc")]
    direction: SortDirection,
    /// At most this many rows; `0` lists everything.
    #[arg(long, default_value_t = core_types::DEFAULT_RESULT_LIMIT)]
    limit: u32,
}

impl FilterArgs {
    fn into_filter(self) -> ResultFilter {
        ResultFilter {
            date_from: self.from,
            date_to: self.to,
            deck_id: self.deck,
            opponent_deck_id: self.opponent,
            play_order: self.order,
            outcome: self.outcome,
            keyword: self.keyword,
            sort: self.sort,
            direction: self.direction,
            limit: (self.limit > 0).then_some(self.limit),
        }
    }
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    user: String,
    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write a ZIP with a consistent snapshot of the database.
    Export {
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Replace the database with a backup ZIP or raw SQLite file.
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum DataCommand {
    /// Write one account's decks and results as a CSV archive.
    Export {
        #[arg(long)]
        user: String,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Load a CSV archive into an account.
    Import {
        #[arg(long)]
        user: String,
        file: PathBuf,
        /// Delete the account's decks and results first.
        #[arg(long)]
        purge: bool,
    },
}

// ==============================================================================
// Command Dispatch
// ==============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = configuration::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    // Held until exit so buffered file logs are flushed.
    let _guard = configuration::init_tracing(&settings.logging)?;

    if let Commands::Serve = cli.command {
        return web_server::run_server(&settings).await;
    }

    let db = open_store(&settings).await?;
    let repo = DbRepository::new(db.clone());
    let json = cli.json;

    match cli.command {
        Commands::Migrate => {
            println!("Database is up to date ({}).", db.backend().as_str());
            Ok(())
        }
        Commands::User(command) => handle_user(&repo, command, json).await,
        Commands::Deck(args) => handle_deck(&repo, args, json).await,
        Commands::Result(args) => handle_result(&repo, args, json).await,
        Commands::Report(args) => handle_report(&repo, args, json).await,
        Commands::Backup(command) => {
            let service = BackupService::new(db, settings.backup.assets.clone())
                .with_max_database_bytes(settings.backup.max_database_bytes);
            handle_backup(&service, command).await
        }
        Commands::Data(command) => handle_data(&repo, command, json).await,
        Commands::Serve => web_server::run_server(&settings).await,
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<Database>> {
    let store = DatabaseSettings::from_env(&settings.database)?;
    tracing::info!(store = %store.describe(), "Using relational store.");
    let db = connect(&store, settings.database.max_connections)
        .await
        .with_context(|| format!("Failed to connect to the {}", store.describe()))?;
    run_migrations(&db)
        .await
        .context("Failed to run database migrations")?;
    Ok(Arc::new(db))
}

async fn user_id(repo: &DbRepository, username: &str) -> anyhow::Result<i64> {
    repo.find_user(username)
        .await?
        .map(|user| user.id)
        .ok_or_else(|| anyhow!("unknown user '{username}'"))
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_user(repo: &DbRepository, command: UserCommand, json: bool) -> anyhow::Result<()> {
    match command {
        UserCommand::Add { username, password } => {
            let user = repo.create_user(&username, &password).await?;
            if json {
                return render::json(&user);
            }
            println!("Created user '{}' (id {}).", user.username, user.id);
        }
        UserCommand::Passwd { username, password } => {
            repo.set_password(&username, &password).await?;
            println!("Password of '{username}' changed.");
        }
        UserCommand::List => {
            let users = repo.list_users().await?;
            if json {
                return render::json(&users);
            }
            render::users(&users);
        }
    }
    Ok(())
}

async fn handle_deck(repo: &DbRepository, args: DeckArgs, json: bool) -> anyhow::Result<()> {
    let user = user_id(repo, &args.user).await?;
    let deck = match args.command {
        DeckCommand::List { side, active } => {
            let decks = repo.list_decks(user, side, active).await?;
            if json {
                return render::json(&decks);
            }
            render::decks(&decks);
            return Ok(());
        }
        DeckCommand::Remove { side, id } => {
            let removed = repo.delete_deck(user, side, id).await?;
            if json {
                return render::json(&serde_json::json!({ "removed": removed }));
            }
            println!("Removed {removed} deck(s).");
            return Ok(());
        }
        DeckCommand::Add { side, name } => repo.create_deck(user, side, &name).await?,
        DeckCommand::Rename { side, id, name } => repo.rename_deck(user, side, id, &name).await?,
        DeckCommand::Enable { side, id } => repo.set_deck_active(user, side, id, true).await?,
        DeckCommand::Disable { side, id } => repo.set_deck_active(user, side, id, false).await?,
    };

    if json {
        return render::json(&deck);
    }
    render::decks(std::slice::from_ref(&deck));
    Ok(())
}

async fn handle_result(repo: &DbRepository, args: ResultArgs, json: bool) -> anyhow::Result<()> {
    let user = user_id(repo, &args.user).await?;
    let result = match args.command {
        ResultCommand::Add {
            date,
            deck,
            opponent,
            order,
            outcome,
            note,
        } => {
            let new = NewMatchResult {
                played_on: date.unwrap_or_else(|| Local::now().date_naive()),
                deck_id: deck,
                opponent_deck_id: opponent,
                play_order: order,
                outcome,
                note,
            };
            repo.create_result(user, new).await?
        }
        ResultCommand::List(filter) => {
            let results = repo.list_results(user, &filter.into_filter()).await?;
            if json {
                return render::json(&results);
            }
            render::results(&results);
            return Ok(());
        }
        ResultCommand::Show { id } => repo.get_result(user, id).await?,
        ResultCommand::Edit {
            id,
            date,
            deck,
            opponent,
            clear_opponent,
            order,
            outcome,
            note,
        } => {
            let update = MatchUpdate {
                played_on: date,
                deck_id: deck,
                opponent_deck_id: if clear_opponent { Some(None) } else { opponent.map(Some) },
                play_order: order,
                outcome,
                note,
            };
            if update.is_empty() {
                bail!("nothing to change; pass at least one field");
            }
            repo.update_result(user, id, update).await?
        }
        ResultCommand::Delete { ids } => {
            let removed = repo.delete_results(user, &ids).await?;
            if json {
                return render::json(&serde_json::json!({ "removed": removed }));
            }
            println!("Removed {removed} result(s).");
            return Ok(());
        }
    };

    if json {
        return render::json(&result);
    }
    render::results(std::slice::from_ref(&result));
    Ok(())
}

async fn handle_report(repo: &DbRepository, args: ReportArgs, json: bool) -> anyhow::Result<()> {
    let user = user_id(repo, &args.user).await?;
    let filter = ResultFilter {
        limit: None,
        ..args.filter.into_filter()
    };
    let results = repo.list_results(user, &filter).await?;
    let report = analytics::ReportEngine::new().calculate(&results)?;
    if json {
        return render::json(&report);
    }
    render::report(&report);
    Ok(())
}

/// Read-only deployments and the network store turn backups into a warning.
fn warn_or_fail(err: BackupError) -> anyhow::Result<()> {
    if err.is_warning() {
        tracing::warn!(error = %err, "Backup operation unavailable.");
        eprintln!("Warning: {err}");
        return Ok(());
    }
    Err(err.into())
}

async fn handle_backup(service: &BackupService, command: BackupCommand) -> anyhow::Result<()> {
    match command {
        BackupCommand::Export { output } => match service.export_database_to(&output).await {
            Ok(bytes) => println!("Wrote {bytes} bytes to {}.", output.display()),
            Err(e) => return warn_or_fail(e),
        },
        BackupCommand::Import { file } => {
            let payload = read_input(&file).await?;
            match service.restore_database(&payload).await {
                Ok(summary) => println!(
                    "Database restored from {} ({} bytes).",
                    file.display(),
                    summary.bytes
                ),
                Err(e) => return warn_or_fail(e),
            }
        }
    }
    Ok(())
}

async fn handle_data(repo: &DbRepository, command: DataCommand, json: bool) -> anyhow::Result<()> {
    match command {
        DataCommand::Export { user, output } => {
            let id = user_id(repo, &user).await?;
            let archive = backup::export_user_data(repo, id).await?;
            tokio::fs::write(&output, &archive)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote data of '{user}' to {}.", output.display());
        }
        DataCommand::Import { user, file, purge } => {
            let id = user_id(repo, &user).await?;
            let archive = read_input(&file).await?;
            let counters = backup::import_user_data(repo, id, &archive, purge).await?;
            if json {
                return render::json(&counters);
            }
            println!(
                "Imported {} deck(s), {} opponent deck(s) and {} result(s) into '{user}'.",
                counters.decks, counters.opponent_decks, counters.results
            );
        }
    }
    Ok(())
}

async fn read_input(file: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}
