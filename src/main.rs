use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use comfy_table::presets;
use comfy_table::Table;
use fieldx::fxstruct;
use garde::Validate;
use note_cache::config::Config;
use note_cache::db::driver::DatabaseDriver;
#[cfg(any(feature = "pg", feature = "mysql"))]
use note_cache::db::driver::server::Server;
#[cfg(feature = "sqlite")]
use note_cache::db::driver::sqlite::Sqlite;
use note_cache::db::DbStore;
use note_cache::prelude::*;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create or upgrade the database schema.
    Migrate,
    /// Load the cache and print its counters.
    Stats,
    /// Print a page of recent public notes.
    Recent {
        /// Zero-based page number.
        #[clap(default_value_t = 0)]
        page: usize,
    },
    /// Print all notes of a user, private ones included.
    User { id: UserId },
    /// Print a note with its older and newer neighbors.
    Note {
        id:        NoteId,
        /// View the note as this user.
        #[clap(long = "as")]
        requester: Option<UserId>,
    },
    /// Create a note.
    Post {
        #[clap(long)]
        user:    UserId,
        #[clap(long, default_value_t = false)]
        private: bool,
        content: String,
    },
    /// Reload the cache from the database.
    Reset,
}

#[derive(Debug, Clone, Parser, Validate)]
#[fxstruct(no_new, get(copy))]
#[clap(about, version, name = "note-cache")]
struct Cli {
    /// Configuration file. Overrides --env.
    #[fieldx(get(clone))]
    #[garde(skip)]
    #[clap(long, short, env = "NOTECACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Environment name; selects <config-dir>/<env>.json.
    #[fieldx(get(clone))]
    #[garde(skip)]
    #[clap(long, env = "NOTECACHE_ENV", default_value = note_cache::config::DEFAULT_ENV)]
    env: String,

    #[fieldx(get(clone))]
    #[garde(skip)]
    #[clap(long, env = "NOTECACHE_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Use this SQLite database file instead of the configured server.
    #[fieldx(get(clone))]
    #[garde(custom(Self::feature_enabled(cfg!(feature = "sqlite"), "sqlite")))]
    #[clap(long, env = "NOTECACHE_SQLITE")]
    sqlite: Option<PathBuf>,

    /// Notes per page.
    #[clap(long, env = "NOTECACHE_PAGE_SIZE", default_value_t = 100)]
    #[garde(range(min = 1))]
    page_size: usize,

    /// File to send log into.
    #[fieldx(get(clone))]
    #[garde(skip)]
    #[clap(long, env = "NOTECACHE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[clap(long, short, default_value_t = false)]
    #[garde(skip)]
    json: bool,

    #[fieldx(get(clone))]
    #[garde(skip)]
    #[clap(subcommand)]
    command: Command,
}

impl Cli {
    fn feature_enabled<'a>(
        enabled: bool,
        feature: &'static str,
    ) -> impl FnOnce(&'a Option<PathBuf>, &()) -> garde::Result {
        move |value, _| {
            if value.is_none() || enabled {
                Ok(())
            }
            else {
                Err(garde::Error::new(format!("Build feature '{feature}' must be enabled.")))
            }
        }
    }
}

fn setup_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let dest_writer = Mutex::new(if let Some(log_file) = cli.log_file() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("cannot open log file {}", log_file.display()))?;
        Box::new(file) as Box<dyn io::Write + Send>
    }
    else {
        Box::new(io::stderr()) as Box<dyn io::Write + Send>
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(dest_writer))
        .try_init()?;

    info!("Tracing initialized");

    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn table(&self, table: impl Display) {
        println!("{table}");
    }

    fn new_table<const N: usize>(header: [&str; N]) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::ASCII_FULL_CONDENSED).set_header(header);
        table
    }

    fn notes_table<'a>(notes: impl IntoIterator<Item = (&'a str, &'a Arc<Note>)>) -> Table {
        let mut table = Self::new_table(["", "ID", "Created", "Owner", "Visibility", "Title"]);
        for (label, note) in notes {
            table.add_row([
                label.to_string(),
                note.id.to_string(),
                note.created_at.to_string(),
                note.owner_name.clone(),
                note.visibility.to_string(),
                note.title().to_string(),
            ]);
        }
        table
    }

    fn stats(&self, stats: &CacheStats) -> Result<()> {
        if self.json {
            return self.json(stats);
        }
        let mut table = Self::new_table(["", "Count"]);
        table
            .add_row(["Generation".to_string(), stats.generation.to_string()])
            .add_row(["Users".to_string(), stats.users.to_string()])
            .add_row(["Notes".to_string(), stats.notes.to_string()])
            .add_row(["Public notes".to_string(), stats.public_notes.to_string()]);
        self.table(table);
        Ok(())
    }

    fn page(&self, page: &NotePage) -> Result<()> {
        if self.json {
            return self.json(page);
        }
        self.table(Self::notes_table(page.notes.iter().map(|n| ("", n))));
        println!(
            "Page {}: notes {}-{} of {}",
            page.page, page.page_start, page.page_end, page.total
        );
        Ok(())
    }

    fn notes(&self, notes: &[Arc<Note>]) -> Result<()> {
        if self.json {
            return self.json(&notes);
        }
        self.table(Self::notes_table(notes.iter().map(|n| ("", n))));
        Ok(())
    }

    fn context(&self, ctx: &NoteContext) -> Result<()> {
        if self.json {
            return self.json(ctx);
        }
        let rows = [("newer", ctx.newer.as_ref()), ("this", Some(&ctx.note)), ("older", ctx.older.as_ref())];
        self.table(Self::notes_table(
            rows.into_iter().filter_map(|(label, note)| note.map(|n| (label, n))),
        ));
        println!("\n{}", ctx.note.content);
        Ok(())
    }

    fn created(&self, id: NoteId) -> Result<()> {
        if self.json {
            return self.json(&serde_json::json!({ "id": id }));
        }
        println!("created note #{id}");
        Ok(())
    }
}

async fn run<D: DatabaseDriver>(cli: &Cli, driver: Arc<D>) -> Result<()> {
    let store = Arc::new(DbStore::new(driver));
    let command = cli.command();

    if let Command::Migrate = command {
        store.migrate().await?;
        println!("schema is up to date");
        return Ok(());
    }

    store.driver().configure().await?;

    // A cache that failed to load must not serve anything.
    let cache = NoteCache::open(store, cli.page_size())
        .await
        .context("initial cache load failed")?;
    let out = Output { json: cli.json() };

    match command {
        Command::Migrate => Ok(()),
        Command::Stats => out.stats(&cache.stats()),
        Command::Recent { page } => match cache.page(page) {
            Some(page) => out.page(&page),
            None => bail!("page {page} not found"),
        },
        Command::User { id } => {
            if cache.user(id).is_none() {
                bail!("user #{id} not found");
            }
            out.notes(&cache.user_notes(id))
        }
        Command::Note { id, requester } => match cache.note_with_context(id, requester) {
            Some(ctx) => out.context(&ctx),
            None => bail!("note #{id} not found"),
        },
        Command::Post { user, private, content } => {
            let id = cache
                .create_note(user, content, Visibility::from_private_flag(private))
                .await?;
            out.created(id)
        }
        Command::Reset => {
            let stats = cache.initialize().await.context("reset failed, previous data kept")?;
            out.stats(&stats)
        }
    }
}

#[cfg(any(feature = "pg", feature = "mysql"))]
async fn run_server(cli: &Cli) -> Result<()> {
    let config_path = cli
        .config()
        .unwrap_or_else(|| Config::env_path(&cli.config_dir(), &cli.env()));
    let db = Config::load(&config_path)?.database;

    let server = Server::builder()
        .backend(db.backend)
        .host(db.host.clone())
        .port(db.port())
        .user(db.username.clone())
        .password(db.password.clone())
        .database(db.dbname.clone())
        .build()?;
    server.connect().await?;

    run(cli, server).await
}

#[cfg(not(any(feature = "pg", feature = "mysql")))]
async fn run_server(cli: &Cli) -> Result<()> {
    let config_path = cli
        .config()
        .unwrap_or_else(|| Config::env_path(&cli.config_dir(), &cli.env()));
    let db = Config::load(&config_path)?.database;
    bail!("{} support is not compiled in; use --sqlite", db.backend)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    if let Err(err) = cli.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::InvalidValue, err).exit();
    }

    setup_tracing(&cli)?;

    #[cfg(feature = "sqlite")]
    if let Some(db_path) = cli.sqlite() {
        let driver = Sqlite::connect_file(&db_path).await?;
        return run(&cli, Arc::new(driver)).await;
    }

    run_server(&cli).await
}
