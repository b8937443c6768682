use std::error::Error;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lexfold::config::{ConfigStore, FileStore, MemoryStore, Options};
use lexfold::dom::Fragment;
use lexfold::enrich::Enricher;
use lexfold::source::{DefinitionSource, Entry, SqliteSource};
use lexfold::theme::Theme;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lexfold", about = "Dictionary-entry enrichment service", version)]
pub struct Cli {
    /// Path to the preference store; omitted means preferences are not
    /// persisted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the lookup server.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// SQLite dictionary database.
        #[arg(long)]
        db: PathBuf,
        /// Serve entries with the dark theme applied.
        #[arg(long)]
        dark: bool,
    },
    /// Enrich a definition fragment from a file or stdin and print it.
    Enrich {
        /// HTML fragment file; stdin when omitted.
        file: Option<PathBuf>,
        /// Collapse foldable content.
        #[arg(long)]
        fold: bool,
        /// Hide the translated layer.
        #[arg(long)]
        no_cn: bool,
        /// Apply the dark theme.
        #[arg(long)]
        dark: bool,
    },
    /// Look a word up and print its enriched definition.
    Lookup {
        /// Word to look up.
        word: String,
        /// Language override.
        #[arg(long)]
        lang: Option<String>,
        /// SQLite dictionary database.
        #[arg(long)]
        db: PathBuf,
        /// Print the stored HTML without enrichment.
        #[arg(long)]
        raw: bool,
    },
    /// Look up a random indexed word.
    Lucky {
        /// SQLite dictionary database.
        #[arg(long)]
        db: PathBuf,
    },
    /// Load dictionary entries from a JSON file into the database.
    Index {
        /// SQLite dictionary database to create or extend.
        #[arg(long)]
        db: PathBuf,
        /// JSON array of {word, lang, definition} objects.
        entries: PathBuf,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn ConfigStore> = match &cli.config {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };
    match cli.command {
        Command::Serve { addr, db, dark } => handle_serve(addr, db, dark, store),
        Command::Enrich {
            file,
            fold,
            no_cn,
            dark,
        } => handle_enrich(file, fold, no_cn, dark, store),
        Command::Lookup {
            word,
            lang,
            db,
            raw,
        } => handle_lookup(word, lang, db, raw, store),
        Command::Lucky { db } => handle_lucky(db, store),
        Command::Index { db, entries } => handle_index(db, entries),
    }
}

#[cfg(feature = "web")]
fn handle_serve(
    addr: SocketAddr,
    db: PathBuf,
    dark: bool,
    store: Arc<dyn ConfigStore>,
) -> Result<(), Box<dyn Error>> {
    let source = Arc::new(SqliteSource::open(&db)?);
    let config = lexfold::web::WebConfig {
        addr,
        theme: if dark { Theme::Dark } else { Theme::Light },
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(lexfold::web::serve(config, source, store))?;
    Ok(())
}

#[cfg(not(feature = "web"))]
fn handle_serve(
    _addr: SocketAddr,
    _db: PathBuf,
    _dark: bool,
    _store: Arc<dyn ConfigStore>,
) -> Result<(), Box<dyn Error>> {
    Err("The server is disabled. Rebuild with `--features web` to enable it.".into())
}

fn handle_enrich(
    file: Option<PathBuf>,
    fold: bool,
    no_cn: bool,
    dark: bool,
    store: Arc<dyn ConfigStore>,
) -> Result<(), Box<dyn Error>> {
    let html = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    let mut options = Options::default().load(store.as_ref());
    if fold {
        options.default_fold = true;
    }
    if no_cn {
        options.default_show_cn = false;
    }
    let theme = if dark { Theme::Dark } else { Theme::Light };
    let mut frag = Fragment::parse(&html);
    if !Enricher::new(options, theme).enrich(&mut frag) {
        return Err("input has no enrichable content root".into());
    }
    println!("{}", frag.to_html());
    Ok(())
}

fn handle_lookup(
    word: String,
    lang: Option<String>,
    db: PathBuf,
    raw: bool,
    store: Arc<dyn ConfigStore>,
) -> Result<(), Box<dyn Error>> {
    let Some(word) = lexfold::source::validate_query(&word) else {
        return Err(format!("invalid query {word:?}").into());
    };
    let source = SqliteSource::open(&db)?;
    let Some(definition) = source.lookup(word, lang.as_deref())? else {
        return Err(format!("No entry found for word {word:?}").into());
    };
    if raw {
        println!("{definition}");
        return Ok(());
    }
    let options = Options::default().load(store.as_ref());
    let mut frag = Fragment::parse(&definition);
    Enricher::new(options, Theme::Light).enrich(&mut frag);
    println!("{}", frag.to_html());
    Ok(())
}

fn handle_lucky(db: PathBuf, store: Arc<dyn ConfigStore>) -> Result<(), Box<dyn Error>> {
    let source = SqliteSource::open(&db)?;
    let Some(word) = source.random_word()? else {
        return Err("the database has no entries".into());
    };
    let Some(definition) = source.lookup(&word, None)? else {
        return Err(format!("No entry found for word {word:?}").into());
    };
    let options = Options::default().load(store.as_ref());
    let mut frag = Fragment::parse(&definition);
    Enricher::new(options, Theme::Light).enrich(&mut frag);
    println!("{}", frag.to_html());
    Ok(())
}

fn handle_index(db: PathBuf, entries: PathBuf) -> Result<(), Box<dyn Error>> {
    let data = std::fs::read_to_string(&entries)?;
    let entries: Vec<Entry> = serde_json::from_str(&data)?;
    let source = SqliteSource::open(&db)?;
    let count = source.index_entries(&entries)?;
    println!("Indexed {count} entries into {}", db.display());
    Ok(())
}
