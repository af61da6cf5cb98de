use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use gs_ai::gemini::GeminiClient;
use gs_ai::generate::{GeminiGenerator, Generator};
use gs_ai::prompts::{system_instruction, DEFAULT_COLLECTION};
use gs_ai::provision::{provision, ProvisionOptions};
use gs_ai::session::Session;
use gs_ai::stores::GeminiStores;
use gs_core::config::{
    load_store_config, load_store_identifier, Settings, StoreIdSource, ENV_STORE_ID,
};
use gs_core::error::AppError;
use gs_core::kv::{JsonFileStore, KvStore, SqliteStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod cli;
pub mod repl;

use cli::{AskArgs, ChatArgs, Cli, Command, SetupArgs, StatusArgs};

pub const DEFAULT_LOG_FILTER: &str = "guidesearch=info,gs_ai=info,gs_core=info";

/// Logs go to stderr so answers on stdout stay clean. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn io_error(e: io::Error) -> AppError {
    AppError::new("CLI_IO_FAILED", "Terminal I/O failed").with_details(e.to_string())
}

fn config_path(settings: &Settings, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| settings.config_path.clone())
}

fn is_sqlite(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("sqlite" | "db")
    )
}

/// `.sqlite` and `.db` paths use the SQLite backend; anything else is a JSON file.
pub fn open_kv(path: &Path) -> Result<Box<dyn KvStore>, AppError> {
    if is_sqlite(path) {
        Ok(Box::new(SqliteStore::open(path)?))
    } else {
        Ok(Box::new(JsonFileStore::open(path)))
    }
}

/// Same backend choice as `open_kv`, for commands that only read the record.
pub fn open_kv_read_only(path: &Path) -> Result<Box<dyn KvStore>, AppError> {
    if is_sqlite(path) {
        Ok(Box::new(SqliteStore::open_read_only(path)?))
    } else {
        Ok(Box::new(JsonFileStore::open(path)))
    }
}

fn gemini_client(settings: &Settings) -> Result<GeminiClient, AppError> {
    GeminiClient::new(&settings.base_url, settings.require_api_key()?)
}

fn new_session(
    settings: &Settings,
    kv: &dyn KvStore,
    store_id: Option<&str>,
    debug: bool,
) -> Session {
    let resolved = load_store_identifier(store_id, settings.env_store_id.as_deref(), kv);
    if let Some(r) = resolved.as_ref() {
        tracing::info!(store = %r.id, source = source_label(r.source), "store identifier resolved");
    }
    let mut session = Session::new(
        resolved.map(|r| r.id),
        settings.model.clone(),
        system_instruction(DEFAULT_COLLECTION),
    );
    session.set_debug(debug);
    session
}

fn source_label(source: StoreIdSource) -> &'static str {
    match source {
        StoreIdSource::Override => "command line",
        StoreIdSource::Environment => "environment",
        StoreIdSource::ConfigFile => "config file",
    }
}

pub fn run<R: BufRead, W: Write>(
    cli: Cli,
    settings: &Settings,
    input: &mut R,
    out: &mut W,
) -> Result<(), AppError> {
    match cli.command {
        Command::Setup(args) => setup(settings, args, out),
        Command::Chat(args) => chat(settings, args, input, out),
        Command::Ask(args) => ask(settings, args, out),
        Command::Status(args) => status(settings, args, out),
    }
}

fn setup<W: Write>(settings: &Settings, args: SetupArgs, out: &mut W) -> Result<(), AppError> {
    let path = config_path(settings, args.config);
    let kv = open_kv(&path)?;
    let stores = GeminiStores::new(gemini_client(settings)?, settings.upload_timeout);
    let options = ProvisionOptions {
        policy: args.on_existing,
        poll_interval: settings.poll_interval,
        indexing_timeout: settings.indexing_timeout,
    };

    let outcome = provision(&stores, kv.as_ref(), &args.docs, &args.store_name, &options)?;

    let cfg = &outcome.config;
    if outcome.reused {
        writeln!(out, "Reusing existing store {}", cfg.store_identifier).map_err(io_error)?;
    } else {
        writeln!(
            out,
            "Created store {} with {} document(s)",
            cfg.store_identifier,
            cfg.documents.len()
        )
        .map_err(io_error)?;
    }
    writeln!(out, "Saved to {}", kv.location()).map_err(io_error)?;
    Ok(())
}

fn chat<R: BufRead, W: Write>(
    settings: &Settings,
    args: ChatArgs,
    input: &mut R,
    out: &mut W,
) -> Result<(), AppError> {
    let kv = open_kv_read_only(&config_path(settings, args.config))?;
    let generator = GeminiGenerator::new(gemini_client(settings)?, settings.generate_timeout);
    let mut session = new_session(settings, kv.as_ref(), args.store_id.as_deref(), args.debug);

    write_banner(&session, kv.as_ref(), out).map_err(io_error)?;
    repl::chat_loop(&mut session, &generator as &dyn Generator, input, out).map_err(io_error)
}

fn ask<W: Write>(settings: &Settings, args: AskArgs, out: &mut W) -> Result<(), AppError> {
    let kv = open_kv_read_only(&config_path(settings, args.config))?;
    let mut session = new_session(settings, kv.as_ref(), args.store_id.as_deref(), args.debug);
    let generator = GeminiGenerator::new(gemini_client(settings)?, settings.generate_timeout);
    answer_once(&mut session, &generator, &args.question, out)
}

/// Start-of-chat summary. Documents are listed only when the saved record describes the store
/// this session will query.
pub fn write_banner<W: Write>(session: &Session, kv: &dyn KvStore, out: &mut W) -> io::Result<()> {
    writeln!(out, "Ask questions about the indexed user guides.")?;
    writeln!(out, "{}", repl::HELP)?;
    writeln!(out, "Model: {}", session.model())?;
    let Some(id) = session.store_id() else {
        return Ok(());
    };
    writeln!(out, "Store: {id}")?;

    match load_store_config(kv) {
        Ok(Some(cfg)) if &cfg.store_identifier == id && !cfg.documents.is_empty() => {
            writeln!(out, "Indexed documents:")?;
            for doc in &cfg.documents {
                writeln!(out, "  - {}", doc.display_name)?;
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(code = %e.code, "could not read store record for banner"),
    }
    Ok(())
}

/// One-shot path shared by `ask`. Without a store there is no prompt to fall back on.
pub fn answer_once<W: Write>(
    session: &mut Session,
    generator: &dyn Generator,
    question: &str,
    out: &mut W,
) -> Result<(), AppError> {
    if session.needs_store() {
        return Err(AppError::new(
            "CONFIG_MISSING",
            "No file search store is configured",
        )
        .with_details(format!(
            "run `guidesearch setup`, pass --store-id, or set {ENV_STORE_ID}"
        )));
    }
    let turn = session.submit(generator, question)?.clone();
    repl::render_turn(out, &turn).map_err(io_error)?;
    repl::render_raw(out, session).map_err(io_error)
}

fn status<W: Write>(settings: &Settings, args: StatusArgs, out: &mut W) -> Result<(), AppError> {
    let kv = open_kv_read_only(&config_path(settings, args.config))?;
    report_status(settings, kv.as_ref(), out)
}

pub fn report_status<W: Write>(
    settings: &Settings,
    kv: &dyn KvStore,
    out: &mut W,
) -> Result<(), AppError> {
    let line = match load_store_identifier(None, settings.env_store_id.as_deref(), kv) {
        Some(r) => writeln!(out, "Store: {} (from {})", r.id, source_label(r.source)),
        None => writeln!(
            out,
            "Store: not configured (run `guidesearch setup` or set {ENV_STORE_ID})"
        ),
    };
    line.map_err(io_error)?;
    writeln!(out, "Config: {}", kv.location()).map_err(io_error)?;
    writeln!(out, "Model: {}", settings.model).map_err(io_error)?;

    match load_store_config(kv) {
        Ok(Some(cfg)) => {
            writeln!(out, "Store name: {}", cfg.store_name).map_err(io_error)?;
            if let Some(created) = cfg.created_at.as_deref() {
                writeln!(out, "Created: {created}").map_err(io_error)?;
            }
            for doc in &cfg.documents {
                writeln!(
                    out,
                    "  - {} ({}, {} bytes, sha256 {})",
                    doc.display_name, doc.path, doc.size_bytes, doc.sha256
                )
                .map_err(io_error)?;
            }
        }
        Ok(None) => {}
        Err(e) => writeln!(out, "Config record unreadable: {e}").map_err(io_error)?,
    }
    Ok(())
}
