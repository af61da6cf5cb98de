use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gs_ai::provision::ExistingStorePolicy;
use gs_core::config::DEFAULT_STORE_NAME;
use gs_core::domain::DocumentRef;

/// Ask questions answered only from an indexed set of user guides.
#[derive(Parser, Debug)]
#[command(name = "guidesearch")]
#[command(version)]
#[command(about = "Grounded Q&A over user guide documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a file search store, upload and index documents, and save its identifier
    Setup(SetupArgs),

    /// Interactive conversation against the configured store
    Chat(ChatArgs),

    /// Ask a single question and exit
    Ask(AskArgs),

    /// Show which store is configured and where the identifier came from
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Document to upload as `<path>=<display name>`; repeat for each document
    #[arg(long = "doc", value_name = "PATH=NAME", required = true)]
    pub docs: Vec<DocumentRef>,

    /// Display name of the remote store
    #[arg(long, default_value = DEFAULT_STORE_NAME)]
    pub store_name: String,

    /// What to do if a store with this name already exists: fail, reuse, or replace
    #[arg(long, default_value_t = ExistingStorePolicy::Fail)]
    pub on_existing: ExistingStorePolicy,

    /// Config file to write (`.sqlite`/`.db` selects the SQLite backend)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Store identifier; takes precedence over the environment and the config file
    #[arg(long)]
    pub store_id: Option<String>,

    /// Print raw grounding metadata after each answer
    #[arg(long)]
    pub debug: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    pub question: String,

    #[arg(long)]
    pub store_id: Option<String>,

    #[arg(long)]
    pub debug: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}
