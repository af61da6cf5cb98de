use std::io;
use std::process::ExitCode;

use clap::Parser;
use gs_core::config::Settings;
use guidesearch_lib::cli::Cli;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    guidesearch_lib::init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let stdin = io::stdin();
    let stdout = io::stdout();
    match guidesearch_lib::run(cli, &settings, &mut stdin.lock(), &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            if let Some(details) = e.details.as_deref() {
                eprintln!("  {details}");
            }
            ExitCode::FAILURE
        }
    }
}
