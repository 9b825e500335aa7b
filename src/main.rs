//! mdcheckd - stdio JSON-RPC server binary.
//!
//! Reads one JSON-RPC request per line from stdin and writes one response
//! per line to stdout. Logs go to stderr so the protocol stream stays
//! clean.

use clap::Parser;
use mdcheck::{Server, ServerConfig};
use mdcheck_utils::logging;
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mdcheckd",
    version,
    about = "Content-validation and enhancement server for Markdown documentation"
)]
struct Args {
    /// SQLite database file (defaults to in-memory)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory of per-family rule documents
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Directory of truth documents used for family discovery
    #[arg(long)]
    truth_dir: Option<PathBuf>,

    /// Directory of prompt template documents
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = logging::init_tracing(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let mut config = ServerConfig::from_env();
    if args.database.is_some() {
        config.database_path = args.database;
    }
    if let Some(rules_dir) = args.rules_dir {
        config.rules_dir = rules_dir;
    }
    if let Some(truth_dir) = args.truth_dir {
        config.truth_dir = truth_dir;
    }
    if let Some(prompts_dir) = args.prompts_dir {
        config.prompts_dir = prompts_dir;
    }

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start server: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_stdio(&server) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

/// One JSON-RPC request per stdin line; one response per stdout line.
fn run_stdio(server: &Server) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str(line) {
            Ok(request) => server.handle(&request),
            Err(e) => mdcheck_rpc::parse_error_response(&e.to_string()),
        };

        let line = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        let mut out = stdout.lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    Ok(())
}
