//! Events Page - print one page from the windowed query engine
//!
//! ```bash
//! cargo run --release --bin events_page -- --limit 25 --contract wrap.near
//! cargo run --release --bin events_page -- --next <token>
//! ```
//!
//! Flags: `--limit`, `--next`, `--prev`, `--before-ts`, `--after-ts`,
//! `--contract`, `--account`, `--cause`. Output is the JSON response
//! `{ "data": [...], "cursor": { "next": .., "prev": .. } }` on stdout.

use dotenv::dotenv;
use log::info;
use nearflow::pipeline::open_store;
use nearflow::query::{query_events, PageRequest, QueryConfig, SqlitePageStore};
use std::env;

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>, String> {
    match flag(args, name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid value '{}' for {}", raw, name)),
        None => Ok(None),
    }
}

fn request_from_args(args: &[String]) -> Result<PageRequest, String> {
    Ok(PageRequest {
        limit: parse_flag(args, "--limit")?,
        cursor: None,
        next: flag(args, "--next"),
        prev: flag(args, "--prev"),
        before_ts: parse_flag(args, "--before-ts")?,
        after_ts: parse_flag(args, "--after-ts")?,
        contract: flag(args, "--contract"),
        account: flag(args, "--account"),
        cause: flag(args, "--cause"),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let request = match request_from_args(&args) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let db_path = env::var("NEARFLOW_DB_PATH").unwrap_or_else(|_| "/var/lib/nearflow/nearflow.db".to_string());
    let schema_dir = env::var("SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string());
    let config = QueryConfig::from_env();
    let store = SqlitePageStore::new(open_store(&db_path, &schema_dir)?);

    let now_ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX) as u64;
    match query_events(&store, &config, &request, now_ts) {
        Ok(page) => {
            info!("{} rows in {} slices", page.data.len(), page.slices_scanned);
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Err(e) if e.is_client_error() => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
