use std::env;
use std::io::{self, Read};

use serde_json::json;
use tracing_subscriber::EnvFilter;

use kbq_cli::{parse_args, parse_request_json, Command, USAGE};
use kbq_core::config::{Config, LoggingSettings};
use kbq_core::types::{QueryResult, ServiceState};
use kbq_service::QueryService;

/// Logs go to stderr; stdout carries only JSON results.
fn init_logging(config: &Config) {
    let level = config.get::<LoggingSettings>("logging").map(|l| l.level).unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn print_result(result: &QueryResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = Config::load()?;
    init_logging(&config);
    let service = QueryService::from_config(&config);

    match cmd {
        Command::Query(request) => print_result(&service.query(&request))?,
        Command::Stdin => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            let result = match parse_request_json(&input) {
                Ok(request) => service.query(&request),
                Err(invalid) => invalid,
            };
            print_result(&result)?;
        }
        Command::Status => {
            let (state, error) = match service.state() {
                ServiceState::Uninitialized => ("uninitialized", None),
                ServiceState::Ready => ("ready", None),
                ServiceState::Error(e) => ("error", Some(e.to_string())),
            };
            let status = json!({
                "state": state,
                "error": error,
                "chunks": service.chunk_count(),
                "embedder": service.embedder_id(),
                "top_k": service.settings().top_k,
                "diversity_quota": service.settings().diversity_quota,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !service.state().is_ready() { std::process::exit(1); }
        }
    }
    Ok(())
}
