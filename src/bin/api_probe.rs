//! api-probe: issue a request through the resilient client and print what happened.
//!
//! Usage:
//!   api-probe get <path> [--config <file>] [--no-keyring]   GET through the full pipeline
//!   api-probe config [--config <file>]                      Print the effective configuration
//!   api-probe help                                          Show help

use resilient_api::storage::MemoryStorage;
use resilient_api::{ApiClient, ClientConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    resilient_api::logging::init_logging("resilient_api=info,breadcrumb=info");

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let code = match args[1].as_str() {
        "get" => cmd_get(&args[2..]).await,
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("api-probe {}", env!("CARGO_PKG_VERSION"));
            0
        }
        "help" | "--help" | "-h" => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            1
        }
    };
    std::process::exit(code);
}

fn print_usage() {
    println!(
        r#"api-probe - resilient API client probe

USAGE:
    api-probe <COMMAND> [OPTIONS]

COMMANDS:
    get <path>                  GET <path> through dedup, breaker, retry and auth
    config                      Print the effective configuration as YAML
    version                     Show version information
    help                        Show this help message

OPTIONS:
    --config <file>             Load configuration from a YAML file (env still overrides)
    --no-keyring                Keep session material in memory only

ENVIRONMENT:
    APP_API_BASE_URL            API base URL
    APP_API_*                   See ClientConfig::apply_env_with
    RUST_LOG                    Log filter"#
    );
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn load_config(args: &[String]) -> resilient_api::Result<ClientConfig> {
    match flag_value(args, "--config") {
        Some(path) => {
            let mut config = ClientConfig::from_yaml_file(path)?;
            config.apply_env_with(|k| std::env::var(k).ok());
            config.validate()?;
            Ok(config)
        }
        None => ClientConfig::from_env(),
    }
}

fn cmd_config(args: &[String]) -> i32 {
    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ {e}");
            return 1;
        }
    };
    let mut shown = config.clone();
    if shown.signing_secret.is_some() {
        shown.signing_secret = Some("<redacted>".to_string());
    }
    match serde_yaml::to_string(&shown) {
        Ok(yaml) => {
            print!("{yaml}");
            0
        }
        Err(e) => {
            eprintln!("✗ {e}");
            1
        }
    }
}

async fn cmd_get(args: &[String]) -> i32 {
    let Some(path) = args.first().filter(|a| !a.starts_with("--")) else {
        eprintln!("Usage: api-probe get <path>");
        return 1;
    };
    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ {e}");
            return 1;
        }
    };

    let mut builder = ApiClient::builder(config);
    if args.iter().any(|a| a == "--no-keyring") {
        builder = builder.storage(Arc::new(MemoryStorage::new()));
    }
    let client = match builder.build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ {e}");
            return 1;
        }
    };
    client.initialize().await;

    let start = std::time::Instant::now();
    let result = client.get(path).await;
    let elapsed = start.elapsed();
    let code = match result {
        Ok(resp) => {
            println!("✓ {} {} ({:?})", resp.status, client.resolve_url(path), elapsed);
            match serde_json::to_string_pretty(&resp.body) {
                Ok(body) => println!("{body}"),
                Err(_) => println!("{}", resp.body),
            }
            0
        }
        Err(e) => {
            eprintln!("✗ {} ({:?})", e.user_message(), elapsed);
            2
        }
    };

    let signals = client.signals();
    println!();
    println!("signals:");
    println!("  inflight:        {}", signals.inflight);
    println!(
        "  circuit breaker: {:?} ({} / {} failures)",
        signals.circuit_breaker.state,
        signals.circuit_breaker.failure_count,
        signals.circuit_breaker.threshold
    );
    println!(
        "  rate limited:    {} (retry after {}s)",
        signals.rate_limit.is_rate_limited, signals.rate_limit.retry_after_secs
    );
    println!("  session:         {:?}", signals.session);

    client.shutdown();
    code
}
