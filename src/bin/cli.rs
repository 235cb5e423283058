//! nairkv CLI Client
//!
//! Command-line interface for talking to Nair cache servers.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nairkv::{Config, NairClient, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// nairkv CLI
#[derive(Parser, Debug)]
#[command(name = "nairkv-cli")]
#[command(about = "CLI for Nair cache servers")]
#[command(version)]
struct Args {
    /// Server address (host[:port]); repeat for several servers
    #[arg(short = 'H', long = "host", default_value = "127.0.0.1:8887")]
    hosts: Vec<String>,

    /// Request timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Log connection and frame activity
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// Numeric area (partition id)
        area: u32,
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        area: u32,
        key: String,
        value: String,

        /// TTL in seconds; negative never expires
        #[arg(long, allow_hyphen_values = true)]
        ttl: Option<i64>,

        /// Send the value as a JSON document
        #[arg(long)]
        json: bool,
    },

    /// Increment a counter
    Incr {
        area: u32,
        key: String,
        #[arg(default_value = "1")]
        delta: u32,
        /// Starting value for a missing counter
        #[arg(long, default_value = "0")]
        default: u32,
        #[arg(long, allow_hyphen_values = true)]
        ttl: Option<i64>,
    },

    /// Delete a key
    Del { area: u32, key: String },

    /// Show version and remaining TTL of a key
    Meta { area: u32, key: String },

    /// Show the state of every connection
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.debug { "info,nairkv=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_target(true).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> nairkv::Result<()> {
    let config = Config::builder()
        .hosts(args.hosts)
        .request_timeout_ms(args.timeout_ms)
        .connect_timeout_ms(args.timeout_ms)
        .max_reconnect_attempts(Some(3))
        .debug(args.debug)
        .build();

    let client = NairClient::connect(config)?;
    let ready = client.wait_ready(Duration::from_millis(args.timeout_ms)).await;

    if let Commands::Status = args.command {
        let status = client.status();
        println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
        client.close().await;
        return Ok(());
    }
    ready?;

    let result = execute(&client, args.command).await;
    client.close().await;
    result
}

async fn execute(client: &NairClient, command: Commands) -> nairkv::Result<()> {
    match command {
        Commands::Get { area, key } => match client.get(area, &key).await? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Set {
            area,
            key,
            value,
            ttl,
            json,
        } => {
            let value = if json {
                let json = serde_json::from_str(&value)
                    .map_err(|e| nairkv::NairError::Encoding(format!("invalid JSON value: {}", e)))?;
                Value::Structured(json)
            } else {
                Value::Raw(value)
            };
            client.set(area, &key, value, ttl).await?;
            println!("OK");
        }
        Commands::Incr {
            area,
            key,
            delta,
            default,
            ttl,
        } => {
            let value = client.incr(area, &key, delta, default, ttl).await?;
            println!("{}", value);
        }
        Commands::Del { area, key } => {
            client.del(area, &key).await?;
            println!("OK");
        }
        Commands::Meta { area, key } => match client.get_meta(area, &key).await? {
            Some(meta) => println!("version={} ttl_remaining={}", meta.version, meta.ttl_remaining),
            None => println!("(nil)"),
        },
        Commands::Status => {}
    }
    Ok(())
}
