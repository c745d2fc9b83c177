//! Cambio CLI
//!
//! Resolve the current PEN/USD rate and convert amounts from the command line.

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cambio_common::{Currency, Money, RateRecord};
use cambio_fx::{convert_money, FxConfig};

/// Cambio exchange-rate CLI
#[derive(Parser, Debug)]
#[command(name = "cambio")]
#[command(about = "PEN/USD exchange rates with provider fallback")]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and print the current rate
    Rate {
        /// Per-provider timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the rate record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert an amount between currencies
    Convert {
        /// Amount to convert
        #[arg(allow_hyphen_values = true)]
        amount: f64,

        /// Source currency code
        #[arg(long, default_value = "PEN")]
        from: Currency,

        /// Target currency code
        #[arg(long, default_value = "USD")]
        to: Currency,

        /// Per-provider timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the display symbol of a currency
    Symbol {
        /// Currency code
        code: Currency,
    },
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    let (json_layer, plain_layer) = if json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .init();
}

fn print_rate(record: &RateRecord) {
    println!("{}", record);
    if record.using_fixed_fallback {
        println!("Note: live rates unavailable, rate may be approximate");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = FxConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    debug!(cache_dir = %config.cache_dir.display(), "Configuration loaded");

    match args.command {
        Command::Rate { timeout_ms, json } => {
            let resolver = config.build_resolver();
            let record = match timeout_ms {
                Some(ms) => resolver.resolve(Duration::from_millis(ms)).await,
                None => resolver.get_exchange_rate().await,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_rate(&record);
            }
        }
        Command::Convert {
            amount,
            from,
            to,
            timeout_ms,
        } => {
            let resolver = config.build_resolver();
            let record = match timeout_ms {
                Some(ms) => resolver.resolve(Duration::from_millis(ms)).await,
                None => resolver.get_exchange_rate().await,
            };

            let input = Money::new(amount, from);
            let output = convert_money(&input, to, &record);

            println!("{} = {}", input, output);
            if record.using_fixed_fallback {
                println!("Note: live rates unavailable, rate may be approximate");
            }
        }
        Command::Symbol { code } => {
            println!("{}", code.symbol());
        }
    }

    Ok(())
}
