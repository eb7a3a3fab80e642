use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tradedesk::cli::{self, Cli, Commands, TradeArgs};
use tradedesk::config::{AppConfig, LoggingConfig};
use tradedesk::exchange::{build_exchange_client, AccountClient};
use tradedesk::execution::{CommandQueue, TradeExecutor, TradeIntent};
use tradedesk::risk::{AccountRiskSizer, RiskCalculator};
use tradedesk::validation::OrderValidator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    init_logging(&config.logging);

    let exchange = build_exchange_client(&config).context("failed to build exchange client")?;

    match cli.command {
        Commands::Balance => cli::show_balance(exchange.as_ref()).await?,
        Commands::Pairs => cli::show_pairs(exchange.as_ref()).await?,
        Commands::Plan { trade } => {
            let balance = exchange.balance().await?;
            let intent = build_intent(&trade, &config);
            let plan = RiskCalculator::new()
                .plan(
                    balance,
                    intent.risk_percentage,
                    intent.entry_price,
                    intent.stop_loss_price,
                    intent.leverage,
                )
                .context("cannot size this trade")?;
            cli::print_plan(&intent.symbol, intent.side, &plan);
        }
        Commands::Trade { trade, json } => {
            let balance = exchange.balance().await?;
            let pairs = exchange.tradable_pairs().await?;
            if !pairs.iter().any(|p| p == &trade.symbol) {
                bail!("{} is not a tradable pair", trade.symbol);
            }

            let validator = Arc::new(OrderValidator::from_config(&config.validation));
            let queue = Arc::new(CommandQueue::new(
                config.execution.queue_capacity,
                validator,
            ));
            let executor = TradeExecutor::new(
                queue,
                exchange.clone(),
                Arc::new(AccountRiskSizer::new(balance)),
                balance,
            )
            .with_config(config.execution.clone());

            let intent = build_intent(&trade, &config);
            info!("Submitting {} {} against balance {}", intent.side, intent.symbol, balance);

            let report = tokio::select! {
                report = executor.execute(&intent) => report.context("trade failed")?,
                _ = signal::ctrl_c() => {
                    warn!("Interrupted; orders already sent may still be working");
                    bail!("trade interrupted");
                }
            };
            cli::print_report(&report, json)?;
        }
    }

    Ok(())
}

fn build_intent(args: &TradeArgs, config: &AppConfig) -> TradeIntent {
    TradeIntent::new(args.symbol.clone(), args.side, args.entry, args.stop)
        .with_leverage(args.leverage.unwrap_or(config.risk.default_leverage))
        .with_risk_percentage(args.risk.unwrap_or(config.risk.risk_percentage))
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,tradedesk={}", config.level)));

    // `rolling::daily` panics when it cannot create the file, so check first
    let file_layer = config.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "tradedesk.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive for the life of the process
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let (json_layer, console_layer) = if config.json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();
}
