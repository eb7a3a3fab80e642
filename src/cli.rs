use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::domain::{OrderSide, OrderSnapshot};
use crate::error::Result;
use crate::exchange::AccountClient;
use crate::execution::TradeReport;
use crate::risk::TradePlan;

#[derive(Parser)]
#[command(name = "tradedesk")]
#[command(version = "0.1.0")]
#[command(about = "Risk-bounded manual trading assistant", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus $TRADEDESK_ENV overrides)
    #[arg(short, long, default_value = "config", env = "TRADEDESK_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the account balance
    Balance,
    /// List tradable pairs
    Pairs,
    /// Size a trade without placing it
    Plan {
        #[command(flatten)]
        trade: TradeArgs,
    },
    /// Place an entry order plus its protective stop
    Trade {
        #[command(flatten)]
        trade: TradeArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct TradeArgs {
    /// Trading pair, e.g. BTC/USDT
    #[arg(short, long)]
    pub symbol: String,
    /// buy|sell (long|short accepted)
    #[arg(long, value_parser = parse_side)]
    pub side: OrderSide,
    /// Entry price
    #[arg(long)]
    pub entry: Decimal,
    /// Stop-loss price
    #[arg(long)]
    pub stop: Decimal,
    /// Leverage (defaults to risk.default_leverage)
    #[arg(long)]
    pub leverage: Option<Decimal>,
    /// Percent of the balance to risk (defaults to risk.risk_percentage)
    #[arg(long)]
    pub risk: Option<Decimal>,
}

fn parse_side(raw: &str) -> std::result::Result<OrderSide, String> {
    raw.parse()
}

pub async fn show_balance(client: &dyn AccountClient) -> Result<()> {
    let balance = client.balance().await?;
    println!("Balance ({}): {}", client.kind(), balance);
    Ok(())
}

pub async fn show_pairs(client: &dyn AccountClient) -> Result<()> {
    let pairs = client.tradable_pairs().await?;
    println!("Tradable pairs ({}):", pairs.len());
    for pair in pairs {
        match client.market_price(&pair).await {
            Ok(price) => println!("  {:<12} {}", pair, price),
            Err(_) => println!("  {}", pair),
        }
    }
    Ok(())
}

pub fn print_plan(symbol: &str, side: OrderSide, plan: &TradePlan) {
    println!("Trade plan: {} {}", side, symbol);
    println!("  Risk amount:     {}", plan.risk_amount.round_dp(2));
    println!("  Position size:   {}", plan.position_size.round_dp(8));
    println!("  Notional:        {}", plan.notional.round_dp(2));
    println!(
        "  Margin required: {} at {}x",
        plan.margin_required.round_dp(2),
        plan.leverage
    );
    println!("  Risk ratio:      {}", plan.risk_ratio.round_dp(4));
}

pub fn print_report(report: &TradeReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Position size: {}", report.position_size.round_dp(8));
    print_order("Entry", &report.main);
    print_order("Stop-loss", &report.stop_loss);
    if !report.is_protected() {
        println!("WARNING: the stop-loss did not reach the exchange; the position is unprotected");
    }
    Ok(())
}

fn print_order(label: &str, order: &OrderSnapshot) {
    println!(
        "{:<10} {} {} {} @ {} -> {}{}",
        label,
        order.side,
        order.quantity,
        order.symbol,
        order.price,
        order.state,
        order
            .exchange_ref
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default()
    );
    if let Some(error) = &order.error {
        println!("{:<10} error: {}", "", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trade_command() {
        let cli = Cli::try_parse_from([
            "tradedesk",
            "trade",
            "--symbol",
            "BTC/USDT",
            "--side",
            "long",
            "--entry",
            "50000",
            "--stop",
            "49000",
            "--risk",
            "2",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Trade { trade, json } => {
                assert!(json);
                assert_eq!(trade.side, OrderSide::Buy);
                assert_eq!(trade.entry, dec!(50000));
                assert_eq!(trade.risk, Some(dec!(2)));
                assert_eq!(trade.leverage, None);
            }
            _ => panic!("expected trade command"),
        }
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_bad_side_is_rejected() {
        assert!(Cli::try_parse_from([
            "tradedesk", "plan", "--symbol", "BTC/USDT", "--side", "up", "--entry", "1",
            "--stop", "2",
        ])
        .is_err());
    }
}
