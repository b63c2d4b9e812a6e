//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::market_trend_adapter::{FixedTrendProvider, IndexTrendProvider};
use crate::domain::analyzer::{
    get_priority_stocks, AnalysisFailure, AnalysisOutcome, AnalysisRequest, Position,
    StockAnalysis, StockAnalyzer, TradeAction,
};
use crate::domain::error::SignalError;
use crate::domain::settings::{validate_analysis_config, EngineSettings};
use crate::domain::signal::MarketTrend;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::market_trend_port::MarketTrendProvider;

const DEFAULT_EXCHANGE: &str = "KRX";

#[derive(Parser, Debug)]
#[command(name = "stocksignal", about = "Technical buy/sell signal scoring")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score one or more symbols
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Codes to analyze; defaults to [analysis] codes
        codes: Vec<String>,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Rank symbols by buy or sell score
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value = "buy")]
        action: TradeAction,
        #[arg(short, long, default_value_t = 10)]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Analyze {
            config,
            codes,
            exchange,
            json,
        } => run_analyze(&config, &codes, exchange.as_deref(), json),
        Command::Rank {
            config,
            action,
            top,
            json,
        } => run_rank(&config, action, top, json),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SignalError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_analyze(
    config_path: &Path,
    code_override: &[String],
    exchange_override: Option<&str>,
    json: bool,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let codes = resolve_codes(code_override, &config);
    let outcomes = match analyze_codes(&config, &codes, exchange_override) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if json {
        return print_json(&outcomes);
    }

    for outcome in &outcomes {
        match outcome {
            AnalysisOutcome::Analysed(analysis) => print!("{}", format_analysis(analysis)),
            AnalysisOutcome::Failed(failure) => {
                println!("{}: error: {}\n", failure.symbol, failure.error)
            }
        }
    }

    let failed = outcomes.iter().filter(|o| o.analysis().is_none()).count();
    eprintln!("{} analysed, {} failed", outcomes.len() - failed, failed);
    ExitCode::SUCCESS
}

fn run_rank(config_path: &Path, action: TradeAction, top: usize, json: bool) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let codes = resolve_codes(&[], &config);
    let outcomes = match analyze_codes(&config, &codes, None) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let ranked = get_priority_stocks(&outcomes, action, top);

    if json {
        return print_json(&ranked);
    }

    if ranked.is_empty() {
        eprintln!("No analysable symbols");
        return ExitCode::SUCCESS;
    }

    println!(
        "{:<4} {:<10} {:>12} {:>6} {:>6}  {}",
        "#", "SYMBOL", "PRICE", "BUY", "SELL", "ACTION"
    );
    for (rank, analysis) in ranked.iter().enumerate() {
        println!(
            "{:<4} {:<10} {:>12.2} {:>6.1} {:>6.1}  {}",
            rank + 1,
            analysis.symbol,
            analysis.current_price,
            analysis.buy_score(),
            analysis.sell_score(),
            analysis.action()
        );
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_analysis_config(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    if let Err(e) = read_positions(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let codes = resolve_codes(&[], &config);
    if codes.is_empty() {
        eprintln!("No [analysis] codes; every symbol in the data directory will be analysed");
    } else {
        eprintln!("Codes: {}", codes.join(", "));
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

/// Fetches every code, analyzes the fetched series as one batch and returns
/// outcomes in the order of `codes`. Fetch failures become failure records.
/// An empty `codes` analyzes every symbol in the data directory except the
/// market index.
pub fn analyze_codes(
    config: &dyn ConfigPort,
    codes: &[String],
    exchange_override: Option<&str>,
) -> Result<Vec<AnalysisOutcome>, SignalError> {
    validate_analysis_config(config)?;
    let settings = EngineSettings::from_config(config)?;
    let positions = read_positions(config)?;

    let data_dir = config.get_string("data", "dir").unwrap_or_default();
    let exchange = exchange_override
        .map(str::to_string)
        .or_else(|| config.get_string("data", "exchange"))
        .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());
    let data = CsvAdapter::new(PathBuf::from(data_dir));

    let analyzer = StockAnalyzer::new(&settings, build_trend_provider(config, &data, &exchange)?);

    let codes = if codes.is_empty() {
        let index = config
            .get_string("analysis", "market_index")
            .map(|s| s.trim().to_uppercase());
        let listed: Vec<String> = data
            .list_symbols(&exchange)?
            .into_iter()
            .filter(|code| Some(code) != index.as_ref())
            .collect();
        eprintln!("No codes configured, using {} symbols from {}", listed.len(), exchange);
        listed
    } else {
        codes.to_vec()
    };

    // Stage 1: load data
    let mut requests = Vec::new();
    let mut slots: Vec<Result<usize, AnalysisFailure>> = Vec::with_capacity(codes.len());
    for code in &codes {
        match data.fetch_ohlcv(code, &exchange) {
            Ok(bars) => {
                eprintln!("Loaded {} bars for {}", bars.len(), code);
                let overlay =
                    data.fetch_ma_overlay(code, &exchange, settings.ma_short, settings.ma_long);
                let mut request = AnalysisRequest::new(code.clone(), bars);
                if let Some(position) = positions.iter().find(|(c, _)| c == code) {
                    request = request.with_position(position.1);
                }
                match overlay {
                    Ok(Some(overlay)) if overlay.matches(&request.bars) => {
                        request = request.with_overlay(overlay);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(symbol = %code, error = %e, "ignoring moving-average columns")
                    }
                }
                slots.push(Ok(requests.len()));
                requests.push(request);
            }
            Err(e) => {
                eprintln!("warning: {e}");
                slots.push(Err(AnalysisFailure {
                    symbol: code.clone(),
                    error: e.to_string(),
                }));
            }
        }
    }

    // Stage 2: score
    let mut analysed: Vec<Option<AnalysisOutcome>> = analyzer
        .analyze_multiple_stocks(&requests)
        .into_iter()
        .map(Some)
        .collect();

    // Stage 3: restore input order
    let outcomes = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Ok(index) => analysed.get_mut(index).and_then(Option::take),
            Err(failure) => Some(AnalysisOutcome::Failed(failure)),
        })
        .collect();
    Ok(outcomes)
}

/// `[analysis] market_trend` wins over `market_index`; neither means UNKNOWN.
pub fn build_trend_provider(
    config: &dyn ConfigPort,
    data: &dyn DataPort,
    exchange: &str,
) -> Result<Box<dyn MarketTrendProvider>, SignalError> {
    if let Some(label) = config
        .get_string("analysis", "market_trend")
        .filter(|s| !s.trim().is_empty())
    {
        let trend = label
            .parse::<MarketTrend>()
            .map_err(|reason| SignalError::ConfigInvalid {
                section: "analysis".to_string(),
                key: "market_trend".to_string(),
                reason,
            })?;
        return Ok(Box::new(FixedTrendProvider::new(trend)));
    }

    if let Some(index) = config
        .get_string("analysis", "market_index")
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
    {
        let bars = data.fetch_ohlcv(&index, exchange)?;
        info!(index = %index, rows = bars.len(), "loaded market index");
        return Ok(Box::new(IndexTrendProvider::new(&bars)));
    }

    Ok(Box::new(FixedTrendProvider::new(MarketTrend::Unknown)))
}

pub fn resolve_codes(code_override: &[String], config: &dyn ConfigPort) -> Vec<String> {
    if !code_override.is_empty() {
        return code_override.iter().map(|c| c.trim().to_uppercase()).collect();
    }

    if let Some(codes_str) = config.get_string("analysis", "codes") {
        return codes_str
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    vec![]
}

/// Parses `[positions]` entries of the form `CODE = buy_price[,highest_price]`.
pub fn read_positions(config: &dyn ConfigPort) -> Result<Vec<(String, Position)>, SignalError> {
    config
        .section_entries("positions")
        .into_iter()
        .map(|(code, value)| {
            let invalid = |reason: String| SignalError::ConfigInvalid {
                section: "positions".to_string(),
                key: code.clone(),
                reason,
            };
            let mut parts = value.split(',').map(str::trim);
            let buy_price = parse_price(parts.next().unwrap_or_default()).map_err(&invalid)?;
            let highest_price = match parts.next() {
                Some(p) if !p.is_empty() => Some(parse_price(p).map_err(&invalid)?),
                _ => None,
            };
            if parts.next().is_some() {
                return Err(invalid("expected buy_price[,highest_price]".to_string()));
            }
            Ok((
                code.trim().to_uppercase(),
                Position {
                    buy_price,
                    highest_price,
                },
            ))
        })
        .collect()
}

fn parse_price(raw: &str) -> Result<f64, String> {
    let price: f64 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(format!("price must be positive, got {}", raw));
    }
    Ok(price)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to serialise results: {e}");
            ExitCode::from(1)
        }
    }
}

pub fn format_analysis(analysis: &StockAnalysis) -> String {
    let mut out = format!(
        "{} @ {:.2}  [{}]  market {}\n",
        analysis.symbol,
        analysis.current_price,
        analysis.action(),
        analysis.market_trend
    );

    if let Some(levels) = &analysis.price_levels {
        out.push_str(&format!(
            "  floor {:.2} ({})  ceiling {:.2} ({})\n",
            levels.floor, levels.floor_date, levels.ceiling, levels.ceiling_date
        ));
    }
    out.push_str(&format!(
        "  volatility {} (ATR {:.2})\n",
        analysis.volatility.level, analysis.volatility.current_atr
    ));
    out.push_str(&format!("  knee: {}\n", analysis.knee.message));
    out.push_str(&format!("  shoulder: {}\n", analysis.shoulder.message));
    out.push_str(&format!(
        "  buy {:.1}: {}\n",
        analysis.buy_score(),
        analysis.buy_recommendation
    ));
    out.push_str(&format!(
        "  sell {:.1}: {}\n",
        analysis.sell_score(),
        analysis.sell_recommendation
    ));
    out.push_str(&format!("  => {}\n\n", analysis.decision.overall_recommendation));
    out
}
