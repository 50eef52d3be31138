//! CLI for bitlens: read-only node queries and chain statistics.
//!
//! Pipeline: flags/env -> config store -> cli executor -> response cache -> engine -> output.

use bitlens_analyzer::composite::ComprehensiveAnalysis;
use bitlens_analyzer::sink::json_stream::JsonStreamSink;
use bitlens_analyzer::sink::SummaryRow;
use bitlens_analyzer::{reporter, AnalyticsEngine, BlockFilter, EngineConfig, TransactionAnalyzer};
use bitlens_core::{ConfigStore, ConfigUpdate, NodeConfig, QueryError, QueryRequest, Window};
use bitlens_provider::fanout::DEFAULT_CONCURRENCY;
use bitlens_provider::{queries, CachedClient, CliExecutor, NodeClient, ResponseCache};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "bitlens", version, about = "Read-only Bitcoin node analytics")]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    /// Print JSON instead of the text report (`tx`, `analyze`).
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Sink output: "ndjson" writes NDJSON rows to stdout,
    /// "ndjson:/path/to/file" appends them to a file.
    #[arg(long, global = true, value_parser = parse_sink)]
    sink: Option<SinkTarget>,

    /// Simultaneous node invocations per operation.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct NodeArgs {
    /// Node CLI executable; discovered on PATH and common locations when unset.
    #[arg(long, global = true, env = "BITCOIN_CLI_PATH")]
    cli_path: Option<PathBuf>,

    /// mainnet, testnet or regtest.
    #[arg(long, global = true, env = "BITCOIN_NETWORK")]
    network: Option<String>,

    #[arg(long, global = true, env = "BITCOIN_DATADIR")]
    datadir: Option<PathBuf>,

    #[arg(long, global = true, env = "BITCOIN_CONF")]
    conf: Option<PathBuf>,

    #[arg(long, global = true, env = "BITCOIN_RPC_USER")]
    rpc_user: Option<String>,

    #[arg(long, global = true, env = "BITCOIN_RPC_PASSWORD", hide_env_values = true)]
    rpc_password: Option<String>,

    /// Per-invocation timeout.
    #[arg(long, global = true, env = "BITLENS_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Retries for transient failures.
    #[arg(long, global = true)]
    retries: Option<u32>,
}

impl NodeArgs {
    fn to_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            executable_path: self.cli_path.clone(),
            network: self.network.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
            datadir: self.datadir.clone(),
            conf: self.conf.clone(),
            rpc_user: self.rpc_user.clone(),
            rpc_password: self.rpc_password.clone(),
            max_retries: self.retries,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct WindowArgs {
    /// The most recent N blocks.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    blocks: Option<u64>,

    /// First height of an explicit range.
    #[arg(long)]
    from: Option<u64>,

    /// Last height of an explicit range (inclusive).
    #[arg(long, requires = "from")]
    to: Option<u64>,
}

impl WindowArgs {
    const DEFAULT_BLOCKS: u64 = 144;

    fn window(&self) -> Window {
        match (self.from, self.blocks) {
            (Some(start), _) => Window::Range {
                start,
                end: self.to.map_or(u64::MAX, |to| to.saturating_add(1)),
            },
            (None, count) => Window::Recent {
                count: count.unwrap_or(Self::DEFAULT_BLOCKS),
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Executable, network and node reachability.
    Info,
    /// Chain, network and mempool state with fee estimates.
    Status,
    /// Run one read-only node method with positional arguments.
    Call {
        method: String,
        args: Vec<String>,
    },
    /// Details of one block by height or hash.
    Block { id: String },
    /// Scan a height range for blocks matching filters.
    Search {
        #[arg(long)]
        start: Option<u64>,
        #[arg(long)]
        end: Option<u64>,
        #[arg(long)]
        min_time: Option<i64>,
        #[arg(long)]
        max_time: Option<i64>,
        #[arg(long)]
        min_size: Option<u64>,
        #[arg(long)]
        max_size: Option<u64>,
        #[arg(long)]
        min_tx: Option<u64>,
        #[arg(long)]
        max_tx: Option<u64>,
    },
    /// Summarize a transaction by txid or raw hex.
    Tx { input: String },
    /// Every known chain tip, active first.
    ChainTips,
    /// Transaction count and rate over a block window.
    ChainTxStats {
        /// Window size in blocks (node default when unset).
        #[arg(long)]
        blocks: Option<u64>,
        /// Final block of the window.
        #[arg(long, requires = "blocks")]
        hash: Option<String>,
    },
    /// Difficulty of the current tip.
    CurrentDifficulty,
    /// Mempool entry of an unconfirmed transaction.
    MempoolEntry { txid: String },
    /// In-mempool ancestors of a transaction.
    MempoolAncestors { txid: String },
    /// In-mempool descendants of a transaction.
    MempoolDescendants { txid: String },
    /// UTXO set totals (slow on large chains).
    UtxoSet,
    /// Difficulty at sampled heights.
    Difficulty {
        #[command(flatten)]
        window: WindowArgs,
        /// Sampling stride in blocks (default one adjustment period).
        #[arg(long)]
        stride: Option<u64>,
    },
    /// Per-block fee-rate statistics.
    Fees {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Network hashrate estimate.
    Hashrate {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Distribution of block intervals.
    BlockTimes {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Every statistic plus node state in one report.
    Analyze {
        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Debug, Clone)]
enum SinkTarget {
    Stdout,
    File(PathBuf),
}

fn parse_sink(value: &str) -> Result<SinkTarget, String> {
    if value == "ndjson" {
        Ok(SinkTarget::Stdout)
    } else if let Some(path) = value.strip_prefix("ndjson:").filter(|p| !p.is_empty()) {
        Ok(SinkTarget::File(PathBuf::from(path)))
    } else {
        Err(format!("unknown sink {value}; use 'ndjson' or 'ndjson:/path'"))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let t0 = Instant::now();

    match run(cli).await {
        Ok(()) => {
            tracing::debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            match serde_json::to_string_pretty(&e) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("{e}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), QueryError> {
    let store = Arc::new(ConfigStore::new(NodeConfig::default())?);
    store.update(cli.node.to_update())?;
    let executor = CliExecutor::new(Arc::clone(&store));
    let client: Arc<dyn NodeClient> = Arc::new(CachedClient::new(
        executor,
        Arc::new(ResponseCache::default()),
    ));
    let engine = AnalyticsEngine::new(
        Arc::clone(&client),
        EngineConfig {
            concurrency: cli.concurrency.max(1),
            ..EngineConfig::default()
        },
    );
    let out = Output {
        json: cli.json,
        sink: cli.sink,
    };

    match cli.command {
        Commands::Info => {
            let config = store.get();
            let info = bitlens_analyzer::connection_info(&*client, &config).await;
            print_json(&info)
        }
        Commands::Status => print_json(&bitlens_analyzer::blockchain_status(&*client).await),
        Commands::Call { method, args } => {
            let request = call_request(method, args)?;
            let payload = client.execute(&request).await?;
            print_json(&payload.into_value())
        }
        Commands::Block { id } => {
            print_json(&bitlens_analyzer::detailed_block_info(&*client, &id).await?)
        }
        Commands::Search {
            start,
            end,
            min_time,
            max_time,
            min_size,
            max_size,
            min_tx,
            max_tx,
        } => {
            let filter = BlockFilter {
                start_height: start,
                end_height: end,
                min_time,
                max_time,
                min_size,
                max_size,
                min_tx_count: min_tx,
                max_tx_count: max_tx,
            };
            let found =
                bitlens_analyzer::search_blocks(Arc::clone(&client), &filter, cli.concurrency).await?;
            tracing::info!(scanned = found.scanned, matches = found.matches.len(), "search done");
            print_json(&found)
        }
        Commands::Tx { input } => {
            let summary = TransactionAnalyzer::new(Arc::clone(&client))
                .analyze(&input)
                .await?;
            if out.json {
                print_json(&summary)
            } else {
                print!("{}", reporter::render_transaction(&summary));
                Ok(())
            }
        }
        Commands::ChainTips => print_json(&bitlens_analyzer::chain_tips(&*client).await?),
        Commands::ChainTxStats { blocks, hash } => print_json(
            &bitlens_analyzer::chain_tx_stats(&*client, blocks, hash.as_deref()).await?,
        ),
        Commands::CurrentDifficulty => {
            let difficulty = bitlens_analyzer::current_difficulty(&*client).await?;
            print_json(&serde_json::json!({ "difficulty": difficulty }))
        }
        Commands::MempoolEntry { txid } => {
            print_json(&bitlens_analyzer::mempool_entry(&*client, &txid).await?)
        }
        Commands::MempoolAncestors { txid } => {
            print_json(&bitlens_analyzer::mempool_ancestors(&*client, &txid).await?)
        }
        Commands::MempoolDescendants { txid } => {
            print_json(&bitlens_analyzer::mempool_descendants(&*client, &txid).await?)
        }
        Commands::UtxoSet => print_json(&bitlens_analyzer::utxo_set_info(&*client).await?),
        Commands::Difficulty { window, stride } => {
            let history = engine.difficulty_history(window.window(), stride).await?;
            out.series("difficulty_history", &history, &history.to_rows())
        }
        Commands::Fees { window } => {
            let history = engine.fee_history(window.window()).await?;
            out.series("fee_history", &history, &history.to_rows())
        }
        Commands::Hashrate { window } => {
            let estimate = engine.hashrate_estimate(window.window()).await?;
            out.series::<_, ()>("hashrate_estimate", &estimate, &[])
        }
        Commands::BlockTimes { window } => {
            let dist = engine.block_time_distribution(window.window()).await?;
            out.series("block_time_distribution", &dist, &dist.to_rows())
        }
        Commands::Analyze { window } => {
            let report =
                bitlens_analyzer::comprehensive_analysis(&engine, window.window()).await;
            out.analysis(&report)
        }
    }
}

/// `call` only reaches methods on the read-only allowlist.
fn call_request(method: String, args: Vec<String>) -> Result<QueryRequest, QueryError> {
    if !queries::is_read_only(&method) {
        return Err(QueryError::invalid_input(format!(
            "{method} is not a read-only query method"
        )));
    }
    Ok(args
        .into_iter()
        .fold(QueryRequest::new(method), |req, arg| req.arg(arg)))
}

struct Output {
    json: bool,
    sink: Option<SinkTarget>,
}

impl Output {
    /// Rows then a summary row to the sink, or the report as JSON.
    fn series<T: Serialize, R: Serialize>(
        &self,
        kind: &'static str,
        report: &T,
        rows: &[R],
    ) -> Result<(), QueryError> {
        match &self.sink {
            None => print_json(report),
            Some(SinkTarget::Stdout) => {
                let mut s = JsonStreamSink::stdout();
                s.write_rows(rows).map_err(sink_error)?;
                s.write_row(&SummaryRow::new(kind, report)).map_err(sink_error)?;
                let n = s.finish().map_err(sink_error)?;
                tracing::info!(rows = n, "ndjson sink: wrote to stdout");
                Ok(())
            }
            Some(SinkTarget::File(path)) => {
                let mut s = JsonStreamSink::append_to(path).map_err(sink_error)?;
                s.write_rows(rows).map_err(sink_error)?;
                s.write_row(&SummaryRow::new(kind, report)).map_err(sink_error)?;
                let n = s.finish().map_err(sink_error)?;
                tracing::info!(rows = n, path = %path.display(), "ndjson sink: wrote to file");
                print_json(report)
            }
        }
    }

    fn analysis(&self, report: &ComprehensiveAnalysis) -> Result<(), QueryError> {
        if self.sink.is_some() {
            let mut rows: Vec<serde_json::Value> = Vec::new();
            if let Some(d) = report.difficulty.ok() {
                rows.extend(to_values(&d.to_rows())?);
            }
            if let Some(f) = report.fees.ok() {
                rows.extend(to_values(&f.to_rows())?);
            }
            if let Some(b) = report.block_times.ok() {
                rows.extend(to_values(&b.to_rows())?);
            }
            // Still print the report to stderr so it's visible.
            eprint!("{}", reporter::render_analysis(report));
            return self.series("comprehensive_analysis", report, &rows);
        }
        if self.json {
            print_json(report)
        } else {
            print!("{}", reporter::render_analysis(report));
            Ok(())
        }
    }
}

fn to_values<R: Serialize>(rows: &[R]) -> Result<Vec<serde_json::Value>, QueryError> {
    rows.iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| QueryError::internal(format!("serializing rows: {e}")))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), QueryError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| QueryError::internal(format!("serializing output: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}").map_err(sink_error)
}

fn sink_error(e: std::io::Error) -> QueryError {
    QueryError::internal(format!("writing output: {e}"))
}
