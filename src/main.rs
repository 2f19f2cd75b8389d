use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use lan_sweep::channel::{ResultChannel, DEFAULT_CAPACITY};
use lan_sweep::logging::{self, LogConfig, LogFormat};
use lan_sweep::progress::ProgressTracker;
use lan_sweep::server::{self, ServerConfig};
use lan_sweep::streamer::{self, StreamEvent};
use lan_sweep::types::{PortStatus, ScanResult};
use lan_sweep::{netdetect, ports, scanner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// lan-sweep — TCP connect sweep of local hosts with live results in the browser.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-sweep",
    version,
    about = "TCP connect sweep of local hosts with live results in the browser.",
    long_about = None
)]
struct Cli {
    /// Address the HTTP UI listens on.
    #[arg(long, default_value = "0.0.0.0:3030")]
    bind: String,

    /// JSON port catalog: {"common_ports": [{"name", "port", "protocol"}, ...]}.
    #[arg(long, default_value = "common_ports.json")]
    catalog: PathBuf,

    /// Socket connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 200)]
    timeout_ms: u64,

    /// Results buffered per run before the sweep waits for a reader.
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CAPACITY)]
    channel_capacity: usize,

    /// Directory with the static UI.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,

    /// Do not add local interface addresses to the targets.
    #[arg(long = "no-local-discovery", default_value_t = false)]
    no_local_discovery: bool,

    /// Run one sweep in the terminal instead of serving the UI.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Comma-separated extra targets for --once (IPs or hostnames).
    #[arg(long)]
    targets: Option<String>,

    /// Write --once results as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Leave the module path out of log lines.
    #[arg(long = "no-log-target", default_value_t = false)]
    no_log_target: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            catalog_path: self.catalog.clone(),
            probe_timeout: Duration::from_millis(self.timeout_ms),
            channel_capacity: self.channel_capacity,
            discover_local: !self.no_local_discovery,
            ui_dir: self.ui_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging_with_config(
        LogConfig::new()
            .level(cli.log_level.clone())
            .format(cli.log_format)
            .with_target(!cli.no_log_target),
    )?;

    let config = cli.server_config();
    info!(
        catalog = %config.catalog_path.display(),
        timeout_ms = cli.timeout_ms,
        channel_capacity = config.channel_capacity,
        discover_local = config.discover_local,
        "lan-sweep configuration"
    );

    if cli.once {
        return run_once(&cli, config).await;
    }

    server::spawn_server(&cli.bind, config).await
}

/// Sweep once and print each result as it arrives.
async fn run_once(cli: &Cli, config: ServerConfig) -> Result<()> {
    let tracker = Arc::new(ProgressTracker::new());
    let channel = Arc::new(ResultChannel::new(config.channel_capacity));

    let mut targets = if config.discover_local {
        netdetect::local_targets_or_empty()
    } else {
        Vec::new()
    };
    if let Some(extra) = cli.targets.as_deref() {
        targets.extend(netdetect::parse_extra_targets(extra));
    }
    let catalog = ports::load_catalog_or_empty(&config.catalog_path);

    if !tracker.try_start() {
        bail!("scan already in progress");
    }
    let sweep = scanner::launch(
        targets,
        catalog,
        &channel,
        Arc::clone(&tracker),
        config.probe_timeout,
    );

    let total = tracker.snapshot().total;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    let (tx, mut rx) = mpsc::channel(16);
    let stream_channel = Arc::clone(&channel);
    let stream_cancel = cancel.clone();
    tokio::spawn(async move { streamer::stream_run(&stream_channel, tx, stream_cancel).await });

    let mut results = Vec::new();
    let mut completed = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Result(r) => {
                println!(
                    "[{:>5}/{:<5}] {:<15} {:>5}/{:<4} {:<6} {}",
                    results.len() + 1,
                    total,
                    r.ip,
                    r.port.port,
                    r.port.protocol,
                    r.status.as_str(),
                    r.port.name
                );
                results.push(r);
            }
            StreamEvent::Complete => completed = true,
        }
    }

    if completed {
        sweep.await?;
    } else {
        warn!("interrupted, sweep abandoned");
    }

    print_results_table(&results);
    if let Some(path) = cli.output.as_deref() {
        match write_results_json(path, &results) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {}", path.display(), e),
        }
    }
    Ok(())
}

fn print_results_table(results: &[ScanResult]) {
    let open: Vec<&ScanResult> = results
        .iter()
        .filter(|r| r.status == PortStatus::Open)
        .collect();

    let mut ip_w = "ip".len();
    let mut name_w = "service".len();
    for r in &open {
        ip_w = ip_w.max(r.ip.len());
        name_w = name_w.max(r.port.name.len());
    }
    let port_w = 5usize;

    println!(
        "\nOpen ports: {} (scanned: {})",
        open.len(),
        results.len()
    );
    println!(
        "{:<ip_w$}  {:>port_w$}  {:<name_w$}  {}",
        "ip", "port", "service", "protocol",
    );
    println!(
        "{:-<ip_w$}  {:-<port_w$}  {:-<name_w$}  {:-<8}",
        "", "", "", "",
    );
    for r in open {
        println!(
            "{:<ip_w$}  {:>port_w$}  {:<name_w$}  {}",
            r.ip, r.port.port, r.port.name, r.port.protocol,
        );
    }
}

fn write_results_json(path: &std::path::Path, results: &[ScanResult]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
