use anyhow::{Context, bail};
use conduit_config::{ConduitConfig, IpcKind};
use conduit_engine::ConduitEngine;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "usage: conduit [CONFIG.toml] [--ipc pipe|queue|shared_memory]";

/// Command line: an optional config path and an optional override of
/// `[run] ipc_kind`.
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<String>,
    ipc_kind: Option<IpcKind>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--ipc" {
            let Some(kind) = args.next() else {
                bail!("--ipc needs a value\n{USAGE}");
            };
            parsed.ipc_kind = Some(kind.parse()?);
        } else if arg.starts_with("--") {
            bail!("unknown flag '{arg}'\n{USAGE}");
        } else if parsed.config.is_none() {
            parsed.config = Some(arg);
        } else {
            bail!("unexpected argument '{arg}'\n{USAGE}");
        }
    }
    Ok(parsed)
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let mut config = match &args.config {
        Some(path) => ConduitConfig::load(path.as_str()).context("loading config")?,
        None => ConduitConfig::default(),
    };
    if let Some(kind) = args.ipc_kind {
        config.run.ipc_kind = kind;
    }
    init_tracing(&config.log_level);

    let run = &config.run;
    let engine = ConduitEngine::new(&config).context("starting simulator")?;
    engine
        .start_simulation(
            run.ipc_kind,
            run.process_count,
            Duration::from_millis(run.rate_ms),
            Duration::from_millis(run.processing_delay_ms),
        )
        .context("starting simulation")?;

    let deadline = Instant::now() + Duration::from_secs(run.duration_s);
    let poll = Duration::from_millis(run.poll_interval_ms);
    while Instant::now() < deadline {
        std::thread::sleep(poll.min(deadline.saturating_duration_since(Instant::now())));

        let active = engine.list_active_processes().len();
        info!(msgs_per_sec = engine.throughput(), active, "tick");
        for alert in engine.run_detectors() {
            warn!(issue = alert.issue(), ?alert, "alert");
        }
    }

    let shutdown = engine.shutdown();
    if let Some(path) = &run.export_path {
        engine
            .export_trace_to(path)
            .with_context(|| format!("exporting trace to {}", path.display()))?;
        info!(path = %path.display(), events = engine.trace_snapshot().len(), "trace exported");
    }
    shutdown.context("shutting down")?;
    Ok(())
}
