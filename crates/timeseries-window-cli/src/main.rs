//! `tswindow`: inspect, load and navigate monthly-sharded Parquet time series
//! over range requests.

mod error;
mod report;
mod shell;

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use snafu::{OptionExt, ResultExt, ensure};
use timeseries_window_core::{
    clock::{Clock, SystemClock},
    config::{FetchConfig, NavigationConfig},
    navigation::NavigationController,
    refresh::{RefreshController, RefreshEvent},
    session::ShardSession,
    shard::{EntityId, MonthKey, ShardKey, ShardState},
    transport::{HttpTransport, LocalTransport, RangeTransport},
    window::{TimeWindow, parse_flexible_datetime},
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::{
    error::{
        BaseMissingSnafu, CliResult, HttpClientSnafu, InvalidConfigSnafu, InvalidKeySnafu,
        InvalidWindowSnafu, JsonSnafu, LoadConfigSnafu, MissingBaseSnafu, ReadConfigSnafu,
        SessionSnafu, ShardAbsentSnafu,
    },
    shell::{ShellContext, cmd_shell, parse_duration},
};

#[derive(Debug, Parser)]
#[command(name = "tswindow", version)]
struct Cli {
    /// Base URL (http/https) or local directory holding `<entity>/<YYYY-MM>.parquet`
    #[arg(long, env = "TSWINDOW_BASE", global = true)]
    base: Option<String>,

    /// JSON fetch configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Largest byte gap bridged when coalescing ranges
    #[arg(long = "gap-tolerance", global = true)]
    gap_tolerance: Option<u64>,

    /// Tail bytes fetched to bootstrap a shard footer
    #[arg(long = "bootstrap-len", global = true)]
    bootstrap_len: Option<u64>,

    /// Column whose statistics define row-group time spans
    #[arg(long = "time-column", global = true)]
    time_column: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Args)]
struct WindowArgs {
    /// Window in compact form, e.g. `251123T0432-2h30m` or `-3d`
    #[arg(long, allow_hyphen_values = true)]
    window: Option<String>,

    /// Window end, e.g. 20250630T16:20 (overrides --window's end)
    #[arg(long)]
    end: Option<String>,

    /// Window duration, e.g. 3d, 2h30m (overrides --window's duration)
    #[arg(long)]
    duration: Option<String>,
}

impl WindowArgs {
    fn resolve(&self) -> CliResult<TimeWindow> {
        let mut window = TimeWindow::decode(self.window.as_deref()).context(InvalidWindowSnafu {
            input: self.window.clone().unwrap_or_default(),
        })?;
        if let Some(end) = &self.end {
            let end = parse_flexible_datetime(end).context(InvalidWindowSnafu {
                input: end.clone(),
            })?;
            window = window.ending_at(end);
        }
        if let Some(duration) = &self.duration {
            window = window.with_duration(parse_duration(duration)?);
        }
        Ok(window)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve one shard and print its footer summary and row groups
    Inspect {
        #[arg(long)]
        entity: String,

        /// Month as YYYY-MM
        #[arg(long)]
        month: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Load a time window for one or more entities and report what was fetched
    Window {
        /// Repeatable entity ids
        #[arg(long = "entity", required = true)]
        entities: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Refresh the current month's shards periodically and print changes
    Watch {
        #[arg(long = "entity", required = true)]
        entities: Vec<String>,

        #[arg(long = "interval-secs", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,

        /// Stop after this many refresh rounds (default: until Ctrl-C)
        #[arg(long)]
        ticks: Option<usize>,
    },

    /// Interactive navigation shell
    Shell {
        #[arg(long = "entity", required = true)]
        entities: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,

        /// Optional history file path
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> CliResult<FetchConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
            FetchConfig::from_json_str(&text).context(LoadConfigSnafu { path })?
        }
        None => FetchConfig::default(),
    };
    if let Some(v) = cli.gap_tolerance {
        config.gap_tolerance = v;
    }
    if let Some(v) = cli.bootstrap_len {
        config.bootstrap_suffix_len = v;
    }
    if let Some(v) = &cli.time_column {
        config.time_column = v.clone();
    }
    config.validate().context(InvalidConfigSnafu)?;
    Ok(config)
}

fn make_transport(base: &str) -> CliResult<Arc<dyn RangeTransport>> {
    if base.starts_with("http://") || base.starts_with("https://") {
        let transport = HttpTransport::new(base).context(HttpClientSnafu { base })?;
        return Ok(Arc::new(transport));
    }
    let path = PathBuf::from(base);
    ensure!(path.is_dir(), BaseMissingSnafu { path });
    Ok(Arc::new(LocalTransport::new(path)))
}

fn make_session(cli: &Cli) -> CliResult<Arc<ShardSession>> {
    let base = cli.base.as_deref().context(MissingBaseSnafu)?;
    let config = load_config(cli)?;
    tracing::debug!(base, ?config, "Opening session");
    Ok(Arc::new(ShardSession::new(make_transport(base)?, config)))
}

fn parse_entities(raw: &[String]) -> CliResult<Vec<EntityId>> {
    raw.iter()
        .map(|e| e.parse::<EntityId>().context(InvalidKeySnafu))
        .collect()
}

async fn cmd_inspect(session: Arc<ShardSession>, entity: &str, month: &str, json: bool) -> CliResult<()> {
    let entity: EntityId = entity.parse().context(InvalidKeySnafu)?;
    let month: MonthKey = month.parse().context(InvalidKeySnafu)?;
    let key = ShardKey::new(entity, month);

    let state = session.resolve(&key).await.context(SessionSnafu)?;
    ensure!(state == ShardState::Present, ShardAbsentSnafu { key: key.to_string() });

    let (Some(summary), Some(index)) = (session.summary(&key), session.index(&key)) else {
        return ShardAbsentSnafu { key: key.to_string() }.fail();
    };
    if json {
        let value = report::shard_json(&key, &summary, &index);
        println!("{}", serde_json::to_string_pretty(&value).context(JsonSnafu)?);
    } else {
        print!("{}", report::shard_text(&key, &summary, &index));
    }
    Ok(())
}

async fn cmd_window(
    session: Arc<ShardSession>,
    entities: Vec<EntityId>,
    window: TimeWindow,
    json: bool,
) -> CliResult<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let nav = NavigationController::new(
        session.clone(),
        clock.clone(),
        NavigationConfig::default(),
        entities,
        window,
    );
    let loads = nav.load().await;
    let (start, end) = window.resolve(clock.now());

    if json {
        let value = report::loads_json(start, end, &loads);
        println!("{}", serde_json::to_string_pretty(&value).context(JsonSnafu)?);
    } else {
        print!("{}", report::loads_text(start, end, &loads));
        print!("{}", report::stats_text(&session.stats()));
    }
    Ok(())
}

async fn cmd_watch(
    session: Arc<ShardSession>,
    entities: Vec<EntityId>,
    interval_secs: u64,
    ticks: Option<usize>,
) -> CliResult<()> {
    let per_tick = entities.len();
    let handle = RefreshController::spawn(
        session,
        entities,
        Duration::from_secs(interval_secs),
        Arc::new(SystemClock),
    );
    let mut events = handle.subscribe();
    let limit = ticks.map(|t| t * per_tick);
    let mut seen = 0usize;

    loop {
        if limit.is_some_and(|limit| seen >= limit) {
            break;
        }
        let event: RefreshEvent = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Refresh events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        seen += 1;
        println!("{}", report::refresh_text(&event));
    }

    handle.stop().await;
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let session = make_session(&cli)?;

    match cli.cmd {
        Command::Inspect { entity, month, json } => cmd_inspect(session, &entity, &month, json).await,
        Command::Window {
            entities,
            window,
            json,
        } => cmd_window(session, parse_entities(&entities)?, window.resolve()?, json).await,
        Command::Watch {
            entities,
            interval_secs,
            ticks,
        } => cmd_watch(session, parse_entities(&entities)?, interval_secs, ticks).await,
        Command::Shell {
            entities,
            window,
            history,
        } => {
            let entities = parse_entities(&entities)?;
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let ctx = ShellContext {
                nav: NavigationController::new(
                    session.clone(),
                    clock.clone(),
                    NavigationConfig::default(),
                    entities.clone(),
                    window.resolve()?,
                ),
                refresh: RefreshController::new(session, entities, clock.clone()),
                clock,
            };
            cmd_shell(ctx, history).await
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
