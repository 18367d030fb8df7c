use anyhow::{bail, Context};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use logstream_dashboard::app::poll_channel::PollChannel;
use logstream_dashboard::app::{Dashboard, DashboardHandle};
use logstream_dashboard::config::Config;
use logstream_dashboard::infra::{ReqwestLogQuery, TungsteniteConnector};
use logstream_dashboard::presentation::chart::render_volume_chart;
use logstream_dashboard::presentation::format::format_entry_line;
use logstream_dashboard::presentation::terminal::{
    redraw, terminal_width, ConsoleCommand, CONSOLE_HELP,
};
use logstream_dashboard::query::{build_query, Filter};
use logstream_dashboard::server::{start_server, AppState};
use logstream_dashboard::types::Level;
use logstream_dashboard::{logging, observability};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "logstream-dashboard")]
#[command(about = "Live log dashboard for the LogStream aggregation service")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (default: ./config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live terminal view; type commands on stdin to change the filter
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Run the dashboard behind the JSON API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Fetch /logs and /stats once and print them
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only entries from this service
    #[arg(long)]
    service: Option<String>,
    /// Only entries at this level (debug, info, warn, error)
    #[arg(long, value_parser = parse_level)]
    level: Option<Level>,
    /// Free-text search
    #[arg(long)]
    search: Option<String>,
    /// Relative window: entries from the last N minutes
    #[arg(long, conflicts_with_all = ["from", "until"])]
    since: Option<i64>,
    /// Start of the time window (RFC 3339)
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// End of the time window (RFC 3339)
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

#[derive(Args, Debug, Default)]
struct ModeArgs {
    /// Never open the push connection; poll only
    #[arg(long)]
    no_stream: bool,
    /// Start paused
    #[arg(long)]
    paused: bool,
}

fn parse_level(raw: &str) -> Result<Level, String> {
    match Level::parse(raw) {
        Level::Unknown => Err(format!("unknown level '{raw}'")),
        level => Ok(level),
    }
}

impl FilterArgs {
    fn into_filter(self) -> anyhow::Result<Filter> {
        let mut filter = Filter {
            service: self.service,
            level: self.level,
            search: self.search,
            time_range: None,
        };
        if let Some(minutes) = self.since {
            if minutes <= 0 {
                bail!("--since must be a positive number of minutes");
            }
            filter = filter.with_time_range(Some(Utc::now() - ChronoDuration::minutes(minutes)), None);
        } else if self.from.is_some() || self.until.is_some() {
            if let (Some(from), Some(until)) = (self.from, self.until) {
                if from > until {
                    bail!("--from must not be later than --until");
                }
            }
            filter = filter.with_time_range(self.from, self.until);
        }
        Ok(filter)
    }
}

fn spawn_dashboard(
    config: &Config,
    filter: Filter,
    mode: &ModeArgs,
) -> anyhow::Result<(DashboardHandle, tokio::task::JoinHandle<()>)> {
    let mut config = config.clone();
    if mode.no_stream {
        config.stream.enabled = false;
    }
    let query = ReqwestLogQuery::new(&config.backend.api_url, config.poll.request_timeout())
        .context("building HTTP client")?;
    let connector = TungsteniteConnector::new(config.backend.ws_url.clone());
    let dashboard = Dashboard::new(&config, Arc::new(query), Arc::new(connector));
    Ok(dashboard.spawn(filter, !mode.paused))
}

async fn run_watch(config: &Config, filter: Filter, mode: ModeArgs) -> anyhow::Result<()> {
    let (handle, task) = spawn_dashboard(config, filter, &mode)?;
    let mut snapshots = handle.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let width = terminal_width();
    let mut stdin_open = true;

    eprintln!("{}", CONSOLE_HELP);
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = redraw(&snapshots.borrow_and_update(), width);
                print!("{}", frame);
            }
            line = stdin.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Quit) => break,
                    Some(ConsoleCommand::Live) => handle.set_live(true)?,
                    Some(ConsoleCommand::Pause) => handle.set_live(false)?,
                    Some(command) => {
                        let current = handle.latest().filter;
                        if let Some(next) = command.apply(&current) {
                            handle.set_filter(next)?;
                        }
                    }
                    None => eprintln!("{}", CONSOLE_HELP),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    let _ = task.await;
    Ok(())
}

async fn run_serve(
    config: &Config,
    port: Option<u16>,
    filter: Filter,
    mode: ModeArgs,
) -> anyhow::Result<()> {
    let (handle, task) = spawn_dashboard(config, filter, &mode)?;
    let port = port.unwrap_or(config.server.port);
    let state = AppState::new(handle.clone());

    tokio::select! {
        result = start_server(state, port) => result.context("HTTP server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    handle.shutdown();
    let _ = task.await;
    Ok(())
}

async fn run_query(config: &Config, filter: Filter) -> anyhow::Result<()> {
    let port = ReqwestLogQuery::new(&config.backend.api_url, config.poll.request_timeout())
        .context("building HTTP client")?;
    let channel = PollChannel::new(Arc::new(port), config.poll.request_timeout());
    let query = build_query(&filter);
    let width = terminal_width();

    let (logs, stats) = tokio::join!(channel.fetch_logs(&query), channel.fetch_stats(&query));

    match stats {
        Ok(stats) => {
            for row in render_volume_chart(&stats, 10, width / 2) {
                println!("{}", row);
            }
        }
        Err(e) => warn!("Could not load volume: {}", e),
    }
    println!();

    let logs = logs.context("fetching logs")?;
    if logs.is_empty() {
        println!("No logs found");
    }
    for entry in &logs {
        println!("{}", format_entry_line(entry, width));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();
    observability::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Watch { filter, mode } => run_watch(&config, filter.into_filter()?, mode).await,
        Commands::Serve { port, filter, mode } => {
            run_serve(&config, port, filter.into_filter()?, mode).await
        }
        Commands::Query { filter } => run_query(&config, filter.into_filter()?).await,
    }
}
