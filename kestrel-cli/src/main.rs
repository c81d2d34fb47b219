//! Kestrel consumer console.
//!
//! Reads, tails and publishes records, and inspects or resets consumer group
//! offsets, against the clusters listed in a TOML config file. Every command
//! prints its result as JSON on stdout; logs go to stderr.
//!
//! ```bash
//! kestrel --config kestrel.toml fetch --cluster prod --topic orders --position earliest
//! kestrel --config kestrel.toml tail --cluster prod --topic orders --follow
//! kestrel --config kestrel.toml groups reset --cluster-id 1 --group billing \
//!     --timestamp 1700000000000 --dry-run
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kestrel_console::{
    Console, FetchRequest, HeaderView, PublishRequest, ResetRequest, StaticClusterRegistry,
    TailRequest,
};
use kestrel_core::{ClusterId, Position, TailCursor};
use kestrel_kafka::KafkaSessionFactory;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::ConsoleConfig;

type KafkaConsole = Console<KafkaSessionFactory, StaticClusterRegistry>;

/// Kafka consumer console and offset management.
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file.
    /// If not specified, no clusters are registered.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a bounded batch of records.
    Fetch(FetchArgs),
    /// Read what arrived since the last call.
    Tail(TailArgs),
    /// Publish one record.
    Publish(PublishArgs),
    /// Consumer group commands.
    #[command(subcommand)]
    Groups(GroupsCommand),
}

/// Start position of a fetch.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PositionArg {
    /// Oldest retained record.
    Earliest,
    /// Only records written after the call starts.
    Latest,
    /// An explicit offset (`--offset`).
    Offset,
    /// First record at or after `--timestamp-ms`.
    Timestamp,
}

impl From<PositionArg> for Position {
    fn from(arg: PositionArg) -> Self {
        match arg {
            PositionArg::Earliest => Self::Earliest,
            PositionArg::Latest => Self::Latest,
            PositionArg::Offset => Self::Offset,
            PositionArg::Timestamp => Self::Timestamp,
        }
    }
}

#[derive(Args, Debug)]
struct TopicArgs {
    /// Cluster name.
    #[arg(long)]
    cluster: String,

    /// Topic name.
    #[arg(long)]
    topic: String,

    /// Partition to read. Can be specified multiple times; all if omitted.
    #[arg(long = "partition")]
    partitions: Vec<i32>,

    /// Maximum records to return.
    #[arg(long)]
    max_messages: Option<u32>,

    /// Per-poll timeout in milliseconds.
    #[arg(long)]
    poll_timeout_ms: Option<u32>,
}

impl TopicArgs {
    fn partitions(&self) -> Option<Vec<i32>> {
        (!self.partitions.is_empty()).then(|| self.partitions.clone())
    }
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    topic: TopicArgs,

    /// Where to start reading.
    #[arg(long, value_enum, default_value = "latest")]
    position: PositionArg,

    /// Start offset for `--position offset`.
    #[arg(long)]
    offset: Option<i64>,

    /// Start time in epoch milliseconds for `--position timestamp`.
    #[arg(long)]
    timestamp_ms: Option<i64>,
}

#[derive(Args, Debug)]
struct TailArgs {
    #[command(flatten)]
    topic: TopicArgs,

    /// Cursor returned by a previous call, as JSON.
    /// Example: `[{"partition":0,"offset":41}]`.
    #[arg(long, value_parser = parse_cursor)]
    cursor: Option<TailCursor>,

    /// Leave record headers out.
    #[arg(long)]
    no_headers: bool,

    /// Leave record keys out.
    #[arg(long)]
    no_key: bool,

    /// Keep tailing until interrupted, feeding each cursor into the next call.
    #[arg(long)]
    follow: bool,

    /// Pause between calls with `--follow`, in milliseconds.
    #[arg(long, default_value = "1000")]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Cluster name.
    #[arg(long)]
    cluster: String,

    /// Topic name.
    #[arg(long)]
    topic: String,

    /// Record key.
    #[arg(long)]
    key: Option<String>,

    /// Record payload.
    #[arg(long)]
    payload: String,

    /// Header in format `key=value`. Can be specified multiple times.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<HeaderView>,
}

#[derive(Subcommand, Debug)]
enum GroupsCommand {
    /// List consumer groups with their total lag.
    List {
        /// Cluster ID.
        #[arg(long)]
        cluster_id: u64,
    },
    /// Show one group's state, members and per-partition lag.
    Describe {
        /// Cluster ID.
        #[arg(long)]
        cluster_id: u64,

        /// Group ID.
        #[arg(long)]
        group: String,
    },
    /// Reset a group's committed offsets to a timestamp.
    Reset(ResetArgs),
}

#[derive(Args, Debug)]
struct ResetArgs {
    /// Cluster ID.
    #[arg(long)]
    cluster_id: u64,

    /// Group ID.
    #[arg(long)]
    group: String,

    /// Target time in epoch milliseconds.
    #[arg(long)]
    timestamp: i64,

    /// Leave partitions without a record after the timestamp unchanged
    /// instead of moving them to the earliest offset.
    #[arg(long)]
    no_fallback: bool,

    /// Compute the plan without committing.
    #[arg(long)]
    dry_run: bool,

    /// Reset even if the group has live members.
    #[arg(long)]
    allow_active: bool,
}

/// Parses a cursor given as a JSON array of `{partition, offset}`.
fn parse_cursor(s: &str) -> Result<TailCursor, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid cursor '{s}': {e}"))
}

/// Parses a header in format `key=value`.
fn parse_header(s: &str) -> Result<HeaderView, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid header '{s}', expected 'key=value'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in header '{s}'"));
    }

    Ok(HeaderView {
        key: key.trim().to_string(),
        value: value.to_string(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn fetch(console: &KafkaConsole, args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let response = console
        .fetch(FetchRequest {
            partitions: args.topic.partitions(),
            cluster_name: args.topic.cluster,
            topic_name: args.topic.topic,
            position: Some(args.position.into()),
            offset: args.offset,
            timestamp_ms: args.timestamp_ms,
            max_messages: args.topic.max_messages,
            poll_timeout_ms: args.topic.poll_timeout_ms,
        })
        .await?;
    print_json(&response)?;
    Ok(())
}

async fn tail(console: &KafkaConsole, args: TailArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = TailRequest {
        partitions: args.topic.partitions(),
        cluster_name: args.topic.cluster,
        topic_name: args.topic.topic,
        poll_timeout_ms: args.topic.poll_timeout_ms,
        max_messages: args.topic.max_messages,
        last_seen: args.cursor,
        include_headers: !args.no_headers,
        include_key: !args.no_key,
    };
    let interval = Duration::from_millis(args.interval_ms);

    loop {
        let response = console.tail(request.clone()).await?;
        print_json(&response)?;
        if !args.follow {
            return Ok(());
        }

        if let Some(cursor) = response.next_cursor {
            let echoed = serde_json::to_string(&cursor)?;
            info!(cursor = %echoed, "Next cursor");
            request.last_seen = Some(cursor);
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
        }
    }
}

async fn publish(
    console: &KafkaConsole,
    args: PublishArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let receipt = console
        .publish(PublishRequest {
            cluster_name: args.cluster,
            topic_name: args.topic,
            key: args.key,
            payload: args.payload,
            headers: args.headers,
        })
        .await?;
    print_json(&receipt)?;
    Ok(())
}

async fn groups(
    console: &KafkaConsole,
    command: GroupsCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        GroupsCommand::List { cluster_id } => {
            let groups = console.list_groups(ClusterId::new(cluster_id)).await?;
            print_json(&groups)?;
        }
        GroupsCommand::Describe { cluster_id, group } => {
            let detail = console.group_detail(ClusterId::new(cluster_id), &group).await?;
            print_json(&detail)?;
        }
        GroupsCommand::Reset(args) => {
            let response = console
                .reset_offsets(ResetRequest {
                    cluster_id: ClusterId::new(args.cluster_id),
                    group_id: args.group,
                    timestamp: args.timestamp,
                    fallback_to_earliest: !args.no_fallback,
                    dry_run: args.dry_run,
                    require_inactive_group: !args.allow_active,
                })
                .await?;
            print_json(&response)?;
            if let Some(error) = response.error {
                return Err(error.into());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => ConsoleConfig::from_file(path)?,
        None => ConsoleConfig::default(),
    };
    info!(
        config = ?cli.config,
        clusters = config.clusters.len(),
        protocol = %config.security.protocol,
        "Loaded configuration"
    );

    let factory = KafkaSessionFactory::new(config.client_config())?;
    let console = Console::new(factory, config.registry(), config.console_settings());

    match cli.command {
        Command::Fetch(args) => fetch(&console, args).await,
        Command::Tail(args) => tail(&console, args).await,
        Command::Publish(args) => publish(&console, args).await,
        Command::Groups(command) => groups(&console, command).await,
    }
}
