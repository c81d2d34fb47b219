//! Consumer console and offset management engine for Kafka clusters.
//!
//! This crate is the core of Kestrel. It reads records, tails topics, reports
//! consumer group lag and resets committed offsets, all against short-lived
//! broker sessions opened per call.
//!
//! # Overview
//!
//! - **Partition resolution**: a topic's partitions, or a validated subset.
//! - **Seek planning**: one start position per partition from a
//!   [`SeekPolicy`](kestrel_core::SeekPolicy).
//! - **Bounded fetch**: poll until the record target, an empty poll, or the
//!   wall-clock budget, whichever comes first.
//! - **Tail**: exactly one poll per call, resumable with a caller-held
//!   [`TailCursor`](kestrel_core::TailCursor).
//! - **Lag**: committed versus latest offsets per group partition.
//! - **Offset reset**: plan new committed offsets from a timestamp and apply
//!   them in one call, or report the plan as a dry run.
//!
//! # Sessions
//!
//! The engine never talks to a broker directly. It is written against the
//! [`ConsumerSession`], [`AdminSession`] and [`ProducerSession`] traits and
//! gets sessions from a [`SessionFactory`]. `kestrel-kafka` provides the
//! rdkafka-backed factory.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_console::{Console, ConsoleSettings, FetchRequest, StaticClusterRegistry};
//!
//! let console = Console::new(factory, registry, ConsoleSettings::default());
//! let response = console.fetch(FetchRequest {
//!     cluster_name: "prod".to_string(),
//!     topic_name: "orders".to_string(),
//!     ..FetchRequest::default()
//! }).await?;
//! ```
//!
//! # Testing
//!
//! [`SimulatedCluster`] is an in-memory broker implementing every session
//! trait, with one-shot forced failures and offset lookup overrides:
//!
//! ```ignore
//! use kestrel_console::SimulatedCluster;
//!
//! let cluster = SimulatedCluster::new();
//! cluster.create_topic("orders", 3);
//! cluster.fail_next("poll");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Allow these for cleaner code in this crate.
#![allow(clippy::module_name_repetitions)]

mod api;
mod cluster;
mod console;
mod fetch;
mod lag;
mod partitions;
mod publish;
mod reset;
mod seek;
mod session;
mod simulated;
mod tail;

// Re-export public API.
pub use api::{
    required, FetchRequest, FetchResponse, HeaderView, PublishRequest, PublishResponse,
    RecordView, ResetRequest, ResetResponse, TailRecordView, TailRequest, TailResponse,
};
pub use cluster::{BootstrapResolver, ClusterDirectory, ClusterEntry, StaticClusterRegistry};
pub use console::{Console, ConsoleSettings};
pub use fetch::{fetch_records, FetchExit, FetchOptions};
pub use lag::{
    compute_lag, describe_group_detail, require_group, summarize_groups, GroupDetail, GroupLag,
    GroupSummary,
};
pub use partitions::{resolve_partitions, select_partitions};
pub use publish::{publish_record, PublishReceipt};
pub use reset::{reset_offsets, ResetOptions, ResetPlan, ResetReport};
pub use seek::{plan_seek, SeekPlan, StartOffset};
pub use session::{
    AdminSession, ConsumerSession, DeliveryReport, GroupDescription, GroupMember, GroupState,
    ListedOffset, ListedOffsets, OffsetSpec, OutgoingRecord, ProducerSession, SessionFactory,
    SessionSettings,
};
pub use simulated::{SimulatedAdmin, SimulatedCluster, SimulatedConsumer, SimulatedProducer};
pub use tail::{tail_once, TailBatch, TailOptions};
