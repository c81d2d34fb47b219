//! Kestrel Core - Shared types and bounds for the Kestrel consumer console.
//!
//! This crate holds the vocabulary every other Kestrel crate speaks. It does
//! NOT talk to a broker; the wire client lives behind the session traits in
//! `kestrel-console` and is implemented by `kestrel-kafka`.
//!
//! # Contents
//!
//! - **Identifiers**: [`ClusterId`] and [`PartitionKey`]
//! - **Seek policies**: [`SeekPolicy`], validated from the loose request
//!   shape ([`Position`] plus optional offset/timestamp)
//! - **Records**: [`ConsumedRecord`] and [`RecordHeader`]
//! - **Offsets**: [`TailCursor`], [`GroupLagRow`], [`PartitionChange`]
//! - **Bounds**: [`Limits`] clamps every caller-supplied size and timeout
//! - **Errors**: [`ConsoleError`], the single taxonomy for console calls

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod limits;
mod offsets;
mod record;
mod types;

pub use error::{ConsoleError, ConsoleResult};
pub use limits::Limits;
pub use offsets::{CursorPosition, GroupLagRow, PartitionChange, TailCursor, UNKNOWN_OFFSET};
pub use record::{now_millis, ConsumedRecord, RecordHeader};
pub use types::{ClusterId, PartitionKey, Position, SeekPolicy};
