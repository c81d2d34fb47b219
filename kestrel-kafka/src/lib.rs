//! rdkafka-backed broker sessions for Kestrel.
//!
//! Implements the session traits of `kestrel-console` on top of librdkafka:
//!
//! - [`KafkaConsumer`]: group-less consumer with manual assignment.
//! - [`KafkaAdmin`]: group listing, description and offset commits.
//! - [`KafkaProducer`]: idempotent producer for single records.
//!
//! [`KafkaSessionFactory`] opens a fresh client for every call; clients are
//! destroyed when the session is dropped.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_console::{Console, ConsoleSettings, StaticClusterRegistry};
//! use kestrel_kafka::{KafkaClientConfig, KafkaSessionFactory};
//!
//! let factory = KafkaSessionFactory::new(KafkaClientConfig::default())?;
//! let console = Console::new(factory, registry, ConsoleSettings::default());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Allow these for cleaner code in this crate.
#![allow(clippy::module_name_repetitions)]

mod admin;
mod config;
mod consumer;
mod factory;
mod producer;

// Re-export public API.
pub use admin::KafkaAdmin;
pub use config::{KafkaClientConfig, SecurityConfig};
pub use consumer::KafkaConsumer;
pub use factory::KafkaSessionFactory;
pub use producer::KafkaProducer;
