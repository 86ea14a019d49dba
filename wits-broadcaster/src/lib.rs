//! Periodic WITS0 broadcaster
//!
//! This crate simulates a WITS0 (ASCII) telemetry source. It listens on a TCP
//! port, accepts a single client and sends it synthetically generated record
//! blocks at a fixed cadence.
//!
//! # Components
//!
//! - [`WitsGenerator`] - formats `&&` ... `!!` record blocks
//! - [`ChannelTable`] - per-channel value generators (WITS0 record 01 layout)
//! - [`TcpSession`] - listening socket plus at most one connected client
//! - [`WitsServer`] - generate → write → sleep loop with prompt cancellation
//!
//! # Wire format
//!
//! ```text
//! &&
//! 101GeneratedWell
//! 1021
//! 103GeneralRecord
//! 104Empty
//! 105<YYYYMMDD>
//! 106<HHMMSS>
//! 10701
//! 108<value>
//! ...
//! !!
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use wits_broadcaster::{BroadcastConfig, TcpSession, WitsGenerator, WitsServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BroadcastConfig::new(4000, 1000, 1, 12)?;
//!     let session = Arc::new(TcpSession::new(config.port()));
//!     let server = Arc::new(WitsServer::new(session, WitsGenerator::default(), config));
//!
//!     let runner = Arc::clone(&server);
//!     let run = tokio::spawn(async move { runner.start().await });
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     run.await??;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod channels;
pub mod config;
pub mod error;
pub mod record;
pub mod session;
mod shutdown;

// Re-exports
pub use broadcaster::{RunOutcome, WitsServer};
pub use channels::{ChannelSpec, ChannelTable, ValueKind};
pub use config::BroadcastConfig;
pub use error::{BroadcasterError, Result};
pub use record::WitsGenerator;
pub use session::{Session, TcpSession};
