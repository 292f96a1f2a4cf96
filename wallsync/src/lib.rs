//! Synchronized playback for a wall of independently clocked display nodes.
//!
//! The [`Coordinator`] publishes a clock service, periodically announces where
//! to find it, broadcasts play commands carrying an absolute start time, and
//! tracks which nodes are alive from their heartbeats.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod messages;
pub mod registry;
pub mod transport;

pub use catalog::{DirCatalog, MediaCatalog};
pub use clock::{ClockSource, Decoder, ScheduledDecoder};
pub use config::WallConfig;
pub use coordinator::Coordinator;
pub use error::{Result, WallError};
pub use messages::{ClientConfig, DiscoveryMessage, HeartbeatMessage, PlayCommandMessage};
pub use registry::{ClientRecord, ClientRegistry};
pub use transport::BroadcastTransport;
