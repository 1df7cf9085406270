//! Admission policy and command bot for a relay that stores one GM note per
//! author per day.

pub mod admission;
pub mod command;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod keys;
pub mod keyword;
pub mod logging;
pub mod publish;
pub mod query;
pub mod recent;
pub mod relay;
pub mod stats;
pub mod store;
pub mod tags;
pub mod transport;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionPolicy, Decision, Rejection};
pub use command::{CommandKind, CommandParser};
pub use config::{BotConfig, CommandKeywords, ConfigError};
pub use dispatch::{Dispatcher, Outcome};
pub use error::{Error, Result};
pub use guard::DedupGuard;
pub use publish::{PublishReport, ReplyPublisher};
pub use relay::{PolicyResult, StorePipeline, WritePolicy};
pub use stats::StatsEngine;
pub use store::{EventStore, MemoryStore, NdbStore, StoreError};
pub use transport::{PoolRelaySet, RelaySet, TransportError};
pub use window::DailyWindow;
