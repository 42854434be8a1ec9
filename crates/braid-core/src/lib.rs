#![forbid(unsafe_code)]
//! braid-core library.
//!
//! Documents, keys, query normalization and the operand contract shared by
//! every fusion stage.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for call paths; contract and
//!   configuration problems are [`FusionError`] values.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod document;
pub mod error;
pub mod operand;
pub mod query;
pub mod recorded;
pub mod store;

pub use config::VoteScoring;
pub use document::{Document, Key, SIMILARITY};
pub use error::{ErrorCode, FusionError};
pub use operand::{
    Indexable, Operand, OperandId, Resettable, Search, StoreHandle, Visited, index_operand,
    reset_operand,
};
pub use query::{Candidates, Query, QueryInput, Ranked, Request, Results, SearchOptions};
pub use recorded::{Recorded, RecordedRun};
pub use store::DocumentStore;
