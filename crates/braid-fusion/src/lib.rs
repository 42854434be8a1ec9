#![forbid(unsafe_code)]
//! braid-fusion library.
//!
//! Composition of ranked retrievers: sequential pipelines with document-map
//! enrichment, and set fusion (union, intersection, vote) over documents
//! identified by a shared key field.
//!
//! ```no_run
//! use braid_core::{Document, Recorded, Search, SearchOptions};
//! use braid_fusion::union_of;
//!
//! # fn main() -> anyhow::Result<()> {
//! let bm25 = Recorded::new("bm25", "id")
//!     .with_results("rust", vec![Document::new().with("id", 0), Document::new().with("id", 1)])?;
//! let dense = Recorded::new("dense", "id")
//!     .with_results("rust", vec![Document::new().with("id", 1)])?;
//!
//! let fused = union_of(bm25, dense)?;
//! let ranked = fused.search("rust", SearchOptions::new().k(10))?;
//! # let _ = ranked;
//! # Ok(())
//! # }
//! ```
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types; graph-building
//!   problems are `braid_core::FusionError` values returned at construction.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod aggregate;
pub mod collect;
pub mod node;
pub mod pipeline;
pub mod strategy;

pub use aggregate::{Entry, ScoreTable, reciprocal_rank};
pub use collect::{Hit, Match, collect};
pub use node::{Fusion, Node, intersection_of, sequence, union_of, vote_of};
pub use pipeline::{DocumentMap, Pipeline};
pub use strategy::{Strategy, rank_intersection, rank_union, rank_vote};
