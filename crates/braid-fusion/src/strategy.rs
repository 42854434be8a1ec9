//! Rank strategies: turn a collected [`Match`] into fused, deduplicated,
//! truncated result lists.
//!
//! | Strategy     | Keeps                              | Scored by                      |
//! |--------------|------------------------------------|--------------------------------|
//! | Union        | every distinct key                 | reciprocal rank × count        |
//! | Intersection | keys returned by every operand     | reciprocal rank × count        |
//! | Vote         | every distinct key                 | softmax, else rank × count     |
//!
//! All three order by descending fused score with ties in first-seen order,
//! write the fused score into `similarity`, and cut to `k` only after the
//! full ranking.

use crate::aggregate::{Entry, ScoreTable};
use crate::collect::Match;
use anyhow::Result;
use braid_core::{Document, Results, VoteScoring};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fusion policy selected when a composition node is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Union,
    Intersection,
    Vote { scoring: VoteScoring },
}

impl Strategy {
    #[must_use]
    pub const fn vote() -> Self {
        Self::Vote {
            scoring: VoteScoring::Softmax,
        }
    }

    #[must_use]
    pub const fn family(self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::Intersection => "intersection",
            Self::Vote { .. } => "vote",
        }
    }

    /// Fuse `matched` under this strategy.
    ///
    /// # Errors
    ///
    /// Returns [`braid_core::FusionError::MissingKey`] when a collected
    /// document lacks `key_field`.
    pub fn rank(
        self,
        matched: &Match,
        key_field: &str,
        operand_count: usize,
        k: Option<usize>,
    ) -> Result<Results> {
        match self {
            Self::Union => rank_union(matched, key_field, k),
            Self::Intersection => rank_intersection(matched, key_field, operand_count, k),
            Self::Vote { scoring } => rank_vote(matched, key_field, operand_count, scoring, k),
        }
    }
}

/// Every distinct key, ranked by reciprocal rank × count.
///
/// # Errors
///
/// Returns an error when a collected document lacks `key_field`.
pub fn rank_union(matched: &Match, key_field: &str, k: Option<usize>) -> Result<Results> {
    matched
        .iter()
        .map(|hits| -> Result<Vec<Document>> {
            let table = ScoreTable::reciprocal_rank(hits, key_field)?;
            Ok(emit(table.into_ranked(), k))
        })
        .collect()
}

/// Keys returned by every one of `operand_count` operands, ranked by
/// reciprocal rank × count.
///
/// # Errors
///
/// Returns an error when a collected document lacks `key_field`.
pub fn rank_intersection(
    matched: &Match,
    key_field: &str,
    operand_count: usize,
    k: Option<usize>,
) -> Result<Results> {
    matched
        .iter()
        .map(|hits| -> Result<Vec<Document>> {
            let table = ScoreTable::reciprocal_rank(hits, key_field)?;
            let before = table.len();
            let mut ranked = table.into_ranked();
            ranked.retain(|entry| entry.operand_count() == operand_count);
            debug!(
                candidates = before,
                kept = ranked.len(),
                operand_count,
                "intersection filter"
            );
            Ok(emit(ranked, k))
        })
        .collect()
}

/// Every distinct key ranked by vote. Softmax scoring applies per query when
/// every hit for that query carries a numeric similarity.
///
/// # Errors
///
/// Returns an error when a collected document lacks `key_field`.
pub fn rank_vote(
    matched: &Match,
    key_field: &str,
    operand_count: usize,
    scoring: VoteScoring,
    k: Option<usize>,
) -> Result<Results> {
    matched
        .iter()
        .map(|hits| -> Result<Vec<Document>> {
            let table = match scoring {
                VoteScoring::Rank => ScoreTable::reciprocal_rank(hits, key_field)?,
                VoteScoring::Softmax => {
                    if let Some(table) = ScoreTable::softmax(hits, key_field, operand_count)? {
                        table
                    } else {
                        debug!("unscored hits present; vote falls back to reciprocal rank");
                        ScoreTable::reciprocal_rank(hits, key_field)?
                    }
                }
            };
            Ok(emit(table.into_ranked(), k))
        })
        .collect()
}

fn emit(ranked: Vec<Entry>, k: Option<usize>) -> Vec<Document> {
    let limit = k.unwrap_or(usize::MAX);
    ranked
        .into_iter()
        .take(limit)
        .map(|entry| entry.document.with_similarity(entry.score))
        .collect()
}
