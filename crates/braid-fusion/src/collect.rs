//! Match collection: fan a request out to every operand and regroup the
//! answers by query index.

use braid_core::{Document, FusionError, Operand, Request};
use anyhow::Result;
use tracing::trace;

/// One document as returned by one operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Index of the producing operand within its composition.
    pub operand: usize,
    /// 0-based position within that operand's list for this query.
    pub rank: usize,
    pub document: Document,
}

/// Per-query concatenation of every operand's results, in operand order and
/// then in each operand's own order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Match {
    queries: Vec<Vec<Hit>>,
}

impl Match {
    #[must_use]
    pub fn with_queries(count: usize) -> Self {
        Self {
            queries: vec![Vec::new(); count],
        }
    }

    /// Append `operand`'s answer for each query.
    pub fn extend(&mut self, operand: usize, results: Vec<Vec<Document>>) {
        for (hits, documents) in self.queries.iter_mut().zip(results) {
            hits.extend(
                documents
                    .into_iter()
                    .enumerate()
                    .map(|(rank, document)| Hit {
                        operand,
                        rank,
                        document,
                    }),
            );
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    #[must_use]
    pub fn hits(&self, query: usize) -> &[Hit] {
        self.queries.get(query).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Hit]> {
        self.queries.iter().map(Vec::as_slice)
    }
}

/// Call every operand with `request` and group the results per query.
///
/// Operands with nothing to say for the whole batch are skipped. Operand
/// errors abort the collection unchanged.
///
/// # Errors
///
/// Any operand error, or [`FusionError::MisalignedBatch`] when an operand
/// answers with the wrong number of result lists.
pub fn collect<O: Operand>(operands: &[O], request: &Request) -> Result<Match> {
    let mut matched = Match::with_queries(request.len());

    for (index, operand) in operands.iter().enumerate() {
        let results = operand.call(request)?;
        if results.iter().all(Vec::is_empty) {
            trace!(operand = operand.name(), "no results for batch; skipped");
            continue;
        }
        if results.len() != request.len() {
            return Err(FusionError::MisalignedBatch {
                operand: operand.name().to_string(),
                expected: request.len(),
                actual: results.len(),
            }
            .into());
        }
        trace!(
            operand = operand.name(),
            hits = results.iter().map(Vec::len).sum::<usize>(),
            "collected"
        );
        matched.extend(index, results);
    }

    Ok(matched)
}
