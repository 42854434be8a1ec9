//! Query normalization.
//!
//! Callers hand in either one query or a batch, optionally with candidate
//! documents. [`Request::normalize`] turns that into the canonical batched
//! form every operand receives: `queries` is always a list and `documents`,
//! when present, holds one candidate set per query. Wrapping is the only
//! transformation; nothing is filtered or truncated here.
//!
//! [`Ranked`] carries results back out, restoring the caller's shape.

use crate::document::Document;
use crate::error::FusionError;
use serde::{Deserialize, Serialize};

/// One query input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Text(String),
    Vector(Vec<f32>),
    Documents(Vec<Document>),
}

impl Query {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Vector(_) | Self::Documents(_) => None,
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<f32>> for Query {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector)
    }
}

/// A single query or an ordered batch, as the caller supplied it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Single(Query),
    Batch(Vec<Query>),
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        Self::Single(query)
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        Self::Single(text.into())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        Self::Single(text.into())
    }
}

impl From<Vec<f32>> for QueryInput {
    fn from(vector: Vec<f32>) -> Self {
        Self::Single(vector.into())
    }
}

impl From<Vec<Query>> for QueryInput {
    fn from(queries: Vec<Query>) -> Self {
        Self::Batch(queries)
    }
}

impl From<Vec<&str>> for QueryInput {
    fn from(texts: Vec<&str>) -> Self {
        Self::Batch(texts.into_iter().map(Query::from).collect())
    }
}

impl From<Vec<String>> for QueryInput {
    fn from(texts: Vec<String>) -> Self {
        Self::Batch(texts.into_iter().map(Query::from).collect())
    }
}

impl From<&[&str]> for QueryInput {
    fn from(texts: &[&str]) -> Self {
        Self::Batch(texts.iter().map(|text| Query::from(*text)).collect())
    }
}

/// Candidate documents supplied alongside the query.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidates {
    /// One set shared by every query in the batch.
    Shared(Vec<Document>),
    /// One set per query, in query order.
    PerQuery(Vec<Vec<Document>>),
}

/// Per-call options. Absent values mean "unbounded" (`k`) or "operand
/// default" (`batch_size`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub k: Option<usize>,
    pub batch_size: Option<usize>,
    pub documents: Option<Candidates>,
}

impl SearchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn documents(mut self, documents: Candidates) -> Self {
        self.documents = Some(documents);
        self
    }
}

/// Canonical batched request handed to every operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub queries: Vec<Query>,
    pub k: Option<usize>,
    pub batch_size: Option<usize>,
    /// One candidate set per query when present.
    pub documents: Option<Vec<Vec<Document>>>,
    batched: bool,
}

impl Request {
    /// Wrap `q` and its options into the canonical batched form.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MisalignedCandidates`] when per-query candidates
    /// do not line up with the batch.
    pub fn normalize(
        q: impl Into<QueryInput>,
        options: SearchOptions,
    ) -> Result<Self, FusionError> {
        let (queries, batched) = match q.into() {
            QueryInput::Single(query) => (vec![query], false),
            QueryInput::Batch(queries) => (queries, true),
        };

        let documents = match options.documents {
            None => None,
            Some(Candidates::Shared(set)) => Some(vec![set; queries.len()]),
            Some(Candidates::PerQuery(sets)) => {
                if sets.len() != queries.len() {
                    return Err(FusionError::MisalignedCandidates {
                        expected: queries.len(),
                        actual: sets.len(),
                    });
                }
                Some(sets)
            }
        };

        Ok(Self {
            queries,
            k: options.k,
            batch_size: options.batch_size,
            documents,
            batched,
        })
    }

    /// Whether the caller supplied a batch (as opposed to a single query).
    #[must_use]
    pub const fn is_batched(&self) -> bool {
        self.batched
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Candidate set for query `index`, if candidates were supplied.
    #[must_use]
    pub fn candidates(&self, index: usize) -> Option<&[Document]> {
        self.documents
            .as_ref()
            .and_then(|sets| sets.get(index))
            .map(Vec::as_slice)
    }

    /// Same queries and limits with a different candidate set. Used to thread
    /// results from one pipeline stage into the next.
    #[must_use]
    pub fn with_documents(&self, documents: Option<Vec<Vec<Document>>>) -> Self {
        Self {
            queries: self.queries.clone(),
            k: self.k,
            batch_size: self.batch_size,
            documents,
            batched: self.batched,
        }
    }

    /// Same queries and candidates without a cutoff.
    #[must_use]
    pub fn unbounded(&self) -> Self {
        Self {
            k: None,
            ..self.clone()
        }
    }

    /// Empty result lists aligned with this request.
    #[must_use]
    pub fn empty_results(&self) -> Results {
        vec![Vec::new(); self.queries.len()]
    }
}

/// Batched operand output: one document list per query, in query order.
pub type Results = Vec<Vec<Document>>;

/// Results in the shape the caller asked with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Ranked {
    Single(Vec<Document>),
    Batch(Vec<Vec<Document>>),
}

impl Ranked {
    /// Unwrap the one-element outer list when the request was not batched.
    #[must_use]
    pub fn from_results(mut results: Results, batched: bool) -> Self {
        if batched {
            Self::Batch(results)
        } else {
            Self::Single(results.pop().unwrap_or_default())
        }
    }

    #[must_use]
    pub fn into_results(self) -> Results {
        match self {
            Self::Single(documents) => vec![documents],
            Self::Batch(results) => results,
        }
    }

    /// The single result list, if this came from a single query.
    #[must_use]
    pub fn as_single(&self) -> Option<&[Document]> {
        match self {
            Self::Single(documents) => Some(documents),
            Self::Batch(_) => None,
        }
    }

    #[must_use]
    pub fn as_batch(&self) -> Option<&[Vec<Document>]> {
        match self {
            Self::Single(_) => None,
            Self::Batch(results) => Some(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64) -> Document {
        Document::new().with("id", id)
    }

    #[test]
    fn single_query_is_wrapped() {
        let request = Request::normalize("x", SearchOptions::new().k(3)).expect("normalize");
        assert_eq!(request.queries, vec![Query::from("x")]);
        assert!(!request.is_batched());
        assert_eq!(request.k, Some(3));
        assert_eq!(request.batch_size, None);
        assert!(request.documents.is_none());
    }

    #[test]
    fn batch_keeps_order() {
        let request =
            Request::normalize(vec!["a", "b", "c"], SearchOptions::new()).expect("normalize");
        assert!(request.is_batched());
        let texts: Vec<_> = request.queries.iter().filter_map(Query::as_text).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn shared_candidates_align_with_batch() {
        let options = SearchOptions::new().documents(Candidates::Shared(vec![doc(1), doc(2)]));
        let request = Request::normalize(vec!["a", "b"], options).expect("normalize");
        assert_eq!(request.candidates(0), Some([doc(1), doc(2)].as_slice()));
        assert_eq!(request.candidates(1), Some([doc(1), doc(2)].as_slice()));
    }

    #[test]
    fn per_query_candidates_must_match_batch_size() {
        let options = SearchOptions::new().documents(Candidates::PerQuery(vec![vec![doc(1)]]));
        let err = Request::normalize(vec!["a", "b"], options).expect_err("misaligned");
        assert_eq!(
            err,
            FusionError::MisalignedCandidates {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn candidates_are_not_filtered_or_truncated() {
        let set = vec![doc(1), doc(1), doc(2)];
        let options = SearchOptions::new()
            .k(1)
            .documents(Candidates::Shared(set.clone()));
        let request = Request::normalize("q", options).expect("normalize");
        assert_eq!(request.candidates(0), Some(set.as_slice()));
    }

    #[test]
    fn unbounded_drops_only_the_cutoff() {
        let options = SearchOptions::new()
            .k(3)
            .batch_size(8)
            .documents(Candidates::Shared(vec![doc(1)]));
        let request = Request::normalize(vec!["a"], options).expect("normalize");
        let unbounded = request.unbounded();
        assert_eq!(unbounded.k, None);
        assert_eq!(unbounded.batch_size, Some(8));
        assert_eq!(unbounded.documents, request.documents);
        assert!(unbounded.is_batched());
    }

    #[test]
    fn empty_batch_is_not_an_error() {
        let request = Request::normalize(Vec::<Query>::new(), SearchOptions::new())
            .expect("normalize");
        assert!(request.is_empty());
        assert!(request.empty_results().is_empty());
    }

    #[test]
    fn ranked_unwraps_single_queries() {
        let ranked = Ranked::from_results(vec![vec![doc(1)]], false);
        assert_eq!(ranked.as_single(), Some([doc(1)].as_slice()));

        let ranked = Ranked::from_results(vec![vec![doc(1)], vec![]], true);
        assert_eq!(ranked.as_batch().map(<[_]>::len), Some(2));
    }
}
