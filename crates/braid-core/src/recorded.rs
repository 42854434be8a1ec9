//! An operand that replays previously recorded result lists.
//!
//! `Recorded` answers text queries from a fixed table of ranked documents,
//! which is how externally produced runs (a BM25 dump, an ANN export) enter a
//! fusion. Two behaviours make it a usable stand-in for a live model:
//!
//! - with a [`DocumentStore`] attached, only documents present in the store
//!   are returned, so `add`/`reset` change what it retrieves;
//! - when the request carries candidates for a query, results are limited to
//!   those candidates, which makes it act as a re-ranker inside a pipeline.

use crate::document::{Document, Key};
use crate::error::FusionError;
use crate::operand::{Indexable, Operand, OperandId, Resettable, StoreHandle, Visited};
use crate::query::{Request, Results};
use crate::store::DocumentStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::trace;

/// Serialized form of a recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRun {
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    #[serde(default)]
    pub results: BTreeMap<String, Vec<Document>>,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    id: OperandId,
    name: String,
    key: String,
    results: HashMap<String, Vec<Document>>,
    store: Option<DocumentStore>,
}

impl Recorded {
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: OperandId::next(),
            name: name.into(),
            key: key.into(),
            results: HashMap::new(),
            store: None,
        }
    }

    /// Build from a serialized run, validating every document's key.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] for a document without the run's
    /// key field.
    pub fn from_run(run: RecordedRun, fallback_name: &str) -> Result<Self, FusionError> {
        let mut recorded = Self::new(run.name.as_deref().unwrap_or(fallback_name), run.key);
        for (query, documents) in run.results {
            recorded.record(query, documents)?;
        }
        Ok(recorded)
    }

    /// Restrict results to documents held by `store`.
    #[must_use]
    pub fn with_store(mut self, store: DocumentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Record the ranked answer for `query`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] when a document lacks the key field.
    pub fn record(
        &mut self,
        query: impl Into<String>,
        documents: Vec<Document>,
    ) -> Result<&mut Self, FusionError> {
        for document in &documents {
            document.require_key(&self.key, &self.name)?;
        }
        self.results.insert(query.into(), documents);
        Ok(self)
    }

    /// Builder form of [`Recorded::record`].
    ///
    /// # Errors
    ///
    /// Same as [`Recorded::record`].
    pub fn with_results(
        mut self,
        query: impl Into<String>,
        documents: Vec<Document>,
    ) -> Result<Self, FusionError> {
        self.record(query, documents)?;
        Ok(self)
    }

    fn answer(&self, request: &Request, index: usize) -> Result<Vec<Document>> {
        let Some(recorded) = request.queries[index]
            .as_text()
            .and_then(|text| self.results.get(text))
        else {
            return Ok(Vec::new());
        };

        let allowed: Option<HashSet<Key>> = match request.candidates(index) {
            Some(candidates) => Some(
                candidates
                    .iter()
                    .map(|candidate| candidate.require_key(&self.key, "candidate set"))
                    .collect::<Result<_, _>>()?,
            ),
            None => None,
        };

        let mut out = Vec::with_capacity(recorded.len());
        for document in recorded {
            if request.k.is_some_and(|k| out.len() >= k) {
                break;
            }
            let key = document.require_key(&self.key, &self.name)?;
            if let Some(store) = &self.store
                && !store.contains(&key)
            {
                continue;
            }
            if let Some(allowed) = &allowed
                && !allowed.contains(&key)
            {
                continue;
            }
            out.push(document.clone());
        }
        Ok(out)
    }
}

impl Operand for Recorded {
    fn id(&self) -> OperandId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn call(&self, request: &Request) -> Result<Results> {
        let results = (0..request.len())
            .map(|index| self.answer(request, index))
            .collect::<Result<Results>>()?;
        trace!(
            operand = %self.name,
            hits = results.iter().map(Vec::len).sum::<usize>(),
            "recorded answers"
        );
        Ok(results)
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        self.store.as_ref().map(|_| self as &dyn Indexable)
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        self.store.as_ref().map(|_| self as &dyn Resettable)
    }

    fn store(&self) -> Option<StoreHandle> {
        self.store.as_ref().map(DocumentStore::handle)
    }
}

impl Indexable for Recorded {
    fn index(&self, documents: &[Document], _visited: &mut Visited) -> Result<()> {
        if let Some(store) = &self.store {
            let size = store.extend(documents)?;
            trace!(operand = %self.name, size, "indexed into store");
        }
        Ok(())
    }
}

impl Resettable for Recorded {
    fn clear(&self, _visited: &mut Visited) -> Result<()> {
        if let Some(store) = &self.store {
            store.clear();
        }
        Ok(())
    }
}
