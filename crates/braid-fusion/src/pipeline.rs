//! Sequential pipelines and document-map stages.
//!
//! A pipeline threads a running document set through its stages: each stage
//! is called with the original queries and the previous stage's output as
//! its candidates, and its answer becomes the next stage's input. `k` and
//! `batch_size` are forwarded to every stage unchanged.
//!
//! A [`DocumentMap`] stage swaps key-only (or partial) results for the full
//! stored record, keeping the key and the carried `similarity`.

use crate::node::Node;
use anyhow::Result;
use braid_core::{
    Document, DocumentStore, FusionError, Indexable, Operand, OperandId, Request, Resettable,
    Results, SIMILARITY, StoreHandle, Visited, index_operand, reset_operand,
};
use tracing::{debug, instrument, warn};

/// Key → full document lookup used to enrich pipeline results.
#[derive(Debug, Clone)]
pub struct DocumentMap {
    id: OperandId,
    store: DocumentStore,
}

impl DocumentMap {
    #[must_use]
    pub fn new(store: DocumentStore) -> Self {
        Self {
            id: OperandId::next(),
            store,
        }
    }

    /// Build a map over a fresh store holding `documents`.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] for a document without `key`.
    pub fn from_documents(
        key: impl Into<String>,
        documents: &[Document],
    ) -> Result<Self, FusionError> {
        let store = DocumentStore::new(key);
        store.extend(documents)?;
        Ok(Self::new(store))
    }

    #[must_use]
    pub const fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    /// Replace each document with its stored record. Documents whose key is
    /// not stored are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] for a document without the key
    /// field.
    pub fn enrich(&self, documents: &[Document]) -> Result<Vec<Document>, FusionError> {
        let field = self.store.key();
        let mut out = Vec::with_capacity(documents.len());
        let mut dropped = 0_usize;

        for document in documents {
            let key = document.require_key(field, "document map input")?;
            let Some(mut full) = self.store.get(&key) else {
                dropped += 1;
                continue;
            };
            full.insert(field, key.into_value());
            match document.get(SIMILARITY) {
                Some(similarity) => {
                    full.insert(SIMILARITY, similarity.clone());
                }
                None => {
                    full.remove(SIMILARITY);
                }
            }
            out.push(full);
        }

        if dropped > 0 {
            warn!(dropped, "documents missing from document map were dropped");
        }
        Ok(out)
    }
}

impl Operand for DocumentMap {
    fn id(&self) -> OperandId {
        self.id
    }

    fn name(&self) -> &str {
        "document map"
    }

    fn key(&self) -> Option<&str> {
        Some(self.store.key())
    }

    /// Enrich the request's candidate documents, query by query.
    fn call(&self, request: &Request) -> Result<Results> {
        let Some(sets) = &request.documents else {
            return Ok(request.empty_results());
        };
        let results = sets
            .iter()
            .map(|set| self.enrich(set))
            .collect::<Result<Results, FusionError>>()?;
        Ok(results)
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        Some(self)
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }

    fn store(&self) -> Option<StoreHandle> {
        Some(self.store.handle())
    }
}

impl Indexable for DocumentMap {
    fn index(&self, documents: &[Document], _visited: &mut Visited) -> Result<()> {
        let size = self.store.extend(documents)?;
        debug!(size, "document map indexed");
        Ok(())
    }
}

impl Resettable for DocumentMap {
    fn clear(&self, _visited: &mut Visited) -> Result<()> {
        self.store.clear();
        Ok(())
    }
}

/// Stages run left to right, each refining the previous stage's output.
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: OperandId,
    key: Option<String>,
    stages: Vec<Node>,
}

impl Pipeline {
    /// # Errors
    ///
    /// [`FusionError::EmptyComposition`] without stages;
    /// [`FusionError::NotComposable`] when the first stage is a document map,
    /// since it would have nothing to enrich.
    pub fn new(stages: Vec<Node>) -> Result<Self, FusionError> {
        let Some(first) = stages.first() else {
            return Err(FusionError::EmptyComposition { family: "pipeline" });
        };
        if first.is_map() {
            return Err(FusionError::NotComposable {
                stage: "document map",
                family: "pipeline as its first stage",
            });
        }
        let key = stages.iter().find_map(Operand::key).map(str::to_string);
        Ok(Self {
            id: OperandId::next(),
            key,
            stages,
        })
    }

    #[must_use]
    pub fn stages(&self) -> &[Node] {
        &self.stages
    }

    #[must_use]
    pub fn into_stages(self) -> Vec<Node> {
        self.stages
    }
}

impl Operand for Pipeline {
    fn id(&self) -> OperandId {
        self.id
    }

    fn name(&self) -> &str {
        "pipeline"
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[instrument(skip_all, fields(stages = self.stages.len(), queries = request.len()))]
    fn call(&self, request: &Request) -> Result<Results> {
        let mut documents = request.documents.clone();

        for stage in &self.stages {
            let stage_request = request.with_documents(documents.take());
            let results = stage.call(&stage_request)?;
            if results.len() != request.len() {
                return Err(FusionError::MisalignedBatch {
                    operand: stage.name().to_string(),
                    expected: request.len(),
                    actual: results.len(),
                }
                .into());
            }
            debug!(
                stage = stage.name(),
                hits = results.iter().map(Vec::len).sum::<usize>(),
                "stage complete"
            );
            documents = Some(results);
        }

        Ok(documents.unwrap_or_else(|| request.empty_results()))
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        Some(self)
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        Some(self)
    }
}

impl Indexable for Pipeline {
    fn index(&self, documents: &[Document], visited: &mut Visited) -> Result<()> {
        for stage in &self.stages {
            index_operand(stage, documents, visited)?;
        }
        Ok(())
    }
}

impl Resettable for Pipeline {
    fn clear(&self, visited: &mut Visited) -> Result<()> {
        for stage in &self.stages {
            reset_operand(stage, visited)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{Key, Recorded, SearchOptions};
    use serde_json::Value;

    fn full(id: i64, title: &str) -> Document {
        Document::new()
            .with("id", id)
            .with("title", title)
            .with("body", format!("body of {title}"))
    }

    #[test]
    fn enrich_merges_full_record_key_and_similarity() {
        let map = DocumentMap::from_documents("id", &[full(1, "one")]).expect("map");
        let enriched = map
            .enrich(&[Document::new().with("id", 1).with_similarity(0.5)])
            .expect("enrich");

        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].get("title"), Some(&Value::from("one")));
        assert_eq!(enriched[0].get("body"), Some(&Value::from("body of one")));
        assert_eq!(enriched[0].key("id"), Some(Key::from(1_i64)));
        assert_eq!(enriched[0].similarity(), Some(0.5));
    }

    #[test]
    fn enrich_drops_unknown_keys() {
        let map = DocumentMap::from_documents("id", &[full(1, "one")]).expect("map");
        let enriched = map
            .enrich(&[Document::new().with("id", 2)])
            .expect("enrich");
        assert!(enriched.is_empty());
    }

    #[test]
    fn enrich_does_not_leak_stored_similarity() {
        let map = DocumentMap::from_documents("id", &[full(1, "one").with_similarity(9.0)])
            .expect("map");
        let enriched = map
            .enrich(&[Document::new().with("id", 1)])
            .expect("enrich");
        assert_eq!(enriched[0].similarity(), None);
    }

    #[test]
    fn keyless_input_is_a_contract_error() {
        let map = DocumentMap::from_documents("id", &[full(1, "one")]).expect("map");
        let err = map
            .enrich(&[Document::new().with("title", "orphan")])
            .expect_err("missing key");
        assert!(matches!(err, FusionError::MissingKey { .. }));
    }

    #[test]
    fn pipeline_threads_documents_between_stages() {
        let retriever = Recorded::new("retriever", "id")
            .with_results(
                "x",
                vec![
                    Document::new().with("id", 1).with_similarity(0.9),
                    Document::new().with("id", 2).with_similarity(0.8),
                    Document::new().with("id", 3).with_similarity(0.7),
                ],
            )
            .expect("record");
        let ranker = Recorded::new("ranker", "id")
            .with_results(
                "x",
                vec![
                    Document::new().with("id", 3).with_similarity(0.99),
                    Document::new().with("id", 4).with_similarity(0.98),
                    Document::new().with("id", 1).with_similarity(0.10),
                ],
            )
            .expect("record");
        let map = DocumentMap::from_documents("id", &[full(1, "one"), full(3, "three")])
            .expect("map");

        let pipeline = Pipeline::new(vec![
            Node::leaf(retriever),
            Node::leaf(ranker),
            Node::from(map),
        ])
        .expect("pipeline");

        let request = Request::normalize("x", SearchOptions::new()).expect("normalize");
        let results = pipeline.call(&request).expect("call");
        let titles: Vec<&Value> = results[0]
            .iter()
            .filter_map(|d| d.get("title"))
            .collect();
        assert_eq!(titles, [&Value::from("three"), &Value::from("one")]);
        assert_eq!(results[0][0].similarity(), Some(0.99));
    }

    #[test]
    fn pipeline_cannot_start_with_a_map() {
        let map = DocumentMap::from_documents("id", &[]).expect("map");
        let err = Pipeline::new(vec![Node::from(map)]).expect_err("map first");
        assert!(err.is_configuration());
        assert!(Pipeline::new(Vec::new()).is_err());
    }

    #[test]
    fn pipeline_inherits_first_declared_key() {
        let map = DocumentMap::from_documents("doc_id", &[]).expect("map");
        let ranker = Recorded::new("ranker", "doc_id");
        let pipeline = Pipeline::new(vec![Node::leaf(ranker), Node::from(map)]).expect("pipeline");
        assert_eq!(pipeline.key(), Some("doc_id"));
    }
}
