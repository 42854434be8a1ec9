//! In-memory key → document store.
//!
//! A store is always constructed explicitly and handed to whatever needs it.
//! Clones share the same contents and the same [`StoreHandle`], so several
//! operands can sit on top of one store and still be indexed once per call.

use crate::document::{Document, Key};
use crate::error::FusionError;
use crate::operand::StoreHandle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Inner {
    documents: Vec<Document>,
    positions: HashMap<Key, usize>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    handle: StoreHandle,
    key: String,
    inner: Rc<RefCell<Inner>>,
}

impl DocumentStore {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            handle: StoreHandle::next(),
            key: key.into(),
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    #[must_use]
    pub const fn handle(&self) -> StoreHandle {
        self.handle
    }

    /// Name of the identity field documents are stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Insert or replace a document. Insertion order is kept; a replaced
    /// document keeps its original slot.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] when the document has no key field.
    pub fn insert(&self, document: Document) -> Result<(), FusionError> {
        let key = document.require_key(&self.key, "document store")?;
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        match inner.positions.get(&key).copied() {
            Some(position) => inner.documents[position] = document,
            None => {
                inner.positions.insert(key, inner.documents.len());
                inner.documents.push(document);
            }
        }
        Ok(())
    }

    /// Insert every document, stopping at the first one without a key.
    /// Returns the store size afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] for the first keyless document.
    pub fn extend(&self, documents: &[Document]) -> Result<usize, FusionError> {
        for document in documents {
            self.insert(document.clone())?;
        }
        Ok(self.len())
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<Document> {
        let inner = self.inner.borrow();
        inner
            .positions
            .get(key)
            .map(|&position| inner.documents[position].clone())
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.inner.borrow().positions.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().documents.is_empty()
    }

    /// Snapshot of every stored document in insertion order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.inner.borrow().documents.clone()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.documents.clear();
        inner.positions.clear();
    }
}
