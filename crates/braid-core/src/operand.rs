//! The operand contract.
//!
//! Every retriever, ranker or composition node that takes part in fusion
//! implements [`Operand`]. Indexing and clearing are optional capabilities,
//! discovered through [`Operand::as_indexable`] and
//! [`Operand::as_resettable`].
//!
//! Operands and stores receive a stable identity when they are constructed
//! ([`OperandId`], [`StoreHandle`]). A [`Visited`] set built from those
//! identities keeps one `add`/`reset` call from touching the same operand, or
//! the same store behind several operands, more than once.

use crate::document::Document;
use crate::query::{QueryInput, Ranked, Request, Results, SearchOptions};
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OPERAND: AtomicU64 = AtomicU64::new(1);
static NEXT_STORE: AtomicU64 = AtomicU64::new(1);

/// Identity of an operand instance, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandId(u64);

impl OperandId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OPERAND.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Identity of a document store, shared by every clone of that store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(u64);

impl StoreHandle {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_STORE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Operands that can ingest documents.
pub trait Indexable {
    /// Index `documents`. Composite operands forward `visited` to their
    /// children; leaves can ignore it.
    ///
    /// # Errors
    ///
    /// Any indexing failure, propagated unchanged to the caller.
    fn index(&self, documents: &[Document], visited: &mut Visited) -> Result<()>;
}

/// Operands that can drop everything they indexed.
pub trait Resettable {
    /// # Errors
    ///
    /// Any failure while clearing, propagated unchanged to the caller.
    fn clear(&self, visited: &mut Visited) -> Result<()>;
}

/// A retrieval/ranking unit or composition node.
pub trait Operand {
    fn id(&self) -> OperandId;

    /// Label used in logs and error messages.
    fn name(&self) -> &str {
        "operand"
    }

    /// Name of the identity field this operand's documents carry.
    fn key(&self) -> Option<&str> {
        None
    }

    /// Answer every query in `request`, returning one list per query in the
    /// same order.
    ///
    /// # Errors
    ///
    /// Whatever the underlying model raises. Fusion does not catch it.
    fn call(&self, request: &Request) -> Result<Results>;

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        None
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        None
    }

    /// Store backing this operand, when it may be shared with others.
    fn store(&self) -> Option<StoreHandle> {
        None
    }
}

/// Operands and stores already touched during one `add`/`reset` traversal.
#[derive(Debug, Default)]
pub struct Visited {
    operands: HashSet<OperandId>,
    stores: HashSet<StoreHandle>,
}

impl Visited {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit. Returns `false` when the operand, or the store behind
    /// it, has already been visited.
    pub fn enter(&mut self, id: OperandId, store: Option<StoreHandle>) -> bool {
        if self.operands.contains(&id) {
            return false;
        }
        if let Some(handle) = store
            && !self.stores.insert(handle)
        {
            return false;
        }
        self.operands.insert(id);
        true
    }

    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }
}

/// Index `documents` into `operand` unless it was already visited. Returns
/// whether anything was indexed.
///
/// # Errors
///
/// Propagates the operand's indexing error.
pub fn index_operand<O: Operand + ?Sized>(
    operand: &O,
    documents: &[Document],
    visited: &mut Visited,
) -> Result<bool> {
    let Some(indexable) = operand.as_indexable() else {
        return Ok(false);
    };
    if !visited.enter(operand.id(), operand.store()) {
        tracing::trace!(operand = operand.name(), "already indexed in this call");
        return Ok(false);
    }
    indexable.index(documents, visited)?;
    Ok(true)
}

/// Clear `operand` unless it was already visited. Returns whether anything
/// was cleared.
///
/// # Errors
///
/// Propagates the operand's reset error.
pub fn reset_operand<O: Operand + ?Sized>(operand: &O, visited: &mut Visited) -> Result<bool> {
    let Some(resettable) = operand.as_resettable() else {
        return Ok(false);
    };
    if !visited.enter(operand.id(), operand.store()) {
        tracing::trace!(operand = operand.name(), "already reset in this call");
        return Ok(false);
    }
    resettable.clear(visited)?;
    Ok(true)
}

/// Caller-facing entry point: normalize, call, restore the caller's shape.
pub trait Search: Operand {
    /// # Errors
    ///
    /// Misaligned candidates, or any error raised by the operand.
    fn search(&self, q: impl Into<QueryInput>, options: SearchOptions) -> Result<Ranked> {
        let request = Request::normalize(q, options)?;
        let results = self.call(&request)?;
        Ok(Ranked::from_results(results, request.is_batched()))
    }
}

impl<T: Operand + ?Sized> Search for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        id: OperandId,
        store: Option<StoreHandle>,
        indexed: Cell<usize>,
    }

    impl Counting {
        fn new(store: Option<StoreHandle>) -> Self {
            Self {
                id: OperandId::next(),
                store,
                indexed: Cell::new(0),
            }
        }
    }

    impl Operand for Counting {
        fn id(&self) -> OperandId {
            self.id
        }

        fn call(&self, request: &Request) -> Result<Results> {
            Ok(request.empty_results())
        }

        fn as_indexable(&self) -> Option<&dyn Indexable> {
            Some(self)
        }

        fn store(&self) -> Option<StoreHandle> {
            self.store
        }
    }

    impl Indexable for Counting {
        fn index(&self, documents: &[Document], _visited: &mut Visited) -> Result<()> {
            self.indexed.set(self.indexed.get() + documents.len());
            Ok(())
        }
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(OperandId::next(), OperandId::next());
        assert_ne!(StoreHandle::next(), StoreHandle::next());
    }

    #[test]
    fn operand_is_indexed_once_per_traversal() {
        let op = Counting::new(None);
        let docs = [Document::new().with("id", 1)];
        let mut visited = Visited::new();

        assert!(index_operand(&op, &docs, &mut visited).expect("index"));
        assert!(!index_operand(&op, &docs, &mut visited).expect("index"));
        assert_eq!(op.indexed.get(), 1);
    }

    #[test]
    fn shared_store_is_indexed_once() {
        let store = StoreHandle::next();
        let a = Counting::new(Some(store));
        let b = Counting::new(Some(store));
        let docs = [Document::new().with("id", 1)];
        let mut visited = Visited::new();

        index_operand(&a, &docs, &mut visited).expect("index");
        index_operand(&b, &docs, &mut visited).expect("index");
        assert_eq!(a.indexed.get() + b.indexed.get(), 1);
    }

    #[test]
    fn operands_without_capability_are_skipped() {
        struct Plain(OperandId);
        impl Operand for Plain {
            fn id(&self) -> OperandId {
                self.0
            }
            fn call(&self, request: &Request) -> Result<Results> {
                Ok(request.empty_results())
            }
        }

        let mut visited = Visited::new();
        let plain = Plain(OperandId::next());
        assert!(!index_operand(&plain, &[], &mut visited).expect("index"));
        assert!(!reset_operand(&plain, &mut visited).expect("reset"));
        assert_eq!(visited.operand_count(), 0);
    }

    #[test]
    fn search_unwraps_single_query() {
        let op = Counting::new(None);
        let ranked = op.search("x", SearchOptions::new()).expect("search");
        assert_eq!(ranked, Ranked::Single(Vec::new()));

        let ranked = op.search(vec!["x", "y"], SearchOptions::new()).expect("search");
        assert_eq!(ranked, Ranked::Batch(vec![Vec::new(), Vec::new()]));
    }
}
